//! C ABI for the native engine
//!
//! The engine holds an opaque `*mut FfiRuntime`. Every call goes through a
//! single mutex around the runtime and never unwinds into the caller: a
//! panic is logged and turned into the call's failure value.
//!
//! Entity identifiers and handles are plain `u64`; `0` means none.
//! Strings returned by the runtime are owned by the caller and must be
//! released with [`void_managed_free_string`].

use crate::bindings::{EngineBindings, FfiBool, FfiVec2, FfiVec3, FfiVec4};
use crate::class::run_isolated;
use crate::config::RuntimeConfig;
use crate::handles::InstanceHandle;
use crate::loader::DynamicLibraryLoader;
use crate::runtime::ScriptRuntime;
use parking_lot::Mutex;
use std::ffi::{c_char, CStr, CString};
use std::os::raw::c_int;
use void_core::EntityId;

/// Opaque runtime owned by the engine
pub struct FfiRuntime {
    inner: Mutex<ScriptRuntime>,
}

impl FfiRuntime {
    /// Hand an already-configured runtime to native code
    pub fn into_raw(runtime: ScriptRuntime) -> *mut FfiRuntime {
        Box::into_raw(Box::new(FfiRuntime { inner: Mutex::new(runtime) }))
    }
}

unsafe fn with_runtime<R>(runtime: *mut FfiRuntime, fallback: R, f: impl FnOnce(&mut ScriptRuntime) -> R) -> R {
    let Some(runtime) = runtime.as_ref() else {
        return fallback;
    };
    let mut guard = runtime.inner.lock();
    match run_isolated(|| f(&mut *guard)) {
        Ok(result) => result,
        Err(panic) => {
            log::error!("Script runtime call panicked: {}", panic);
            fallback
        }
    }
}

unsafe fn str_arg<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(s) => Some(s),
        Err(_) => {
            log::warn!("Ignoring non UTF-8 string argument");
            None
        }
    }
}

fn string_result(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(s) => s.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

// ========== Lifetime ==========

/// Create a runtime that loads modules from shared libraries
#[no_mangle]
pub extern "C" fn void_managed_runtime_create() -> *mut FfiRuntime {
    FfiRuntime::into_raw(ScriptRuntime::new(DynamicLibraryLoader::new()))
}

/// Create a runtime from a TOML config file; null on failure
///
/// # Safety
/// `config_path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn void_managed_runtime_create_with_config(config_path: *const c_char) -> *mut FfiRuntime {
    let config = match str_arg(config_path) {
        Some(path) => match RuntimeConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Could not read runtime config {}: {}", path, e);
                return std::ptr::null_mut();
            }
        },
        None => RuntimeConfig::default(),
    };

    match ScriptRuntime::with_config(DynamicLibraryLoader::new(), config) {
        Ok(runtime) => FfiRuntime::into_raw(runtime),
        Err(e) => {
            log::error!("Could not create script runtime: {}", e);
            std::ptr::null_mut()
        }
    }
}

/// Destroy a runtime
///
/// # Safety
/// `runtime` must be null or come from one of the create functions, and
/// must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn void_managed_runtime_destroy(runtime: *mut FfiRuntime) {
    if !runtime.is_null() {
        drop(Box::from_raw(runtime));
    }
}

/// Install the engine call table
///
/// # Safety
/// `runtime` must be valid; `bindings` must be null or point to a table
/// whose function pointers stay valid while the runtime lives.
#[no_mangle]
pub unsafe extern "C" fn void_managed_set_bindings(runtime: *mut FfiRuntime, bindings: *const EngineBindings) {
    let Some(bindings) = bindings.as_ref().copied() else {
        return;
    };
    with_runtime(runtime, (), |rt| rt.set_bindings(bindings));
}

// ========== Module ==========

/// Load or replace the script module; failures are logged
///
/// # Safety
/// `runtime` must be valid; `path` must be a valid string.
#[no_mangle]
pub unsafe extern "C" fn void_managed_load_module(runtime: *mut FfiRuntime, path: *const c_char) {
    let Some(path) = str_arg(path) else {
        return;
    };
    with_runtime(runtime, (), |rt| {
        rt.load_module(path);
    });
}

/// Reload the module if its file changed
///
/// # Safety
/// `runtime` must be valid.
#[cfg(feature = "hot-reload")]
#[no_mangle]
pub unsafe extern "C" fn void_managed_poll_reload(runtime: *mut FfiRuntime) -> c_int {
    with_runtime(runtime, 0, |rt| rt.poll_reload().map_or(0, |r| r.is_loaded() as c_int))
}

/// 1 if `name` is a registered class
///
/// # Safety
/// `runtime` must be valid; `name` must be a valid string.
#[no_mangle]
pub unsafe extern "C" fn void_managed_class_exists(runtime: *mut FfiRuntime, name: *const c_char) -> c_int {
    let Some(name) = str_arg(name) else {
        return 0;
    };
    with_runtime(runtime, 0, |rt| rt.class_exists(name) as c_int)
}

// ========== Entities ==========

/// Create an instance for an entity; returns its handle or 0
///
/// # Safety
/// `runtime` must be valid; `class_name` must be a valid string.
#[no_mangle]
pub unsafe extern "C" fn void_managed_create_instance(
    runtime: *mut FfiRuntime,
    entity: u64,
    class_name: *const c_char,
) -> u64 {
    let (Some(entity), Some(class_name)) = (EntityId::new(entity), str_arg(class_name)) else {
        return 0;
    };
    with_runtime(runtime, 0, |rt| rt.create_instance(entity, class_name).to_bits())
}

/// Release a handle; 0 and released handles are ignored
///
/// # Safety
/// `runtime` must be valid.
#[no_mangle]
pub unsafe extern "C" fn void_managed_release_handle(runtime: *mut FfiRuntime, handle: u64) {
    with_runtime(runtime, (), |rt| rt.release_handle(InstanceHandle::from_bits(handle)));
}

/// Run one entity's update hook
///
/// # Safety
/// `runtime` must be valid.
#[no_mangle]
pub unsafe extern "C" fn void_managed_update_entity(runtime: *mut FfiRuntime, entity: u64, delta_time: f32) {
    let Some(entity) = EntityId::new(entity) else {
        return;
    };
    with_runtime(runtime, (), |rt| rt.update_entity(entity, delta_time));
}

/// Drop every instance and handle
///
/// # Safety
/// `runtime` must be valid.
#[no_mangle]
pub unsafe extern "C" fn void_managed_stop(runtime: *mut FfiRuntime) {
    with_runtime(runtime, (), |rt| rt.stop());
}

// ========== Reflection ==========

/// `name:Type` pairs joined with `;`
///
/// # Safety
/// `runtime` must be valid. Free the result with [`void_managed_free_string`].
#[no_mangle]
pub unsafe extern "C" fn void_managed_list_fields(runtime: *mut FfiRuntime, handle: u64) -> *mut c_char {
    let fields = with_runtime(runtime, String::new(), |rt| rt.list_fields(InstanceHandle::from_bits(handle)));
    string_result(fields)
}

macro_rules! ffi_field_access {
    ($($get:ident, $set:ident, $rt_get:ident, $rt_set:ident => $ffi:ty, $rust:ty;)*) => {
        $(
            /// Read a field into `out`; returns 1 on success, 0 otherwise
            ///
            /// # Safety
            /// `runtime` must be valid, `field` a valid string and `out`
            /// writable.
            #[no_mangle]
            pub unsafe extern "C" fn $get(
                runtime: *mut FfiRuntime,
                handle: u64,
                field: *const c_char,
                out: *mut $ffi,
            ) -> c_int {
                let Some(field) = str_arg(field) else {
                    return 0;
                };
                if out.is_null() {
                    return 0;
                }
                match with_runtime(runtime, None, |rt| rt.$rt_get(InstanceHandle::from_bits(handle), field)) {
                    Some(value) => {
                        *out = <$ffi>::from(value);
                        1
                    }
                    None => 0,
                }
            }

            /// Write a field; mismatched names and types are ignored
            ///
            /// # Safety
            /// `runtime` must be valid and `field` a valid string.
            #[no_mangle]
            pub unsafe extern "C" fn $set(runtime: *mut FfiRuntime, handle: u64, field: *const c_char, value: $ffi) {
                let Some(field) = str_arg(field) else {
                    return;
                };
                let value = <$rust>::from(value);
                with_runtime(runtime, false, |rt| rt.$rt_set(InstanceHandle::from_bits(handle), field, value));
            }
        )*
    };
}

ffi_field_access! {
    void_managed_get_float, void_managed_set_float, get_float, set_float => f32, f32;
    void_managed_get_int, void_managed_set_int, get_int, set_int => i32, i32;
    void_managed_get_bool, void_managed_set_bool, get_bool, set_bool => FfiBool, bool;
    void_managed_get_vec2, void_managed_set_vec2, get_vec2, set_vec2 => FfiVec2, glam::Vec2;
    void_managed_get_vec3, void_managed_set_vec3, get_vec3, set_vec3 => FfiVec3, glam::Vec3;
    void_managed_get_vec4, void_managed_set_vec4, get_vec4, set_vec4 => FfiVec4, glam::Vec4;
}

/// Flat JSON document of an instance; null for an invalid handle
///
/// # Safety
/// `runtime` must be valid. Free the result with [`void_managed_free_string`].
#[no_mangle]
pub unsafe extern "C" fn void_managed_serialize(runtime: *mut FfiRuntime, handle: u64) -> *mut c_char {
    match with_runtime(runtime, None, |rt| rt.serialize(InstanceHandle::from_bits(handle))) {
        Some(document) => string_result(document),
        None => std::ptr::null_mut(),
    }
}

/// Apply a flat JSON document; fields that do not fit are skipped
///
/// # Safety
/// `runtime` must be valid; `document` must be a valid string.
#[no_mangle]
pub unsafe extern "C" fn void_managed_deserialize(runtime: *mut FfiRuntime, handle: u64, document: *const c_char) {
    let Some(document) = str_arg(document) else {
        return;
    };
    with_runtime(runtime, (), |rt| {
        if let Err(e) = rt.deserialize(InstanceHandle::from_bits(handle), document) {
            log::warn!("Could not deserialize handle {:#x}: {}", handle, e);
        }
    });
}

/// Release a string returned by this library
///
/// # Safety
/// `s` must be null or a string returned by this library, freed once.
#[no_mangle]
pub unsafe extern "C" fn void_managed_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
