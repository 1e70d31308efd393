//! Module loaders
//!
//! [`ModuleLoader`] is the code-loading seam of the runtime. Two loaders
//! ship with the crate:
//!
//! - [`DynamicLibraryLoader`] opens a script module built as a `cdylib`
//!   (see [`export_script_module!`](crate::export_script_module)).
//! - [`StaticModuleLoader`] serves registration functions linked into the
//!   host binary, keyed by path.

use crate::class::run_isolated;
use crate::error::{Result, ScriptError};
use crate::module::{ModuleBuilder, ModuleContext, ScriptModule};
use libloading::{Library, Symbol};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use void_core::Version;

/// API version modules are checked against
pub const MODULE_API_VERSION: Version = Version::new(0, 1, 0);

/// Symbol reporting the API version a module was built against
pub const MODULE_API_SYMBOL: &[u8] = b"void_managed_module_api\0";

/// Symbol that declares a module's types
pub const MODULE_ENTRY_SYMBOL: &[u8] = b"void_managed_module_entry\0";

/// Version for FFI
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl From<Version> for FfiVersion {
    fn from(v: Version) -> Self {
        Self { major: v.major, minor: v.minor, patch: v.patch }
    }
}

impl From<FfiVersion> for Version {
    fn from(v: FfiVersion) -> Self {
        Version::new(v.major, v.minor, v.patch)
    }
}

/// Signature of [`MODULE_API_SYMBOL`]
pub type ModuleApiFn = unsafe extern "C" fn() -> FfiVersion;

/// Signature of [`MODULE_ENTRY_SYMBOL`]; returns 0 on success
pub type ModuleEntryFn = unsafe extern "C" fn(*mut ModuleBuilder) -> c_int;

/// Registration function of a statically linked module
pub type RegisterFn = fn(&mut ModuleBuilder);

/// Everything a loader needs to load one module
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Module file
    pub path: PathBuf,
    /// Companion debug-symbol file to attach, if one exists
    pub debug_symbols: Option<PathBuf>,
    /// Load counter value assigned by the coordinator
    pub generation: u64,
}

impl LoadRequest {
    /// Module name derived from the file stem
    pub fn module_name(&self) -> String {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string()
    }
}

/// Loads compiled script code
pub trait ModuleLoader: Send {
    /// Load the module described by `request`
    fn load(&mut self, request: &LoadRequest) -> Result<ScriptModule>;
}

/// Find a debug-symbol file next to `module_path`
pub fn find_debug_symbols(module_path: &Path, extensions: &[String]) -> Option<PathBuf> {
    extensions
        .iter()
        .map(|ext| module_path.with_extension(ext.trim_start_matches('.')))
        .find(|candidate| candidate.as_path() != module_path && candidate.is_file())
}

static NEXT_LOADER_ID: AtomicU64 = AtomicU64::new(1);

/// Shadow copies not yet owned by a [`ModuleContext`]; removed on drop
#[derive(Default)]
struct PendingShadowFiles(Vec<PathBuf>);

impl PendingShadowFiles {
    fn push(&mut self, file: PathBuf) {
        self.0.push(file);
    }

    fn into_owned(mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.0)
    }
}

impl Drop for PendingShadowFiles {
    fn drop(&mut self) {
        for file in &self.0 {
            if let Err(e) = std::fs::remove_file(file) {
                log::debug!("Could not remove shadow copy {}: {}", file.display(), e);
            }
        }
    }
}

/// Loads modules from shared libraries with `libloading`
pub struct DynamicLibraryLoader {
    /// Copy libraries before opening them so a rebuilt file at the same
    /// path is never served from the old mapping
    shadow_copy: bool,
    shadow_dir: PathBuf,
    /// Process id and loader id; keeps copies from different loaders and
    /// processes apart inside a shared directory
    shadow_tag: String,
}

impl DynamicLibraryLoader {
    /// Create a loader that shadow-copies into the system temp directory
    pub fn new() -> Self {
        Self {
            shadow_copy: true,
            shadow_dir: std::env::temp_dir().join("void_managed"),
            shadow_tag: format!(
                "{}-{}",
                std::process::id(),
                NEXT_LOADER_ID.fetch_add(1, Ordering::Relaxed)
            ),
        }
    }

    /// Open libraries in place
    pub fn without_shadow_copy(mut self) -> Self {
        self.shadow_copy = false;
        self
    }

    /// Put shadow copies somewhere else
    pub fn with_shadow_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shadow_dir = dir.into();
        self
    }

    fn shadow(&self, file: &Path, generation: u64) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.shadow_dir)?;
        let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("module");
        let mut target = self
            .shadow_dir
            .join(format!("{}-{}-{}", stem, self.shadow_tag, generation));
        if let Some(ext) = file.extension() {
            target.set_extension(ext);
        }

        // Never truncate a file someone else may have mapped
        let mut source = File::open(file)?;
        let mut copy = OpenOptions::new().write(true).create_new(true).open(&target)?;
        if let Err(e) = std::io::copy(&mut source, &mut copy) {
            drop(copy);
            let _ = std::fs::remove_file(&target);
            return Err(e.into());
        }
        Ok(target)
    }
}

impl Default for DynamicLibraryLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleLoader for DynamicLibraryLoader {
    fn load(&mut self, request: &LoadRequest) -> Result<ScriptModule> {
        let path = request.path.as_path();
        if !path.is_file() {
            return Err(ScriptError::load_failed(path, "file not found"));
        }

        let mut shadow_files = PendingShadowFiles::default();
        let open_path = if self.shadow_copy {
            let copy = self
                .shadow(path, request.generation)
                .map_err(|e| ScriptError::load_failed(path, format!("shadow copy failed: {}", e)))?;
            shadow_files.push(copy.clone());
            if let Some(symbols) = &request.debug_symbols {
                // Debuggers look for symbols next to the mapped file
                match self.shadow(symbols, request.generation) {
                    Ok(symbol_copy) => shadow_files.push(symbol_copy),
                    Err(e) => log::warn!("Could not attach debug symbols {}: {}", symbols.display(), e),
                }
            }
            copy
        } else {
            path.to_path_buf()
        };

        // Safety: loading runs the library's initialisers; script modules are
        // trusted code built against this crate.
        let library = unsafe { Library::new(&open_path) }
            .map_err(|e| ScriptError::load_failed(path, e.to_string()))?;

        let module_name = request.module_name();
        let (api, entry) = unsafe {
            let api: Symbol<ModuleApiFn> = library
                .get(MODULE_API_SYMBOL)
                .map_err(|_| ScriptError::symbol_not_found(&module_name, "void_managed_module_api"))?;
            let entry: Symbol<ModuleEntryFn> = library
                .get(MODULE_ENTRY_SYMBOL)
                .map_err(|_| ScriptError::symbol_not_found(&module_name, "void_managed_module_entry"))?;
            (*api, *entry)
        };

        let module_api = Version::from(unsafe { api() });
        if let Err(e) = module_api.require(&MODULE_API_VERSION) {
            log::warn!("Rejecting script module '{}': {}", module_name, e);
            return Err(ScriptError::ApiVersionMismatch {
                module_version: module_api.to_string(),
                runtime_version: MODULE_API_VERSION.to_string(),
            });
        }

        // The context owns the library and the copies from here on; `entry`
        // stays valid for as long as the context is alive.
        let context = ModuleContext::new(
            &module_name,
            request.generation,
            Some(library),
            shadow_files.into_owned(),
        );
        let mut builder = ModuleBuilder::new(context, path, request.debug_symbols.clone());

        let status = unsafe { entry(&mut builder) };
        if status != 0 {
            return Err(ScriptError::load_failed(
                path,
                format!("module entry point failed with status {}", status),
            ));
        }

        let module = builder.finish();
        log::info!(
            "Loaded script module '{}' v{} ({} types)",
            module.info.name,
            module.info.version,
            module.types.len()
        );
        Ok(module)
    }
}

/// Serves modules whose code is linked into the host
///
/// Clones share the same table, so a host can keep one clone to swap a
/// path's registration function while the runtime owns another.
#[derive(Clone, Default)]
pub struct StaticModuleLoader {
    modules: Arc<RwLock<HashMap<PathBuf, RegisterFn>>>,
}

impl StaticModuleLoader {
    /// Create an empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the module served for `path`
    pub fn insert(&self, path: impl Into<PathBuf>, register: RegisterFn) {
        self.modules.write().insert(path.into(), register);
    }

    /// Stop serving `path`
    pub fn remove(&self, path: impl AsRef<Path>) {
        self.modules.write().remove(path.as_ref());
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn load(&mut self, request: &LoadRequest) -> Result<ScriptModule> {
        let register = self
            .modules
            .read()
            .get(&request.path)
            .copied()
            .ok_or_else(|| ScriptError::load_failed(&request.path, "no module registered at this path"))?;

        let context = ModuleContext::new(request.module_name(), request.generation, None, Vec::new());
        let mut builder = ModuleBuilder::new(context, &request.path, request.debug_symbols.clone());
        run_isolated(|| register(&mut builder))
            .map_err(|panic| ScriptError::load_failed(&request.path, format!("registration panicked: {}", panic)))?;

        Ok(builder.finish())
    }
}

/// Export a registration function as a script module entry point
///
/// ```ignore
/// fn register(module: &mut void_managed::ModuleBuilder) {
///     module.class(ClassBuilder::new("Game.Player", Player::default));
/// }
///
/// void_managed::export_script_module!(register);
/// ```
///
/// The module crate must be built with the same compiler and the same
/// `void_managed` version as the host.
#[macro_export]
macro_rules! export_script_module {
    ($register:path) => {
        #[no_mangle]
        pub extern "C" fn void_managed_module_api() -> $crate::loader::FfiVersion {
            $crate::loader::FfiVersion::from($crate::loader::MODULE_API_VERSION)
        }

        #[no_mangle]
        pub unsafe extern "C" fn void_managed_module_entry(
            builder: *mut $crate::module::ModuleBuilder,
        ) -> ::std::os::raw::c_int {
            let Some(builder) = builder.as_mut() else {
                return -1;
            };
            match ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| $register(builder))) {
                Ok(()) => 0,
                Err(_) => 1,
            }
        }
    };
}
