//! Engine call bindings
//!
//! The native engine exposes its per-feature calls (transform, input,
//! rigidbody, tilemap, raycast) as a table of C function pointers installed
//! once by the host. The runtime holds no state about these systems; it
//! hands scripts a safe view of the table through [`ScriptContext`].
//!
//! [`ScriptContext`]: crate::class::ScriptContext

use glam::{Vec2, Vec3};
use std::ffi::{c_char, c_void, CString};
use std::os::raw::c_int;

/// Vector2 for FFI
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FfiVec2 {
    pub x: f32,
    pub y: f32,
}

/// Vector3 for FFI
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FfiVec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Vector4 for FFI
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FfiVec4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl From<Vec2> for FfiVec2 {
    fn from(v: Vec2) -> Self {
        Self { x: v.x, y: v.y }
    }
}

impl From<FfiVec2> for Vec2 {
    fn from(v: FfiVec2) -> Self {
        Vec2::new(v.x, v.y)
    }
}

impl From<Vec3> for FfiVec3 {
    fn from(v: Vec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl From<FfiVec3> for Vec3 {
    fn from(v: FfiVec3) -> Self {
        Vec3::new(v.x, v.y, v.z)
    }
}

impl From<glam::Vec4> for FfiVec4 {
    fn from(v: glam::Vec4) -> Self {
        Self { x: v.x, y: v.y, z: v.z, w: v.w }
    }
}

impl From<FfiVec4> for glam::Vec4 {
    fn from(v: FfiVec4) -> Self {
        glam::Vec4::new(v.x, v.y, v.z, v.w)
    }
}

/// Boolean carried as a C `int`; any non-zero value is true
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FfiBool(pub c_int);

impl From<bool> for FfiBool {
    fn from(v: bool) -> Self {
        FfiBool(c_int::from(v))
    }
}

impl From<FfiBool> for bool {
    fn from(v: FfiBool) -> Self {
        v.0 != 0
    }
}

/// Result of a 2D raycast
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FfiRaycastHit2D {
    pub point: FfiVec2,
    pub normal: FfiVec2,
    pub distance: f32,
    pub entity_id: u64,
    /// Non-zero when something was hit
    pub hit: c_int,
}

/// Log severity passed to the host logger
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiLogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

/// Function table provided by the native engine
///
/// Every entry is optional; a missing entry makes the corresponding
/// [`Engine`] method return `None` (or do nothing for setters).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct EngineBindings {
    /// Opaque pointer passed back as the first argument of every call
    pub user_data: *mut c_void,

    pub log: Option<extern "C" fn(*mut c_void, FfiLogLevel, *const c_char)>,

    // Scene
    pub entity_has_component: Option<extern "C" fn(*mut c_void, u64, *const c_char) -> c_int>,
    pub find_entity_by_name: Option<extern "C" fn(*mut c_void, *const c_char) -> u64>,

    // Transform
    pub get_translation: Option<extern "C" fn(*mut c_void, u64, *mut FfiVec3)>,
    pub set_translation: Option<extern "C" fn(*mut c_void, u64, *const FfiVec3)>,
    pub get_rotation: Option<extern "C" fn(*mut c_void, u64, *mut FfiVec3)>,
    pub set_rotation: Option<extern "C" fn(*mut c_void, u64, *const FfiVec3)>,
    pub get_scale: Option<extern "C" fn(*mut c_void, u64, *mut FfiVec3)>,
    pub set_scale: Option<extern "C" fn(*mut c_void, u64, *const FfiVec3)>,

    // Input
    pub is_key_down: Option<extern "C" fn(*mut c_void, c_int) -> c_int>,
    pub is_mouse_button_down: Option<extern "C" fn(*mut c_void, c_int) -> c_int>,
    pub get_mouse_position: Option<extern "C" fn(*mut c_void, *mut FfiVec2)>,

    // Rigidbody2D
    pub apply_linear_impulse: Option<extern "C" fn(*mut c_void, u64, *const FfiVec2, *const FfiVec2, c_int)>,
    pub apply_linear_impulse_to_center: Option<extern "C" fn(*mut c_void, u64, *const FfiVec2, c_int)>,
    pub get_linear_velocity: Option<extern "C" fn(*mut c_void, u64, *mut FfiVec2)>,
    pub set_linear_velocity: Option<extern "C" fn(*mut c_void, u64, *const FfiVec2)>,

    // Tilemap
    pub tilemap_get_size: Option<extern "C" fn(*mut c_void, u64, *mut c_int, *mut c_int)>,
    pub tilemap_set_size: Option<extern "C" fn(*mut c_void, u64, c_int, c_int)>,
    pub tilemap_get_tile: Option<extern "C" fn(*mut c_void, u64, c_int, c_int) -> c_int>,
    pub tilemap_set_tile: Option<extern "C" fn(*mut c_void, u64, c_int, c_int, c_int)>,

    // Physics2D
    pub raycast: Option<extern "C" fn(*mut c_void, *const FfiVec2, *const FfiVec2, *mut FfiRaycastHit2D)>,
}

// Safety: the host promises every call happens on its script thread; the
// table itself is plain data.
unsafe impl Send for EngineBindings {}
unsafe impl Sync for EngineBindings {}

impl EngineBindings {
    /// A table with no engine calls available
    pub const fn empty() -> Self {
        Self {
            user_data: std::ptr::null_mut(),
            log: None,
            entity_has_component: None,
            find_entity_by_name: None,
            get_translation: None,
            set_translation: None,
            get_rotation: None,
            set_rotation: None,
            get_scale: None,
            set_scale: None,
            is_key_down: None,
            is_mouse_button_down: None,
            get_mouse_position: None,
            apply_linear_impulse: None,
            apply_linear_impulse_to_center: None,
            get_linear_velocity: None,
            set_linear_velocity: None,
            tilemap_get_size: None,
            tilemap_set_size: None,
            tilemap_get_tile: None,
            tilemap_set_tile: None,
            raycast: None,
        }
    }
}

impl Default for EngineBindings {
    fn default() -> Self {
        Self::empty()
    }
}

/// A raycast hit in engine terms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub point: Vec2,
    pub normal: Vec2,
    pub distance: f32,
    pub entity: Option<void_core::EntityId>,
}

/// Safe view over [`EngineBindings`] for script code
#[derive(Clone, Copy)]
pub struct Engine<'a> {
    bindings: &'a EngineBindings,
}

macro_rules! vec3_accessors {
    ($($get:ident / $set:ident),* $(,)?) => {
        $(
            pub fn $get(&self, entity: void_core::EntityId) -> Option<Vec3> {
                let f = self.bindings.$get?;
                let mut out = FfiVec3::default();
                f(self.bindings.user_data, entity.get(), &mut out);
                Some(out.into())
            }

            pub fn $set(&self, entity: void_core::EntityId, value: Vec3) -> bool {
                match self.bindings.$set {
                    Some(f) => {
                        f(self.bindings.user_data, entity.get(), &FfiVec3::from(value));
                        true
                    }
                    None => false,
                }
            }
        )*
    };
}

impl<'a> Engine<'a> {
    pub(crate) fn new(bindings: &'a EngineBindings) -> Self {
        Self { bindings }
    }

    /// Forward a message to the host console
    pub fn log(&self, level: FfiLogLevel, message: &str) {
        let Some(f) = self.bindings.log else {
            return;
        };
        if let Ok(message) = CString::new(message) {
            f(self.bindings.user_data, level, message.as_ptr());
        }
    }

    pub fn has_component(&self, entity: void_core::EntityId, component: &str) -> Option<bool> {
        let f = self.bindings.entity_has_component?;
        let component = CString::new(component).ok()?;
        Some(f(self.bindings.user_data, entity.get(), component.as_ptr()) != 0)
    }

    pub fn find_entity_by_name(&self, name: &str) -> Option<void_core::EntityId> {
        let f = self.bindings.find_entity_by_name?;
        let name = CString::new(name).ok()?;
        void_core::EntityId::new(f(self.bindings.user_data, name.as_ptr()))
    }

    vec3_accessors! {
        get_translation / set_translation,
        get_rotation / set_rotation,
        get_scale / set_scale,
    }

    pub fn is_key_down(&self, key: i32) -> Option<bool> {
        let f = self.bindings.is_key_down?;
        Some(f(self.bindings.user_data, key) != 0)
    }

    pub fn is_mouse_button_down(&self, button: i32) -> Option<bool> {
        let f = self.bindings.is_mouse_button_down?;
        Some(f(self.bindings.user_data, button) != 0)
    }

    pub fn mouse_position(&self) -> Option<Vec2> {
        let f = self.bindings.get_mouse_position?;
        let mut out = FfiVec2::default();
        f(self.bindings.user_data, &mut out);
        Some(out.into())
    }

    pub fn apply_linear_impulse(&self, entity: void_core::EntityId, impulse: Vec2, point: Vec2, wake: bool) -> bool {
        match self.bindings.apply_linear_impulse {
            Some(f) => {
                f(
                    self.bindings.user_data,
                    entity.get(),
                    &FfiVec2::from(impulse),
                    &FfiVec2::from(point),
                    wake as c_int,
                );
                true
            }
            None => false,
        }
    }

    pub fn apply_linear_impulse_to_center(&self, entity: void_core::EntityId, impulse: Vec2, wake: bool) -> bool {
        match self.bindings.apply_linear_impulse_to_center {
            Some(f) => {
                f(self.bindings.user_data, entity.get(), &FfiVec2::from(impulse), wake as c_int);
                true
            }
            None => false,
        }
    }

    pub fn linear_velocity(&self, entity: void_core::EntityId) -> Option<Vec2> {
        let f = self.bindings.get_linear_velocity?;
        let mut out = FfiVec2::default();
        f(self.bindings.user_data, entity.get(), &mut out);
        Some(out.into())
    }

    pub fn set_linear_velocity(&self, entity: void_core::EntityId, velocity: Vec2) -> bool {
        match self.bindings.set_linear_velocity {
            Some(f) => {
                f(self.bindings.user_data, entity.get(), &FfiVec2::from(velocity));
                true
            }
            None => false,
        }
    }

    pub fn tilemap_size(&self, entity: void_core::EntityId) -> Option<(i32, i32)> {
        let f = self.bindings.tilemap_get_size?;
        let (mut width, mut height) = (0, 0);
        f(self.bindings.user_data, entity.get(), &mut width, &mut height);
        Some((width, height))
    }

    pub fn set_tilemap_size(&self, entity: void_core::EntityId, width: i32, height: i32) -> bool {
        match self.bindings.tilemap_set_size {
            Some(f) => {
                f(self.bindings.user_data, entity.get(), width, height);
                true
            }
            None => false,
        }
    }

    pub fn tile(&self, entity: void_core::EntityId, x: i32, y: i32) -> Option<i32> {
        let f = self.bindings.tilemap_get_tile?;
        Some(f(self.bindings.user_data, entity.get(), x, y))
    }

    pub fn set_tile(&self, entity: void_core::EntityId, x: i32, y: i32, tile: i32) -> bool {
        match self.bindings.tilemap_set_tile {
            Some(f) => {
                f(self.bindings.user_data, entity.get(), x, y, tile);
                true
            }
            None => false,
        }
    }

    /// Cast a ray; `Some(None)` means the call ran but hit nothing
    pub fn raycast(&self, origin: Vec2, direction: Vec2) -> Option<Option<RaycastHit>> {
        let f = self.bindings.raycast?;
        let mut out = FfiRaycastHit2D::default();
        f(self.bindings.user_data, &FfiVec2::from(origin), &FfiVec2::from(direction), &mut out);
        Some((out.hit != 0).then(|| RaycastHit {
            point: out.point.into(),
            normal: out.normal.into(),
            distance: out.distance,
            entity: void_core::EntityId::new(out.entity_id),
        }))
    }
}
