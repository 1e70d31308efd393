//! Loaded script modules
//!
//! A module is one unit of compiled script code. Loading it yields a
//! [`ScriptModule`]: module metadata plus every type the module declares,
//! each already turned into a class descriptor (or the reason it could not
//! be). The [`ModuleContext`] is the shared ownership root that keeps the
//! module's code mapped while anything built from it is still alive.

use crate::class::{ClassBuilder, ScriptClass, ScriptObject};
use crate::error::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use void_core::Version;

/// Ownership root of one loaded module
///
/// Classes hold an `Arc` to their context and instances hold their class, so
/// the underlying library stays mapped until the last instance built from
/// it is gone. Unloading only flips [`ModuleContext::is_unloaded`]; actual
/// reclamation happens whenever the last reference drops.
pub struct ModuleContext {
    name: String,
    generation: u64,
    unloaded: AtomicBool,
    library: Option<libloading::Library>,
    shadow_files: Vec<PathBuf>,
}

impl ModuleContext {
    pub(crate) fn new(
        name: impl Into<String>,
        generation: u64,
        library: Option<libloading::Library>,
        shadow_files: Vec<PathBuf>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            generation,
            unloaded: AtomicBool::new(false),
            library,
            shadow_files,
        })
    }

    /// A context with no backing library (statically linked scripts)
    pub fn detached(name: impl Into<String>) -> Arc<Self> {
        Self::new(name, 0, None, Vec::new())
    }

    /// Module name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load counter value this module was loaded under
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the coordinator has unloaded this module
    pub fn is_unloaded(&self) -> bool {
        self.unloaded.load(Ordering::Acquire)
    }

    pub(crate) fn mark_unloaded(&self) {
        self.unloaded.store(true, Ordering::Release);
    }

    /// Whether the module is backed by a dynamic library
    pub fn is_dynamic(&self) -> bool {
        self.library.is_some()
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("name", &self.name)
            .field("generation", &self.generation)
            .field("unloaded", &self.is_unloaded())
            .field("dynamic", &self.is_dynamic())
            .finish()
    }
}

impl Drop for ModuleContext {
    fn drop(&mut self) {
        // Library first: shadow copies cannot be removed while mapped on
        // every platform.
        drop(self.library.take());
        for file in &self.shadow_files {
            if let Err(e) = std::fs::remove_file(file) {
                log::debug!("Could not remove shadow copy {}: {}", file.display(), e);
            }
        }
        log::debug!("Module '{}' (generation {}) reclaimed", self.name, self.generation);
    }
}

/// Metadata about a loaded module
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    /// Module name
    pub name: String,
    /// Path the module was requested from
    pub path: PathBuf,
    /// Version the module declares
    pub version: Version,
    /// Companion debug-symbol file, when one was found and attached
    pub debug_symbols: Option<PathBuf>,
    /// Load counter value
    pub generation: u64,
}

/// What kind of type a module declares
pub enum TypeKind {
    /// Concrete script entity class, or why its description was rejected
    ScriptClass(Result<ScriptClass>),
    /// Abstract script base; never instantiated
    Abstract,
    /// Interface; never instantiated
    Interface,
    /// Concrete type that is not a script entity
    Plain,
}

/// One type declared by a module
pub struct TypeEntry {
    pub name: String,
    pub kind: TypeKind,
}

/// The result of loading a module
pub struct ScriptModule {
    pub info: ModuleInfo,
    pub types: Vec<TypeEntry>,
    context: Arc<ModuleContext>,
}

impl ScriptModule {
    /// Ownership root shared by this module's classes
    pub fn context(&self) -> &Arc<ModuleContext> {
        &self.context
    }
}

impl fmt::Debug for ScriptModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptModule")
            .field("info", &self.info)
            .field("types", &self.types.len())
            .finish()
    }
}

/// Receives a module's type declarations while it is being loaded
///
/// Module code gets a `&mut ModuleBuilder` from its registration function
/// and declares every type it defines.
pub struct ModuleBuilder {
    info: ModuleInfo,
    types: Vec<TypeEntry>,
    context: Arc<ModuleContext>,
}

impl ModuleBuilder {
    pub(crate) fn new(context: Arc<ModuleContext>, path: &Path, debug_symbols: Option<PathBuf>) -> Self {
        Self {
            info: ModuleInfo {
                name: context.name().to_string(),
                path: path.to_path_buf(),
                version: Version::default(),
                debug_symbols,
                generation: context.generation(),
            },
            types: Vec::new(),
            context,
        }
    }

    /// Set the module's display name
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.info.name = name.into();
        self
    }

    /// Set the module's version
    pub fn version(&mut self, version: Version) -> &mut Self {
        self.info.version = version;
        self
    }

    /// Declare a concrete script class
    pub fn class<C: ScriptObject>(&mut self, class: ClassBuilder<C>) -> &mut Self {
        let name = class.full_name().to_string();
        let built = class.build(self.context.clone());
        self.types.push(TypeEntry {
            name,
            kind: TypeKind::ScriptClass(built),
        });
        self
    }

    /// Declare an abstract script base type
    pub fn abstract_type(&mut self, name: impl Into<String>) -> &mut Self {
        self.push(name, TypeKind::Abstract)
    }

    /// Declare an interface
    pub fn interface(&mut self, name: impl Into<String>) -> &mut Self {
        self.push(name, TypeKind::Interface)
    }

    /// Declare a helper type that is not a script entity
    pub fn plain_type(&mut self, name: impl Into<String>) -> &mut Self {
        self.push(name, TypeKind::Plain)
    }

    fn push(&mut self, name: impl Into<String>, kind: TypeKind) -> &mut Self {
        self.types.push(TypeEntry { name: name.into(), kind });
        self
    }

    pub(crate) fn finish(self) -> ScriptModule {
        ScriptModule {
            info: self.info,
            types: self.types,
            context: self.context,
        }
    }
}
