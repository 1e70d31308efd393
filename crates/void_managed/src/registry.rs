//! Class registry
//!
//! Maps class names to the descriptors discovered in the currently loaded
//! module. Rebuilt from scratch on every load.

use crate::class::ScriptClass;
use crate::module::{ScriptModule, TypeKind};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of instantiable script classes
#[derive(Default)]
pub struct ClassRegistry {
    /// Full and short names map to the same descriptor
    classes: HashMap<String, Arc<ScriptClass>>,
    /// Fully-qualified names in discovery order
    full_names: Vec<String>,
}

impl ClassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every concrete script class of `module`
    ///
    /// Types are processed independently: a type whose description was
    /// rejected is logged and skipped. Returns the number of classes added.
    pub fn register(&mut self, module: ScriptModule) -> usize {
        let module_name = module.info.name.clone();
        let mut registered = 0;

        for entry in module.types {
            let class = match entry.kind {
                TypeKind::ScriptClass(Ok(class)) => Arc::new(class),
                TypeKind::ScriptClass(Err(e)) => {
                    log::warn!("Skipping '{}' in module '{}': {}", entry.name, module_name, e);
                    continue;
                }
                TypeKind::Abstract | TypeKind::Interface | TypeKind::Plain => continue,
            };

            let full_name = class.full_name().to_string();
            let short_name = class.short_name().to_string();

            if let Some(previous) = self.classes.get(&short_name) {
                if previous.full_name() != full_name {
                    log::debug!(
                        "Short name '{}' now resolves to '{}' instead of '{}'",
                        short_name,
                        full_name,
                        previous.full_name()
                    );
                }
            }

            if !self.full_names.contains(&full_name) {
                self.full_names.push(full_name.clone());
            }
            self.classes.insert(full_name.clone(), class.clone());
            // An exact full name is never shadowed by another class's short name
            if short_name == full_name || !self.full_names.contains(&short_name) {
                self.classes.insert(short_name, class);
            }

            log::info!("Registered script class '{}'", full_name);
            registered += 1;
        }

        registered
    }

    /// Exact-name lookup by full or short name
    pub fn lookup(&self, name: &str) -> Option<Arc<ScriptClass>> {
        self.classes.get(name).cloned()
    }

    /// Whether `name` resolves to a class
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Fully-qualified names of every registered class
    pub fn class_names(&self) -> &[String] {
        &self.full_names
    }

    /// Number of distinct classes
    pub fn len(&self) -> usize {
        self.full_names.len()
    }

    /// Whether no class is registered
    pub fn is_empty(&self) -> bool {
        self.full_names.is_empty()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.classes.clear();
        self.full_names.clear();
    }
}
