use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::hint::{Hint, NameError};
use crate::runtime::class::ClassRef;
use crate::runtime::value::Value;

#[derive(Debug, Clone)]
pub enum ModuleAttr {
    Class(ClassRef),
    /// A submodule, by its fully qualified name.
    Module(String),
    Hint(Hint),
    Value(Value),
}

/// A named, mutable attribute table. Attributes may be added after hints that
/// reference them were compiled.
#[derive(Debug)]
pub struct Module {
    name: String,
    attrs: Mutex<BTreeMap<String, ModuleAttr>>,
}

impl Module {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            attrs: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set(&self, name: &str, attr: ModuleAttr) {
        let mut attrs = self.attrs.lock().unwrap_or_else(|e| e.into_inner());
        attrs.insert(name.to_string(), attr);
    }

    pub fn define_class(&self, class: &ClassRef) {
        self.set(class.name(), ModuleAttr::Class(class.clone()));
    }

    pub fn get(&self, name: &str) -> Option<ModuleAttr> {
        let attrs = self.attrs.lock().unwrap_or_else(|e| e.into_inner());
        attrs.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let attrs = self.attrs.lock().unwrap_or_else(|e| e.into_inner());
        attrs.keys().cloned().collect()
    }

    /// Evaluate `name` as a hint in this module's namespace, the way a lazily
    /// evaluated alias body would.
    pub fn hint(&self, name: &str) -> Result<Hint, NameError> {
        match self.get(name) {
            Some(ModuleAttr::Class(cls)) => Ok(Hint::class(&cls)),
            Some(ModuleAttr::Hint(h)) => Ok(h),
            Some(ModuleAttr::Value(v)) => Ok(Hint::object(v)),
            Some(ModuleAttr::Module(_)) | None => Err(NameError::new(name)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportError {
    pub module: String,
    pub message: String,
}

impl std::error::Error for ImportError {}

impl Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot import module {:?}: {}", self.module, self.message)
    }
}

/// "Import a module by name", as consumed by forward-reference resolution.
pub trait ModuleLoader: Send + Sync {
    fn import_module(&self, name: &str) -> Result<Arc<Module>, ImportError>;
}

#[derive(Default)]
pub struct ModuleTable {
    modules: Mutex<BTreeMap<String, Arc<Module>>>,
}

static GLOBAL_MODULES: Lazy<Arc<ModuleTable>> = Lazy::new(|| Arc::new(ModuleTable::new()));

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> Arc<ModuleTable> {
        GLOBAL_MODULES.clone()
    }

    /// Get or create the module called `name`, registering it as an attribute of
    /// its parent package when one exists.
    pub fn module(&self, name: &str) -> Arc<Module> {
        let module = {
            let mut modules = self.modules.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(m) = modules.get(name) {
                return m.clone();
            }
            let m = Module::new(name);
            modules.insert(name.to_string(), m.clone());
            m
        };
        if let Some((parent, leaf)) = name.rsplit_once('.') {
            self.module(parent)
                .set(leaf, ModuleAttr::Module(name.to_string()));
        }
        module
    }

    pub fn get(&self, name: &str) -> Option<Arc<Module>> {
        let modules = self.modules.lock().unwrap_or_else(|e| e.into_inner());
        modules.get(name).cloned()
    }

    pub fn module_names(&self) -> Vec<String> {
        let modules = self.modules.lock().unwrap_or_else(|e| e.into_inner());
        modules.keys().cloned().collect()
    }
}

impl ModuleLoader for ModuleTable {
    fn import_module(&self, name: &str) -> Result<Arc<Module>, ImportError> {
        self.get(name).ok_or_else(|| ImportError {
            module: name.to_string(),
            message: "no module by that name".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_module_registers_on_parent() {
        let table = ModuleTable::new();
        let _ = table.module("pkg.sub");
        let parent = table.import_module("pkg").expect("parent exists");
        assert!(matches!(parent.get("sub"), Some(ModuleAttr::Module(n)) if n == "pkg.sub"));
    }

    #[test]
    fn missing_module_is_import_error() {
        let table = ModuleTable::new();
        let err = table.import_module("nope").expect_err("must fail");
        assert_eq!(err.module, "nope");
    }

    #[test]
    fn hint_lookup_reports_missing_name() {
        let m = Module::new("app");
        let err = m.hint("Later").expect_err("not defined yet");
        assert_eq!(err.name, "Later");
    }
}
