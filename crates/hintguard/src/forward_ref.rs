//! Forward references: lazily resolving stand-ins for classes that may not exist yet.
//!
//! A [`ForwardRef`] is keyed by `(module_name, attr_path)` and is unique per key
//! within one [`ForwardRefRegistry`]. Resolution imports the module through the
//! registry's [`ModuleLoader`], walks the dotted path, and caches the class it finds.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::error::{HintError, HintErrorKind};
use crate::hint::HintKind;
use crate::runtime::class::{builtins, ClassRef};
use crate::runtime::module::{Module, ModuleAttr, ModuleLoader};
use crate::runtime::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ForwardRefKey {
    pub module_name: String,
    pub attr_path: String,
}

pub struct ForwardRef {
    key: ForwardRefKey,
    registry: Weak<RegistryInner>,
}

impl fmt::Debug for ForwardRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ForwardRef({}:{})",
            self.key.module_name, self.key.attr_path
        )
    }
}

/// Dunder names never chain; probing them on an unresolved proxy must fail like
/// any missing attribute.
pub fn is_reserved_attr(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

impl ForwardRef {
    pub fn key(&self) -> &ForwardRefKey {
        &self.key
    }

    pub fn module_name(&self) -> &str {
        &self.key.module_name
    }

    pub fn attr_path(&self) -> &str {
        &self.key.attr_path
    }

    fn registry(&self) -> Result<ForwardRefRegistry, HintError> {
        self.registry
            .upgrade()
            .map(|inner| ForwardRefRegistry { inner })
            .ok_or_else(|| {
                HintError::new(
                    HintErrorKind::ForwardRefResolution,
                    format!(
                        "forward reference {:?} outlived its registry",
                        self.key.attr_path
                    ),
                )
            })
    }

    pub fn is_resolved(&self) -> bool {
        self.registry()
            .map(|r| r.resolved(&self.key).is_some())
            .unwrap_or(false)
    }

    /// Proxy for `self.<name>`, supporting dotted references resolved one segment
    /// at a time.
    pub fn extend_path(&self, name: &str) -> Result<Arc<ForwardRef>, HintError> {
        if is_reserved_attr(name) {
            return Err(HintError::new(
                HintErrorKind::ForwardRefResolution,
                format!(
                    "forward reference {:?} has no attribute {name:?}",
                    self.key.attr_path
                ),
            ));
        }
        let registry = self.registry()?;
        Ok(registry.make_forward_ref(
            &self.key.module_name,
            &format!("{}.{name}", self.key.attr_path),
        ))
    }

    pub fn resolve(&self) -> Result<ClassRef, HintError> {
        let registry = self.registry()?;
        if let Some(cls) = registry.resolved(&self.key) {
            return Ok(cls);
        }
        let cls = registry.import_referent(&self.key)?;
        registry.set_resolved(&self.key, &cls);
        tracing::debug!(
            target: "hintguard::forward_ref",
            module = %self.key.module_name,
            path = %self.key.attr_path,
            referent = %cls.qualname(),
            "resolved forward reference"
        );
        Ok(cls)
    }

    pub fn is_instance(&self, value: &Value) -> Result<bool, HintError> {
        Ok(self.resolve()?.is_instance(value))
    }

    pub fn is_subclass(&self, value: &Value) -> Result<bool, HintError> {
        let cls = self.resolve()?;
        match value {
            Value::Class(sub) => Ok(sub.is_subclass(&cls)),
            _ => Ok(false),
        }
    }
}

struct RegistryInner {
    loader: Arc<dyn ModuleLoader>,
    proxies: Mutex<HashMap<ForwardRefKey, Arc<ForwardRef>>>,
    resolved: Mutex<HashMap<ForwardRefKey, ClassRef>>,
}

/// Proxy cache plus resolved-referent cache, shareable across threads.
#[derive(Clone)]
pub struct ForwardRefRegistry {
    inner: Arc<RegistryInner>,
}

impl ForwardRefRegistry {
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                loader,
                proxies: Mutex::new(HashMap::new()),
                resolved: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The unique proxy for `(module_name, attr_path)`.
    pub fn make_forward_ref(&self, module_name: &str, attr_path: &str) -> Arc<ForwardRef> {
        let key = ForwardRefKey {
            module_name: module_name.to_string(),
            attr_path: attr_path.to_string(),
        };
        let mut proxies = self.inner.proxies.lock().unwrap_or_else(|e| e.into_inner());
        proxies
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(ForwardRef {
                    key,
                    registry: Arc::downgrade(&self.inner),
                })
            })
            .clone()
    }

    /// Proxy for an absolute dotted name: everything before the last dot is the
    /// module.
    pub fn make_absolute(&self, dotted: &str) -> Option<Arc<ForwardRef>> {
        let (module, attr) = dotted.rsplit_once('.')?;
        if module.is_empty() || attr.is_empty() {
            return None;
        }
        Some(self.make_forward_ref(module, attr))
    }

    pub fn resolved(&self, key: &ForwardRefKey) -> Option<ClassRef> {
        let resolved = self.inner.resolved.lock().unwrap_or_else(|e| e.into_inner());
        resolved.get(key).cloned()
    }

    pub fn set_resolved(&self, key: &ForwardRefKey, cls: &ClassRef) {
        let mut resolved = self.inner.resolved.lock().unwrap_or_else(|e| e.into_inner());
        resolved.insert(key.clone(), cls.clone());
    }

    /// Forget every resolved referent (hot reload). Proxies stay valid and
    /// re-resolve on next use.
    pub fn clear_resolved(&self) {
        let mut resolved = self.inner.resolved.lock().unwrap_or_else(|e| e.into_inner());
        resolved.clear();
    }

    pub fn proxy_count(&self) -> usize {
        let proxies = self.inner.proxies.lock().unwrap_or_else(|e| e.into_inner());
        proxies.len()
    }

    fn import_referent(&self, key: &ForwardRefKey) -> Result<ClassRef, HintError> {
        let fail = |detail: String| {
            HintError::new(
                HintErrorKind::ForwardRefResolution,
                format!(
                    "forward reference {:?} in module {:?} unresolvable: {detail}",
                    key.attr_path, key.module_name
                ),
            )
        };

        tracing::trace!(
            target: "hintguard::forward_ref",
            module = %key.module_name,
            "importing module for forward reference"
        );
        let module = self
            .inner
            .loader
            .import_module(&key.module_name)
            .map_err(|e| fail(e.to_string()))?;

        let segments: Vec<&str> = key.attr_path.split('.').collect();
        let mut current: Arc<Module> = module;
        let mut found: Option<ModuleAttr> = None;
        for (i, segment) in segments.iter().enumerate() {
            let attr = match current.get(segment) {
                Some(attr) => attr,
                None if segments.len() == 1 => match builtins().by_name(segment) {
                    Some(cls) => ModuleAttr::Class(cls),
                    None => {
                        return Err(fail(format!(
                            "module {:?} has no attribute {segment:?}",
                            current.name()
                        )))
                    }
                },
                None => {
                    return Err(fail(format!(
                        "module {:?} has no attribute {segment:?}",
                        current.name()
                    )))
                }
            };
            let is_last = i + 1 == segments.len();
            match attr {
                ModuleAttr::Module(name) if !is_last => {
                    current = self
                        .inner
                        .loader
                        .import_module(&name)
                        .map_err(|e| fail(e.to_string()))?;
                }
                other if is_last => found = Some(other),
                _ => {
                    return Err(fail(format!(
                        "attribute {segment:?} of module {:?} is not a module",
                        current.name()
                    )))
                }
            }
        }

        match found {
            Some(ModuleAttr::Class(cls)) => Ok(cls),
            Some(ModuleAttr::Hint(h)) => match h.kind() {
                HintKind::Class(cls) => Ok(cls.clone()),
                HintKind::ForwardRefProxy(proxy) if proxy.key == *key => {
                    Err(fail("refers to itself".to_string()))
                }
                _ => Err(fail(format!("{} is not a class", h.repr()))),
            },
            Some(ModuleAttr::Value(v)) => Err(fail(format!("{} is not a class", v.repr()))),
            Some(ModuleAttr::Module(name)) => Err(fail(format!("module {name:?} is not a class"))),
            None => Err(fail("empty attribute path".to_string())),
        }
    }
}
