use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::assemble::{assemble, AssembleRequest, Checker};
use crate::codegen::{CheckCode, CodeCache, CodeGenerator};
use crate::config::CheckConfig;
use crate::error::HintError;
use crate::forward_ref::ForwardRefRegistry;
use crate::hint::Hint;
use crate::runtime::module::{ModuleLoader, ModuleTable};
use crate::sign::SignRegistry;
use crate::violation::{DefaultReporter, ViolationReporter};

/// Configuration plus the caches shared by every check it builds.
pub struct Engine {
    config: CheckConfig,
    signs: &'static SignRegistry,
    registry: ForwardRefRegistry,
    cache: CodeCache,
    reporter: Arc<dyn ViolationReporter>,
}

static GLOBAL_ENGINE: Lazy<Engine> = Lazy::new(|| Engine::new(ModuleTable::global()));

impl Engine {
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            config: CheckConfig::default(),
            signs: SignRegistry::builtin(),
            registry: ForwardRefRegistry::new(loader),
            cache: CodeCache::new(),
            reporter: Arc::new(DefaultReporter),
        }
    }

    /// Process-wide engine over [`ModuleTable::global`].
    pub fn global() -> &'static Engine {
        &GLOBAL_ENGINE
    }

    pub fn with_config(mut self, config: CheckConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ViolationReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    pub fn registry(&self) -> &ForwardRefRegistry {
        &self.registry
    }

    pub fn signs(&self) -> &SignRegistry {
        self.signs
    }

    pub fn cache(&self) -> &CodeCache {
        &self.cache
    }

    /// Generated code for `hint`, memoized by hint identity. `None` means the hint
    /// is ignorable and needs no check.
    pub fn make_check_code(
        &self,
        hint: &Hint,
        exception_prefix: &str,
    ) -> Result<Option<Arc<CheckCode>>, HintError> {
        if let Some(hit) = self.cache.get(hint, &self.config) {
            tracing::trace!(target: "hintguard::codegen", hint = %hint, "code cache hit");
            return Ok(hit);
        }
        tracing::trace!(target: "hintguard::codegen", hint = %hint, "code cache miss");
        let code = CodeGenerator {
            signs: self.signs,
            config: &self.config,
            registry: &self.registry,
            exception_prefix,
        }
        .generate(hint)?
        .map(Arc::new);
        self.cache.insert(hint, &self.config, code.clone());
        Ok(code)
    }

    /// Generate (or reuse) code for `hint` and specialize it for one slot.
    pub fn checker(
        &self,
        hint: &Hint,
        slot: &str,
        module_name: &str,
        exception_prefix: &str,
    ) -> Result<Option<Checker>, HintError> {
        let Some(code) = self.make_check_code(hint, exception_prefix)? else {
            return Ok(None);
        };
        let request = AssembleRequest {
            slot,
            module_name,
            exception_prefix,
        };
        assemble(&code, &request, &self.registry, self.reporter.clone()).map(Some)
    }

    /// Drop generated code and every resolved forward reference.
    pub fn clear_caches(&self) {
        self.cache.clear();
        self.registry.clear_resolved();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::class::builtins;

    #[test]
    fn generation_is_memoized_by_identity() {
        let engine = Engine::new(Arc::new(ModuleTable::new()));
        let hint = Hint::list(Hint::class(&builtins().int));
        let a = engine.make_check_code(&hint, "").expect("gen").expect("code");
        let b = engine.make_check_code(&hint, "").expect("gen").expect("code");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(engine.cache().len(), 1);

        let rebuilt = Hint::list(Hint::class(&builtins().int));
        let c = engine
            .make_check_code(&rebuilt, "")
            .expect("gen")
            .expect("code");
        assert_eq!(a.template, c.template);
    }

    #[test]
    fn ignorable_results_are_cached_too() {
        let engine = Engine::new(Arc::new(ModuleTable::new()));
        let any = Hint::any();
        assert!(engine.make_check_code(&any, "").expect("gen").is_none());
        assert_eq!(engine.cache().len(), 1);
        engine.clear_caches();
        assert!(engine.cache().is_empty());
    }
}
