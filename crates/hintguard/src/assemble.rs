//! Specialize a cached, slot-agnostic [`CheckCode`] for one parameter or return
//! slot of one callable.

use std::sync::Arc;

use crate::codegen::CheckCode;
use crate::error::{CheckError, HintError, HintErrorKind};
use crate::expr::{self, Env, EvalFailure, Expr, Obj};
use crate::forward_ref::ForwardRefRegistry;
use crate::hint::Hint;
use crate::language::{self, PITH_ROOT_PLACEHOLDER};
use crate::random::{with_thread_random, RandomIndexSource};
use crate::runtime::value::Value;
use crate::scope::Scope;
use crate::violation::{ViolationContext, ViolationReporter};

/// Names generated code reserves for itself.
pub fn is_reserved_slot(name: &str) -> bool {
    name == language::NAME_RANDOM
        || name == language::NAME_HINT_ROOT
        || name == language::NAME_VIOLATION
        || matches!(name, "isinstance" | "issubclass" | "len")
        || name.starts_with(language::PITH_LOCAL_PREFIX)
        || name.starts_with("__hint_")
}

pub struct AssembleRequest<'a> {
    /// Parameter name, or `__return`.
    pub slot: &'a str,
    /// Module relative forward references resolve against.
    pub module_name: &'a str,
    pub exception_prefix: &'a str,
}

/// A compiled check for one slot.
pub struct Checker {
    slot: String,
    exception_prefix: String,
    source: String,
    expr: Expr,
    scope: Scope,
    hint: Hint,
    needs_random_index: bool,
    reporter: Arc<dyn ViolationReporter>,
    // Proxies in `scope` only hold a weak handle to their registry.
    _registry: ForwardRefRegistry,
}

pub fn assemble(
    code: &CheckCode,
    request: &AssembleRequest<'_>,
    registry: &ForwardRefRegistry,
    reporter: Arc<dyn ViolationReporter>,
) -> Result<Checker, HintError> {
    let slot = request.slot;
    if slot != language::NAME_RETURN
        && (!language::is_identifier(slot) || language::is_keyword(slot) || is_reserved_slot(slot))
    {
        return Err(HintError::unsupported(format!(
            "{}name {slot:?} cannot be used as a checked slot",
            request.exception_prefix
        )));
    }

    let mut source = code.template.replace(PITH_ROOT_PLACEHOLDER, slot);
    let mut scope = code.scope.clone();
    for name in &code.forward_ref_names {
        let proxy = registry.make_forward_ref(request.module_name, name);
        let scope_name = scope.add_forward_ref(&proxy);
        source = source.replace(&language::forward_ref_placeholder(name), &scope_name);
    }

    let expr = expr::parse(&source).map_err(|err| {
        HintError::new(
            HintErrorKind::Internal,
            format!(
                "{}generated check for {} does not parse: {err}\n{source}",
                request.exception_prefix, code.hint
            ),
        )
    })?;

    tracing::debug!(
        target: "hintguard::assemble",
        slot,
        module = request.module_name,
        hint = %code.hint,
        forward_refs = code.forward_ref_names.len(),
        "assembled checker"
    );

    Ok(Checker {
        slot: slot.to_string(),
        exception_prefix: request.exception_prefix.to_string(),
        source,
        expr,
        scope,
        hint: code.hint.clone(),
        needs_random_index: code.needs_random_index,
        reporter,
        _registry: registry.clone(),
    })
}

impl Checker {
    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Final check source with every placeholder substituted.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn hint(&self) -> &Hint {
        &self.hint
    }

    pub fn needs_random_index(&self) -> bool {
        self.needs_random_index
    }

    /// Check `pith`, sampling with this thread's random source.
    pub fn check(&self, pith: &Value) -> Result<(), CheckError> {
        if self.needs_random_index {
            with_thread_random(|rng| self.check_with(pith, rng))
        } else {
            self.run(pith, None)
        }
    }

    pub fn check_with(
        &self,
        pith: &Value,
        rng: &mut dyn RandomIndexSource,
    ) -> Result<(), CheckError> {
        let random = if self.needs_random_index {
            Some(rng.next_index())
        } else {
            None
        };
        self.run(pith, random)
    }

    pub fn is_valid(&self, pith: &Value) -> Result<bool, HintError> {
        match self.check(pith) {
            Ok(()) => Ok(true),
            Err(CheckError::Violation(_)) => Ok(false),
            Err(CheckError::Hint(err)) => Err(err),
            Err(other) => Err(HintError::internal(other.to_string())),
        }
    }

    fn run(&self, pith: &Value, random: Option<u32>) -> Result<(), CheckError> {
        let mut env = Env::new(&self.scope);
        env.bind(&self.slot, Obj::Value(pith.clone()));
        if let Some(r) = random {
            env.bind(language::NAME_RANDOM, Obj::Value(Value::Int(i64::from(r))));
        }
        match env.eval(&self.expr) {
            Ok(_) => Ok(()),
            Err(EvalFailure::Violation {
                pith,
                hint,
                random_index,
            }) => Err(CheckError::Violation(self.reporter.report(
                &ViolationContext {
                    exception_prefix: &self.exception_prefix,
                    slot: &self.slot,
                    pith: &pith,
                    hint: &hint,
                    random_index,
                },
            ))),
            Err(EvalFailure::Error(err)) => Err(CheckError::Hint(
                err.with_context(&self.exception_prefix),
            )),
        }
    }
}

impl std::fmt::Debug for Checker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checker")
            .field("slot", &self.slot)
            .field("hint", &self.hint)
            .field("source", &self.source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::CodeGenerator;
    use crate::config::CheckConfig;
    use crate::random::XorShiftRandom;
    use crate::runtime::class::{builtins, ClassRef};
    use crate::runtime::module::ModuleTable;
    use crate::sign::SignRegistry;
    use crate::violation::DefaultReporter;

    fn checker(hint: &Hint, table: &Arc<ModuleTable>, slot: &str) -> Checker {
        let registry = ForwardRefRegistry::new(table.clone());
        let config = CheckConfig::default();
        let code = CodeGenerator {
            signs: SignRegistry::builtin(),
            config: &config,
            registry: &registry,
            exception_prefix: "",
        }
        .generate(hint)
        .expect("generate")
        .expect("not ignorable");
        assemble(
            &code,
            &AssembleRequest {
                slot,
                module_name: "app",
                exception_prefix: "",
            },
            &registry,
            Arc::new(DefaultReporter),
        )
        .expect("assemble")
    }

    #[test]
    fn slot_name_replaces_pith_placeholder() {
        let table = Arc::new(ModuleTable::new());
        let c = checker(&Hint::class(&builtins().int), &table, "x");
        assert!(c.source().contains("isinstance(x, __hint_type_0)"));
        assert!(c.check(&Value::Int(1)).is_ok());
        let err = c.check(&Value::str("no")).expect_err("violation");
        assert_eq!(err.as_violation().expect("violation").slot, "x");
    }

    #[test]
    fn relative_forward_ref_resolves_against_callable_module() {
        let table = Arc::new(ModuleTable::new());
        let c = checker(&Hint::forward_ref("Foo"), &table, "x");
        assert!(c.source().contains("__hint_fwd_0.is_instance(x)"));

        let foo = ClassRef::builder("app", "Foo").build();
        table.module("app").define_class(&foo);
        assert!(c.check(&Value::instance(&foo)).is_ok());
        assert!(c.check(&Value::Int(1)).is_err());
    }

    #[test]
    fn unresolvable_forward_ref_is_reported_at_check_time() {
        let table = Arc::new(ModuleTable::new());
        table.module("app");
        let c = checker(&Hint::forward_ref("Missing"), &table, "x");
        let err = c.check(&Value::Int(1)).expect_err("unresolved");
        assert!(matches!(
            err,
            CheckError::Hint(HintError {
                kind: HintErrorKind::ForwardRefResolution,
                ..
            })
        ));
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let table = Arc::new(ModuleTable::new());
        let c = checker(&Hint::list(Hint::class(&builtins().int)), &table, "xs");
        let pith = Value::list(vec![Value::Int(1), Value::Int(2), Value::str("x")]);
        let run = |seed| {
            let mut rng = XorShiftRandom::seeded(seed);
            (0..50)
                .map(|_| c.check_with(&pith, &mut rng).is_ok())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(9), run(9));
    }

    #[test]
    fn reserved_slot_names_are_rejected() {
        let table = Arc::new(ModuleTable::new());
        let registry = ForwardRefRegistry::new(table);
        let config = CheckConfig::default();
        let code = CodeGenerator {
            signs: SignRegistry::builtin(),
            config: &config,
            registry: &registry,
            exception_prefix: "",
        }
        .generate(&Hint::class(&builtins().int))
        .expect("generate")
        .expect("code");
        let err = assemble(
            &code,
            &AssembleRequest {
                slot: "__pith_0",
                module_name: "app",
                exception_prefix: "",
            },
            &registry,
            Arc::new(DefaultReporter),
        )
        .expect_err("reserved");
        assert_eq!(err.kind, HintErrorKind::Unsupported);
    }
}
