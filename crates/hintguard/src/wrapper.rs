//! Callable wrapping: one checker per annotated parameter plus the return value.

use crate::assemble::Checker;
use crate::engine::Engine;
use crate::error::{CheckError, HintError, HintErrorKind};
use crate::hint::Hint;
use crate::language;
use crate::random::{with_thread_random, RandomIndexSource};
use crate::runtime::value::Value;

#[derive(Debug, Clone)]
pub struct ParamSig {
    pub name: String,
    pub hint: Option<Hint>,
}

impl ParamSig {
    pub fn new(name: &str, hint: Hint) -> Self {
        Self {
            name: name.to_string(),
            hint: Some(hint),
        }
    }

    pub fn untyped(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hint: None,
        }
    }
}

/// The annotated signature of a callable defined in `module`.
#[derive(Debug, Clone)]
pub struct CallableSig {
    pub module: String,
    pub qualname: String,
    pub params: Vec<ParamSig>,
    pub returns: Option<Hint>,
}

impl CallableSig {
    pub fn new(module: &str, qualname: &str) -> Self {
        Self {
            module: module.to_string(),
            qualname: qualname.to_string(),
            params: Vec::new(),
            returns: None,
        }
    }

    pub fn param(mut self, name: &str, hint: Hint) -> Self {
        self.params.push(ParamSig::new(name, hint));
        self
    }

    pub fn untyped_param(mut self, name: &str) -> Self {
        self.params.push(ParamSig::untyped(name));
        self
    }

    pub fn returns(mut self, hint: Hint) -> Self {
        self.returns = Some(hint);
        self
    }

    fn display_name(&self) -> String {
        format!("{}.{}", self.module, self.qualname)
    }
}

#[derive(Debug)]
pub struct TypedCallable {
    name: String,
    params: Vec<(String, Option<Checker>)>,
    returns: Option<Checker>,
}

impl Engine {
    /// Build the checks for every annotated slot of `sig`.
    pub fn wrap(&self, sig: &CallableSig) -> Result<TypedCallable, HintError> {
        let name = sig.display_name();
        let mut params = Vec::with_capacity(sig.params.len());
        for param in &sig.params {
            let prefix = format!("Function {name}() parameter {:?} ", param.name);
            let checker = match &param.hint {
                None => None,
                Some(hint) => {
                    let code = self.make_check_code(hint, &prefix)?;
                    let root_sign = code.as_ref().and_then(|c| c.root_sign);
                    if root_sign.is_some_and(|s| self.signs().is_root_only(s)) {
                        return Err(HintError::new(
                            HintErrorKind::Misplaced,
                            format!("{prefix}type hint {hint} is only valid as a return hint"),
                        ));
                    }
                    self.checker(hint, &param.name, &sig.module, &prefix)?
                }
            };
            params.push((param.name.clone(), checker));
        }

        let returns = match &sig.returns {
            None => None,
            Some(hint) => {
                let prefix = format!("Function {name}() return ");
                self.checker(hint, language::NAME_RETURN, &sig.module, &prefix)?
            }
        };

        tracing::debug!(
            target: "hintguard::assemble",
            callable = %name,
            checked_params = params.iter().filter(|(_, c)| c.is_some()).count(),
            checked_return = returns.is_some(),
            "wrapped callable"
        );
        Ok(TypedCallable {
            name,
            params,
            returns,
        })
    }
}

impl TypedCallable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn param_checker(&self, name: &str) -> Option<&Checker> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, c)| c.as_ref())
    }

    pub fn return_checker(&self) -> Option<&Checker> {
        self.returns.as_ref()
    }

    pub fn check_args(&self, args: &[Value]) -> Result<(), CheckError> {
        with_thread_random(|rng| self.check_args_with(args, rng))
    }

    pub fn check_args_with(
        &self,
        args: &[Value],
        rng: &mut dyn RandomIndexSource,
    ) -> Result<(), CheckError> {
        if args.len() != self.params.len() {
            return Err(CheckError::Arity {
                callable: self.name.clone(),
                expected: self.params.len(),
                got: args.len(),
            });
        }
        for ((_, checker), arg) in self.params.iter().zip(args) {
            if let Some(checker) = checker {
                checker.check_with(arg, rng)?;
            }
        }
        Ok(())
    }

    pub fn check_return(&self, value: &Value) -> Result<(), CheckError> {
        with_thread_random(|rng| self.check_return_with(value, rng))
    }

    pub fn check_return_with(
        &self,
        value: &Value,
        rng: &mut dyn RandomIndexSource,
    ) -> Result<(), CheckError> {
        match &self.returns {
            Some(checker) => checker.check_with(value, rng),
            None => Ok(()),
        }
    }

    /// Check `args`, invoke `f`, then check what it returned.
    pub fn call<F>(&self, args: &[Value], f: F) -> Result<Value, CheckError>
    where
        F: FnOnce(&[Value]) -> Value,
    {
        self.check_args(args)?;
        let value = f(args);
        self.check_return(&value)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::runtime::class::builtins;
    use crate::runtime::module::ModuleTable;

    #[test]
    fn checks_params_and_return() {
        let b = builtins();
        let engine = Engine::new(Arc::new(ModuleTable::new()));
        let sig = CallableSig::new("app", "add")
            .param("a", Hint::class(&b.int))
            .untyped_param("b")
            .returns(Hint::class(&b.int));
        let f = engine.wrap(&sig).expect("wrap");

        let out = f
            .call(&[Value::Int(1), Value::str("anything")], |_| Value::Int(3))
            .expect("ok");
        assert_eq!(out, Value::Int(3));

        let err = f
            .call(&[Value::str("1"), Value::Int(2)], |_| Value::Int(3))
            .expect_err("bad arg");
        let v = err.as_violation().expect("violation");
        assert_eq!(v.slot, "a");
        assert!(v.message.starts_with("Function app.add() parameter \"a\" "));

        let err = f
            .call(&[Value::Int(1), Value::Int(2)], |_| Value::None)
            .expect_err("bad return");
        assert_eq!(err.as_violation().expect("violation").slot, "__return");
    }

    #[test]
    fn arity_mismatch_is_reported() {
        let engine = Engine::new(Arc::new(ModuleTable::new()));
        let sig = CallableSig::new("app", "f").param("a", Hint::class(&builtins().int));
        let f = engine.wrap(&sig).expect("wrap");
        let err = f.check_args(&[]).expect_err("arity");
        assert!(matches!(err, CheckError::Arity { expected: 1, got: 0, .. }));
    }

    #[test]
    fn no_return_parameter_is_misplaced() {
        let engine = Engine::new(Arc::new(ModuleTable::new()));
        let sig = CallableSig::new("app", "f").param("a", Hint::special("typing.NoReturn"));
        let err = engine.wrap(&sig).expect_err("misplaced");
        assert_eq!(err.kind, HintErrorKind::Misplaced);
    }

    #[test]
    fn no_return_behind_an_alias_is_still_misplaced() {
        let engine = Engine::new(Arc::new(ModuleTable::new()));
        let never = Hint::type_alias("app", "Never", Vec::new(), || {
            Ok(Hint::special("typing.NoReturn"))
        });
        for hint in [
            never,
            Hint::annotated(Hint::special("typing.NoReturn"), vec![Value::str("why")]),
        ] {
            let sig = CallableSig::new("app", "f").param("a", hint);
            let err = engine.wrap(&sig).expect_err("misplaced");
            assert_eq!(err.kind, HintErrorKind::Misplaced);
            assert!(err.message.starts_with("Function app.f() parameter \"a\" "));
        }
    }

    #[test]
    fn no_return_rejects_any_returned_value() {
        let engine = Engine::new(Arc::new(ModuleTable::new()));
        let sig = CallableSig::new("app", "fail").returns(Hint::special("typing.NoReturn"));
        let f = engine.wrap(&sig).expect("wrap");
        assert!(f.check_return(&Value::None).is_err());
    }
}
