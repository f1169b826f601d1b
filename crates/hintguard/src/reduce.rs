//! Hint reduction: rewrite a hint into the canonical form the code generator
//! dispatches on, carrying type-variable bindings and the recursion guard along.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::CheckConfig;
use crate::error::{HintError, HintErrorKind};
use crate::hint::{Hint, HintId, HintKind, HintOrigin, TypeAliasDef, TypeVarDef};
use crate::language;
use crate::runtime::class::{builtins, ClassRef};
use crate::sign::{HintSign, SignRegistry};

/// Upper bound on rewrite steps for a single hint before the reducer assumes a
/// rewrite cycle.
const MAX_REDUCTION_STEPS: usize = 256;

#[derive(Clone)]
struct TypeVarBinding {
    def: Arc<TypeVarDef>,
    hint: Hint,
}

/// Type-variable bindings keyed by type-variable identity.
#[derive(Clone, Default)]
pub struct TypeVarTable(Arc<BTreeMap<usize, TypeVarBinding>>);

impl TypeVarTable {
    fn key(def: &Arc<TypeVarDef>) -> usize {
        Arc::as_ptr(def) as usize
    }

    pub fn get(&self, def: &Arc<TypeVarDef>) -> Option<&Hint> {
        self.0.get(&Self::key(def)).map(|b| &b.hint)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names bound in this table, for diagnostics.
    pub fn names(&self) -> Vec<String> {
        self.0.values().map(|b| b.def.name.clone()).collect()
    }

    fn with(&self, bindings: Vec<(Arc<TypeVarDef>, Hint)>) -> Self {
        if bindings.is_empty() {
            return self.clone();
        }
        let mut map = (*self.0).clone();
        for (def, hint) in bindings {
            map.insert(Self::key(&def), TypeVarBinding { def, hint });
        }
        TypeVarTable(Arc::new(map))
    }
}

/// Hint identities already expanded on the current root-to-here path. Values keep
/// the hints alive so an identity cannot be reused while the guard exists.
#[derive(Clone, Default)]
pub struct RecursionGuard(Arc<BTreeMap<HintId, Hint>>);

impl RecursionGuard {
    pub fn contains(&self, hint: &Hint) -> bool {
        self.0.contains_key(&hint.id())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn with(&self, hint: &Hint) -> Self {
        if self.contains(hint) {
            return self.clone();
        }
        let mut map = (*self.0).clone();
        map.insert(hint.id(), hint.clone());
        RecursionGuard(Arc::new(map))
    }
}

/// A hint paired with the metadata accumulated on the way down to it.
#[derive(Clone)]
pub struct HintSane {
    pub hint: Hint,
    pub typevars: TypeVarTable,
    pub guard: RecursionGuard,
}

impl HintSane {
    pub fn new(hint: Hint) -> Self {
        Self {
            hint,
            typevars: TypeVarTable::default(),
            guard: RecursionGuard::default(),
        }
    }

    /// Metadata for a child hint: same bindings, same guard.
    pub fn child(&self, hint: Hint) -> Self {
        Self {
            hint,
            typevars: self.typevars.clone(),
            guard: self.guard.clone(),
        }
    }

    pub fn guarding(mut self, hint: &Hint) -> Self {
        self.guard = self.guard.with(hint);
        self
    }
}

pub enum Reduced {
    Sane(HintSane),
    /// The hint constrains nothing; no check is emitted for it.
    Ignorable,
}

impl Reduced {
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Reduced::Ignorable)
    }
}

pub struct ReduceContext<'a> {
    pub signs: &'a SignRegistry,
    pub config: &'a CheckConfig,
    pub exception_prefix: &'a str,
}

enum Step {
    Done(HintSane),
    Rewrite(HintSane),
    Ignorable,
}

/// Reduce `hint` to a fixpoint in the context of `parent`.
pub fn reduce(
    hint: &Hint,
    parent: Option<&HintSane>,
    cx: &ReduceContext<'_>,
) -> Result<Reduced, HintError> {
    let mut sane = match parent {
        Some(parent) => parent.child(hint.clone()),
        None => HintSane::new(hint.clone()),
    };
    for _ in 0..MAX_REDUCTION_STEPS {
        if sane.guard.contains(&sane.hint) {
            tracing::trace!(
                target: "hintguard::reduce",
                hint = %sane.hint,
                "recursive hint truncated"
            );
            return Ok(Reduced::Ignorable);
        }
        match step(sane, cx)? {
            Step::Done(done) => return Ok(Reduced::Sane(done)),
            Step::Ignorable => return Ok(Reduced::Ignorable),
            Step::Rewrite(next) => {
                tracing::trace!(target: "hintguard::reduce", hint = %next.hint, "reduced");
                sane = next;
            }
        }
    }
    Err(HintError::internal(format!(
        "{}type hint {} did not reduce to a fixpoint",
        cx.exception_prefix, hint
    )))
}

fn step(sane: HintSane, cx: &ReduceContext<'_>) -> Result<Step, HintError> {
    let hint = sane.hint.clone();
    let b = builtins();
    match hint.kind() {
        HintKind::None => Ok(Step::Rewrite(sane.child(Hint::class(&b.none_type)))),
        HintKind::Class(cls) => {
            if *cls == b.object {
                Ok(Step::Ignorable)
            } else if cx.config.is_pep484_tower && *cls == b.float {
                Ok(Step::Rewrite(sane.child(Hint::union(vec![
                    hint.clone(),
                    Hint::class(&b.int),
                ]))))
            } else {
                Ok(Step::Done(sane))
            }
        }
        HintKind::Special(name) => reduce_special(sane.clone(), name),
        HintKind::Subscripted { origin, args } => match origin {
            HintOrigin::Special(name) => match cx.signs.repr_to_sign.get(name) {
                Some(HintSign::Union) => reduce_union(sane.clone(), args, cx),
                Some(HintSign::Optional) => {
                    if args.len() != 1 {
                        return Err(HintError::unsupported(format!(
                            "{}type hint {} must have exactly one argument",
                            cx.exception_prefix, hint
                        )));
                    }
                    Ok(Step::Rewrite(sane.child(Hint::union(vec![
                        args[0].clone(),
                        Hint::none(),
                    ]))))
                }
                Some(HintSign::Generic) => Ok(Step::Ignorable),
                Some(HintSign::Protocol) => reduce_special(sane.clone(), name),
                Some(HintSign::IO) => {
                    let adapter = io_adapter(name, args);
                    Ok(Step::Rewrite(sane.child(Hint::class(&adapter))))
                }
                _ => Ok(Step::Done(sane)),
            },
            HintOrigin::Class(cls) => {
                if cx.signs.origin_to_sign.contains_key(cls) || !cls.is_generic() {
                    return Ok(Step::Done(sane));
                }
                bind_generic_class(sane.clone(), cls, args, cx)
            }
            HintOrigin::Alias(def) => reduce_subscripted_alias(sane.clone(), def, args, cx),
        },
        HintKind::Annotated { hint: inner, .. } => Ok(Step::Rewrite(sane.child(inner.clone()))),
        HintKind::NewType { supertype, .. } => Ok(Step::Rewrite(sane.child(supertype.clone()))),
        HintKind::TypeVar(def) => reduce_type_var(sane.clone(), def),
        HintKind::TypeAlias(def) => reduce_alias(sane.clone(), def, cx),
        HintKind::Ellipsis
        | HintKind::Literal(_)
        | HintKind::ForwardRef(_)
        | HintKind::ForwardRefProxy(_)
        | HintKind::Object(_) => Ok(Step::Done(sane)),
    }
}

fn reduce_special(sane: HintSane, name: &str) -> Result<Step, HintError> {
    let b = builtins();
    let adapter = match name {
        "typing.Any" | "typing.Generic" | "typing.Protocol" => return Ok(Step::Ignorable),
        "typing.SupportsInt" => &b.supports_int,
        "typing.SupportsFloat" => &b.supports_float,
        "typing.SupportsIndex" => &b.supports_index,
        "typing.SupportsAbs" => &b.supports_abs,
        "typing.Sized" => &b.sized,
        "typing.IO" => &b.io,
        "typing.BinaryIO" => &b.binary_io,
        "typing.TextIO" => &b.text_io,
        _ => return Ok(Step::Done(sane)),
    };
    Ok(Step::Rewrite(sane.child(Hint::class(adapter))))
}

/// `IO[str]` is text IO and `IO[bytes]` binary IO; anything else is plain IO.
fn io_adapter(name: &str, args: &[Hint]) -> ClassRef {
    let b = builtins();
    match (name, args.first().and_then(Hint::as_class)) {
        ("typing.BinaryIO", _) => b.binary_io.clone(),
        ("typing.TextIO", _) => b.text_io.clone(),
        (_, Some(cls)) if *cls == b.str_ => b.text_io.clone(),
        (_, Some(cls)) if *cls == b.bytes => b.binary_io.clone(),
        _ => b.io.clone(),
    }
}

fn is_union_hint(hint: &Hint, signs: &SignRegistry) -> bool {
    matches!(
        hint.kind(),
        HintKind::Subscripted { origin: HintOrigin::Special(name), .. }
            if signs.repr_to_sign.get(name) == Some(&HintSign::Union)
    )
}

fn is_optional_hint(hint: &Hint, signs: &SignRegistry) -> bool {
    matches!(
        hint.kind(),
        HintKind::Subscripted { origin: HintOrigin::Special(name), args }
            if args.len() == 1 && signs.repr_to_sign.get(name) == Some(&HintSign::Optional)
    )
}

fn reduce_union(sane: HintSane, args: &[Hint], cx: &ReduceContext<'_>) -> Result<Step, HintError> {
    let b = builtins();

    let mut flat: Vec<Hint> = Vec::new();
    let mut pending: Vec<Hint> = args.iter().rev().cloned().collect();
    while let Some(member) = pending.pop() {
        if is_union_hint(&member, cx.signs) {
            pending.extend(member.args().iter().rev().cloned());
        } else if is_optional_hint(&member, cx.signs) {
            pending.push(Hint::none());
            pending.push(member.args()[0].clone());
        } else if matches!(member.kind(), HintKind::None) {
            flat.push(Hint::class(&b.none_type));
        } else if cx.config.is_pep484_tower && member.as_class() == Some(&b.float) {
            flat.push(member);
            flat.push(Hint::class(&b.int));
        } else {
            flat.push(member);
        }
    }

    let mut members: Vec<Hint> = Vec::new();
    for member in flat {
        if !members.iter().any(|m| m.is_equivalent(&member)) {
            members.push(member);
        }
    }

    if members.is_empty() {
        return Err(HintError::unsupported(format!(
            "{}type hint {} has no members",
            cx.exception_prefix, sane.hint
        )));
    }

    // Accepting anything for one member accepts anything for the union.
    for member in &members {
        let ignorable = match member.as_class() {
            Some(cls) => *cls == b.object,
            None => reduce(member, Some(&sane), cx)?.is_ignorable(),
        };
        if ignorable {
            return Ok(Step::Ignorable);
        }
    }

    if members.len() == 1 {
        let only = members.remove(0);
        return Ok(Step::Rewrite(sane.child(only)));
    }

    let unchanged = members.len() == args.len()
        && members
            .iter()
            .zip(args.iter())
            .all(|(m, a)| m.is_equivalent(a));
    if unchanged {
        Ok(Step::Done(sane))
    } else {
        Ok(Step::Rewrite(sane.child(Hint::union(members))))
    }
}

fn reduce_type_var(sane: HintSane, def: &Arc<TypeVarDef>) -> Result<Step, HintError> {
    if let Some(bound) = sane.typevars.get(def) {
        if !bound.ptr_eq(&sane.hint) {
            let bound = bound.clone();
            return Ok(Step::Rewrite(sane.child(bound)));
        }
    }
    if let Some(bound) = &def.bound {
        return Ok(Step::Rewrite(sane.child(bound.clone())));
    }
    if !def.constraints.is_empty() {
        return Ok(Step::Rewrite(
            sane.child(Hint::union(def.constraints.clone())),
        ));
    }
    Ok(Step::Ignorable)
}

/// Resolve an argument through the bindings already in scope, so `Alias[T]`
/// nested inside a body where `T` is bound carries the concrete hint.
fn resolve_arg(arg: &Hint, typevars: &TypeVarTable) -> Hint {
    match arg.kind() {
        HintKind::TypeVar(def) => typevars.get(def).cloned().unwrap_or_else(|| arg.clone()),
        _ => arg.clone(),
    }
}

fn bind_params(
    sane: &HintSane,
    params: &[Arc<TypeVarDef>],
    args: &[Hint],
    override_inherited: bool,
    cx: &ReduceContext<'_>,
) -> Result<TypeVarTable, HintError> {
    if params.len() != args.len() {
        return Err(HintError::unsupported(format!(
            "{}type hint {} expects {} type argument(s) but got {}",
            cx.exception_prefix,
            sane.hint,
            params.len(),
            args.len()
        )));
    }
    let mut bindings = Vec::with_capacity(params.len());
    for (param, arg) in params.iter().zip(args.iter()) {
        let arg = resolve_arg(arg, &sane.typevars);
        if let Some(existing) = sane.typevars.get(param) {
            if !override_inherited && !existing.is_equivalent(&arg) {
                return Err(HintError::new(
                    HintErrorKind::TypeVarConflict,
                    format!(
                        "{}type hint {} rebinds type variable {} from {} to {}",
                        cx.exception_prefix, sane.hint, param.name, existing, arg
                    ),
                ));
            }
        }
        bindings.push((param.clone(), arg));
    }
    Ok(sane.typevars.with(bindings))
}

fn bind_generic_class(
    sane: HintSane,
    cls: &ClassRef,
    args: &[Hint],
    cx: &ReduceContext<'_>,
) -> Result<Step, HintError> {
    let params = &cls.def().type_params;
    let typevars = bind_params(&sane, params, args, true, cx)?;
    Ok(Step::Done(HintSane { typevars, ..sane }))
}

fn reduce_subscripted_alias(
    sane: HintSane,
    def: &Arc<TypeAliasDef>,
    args: &[Hint],
    cx: &ReduceContext<'_>,
) -> Result<Step, HintError> {
    let typevars = bind_params(&sane, &def.type_params, args, false, cx)?;
    // Guard on the subscripted hint: each subscription truncates on its own.
    let subscripted = sane.hint.clone();
    let value = force_alias(def, cx)?;
    Ok(Step::Rewrite(HintSane {
        hint: value,
        typevars,
        guard: sane.guard.with(&subscripted),
    }))
}

fn reduce_alias(
    sane: HintSane,
    def: &Arc<TypeAliasDef>,
    cx: &ReduceContext<'_>,
) -> Result<Step, HintError> {
    let alias = sane.hint.clone();
    let value = force_alias(def, cx)?;
    Ok(Step::Rewrite(sane.child(value).guarding(&alias)))
}

fn force_alias(def: &Arc<TypeAliasDef>, cx: &ReduceContext<'_>) -> Result<Hint, HintError> {
    match def.force() {
        Ok(value) => Ok(value),
        Err(err) if language::is_identifier(&err.name) && !language::is_keyword(&err.name) => {
            tracing::debug!(
                target: "hintguard::reduce",
                alias = %def.name,
                name = %err.name,
                "deferring undefined name as a relative forward reference"
            );
            Ok(Hint::forward_ref(&err.name))
        }
        Err(err) => Err(HintError::new(
            HintErrorKind::ForwardRefUnresolvable,
            format!(
                "{}type alias {} in module {:?} refers to {:?}, which is not defined yet \
                 and cannot be deferred; quote the reference as a string, or enable \
                 whole-module forward-reference scanning for {:?}",
                cx.exception_prefix, def.name, def.module, err.name, def.module
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hint::NameError;

    fn cx<'a>(config: &'a CheckConfig) -> ReduceContext<'a> {
        ReduceContext {
            signs: SignRegistry::builtin(),
            config,
            exception_prefix: "",
        }
    }

    fn reduced(hint: &Hint, config: &CheckConfig) -> Option<Hint> {
        match reduce(hint, None, &cx(config)).expect("reduce") {
            Reduced::Sane(sane) => Some(sane.hint),
            Reduced::Ignorable => None,
        }
    }

    #[test]
    fn none_becomes_none_type() {
        let config = CheckConfig::default();
        let out = reduced(&Hint::none(), &config).expect("not ignorable");
        assert_eq!(out.as_class(), Some(&builtins().none_type));
    }

    #[test]
    fn any_and_object_are_ignorable() {
        let config = CheckConfig::default();
        assert!(reduced(&Hint::any(), &config).is_none());
        assert!(reduced(&Hint::class(&builtins().object), &config).is_none());
        let u = Hint::union(vec![Hint::class(&builtins().int), Hint::any()]);
        assert!(reduced(&u, &config).is_none());
    }

    #[test]
    fn optional_flattens_into_union_with_none_type() {
        let config = CheckConfig::default();
        let b = builtins();
        let h = Hint::optional(Hint::union(vec![
            Hint::class(&b.int),
            Hint::class(&b.str_),
        ]));
        let out = reduced(&h, &config).expect("not ignorable");
        let classes: Vec<_> = out.args().iter().filter_map(Hint::as_class).cloned().collect();
        assert_eq!(classes, vec![b.int.clone(), b.str_.clone(), b.none_type.clone()]);
    }

    #[test]
    fn single_member_union_collapses() {
        let config = CheckConfig::default();
        let b = builtins();
        let h = Hint::union(vec![Hint::class(&b.int), Hint::class(&b.int)]);
        let out = reduced(&h, &config).expect("not ignorable");
        assert_eq!(out.as_class(), Some(&b.int));
    }

    #[test]
    fn numeric_tower_widens_float() {
        let b = builtins();
        let config = CheckConfig::default().with_pep484_tower(true);
        let out = reduced(&Hint::class(&b.float), &config).expect("not ignorable");
        assert_eq!(out.args().len(), 2);
        assert_eq!(out.args()[1].as_class(), Some(&b.int));
    }

    #[test]
    fn annotated_and_new_type_unwrap() {
        let config = CheckConfig::default();
        let b = builtins();
        let h = Hint::annotated(
            Hint::new_type("UserId", Hint::class(&b.int)),
            vec![crate::runtime::value::Value::str("meta")],
        );
        assert_eq!(reduced(&h, &config).expect("hint").as_class(), Some(&b.int));
    }

    #[test]
    fn type_var_falls_back_to_bound_then_constraints() {
        let config = CheckConfig::default();
        let b = builtins();
        let bounded = TypeVarDef::bounded("N", Hint::class(&b.int));
        let out = reduced(&Hint::type_var(&bounded), &config).expect("bound");
        assert_eq!(out.as_class(), Some(&b.int));

        let constrained =
            TypeVarDef::constrained("S", vec![Hint::class(&b.str_), Hint::class(&b.bytes)]);
        let out = reduced(&Hint::type_var(&constrained), &config).expect("constraints");
        assert_eq!(out.args().len(), 2);

        assert!(reduced(&Hint::type_var(&TypeVarDef::new("T")), &config).is_none());
    }

    #[test]
    fn protocol_specials_become_adapters() {
        let config = CheckConfig::default();
        let b = builtins();
        let out = reduced(&Hint::special("typing.SupportsInt"), &config).expect("adapter");
        assert_eq!(out.as_class(), Some(&b.supports_int));
        let io_str = Hint::typing("typing.IO", vec![Hint::class(&b.str_)]);
        assert_eq!(
            reduced(&io_str, &config).expect("adapter").as_class(),
            Some(&b.text_io)
        );
    }

    #[test]
    fn undefined_single_name_defers_to_forward_ref() {
        let config = CheckConfig::default();
        let alias = Hint::type_alias("app", "Later", Vec::new(), || Err(NameError::new("Foo")));
        let out = reduced(&alias, &config).expect("deferred");
        assert!(matches!(out.kind(), HintKind::ForwardRef(name) if name == "Foo"));
    }

    #[test]
    fn undefined_dotted_name_is_unresolvable() {
        let config = CheckConfig::default();
        let alias =
            Hint::type_alias("app", "Later", Vec::new(), || Err(NameError::new("pkg.Foo")));
        let err = match reduce(&alias, None, &cx(&config)) {
            Err(err) => err,
            Ok(_) => panic!("expected error"),
        };
        assert_eq!(err.kind, HintErrorKind::ForwardRefUnresolvable);
        assert!(err.message.contains("quote"), "{}", err.message);
    }

    #[test]
    fn alias_guard_truncates_second_encounter() {
        let config = CheckConfig::default();
        let alias = Hint::type_alias("app", "Ints", Vec::new(), || {
            Ok(Hint::list(Hint::class(&builtins().int)))
        });
        let Reduced::Sane(sane) = reduce(&alias, None, &cx(&config)).expect("reduce") else {
            panic!("ignorable");
        };
        assert!(sane.guard.contains(&alias));
        assert!(reduce(&alias, Some(&sane), &cx(&config))
            .expect("reduce")
            .is_ignorable());
    }
}
