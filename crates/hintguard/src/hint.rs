//! Type hints: the trees the engine decomposes into checking code.
//!
//! A [`Hint`] is a shared handle; its pointer identity is the hint identity used by
//! the code cache and by recursion guards. Cloning a `Hint` keeps the identity,
//! building an equal-looking hint again does not.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::forward_ref::ForwardRef;
use crate::runtime::class::{builtins, ClassRef};
use crate::runtime::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HintId(usize);

/// Raised while forcing a lazily evaluated alias whose body names something that
/// does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameError {
    pub name: String,
}

impl NameError {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl std::error::Error for NameError {}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "name {:?} is not defined", self.name)
    }
}

pub struct TypeVarDef {
    pub name: String,
    pub bound: Option<Hint>,
    pub constraints: Vec<Hint>,
}

impl TypeVarDef {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            bound: None,
            constraints: Vec::new(),
        })
    }

    pub fn bounded(name: &str, bound: Hint) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            bound: Some(bound),
            constraints: Vec::new(),
        })
    }

    pub fn constrained(name: &str, constraints: Vec<Hint>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            bound: None,
            constraints,
        })
    }
}

pub type AliasThunk = dyn Fn() -> Result<Hint, NameError> + Send + Sync;

/// A lazily evaluated type alias (`type Name[T] = ...`).
pub struct TypeAliasDef {
    pub name: String,
    pub module: String,
    pub type_params: Vec<Arc<TypeVarDef>>,
    value: Box<AliasThunk>,
    forced: OnceCell<Hint>,
}

impl TypeAliasDef {
    /// Evaluate the alias body. A successful value is cached so that every caller
    /// sees the same hint identity; failures are not cached.
    pub fn force(&self) -> Result<Hint, NameError> {
        if let Some(h) = self.forced.get() {
            return Ok(h.clone());
        }
        let value = (self.value)()?;
        Ok(self.forced.get_or_init(|| value).clone())
    }
}

pub enum HintOrigin {
    /// Textual special form such as `typing.List` or `types.UnionType`.
    Special(String),
    /// Runtime class such as `list` or a user generic.
    Class(ClassRef),
    Alias(Arc<TypeAliasDef>),
}

pub enum HintKind {
    Class(ClassRef),
    None,
    Ellipsis,
    Special(String),
    Subscripted { origin: HintOrigin, args: Vec<Hint> },
    Literal(Vec<Value>),
    Annotated { hint: Hint, metadata: Vec<Value> },
    /// String forward reference: dotted means absolute, bare means relative to the
    /// module of the callable being checked.
    ForwardRef(String),
    ForwardRefProxy(Arc<ForwardRef>),
    TypeVar(Arc<TypeVarDef>),
    TypeAlias(Arc<TypeAliasDef>),
    NewType { name: String, supertype: Hint },
    /// Any other object used in annotation position.
    Object(Value),
}

#[derive(Clone)]
pub struct Hint(Arc<HintKind>);

impl Hint {
    pub fn new(kind: HintKind) -> Self {
        Hint(Arc::new(kind))
    }

    pub fn id(&self) -> HintId {
        HintId(Arc::as_ptr(&self.0) as usize)
    }

    pub fn kind(&self) -> &HintKind {
        &self.0
    }

    pub fn ptr_eq(&self, other: &Hint) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn class(cls: &ClassRef) -> Self {
        Self::new(HintKind::Class(cls.clone()))
    }

    pub fn none() -> Self {
        Self::new(HintKind::None)
    }

    pub fn ellipsis() -> Self {
        Self::new(HintKind::Ellipsis)
    }

    pub fn special(name: &str) -> Self {
        Self::new(HintKind::Special(name.to_string()))
    }

    pub fn any() -> Self {
        Self::special("typing.Any")
    }

    pub fn typing(name: &str, args: Vec<Hint>) -> Self {
        Self::new(HintKind::Subscripted {
            origin: HintOrigin::Special(name.to_string()),
            args,
        })
    }

    pub fn subscript(cls: &ClassRef, args: Vec<Hint>) -> Self {
        Self::new(HintKind::Subscripted {
            origin: HintOrigin::Class(cls.clone()),
            args,
        })
    }

    pub fn subscript_alias(alias: &Hint, args: Vec<Hint>) -> Option<Self> {
        match alias.kind() {
            HintKind::TypeAlias(def) => Some(Self::new(HintKind::Subscripted {
                origin: HintOrigin::Alias(def.clone()),
                args,
            })),
            _ => None,
        }
    }

    pub fn list(item: Hint) -> Self {
        Self::subscript(&builtins().list, vec![item])
    }

    pub fn tuple(items: Vec<Hint>) -> Self {
        Self::subscript(&builtins().tuple, items)
    }

    pub fn tuple_of(item: Hint) -> Self {
        Self::subscript(&builtins().tuple, vec![item, Hint::ellipsis()])
    }

    pub fn dict(key: Hint, value: Hint) -> Self {
        Self::subscript(&builtins().dict, vec![key, value])
    }

    pub fn union(members: Vec<Hint>) -> Self {
        Self::typing("typing.Union", members)
    }

    pub fn optional(hint: Hint) -> Self {
        Self::typing("typing.Optional", vec![hint])
    }

    pub fn literal(values: Vec<Value>) -> Self {
        Self::new(HintKind::Literal(values))
    }

    pub fn annotated(hint: Hint, metadata: Vec<Value>) -> Self {
        Self::new(HintKind::Annotated { hint, metadata })
    }

    pub fn forward_ref(name: &str) -> Self {
        Self::new(HintKind::ForwardRef(name.to_string()))
    }

    pub fn forward_ref_proxy(proxy: &Arc<ForwardRef>) -> Self {
        Self::new(HintKind::ForwardRefProxy(proxy.clone()))
    }

    pub fn type_var(def: &Arc<TypeVarDef>) -> Self {
        Self::new(HintKind::TypeVar(def.clone()))
    }

    pub fn type_alias(
        module: &str,
        name: &str,
        type_params: Vec<Arc<TypeVarDef>>,
        value: impl Fn() -> Result<Hint, NameError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(HintKind::TypeAlias(Arc::new(TypeAliasDef {
            name: name.to_string(),
            module: module.to_string(),
            type_params,
            value: Box::new(value),
            forced: OnceCell::new(),
        })))
    }

    pub fn new_type(name: &str, supertype: Hint) -> Self {
        Self::new(HintKind::NewType {
            name: name.to_string(),
            supertype,
        })
    }

    pub fn object(value: Value) -> Self {
        Self::new(HintKind::Object(value))
    }

    pub fn args(&self) -> &[Hint] {
        match self.kind() {
            HintKind::Subscripted { args, .. } => args,
            _ => &[],
        }
    }

    pub fn as_class(&self) -> Option<&ClassRef> {
        match self.kind() {
            HintKind::Class(cls) => Some(cls),
            _ => None,
        }
    }

    /// The runtime class a subscripted hint was built from, or the class itself.
    pub fn origin_class(&self) -> Option<ClassRef> {
        match self.kind() {
            HintKind::Class(cls) => Some(cls.clone()),
            HintKind::Subscripted {
                origin: HintOrigin::Class(cls),
                ..
            } => Some(cls.clone()),
            _ => None,
        }
    }

    pub fn is_ellipsis(&self) -> bool {
        matches!(self.kind(), HintKind::Ellipsis)
    }

    /// Identity, or structural equality for hints that were rebuilt.
    pub fn is_equivalent(&self, other: &Hint) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self.kind(), other.kind()) {
            (HintKind::Class(a), HintKind::Class(b)) => a == b,
            (HintKind::None, HintKind::None) | (HintKind::Ellipsis, HintKind::Ellipsis) => true,
            (HintKind::Special(a), HintKind::Special(b)) => a == b,
            (
                HintKind::Subscripted {
                    origin: oa,
                    args: aa,
                },
                HintKind::Subscripted {
                    origin: ob,
                    args: ab,
                },
            ) => {
                let same_origin = match (oa, ob) {
                    (HintOrigin::Special(a), HintOrigin::Special(b)) => a == b,
                    (HintOrigin::Class(a), HintOrigin::Class(b)) => a == b,
                    (HintOrigin::Alias(a), HintOrigin::Alias(b)) => Arc::ptr_eq(a, b),
                    _ => false,
                };
                same_origin
                    && aa.len() == ab.len()
                    && aa.iter().zip(ab.iter()).all(|(x, y)| x.is_equivalent(y))
            }
            (HintKind::Literal(a), HintKind::Literal(b)) => a == b,
            (
                HintKind::Annotated { hint: ha, .. },
                HintKind::Annotated { hint: hb, .. },
            ) => ha.is_equivalent(hb),
            (HintKind::ForwardRef(a), HintKind::ForwardRef(b)) => a == b,
            (HintKind::ForwardRefProxy(a), HintKind::ForwardRefProxy(b)) => Arc::ptr_eq(a, b),
            (HintKind::TypeVar(a), HintKind::TypeVar(b)) => Arc::ptr_eq(a, b),
            (HintKind::TypeAlias(a), HintKind::TypeAlias(b)) => Arc::ptr_eq(a, b),
            (
                HintKind::NewType {
                    name: na,
                    supertype: sa,
                },
                HintKind::NewType {
                    name: nb,
                    supertype: sb,
                },
            ) => na == nb && sa.is_equivalent(sb),
            (HintKind::Object(a), HintKind::Object(b)) => a == b,
            _ => false,
        }
    }

    pub fn repr(&self) -> String {
        match self.kind() {
            HintKind::Class(cls) => cls.qualname(),
            HintKind::None => "None".to_string(),
            HintKind::Ellipsis => "...".to_string(),
            HintKind::Special(name) => name.clone(),
            HintKind::Subscripted { origin, args } => {
                let head = match origin {
                    HintOrigin::Special(name) => name.clone(),
                    HintOrigin::Class(cls) => cls.qualname(),
                    HintOrigin::Alias(def) => def.name.clone(),
                };
                if args.is_empty() {
                    return format!("{head}[()]");
                }
                let parts: Vec<String> = args.iter().map(Hint::repr).collect();
                format!("{head}[{}]", parts.join(", "))
            }
            HintKind::Literal(values) => {
                let parts: Vec<String> = values.iter().map(Value::repr).collect();
                format!("typing.Literal[{}]", parts.join(", "))
            }
            HintKind::Annotated { hint, metadata } => {
                let mut parts = vec![hint.repr()];
                parts.extend(metadata.iter().map(Value::repr));
                format!("typing.Annotated[{}]", parts.join(", "))
            }
            HintKind::ForwardRef(name) => format!("{name:?}"),
            HintKind::ForwardRefProxy(proxy) => format!("{proxy:?}"),
            HintKind::TypeVar(def) => format!("~{}", def.name),
            HintKind::TypeAlias(def) => def.name.clone(),
            HintKind::NewType { name, .. } => name.clone(),
            HintKind::Object(value) => value.repr(),
        }
    }
}

impl fmt::Debug for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebuilt_hints_are_equivalent_but_not_identical() {
        let a = Hint::list(Hint::class(&builtins().int));
        let b = Hint::list(Hint::class(&builtins().int));
        assert!(a.is_equivalent(&b));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn repr_reads_like_an_annotation() {
        let h = Hint::union(vec![
            Hint::class(&builtins().int),
            Hint::list(Hint::class(&builtins().str_)),
        ]);
        assert_eq!(h.repr(), "typing.Union[int, list[str]]");
        assert_eq!(Hint::tuple(vec![]).repr(), "tuple[()]");
    }

    #[test]
    fn alias_value_is_forced_once() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = calls.clone();
        let alias = Hint::type_alias("app", "Ints", Vec::new(), move || {
            seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Hint::list(Hint::class(&builtins().int)))
        });
        let HintKind::TypeAlias(def) = alias.kind() else {
            panic!("expected alias");
        };
        let first = def.force().expect("force");
        let second = def.force().expect("force");
        assert!(first.ptr_eq(&second));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
