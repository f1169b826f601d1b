//! Sign registry: a closed set of tokens classifying hint shapes, and the data tables
//! the reducer and code generator dispatch on.
//!
//! The tables are plain collections so the supported set can grow without touching
//! the generator's control flow.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use once_cell::sync::Lazy;

use crate::hint::{Hint, HintKind, HintOrigin};
use crate::runtime::class::{builtins, ClassRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HintSign {
    AbstractSet,
    Annotated,
    Any,
    Collection,
    Dict,
    ForwardRef,
    FrozenSet,
    Generic,
    IO,
    Iterable,
    List,
    Literal,
    Mapping,
    MutableMapping,
    MutableSequence,
    NewType,
    NoReturn,
    Optional,
    Protocol,
    Sequence,
    Set,
    Tuple,
    Type,
    TypeAlias,
    TypeVar,
    Union,
}

impl HintSign {
    pub fn name(self) -> &'static str {
        match self {
            HintSign::AbstractSet => "AbstractSet",
            HintSign::Annotated => "Annotated",
            HintSign::Any => "Any",
            HintSign::Collection => "Collection",
            HintSign::Dict => "Dict",
            HintSign::ForwardRef => "ForwardRef",
            HintSign::FrozenSet => "FrozenSet",
            HintSign::Generic => "Generic",
            HintSign::IO => "IO",
            HintSign::Iterable => "Iterable",
            HintSign::List => "List",
            HintSign::Literal => "Literal",
            HintSign::Mapping => "Mapping",
            HintSign::MutableMapping => "MutableMapping",
            HintSign::MutableSequence => "MutableSequence",
            HintSign::NewType => "NewType",
            HintSign::NoReturn => "NoReturn",
            HintSign::Optional => "Optional",
            HintSign::Protocol => "Protocol",
            HintSign::Sequence => "Sequence",
            HintSign::Set => "Set",
            HintSign::Tuple => "Tuple",
            HintSign::Type => "Type",
            HintSign::TypeAlias => "TypeAlias",
            HintSign::TypeVar => "TypeVar",
            HintSign::Union => "Union",
        }
    }
}

pub struct SignRegistry {
    /// Unsubscripted textual representation -> sign.
    pub repr_to_sign: BTreeMap<String, HintSign>,
    /// Runtime origin class of a subscripted hint -> sign.
    pub origin_to_sign: HashMap<ClassRef, HintSign>,
    /// Sign -> class usable for a shallow instance check.
    pub sign_to_origin: BTreeMap<HintSign, ClassRef>,
    /// Signs whose children the generator knows how to check.
    pub deep: BTreeSet<HintSign>,
    pub union: BTreeSet<HintSign>,
    /// Signs taking exactly one child applied to every item of a sequence.
    pub sequence_args_1: BTreeSet<HintSign>,
    /// Signs only valid as the whole return hint.
    pub root_only: BTreeSet<HintSign>,
}

static BUILTIN_SIGNS: Lazy<SignRegistry> = Lazy::new(SignRegistry::new_builtin);

impl SignRegistry {
    pub fn builtin() -> &'static SignRegistry {
        &BUILTIN_SIGNS
    }

    pub fn new_builtin() -> Self {
        use HintSign::*;

        let b = builtins();
        let mut repr_to_sign = BTreeMap::new();
        for (repr, sign) in [
            ("typing.Annotated", Annotated),
            ("typing_extensions.Annotated", Annotated),
            ("typing.Any", Any),
            ("typing.Collection", Collection),
            ("typing.Dict", Dict),
            ("typing.FrozenSet", FrozenSet),
            ("typing.Generic", Generic),
            ("typing.Protocol", Generic),
            ("typing.IO", IO),
            ("typing.BinaryIO", IO),
            ("typing.TextIO", IO),
            ("typing.Iterable", Iterable),
            ("typing.List", List),
            ("typing.Literal", Literal),
            ("typing_extensions.Literal", Literal),
            ("typing.Mapping", Mapping),
            ("typing.MutableMapping", MutableMapping),
            ("typing.MutableSequence", MutableSequence),
            ("typing.NoReturn", NoReturn),
            ("typing.Never", NoReturn),
            ("typing.Optional", Optional),
            ("typing.SupportsAbs", Protocol),
            ("typing.SupportsFloat", Protocol),
            ("typing.SupportsIndex", Protocol),
            ("typing.SupportsInt", Protocol),
            ("typing.Sized", Protocol),
            ("typing.Sequence", Sequence),
            ("typing.Set", Set),
            ("typing.AbstractSet", AbstractSet),
            ("typing.Tuple", Tuple),
            ("typing.Type", Type),
            ("typing.Union", Union),
            ("types.UnionType", Union),
        ] {
            repr_to_sign.insert(repr.to_string(), sign);
        }

        let origins = [
            (List, &b.list),
            (Tuple, &b.tuple),
            (Dict, &b.dict),
            (Set, &b.set),
            (AbstractSet, &b.abstract_set),
            (FrozenSet, &b.frozenset),
            (Type, &b.type_),
            (Iterable, &b.iterable),
            (Collection, &b.collection),
            (Sequence, &b.sequence),
            (MutableSequence, &b.mutable_sequence),
            (Mapping, &b.mapping),
            (MutableMapping, &b.mutable_mapping),
        ];
        let mut origin_to_sign = HashMap::new();
        let mut sign_to_origin = BTreeMap::new();
        for (sign, cls) in origins {
            origin_to_sign.insert(cls.clone(), sign);
            sign_to_origin.insert(sign, cls.clone());
        }

        let deep = [
            Annotated, ForwardRef, Generic, IO, List, Literal, MutableSequence, NewType,
            NoReturn, Optional, Protocol, Sequence, Tuple, Type, TypeAlias, TypeVar, Union,
        ]
        .into_iter()
        .collect();

        Self {
            repr_to_sign,
            origin_to_sign,
            sign_to_origin,
            deep,
            union: [Union, Optional].into_iter().collect(),
            sequence_args_1: [List, Sequence, MutableSequence].into_iter().collect(),
            root_only: [NoReturn].into_iter().collect(),
        }
    }

    /// Classify `hint`, or `None` when it is not a recognized parametrized form
    /// (a plain class, `None`, or an arbitrary object).
    pub fn sign_of(&self, hint: &Hint) -> Option<HintSign> {
        match hint.kind() {
            HintKind::Class(cls) => {
                if cls.is_generic() {
                    Some(HintSign::Generic)
                } else {
                    None
                }
            }
            HintKind::None | HintKind::Ellipsis | HintKind::Object(_) => None,
            HintKind::Special(name) => self.repr_to_sign.get(name).copied(),
            HintKind::Subscripted { origin, .. } => match origin {
                HintOrigin::Special(name) => self.repr_to_sign.get(name).copied(),
                HintOrigin::Class(cls) => match self.origin_to_sign.get(cls) {
                    Some(sign) => Some(*sign),
                    None if cls.is_generic() => Some(HintSign::Generic),
                    None => None,
                },
                HintOrigin::Alias(_) => Some(HintSign::TypeAlias),
            },
            HintKind::Literal(_) => Some(HintSign::Literal),
            HintKind::Annotated { .. } => Some(HintSign::Annotated),
            HintKind::ForwardRef(_) | HintKind::ForwardRefProxy(_) => Some(HintSign::ForwardRef),
            HintKind::TypeVar(_) => Some(HintSign::TypeVar),
            HintKind::TypeAlias(_) => Some(HintSign::TypeAlias),
            HintKind::NewType { .. } => Some(HintSign::NewType),
        }
    }

    pub fn is_deep(&self, sign: HintSign) -> bool {
        self.deep.contains(&sign)
    }

    pub fn is_union(&self, sign: HintSign) -> bool {
        self.union.contains(&sign)
    }

    pub fn is_sequence_args_1(&self, sign: HintSign) -> bool {
        self.sequence_args_1.contains(&sign)
    }

    pub fn is_root_only(&self, sign: HintSign) -> bool {
        self.root_only.contains(&sign)
    }

    pub fn origin_type(&self, sign: HintSign) -> Option<&ClassRef> {
        self.sign_to_origin.get(&sign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_and_builtin_spellings_share_a_sign() {
        let signs = SignRegistry::builtin();
        let int = Hint::class(&builtins().int);
        let a = Hint::typing("typing.List", vec![int.clone()]);
        let b = Hint::list(int.clone());
        assert_eq!(signs.sign_of(&a), Some(HintSign::List));
        assert_eq!(signs.sign_of(&b), Some(HintSign::List));

        let u1 = Hint::typing("typing.Union", vec![int.clone(), Hint::none()]);
        let u2 = Hint::typing("types.UnionType", vec![int, Hint::none()]);
        assert_eq!(signs.sign_of(&u1), signs.sign_of(&u2));
    }

    #[test]
    fn plain_classes_have_no_sign() {
        let signs = SignRegistry::builtin();
        assert_eq!(signs.sign_of(&Hint::class(&builtins().int)), None);
        assert_eq!(signs.sign_of(&Hint::none()), None);
    }

    #[test]
    fn shallow_only_signs_still_have_an_origin() {
        let signs = SignRegistry::builtin();
        assert!(!signs.is_deep(HintSign::Dict));
        assert_eq!(signs.origin_type(HintSign::Dict), Some(&builtins().dict));
        assert!(signs.is_sequence_args_1(HintSign::List));
        assert!(signs.is_root_only(HintSign::NoReturn));
    }

    #[test]
    fn abstract_set_keeps_its_abstract_origin() {
        let signs = SignRegistry::builtin();
        let b = builtins();
        let int = Hint::class(&b.int);
        let typing = Hint::typing("typing.AbstractSet", vec![int.clone()]);
        let abc = Hint::subscript(&b.abstract_set, vec![int]);
        assert_eq!(signs.sign_of(&typing), Some(HintSign::AbstractSet));
        assert_eq!(signs.sign_of(&abc), Some(HintSign::AbstractSet));
        assert_eq!(signs.origin_type(HintSign::AbstractSet), Some(&b.abstract_set));
        assert_eq!(signs.origin_type(HintSign::Set), Some(&b.set));
    }
}
