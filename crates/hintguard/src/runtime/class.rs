use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::hint::{Hint, TypeVarDef};
use crate::runtime::value::Value;

pub const BUILTINS_MODULE: &str = "builtins";
pub const ABC_MODULE: &str = "collections.abc";
pub const ADAPTERS_MODULE: &str = "hintguard.adapters";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Concrete,
    /// Instance checks are structural: every declared attribute must be present.
    Protocol,
}

pub struct ClassDef {
    pub name: String,
    pub module: String,
    pub bases: Vec<ClassRef>,
    pub attrs: BTreeSet<String>,
    pub kind: ClassKind,
    pub type_params: Vec<Arc<TypeVarDef>>,
    /// Unerased generic bases, e.g. `list[T]` or `Generic[T]`.
    pub orig_bases: Vec<Hint>,
}

#[derive(Clone)]
pub struct ClassRef(Arc<ClassDef>);

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ClassRef {}

impl Hash for ClassRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<class '{}'>", self.qualname())
    }
}

impl ClassRef {
    pub fn builder(module: &str, name: &str) -> ClassBuilder {
        ClassBuilder {
            def: ClassDef {
                name: name.to_string(),
                module: module.to_string(),
                bases: Vec::new(),
                attrs: BTreeSet::new(),
                kind: ClassKind::Concrete,
                type_params: Vec::new(),
                orig_bases: Vec::new(),
            },
        }
    }

    pub fn def(&self) -> &ClassDef {
        &self.0
    }

    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const u8 as usize
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn module(&self) -> &str {
        &self.0.module
    }

    pub fn qualname(&self) -> String {
        if self.0.module == BUILTINS_MODULE {
            self.0.name.clone()
        } else {
            format!("{}.{}", self.0.module, self.0.name)
        }
    }

    pub fn is_protocol(&self) -> bool {
        self.0.kind == ClassKind::Protocol
    }

    pub fn is_generic(&self) -> bool {
        !self.0.orig_bases.is_empty()
    }

    /// Depth-first, left-to-right linearization with duplicates removed.
    pub fn mro(&self) -> Vec<ClassRef> {
        let mut out: Vec<ClassRef> = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(cls) = stack.pop() {
            if out.iter().any(|c| c == &cls) {
                continue;
            }
            for base in cls.0.bases.iter().rev() {
                stack.push(base.clone());
            }
            out.push(cls);
        }
        out
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.mro().iter().any(|c| c.0.attrs.contains(name))
    }

    /// Attributes a structural check demands: the protocol's own plus those of its
    /// protocol bases.
    pub fn protocol_attrs(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for cls in self.mro() {
            if cls.is_protocol() {
                out.extend(cls.0.attrs.iter().cloned());
            }
        }
        out
    }

    pub fn is_subclass(&self, other: &ClassRef) -> bool {
        if self == other {
            return true;
        }
        let mro = self.mro();
        if mro.iter().any(|c| c == other) {
            return true;
        }
        if other.is_protocol() {
            return other.protocol_attrs().iter().all(|a| self.has_attr(a));
        }
        false
    }

    pub fn is_instance(&self, value: &Value) -> bool {
        let cls = value.class();
        if cls.is_subclass(self) {
            return true;
        }
        if self.is_protocol() {
            return self
                .protocol_attrs()
                .iter()
                .all(|a| cls.has_attr(a) || value.has_instance_attr(a));
        }
        false
    }
}

pub struct ClassBuilder {
    def: ClassDef,
}

impl ClassBuilder {
    pub fn base(mut self, base: &ClassRef) -> Self {
        self.def.bases.push(base.clone());
        self
    }

    pub fn attr(mut self, name: &str) -> Self {
        self.def.attrs.insert(name.to_string());
        self
    }

    pub fn attrs<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        for name in names {
            self.def.attrs.insert(name.to_string());
        }
        self
    }

    pub fn protocol(mut self) -> Self {
        self.def.kind = ClassKind::Protocol;
        self
    }

    pub fn type_param(mut self, tv: &Arc<TypeVarDef>) -> Self {
        self.def.type_params.push(tv.clone());
        self
    }

    /// Record an unerased generic base. A subscripted class base also becomes a
    /// real base so nominal checks keep working.
    pub fn generic_base(mut self, hint: Hint) -> Self {
        if let Some(origin) = hint.origin_class() {
            if !self.def.bases.contains(&origin) {
                self.def.bases.push(origin);
            }
        }
        self.def.orig_bases.push(hint);
        self
    }

    pub fn build(mut self) -> ClassRef {
        if self.def.bases.is_empty() && self.def.name != "object" {
            self.def.bases.push(builtins().object.clone());
        }
        ClassRef(Arc::new(self.def))
    }
}

pub struct Builtins {
    pub object: ClassRef,
    pub none_type: ClassRef,
    pub int: ClassRef,
    pub bool_: ClassRef,
    pub float: ClassRef,
    pub str_: ClassRef,
    pub bytes: ClassRef,
    pub list: ClassRef,
    pub tuple: ClassRef,
    pub dict: ClassRef,
    pub set: ClassRef,
    pub frozenset: ClassRef,
    pub type_: ClassRef,

    pub iterable: ClassRef,
    pub collection: ClassRef,
    pub sequence: ClassRef,
    pub mutable_sequence: ClassRef,
    pub mapping: ClassRef,
    pub mutable_mapping: ClassRef,
    pub abstract_set: ClassRef,

    pub supports_int: ClassRef,
    pub supports_float: ClassRef,
    pub supports_index: ClassRef,
    pub supports_abs: ClassRef,
    pub sized: ClassRef,
    pub io: ClassRef,
    pub binary_io: ClassRef,
    pub text_io: ClassRef,
}

const IO_ATTRS: &[&str] = &[
    "__enter__",
    "__exit__",
    "close",
    "closed",
    "fileno",
    "flush",
    "isatty",
    "read",
    "readable",
    "readline",
    "readlines",
    "seek",
    "seekable",
    "tell",
    "truncate",
    "writable",
    "write",
    "writelines",
];

fn raw_class(module: &str, name: &str, bases: &[&ClassRef], attrs: &[&str]) -> ClassRef {
    ClassRef(Arc::new(ClassDef {
        name: name.to_string(),
        module: module.to_string(),
        bases: bases.iter().map(|b| (*b).clone()).collect(),
        attrs: attrs.iter().map(|a| a.to_string()).collect(),
        kind: ClassKind::Concrete,
        type_params: Vec::new(),
        orig_bases: Vec::new(),
    }))
}

fn raw_protocol(name: &str, bases: &[&ClassRef], attrs: &[&str]) -> ClassRef {
    ClassRef(Arc::new(ClassDef {
        name: name.to_string(),
        module: ADAPTERS_MODULE.to_string(),
        bases: bases.iter().map(|b| (*b).clone()).collect(),
        attrs: attrs.iter().map(|a| a.to_string()).collect(),
        kind: ClassKind::Protocol,
        type_params: Vec::new(),
        orig_bases: Vec::new(),
    }))
}

static BUILTINS: Lazy<Builtins> = Lazy::new(|| {
    let b = BUILTINS_MODULE;
    let object = raw_class(b, "object", &[], &["__eq__", "__hash__", "__repr__"]);
    let none_type = raw_class(b, "NoneType", &[&object], &[]);

    let iterable = raw_class(ABC_MODULE, "Iterable", &[&object], &["__iter__"]);
    let collection = raw_class(
        ABC_MODULE,
        "Collection",
        &[&iterable],
        &["__len__", "__contains__"],
    );
    let sequence = raw_class(ABC_MODULE, "Sequence", &[&collection], &["__getitem__"]);
    let mutable_sequence = raw_class(
        ABC_MODULE,
        "MutableSequence",
        &[&sequence],
        &["__setitem__", "__delitem__", "insert"],
    );
    let mapping = raw_class(ABC_MODULE, "Mapping", &[&collection], &["__getitem__", "keys"]);
    let mutable_mapping = raw_class(
        ABC_MODULE,
        "MutableMapping",
        &[&mapping],
        &["__setitem__", "__delitem__"],
    );
    let abstract_set = raw_class(ABC_MODULE, "Set", &[&collection], &[]);

    let int = raw_class(
        b,
        "int",
        &[&object],
        &["__int__", "__float__", "__index__", "__abs__"],
    );
    let bool_ = raw_class(b, "bool", &[&int], &[]);
    let float = raw_class(b, "float", &[&object], &["__int__", "__float__", "__abs__"]);
    let str_ = raw_class(b, "str", &[&sequence], &[]);
    let bytes = raw_class(b, "bytes", &[&sequence], &[]);
    let list = raw_class(b, "list", &[&mutable_sequence], &[]);
    let tuple = raw_class(b, "tuple", &[&sequence], &[]);
    let dict = raw_class(b, "dict", &[&mutable_mapping], &[]);
    let set = raw_class(b, "set", &[&abstract_set], &["add", "discard"]);
    let frozenset = raw_class(b, "frozenset", &[&abstract_set], &[]);
    let type_ = raw_class(b, "type", &[&object], &["__call__", "__name__"]);

    let supports_int = raw_protocol("SupportsInt", &[&object], &["__int__"]);
    let supports_float = raw_protocol("SupportsFloat", &[&object], &["__float__"]);
    let supports_index = raw_protocol("SupportsIndex", &[&object], &["__index__"]);
    let supports_abs = raw_protocol("SupportsAbs", &[&object], &["__abs__"]);
    let sized = raw_protocol("Sized", &[&object], &["__len__"]);
    let io = raw_protocol("IO", &[&object], IO_ATTRS);
    let binary_io = raw_protocol("BinaryIO", &[&io], &["readinto"]);
    let text_io = raw_protocol(
        "TextIO",
        &[&io],
        &["buffer", "encoding", "errors", "line_buffering", "newlines"],
    );

    Builtins {
        object,
        none_type,
        int,
        bool_,
        float,
        str_,
        bytes,
        list,
        tuple,
        dict,
        set,
        frozenset,
        type_,
        iterable,
        collection,
        sequence,
        mutable_sequence,
        mapping,
        mutable_mapping,
        abstract_set,
        supports_int,
        supports_float,
        supports_index,
        supports_abs,
        sized,
        io,
        binary_io,
        text_io,
    }
});

pub fn builtins() -> &'static Builtins {
    &BUILTINS
}

impl Builtins {
    /// Look up a builtin or `collections.abc` class by its textual name.
    pub fn by_name(&self, name: &str) -> Option<ClassRef> {
        let cls = match name {
            "object" => &self.object,
            "NoneType" => &self.none_type,
            "int" => &self.int,
            "bool" => &self.bool_,
            "float" => &self.float,
            "str" => &self.str_,
            "bytes" => &self.bytes,
            "list" => &self.list,
            "tuple" => &self.tuple,
            "dict" => &self.dict,
            "set" => &self.set,
            "frozenset" => &self.frozenset,
            "type" => &self.type_,
            "collections.abc.Iterable" => &self.iterable,
            "collections.abc.Collection" => &self.collection,
            "collections.abc.Sequence" => &self.sequence,
            "collections.abc.MutableSequence" => &self.mutable_sequence,
            "collections.abc.Mapping" => &self.mapping,
            "collections.abc.MutableMapping" => &self.mutable_mapping,
            "collections.abc.Set" => &self.abstract_set,
            _ => return None,
        };
        Some(cls.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_is_an_int_and_list_is_a_sequence() {
        let b = builtins();
        assert!(b.bool_.is_subclass(&b.int));
        assert!(b.list.is_subclass(&b.sequence));
        assert!(b.list.is_subclass(&b.collection));
        assert!(!b.tuple.is_subclass(&b.mutable_sequence));
        assert!(!b.int.is_subclass(&b.float));
    }

    #[test]
    fn protocol_checks_are_structural() {
        let b = builtins();
        assert!(b.supports_int.is_instance(&Value::Float(1.5)));
        assert!(b.sized.is_instance(&Value::str("abc")));
        assert!(!b.sized.is_instance(&Value::Int(3)));
    }

    #[test]
    fn user_class_mro_walks_bases_once() {
        let b = builtins();
        let base = ClassRef::builder("app", "Base").attr("run").build();
        let left = ClassRef::builder("app", "Left").base(&base).build();
        let right = ClassRef::builder("app", "Right").base(&base).build();
        let child = ClassRef::builder("app", "Child")
            .base(&left)
            .base(&right)
            .build();
        let mro = child.mro();
        assert_eq!(mro.iter().filter(|c| **c == base).count(), 1);
        assert!(child.is_subclass(&b.object));
        assert!(child.has_attr("run"));
    }
}
