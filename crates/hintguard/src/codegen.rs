//! Breadth-first code generation: decompose one root hint into a flat check
//! expression, parameterized over the pith it will be applied to.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::CheckConfig;
use crate::error::{HintError, HintErrorKind};
use crate::forward_ref::ForwardRefRegistry;
use crate::hint::{Hint, HintId, HintKind};
use crate::language::{self, INDENT_BASE, INDENT_LEVEL, PITH_ROOT_PLACEHOLDER};
use crate::reduce::{reduce, HintSane, ReduceContext, Reduced};
use crate::runtime::class::{builtins, ClassRef};
use crate::runtime::value::Value;
use crate::scope::{Scope, ScopeObj};
use crate::sign::{HintSign, SignRegistry};

/// Generated, slot-agnostic checking code for one root hint.
#[derive(Debug)]
pub struct CheckCode {
    /// Check expression containing `@{pith}!` and possibly `@<Name>!` placeholders.
    pub template: String,
    pub scope: Scope,
    pub needs_random_index: bool,
    /// Bare relative forward-reference names, in discovery order.
    pub forward_ref_names: Vec<String>,
    pub hint: Hint,
    /// Sign of the root hint after reduction.
    pub root_sign: Option<HintSign>,
}

struct CacheEntry {
    // Holding the hint keeps its identity from being reused by another hint.
    _hint: Hint,
    code: Option<Arc<CheckCode>>,
}

/// Memo of generated code keyed by root-hint identity and configuration.
#[derive(Default)]
pub struct CodeCache {
    entries: Mutex<HashMap<(HintId, CheckConfig), CacheEntry>>,
}

impl CodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Some(None)` is a cached "ignorable" result.
    pub fn get(&self, hint: &Hint, config: &CheckConfig) -> Option<Option<Arc<CheckCode>>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(&(hint.id(), *config)).map(|e| e.code.clone())
    }

    pub fn insert(&self, hint: &Hint, config: &CheckConfig, code: Option<Arc<CheckCode>>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            (hint.id(), *config),
            CacheEntry {
                _hint: hint.clone(),
                code,
            },
        );
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }
}

pub struct CodeGenerator<'a> {
    pub signs: &'a SignRegistry,
    pub config: &'a CheckConfig,
    pub registry: &'a ForwardRefRegistry,
    pub exception_prefix: &'a str,
}

struct Entry {
    sane: HintSane,
    placeholder: String,
    pith: String,
    indent: String,
    depth: usize,
}

struct Traversal<'g, 'a> {
    gen: &'g CodeGenerator<'a>,
    root: Hint,
    queue: Vec<Option<Entry>>,
    scope: Scope,
    needs_random_index: bool,
    forward_ref_names: Vec<String>,
    next_pith_local: usize,
}

impl<'a> CodeGenerator<'a> {
    fn reduce_cx(&self) -> ReduceContext<'a> {
        ReduceContext {
            signs: self.signs,
            config: self.config,
            exception_prefix: self.exception_prefix,
        }
    }

    /// Generate checking code for `hint`, or `None` when the hint is ignorable.
    pub fn generate(&self, hint: &Hint) -> Result<Option<CheckCode>, HintError> {
        let root_sane = match reduce(hint, None, &self.reduce_cx())? {
            Reduced::Ignorable => {
                tracing::debug!(target: "hintguard::codegen", hint = %hint, "ignorable root hint");
                return Ok(None);
            }
            Reduced::Sane(sane) => sane,
        };
        let root_sign = self.signs.sign_of(&root_sane.hint);

        let mut t = Traversal {
            gen: self,
            root: hint.clone(),
            queue: Vec::new(),
            scope: Scope::new(),
            needs_random_index: false,
            forward_ref_names: Vec::new(),
            next_pith_local: 0,
        };
        let seed = t.enqueue(root_sane, PITH_ROOT_PLACEHOLDER.to_string(), INDENT_BASE, 0)?;
        let mut template = seed.clone();

        let mut index = 0;
        while index < t.queue.len() {
            let entry = t.queue[index].take().ok_or_else(|| {
                HintError::internal(format!("work queue slot {index} already consumed"))
            })?;
            let code = t.expand(&entry, index == 0)?;
            if !template.contains(&entry.placeholder) {
                return Err(HintError::internal(format!(
                    "placeholder {} missing from template for {}",
                    entry.placeholder, t.root
                )));
            }
            template = template.replacen(&entry.placeholder, &code, 1);
            index += 1;
        }

        if template == seed {
            return Err(HintError::internal(format!(
                "no checking code generated for {}",
                t.root
            )));
        }
        if template.contains(language::CHILD_PLACEHOLDER_PREFIX) {
            return Err(HintError::internal(format!(
                "unsubstituted child placeholder left in code for {}",
                t.root
            )));
        }

        let violation = if t.needs_random_index {
            format!(
                "{}({PITH_ROOT_PLACEHOLDER}, {}, {})",
                language::NAME_VIOLATION,
                language::NAME_HINT_ROOT,
                language::NAME_RANDOM
            )
        } else {
            format!(
                "{}({PITH_ROOT_PLACEHOLDER}, {})",
                language::NAME_VIOLATION,
                language::NAME_HINT_ROOT
            )
        };
        let template = format!("(\n{INDENT_BASE}{template}\n{INDENT_BASE}or {violation}\n)");
        t.scope
            .set(language::NAME_HINT_ROOT, ScopeObj::Hint(hint.clone()));

        tracing::debug!(
            target: "hintguard::codegen",
            hint = %hint,
            children = t.queue.len(),
            needs_random_index = t.needs_random_index,
            "generated check code"
        );
        if self.config.is_debug {
            tracing::debug!(target: "hintguard::codegen", hint = %hint, code = %template);
        }

        Ok(Some(CheckCode {
            template,
            scope: t.scope,
            needs_random_index: t.needs_random_index,
            forward_ref_names: t.forward_ref_names,
            hint: hint.clone(),
            root_sign,
        }))
    }
}

impl Traversal<'_, '_> {
    fn enqueue(
        &mut self,
        sane: HintSane,
        pith: String,
        indent: &str,
        depth: usize,
    ) -> Result<String, HintError> {
        if depth > language::limits::MAX_HINT_DEPTH {
            return Err(HintError::unsupported(format!(
                "{}type hint {} nests child type hint {} more than {} levels deep",
                self.gen.exception_prefix,
                self.root,
                sane.hint,
                language::limits::MAX_HINT_DEPTH
            )));
        }
        if self.queue.len() >= self.gen.config.max_hint_children {
            return Err(HintError::internal(format!(
                "type hint {} expands into more than {} child hints",
                self.root, self.gen.config.max_hint_children
            )));
        }
        let placeholder = language::child_placeholder(self.queue.len());
        self.queue.push(Some(Entry {
            sane,
            placeholder: placeholder.clone(),
            pith,
            indent: indent.to_string(),
            depth,
        }));
        Ok(placeholder)
    }

    /// Bind a computed pith once: the first evaluated use assigns, later uses read
    /// the local.
    fn bind_pith(&mut self, pith: &str) -> (String, String) {
        if pith == PITH_ROOT_PLACEHOLDER || language::is_identifier(pith) {
            return (pith.to_string(), pith.to_string());
        }
        let local = format!("{}{}", language::PITH_LOCAL_PREFIX, self.next_pith_local);
        self.next_pith_local += 1;
        (format!("({local} := {pith})"), local)
    }

    fn reduce_child(&self, hint: &Hint, parent: &HintSane) -> Result<Reduced, HintError> {
        reduce(hint, Some(parent), &self.gen.reduce_cx())
    }

    fn unsupported(&self, hint: &Hint) -> HintError {
        let prefix = self.gen.exception_prefix;
        if hint.ptr_eq(&self.root) {
            HintError::unsupported(format!("{prefix}type hint {hint} unsupported"))
        } else {
            HintError::unsupported(format!(
                "{prefix}type hint {} child type hint {hint} unsupported",
                self.root
            ))
        }
    }

    fn is_union(&self, hint: &Hint) -> bool {
        let signs = self.gen.signs;
        signs.sign_of(hint).is_some_and(|s| signs.is_union(s))
    }

    /// A plain class with no sign of its own is checked by `isinstance` alone.
    fn shallow_class(&self, hint: &Hint) -> Option<ClassRef> {
        match hint.kind() {
            HintKind::Class(cls) if self.gen.signs.sign_of(hint).is_none() => Some(cls.clone()),
            _ => None,
        }
    }

    fn isinstance(&mut self, pith: &str, classes: &[ClassRef]) -> String {
        let name = self.scope.add_types(classes);
        format!("isinstance({pith}, {name})")
    }

    fn block(indent: &str, clauses: &[String], op: &str) -> String {
        if let [only] = clauses {
            return only.clone();
        }
        let inner = format!("{indent}{INDENT_LEVEL}");
        format!(
            "(\n{inner}{}\n{indent})",
            clauses.join(&format!(" {op}\n{inner}"))
        )
    }

    fn expand(&mut self, entry: &Entry, is_root: bool) -> Result<String, HintError> {
        let hint = entry.sane.hint.clone();
        let signs = self.gen.signs;
        let Some(sign) = signs.sign_of(&hint) else {
            return match hint.kind() {
                HintKind::Class(cls) => Ok(self.isinstance(&entry.pith, &[cls.clone()])),
                _ => Err(self.unsupported(&hint)),
            };
        };

        if signs.is_root_only(sign) {
            if is_root {
                return Ok("False".to_string());
            }
            return Err(HintError::new(
                HintErrorKind::Misplaced,
                format!(
                    "{}type hint {} child type hint {hint} is only valid as a return hint \
                     at the top level",
                    self.gen.exception_prefix, self.root
                ),
            ));
        }
        if signs.is_union(sign) {
            return self.expand_union(entry, &hint);
        }
        match sign {
            HintSign::Generic => return self.expand_generic(entry, &hint),
            HintSign::ForwardRef => return self.expand_forward_ref(entry, &hint),
            _ => {}
        }

        if matches!(hint.kind(), HintKind::Special(_)) || !signs.is_deep(sign) {
            return self.expand_shallow(entry, &hint, sign);
        }
        match sign {
            HintSign::Literal => self.expand_literal(entry, &hint),
            HintSign::Tuple => self.expand_tuple(entry, &hint),
            HintSign::Type => self.expand_type(entry, &hint),
            s if signs.is_sequence_args_1(s) => {
                let args = hint.args();
                if args.len() != 1 {
                    return Err(self.unsupported(&hint));
                }
                let origin = self.origin(&hint, s)?;
                self.expand_sequence(entry, &args[0], origin)
            }
            _ => Err(self.unsupported(&hint)),
        }
    }

    fn origin(&self, hint: &Hint, sign: HintSign) -> Result<ClassRef, HintError> {
        hint.origin_class()
            .or_else(|| self.gen.signs.origin_type(sign).cloned())
            .ok_or_else(|| self.unsupported(hint))
    }

    fn expand_shallow(
        &mut self,
        entry: &Entry,
        hint: &Hint,
        sign: HintSign,
    ) -> Result<String, HintError> {
        let origin = self.origin(hint, sign)?;
        Ok(self.isinstance(&entry.pith, &[origin]))
    }

    fn expand_union(&mut self, entry: &Entry, hint: &Hint) -> Result<String, HintError> {
        if hint.args().is_empty() {
            return Err(self.unsupported(hint));
        }
        let mut shallow: Vec<ClassRef> = Vec::new();
        let mut deep: Vec<HintSane> = Vec::new();
        for member in hint.args() {
            match self.reduce_child(member, &entry.sane)? {
                Reduced::Ignorable => continue,
                Reduced::Sane(sane) => match self.shallow_class(&sane.hint) {
                    Some(cls) => {
                        if !shallow.contains(&cls) {
                            shallow.push(cls);
                        }
                    }
                    None => deep.push(sane),
                },
            }
        }
        if shallow.is_empty() && deep.is_empty() {
            return Err(HintError::internal(format!(
                "union {hint} in {} has no checkable members",
                self.root
            )));
        }

        let child_indent = format!("{}{INDENT_LEVEL}", entry.indent);
        let mut clauses = Vec::new();
        let child_pith = if shallow.is_empty() {
            entry.pith.clone()
        } else {
            let (first, rest) = self.bind_pith(&entry.pith);
            clauses.push(self.isinstance(&first, &shallow));
            rest
        };
        for sane in deep {
            clauses.push(self.enqueue(sane, child_pith.clone(), &child_indent, entry.depth + 1)?);
        }
        Ok(Self::block(&entry.indent, &clauses, "or"))
    }

    fn expand_generic(&mut self, entry: &Entry, hint: &Hint) -> Result<String, HintError> {
        let cls = hint.origin_class().ok_or_else(|| self.unsupported(hint))?;

        let mut children = Vec::new();
        for base in &cls.def().orig_bases {
            match self.reduce_child(base, &entry.sane)? {
                Reduced::Ignorable => {}
                Reduced::Sane(sane) => {
                    if self.shallow_class(&sane.hint).is_none() {
                        children.push(sane.guarding(base));
                    }
                }
            }
        }

        let (first, rest) = if children.is_empty() {
            (entry.pith.clone(), entry.pith.clone())
        } else {
            self.bind_pith(&entry.pith)
        };
        let child_indent = format!("{}{INDENT_LEVEL}", entry.indent);
        let mut clauses = vec![self.isinstance(&first, &[cls])];
        for sane in children {
            clauses.push(self.enqueue(sane, rest.clone(), &child_indent, entry.depth + 1)?);
        }
        Ok(Self::block(&entry.indent, &clauses, "and"))
    }

    fn expand_forward_ref(&mut self, entry: &Entry, hint: &Hint) -> Result<String, HintError> {
        let target = self.forward_ref_target(hint)?;
        Ok(format!("{target}.is_instance({})", entry.pith))
    }

    /// Scope name of an absolute proxy, or the placeholder of a relative name.
    fn forward_ref_target(&mut self, hint: &Hint) -> Result<String, HintError> {
        match hint.kind() {
            HintKind::ForwardRefProxy(proxy) => Ok(self.scope.add_forward_ref(proxy)),
            HintKind::ForwardRef(name) if name.contains('.') => {
                let proxy = self
                    .gen
                    .registry
                    .make_absolute(name)
                    .ok_or_else(|| self.unsupported(hint))?;
                Ok(self.scope.add_forward_ref(&proxy))
            }
            HintKind::ForwardRef(name)
                if language::is_identifier(name) && !language::is_keyword(name) =>
            {
                if !self.forward_ref_names.iter().any(|n| n == name) {
                    self.forward_ref_names.push(name.clone());
                }
                Ok(language::forward_ref_placeholder(name))
            }
            _ => Err(self.unsupported(hint)),
        }
    }

    fn expand_literal(&mut self, entry: &Entry, hint: &Hint) -> Result<String, HintError> {
        let HintKind::Literal(values) = hint.kind() else {
            return Err(self.unsupported(hint));
        };
        if values.is_empty() {
            return Err(self.unsupported(hint));
        }
        let mut classes: Vec<ClassRef> = Vec::new();
        for value in values {
            if !matches!(
                value,
                Value::None | Value::Bool(_) | Value::Int(_) | Value::Str(_) | Value::Bytes(_)
            ) {
                return Err(self.unsupported(hint));
            }
            let cls = value.class();
            if !classes.contains(&cls) {
                classes.push(cls);
            }
        }

        let (first, rest) = self.bind_pith(&entry.pith);
        let type_check = self.isinstance(&first, &classes);
        let mut equals = Vec::new();
        for value in values {
            let name = self.scope.add_const(value);
            equals.push(format!("{rest} == {name}"));
        }
        let child_indent = format!("{}{INDENT_LEVEL}", entry.indent);
        let equals = Self::block(&child_indent, &equals, "or");
        Ok(Self::block(&entry.indent, &[type_check, equals], "and"))
    }

    fn expand_tuple(&mut self, entry: &Entry, hint: &Hint) -> Result<String, HintError> {
        let origin = self.origin(hint, HintSign::Tuple)?;
        let args = hint.args();
        if args.len() == 2 && args[1].is_ellipsis() {
            return self.expand_sequence(entry, &args[0], origin);
        }
        if args.iter().any(Hint::is_ellipsis) {
            return Err(self.unsupported(hint));
        }

        let (first, rest) = self.bind_pith(&entry.pith);
        let type_check = self.isinstance(&first, &[origin]);
        if args.is_empty() {
            return Ok(Self::block(
                &entry.indent,
                &[type_check, format!("not {rest}")],
                "and",
            ));
        }

        let child_indent = format!("{}{INDENT_LEVEL}", entry.indent);
        let mut clauses = vec![type_check, format!("len({rest}) == {}", args.len())];
        for (i, arg) in args.iter().enumerate() {
            if let Reduced::Sane(sane) = self.reduce_child(arg, &entry.sane)? {
                clauses.push(self.enqueue(sane, format!("{rest}[{i}]"), &child_indent, entry.depth + 1)?);
            }
        }
        Ok(Self::block(&entry.indent, &clauses, "and"))
    }

    /// Check the container type and one pseudo-randomly sampled item.
    fn expand_sequence(
        &mut self,
        entry: &Entry,
        item: &Hint,
        origin: ClassRef,
    ) -> Result<String, HintError> {
        let sane = match self.reduce_child(item, &entry.sane)? {
            Reduced::Ignorable => return Ok(self.isinstance(&entry.pith, &[origin])),
            Reduced::Sane(sane) => sane,
        };
        self.needs_random_index = true;
        let (first, rest) = self.bind_pith(&entry.pith);
        let type_check = self.isinstance(&first, &[origin]);
        let child_indent = format!("{}{INDENT_LEVEL}", entry.indent);
        let item_pith = format!("{rest}[{} % len({rest})]", language::NAME_RANDOM);
        let placeholder = self.enqueue(sane, item_pith, &child_indent, entry.depth + 1)?;
        Ok(Self::block(
            &entry.indent,
            &[type_check, format!("(not {rest} or {placeholder})")],
            "and",
        ))
    }

    fn expand_type(&mut self, entry: &Entry, hint: &Hint) -> Result<String, HintError> {
        let type_ = builtins().type_.clone();
        let [arg] = hint.args() else {
            return Err(self.unsupported(hint));
        };
        let sane = match self.reduce_child(arg, &entry.sane)? {
            Reduced::Ignorable => return Ok(self.isinstance(&entry.pith, &[type_])),
            Reduced::Sane(sane) => sane,
        };

        let target = match sane.hint.kind() {
            HintKind::Class(cls) => SubclassTarget::Classes(vec![cls.clone()]),
            HintKind::ForwardRef(_) | HintKind::ForwardRefProxy(_) => {
                SubclassTarget::Proxy(self.forward_ref_target(&sane.hint)?)
            }
            _ if self.is_union(&sane.hint) => {
                let mut classes = Vec::new();
                for member in sane.hint.args() {
                    match self.reduce_child(member, &sane)? {
                        Reduced::Sane(m) => match m.hint.as_class() {
                            Some(cls) => classes.push(cls.clone()),
                            None => return Err(self.unsupported(hint)),
                        },
                        Reduced::Ignorable => {
                            return Ok(self.isinstance(&entry.pith, &[type_]))
                        }
                    }
                }
                SubclassTarget::Classes(classes)
            }
            _ => return Err(self.unsupported(hint)),
        };

        let (first, rest) = self.bind_pith(&entry.pith);
        let type_check = self.isinstance(&first, &[type_]);
        let subclass_check = match target {
            SubclassTarget::Classes(classes) => {
                let name = self.scope.add_types(&classes);
                format!("issubclass({rest}, {name})")
            }
            SubclassTarget::Proxy(target) => format!("{target}.is_subclass({rest})"),
        };
        Ok(Self::block(
            &entry.indent,
            &[type_check, subclass_check],
            "and",
        ))
    }
}

enum SubclassTarget {
    Classes(Vec<ClassRef>),
    Proxy(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::module::ModuleTable;

    fn generate(hint: &Hint) -> Result<Option<CheckCode>, HintError> {
        let registry = ForwardRefRegistry::new(Arc::new(ModuleTable::new()));
        let config = CheckConfig::default();
        CodeGenerator {
            signs: SignRegistry::builtin(),
            config: &config,
            registry: &registry,
            exception_prefix: "",
        }
        .generate(hint)
    }

    fn code(hint: &Hint) -> CheckCode {
        generate(hint).expect("generate").expect("not ignorable")
    }

    #[test]
    fn plain_class_is_one_isinstance() {
        let c = code(&Hint::class(&builtins().int));
        assert_eq!(
            c.template,
            "(\n    isinstance(@{pith}!, __hint_type_0)\n    or violation(@{pith}!, __hint_root)\n)"
        );
        assert!(!c.needs_random_index);
        assert!(matches!(c.scope.get("__hint_root"), Some(ScopeObj::Hint(_))));
    }

    #[test]
    fn list_samples_one_item_through_a_bound_local() {
        let c = code(&Hint::list(Hint::list(Hint::class(&builtins().int))));
        assert!(c.needs_random_index);
        assert!(c
            .template
            .contains("(__pith_0 := @{pith}![__random % len(@{pith}!)])"));
        assert!(c.template.contains("__pith_0[__random % len(__pith_0)]"));
        assert!(c.template.contains("violation(@{pith}!, __hint_root, __random)"));
    }

    #[test]
    fn union_checks_shallow_members_first() {
        let b = builtins();
        let c = code(&Hint::union(vec![
            Hint::list(Hint::class(&b.int)),
            Hint::class(&b.int),
            Hint::class(&b.str_),
        ]));
        let shallow = c.template.find("isinstance(@{pith}!, __hint_type_0)");
        let deep = c.template.find("__hint_type_1");
        assert!(shallow.is_some() && deep.is_some());
        assert!(shallow < deep, "{}", c.template);
        assert!(matches!(c.scope.get("__hint_type_0"), Some(ScopeObj::Types(cs)) if cs.len() == 2));
    }

    #[test]
    fn ignorable_root_generates_nothing() {
        assert!(generate(&Hint::any()).expect("generate").is_none());
    }

    #[test]
    fn ignorable_item_degrades_to_shallow_check() {
        let c = code(&Hint::list(Hint::any()));
        assert!(!c.needs_random_index);
        assert!(!c.template.contains("__random"));
    }

    #[test]
    fn empty_tuple_checks_emptiness() {
        let c = code(&Hint::tuple(vec![]));
        assert!(c.template.contains("not @{pith}!"), "{}", c.template);
    }

    #[test]
    fn fixed_tuple_checks_length_before_items() {
        let b = builtins();
        let c = code(&Hint::tuple(vec![Hint::class(&b.int), Hint::class(&b.str_)]));
        let len = c.template.find("len(@{pith}!) == 2").expect("length check");
        let item = c.template.find("@{pith}![0]").expect("item check");
        assert!(len < item);
    }

    #[test]
    fn relative_forward_refs_become_placeholders() {
        let c = code(&Hint::list(Hint::forward_ref("Foo")));
        assert_eq!(c.forward_ref_names, vec!["Foo".to_string()]);
        assert!(c.template.contains("@<Foo>!.is_instance("));
    }

    #[test]
    fn absolute_forward_refs_use_a_proxy() {
        let c = code(&Hint::forward_ref("pkg.mod.Foo"));
        assert!(c.forward_ref_names.is_empty());
        let Some(ScopeObj::ForwardRef(proxy)) = c.scope.get("__hint_fwd_0") else {
            panic!("missing proxy: {:?}", c.scope);
        };
        assert_eq!(proxy.module_name(), "pkg.mod");
        assert_eq!(proxy.attr_path(), "Foo");
    }

    #[test]
    fn nested_no_return_is_misplaced() {
        let h = Hint::list(Hint::special("typing.NoReturn"));
        let err = generate(&h).expect_err("misplaced");
        assert_eq!(err.kind, HintErrorKind::Misplaced);
        let root = code(&Hint::special("typing.NoReturn"));
        assert!(root.template.contains("False"));
    }

    #[test]
    fn unknown_objects_are_unsupported() {
        let err = generate(&Hint::object(Value::Int(3))).expect_err("unsupported");
        assert_eq!(err.kind, HintErrorKind::Unsupported);
        let nested = Hint::list(Hint::object(Value::Int(3)));
        let err = generate(&nested).expect_err("unsupported");
        assert!(err.message.contains("child type hint 3"), "{}", err.message);
    }

    #[test]
    fn child_cap_is_an_internal_error() {
        let registry = ForwardRefRegistry::new(Arc::new(ModuleTable::new()));
        let config = CheckConfig::default().with_max_hint_children(2);
        let b = builtins();
        let h = Hint::list(Hint::list(Hint::class(&b.int)));
        let err = CodeGenerator {
            signs: SignRegistry::builtin(),
            config: &config,
            registry: &registry,
            exception_prefix: "",
        }
        .generate(&h)
        .expect_err("cap");
        assert_eq!(err.kind, HintErrorKind::Internal);
    }

    #[test]
    fn shallow_only_containers_check_the_origin() {
        let b = builtins();
        let c = code(&Hint::dict(Hint::class(&b.str_), Hint::class(&b.int)));
        assert!(matches!(c.scope.get("__hint_type_0"), Some(ScopeObj::Class(cls)) if *cls == b.dict));
        assert!(!c.needs_random_index);
    }
}
