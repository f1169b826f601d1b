//! Universe documents: a JSON description of modules, the classes and hints they
//! declare, and the callables whose signatures get wrapped.
//!
//! Hints are JSON s-expressions. A string names something (`"int"`,
//! `"typing.Any"`, `"pkg.mod.Cls"`), a list applies a head to arguments
//! (`["list", "int"]`), `["ref", "Foo"]` is a string forward reference and
//! `null` is `None`. Values are plain JSON plus `$`-prefixed escapes for the
//! container types JSON lacks.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::{Arc, Weak};

use hintguard_contracts::{
    HINTGUARD_UNIVERSE_SCHEMA_VERSION, HINTGUARD_UNIVERSE_SCHEMA_VERSIONS_SUPPORTED,
};
use serde_json::{Map, Value as Json};

use crate::hint::{Hint, HintKind, NameError, TypeVarDef};
use crate::language;
use crate::runtime::{builtins, ClassRef, Instance, ModuleAttr, ModuleTable, Value};
use crate::wrapper::{CallableSig, ParamSig};

#[derive(Debug, Clone)]
pub struct UniverseError {
    pub message: String,
    pub ptr: String,
}

impl std::error::Error for UniverseError {}

impl Display for UniverseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.message, self.ptr)
    }
}

fn error(message: impl Into<String>, ptr: &str) -> UniverseError {
    UniverseError {
        message: message.into(),
        ptr: ptr.to_string(),
    }
}

#[derive(Debug, Clone)]
enum HintExpr {
    Name(String),
    Ref(String),
    Apply { head: String, args: Vec<HintExpr> },
    Literal(Vec<Value>),
    Annotated { hint: Box<HintExpr>, metadata: Vec<Value> },
}

fn is_special_name(name: &str) -> bool {
    name.starts_with("typing.") || name.starts_with("typing_extensions.") || name.starts_with("types.")
}

/// Name lookup in one module's namespace. Holds the table weakly so alias thunks
/// stored in that table do not keep it alive.
#[derive(Clone)]
struct Resolver {
    table: Weak<ModuleTable>,
    module: String,
}

impl Resolver {
    fn lookup(&self, name: &str) -> Result<Hint, NameError> {
        match name {
            "None" => return Ok(Hint::none()),
            "..." => return Ok(Hint::ellipsis()),
            _ if is_special_name(name) => return Ok(Hint::special(name)),
            _ => {}
        }
        let table = self.table.upgrade().ok_or_else(|| NameError::new(name))?;
        if let Some(hint) = table.get(&self.module).and_then(|m| m.hint(name).ok()) {
            return Ok(hint);
        }
        if let Some(cls) = builtins().by_name(name) {
            return Ok(Hint::class(&cls));
        }
        if let Some((module, attr)) = name.rsplit_once('.') {
            if let Some(m) = table.get(module) {
                return m.hint(attr);
            }
        }
        Err(NameError::new(name))
    }

    fn build(&self, expr: &HintExpr) -> Result<Hint, NameError> {
        Ok(match expr {
            HintExpr::Name(name) => self.lookup(name)?,
            HintExpr::Ref(name) => Hint::forward_ref(name),
            HintExpr::Literal(values) => Hint::literal(values.clone()),
            HintExpr::Annotated { hint, metadata } => {
                Hint::annotated(self.build(hint)?, metadata.clone())
            }
            HintExpr::Apply { head, args } => {
                let args = args
                    .iter()
                    .map(|a| self.build(a))
                    .collect::<Result<Vec<_>, _>>()?;
                if is_special_name(head) {
                    return Ok(Hint::typing(head, args));
                }
                let origin = self.lookup(head)?;
                match origin.kind() {
                    HintKind::Class(cls) => Hint::subscript(cls, args),
                    // Subscripting anything else yields a hint no sign recognizes.
                    _ => Hint::subscript_alias(&origin, args.clone())
                        .unwrap_or_else(|| Hint::typing(&origin.repr(), args)),
                }
            }
        })
    }

    fn build_at(&self, expr: &HintExpr, ptr: &str) -> Result<Hint, UniverseError> {
        self.build(expr).map_err(|e| error(e.to_string(), ptr))
    }

    fn class(&self, name: &str, ptr: &str) -> Result<ClassRef, UniverseError> {
        let hint = self.lookup(name).map_err(|e| error(e.to_string(), ptr))?;
        hint.as_class()
            .cloned()
            .ok_or_else(|| error(format!("{name:?} is not a class"), ptr))
    }
}

fn parse_hint_expr(v: &Json, ptr: &str, cx: &Resolver) -> Result<HintExpr, UniverseError> {
    match v {
        Json::Null => Ok(HintExpr::Name("None".to_string())),
        Json::String(s) if !s.is_empty() => Ok(HintExpr::Name(s.clone())),
        Json::String(_) => Err(error("hint name must not be empty", ptr)),
        Json::Array(items) => {
            let Some(head) = items.first() else {
                return Err(error("hint expression list must not be empty", ptr));
            };
            let head = head
                .as_str()
                .ok_or_else(|| error("hint expression head must be a string", &format!("{ptr}/0")))?;
            let rest = &items[1..];
            match head {
                "ref" => match rest {
                    [Json::String(name)] if !name.is_empty() => Ok(HintExpr::Ref(name.clone())),
                    _ => Err(error("forward reference must be [\"ref\", <name>]", ptr)),
                },
                "typing.Literal" | "typing_extensions.Literal" => {
                    if rest.is_empty() {
                        return Err(error("Literal needs at least one value", ptr));
                    }
                    let values = rest
                        .iter()
                        .enumerate()
                        .map(|(i, item)| parse_value(item, &format!("{ptr}/{}", i + 1), cx))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(HintExpr::Literal(values))
                }
                "typing.Annotated" | "typing_extensions.Annotated" => {
                    if rest.len() < 2 {
                        return Err(error("Annotated needs a hint and at least one metadata value", ptr));
                    }
                    let hint = parse_hint_expr(&rest[0], &format!("{ptr}/1"), cx)?;
                    let metadata = rest[1..]
                        .iter()
                        .enumerate()
                        .map(|(i, item)| parse_value(item, &format!("{ptr}/{}", i + 2), cx))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(HintExpr::Annotated {
                        hint: Box::new(hint),
                        metadata,
                    })
                }
                _ => {
                    // `tuple[()]` is the only subscription without arguments.
                    if rest.is_empty() && !matches!(head, "tuple" | "typing.Tuple") {
                        return Err(error("hint application must have at least 1 argument", ptr));
                    }
                    let args = rest
                        .iter()
                        .enumerate()
                        .map(|(i, item)| parse_hint_expr(item, &format!("{ptr}/{}", i + 1), cx))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(HintExpr::Apply {
                        head: head.to_string(),
                        args,
                    })
                }
            }
        }
        _ => Err(error("hint must be a string, null or a list", ptr)),
    }
}

fn parse_value(v: &Json, ptr: &str, cx: &Resolver) -> Result<Value, UniverseError> {
    Ok(match v {
        Json::Null => Value::None,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Value::Int(i),
            (None, Some(f)) => Value::Float(f),
            (None, None) => return Err(error(format!("number {n} is out of range"), ptr)),
        },
        Json::String(s) => Value::str(s),
        Json::Array(items) => Value::list(parse_values(items, ptr, cx)?),
        Json::Object(obj) => parse_escape(obj, ptr, cx)?,
    })
}

fn parse_values(items: &[Json], ptr: &str, cx: &Resolver) -> Result<Vec<Value>, UniverseError> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_value(item, &format!("{ptr}/{i}"), cx))
        .collect()
}

fn parse_escape(obj: &Map<String, Json>, ptr: &str, cx: &Resolver) -> Result<Value, UniverseError> {
    let mut entries = obj.iter();
    let (Some((key, body)), None) = (entries.next(), entries.next()) else {
        return Err(error("value object must have exactly one $-escape key", ptr));
    };
    let bptr = format!("{ptr}/{key}");
    let array = |what: &str| {
        body.as_array()
            .ok_or_else(|| error(format!("{what} must be an array"), &bptr))
    };
    Ok(match key.as_str() {
        "$tuple" => Value::tuple(parse_values(array("$tuple")?, &bptr, cx)?),
        "$set" => Value::set(parse_values(array("$set")?, &bptr, cx)?),
        "$frozenset" => Value::frozenset(parse_values(array("$frozenset")?, &bptr, cx)?),
        "$bytes" => {
            let s = body
                .as_str()
                .ok_or_else(|| error("$bytes must be a string", &bptr))?;
            Value::bytes(s.as_bytes())
        }
        "$dict" => {
            let mut pairs = Vec::new();
            for (i, pair) in array("$dict")?.iter().enumerate() {
                let pptr = format!("{bptr}/{i}");
                let [k, v] = pair.as_array().map(Vec::as_slice).unwrap_or_default() else {
                    return Err(error("$dict entries must be [key, value] pairs", &pptr));
                };
                pairs.push((
                    parse_value(k, &format!("{pptr}/0"), cx)?,
                    parse_value(v, &format!("{pptr}/1"), cx)?,
                ));
            }
            Value::dict(pairs)
        }
        "$class" => {
            let name = body
                .as_str()
                .ok_or_else(|| error("$class must be a string", &bptr))?;
            Value::Class(cx.class(name, &bptr)?)
        }
        "$object" => {
            let o = body
                .as_object()
                .ok_or_else(|| error("$object must be an object", &bptr))?;
            let name = get_required_string(o, &format!("{bptr}/class"), "class")?;
            let class = cx.class(&name, &format!("{bptr}/class"))?;
            let mut fields = BTreeMap::new();
            if let Some(f) = o.get("fields") {
                let f = f
                    .as_object()
                    .ok_or_else(|| error("fields must be an object", &format!("{bptr}/fields")))?;
                for (k, v) in f {
                    fields.insert(k.clone(), parse_value(v, &format!("{bptr}/fields/{k}"), cx)?);
                }
            }
            let items = match o.get("items") {
                None => Vec::new(),
                Some(Json::Array(items)) => parse_values(items, &format!("{bptr}/items"), cx)?,
                Some(_) => return Err(error("items must be an array", &format!("{bptr}/items"))),
            };
            Value::Object(Arc::new(Instance {
                class,
                fields,
                items,
            }))
        }
        other => return Err(error(format!("unknown value escape: {other:?}"), &bptr)),
    })
}

fn get_required_string(obj: &Map<String, Json>, ptr: &str, key: &str) -> Result<String, UniverseError> {
    let v = obj.get(key).ok_or_else(|| {
        error(
            format!("missing required field: {key}"),
            ptr.rsplit_once('/').map(|(p, _)| p).unwrap_or(""),
        )
    })?;
    v.as_str()
        .map(str::to_string)
        .ok_or_else(|| error(format!("{key} must be a string"), ptr))
}

fn get_identifier(obj: &Map<String, Json>, ptr: &str, key: &str) -> Result<String, UniverseError> {
    let name = get_required_string(obj, ptr, key)?;
    if !language::is_identifier(&name) || language::is_keyword(&name) {
        return Err(error(format!("{key} is not a valid identifier: {name:?}"), ptr));
    }
    Ok(name)
}

fn get_array<'a>(obj: &'a Map<String, Json>, ptr: &str, key: &str) -> Result<&'a [Json], UniverseError> {
    match obj.get(key) {
        None => Ok(&[]),
        Some(Json::Array(items)) => Ok(items),
        Some(_) => Err(error(format!("{key} must be an array"), ptr)),
    }
}

fn get_string_array(obj: &Map<String, Json>, ptr: &str, key: &str) -> Result<Vec<String>, UniverseError> {
    get_array(obj, ptr, key)?
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| error(format!("{key}[{i}] must be a string"), &format!("{ptr}/{i}")))
        })
        .collect()
}

struct PendingDef {
    resolver: Resolver,
    qualname: String,
    params: Vec<(String, Option<HintExpr>, String)>,
    returns: Option<(HintExpr, String)>,
}

/// A parsed universe document. Owns the module table its hints live in.
pub struct Universe {
    pub schema_version: String,
    table: Arc<ModuleTable>,
    callables: BTreeMap<String, CallableSig>,
}

impl Universe {
    pub fn parse_json(bytes: &[u8]) -> Result<Self, UniverseError> {
        let doc: Json = serde_json::from_slice(bytes).map_err(|e| error(e.to_string(), ""))?;
        Self::from_value(&doc)
    }

    pub fn from_value(root: &Json) -> Result<Self, UniverseError> {
        let root_obj = root
            .as_object()
            .ok_or_else(|| error("universe root must be an object", ""))?;
        let schema_version = get_required_string(root_obj, "/schema_version", "schema_version")?;
        if !HINTGUARD_UNIVERSE_SCHEMA_VERSIONS_SUPPORTED
            .iter()
            .any(|&v| v == schema_version)
        {
            return Err(error(
                format!(
                    "unsupported schema_version: got {schema_version:?} (supported: {})",
                    HINTGUARD_UNIVERSE_SCHEMA_VERSIONS_SUPPORTED.join(", ")
                ),
                "/schema_version",
            ));
        }

        let table = Arc::new(ModuleTable::new());
        let mut pending = Vec::new();
        for (midx, m) in get_array(root_obj, "/modules", "modules")?.iter().enumerate() {
            parse_module(&table, m, &format!("/modules/{midx}"), &mut pending)?;
        }

        // Signatures are built once every module exists, so they may name
        // anything the document declares.
        let mut callables = BTreeMap::new();
        for def in pending {
            let mut sig = CallableSig::new(&def.resolver.module, &def.qualname);
            for (name, hint, ptr) in &def.params {
                sig.params.push(match hint {
                    Some(expr) => ParamSig::new(name, def.resolver.build_at(expr, ptr)?),
                    None => ParamSig::untyped(name),
                });
            }
            if let Some((expr, ptr)) = &def.returns {
                sig.returns = Some(def.resolver.build_at(expr, ptr)?);
            }
            callables.insert(format!("{}.{}", sig.module, sig.qualname), sig);
        }

        tracing::debug!(
            target: "hintguard::universe",
            modules = table.module_names().len(),
            callables = callables.len(),
            "parsed universe document"
        );
        Ok(Self {
            schema_version,
            table,
            callables,
        })
    }

    /// A universe with no declared modules; only builtins resolve.
    pub fn empty() -> Self {
        Self {
            schema_version: HINTGUARD_UNIVERSE_SCHEMA_VERSION.to_string(),
            table: Arc::new(ModuleTable::new()),
            callables: BTreeMap::new(),
        }
    }

    pub fn table(&self) -> &Arc<ModuleTable> {
        &self.table
    }

    fn resolver(&self, module: &str) -> Resolver {
        Resolver {
            table: Arc::downgrade(&self.table),
            module: module.to_string(),
        }
    }

    /// Parse and evaluate a hint expression in `module`'s namespace.
    pub fn hint(&self, module: &str, v: &Json) -> Result<Hint, UniverseError> {
        let cx = self.resolver(module);
        let expr = parse_hint_expr(v, "", &cx)?;
        cx.build_at(&expr, "")
    }

    pub fn value(&self, module: &str, v: &Json) -> Result<Value, UniverseError> {
        parse_value(v, "", &self.resolver(module))
    }

    /// Signature of a `def` declaration, by `module.qualname`.
    pub fn callable(&self, name: &str) -> Option<&CallableSig> {
        self.callables.get(name)
    }

    pub fn callable_names(&self) -> impl Iterator<Item = &str> {
        self.callables.keys().map(String::as_str)
    }
}

fn parse_module(
    table: &Arc<ModuleTable>,
    v: &Json,
    ptr: &str,
    pending: &mut Vec<PendingDef>,
) -> Result<(), UniverseError> {
    let obj = v
        .as_object()
        .ok_or_else(|| error("module must be an object", ptr))?;
    let name = get_required_string(obj, &format!("{ptr}/name"), "name")?;
    if !name.split('.').all(language::is_identifier) {
        return Err(error(format!("invalid module name: {name:?}"), &format!("{ptr}/name")));
    }
    let module = table.module(&name);
    let cx = Resolver {
        table: Arc::downgrade(table),
        module: name.clone(),
    };

    for (didx, d) in get_array(obj, &format!("{ptr}/decls"), "decls")?.iter().enumerate() {
        let dptr = format!("{ptr}/decls/{didx}");
        let dobj = d
            .as_object()
            .ok_or_else(|| error(format!("decls[{didx}] must be an object"), &dptr))?;
        let kind = get_required_string(dobj, &format!("{dptr}/kind"), "kind")?;
        let decl_name = get_identifier(dobj, &format!("{dptr}/name"), "name")?;
        if module.get(&decl_name).is_some() {
            return Err(error(
                format!("duplicate declaration: {decl_name:?}"),
                &format!("{dptr}/name"),
            ));
        }

        match kind.as_str() {
            "class" | "protocol" => {
                let mut builder = ClassRef::builder(&name, &decl_name);
                if kind == "protocol" {
                    builder = builder.protocol();
                }
                for tv in type_params(dobj, &dptr, &cx)? {
                    builder = builder.type_param(&tv);
                }
                for (bidx, b) in get_array(dobj, &format!("{dptr}/bases"), "bases")?.iter().enumerate() {
                    let bptr = format!("{dptr}/bases/{bidx}");
                    let base = cx.build_at(&parse_hint_expr(b, &bptr, &cx)?, &bptr)?;
                    builder = match base.kind() {
                        HintKind::Class(cls) => builder.base(cls),
                        HintKind::Subscripted { .. } => builder.generic_base(base.clone()),
                        _ => {
                            return Err(error(
                                format!("base {base} must be a class or a subscripted generic"),
                                &bptr,
                            ))
                        }
                    };
                }
                let attrs = get_string_array(dobj, &format!("{dptr}/attrs"), "attrs")?;
                let class = builder.attrs(attrs.iter().map(String::as_str)).build();
                module.define_class(&class);
            }
            "typevar" => {
                let bound = match dobj.get("bound") {
                    None => None,
                    Some(b) => {
                        let bptr = format!("{dptr}/bound");
                        Some(cx.build_at(&parse_hint_expr(b, &bptr, &cx)?, &bptr)?)
                    }
                };
                let mut constraints = Vec::new();
                for (cidx, c) in get_array(dobj, &format!("{dptr}/constraints"), "constraints")?
                    .iter()
                    .enumerate()
                {
                    let cptr = format!("{dptr}/constraints/{cidx}");
                    constraints.push(cx.build_at(&parse_hint_expr(c, &cptr, &cx)?, &cptr)?);
                }
                let def = match (bound, constraints.is_empty()) {
                    (Some(_), false) => {
                        return Err(error("a type variable cannot have both a bound and constraints", &dptr))
                    }
                    (Some(bound), true) => TypeVarDef::bounded(&decl_name, bound),
                    (None, false) => TypeVarDef::constrained(&decl_name, constraints),
                    (None, true) => TypeVarDef::new(&decl_name),
                };
                module.set(&decl_name, ModuleAttr::Hint(Hint::type_var(&def)));
            }
            "alias" => {
                let params = type_params(dobj, &dptr, &cx)?;
                let value = dobj
                    .get("value")
                    .ok_or_else(|| error("missing required field: value", &dptr))?;
                let expr = parse_hint_expr(value, &format!("{dptr}/value"), &cx)?;
                let resolver = cx.clone();
                let alias = Hint::type_alias(&name, &decl_name, params, move || resolver.build(&expr));
                module.set(&decl_name, ModuleAttr::Hint(alias));
            }
            "newtype" => {
                let sptr = format!("{dptr}/supertype");
                let supertype = dobj
                    .get("supertype")
                    .ok_or_else(|| error("missing required field: supertype", &dptr))?;
                let supertype = cx.build_at(&parse_hint_expr(supertype, &sptr, &cx)?, &sptr)?;
                module.set(&decl_name, ModuleAttr::Hint(Hint::new_type(&decl_name, supertype)));
            }
            "value" => {
                let value = dobj
                    .get("value")
                    .ok_or_else(|| error("missing required field: value", &dptr))?;
                let value = parse_value(value, &format!("{dptr}/value"), &cx)?;
                module.set(&decl_name, ModuleAttr::Value(value));
            }
            "def" => {
                let mut params = Vec::new();
                for (pidx, p) in get_array(dobj, &format!("{dptr}/params"), "params")?.iter().enumerate() {
                    let pptr = format!("{dptr}/params/{pidx}");
                    let pobj = p
                        .as_object()
                        .ok_or_else(|| error("param must be an object", &pptr))?;
                    let pname = get_identifier(pobj, &format!("{pptr}/name"), "name")?;
                    if params.iter().any(|(n, _, _)| *n == pname) {
                        return Err(error(format!("duplicate parameter: {pname:?}"), &format!("{pptr}/name")));
                    }
                    let hptr = format!("{pptr}/hint");
                    let hint = match pobj.get("hint") {
                        None => None,
                        Some(h) => Some(parse_hint_expr(h, &hptr, &cx)?),
                    };
                    params.push((pname, hint, hptr));
                }
                let rptr = format!("{dptr}/returns");
                let returns = match dobj.get("returns") {
                    None => None,
                    Some(r) => Some((parse_hint_expr(r, &rptr, &cx)?, rptr)),
                };
                pending.push(PendingDef {
                    resolver: cx.clone(),
                    qualname: decl_name,
                    params,
                    returns,
                });
            }
            _ => return Err(error(format!("unsupported decl kind: {kind:?}"), &format!("{dptr}/kind"))),
        }
    }
    Ok(())
}

fn type_params(
    dobj: &Map<String, Json>,
    dptr: &str,
    cx: &Resolver,
) -> Result<Vec<Arc<TypeVarDef>>, UniverseError> {
    let ptr = format!("{dptr}/type_params");
    get_string_array(dobj, &ptr, "type_params")?
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let tptr = format!("{ptr}/{i}");
            match cx.lookup(name).map_err(|e| error(e.to_string(), &tptr))?.kind() {
                HintKind::TypeVar(def) => Ok(def.clone()),
                _ => Err(error(format!("{name:?} is not a type variable"), &tptr)),
            }
        })
        .collect()
}
