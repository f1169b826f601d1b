use std::collections::BTreeMap;
use std::sync::Arc;

use crate::forward_ref::ForwardRef;
use crate::hint::Hint;
use crate::language;
use crate::runtime::class::ClassRef;
use crate::runtime::value::Value;

/// Objects the generated code refers to by name.
#[derive(Debug, Clone)]
pub enum ScopeObj {
    Class(ClassRef),
    Types(Vec<ClassRef>),
    ForwardRef(Arc<ForwardRef>),
    Hint(Hint),
    Const(Value),
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    entries: BTreeMap<String, ScopeObj>,
    next_type: usize,
    next_const: usize,
    next_fwd: usize,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ScopeObj> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ScopeObj)> {
        self.entries.iter()
    }

    pub fn set(&mut self, name: &str, obj: ScopeObj) {
        self.entries.insert(name.to_string(), obj);
    }

    pub fn add_type(&mut self, cls: &ClassRef) -> String {
        for (name, obj) in &self.entries {
            if matches!(obj, ScopeObj::Class(c) if c == cls) {
                return name.clone();
            }
        }
        let name = format!("{}{}", language::SCOPE_TYPE_PREFIX, self.next_type);
        self.next_type += 1;
        self.entries.insert(name.clone(), ScopeObj::Class(cls.clone()));
        name
    }

    /// Name for a tuple of classes; a single class is stored as itself.
    pub fn add_types(&mut self, classes: &[ClassRef]) -> String {
        if let [only] = classes {
            return self.add_type(only);
        }
        for (name, obj) in &self.entries {
            if matches!(obj, ScopeObj::Types(cs) if cs.as_slice() == classes) {
                return name.clone();
            }
        }
        let name = format!("{}{}", language::SCOPE_TYPE_PREFIX, self.next_type);
        self.next_type += 1;
        self.entries
            .insert(name.clone(), ScopeObj::Types(classes.to_vec()));
        name
    }

    pub fn add_forward_ref(&mut self, proxy: &Arc<ForwardRef>) -> String {
        for (name, obj) in &self.entries {
            if matches!(obj, ScopeObj::ForwardRef(p) if Arc::ptr_eq(p, proxy)) {
                return name.clone();
            }
        }
        let name = format!("{}{}", language::SCOPE_FWD_PREFIX, self.next_fwd);
        self.next_fwd += 1;
        self.entries
            .insert(name.clone(), ScopeObj::ForwardRef(proxy.clone()));
        name
    }

    pub fn add_const(&mut self, value: &Value) -> String {
        let name = format!("{}{}", language::SCOPE_CONST_PREFIX, self.next_const);
        self.next_const += 1;
        self.entries.insert(name.clone(), ScopeObj::Const(value.clone()));
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::class::builtins;

    #[test]
    fn types_are_deduplicated() {
        let b = builtins();
        let mut scope = Scope::new();
        let a = scope.add_type(&b.int);
        let again = scope.add_type(&b.int);
        let single = scope.add_types(&[b.int.clone()]);
        let pair = scope.add_types(&[b.int.clone(), b.str_.clone()]);
        assert_eq!(a, again);
        assert_eq!(a, single);
        assert_ne!(a, pair);
        assert_eq!(scope.len(), 2);
    }
}
