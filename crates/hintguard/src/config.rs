use crate::language;

/// Knobs that change the generated code. Part of the code-cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CheckConfig {
    /// Let `float` also accept `int` (implicit numeric tower).
    pub is_pep484_tower: bool,
    /// Log every generated check at debug level.
    pub is_debug: bool,
    /// Sanity cap on the number of child hints one root may expand into.
    pub max_hint_children: usize,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            is_pep484_tower: false,
            is_debug: false,
            max_hint_children: language::limits::max_hint_children(),
        }
    }
}

impl CheckConfig {
    pub fn with_pep484_tower(mut self, enabled: bool) -> Self {
        self.is_pep484_tower = enabled;
        self
    }

    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.is_debug = enabled;
        self
    }

    pub fn with_max_hint_children(mut self, max: usize) -> Self {
        self.max_hint_children = max.max(1);
        self
    }
}
