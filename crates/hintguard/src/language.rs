pub const LANG_ID: &str = "hintguard-check@0.1.0";

/// Placeholder substituted with the slot name during wrapper assembly.
pub const PITH_ROOT_PLACEHOLDER: &str = "@{pith}!";

pub const CHILD_PLACEHOLDER_PREFIX: &str = "@[";
pub const CHILD_PLACEHOLDER_SUFFIX: &str = "]!";

pub const FORWARD_REF_PLACEHOLDER_PREFIX: &str = "@<";
pub const FORWARD_REF_PLACEHOLDER_SUFFIX: &str = ">!";

pub const INDENT_LEVEL: &str = "    ";
pub const INDENT_BASE: &str = "    ";

pub const NAME_RANDOM: &str = "__random";
pub const NAME_RETURN: &str = "__return";
pub const NAME_HINT_ROOT: &str = "__hint_root";
pub const NAME_VIOLATION: &str = "violation";
pub const PITH_LOCAL_PREFIX: &str = "__pith_";
pub const SCOPE_TYPE_PREFIX: &str = "__hint_type_";
pub const SCOPE_CONST_PREFIX: &str = "__hint_const_";
pub const SCOPE_FWD_PREFIX: &str = "__hint_fwd_";

pub fn child_placeholder(index: usize) -> String {
    format!("{CHILD_PLACEHOLDER_PREFIX}{index}{CHILD_PLACEHOLDER_SUFFIX}")
}

pub fn forward_ref_placeholder(name: &str) -> String {
    format!("{FORWARD_REF_PLACEHOLDER_PREFIX}{name}{FORWARD_REF_PLACEHOLDER_SUFFIX}")
}

pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

pub fn is_keyword(s: &str) -> bool {
    matches!(s, "and" | "or" | "not" | "True" | "False" | "None")
}

pub mod limits {
    pub const MAX_HINT_CHILDREN: usize = 4096;
    /// Deepest child hint the generator expands below the root.
    pub const MAX_HINT_DEPTH: usize = 64;
    /// Each hint level adds at most two nested groups to the generated check.
    pub const MAX_EXPR_DEPTH: usize = 4 * MAX_HINT_DEPTH + 16;

    pub fn max_hint_children() -> usize {
        match std::env::var("HINTGUARD_MAX_HINT_CHILDREN") {
            Ok(v) => v
                .parse::<usize>()
                .ok()
                .filter(|v| *v > 0)
                .unwrap_or(MAX_HINT_CHILDREN),
            Err(_) => MAX_HINT_CHILDREN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_not_identifiers() {
        assert!(!is_identifier(&child_placeholder(3)));
        assert!(!is_identifier(PITH_ROOT_PLACEHOLDER));
        assert!(!is_identifier(&forward_ref_placeholder("Foo")));
        assert!(is_identifier("__pith_1"));
        assert!(!is_identifier("1abc"));
    }
}
