use std::fmt;

use serde::Serialize;

use crate::hint::Hint;
use crate::runtime::value::Value;

/// A value that failed its type check.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    /// Parameter name, or `__return`.
    pub slot: String,
    pub hint: String,
    pub pith: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_index: Option<u32>,
    pub message: String,
}

impl std::error::Error for Violation {}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub struct ViolationContext<'a> {
    pub exception_prefix: &'a str,
    pub slot: &'a str,
    pub pith: &'a Value,
    pub hint: &'a Hint,
    pub random_index: Option<u32>,
}

/// Explains a failed check. Only invoked after a check has already failed.
pub trait ViolationReporter: Send + Sync {
    fn report(&self, cx: &ViolationContext<'_>) -> Violation;
}

const MAX_PITH_REPR: usize = 120;

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultReporter;

impl ViolationReporter for DefaultReporter {
    fn report(&self, cx: &ViolationContext<'_>) -> Violation {
        let mut pith = cx.pith.repr();
        if pith.chars().count() > MAX_PITH_REPR {
            pith = pith.chars().take(MAX_PITH_REPR).collect::<String>() + "...";
        }
        let mut message = format!(
            "{}value {pith} violates type hint {}",
            cx.exception_prefix, cx.hint
        );
        if let (Some(index), Some(len)) = (cx.random_index, cx.pith.len()) {
            if len > 0 {
                message.push_str(&format!(
                    " (sampled item at index {})",
                    index as usize % len
                ));
            }
        }
        Violation {
            slot: cx.slot.to_string(),
            hint: cx.hint.repr(),
            pith,
            random_index: cx.random_index,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::class::builtins;

    #[test]
    fn default_message_names_value_and_hint() {
        let hint = Hint::list(Hint::class(&builtins().int));
        let pith = Value::list(vec![Value::Int(1), Value::str("x")]);
        let v = DefaultReporter.report(&ViolationContext {
            exception_prefix: "Function app.f() parameter \"xs\" ",
            slot: "xs",
            pith: &pith,
            hint: &hint,
            random_index: Some(3),
        });
        assert_eq!(
            v.message,
            "Function app.f() parameter \"xs\" value [1, 'x'] violates type hint list[int] (sampled item at index 1)"
        );
    }
}
