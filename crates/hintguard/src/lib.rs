pub mod assemble;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod expr;
pub mod forward_ref;
pub mod hint;
pub mod language;
pub mod logging;
pub mod random;
pub mod reduce;
pub mod runtime;
pub mod scope;
pub mod sign;
pub mod universe;
pub mod violation;
pub mod wrapper;

pub use assemble::Checker;
pub use config::CheckConfig;
pub use engine::Engine;
pub use error::{CheckError, HintError, HintErrorKind};
pub use hint::{Hint, HintKind, TypeVarDef};
pub use runtime::{builtins, ClassRef, Module, ModuleLoader, ModuleTable, Value};
pub use violation::Violation;
pub use wrapper::{CallableSig, ParamSig, TypedCallable};
