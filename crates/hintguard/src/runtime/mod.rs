//! The object model hints are checked against: classes, values and modules.

pub mod class;
pub mod module;
pub mod value;

pub use class::{builtins, Builtins, ClassBuilder, ClassDef, ClassKind, ClassRef};
pub use module::{ImportError, Module, ModuleAttr, ModuleLoader, ModuleTable};
pub use value::{Instance, Value};
