//! Static analysis: the type system model, the type checker, and the
//! control-flow checker.
//!
//! - [`types`]: the [`Type`] value model and the [`TypeRegistry`] shared by
//!   the checker and the emitter
//! - [`check`]: the scoped type checker over the ordered declaration list
//! - [`control_flow`]: guaranteed-return and control-flow-presence analysis
//! - [`builtins`]: argument validation for intrinsic calls

pub mod builtins;
pub mod check;
pub mod control_flow;
pub mod types;

pub use check::{check_program, TypeChecker, TypeError};
pub use types::{EnumVariantDef, FieldDef, FunctionType, Type, TypeDef, TypeRegistry};
