//! # truk-base
//!
//! Pure structural atoms for the truk compiler: string interning, source
//! location math, the shared diagnostic model, and ANSI styling.
//!
//! Nothing in this crate knows about the truk language. It exists so that
//! `truk-language` (lexer, parser, AST) and `truk-compile` (resolver,
//! checker, emitter) can exchange symbols and diagnostics without depending
//! on each other.

pub mod error;
pub mod intern;
pub mod location;
pub mod style;

pub use error::{Diagnostic, ErrorKind};
pub use intern::{Interner, Symbol, SymbolEq};
pub use location::{locate, visual_column, Location};
pub use style::Style;
