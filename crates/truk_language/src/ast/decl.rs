//! Top-level declaration nodes.
//!
//! A parse produces a forest of declarations; statements appear only inside
//! function and lambda bodies. `var`, `const` and `let` double as statements
//! and reuse the same node shapes there.

use crate::ast::stmt::Block;
use crate::ast::types::TypeNode;
use crate::ast::{Expr, Ident};

/// A top-level declaration.
#[derive(Debug, Clone)]
pub enum Decl {
    Fn(FnDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    Var(VarDecl),
    Const(ConstDecl),
    Let(LetDecl),
    Import {
        /// The unquoted import path.
        path: String,
        source_index: usize,
    },
    Shard {
        name: Ident,
        declarations: Vec<Decl>,
        source_index: usize,
    },
}

impl Decl {
    pub fn source_index(&self) -> usize {
        match self {
            Decl::Fn(f) => f.source_index,
            Decl::Struct(s) => s.source_index,
            Decl::Enum(e) => e.source_index,
            Decl::Var(v) => v.source_index,
            Decl::Const(c) => c.source_index,
            Decl::Let(l) => l.source_index,
            Decl::Import { source_index, .. } => *source_index,
            Decl::Shard { source_index, .. } => *source_index,
        }
    }

    /// The name this declaration introduces at the top level, if any.
    pub fn name(&self) -> Option<Ident> {
        match self {
            Decl::Fn(f) => Some(f.name),
            Decl::Struct(s) => Some(s.name),
            Decl::Enum(e) => Some(e.name),
            Decl::Var(v) => Some(v.name),
            Decl::Const(c) => Some(c.name),
            Decl::Let(l) => Some(l.name),
            Decl::Import { .. } | Decl::Shard { .. } => None,
        }
    }
}

/// `name: type` in a parameter list.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: Ident,
    pub ty: TypeNode,
}

/// A function declaration.
///
/// `body: None` marks an extern prototype (`fn puts(s: *u8): i32;`).
/// `is_test` is set for names beginning with the reserved `test_` prefix.
#[derive(Debug, Clone)]
pub struct FnDecl {
    pub name: Ident,
    pub type_params: Vec<Ident>,
    pub params: Vec<Param>,
    /// `None` means void.
    pub return_type: Option<TypeNode>,
    pub body: Option<Block>,
    pub variadic: bool,
    pub is_extern: bool,
    pub is_test: bool,
    pub source_index: usize,
}

/// `field: type` inside a struct body.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: Ident,
    pub ty: TypeNode,
}

/// A struct declaration; `type_params` non-empty marks a generic template.
#[derive(Debug, Clone)]
pub struct StructDecl {
    pub name: Ident,
    pub type_params: Vec<Ident>,
    pub fields: Vec<Field>,
    pub source_index: usize,
}

/// One enum variant, optionally with an explicit integer value.
#[derive(Debug, Clone)]
pub struct EnumVariant {
    pub name: Ident,
    pub value: Option<i64>,
}

/// An enum declaration with its backing primitive type.
#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub name: Ident,
    /// Backing integer type; defaults to `i32` when unwritten.
    pub backing: TypeNode,
    pub variants: Vec<EnumVariant>,
    pub source_index: usize,
}

/// A mutable variable: `var name: type = init;`.
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: Ident,
    pub ty: TypeNode,
    pub initializer: Option<Expr>,
    pub source_index: usize,
}

/// An immutable constant: `const name: type = value;`.
#[derive(Debug, Clone)]
pub struct ConstDecl {
    pub name: Ident,
    pub ty: TypeNode,
    pub value: Expr,
    pub source_index: usize,
}

/// A type-inferred immutable binding: `let name = init;`.
#[derive(Debug, Clone)]
pub struct LetDecl {
    pub name: Ident,
    pub initializer: Expr,
    pub source_index: usize,
}

/// `cimport "header.h" { symbol, ... }`.
///
/// Collected separately from declarations; the header is forwarded to the
/// emitter as an `#include` and the symbols become opaque externs.
#[derive(Debug, Clone)]
pub struct CImport {
    pub header: String,
    pub symbols: Vec<Ident>,
    pub source_index: usize,
}
