//! Generic struct instantiation.
//!
//! Templates (`struct List[T] { ... }`) never emit directly. Instead the
//! emitter sweeps the whole AST for instantiation types (`List[i32]`),
//! mangles each into a canonical name, substitutes the type arguments into
//! the template's fields, and emits one specialized struct per distinct
//! mangled name. Nested instantiations (`List[List[i32]]`) recurse through
//! the same path.

use std::fmt::Write as _;

use truk_language::ast::{Block, Decl, Expr, Stmt, TypeNode};

use crate::analysis::check::substitute;
use crate::analysis::types::{Type, TypeDef};
use crate::codegen_c::types::{c_var_decl, escape_ident, lower_type, mangle};
use crate::codegen_c::Emitter;

impl Emitter<'_> {
    /// Phase 4: sweep declarations and emit every instantiation found.
    pub(crate) fn emit_generic_instantiations(&mut self, declarations: &[Decl]) {
        let mut found = Vec::new();
        for decl in declarations {
            collect_decl(decl, &mut found);
        }
        for node in found {
            let ty = lower_type(&node, self.registry);
            self.ensure_generic_instantiation(&ty);
        }
    }

    /// Emits the specialized struct for one instantiation, exactly once
    /// per mangled name.
    pub(crate) fn ensure_generic_instantiation(&mut self, ty: &Type) {
        let Type::Generic { base, args } = ty else {
            return;
        };
        let name = mangle(ty, self.interner);
        if self.generics_emitted.contains(&name) {
            return;
        }
        self.generics_emitted.insert(name.clone());

        let Some(TypeDef::Struct { fields, type_params }) = self.registry.get(*base) else {
            self.generics_emitted.remove(&name);
            return;
        };
        let fields = fields.clone();
        let type_params = type_params.clone();

        // Nested instantiations in the arguments come first.
        for arg in args {
            self.ensure_type_support(arg);
        }

        let _ = writeln!(self.forward_decls, "typedef struct {} {};", name, name);

        let mut body = String::new();
        for field in &fields {
            let field_ty = substitute(&field.ty, &type_params, args);
            self.ensure_type_support(&field_ty);
            let fname = escape_ident(self.interner.resolve(field.name));
            let _ = writeln!(body, "  {};", c_var_decl(&field_ty, &fname, self.interner));
        }
        let _ = writeln!(self.structs, "struct {} {{\n{}}};\n", name, body);
    }
}

// ----------------------------------------------------------------------
// AST sweep for instantiation type nodes
// ----------------------------------------------------------------------

fn collect_decl(decl: &Decl, out: &mut Vec<TypeNode>) {
    match decl {
        Decl::Fn(f) => {
            for param in &f.params {
                collect_type(&param.ty, out);
            }
            if let Some(ret) = &f.return_type {
                collect_type(ret, out);
            }
            if let Some(body) = &f.body {
                collect_block(body, out);
            }
        }
        Decl::Struct(s) => {
            // Template fields mention bare type parameters, not
            // instantiations; concrete struct fields may hold either.
            if s.type_params.is_empty() {
                for field in &s.fields {
                    collect_type(&field.ty, out);
                }
            }
        }
        Decl::Enum(_) | Decl::Import { .. } => {}
        Decl::Var(v) => {
            collect_type(&v.ty, out);
            if let Some(init) = &v.initializer {
                collect_expr(init, out);
            }
        }
        Decl::Const(c) => {
            collect_type(&c.ty, out);
            collect_expr(&c.value, out);
        }
        Decl::Let(l) => collect_expr(&l.initializer, out),
        Decl::Shard { declarations, .. } => {
            for inner in declarations {
                collect_decl(inner, out);
            }
        }
    }
}

fn collect_type(ty: &TypeNode, out: &mut Vec<TypeNode>) {
    match ty {
        TypeNode::Generic { args, .. } => {
            out.push(ty.clone());
            for arg in args {
                collect_type(arg, out);
            }
        }
        TypeNode::Pointer { pointee, .. } => collect_type(pointee, out),
        TypeNode::Array { element, .. } => collect_type(element, out),
        TypeNode::Map { key, value, .. } => {
            collect_type(key, out);
            collect_type(value, out);
        }
        TypeNode::Tuple { elements, .. } => {
            for element in elements {
                collect_type(element, out);
            }
        }
        TypeNode::Function { params, ret, .. } => {
            for param in params {
                collect_type(param, out);
            }
            collect_type(ret, out);
        }
        TypeNode::Primitive { .. } | TypeNode::Named { .. } => {}
    }
}

fn collect_block(block: &Block, out: &mut Vec<TypeNode>) {
    for stmt in &block.statements {
        collect_stmt(stmt, out);
    }
}

fn collect_stmt(stmt: &Stmt, out: &mut Vec<TypeNode>) {
    match stmt {
        Stmt::Block(block) => collect_block(block, out),
        Stmt::If { condition, then_block, else_block, .. } => {
            collect_expr(condition, out);
            collect_block(then_block, out);
            if let Some(else_stmt) = else_block {
                collect_stmt(else_stmt, out);
            }
        }
        Stmt::While { condition, body, .. } => {
            collect_expr(condition, out);
            collect_block(body, out);
        }
        Stmt::For { init, condition, post, body, .. } => {
            if let Some(init) = init {
                collect_stmt(init, out);
            }
            if let Some(condition) = condition {
                collect_expr(condition, out);
            }
            if let Some(post) = post {
                collect_stmt(post, out);
            }
            collect_block(body, out);
        }
        Stmt::Return { values, .. } => {
            for value in values {
                collect_expr(value, out);
            }
        }
        Stmt::Break { .. } | Stmt::Continue { .. } => {}
        Stmt::Defer { body, .. } => collect_stmt(body, out),
        Stmt::Match { scrutinee, arms, .. } => {
            collect_expr(scrutinee, out);
            for arm in arms {
                if let Some(pattern) = &arm.pattern {
                    collect_expr(pattern, out);
                }
                collect_block(&arm.body, out);
            }
        }
        Stmt::Assign { target, value, .. } => {
            collect_expr(target, out);
            collect_expr(value, out);
        }
        Stmt::Var(v) => {
            collect_type(&v.ty, out);
            if let Some(init) = &v.initializer {
                collect_expr(init, out);
            }
        }
        Stmt::Const(c) => {
            collect_type(&c.ty, out);
            collect_expr(&c.value, out);
        }
        Stmt::Let(l) => collect_expr(&l.initializer, out),
        Stmt::Expr(expr) => collect_expr(expr, out),
    }
}

fn collect_expr(expr: &Expr, out: &mut Vec<TypeNode>) {
    match expr {
        Expr::Binary { lhs, rhs, .. } => {
            collect_expr(lhs, out);
            collect_expr(rhs, out);
        }
        Expr::Unary { operand, .. } => collect_expr(operand, out),
        Expr::Cast { expr, target, .. } => {
            collect_expr(expr, out);
            collect_type(target, out);
        }
        Expr::Call { callee, args, .. } => {
            collect_expr(callee, out);
            for arg in args {
                collect_expr(arg, out);
            }
        }
        Expr::Index { object, index, .. } => {
            collect_expr(object, out);
            collect_expr(index, out);
        }
        Expr::Member { object, .. } => collect_expr(object, out),
        Expr::Literal { .. } | Expr::Identifier(_) => {}
        Expr::ArrayLiteral { elements, .. } => {
            for element in elements {
                collect_expr(element, out);
            }
        }
        Expr::StructLiteral { fields, .. } => {
            for field in fields {
                collect_expr(&field.value, out);
            }
        }
        Expr::Lambda(lambda) => {
            for param in &lambda.params {
                collect_type(&param.ty, out);
            }
            if let Some(ret) = &lambda.return_type {
                collect_type(ret, out);
            }
            collect_block(&lambda.body, out);
        }
        Expr::TypeParam { ty, .. } => collect_type(ty, out),
    }
}
