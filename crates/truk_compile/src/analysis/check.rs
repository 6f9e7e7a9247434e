//! The type checker.
//!
//! Consumes the ordered declaration list and validates every typing rule of
//! the language. State is a stack of scopes (innermost consulted first), a
//! [`TypeRegistry`] of named types, the current function's return type, and
//! an `in_loop` flag for `break`/`continue` validation.
//!
//! Checking runs in three passes so that recursive and mutually recursive
//! references succeed:
//!
//! 1. register every struct/enum *name* (and cimport extern symbols)
//! 2. resolve struct field types, enum variants, function signatures and
//!    global symbols against the now-complete name set
//! 3. check declaration bodies in order
//!
//! Errors accumulate; checking continues past them with the poison type
//! [`Type::Unknown`] suppressing cascades.

use rustc_hash::FxHashMap;
use truk_base::{Interner, Symbol};
use truk_language::ast::{
    AssignOp, Block, CImport, Decl, Expr, FnDecl, Ident, LambdaExpr, LiteralKind, Stmt, TypeNode,
    UnaryOp,
};
use truk_language::builtins::{self, BuiltinKind};
use truk_language::Keyword;

use crate::analysis::control_flow;
use crate::analysis::types::{
    EnumVariantDef, FieldDef, FunctionType, Type, TypeDef, TypeRegistry,
};

/// One type error, anchored at a byte offset within its declaration's file.
#[derive(Debug, Clone)]
pub struct TypeError {
    pub message: String,
    pub source_index: usize,
    /// Index into the checked declaration list, for file attribution.
    pub decl_index: usize,
}

/// A name bound in some scope.
#[derive(Debug, Clone)]
struct SymbolInfo {
    ty: Type,
    mutable: bool,
}

/// Scoped type checker over one ordered declaration list.
pub struct TypeChecker<'a> {
    interner: &'a Interner,
    registry: TypeRegistry,
    scopes: Vec<FxHashMap<Symbol, SymbolInfo>>,
    errors: Vec<TypeError>,
    current_return: Type,
    in_loop: bool,
    in_variadic_fn: bool,
    /// Type parameters of the struct or function being resolved.
    type_param_scope: Vec<Symbol>,
    /// Set while registering signatures that body checking re-resolves,
    /// so resolution errors surface exactly once.
    suppress_errors: bool,
    current_decl: usize,
}

/// Checks a whole program; returns the registry (for the emitter) and all
/// observed errors.
pub fn check_program(
    declarations: &[Decl],
    c_imports: &[CImport],
    interner: &Interner,
) -> (TypeRegistry, Vec<TypeError>) {
    let mut checker = TypeChecker::new(interner);
    checker.check(declarations, c_imports);
    checker.finish()
}

impl<'a> TypeChecker<'a> {
    pub fn new(interner: &'a Interner) -> Self {
        let mut checker = Self {
            interner,
            registry: TypeRegistry::new(),
            scopes: vec![FxHashMap::default()],
            errors: Vec::new(),
            current_return: Type::Void,
            in_loop: false,
            in_variadic_fn: false,
            type_param_scope: Vec::new(),
            suppress_errors: false,
            current_decl: 0,
        };
        checker.register_builtins();
        checker
    }

    pub fn errors(&self) -> &[TypeError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn finish(self) -> (TypeRegistry, Vec<TypeError>) {
        (self.registry, self.errors)
    }

    /// Runs all three passes over the declaration list.
    pub fn check(&mut self, declarations: &[Decl], c_imports: &[CImport]) {
        self.register_type_names(declarations);
        self.register_extern_symbols(c_imports);
        self.register_signatures(declarations);
        log::debug!(
            "type check: {} declarations, {} named types",
            declarations.len(),
            self.registry.iter().count()
        );

        for (index, decl) in declarations.iter().enumerate() {
            self.current_decl = index;
            self.check_decl(decl);
        }
    }

    // ------------------------------------------------------------------
    // Registration passes
    // ------------------------------------------------------------------

    fn register_builtins(&mut self) {
        // Symbols only exist for names the source actually mentions; all
        // parsing precedes checking, so the interner is complete here.
        for builtin in builtins::BUILTINS {
            if let Some(sym) = self.interner.lookup(builtin.name) {
                let ret = match builtin.kind {
                    BuiltinKind::Len | BuiltinKind::Sizeof => Type::Primitive(Keyword::U64),
                    BuiltinKind::VaArgI32 => Type::Primitive(Keyword::I32),
                    BuiltinKind::VaArgI64 => Type::Primitive(Keyword::I64),
                    BuiltinKind::VaArgF64 => Type::Primitive(Keyword::F64),
                    BuiltinKind::VaArgPtr => Type::pointer_to(Type::Void),
                    BuiltinKind::Make => Type::Unknown,
                    BuiltinKind::Delete | BuiltinKind::Panic | BuiltinKind::Each => Type::Void,
                };
                let info = SymbolInfo {
                    ty: Type::Function(FunctionType {
                        params: Vec::new(),
                        ret: Box::new(ret),
                        variadic: true,
                        builtin: Some(builtin.kind),
                    }),
                    mutable: false,
                };
                self.scopes[0].insert(sym, info);
            }
        }
    }

    fn register_type_names(&mut self, declarations: &[Decl]) {
        for decl in declarations {
            match decl {
                Decl::Struct(s) => {
                    self.registry.insert(
                        s.name.name,
                        TypeDef::Struct {
                            fields: Vec::new(),
                            type_params: s.type_params.iter().map(|p| p.name).collect(),
                        },
                    );
                }
                Decl::Enum(e) => {
                    let backing = match &e.backing {
                        TypeNode::Primitive { keyword, .. } => *keyword,
                        _ => Keyword::I32,
                    };
                    let mut next_value = 0i64;
                    let mut variants = Vec::new();
                    for variant in &e.variants {
                        let value = variant.value.unwrap_or(next_value);
                        next_value = value + 1;
                        variants.push(EnumVariantDef { name: variant.name.name, value });
                    }
                    self.registry
                        .insert(e.name.name, TypeDef::Enum { backing, variants });
                }
                Decl::Shard { declarations, .. } => self.register_type_names(declarations),
                _ => {}
            }
        }
    }

    fn register_extern_symbols(&mut self, c_imports: &[CImport]) {
        for cimport in c_imports {
            for symbol in &cimport.symbols {
                self.scopes[0].insert(
                    symbol.name,
                    SymbolInfo { ty: Type::Extern, mutable: true },
                );
                // A cimport symbol used in type position is an extern struct.
                if !self.registry.contains(symbol.name) {
                    self.registry.insert(symbol.name, TypeDef::ExternStruct);
                }
            }
        }
    }

    fn register_signatures(&mut self, declarations: &[Decl]) {
        for (index, decl) in declarations.iter().enumerate() {
            // Signature errors anchor to the declaration being registered.
            self.current_decl = index;
            match decl {
                Decl::Struct(s) => {
                    self.type_param_scope = s.type_params.iter().map(|p| p.name).collect();
                    let fields: Vec<FieldDef> = s
                        .fields
                        .iter()
                        .map(|f| FieldDef {
                            name: f.name.name,
                            ty: self.resolve_type(&f.ty),
                        })
                        .collect();
                    self.type_param_scope.clear();
                    self.registry.insert(
                        s.name.name,
                        TypeDef::Struct {
                            fields,
                            type_params: s.type_params.iter().map(|p| p.name).collect(),
                        },
                    );
                }
                Decl::Fn(f) => {
                    let ty = self.function_signature(f);
                    self.declare(f.name.name, ty, false);
                }
                Decl::Var(v) => {
                    let ty = self.resolve_type_quiet(&v.ty);
                    self.declare(v.name.name, ty, true);
                }
                Decl::Const(c) => {
                    let ty = self.resolve_type_quiet(&c.ty);
                    self.declare(c.name.name, ty, false);
                }
                Decl::Let(l) => {
                    // Inferred once its initializer is checked in order.
                    self.declare(l.name.name, Type::Unknown, false);
                }
                Decl::Shard { declarations, .. } => self.register_signatures(declarations),
                _ => {}
            }
        }
    }

    fn function_signature(&mut self, f: &FnDecl) -> Type {
        // Bodies re-resolve their signature types in pass 3; externs and
        // rejected generics do not, so their errors must surface here.
        let quiet = f.body.is_some() && f.type_params.is_empty();
        let saved = std::mem::replace(&mut self.suppress_errors, quiet);
        let params = f.params.iter().map(|p| self.resolve_type(&p.ty)).collect();
        let ret = match &f.return_type {
            Some(ty) => self.resolve_type(ty),
            None => Type::Void,
        };
        self.suppress_errors = saved;
        Type::Function(FunctionType {
            params,
            ret: Box::new(ret),
            variadic: f.variadic,
            builtin: None,
        })
    }

    // ------------------------------------------------------------------
    // Scope management
    // ------------------------------------------------------------------

    fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: Symbol, ty: Type, mutable: bool) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name, SymbolInfo { ty, mutable });
    }

    fn lookup(&self, name: Symbol) -> Option<&SymbolInfo> {
        self.scopes.iter().rev().find_map(|scope| scope.get(&name))
    }

    fn update_global(&mut self, name: Symbol, ty: Type) {
        if let Some(info) = self.scopes[0].get_mut(&name) {
            info.ty = ty;
        }
    }

    pub(crate) fn error(&mut self, message: impl Into<String>, source_index: usize) {
        if self.suppress_errors {
            return;
        }
        self.errors.push(TypeError {
            message: message.into(),
            source_index,
            decl_index: self.current_decl,
        });
    }

    /// Resolves a type without reporting; pass 3 re-resolves and reports.
    fn resolve_type_quiet(&mut self, node: &TypeNode) -> Type {
        self.suppress_errors = true;
        let ty = self.resolve_type(node);
        self.suppress_errors = false;
        ty
    }

    fn name(&self, sym: Symbol) -> &str {
        self.interner.resolve(sym)
    }

    /// Diagnostic spelling of a type.
    pub(crate) fn display(&self, ty: &Type) -> String {
        ty.display(self.interner)
    }

    // ------------------------------------------------------------------
    // Type resolution
    // ------------------------------------------------------------------

    pub(crate) fn resolve_type(&mut self, node: &TypeNode) -> Type {
        match node {
            TypeNode::Primitive { keyword, .. } => {
                if *keyword == Keyword::Void {
                    Type::Void
                } else {
                    Type::Primitive(*keyword)
                }
            }
            TypeNode::Named { name } => {
                if self.registry.contains(name.name) {
                    Type::Named(name.name)
                } else if self.type_param_scope.contains(&name.name) {
                    Type::TypeParam(name.name)
                } else {
                    self.error(
                        format!("undefined type '{}'", self.name(name.name)),
                        name.source_index,
                    );
                    Type::Unknown
                }
            }
            TypeNode::Pointer { pointee, .. } => Type::pointer_to(self.resolve_type(pointee)),
            TypeNode::Array { element, size, .. } => Type::Array {
                element: Box::new(self.resolve_type(element)),
                size: *size,
            },
            TypeNode::Map { key, value, source_index } => {
                let key_ty = self.resolve_type(key);
                if !is_valid_map_key(&key_ty) {
                    self.error(
                        format!(
                            "map key type must be *u8, *i8, or a primitive, got {}",
                            key_ty.display(self.interner)
                        ),
                        *source_index,
                    );
                }
                Type::Map {
                    key: Box::new(key_ty),
                    value: Box::new(self.resolve_type(value)),
                }
            }
            TypeNode::Tuple { elements, .. } => {
                Type::Tuple(elements.iter().map(|e| self.resolve_type(e)).collect())
            }
            TypeNode::Function { params, ret, variadic, .. } => Type::Function(FunctionType {
                params: params.iter().map(|p| self.resolve_type(p)).collect(),
                ret: Box::new(self.resolve_type(ret)),
                variadic: *variadic,
                builtin: None,
            }),
            TypeNode::Generic { base, args, source_index } => {
                if !self.registry.is_struct(base.name) {
                    self.error(
                        format!("undefined generic type '{}'", self.name(base.name)),
                        base.source_index,
                    );
                    return Type::Unknown;
                }
                if !self.registry.is_generic_struct(base.name) {
                    self.error(
                        format!("type '{}' is not generic", self.name(base.name)),
                        *source_index,
                    );
                    return Type::Unknown;
                }
                Type::Generic {
                    base: base.name,
                    args: args.iter().map(|a| self.resolve_type(a)).collect(),
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn check_decl(&mut self, decl: &Decl) {
        match decl {
            Decl::Fn(f) => self.check_fn(f),
            Decl::Struct(_) | Decl::Enum(_) => {
                // Fully handled by the registration passes.
            }
            Decl::Var(v) => self.check_var(v, true),
            Decl::Const(c) => self.check_const(c, true),
            Decl::Let(l) => self.check_let(l, true),
            Decl::Import { .. } => {}
            Decl::Shard { declarations, .. } => {
                for inner in declarations {
                    self.check_decl(inner);
                }
            }
        }
    }

    fn check_fn(&mut self, f: &FnDecl) {
        if !f.type_params.is_empty() {
            self.error(
                format!(
                    "generic functions are not supported ('{}')",
                    self.name(f.name.name)
                ),
                f.source_index,
            );
            return;
        }

        let Some(body) = &f.body else {
            return; // extern prototype
        };

        self.push_scope();
        for param in &f.params {
            let ty = self.resolve_type(&param.ty);
            self.declare(param.name.name, ty, true);
        }

        let return_type = match &f.return_type {
            Some(ty) => self.resolve_type(ty),
            None => Type::Void,
        };
        let saved_return = std::mem::replace(&mut self.current_return, return_type);
        let saved_loop = std::mem::replace(&mut self.in_loop, false);
        let saved_variadic = std::mem::replace(&mut self.in_variadic_fn, f.variadic);

        self.check_block(body);

        if !self.current_return.is_void() && !control_flow::block_guarantees_return(body) {
            self.error(
                format!(
                    "function '{}' must return a value on all paths",
                    self.name(f.name.name)
                ),
                f.source_index,
            );
        }

        self.current_return = saved_return;
        self.in_loop = saved_loop;
        self.in_variadic_fn = saved_variadic;
        self.pop_scope();
    }

    fn check_var(&mut self, v: &truk_language::ast::VarDecl, global: bool) {
        let declared = self.resolve_type(&v.ty);
        if declared.is_void() {
            self.error("cannot declare a variable of type void", v.source_index);
        }
        if let Some(init) = &v.initializer {
            let value = self.check_expr_hint(init, Some(&declared));
            self.require_compatible(&declared, &value, init.source_index());
        }
        if !global {
            self.declare(v.name.name, declared, true);
        }
    }

    fn check_const(&mut self, c: &truk_language::ast::ConstDecl, global: bool) {
        let declared = self.resolve_type(&c.ty);
        let value = self.check_expr_hint(&c.value, Some(&declared));
        self.require_compatible(&declared, &value, c.value.source_index());
        if !global {
            self.declare(c.name.name, declared, false);
        }
    }

    fn check_let(&mut self, l: &truk_language::ast::LetDecl, global: bool) {
        let inferred = match self.check_expr(&l.initializer) {
            // A bare literal binding concretizes to the default numerics.
            Type::UntypedInt => Type::Primitive(Keyword::I32),
            Type::UntypedFloat => Type::Primitive(Keyword::F64),
            Type::Void => {
                self.error("cannot bind a void expression", l.source_index);
                Type::Unknown
            }
            other => other,
        };
        if global {
            self.update_global(l.name.name, inferred);
        } else {
            self.declare(l.name.name, inferred, false);
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn check_block(&mut self, block: &Block) {
        self.push_scope();
        for stmt in &block.statements {
            self.check_stmt(stmt);
        }
        self.pop_scope();
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(block) => self.check_block(block),
            Stmt::If { condition, then_block, else_block, .. } => {
                let cond = self.check_expr(condition);
                if !cond.is_bool() && !cond.is_unknown() {
                    self.error(
                        format!(
                            "if condition must be bool, got {}",
                            cond.display(self.interner)
                        ),
                        condition.source_index(),
                    );
                }
                self.check_block(then_block);
                if let Some(else_stmt) = else_block {
                    self.check_stmt(else_stmt);
                }
            }
            Stmt::While { condition, body, .. } => {
                let cond = self.check_expr(condition);
                if !cond.is_bool() && !cond.is_unknown() {
                    self.error(
                        format!(
                            "while condition must be bool, got {}",
                            cond.display(self.interner)
                        ),
                        condition.source_index(),
                    );
                }
                let saved = std::mem::replace(&mut self.in_loop, true);
                self.check_block(body);
                self.in_loop = saved;
            }
            Stmt::For { init, condition, post, body, .. } => {
                self.push_scope();
                if let Some(init) = init {
                    self.check_stmt(init);
                }
                if let Some(condition) = condition {
                    let cond = self.check_expr(condition);
                    if !cond.is_bool() && !cond.is_unknown() {
                        self.error(
                            format!(
                                "for condition must be bool, got {}",
                                cond.display(self.interner)
                            ),
                            condition.source_index(),
                        );
                    }
                }
                if let Some(post) = post {
                    self.check_stmt(post);
                }
                let saved = std::mem::replace(&mut self.in_loop, true);
                self.check_block(body);
                self.in_loop = saved;
                self.pop_scope();
            }
            Stmt::Return { values, source_index } => self.check_return(values, *source_index),
            Stmt::Break { source_index } => {
                if !self.in_loop {
                    self.error("break outside of loop", *source_index);
                }
            }
            Stmt::Continue { source_index } => {
                if !self.in_loop {
                    self.error("continue outside of loop", *source_index);
                }
            }
            Stmt::Defer { body, source_index } => {
                if control_flow::contains_control_flow(body) {
                    self.error("defer code cannot contain control flow", *source_index);
                }
                self.check_stmt(body);
            }
            Stmt::Match { scrutinee, arms, .. } => {
                let scrutinee_ty = self.check_expr(scrutinee);
                if !scrutinee_ty.is_comparable(&self.registry) && !scrutinee_ty.is_unknown() {
                    self.error(
                        format!(
                            "match scrutinee must be comparable, got {}",
                            scrutinee_ty.display(self.interner)
                        ),
                        scrutinee.source_index(),
                    );
                }
                for arm in arms {
                    if let Some(pattern) = &arm.pattern {
                        let pattern_ty = self.check_expr_hint(pattern, Some(&scrutinee_ty));
                        if !self.compatible(&scrutinee_ty, &pattern_ty)
                            && !self.compatible(&pattern_ty, &scrutinee_ty)
                        {
                            self.error(
                                format!(
                                    "match pattern type {} does not match scrutinee type {}",
                                    pattern_ty.display(self.interner),
                                    scrutinee_ty.display(self.interner)
                                ),
                                pattern.source_index(),
                            );
                        }
                    }
                    self.check_block(&arm.body);
                }
            }
            Stmt::Assign { target, op, value, source_index } => {
                self.check_assign(target, *op, value, *source_index)
            }
            Stmt::Var(v) => self.check_var(v, false),
            Stmt::Const(c) => self.check_const(c, false),
            Stmt::Let(l) => self.check_let(l, false),
            Stmt::Expr(expr) => {
                self.check_expr(expr);
            }
        }
    }

    fn check_return(&mut self, values: &[Expr], source_index: usize) {
        let expected = self.current_return.clone();
        match (&expected, values.len()) {
            (Type::Void, 0) => {}
            (Type::Void, _) => {
                self.error("cannot return a value from a void function", source_index);
            }
            (_, 0) => {
                self.error("missing return value", source_index);
            }
            (Type::Tuple(elements), n) => {
                if elements.len() != n {
                    self.error(
                        format!("expected {} return values, got {}", elements.len(), n),
                        source_index,
                    );
                    return;
                }
                let elements = elements.clone();
                for (expected_elem, value) in elements.iter().zip(values) {
                    let actual = self.check_expr_hint(value, Some(expected_elem));
                    self.require_compatible(expected_elem, &actual, value.source_index());
                }
            }
            (_, 1) => {
                let actual = self.check_expr_hint(&values[0], Some(&expected));
                self.require_compatible(&expected, &actual, values[0].source_index());
            }
            (_, n) => {
                self.error(format!("expected 1 return value, got {}", n), source_index);
            }
        }
    }

    fn check_assign(&mut self, target: &Expr, op: AssignOp, value: &Expr, source_index: usize) {
        if !target.is_place() {
            self.error("assignment target must be a variable, index, or member", source_index);
            return;
        }

        if let Expr::Identifier(id) = target {
            let immutable = self.lookup(id.name).map(|info| !info.mutable).unwrap_or(false);
            if immutable {
                self.error(
                    format!("cannot assign to immutable '{}'", self.name(id.name)),
                    source_index,
                );
            }
        }

        // Index targets are typed off the already-checked object so maps can
        // take the value-write path: `m[k] = v` stores a value, not a pointer.
        let target_ty = if let Expr::Index { object, index, source_index: index_si } = target {
            let object_ty = self.check_expr(object);
            if let Type::Map { key, value: value_ty } = object_ty {
                self.check_map_key(&key, index);
                let actual = self.check_expr_hint(value, Some(&value_ty));
                self.require_compatible(&value_ty, &actual, value.source_index());
                if op != AssignOp::Assign {
                    self.error("compound assignment is not defined for map elements", source_index);
                }
                return;
            }
            self.index_result_type(object_ty, index, *index_si)
        } else {
            self.check_expr(target)
        };
        let value_ty = self.check_expr_hint(value, Some(&target_ty));

        if op.binary_op().is_some() {
            if !(target_ty.is_numeric() || target_ty.is_unknown()) {
                self.error(
                    format!(
                        "compound assignment requires a numeric target, got {}",
                        target_ty.display(self.interner)
                    ),
                    source_index,
                );
                return;
            }
        }

        self.require_compatible(&target_ty, &value_ty, value.source_index());
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub(crate) fn check_expr(&mut self, expr: &Expr) -> Type {
        self.check_expr_hint(expr, None)
    }

    /// Checks an expression with an optional expected type, which struct
    /// literals of generic templates use to pick their instantiation.
    pub(crate) fn check_expr_hint(&mut self, expr: &Expr, hint: Option<&Type>) -> Type {
        match expr {
            Expr::Literal { kind, .. } => match kind {
                LiteralKind::Integer => Type::UntypedInt,
                LiteralKind::Float => Type::UntypedFloat,
                LiteralKind::Bool => Type::Primitive(Keyword::Bool),
                LiteralKind::Nil => Type::NullPtr,
                LiteralKind::String => Type::pointer_to(Type::Primitive(Keyword::U8)),
                LiteralKind::Char => Type::Primitive(Keyword::U8),
            },
            Expr::Identifier(id) => match self.lookup(id.name) {
                Some(info) => info.ty.clone(),
                None => {
                    self.error(
                        format!("undefined variable '{}'", self.name(id.name)),
                        id.source_index,
                    );
                    Type::Unknown
                }
            },
            Expr::Binary { op, lhs, rhs, source_index } => {
                self.check_binary(*op, lhs, rhs, *source_index)
            }
            Expr::Unary { op, operand, source_index } => {
                self.check_unary(*op, operand, *source_index)
            }
            Expr::Cast { expr, target, source_index } => {
                let source = self.check_expr(expr);
                let target_ty = self.resolve_type(target);
                if !self.cast_permitted(&source, &target_ty) {
                    self.error(
                        format!(
                            "cannot cast {} to {}",
                            source.display(self.interner),
                            target_ty.display(self.interner)
                        ),
                        *source_index,
                    );
                }
                target_ty
            }
            Expr::Call { callee, args, source_index } => {
                self.check_call(callee, args, *source_index)
            }
            Expr::Index { object, index, source_index } => {
                self.check_index(object, index, *source_index)
            }
            Expr::Member { object, field, source_index } => {
                self.check_member(object, *field, *source_index)
            }
            Expr::ArrayLiteral { elements, source_index } => {
                self.check_array_literal(elements, hint, *source_index)
            }
            Expr::StructLiteral { name, fields, .. } => {
                self.check_struct_literal(*name, fields, hint)
            }
            Expr::Lambda(lambda) => self.check_lambda(lambda),
            Expr::TypeParam { source_index, .. } => {
                self.error(
                    "type parameter is only valid as a builtin argument",
                    *source_index,
                );
                Type::Unknown
            }
        }
    }

    fn check_binary(&mut self, op: truk_language::ast::BinaryOp, lhs: &Expr, rhs: &Expr, source_index: usize) -> Type {
        use truk_language::ast::BinaryOp;

        let left = self.check_expr(lhs);
        let right = self.check_expr(rhs);
        if left.is_unknown() || right.is_unknown() {
            return Type::Unknown;
        }

        if op.is_arithmetic() {
            return match self.arithmetic_result(&left, &right) {
                Some(ty) => ty,
                None => {
                    self.error(
                        format!(
                            "operator '{}' requires numeric operands of the same type, got {} and {}",
                            op.as_str(),
                            left.display(self.interner),
                            right.display(self.interner)
                        ),
                        source_index,
                    );
                    Type::Unknown
                }
            };
        }

        if op.is_comparison() {
            let comparable = left.is_comparable(&self.registry)
                && right.is_comparable(&self.registry)
                && (self.compatible(&left, &right) || self.compatible(&right, &left));
            // Ordering on pointers is allowed only through equality.
            let ordered_pointers = !op.is_equality() && (matches!(left, Type::NullPtr) || matches!(right, Type::NullPtr));
            if !comparable || ordered_pointers {
                self.error(
                    format!(
                        "operator '{}' requires comparable operands of the same type, got {} and {}",
                        op.as_str(),
                        left.display(self.interner),
                        right.display(self.interner)
                    ),
                    source_index,
                );
                return Type::Unknown;
            }
            return Type::Primitive(Keyword::Bool);
        }

        if op.is_logical() {
            if !left.is_bool() || !right.is_bool() {
                self.error(
                    format!(
                        "operator '{}' requires bool operands, got {} and {}",
                        op.as_str(),
                        left.display(self.interner),
                        right.display(self.interner)
                    ),
                    source_index,
                );
                return Type::Unknown;
            }
            return Type::Primitive(Keyword::Bool);
        }

        // Bitwise and shifts.
        debug_assert!(op.is_bitwise());
        if !left.is_integer() || !right.is_integer() {
            self.error(
                format!(
                    "operator '{}' requires integer operands, got {} and {}",
                    op.as_str(),
                    left.display(self.interner),
                    right.display(self.interner)
                ),
                source_index,
            );
            return Type::Unknown;
        }
        if matches!(op, BinaryOp::Shl | BinaryOp::Shr) {
            // Shift result takes the left operand's type.
            return left;
        }
        match (&left, &right) {
            (Type::UntypedInt, Type::UntypedInt) => Type::UntypedInt,
            (Type::UntypedInt, _) => right,
            _ => left,
        }
    }

    fn arithmetic_result(&self, left: &Type, right: &Type) -> Option<Type> {
        if !left.is_numeric() || !right.is_numeric() {
            return None;
        }
        match (left.is_untyped(), right.is_untyped()) {
            (true, true) => {
                if left.is_float() || right.is_float() {
                    Some(Type::UntypedFloat)
                } else {
                    Some(Type::UntypedInt)
                }
            }
            (true, false) => {
                if matches!(left, Type::UntypedFloat) && !right.is_float() {
                    None
                } else {
                    Some(right.clone())
                }
            }
            (false, true) => {
                if matches!(right, Type::UntypedFloat) && !left.is_float() {
                    None
                } else {
                    Some(left.clone())
                }
            }
            (false, false) => {
                if left == right || matches!(left, Type::Extern) || matches!(right, Type::Extern) {
                    Some(left.clone())
                } else {
                    None
                }
            }
        }
    }

    fn check_unary(&mut self, op: UnaryOp, operand: &Expr, source_index: usize) -> Type {
        let ty = self.check_expr(operand);
        if ty.is_unknown() {
            return Type::Unknown;
        }
        match op {
            UnaryOp::Neg => {
                if ty.is_numeric() {
                    ty
                } else {
                    self.error(
                        format!("operator '-' requires a numeric operand, got {}", ty.display(self.interner)),
                        source_index,
                    );
                    Type::Unknown
                }
            }
            UnaryOp::Not => {
                if ty.is_bool() {
                    Type::Primitive(Keyword::Bool)
                } else {
                    self.error(
                        format!("operator '!' requires a bool operand, got {}", ty.display(self.interner)),
                        source_index,
                    );
                    Type::Unknown
                }
            }
            UnaryOp::BitNot => {
                if ty.is_integer() {
                    ty
                } else {
                    self.error(
                        format!("operator '~' requires an integer operand, got {}", ty.display(self.interner)),
                        source_index,
                    );
                    Type::Unknown
                }
            }
            UnaryOp::AddressOf => {
                if !operand.is_place() {
                    self.error("cannot take the address of a temporary", source_index);
                    return Type::Unknown;
                }
                Type::pointer_to(ty)
            }
            UnaryOp::Deref => match ty {
                Type::Pointer(pointee) => *pointee,
                Type::Extern => Type::Extern,
                _ => {
                    self.error(
                        format!("cannot dereference non-pointer type {}", ty.display(self.interner)),
                        source_index,
                    );
                    Type::Unknown
                }
            },
        }
    }

    fn check_call(&mut self, callee: &Expr, args: &[Expr], source_index: usize) -> Type {
        let callee_ty = match callee {
            Expr::Identifier(id) => match self.lookup(id.name) {
                Some(info) => info.ty.clone(),
                None => {
                    self.error(
                        format!("undefined function '{}'", self.name(id.name)),
                        id.source_index,
                    );
                    return Type::Unknown;
                }
            },
            other => self.check_expr(other),
        };

        match callee_ty {
            Type::Function(signature) => {
                if let Some(kind) = signature.builtin {
                    return self.validate_builtin_call(kind, args, source_index);
                }

                let arity_ok = if signature.variadic {
                    args.len() >= signature.params.len()
                } else {
                    args.len() == signature.params.len()
                };
                if !arity_ok {
                    self.error(
                        format!(
                            "expected {}{} arguments, got {}",
                            if signature.variadic { "at least " } else { "" },
                            signature.params.len(),
                            args.len()
                        ),
                        source_index,
                    );
                }

                for (i, arg) in args.iter().enumerate() {
                    if matches!(arg, Expr::TypeParam { .. }) {
                        self.error(
                            "type parameter is only valid as a builtin argument",
                            arg.source_index(),
                        );
                        continue;
                    }
                    let expected = signature.params.get(i).cloned();
                    let actual = self.check_expr_hint(arg, expected.as_ref());
                    if let Some(expected) = expected {
                        self.require_compatible(&expected, &actual, arg.source_index());
                    }
                }

                (*signature.ret).clone()
            }
            Type::Extern => {
                for arg in args {
                    if !matches!(arg, Expr::TypeParam { .. }) {
                        self.check_expr(arg);
                    }
                }
                Type::Extern
            }
            Type::Unknown => Type::Unknown,
            other => {
                self.error(
                    format!("cannot call non-function type {}", other.display(self.interner)),
                    source_index,
                );
                Type::Unknown
            }
        }
    }

    fn check_index(&mut self, object: &Expr, index: &Expr, source_index: usize) -> Type {
        let object_ty = self.check_expr(object);
        self.index_result_type(object_ty, index, source_index)
    }

    /// Types an index expression against an already-computed object type.
    pub(crate) fn index_result_type(
        &mut self,
        object_ty: Type,
        index: &Expr,
        source_index: usize,
    ) -> Type {
        match object_ty {
            Type::Array { element, .. } => {
                let index_ty = self.check_expr(index);
                if !index_ty.is_integer() && !index_ty.is_unknown() {
                    self.error(
                        format!(
                            "array index must be an integer, got {}",
                            index_ty.display(self.interner)
                        ),
                        index.source_index(),
                    );
                }
                *element
            }
            Type::Map { key, value } => {
                self.check_map_key(&key, index);
                // Map reads hand back a nullable reference into the map.
                Type::pointer_to(*value)
            }
            Type::Tuple(elements) => {
                // Tuple elements are addressed by integer literal.
                if let Expr::Literal { kind: LiteralKind::Integer, lexeme, .. } = index {
                    let text = self.interner.resolve(*lexeme);
                    match truk_language::parser::parse_int_lexeme(text) {
                        Some(n) if (n as usize) < elements.len() && n >= 0 => {
                            elements[n as usize].clone()
                        }
                        _ => {
                            self.error(
                                format!("tuple index out of range (arity {})", elements.len()),
                                index.source_index(),
                            );
                            Type::Unknown
                        }
                    }
                } else {
                    self.error(
                        "tuple index must be an integer literal",
                        index.source_index(),
                    );
                    Type::Unknown
                }
            }
            Type::Extern => {
                self.check_expr(index);
                Type::Extern
            }
            Type::Unknown => Type::Unknown,
            other => {
                self.error(
                    format!(
                        "cannot index non-array type {}",
                        other.display(self.interner)
                    ),
                    source_index,
                );
                Type::Unknown
            }
        }
    }

    /// Validates a map index expression against the declared key type.
    pub(crate) fn check_map_key(&mut self, key_ty: &Type, index: &Expr) {
        let index_ty = self.check_expr(index);
        if index_ty.is_unknown() {
            return;
        }

        let ok = if key_ty.is_u8_pointer() || matches!(key_ty, Type::Pointer(p) if matches!(**p, Type::Primitive(Keyword::I8))) {
            // String-keyed map: pointer keys, string literals, or []u8
            // slices (lowered through their data pointer).
            self.compatible(key_ty, &index_ty)
                || matches!(&index_ty, Type::Array { element, size: None }
                    if matches!(**element, Type::Primitive(Keyword::U8)))
        } else {
            self.compatible(key_ty, &index_ty)
        };

        if !ok {
            self.error(
                format!(
                    "map key type mismatch: expected {}, got {}",
                    key_ty.display(self.interner),
                    index_ty.display(self.interner)
                ),
                index.source_index(),
            );
        }
    }

    fn check_member(&mut self, object: &Expr, field: Ident, source_index: usize) -> Type {
        // Enum value access: the object names a registered enum and no
        // variable shadows it.
        if let Expr::Identifier(id) = object {
            if self.lookup(id.name).is_none() && self.registry.is_enum(id.name) {
                if self.registry.variant(id.name, field.name).is_none() {
                    self.error(
                        format!(
                            "enum '{}' has no variant '{}'",
                            self.name(id.name),
                            self.name(field.name)
                        ),
                        field.source_index,
                    );
                    return Type::Unknown;
                }
                return Type::Named(id.name);
            }
        }

        let mut object_ty = self.check_expr(object);
        // Pointers to structs auto-dereference one level.
        if let Type::Pointer(inner) = object_ty {
            object_ty = *inner;
        }

        match object_ty {
            Type::Named(name) => {
                if self.registry.is_extern_struct(name) {
                    return Type::Extern;
                }
                match self.registry.field(name, field.name) {
                    Some(field_def) => field_def.ty.clone(),
                    None => {
                        if self.registry.is_struct(name) {
                            self.error(
                                format!(
                                    "struct '{}' has no field '{}'",
                                    self.name(name),
                                    self.name(field.name)
                                ),
                                field.source_index,
                            );
                        } else {
                            self.error(
                                format!(
                                    "member access on non-struct type {}",
                                    Type::Named(name).display(self.interner)
                                ),
                                source_index,
                            );
                        }
                        Type::Unknown
                    }
                }
            }
            Type::Generic { base, args } => {
                let template = match self.registry.get(base) {
                    Some(TypeDef::Struct { fields, type_params }) => {
                        Some((fields.clone(), type_params.clone()))
                    }
                    _ => None,
                };
                match template {
                    Some((fields, type_params)) => {
                        match fields.iter().find(|f| f.name == field.name) {
                            Some(def) => substitute(&def.ty, &type_params, &args),
                            None => {
                                self.error(
                                    format!(
                                        "struct '{}' has no field '{}'",
                                        self.name(base),
                                        self.name(field.name)
                                    ),
                                    field.source_index,
                                );
                                Type::Unknown
                            }
                        }
                    }
                    None => Type::Unknown,
                }
            }
            Type::Extern => Type::Extern,
            Type::Unknown => Type::Unknown,
            other => {
                self.error(
                    format!(
                        "member access on non-struct type {}",
                        other.display(self.interner)
                    ),
                    source_index,
                );
                Type::Unknown
            }
        }
    }

    fn check_array_literal(
        &mut self,
        elements: &[Expr],
        hint: Option<&Type>,
        source_index: usize,
    ) -> Type {
        let element_hint = match hint {
            Some(Type::Array { element, .. }) => Some((**element).clone()),
            _ => None,
        };

        if elements.is_empty() {
            let element = element_hint.unwrap_or(Type::Unknown);
            if element.is_unknown() {
                self.error("cannot infer the element type of an empty array literal", source_index);
            }
            return Type::Array { element: Box::new(element), size: Some(0) };
        }

        let first = self.check_expr_hint(&elements[0], element_hint.as_ref());
        for element in &elements[1..] {
            let ty = self.check_expr_hint(element, Some(&first));
            if !self.compatible(&first, &ty) && !self.compatible(&ty, &first) {
                self.error(
                    format!(
                        "array literal elements must share one type: {} vs {}",
                        first.display(self.interner),
                        ty.display(self.interner)
                    ),
                    element.source_index(),
                );
            }
        }

        Type::Array {
            element: Box::new(first),
            size: Some(elements.len() as u64),
        }
    }

    fn check_struct_literal(
        &mut self,
        name: Ident,
        fields: &[truk_language::ast::FieldInit],
        hint: Option<&Type>,
    ) -> Type {
        let Some(def) = self.registry.get(name.name) else {
            self.error(
                format!("undefined struct '{}'", self.name(name.name)),
                name.source_index,
            );
            for field in fields {
                self.check_expr(&field.value);
            }
            return Type::Unknown;
        };

        let TypeDef::Struct { fields: defined, type_params } = def else {
            self.error(
                format!("'{}' is not a struct", self.name(name.name)),
                name.source_index,
            );
            return Type::Unknown;
        };
        let defined = defined.clone();
        let type_params = type_params.clone();

        // A generic template instantiates against the hinted target type.
        let generic_args = match hint {
            Some(Type::Generic { base, args }) if *base == name.name => Some(args.clone()),
            _ => None,
        };

        for field_init in fields {
            let declared = defined.iter().find(|f| f.name == field_init.name.name);
            match declared {
                Some(field_def) => {
                    let expected = match &generic_args {
                        Some(args) => substitute(&field_def.ty, &type_params, args),
                        None => field_def.ty.clone(),
                    };
                    let actual = self.check_expr_hint(&field_init.value, Some(&expected));
                    self.require_compatible(&expected, &actual, field_init.value.source_index());
                }
                None => {
                    self.error(
                        format!(
                            "struct '{}' has no field '{}'",
                            self.name(name.name),
                            self.name(field_init.name.name)
                        ),
                        field_init.name.source_index,
                    );
                    self.check_expr(&field_init.value);
                }
            }
        }

        match generic_args {
            Some(args) => Type::Generic { base: name.name, args },
            None => Type::Named(name.name),
        }
    }

    fn check_lambda(&mut self, lambda: &LambdaExpr) -> Type {
        let params: Vec<Type> = lambda
            .params
            .iter()
            .map(|p| self.resolve_type(&p.ty))
            .collect();
        let ret = match &lambda.return_type {
            Some(ty) => self.resolve_type(ty),
            None => Type::Void,
        };

        self.push_scope();
        for (param, ty) in lambda.params.iter().zip(&params) {
            self.declare(param.name.name, ty.clone(), true);
        }
        let saved_return = std::mem::replace(&mut self.current_return, ret.clone());
        let saved_loop = std::mem::replace(&mut self.in_loop, false);
        let saved_variadic = std::mem::replace(&mut self.in_variadic_fn, false);

        self.check_block(&lambda.body);

        if !ret.is_void() && !control_flow::block_guarantees_return(&lambda.body) {
            self.error(
                "lambda must return a value on all paths",
                lambda.source_index,
            );
        }

        self.current_return = saved_return;
        self.in_loop = saved_loop;
        self.in_variadic_fn = saved_variadic;
        self.pop_scope();

        Type::Function(FunctionType {
            params,
            ret: Box::new(ret),
            variadic: false,
            builtin: None,
        })
    }

    // ------------------------------------------------------------------
    // Compatibility
    // ------------------------------------------------------------------

    pub(crate) fn require_compatible(&mut self, target: &Type, source: &Type, source_index: usize) {
        if !self.compatible(target, source) {
            self.error(
                format!(
                    "type mismatch: cannot assign {} to {}",
                    source.display(self.interner),
                    target.display(self.interner)
                ),
                source_index,
            );
        }
    }

    /// Assignment compatibility of `source` into `target`.
    pub(crate) fn compatible(&self, target: &Type, source: &Type) -> bool {
        compatible_types(target, source)
    }

    fn cast_permitted(&self, source: &Type, target: &Type) -> bool {
        if source.is_unknown() || target.is_unknown() {
            return true;
        }
        if matches!(source, Type::Extern) || matches!(target, Type::Extern) {
            return true;
        }
        // Primitive ↔ primitive, including untyped literals and enums
        // (an enum is its backing integer for cast purposes).
        let primitive_like = |ty: &Type| {
            matches!(ty, Type::Primitive(_) | Type::UntypedInt | Type::UntypedFloat)
                || matches!(ty, Type::Named(n) if self.registry.is_enum(*n))
        };
        if primitive_like(source) && primitive_like(target) {
            return true;
        }
        // Pointer ↔ pointer (void* included), nil → pointer.
        if source.is_pointer() && target.is_pointer() {
            return true;
        }
        // Arrays of the same shape.
        if let (
            Type::Array { element: se, size: ss },
            Type::Array { element: te, size: ts },
        ) = (source, target)
        {
            return ss == ts && compatible_types(te, se);
        }
        false
    }

    pub(crate) fn in_variadic_fn(&self) -> bool {
        self.in_variadic_fn
    }
}

/// Substitutes a struct template's type parameters with concrete arguments.
pub(crate) fn substitute(ty: &Type, params: &[Symbol], args: &[Type]) -> Type {
    match ty {
        Type::TypeParam(name) => {
            match params.iter().position(|p| p == name) {
                Some(i) if i < args.len() => args[i].clone(),
                _ => ty.clone(),
            }
        }
        Type::Pointer(inner) => Type::pointer_to(substitute(inner, params, args)),
        Type::Array { element, size } => Type::Array {
            element: Box::new(substitute(element, params, args)),
            size: *size,
        },
        Type::Map { key, value } => Type::Map {
            key: Box::new(substitute(key, params, args)),
            value: Box::new(substitute(value, params, args)),
        },
        Type::Tuple(elements) => {
            Type::Tuple(elements.iter().map(|e| substitute(e, params, args)).collect())
        }
        Type::Generic { base, args: inner } => Type::Generic {
            base: *base,
            args: inner.iter().map(|a| substitute(a, params, args)).collect(),
        },
        other => other.clone(),
    }
}

fn is_valid_map_key(key: &Type) -> bool {
    match key {
        Type::Pointer(p) => {
            matches!(**p, Type::Primitive(Keyword::U8) | Type::Primitive(Keyword::I8))
        }
        Type::Primitive(kw) => kw.is_integer_type() || kw.is_float_type() || *kw == Keyword::Bool,
        Type::Unknown | Type::Extern => true,
        _ => false,
    }
}

/// Structural assignment compatibility, free of checker state.
pub(crate) fn compatible_types(target: &Type, source: &Type) -> bool {
    if target.is_unknown() || source.is_unknown() {
        return true;
    }
    if matches!(target, Type::Extern) || matches!(source, Type::Extern) {
        return true;
    }
    if matches!(target, Type::TypeParam(_)) || matches!(source, Type::TypeParam(_)) {
        return true;
    }
    if target == source {
        return true;
    }

    match (target, source) {
        // Untyped literal coercion.
        (t, Type::UntypedInt) if t.is_numeric() => true,
        (t, Type::UntypedFloat) if t.is_float() => true,
        // nil into any pointer.
        (Type::Pointer(_), Type::NullPtr) => true,
        // void* absorbs any pointer, in both directions.
        (t, Type::Pointer(_)) if t.is_void_pointer() => true,
        (Type::Pointer(_), s) if s.is_void_pointer() => true,
        (Type::Pointer(a), Type::Pointer(b)) => compatible_types(a, b),
        (
            Type::Array { element: te, size: ts },
            Type::Array { element: se, size: ss },
        ) => {
            let size_ok = match (ts, ss) {
                (Some(a), Some(b)) => a == b,
                (None, None) => true,
                _ => false,
            };
            size_ok && compatible_types(te, se)
        }
        (Type::Map { key: tk, value: tv }, Type::Map { key: sk, value: sv }) => {
            compatible_types(tk, sk) && compatible_types(tv, sv)
        }
        (Type::Tuple(a), Type::Tuple(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| compatible_types(x, y))
        }
        // A generic struct literal without explicit arguments is compatible
        // with any instantiation of its template.
        (Type::Generic { base, .. }, Type::Named(name)) => base == name,
        (Type::Function(a), Type::Function(b)) => {
            a.params == b.params && a.ret == b.ret && a.variadic == b.variadic
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatible_untyped_int_into_numeric() {
        assert!(compatible_types(&Type::Primitive(Keyword::I32), &Type::UntypedInt));
        assert!(compatible_types(&Type::Primitive(Keyword::F64), &Type::UntypedInt));
        assert!(!compatible_types(&Type::Primitive(Keyword::Bool), &Type::UntypedInt));
    }

    #[test]
    fn untyped_float_only_into_floats() {
        assert!(compatible_types(&Type::Primitive(Keyword::F32), &Type::UntypedFloat));
        assert!(!compatible_types(&Type::Primitive(Keyword::I32), &Type::UntypedFloat));
    }

    #[test]
    fn nil_into_pointers_only() {
        assert!(compatible_types(
            &Type::pointer_to(Type::Primitive(Keyword::I32)),
            &Type::NullPtr
        ));
        assert!(!compatible_types(&Type::Primitive(Keyword::I32), &Type::NullPtr));
    }

    #[test]
    fn void_pointer_absorbs_both_directions() {
        let voidp = Type::pointer_to(Type::Void);
        let intp = Type::pointer_to(Type::Primitive(Keyword::I32));
        assert!(compatible_types(&voidp, &intp));
        assert!(compatible_types(&intp, &voidp));
    }

    #[test]
    fn sized_arrays_require_equal_sizes() {
        let a5 = Type::Array {
            element: Box::new(Type::Primitive(Keyword::I32)),
            size: Some(5),
        };
        let a3 = Type::Array {
            element: Box::new(Type::Primitive(Keyword::I32)),
            size: Some(3),
        };
        let slice = Type::slice_of(Type::Primitive(Keyword::I32));
        assert!(compatible_types(&a5, &a5));
        assert!(!compatible_types(&a5, &a3));
        assert!(!compatible_types(&a5, &slice));
        assert!(!compatible_types(&slice, &a5));
        assert!(compatible_types(&slice, &slice));
    }

    #[test]
    fn substitute_replaces_type_params() {
        let mut interner = Interner::new();
        let t = interner.intern("T");
        let template = Type::pointer_to(Type::TypeParam(t));
        let result = substitute(&template, &[t], &[Type::Primitive(Keyword::I64)]);
        assert_eq!(result, Type::pointer_to(Type::Primitive(Keyword::I64)));
    }
}
