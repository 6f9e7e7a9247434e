//! Expression lowering.
//!
//! Expressions come back as strings; statements they need (an `each` loop,
//! a map set) are written into the function buffer directly and an empty
//! string returned. Slice indexing always brackets the access with a
//! bounds check via a GNU statement expression, matching the runtime
//! contract.
//!
//! Type inference here mirrors the checker in shape but never fails: the
//! checker has already validated the program, so this pass only needs
//! enough typing to pick lowering forms (slice vs array vs map indexing,
//! struct member spelling, map key handling).

use std::fmt::Write as _;

use truk_language::ast::{Expr, LambdaExpr, LiteralKind, UnaryOp};
use truk_language::builtins::{self, BuiltinKind};
use truk_language::Keyword;

use crate::analysis::check::substitute;
use crate::analysis::types::{FunctionType, Type, TypeDef};
use crate::codegen_c::types::{c_type, c_var_decl, escape_ident, indent, lower_type};
use crate::codegen_c::{DeferScope, Emitter, ScopeKind};

impl Emitter<'_> {
    pub(crate) fn emit_expr(&mut self, expr: &Expr) -> String {
        self.emit_expr_hint(expr, None)
    }

    /// Emits an expression; `hint` is the target type at initializer,
    /// assignment, argument and return positions, used to name generic
    /// struct literals and empty aggregates.
    pub(crate) fn emit_expr_hint(&mut self, expr: &Expr, hint: Option<&Type>) -> String {
        match expr {
            Expr::Literal { kind, lexeme, .. } => {
                let text = self.resolve(*lexeme).to_string();
                match kind {
                    LiteralKind::Integer | LiteralKind::Float => text,
                    LiteralKind::Bool => text,
                    LiteralKind::Nil => "NULL".to_string(),
                    // Strings stay C string literals; the cast fixes the
                    // signedness mismatch against __truk_u8*.
                    LiteralKind::String => format!("(__truk_u8*){}", text),
                    LiteralKind::Char => text,
                }
            }
            Expr::Identifier(id) => self.ident(id.name),
            Expr::Binary { op, lhs, rhs, .. } => {
                let left = self.emit_expr(lhs);
                let right = self.emit_expr(rhs);
                format!("({} {} {})", left, op.as_str(), right)
            }
            Expr::Unary { op, operand, .. } => {
                let inner = self.emit_expr(operand);
                format!("({}{})", op.as_str(), inner)
            }
            Expr::Cast { expr, target, .. } => {
                let ty = lower_type(target, self.registry);
                self.ensure_type_support(&ty);
                let inner = self.emit_expr(expr);
                format!("(({}){})", c_type(&ty, self.interner), inner)
            }
            Expr::Call { callee, args, source_index } => {
                self.emit_call(callee, args, *source_index)
            }
            Expr::Index { object, index, .. } => self.emit_index(object, index),
            Expr::Member { object, field, .. } => {
                // Enum value access spells as the generated constant.
                if let Expr::Identifier(id) = &**object {
                    if self.var_type(id.name).is_none() && self.registry.is_enum(id.name) {
                        return format!(
                            "{}_{}",
                            escape_ident(self.resolve(id.name)),
                            escape_ident(self.resolve(field.name))
                        );
                    }
                }
                let object_ty = self.infer_expr_type(object);
                let object_text = self.emit_expr(object);
                let accessor = if matches!(object_ty, Type::Pointer(_)) { "->" } else { "." };
                format!("{}{}{}", object_text, accessor, escape_ident(self.resolve(field.name)))
            }
            Expr::ArrayLiteral { elements, .. } => {
                let parts: Vec<String> = elements
                    .iter()
                    .map(|e| {
                        let element_hint = match hint {
                            Some(Type::Array { element, .. }) => Some((**element).clone()),
                            _ => None,
                        };
                        self.emit_expr_hint(e, element_hint.as_ref())
                    })
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Expr::StructLiteral { name, fields, .. } => {
                // Generic templates take their mangled instantiation name
                // from the target type; concrete structs use their own.
                let type_name = match hint {
                    Some(ty @ Type::Generic { .. }) => {
                        self.ensure_type_support(ty);
                        self.mangled(ty)
                    }
                    _ => escape_ident(self.resolve(name.name)),
                };
                let generic_context = match hint {
                    Some(Type::Generic { base, args }) => Some((*base, args.clone())),
                    _ => None,
                };
                let mut parts = Vec::new();
                for field in fields {
                    let field_hint = self.struct_field_type(name.name, field.name.name).map(|ty| {
                        match &generic_context {
                            Some((base, args)) => {
                                if let Some(TypeDef::Struct { type_params, .. }) =
                                    self.registry.get(*base)
                                {
                                    substitute(&ty, type_params, args)
                                } else {
                                    ty
                                }
                            }
                            None => ty,
                        }
                    });
                    let value = self.emit_expr_hint(&field.value, field_hint.as_ref());
                    parts.push(format!(
                        ".{} = {}",
                        escape_ident(self.resolve(field.name.name)),
                        value
                    ));
                }
                format!("({}){{{}}}", type_name, parts.join(", "))
            }
            Expr::Lambda(lambda) => self.emit_lambda(lambda),
            Expr::TypeParam { source_index, .. } => {
                self.error("type parameter outside builtin call", *source_index);
                String::new()
            }
        }
    }

    fn emit_call(&mut self, callee: &Expr, args: &[Expr], source_index: usize) -> String {
        if let Expr::Identifier(id) = callee {
            // User definitions shadow builtins, matching the checker.
            if self.var_type(id.name).is_none() && !self.fn_types.contains_key(&id.name) {
                if let Some(builtin) = builtins::lookup(self.resolve(id.name)) {
                    return self.emit_builtin(builtin.kind, args, source_index);
                }
            }
        }

        let callee_text = self.emit_expr(callee);
        let param_types: Vec<Type> = match callee {
            Expr::Identifier(id) => self
                .fn_types
                .get(&id.name)
                .map(|f| f.params.clone())
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        let parts: Vec<String> = args
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                let hint = param_types.get(i).cloned();
                self.emit_expr_hint(arg, hint.as_ref())
            })
            .collect();
        format!("{}({})", callee_text, parts.join(", "))
    }

    fn emit_index(&mut self, object: &Expr, index: &Expr) -> String {
        let object_ty = self.infer_expr_type(object);
        match object_ty {
            Type::Array { size: None, .. } => {
                let object_text = self.emit_expr(object);
                let index_text = self.emit_expr(index);
                format!(
                    "({{ TRUK_BOUNDS_CHECK({}, ({}).len); ({}).data[{}]; }})",
                    index_text, object_text, object_text, index_text
                )
            }
            Type::Array { size: Some(_), .. } => {
                let object_text = self.emit_expr(object);
                let index_text = self.emit_expr(index);
                format!("{}[{}]", object_text, index_text)
            }
            Type::Map { key, .. } => {
                let object_text = self.emit_expr(object);
                self.emit_map_get(&object_text, &key, index)
            }
            Type::Tuple(_) => {
                let object_text = self.emit_expr(object);
                let index_text = self.emit_expr(index);
                format!("{}._{}", object_text, index_text)
            }
            _ => {
                let object_text = self.emit_expr(object);
                let index_text = self.emit_expr(index);
                format!("{}[{}]", object_text, index_text)
            }
        }
    }

    // ------------------------------------------------------------------
    // Map access
    // ------------------------------------------------------------------

    /// The C type and initializer for a key temporary. Slice-of-u8 keys
    /// pass their data pointer.
    fn key_temp(&mut self, key_ty: &Type, index: &Expr) -> (String, String) {
        let index_ty = self.infer_expr_type(index);
        let key_c = c_type(key_ty, self.interner);
        let index_text = self.emit_expr(index);
        let init = if index_ty.is_slice() {
            format!("({}.data)", index_text)
        } else {
            index_text
        };
        (key_c, init)
    }

    pub(crate) fn emit_map_get(&mut self, object: &str, key_ty: &Type, index: &Expr) -> String {
        let (key_c, init) = self.key_temp(key_ty, index);
        let temp = self.next_temp();
        format!(
            "({{ {key_c} __truk_key_{temp} = {init}; __truk_map_get_generic(&({object}), &__truk_key_{temp}); }})",
            key_c = key_c,
            temp = temp,
            init = init,
            object = object,
        )
    }

    pub(crate) fn emit_map_set(
        &mut self,
        object: &str,
        key_ty: &Type,
        index: &Expr,
        value: &str,
    ) {
        let (key_c, init) = self.key_temp(key_ty, index);
        let temp = self.next_temp();
        let _ = writeln!(self.functions, "{}{{", indent(self.indent));
        let _ = writeln!(
            self.functions,
            "{}{} __truk_key_{} = {};",
            indent(self.indent + 1),
            key_c,
            temp,
            init
        );
        let _ = writeln!(
            self.functions,
            "{}__truk_map_set_generic(&({}), &__truk_key_{}, {});",
            indent(self.indent + 1),
            object,
            temp,
            value
        );
        let _ = writeln!(self.functions, "{}}}", indent(self.indent));
    }

    pub(crate) fn emit_map_remove(&mut self, object: &str, key_ty: &Type, index: &Expr) -> String {
        let (key_c, init) = self.key_temp(key_ty, index);
        let temp = self.next_temp();
        format!(
            "({{ {key_c} __truk_key_{temp} = {init}; __truk_map_remove_generic(&({object}), &__truk_key_{temp}); }})",
            key_c = key_c,
            temp = temp,
            init = init,
            object = object,
        )
    }

    // ------------------------------------------------------------------
    // Lambda lifting
    // ------------------------------------------------------------------

    /// Lifts a lambda to a uniquely named top-level function and returns
    /// that name as the expression value.
    fn emit_lambda(&mut self, lambda: &LambdaExpr) -> String {
        let name = format!("__truk_lambda_{}", self.lambda_counter);
        self.lambda_counter += 1;

        let ret = match &lambda.return_type {
            Some(ty) => lower_type(ty, self.registry),
            None => Type::Void,
        };
        self.ensure_type_support(&ret);

        let mut params = Vec::new();
        let mut param_types = Vec::new();
        for param in &lambda.params {
            let ty = lower_type(&param.ty, self.registry);
            self.ensure_type_support(&ty);
            let pname = escape_ident(self.resolve(param.name.name));
            params.push(c_var_decl(&ty, &pname, self.interner));
            param_types.push((param.name.name, ty));
        }
        let param_list = if params.is_empty() {
            "__truk_void".to_string()
        } else {
            params.join(", ")
        };
        let signature = format!("{} {}({})", c_type(&ret, self.interner), name, param_list);
        let _ = writeln!(self.prototypes, "static {};", signature);

        // The lambda body emits into a fresh buffer so the surrounding
        // function's text is untouched.
        let saved_functions = std::mem::take(&mut self.functions);
        let saved_indent = std::mem::replace(&mut self.indent, 1);
        let saved_ret = std::mem::replace(&mut self.current_fn_ret, ret);
        let saved_variadic = std::mem::replace(&mut self.in_variadic_fn, false);
        let saved_defers = std::mem::take(&mut self.defer_stack);

        self.push_var_scope();
        for (pname, ty) in param_types {
            self.declare_var(pname, ty);
        }
        self.defer_stack.push(DeferScope { kind: ScopeKind::Lambda, defers: Vec::new() });

        let _ = writeln!(self.functions, "static {} {{", signature);
        for stmt in &lambda.body.statements {
            self.emit_stmt(stmt);
        }
        if !crate::analysis::control_flow::block_guarantees_return(&lambda.body) {
            self.replay_defers_through(ScopeKind::Lambda);
        }
        let _ = writeln!(self.functions, "}}\n");

        self.defer_stack.pop();
        self.pop_var_scope();

        let lifted = std::mem::replace(&mut self.functions, saved_functions);
        self.lambdas.push_str(&lifted);
        self.indent = saved_indent;
        self.current_fn_ret = saved_ret;
        self.in_variadic_fn = saved_variadic;
        self.defer_stack = saved_defers;

        name
    }

    // ------------------------------------------------------------------
    // Emission-side type inference
    // ------------------------------------------------------------------

    /// Infers an expression's type, concretizing untyped literals.
    pub(crate) fn infer_concrete(&self, expr: &Expr) -> Type {
        match self.infer_expr_type(expr) {
            Type::UntypedInt => Type::Primitive(Keyword::I32),
            Type::UntypedFloat => Type::Primitive(Keyword::F64),
            other => other,
        }
    }

    /// Best-effort expression typing for lowering decisions. The program
    /// is already checked, so failure cases collapse to `Unknown`.
    pub(crate) fn infer_expr_type(&self, expr: &Expr) -> Type {
        match expr {
            Expr::Literal { kind, .. } => match kind {
                LiteralKind::Integer => Type::UntypedInt,
                LiteralKind::Float => Type::UntypedFloat,
                LiteralKind::Bool => Type::Primitive(Keyword::Bool),
                LiteralKind::Nil => Type::NullPtr,
                LiteralKind::String => Type::pointer_to(Type::Primitive(Keyword::U8)),
                LiteralKind::Char => Type::Primitive(Keyword::U8),
            },
            Expr::Identifier(id) => {
                if let Some(ty) = self.var_type(id.name) {
                    if !ty.is_unknown() {
                        return ty.clone();
                    }
                }
                if let Some(signature) = self.fn_types.get(&id.name) {
                    return Type::Function(signature.clone());
                }
                Type::Unknown
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                if op.is_comparison() || op.is_logical() {
                    return Type::Primitive(Keyword::Bool);
                }
                let left = self.infer_expr_type(lhs);
                if left.is_untyped() || left.is_unknown() {
                    self.infer_expr_type(rhs)
                } else {
                    left
                }
            }
            Expr::Unary { op, operand, .. } => match op {
                UnaryOp::Not => Type::Primitive(Keyword::Bool),
                UnaryOp::Neg | UnaryOp::BitNot => self.infer_expr_type(operand),
                UnaryOp::AddressOf => Type::pointer_to(self.infer_expr_type(operand)),
                UnaryOp::Deref => match self.infer_expr_type(operand) {
                    Type::Pointer(inner) => *inner,
                    _ => Type::Unknown,
                },
            },
            Expr::Cast { target, .. } => lower_type(target, self.registry),
            Expr::Call { callee, args, .. } => self.infer_call_type(callee, args),
            Expr::Index { object, index, .. } => match self.infer_expr_type(object) {
                Type::Array { element, .. } => *element,
                Type::Map { value, .. } => Type::pointer_to(*value),
                Type::Tuple(elements) => {
                    if let Expr::Literal { kind: LiteralKind::Integer, lexeme, .. } = &**index {
                        truk_language::parser::parse_int_lexeme(self.resolve(*lexeme))
                            .and_then(|n| elements.get(n as usize).cloned())
                            .unwrap_or(Type::Unknown)
                    } else {
                        Type::Unknown
                    }
                }
                _ => Type::Unknown,
            },
            Expr::Member { object, field, .. } => {
                if let Expr::Identifier(id) = &**object {
                    if self.var_type(id.name).is_none() && self.registry.is_enum(id.name) {
                        return Type::Named(id.name);
                    }
                }
                let mut object_ty = self.infer_expr_type(object);
                if let Type::Pointer(inner) = object_ty {
                    object_ty = *inner;
                }
                match object_ty {
                    Type::Named(name) => self
                        .struct_field_type(name, field.name)
                        .unwrap_or(Type::Unknown),
                    Type::Generic { base, args } => {
                        match self.registry.get(base) {
                            Some(TypeDef::Struct { fields, type_params }) => fields
                                .iter()
                                .find(|f| f.name == field.name)
                                .map(|f| substitute(&f.ty, type_params, &args))
                                .unwrap_or(Type::Unknown),
                            _ => Type::Unknown,
                        }
                    }
                    _ => Type::Unknown,
                }
            }
            Expr::ArrayLiteral { elements, .. } => {
                let element = elements
                    .first()
                    .map(|e| self.infer_concrete(e))
                    .unwrap_or(Type::Unknown);
                Type::Array {
                    element: Box::new(element),
                    size: Some(elements.len() as u64),
                }
            }
            Expr::StructLiteral { name, .. } => Type::Named(name.name),
            Expr::Lambda(lambda) => Type::Function(FunctionType {
                params: lambda
                    .params
                    .iter()
                    .map(|p| lower_type(&p.ty, self.registry))
                    .collect(),
                ret: Box::new(match &lambda.return_type {
                    Some(ty) => lower_type(ty, self.registry),
                    None => Type::Void,
                }),
                variadic: false,
                builtin: None,
            }),
            Expr::TypeParam { .. } => Type::Unknown,
        }
    }

    fn infer_call_type(&self, callee: &Expr, args: &[Expr]) -> Type {
        if let Expr::Identifier(id) = callee {
            if self.var_type(id.name).is_none() && !self.fn_types.contains_key(&id.name) {
                if let Some(builtin) = builtins::lookup(self.resolve(id.name)) {
                    return self.infer_builtin_type(builtin.kind, args);
                }
            }
            if let Some(signature) = self.fn_types.get(&id.name) {
                return (*signature.ret).clone();
            }
            if let Some(Type::Function(signature)) = self.var_type(id.name) {
                return (*signature.ret).clone();
            }
            return Type::Unknown;
        }
        match self.infer_expr_type(callee) {
            Type::Function(signature) => (*signature.ret).clone(),
            _ => Type::Unknown,
        }
    }

    fn infer_builtin_type(&self, kind: BuiltinKind, args: &[Expr]) -> Type {
        match kind {
            BuiltinKind::Make => {
                let Some(Expr::TypeParam { ty, .. }) = args.first() else {
                    return Type::Unknown;
                };
                let ty = lower_type(ty, self.registry);
                match args.len() {
                    1 if matches!(ty, Type::Map { .. }) => ty,
                    1 => Type::pointer_to(ty),
                    _ => Type::slice_of(ty),
                }
            }
            BuiltinKind::Len | BuiltinKind::Sizeof => Type::Primitive(Keyword::U64),
            BuiltinKind::Delete | BuiltinKind::Panic | BuiltinKind::Each => Type::Void,
            BuiltinKind::VaArgI32 => Type::Primitive(Keyword::I32),
            BuiltinKind::VaArgI64 => Type::Primitive(Keyword::I64),
            BuiltinKind::VaArgF64 => Type::Primitive(Keyword::F64),
            BuiltinKind::VaArgPtr => Type::pointer_to(Type::Void),
        }
    }

    /// Looks a field's declared type up through the registry.
    pub(crate) fn struct_field_type(
        &self,
        struct_name: truk_base::Symbol,
        field: truk_base::Symbol,
    ) -> Option<Type> {
        self.registry.field(struct_name, field).map(|f| f.ty.clone())
    }
}
