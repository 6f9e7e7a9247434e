//! Declaration and statement lowering.
//!
//! Functions write into the emitter's string buffers with `write!`;
//! expressions come back as strings from `expr.rs`. Defer scopes are pushed
//! around every function, lambda, block and loop body, and replayed in
//! reverse registration order on each exit path: end-of-block replays the
//! innermost scope, `break`/`continue` replay up to the nearest loop, and
//! `return` unwinds everything up to the function.

use std::fmt::Write as _;

use truk_language::ast::{Block, Decl, EnumDecl, Expr, FnDecl, Stmt, StructDecl};

use crate::analysis::control_flow;
use crate::analysis::types::{Type, TypeDef};
use crate::codegen_c::types::{c_type, c_var_decl, escape_ident, indent, lower_type};
use crate::codegen_c::{DeferScope, Emitter, ScopeKind};

impl Emitter<'_> {
    // ------------------------------------------------------------------
    // Phase 2: forward declarations
    // ------------------------------------------------------------------

    pub(crate) fn emit_forward_declarations(&mut self, declarations: &[Decl]) {
        for decl in declarations {
            match decl {
                Decl::Struct(s) => {
                    if s.type_params.is_empty() {
                        let name = escape_ident(self.resolve(s.name.name));
                        let _ = writeln!(self.forward_decls, "typedef struct {} {};", name, name);
                    }
                }
                Decl::Enum(e) => self.emit_enum(e),
                Decl::Fn(f) => self.emit_prototype(f),
                Decl::Shard { declarations, .. } => self.emit_forward_declarations(declarations),
                _ => {}
            }
        }
        if !self.forward_decls.is_empty() {
            self.forward_decls.push('\n');
        }
    }

    fn emit_prototype(&mut self, f: &FnDecl) {
        let signature = self.fn_signature_text(f);
        let _ = writeln!(self.prototypes, "{};", signature);
    }

    /// `ret name(params)` with synthesized typedefs ensured.
    fn fn_signature_text(&mut self, f: &FnDecl) -> String {
        let ret = match &f.return_type {
            Some(ty) => lower_type(ty, self.registry),
            None => Type::Void,
        };
        self.ensure_type_support(&ret);
        let name = self.ident(f.name.name);

        let mut params = Vec::new();
        for param in &f.params {
            let ty = lower_type(&param.ty, self.registry);
            self.ensure_type_support(&ty);
            let pname = escape_ident(self.resolve(param.name.name));
            params.push(c_var_decl(&ty, &pname, self.interner));
        }
        let mut param_list = if params.is_empty() {
            "__truk_void".to_string()
        } else {
            params.join(", ")
        };
        if f.variadic {
            if f.params.is_empty() {
                param_list = "...".to_string();
            } else {
                param_list.push_str(", ...");
            }
        }

        format!("{} {}({})", c_type(&ret, self.interner), name, param_list)
    }

    /// Enums lower to a typedef of the backing primitive plus one constant
    /// per variant.
    fn emit_enum(&mut self, e: &EnumDecl) {
        let name = escape_ident(self.resolve(e.name.name));
        let backing = lower_type(&e.backing, self.registry);
        let _ = writeln!(
            self.forward_decls,
            "typedef {} {};",
            c_type(&backing, self.interner),
            name
        );
        if let Some(TypeDef::Enum { variants, .. }) = self.registry.get(e.name.name) {
            let mut constants = String::new();
            for variant in variants {
                let vname = escape_ident(self.interner.resolve(variant.name));
                let _ = write!(constants, "  {}_{} = {},\n", name, vname, variant.value);
            }
            let _ = writeln!(self.forward_decls, "enum {{\n{}}};", constants);
        }
    }

    // ------------------------------------------------------------------
    // Phase 3: struct definitions
    // ------------------------------------------------------------------

    pub(crate) fn emit_struct_definitions(&mut self, declarations: &[Decl]) {
        for decl in declarations {
            match decl {
                Decl::Struct(s) if s.type_params.is_empty() => self.emit_struct(s),
                Decl::Shard { declarations, .. } => self.emit_struct_definitions(declarations),
                _ => {}
            }
        }
    }

    fn emit_struct(&mut self, s: &StructDecl) {
        let name = escape_ident(self.resolve(s.name.name));
        // The body builds separately: field types may synthesize map or
        // tuple typedefs into the struct buffer, which must precede this
        // definition.
        let mut body = String::new();
        for field in &s.fields {
            let ty = lower_type(&field.ty, self.registry);
            self.ensure_type_support(&ty);
            let fname = escape_ident(self.resolve(field.name.name));
            let decl = c_var_decl(&ty, &fname, self.interner);
            let _ = writeln!(body, "  {};", decl);
        }
        let _ = writeln!(self.structs, "struct {} {{\n{}}};\n", name, body);
    }

    // ------------------------------------------------------------------
    // Phase 5: definitions
    // ------------------------------------------------------------------

    pub(crate) fn emit_definitions(&mut self, declarations: &[Decl]) {
        for (index, decl) in declarations.iter().enumerate() {
            self.current_decl = index;
            self.emit_definition(decl);
        }
    }

    fn emit_definition(&mut self, decl: &Decl) {
        match decl {
            Decl::Fn(f) => self.emit_function(f),
            Decl::Struct(_) | Decl::Enum(_) | Decl::Import { .. } => {}
            Decl::Var(v) => {
                let ty = lower_type(&v.ty, self.registry);
                self.ensure_type_support(&ty);
                let name = escape_ident(self.resolve(v.name.name));
                let mut line = c_var_decl(&ty, &name, self.interner);
                if let Some(init) = &v.initializer {
                    let value = self.emit_expr_hint(init, Some(&ty));
                    let _ = write!(line, " = {}", value);
                }
                let _ = writeln!(self.globals, "{};", line);
            }
            Decl::Const(c) => {
                let ty = lower_type(&c.ty, self.registry);
                self.ensure_type_support(&ty);
                let name = escape_ident(self.resolve(c.name.name));
                let value = self.emit_expr_hint(&c.value, Some(&ty));
                let _ = writeln!(
                    self.globals,
                    "const {} = {};",
                    c_var_decl(&ty, &name, self.interner),
                    value
                );
            }
            Decl::Let(l) => {
                let ty = self.infer_concrete(&l.initializer);
                self.ensure_type_support(&ty);
                self.vars[0].insert(l.name.name, ty.clone());
                let name = escape_ident(self.resolve(l.name.name));
                let value = self.emit_expr_hint(&l.initializer, Some(&ty));
                let _ = writeln!(
                    self.globals,
                    "const {} = {};",
                    c_var_decl(&ty, &name, self.interner),
                    value
                );
            }
            Decl::Shard { declarations, .. } => {
                for inner in declarations {
                    self.emit_definition(inner);
                }
            }
        }
    }

    fn emit_function(&mut self, f: &FnDecl) {
        let Some(body) = &f.body else {
            return; // extern: the prototype is the whole story
        };
        if !f.type_params.is_empty() {
            return; // rejected by the checker; nothing sensible to emit
        }

        let signature = self.fn_signature_text(f);
        let ret = match &f.return_type {
            Some(ty) => lower_type(ty, self.registry),
            None => Type::Void,
        };

        self.push_var_scope();
        for param in &f.params {
            let ty = lower_type(&param.ty, self.registry);
            self.declare_var(param.name.name, ty);
        }

        let saved_ret = std::mem::replace(&mut self.current_fn_ret, ret);
        let saved_variadic = std::mem::replace(&mut self.in_variadic_fn, f.variadic);
        self.defer_stack.push(DeferScope { kind: ScopeKind::Function, defers: Vec::new() });

        let _ = writeln!(self.functions, "{} {{", signature);
        self.indent = 1;

        if f.variadic {
            let last = f
                .params
                .last()
                .map(|p| escape_ident(self.resolve(p.name.name)))
                .unwrap_or_default();
            let _ = writeln!(self.functions, "  va_list __truk_va_args;");
            let _ = writeln!(self.functions, "  va_start(__truk_va_args, {});", last);
        }

        for stmt in &body.statements {
            self.emit_stmt(stmt);
        }

        // Fall-through exit for void functions.
        if !control_flow::block_guarantees_return(body) {
            self.replay_defers_through(ScopeKind::Function);
            if f.variadic {
                let _ = writeln!(self.functions, "  va_end(__truk_va_args);");
            }
        }

        self.indent = 0;
        let _ = writeln!(self.functions, "}}\n");

        self.defer_stack.pop();
        self.in_variadic_fn = saved_variadic;
        self.current_fn_ret = saved_ret;
        self.pop_var_scope();
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    pub(crate) fn emit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(block) => {
                let _ = write!(self.functions, "{}", indent(self.indent));
                self.emit_block(block, ScopeKind::Block);
                self.functions.push('\n');
            }
            Stmt::If { condition, then_block, else_block, .. } => {
                let cond = self.emit_expr(condition);
                let _ = write!(self.functions, "{}if ({}) ", indent(self.indent), cond);
                self.emit_block(then_block, ScopeKind::Block);
                if let Some(else_stmt) = else_block {
                    self.emit_else(else_stmt);
                }
                self.functions.push('\n');
            }
            Stmt::While { condition, body, .. } => {
                let cond = self.emit_expr(condition);
                let _ = write!(self.functions, "{}while ({}) ", indent(self.indent), cond);
                self.emit_block(body, ScopeKind::Loop);
                self.functions.push('\n');
            }
            Stmt::For { init, condition, post, body, .. } => {
                self.push_var_scope();
                let init_text = match init {
                    Some(stmt) => self.render_simple_stmt(stmt),
                    None => String::new(),
                };
                let cond_text = match condition {
                    Some(expr) => self.emit_expr(expr),
                    None => String::new(),
                };
                let post_text = match post {
                    Some(stmt) => self.render_simple_stmt(stmt),
                    None => String::new(),
                };
                let _ = write!(
                    self.functions,
                    "{}for ({}; {}; {}) ",
                    indent(self.indent),
                    init_text,
                    cond_text,
                    post_text
                );
                self.emit_block(body, ScopeKind::Loop);
                self.functions.push('\n');
                self.pop_var_scope();
            }
            Stmt::Return { values, .. } => self.emit_return(values),
            Stmt::Break { .. } => {
                self.replay_defers_through(ScopeKind::Loop);
                let _ = writeln!(self.functions, "{}break;", indent(self.indent));
            }
            Stmt::Continue { .. } => {
                self.replay_defers_through(ScopeKind::Loop);
                let _ = writeln!(self.functions, "{}continue;", indent(self.indent));
            }
            Stmt::Defer { body, .. } => {
                self.defer_stack
                    .last_mut()
                    .expect("defer outside any scope")
                    .defers
                    .push((**body).clone());
            }
            Stmt::Match { scrutinee, arms, .. } => self.emit_match(scrutinee, arms),
            Stmt::Assign { target, op, value, .. } => self.emit_assign(target, *op, value),
            Stmt::Var(v) => {
                let ty = lower_type(&v.ty, self.registry);
                self.ensure_type_support(&ty);
                self.declare_var(v.name.name, ty.clone());
                let name = escape_ident(self.resolve(v.name.name));
                let mut line = c_var_decl(&ty, &name, self.interner);
                if let Some(init) = &v.initializer {
                    let value = self.emit_expr_hint(init, Some(&ty));
                    let _ = write!(line, " = {}", value);
                }
                let _ = writeln!(self.functions, "{}{};", indent(self.indent), line);
            }
            Stmt::Const(c) => {
                let ty = lower_type(&c.ty, self.registry);
                self.ensure_type_support(&ty);
                self.declare_var(c.name.name, ty.clone());
                let name = escape_ident(self.resolve(c.name.name));
                let value = self.emit_expr_hint(&c.value, Some(&ty));
                let _ = writeln!(
                    self.functions,
                    "{}const {} = {};",
                    indent(self.indent),
                    c_var_decl(&ty, &name, self.interner),
                    value
                );
            }
            Stmt::Let(l) => {
                let ty = self.infer_concrete(&l.initializer);
                self.ensure_type_support(&ty);
                self.declare_var(l.name.name, ty.clone());
                let name = escape_ident(self.resolve(l.name.name));
                let value = self.emit_expr_hint(&l.initializer, Some(&ty));
                let _ = writeln!(
                    self.functions,
                    "{}{} = {};",
                    indent(self.indent),
                    c_var_decl(&ty, &name, self.interner),
                    value
                );
            }
            Stmt::Expr(expr) => {
                let text = self.emit_expr(expr);
                if !text.is_empty() {
                    let _ = writeln!(self.functions, "{}{};", indent(self.indent), text);
                }
            }
        }
    }

    fn emit_else(&mut self, else_stmt: &Stmt) {
        match else_stmt {
            Stmt::If { condition, then_block, else_block, .. } => {
                let cond = self.emit_expr(condition);
                let _ = write!(self.functions, " else if ({}) ", cond);
                self.emit_block(then_block, ScopeKind::Block);
                if let Some(nested) = else_block {
                    self.emit_else(nested);
                }
            }
            Stmt::Block(block) => {
                let _ = write!(self.functions, " else ");
                self.emit_block(block, ScopeKind::Block);
            }
            other => {
                // The parser only produces if/block alternatives.
                let _ = write!(self.functions, " else ");
                self.emit_stmt(other);
            }
        }
    }

    /// Emits a braced block with its own defer and variable scope.
    pub(crate) fn emit_block(&mut self, block: &Block, kind: ScopeKind) {
        self.defer_stack.push(DeferScope { kind, defers: Vec::new() });
        self.push_var_scope();

        self.functions.push_str("{\n");
        self.indent += 1;

        for stmt in &block.statements {
            self.emit_stmt(stmt);
        }

        // Replay this scope's defers on fall-through; a terminating
        // return/break/continue has already unwound them.
        let terminated = matches!(
            block.statements.last(),
            Some(Stmt::Return { .. }) | Some(Stmt::Break { .. }) | Some(Stmt::Continue { .. })
        );
        if !terminated {
            self.replay_scope_defers(self.defer_stack.len() - 1);
        }

        self.indent -= 1;
        let _ = write!(self.functions, "{}}}", indent(self.indent));

        self.pop_var_scope();
        self.defer_stack.pop();
    }

    /// A statement rendered inline for a `for` clause: no indent, no
    /// terminator.
    fn render_simple_stmt(&mut self, stmt: &Stmt) -> String {
        match stmt {
            Stmt::Var(v) => {
                let ty = lower_type(&v.ty, self.registry);
                self.ensure_type_support(&ty);
                self.declare_var(v.name.name, ty.clone());
                let name = escape_ident(self.resolve(v.name.name));
                let mut line = c_var_decl(&ty, &name, self.interner);
                if let Some(init) = &v.initializer {
                    let value = self.emit_expr_hint(init, Some(&ty));
                    let _ = write!(line, " = {}", value);
                }
                line
            }
            Stmt::Assign { target, op, value, .. } => {
                let target_ty = self.infer_expr_type(target);
                let target_text = self.emit_expr(target);
                let value_text = self.emit_expr_hint(value, Some(&target_ty));
                format!("{} {} {}", target_text, op.as_str(), value_text)
            }
            Stmt::Expr(expr) => self.emit_expr(expr),
            other => {
                self.error("unsupported statement in for clause", other.source_index());
                String::new()
            }
        }
    }

    fn emit_return(&mut self, values: &[Expr]) {
        let ret_ty = self.current_fn_ret.clone();

        let value_text = match values.len() {
            0 => None,
            1 => Some(self.emit_expr_hint(&values[0], Some(&ret_ty))),
            _ => {
                // Multiple values construct the synthesized tuple struct.
                let Type::Tuple(elements) = &ret_ty else {
                    self.error("multiple return values outside a tuple function", values[0].source_index());
                    return;
                };
                let elements = elements.clone();
                self.ensure_tuple_typedef(&elements);
                let name = crate::codegen_c::types::tuple_type_name(&elements, self.interner);
                let mut fields = Vec::new();
                for (i, (value, element)) in values.iter().zip(&elements).enumerate() {
                    let text = self.emit_expr_hint(value, Some(element));
                    fields.push(format!("._{} = {}", i, text));
                }
                Some(format!("({}){{{}}}", name, fields.join(", ")))
            }
        };

        let has_pending_defers = self
            .defer_stack
            .iter()
            .rev()
            .scan(false, |done, scope| {
                if *done {
                    return None;
                }
                if matches!(scope.kind, ScopeKind::Function | ScopeKind::Lambda) {
                    *done = true;
                }
                Some(!scope.defers.is_empty())
            })
            .any(|pending| pending);

        match value_text {
            Some(value) if has_pending_defers => {
                let temp = self.next_temp();
                let _ = writeln!(self.functions, "{}{{", indent(self.indent));
                self.indent += 1;
                let decl = c_var_decl(&ret_ty, &format!("__truk_ret_{}", temp), self.interner);
                let _ = writeln!(self.functions, "{}{} = {};", indent(self.indent), decl, value);
                self.replay_defers_through(ScopeKind::Function);
                if self.in_variadic_fn {
                    let _ = writeln!(self.functions, "{}va_end(__truk_va_args);", indent(self.indent));
                }
                let _ = writeln!(self.functions, "{}return __truk_ret_{};", indent(self.indent), temp);
                self.indent -= 1;
                let _ = writeln!(self.functions, "{}}}", indent(self.indent));
            }
            Some(value) => {
                if self.in_variadic_fn {
                    let _ = writeln!(self.functions, "{}va_end(__truk_va_args);", indent(self.indent));
                }
                let _ = writeln!(self.functions, "{}return {};", indent(self.indent), value);
            }
            None => {
                self.replay_defers_through(ScopeKind::Function);
                if self.in_variadic_fn {
                    let _ = writeln!(self.functions, "{}va_end(__truk_va_args);", indent(self.indent));
                }
                let _ = writeln!(self.functions, "{}return;", indent(self.indent));
            }
        }
    }

    fn emit_match(&mut self, scrutinee: &Expr, arms: &[truk_language::ast::MatchArm]) {
        let scrutinee_ty = self.infer_concrete(scrutinee);
        let scrutinee_text = self.emit_expr(scrutinee);
        let n = self.match_counter;
        self.match_counter += 1;

        let _ = writeln!(self.functions, "{}{{", indent(self.indent));
        self.indent += 1;
        let decl = c_var_decl(&scrutinee_ty, &format!("__truk_match_{}", n), self.interner);
        let _ = writeln!(self.functions, "{}{} = {};", indent(self.indent), decl, scrutinee_text);

        let mut first = true;
        for arm in arms {
            match &arm.pattern {
                Some(pattern) => {
                    let pattern_text = self.emit_expr_hint(pattern, Some(&scrutinee_ty));
                    if first {
                        let _ = write!(
                            self.functions,
                            "{}if (__truk_match_{} == ({})) ",
                            indent(self.indent),
                            n,
                            pattern_text
                        );
                    } else {
                        let _ = write!(
                            self.functions,
                            " else if (__truk_match_{} == ({})) ",
                            n,
                            pattern_text
                        );
                    }
                }
                None => {
                    if first {
                        let _ = write!(self.functions, "{}", indent(self.indent));
                    } else {
                        let _ = write!(self.functions, " else ");
                    }
                }
            }
            self.emit_block(&arm.body, ScopeKind::Block);
            first = false;
        }
        self.functions.push('\n');

        self.indent -= 1;
        let _ = writeln!(self.functions, "{}}}", indent(self.indent));
    }

    fn emit_assign(
        &mut self,
        target: &Expr,
        op: truk_language::ast::AssignOp,
        value: &Expr,
    ) {
        // Index targets dispatch on the object type: map writes lower to
        // the runtime setter, slice writes get a bounds check first.
        if let Expr::Index { object, index, .. } = target {
            let object_ty = self.infer_expr_type(object);
            match object_ty {
                Type::Map { key, value: value_ty } => {
                    let object_text = self.emit_expr(object);
                    let value_text = self.emit_expr_hint(value, Some(&value_ty));
                    self.emit_map_set(&object_text, &key, index, &value_text);
                    return;
                }
                Type::Array { size: None, .. } => {
                    let object_text = self.emit_expr(object);
                    let index_text = self.emit_expr(index);
                    let value_text = self.emit_expr(value);
                    let _ = writeln!(
                        self.functions,
                        "{}TRUK_BOUNDS_CHECK({}, ({}).len);",
                        indent(self.indent),
                        index_text,
                        object_text
                    );
                    let _ = writeln!(
                        self.functions,
                        "{}({}).data[{}] {} {};",
                        indent(self.indent),
                        object_text,
                        index_text,
                        op.as_str(),
                        value_text
                    );
                    return;
                }
                _ => {}
            }
        }

        let target_ty = self.infer_expr_type(target);
        let target_text = self.emit_expr(target);
        let value_text = self.emit_expr_hint(value, Some(&target_ty));
        let _ = writeln!(
            self.functions,
            "{}{} {} {};",
            indent(self.indent),
            target_text,
            op.as_str(),
            value_text
        );
    }

    // ------------------------------------------------------------------
    // Defer replay
    // ------------------------------------------------------------------

    /// Replays one scope's defers in reverse registration order.
    pub(crate) fn replay_scope_defers(&mut self, scope_index: usize) {
        let defers: Vec<Stmt> = self.defer_stack[scope_index].defers.clone();
        for stmt in defers.iter().rev() {
            self.emit_stmt(stmt);
        }
    }

    /// Replays defers from the innermost scope outward, up to and
    /// including the first scope of kind `target` (for `Loop`) or the
    /// enclosing function/lambda (for `Function`).
    pub(crate) fn replay_defers_through(&mut self, target: ScopeKind) {
        for scope_index in (0..self.defer_stack.len()).rev() {
            self.replay_scope_defers(scope_index);
            let kind = self.defer_stack[scope_index].kind;
            let done = match target {
                ScopeKind::Loop => kind == ScopeKind::Loop,
                _ => matches!(kind, ScopeKind::Function | ScopeKind::Lambda),
            };
            if done {
                break;
            }
        }
    }
}
