//! Builtin call lowering, dispatched by [`BuiltinKind`] tag.
//!
//! The checker has already validated arguments, so each handler can lean on
//! the `@type` wrapper being where it expects it. `make`/`delete` dispatch
//! further on the operand type: single allocation, slice allocation, map
//! initialization, map removal, slice release.

use std::fmt::Write as _;

use truk_language::ast::Expr;
use truk_language::builtins::BuiltinKind;

use crate::analysis::types::Type;
use crate::codegen_c::types::{
    c_type, indent, lower_type, map_cmp_fn, map_hash_fn, map_key_size, map_type_name,
    slice_type_name,
};
use crate::codegen_c::Emitter;

impl Emitter<'_> {
    pub(crate) fn emit_builtin(
        &mut self,
        kind: BuiltinKind,
        args: &[Expr],
        source_index: usize,
    ) -> String {
        match kind {
            BuiltinKind::Make => self.emit_make(args, source_index),
            BuiltinKind::Delete => self.emit_delete(args, source_index),
            BuiltinKind::Len => {
                let arg = self.emit_expr(&args[0]);
                format!("({}).len", arg)
            }
            BuiltinKind::Sizeof => match args.first() {
                Some(Expr::TypeParam { ty, .. }) => {
                    let ty = lower_type(ty, self.registry);
                    self.c_sizeof(&ty)
                }
                _ => {
                    self.error("sizeof requires a type parameter", source_index);
                    String::new()
                }
            },
            BuiltinKind::Panic => {
                let arg = self.emit_expr(&args[0]);
                format!("TRUK_PANIC(({}).data, ({}).len)", arg, arg)
            }
            BuiltinKind::Each => {
                self.emit_each(args, source_index);
                String::new()
            }
            BuiltinKind::VaArgI32 => "va_arg(__truk_va_args, __truk_i32)".to_string(),
            BuiltinKind::VaArgI64 => "va_arg(__truk_va_args, __truk_i64)".to_string(),
            BuiltinKind::VaArgF64 => "va_arg(__truk_va_args, __truk_f64)".to_string(),
            BuiltinKind::VaArgPtr => "va_arg(__truk_va_args, __truk_void*)".to_string(),
        }
    }

    /// `sizeof` spelling that keeps array dimensions.
    fn c_sizeof(&mut self, ty: &Type) -> String {
        self.ensure_type_support(ty);
        match ty {
            Type::Array { element, size: Some(n) } => {
                format!("sizeof({}[{}])", c_type(element, self.interner), n)
            }
            _ => format!("sizeof({})", c_type(ty, self.interner)),
        }
    }

    fn emit_make(&mut self, args: &[Expr], source_index: usize) -> String {
        let Some(Expr::TypeParam { ty, .. }) = args.first() else {
            self.error("make requires a type parameter", source_index);
            return String::new();
        };
        let ty = lower_type(ty, self.registry);
        self.ensure_type_support(&ty);

        if args.len() == 1 {
            if let Type::Map { key, value } = &ty {
                let map_name = map_type_name(key, value, self.interner);
                let temp = self.next_temp();
                return format!(
                    "({{ {map} __truk_tmp_{n}; __truk_map_init_generic(&__truk_tmp_{n}, {ksize}, {hash}, {cmp}); __truk_tmp_{n}; }})",
                    map = map_name,
                    n = temp,
                    ksize = map_key_size(key),
                    hash = map_hash_fn(key),
                    cmp = map_cmp_fn(key),
                );
            }
            let size = self.c_sizeof(&ty);
            return format!(
                "({}*)__truk_runtime_sxs_alloc({})",
                c_type(&ty, self.interner),
                size
            );
        }

        // make(@T, n): slice allocation.
        self.ensure_slice_typedef(&ty);
        let slice_name = slice_type_name(&ty, self.interner);
        let count = self.emit_expr(&args[1]);
        let size = self.c_sizeof(&ty);
        let cast = self.element_pointer_cast(&ty);
        format!(
            "({slice}){{{cast}__truk_runtime_sxs_alloc_array({size}, ({count})), ({count})}}",
            slice = slice_name,
            cast = cast,
            size = size,
            count = count,
        )
    }

    /// The cast applied to a freshly allocated slice data pointer.
    fn element_pointer_cast(&self, ty: &Type) -> String {
        match ty {
            Type::Array { element, size: Some(n) } => {
                format!("({}(*)[{}])", c_type(element, self.interner), n)
            }
            _ => format!("({}*)", c_type(ty, self.interner)),
        }
    }

    fn emit_delete(&mut self, args: &[Expr], source_index: usize) -> String {
        let Some(arg) = args.first() else {
            self.error("delete requires an argument", source_index);
            return String::new();
        };

        // delete(m[k]) removes the key from the map.
        if let Expr::Index { object, index, .. } = arg {
            let object_ty = self.infer_expr_type(object);
            if let Type::Map { key, .. } = object_ty {
                let object_text = self.emit_expr(object);
                return self.emit_map_remove(&object_text, &key, index);
            }
        }

        let ty = self.infer_expr_type(arg);
        let text = self.emit_expr(arg);
        match ty {
            Type::Map { .. } => format!("__truk_map_deinit(&({}))", text),
            Type::Array { size: None, .. } => {
                format!("__truk_runtime_sxs_free_array(({}).data)", text)
            }
            _ => format!("__truk_runtime_sxs_free({})", text),
        }
    }

    /// `each(collection, context, callback)` lowers to an explicit loop
    /// calling the callback until it returns false. Map iteration order is
    /// whatever the hash table produces.
    fn emit_each(&mut self, args: &[Expr], source_index: usize) {
        if args.len() != 3 {
            self.error("each requires (collection, context, callback)", source_index);
            return;
        }
        let collection_ty = self.infer_expr_type(&args[0]);
        let collection = self.emit_expr(&args[0]);
        let context = self.emit_expr(&args[1]);
        let callback = self.emit_expr(&args[2]);

        let pad = indent(self.indent);
        let pad1 = indent(self.indent + 1);
        let pad2 = indent(self.indent + 2);

        match collection_ty {
            Type::Map { key, .. } => {
                let key_c = c_type(&key, self.interner);
                let _ = writeln!(self.functions, "{}{{", pad);
                let _ = writeln!(
                    self.functions,
                    "{}__truk_map_iter_t __truk_iter = __truk_map_iter();",
                    pad1
                );
                let _ = writeln!(self.functions, "{}{}* __truk_key_ptr;", pad1, key_c);
                let _ = writeln!(
                    self.functions,
                    "{}while ((__truk_key_ptr = ({}*)__truk_map_next_generic(&({}), &__truk_iter)) != NULL) {{",
                    pad1, key_c, collection
                );
                let _ = writeln!(self.functions, "{}{} __truk_key = *__truk_key_ptr;", pad2, key_c);
                let _ = writeln!(
                    self.functions,
                    "{}__truk_bool __truk_continue = {}(__truk_key, __truk_map_get_generic(&({}), __truk_key_ptr), {});",
                    pad2, callback, collection, context
                );
                let _ = writeln!(self.functions, "{}if (!__truk_continue) break;", pad2);
                let _ = writeln!(self.functions, "{}}}", pad1);
                let _ = writeln!(self.functions, "{}}}", pad);
            }
            _ => {
                let _ = writeln!(self.functions, "{}{{", pad);
                let _ = writeln!(
                    self.functions,
                    "{}for (__truk_u64 __truk_idx = 0; __truk_idx < ({}).len; __truk_idx++) {{",
                    pad1, collection
                );
                let _ = writeln!(
                    self.functions,
                    "{}__truk_bool __truk_continue = {}(&({}).data[__truk_idx], {});",
                    pad2, callback, collection, context
                );
                let _ = writeln!(self.functions, "{}if (!__truk_continue) break;", pad2);
                let _ = writeln!(self.functions, "{}}}", pad1);
                let _ = writeln!(self.functions, "{}}}", pad);
            }
        }
    }
}
