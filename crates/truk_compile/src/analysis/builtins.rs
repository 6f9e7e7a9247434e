//! Argument validation for intrinsic calls.
//!
//! Builtins take arguments ordinary functions cannot — most prominently the
//! `@T` type-parameter wrapper — so they bypass normal signature checking.
//! Each [`BuiltinKind`] gets a dedicated validation path here, dispatched by
//! tag after the checker has resolved the callee. The computed result type
//! feeds back into ordinary expression checking.

use truk_language::ast::Expr;
use truk_language::builtins::BuiltinKind;
use truk_language::Keyword;

use crate::analysis::check::TypeChecker;
use crate::analysis::types::Type;

impl TypeChecker<'_> {
    pub(crate) fn validate_builtin_call(
        &mut self,
        kind: BuiltinKind,
        args: &[Expr],
        source_index: usize,
    ) -> Type {
        match kind {
            BuiltinKind::Make => self.validate_make(args, source_index),
            BuiltinKind::Delete => self.validate_delete(args, source_index),
            BuiltinKind::Len => self.validate_len(args, source_index),
            BuiltinKind::Sizeof => self.validate_sizeof(args, source_index),
            BuiltinKind::Panic => self.validate_panic(args, source_index),
            BuiltinKind::Each => self.validate_each(args, source_index),
            BuiltinKind::VaArgI32 => self.validate_va_arg(args, source_index, Type::Primitive(Keyword::I32)),
            BuiltinKind::VaArgI64 => self.validate_va_arg(args, source_index, Type::Primitive(Keyword::I64)),
            BuiltinKind::VaArgF64 => self.validate_va_arg(args, source_index, Type::Primitive(Keyword::F64)),
            BuiltinKind::VaArgPtr => self.validate_va_arg(args, source_index, Type::pointer_to(Type::Void)),
        }
    }

    /// Extracts and resolves the `@T` wrapper expected as the first argument.
    fn type_param_arg(&mut self, builtin: &str, args: &[Expr], source_index: usize) -> Option<Type> {
        let Some(first) = args.first() else {
            self.error(format!("{} requires a type parameter", builtin), source_index);
            return None;
        };
        let Expr::TypeParam { ty, .. } = first else {
            self.error(
                format!("{} type parameter must be a type (use @T)", builtin),
                first.source_index(),
            );
            return None;
        };
        let ty = ty.clone();
        Some(self.resolve_type(&ty))
    }

    fn validate_make(&mut self, args: &[Expr], source_index: usize) -> Type {
        let Some(ty) = self.type_param_arg("make", args, source_index) else {
            return Type::Unknown;
        };

        match args.len() {
            1 => {
                // make(@map[K, V]) initializes a map; make(@T) allocates one T.
                if let Type::Map { .. } = ty {
                    ty
                } else {
                    Type::pointer_to(ty)
                }
            }
            2 => {
                if ty.is_unknown() {
                    return Type::Unknown;
                }
                if matches!(ty, Type::Map { .. }) {
                    self.error("make with a count does not apply to maps", source_index);
                    return Type::Unknown;
                }
                let count = self.check_expr(&args[1]);
                if !count.is_integer() && !count.is_unknown() {
                    self.error("make count must be an integer", args[1].source_index());
                }
                Type::slice_of(ty)
            }
            n => {
                self.error(format!("make takes 1 or 2 arguments, got {}", n), source_index);
                Type::Unknown
            }
        }
    }

    fn validate_delete(&mut self, args: &[Expr], source_index: usize) -> Type {
        let Some(arg) = args.first() else {
            self.error("delete requires an argument", source_index);
            return Type::Void;
        };
        if args.len() > 1 {
            self.error(format!("delete takes 1 argument, got {}", args.len()), source_index);
        }

        // delete(m[k]) removes a key; the index expression checks the key.
        let ty = if let Expr::Index { object, index, source_index: index_si } = arg {
            let object_ty = self.check_expr(object);
            if let Type::Map { key, .. } = &object_ty {
                let key = (**key).clone();
                self.check_map_key(&key, index);
                return Type::Void;
            }
            self.index_result_type(object_ty, index, *index_si)
        } else {
            self.check_expr(arg)
        };
        let deletable = matches!(
            ty,
            Type::Pointer(_) | Type::Array { size: None, .. } | Type::Map { .. } | Type::Extern | Type::Unknown
        );
        if !deletable {
            self.error(
                format!("delete requires a pointer, array, or map argument, got {}", self.display(&ty)),
                arg.source_index(),
            );
        }
        Type::Void
    }

    fn validate_len(&mut self, args: &[Expr], source_index: usize) -> Type {
        let Some(arg) = args.first() else {
            self.error("len requires an argument", source_index);
            return Type::Primitive(Keyword::U64);
        };
        let ty = self.check_expr(arg);
        if !ty.is_slice() && !ty.is_unknown() && !matches!(ty, Type::Extern) {
            self.error(
                format!("type mismatch: len requires a slice, got {}", self.display(&ty)),
                arg.source_index(),
            );
        }
        Type::Primitive(Keyword::U64)
    }

    fn validate_sizeof(&mut self, args: &[Expr], source_index: usize) -> Type {
        let _ = self.type_param_arg("sizeof", args, source_index);
        Type::Primitive(Keyword::U64)
    }

    fn validate_panic(&mut self, args: &[Expr], source_index: usize) -> Type {
        let Some(arg) = args.first() else {
            self.error("panic requires a message argument", source_index);
            return Type::Void;
        };
        let ty = self.check_expr(arg);
        let is_u8_slice = matches!(
            &ty,
            Type::Array { element, size: None }
                if matches!(**element, Type::Primitive(Keyword::U8))
        );
        if !is_u8_slice && !ty.is_unknown() && !matches!(ty, Type::Extern) {
            self.error(
                format!("panic requires a []u8 message, got {}", self.display(&ty)),
                arg.source_index(),
            );
        }
        Type::Void
    }

    fn validate_each(&mut self, args: &[Expr], source_index: usize) -> Type {
        if args.len() != 3 {
            self.error(
                format!("each takes (collection, context, callback), got {} arguments", args.len()),
                source_index,
            );
            for arg in args {
                if !matches!(arg, Expr::TypeParam { .. }) {
                    self.check_expr(arg);
                }
            }
            return Type::Void;
        }

        let collection = self.check_expr(&args[0]);
        let context = self.check_expr(&args[1]);
        let callback = self.check_expr(&args[2]);

        let iterable = matches!(
            collection,
            Type::Array { size: None, .. } | Type::Map { .. } | Type::Extern | Type::Unknown
        );
        if !iterable {
            self.error(
                format!("each requires a slice or map collection, got {}", self.display(&collection)),
                args[0].source_index(),
            );
        }

        if !context.is_pointer() && !context.is_unknown() {
            self.error(
                format!("each context must be a pointer, got {}", self.display(&context)),
                args[1].source_index(),
            );
        }

        match &callback {
            Type::Function(signature) => {
                let expected_arity = match collection {
                    Type::Map { .. } => 3,
                    _ => 2,
                };
                if signature.params.len() != expected_arity {
                    self.error(
                        format!(
                            "each callback must take {} parameters, got {}",
                            expected_arity,
                            signature.params.len()
                        ),
                        args[2].source_index(),
                    );
                }
                if !signature.ret.is_bool() && !signature.ret.is_unknown() {
                    self.error(
                        "each callback must return bool (continue iteration?)",
                        args[2].source_index(),
                    );
                }
            }
            Type::Extern | Type::Unknown => {}
            other => {
                self.error(
                    format!("each callback must be a function, got {}", self.display(other)),
                    args[2].source_index(),
                );
            }
        }

        Type::Void
    }

    fn validate_va_arg(&mut self, args: &[Expr], source_index: usize, result: Type) -> Type {
        if !self.in_variadic_fn() {
            self.error(
                "va_arg builtins are only valid inside variadic functions",
                source_index,
            );
        }
        if !args.is_empty() {
            self.error("va_arg builtins take no arguments", source_index);
        }
        result
    }
}
