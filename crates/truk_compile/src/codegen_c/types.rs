//! C type spelling, name mangling and identifier escaping.
//!
//! Primitives spell as the `__truk_*` typedefs from the runtime prelude.
//! Composite types that need a synthesized typedef (slices, maps, tuples,
//! generic instantiations) are named by their canonical mangling:
//!
//! | form | mangled as |
//! |------|------------|
//! | primitive | keyword spelling (`i32`) |
//! | named | the name itself |
//! | pointer | `ptr_<inner>` |
//! | sized array | `arr<N>_<inner>` |
//! | slice | `slice_<inner>` |
//! | map | `map_<key>_<value>` |
//! | generic | `<base>_<arg1>_<arg2>...` |
//! | tuple | `tuple_<e1>_<e2>...` |
//!
//! Mangling recurses, so `List[*u8]` becomes `List_ptr_u8` and the slice of
//! it `slice_List_ptr_u8`. One typedef is emitted per distinct mangled name.

use truk_base::Interner;
use truk_language::ast::TypeNode;
use truk_language::Keyword;

use crate::analysis::types::{FunctionType, Type, TypeRegistry};

/// C keywords plus runtime names user identifiers must not collide with.
pub(super) fn is_c_reserved(name: &str) -> bool {
    matches!(
        name,
        // C keywords
        "auto" | "break" | "case" | "char" | "const" | "continue" | "default"
            | "do" | "double" | "else" | "enum" | "extern" | "float" | "for"
            | "goto" | "if" | "int" | "long" | "register" | "return" | "short"
            | "signed" | "sizeof" | "static" | "struct" | "switch" | "typedef"
            | "union" | "unsigned" | "void" | "volatile" | "while"
            // C99 / C11 / C23
            | "inline" | "restrict" | "_Bool" | "_Complex" | "_Imaginary"
            | "_Alignas" | "_Alignof" | "_Atomic" | "_Generic" | "_Noreturn"
            | "_Static_assert" | "_Thread_local" | "bool" | "true" | "false"
            | "nullptr" | "alignas" | "alignof" | "constexpr" | "static_assert"
            | "thread_local" | "typeof"
            // Library names the prelude uses
            | "printf" | "fprintf" | "malloc" | "calloc" | "realloc" | "free"
            | "memcpy" | "memset" | "memcmp" | "strcmp" | "strlen" | "exit"
            | "stderr" | "stdout" | "va_list" | "va_start" | "va_arg" | "va_end"
            // Reserved for the synthesized entry point
            | "argc" | "argv"
    )
}

/// Escapes identifiers that would collide with C.
pub(super) fn escape_ident(name: &str) -> String {
    if is_c_reserved(name) || name.starts_with("__truk") {
        format!("truk_{}", name)
    } else {
        name.to_string()
    }
}

/// The canonical mangled spelling of a type, used to deduplicate
/// synthesized typedefs.
pub(super) fn mangle(ty: &Type, interner: &Interner) -> String {
    match ty {
        Type::Primitive(kw) => kw.as_str().to_string(),
        Type::Void => "void".to_string(),
        Type::UntypedInt => "i32".to_string(),
        Type::UntypedFloat => "f64".to_string(),
        Type::NullPtr => "ptr_void".to_string(),
        Type::Pointer(inner) => format!("ptr_{}", mangle(inner, interner)),
        Type::Array { element, size: Some(n) } => {
            format!("arr{}_{}", n, mangle(element, interner))
        }
        Type::Array { element, size: None } => format!("slice_{}", mangle(element, interner)),
        Type::Map { key, value } => {
            format!("map_{}_{}", mangle(key, interner), mangle(value, interner))
        }
        Type::Named(name) | Type::TypeParam(name) => escape_ident(interner.resolve(*name)),
        Type::Generic { base, args } => {
            let mut out = escape_ident(interner.resolve(*base));
            for arg in args {
                out.push('_');
                out.push_str(&mangle(arg, interner));
            }
            out
        }
        Type::Tuple(elements) => {
            let mut out = "tuple".to_string();
            for element in elements {
                out.push('_');
                out.push_str(&mangle(element, interner));
            }
            out
        }
        Type::Function(_) => "fnptr".to_string(),
        Type::Extern | Type::Unknown => "void".to_string(),
    }
}

/// The typedef name for a slice of `element`.
pub(super) fn slice_type_name(element: &Type, interner: &Interner) -> String {
    format!("truk_slice_{}", mangle(element, interner))
}

/// The typedef name for a `map[K, V]`.
pub(super) fn map_type_name(key: &Type, value: &Type, interner: &Interner) -> String {
    format!("truk_map_{}_{}", mangle(key, interner), mangle(value, interner))
}

/// The typedef name for a tuple.
pub(super) fn tuple_type_name(elements: &[Type], interner: &Interner) -> String {
    format!("truk_{}", mangle(&Type::Tuple(elements.to_vec()), interner))
}

/// The C spelling of a type in a declaration or cast position.
///
/// Slices, maps, tuples and generic instantiations spell as their typedef
/// names; the caller is responsible for having ensured the typedef exists.
pub(super) fn c_type(ty: &Type, interner: &Interner) -> String {
    match ty {
        Type::Primitive(kw) => format!("__truk_{}", kw.as_str()),
        Type::Void => "__truk_void".to_string(),
        Type::UntypedInt => "__truk_i32".to_string(),
        Type::UntypedFloat => "__truk_f64".to_string(),
        Type::NullPtr => "__truk_void*".to_string(),
        Type::Pointer(inner) => format!("{}*", c_type(inner, interner)),
        Type::Array { size: None, element } => slice_type_name(element, interner),
        // A sized array in value position spells as its element; the
        // declaration splits the `[N]` onto the identifier.
        Type::Array { size: Some(_), element } => c_type(element, interner),
        Type::Map { key, value } => map_type_name(key, value, interner),
        Type::Named(name) => escape_ident(interner.resolve(*name)),
        Type::Generic { .. } => mangle(ty, interner),
        Type::TypeParam(name) => escape_ident(interner.resolve(*name)),
        Type::Tuple(elements) => tuple_type_name(elements, interner),
        Type::Function(f) => {
            // Bare spelling for casts; variable declarations use c_var_decl.
            let params = function_param_list(f, interner);
            format!("{} (*)({})", c_type(&f.ret, interner), params)
        }
        Type::Extern | Type::Unknown => "__truk_void*".to_string(),
    }
}

fn function_param_list(f: &FunctionType, interner: &Interner) -> String {
    if f.params.is_empty() {
        "__truk_void".to_string()
    } else {
        let params: Vec<String> = f.params.iter().map(|p| c_type(p, interner)).collect();
        params.join(", ")
    }
}

/// The C declarator for a variable of `ty` named `name`.
///
/// Handles the two forms a plain `<type> <name>` cannot express: sized
/// arrays (`T name[N]`) and function pointers (`ret (*name)(params)`).
pub(super) fn c_var_decl(ty: &Type, name: &str, interner: &Interner) -> String {
    match ty {
        Type::Array { size: Some(n), element } => {
            format!("{} {}[{}]", c_type(element, interner), name, n)
        }
        Type::Function(f) => {
            format!(
                "{} (*{})({})",
                c_type(&f.ret, interner),
                name,
                function_param_list(f, interner)
            )
        }
        _ => format!("{} {}", c_type(ty, interner), name),
    }
}

/// Lowers an AST type node to the analysis type model.
///
/// Used by the emitter for declarations whose nodes the checker has already
/// validated; unknown names fall back to `Named` so emission still spells
/// something sensible.
pub(super) fn lower_type(node: &TypeNode, registry: &TypeRegistry) -> Type {
    match node {
        TypeNode::Primitive { keyword, .. } => {
            if *keyword == Keyword::Void {
                Type::Void
            } else {
                Type::Primitive(*keyword)
            }
        }
        TypeNode::Named { name } => Type::Named(name.name),
        TypeNode::Pointer { pointee, .. } => Type::pointer_to(lower_type(pointee, registry)),
        TypeNode::Array { element, size, .. } => Type::Array {
            element: Box::new(lower_type(element, registry)),
            size: *size,
        },
        TypeNode::Map { key, value, .. } => Type::Map {
            key: Box::new(lower_type(key, registry)),
            value: Box::new(lower_type(value, registry)),
        },
        TypeNode::Tuple { elements, .. } => {
            Type::Tuple(elements.iter().map(|e| lower_type(e, registry)).collect())
        }
        TypeNode::Function { params, ret, variadic, .. } => Type::Function(FunctionType {
            params: params.iter().map(|p| lower_type(p, registry)).collect(),
            ret: Box::new(lower_type(ret, registry)),
            variadic: *variadic,
            builtin: None,
        }),
        TypeNode::Generic { base, args, .. } => Type::Generic {
            base: base.name,
            args: args.iter().map(|a| lower_type(a, registry)).collect(),
        },
    }
}

/// The hash function the runtime uses for a map key type.
pub(super) fn map_hash_fn(key: &Type) -> &'static str {
    match key {
        Type::Pointer(_) => "__truk_map_hash_str",
        Type::Primitive(Keyword::I8) => "__truk_map_hash_i8",
        Type::Primitive(Keyword::I16) => "__truk_map_hash_i16",
        Type::Primitive(Keyword::I32) => "__truk_map_hash_i32",
        Type::Primitive(Keyword::I64) => "__truk_map_hash_i64",
        Type::Primitive(Keyword::U8) => "__truk_map_hash_u8",
        Type::Primitive(Keyword::U16) => "__truk_map_hash_u16",
        Type::Primitive(Keyword::U32) => "__truk_map_hash_u32",
        Type::Primitive(Keyword::U64) => "__truk_map_hash_u64",
        Type::Primitive(Keyword::F32) => "__truk_map_hash_f32",
        Type::Primitive(Keyword::F64) => "__truk_map_hash_f64",
        Type::Primitive(Keyword::Bool) => "__truk_map_hash_bool",
        _ => "__truk_map_hash_str",
    }
}

/// The compare function paired with [`map_hash_fn`].
pub(super) fn map_cmp_fn(key: &Type) -> &'static str {
    match key {
        Type::Pointer(_) => "__truk_map_cmp_str",
        _ => "__truk_map_cmp_mem",
    }
}

/// The key size the runtime receives at map initialization.
pub(super) fn map_key_size(key: &Type) -> usize {
    match key {
        Type::Pointer(_) => std::mem::size_of::<*const u8>(),
        Type::Primitive(Keyword::I8) | Type::Primitive(Keyword::U8) | Type::Primitive(Keyword::Bool) => 1,
        Type::Primitive(Keyword::I16) | Type::Primitive(Keyword::U16) => 2,
        Type::Primitive(Keyword::I32)
        | Type::Primitive(Keyword::U32)
        | Type::Primitive(Keyword::F32) => 4,
        Type::Primitive(Keyword::I64)
        | Type::Primitive(Keyword::U64)
        | Type::Primitive(Keyword::F64) => 8,
        _ => std::mem::size_of::<*const u8>(),
    }
}

/// Two spaces per nesting level.
pub(super) fn indent(level: usize) -> String {
    "  ".repeat(level)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interner() -> Interner {
        Interner::new()
    }

    #[test]
    fn mangle_primitives_and_pointers() {
        let interner = interner();
        assert_eq!(mangle(&Type::Primitive(Keyword::I32), &interner), "i32");
        assert_eq!(
            mangle(&Type::pointer_to(Type::Primitive(Keyword::U8)), &interner),
            "ptr_u8"
        );
        assert_eq!(
            mangle(
                &Type::pointer_to(Type::pointer_to(Type::Primitive(Keyword::I8))),
                &interner
            ),
            "ptr_ptr_i8"
        );
    }

    #[test]
    fn mangle_arrays_and_slices() {
        let interner = interner();
        let sized = Type::Array {
            element: Box::new(Type::Primitive(Keyword::F32)),
            size: Some(4),
        };
        assert_eq!(mangle(&sized, &interner), "arr4_f32");
        assert_eq!(
            mangle(&Type::slice_of(Type::Primitive(Keyword::I32)), &interner),
            "slice_i32"
        );
    }

    #[test]
    fn mangle_generic_recurses() {
        let mut interner = Interner::new();
        let list = interner.intern("List");
        let ty = Type::Generic {
            base: list,
            args: vec![Type::pointer_to(Type::Primitive(Keyword::U8))],
        };
        assert_eq!(mangle(&ty, &interner), "List_ptr_u8");
        assert_eq!(
            mangle(&Type::slice_of(ty), &interner),
            "slice_List_ptr_u8"
        );
    }

    #[test]
    fn slice_typedef_name_matches_contract() {
        let interner = interner();
        assert_eq!(
            slice_type_name(&Type::Primitive(Keyword::I32), &interner),
            "truk_slice_i32"
        );
    }

    #[test]
    fn c_type_spells_runtime_typedefs() {
        let interner = interner();
        assert_eq!(c_type(&Type::Primitive(Keyword::I32), &interner), "__truk_i32");
        assert_eq!(c_type(&Type::Void, &interner), "__truk_void");
        assert_eq!(
            c_type(&Type::pointer_to(Type::Primitive(Keyword::U8)), &interner),
            "__truk_u8*"
        );
        assert_eq!(
            c_type(&Type::slice_of(Type::Primitive(Keyword::I32)), &interner),
            "truk_slice_i32"
        );
    }

    #[test]
    fn var_decl_forms() {
        let interner = interner();
        let arr = Type::Array {
            element: Box::new(Type::Primitive(Keyword::I32)),
            size: Some(5),
        };
        assert_eq!(c_var_decl(&arr, "xs", &interner), "__truk_i32 xs[5]");

        let f = Type::Function(FunctionType {
            params: vec![Type::Primitive(Keyword::I32)],
            ret: Box::new(Type::Primitive(Keyword::Bool)),
            variadic: false,
            builtin: None,
        });
        assert_eq!(c_var_decl(&f, "cb", &interner), "__truk_bool (*cb)(__truk_i32)");

        assert_eq!(
            c_var_decl(&Type::Primitive(Keyword::U64), "n", &interner),
            "__truk_u64 n"
        );
    }

    #[test]
    fn reserved_identifiers_are_escaped() {
        assert_eq!(escape_ident("register"), "truk_register");
        assert_eq!(escape_ident("free"), "truk_free");
        assert_eq!(escape_ident("__truk_sneaky"), "truk___truk_sneaky");
        assert_eq!(escape_ident("ordinary"), "ordinary");
    }

    #[test]
    fn map_runtime_selection_by_key() {
        let str_key = Type::pointer_to(Type::Primitive(Keyword::U8));
        assert_eq!(map_hash_fn(&str_key), "__truk_map_hash_str");
        assert_eq!(map_cmp_fn(&str_key), "__truk_map_cmp_str");
        assert_eq!(map_key_size(&str_key), std::mem::size_of::<*const u8>());

        let int_key = Type::Primitive(Keyword::I64);
        assert_eq!(map_hash_fn(&int_key), "__truk_map_hash_i64");
        assert_eq!(map_cmp_fn(&int_key), "__truk_map_cmp_mem");
        assert_eq!(map_key_size(&int_key), 8);
    }
}
