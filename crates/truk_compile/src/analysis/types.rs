//! The type system value model and registry.
//!
//! [`Type`] is a deeply clonable value describing the type of an expression
//! or symbol. `UntypedInt` and `UntypedFloat` are the transient types of
//! numeric literals; they must resolve to a concrete numeric type at each
//! assignment site. `NullPtr` is the type of `nil`, compatible with every
//! pointer. `Extern` is the opaque type of cimport symbols.
//!
//! The [`TypeRegistry`] maps type names to their definitions (structs,
//! enums, extern structs) and is consulted by both the checker and the
//! emitter.

use rustc_hash::FxHashMap;
use truk_base::{Interner, Symbol};
use truk_language::builtins::BuiltinKind;
use truk_language::Keyword;

/// The signature of a function value.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub ret: Box<Type>,
    pub variadic: bool,
    /// Set for intrinsics; selects the dedicated validator and emitter path.
    pub builtin: Option<BuiltinKind>,
}

/// The type of an expression or symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// A non-void primitive, tagged by its keyword.
    Primitive(Keyword),
    Void,
    /// An integer literal awaiting a concrete type.
    UntypedInt,
    /// A float literal awaiting a concrete type.
    UntypedFloat,
    /// The type of `nil`.
    NullPtr,
    Pointer(Box<Type>),
    /// `size: None` is a slice.
    Array {
        element: Box<Type>,
        size: Option<u64>,
    },
    Map {
        key: Box<Type>,
        value: Box<Type>,
    },
    /// A struct or enum, by name; the registry holds the definition.
    Named(Symbol),
    /// A generic struct instantiation, e.g. `List[i32]`.
    Generic {
        base: Symbol,
        args: Vec<Type>,
    },
    /// A struct template's type parameter, inside its own definition.
    TypeParam(Symbol),
    Tuple(Vec<Type>),
    Function(FunctionType),
    /// An opaque symbol introduced by `cimport`; compatible with anything.
    Extern,
    /// Poison type after an error; suppresses cascading diagnostics.
    Unknown,
}

impl Type {
    pub fn pointer_to(inner: Type) -> Type {
        Type::Pointer(Box::new(inner))
    }

    pub fn slice_of(element: Type) -> Type {
        Type::Array { element: Box::new(element), size: None }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Primitive(Keyword::Bool) | Type::Extern)
    }

    pub fn is_integer(&self) -> bool {
        match self {
            Type::Primitive(kw) => kw.is_integer_type(),
            Type::UntypedInt | Type::Extern => true,
            _ => false,
        }
    }

    pub fn is_float(&self) -> bool {
        match self {
            Type::Primitive(kw) => kw.is_float_type(),
            Type::UntypedFloat => true,
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_) | Type::NullPtr | Type::Extern)
    }

    pub fn is_slice(&self) -> bool {
        matches!(self, Type::Array { size: None, .. })
    }

    pub fn is_untyped(&self) -> bool {
        matches!(self, Type::UntypedInt | Type::UntypedFloat)
    }

    /// `true` for `*u8`.
    pub fn is_u8_pointer(&self) -> bool {
        matches!(self, Type::Pointer(p) if matches!(**p, Type::Primitive(Keyword::U8)))
    }

    /// `true` for `*void`.
    pub fn is_void_pointer(&self) -> bool {
        matches!(self, Type::Pointer(p) if p.is_void())
    }

    /// Orderable with `< <= > >=` and comparable with `== !=`.
    pub fn is_comparable(&self, registry: &TypeRegistry) -> bool {
        match self {
            Type::Primitive(_) | Type::UntypedInt | Type::UntypedFloat => true,
            Type::Pointer(_) | Type::NullPtr | Type::Extern => true,
            Type::Named(name) => registry.is_enum(*name),
            _ => false,
        }
    }

    /// Human-readable spelling for diagnostics.
    pub fn display(&self, interner: &Interner) -> String {
        match self {
            Type::Primitive(kw) => kw.as_str().to_string(),
            Type::Void => "void".to_string(),
            Type::UntypedInt => "untyped integer".to_string(),
            Type::UntypedFloat => "untyped float".to_string(),
            Type::NullPtr => "nil".to_string(),
            Type::Pointer(p) => format!("*{}", p.display(interner)),
            Type::Array { element, size: Some(n) } => {
                format!("[{}]{}", n, element.display(interner))
            }
            Type::Array { element, size: None } => format!("[]{}", element.display(interner)),
            Type::Map { key, value } => {
                format!("map[{}, {}]", key.display(interner), value.display(interner))
            }
            Type::Named(name) => interner.resolve(*name).to_string(),
            Type::Generic { base, args } => {
                let args: Vec<String> = args.iter().map(|a| a.display(interner)).collect();
                format!("{}[{}]", interner.resolve(*base), args.join(", "))
            }
            Type::TypeParam(name) => interner.resolve(*name).to_string(),
            Type::Tuple(elements) => {
                let elements: Vec<String> =
                    elements.iter().map(|e| e.display(interner)).collect();
                format!("({})", elements.join(", "))
            }
            Type::Function(f) => {
                let params: Vec<String> = f.params.iter().map(|p| p.display(interner)).collect();
                format!("fn({}): {}", params.join(", "), f.ret.display(interner))
            }
            Type::Extern => "extern".to_string(),
            Type::Unknown => "<error>".to_string(),
        }
    }
}

/// One struct field in the registry.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: Symbol,
    pub ty: Type,
}

/// One enum variant with its resolved integer value.
#[derive(Debug, Clone)]
pub struct EnumVariantDef {
    pub name: Symbol,
    pub value: i64,
}

/// A named type definition.
#[derive(Debug, Clone)]
pub enum TypeDef {
    Struct {
        fields: Vec<FieldDef>,
        type_params: Vec<Symbol>,
    },
    Enum {
        backing: Keyword,
        variants: Vec<EnumVariantDef>,
    },
    /// A struct named by a `cimport`; its layout is opaque.
    ExternStruct,
}

/// Name → definition table for structs, enums and extern structs.
///
/// Built fresh per compilation invocation.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: FxHashMap<Symbol, TypeDef>,
    /// Registration order, for deterministic iteration during emission.
    order: Vec<Symbol>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: Symbol, def: TypeDef) {
        if !self.types.contains_key(&name) {
            self.order.push(name);
        }
        self.types.insert(name, def);
    }

    pub fn get(&self, name: Symbol) -> Option<&TypeDef> {
        self.types.get(&name)
    }

    pub fn contains(&self, name: Symbol) -> bool {
        self.types.contains_key(&name)
    }

    pub fn is_struct(&self, name: Symbol) -> bool {
        matches!(self.types.get(&name), Some(TypeDef::Struct { .. }))
    }

    pub fn is_generic_struct(&self, name: Symbol) -> bool {
        matches!(
            self.types.get(&name),
            Some(TypeDef::Struct { type_params, .. }) if !type_params.is_empty()
        )
    }

    pub fn is_enum(&self, name: Symbol) -> bool {
        matches!(self.types.get(&name), Some(TypeDef::Enum { .. }))
    }

    pub fn is_extern_struct(&self, name: Symbol) -> bool {
        matches!(self.types.get(&name), Some(TypeDef::ExternStruct))
    }

    /// Field lookup on a struct definition.
    pub fn field(&self, struct_name: Symbol, field: Symbol) -> Option<&FieldDef> {
        match self.types.get(&struct_name) {
            Some(TypeDef::Struct { fields, .. }) => fields.iter().find(|f| f.name == field),
            _ => None,
        }
    }

    /// Enum variant lookup.
    pub fn variant(&self, enum_name: Symbol, variant: Symbol) -> Option<&EnumVariantDef> {
        match self.types.get(&enum_name) {
            Some(TypeDef::Enum { variants, .. }) => {
                variants.iter().find(|v| v.name == variant)
            }
            _ => None,
        }
    }

    /// Definitions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (Symbol, &TypeDef)> {
        self.order.iter().map(move |sym| (*sym, &self.types[sym]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interner_with(names: &[&str]) -> (Interner, Vec<Symbol>) {
        let mut interner = Interner::new();
        let symbols = names.iter().map(|n| interner.intern(n)).collect();
        (interner, symbols)
    }

    #[test]
    fn classification_helpers() {
        assert!(Type::Primitive(Keyword::I32).is_integer());
        assert!(Type::Primitive(Keyword::F64).is_float());
        assert!(Type::UntypedInt.is_numeric());
        assert!(!Type::Primitive(Keyword::Bool).is_numeric());
        assert!(Type::NullPtr.is_pointer());
        assert!(Type::slice_of(Type::Primitive(Keyword::U8)).is_slice());
        assert!(!Type::Array {
            element: Box::new(Type::Primitive(Keyword::U8)),
            size: Some(4)
        }
        .is_slice());
    }

    #[test]
    fn u8_pointer_detection() {
        let p = Type::pointer_to(Type::Primitive(Keyword::U8));
        assert!(p.is_u8_pointer());
        let q = Type::pointer_to(Type::Primitive(Keyword::I32));
        assert!(!q.is_u8_pointer());
        assert!(Type::pointer_to(Type::Void).is_void_pointer());
    }

    #[test]
    fn display_spellings() {
        let (interner, syms) = interner_with(&["Point"]);
        assert_eq!(Type::Primitive(Keyword::I32).display(&interner), "i32");
        assert_eq!(
            Type::pointer_to(Type::Primitive(Keyword::U8)).display(&interner),
            "*u8"
        );
        assert_eq!(
            Type::slice_of(Type::Primitive(Keyword::I32)).display(&interner),
            "[]i32"
        );
        assert_eq!(
            Type::Map {
                key: Box::new(Type::pointer_to(Type::Primitive(Keyword::U8))),
                value: Box::new(Type::Primitive(Keyword::I32)),
            }
            .display(&interner),
            "map[*u8, i32]"
        );
        assert_eq!(Type::Named(syms[0]).display(&interner), "Point");
    }

    #[test]
    fn registry_field_and_variant_lookup() {
        let (mut interner, _) = interner_with(&[]);
        let point = interner.intern("Point");
        let x = interner.intern("x");
        let color = interner.intern("Color");
        let red = interner.intern("Red");

        let mut registry = TypeRegistry::new();
        registry.insert(
            point,
            TypeDef::Struct {
                fields: vec![FieldDef { name: x, ty: Type::Primitive(Keyword::I32) }],
                type_params: vec![],
            },
        );
        registry.insert(
            color,
            TypeDef::Enum {
                backing: Keyword::U8,
                variants: vec![EnumVariantDef { name: red, value: 0 }],
            },
        );

        assert!(registry.is_struct(point));
        assert!(registry.is_enum(color));
        assert!(registry.field(point, x).is_some());
        assert!(registry.field(point, red).is_none());
        assert_eq!(registry.variant(color, red).unwrap().value, 0);
    }

    #[test]
    fn registry_iteration_preserves_order() {
        let (mut interner, _) = interner_with(&[]);
        let a = interner.intern("A");
        let b = interner.intern("B");
        let mut registry = TypeRegistry::new();
        registry.insert(b, TypeDef::ExternStruct);
        registry.insert(a, TypeDef::ExternStruct);
        let order: Vec<Symbol> = registry.iter().map(|(s, _)| s).collect();
        assert_eq!(order, vec![b, a]);
    }
}
