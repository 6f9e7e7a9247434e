//! Type syntax nodes.

use crate::ast::Ident;
use crate::keywords::Keyword;

/// A type as written in source.
///
/// `Array` with `size: None` is a slice. `Generic` is a generic struct
/// instantiation such as `List[i32]`; the emitter deduplicates these by
/// mangled name. `Function` has no surface syntax — it is synthesized for
/// lambda literals and builtin signatures.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeNode {
    Primitive {
        keyword: Keyword,
        source_index: usize,
    },
    Named {
        name: Ident,
    },
    Pointer {
        pointee: Box<TypeNode>,
        source_index: usize,
    },
    Array {
        element: Box<TypeNode>,
        size: Option<u64>,
        source_index: usize,
    },
    Map {
        key: Box<TypeNode>,
        value: Box<TypeNode>,
        source_index: usize,
    },
    Tuple {
        elements: Vec<TypeNode>,
        source_index: usize,
    },
    Function {
        params: Vec<TypeNode>,
        ret: Box<TypeNode>,
        variadic: bool,
        source_index: usize,
    },
    Generic {
        base: Ident,
        args: Vec<TypeNode>,
        source_index: usize,
    },
}

impl TypeNode {
    pub fn source_index(&self) -> usize {
        match self {
            TypeNode::Primitive { source_index, .. }
            | TypeNode::Pointer { source_index, .. }
            | TypeNode::Array { source_index, .. }
            | TypeNode::Map { source_index, .. }
            | TypeNode::Tuple { source_index, .. }
            | TypeNode::Function { source_index, .. }
            | TypeNode::Generic { source_index, .. } => *source_index,
            TypeNode::Named { name } => name.source_index,
        }
    }

    /// `true` for an unsized array type.
    pub fn is_slice(&self) -> bool {
        matches!(self, TypeNode::Array { size: None, .. })
    }

    /// `true` for `map[K, V]`.
    pub fn is_map(&self) -> bool {
        matches!(self, TypeNode::Map { .. })
    }

    /// `true` for the `void` primitive.
    pub fn is_void(&self) -> bool {
        matches!(
            self,
            TypeNode::Primitive { keyword: Keyword::Void, .. }
        )
    }
}
