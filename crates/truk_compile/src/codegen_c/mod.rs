//! The C emitter.
//!
//! Consumes the ordered, type-checked declaration list and produces C
//! source chunks plus a compilation-unit metadata record. Emission proceeds
//! in phases:
//!
//! 1. **Collection** — register function signatures and global variable
//!    types, count `main`s, record test functions and extern structs.
//! 2. **Struct definitions** — struct bodies in list order, followed by one
//!    specialized struct per distinct generic instantiation found in the
//!    AST.
//! 3. **Forward declarations** — `typedef struct X X;` per struct, the full
//!    enum typedefs, and a prototype per function. These permit arbitrary
//!    definition order regardless of the topological pre-sort.
//! 4. **Function definitions** — statements lower directly; expressions
//!    lower through string-returning emission (`expr.rs`).
//! 5. **Finalization** — chunks are ordered prelude, forward declarations,
//!    slice typedefs, struct definitions (with map/tuple typedefs
//!    interleaved), prototypes, globals, lifted lambdas, functions.
//!
//! The defer stack lives here: each lexical scope (function, lambda, block,
//! loop) carries its registered `defer` statements, replayed in reverse on
//! every exit path.

pub(crate) mod builtins;
pub(crate) mod emit;
pub(crate) mod expr;
pub(crate) mod generics;
pub(crate) mod runtime;
pub(crate) mod types;

use std::fmt::Write as _;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use truk_base::{Interner, Symbol};
use truk_language::ast::{CImport, Decl, Stmt};

use crate::analysis::types::{FunctionType, Type, TypeRegistry};
use runtime::C_RUNTIME;
use types::{c_type, escape_ident, lower_type, mangle, slice_type_name};

/// The entry symbol's emitted name; the synthesized C `main` forwards here.
pub const ENTRY_FN_NAME: &str = "truk_main_0";

/// An error produced during emission.
#[derive(Debug, Clone)]
pub struct EmitError {
    pub message: String,
    pub source_index: usize,
    pub decl_index: usize,
}

/// Facts about the compilation unit, for host tooling.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Metadata {
    pub defined_functions: Vec<String>,
    pub defined_structs: Vec<String>,
    pub extern_structs: Vec<String>,
    /// Shard names, gathered from the AST or the resolver's per-file map.
    pub shards: Vec<String>,
    pub test_functions: Vec<String>,
    pub has_test_setup: bool,
    pub has_test_teardown: bool,
    pub has_main_function: bool,
    pub main_function_count: u32,
}

impl Metadata {
    pub fn is_library(&self) -> bool {
        !self.has_main_function
    }

    pub fn has_tests(&self) -> bool {
        !self.test_functions.is_empty()
    }
}

/// What to assemble the chunks into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyKind {
    /// One translation unit with a synthesized `main`.
    Application,
    /// A `.c`/`.h` pair keyed by a header basename.
    Library,
}

/// An assembled output.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub kind: AssemblyKind,
    pub source: String,
    pub header: Option<String>,
    pub header_name: Option<String>,
}

/// The emitter's product: ordered chunks plus metadata.
#[derive(Debug)]
pub struct EmitResult {
    pub chunks: Vec<String>,
    pub metadata: Metadata,
    pub errors: Vec<EmitError>,
    pub warnings: Vec<String>,
}

impl EmitResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// All chunks joined, without an entry point.
    pub fn code(&self) -> String {
        self.chunks.join("")
    }

    /// Assembles the requested output shape.
    pub fn assemble(
        &self,
        kind: AssemblyKind,
        header_name: Option<&str>,
    ) -> Result<Assembly, String> {
        match kind {
            AssemblyKind::Application => {
                if !self.metadata.has_main_function {
                    return Err("no main function defined for an application".to_string());
                }
                let mut source = self.code();
                let has_args = self.metadata.main_function_count > 0 && self.main_takes_args();
                source.push_str(&synthesized_main(has_args));
                Ok(Assembly { kind, source, header: None, header_name: None })
            }
            AssemblyKind::Library => {
                let basename = header_name.unwrap_or("truk_out");
                let guard = format!(
                    "TRUK_{}_H",
                    basename
                        .chars()
                        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
                        .collect::<String>()
                );
                let mut header = String::new();
                let _ = writeln!(header, "#ifndef {}", guard);
                let _ = writeln!(header, "#define {}\n", guard);
                // Prelude, forward declarations, typedefs, structs, prototypes.
                for chunk in self.chunks.iter().take(5) {
                    header.push_str(chunk);
                }
                let _ = writeln!(header, "\n#endif /* {} */", guard);

                let mut source = format!("#include \"{}.h\"\n\n", basename);
                for chunk in self.chunks.iter().skip(5) {
                    source.push_str(chunk);
                }
                Ok(Assembly {
                    kind,
                    source,
                    header: Some(header),
                    header_name: Some(format!("{}.h", basename)),
                })
            }
        }
    }

    /// A translation unit whose `main` runs every test function.
    pub fn assemble_test_runner(&self) -> String {
        let mut source = self.code();
        source.push_str("\nint main(void) {\n");
        if self.metadata.has_test_setup {
            source.push_str("  test_setup();\n");
        }
        let tests: Vec<&String> = self
            .metadata
            .test_functions
            .iter()
            .filter(|t| *t != "test_setup" && *t != "test_teardown")
            .collect();
        for test in &tests {
            let _ = writeln!(source, "  fprintf(stderr, \"test: {}\\n\");", test);
            let _ = writeln!(source, "  {}();", test);
        }
        if self.metadata.has_test_teardown {
            source.push_str("  test_teardown();\n");
        }
        let _ = writeln!(source, "  fprintf(stderr, \"{} tests passed\\n\");", tests.len());
        source.push_str("  return 0;\n}\n");
        source
    }

    fn main_takes_args(&self) -> bool {
        self.chunks
            .iter()
            .any(|c| c.contains(&format!("{}(__truk_i32", ENTRY_FN_NAME)))
    }
}

fn synthesized_main(has_args: bool) -> String {
    format!(
        "\nint main(int argc, char **argv) {{\n  \
         __truk_runtime_sxs_target_app_s app = {{.entry_fn = (__truk_void *){entry},\n                                         \
         .has_args = {has_args},\n                                         \
         .argc = argc,\n                                         \
         .argv = (__truk_i8 **)argv}};\n  \
         return __truk_runtime_sxs_start(&app);\n}}\n",
        entry = ENTRY_FN_NAME,
        has_args = has_args,
    )
}

/// One lexical scope's deferred statements during emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    Function,
    Lambda,
    Block,
    Loop,
}

pub(crate) struct DeferScope {
    pub(crate) kind: ScopeKind,
    pub(crate) defers: Vec<Stmt>,
}

/// Visitor-style emitter state shared by the `emit`, `expr`, `builtins` and
/// `generics` submodules.
pub struct Emitter<'a> {
    pub(crate) interner: &'a Interner,
    pub(crate) registry: &'a TypeRegistry,

    // Output buffers, concatenated in chunk order at finalize.
    pub(crate) includes: String,
    pub(crate) forward_decls: String,
    pub(crate) typedefs: String,
    pub(crate) prototypes: String,
    pub(crate) structs: String,
    pub(crate) globals: String,
    pub(crate) lambdas: String,
    pub(crate) functions: String,

    // Emit-once tracking for synthesized typedefs.
    pub(crate) slice_typedefs: FxHashSet<String>,
    pub(crate) map_typedefs: FxHashSet<String>,
    pub(crate) tuple_typedefs: FxHashSet<String>,
    pub(crate) generics_emitted: FxHashSet<String>,

    // Scoped variable types and function signatures.
    pub(crate) vars: Vec<FxHashMap<Symbol, Type>>,
    pub(crate) fn_types: FxHashMap<Symbol, FunctionType>,

    pub(crate) defer_stack: Vec<DeferScope>,
    pub(crate) indent: usize,
    pub(crate) temp_counter: usize,
    pub(crate) lambda_counter: usize,
    pub(crate) match_counter: usize,
    pub(crate) in_variadic_fn: bool,
    pub(crate) current_fn_ret: Type,
    pub(crate) main_symbol: Option<Symbol>,

    pub(crate) metadata: Metadata,
    pub(crate) errors: Vec<EmitError>,
    pub(crate) warnings: Vec<String>,
    pub(crate) current_decl: usize,
}

/// Emits a type-checked program into C chunks.
pub fn emit_program(
    declarations: &[Decl],
    c_imports: &[CImport],
    registry: &TypeRegistry,
    interner: &Interner,
) -> EmitResult {
    let mut emitter = Emitter::new(registry, interner);
    emitter.collect(declarations, c_imports);
    // Struct bodies go first within their buffer: prototypes and function
    // code may synthesize map/tuple typedefs that hold structs by value.
    emitter.emit_struct_definitions(declarations);
    emitter.emit_generic_instantiations(declarations);
    emitter.emit_forward_declarations(declarations);
    emitter.emit_definitions(declarations);
    emitter.finalize()
}

impl<'a> Emitter<'a> {
    pub fn new(registry: &'a TypeRegistry, interner: &'a Interner) -> Self {
        Self {
            interner,
            registry,
            includes: String::new(),
            forward_decls: String::new(),
            typedefs: String::new(),
            prototypes: String::new(),
            structs: String::new(),
            globals: String::new(),
            lambdas: String::new(),
            functions: String::new(),
            slice_typedefs: FxHashSet::default(),
            map_typedefs: FxHashSet::default(),
            tuple_typedefs: FxHashSet::default(),
            generics_emitted: FxHashSet::default(),
            vars: vec![FxHashMap::default()],
            fn_types: FxHashMap::default(),
            defer_stack: Vec::new(),
            indent: 0,
            temp_counter: 0,
            lambda_counter: 0,
            match_counter: 0,
            in_variadic_fn: false,
            current_fn_ret: Type::Void,
            main_symbol: None,
            metadata: Metadata::default(),
            errors: Vec::new(),
            warnings: Vec::new(),
            current_decl: 0,
        }
    }

    pub(crate) fn error(&mut self, message: impl Into<String>, source_index: usize) {
        self.errors.push(EmitError {
            message: message.into(),
            source_index,
            decl_index: self.current_decl,
        });
    }

    pub(crate) fn resolve(&self, sym: Symbol) -> &str {
        self.interner.resolve(sym)
    }

    pub(crate) fn next_temp(&mut self) -> usize {
        let n = self.temp_counter;
        self.temp_counter += 1;
        n
    }

    // ------------------------------------------------------------------
    // Phase 1: collection
    // ------------------------------------------------------------------

    fn collect(&mut self, declarations: &[Decl], c_imports: &[CImport]) {
        for cimport in c_imports {
            let _ = writeln!(self.includes, "#include \"{}\"", cimport.header);
            for symbol in &cimport.symbols {
                if self.registry.is_extern_struct(symbol.name) {
                    self.metadata
                        .extern_structs
                        .push(self.resolve(symbol.name).to_string());
                }
            }
        }
        if !c_imports.is_empty() {
            self.includes.push('\n');
        }

        for decl in declarations {
            self.collect_decl(decl);
        }
        log::debug!(
            "emitter collected {} functions, {} structs, main_count={}",
            self.metadata.defined_functions.len(),
            self.metadata.defined_structs.len(),
            self.metadata.main_function_count
        );
    }

    fn collect_decl(&mut self, decl: &Decl) {
        match decl {
            Decl::Fn(f) => {
                let name = self.resolve(f.name.name).to_string();
                let signature = self.lower_fn_signature(f);
                self.fn_types.insert(f.name.name, signature);
                self.metadata.defined_functions.push(name.clone());

                if name == "main" {
                    self.metadata.main_function_count += 1;
                    self.metadata.has_main_function = true;
                    if self.main_symbol.is_none() {
                        self.main_symbol = Some(f.name.name);
                    } else {
                        self.warnings.push(
                            "multiple main functions; using the first".to_string(),
                        );
                    }
                }
                if f.is_test {
                    self.metadata.test_functions.push(name.clone());
                }
                if name == "test_setup" {
                    self.metadata.has_test_setup = true;
                }
                if name == "test_teardown" {
                    self.metadata.has_test_teardown = true;
                }
            }
            Decl::Struct(s) => {
                self.metadata
                    .defined_structs
                    .push(self.resolve(s.name.name).to_string());
            }
            Decl::Enum(_) => {}
            Decl::Var(v) => {
                let ty = lower_type(&v.ty, self.registry);
                self.vars[0].insert(v.name.name, ty);
            }
            Decl::Const(c) => {
                let ty = lower_type(&c.ty, self.registry);
                self.vars[0].insert(c.name.name, ty);
            }
            Decl::Let(l) => {
                // Inference happens at definition emission; record a
                // placeholder so identifier lookups do not miss.
                self.vars[0].insert(l.name.name, Type::Unknown);
            }
            Decl::Import { .. } => {}
            Decl::Shard { name, declarations, .. } => {
                self.metadata.shards.push(self.resolve(name.name).to_string());
                for inner in declarations {
                    self.collect_decl(inner);
                }
            }
        }
    }

    pub(crate) fn lower_fn_signature(&self, f: &truk_language::ast::FnDecl) -> FunctionType {
        FunctionType {
            params: f
                .params
                .iter()
                .map(|p| lower_type(&p.ty, self.registry))
                .collect(),
            ret: Box::new(match &f.return_type {
                Some(ty) => lower_type(ty, self.registry),
                None => Type::Void,
            }),
            variadic: f.variadic,
            builtin: None,
        }
    }

    // ------------------------------------------------------------------
    // Typedef synthesis
    // ------------------------------------------------------------------

    /// Emits the slice struct typedef for an element type, exactly once.
    pub(crate) fn ensure_slice_typedef(&mut self, element: &Type) {
        let name = slice_type_name(element, self.interner);
        if self.slice_typedefs.contains(&name) {
            return;
        }
        self.slice_typedefs.insert(name.clone());
        self.ensure_type_support(element);
        // A sized-array element keeps its dimensions on the data pointer.
        let data_decl = match element {
            Type::Array { element: inner, size: Some(n) } => {
                format!("{} (*data)[{}];", c_type(inner, self.interner), n)
            }
            _ => format!("{}* data;", c_type(element, self.interner)),
        };
        let _ = writeln!(
            self.typedefs,
            "typedef struct {{\n  {}\n  __truk_u64 len;\n}} {};\n",
            data_decl, name
        );
    }

    /// Emits the map typedef for a key/value pair, exactly once.
    ///
    /// Maps hold their value type by value, so the typedef lands in the
    /// struct-definition buffer where the topological declaration order
    /// guarantees value structs are already complete.
    pub(crate) fn ensure_map_typedef(&mut self, key: &Type, value: &Type) {
        let name = types::map_type_name(key, value, self.interner);
        if self.map_typedefs.contains(&name) {
            return;
        }
        self.map_typedefs.insert(name.clone());
        self.ensure_type_support(value);
        let value_c = c_type(value, self.interner);
        let _ = writeln!(
            self.structs,
            "typedef __truk_map_t({}) {};\n",
            value_c, name
        );
    }

    /// Emits the tuple struct typedef, exactly once. By-value element
    /// types put it in the struct-definition buffer, like maps.
    pub(crate) fn ensure_tuple_typedef(&mut self, elements: &[Type]) {
        let name = types::tuple_type_name(elements, self.interner);
        if self.tuple_typedefs.contains(&name) {
            return;
        }
        self.tuple_typedefs.insert(name.clone());
        for element in elements {
            self.ensure_type_support(element);
        }
        let mut body = String::new();
        for (i, element) in elements.iter().enumerate() {
            let _ = writeln!(body, "  {} _{};", c_type(element, self.interner), i);
        }
        let _ = writeln!(self.structs, "typedef struct {{\n{}}} {};\n", body, name);
    }

    /// Makes sure every synthesized typedef a type mentions exists.
    pub(crate) fn ensure_type_support(&mut self, ty: &Type) {
        match ty {
            Type::Array { element, size: None } => self.ensure_slice_typedef(element),
            Type::Array { element, size: Some(_) } => self.ensure_type_support(element),
            Type::Map { key, value } => self.ensure_map_typedef(key, value),
            Type::Tuple(elements) => self.ensure_tuple_typedef(elements),
            Type::Pointer(inner) => self.ensure_type_support(inner),
            Type::Generic { .. } => {
                let ty = ty.clone();
                self.ensure_generic_instantiation(&ty);
            }
            Type::Function(f) => {
                for param in &f.params {
                    self.ensure_type_support(param);
                }
                self.ensure_type_support(&f.ret);
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Phase 6: finalize
    // ------------------------------------------------------------------

    fn finalize(mut self) -> EmitResult {
        let mut prelude = String::from(C_RUNTIME);
        prelude.push_str(&self.includes);

        // Slice typedefs only point at their element type, so they precede
        // struct bodies; map/tuple typedefs live interleaved with struct
        // bodies (see ensure_map_typedef). Prototypes follow every typedef
        // they could mention.
        let chunks = vec![
            prelude,
            std::mem::take(&mut self.forward_decls),
            std::mem::take(&mut self.typedefs),
            std::mem::take(&mut self.structs),
            std::mem::take(&mut self.prototypes),
            std::mem::take(&mut self.globals),
            std::mem::take(&mut self.lambdas),
            std::mem::take(&mut self.functions),
        ];

        EmitResult {
            chunks,
            metadata: self.metadata,
            errors: self.errors,
            warnings: self.warnings,
        }
    }

    // ------------------------------------------------------------------
    // Variable scopes
    // ------------------------------------------------------------------

    pub(crate) fn push_var_scope(&mut self) {
        self.vars.push(FxHashMap::default());
    }

    pub(crate) fn pop_var_scope(&mut self) {
        self.vars.pop();
    }

    pub(crate) fn declare_var(&mut self, name: Symbol, ty: Type) {
        self.vars
            .last_mut()
            .expect("emitter variable scope stack is never empty")
            .insert(name, ty);
    }

    pub(crate) fn var_type(&self, name: Symbol) -> Option<&Type> {
        self.vars.iter().rev().find_map(|scope| scope.get(&name))
    }

    /// The emitted spelling of an identifier, accounting for the entry
    /// point rename and C collisions.
    pub(crate) fn ident(&self, name: Symbol) -> String {
        if Some(name) == self.main_symbol {
            return ENTRY_FN_NAME.to_string();
        }
        escape_ident(self.resolve(name))
    }

    /// Mangled spelling helper used across submodules.
    pub(crate) fn mangled(&self, ty: &Type) -> String {
        mangle(ty, self.interner)
    }
}
