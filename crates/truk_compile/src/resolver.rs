//! Multi-file import resolution and topological declaration ordering.
//!
//! The resolver walks the import graph depth-first from an entry file,
//! parsing each file once and merging every top-level declaration into one
//! flat vector. Cycles are detected with an explicit import stack and
//! reported as `A -> B -> ... -> A`. Shards flatten into the stream; their
//! names are recorded per file for the emitter.
//!
//! After the walk, per-declaration dependencies are computed by walking each
//! declaration's AST: an identifier that names another top-level declaration
//! — and is not shadowed by a parameter or local at that site — is an edge,
//! as is any named type in a field, parameter or return position. Kahn's
//! algorithm then orders the list so dependencies precede dependents; a
//! residual cycle is reported and the unsorted order kept.
//!
//! Side tables replace back-pointers: `decl_files[i]` gives the file of
//! declaration `i`, and `files` holds each file's canonical path and source
//! text for diagnostic rendering.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};
use truk_base::{Diagnostic, ErrorKind, Interner, Symbol};
use truk_language::ast::{Block, CImport, Decl, Expr, Stmt, TypeNode};
use truk_language::Parser;

/// One source file the resolver read.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub source: String,
}

/// The resolver's output: merged declarations plus side tables.
#[derive(Debug)]
pub struct ResolvedProgram {
    pub declarations: Vec<Decl>,
    pub c_imports: Vec<CImport>,
    /// Parallel to `declarations`: index into `files`.
    pub decl_files: Vec<usize>,
    pub files: Vec<SourceFile>,
    /// Shard names declared per file, in declaration order.
    pub file_shards: FxHashMap<PathBuf, Vec<Symbol>>,
    pub errors: Vec<Diagnostic>,
}

impl ResolvedProgram {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    /// The file a declaration came from, when tracked.
    pub fn file_of(&self, decl_index: usize) -> Option<&SourceFile> {
        self.decl_files
            .get(decl_index)
            .and_then(|&file| self.files.get(file))
    }
}

/// Import-graph walker. One instance per compilation invocation.
pub struct ImportResolver<'a> {
    interner: &'a mut Interner,
    search_paths: Vec<PathBuf>,
    processed: FxHashSet<PathBuf>,
    import_stack: Vec<PathBuf>,
    declarations: Vec<Decl>,
    decl_files: Vec<usize>,
    files: Vec<SourceFile>,
    c_imports: Vec<CImport>,
    file_shards: FxHashMap<PathBuf, Vec<Symbol>>,
    symbol_to_decl: FxHashMap<Symbol, usize>,
    errors: Vec<Diagnostic>,
}

impl<'a> ImportResolver<'a> {
    pub fn new(interner: &'a mut Interner, search_paths: Vec<PathBuf>) -> Self {
        Self {
            interner,
            search_paths,
            processed: FxHashSet::default(),
            import_stack: Vec::new(),
            declarations: Vec::new(),
            decl_files: Vec::new(),
            files: Vec::new(),
            c_imports: Vec::new(),
            file_shards: FxHashMap::default(),
            symbol_to_decl: FxHashMap::default(),
            errors: Vec::new(),
        }
    }

    /// Resolves the whole import graph rooted at `entry_file`.
    pub fn resolve(mut self, entry_file: &Path) -> ResolvedProgram {
        self.process_file(entry_file);

        if self.errors.is_empty() {
            self.topological_sort();
        }

        ResolvedProgram {
            declarations: self.declarations,
            c_imports: self.c_imports,
            decl_files: self.decl_files,
            files: self.files,
            file_shards: self.file_shards,
            errors: self.errors,
        }
    }

    fn canonicalize(path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }

    fn process_file(&mut self, file_path: &Path) {
        let canonical = Self::canonicalize(file_path);

        if self.import_stack.contains(&canonical) {
            let mut cycle = String::new();
            for file in &self.import_stack {
                cycle.push_str(&file.display().to_string());
                cycle.push_str(" -> ");
            }
            cycle.push_str(&canonical.display().to_string());
            self.errors.push(
                Diagnostic::new(
                    ErrorKind::ImportResolution,
                    format!("circular import detected: {}", cycle),
                )
                .in_file(file_path),
            );
            return;
        }

        if self.processed.contains(&canonical) {
            return;
        }

        log::debug!("resolving {}", canonical.display());
        self.import_stack.push(canonical.clone());

        let source = match std::fs::read_to_string(file_path) {
            Ok(source) => source,
            Err(err) => {
                self.errors.push(
                    Diagnostic::new(
                        ErrorKind::FileIo,
                        format!("failed to read '{}': {}", file_path.display(), err),
                    )
                    .in_file(file_path),
                );
                self.import_stack.pop();
                return;
            }
        };

        let parsed = match Parser::new(&source, self.interner).parse() {
            Ok(parsed) => parsed,
            Err(err) => {
                self.errors.push(
                    Diagnostic::new(ErrorKind::Parse, err.message)
                        .in_file(&canonical)
                        .at(err.line, err.column)
                        .at_index(err.source_index),
                );
                self.import_stack.pop();
                return;
            }
        };

        let file_index = self.files.len();
        self.files.push(SourceFile { path: canonical.clone(), source });

        self.c_imports.extend(parsed.c_imports);
        self.merge_declarations(parsed.declarations, &canonical, file_index);

        self.import_stack.pop();
        self.processed.insert(canonical);
    }

    fn merge_declarations(&mut self, decls: Vec<Decl>, file: &Path, file_index: usize) {
        for decl in decls {
            match decl {
                Decl::Import { path, .. } => {
                    let resolved = self.resolve_import_path(&path, file);
                    self.process_file(&resolved);
                }
                Decl::Shard { name, declarations, .. } => {
                    self.file_shards
                        .entry(file.to_path_buf())
                        .or_default()
                        .push(name.name);
                    // Shard contents keep their declaration order in the
                    // flat stream; no mangling happens at this level.
                    self.merge_declarations(declarations, file, file_index);
                }
                other => {
                    if let Some(name) = other.name() {
                        if let Some(&existing) = self.symbol_to_decl.get(&name.name) {
                            let existing_file = self
                                .decl_files
                                .get(existing)
                                .and_then(|&f| self.files.get(f))
                                .map(|f| f.path.display().to_string())
                                .unwrap_or_else(|| "<unknown>".to_string());
                            self.errors.push(
                                Diagnostic::new(
                                    ErrorKind::ImportResolution,
                                    format!(
                                        "duplicate top-level symbol '{}' (already defined in {})",
                                        self.interner.resolve(name.name),
                                        existing_file
                                    ),
                                )
                                .in_file(file)
                                .at_index(name.source_index),
                            );
                        } else {
                            self.symbol_to_decl.insert(name.name, self.declarations.len());
                        }
                    }
                    self.declarations.push(other);
                    self.decl_files.push(file_index);
                }
            }
        }
    }

    /// Resolves an import path: first against the importing file's
    /// directory, then against each configured search path in order.
    fn resolve_import_path(&self, import: &str, importing_file: &Path) -> PathBuf {
        let relative = importing_file
            .parent()
            .map(|dir| dir.join(import))
            .unwrap_or_else(|| PathBuf::from(import));
        if relative.exists() {
            return relative;
        }
        for search_path in &self.search_paths {
            let candidate = search_path.join(import);
            if candidate.exists() {
                return candidate;
            }
        }
        // Nobody has it; the read will produce the file-io error.
        relative
    }

    // ------------------------------------------------------------------
    // Dependency analysis and ordering
    // ------------------------------------------------------------------

    fn topological_sort(&mut self) {
        let n = self.declarations.len();
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_degree: Vec<usize> = vec![0; n];

        for (index, decl) in self.declarations.iter().enumerate() {
            let mut walker = DependencyWalker::new(&self.symbol_to_decl);
            walker.walk_decl(decl);
            let own_name = decl.name().map(|n| n.name);
            let mut deps: Vec<usize> = walker
                .dependencies
                .into_iter()
                .filter(|name| Some(*name) != own_name)
                .filter_map(|name| self.symbol_to_decl.get(&name).copied())
                .collect();
            deps.sort_unstable();
            for dep in deps {
                adjacency[dep].push(index);
                in_degree[index] += 1;
            }
        }

        let mut queue: VecDeque<usize> =
            (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(current) = queue.pop_front() {
            order.push(current);
            for &dependent in &adjacency[current] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if order.len() != n {
            // Residual in-degree: keep the unsorted list.
            self.errors.push(Diagnostic::new(
                ErrorKind::ImportResolution,
                "circular dependency detected in declarations",
            ));
            return;
        }

        let mut declarations = Vec::with_capacity(n);
        let mut decl_files = Vec::with_capacity(n);
        let mut moved: Vec<Option<Decl>> =
            std::mem::take(&mut self.declarations).into_iter().map(Some).collect();
        for &index in &order {
            declarations.push(moved[index].take().expect("each index moves once"));
            decl_files.push(self.decl_files[index]);
        }
        self.declarations = declarations;
        self.decl_files = decl_files;
        log::debug!("topological sort ordered {} declarations", n);
    }
}

/// Walks one declaration collecting the top-level names it depends on,
/// tracking local scopes so parameters and locals shadow globals.
struct DependencyWalker<'a> {
    symbols: &'a FxHashMap<Symbol, usize>,
    scopes: Vec<FxHashSet<Symbol>>,
    dependencies: FxHashSet<Symbol>,
}

impl<'a> DependencyWalker<'a> {
    fn new(symbols: &'a FxHashMap<Symbol, usize>) -> Self {
        Self {
            symbols,
            scopes: vec![FxHashSet::default()],
            dependencies: FxHashSet::default(),
        }
    }

    fn in_local_scope(&self, name: Symbol) -> bool {
        self.scopes.iter().any(|scope| scope.contains(&name))
    }

    fn bind(&mut self, name: Symbol) {
        self.scopes
            .last_mut()
            .expect("walker scope stack is never empty")
            .insert(name);
    }

    fn reference(&mut self, name: Symbol) {
        if !self.in_local_scope(name) && self.symbols.contains_key(&name) {
            self.dependencies.insert(name);
        }
    }

    fn walk_decl(&mut self, decl: &Decl) {
        match decl {
            Decl::Fn(f) => {
                if let Some(ret) = &f.return_type {
                    self.walk_type(ret);
                }
                self.scopes.push(FxHashSet::default());
                for param in &f.params {
                    self.walk_type(&param.ty);
                    self.bind(param.name.name);
                }
                if let Some(body) = &f.body {
                    self.walk_block(body);
                }
                self.scopes.pop();
            }
            Decl::Struct(s) => {
                for field in &s.fields {
                    self.walk_type(&field.ty);
                }
            }
            Decl::Enum(_) => {}
            Decl::Var(v) => {
                self.walk_type(&v.ty);
                if let Some(init) = &v.initializer {
                    self.walk_expr(init);
                }
            }
            Decl::Const(c) => {
                self.walk_type(&c.ty);
                self.walk_expr(&c.value);
            }
            Decl::Let(l) => self.walk_expr(&l.initializer),
            Decl::Import { .. } => {}
            Decl::Shard { declarations, .. } => {
                for inner in declarations {
                    self.walk_decl(inner);
                }
            }
        }
    }

    fn walk_type(&mut self, ty: &TypeNode) {
        match ty {
            TypeNode::Primitive { .. } => {}
            TypeNode::Named { name } => self.reference(name.name),
            TypeNode::Pointer { pointee, .. } => self.walk_type(pointee),
            TypeNode::Array { element, .. } => self.walk_type(element),
            TypeNode::Map { key, value, .. } => {
                self.walk_type(key);
                self.walk_type(value);
            }
            TypeNode::Tuple { elements, .. } => {
                for element in elements {
                    self.walk_type(element);
                }
            }
            TypeNode::Function { params, ret, .. } => {
                for param in params {
                    self.walk_type(param);
                }
                self.walk_type(ret);
            }
            TypeNode::Generic { base, args, .. } => {
                self.reference(base.name);
                for arg in args {
                    self.walk_type(arg);
                }
            }
        }
    }

    fn walk_block(&mut self, block: &Block) {
        self.scopes.push(FxHashSet::default());
        for stmt in &block.statements {
            self.walk_stmt(stmt);
        }
        self.scopes.pop();
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(block) => self.walk_block(block),
            Stmt::If { condition, then_block, else_block, .. } => {
                self.walk_expr(condition);
                self.walk_block(then_block);
                if let Some(else_stmt) = else_block {
                    self.walk_stmt(else_stmt);
                }
            }
            Stmt::While { condition, body, .. } => {
                self.walk_expr(condition);
                self.walk_block(body);
            }
            Stmt::For { init, condition, post, body, .. } => {
                self.scopes.push(FxHashSet::default());
                if let Some(init) = init {
                    self.walk_stmt(init);
                }
                if let Some(condition) = condition {
                    self.walk_expr(condition);
                }
                if let Some(post) = post {
                    self.walk_stmt(post);
                }
                self.walk_block(body);
                self.scopes.pop();
            }
            Stmt::Return { values, .. } => {
                for value in values {
                    self.walk_expr(value);
                }
            }
            Stmt::Break { .. } | Stmt::Continue { .. } => {}
            Stmt::Defer { body, .. } => self.walk_stmt(body),
            Stmt::Match { scrutinee, arms, .. } => {
                self.walk_expr(scrutinee);
                for arm in arms {
                    if let Some(pattern) = &arm.pattern {
                        self.walk_expr(pattern);
                    }
                    self.walk_block(&arm.body);
                }
            }
            Stmt::Assign { target, value, .. } => {
                self.walk_expr(target);
                self.walk_expr(value);
            }
            Stmt::Var(v) => {
                self.walk_type(&v.ty);
                if let Some(init) = &v.initializer {
                    self.walk_expr(init);
                }
                self.bind(v.name.name);
            }
            Stmt::Const(c) => {
                self.walk_type(&c.ty);
                self.walk_expr(&c.value);
                self.bind(c.name.name);
            }
            Stmt::Let(l) => {
                self.walk_expr(&l.initializer);
                self.bind(l.name.name);
            }
            Stmt::Expr(expr) => self.walk_expr(expr),
        }
    }

    fn walk_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Identifier(id) => self.reference(id.name),
            Expr::Binary { lhs, rhs, .. } => {
                self.walk_expr(lhs);
                self.walk_expr(rhs);
            }
            Expr::Unary { operand, .. } => self.walk_expr(operand),
            Expr::Cast { expr, target, .. } => {
                self.walk_expr(expr);
                self.walk_type(target);
            }
            Expr::Call { callee, args, .. } => {
                self.walk_expr(callee);
                for arg in args {
                    self.walk_expr(arg);
                }
            }
            Expr::Index { object, index, .. } => {
                self.walk_expr(object);
                self.walk_expr(index);
            }
            Expr::Member { object, .. } => self.walk_expr(object),
            Expr::Literal { .. } => {}
            Expr::ArrayLiteral { elements, .. } => {
                for element in elements {
                    self.walk_expr(element);
                }
            }
            Expr::StructLiteral { name, fields, .. } => {
                self.reference(name.name);
                for field in fields {
                    self.walk_expr(&field.value);
                }
            }
            Expr::Lambda(lambda) => {
                self.scopes.push(FxHashSet::default());
                for param in &lambda.params {
                    self.walk_type(&param.ty);
                    self.bind(param.name.name);
                }
                self.walk_block(&lambda.body);
                self.scopes.pop();
            }
            Expr::TypeParam { ty, .. } => self.walk_type(ty),
        }
    }
}
