//! The pipeline driver: resolve → check → emit → assemble.
//!
//! Each phase accumulates diagnostics; a phase whose predecessor failed is
//! not invoked, and the output carries everything observed so far plus the
//! file table needed to render source extracts.

use std::path::{Path, PathBuf};

use truk_base::{locate, Diagnostic, ErrorKind, Interner};

use crate::analysis::check::{check_program, TypeError};
use crate::codegen_c::{self, Assembly, EmitError, Metadata};
use crate::resolver::{ImportResolver, ResolvedProgram, SourceFile};

pub use crate::codegen_c::AssemblyKind;

/// What to build and where to look for imports.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub search_paths: Vec<PathBuf>,
    pub assembly: AssemblyKind,
    /// Basename for the generated header in library mode.
    pub header_name: Option<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            assembly: AssemblyKind::Application,
            header_name: None,
        }
    }
}

/// Everything a driver needs to print results and write outputs.
#[derive(Debug)]
pub struct CompileOutput {
    pub diagnostics: Vec<Diagnostic>,
    pub warnings: Vec<String>,
    pub assembly: Option<Assembly>,
    pub metadata: Option<Metadata>,
    /// Canonical path and text of every file read, for diagnostic extracts.
    pub files: Vec<SourceFile>,
}

impl CompileOutput {
    pub fn success(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// The source text of the file a diagnostic points into, if read.
    pub fn source_for(&self, diag: &Diagnostic) -> Option<&str> {
        let file = diag.file.as_deref()?;
        self.files
            .iter()
            .find(|f| f.path == file)
            .map(|f| f.source.as_str())
    }
}

/// Runs the full pipeline on an entry file.
pub fn compile_file(entry: &Path, options: &CompileOptions) -> CompileOutput {
    let mut interner = Interner::new();
    let resolver = ImportResolver::new(&mut interner, options.search_paths.clone());
    let program = resolver.resolve(entry);

    if !program.success() {
        return CompileOutput {
            diagnostics: program.errors,
            warnings: Vec::new(),
            assembly: None,
            metadata: None,
            files: program.files,
        };
    }
    log::debug!(
        "resolved {} declarations from {} files",
        program.declarations.len(),
        program.files.len()
    );

    let (registry, type_errors) = check_program(&program.declarations, &program.c_imports, &interner);
    if !type_errors.is_empty() {
        let diagnostics = type_errors
            .iter()
            .map(|e| type_error_to_diagnostic(e, &program))
            .collect();
        return CompileOutput {
            diagnostics,
            warnings: Vec::new(),
            assembly: None,
            metadata: None,
            files: program.files,
        };
    }
    log::debug!("type check passed");

    let mut result = codegen_c::emit_program(
        &program.declarations,
        &program.c_imports,
        &registry,
        &interner,
    );
    // Shards flatten during resolution, so the emitter never sees their
    // nodes; the resolver's per-file map carries the names instead.
    let mut shard_names: Vec<String> = program
        .file_shards
        .values()
        .flatten()
        .map(|sym| interner.resolve(*sym).to_string())
        .collect();
    shard_names.sort();
    result.metadata.shards.extend(shard_names);
    if result.has_errors() {
        let diagnostics = result
            .errors
            .iter()
            .map(|e| emit_error_to_diagnostic(e, &program))
            .collect();
        return CompileOutput {
            diagnostics,
            warnings: result.warnings,
            assembly: None,
            metadata: Some(result.metadata),
            files: program.files,
        };
    }

    let assembly = match result.assemble(options.assembly, options.header_name.as_deref()) {
        Ok(assembly) => Some(assembly),
        Err(message) => {
            return CompileOutput {
                diagnostics: vec![Diagnostic::new(ErrorKind::Emission, message)],
                warnings: result.warnings,
                assembly: None,
                metadata: Some(result.metadata),
                files: program.files,
            };
        }
    };

    CompileOutput {
        diagnostics: Vec::new(),
        warnings: result.warnings,
        assembly,
        metadata: Some(result.metadata),
        files: program.files,
    }
}

/// Resolves and type-checks without emitting.
pub fn check_file(entry: &Path, search_paths: Vec<PathBuf>) -> CompileOutput {
    let mut interner = Interner::new();
    let resolver = ImportResolver::new(&mut interner, search_paths);
    let program = resolver.resolve(entry);

    if !program.success() {
        return CompileOutput {
            diagnostics: program.errors,
            warnings: Vec::new(),
            assembly: None,
            metadata: None,
            files: program.files,
        };
    }

    let (_, type_errors) = check_program(&program.declarations, &program.c_imports, &interner);
    let diagnostics = type_errors
        .iter()
        .map(|e| type_error_to_diagnostic(e, &program))
        .collect();
    CompileOutput {
        diagnostics,
        warnings: Vec::new(),
        assembly: None,
        metadata: None,
        files: program.files,
    }
}

fn anchor(message: &str, kind: ErrorKind, source_index: usize, decl_index: usize, program: &ResolvedProgram) -> Diagnostic {
    let mut diag = Diagnostic::new(kind, message).at_index(source_index);
    if let Some(file) = program.file_of(decl_index) {
        let loc = locate(&file.source, source_index);
        diag = diag.in_file(&file.path).at(loc.line, loc.column);
    }
    diag
}

fn type_error_to_diagnostic(error: &TypeError, program: &ResolvedProgram) -> Diagnostic {
    anchor(&error.message, ErrorKind::TypeCheck, error.source_index, error.decl_index, program)
}

fn emit_error_to_diagnostic(error: &EmitError, program: &ResolvedProgram) -> Diagnostic {
    anchor(&error.message, ErrorKind::Emission, error.source_index, error.decl_index, program)
}
