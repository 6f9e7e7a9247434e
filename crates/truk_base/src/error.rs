//! The shared diagnostic model.
//!
//! Every phase of the pipeline — parse, import resolution, type check,
//! emission — accumulates [`Diagnostic`]s into a vector and returns. Nothing
//! unwinds across a phase boundary; a phase whose predecessor produced
//! errors is simply not invoked.
//!
//! A diagnostic optionally carries an anchor into the source: the byte
//! `source_index` plus the 1-based line/column derived from it. Anchored
//! diagnostics render with a caret-underlined source extract; unanchored
//! ones (a missing file, a cycle spanning several files) render the header
//! line only.

use std::fmt;
use std::path::PathBuf;

/// The closed set of diagnostic categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    ImportResolution,
    TypeCheck,
    Emission,
    FileIo,
    /// Reserved for the downstream C toolchain; never produced by the core.
    CCompilation,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Parse => "parse",
            ErrorKind::ImportResolution => "import-resolution",
            ErrorKind::TypeCheck => "type-check",
            ErrorKind::Emission => "emission",
            ErrorKind::FileIo => "file-io",
            ErrorKind::CCompilation => "c-compilation",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One error (or warning) observed by a pipeline phase.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    /// File the error originated in, when known.
    pub file: Option<PathBuf>,
    /// 1-based line, when the error has a source anchor.
    pub line: Option<usize>,
    /// 1-based column, when the error has a source anchor.
    pub column: Option<usize>,
    /// Byte offset into the originating file, when anchored.
    pub source_index: Option<usize>,
}

impl Diagnostic {
    /// A diagnostic with no source anchor.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file: None,
            line: None,
            column: None,
            source_index: None,
        }
    }

    /// Attaches the originating file.
    pub fn in_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Attaches a line/column anchor.
    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Attaches the byte offset anchor.
    pub fn at_index(mut self, source_index: usize) -> Self {
        self.source_index = Some(source_index);
        self
    }

    /// `true` when the diagnostic can point into source text.
    pub fn has_anchor(&self) -> bool {
        self.line.is_some() && self.column.is_some()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)?;
        if let Some(file) = &self.file {
            write!(f, " ({}", file.display())?;
            if let (Some(line), Some(col)) = (self.line, self.column) {
                write!(f, ":{}:{}", line, col)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}
