//! Diagnostic rendering with source extracts.
//!
//! An anchored diagnostic renders as three parts: the severity header, the
//! `-->` location cursor, and a caret-underlined extract of the offending
//! source line with one line of context on either side:
//!
//! ```text
//! error: if condition must be bool, got i32
//!   --> examples/bad.truk:2:6
//!    |
//!  1 | fn main(): void {
//!  2 |   if 42 { }
//!    |      ^
//!  3 | }
//!    |
//! ```
//!
//! Diagnostics without an anchor print the header only. Color is applied
//! when stderr is a terminal and `NO_COLOR` is unset; tabs expand to four
//! columns and multi-byte UTF-8 sequences count one column for caret
//! placement.

use std::io::IsTerminal;

use truk_base::location::{expand_tabs, split_lines, visual_column};
use truk_base::{locate, Diagnostic, Style};

/// Severity of a rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        }
    }

    fn colored_label(self) -> String {
        match self {
            Severity::Error => Style::bold_red(self.label()),
            Severity::Warning => Style::bold_yellow(self.label()),
            Severity::Note => Style::bold_cyan(self.label()),
        }
    }
}

/// Renders diagnostics to strings; printing is the caller's business.
pub struct Reporter {
    use_color: bool,
    context_before: usize,
    context_after: usize,
}

impl Reporter {
    /// Color on iff stderr is a TTY and `NO_COLOR` is unset or empty.
    pub fn new() -> Self {
        let no_color = std::env::var("NO_COLOR").map(|v| !v.is_empty()).unwrap_or(false);
        Self {
            use_color: std::io::stderr().is_terminal() && !no_color,
            context_before: 1,
            context_after: 1,
        }
    }

    /// Forces color on or off, for tests and `--color` flags.
    pub fn with_color(use_color: bool) -> Self {
        Self { use_color, context_before: 1, context_after: 1 }
    }

    /// Renders one diagnostic, with a source extract when `source` is the
    /// text of the diagnostic's file and the diagnostic is anchored.
    pub fn render(&self, diag: &Diagnostic, source: Option<&str>) -> String {
        self.render_with_severity(diag, source, Severity::Error)
    }

    pub fn render_warning(&self, message: &str) -> String {
        let label = if self.use_color {
            Severity::Warning.colored_label()
        } else {
            Severity::Warning.label().to_string()
        };
        format!("{}: {}\n", label, message)
    }

    pub fn render_with_severity(
        &self,
        diag: &Diagnostic,
        source: Option<&str>,
        severity: Severity,
    ) -> String {
        let mut out = String::new();

        let label = if self.use_color {
            severity.colored_label()
        } else {
            severity.label().to_string()
        };
        out.push_str(&format!("{}: {}\n", label, diag.message));

        // An index-only anchor resolves to line/column against the source.
        let position = match (diag.line, diag.column) {
            (Some(line), Some(column)) => Some((line, column)),
            _ => match (diag.source_index, source) {
                (Some(index), Some(text)) => {
                    let loc = locate(text, index);
                    Some((loc.line, loc.column))
                }
                _ => None,
            },
        };

        let Some((line, column)) = position else {
            return out;
        };

        if let Some(file) = &diag.file {
            let cursor = format!("  --> {}:{}:{}", file.display(), line, column);
            if self.use_color {
                out.push_str(&Style::bold_cyan("  --> "));
                out.push_str(&format!("{}:{}:{}\n", file.display(), line, column));
            } else {
                out.push_str(&cursor);
                out.push('\n');
            }
        }

        if let Some(source) = source {
            out.push_str(&self.render_extract(source, line, column));
        }

        out
    }

    fn gutter(&self, text: &str, width: usize) -> String {
        let cell = format!("{:>width$} | ", text, width = width);
        if self.use_color {
            Style::bold_cyan(&cell)
        } else {
            cell
        }
    }

    fn render_extract(&self, source: &str, line: usize, column: usize) -> String {
        let lines = split_lines(source);
        if line == 0 || line > lines.len() {
            return String::new();
        }

        let start = line.saturating_sub(self.context_before + 1);
        let end = (line + self.context_after).min(lines.len());
        let width = end.to_string().len();

        let mut out = String::new();
        out.push_str(&self.gutter("", width));
        out.push('\n');

        for (i, text) in lines.iter().enumerate().take(end).skip(start) {
            let number = i + 1;
            out.push_str(&self.gutter(&number.to_string(), width));
            out.push_str(&expand_tabs(text));
            out.push('\n');

            if number == line {
                out.push_str(&self.gutter("", width));
                let visual = visual_column(text, column.saturating_sub(1));
                for _ in 0..visual {
                    out.push(' ');
                }
                if self.use_color {
                    out.push_str(&Style::bold_red("^"));
                } else {
                    out.push('^');
                }
                out.push('\n');
            }
        }

        out.push_str(&self.gutter("", width));
        out.push('\n');
        out
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use truk_base::ErrorKind;

    fn anchored(message: &str, line: usize, column: usize) -> Diagnostic {
        Diagnostic::new(ErrorKind::TypeCheck, message)
            .in_file("main.truk")
            .at(line, column)
    }

    #[test]
    fn header_only_without_anchor() {
        let reporter = Reporter::with_color(false);
        let diag = Diagnostic::new(ErrorKind::FileIo, "failed to read 'x.truk'");
        let rendered = reporter.render(&diag, None);
        assert_eq!(rendered, "error: failed to read 'x.truk'\n");
    }

    #[test]
    fn three_part_rendering_with_caret() {
        let reporter = Reporter::with_color(false);
        let source = "fn main(): void {\n  if 42 { }\n}";
        let diag = anchored("if condition must be bool, got untyped integer", 2, 6);
        let rendered = reporter.render(&diag, Some(source));

        assert!(rendered.starts_with("error: if condition must be bool"));
        assert!(rendered.contains("--> main.truk:2:6"));
        assert!(rendered.contains("2 |   if 42 { }"));
        // Caret under column 6.
        let caret_line = rendered
            .lines()
            .find(|l| l.trim_end().ends_with('^'))
            .expect("caret line");
        assert_eq!(caret_line.find('^').unwrap() - caret_line.find('|').unwrap(), 7);
    }

    #[test]
    fn caret_respects_tabs() {
        let reporter = Reporter::with_color(false);
        let source = "\tif 42 { }";
        let diag = anchored("bad", 1, 5);
        let rendered = reporter.render(&diag, Some(source));
        // The tab expands to four spaces; byte column 5 lands after "if ".
        assert!(rendered.contains("1 |     if 42 { }"));
    }

    #[test]
    fn index_anchor_resolves_against_source() {
        let reporter = Reporter::with_color(false);
        let source = "ab\ncd";
        let diag = Diagnostic::new(ErrorKind::Parse, "boom")
            .in_file("x.truk")
            .at_index(3);
        let rendered = reporter.render(&diag, Some(source));
        assert!(rendered.contains("x.truk:2:1"));
    }

    #[test]
    fn color_wraps_severity() {
        let reporter = Reporter::with_color(true);
        let diag = Diagnostic::new(ErrorKind::TypeCheck, "nope");
        let rendered = reporter.render(&diag, None);
        assert!(rendered.contains("\x1b[31m"));
        assert!(rendered.contains("\x1b[0m"));
    }

    #[test]
    fn out_of_range_line_prints_header_and_cursor_only() {
        let reporter = Reporter::with_color(false);
        let diag = anchored("bad", 99, 1);
        let rendered = reporter.render(&diag, Some("one line"));
        assert!(rendered.contains("error: bad"));
        assert!(!rendered.contains('^'));
    }
}
