//! ANSI terminal styling for diagnostic output.
//!
//! Bare escape-code wrappers; whether color is appropriate at all (TTY
//! detection, `NO_COLOR`) is decided by the diagnostic reporter, not here.

/// ANSI escape code styling utilities.
pub struct Style;

impl Style {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";
    pub const RED: &'static str = "\x1b[31m";
    pub const YELLOW: &'static str = "\x1b[33m";
    pub const CYAN: &'static str = "\x1b[36m";

    pub fn red(s: &str) -> String {
        format!("{}{}{}", Self::RED, s, Self::RESET)
    }

    pub fn yellow(s: &str) -> String {
        format!("{}{}{}", Self::YELLOW, s, Self::RESET)
    }

    pub fn cyan(s: &str) -> String {
        format!("{}{}{}", Self::CYAN, s, Self::RESET)
    }

    pub fn bold(s: &str) -> String {
        format!("{}{}{}", Self::BOLD, s, Self::RESET)
    }

    pub fn bold_red(s: &str) -> String {
        format!("{}{}{}{}", Self::BOLD, Self::RED, s, Self::RESET)
    }

    pub fn bold_yellow(s: &str) -> String {
        format!("{}{}{}{}", Self::BOLD, Self::YELLOW, s, Self::RESET)
    }

    pub fn bold_cyan(s: &str) -> String {
        format!("{}{}{}{}", Self::BOLD, Self::CYAN, s, Self::RESET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn red_wraps_and_resets() {
        let out = Style::red("error");
        assert!(out.starts_with("\x1b[31m"));
        assert!(out.ends_with("\x1b[0m"));
        assert!(out.contains("error"));
    }

    #[test]
    fn bold_red_combines_codes() {
        let out = Style::bold_red("error");
        assert!(out.contains("\x1b[1m"));
        assert!(out.contains("\x1b[31m"));
    }
}
