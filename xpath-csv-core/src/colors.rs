//! ANSI color support for terminal output

/// ANSI color codes
pub mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";
    pub const CYAN: &str = "\x1b[36m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const GREEN: &str = "\x1b[32m";
    pub const RED: &str = "\x1b[31m";
}

/// Determine if color should be used based on mode and environment
pub fn should_use_color(mode: &str) -> bool {
    match mode {
        "always" => true,
        "never" => false,
        _ => {
            // Auto mode: stdout is a tty and NO_COLOR is not set
            atty::is(atty::Stream::Stdout) && std::env::var("NO_COLOR").is_err()
        }
    }
}

/// Wrap `text` in `color` when `use_color` is set
pub fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, ansi::RESET)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_modes() {
        assert!(should_use_color("always"));
        assert!(!should_use_color("never"));
    }

    #[test]
    fn test_paint() {
        assert_eq!(paint("x", ansi::CYAN, false), "x");
        assert_eq!(paint("x", ansi::CYAN, true), "\x1b[36mx\x1b[0m");
    }
}
