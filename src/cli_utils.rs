/// CLI utilities for consistent output formatting
use std::io::IsTerminal;

/// Get a colored prefix
///
/// Returns bright cyan if stderr is a TTY, plain text otherwise.
pub fn galaxy_prefix() -> &'static str {
    if std::io::stderr().is_terminal() {
        // Bright cyan for the entire prefix
        "\x1b[96m[galaxy]\x1b[0m"
    } else {
        "[galaxy]"
    }
}

/// Print a status line on stderr with the galaxy prefix
pub fn status(message: impl std::fmt::Display) {
    eprintln!("{} {}", galaxy_prefix(), message);
}
