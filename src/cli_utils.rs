/// CLI utilities for consistent output formatting
use std::io::IsTerminal;

/// Get a colored prefix
///
/// Returns bright cyan if stderr is a TTY, plain text otherwise.
pub fn polybuild_prefix() -> &'static str {
    if std::io::stderr().is_terminal() {
        "\x1b[96m[polybuild]\x1b[0m"
    } else {
        "[polybuild]"
    }
}

/// Megabytes with two decimals, as shown by `cache stats`.
pub fn format_size(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1_000_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.00 MB");
        assert_eq!(format_size(2_500_000), "2.50 MB");
    }
}
