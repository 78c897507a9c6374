//! ANSI color helpers for listings and host-tagged output.

pub fn red(input: &str) -> String {
    format!("\x1b[31m{}\x1b[0m", input)
}

pub fn green(input: &str) -> String {
    format!("\x1b[32m{}\x1b[0m", input)
}

pub fn yellow(input: &str) -> String {
    format!("\x1b[33m{}\x1b[0m", input)
}

pub fn blue(input: &str) -> String {
    format!("\x1b[34m{}\x1b[0m", input)
}

/// Right-align `key` to `width` columns.
pub fn pad_left(key: &str, width: usize) -> String {
    format!("{:>width$}", key, width = width)
}

/// Left-align `name` to `width` columns.
pub fn pad_right(name: &str, width: usize) -> String {
    let pad = width.saturating_sub(name.len());
    format!("{}{}", name, " ".repeat(pad))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding() {
        assert_eq!(pad_left("A", 3), "  A");
        assert_eq!(pad_left("LONG", 2), "LONG");
        assert_eq!(pad_right("ab", 4), "ab  ");
    }
}
