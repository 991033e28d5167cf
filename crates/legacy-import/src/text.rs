//! Text normalization for legacy string data.
//!
//! Legacy origins carry inconsistent whitespace, stray control characters
//! and pre-UTF-8 artifacts. These helpers are applied when string
//! attributes are coerced into persistable payloads.

/// Strip control characters (except newline and tab) and trim surrounding
/// whitespace.
pub fn clean(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Collapse runs of spaces and tabs into single spaces, preserving line
/// breaks.
pub fn normalize_whitespace(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_gap = false;
    for c in value.chars() {
        if c == ' ' || c == '\t' {
            if !in_gap {
                out.push(' ');
            }
            in_gap = true;
        } else {
            in_gap = false;
            out.push(c);
        }
    }
    out.trim().to_string()
}

/// Normalize a redirect alias: trimmed, without a leading slash.
pub fn normalize_redirect(alias: &str) -> String {
    clean(alias).trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_strips_controls_and_trims() {
        assert_eq!(clean("  hello\u{0000} world \r"), "hello world");
        assert_eq!(clean("line\nbreak"), "line\nbreak");
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("a   b\t\tc"), "a b c");
        assert_eq!(normalize_whitespace("a\nb"), "a\nb");
    }

    #[test]
    fn test_normalize_redirect() {
        assert_eq!(normalize_redirect("/old/path"), "old/path");
        assert_eq!(normalize_redirect("  /old "), "old");
    }
}
