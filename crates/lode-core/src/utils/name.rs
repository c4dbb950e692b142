//! Package name validation and normalization.

/// Normalize a package name: lowercase, with runs of `-`, `_` and `.`
/// collapsed to a single `-`
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut pending_separator = false;

    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            pending_separator = true;
            continue;
        }
        if pending_separator && !normalized.is_empty() {
            normalized.push('-');
        }
        pending_separator = false;
        normalized.push(c.to_ascii_lowercase());
    }

    normalized
}

/// Check that a name is ASCII alphanumeric with inner `-`, `_`, `.`
pub fn is_valid_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes
                    .iter()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Requests"), "requests");
        assert_eq!(normalize_name("zope.interface"), "zope-interface");
        assert_eq!(normalize_name("Foo__Bar-.baz"), "foo-bar-baz");
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("requests"));
        assert!(is_valid_name("zope.interface"));
        assert!(is_valid_name("a"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("-leading"));
        assert!(!is_valid_name("trailing_"));
        assert!(!is_valid_name("has space"));
    }
}
