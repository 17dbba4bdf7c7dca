//! Numeric extraction from instrument replies.
//!
//! Vacuum controllers answer in loosely structured text ("PZ 1.23E-08mbar",
//! "P = 5.4e-9, I = 0.2"). Rather than one grammar per controller model, the
//! engines pull every number out of the reply and let the caller pick.

use std::sync::LazyLock;

use regex::Regex;

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"[+-]?[0-9]+(?:\.[0-9]+)?(?:[Ee][+-]?[0-9]+)?").expect("valid regex")
});

static ORDINAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\[([0-9]+)\]").expect("valid regex")
});

/// Every number found in `raw`, in order of appearance.
///
/// Scientific notation is recognised; tokens that do not parse as `f64`
/// (out-of-range exponents) are skipped.
pub fn extract_numbers(raw: &str) -> Vec<f64> {
    NUMBER_RE
        .find_iter(raw)
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

/// First number found in `raw`, if any.
pub fn first_number(raw: &str) -> Option<f64> {
    NUMBER_RE
        .find_iter(raw)
        .find_map(|m| m.as_str().parse().ok())
}

/// Ordinal of a channel name, taken from its last bracketed index.
///
/// `"P1[2]"` yields 2; a name without brackets yields 0 (scalar channel).
pub fn channel_ordinal(name: &str) -> usize {
    ORDINAL_RE
        .captures_iter(name)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Channel name with any bracketed index removed.
///
/// `"P1[2]"` yields `"P1"`; a plain name is returned unchanged.
pub fn channel_base(name: &str) -> &str {
    match name.find('[') {
        Some(idx) => &name[..idx],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_scientific_notation() {
        assert_eq!(extract_numbers("P=1.5e-9 mbar"), vec![1.5e-9]);
        assert_eq!(extract_numbers("PZ 1.23E-08mbar"), vec![1.23e-8]);
    }

    #[test]
    fn test_extracts_multiple_numbers_in_order() {
        assert_eq!(
            extract_numbers("P = 5.4e-9, I = 0.2, V = -3500"),
            vec![5.4e-9, 0.2, -3500.0]
        );
    }

    #[test]
    fn test_no_numbers_yields_empty() {
        assert!(extract_numbers("no numbers here").is_empty());
        assert_eq!(first_number("error"), None);
    }

    #[test]
    fn test_first_number() {
        assert_eq!(first_number("ch2: 7.5e-10"), Some(2.0));
        assert_eq!(first_number("+12.5"), Some(12.5));
    }

    #[test]
    fn test_channel_ordinal() {
        assert_eq!(channel_ordinal("P1[2]"), 2);
        assert_eq!(channel_ordinal("Pressures[0]"), 0);
        assert_eq!(channel_ordinal("P1"), 0);
        assert_eq!(channel_ordinal("a[1]b[3]"), 3);
    }

    #[test]
    fn test_channel_base() {
        assert_eq!(channel_base("P1[2]"), "P1");
        assert_eq!(channel_base("Pressure"), "Pressure");
    }
}
