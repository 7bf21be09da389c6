use unicode_normalization::UnicodeNormalization;

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
    )
}

/// Canonical form of raw user input: trimmed, with zero-width characters
/// removed, NFC-composed.
#[must_use]
pub fn normalize(raw: &str) -> String {
    // strip before composing so marks separated by a zero-width char still join
    let composed: String = raw
        .trim()
        .chars()
        .filter(|c| !is_invisible(*c))
        .nfc()
        .collect();
    composed.trim().to_owned()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn trims_whitespace() {
        assert_eq!(normalize("  list files \n"), "list files");
    }

    #[test]
    fn composes_to_nfc() {
        // "e" + combining acute accent
        assert_eq!(normalize("caf\u{0065}\u{0301}"), "caf\u{00E9}");
    }

    #[test]
    fn strips_zero_width_characters() {
        assert_eq!(normalize("del\u{200B}ete te\u{FEFF}mp"), "delete temp");
        assert_eq!(normalize("\u{200B} list"), "list");
    }

    #[test]
    fn zero_width_between_base_and_mark_is_composed() {
        assert_eq!(normalize("e\u{200B}\u{0301}"), "\u{00E9}");
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("\u{200B}"), "");
    }

    proptest! {
        #[test]
        fn idempotent(input in "\\PC{0,64}") {
            let once = normalize(&input);
            prop_assert_eq!(normalize(&once), once);
        }
    }
}
