//! Element text cleaning.

/// Mis-decoded byte sequences and legacy code points mapped to the intended
/// quote characters.
const QUOTE_REPLACEMENTS: &[(&str, &str)] = &[
    ("\u{e2}\u{80}\u{99}", "\u{2019}"),
    ("\u{e2}\u{80}\u{98}", "\u{2018}"),
    ("\u{e2}\u{80}\u{9c}", "\u{201c}"),
    ("\u{e2}\u{80}\u{9d}", "\u{201d}"),
    ("\u{91}", "\u{2018}"),
    ("\u{92}", "\u{2019}"),
    ("\u{93}", "\u{201c}"),
    ("\u{94}", "\u{201d}"),
    ("&apos;", "'"),
    ("&quot;", "\""),
];

/// Replace mis-encoded quotes with proper unicode quotes.
#[must_use]
pub fn replace_unicode_quotes(text: &str) -> String {
    QUOTE_REPLACEMENTS
        .iter()
        .fold(text.to_string(), |acc, (from, to)| acc.replace(from, to))
}

/// Turn newlines and non-breaking spaces into spaces, collapse runs of
/// spaces and trim.
#[must_use]
pub fn clean_extra_whitespace(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut previous_space = false;

    for c in text.chars() {
        let c = if matches!(c, '\n' | '\u{a0}') { ' ' } else { c };
        if c == ' ' {
            if previous_space {
                continue;
            }
            previous_space = true;
        } else {
            previous_space = false;
        }
        cleaned.push(c);
    }

    cleaned.trim().to_string()
}

/// Full cleaning pass applied to every element before chunking.
#[must_use]
pub fn clean_text(text: &str) -> String {
    clean_extra_whitespace(&replace_unicode_quotes(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace() {
        assert_eq!(
            clean_extra_whitespace("  Hola\n\nmundo\u{a0}\u{a0}  cruel "),
            "Hola mundo cruel"
        );
        assert_eq!(clean_extra_whitespace("\t tab"), "tab");
    }

    #[test]
    fn test_quotes() {
        assert_eq!(
            replace_unicode_quotes("\u{93}cita\u{94} y l\u{92}autre"),
            "\u{201c}cita\u{201d} y l\u{2019}autre"
        );
        assert_eq!(replace_unicode_quotes("it&apos;s"), "it's");
        assert_eq!(
            replace_unicode_quotes("don\u{e2}\u{80}\u{99}t"),
            "don\u{2019}t"
        );
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text(" \u{93}A\u{94}\n B "), "\u{201c}A\u{201d} B");
    }
}
