//! Text normalization for matching user-supplied values against stored text.
//!
//! Arabic script is the hard case: the same word can be typed with or
//! without diacritics, with any of four alef forms, with hamza on a waw
//! or yeh carrier, and with tatweel stretching. Matching happens on the normalized form of both sides.

const TATWEEL: char = '\u{0640}';
const BARE_ALEF: char = '\u{0627}';
const HAMZA: char = '\u{0621}';

fn is_arabic_diacritic(c: char) -> bool {
    matches!(c, '\u{064B}'..='\u{065F}' | '\u{0670}')
}

fn is_alef_variant(c: char) -> bool {
    // إ أ آ
    matches!(c, '\u{0625}' | '\u{0623}' | '\u{0622}')
}

fn is_hamza_carrier(c: char) -> bool {
    // ؤ ئ
    matches!(c, '\u{0624}' | '\u{0626}')
}

fn is_arabic_char(c: char) -> bool {
    matches!(c, '\u{0600}'..='\u{06FF}')
}

/// Normalize text for comparison.
///
/// Strips Arabic diacritics and tatweel, folds alef variants to bare alef
/// and hamza carriers to bare hamza, lowercases, and collapses whitespace runs to a single space.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if c == TATWEEL || is_arabic_diacritic(c) {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        if is_alef_variant(c) {
            out.push(BARE_ALEF);
        } else if is_hamza_carrier(c) {
            out.push(HAMZA);
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Normalize a hashtag: trim, ensure a single leading `#`, normalize text.
pub fn normalize_hashtag(tag: &str) -> String {
    let body = tag.trim().trim_start_matches('#');
    format!("#{}", normalize_text(body))
}

/// True when at least `threshold` of the letters are Arabic script.
pub fn is_arabic_text(text: &str, threshold: f32) -> bool {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return false;
    }
    let arabic = letters.iter().filter(|c| is_arabic_char(**c)).count();
    arabic as f32 / letters.len() as f32 >= threshold
}

/// `*`-wildcard match. Both sides are normalized first.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern = normalize_text(pattern);
    let text = normalize_text(text);
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut rest = text.as_str();
    let last = parts.len() - 1;
    for (idx, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if idx == 0 {
            match rest.strip_prefix(part) {
                Some(tail) => rest = tail,
                None => return false,
            }
        } else if idx == last {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_diacritics_and_tatweel() {
        // "مُحَمَّد" with harakat, and with a tatweel
        assert_eq!(normalize_text("مُحَمَّد"), "محمد");
        assert_eq!(normalize_text("مـحمد"), "محمد");
    }

    #[test]
    fn test_folds_alef_variants() {
        assert_eq!(normalize_text("أحمد"), normalize_text("احمد"));
        assert_eq!(normalize_text("إسلام"), "اسلام");
        assert_eq!(normalize_text("آمن"), "امن");
    }

    #[test]
    fn test_folds_hamza_carriers() {
        assert_eq!(normalize_text("مسؤول"), normalize_text("مسئول"));
        assert_eq!(normalize_text("مسؤول"), "مسءول");
        assert!(wildcard_match("*#مسؤول*", "خبر #مسئول"));
    }

    #[test]
    fn test_collapses_whitespace_and_lowercases() {
        assert_eq!(normalize_text("  Hello \t  World \n"), "hello world");
    }

    #[test]
    fn test_normalize_hashtag() {
        assert_eq!(normalize_hashtag("Oman"), "#oman");
        assert_eq!(normalize_hashtag("  ##Oman "), "#oman");
        assert_eq!(normalize_hashtag("#عُمان"), "#عمان");
    }

    #[test]
    fn test_is_arabic_text() {
        assert!(is_arabic_text("السلطان هيثم", 0.3));
        assert!(!is_arabic_text("hello world", 0.3));
        assert!(!is_arabic_text("1234", 0.3));
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("*#oman*", "Visiting #Oman today"));
        assert!(wildcard_match("#oman*", "#oman rocks"));
        assert!(!wildcard_match("#oman*", "go #oman"));
        assert!(wildcard_match("*today", "visiting today"));
        assert!(wildcard_match("a*c*e", "abcde"));
        assert!(wildcard_match("exact", "EXACT"));
        assert!(wildcard_match("*#عمان*", "زيارة #عُمان"));
    }
}
