//! Turkish-aware text folding shared by the summarizer, categorizer and query filter.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{L}+").expect("word regex"));

/// Lowercase with Turkish dotted/dotless I rules applied first.
///
/// Plain `to_lowercase` maps `İ` to `i̇` (with a combining dot) and `I` to `i`,
/// both wrong for Turkish text.
pub fn fold(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            'İ' => out.push('i'),
            'I' => out.push('ı'),
            c => out.extend(c.to_lowercase()),
        }
    }
    out
}

/// Letter-only words of an already folded string.
pub fn words(folded: &str) -> impl Iterator<Item = &str> {
    RE_WORD.find_iter(folded).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_handles_dotted_and_dotless_i() {
        assert_eq!(fold("İSTANBUL"), "istanbul");
        assert_eq!(fold("IRMAK"), "ırmak");
        assert_eq!(fold("Dolar & Borsa"), "dolar & borsa");
    }

    #[test]
    fn words_skip_digits_and_punctuation() {
        let f = fold("Merkez Bankası faizi %45'e çıkardı!");
        let w: Vec<&str> = words(&f).collect();
        assert_eq!(w, vec!["merkez", "bankası", "faizi", "e", "çıkardı"]);
    }
}
