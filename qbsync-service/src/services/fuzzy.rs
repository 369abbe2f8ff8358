//! Pure string-similarity primitives and structured-code helpers.
//!
//! Everything here is deterministic and total: malformed input yields 0 or
//! an empty value, never an error.

use once_cell::sync::Lazy;
use regex::Regex;

static ORG_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})(?:\s|$)").expect("invalid org code regex"));
static SUB_CUSTOMER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}(?:\s|$)").expect("invalid sub-customer regex"));
static ORG_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}(?:-\d{2})?\s*").expect("invalid org prefix regex"));

/// Lowercase, trim, strip diacritics, replace non-word characters with
/// spaces, collapse whitespace.
pub fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.trim().to_lowercase().chars() {
        let folded = fold_diacritic(c);
        if folded.is_alphanumeric() {
            out.push(folded);
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fold common Latin diacritics onto their base letter.
fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        'æ' => 'a',
        'œ' => 'o',
        _ => c,
    }
}

/// Classic dynamic-programming edit distance (insert/delete/substitute,
/// each cost 1) over the raw character sequences.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Edit-distance similarity over normalized strings, in [0, 1]. Two empty
/// strings are identical (1.0); one empty and one not share nothing (0.0).
pub fn string_similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    1.0 - edit_distance(&a, &b) as f64 / max_len as f64
}

/// Jaccard index over the sets of whitespace-separated normalized tokens.
pub fn token_similarity(a: &str, b: &str) -> f64 {
    use std::collections::HashSet;

    let a = normalize(a);
    let b = normalize(b);
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();

    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// Blend of edit-distance and token-set similarity.
pub fn combined_similarity(a: &str, b: &str) -> f64 {
    0.6 * string_similarity(a, b) + 0.4 * token_similarity(a, b)
}

/// Extract a leading 4-digit organization code from a display name, e.g.
/// `"0013 Acme Inc"` yields `"0013"`.
pub fn extract_org_number(name: &str) -> Option<String> {
    ORG_CODE_RE
        .captures(name.trim())
        .map(|c| c[1].to_string())
}

/// Detect the `NNNN-NN` sub-entity prefix, e.g. `"0013-08 Dept"`.
pub fn is_sub_customer(name: &str) -> bool {
    SUB_CUSTOMER_RE.is_match(name.trim())
}

/// Strip a leading `NNNN` or `NNNN-NN` prefix to recover the bare name.
pub fn strip_org_prefix(name: &str) -> String {
    ORG_PREFIX_RE.replace(name.trim(), "").to_string()
}

/// Zero-pad a numeric code to 4 digits; non-numeric input passes through.
pub fn pad_org_number(code: &str) -> String {
    let trimmed = code.trim();
    if trimmed.chars().all(|c| c.is_ascii_digit()) && !trimmed.is_empty() {
        format!("{:0>4}", trimmed)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_accents_and_punctuation() {
        assert_eq!(normalize("  Café,  Montréal! "), "cafe montreal");
        assert_eq!(normalize("ACME-Inc."), "acme inc");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn edit_distance_basics() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("abc", "abc"), 0);
    }

    #[test]
    fn string_similarity_is_reflexive_and_symmetric() {
        assert_eq!(string_similarity("Northwind", "Northwind"), 1.0);
        let ab = string_similarity("Northwind Traders", "Northwind Trading");
        let ba = string_similarity("Northwind Trading", "Northwind Traders");
        assert_eq!(ab, ba);
        assert!(ab > 0.8);
    }

    #[test]
    fn string_similarity_empty_conventions() {
        assert_eq!(string_similarity("", ""), 1.0);
        assert_eq!(string_similarity("x", ""), 0.0);
        assert_eq!(string_similarity("", "x"), 0.0);
    }

    #[test]
    fn token_similarity_is_jaccard() {
        assert_eq!(token_similarity("alpha beta", "beta alpha"), 1.0);
        assert_eq!(token_similarity("alpha beta", "alpha gamma"), 1.0 / 3.0);
        assert_eq!(token_similarity("", ""), 1.0);
        assert_eq!(token_similarity("alpha", ""), 0.0);
    }

    #[test]
    fn combined_similarity_blends_components() {
        let s = combined_similarity("Acme Widgets", "Acme Widgets");
        assert!((s - 1.0).abs() < 1e-9);
        assert_eq!(combined_similarity("abc", "xyz"), 0.0);
    }

    #[test]
    fn extract_org_number_requires_leading_four_digits() {
        assert_eq!(extract_org_number("0013 Acme Inc"), Some("0013".to_string()));
        assert_eq!(extract_org_number("Acme Inc"), None);
        assert_eq!(extract_org_number("13 Acme"), None);
        assert_eq!(extract_org_number("0013"), Some("0013".to_string()));
    }

    #[test]
    fn sub_customer_detection() {
        assert!(is_sub_customer("0013-08 Dept"));
        assert!(!is_sub_customer("0013 Dept"));
        assert!(!is_sub_customer("Dept 0013-08"));
    }

    #[test]
    fn strip_org_prefix_handles_both_shapes() {
        assert_eq!(strip_org_prefix("0013 Acme Inc"), "Acme Inc");
        assert_eq!(strip_org_prefix("0013-08 Acme Dept"), "Acme Dept");
        assert_eq!(strip_org_prefix("Acme Inc"), "Acme Inc");
    }

    #[test]
    fn pad_org_number_zero_pads_numeric_codes() {
        assert_eq!(pad_org_number("42"), "0042");
        assert_eq!(pad_org_number("0042"), "0042");
        assert_eq!(pad_org_number("A42"), "A42");
        assert_eq!(pad_org_number(""), "");
    }
}
