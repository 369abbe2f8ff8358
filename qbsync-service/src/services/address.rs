//! Free-text address normalization for QuickBooks payloads.
//!
//! The ledger stores addresses as newline-delimited text: line 1 is the
//! name/site, line 2 the street, line 3 city/province/postal and sometimes
//! a country. Parsing is best-effort; consumers must tolerate partially
//! populated fields.

use crate::models::QbAddress;
use once_cell::sync::Lazy;
use regex::Regex;

static POSTAL_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    // Canadian "A1A 1A1" (space optional) or US ZIP/ZIP+4.
    Regex::new(r"(?i)\b([A-Z]\d[A-Z]\s?\d[A-Z]\d|\d{5}(?:-\d{4})?)\s*$")
        .expect("invalid postal code regex")
});

const COUNTRIES: &[(&str, &str)] = &[
    ("canada", "Canada"),
    ("ca", "Canada"),
    ("usa", "USA"),
    ("us", "USA"),
    ("u.s.a.", "USA"),
    ("united states", "USA"),
    ("united states of america", "USA"),
    ("etats-unis", "USA"),
    ("états-unis", "USA"),
];

const PROVINCES: &[(&str, &str)] = &[
    ("alberta", "AB"),
    ("british columbia", "BC"),
    ("colombie-britannique", "BC"),
    ("manitoba", "MB"),
    ("new brunswick", "NB"),
    ("nouveau-brunswick", "NB"),
    ("newfoundland and labrador", "NL"),
    ("terre-neuve-et-labrador", "NL"),
    ("nova scotia", "NS"),
    ("nouvelle-ecosse", "NS"),
    ("nouvelle-écosse", "NS"),
    ("northwest territories", "NT"),
    ("nunavut", "NU"),
    ("ontario", "ON"),
    ("prince edward island", "PE"),
    ("ile-du-prince-edouard", "PE"),
    ("quebec", "QC"),
    ("québec", "QC"),
    ("saskatchewan", "SK"),
    ("yukon", "YT"),
];

/// Parse a free-form ledger address into a structured QuickBooks address.
pub fn parse_address(text: &str) -> QbAddress {
    let mut lines: Vec<String> = text
        .lines()
        .map(|l| l.trim().trim_end_matches(',').trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    let mut addr = QbAddress::default();
    if lines.is_empty() {
        return addr;
    }

    // A trailing country either sits on its own line or trails the last one.
    if let Some(last) = lines.last() {
        if let Some(country) = match_country(last) {
            addr.country = Some(country);
            lines.pop();
        } else {
            let (rest, country) = strip_trailing_country(last);
            if let Some(country) = country {
                addr.country = Some(country);
                *lines.last_mut().expect("lines is non-empty") = rest;
            }
        }
    }

    if lines.is_empty() {
        return addr;
    }

    match lines.len() {
        1 => {
            addr.line1 = Some(lines[0].clone());
        }
        2 => {
            // Degraded case: no separate street line. If the second line
            // carries a postal code it is a city line, else it is just a
            // second address line verbatim.
            addr.line1 = Some(lines[0].clone());
            if POSTAL_CODE_RE.is_match(&lines[1]) {
                parse_city_line(&lines[1], &mut addr);
            } else {
                addr.line2 = Some(lines[1].clone());
            }
        }
        _ => {
            addr.line1 = Some(lines[0].clone());
            addr.line2 = Some(lines[1].clone());
            if lines.len() > 3 {
                addr.line3 = Some(lines[2..lines.len() - 1].join(", "));
            }
            parse_city_line(&lines[lines.len() - 1], &mut addr);
        }
    }

    addr
}

/// Split "City QC H2X 1Y4" style lines into city, subdivision and postal
/// code.
fn parse_city_line(line: &str, addr: &mut QbAddress) {
    let mut remainder = line.to_string();

    if let Some(m) = POSTAL_CODE_RE.find(&remainder.clone()) {
        let code = m.as_str().trim().to_uppercase();
        addr.postal_code = Some(normalize_postal_code(&code));
        remainder = remainder[..m.start()].trim().trim_end_matches(',').trim().to_string();
    }

    let (city, subdivision) = split_subdivision(&remainder);
    if !city.is_empty() {
        addr.city = Some(city);
    }
    addr.country_sub_division_code = subdivision;
}

/// Insert the conventional space into compact Canadian postal codes.
fn normalize_postal_code(code: &str) -> String {
    let compact: String = code.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() == 6 && compact.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        format!("{} {}", &compact[..3], &compact[3..])
    } else {
        code.to_string()
    }
}

/// Detect a trailing province/state name or abbreviation.
fn split_subdivision(s: &str) -> (String, Option<String>) {
    let trimmed = s.trim().trim_end_matches(',').trim();
    if trimmed.is_empty() {
        return (String::new(), None);
    }

    let lower = trimmed.to_lowercase();
    for (name, abbr) in PROVINCES {
        if lower.ends_with(name) {
            let city = trimmed[..trimmed.len() - name.len()]
                .trim()
                .trim_end_matches(',')
                .trim();
            return (city.to_string(), Some((*abbr).to_string()));
        }
    }

    // A trailing 2-letter uppercase token covers both province and state
    // abbreviations.
    if let Some(last_token) = trimmed.rsplit([' ', ',']).find(|t| !t.is_empty()) {
        if last_token.len() == 2 && last_token.chars().all(|c| c.is_ascii_uppercase()) {
            let city = trimmed[..trimmed.len() - last_token.len()]
                .trim()
                .trim_end_matches(',')
                .trim();
            return (city.to_string(), Some(last_token.to_string()));
        }
    }

    (trimmed.to_string(), None)
}

fn match_country(line: &str) -> Option<String> {
    let lower = line.trim().to_lowercase();
    COUNTRIES
        .iter()
        .find(|(key, _)| *key == lower)
        .map(|(_, canonical)| (*canonical).to_string())
}

fn strip_trailing_country(line: &str) -> (String, Option<String>) {
    let lower = line.to_lowercase();
    for (key, canonical) in COUNTRIES {
        // Only strip multi-character tokens from a shared line; "CA" alone
        // is ambiguous with California.
        if key.len() > 2 && lower.ends_with(key) {
            let rest = line[..line.len() - key.len()]
                .trim()
                .trim_end_matches(',')
                .trim()
                .to_string();
            return (rest, Some((*canonical).to_string()));
        }
    }
    (line.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_line_quebec_address() {
        let addr = parse_address("Acme Montréal\n123 Rue Principale\nMontréal QC H2X 1Y4");
        assert_eq!(addr.line1.as_deref(), Some("Acme Montréal"));
        assert_eq!(addr.line2.as_deref(), Some("123 Rue Principale"));
        assert_eq!(addr.city.as_deref(), Some("Montréal"));
        assert_eq!(addr.country_sub_division_code.as_deref(), Some("QC"));
        assert_eq!(addr.postal_code.as_deref(), Some("H2X 1Y4"));
    }

    #[test]
    fn trailing_country_line_is_stripped() {
        let addr = parse_address("Site A\n45 Main St\nToronto, Ontario M5V 2T6\nCanada");
        assert_eq!(addr.country.as_deref(), Some("Canada"));
        assert_eq!(addr.city.as_deref(), Some("Toronto"));
        assert_eq!(addr.country_sub_division_code.as_deref(), Some("ON"));
        assert_eq!(addr.postal_code.as_deref(), Some("M5V 2T6"));
    }

    #[test]
    fn country_trailing_on_city_line() {
        let addr = parse_address("Site B\n9 Elm St\nQuébec QC G1R4P5, Canada");
        assert_eq!(addr.country.as_deref(), Some("Canada"));
        assert_eq!(addr.postal_code.as_deref(), Some("G1R 4P5"));
        assert_eq!(addr.city.as_deref(), Some("Québec"));
    }

    #[test]
    fn two_line_address_with_postal_code() {
        let addr = parse_address("Acme Inc\nLaval QC H7N 4T2");
        assert_eq!(addr.line1.as_deref(), Some("Acme Inc"));
        assert!(addr.line2.is_none());
        assert_eq!(addr.city.as_deref(), Some("Laval"));
        assert_eq!(addr.postal_code.as_deref(), Some("H7N 4T2"));
    }

    #[test]
    fn two_line_address_without_postal_code_kept_verbatim() {
        let addr = parse_address("Acme Inc\nSomewhere vague");
        assert_eq!(addr.line1.as_deref(), Some("Acme Inc"));
        assert_eq!(addr.line2.as_deref(), Some("Somewhere vague"));
        assert!(addr.postal_code.is_none());
    }

    #[test]
    fn us_zip_and_state_abbreviation() {
        let addr = parse_address("Branch\n10 Market St\nBoston MA 02110\nUSA");
        assert_eq!(addr.country.as_deref(), Some("USA"));
        assert_eq!(addr.city.as_deref(), Some("Boston"));
        assert_eq!(addr.country_sub_division_code.as_deref(), Some("MA"));
        assert_eq!(addr.postal_code.as_deref(), Some("02110"));
    }

    #[test]
    fn empty_and_whitespace_input() {
        assert!(parse_address("").is_empty());
        assert!(parse_address("  \n \n").is_empty());
    }

    #[test]
    fn single_line_is_just_line1() {
        let addr = parse_address("Acme Inc");
        assert_eq!(addr.line1.as_deref(), Some("Acme Inc"));
        assert!(addr.city.is_none());
    }
}
