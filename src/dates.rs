// Month label parsing.
//
// Source sheets label their rows with free text such as "GENNAIO 24" or
// "consumi marzo 2023". Only Italian month names are recognised; anything
// else yields `None` and the row is left out of every aggregate.
use crate::types::MonthKey;
use once_cell::sync::Lazy;
use regex::Regex;

/// Lookup order matters: the first name contained in the label wins.
/// `GUIGNO` is a misspelling that occurs in the production sheets.
const MONTH_NAMES: [(&str, u32); 13] = [
    ("GENNAIO", 1),
    ("FEBBRAIO", 2),
    ("MARZO", 3),
    ("APRILE", 4),
    ("MAGGIO", 5),
    ("GIUGNO", 6),
    ("GUIGNO", 6),
    ("LUGLIO", 7),
    ("AGOSTO", 8),
    ("SETTEMBRE", 9),
    ("OTTOBRE", 10),
    ("NOVEMBRE", 11),
    ("DICEMBRE", 12),
];

// A full year is preferred over its last two digits when both could match.
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4}|\d{2})").expect("valid year regex"));

pub fn parse_month_label(label: &str) -> Option<MonthKey> {
    let upper = label.to_uppercase();
    let month = MONTH_NAMES
        .iter()
        .find(|(name, _)| upper.contains(name))
        .map(|(_, n)| *n)?;
    let digits = YEAR_RE.find(&upper)?.as_str();
    let year: i32 = match digits.len() {
        4 => digits.parse().ok()?,
        _ => 2000 + digits.parse::<i32>().ok()?,
    };
    MonthKey::new(year, month)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(label: &str) -> Option<String> {
        parse_month_label(label).map(|k| k.to_string())
    }

    #[test]
    fn parses_upper_case_label() {
        assert_eq!(parsed("GENNAIO 24").as_deref(), Some("2024-01"));
    }

    #[test]
    fn is_case_insensitive_and_tolerates_noise() {
        assert_eq!(parsed("consumi Marzo 23").as_deref(), Some("2023-03"));
        assert_eq!(parsed("  dicembre-22 ").as_deref(), Some("2022-12"));
    }

    #[test]
    fn accepts_known_misspelling() {
        assert_eq!(parsed("guigno 23").as_deref(), Some("2023-06"));
    }

    #[test]
    fn rejects_unknown_misspelling() {
        assert_eq!(parsed("guignio 23"), None);
    }

    #[test]
    fn rejects_labels_without_year_or_month() {
        assert_eq!(parsed("GENNAIO"), None);
        assert_eq!(parsed("2024-01"), None);
        assert_eq!(parsed("Totale"), None);
        assert_eq!(parsed(""), None);
    }

    #[test]
    fn prefers_four_digit_year() {
        assert_eq!(parsed("Ottobre 2023").as_deref(), Some("2023-10"));
    }
}
