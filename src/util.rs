// Utility helpers for parsing and basic statistics.
//
// This module centralizes the "dirty" cell/number handling so the rest of
// the code can assume clean, typed values.
use chrono::{NaiveDate, NaiveDateTime};
use num_format::{Locale, ToFormattedString};

/// Trim a header, lowercase it and join inner whitespace runs with `_`.
///
/// `"  Macchina o  Impianto "` becomes `"macchina_o_impianto"`.
pub fn normalize_header(s: &str) -> String {
    s.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Parse numeric text the way it shows up in hand-maintained sheets.
///
/// - Strips `€` signs and spaces.
/// - Rejects values that contain alphabetic characters.
/// - With both separators present, the last one is the decimal separator:
///   `1.234,5` and `1,234.5` are both 1234.5.
/// - A lone separator is a thousands separator when it splits the digits
///   into proper groups of three (`1.500` and `1.500.000`), otherwise it is
///   the decimal separator (`12.5`, `0,25`, `0.500`).
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_f64_safe(s: &str) -> Option<f64> {
    let s: String = s
        .chars()
        .filter(|c| *c != '€' && !c.is_whitespace())
        .collect();
    if s.is_empty() || s.chars().any(|c| c.is_alphabetic()) {
        return None;
    }
    let cleaned = match (s.contains(','), s.contains('.')) {
        (false, false) => s,
        (true, true) => {
            let last_comma = s.rfind(',').unwrap_or(0);
            let last_dot = s.rfind('.').unwrap_or(0);
            if last_comma > last_dot {
                s.replace('.', "").replace(',', ".")
            } else {
                s.replace(',', "")
            }
        }
        (comma, _) => {
            let sep = if comma { ',' } else { '.' };
            if is_digit_grouping(&s, sep) {
                s.replace(sep, "")
            } else if s.matches(sep).count() == 1 {
                s.replace(sep, ".")
            } else {
                return None;
            }
        }
    };
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `1.234.567` style grouping: a leading group of 1-3 digits without a
/// leading zero, then groups of exactly three digits.
fn is_digit_grouping(s: &str, sep: char) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let mut groups = digits.split(sep);
    let lead_ok = groups.next().is_some_and(|g| {
        (1..=3).contains(&g.len())
            && !g.starts_with('0')
            && g.chars().all(|c| c.is_ascii_digit())
    });
    let mut rest = groups.peekable();
    lead_ok
        && rest.peek().is_some()
        && rest.all(|g| g.len() == 3 && g.chars().all(|c| c.is_ascii_digit()))
}

/// Sum the present values; `None` only when nothing was present.
/// NaN inputs count as absent.
pub fn sum_present<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    values
        .into_iter()
        .flatten()
        .filter(|v| !v.is_nan())
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

pub fn average(v: &[f64]) -> f64 {
    // Standard arithmetic mean; returns 0 for an empty slice to avoid NaNs.
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().copied().sum();
    sum / v.len() as f64
}

/// Sample standard deviation (n - 1); undefined below two values.
pub fn sample_std_dev(v: &[f64]) -> Option<f64> {
    if v.len() < 2 {
        return None;
    }
    let mean = average(v);
    let ss: f64 = v.iter().map(|x| (x - mean).powi(2)).sum();
    Some((ss / (v.len() - 1) as f64).sqrt())
}

/// Days since the 1899-12-30 epoch, as spreadsheets store dates.
pub fn excel_serial(dt: NaiveDateTime) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    (dt - epoch).num_seconds() as f64 / 86_400.0
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Format a floating-point value with:
    // - a fixed number of decimal places, and
    // - locale-aware thousands separators (e.g., `1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let abs_n = n.abs();
    let s = format!("{:.*}", decimals, abs_n);
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

/// Like `format_number`, but an absent value renders as `-`.
pub fn format_opt(n: Option<f64>, decimals: usize) -> String {
    n.map_or_else(|| "-".to_string(), |v| format_number(v, decimals))
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Thin wrapper around `num-format` for counts in console messages
    // (e.g., `1,204 rows consolidated`).
    n.to_formatted_string(&Locale::en)
}
