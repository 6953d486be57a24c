//! Best-effort number extraction from claim text.
//!
//! Both extractors return `None` rather than failing: no match and an
//! unparseable match are the same outcome to callers.

use regex::Regex;
use std::sync::OnceLock;

const BILLION: f64 = 1e9;
const MILLION: f64 = 1e6;
const THOUSAND: f64 = 1e3;

/// Tried in order; the first pattern that matches a number not followed by
/// a percent marker wins.
const MAGNITUDE_PATTERNS: &[(&str, f64)] = &[
    (r"\$?(\d+(?:\.\d+)?)\s*(?:billion|bn\b|b\b|млрд|миллиард)", BILLION),
    (r"\$?(\d+(?:\.\d+)?)\s*(?:million|mln\b|млн|миллион|m\b)", MILLION),
    (r"\$?(\d+(?:\.\d+)?)\s*(?:thousand|тыс|k\b)", THOUSAND),
    (r"\$?(\d+(?:\.\d+)?)", 1.0),
];

const PERCENT_MARKERS: &[&str] = &["%", "процент", "percent"];

const PERCENT_PATTERNS: &[&str] = &[
    r"(\d+(?:\.\d+)?)\s*%",
    r"(\d+(?:\.\d+)?)\s*процент",
    r"(\d+(?:\.\d+)?)\s*percent",
];

fn compile_all<'a>(patterns: impl Iterator<Item = &'a str>) -> Vec<Regex> {
    patterns
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!(pattern = p, error = %e, "numeric.bad_pattern");
                None
            }
        })
        .collect()
}

fn magnitude_patterns() -> &'static [(Regex, f64)] {
    static PATTERNS: OnceLock<Vec<(Regex, f64)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compiled = compile_all(MAGNITUDE_PATTERNS.iter().map(|(p, _)| *p));
        compiled
            .into_iter()
            .zip(MAGNITUDE_PATTERNS.iter().map(|(_, m)| *m))
            .collect()
    })
}

fn percent_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| compile_all(PERCENT_PATTERNS.iter().copied()))
}

fn digit_groups() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{1,3}(?:[,\u{a0} ]\d{3})+").ok())
        .as_ref()
}

fn decimal_comma() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d),(\d)").ok()).as_ref()
}

/// Pull a magnitude out of `text`, applying a unit multiplier only when a
/// unit word directly follows the number.
///
/// ```
/// use viralwatch_factcheck::numeric::extract_magnitude;
///
/// assert_eq!(extract_magnitude("$1.5 million"), Some(1_500_000.0));
/// assert_eq!(extract_magnitude("$1,500,000"), Some(1_500_000.0));
/// assert_eq!(extract_magnitude("no numbers here"), None);
/// ```
pub fn extract_magnitude(text: &str) -> Option<f64> {
    let normalized = normalize(text);
    magnitude_patterns().iter().find_map(|(re, multiplier)| {
        re.captures_iter(&normalized).find_map(|caps| {
            let whole = caps.get(0)?;
            if is_percentage(&normalized[whole.end()..]) {
                return None;
            }
            let value: f64 = caps.get(1)?.as_str().parse().ok()?;
            Some(value * multiplier)
        })
    })
}

fn is_percentage(rest: &str) -> bool {
    let rest = rest.trim_start();
    PERCENT_MARKERS.iter().any(|m| rest.starts_with(m))
}

/// Pull a percentage out of `text`: `%` first, then the spelled-out words.
///
/// ```
/// use viralwatch_factcheck::numeric::extract_percentage;
///
/// assert_eq!(extract_percentage("APY of 15.5%"), Some(15.5));
/// assert_eq!(extract_percentage("15.5 percent"), Some(15.5));
/// ```
pub fn extract_percentage(text: &str) -> Option<f64> {
    let normalized = normalize(text);
    percent_patterns().iter().find_map(|re| {
        let caps = re.captures(&normalized)?;
        caps.get(1)?.as_str().parse().ok()
    })
}

/// Lowercase, drop digit-group separators (`1,500,000`, `10 000`), then
/// read any remaining `1,5` as `1.5`.
fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let grouped = strip_group_separators(&lowered);
    match decimal_comma() {
        Some(re) => re.replace_all(&grouped, "${1}.${2}").into_owned(),
        None => grouped,
    }
}

fn strip_group_separators(text: &str) -> String {
    let Some(re) = digit_groups() else {
        return text.to_string();
    };
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in re.find_iter(text) {
        let before = text[..m.start()].chars().next_back();
        let after = text[m.end()..].chars().next();
        // A run glued to other digits ("2024 100") is not a grouped number.
        let standalone = !before.is_some_and(|c| c.is_ascii_digit() || c == '.' || c == ',')
            && !after.is_some_and(|c| c.is_ascii_digit());
        out.push_str(&text[last..m.start()]);
        if standalone {
            out.extend(m.as_str().chars().filter(char::is_ascii_digit));
        } else {
            out.push_str(m.as_str());
        }
        last = m.end();
    }
    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-6 * b.abs().max(1.0))
    }

    #[test]
    fn unit_words_in_both_languages() {
        assert!(approx(extract_magnitude("Aave TVL is $10 billion"), 10e9));
        assert!(approx(extract_magnitude("TVL вырос до 1,5 млрд долларов"), 1.5e9));
        assert!(approx(extract_magnitude("около 3 миллиардов"), 3e9));
        assert!(approx(extract_magnitude("500 млн в пулах"), 500e6));
        assert!(approx(extract_magnitude("2.5 миллиона пользователей"), 2.5e6));
        assert!(approx(extract_magnitude("12 тыс. кошельков"), 12e3));
        assert!(approx(extract_magnitude("$250k raised"), 250e3));
        assert!(approx(extract_magnitude("$3.2bn locked"), 3.2e9));
        assert!(approx(extract_magnitude("$40M inflow"), 40e6));
        assert!(approx(extract_magnitude("Aave TVL is $10B"), 10e9));
        assert!(approx(extract_magnitude("$2.5b in deposits"), 2.5e9));
    }

    #[test]
    fn percentages_are_not_magnitudes() {
        assert_eq!(extract_magnitude("ETH fell 20% to $3,000"), Some(3000.0));
        assert_eq!(extract_magnitude("up 12.5 % this week, now $1,800"), Some(1800.0));
        assert_eq!(extract_magnitude("вырос на 15 процентов до 2 000"), Some(2000.0));
        assert_eq!(extract_magnitude("only 40 percent"), None);
    }

    #[test]
    fn short_units_need_a_word_boundary() {
        // "months" must not be read as millions.
        assert_eq!(extract_magnitude("launched 6 months ago"), Some(6.0));
        assert_eq!(extract_magnitude("over 5 kinds of pools"), Some(5.0));
        assert_eq!(extract_magnitude("7 blocks later"), Some(7.0));
    }

    #[test]
    fn earlier_unit_patterns_take_priority() {
        // The billion pattern wins even though the million figure comes first.
        assert!(approx(
            extract_magnitude("1.5 million users and $10 billion TVL"),
            10e9
        ));
    }

    #[test]
    fn multiplier_only_applies_to_its_own_number() {
        assert_eq!(extract_magnitude("version 3 of the protocol"), Some(3.0));
    }

    #[test]
    fn group_separators() {
        assert_eq!(extract_magnitude("$1,500,000"), Some(1_500_000.0));
        assert_eq!(extract_magnitude("10 000 000 долларов"), Some(10_000_000.0));
        assert_eq!(extract_magnitude("price $1,234.50"), Some(1_234.5));
        // A year followed by a count is left alone.
        assert_eq!(extract_magnitude("в 2024 100 пулов"), Some(2024.0));
    }

    #[test]
    fn absent_numbers() {
        assert_eq!(extract_magnitude("no numbers here"), None);
        assert_eq!(extract_magnitude(""), None);
        assert_eq!(extract_percentage("no percent sign"), None);
    }

    #[test]
    fn percentages() {
        assert_eq!(extract_percentage("APY of 15.5%"), Some(15.5));
        assert_eq!(extract_percentage("15.5 percent"), Some(15.5));
        assert_eq!(extract_percentage("доходность 12 процентов годовых"), Some(12.0));
        assert_eq!(extract_percentage("APR 7,25 %"), Some(7.25));
    }

    #[test]
    fn percent_sign_beats_words() {
        assert_eq!(extract_percentage("5 percent now, was 8%"), Some(8.0));
    }
}
