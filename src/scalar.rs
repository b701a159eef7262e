//! Scalar classification (C3).
//!
//! Maps an unquoted lexeme to one of the six scalar kinds. The rule is
//! exclusive and ordered: special tokens first, then integers, then
//! doubles, then everything else is a bare string. Quoted strings never go
//! through this classifier — they are always `Scalar::String`.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// The kind name, used in error messages and override type-mismatch
    /// diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::UInt(_) => "uint",
            Scalar::Double(_) => "double",
            Scalar::String(_) => "string",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "~"),
            Scalar::Bool(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::UInt(u) => write!(f, "{u}"),
            Scalar::Double(d) => write!(f, "{}", format_double(*d)),
            Scalar::String(s) => write!(f, "{s}"),
        }
    }
}

/// Render a double using the packer's `%g`-like rule plus the three
/// special tokens.
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        ".NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 { ".Inf".to_string() } else { "-.Inf".to_string() }
    } else if d == 0.0 {
        "0".to_string()
    } else {
        format_g(d, 6)
    }
}

/// C's `printf("%.<precision>g", d)`: pick fixed or exponential notation
/// by the value's decimal exponent, at `precision` significant digits,
/// with trailing zeros (and a bare trailing `.`) stripped either way.
fn format_g(d: f64, precision: usize) -> String {
    let precision = precision.max(1);
    let sci = format!("{:.*e}", precision - 1, d);
    let epos = sci.find('e').expect("scientific formatting always has an 'e'");
    let exp: i32 = sci[epos + 1..].parse().expect("exponent is always a valid integer");
    let mantissa = &sci[..epos];

    if exp < -4 || exp >= precision as i32 {
        let m = strip_trailing_zeros(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{m}e{sign}{:02}", exp.abs())
    } else {
        let frac_digits = (precision as i32 - 1 - exp).max(0) as usize;
        strip_trailing_zeros(&format!("{d:.frac_digits$}"))
    }
}

fn strip_trailing_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

/// Classify a bare (unquoted) lexeme per §3's exclusive rule:
///
/// 1. `~` / `null` (case-insensitive) → `Null`
/// 2. `true` / `false` (case-insensitive) → `Bool`
/// 3. `.inf` / `-.inf` / `.nan` (case-insensitive) → `Double`
/// 4. `-0` → `UInt(0)`
/// 5. parses as a negative integer fitting `i64` → `Int`
/// 6. parses as a non-negative integer fitting `u64` → `UInt`
/// 7. parses as a finite `f64` → `Double`
/// 8. otherwise → `String` (the lexeme verbatim)
pub fn classify_bare(lexeme: &str) -> Scalar {
    let lower = lexeme.to_ascii_lowercase();
    match lower.as_str() {
        "~" | "null" => return Scalar::Null,
        "true" => return Scalar::Bool(true),
        "false" => return Scalar::Bool(false),
        ".inf" => return Scalar::Double(f64::INFINITY),
        "-.inf" => return Scalar::Double(f64::NEG_INFINITY),
        ".nan" => return Scalar::Double(f64::NAN),
        _ => {}
    }

    if lexeme == "-0" {
        return Scalar::UInt(0);
    }

    if is_integer_lexeme(lexeme) {
        if let Some(stripped) = lexeme.strip_prefix('-') {
            if let Ok(v) = stripped.parse::<u64>() {
                // Negative: must fit i64.
                if v <= (i64::MAX as u64) + 1 {
                    if let Ok(i) = lexeme.parse::<i64>() {
                        return Scalar::Int(i);
                    }
                }
            }
        } else if let Ok(u) = lexeme.parse::<u64>() {
            return Scalar::UInt(u);
        }
    }

    if let Ok(d) = lexeme.parse::<f64>() {
        if d.is_finite() {
            return Scalar::Double(d);
        }
    }

    Scalar::String(lexeme.to_string())
}

fn is_integer_lexeme(lexeme: &str) -> bool {
    let body = lexeme.strip_prefix('-').unwrap_or(lexeme);
    !body.is_empty() && body.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("~", Scalar::Null)]
    #[case("null", Scalar::Null)]
    #[case("NulL", Scalar::Null)]
    #[case("true", Scalar::Bool(true))]
    #[case("TrUE", Scalar::Bool(true))]
    #[case("false", Scalar::Bool(false))]
    #[case("-0", Scalar::UInt(0))]
    #[case("0", Scalar::UInt(0))]
    #[case("42", Scalar::UInt(42))]
    #[case("-42", Scalar::Int(-42))]
    #[case("3.14", Scalar::Double(3.14))]
    #[case("1e3", Scalar::Double(1000.0))]
    #[case(".inf", Scalar::Double(f64::INFINITY))]
    #[case("-.inf", Scalar::Double(f64::NEG_INFINITY))]
    #[case("hello", Scalar::String("hello".to_string()))]
    #[case("18446744073709551615", Scalar::UInt(u64::MAX))]
    fn classifies(#[case] input: &str, #[case] expected: Scalar) {
        let got = classify_bare(input);
        match (&got, &expected) {
            (Scalar::Double(a), Scalar::Double(b)) if a.is_nan() && b.is_nan() => {}
            _ => assert_eq!(got, expected, "classifying {input:?}"),
        }
    }

    #[test]
    fn nan_is_nan() {
        assert!(matches!(classify_bare(".nan"), Scalar::Double(d) if d.is_nan()));
    }

    #[test]
    fn huge_negative_falls_back_to_double_or_string() {
        // Too large in magnitude for i64, but parses as a double.
        let got = classify_bare("-99999999999999999999999");
        assert!(matches!(got, Scalar::Double(_)));
    }

    #[rstest]
    #[case(1000.0, "1000")]
    #[case(3.14, "3.14")]
    #[case(0.0001, "0.0001")]
    #[case(100_000_000.0, "1e+08")]
    #[case(0.00001, "1e-05")]
    #[case(0.0, "0")]
    fn formats_double_like_percent_g(#[case] input: f64, #[case] expected: &str) {
        assert_eq!(format_double(input), expected);
    }

    #[test]
    fn formats_double_specials() {
        assert_eq!(format_double(f64::NAN), ".NaN");
        assert_eq!(format_double(f64::INFINITY), ".Inf");
        assert_eq!(format_double(f64::NEG_INFINITY), "-.Inf");
    }
}
