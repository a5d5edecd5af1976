//! Logical value types shared by every exporter

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta, Timelike};

/// Closed set of value categories used uniformly across exporters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Integer,
    Real,
    Decimal,
    Text,
    Binary,
    Boolean,
    DateTime,
    Null,
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogicalType::Integer => "Integer",
            LogicalType::Real => "Real",
            LogicalType::Decimal => "Decimal",
            LogicalType::Text => "Text",
            LogicalType::Binary => "Binary",
            LogicalType::Boolean => "Boolean",
            LogicalType::DateTime => "DateTime",
            LogicalType::Null => "Null",
        };
        f.write_str(name)
    }
}

/// A date, a time, or both
///
/// All three share the `DateTime` logical type; the variant only decides
/// how the value is rendered. `Time` is a signed duration: MySQL TIME spans
/// `-838:59:59` to `838:59:59` and is not limited to a time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temporal {
    Date(NaiveDate),
    Time(TimeDelta),
    DateTime(NaiveDateTime),
}

impl Temporal {
    /// ISO-8601 rendering; fractional seconds only when non-zero
    ///
    /// Times render as `[-]HH:MM:SS[.fff]`, with more than two hour digits
    /// when needed.
    pub fn to_iso_string(&self) -> String {
        match self {
            Temporal::Date(d) => d.format("%Y-%m-%d").to_string(),
            Temporal::Time(t) => format_duration(*t),
            Temporal::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        }
    }

    /// Whether a sub-second part is present
    pub fn has_fraction(&self) -> bool {
        match self {
            Temporal::Date(_) => false,
            Temporal::Time(t) => t.subsec_nanos() != 0,
            Temporal::DateTime(dt) => dt.nanosecond() != 0,
        }
    }

    /// Whether this is a negative time
    pub fn is_negative(&self) -> bool {
        matches!(self, Temporal::Time(t) if *t < TimeDelta::zero())
    }
}

fn format_duration(t: TimeDelta) -> String {
    let sign = if t < TimeDelta::zero() { "-" } else { "" };
    let abs = t.abs();
    let secs = abs.num_seconds();
    let mut out = format!(
        "{sign}{:02}:{:02}:{:02}",
        secs / 3600,
        secs / 60 % 60,
        secs % 60
    );
    out.push_str(&fraction(abs.subsec_nanos().unsigned_abs()));
    out
}

/// `.fff`, `.ffffff` or `.fffffffff`, like chrono's `%.f`
fn fraction(nanos: u32) -> String {
    if nanos == 0 {
        String::new()
    } else if nanos % 1_000_000 == 0 {
        format!(".{:03}", nanos / 1_000_000)
    } else if nanos % 1_000 == 0 {
        format!(".{:06}", nanos / 1_000)
    } else {
        format!(".{:09}", nanos)
    }
}

impl fmt::Display for Temporal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso_string())
    }
}

/// Exact decimal number kept in its textual form
///
/// MySQL DECIMAL allows 65 digits, more than any binary float can hold, so
/// the digits are validated and kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decimal(String);

impl Decimal {
    /// Parse `[+-]digits[.digits]`; at least one digit is required
    pub fn parse(s: &str) -> Option<Self> {
        let body = s.strip_prefix(['-', '+']).unwrap_or(s);
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };

        let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !all_digits(int_part) || !all_digits(frac_part) {
            return None;
        }

        let normalized = s.strip_prefix('+').unwrap_or(s);
        Some(Self(normalized.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to `f64` only if the double represents exactly the same number
    pub fn to_f64_exact(&self) -> Option<f64> {
        let value: f64 = self.0.parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        (canonical(&self.0) == canonical(&value.to_string())).then_some(value)
    }
}

/// Strip sign of zero, leading integer zeros and trailing fraction zeros
fn canonical(s: &str) -> String {
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    let int_part = int_part.trim_start_matches('0');
    let frac_part = frac_part.trim_end_matches('0');

    let mut out = String::new();
    if int_part.is_empty() && frac_part.is_empty() {
        return "0".to_string();
    }
    if negative {
        out.push('-');
    }
    out.push_str(if int_part.is_empty() { "0" } else { int_part });
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single coerced cell value
///
/// `Absent` is SQL NULL and is valid in a column of any logical type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Absent,
    Integer(i128),
    Real(f64),
    Decimal(Decimal),
    Text(String),
    Binary(Vec<u8>),
    Boolean(bool),
    DateTime(Temporal),
}

impl Value {
    /// Logical type carried by this value, `None` for absent
    pub fn logical_type(&self) -> Option<LogicalType> {
        match self {
            Value::Absent => None,
            Value::Integer(_) => Some(LogicalType::Integer),
            Value::Real(_) => Some(LogicalType::Real),
            Value::Decimal(_) => Some(LogicalType::Decimal),
            Value::Text(_) => Some(LogicalType::Text),
            Value::Binary(_) => Some(LogicalType::Binary),
            Value::Boolean(_) => Some(LogicalType::Boolean),
            Value::DateTime(_) => Some(LogicalType::DateTime),
        }
    }

    /// Whether this value may appear in a column of the given type
    pub fn conforms_to(&self, column_type: LogicalType) -> bool {
        match self.logical_type() {
            None => true,
            Some(t) => t == column_type,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Name of the value kind for error messages
    pub fn kind_name(&self) -> String {
        self.logical_type()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "Absent".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporal_iso_rendering() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert_eq!(Temporal::DateTime(dt).to_iso_string(), "2024-01-05T10:00:00");

        let with_millis = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_milli_opt(10, 0, 0, 250)
            .unwrap();
        assert_eq!(
            Temporal::DateTime(with_millis).to_iso_string(),
            "2024-01-05T10:00:00.250"
        );
        assert!(Temporal::DateTime(with_millis).has_fraction());

        let date = NaiveDate::from_ymd_opt(1999, 12, 31).unwrap();
        assert_eq!(Temporal::Date(date).to_iso_string(), "1999-12-31");
    }

    #[test]
    fn test_time_renders_as_signed_duration() {
        let long = TimeDelta::seconds(838 * 3600 + 59 * 60 + 59);
        assert_eq!(Temporal::Time(long).to_iso_string(), "838:59:59");

        let negative = -TimeDelta::seconds(90 * 60);
        assert_eq!(Temporal::Time(negative).to_iso_string(), "-01:30:00");
        assert!(Temporal::Time(negative).is_negative());

        let with_micros = TimeDelta::seconds(5) + TimeDelta::microseconds(125);
        assert_eq!(Temporal::Time(with_micros).to_iso_string(), "00:00:05.000125");
        assert!(Temporal::Time(with_micros).has_fraction());
        assert!(!Temporal::Time(TimeDelta::zero()).has_fraction());
    }

    #[test]
    fn test_decimal_parse() {
        assert_eq!(Decimal::parse("123.4500").unwrap().as_str(), "123.4500");
        assert_eq!(Decimal::parse("+7").unwrap().as_str(), "7");
        assert_eq!(Decimal::parse("-0.5").unwrap().as_str(), "-0.5");
        assert!(Decimal::parse("").is_none());
        assert!(Decimal::parse("1e5").is_none());
        assert!(Decimal::parse("12a").is_none());
        assert!(Decimal::parse("-").is_none());
        assert!(Decimal::parse(".").is_none());
    }

    #[test]
    fn test_decimal_exact_f64() {
        assert_eq!(Decimal::parse("123.4500").unwrap().to_f64_exact(), Some(123.45));
        assert_eq!(Decimal::parse("0.1").unwrap().to_f64_exact(), Some(0.1));
        assert_eq!(Decimal::parse("-0.00").unwrap().to_f64_exact(), Some(-0.0));
        assert!(
            Decimal::parse("12345678901234567890.12")
                .unwrap()
                .to_f64_exact()
                .is_none()
        );
    }

    #[test]
    fn test_absent_conforms_to_every_type() {
        assert!(Value::Absent.conforms_to(LogicalType::Integer));
        assert!(Value::Absent.conforms_to(LogicalType::Binary));
        assert!(Value::Integer(1).conforms_to(LogicalType::Integer));
        assert!(!Value::Text("1".into()).conforms_to(LogicalType::Integer));
    }
}
