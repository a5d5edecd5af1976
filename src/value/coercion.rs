//! Coercion of raw MySQL values into logical values
//!
//! The driver hands over each non-NULL value as the bytes of the MySQL text
//! protocol. The native column type decides how those bytes are read:
//! integers and dates are parsed, text is validated as UTF-8, binary data is
//! kept as-is. Native types without a logical mapping fail fast instead of
//! degrading to text.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::error::CoercionError;

use super::schema::Column;
use super::types::{Decimal, LogicalType, Temporal, Value};

/// Storage class of a native MySQL column type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    SignedInt,
    UnsignedInt,
    Year,
    Bit,
    Boolean,
    Float,
    Decimal,
    Text,
    Binary,
    Date,
    Time,
    DateTime,
    Null,
}

/// Native column type as reported by the driver, e.g. `BIGINT UNSIGNED`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverType {
    name: String,
    class: TypeClass,
}

impl DriverType {
    /// Parse a driver type name; `None` if the type has no logical mapping
    pub fn parse(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();

        // TINYINT(1) is MySQL's boolean
        let compact: String = upper.chars().filter(|c| !c.is_whitespace()).collect();
        if compact == "TINYINT(1)" {
            return Some(Self::new(name, TypeClass::Boolean));
        }

        let mut words = upper.split_whitespace();
        let head = words.next()?;
        let unsigned = words.any(|w| w == "UNSIGNED");
        let base = head.split('(').next().unwrap_or(head);

        let class = match base {
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" => {
                if unsigned {
                    TypeClass::UnsignedInt
                } else {
                    TypeClass::SignedInt
                }
            }
            "YEAR" => TypeClass::Year,
            "BIT" => TypeClass::Bit,
            "BOOLEAN" | "BOOL" => TypeClass::Boolean,
            "FLOAT" | "DOUBLE" | "REAL" => TypeClass::Float,
            "DECIMAL" | "NUMERIC" | "DEC" | "FIXED" | "NEWDECIMAL" => TypeClass::Decimal,
            "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM"
            | "SET" | "JSON" | "NCHAR" | "NVARCHAR" => TypeClass::Text,
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
                TypeClass::Binary
            }
            "DATE" => TypeClass::Date,
            "TIME" => TypeClass::Time,
            "DATETIME" | "TIMESTAMP" => TypeClass::DateTime,
            "NULL" => TypeClass::Null,
            _ => return None,
        };

        Some(Self::new(name, class))
    }

    fn new(name: &str, class: TypeClass) -> Self {
        Self {
            name: name.trim().to_string(),
            class,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> TypeClass {
        self.class
    }

    /// Logical type every value of this native type maps to
    pub fn logical_type(&self) -> LogicalType {
        match self.class {
            TypeClass::SignedInt | TypeClass::UnsignedInt | TypeClass::Year | TypeClass::Bit => {
                LogicalType::Integer
            }
            TypeClass::Boolean => LogicalType::Boolean,
            TypeClass::Float => LogicalType::Real,
            TypeClass::Decimal => LogicalType::Decimal,
            TypeClass::Text => LogicalType::Text,
            TypeClass::Binary => LogicalType::Binary,
            TypeClass::Date | TypeClass::Time | TypeClass::DateTime => LogicalType::DateTime,
            TypeClass::Null => LogicalType::Null,
        }
    }
}

impl fmt::Display for DriverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Resolve the driver type of a column, failing on unmappable types
pub fn resolve_type(column: &str, driver_type: &str) -> Result<DriverType, CoercionError> {
    DriverType::parse(driver_type).ok_or_else(|| CoercionError::UnsupportedType {
        column: column.to_string(),
        driver_type: driver_type.to_string(),
    })
}

/// Coerce one raw driver value into a logical value
///
/// `None` is SQL NULL and always yields [`Value::Absent`].
pub fn coerce(raw: Option<&[u8]>, column: &Column) -> Result<Value, CoercionError> {
    let Some(bytes) = raw else {
        return Ok(Value::Absent);
    };

    let driver_type = column.driver_type();
    let invalid = |reason: String| CoercionError::InvalidValue {
        column: column.name().to_string(),
        driver_type: driver_type.name().to_string(),
        reason,
    };

    let as_text = || {
        std::str::from_utf8(bytes).map_err(|e| invalid(format!("invalid UTF-8: {e}")))
    };

    match driver_type.class() {
        TypeClass::Null => Ok(Value::Absent),
        // never decoded as text
        TypeClass::Binary => Ok(Value::Binary(bytes.to_vec())),
        TypeClass::Bit => decode_bit(bytes).map(Value::Integer).ok_or_else(|| {
            invalid(format!("BIT value of {} bytes does not fit 64 bits", bytes.len()))
        }),
        TypeClass::SignedInt => {
            let text = as_text()?;
            text.parse::<i64>()
                .map(|n| Value::Integer(i128::from(n)))
                .map_err(|e| invalid(format!("'{text}' is not an integer: {e}")))
        }
        TypeClass::UnsignedInt | TypeClass::Year => {
            let text = as_text()?;
            text.parse::<u64>()
                .map(|n| Value::Integer(i128::from(n)))
                .map_err(|e| invalid(format!("'{text}' is not an unsigned integer: {e}")))
        }
        TypeClass::Boolean => {
            let text = as_text()?;
            text.parse::<i64>()
                .map(|n| Value::Boolean(n != 0))
                .map_err(|e| invalid(format!("'{text}' is not a boolean: {e}")))
        }
        TypeClass::Float => {
            let text = as_text()?;
            text.parse::<f64>()
                .map(Value::Real)
                .map_err(|e| invalid(format!("'{text}' is not a number: {e}")))
        }
        TypeClass::Decimal => {
            let text = as_text()?;
            Decimal::parse(text)
                .map(Value::Decimal)
                .ok_or_else(|| invalid(format!("'{text}' is not a decimal")))
        }
        TypeClass::Text => as_text().map(|text| Value::Text(text.to_string())),
        TypeClass::Date => {
            let text = as_text()?;
            if is_zero_date(text) {
                return Ok(Value::Absent);
            }
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map(|d| Value::DateTime(Temporal::Date(d)))
                .map_err(|e| invalid(format!("'{text}' is not a date: {e}")))
        }
        TypeClass::Time => {
            let text = as_text()?;
            parse_time(text)
                .map(|t| Value::DateTime(Temporal::Time(t)))
                .ok_or_else(|| invalid(format!("'{text}' is not a time")))
        }
        TypeClass::DateTime => {
            let text = as_text()?;
            if is_zero_date(text) {
                return Ok(Value::Absent);
            }
            parse_datetime(text)
                .map(|dt| Value::DateTime(Temporal::DateTime(dt)))
                .map_err(|e| invalid(format!("'{text}' is not a datetime: {e}")))
        }
    }
}

fn parse_datetime(text: &str) -> chrono::ParseResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
}

/// MySQL TIME: `[-]H..H:MM:SS[.f..f]`, hours beyond 24 allowed
fn parse_time(text: &str) -> Option<TimeDelta> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (clock, frac) = match body.split_once('.') {
        Some((_, "")) => return None,
        Some((c, f)) => (c, f),
        None => (body, ""),
    };

    let mut parts = clock.split(':');
    let (h, m, s) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || m.len() != 2 || s.len() != 2 {
        return None;
    }
    let digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    if !digits(h) || !digits(m) || !digits(s) || frac.len() > 9 {
        return None;
    }
    if !frac.is_empty() && !digits(frac) {
        return None;
    }

    let hours: i64 = h.parse().ok()?;
    let minutes: i64 = m.parse().ok()?;
    let seconds: i64 = s.parse().ok()?;
    if minutes > 59 || seconds > 59 {
        return None;
    }
    let nanos: i64 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<9}").parse().ok()?
    };

    let total = TimeDelta::try_seconds(hours.checked_mul(3600)? + minutes * 60 + seconds)?
        + TimeDelta::nanoseconds(nanos);
    Some(if negative { -total } else { total })
}

/// MySQL zero dates have no calendar meaning and read as NULL
fn is_zero_date(text: &str) -> bool {
    text.starts_with("0000-00-00")
}

/// BIT(n) arrives as a big-endian byte string
fn decode_bit(bytes: &[u8]) -> Option<i128> {
    if bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0i128, |acc, b| (acc << 8) | i128::from(*b)))
}
