//! Bind values and native column types.
//!
//! [`BindValue`] is the single value type that flows through predicates,
//! parameter maps and rendered statements. It implements
//! [`tokio_postgres::types::ToSql`] so positional parameters can be handed to a
//! Postgres client without re-wrapping.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::error::Error;
use std::fmt;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use uuid::Uuid;

/// Native value type of a column, as reported by the metadata provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Boolean,
    Integer,
    BigInt,
    Decimal,
    Float,
    Text,
    Date,
    Timestamp,
    TimestampTz,
    Uuid,
    Json,
}

impl ValueType {
    /// Whether arithmetic and SUM/AVG are meaningful on this type.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ValueType::Integer | ValueType::BigInt | ValueType::Decimal | ValueType::Float
        )
    }

    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            ValueType::Date | ValueType::Timestamp | ValueType::TimestampTz
        )
    }

    pub fn is_text(self) -> bool {
        matches!(self, ValueType::Text)
    }
}

/// A classification code (a value from a fixed code list).
///
/// `numeric` marks codes whose database representation is not a string,
/// which makes them safe to embed as literals.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassificationCode {
    pub code: String,
    pub numeric: bool,
}

impl ClassificationCode {
    pub fn text(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            numeric: false,
        }
    }

    pub fn numeric(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            numeric: true,
        }
    }
}

/// A value bound to a statement placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Null,
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Decimal(Decimal),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
    Code(ClassificationCode),
    /// Expanded into one placeholder per element when rendered positionally.
    List(Vec<BindValue>),
}

impl BindValue {
    pub fn is_null(&self) -> bool {
        matches!(self, BindValue::Null)
    }

    /// Whether this operand counts as "no value" for predicate applicability.
    ///
    /// `NULL`, an empty list and (unless `empty_string_allowed`) an empty
    /// string are absent. A list whose elements are all absent is absent too.
    pub fn is_absent(&self, empty_string_allowed: bool) -> bool {
        match self {
            BindValue::Null => true,
            BindValue::Text(s) => s.is_empty() && !empty_string_allowed,
            BindValue::Code(c) => c.code.is_empty(),
            BindValue::List(items) => items.iter().all(|v| v.is_absent(empty_string_allowed)),
            _ => false,
        }
    }

    /// The native type this value most naturally binds to, if any.
    pub fn value_type(&self) -> Option<ValueType> {
        Some(match self {
            BindValue::Null | BindValue::List(_) => return None,
            BindValue::Bool(_) => ValueType::Boolean,
            BindValue::Int(_) => ValueType::Integer,
            BindValue::BigInt(_) => ValueType::BigInt,
            BindValue::Decimal(_) => ValueType::Decimal,
            BindValue::Float(_) => ValueType::Float,
            BindValue::Text(_) => ValueType::Text,
            BindValue::Code(c) if c.numeric => ValueType::Integer,
            BindValue::Code(_) => ValueType::Text,
            BindValue::Date(_) => ValueType::Date,
            BindValue::Timestamp(_) => ValueType::Timestamp,
            BindValue::TimestampTz(_) => ValueType::TimestampTz,
            BindValue::Uuid(_) => ValueType::Uuid,
            BindValue::Json(_) => ValueType::Json,
        })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            BindValue::Text(s) => Some(s),
            BindValue::Code(c) => Some(&c.code),
            _ => None,
        }
    }

    /// Number of positional placeholders this value occupies.
    pub fn placeholder_count(&self) -> usize {
        match self {
            BindValue::List(items) => items.len().max(1),
            _ => 1,
        }
    }

    /// Render the value as a SQL literal (used by display SQL).
    pub fn to_literal(&self) -> String {
        match self {
            BindValue::Null => "null".to_string(),
            BindValue::Bool(v) => v.to_string(),
            BindValue::Int(v) => v.to_string(),
            BindValue::BigInt(v) => v.to_string(),
            BindValue::Decimal(v) => v.to_string(),
            BindValue::Float(v) => v.to_string(),
            BindValue::Text(s) => quote_literal(s),
            BindValue::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            BindValue::Timestamp(ts) => format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S%.3f")),
            BindValue::TimestampTz(ts) => format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S%.3f%:z")),
            BindValue::Uuid(u) => format!("'{u}'"),
            BindValue::Json(j) => quote_literal(&j.to_string()),
            BindValue::Code(c) if c.numeric => c.code.clone(),
            BindValue::Code(c) => quote_literal(&c.code),
            BindValue::List(items) => items
                .iter()
                .map(BindValue::to_literal)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Literal text for positions where the dialect cannot bind parameters.
    ///
    /// Only numeric, temporal and numeric classification values qualify;
    /// string-like values return `None` and must be rejected by the caller.
    pub fn embeddable_literal(&self) -> Option<String> {
        match self {
            BindValue::Int(_)
            | BindValue::BigInt(_)
            | BindValue::Decimal(_)
            | BindValue::Float(_)
            | BindValue::Date(_)
            | BindValue::Timestamp(_)
            | BindValue::TimestampTz(_) => Some(self.to_literal()),
            BindValue::Code(c) if c.numeric && c.code.parse::<i64>().is_ok() => {
                Some(c.code.clone())
            }
            _ => None,
        }
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            BindValue::Null => J::Null,
            BindValue::Bool(v) => J::Bool(*v),
            BindValue::Int(v) => J::from(*v),
            BindValue::BigInt(v) => J::from(*v),
            BindValue::Decimal(v) => J::String(v.to_string()),
            BindValue::Float(v) => J::from(*v),
            BindValue::Text(s) => J::String(s.clone()),
            BindValue::Date(_) | BindValue::Timestamp(_) | BindValue::TimestampTz(_) => {
                J::String(self.to_literal().trim_matches('\'').to_string())
            }
            BindValue::Uuid(u) => J::String(u.to_string()),
            BindValue::Json(j) => j.clone(),
            BindValue::Code(c) => J::String(c.code.clone()),
            BindValue::List(items) => J::Array(items.iter().map(BindValue::to_json).collect()),
        }
    }
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl fmt::Display for BindValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindValue::Text(s) if s.is_empty() => f.write_str("''"),
            BindValue::List(_) => write!(f, "[{}]", self.to_literal()),
            other => f.write_str(&other.to_literal()),
        }
    }
}

macro_rules! impl_from_value {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for BindValue {
                fn from(v: $t) -> Self {
                    BindValue::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Bool,
    i32 => Int,
    i64 => BigInt,
    Decimal => Decimal,
    f64 => Float,
    String => Text,
    &str => Text,
    NaiveDate => Date,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    Uuid => Uuid,
    serde_json::Value => Json,
    ClassificationCode => Code,
}

impl From<i16> for BindValue {
    fn from(v: i16) -> Self {
        BindValue::Int(i32::from(v))
    }
}

impl<T: Into<BindValue>> From<Option<T>> for BindValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(BindValue::Null, Into::into)
    }
}

impl<T: Into<BindValue>> From<Vec<T>> for BindValue {
    fn from(v: Vec<T>) -> Self {
        BindValue::List(v.into_iter().map(Into::into).collect())
    }
}

fn int_to_sql(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::NUMERIC => Decimal::from(v).to_sql(ty, out),
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR => v.to_string().to_sql(ty, out),
        _ => v.to_sql(ty, out),
    }
}

impl ToSql for BindValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            BindValue::Null => Ok(IsNull::Yes),
            BindValue::Bool(v) => v.to_sql(ty, out),
            BindValue::Int(v) => int_to_sql(i64::from(*v), ty, out),
            BindValue::BigInt(v) => int_to_sql(*v, ty, out),
            BindValue::Decimal(v) => v.to_sql(ty, out),
            BindValue::Float(v) => v.to_sql(ty, out),
            BindValue::Text(s) => s.as_str().to_sql(ty, out),
            BindValue::Date(d) => d.to_sql(ty, out),
            BindValue::Timestamp(ts) => ts.to_sql(ty, out),
            BindValue::TimestampTz(ts) => ts.to_sql(ty, out),
            BindValue::Uuid(u) => u.to_sql(ty, out),
            BindValue::Json(j) => j.to_sql(ty, out),
            BindValue::Code(c) => match *ty {
                Type::INT2 | Type::INT4 | Type::INT8 => int_to_sql(c.code.parse::<i64>()?, ty, out),
                _ => c.code.as_str().to_sql(ty, out),
            },
            BindValue::List(_) => Err("list values must be expanded into separate placeholders".into()),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_values() {
        assert!(BindValue::Null.is_absent(false));
        assert!(BindValue::from("").is_absent(false));
        assert!(!BindValue::from("").is_absent(true));
        assert!(BindValue::List(vec![]).is_absent(false));
        assert!(BindValue::from(vec![None::<i32>, None]).is_absent(false));
        assert!(!BindValue::from(0).is_absent(false));
    }

    #[test]
    fn literal_rendering() {
        assert_eq!(BindValue::from("O'Brien").to_literal(), "'O''Brien'");
        assert_eq!(BindValue::from(12i64).to_literal(), "12");
        let d = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(BindValue::from(d).to_literal(), "'2024-03-09'");
        assert_eq!(BindValue::from(vec![1, 2]).to_literal(), "1, 2");
    }

    #[test]
    fn embeddable_literal_rejects_strings() {
        assert_eq!(BindValue::from(3).embeddable_literal().as_deref(), Some("3"));
        assert!(BindValue::from("FML").embeddable_literal().is_none());
        assert!(BindValue::from(ClassificationCode::text("FML")).embeddable_literal().is_none());
        assert_eq!(
            BindValue::from(ClassificationCode::numeric("2")).embeddable_literal().as_deref(),
            Some("2")
        );
    }

    #[test]
    fn option_maps_to_null() {
        assert_eq!(BindValue::from(None::<&str>), BindValue::Null);
        assert_eq!(BindValue::from(Some(5)), BindValue::Int(5));
    }
}
