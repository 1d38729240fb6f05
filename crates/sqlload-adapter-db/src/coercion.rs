//! Field to SQL parameter coercion.
//!
//! Each destination column type has one coercion rule. Null values are always
//! bound as a real SQL `NULL` parameter, whatever the column type.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use sqlload_record::Field;

use crate::sql::quote_literal;
use crate::types::{ColumnDescriptor, SqlType};
use crate::{Error, Result};

/// A coerced, bind-ready SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl SqlParam {
    /// Literal SQL text for this value, used when statements are rendered
    /// without bind parameters.
    pub fn to_literal(&self) -> String {
        match self {
            SqlParam::Null => "NULL".to_string(),
            SqlParam::Text(value) => quote_literal(value),
            SqlParam::Integer(value) => value.to_string(),
            SqlParam::Real(value) => value.to_string(),
            SqlParam::Boolean(value) => String::from(if *value { "1" } else { "0" }),
            SqlParam::Date(value) => quote_literal(&date_text(value)),
            SqlParam::Time(value) => quote_literal(&time_text(value)),
            SqlParam::Timestamp(value) => quote_literal(&timestamp_text(value)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlParam::Null)
    }
}

impl From<SqlParam> for libsql::Value {
    fn from(param: SqlParam) -> Self {
        match param {
            SqlParam::Null => libsql::Value::Null,
            SqlParam::Text(value) => libsql::Value::Text(value),
            SqlParam::Integer(value) => libsql::Value::Integer(value),
            SqlParam::Real(value) => libsql::Value::Real(value),
            SqlParam::Boolean(value) => libsql::Value::Integer(i64::from(value)),
            SqlParam::Date(value) => libsql::Value::Text(date_text(&value)),
            SqlParam::Time(value) => libsql::Value::Text(time_text(&value)),
            SqlParam::Timestamp(value) => libsql::Value::Text(timestamp_text(&value)),
        }
    }
}

fn date_text(value: &NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

fn time_text(value: &NaiveTime) -> String {
    if value.nanosecond() == 0 {
        value.format("%H:%M:%S").to_string()
    } else {
        value.format("%H:%M:%S%.f").to_string()
    }
}

fn timestamp_text(value: &NaiveDateTime) -> String {
    if value.nanosecond() == 0 {
        value.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        value.format("%Y-%m-%d %H:%M:%S%.f").to_string()
    }
}

/// Converts fields into parameters for their destination column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Coercer {
    empty_as_null: bool,
}

impl Coercer {
    pub fn new(empty_as_null: bool) -> Self {
        Self { empty_as_null }
    }

    pub fn empty_as_null(&self) -> bool {
        self.empty_as_null
    }

    /// Whether a coercion rule exists for the type.
    pub fn supports(sql_type: SqlType) -> bool {
        sql_type.is_character()
            || sql_type.is_integer()
            || sql_type.is_floating()
            || matches!(
                sql_type,
                SqlType::TinyInt
                    | SqlType::Date
                    | SqlType::Time
                    | SqlType::Timestamp
                    | SqlType::Boolean
                    | SqlType::Bit
            )
    }

    /// Fail with an unsupported-type error when no rule exists for the column.
    pub fn check_supported(column: &ColumnDescriptor) -> Result<()> {
        if Self::supports(column.sql_type) {
            Ok(())
        } else {
            Err(Error::UnsupportedType {
                column: column.name.clone(),
                code: column.code(),
                label: column.type_label.clone(),
            })
        }
    }

    /// Coerce one field for its destination column.
    pub fn coerce(&self, column: &ColumnDescriptor, field: &Field) -> Result<SqlParam> {
        let sql_type = column.sql_type;

        if sql_type.is_character() {
            return Ok(field.as_string().map_or(SqlParam::Null, SqlParam::Text));
        }

        if sql_type.is_integer() {
            if self.binds_null(field) {
                return Ok(SqlParam::Null);
            }
            return field
                .as_long()
                .map(|value| value.map_or(SqlParam::Null, SqlParam::Integer))
                .map_err(|err| Error::conversion(&column.name, err.to_string()));
        }

        if sql_type.is_floating() {
            if self.binds_null(field) {
                return Ok(SqlParam::Null);
            }
            return match field.as_double() {
                Ok(None) => Ok(SqlParam::Null),
                Ok(Some(value)) if value.is_finite() => Ok(SqlParam::Real(value)),
                Ok(Some(value)) => Err(Error::conversion(
                    &column.name,
                    format!("non-finite value {value} cannot be stored"),
                )),
                Err(err) => Err(Error::conversion(&column.name, err.to_string())),
            };
        }

        match sql_type {
            // Some destinations store booleans as single-byte integers.
            SqlType::TinyInt => field
                .as_long()
                .map(|value| value.map_or(SqlParam::Null, SqlParam::Integer))
                .map_err(|err| Error::conversion(&column.name, err.to_string())),
            SqlType::Date => {
                Ok(Self::date_time(column, field, "DATE")?.map_or(SqlParam::Null, |value| {
                    SqlParam::Date(value.date())
                }))
            }
            SqlType::Time => {
                Ok(Self::date_time(column, field, "TIME")?.map_or(SqlParam::Null, |value| {
                    SqlParam::Time(value.time())
                }))
            }
            SqlType::Timestamp => Ok(Self::date_time(column, field, "TIMESTAMP")?
                .map_or(SqlParam::Null, SqlParam::Timestamp)),
            SqlType::Boolean | SqlType::Bit => field
                .as_bool()
                .map(|value| value.map_or(SqlParam::Null, SqlParam::Boolean))
                .map_err(|err| Error::conversion(&column.name, err.to_string())),
            _ => Err(Error::UnsupportedType {
                column: column.name.clone(),
                code: column.code(),
                label: column.type_label.clone(),
            }),
        }
    }

    fn binds_null(&self, field: &Field) -> bool {
        match field.as_string() {
            None => true,
            Some(text) => self.empty_as_null && text.is_empty(),
        }
    }

    fn date_time(
        column: &ColumnDescriptor,
        field: &Field,
        label: &str,
    ) -> Result<Option<NaiveDateTime>> {
        if field.raw_text() == Some("") {
            return Ok(None);
        }
        field.as_date().map_err(|_| {
            Error::conversion(
                &column.name,
                format!(
                    "{label} conversion failed: [{}]",
                    field.as_string().unwrap_or_default()
                ),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, sql_type: SqlType) -> ColumnDescriptor {
        ColumnDescriptor::new(name, sql_type, format!("{sql_type:?}"))
    }

    #[test]
    fn test_character_columns_pass_text_verbatim() {
        let coercer = Coercer::default();
        let name = column("name", SqlType::VarChar);
        assert_eq!(
            coercer.coerce(&name, &Field::from("O'Brien")).unwrap(),
            SqlParam::Text("O'Brien".to_string())
        );
        assert_eq!(
            coercer.coerce(&name, &Field::Long(7)).unwrap(),
            SqlParam::Text("7".to_string())
        );
        assert_eq!(coercer.coerce(&name, &Field::Null).unwrap(), SqlParam::Null);
        assert_eq!(
            coercer.coerce(&name, &Field::from("")).unwrap(),
            SqlParam::Text(String::new())
        );
    }

    #[test]
    fn test_integer_family() {
        let coercer = Coercer::default();
        for sql_type in [
            SqlType::SmallInt,
            SqlType::Integer,
            SqlType::BigInt,
            SqlType::Numeric,
            SqlType::Decimal,
            SqlType::Real,
        ] {
            let id = column("id", sql_type);
            assert_eq!(
                coercer.coerce(&id, &Field::from("42")).unwrap(),
                SqlParam::Integer(42)
            );
            assert_eq!(coercer.coerce(&id, &Field::Null).unwrap(), SqlParam::Null);
        }
    }

    #[test]
    fn test_empty_numeric_with_empty_as_null() {
        let coercer = Coercer::new(true);
        assert_eq!(
            coercer
                .coerce(&column("qty", SqlType::Integer), &Field::from(""))
                .unwrap(),
            SqlParam::Null
        );
        assert_eq!(
            coercer
                .coerce(&column("price", SqlType::Double), &Field::from(""))
                .unwrap(),
            SqlParam::Null
        );
    }

    #[test]
    fn test_empty_numeric_without_empty_as_null_is_conversion_error() {
        let coercer = Coercer::new(false);
        let err = coercer
            .coerce(&column("qty", SqlType::Integer), &Field::from(""))
            .unwrap_err();
        assert!(matches!(err, Error::Conversion { ref column, .. } if column == "qty"));
        assert!(err.is_row_level());

        let err = coercer
            .coerce(&column("price", SqlType::Float), &Field::from(""))
            .unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }));
    }

    #[test]
    fn test_floating_columns() {
        let coercer = Coercer::default();
        let price = column("price", SqlType::Double);
        assert_eq!(
            coercer.coerce(&price, &Field::from("19.99")).unwrap(),
            SqlParam::Real(19.99)
        );
        assert!(coercer.coerce(&price, &Field::from("NaN")).is_err());
    }

    #[test]
    fn test_real_label_keeps_fraction() {
        let coercer = Coercer::default();
        let amount = ColumnDescriptor::from_label("amount", "REAL");
        assert_eq!(
            coercer.coerce(&amount, &Field::from("19.99")).unwrap(),
            SqlParam::Real(19.99)
        );
    }

    #[test]
    fn test_tinyint_binds_integer() {
        let coercer = Coercer::new(true);
        let flag = column("flag", SqlType::TinyInt);
        assert_eq!(
            coercer.coerce(&flag, &Field::Bool(true)).unwrap(),
            SqlParam::Integer(1)
        );
        assert_eq!(coercer.coerce(&flag, &Field::Null).unwrap(), SqlParam::Null);
        // no empty-as-null handling for single-byte integers
        assert!(coercer.coerce(&flag, &Field::from("")).is_err());
    }

    #[test]
    fn test_date_time_columns() {
        let coercer = Coercer::default();
        let value = Field::from("2024-05-06 07:08:09");

        assert_eq!(
            coercer.coerce(&column("d", SqlType::Date), &value).unwrap(),
            SqlParam::Date(NaiveDate::from_ymd_opt(2024, 5, 6).unwrap())
        );
        assert_eq!(
            coercer.coerce(&column("t", SqlType::Time), &value).unwrap(),
            SqlParam::Time(NaiveTime::from_hms_opt(7, 8, 9).unwrap())
        );
        assert_eq!(
            coercer
                .coerce(&column("ts", SqlType::Timestamp), &value)
                .unwrap(),
            SqlParam::Timestamp(
                NaiveDate::from_ymd_opt(2024, 5, 6)
                    .unwrap()
                    .and_hms_opt(7, 8, 9)
                    .unwrap()
            )
        );
    }

    #[test]
    fn test_empty_date_binds_null() {
        let coercer = Coercer::new(false);
        for sql_type in [SqlType::Date, SqlType::Time, SqlType::Timestamp] {
            assert_eq!(
                coercer
                    .coerce(&column("when", sql_type), &Field::from(""))
                    .unwrap(),
                SqlParam::Null
            );
        }
    }

    #[test]
    fn test_unparseable_date_names_value() {
        let coercer = Coercer::default();
        let err = coercer
            .coerce(&column("created", SqlType::Date), &Field::from("31/31/2024"))
            .unwrap_err();
        assert!(err.to_string().contains("DATE conversion failed: [31/31/2024]"));
        assert!(err.is_row_level());
    }

    #[test]
    fn test_boolean_columns() {
        let coercer = Coercer::default();
        let active = column("active", SqlType::Boolean);
        assert_eq!(
            coercer.coerce(&active, &Field::from("true")).unwrap(),
            SqlParam::Boolean(true)
        );
        assert_eq!(
            coercer
                .coerce(&column("bit", SqlType::Bit), &Field::Long(0))
                .unwrap(),
            SqlParam::Boolean(false)
        );
    }

    #[test]
    fn test_unsupported_type() {
        let coercer = Coercer::default();
        let payload = ColumnDescriptor::new("payload", SqlType::Other(2004), "BLOB");
        let err = coercer.coerce(&payload, &Field::from("x")).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedType { ref column, code: 2004, ref label }
                if column == "payload" && label == "BLOB"
        ));
        assert!(Coercer::check_supported(&payload).is_err());
        assert!(Coercer::check_supported(&column("id", SqlType::Integer)).is_ok());
    }

    #[test]
    fn test_literals() {
        assert_eq!(SqlParam::Null.to_literal(), "NULL");
        assert_eq!(SqlParam::Text("it's".to_string()).to_literal(), "'it''s'");
        assert_eq!(SqlParam::Integer(-5).to_literal(), "-5");
        assert_eq!(SqlParam::Real(1.5).to_literal(), "1.5");
        assert_eq!(SqlParam::Boolean(true).to_literal(), "1");
        assert_eq!(
            SqlParam::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()).to_literal(),
            "'2024-01-02'"
        );
        assert_eq!(
            SqlParam::Time(NaiveTime::from_hms_opt(3, 4, 5).unwrap()).to_literal(),
            "'03:04:05'"
        );
        assert_eq!(
            SqlParam::Timestamp(
                NaiveDate::from_ymd_opt(2024, 1, 2)
                    .unwrap()
                    .and_hms_milli_opt(3, 4, 5, 250)
                    .unwrap()
            )
            .to_literal(),
            "'2024-01-02 03:04:05.250'"
        );
    }

    #[test]
    fn test_libsql_values() {
        assert!(matches!(
            libsql::Value::from(SqlParam::Boolean(true)),
            libsql::Value::Integer(1)
        ));
        assert!(matches!(
            libsql::Value::from(SqlParam::Null),
            libsql::Value::Null
        ));
        assert!(matches!(
            libsql::Value::from(SqlParam::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())),
            libsql::Value::Text(ref text) if text == "2024-01-02"
        ));
    }
}
