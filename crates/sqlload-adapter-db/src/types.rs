//! SQL type codes and column descriptors.
//!
//! Type codes use the ODBC/JDBC numbering so codes reported by any
//! metadata source compare equal. Codes without a named variant are kept in
//! [`SqlType::Other`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static TYPE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([A-Za-z][A-Za-z0-9_ ]*?)\s*(?:\(.*\))?\s*(?:UNSIGNED)?\s*$")
        .unwrap_or_else(|err| panic!("type label pattern is invalid: {err}"))
});

/// Destination column SQL type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Real,
    Double,
    Numeric,
    Decimal,
    Char,
    VarChar,
    LongVarChar,
    NChar,
    NVarChar,
    LongNVarChar,
    Clob,
    NClob,
    Date,
    Time,
    Timestamp,
    Boolean,
    /// Any other type code (binary, blob, array, ...)
    Other(i32),
}

impl SqlType {
    pub const OTHER_CODE: i32 = 1111;
    pub const BLOB_CODE: i32 = 2004;

    /// Map a numeric type code to a type.
    pub fn from_code(code: i32) -> Self {
        match code {
            -7 => Self::Bit,
            -6 => Self::TinyInt,
            5 => Self::SmallInt,
            4 => Self::Integer,
            -5 => Self::BigInt,
            6 => Self::Float,
            7 => Self::Real,
            8 => Self::Double,
            2 => Self::Numeric,
            3 => Self::Decimal,
            1 => Self::Char,
            12 => Self::VarChar,
            -1 => Self::LongVarChar,
            -15 => Self::NChar,
            -9 => Self::NVarChar,
            -16 => Self::LongNVarChar,
            2005 => Self::Clob,
            2011 => Self::NClob,
            91 => Self::Date,
            92 => Self::Time,
            93 => Self::Timestamp,
            16 => Self::Boolean,
            other => Self::Other(other),
        }
    }

    /// Numeric type code.
    pub fn code(self) -> i32 {
        match self {
            Self::Bit => -7,
            Self::TinyInt => -6,
            Self::SmallInt => 5,
            Self::Integer => 4,
            Self::BigInt => -5,
            Self::Float => 6,
            Self::Real => 7,
            Self::Double => 8,
            Self::Numeric => 2,
            Self::Decimal => 3,
            Self::Char => 1,
            Self::VarChar => 12,
            Self::LongVarChar => -1,
            Self::NChar => -15,
            Self::NVarChar => -9,
            Self::LongNVarChar => -16,
            Self::Clob => 2005,
            Self::NClob => 2011,
            Self::Date => 91,
            Self::Time => 92,
            Self::Timestamp => 93,
            Self::Boolean => 16,
            Self::Other(code) => code,
        }
    }

    /// Map a declared column type such as `VARCHAR(32)` or `DOUBLE PRECISION`.
    pub fn from_type_label(label: &str) -> Self {
        let Some(base) = TYPE_LABEL
            .captures(label)
            .and_then(|captures| captures.get(1))
            .map(|base| base.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        else {
            return Self::Other(Self::OTHER_CODE);
        };

        match base.to_ascii_uppercase().as_str() {
            "BIT" => Self::Bit,
            "TINYINT" => Self::TinyInt,
            "SMALLINT" | "INT2" => Self::SmallInt,
            "INT" | "INTEGER" | "MEDIUMINT" | "INT4" => Self::Integer,
            "BIGINT" | "INT8" | "UNSIGNED BIG INT" => Self::BigInt,
            "FLOAT" | "FLOAT4" => Self::Float,
            // libsql stores REAL as an 8-byte float
            "REAL" | "DOUBLE" | "DOUBLE PRECISION" | "FLOAT8" => Self::Double,
            "NUMERIC" => Self::Numeric,
            "DECIMAL" | "DEC" => Self::Decimal,
            "CHAR" | "CHARACTER" => Self::Char,
            "VARCHAR" | "CHARACTER VARYING" | "VARYING CHARACTER" => Self::VarChar,
            "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "LONG VARCHAR" => Self::LongVarChar,
            "NCHAR" | "NATIVE CHARACTER" | "NATIONAL CHARACTER" => Self::NChar,
            "NVARCHAR" | "NATIONAL CHARACTER VARYING" => Self::NVarChar,
            "NTEXT" | "LONG NVARCHAR" => Self::LongNVarChar,
            "CLOB" => Self::Clob,
            "NCLOB" => Self::NClob,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "TIMESTAMP" | "DATETIME" => Self::Timestamp,
            "BOOLEAN" | "BOOL" => Self::Boolean,
            "BLOB" | "BINARY" | "VARBINARY" => Self::Other(Self::BLOB_CODE),
            _ => Self::Other(Self::OTHER_CODE),
        }
    }

    pub fn is_character(self) -> bool {
        matches!(
            self,
            Self::Char
                | Self::NChar
                | Self::Clob
                | Self::NClob
                | Self::VarChar
                | Self::LongVarChar
                | Self::NVarChar
                | Self::LongNVarChar
        )
    }

    /// Integer family, including exact decimals and type code 7 bound as integers.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::SmallInt
                | Self::Integer
                | Self::BigInt
                | Self::Numeric
                | Self::Decimal
                | Self::Real
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }
}

/// Destination column: name, type code and declared type label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub sql_type: SqlType,
    pub type_label: String,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, sql_type: SqlType, type_label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type,
            type_label: type_label.into(),
        }
    }

    /// Descriptor whose type is derived from its declared label.
    pub fn from_label(name: impl Into<String>, type_label: impl Into<String>) -> Self {
        let type_label = type_label.into();
        Self {
            name: name.into(),
            sql_type: SqlType::from_type_label(&type_label),
            type_label,
        }
    }

    pub fn code(&self) -> i32 {
        self.sql_type.code()
    }
}
