#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # sqlload-record
//!
//! Typed field and row model for records pulled from an upstream source.
//!
//! Fields are loosely typed: a string field can be read as an integer, a
//! float, a boolean or a date-time when the destination column asks for it.
//! The conversions live here so every writer interprets values the same way.

/// Field values and their loose conversions.
pub mod field;
/// Fixed-arity rows of fields.
pub mod row;

pub use field::Field;
pub use row::Row;

use thiserror::Error;

/// Errors that can occur when converting field values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Cannot convert {kind} value '{value}' to {target}")]
    Conversion {
        kind: &'static str,
        value: String,
        target: &'static str,
    },
}

impl Error {
    /// Build a conversion error for a value that cannot become `target`.
    pub fn conversion(kind: &'static str, value: impl Into<String>, target: &'static str) -> Self {
        Self::Conversion {
            kind,
            value: value.into(),
            target,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_error_names_value_and_target() {
        let error = Error::conversion("string", "abc", "long");
        assert_eq!(
            error.to_string(),
            "Cannot convert string value 'abc' to long"
        );
    }
}
