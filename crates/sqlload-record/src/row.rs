//! Fixed-arity rows

use serde::{Deserialize, Serialize};

use crate::Field;

/// An ordered sequence of fields, immutable once read from the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    fields: Vec<Field>,
}

impl Row {
    /// Create a row from its fields
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Number of fields in the row
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field at a column position
    pub fn get(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.fields.iter()
    }

    pub fn into_fields(self) -> Vec<Field> {
        self.fields
    }
}

impl From<Vec<Field>> for Row {
    fn from(fields: Vec<Field>) -> Self {
        Self::new(fields)
    }
}

impl FromIterator<Field> for Row {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// Build a [`Row`] from a list of values convertible into [`Field`].
#[macro_export]
macro_rules! row {
    ($($value:expr),* $(,)?) => {
        $crate::Row::new(vec![$($crate::Field::from($value)),*])
    };
}
