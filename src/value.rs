//! `FieldValue`: the tagged value variant a decoded record field is handed
//! back as, per the "dynamic typing of field values" design note.

use crate::date::Date;
use crate::error::{DbaseError, DbaseResult};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Character(String),
    Numeric(f64),
    Logical(bool),
    DateValue(Date),
    Memo(Vec<u8>),
}

impl FieldValue {
    pub fn as_str(&self) -> DbaseResult<&str> {
        match self {
            FieldValue::Character(s) => Ok(s.as_str()),
            other => Err(DbaseError::invalid(format!(
                "{other:?} does not support a string projection"
            ))),
        }
    }

    pub fn as_f64(&self) -> DbaseResult<f64> {
        match self {
            FieldValue::Numeric(n) => Ok(*n),
            other => Err(DbaseError::invalid(format!(
                "{other:?} does not support a numeric projection"
            ))),
        }
    }

    pub fn as_bool(&self) -> DbaseResult<bool> {
        match self {
            FieldValue::Logical(b) => Ok(*b),
            other => Err(DbaseError::invalid(format!(
                "{other:?} does not support a boolean projection"
            ))),
        }
    }

    pub fn as_date(&self) -> DbaseResult<Date> {
        match self {
            FieldValue::DateValue(d) => Ok(*d),
            other => Err(DbaseError::invalid(format!(
                "{other:?} does not support a date projection"
            ))),
        }
    }

    pub fn as_bytes(&self) -> DbaseResult<&[u8]> {
        match self {
            FieldValue::Memo(b) => Ok(b.as_slice()),
            FieldValue::Character(s) => Ok(s.as_bytes()),
            other => Err(DbaseError::invalid(format!(
                "{other:?} does not support a bytes projection"
            ))),
        }
    }

    /// Stringify the value the way `replace` needs to for writing it back
    /// into a non-memo fixed-width column.
    pub fn to_field_string(&self, decimals: u8) -> String {
        match self {
            FieldValue::Character(s) => s.clone(),
            FieldValue::Numeric(n) => format!("{:.*}", decimals as usize, n),
            FieldValue::Logical(b) => if *b { "T" } else { "F" }.to_string(),
            FieldValue::DateValue(d) => d.dtos(),
            FieldValue::Memo(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projections_succeed_for_the_matching_variant() {
        assert_eq!(FieldValue::Character("hi".into()).as_str().unwrap(), "hi");
        assert_eq!(FieldValue::Numeric(3.5).as_f64().unwrap(), 3.5);
        assert!(FieldValue::Logical(true).as_bool().unwrap());
        assert!(FieldValue::DateValue(Date::blank()).as_date().unwrap().is_blank());
    }

    #[test]
    fn mismatched_projection_is_invalid_argument() {
        let err = FieldValue::Numeric(1.0).as_str().unwrap_err();
        assert!(matches!(err, DbaseError::InvalidArgument { .. }));
    }

    #[test]
    fn numeric_stringify_respects_decimals() {
        assert_eq!(FieldValue::Numeric(3.14159).to_field_string(2), "3.14");
    }
}
