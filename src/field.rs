//! Field type tags and the field descriptor that pairs a name/type/length
//! with its default value.

use crate::date::Date;
use crate::error::{DbaseError, DbaseResult};
use crate::value::FieldValue;
use std::fmt;

/// One of the field type codes a DBF field descriptor can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Character,
    Numeric,
    Logical,
    DateType,
    Memo,
    BinaryMemo,
    GeneralMemo,
    Float,
    Unknown,
}

impl FieldType {
    pub fn from_code(code: u8) -> FieldType {
        match code {
            b'C' => FieldType::Character,
            b'N' => FieldType::Numeric,
            b'L' => FieldType::Logical,
            b'D' => FieldType::DateType,
            b'M' => FieldType::Memo,
            b'B' => FieldType::BinaryMemo,
            b'G' => FieldType::GeneralMemo,
            b'F' => FieldType::Float,
            _ => FieldType::Unknown,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            FieldType::Character => b'C',
            FieldType::Numeric => b'N',
            FieldType::Logical => b'L',
            FieldType::DateType => b'D',
            FieldType::Memo => b'M',
            FieldType::BinaryMemo => b'B',
            FieldType::GeneralMemo => b'G',
            FieldType::Float => b'F',
            FieldType::Unknown => b'U',
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FieldType::Character => "Character",
            FieldType::Numeric => "Numeric",
            FieldType::Logical => "Logical",
            FieldType::DateType => "Date",
            FieldType::Memo => "Memo",
            FieldType::BinaryMemo => "Binary Memo",
            FieldType::GeneralMemo => "General Memo",
            FieldType::Float => "Float",
            FieldType::Unknown => "Unknown",
        }
    }

    pub fn is_character_like(&self) -> bool {
        matches!(self, FieldType::Character)
    }

    pub fn is_date_like(&self) -> bool {
        matches!(self, FieldType::DateType)
    }

    pub fn is_numeric_like(&self) -> bool {
        matches!(self, FieldType::Numeric | FieldType::Float)
    }

    pub fn is_boolean_like(&self) -> bool {
        matches!(self, FieldType::Logical)
    }

    /// Memo-like fields are stored in the DBT side file; the DBF column
    /// itself only holds the 10-byte ASCII block number.
    pub fn is_memo_like(&self) -> bool {
        matches!(
            self,
            FieldType::Memo | FieldType::BinaryMemo | FieldType::GeneralMemo
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A single field descriptor: name, type, byte length, and decimal count.
///
/// Construction normalizes the triple the way the on-disk format requires:
/// `D` always has length 8 and 0 decimals, `L` always has length 1 and 0
/// decimals, and `C`/`M` always have 0 decimals (for `C`, a length over 255
/// is split across the length byte and the decimals byte, which doubles as
/// the high byte of a 16-bit length).
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    field_type: FieldType,
    length: u32,
    decimals: u8,
}

impl Field {
    pub fn new(name: &str, field_type: FieldType, length: u32, decimals: u8) -> DbaseResult<Field> {
        if name.is_empty() || name.len() > 10 {
            return Err(DbaseError::invalid(format!(
                "field name {:?} must be 1-10 ASCII bytes",
                name
            )));
        }
        if length == 0 || length > 65535 {
            return Err(DbaseError::invalid(format!(
                "field length {length} out of range 1..65535"
            )));
        }

        let (length, decimals) = match field_type {
            FieldType::DateType => (8, 0),
            FieldType::Logical => (1, 0),
            FieldType::Character | FieldType::Memo => (length, 0),
            _ => {
                if decimals as u32 > length {
                    return Err(DbaseError::invalid(format!(
                        "decimals {decimals} exceeds length {length}"
                    )));
                }
                (length, decimals)
            }
        };

        Ok(Field {
            name: name.to_ascii_uppercase(),
            field_type,
            length,
            decimals,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// The decimal count byte on disk: for `C` fields longer than 255 bytes
    /// this doubles as the high byte of a 16-bit length; otherwise it is
    /// the plain decimal count.
    pub fn decimals_byte(&self) -> u8 {
        if self.field_type == FieldType::Character && self.length > 255 {
            (self.length >> 8) as u8
        } else {
            self.decimals
        }
    }

    /// The length byte on disk, always the low 8 bits of `length`.
    pub fn length_byte(&self) -> u8 {
        (self.length & 0xFF) as u8
    }

    /// Reconstruct a field's length from its on-disk length/decimals bytes.
    pub fn decode_length(field_type: FieldType, length_byte: u8, decimals_byte: u8) -> u32 {
        if field_type == FieldType::Character && decimals_byte != 0 {
            ((decimals_byte as u32) << 8) | length_byte as u32
        } else {
            length_byte as u32
        }
    }

    pub fn default_value(&self) -> FieldValue {
        match self.field_type {
            FieldType::Character | FieldType::Memo => FieldValue::Character(String::new()),
            FieldType::BinaryMemo | FieldType::GeneralMemo => FieldValue::Memo(Vec::new()),
            FieldType::Numeric | FieldType::Float => FieldValue::Numeric(0.0),
            FieldType::Logical => FieldValue::Logical(false),
            FieldType::DateType => FieldValue::DateValue(Date::blank()),
            FieldType::Unknown => FieldValue::Character(String::new()),
        }
    }
}
