//! `TableStructure`: the header-derived metadata describing a DBF's field
//! list, record geometry, and pairing flags.

use crate::date::Date;
use crate::error::{DbaseError, DbaseResult};
use crate::field::Field;

/// Pure container holding the field list plus the header-level bookkeeping
/// fields that describe the file's on-disk geometry.
#[derive(Debug, Clone)]
pub struct TableStructure {
    fields: Vec<Field>,
    pub header_length: u16,
    pub record_length: u16,
    pub record_count: u32,
    pub last_updated: Date,
    pub dbt_paired: bool,
    pub mdx_paired: bool,
    pub memo_exists: bool,
    pub transaction_active: bool,
    pub data_encrypted: bool,
}

impl TableStructure {
    /// Build a structure from a field list, rejecting duplicate names and
    /// computing header/record lengths immediately.
    pub fn new(fields: Vec<Field>) -> DbaseResult<TableStructure> {
        let mut seen = std::collections::HashSet::new();
        for field in &fields {
            if !seen.insert(field.name().to_string()) {
                return Err(DbaseError::invalid(format!(
                    "duplicate field name {:?}",
                    field.name()
                )));
            }
        }
        let memo_exists = fields.iter().any(|f| f.field_type().is_memo_like());
        let mut structure = TableStructure {
            fields,
            header_length: 0,
            record_length: 0,
            record_count: 0,
            last_updated: Date::blank(),
            dbt_paired: memo_exists,
            mdx_paired: false,
            memo_exists,
            transaction_active: false,
            data_encrypted: false,
        };
        structure.calculate_lengths()?;
        Ok(structure)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        let name = name.to_ascii_uppercase();
        self.fields.iter().position(|f| f.name() == name)
    }

    pub fn field(&self, index: usize) -> DbaseResult<&Field> {
        self.fields
            .get(index)
            .ok_or_else(|| DbaseError::invalid(format!("field index {index} out of range")))
    }

    /// Byte offset of `field_index`'s value within a record, not counting
    /// the leading deletion-flag byte.
    pub fn field_offset(&self, field_index: usize) -> usize {
        self.fields[..field_index]
            .iter()
            .map(|f| f.length() as usize)
            .sum()
    }

    /// Overwrite the header-derived bookkeeping fields with values read back
    /// from an existing file's header, as opposed to the freshly-computed
    /// defaults `new` assigns for a table being created from scratch.
    pub(crate) fn apply_loaded_header(
        &mut self,
        header_length: u16,
        record_length: u16,
        record_count: u32,
        last_updated: Date,
        dbt_paired: bool,
        mdx_paired: bool,
        transaction_active: bool,
        data_encrypted: bool,
    ) {
        self.header_length = header_length;
        self.record_length = record_length;
        self.record_count = record_count;
        self.last_updated = last_updated;
        self.dbt_paired = dbt_paired;
        self.mdx_paired = mdx_paired;
        self.transaction_active = transaction_active;
        self.data_encrypted = data_encrypted;
    }

    /// Recompute `record_length` and `header_length` from the field list.
    /// `header_length = 32 + 32 * field_count + 1`;
    /// `record_length = 1 + sum(field.length)`.
    pub fn calculate_lengths(&mut self) -> DbaseResult<()> {
        let record_length = 1 + self
            .fields
            .iter()
            .map(|f| f.length() as usize)
            .sum::<usize>();
        let header_length = 32 + 32 * self.fields.len() + 1;
        if header_length > 65535 {
            return Err(DbaseError::invalid(
                "header length exceeds 65535 bytes for this many fields",
            ));
        }
        if record_length == 0 || record_length > 65535 {
            return Err(DbaseError::invalid(format!(
                "record length {record_length} out of range 1..65535"
            )));
        }
        self.header_length = header_length as u16;
        self.record_length = record_length as u16;
        Ok(())
    }
}
