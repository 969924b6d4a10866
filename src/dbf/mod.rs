//! The DBF table engine (C6): header/field-descriptor parsing, the
//! record-cursor state machine, field decode/replace, delete/undelete, and
//! growth.

#[cfg(test)]
mod tests;

use crate::codec::{ascii_string, buffered_read, read_u16_le, read_u32_le, trim_padded_ascii, write_u16_le, write_u32_le};
use crate::config::Config;
use crate::date::Date;
use crate::dbt::DbtStore;
use crate::error::{DbaseError, DbaseResult};
use crate::field::{Field, FieldType};
use crate::lock::{IntrinsicLock, LockKind, RegionLockGuard};
use crate::structure::TableStructure;
use crate::value::FieldValue;
use chrono::Datelike;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Cursor sentinel: no record positioned yet.
pub const RECORD_NUMBER_BOF: i64 = 0;
/// Cursor sentinel: past the last record (also the "no match" index result).
pub const RECORD_NUMBER_EOF: i64 = -1;

const HEADER_TERMINATOR: u8 = 0x0D;
const FILE_EOF_MARKER: u8 = 0x1A;
const FIELD_DESCRIPTOR_SIZE: usize = 32;
const MAX_FILE_SIZE: u64 = 1 << 31;

/// An open dBase table: header-derived structure, an optional paired memo
/// store, and a single mutable cursor position.
///
/// Per the documented caveat in §5, callers must not open two `Dbf` handles
/// onto the same file from the same process; isolation across handles is
/// provided only by the advisory file-region locks, not by this type.
pub struct Dbf {
    file: File,
    path: PathBuf,
    structure: TableStructure,
    dbt: Option<DbtStore>,
    config: Config,
    lock: IntrinsicLock,
    current_record_number: i64,
    current_record_deleted: bool,
    current_record_raw: Vec<u8>,
    decoded_values: Vec<FieldValue>,
}

impl Dbf {
    /// Open an existing DBF (and its paired DBT, if the header says one
    /// exists), positioning the cursor at BOF.
    pub fn open(path: impl AsRef<Path>, config: Config, lock: IntrinsicLock) -> DbaseResult<Dbf> {
        let path = config.resolve_path(path);
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let header = lock.with_lock(config.thread_safety_enabled, || -> DbaseResult<Vec<u8>> {
            let _guard = RegionLockGuard::acquire(&file, 0, 32, LockKind::Shared, config.file_locking_enabled)?;
            buffered_read(&mut file, 0, 32)
        })?;

        let signature = header[0];
        let version_byte = signature & 0x07;
        if !matches!(version_byte, 0x02..=0x05) {
            log::warn!("unrecognized DBF version byte {version_byte:#04x}; continuing anyway");
        }
        let memo_exists = signature & 0x08 != 0;
        let dbt_paired = signature & 0x80 != 0;
        let last_updated = Date::new(header[2], header[3], header[1] as i16 + 1900);
        let record_count = read_u32_le(&header[4..8]);
        let header_length = read_u16_le(&header[8..10]);
        let record_length = read_u16_le(&header[10..12]);
        let transaction_active = header[14] != 0;
        let data_encrypted = header[15] != 0;
        let mdx_paired = header[28] != 0;

        let field_count = (header_length as usize - 32 - 1) / FIELD_DESCRIPTOR_SIZE;
        let descriptors = buffered_read(&mut file, 32, field_count * FIELD_DESCRIPTOR_SIZE + 1)?;
        if descriptors[field_count * FIELD_DESCRIPTOR_SIZE] != HEADER_TERMINATOR {
            return Err(DbaseError::corrupt(
                "DBF header is missing its 0x0D terminator byte",
            ));
        }

        let mut fields = Vec::with_capacity(field_count);
        for i in 0..field_count {
            let d = &descriptors[i * FIELD_DESCRIPTOR_SIZE..(i + 1) * FIELD_DESCRIPTOR_SIZE];
            let name = ascii_string(&d[0..11]);
            let field_type = FieldType::from_code(d[11]);
            let length_byte = d[16];
            let decimals_byte = d[17];
            let length = Field::decode_length(field_type, length_byte, decimals_byte);
            let decimals = if field_type.is_character_like() || field_type.is_memo_like() {
                0
            } else {
                decimals_byte
            };
            fields.push(Field::new(&name, field_type, length.max(1), decimals)?);
        }

        let mut structure = TableStructure::new(fields)?;
        structure.apply_loaded_header(
            header_length,
            record_length,
            record_count,
            last_updated,
            dbt_paired,
            mdx_paired,
            transaction_active,
            data_encrypted,
        );

        let dbt = if memo_exists || dbt_paired {
            Some(DbtStore::open(DbtStore::derive_path(&path))?)
        } else {
            None
        };

        let mut dbf = Dbf {
            file,
            path,
            structure,
            dbt,
            config,
            lock,
            current_record_number: RECORD_NUMBER_BOF,
            current_record_deleted: false,
            current_record_raw: Vec::new(),
            decoded_values: Vec::new(),
        };
        dbf.goto_record(RECORD_NUMBER_BOF)?;
        Ok(dbf)
    }

    /// Create a new, empty DBF (and a paired DBT if any field is memo-like).
    pub fn create(
        path: impl AsRef<Path>,
        fields: Vec<Field>,
        config: Config,
        lock: IntrinsicLock,
    ) -> DbaseResult<Dbf> {
        let path = config.resolve_path(path);
        let structure = TableStructure::new(fields)?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .read(true)
            .truncate(true)
            .open(&path)?;

        let today = chrono::Local::now().date_naive();
        let today = Date::new(today.month() as u8, today.day() as u8, today.year() as i16);

        let memo_exists = structure.memo_exists;
        let signature = 0x03u8 | if memo_exists { 0x08 | 0x80 } else { 0 };

        let mut header = vec![0u8; 32];
        header[0] = signature;
        header[1] = (today.year() - 1900).max(0) as u8;
        header[2] = today.month();
        header[3] = today.day();
        write_u32_le(&mut header[4..8], 0);
        write_u16_le(&mut header[8..10], structure.header_length);
        write_u16_le(&mut header[10..12], structure.record_length);
        file.write_all(&header)?;

        for field in structure.fields() {
            let mut descriptor = vec![0u8; FIELD_DESCRIPTOR_SIZE];
            let name_bytes = field.name().as_bytes();
            let take = name_bytes.len().min(11);
            descriptor[0..take].copy_from_slice(&name_bytes[..take]);
            descriptor[11] = field.field_type().code();
            descriptor[16] = field.length_byte();
            descriptor[17] = field.decimals_byte();
            file.write_all(&descriptor)?;
        }
        file.write_all(&[HEADER_TERMINATOR])?;
        file.write_all(&[FILE_EOF_MARKER])?;

        let dbt = if memo_exists {
            let base_name = base_name_of(&path);
            let dbt_path = DbtStore::derive_path(&path);
            Some(DbtStore::create(
                dbt_path,
                &base_name,
                config.dbt_block_size as u32 * 64,
            )?)
        } else {
            None
        };

        if config.synchronous_writes_enabled {
            file.sync_data()?;
        }

        let mut dbf = Dbf {
            file,
            path,
            structure,
            dbt,
            config,
            lock,
            current_record_number: RECORD_NUMBER_BOF,
            current_record_deleted: false,
            current_record_raw: Vec::new(),
            decoded_values: Vec::new(),
        };
        dbf.goto_record(RECORD_NUMBER_BOF)?;
        Ok(dbf)
    }

    pub fn structure(&self) -> &TableStructure {
        &self.structure
    }

    pub fn current_record_number(&self) -> i64 {
        self.current_record_number
    }

    pub fn is_bof(&self) -> bool {
        self.current_record_number == RECORD_NUMBER_BOF
    }

    pub fn is_eof(&self) -> bool {
        self.current_record_number == RECORD_NUMBER_EOF
    }

    pub fn is_current_deleted(&self) -> bool {
        self.current_record_deleted
    }

    /// Position the cursor at record `n`, clamping to BOF/EOF per §4.6. Every
    /// call re-reads the record-count field so concurrent appends by another
    /// handle become visible.
    pub fn goto_record(&mut self, n: i64) -> DbaseResult<()> {
        self.lock.with_lock(self.config.thread_safety_enabled, || -> DbaseResult<()> {
            let count = {
                let _guard = RegionLockGuard::acquire(&self.file, 4, 4, LockKind::Shared, self.config.file_locking_enabled)?;
                let bytes = buffered_read(&mut self.file, 4, 4)?;
                read_u32_le(&bytes)
            };
            self.structure.record_count = count;

            let state = if n <= 0 || count == 0 {
                RECORD_NUMBER_BOF
            } else if n as u64 > count as u64 {
                RECORD_NUMBER_EOF
            } else {
                n
            };
            self.current_record_number = state;

            if state == RECORD_NUMBER_BOF || state == RECORD_NUMBER_EOF {
                self.current_record_deleted = false;
                self.current_record_raw = vec![b' '; self.structure.record_length as usize];
                self.decoded_values = self
                    .structure
                    .fields()
                    .iter()
                    .map(Field::default_value)
                    .collect();
                Ok(())
            } else {
                self.read_record(state as u32)
            }
        })
    }

    fn record_offset(&self, record_number: u32) -> u64 {
        self.structure.header_length as u64
            + (record_number as u64 - 1) * self.structure.record_length as u64
    }

    fn read_record(&mut self, record_number: u32) -> DbaseResult<()> {
        let offset = self.record_offset(record_number);
        let record_length = self.structure.record_length as usize;
        let raw = {
            let _guard = RegionLockGuard::acquire(
                &self.file,
                offset,
                record_length as u64,
                LockKind::Shared,
                self.config.file_locking_enabled,
            )?;
            buffered_read(&mut self.file, offset, record_length)?
        };

        self.current_record_deleted = raw[0] == b'*';
        let mut decoded = Vec::with_capacity(self.structure.field_count());
        for (index, field) in self.structure.fields().iter().enumerate() {
            let start = 1 + self.structure.field_offset(index);
            let end = start + field.length() as usize;
            decoded.push(self.decode_field(field, &raw[start..end])?);
        }
        self.current_record_raw = raw;
        self.decoded_values = decoded;
        Ok(())
    }

    fn decode_field(&self, field: &Field, raw: &[u8]) -> DbaseResult<FieldValue> {
        match field.field_type() {
            FieldType::Character => {
                let trimmed = if self.config.auto_trim_enabled {
                    trim_padded_ascii(raw)
                } else {
                    raw
                };
                Ok(FieldValue::Character(
                    self.config.encoding.decode(trimmed).0.into_owned(),
                ))
            }
            FieldType::Numeric | FieldType::Float => {
                let text = ascii_string(raw);
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Ok(field.default_value())
                } else {
                    let value: f64 = trimmed
                        .parse()
                        .map_err(|_| DbaseError::corrupt(format!("unparseable numeric field value {:?}", trimmed)))?;
                    Ok(FieldValue::Numeric(value))
                }
            }
            FieldType::DateType => {
                if raw.is_empty() || raw[0] == b' ' {
                    Ok(FieldValue::DateValue(Date::blank()))
                } else {
                    let text = ascii_string(raw);
                    Ok(FieldValue::DateValue(Date::parse_dtos(&text)?))
                }
            }
            FieldType::Logical => {
                let flag = raw.first().copied().unwrap_or(b' ');
                Ok(FieldValue::Logical(matches!(flag, b'y' | b'Y' | b't' | b'T')))
            }
            FieldType::Memo | FieldType::BinaryMemo | FieldType::GeneralMemo => {
                let block_text = ascii_string(raw);
                let trimmed = block_text.trim();
                if trimmed.is_empty() {
                    Ok(field.default_value())
                } else {
                    let block_number: u32 = trimmed
                        .parse()
                        .map_err(|_| DbaseError::corrupt(format!("unparseable memo block number {:?}", trimmed)))?;
                    let dbt = self
                        .dbt
                        .as_ref()
                        .ok_or_else(|| DbaseError::corrupt("memo field present with no paired DBT"))?;
                    let bytes = dbt.read_memo(block_number, self.config.file_locking_enabled)?;
                    if field.field_type() == FieldType::Memo {
                        Ok(FieldValue::Character(self.config.encoding.decode(&bytes).0.into_owned()))
                    } else {
                        Ok(FieldValue::Memo(bytes))
                    }
                }
            }
            FieldType::Unknown => Ok(FieldValue::Character(String::new())),
        }
    }

    pub fn get_value(&self, field_name: &str) -> DbaseResult<&FieldValue> {
        let index = self
            .structure
            .field_index(field_name)
            .ok_or_else(|| DbaseError::invalid(format!("no such field {field_name:?}")))?;
        Ok(&self.decoded_values[index])
    }

    pub fn get_value_at(&self, field_index: usize) -> DbaseResult<&FieldValue> {
        self.decoded_values
            .get(field_index)
            .ok_or_else(|| DbaseError::invalid(format!("field index {field_index} out of range")))
    }

    fn require_positioned(&self) -> DbaseResult<u32> {
        if self.current_record_number == RECORD_NUMBER_EOF {
            return Err(DbaseError::invalid("cursor is at EOF"));
        }
        if self.current_record_number == RECORD_NUMBER_BOF {
            return Err(DbaseError::invalid("cursor is at BOF"));
        }
        Ok(self.current_record_number as u32)
    }

    /// Replace the named field's value in the current record.
    pub fn replace(&mut self, field_name: &str, value: &FieldValue) -> DbaseResult<()> {
        let record_number = self.require_positioned()?;
        let index = self
            .structure
            .field_index(field_name)
            .ok_or_else(|| DbaseError::invalid(format!("no such field {field_name:?}")))?;
        self.replace_at(record_number, index, value)
    }

    fn replace_at(&mut self, record_number: u32, index: usize, value: &FieldValue) -> DbaseResult<()> {
        let field = self.structure.field(index)?.clone();
        let field_offset = self.structure.field_offset(index);
        let record_offset = self.record_offset(record_number);
        let column_start = 1 + field_offset;
        let column_end = column_start + field.length() as usize;

        if field.field_type().is_memo_like() {
            let old_raw = &self.current_record_raw[column_start..column_end];
            let old_text = ascii_string(old_raw);
            let old_block_number: u32 = old_text.trim().parse().unwrap_or(0);
            let dbt = self
                .dbt
                .as_ref()
                .ok_or_else(|| DbaseError::corrupt("memo field present with no paired DBT"))?;
            let old_length = if old_block_number == 0 {
                0
            } else {
                dbt.memo_length(old_block_number)?
            };
            let new_bytes: Vec<u8> = match value {
                FieldValue::Memo(bytes) => bytes.clone(),
                FieldValue::Character(s) => self.config.encoding.encode(s).0.into_owned(),
                other => self.config.encoding.encode(&other.to_field_string(0)).0.into_owned(),
            };
            let new_block_number = dbt.write_memo(
                old_block_number,
                old_length,
                &new_bytes,
                self.config.file_locking_enabled,
            )?;
            let column_bytes = crate::codec::right_justify_ascii(new_block_number as u64, field.length() as usize);
            self.current_record_raw[column_start..column_end].copy_from_slice(&column_bytes);

            let _guard = RegionLockGuard::acquire(
                &self.file,
                record_offset + column_start as u64,
                field.length() as u64,
                LockKind::Exclusive,
                self.config.file_locking_enabled,
            )?;
            self.file.seek(SeekFrom::Start(record_offset + column_start as u64))?;
            self.file.write_all(&column_bytes)?;
        } else {
            let text = value.to_field_string(field.decimals());
            let encoded: Vec<u8> = if field.field_type().is_character_like() {
                self.config.encoding.encode(&text).0.into_owned()
            } else {
                text.into_bytes()
            };
            let mut column_bytes = vec![b' '; field.length() as usize];
            let take = encoded.len().min(column_bytes.len());
            if field.field_type().is_numeric_like() || field.field_type().is_boolean_like() {
                let start = column_bytes.len() - take;
                column_bytes[start..].copy_from_slice(&encoded[encoded.len() - take..]);
            } else {
                column_bytes[..take].copy_from_slice(&encoded[..take]);
            }
            self.current_record_raw[column_start..column_end].copy_from_slice(&column_bytes);

            let _guard = RegionLockGuard::acquire(
                &self.file,
                record_offset + column_start as u64,
                field.length() as u64,
                LockKind::Exclusive,
                self.config.file_locking_enabled,
            )?;
            self.file.seek(SeekFrom::Start(record_offset + column_start as u64))?;
            self.file.write_all(&column_bytes)?;
        }

        if record_number as i64 == self.current_record_number {
            self.decoded_values[index] = self.decode_field(&field, &self.current_record_raw[column_start..column_end])?;
        }
        self.update_last_modified_date()?;
        if self.config.synchronous_writes_enabled {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Toggle the current record's deletion flag, idempotent when `deleted`
    /// already matches the requested state.
    pub fn set_deleted(&mut self, deleted: bool) -> DbaseResult<()> {
        let record_number = self.require_positioned()?;
        if self.current_record_deleted == deleted {
            return Ok(());
        }
        let flag = if deleted { b'*' } else { b' ' };
        let offset = self.record_offset(record_number);
        self.current_record_raw[0] = flag;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&[flag])?;
        self.current_record_deleted = deleted;
        if self.config.synchronous_writes_enabled {
            self.file.sync_data()?;
        }
        Ok(())
    }

    pub fn delete(&mut self) -> DbaseResult<()> {
        self.set_deleted(true)
    }

    pub fn undelete(&mut self) -> DbaseResult<()> {
        self.set_deleted(false)
    }

    /// Append a blank record (every field at its default value), position
    /// the cursor on it, and return its record number.
    pub fn append_blank(&mut self) -> DbaseResult<i64> {
        self.lock.with_lock(self.config.thread_safety_enabled, || -> DbaseResult<i64> {
            let _count_guard =
                RegionLockGuard::acquire(&self.file, 4, 4, LockKind::Exclusive, self.config.file_locking_enabled)?;
            let count = read_u32_le(&buffered_read(&mut self.file, 4, 4)?);
            let new_record_number = count + 1;
            let offset = self.record_offset(new_record_number);
            let record_length = self.structure.record_length as u64;

            if offset + record_length + 1 > MAX_FILE_SIZE {
                return Err(DbaseError::invalid("appending this record would exceed the 2^31 byte file size limit"));
            }

            let mut blank = vec![b' '; record_length as usize];
            blank[0] = b' ';

            {
                let _record_guard = RegionLockGuard::acquire(
                    &self.file,
                    offset,
                    record_length + 1,
                    LockKind::Exclusive,
                    self.config.file_locking_enabled,
                )?;
                self.file.seek(SeekFrom::Start(offset))?;
                self.file.write_all(&blank)?;
                self.file.write_all(&[FILE_EOF_MARKER])?;
            }

            let mut count_bytes = [0u8; 4];
            write_u32_le(&mut count_bytes, new_record_number);
            self.file.seek(SeekFrom::Start(4))?;
            self.file.write_all(&count_bytes)?;
            self.structure.record_count = new_record_number;

            if self.config.synchronous_writes_enabled {
                self.file.sync_data()?;
            }

            self.goto_record(new_record_number as i64)?;
            self.update_last_modified_date()?;
            Ok(new_record_number as i64)
        })
    }

    fn update_last_modified_date(&mut self) -> DbaseResult<()> {
        let today = chrono::Local::now().date_naive();
        let date = Date::new(today.month() as u8, today.day() as u8, today.year() as i16);
        self.structure.last_updated = date;
        let mut patch = [0u8; 3];
        patch[0] = (date.year() - 1900).max(0) as u8;
        patch[1] = date.month();
        patch[2] = date.day();
        self.file.seek(SeekFrom::Start(1))?;
        self.file.write_all(&patch)?;
        Ok(())
    }
}

fn base_name_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_ascii_uppercase())
        .unwrap_or_default()
}
