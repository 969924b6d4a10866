//! The NDX single-key B+-tree index reader (C7).

use super::{pad_key, BLOCK_SIZE, RECORD_NUMBER_EOF};
use crate::codec::{ascii_string, buffered_read, read_u16_le, read_u32_le};
use crate::config::Config;
use crate::error::{DbaseError, DbaseResult};
use crate::lock::{IntrinsicLock, LockKind, RegionLockGuard};
use std::cmp::Ordering;
use std::fs::File;
use std::path::{Path, PathBuf};

/// The data type an NDX key was built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NdxDataType {
    Character,
    Numeric,
}

impl NdxDataType {
    fn from_u16(v: u16) -> DbaseResult<NdxDataType> {
        match v {
            0 => Ok(NdxDataType::Character),
            1 => Ok(NdxDataType::Numeric),
            other => Err(DbaseError::unsupported(format!("unrecognized NDX data type {other}"))),
        }
    }
}

/// A value to search for in an NDX — interpreted according to the index's
/// own `data_type`, not the variant tag here (a `Numeric` index can still be
/// searched with a textual value; it is simply parsed as a number first).
#[derive(Debug, Clone)]
pub enum NdxKey {
    Character(String),
    Numeric(f64),
}

pub struct NdxIndex {
    file: File,
    path: PathBuf,
    config: Config,
    lock: IntrinsicLock,
    pub start_block: u32,
    pub total_blocks: u32,
    pub key_length: u16,
    pub keys_per_block: u16,
    pub data_type: NdxDataType,
    pub unique: bool,
    pub key_expression: String,
    key_record_size: usize,
}

impl NdxIndex {
    pub fn open(path: impl AsRef<Path>, config: Config, lock: IntrinsicLock) -> DbaseResult<NdxIndex> {
        let path = config.resolve_path(path);
        let mut file = File::open(&path)?;
        let header = buffered_read(&mut file, 0, BLOCK_SIZE)?;

        let start_block = read_u32_le(&header[0..4]);
        let total_blocks = read_u32_le(&header[4..8]);
        let key_length = read_u16_le(&header[8..10]);
        let keys_per_block = read_u16_le(&header[10..12]);
        let data_type = NdxDataType::from_u16(read_u16_le(&header[12..14]))?;
        let asserted_key_record_size = read_u16_le(&header[14..16]) as usize;
        let unique = read_u16_le(&header[16..18]) != 0;
        let key_expression = ascii_string(&header[18..BLOCK_SIZE.min(header.len())]);

        let computed_key_record_size = key_record_size_for(key_length);
        if asserted_key_record_size != 0 && asserted_key_record_size != computed_key_record_size {
            return Err(DbaseError::corrupt(format!(
                "NDX asserts key record size {asserted_key_record_size} but key_length {key_length} implies {computed_key_record_size}"
            )));
        }

        Ok(NdxIndex {
            file,
            path,
            config,
            lock,
            start_block,
            total_blocks,
            key_length,
            keys_per_block,
            data_type,
            unique,
            key_expression,
            key_record_size: computed_key_record_size,
        })
    }

    /// Look up `key`, returning the matching record number or
    /// `RECORD_NUMBER_EOF` when no key compares `>= key`.
    pub fn find(&mut self, key: &NdxKey) -> DbaseResult<i64> {
        self.lock.with_lock(self.config.thread_safety_enabled, || {
            self.find_in_block(self.start_block, key)
        })
    }

    fn find_in_block(&mut self, block: u32, key: &NdxKey) -> DbaseResult<i64> {
        let offset = block as u64 * BLOCK_SIZE as u64;
        let node = {
            let _guard =
                RegionLockGuard::acquire(&self.file, offset, BLOCK_SIZE as u64, LockKind::Shared, self.config.file_locking_enabled)?;
            buffered_read(&mut self.file, offset, BLOCK_SIZE)?
        };

        let keys_in_block = read_u32_le(&node[0..4]) as usize;
        let record_size = self.key_record_size;

        for i in 0..keys_in_block {
            let start = 4 + i * record_size;
            let record = &node[start..start + record_size];
            let next_block = read_u32_le(&record[0..4]);
            let record_number = read_u32_le(&record[4..8]);
            let key_bytes = &record[8..8 + self.key_length as usize];

            let cmp = self.compare(key_bytes, key);
            if cmp != Ordering::Less {
                if next_block == 0 {
                    return Ok(record_number as i64);
                }
                return self.find_in_block(next_block, key);
            }
        }
        Ok(RECORD_NUMBER_EOF)
    }

    fn compare(&self, stored: &[u8], search: &NdxKey) -> Ordering {
        match self.data_type {
            NdxDataType::Character => {
                let search_text = match search {
                    NdxKey::Character(s) => s.clone(),
                    NdxKey::Numeric(n) => n.to_string(),
                };
                let padded = pad_key(&search_text, self.key_length as usize);
                stored.cmp(&padded)
            }
            NdxDataType::Numeric => {
                let target = match search {
                    NdxKey::Numeric(n) => *n,
                    NdxKey::Character(s) => s.trim().parse().unwrap_or(0.0),
                };
                self.compare_numeric(stored, target)
            }
        }
    }

    fn compare_numeric(&self, stored: &[u8], target: f64) -> Ordering {
        if stored.len() >= 8 {
            let bytes: [u8; 8] = stored[0..8].try_into().unwrap();
            let value = f64::from_le_bytes(bytes);
            if value.is_finite() {
                return value.partial_cmp(&target).unwrap_or(Ordering::Equal);
            }
        }
        let stored_text = ascii_string(stored);
        let padded_stored = pad_key(&stored_text, self.key_length as usize);
        let padded_target = pad_key(&target.to_string(), self.key_length as usize);
        padded_stored.cmp(&padded_target)
    }
}

fn key_record_size_for(key_length: u16) -> usize {
    (((key_length as usize) + 3) / 4) * 4 + 8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::write_u32_le;
    use tempfile::tempdir;

    /// Build a minimal single-node (leaf-only) CHARACTER NDX with three
    /// ordered keys, matching the on-disk layout described in §4.7.
    fn build_fixture(dir: &Path) -> PathBuf {
        let key_length: u16 = 4;
        let record_size = key_record_size_for(key_length);
        let path = dir.join("fixture.ndx");

        let mut header = vec![0u8; BLOCK_SIZE];
        write_u32_le(&mut header[0..4], 1); // start_block
        write_u32_le(&mut header[4..8], 2); // total_blocks
        header[8..10].copy_from_slice(&key_length.to_le_bytes());
        header[10..12].copy_from_slice(&3u16.to_le_bytes()); // keys_per_block
        header[12..14].copy_from_slice(&0u16.to_le_bytes()); // CHARACTER
        header[14..16].copy_from_slice(&(record_size as u16).to_le_bytes());
        header[16..18].copy_from_slice(&0u16.to_le_bytes()); // not unique
        let expr = b"NAME";
        header[18..18 + expr.len()].copy_from_slice(expr);

        let mut leaf = vec![0u8; BLOCK_SIZE];
        write_u32_le(&mut leaf[0..4], 3); // keys_in_block
        let entries: [(u32, &[u8; 4]); 3] = [(1, b"ANN "), (2, b"BOB "), (3, b"CARL")];
        for (i, (rec_no, key)) in entries.iter().enumerate() {
            let start = 4 + i * record_size;
            write_u32_le(&mut leaf[start..start + 4], 0); // next_block: leaf
            write_u32_le(&mut leaf[start + 4..start + 8], *rec_no);
            leaf[start + 8..start + 8 + 4].copy_from_slice(*key);
        }

        std::fs::write(&path, [header, leaf].concat()).unwrap();
        path
    }

    #[test]
    fn find_matches_an_exact_key() {
        let dir = tempdir().unwrap();
        let path = build_fixture(dir.path());
        let mut index = NdxIndex::open(&path, Config::default(), IntrinsicLock::new()).unwrap();
        assert_eq!(index.find(&NdxKey::Character("BOB".to_string())).unwrap(), 2);
    }

    #[test]
    fn find_returns_eof_when_search_key_is_past_every_entry() {
        let dir = tempdir().unwrap();
        let path = build_fixture(dir.path());
        let mut index = NdxIndex::open(&path, Config::default(), IntrinsicLock::new()).unwrap();
        assert_eq!(index.find(&NdxKey::Character("ZZZZ".to_string())).unwrap(), RECORD_NUMBER_EOF);
    }

    #[test]
    fn find_rounds_up_to_the_first_key_not_less_than_the_search_value() {
        let dir = tempdir().unwrap();
        let path = build_fixture(dir.path());
        let mut index = NdxIndex::open(&path, Config::default(), IntrinsicLock::new()).unwrap();
        // "BAA " < "BOB " but > "ANN ", so the first key >= it is "BOB ".
        assert_eq!(index.find(&NdxKey::Character("BAA".to_string())).unwrap(), 2);
    }
}
