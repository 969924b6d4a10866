//! The DBT memo store (C5): a content-addressable blob area keyed by
//! starting block number, with block-aligned allocation whose reuse/append
//! policy depends on the new value's size relative to the old one.

use crate::codec::{ascii_string, buffered_read, read_u16_le, read_u32_le, write_u32_le};
use crate::error::{DbaseError, DbaseResult};
use crate::lock::{LockKind, RegionLockGuard};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const MEMO_SENTINEL: [u8; 4] = [0xFF, 0xFF, 0x08, 0x00];
const HEADER_BLOCK_SIZE: u64 = 512;
const MEMO_HEADER_LEN: usize = 8; // 4-byte sentinel + 4-byte total length

/// The minimal state needed to operate on a DBT file: its path and block
/// size. `next_available_block` always lives on disk (bytes 0..3 of block
/// 0) and is re-read/re-written on every append, per the specification's
/// "every call opens/closes its own handle" rule — there is deliberately no
/// long-lived file handle cached here.
#[derive(Debug, Clone)]
pub struct DbtStore {
    path: PathBuf,
    pub block_length: u32,
}

impl DbtStore {
    /// Derive a DBT path from a DBF path by replacing its final three
    /// extension characters with `dbt` (case-sensitive), per §6.
    pub fn derive_path(dbf_path: impl AsRef<Path>) -> PathBuf {
        let dbf_path = dbf_path.as_ref();
        match dbf_path.extension() {
            Some(ext) if ext.len() >= 3 => {
                let mut new_ext = ext.to_string_lossy().into_owned();
                let len = new_ext.len();
                new_ext.replace_range(len - 3.., "dbt");
                dbf_path.with_extension(new_ext)
            }
            _ => dbf_path.with_extension("dbt"),
        }
    }

    /// Create a fresh DBT: block 0 holds `next_available_block = 1`, the
    /// block size, and the owner base name, padded to 512 bytes.
    pub fn create(path: impl AsRef<Path>, owner_base_name: &str, block_length: u32) -> DbaseResult<DbtStore> {
        if block_length < 64 || block_length % 64 != 0 {
            return Err(DbaseError::corrupt(format!(
                "DBT block length {block_length} must be a multiple of 64 bytes, >= 64"
            )));
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path.as_ref())?;

        let mut header = vec![0u8; HEADER_BLOCK_SIZE as usize];
        write_u32_le(&mut header[0..4], 1);
        write_u32_le(&mut header[4..8], 1);
        let name_bytes = owner_base_name.as_bytes();
        let take = name_bytes.len().min(8);
        header[8..8 + take].copy_from_slice(&name_bytes[..take]);
        header[20..22].copy_from_slice(&(block_length as u16).to_le_bytes());
        file.write_all(&header)?;

        Ok(DbtStore {
            path: path.as_ref().to_path_buf(),
            block_length,
        })
    }

    /// Open an existing DBT, reading its block length from the header.
    pub fn open(path: impl AsRef<Path>) -> DbaseResult<DbtStore> {
        let mut file = File::open(path.as_ref())?;
        let header = buffered_read(&mut file, 0, HEADER_BLOCK_SIZE as usize)?;
        let block_length = read_u16_le(&header[20..22]) as u32;
        if block_length < 64 {
            return Err(DbaseError::corrupt(format!(
                "DBT block length {block_length} is below the minimum of 64 bytes"
            )));
        }
        Ok(DbtStore {
            path: path.as_ref().to_path_buf(),
            block_length,
        })
    }

    pub fn owner_base_name(&self) -> DbaseResult<String> {
        let mut file = File::open(&self.path)?;
        let header = buffered_read(&mut file, 0, HEADER_BLOCK_SIZE as usize)?;
        Ok(ascii_string(&header[8..16]))
    }

    fn next_available_block(&self, file: &mut File) -> DbaseResult<u32> {
        let header = buffered_read(file, 0, 8)?;
        Ok(read_u32_le(&header[0..4]))
    }

    fn blocks_for(&self, total_len: usize) -> u32 {
        let block_length = self.block_length as usize;
        ((total_len + block_length - 1) / block_length) as u32
    }

    /// Peek the stored value length (excluding the 8-byte memo header) at
    /// `block_number`, without reading the value itself.
    pub fn memo_length(&self, block_number: u32) -> DbaseResult<usize> {
        let mut file = File::open(&self.path)?;
        let offset = block_number as u64 * self.block_length as u64;
        let header = buffered_read(&mut file, offset, MEMO_HEADER_LEN)?;
        if header[0..4] != MEMO_SENTINEL {
            return Err(DbaseError::corrupt(format!(
                "memo block {block_number} is missing the FF FF 08 00 sentinel"
            )));
        }
        let total_len = read_u32_le(&header[4..8]) as usize;
        if total_len < MEMO_HEADER_LEN {
            return Err(DbaseError::corrupt(format!(
                "memo block {block_number} declares an impossible length {total_len}"
            )));
        }
        Ok(total_len - MEMO_HEADER_LEN)
    }

    /// Read the memo value stored at `block_number`.
    pub fn read_memo(&self, block_number: u32, file_locking_enabled: bool) -> DbaseResult<Vec<u8>> {
        let mut file = File::open(&self.path)?;
        let offset = block_number as u64 * self.block_length as u64;
        let header = buffered_read(&mut file, offset, MEMO_HEADER_LEN)?;
        if header[0..4] != MEMO_SENTINEL {
            return Err(DbaseError::corrupt(format!(
                "memo block {block_number} is missing the FF FF 08 00 sentinel"
            )));
        }
        let total_len = read_u32_le(&header[4..8]) as usize;
        if total_len < MEMO_HEADER_LEN {
            return Err(DbaseError::corrupt(format!(
                "memo block {block_number} declares an impossible length {total_len}"
            )));
        }
        let value_len = total_len - MEMO_HEADER_LEN;

        let _guard = RegionLockGuard::acquire(
            &file,
            offset,
            (value_len + MEMO_HEADER_LEN) as u64,
            LockKind::Shared,
            file_locking_enabled,
        )?;

        file.seek(SeekFrom::Start(offset + MEMO_HEADER_LEN as u64))?;
        buffered_read(&mut file, offset + MEMO_HEADER_LEN as u64, value_len)
    }

    /// Write a memo value, reusing the old block range in place when it
    /// fits, otherwise appending at `next_available_block`. Returns the
    /// block number the value now lives at — callers are responsible for
    /// writing that number back into the DBF record's 10-byte memo column.
    pub fn write_memo(
        &self,
        old_block_number: u32,
        old_length: usize,
        new_value: &[u8],
        file_locking_enabled: bool,
    ) -> DbaseResult<u32> {
        let new_total_len = new_value.len() + MEMO_HEADER_LEN;
        let new_blocks = self.blocks_for(new_total_len);

        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;

        let old_blocks = if old_block_number != 0 {
            self.blocks_for(old_length + MEMO_HEADER_LEN)
        } else {
            0
        };

        if old_block_number != 0 && new_blocks <= old_blocks {
            log::debug!(
                "memo reuse: block {old_block_number} ({old_blocks} blocks) holds new value ({new_blocks} blocks)"
            );
            let offset = old_block_number as u64 * self.block_length as u64;
            let _guard = RegionLockGuard::acquire(
                &file,
                offset,
                (old_blocks as u64) * self.block_length as u64,
                LockKind::Exclusive,
                file_locking_enabled,
            )?;
            self.write_block(&mut file, offset, new_value, old_blocks)?;
            Ok(old_block_number)
        } else {
            let _guard = RegionLockGuard::acquire(&file, 0, 4, LockKind::Exclusive, file_locking_enabled)?;
            let next = self.next_available_block(&mut file)?;
            let mut header_patch = [0u8; 4];
            write_u32_le(&mut header_patch, next + new_blocks);
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&header_patch)?;

            log::debug!("memo append: block {next} ({new_blocks} blocks) for new value");
            let offset = next as u64 * self.block_length as u64;
            self.write_block(&mut file, offset, new_value, new_blocks)?;
            Ok(next)
        }
    }

    fn write_block(&self, file: &mut File, offset: u64, value: &[u8], blocks: u32) -> DbaseResult<()> {
        let total_len = value.len() + MEMO_HEADER_LEN;
        let padded_len = blocks as usize * self.block_length as usize;
        let mut buf = vec![0u8; padded_len];
        buf[0..4].copy_from_slice(&MEMO_SENTINEL);
        write_u32_le(&mut buf[4..8], total_len as u32);
        buf[MEMO_HEADER_LEN..MEMO_HEADER_LEN + value.len()].copy_from_slice(value);
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_store() -> (tempfile::TempDir, DbtStore) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("customer.dbt");
        let store = DbtStore::create(&path, "CUSTOMER", 512).unwrap();
        (dir, store)
    }

    #[test]
    fn create_then_open_round_trips_block_length() {
        let (_dir, store) = new_store();
        let reopened = DbtStore::open(store_path(&store)).unwrap();
        assert_eq!(reopened.block_length, 512);
        assert_eq!(reopened.owner_base_name().unwrap(), "CUSTOMER");
    }

    fn store_path(store: &DbtStore) -> &Path {
        &store.path
    }

    #[test]
    fn write_then_read_round_trips_value() {
        let (_dir, store) = new_store();
        let block = store.write_memo(0, 0, b"hello memo world", false).unwrap();
        assert_eq!(block, 1);
        let value = store.read_memo(block, false).unwrap();
        assert_eq!(value, b"hello memo world");
    }

    #[test]
    fn reads_a_corrupt_sentinel_as_fatal() {
        let (_dir, store) = new_store();
        let mut file = OpenOptions::new().write(true).open(&store.path).unwrap();
        file.seek(SeekFrom::Start(512)).unwrap();
        file.write_all(&[0, 0, 0, 0, 20, 0, 0, 0]).unwrap();
        file.write_all(&[b'x'; 12]).unwrap();
        drop(file);
        let err = store.read_memo(1, false).unwrap_err();
        assert!(matches!(err, DbaseError::CorruptStructure { .. }));
    }

    #[test]
    fn memo_reuse_policy_matches_block_count_invariant() {
        let (_dir, store) = new_store();
        // L1: small value, first allocation always appends.
        let b1 = store.write_memo(0, 0, &vec![b'a'; 10], false).unwrap();
        let l1 = 10usize;

        // L2 > L1: needs more blocks than b1 holds, so it must append anew.
        let l2 = 10_000usize;
        let b2 = store.write_memo(b1, l1, &vec![b'b'; l2], false).unwrap();
        assert_ne!(b2, b1, "a larger value must not reuse a too-small block range");

        // L3 < L2 but L3 > L1: new_blocks should be <= old_blocks (b2's
        // allocation), so this write reuses b2 rather than appending again.
        let l3 = 9_000usize;
        let b3 = store.write_memo(b2, l2, &vec![b'c'; l3], false).unwrap();
        assert_eq!(b3, b2, "a shrinking value that still fits must reuse in place");

        let value = store.read_memo(b3, false).unwrap();
        assert_eq!(value.len(), l3);
    }

    #[test]
    fn derive_path_replaces_final_three_extension_chars() {
        assert_eq!(
            DbtStore::derive_path(Path::new("/data/customer.dbf")),
            Path::new("/data/customer.dbt")
        );
        assert_eq!(
            DbtStore::derive_path(Path::new("/data/CUSTOMER.DBF")),
            Path::new("/data/CUSTOMER.dbt")
        );
    }
}
