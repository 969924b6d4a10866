//! The MDX multi-tag B+-tree index reader (C8).

use super::{pad_key, BLOCK_SIZE, RECORD_NUMBER_BOF, RECORD_NUMBER_EOF};
use crate::codec::{ascii_string, buffered_read, read_u16_le, read_u32_le};
use crate::config::Config;
use crate::error::{DbaseError, DbaseResult};
use crate::lock::{IntrinsicLock, LockKind, RegionLockGuard};
use std::cmp::Ordering;
use std::fs::File;
use std::path::{Path, PathBuf};

const HEADER_LEN: usize = 544;

/// A value to search for in an MDX tag.
#[derive(Debug, Clone)]
pub enum MdxKey {
    Character(String),
    Numeric(f64),
}

#[derive(Debug, Clone)]
pub struct MdxTag {
    pub name: String,
    header_block: u32,
    pub key_format: u8,
    pub key_type: char,
    pub root_block: u32,
    pub key_length: u16,
    pub keys_per_block: u16,
    pub unique: bool,
    pub descending: bool,
}

struct MdxCursor {
    node: Vec<u8>,
    keys_in_node: usize,
    key_index: i64,
}

pub struct MdxIndex {
    file: File,
    path: PathBuf,
    config: Config,
    lock: IntrinsicLock,
    pub version: u8,
    pub paired_dbf_name: String,
    pub block_size_multiplier: u16,
    node_size: usize,
    pub tags: Vec<MdxTag>,
    active_tag: Option<usize>,
    cursor: Option<MdxCursor>,
}

impl MdxIndex {
    pub fn open(path: impl AsRef<Path>, config: Config, lock: IntrinsicLock) -> DbaseResult<MdxIndex> {
        let path = config.resolve_path(path);
        let mut file = File::open(&path)?;
        let header = buffered_read(&mut file, 0, HEADER_LEN)?;

        let version = header[0];
        if version != 2 {
            log::warn!("MDX {} has version byte {version}, expected 2", path.display());
        }

        let paired_dbf_name = ascii_string(&header[4..20]);
        let block_size_multiplier = read_u16_le(&header[20..22]);
        let node_size_on_disk = read_u16_le(&header[22..24]) as usize;
        let node_size = block_size_multiplier as usize * BLOCK_SIZE;
        if node_size_on_disk != node_size {
            return Err(DbaseError::corrupt(format!(
                "MDX node size {node_size_on_disk} does not equal block_size_multiplier*512 ({node_size})"
            )));
        }

        let keys_in_tag = header[25];
        if !(1..=48).contains(&keys_in_tag) {
            return Err(DbaseError::corrupt(format!("MDX keys_in_tag {keys_in_tag} is out of range 1..=48")));
        }
        let tag_length = header[26] as usize;
        if !(1..=32).contains(&tag_length) {
            return Err(DbaseError::corrupt(format!("MDX tag_length {tag_length} is out of range 1..=32")));
        }
        let tags_in_use = read_u16_le(&header[28..30]);

        let mut tags = Vec::with_capacity(tags_in_use as usize);
        for i in 0..tags_in_use as usize {
            let offset = HEADER_LEN + i * tag_length;
            let descriptor = buffered_read(&mut file, offset as u64, tag_length)?;
            let header_block = read_u32_le(&descriptor[0..4]);
            let name = ascii_string(&descriptor[4..14]);
            let key_format = descriptor[14];
            let key_type = descriptor[19] as char;
            if !matches!(key_type, 'C' | 'N' | 'D') {
                return Err(DbaseError::unsupported(format!("MDX tag {name} has unknown key type {key_type:?}")));
            }

            let tag_header = buffered_read(&mut file, header_block as u64 * BLOCK_SIZE as u64, BLOCK_SIZE)?;
            let root_block = read_u32_le(&tag_header[0..4]);
            let echoed_key_format = tag_header[8];
            let echoed_key_type = tag_header[9] as char;
            if echoed_key_format != key_format || echoed_key_type != key_type {
                return Err(DbaseError::corrupt(format!(
                    "MDX tag {name} header block echoes key_format/key_type mismatch"
                )));
            }
            let key_length = read_u16_le(&tag_header[10..12]);
            let keys_per_block = read_u16_le(&tag_header[12..14]);
            let unique_flag = read_u16_le(&tag_header[18..20]) != 0;

            tags.push(MdxTag {
                name,
                header_block,
                key_format,
                key_type,
                root_block,
                key_length,
                keys_per_block,
                unique: unique_flag || key_format & 0x40 != 0,
                descending: key_format & 0x08 != 0,
            });
        }

        Ok(MdxIndex {
            file,
            path,
            config,
            lock,
            version,
            paired_dbf_name,
            block_size_multiplier,
            node_size,
            tags,
            active_tag: None,
            cursor: None,
        })
    }

    /// Activate the tag named `name`, clearing any prior cursor position.
    /// Returns `None` when no tag with that name exists.
    pub fn set_tag(&mut self, name: &str) -> Option<()> {
        let index = self.tags.iter().position(|t| t.name == name)?;
        self.active_tag = Some(index);
        self.cursor = None;
        Some(())
    }

    pub fn active_tag(&self) -> DbaseResult<&MdxTag> {
        let index = self.active_tag.ok_or_else(|| DbaseError::invalid("no active tag set"))?;
        Ok(&self.tags[index])
    }

    pub fn find(&mut self, key: &MdxKey) -> DbaseResult<i64> {
        let tag = self.active_tag()?.clone();
        self.lock.with_lock(self.config.thread_safety_enabled, || self.find_in_node(tag.root_block, &tag, key))
    }

    fn find_in_node(&mut self, block: u32, tag: &MdxTag, key: &MdxKey) -> DbaseResult<i64> {
        let (previous_block, keys_in_node, node) = self.read_node(block)?;
        let leaf = previous_block == 0;
        let record_size = key_record_size(tag.key_length);

        for i in 0..keys_in_node {
            let start = 8 + i * record_size;
            let record = &node[start..start + record_size];
            let ptr = read_u32_le(&record[4..8]);
            let key_bytes = &record[8..8 + tag.key_length as usize];
            let cmp = self.compare(key_bytes, key, tag);

            if leaf {
                match cmp {
                    Ordering::Equal => return Ok(ptr as i64),
                    Ordering::Greater => return Ok(RECORD_NUMBER_EOF),
                    Ordering::Less => continue,
                }
            } else if cmp == Ordering::Greater {
                let child = if i == 0 {
                    ptr
                } else {
                    let prev_start = 8 + (i - 1) * record_size;
                    read_u32_le(&node[prev_start + 4..prev_start + 8])
                };
                return self.find_in_node(child, tag, key);
            }
        }

        if !leaf && keys_in_node > 0 {
            let last_start = 8 + (keys_in_node - 1) * record_size;
            let child = read_u32_le(&node[last_start + 4..last_start + 8]);
            return self.find_in_node(child, tag, key);
        }
        Ok(RECORD_NUMBER_EOF)
    }

    pub fn goto_top(&mut self) -> DbaseResult<i64> {
        let tag = self.active_tag()?.clone();
        let mut block = tag.root_block;
        loop {
            let (previous_block, keys_in_node, node) = self.read_node(block)?;
            if previous_block == 0 {
                self.cursor = Some(MdxCursor {
                    node,
                    keys_in_node,
                    key_index: if keys_in_node > 0 { 0 } else { keys_in_node as i64 },
                });
                return self.record_at_cursor(&tag);
            }
            if keys_in_node == 0 {
                return Ok(RECORD_NUMBER_EOF);
            }
            block = read_u32_le(&node[8 + 4..8 + 8]);
        }
    }

    pub fn goto_bottom(&mut self) -> DbaseResult<i64> {
        let mut last = self.goto_top()?;
        if last == RECORD_NUMBER_EOF {
            return Ok(RECORD_NUMBER_EOF);
        }
        loop {
            let n = self.next()?;
            if n == RECORD_NUMBER_EOF {
                break;
            }
            last = n;
        }
        if let Some(cursor) = self.cursor.as_mut() {
            if cursor.keys_in_node > 0 {
                cursor.key_index = cursor.keys_in_node as i64 - 1;
            }
        }
        Ok(last)
    }

    pub fn next(&mut self) -> DbaseResult<i64> {
        let tag = self.active_tag()?.clone();
        let cursor = self.cursor.as_mut().ok_or_else(|| DbaseError::invalid("no active tag set"))?;
        if cursor.keys_in_node == 0 {
            return Ok(RECORD_NUMBER_EOF);
        }
        if cursor.key_index < cursor.keys_in_node as i64 - 1 {
            cursor.key_index += 1;
            self.record_at_cursor(&tag)
        } else {
            cursor.key_index = cursor.keys_in_node as i64;
            Ok(RECORD_NUMBER_EOF)
        }
    }

    pub fn prev(&mut self) -> DbaseResult<i64> {
        let tag = self.active_tag()?.clone();
        let cursor = self.cursor.as_mut().ok_or_else(|| DbaseError::invalid("no active tag set"))?;
        if cursor.key_index > 0 {
            cursor.key_index -= 1;
            self.record_at_cursor(&tag)
        } else {
            cursor.key_index = -1;
            Ok(RECORD_NUMBER_BOF)
        }
    }

    fn record_at_cursor(&self, tag: &MdxTag) -> DbaseResult<i64> {
        let cursor = self.cursor.as_ref().expect("cursor positioned");
        if cursor.key_index < 0 || cursor.key_index as usize >= cursor.keys_in_node {
            return Ok(RECORD_NUMBER_EOF);
        }
        let record_size = key_record_size(tag.key_length);
        let start = 8 + cursor.key_index as usize * record_size;
        Ok(read_u32_le(&cursor.node[start + 4..start + 8]) as i64)
    }

    fn read_node(&mut self, block: u32) -> DbaseResult<(u32, usize, Vec<u8>)> {
        let offset = block as u64 * BLOCK_SIZE as u64;
        let node = {
            let _guard = RegionLockGuard::acquire(&self.file, offset, self.node_size as u64, LockKind::Shared, self.config.file_locking_enabled)?;
            buffered_read(&mut self.file, offset, self.node_size)?
        };
        let keys_in_node = read_u32_le(&node[0..4]) as usize;
        let previous_block = read_u32_le(&node[4..8]);
        Ok((previous_block, keys_in_node, node))
    }

    fn compare(&self, stored: &[u8], search: &MdxKey, tag: &MdxTag) -> Ordering {
        match tag.key_type {
            'C' | 'D' => {
                let text = match search {
                    MdxKey::Character(s) => s.clone(),
                    MdxKey::Numeric(n) => n.to_string(),
                };
                let padded = pad_key(&text, tag.key_length as usize);
                stored.cmp(&padded)
            }
            'N' => {
                let target = match search {
                    MdxKey::Numeric(n) => *n,
                    MdxKey::Character(s) => s.trim().parse().unwrap_or(0.0),
                };
                let value = match tag.key_length {
                    8 => {
                        let bytes: [u8; 8] = stored[0..8].try_into().unwrap();
                        f64::from_le_bytes(bytes)
                    }
                    12 => crate::codec::decode_mdx_bcd12(stored).unwrap_or(0.0),
                    _ => 0.0,
                };
                value.partial_cmp(&target).unwrap_or(Ordering::Equal)
            }
            // unreachable: `open` rejects any key_type other than C/N/D.
            _ => Ordering::Equal,
        }
    }
}

fn key_record_size(key_length: u16) -> usize {
    8 + (((key_length as usize) + 3) / 4) * 4
}

/// A lazy, non-restartable forward iterator over an MDX tag, built from
/// repeated `next()` calls starting at `goto_top()`.
pub struct MdxTraversal<'a> {
    mdx: &'a mut MdxIndex,
    started: bool,
    done: bool,
}

impl MdxIndex {
    /// Activate `tag` and return an iterator over its leaf in ascending
    /// stored order, each item a record number (or the first error hit).
    pub fn iter_from_top(&mut self, tag: &str) -> DbaseResult<MdxTraversal<'_>> {
        self.set_tag(tag).ok_or_else(|| DbaseError::invalid(format!("no tag named {tag}")))?;
        Ok(MdxTraversal {
            mdx: self,
            started: false,
            done: false,
        })
    }
}

impl<'a> Iterator for MdxTraversal<'a> {
    type Item = DbaseResult<i64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = if !self.started {
            self.started = true;
            self.mdx.goto_top()
        } else {
            self.mdx.next()
        };
        match result {
            Ok(RECORD_NUMBER_EOF) => {
                self.done = true;
                None
            }
            Ok(n) => Some(Ok(n)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
