//! A pure-Rust reader/writer for the dBase/xBase table family: `DBF` data
//! tables, `DBT` memo stores, and the `NDX`/`MDX` B+-tree index formats.
//!
//! A table is opened with [`Dbf::open`], walked with `goto_record`/
//! `next`/`prev`-style cursor movement, and its fields read through
//! [`FieldValue`]. Indexes (`NdxIndex`, `MdxIndex`) support point lookups and
//! ordered traversal, and [`index::strategy::CursorStrategy`] lets a caller
//! move a cursor the same way whether or not an index is active.
//!
//! Every public entry point takes a [`Config`] (process-wide flags such as
//! encoding and file locking) and an [`IntrinsicLock`] (shared across a table
//! and its paired indexes so they serialize against each other).

mod codec;
mod config;
mod date;
mod dbf;
mod dbt;
mod error;
mod field;
mod index;
mod lock;
mod structure;
mod value;

pub use config::{Config, ConfigBuilder};
pub use date::Date;
pub use dbf::{Dbf, RECORD_NUMBER_BOF, RECORD_NUMBER_EOF};
pub use dbt::DbtStore;
pub use error::{DbaseError, DbaseResult};
pub use field::{Field, FieldType};
pub use index::mdx::{MdxIndex, MdxKey, MdxTag, MdxTraversal};
pub use index::ndx::{NdxDataType, NdxIndex, NdxKey};
pub use index::strategy::CursorStrategy;
pub use lock::{IntrinsicLock, LockKind, RegionLockGuard};
pub use structure::TableStructure;
pub use value::FieldValue;
