//! The cursor-strategy adapter (C9): "skip by N records" realized either as
//! raw linear movement or as repeated MDX `next`/`prev` calls.

use super::mdx::MdxIndex;
use crate::error::DbaseResult;

/// How a `skip` call should move the cursor.
pub enum CursorStrategy<'a> {
    /// `goto_record(current + offset)` against the DBF directly.
    Linear,
    /// Walk an active MDX tag `offset` steps via `next`/`prev`.
    Indexed(&'a mut MdxIndex),
}

impl<'a> CursorStrategy<'a> {
    /// Move `offset` records from `current_record_number`, returning the
    /// resulting record number (or a BOF/EOF sentinel if the walk runs off
    /// either end). `offset == 0` is a no-op that returns the current
    /// position unchanged.
    pub fn skip(&mut self, current_record_number: i64, offset: i64, goto_record: impl FnOnce(i64) -> DbaseResult<i64>) -> DbaseResult<i64> {
        if offset == 0 {
            return Ok(current_record_number);
        }
        match self {
            CursorStrategy::Linear => goto_record(current_record_number + offset),
            CursorStrategy::Indexed(mdx) => {
                let mut result = current_record_number;
                if offset > 0 {
                    for _ in 0..offset {
                        result = mdx.next()?;
                    }
                } else {
                    for _ in 0..offset.unsigned_abs() {
                        result = mdx.prev()?;
                    }
                }
                Ok(result)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dbf::{RECORD_NUMBER_BOF, RECORD_NUMBER_EOF};
    use crate::lock::IntrinsicLock;

    #[test]
    fn zero_offset_is_a_no_op() {
        let mut strategy = CursorStrategy::Linear;
        let result = strategy.skip(5, 0, |n| Ok(n)).unwrap();
        assert_eq!(result, 5);
    }

    #[test]
    fn linear_delegates_to_goto_record_with_the_summed_position() {
        let mut strategy = CursorStrategy::Linear;
        let mut requested = None;
        let result = strategy
            .skip(5, 3, |n| {
                requested = Some(n);
                Ok(n)
            })
            .unwrap();
        assert_eq!(requested, Some(8));
        assert_eq!(result, 8);
    }

    #[test]
    fn linear_can_reach_bof_and_eof_sentinels() {
        let mut strategy = CursorStrategy::Linear;
        assert_eq!(strategy.skip(1, -5, |_| Ok(RECORD_NUMBER_BOF)).unwrap(), RECORD_NUMBER_BOF);
        assert_eq!(strategy.skip(1, 500, |_| Ok(RECORD_NUMBER_EOF)).unwrap(), RECORD_NUMBER_EOF);
    }

    #[test]
    fn indexed_calls_next_offset_times_for_a_positive_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = crate::index::mdx::tests::build_fixture(dir.path());
        let mut mdx = MdxIndex::open(&path, Config::default(), IntrinsicLock::new()).unwrap();
        mdx.set_tag("test1").unwrap();
        mdx.goto_top().unwrap(); // positions on record 3 (leaf order is 3, 1, 2)

        let mut strategy = CursorStrategy::Indexed(&mut mdx);
        let result = strategy.skip(3, 2, |n| Ok(n)).unwrap();
        assert_eq!(result, 2);
    }
}
