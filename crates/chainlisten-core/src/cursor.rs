//! Scan cursor: tracks the next block a run will fetch.

use serde::{Deserialize, Serialize};

use crate::config::ResumeMode;
use crate::types::BlockRange;

/// The scan loop's in-memory position.
///
/// Derived from the checkpoint at run start and only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCursor {
    /// Next block to fetch.
    pub position: u64,
}

impl ScanCursor {
    pub fn new(position: u64) -> Self {
        Self { position }
    }

    /// Resolve where a run starts.
    ///
    /// Without a checkpoint the run backfills `default_offset` blocks behind
    /// `latest_height` (clamped at genesis). With one it resumes at the
    /// checkpoint block, or just past it for [`ResumeMode::Next`].
    pub fn resolve(
        checkpoint: Option<u64>,
        latest_height: u64,
        default_offset: u64,
        resume: ResumeMode,
    ) -> Self {
        let position = match (checkpoint, resume) {
            (None, _) => latest_height.saturating_sub(default_offset),
            (Some(cp), ResumeMode::Inclusive) => cp,
            (Some(cp), ResumeMode::Next) => cp.saturating_add(1),
        };
        Self { position }
    }

    /// Position for a run that follows an earlier one in the same process.
    ///
    /// Picks up right where `previous` stopped, so consecutive runs neither
    /// rescan nor skip blocks. A checkpoint ahead of that position wins.
    pub fn continue_from(
        previous: ScanCursor,
        checkpoint: Option<u64>,
        resume: ResumeMode,
    ) -> Self {
        let from_checkpoint = match (checkpoint, resume) {
            (None, _) => 0,
            (Some(cp), ResumeMode::Inclusive) => cp,
            (Some(cp), ResumeMode::Next) => cp.saturating_add(1),
        };
        Self {
            position: previous.position.max(from_checkpoint),
        }
    }

    /// The next range to scan, or `None` once the cursor has passed `latest_height`.
    pub fn next_range(&self, latest_height: u64, max_block_range: u64) -> Option<BlockRange> {
        (self.position <= latest_height)
            .then(|| BlockRange::capped(self.position, latest_height, max_block_range))
    }

    /// Move past a scanned range.
    pub fn advance_past(&mut self, range: &BlockRange) {
        self.position = self.position.max(range.to.saturating_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_checkpoint_starts_behind_head() {
        let c = ScanCursor::resolve(None, 1000, 10, ResumeMode::Inclusive);
        assert_eq!(c.position, 990);
    }

    #[test]
    fn no_checkpoint_near_genesis_clamps_to_zero() {
        let c = ScanCursor::resolve(None, 4, 10, ResumeMode::Inclusive);
        assert_eq!(c.position, 0);
    }

    #[test]
    fn resume_modes() {
        assert_eq!(ScanCursor::resolve(Some(500), 1000, 10, ResumeMode::Inclusive).position, 500);
        assert_eq!(ScanCursor::resolve(Some(500), 1000, 10, ResumeMode::Next).position, 501);
    }

    #[test]
    fn ranges_walk_contiguously() {
        let mut c = ScanCursor::new(0);
        let mut ranges = vec![];
        while let Some(r) = c.next_range(5000, 2048) {
            c.advance_past(&r);
            ranges.push(r);
        }
        assert_eq!(
            ranges,
            vec![
                BlockRange::new(0, 2047),
                BlockRange::new(2048, 4095),
                BlockRange::new(4096, 5000),
            ]
        );
    }

    #[test]
    fn cursor_past_head_yields_nothing() {
        let c = ScanCursor::new(1001);
        assert!(c.next_range(1000, 2048).is_none());
    }

    #[test]
    fn continuation_ignores_older_checkpoint() {
        let prev = ScanCursor::new(1001);
        let c = ScanCursor::continue_from(prev, Some(995), ResumeMode::Inclusive);
        assert_eq!(c.position, 1001);
        let c = ScanCursor::continue_from(prev, None, ResumeMode::Inclusive);
        assert_eq!(c.position, 1001);
    }

    #[test]
    fn continuation_follows_checkpoint_ahead() {
        let c = ScanCursor::continue_from(ScanCursor::new(1001), Some(1500), ResumeMode::Next);
        assert_eq!(c.position, 1501);
    }

    #[test]
    fn advance_never_moves_backward() {
        let mut c = ScanCursor::new(100);
        c.advance_past(&BlockRange::new(10, 20));
        assert_eq!(c.position, 100);
    }
}
