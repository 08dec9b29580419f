//! Tracks which byte ranges of an open file are materialized locally.
//!
//! `Load` never eagerly merges on `add_range` — ranges may overlap or
//! duplicate, and normalization is deferred to query time (sort-and-sweep),
//! per the component's contract: queries must be correct under arbitrary
//! `add_range` histories, not cheap to maintain incrementally.

#[derive(Debug, Default, Clone)]
pub struct Load {
    ranges: Vec<(i64, i64)>,
}

impl Load {
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Appends `[start, end)`. No normalization; overlaps and duplicates
    /// are fine.
    pub fn add_range(&mut self, start: i64, end: i64) {
        if end > start {
            self.ranges.push((start, end));
        }
    }

    /// Drops every range fully at or beyond `end`; clips any range that
    /// straddles `end`. Used both by truncate-down and by the live applier
    /// when a foreign write shrinks a file we have cached.
    pub fn truncate(&mut self, end: i64) {
        self.ranges.retain_mut(|(start, stop)| {
            if *start >= end {
                false
            } else {
                if *stop > end {
                    *stop = end;
                }
                true
            }
        });
    }

    /// True iff `[start, end)` is fully covered by the union of stored
    /// ranges.
    pub fn is_ready(&self, start: i64, end: i64) -> bool {
        if end <= start {
            return true;
        }
        let merged = self.merged_sorted();
        let mut cursor = start;
        for (s, e) in merged {
            if s > cursor {
                break;
            }
            if e > cursor {
                cursor = e;
            }
            if cursor >= end {
                return true;
            }
        }
        cursor >= end
    }

    /// The largest `k` such that `[start, start+k)` is fully covered (0 if
    /// `start` itself is not covered).
    pub fn bytes_ready(&self, start: i64) -> i64 {
        let merged = self.merged_sorted();
        let mut cursor = start;
        for (s, e) in merged {
            if s > cursor {
                break;
            }
            if e > cursor {
                cursor = e;
            }
        }
        if cursor > start { cursor - start } else { 0 }
    }

    /// Sweeps a sorted copy of the ranges into a disjoint, merged sequence.
    /// Side-effect-free: operates on a clone, never mutates `self.ranges`.
    fn merged_sorted(&self) -> Vec<(i64, i64)> {
        let mut ranges = self.ranges.clone();
        ranges.sort_by_key(|(s, _)| *s);
        let mut out: Vec<(i64, i64)> = Vec::with_capacity(ranges.len());
        for (s, e) in ranges {
            if let Some(last) = out.last_mut() {
                if s <= last.1 {
                    if e > last.1 {
                        last.1 = e;
                    }
                    continue;
                }
            }
            out.push((s, e));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_never_ready() {
        let load = Load::new();
        assert!(!load.is_ready(0, 10));
        assert_eq!(load.bytes_ready(0), 0);
    }

    #[test]
    fn single_range_covers_itself() {
        let mut load = Load::new();
        load.add_range(0, 100);
        assert!(load.is_ready(0, 100));
        assert!(load.is_ready(10, 50));
        assert!(!load.is_ready(0, 101));
        assert_eq!(load.bytes_ready(0), 100);
        assert_eq!(load.bytes_ready(50), 50);
    }

    #[test]
    fn overlapping_ranges_merge_at_query_time() {
        let mut load = Load::new();
        load.add_range(50, 100);
        load.add_range(0, 60);
        assert!(load.is_ready(0, 100));
        assert_eq!(load.bytes_ready(0), 100);
    }

    #[test]
    fn gap_blocks_coverage() {
        let mut load = Load::new();
        load.add_range(0, 50);
        load.add_range(60, 100);
        assert!(!load.is_ready(0, 100));
        assert_eq!(load.bytes_ready(0), 50);
        assert_eq!(load.bytes_ready(60), 40);
        assert_eq!(load.bytes_ready(55), 0);
    }

    #[test]
    fn duplicate_ranges_are_idempotent() {
        let mut load = Load::new();
        load.add_range(0, 10);
        load.add_range(0, 10);
        load.add_range(0, 10);
        assert_eq!(load.bytes_ready(0), 10);
    }

    #[test]
    fn truncate_drops_ranges_beyond_end() {
        let mut load = Load::new();
        load.add_range(0, 50);
        load.add_range(50, 100);
        load.truncate(60);
        assert!(load.is_ready(0, 60));
        assert!(!load.is_ready(0, 61));
        assert_eq!(load.bytes_ready(0), 60);
    }

    #[test]
    fn truncate_clips_straddling_range() {
        let mut load = Load::new();
        load.add_range(0, 100);
        load.truncate(30);
        assert_eq!(load.bytes_ready(0), 30);
        assert!(!load.is_ready(0, 31));
    }

    #[test]
    fn truncate_to_zero_clears_everything() {
        let mut load = Load::new();
        load.add_range(0, 100);
        load.truncate(0);
        assert_eq!(load.bytes_ready(0), 0);
    }

    #[test]
    fn queries_are_side_effect_free() {
        let mut load = Load::new();
        load.add_range(10, 20);
        load.add_range(0, 10);
        let before = load.ranges.len();
        let _ = load.is_ready(0, 20);
        let _ = load.bytes_ready(0);
        assert_eq!(load.ranges.len(), before);
    }
}
