//! Sets of page numbers stored as disjoint, maximal ranges.

use std::collections::BTreeMap;
use std::fmt;

/// A set of `u32` page numbers kept as sorted, non-touching `[start, end)`
/// runs.
///
/// Adding a run that overlaps or touches an existing one coalesces them;
/// removing a run from the middle of another splits it. Used for the
/// allocator's free list and for reporting the pages an extent stream
/// visited.
///
/// # Example
/// ```
/// use pagetree::storage::Ranges;
///
/// let mut r = Ranges::new();
/// r.add(0, 4);
/// r.add(4, 2);
/// assert_eq!(r.iter().collect::<Vec<_>>(), vec![(0, 6)]);
///
/// r.remove(2, 1);
/// assert_eq!(r.iter().collect::<Vec<_>>(), vec![(0, 2), (3, 3)]);
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Ranges {
    /// start -> end (exclusive)
    runs: BTreeMap<u32, u32>,
}

impl Ranges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` values starting at `start`.
    pub fn add(&mut self, start: u32, count: usize) {
        if count == 0 {
            return;
        }
        let mut lo = start;
        let mut hi = start + count as u32;

        // Absorb a predecessor that overlaps or touches.
        if let Some((&s, &e)) = self.runs.range(..=lo).next_back() {
            if e >= lo {
                lo = s;
                hi = hi.max(e);
                self.runs.remove(&s);
            }
        }
        // Absorb every successor that starts inside or right after the run.
        while let Some((&s, &e)) = self.runs.range(lo..=hi).next() {
            hi = hi.max(e);
            self.runs.remove(&s);
        }
        self.runs.insert(lo, hi);
    }

    /// Remove `count` values starting at `start`. Values that were not in
    /// the set are ignored.
    pub fn remove(&mut self, start: u32, count: usize) {
        if count == 0 {
            return;
        }
        let end = start + count as u32;

        let mut hit: Vec<(u32, u32)> = Vec::new();
        if let Some((&s, &e)) = self.runs.range(..start).next_back() {
            if e > start {
                hit.push((s, e));
            }
        }
        hit.extend(self.runs.range(start..end).map(|(&s, &e)| (s, e)));

        for (s, e) in hit {
            self.runs.remove(&s);
            if s < start {
                self.runs.insert(s, start);
            }
            if e > end {
                self.runs.insert(end, e);
            }
        }
    }

    pub fn contains(&self, value: u32) -> bool {
        self.runs
            .range(..=value)
            .next_back()
            .is_some_and(|(_, &e)| e > value)
    }

    pub fn clear(&mut self) {
        self.runs.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Total number of values in the set.
    pub fn size(&self) -> usize {
        self.runs.iter().map(|(&s, &e)| (e - s) as usize).sum()
    }

    /// Runs as `(start, length)` in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, usize)> + '_ {
        self.runs.iter().map(|(&s, &e)| (s, (e - s) as usize))
    }

    /// Every value in ascending order.
    pub fn values(&self) -> Vec<u32> {
        self.runs.iter().flat_map(|(&s, &e)| s..e).collect()
    }
}

impl fmt::Debug for Ranges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.runs.iter().map(|(s, e)| *s..*e))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runs(r: &Ranges) -> Vec<(u32, usize)> {
        r.iter().collect()
    }

    #[test]
    fn test_add_coalesces_adjacent_and_overlapping() {
        let mut r = Ranges::new();
        r.add(10, 5);
        r.add(0, 3);
        assert_eq!(runs(&r), vec![(0, 3), (10, 5)]);

        r.add(3, 2); // touches the first run
        assert_eq!(runs(&r), vec![(0, 5), (10, 5)]);

        r.add(4, 8); // bridges both
        assert_eq!(runs(&r), vec![(0, 15)]);
        assert_eq!(r.size(), 15);
    }

    #[test]
    fn test_add_swallows_several_runs() {
        let mut r = Ranges::new();
        r.add(1, 1);
        r.add(3, 1);
        r.add(5, 1);
        r.add(0, 10);
        assert_eq!(runs(&r), vec![(0, 10)]);
    }

    #[test]
    fn test_remove_splits() {
        let mut r = Ranges::new();
        r.add(0, 10);
        r.remove(3, 2);
        assert_eq!(runs(&r), vec![(0, 3), (5, 5)]);

        r.remove(0, 3);
        assert_eq!(runs(&r), vec![(5, 5)]);

        r.remove(8, 10);
        assert_eq!(runs(&r), vec![(5, 3)]);
    }

    #[test]
    fn test_remove_across_runs() {
        let mut r = Ranges::new();
        r.add(0, 3);
        r.add(5, 3);
        r.add(10, 3);
        r.remove(2, 10);
        assert_eq!(runs(&r), vec![(0, 2), (12, 1)]);
    }

    #[test]
    fn test_contains_and_values() {
        let mut r = Ranges::new();
        r.add(2, 3);
        assert!(!r.contains(1));
        assert!(r.contains(2));
        assert!(r.contains(4));
        assert!(!r.contains(5));
        assert_eq!(r.values(), vec![2, 3, 4]);
    }

    #[test]
    fn test_clear() {
        let mut r = Ranges::new();
        r.add(0, 4);
        r.clear();
        assert!(r.is_empty());
        assert_eq!(r.size(), 0);
    }
}
