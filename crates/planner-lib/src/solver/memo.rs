//! Round-local memo table for the exact solver
//!
//! One map per suffix start index, keyed by the canonical residual budget
//! vector. Entries hold only the optimal value and the decision taken at that
//! state; selections are rebuilt by replaying decisions from the root.
//!
//! Freeing a table with millions of boxed keys takes a noticeable share of
//! the search time, so large tables are dropped on a detached thread.

use std::collections::HashMap;
use std::thread;

/// Tables above this many entries are released in the background
pub const BACKGROUND_RELEASE_ENTRIES: usize = 1 << 16;

/// Optimal outcome of a search state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoEntry {
    /// Most machines selectable from this state
    pub value: u32,
    /// Whether the machine at this index is taken
    pub include: bool,
}

#[derive(Debug, Default)]
pub struct MemoTable {
    levels: Vec<HashMap<Box<[u32]>, MemoEntry>>,
}

impl MemoTable {
    /// Table for a suffix of `len` machines
    pub fn new(len: usize) -> Self {
        Self {
            levels: (0..len).map(|_| HashMap::new()).collect(),
        }
    }

    pub fn get(&self, index: usize, residual: &[u32]) -> Option<MemoEntry> {
        self.levels.get(index)?.get(residual).copied()
    }

    pub fn insert(&mut self, index: usize, residual: Box<[u32]>, entry: MemoEntry) {
        if let Some(level) = self.levels.get_mut(index) {
            level.insert(residual, entry);
        }
    }

    pub fn len(&self) -> usize {
        self.levels.iter().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(HashMap::is_empty)
    }

    /// Drop the table without charging large deallocations to the caller
    ///
    /// Returns true when the table was handed to a background thread. If the
    /// thread cannot be spawned the table is dropped inline.
    pub fn release(self) -> bool {
        if self.len() <= BACKGROUND_RELEASE_ENTRIES {
            return false;
        }
        thread::Builder::new()
            .name("memo-release".to_string())
            .spawn(move || drop(self))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_independent() {
        let mut memo = MemoTable::new(3);
        let entry = MemoEntry {
            value: 2,
            include: true,
        };
        memo.insert(1, vec![1, 0].into_boxed_slice(), entry);

        assert_eq!(memo.get(1, &[1, 0]), Some(entry));
        assert_eq!(memo.get(0, &[1, 0]), None);
        assert_eq!(memo.get(1, &[0, 1]), None);
        assert_eq!(memo.len(), 1);
    }

    #[test]
    fn test_out_of_range_index() {
        let mut memo = MemoTable::new(1);
        memo.insert(
            5,
            vec![].into_boxed_slice(),
            MemoEntry {
                value: 0,
                include: false,
            },
        );

        assert!(memo.is_empty());
        assert_eq!(memo.get(5, &[]), None);
    }

    #[test]
    fn test_release_small_table_inline() {
        let mut memo = MemoTable::new(2);
        memo.insert(
            0,
            vec![1].into_boxed_slice(),
            MemoEntry {
                value: 1,
                include: true,
            },
        );
        assert!(!memo.release());
    }

    #[test]
    fn test_release_large_table_in_background() {
        let mut memo = MemoTable::new(1);
        for i in 0..=BACKGROUND_RELEASE_ENTRIES as u32 {
            memo.insert(
                0,
                vec![i].into_boxed_slice(),
                MemoEntry {
                    value: 0,
                    include: false,
                },
            );
        }
        assert!(memo.release());
    }
}
