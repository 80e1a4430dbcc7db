use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Bounded log of the indices the viewer has moved away from.
///
/// The cursor is `None` while sitting on the live edge and `Some(i)` while replaying
/// `entries[i]`. Recording always returns to the live edge.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: VecDeque<usize>,
    cursor: Option<usize>,
    capacity: usize,
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            cursor: None,
            capacity,
        }
    }

    /// Appends `index` unless it repeats the newest entry. The oldest entry is
    /// evicted once the log is full.
    pub fn record(&mut self, index: usize) {
        if self.entries.back() != Some(&index) {
            if self.entries.len() == self.capacity {
                self.entries.pop_front();
            }
            self.entries.push_back(index);
        }
        self.cursor = None;
    }

    /// Steps one entry further into the past. `None` when there is nothing older,
    /// in which case the cursor does not move.
    pub fn previous(&mut self) -> Option<usize> {
        let next_cursor = match self.cursor {
            None if self.entries.is_empty() => return None,
            None => self.entries.len() - 1,
            Some(0) => return None,
            Some(cursor) => (cursor - 1).min(self.entries.len() - 1),
        };
        self.cursor = Some(next_cursor);
        self.entries.get(next_cursor).copied()
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn is_browsing(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().copied()
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prop_assert;

    #[test]
    fn empty_log_has_no_previous() {
        let mut log = HistoryLog::default();
        assert_eq!(log.previous(), None);
        assert_eq!(log.cursor(), None);
    }

    #[test]
    fn previous_walks_back_then_stops() {
        let mut log = HistoryLog::default();
        for idx in [4, 9, 2] {
            log.record(idx);
        }

        assert_eq!(log.previous(), Some(2));
        assert_eq!(log.previous(), Some(9));
        assert_eq!(log.previous(), Some(4));
        assert_eq!(log.previous(), None);
        assert_eq!(log.cursor(), Some(0));
    }

    #[test]
    fn consecutive_duplicates_are_collapsed() {
        let mut log = HistoryLog::default();
        log.record(1);
        log.record(1);
        log.record(2);
        log.record(1);
        assert_eq!(log.entries().collect::<Vec<_>>(), vec![1, 2, 1]);
    }

    #[test]
    fn record_returns_to_live_edge() {
        let mut log = HistoryLog::default();
        log.record(1);
        log.record(2);
        log.previous();
        assert!(log.is_browsing());

        log.record(2);
        assert_eq!(log.cursor(), None);
        assert_eq!(log.previous(), Some(2));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut log = HistoryLog::new(3);
        for idx in 0..5 {
            log.record(idx);
        }
        assert_eq!(log.entries().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn reset_clears_everything() {
        let mut log = HistoryLog::default();
        log.record(1);
        log.previous();
        log.reset();
        assert!(log.is_empty());
        assert_eq!(log.cursor(), None);
    }

    proptest::proptest! {
        #[test]
        fn never_stores_consecutive_duplicates(indices in proptest::collection::vec(0usize..5, 0..200)) {
            let mut log = HistoryLog::new(50);
            for idx in indices {
                log.record(idx);
            }
            let entries: Vec<usize> = log.entries().collect();
            prop_assert!(entries.windows(2).all(|pair| pair[0] != pair[1]));
            prop_assert!(entries.len() <= 50);
        }

        #[test]
        fn replays_every_entry_in_reverse(indices in proptest::collection::vec(0usize..20, 0..60)) {
            let mut log = HistoryLog::default();
            for idx in &indices {
                log.record(*idx);
            }
            let recorded: Vec<usize> = log.entries().collect();

            let mut replayed = Vec::new();
            while let Some(idx) = log.previous() {
                replayed.push(idx);
            }
            replayed.reverse();
            prop_assert!(replayed == recorded);
            prop_assert!(log.previous().is_none());
        }
    }
}
