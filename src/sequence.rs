//! Sort sequencing for sibling sets
//!
//! Sort values are 1-based and contiguous: a sibling set of N records holds 1..N.

/// Position arithmetic for ordered sibling sets
#[derive(Debug, Clone, Copy, Default)]
pub struct SortSequencer;

impl SortSequencer {
    /// Sort value for a record appended to a set of `count` siblings
    pub fn next_position(count: i64) -> i64 {
        count + 1
    }

    /// Move the item at index `from` to the 1-based `position`.
    ///
    /// Positions outside `1..=len` are clamped to the nearest end. Returns the item's
    /// new index, or `None` when `from` is out of range.
    pub fn reinsert<T>(items: &mut Vec<T>, from: usize, position: i64) -> Option<usize> {
        if from >= items.len() {
            return None;
        }

        let len = items.len() as i64;
        let index = (position.clamp(1, len) - 1) as usize;
        let item = items.remove(from);
        items.insert(index, item);
        Some(index)
    }

    /// Assign 1..N in list order.
    ///
    /// Takes the current sort values and returns `(index, new value)` for each entry
    /// whose value changes.
    pub fn renumber(current: &[Option<i64>]) -> Vec<(usize, i64)> {
        current
            .iter()
            .enumerate()
            .filter_map(|(index, value)| {
                let expected = index as i64 + 1;
                (*value != Some(expected)).then_some((index, expected))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_position() {
        assert_eq!(SortSequencer::next_position(0), 1);
        assert_eq!(SortSequencer::next_position(4), 5);
    }

    #[test]
    fn test_reinsert_to_front() {
        let mut items = vec![42, 43];
        assert_eq!(SortSequencer::reinsert(&mut items, 1, 1), Some(0));
        assert_eq!(items, vec![43, 42]);
    }

    #[test]
    fn test_reinsert_middle_and_back() {
        let mut items = vec!['a', 'b', 'c', 'd'];
        assert_eq!(SortSequencer::reinsert(&mut items, 0, 3), Some(2));
        assert_eq!(items, vec!['b', 'c', 'a', 'd']);

        assert_eq!(SortSequencer::reinsert(&mut items, 1, 4), Some(3));
        assert_eq!(items, vec!['b', 'a', 'd', 'c']);
    }

    #[test]
    fn test_reinsert_clamps() {
        let mut items = vec![1, 2, 3];
        assert_eq!(SortSequencer::reinsert(&mut items, 2, 0), Some(0));
        assert_eq!(items, vec![3, 1, 2]);

        assert_eq!(SortSequencer::reinsert(&mut items, 0, 99), Some(2));
        assert_eq!(items, vec![1, 2, 3]);

        assert_eq!(SortSequencer::reinsert(&mut items, 3, 1), None);
        assert_eq!(SortSequencer::reinsert::<i32>(&mut Vec::new(), 0, 1), None);
    }

    #[test]
    fn test_renumber_reports_changes() {
        assert!(SortSequencer::renumber(&[Some(1), Some(2)]).is_empty());
        assert_eq!(
            SortSequencer::renumber(&[Some(2), Some(1), None]),
            vec![(0, 1), (1, 2), (2, 3)]
        );
        assert_eq!(
            SortSequencer::renumber(&[Some(1), Some(3), Some(3)]),
            vec![(1, 2)]
        );
    }
}
