//! In-order release of results that complete out of order
//!
//! Results are keyed by their position in the original sequence. A result
//! is released only once every lower position has been released. A
//! position may complete without a value (a skipped item); it still
//! advances the cursor.
//!
//! ```
//! use fsdownload::OrderedReassembly;
//!
//! let mut order = OrderedReassembly::new();
//! order.complete(1, Some("b"));
//! assert!(order.next_ready().is_none());
//!
//! order.complete(0, None);
//! assert_eq!(order.next_ready(), Some((0, None)));
//! assert_eq!(order.next_ready(), Some((1, Some("b"))));
//! assert_eq!(order.next_index(), 2);
//! ```

use std::collections::BTreeMap;

#[derive(Debug)]
pub struct OrderedReassembly<T> {
    pending: BTreeMap<usize, Option<T>>,
    next: usize,
}

impl<T> Default for OrderedReassembly<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OrderedReassembly<T> {
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            next: 0,
        }
    }

    /// Records the outcome of position `index`
    ///
    /// Positions already released are ignored, so are duplicates of a
    /// position still pending.
    pub fn complete(&mut self, index: usize, value: Option<T>) {
        if index < self.next {
            return;
        }
        self.pending.entry(index).or_insert(value);
    }

    /// Releases the next position if it has completed
    pub fn next_ready(&mut self) -> Option<(usize, Option<T>)> {
        let value = self.pending.remove(&self.next)?;
        let index = self.next;
        self.next += 1;
        Some((index, value))
    }

    /// Releases every position that is ready, in order
    pub fn drain_ready(&mut self) -> Vec<(usize, Option<T>)> {
        std::iter::from_fn(|| self.next_ready()).collect()
    }

    /// Lowest position not yet released
    pub fn next_index(&self) -> usize {
        self.next
    }

    /// Completed positions waiting for a lower one
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn released(order: &[usize], skipped: &[usize]) -> Vec<usize> {
        let mut reassembly = OrderedReassembly::new();
        let mut out = Vec::new();
        for &i in order {
            let value = (!skipped.contains(&i)).then_some(i);
            reassembly.complete(i, value);
            out.extend(reassembly.drain_ready().into_iter().filter_map(|(_, v)| v));
        }
        assert!(reassembly.is_empty());
        out
    }

    #[test]
    fn test_every_completion_order_releases_in_sequence() {
        let orders = [
            [0, 1, 2, 3],
            [3, 2, 1, 0],
            [1, 3, 0, 2],
            [2, 0, 3, 1],
            [3, 0, 1, 2],
        ];
        for order in orders {
            assert_eq!(released(&order, &[]), vec![0, 1, 2, 3], "order {:?}", order);
        }
    }

    #[test]
    fn test_skips_do_not_block_the_cursor() {
        assert_eq!(released(&[2, 1, 0], &[1]), vec![0, 2]);
        assert_eq!(released(&[0, 1, 2], &[0, 1, 2]), Vec::<usize>::new());
    }

    #[test]
    fn test_waits_for_lower_positions() {
        let mut order = OrderedReassembly::new();
        order.complete(2, Some('c'));
        order.complete(1, Some('b'));
        assert!(order.drain_ready().is_empty());
        assert_eq!(order.pending_len(), 2);

        order.complete(0, Some('a'));
        let values: Vec<char> = order.drain_ready().into_iter().filter_map(|(_, v)| v).collect();
        assert_eq!(values, vec!['a', 'b', 'c']);
        assert_eq!(order.next_index(), 3);
    }

    #[test]
    fn test_released_positions_are_ignored() {
        let mut order = OrderedReassembly::new();
        order.complete(0, Some(1));
        assert_eq!(order.next_ready(), Some((0, Some(1))));
        order.complete(0, Some(2));
        assert!(order.is_empty());
    }
}
