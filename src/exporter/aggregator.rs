use std::collections::VecDeque;

use crate::event::Record;

/// Pending records, oldest first.
#[derive(Debug)]
pub struct Aggregator {
    records: VecDeque<Record>,
    max_batch_entries: usize,
}

impl Aggregator {
    #[must_use]
    pub fn new(max_batch_entries: usize) -> Self {
        Aggregator {
            records: VecDeque::new(),
            max_batch_entries: max_batch_entries.max(1),
        }
    }

    pub fn add_batch(&mut self, records: Vec<Record>) {
        self.records.extend(records);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn has_full_batch(&self) -> bool {
        self.records.len() >= self.max_batch_entries
    }

    /// Takes up to `max_batch_entries` records in insertion order.
    pub fn get_batch(&mut self) -> Vec<Record> {
        let count = self.records.len().min(self.max_batch_entries);
        self.records.drain(..count).collect()
    }

    /// Takes every full batch, leaving the remainder pending.
    pub fn get_full_batches(&mut self) -> Vec<Vec<Record>> {
        let mut batches = Vec::new();
        while self.has_full_batch() {
            batches.push(self.get_batch());
        }
        batches
    }

    /// Takes everything, split into batches.
    pub fn get_all_batches(&mut self) -> Vec<Vec<Record>> {
        let mut batches = Vec::new();
        while !self.is_empty() {
            batches.push(self.get_batch());
        }
        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Span;

    fn records(count: usize) -> Vec<Record> {
        (0..count)
            .map(|i| Record::from(Span::new(format!("span-{i}")).end(Some(0))))
            .collect()
    }

    fn names(batch: &[Record]) -> Vec<String> {
        batch
            .iter()
            .map(|record| match record {
                Record::Span(span) => span.name.clone(),
                Record::Request(event) => event.pathname.clone(),
            })
            .collect()
    }

    #[test]
    fn batches_preserve_order() {
        let mut aggregator = Aggregator::new(2);
        aggregator.add_batch(records(5));

        let batches = aggregator.get_all_batches();
        assert_eq!(batches.len(), 3);
        assert_eq!(names(&batches[0]), vec!["span-0", "span-1"]);
        assert_eq!(names(&batches[1]), vec!["span-2", "span-3"]);
        assert_eq!(names(&batches[2]), vec!["span-4"]);
        assert!(aggregator.is_empty());
    }

    #[test]
    fn full_batches_leave_remainder() {
        let mut aggregator = Aggregator::new(3);
        aggregator.add_batch(records(7));

        let batches = aggregator.get_full_batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(aggregator.len(), 1);
        assert!(!aggregator.has_full_batch());
    }

    #[test]
    fn zero_batch_size_is_clamped() {
        let mut aggregator = Aggregator::new(0);
        aggregator.add_batch(records(2));
        assert_eq!(aggregator.get_batch().len(), 1);
    }

    #[test]
    fn empty_aggregator_has_no_batches() {
        let mut aggregator = Aggregator::new(10);
        assert!(aggregator.get_all_batches().is_empty());
        assert!(aggregator.get_batch().is_empty());
    }

    proptest::proptest! {
        #[test]
        fn batches_are_bounded_and_ordered(count in 0usize..200, batch_size in 1usize..50) {
            let mut aggregator = Aggregator::new(batch_size);
            aggregator.add_batch(records(count));

            let batches = aggregator.get_all_batches();
            assert_eq!(batches.len(), count.div_ceil(batch_size));
            assert!(batches.iter().all(|batch| !batch.is_empty() && batch.len() <= batch_size));

            let flattened: Vec<String> = batches.iter().flat_map(|batch| names(batch)).collect();
            let expected: Vec<String> = (0..count).map(|i| format!("span-{i}")).collect();
            assert_eq!(flattened, expected);
        }
    }
}
