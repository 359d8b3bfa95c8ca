//! Per-session reorder buffer for in-order result delivery.
//!
//! Recognition results come back from the batch dispatcher in arbitrary
//! order; the client must observe them in strictly ascending sequence order
//! with no duplicates. A missing sequence blocks everything behind it until
//! the drain deadline sweeps the holes.

use std::collections::BTreeMap;

use crate::core::stt::Utterance;

/// One releasable recognition result.
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    pub utterance: Utterance,
    pub is_final: bool,
}

#[derive(Debug)]
enum Slot {
    Result(DeliveryResult),
    /// The work item was dropped before recognition (buffer range miss);
    /// the sequence advances without a client-visible delivery.
    Skipped,
}

/// Sequence-ordered release buffer.
#[derive(Debug, Default)]
pub struct Reassembler {
    expected_seq: u64,
    pending: BTreeMap<u64, Slot>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence number eligible for release. Monotonically
    /// non-decreasing.
    pub fn expected_seq(&self) -> u64 {
        self.expected_seq
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Accept one result. Returns the run of results that became releasable,
    /// in ascending sequence order. Sequences already released or already
    /// buffered are ignored.
    pub fn accept(
        &mut self,
        seq: u64,
        result: DeliveryResult,
    ) -> Vec<(u64, DeliveryResult)> {
        if seq < self.expected_seq || self.pending.contains_key(&seq) {
            return Vec::new();
        }
        self.pending.insert(seq, Slot::Result(result));
        self.drain_ready()
    }

    /// Record that `seq` will never produce a result and must not block
    /// delivery. May itself unblock buffered successors.
    pub fn mark_skipped(&mut self, seq: u64) -> Vec<(u64, DeliveryResult)> {
        if seq < self.expected_seq || self.pending.contains_key(&seq) {
            return Vec::new();
        }
        self.pending.insert(seq, Slot::Skipped);
        self.drain_ready()
    }

    /// Drain-deadline sweep: release everything still buffered in ascending
    /// order, skipping holes, and advance `expected_seq` past all of it.
    /// Only legal after turn end; during an active session holes block.
    pub fn release_remaining(&mut self) -> Vec<(u64, DeliveryResult)> {
        let mut released = Vec::new();
        for (seq, slot) in std::mem::take(&mut self.pending) {
            if let Slot::Result(result) = slot {
                released.push((seq, result));
            }
            self.expected_seq = self.expected_seq.max(seq + 1);
        }
        released
    }

    fn drain_ready(&mut self) -> Vec<(u64, DeliveryResult)> {
        let mut released = Vec::new();
        while let Some(slot) = self.pending.remove(&self.expected_seq) {
            if let Slot::Result(result) = slot {
                released.push((self.expected_seq, result));
            }
            self.expected_seq += 1;
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(text: &str) -> DeliveryResult {
        DeliveryResult {
            utterance: Utterance {
                id: format!("test_{text}"),
                text: text.to_string(),
                extra: serde_json::Map::new(),
            },
            is_final: false,
        }
    }

    fn texts(released: &[(u64, DeliveryResult)]) -> Vec<(u64, String)> {
        released
            .iter()
            .map(|(seq, r)| (*seq, r.utterance.text.clone()))
            .collect()
    }

    #[test]
    fn test_in_order_release() {
        let mut r = Reassembler::new();
        assert_eq!(texts(&r.accept(0, result("a"))), vec![(0, "a".to_string())]);
        assert_eq!(texts(&r.accept(1, result("b"))), vec![(1, "b".to_string())]);
        assert_eq!(r.expected_seq(), 2);
        assert_eq!(r.pending_len(), 0);
    }

    #[test]
    fn test_out_of_order_result_is_withheld() {
        let mut r = Reassembler::new();
        // seq 1 arrives first: withheld.
        assert!(r.accept(1, result("b")).is_empty());
        assert_eq!(r.pending_len(), 1);
        assert_eq!(r.expected_seq(), 0);

        // seq 0 arrives: both release, in order.
        let released = r.accept(0, result("a"));
        assert_eq!(
            texts(&released),
            vec![(0, "a".to_string()), (1, "b".to_string())]
        );
        assert_eq!(r.expected_seq(), 2);
    }

    #[test]
    fn test_duplicates_are_ignored() {
        let mut r = Reassembler::new();
        r.accept(0, result("a"));
        assert!(r.accept(0, result("a2")).is_empty());

        r.accept(2, result("c"));
        assert!(r.accept(2, result("c2")).is_empty());
        assert_eq!(r.pending_len(), 1);
    }

    #[test]
    fn test_skip_tombstone_advances_silently() {
        let mut r = Reassembler::new();
        assert!(r.accept(1, result("b")).is_empty());
        // seq 0 was a buffer range miss: skipping it releases seq 1.
        let released = r.mark_skipped(0);
        assert_eq!(texts(&released), vec![(1, "b".to_string())]);
        assert_eq!(r.expected_seq(), 2);
    }

    #[test]
    fn test_hole_blocks_until_release_remaining() {
        let mut r = Reassembler::new();
        let released = r.accept(0, result("a"));
        assert_eq!(released.len(), 1);

        // seq 1 was lost in a failed batch; seq 2 stays buffered.
        assert!(r.accept(2, result("c")).is_empty());
        assert_eq!(r.pending_len(), 1);

        // Post-drain sweep releases seq 2 and advances past the hole.
        let released = r.release_remaining();
        assert_eq!(texts(&released), vec![(2, "c".to_string())]);
        assert_eq!(r.expected_seq(), 3);
        assert_eq!(r.pending_len(), 0);
    }

    #[test]
    fn test_release_remaining_on_empty_buffer() {
        let mut r = Reassembler::new();
        r.accept(0, result("a"));
        assert!(r.release_remaining().is_empty());
        assert_eq!(r.expected_seq(), 1);
    }

    #[test]
    fn test_expected_seq_is_monotone() {
        let mut r = Reassembler::new();
        let mut last = r.expected_seq();
        for seq in [3u64, 0, 2, 1, 5] {
            r.accept(seq, result("x"));
            assert!(r.expected_seq() >= last);
            last = r.expected_seq();
        }
        r.release_remaining();
        assert!(r.expected_seq() >= last);
        assert_eq!(r.expected_seq(), 6);
    }
}
