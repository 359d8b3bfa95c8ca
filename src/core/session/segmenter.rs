//! EPD-driven utterance segmentation state machine.
//!
//! The segmenter is the per-session clock: every EPD status event advances
//! `n_chunks` by one, then the transition rules run. Speech onset opens an
//! utterance with a short pre-roll so the first phoneme is not clipped;
//! sustained speech emits interim partials on a fixed cadence; a short pause
//! emits one more partial and latches until speech resumes; a long pause or
//! an explicit end closes the utterance with a final and resets for the next
//! one. All arithmetic is in chunk units; the segmenter never sees bytes or
//! wall time.

use crate::core::epd::EpdStatus;

/// Chunks of audio included before the detected speech onset.
pub const PRE_ROLL_CHUNKS: u64 = 4;
/// Minimum chunk gap between consecutive in-speech partials.
pub const PARTIAL_STEP_CHUNKS: u64 = 5;
/// Pause length (from utterance start) past which a pause closes the
/// utterance instead of emitting a partial.
pub const LONG_PAUSE_CHUNKS: u64 = 50;

/// One recognition request produced by the segmenter, in chunk units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Emission {
    pub start: u64,
    pub end: u64,
    pub is_final: bool,
}

/// Per-session segmentation state.
#[derive(Debug, Default)]
pub struct Segmenter {
    start: u64,
    end: u64,
    /// An utterance is currently open.
    flag: bool,
    /// A short-pause partial has already been emitted for this utterance.
    recognized: bool,
    /// Chunk index of the most recent emission opportunity, rate-limits
    /// in-speech partials.
    last_chunk: u64,
    /// EPD events observed; the authoritative session clock. Never resets.
    n_chunks: u64,
}

impl Segmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_chunks(&self) -> u64 {
        self.n_chunks
    }

    pub fn utterance_start(&self) -> u64 {
        self.start
    }

    pub fn is_open(&self) -> bool {
        self.flag
    }

    /// Feed one EPD status event. The clock advances before the rules run;
    /// at most one emission results.
    pub fn on_event(&mut self, status: EpdStatus) -> Option<Emission> {
        self.n_chunks += 1;
        let n = self.n_chunks;

        match status {
            EpdStatus::Speech => {
                let mut emission = None;
                if !self.flag {
                    self.flag = true;
                    // Pre-roll, floored at the previous utterance boundary so
                    // a new utterance never reaches into truncated audio.
                    self.start = self.start.max(n.saturating_sub(PRE_ROLL_CHUNKS));
                    self.end = n;
                    self.last_chunk = n;
                } else if n - self.last_chunk >= PARTIAL_STEP_CHUNKS {
                    self.end = n;
                    emission = self.emit(false);
                    self.last_chunk = n;
                }
                self.recognized = false;
                emission
            }

            EpdStatus::Pause if self.flag && !self.recognized => {
                self.end = n;
                if n - self.start > LONG_PAUSE_CHUNKS {
                    let emission = self.emit(true);
                    self.reset();
                    emission
                } else {
                    self.last_chunk = n;
                    let emission = self.emit(false);
                    self.recognized = true;
                    emission
                }
            }

            EpdStatus::End if self.flag => {
                self.end = n;
                let emission = self.emit(true);
                self.reset();
                emission
            }

            _ => None,
        }
    }

    /// Close the open utterance at turn end. Used by the drain protocol
    /// after EPD quiescence.
    pub fn leftover_final(&mut self) -> Option<Emission> {
        if !self.flag || self.n_chunks - self.start <= 1 {
            return None;
        }
        self.end = self.n_chunks;
        let emission = self.emit(true);
        self.reset();
        emission
    }

    /// Degenerate single-chunk ranges are suppressed.
    fn emit(&self, is_final: bool) -> Option<Emission> {
        if self.end - self.start > 1 {
            Some(Emission {
                start: self.start,
                end: self.end,
                is_final,
            })
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.start = self.end;
        self.flag = false;
        self.recognized = false;
        self.last_chunk = self.n_chunks;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::epd::EpdStatus::{End, Pause, Speech, Waiting};

    /// Drive a trace, asserting the state invariant after every event.
    fn run(segmenter: &mut Segmenter, trace: &[EpdStatus]) -> Vec<Emission> {
        let mut emissions = Vec::new();
        for &status in trace {
            if let Some(emission) = segmenter.on_event(status) {
                emissions.push(emission);
            }
            assert!(
                segmenter.start <= segmenter.end && segmenter.end <= segmenter.n_chunks,
                "invariant violated: start={} end={} n_chunks={}",
                segmenter.start,
                segmenter.end,
                segmenter.n_chunks
            );
        }
        emissions
    }

    fn partial(start: u64, end: u64) -> Emission {
        Emission { start, end, is_final: false }
    }

    fn fin(start: u64, end: u64) -> Emission {
        Emission { start, end, is_final: true }
    }

    #[test]
    fn test_pre_roll_open_and_step_partial() {
        // W,W,W then sustained speech: opens at chunk 4 with start=0 and
        // emits the first step partial at chunk 9.
        let mut seg = Segmenter::new();
        let trace = [Waiting, Waiting, Waiting, Speech, Speech, Speech, Speech, Speech, Speech, Speech];
        let emissions = run(&mut seg, &trace);
        assert_eq!(emissions, vec![partial(0, 9)]);
        assert!(seg.is_open());
        assert_eq!(seg.utterance_start(), 0);

        // Turn end with the utterance still open yields one leftover final.
        assert_eq!(seg.leftover_final(), Some(fin(0, 10)));
        assert!(!seg.is_open());
        assert_eq!(seg.leftover_final(), None);
    }

    #[test]
    fn test_short_pause_emits_one_partial_and_latches() {
        // Five idle chunks, speech at chunk 6 (start = 6 - 4 = 2), pause at
        // chunk 7: short-pause partial [2,7), then further pauses are no-ops.
        let mut seg = Segmenter::new();
        let trace = [Waiting, Waiting, Waiting, Waiting, Waiting, Speech, Pause];
        let emissions = run(&mut seg, &trace);
        assert_eq!(emissions, vec![partial(2, 7)]);

        let emissions = run(&mut seg, &[Pause, Pause, Pause]);
        assert!(emissions.is_empty(), "latched pause must not re-emit");

        // Speech clears the latch; the next pause emits again.
        let emissions = run(&mut seg, &[Speech, Pause]);
        assert_eq!(emissions, vec![partial(2, 12)]);
    }

    #[test]
    fn test_long_pause_closes_the_utterance() {
        let mut seg = Segmenter::new();
        let emissions = run(&mut seg, &vec![Speech; 55]);
        // Step partials at chunks 6, 11, ..., 51.
        assert_eq!(emissions.len(), 10);
        assert!(emissions.iter().all(|e| !e.is_final && e.start == 0));
        assert_eq!(emissions.last(), Some(&partial(0, 51)));

        // Pause at chunk 56: 56 - 0 > 50, so a final closes the utterance.
        let emissions = run(&mut seg, &[Pause]);
        assert_eq!(emissions, vec![fin(0, 56)]);
        assert!(!seg.is_open());
        assert_eq!(seg.utterance_start(), 56);
    }

    #[test]
    fn test_two_utterances_in_one_turn() {
        let mut seg = Segmenter::new();
        let mut trace = vec![Speech; 10];
        trace.push(End);
        trace.extend(vec![Speech; 10]);
        trace.push(End);

        let emissions = run(&mut seg, &trace);
        assert_eq!(
            emissions,
            vec![partial(0, 6), fin(0, 11), partial(11, 17), fin(11, 22)]
        );
        // The second utterance's pre-roll is floored at the first final's
        // boundary; it never reaches back into released audio.
        let finals: Vec<_> = emissions.iter().filter(|e| e.is_final).collect();
        assert_eq!(finals.len(), 2);
    }

    #[test]
    fn test_no_speech_emits_nothing() {
        let mut seg = Segmenter::new();
        let mut trace = vec![Waiting; 30];
        trace.extend(vec![Pause; 60]);
        trace.push(End);
        let emissions = run(&mut seg, &trace);
        assert!(emissions.is_empty());
        assert_eq!(seg.leftover_final(), None);
        assert_eq!(seg.n_chunks(), 91);
    }

    #[test]
    fn test_degenerate_single_chunk_suppressed() {
        // Open at the very first chunk, turn end one chunk later:
        // n_chunks - start == 1, no final.
        let mut seg = Segmenter::new();
        run(&mut seg, &[Speech]);
        assert!(seg.is_open());
        assert_eq!(seg.leftover_final(), None);

        // An END right after a reset likewise resets without emitting.
        let mut seg = Segmenter::new();
        let mut trace = vec![Speech; 10];
        trace.push(End); // final [0, 11), reset at 11
        trace.push(Speech); // reopen, start floored to 11
        trace.push(End); // end - start = 13 - 11 = 2 > 1: emits
        let emissions = run(&mut seg, &trace);
        assert_eq!(emissions.last(), Some(&fin(11, 13)));
    }

    #[test]
    fn test_end_without_open_utterance_is_a_no_op() {
        let mut seg = Segmenter::new();
        let emissions = run(&mut seg, &[End, End, Waiting, End]);
        assert!(emissions.is_empty());
        assert_eq!(seg.n_chunks(), 4);
    }

    #[test]
    fn test_timeout_statuses_are_no_ops() {
        let mut seg = Segmenter::new();
        let emissions = run(
            &mut seg,
            &[Speech, EpdStatus::Timeout, EpdStatus::MaxTimeout, EpdStatus::None],
        );
        assert!(emissions.is_empty());
        assert!(seg.is_open());
        assert_eq!(seg.n_chunks(), 4);
    }

    #[test]
    fn test_clock_never_resets() {
        let mut seg = Segmenter::new();
        let mut trace = vec![Speech; 10];
        trace.push(End);
        trace.extend(vec![Speech; 10]);
        trace.push(End);
        run(&mut seg, &trace);
        assert_eq!(seg.n_chunks(), 22);
        assert_eq!(seg.utterance_start(), 22);
    }

    #[test]
    fn test_speech_resets_recognized_latch_only_after_open() {
        // recognized clears on every SPEECH, so alternating pause/speech
        // keeps emitting short-pause partials while the cadence allows.
        let mut seg = Segmenter::new();
        run(&mut seg, &vec![Speech; 6]); // open [0, ..), partial at 6
        let emissions = run(&mut seg, &[Pause, Speech, Pause]);
        assert_eq!(emissions, vec![partial(0, 7), partial(0, 9)]);
    }
}
