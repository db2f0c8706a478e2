//! Turning per-frame predictions into stable notes.
//!
//! Frame predictions flicker: a held note may drop out for a frame or two
//! and spurious pitches appear briefly. The labeler collects every
//! prediction with its frame index and keeps only notes that persist.

use crate::error::Result;
use crate::midi;
use crate::notes::NoteSpan;
use mosaic_ensemble::types::{PitchSet, SILENCE};
use std::collections::BTreeMap;

/// Frames a note may go unseen before it is closed.
pub const PRUNE_GAP: u64 = 3;

/// Minimum frames between first and last sighting for a note to be kept.
pub const MIN_LIFESPAN: u64 = 3;

/// Minimum lifespan per sighting for a note to be kept.
pub const MIN_STABILITY: f32 = 0.3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Tick {
    index: u64,
    time_ms: u64,
}

#[derive(Clone, Debug, Default)]
pub struct NoteLabeler {
    index: u64,
    sightings: Vec<(u8, Tick)>,
}

impl NoteLabeler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the pitches predicted for the current frame and move to the next.
    pub fn add(&mut self, pitches: &PitchSet, time_ms: u64) {
        let tick = Tick {
            index: self.index,
            time_ms,
        };
        self.sightings.extend(
            pitches
                .iter()
                .filter(|&p| p != SILENCE)
                .map(|pitch| (pitch, tick)),
        );
        self.index += 1;
    }

    /// Move to the next frame without a prediction.
    pub fn skip(&mut self) {
        self.index += 1;
    }

    /// Frames seen so far.
    pub fn frames(&self) -> u64 {
        self.index
    }

    pub fn reset(&mut self) {
        self.index = 0;
        self.sightings.clear();
    }

    /// Notes that persisted, ordered by start time.
    ///
    /// Sightings of a pitch are grouped while gaps stay within [`PRUNE_GAP`]
    /// frames. A group becomes a note when it spans more than
    /// [`MIN_LIFESPAN`] frames and its span per sighting exceeds
    /// [`MIN_STABILITY`].
    pub fn stable_notes(&self) -> Vec<NoteSpan> {
        let mut open: BTreeMap<u8, Vec<Tick>> = BTreeMap::new();
        let mut notes = Vec::new();

        let close = |ticks: &[Tick], pitch: u8, notes: &mut Vec<NoteSpan>| {
            let (Some(first), Some(last)) = (ticks.first(), ticks.last()) else {
                return;
            };
            let lifespan = last.index - first.index;
            let stability = lifespan as f32 / ticks.len() as f32;
            if stability > MIN_STABILITY && lifespan > MIN_LIFESPAN {
                notes.push(NoteSpan {
                    pitch,
                    start_ms: first.time_ms,
                    end_ms: last.time_ms,
                });
            }
        };

        for &(pitch, tick) in &self.sightings {
            open.retain(|&p, ticks| {
                let stale = ticks
                    .last()
                    .is_some_and(|last| tick.index - last.index > PRUNE_GAP);
                if stale {
                    close(ticks, p, &mut notes);
                }
                !stale
            });
            open.entry(pitch).or_default().push(tick);
        }

        for (pitch, ticks) in &open {
            close(ticks, *pitch, &mut notes);
        }

        notes.sort_by_key(|n| (n.start_ms, n.pitch));
        notes
    }

    /// Stable notes as single-track MIDI file bytes.
    pub fn to_midi(&self) -> Result<Vec<u8>> {
        let notes = self.stable_notes();
        tracing::debug!(frames = self.index, notes = notes.len(), "writing labelled notes");
        midi::write_midi(&notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pitches: &[u8]) -> PitchSet {
        pitches.iter().copied().collect()
    }

    #[test]
    fn keeps_notes_that_persist() {
        let mut labeler = NoteLabeler::new();
        for i in 0..10 {
            labeler.add(&set(&[60]), i * 23);
        }
        for _ in 0..5 {
            labeler.skip();
        }

        assert_eq!(
            labeler.stable_notes(),
            vec![NoteSpan {
                pitch: 60,
                start_ms: 0,
                end_ms: 9 * 23
            }]
        );
    }

    #[test]
    fn drops_short_blips() {
        let mut labeler = NoteLabeler::new();
        labeler.add(&set(&[72]), 0);
        labeler.add(&set(&[72]), 23);
        labeler.add(&set(&[0]), 46);
        for _ in 0..10 {
            labeler.skip();
        }
        assert!(labeler.stable_notes().is_empty());
    }

    #[test]
    fn bridges_short_dropouts_and_splits_long_ones() {
        let mut labeler = NoteLabeler::new();
        let mut t = 0;
        let mut frame = |labeler: &mut NoteLabeler, on: bool| {
            if on {
                labeler.add(&set(&[64]), t);
            } else {
                labeler.skip();
            }
            t += 10;
        };

        // 0..=5 on, 2 frames off, 8..=13 on: one note
        for i in 0..14 {
            frame(&mut labeler, !(6..8).contains(&i));
        }
        // 10 frames off, then 6 frames on: a second note
        for _ in 0..10 {
            frame(&mut labeler, false);
        }
        for _ in 0..6 {
            frame(&mut labeler, true);
        }

        let notes = labeler.stable_notes();
        assert_eq!(notes.len(), 2);
        assert_eq!((notes[0].start_ms, notes[0].end_ms), (0, 130));
        assert_eq!((notes[1].start_ms, notes[1].end_ms), (240, 290));
    }

    #[test]
    fn writes_midi() {
        let mut labeler = NoteLabeler::new();
        for i in 0..8 {
            labeler.add(&set(&[48, 55]), i * 100);
        }
        let bytes = labeler.to_midi().unwrap();
        let events = midi::parse_midi(&bytes).unwrap();
        assert_eq!(events.len(), 4);

        labeler.reset();
        assert_eq!(labeler.frames(), 0);
        assert!(labeler.stable_notes().is_empty());
    }
}
