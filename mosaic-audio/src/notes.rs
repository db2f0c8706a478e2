//! Note labels: names, the `.csv` label format and active-note tracking.
//!
//! A label file lists one event per line as `<note>,<ms>,UP|DOWN`, for
//! example `C#4,1250,UP`. `UP` starts a note and `DOWN` releases it.

use crate::error::{LabelError, Result};
use mosaic_ensemble::types::{MAX_PITCH, PitchSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::Path;

/// How long a released note keeps being reported, in milliseconds.
pub const ECHO_FADE_MS: u64 = 150;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteAction {
    /// Note starts sounding
    On,
    /// Note is released
    Off,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteEvent {
    pub pitch: u8,
    pub time_ms: u64,
    pub action: NoteAction,
}

impl NoteEvent {
    pub const fn on(pitch: u8, time_ms: u64) -> Self {
        Self {
            pitch,
            time_ms,
            action: NoteAction::On,
        }
    }

    pub const fn off(pitch: u8, time_ms: u64) -> Self {
        Self {
            pitch,
            time_ms,
            action: NoteAction::Off,
        }
    }
}

/// A note with a start and end, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSpan {
    pub pitch: u8,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// MIDI pitch of a note name such as `C4`, `Db3` or `F#-1`. `C4` is 60.
pub fn note_to_pitch(name: &str) -> Option<u8> {
    let name = name.trim();
    let letter = name.chars().next()?;

    let base: i32 = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let rest = &name[letter.len_utf8()..];
    let (shift, octave) = match rest.as_bytes().first() {
        Some(b'#') => (1, &rest[1..]),
        Some(b'b') => (-1, &rest[1..]),
        _ => (0, rest),
    };

    let octave: i32 = octave.parse().ok()?;
    let pitch = 12 * (octave + 1) + base + shift;
    u8::try_from(pitch).ok().filter(|&p| p <= MAX_PITCH)
}

/// Name of a MIDI pitch using sharps, e.g. 61 → `C#4`.
pub fn pitch_to_note(pitch: u8) -> String {
    let octave = i32::from(pitch / 12) - 1;
    format!("{}{octave}", NOTE_NAMES[usize::from(pitch % 12)])
}

/// Parse label file contents. Blank lines are skipped; events are returned sorted by time.
pub fn parse_notes(text: &str) -> Result<Vec<NoteEvent>> {
    let mut events = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let invalid = || LabelError::InvalidLine {
            line: index + 1,
            content: line.to_string(),
        };

        let mut parts = line.split(',').map(str::trim);
        let (Some(name), Some(time), Some(action), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid().into());
        };

        let pitch = note_to_pitch(name).ok_or_else(|| LabelError::UnknownNote(name.to_string()))?;
        let time_ms: u64 = time.parse().map_err(|_| invalid())?;
        let action = match action {
            "UP" => NoteAction::On,
            "DOWN" => NoteAction::Off,
            _ => return Err(invalid().into()),
        };

        events.push(NoteEvent {
            pitch,
            time_ms,
            action,
        });
    }

    events.sort_by_key(|e| e.time_ms);
    Ok(events)
}

/// Read a label file.
pub fn read_notes(path: impl AsRef<Path>) -> Result<Vec<NoteEvent>> {
    parse_notes(&std::fs::read_to_string(path)?)
}

/// Format events in the label file format.
pub fn format_notes(events: &[NoteEvent]) -> String {
    let mut out = String::new();
    for event in events {
        let action = match event.action {
            NoteAction::On => "UP",
            NoteAction::Off => "DOWN",
        };
        let _ = writeln!(out, "{},{},{action}", pitch_to_note(event.pitch), event.time_ms);
    }
    out
}

/// Split spans into time-ordered on/off events. Offs sort before ons at equal times.
pub fn spans_to_events(spans: &[NoteSpan]) -> Vec<NoteEvent> {
    let mut events: Vec<NoteEvent> = spans
        .iter()
        .flat_map(|s| [NoteEvent::on(s.pitch, s.start_ms), NoteEvent::off(s.pitch, s.end_ms)])
        .collect();
    events.sort_by_key(|e| (e.time_ms, e.action == NoteAction::On));
    events
}

/// Pair on/off events into spans. Notes never released end at `end_ms`.
pub fn events_to_spans(events: &[NoteEvent], end_ms: u64) -> Vec<NoteSpan> {
    let mut open: BTreeMap<u8, u64> = BTreeMap::new();
    let mut spans = Vec::new();

    for event in events {
        match event.action {
            NoteAction::On => {
                if let Some(start_ms) = open.insert(event.pitch, event.time_ms) {
                    spans.push(NoteSpan {
                        pitch: event.pitch,
                        start_ms,
                        end_ms: event.time_ms,
                    });
                }
            }
            NoteAction::Off => {
                if let Some(start_ms) = open.remove(&event.pitch) {
                    spans.push(NoteSpan {
                        pitch: event.pitch,
                        start_ms,
                        end_ms: event.time_ms,
                    });
                }
            }
        }
    }

    spans.extend(open.into_iter().map(|(pitch, start_ms)| NoteSpan {
        pitch,
        start_ms,
        end_ms: end_ms.max(start_ms),
    }));
    spans.sort_by_key(|s| (s.start_ms, s.pitch));
    spans
}

/// Notes sounding at a playback position.
///
/// Released notes stay reported for [`ECHO_FADE_MS`], matching the decay
/// still visible in the spectrogram after a key is lifted.
#[derive(Clone, Debug, Default)]
pub struct ActiveNotes {
    events: Vec<NoteEvent>,
    cursor: usize,
    position_ms: u64,
    sounding: BTreeSet<u8>,
    fading: BTreeMap<u8, u64>,
}

impl ActiveNotes {
    pub fn new(mut events: Vec<NoteEvent>) -> Self {
        events.sort_by_key(|e| e.time_ms);
        Self {
            events,
            ..Self::default()
        }
    }

    pub fn events(&self) -> &[NoteEvent] {
        &self.events
    }

    pub fn position_ms(&self) -> u64 {
        self.position_ms
    }

    /// Apply every event up to and including `position_ms`.
    pub fn advance(&mut self, position_ms: u64) {
        while let Some(&event) = self.events.get(self.cursor)
            && event.time_ms <= position_ms
        {
            match event.action {
                NoteAction::On => {
                    self.sounding.insert(event.pitch);
                    self.fading.remove(&event.pitch);
                }
                NoteAction::Off => {
                    if self.sounding.remove(&event.pitch) {
                        self.fading.insert(event.pitch, event.time_ms + ECHO_FADE_MS);
                    }
                }
            }
            self.cursor += 1;
        }

        self.fading.retain(|_, expiry| *expiry >= position_ms);
        self.position_ms = position_ms;
    }

    /// Sounding plus fading notes.
    pub fn current(&self) -> PitchSet {
        self.sounding
            .iter()
            .chain(self.fading.keys())
            .copied()
            .collect()
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
        self.position_ms = 0;
        self.sounding.clear();
        self.fading.clear();
    }
}
