//! Standard MIDI files: note extraction, synthesis and writing.

use crate::error::{MidiError, Result};
use crate::notes::{NoteAction, NoteEvent, NoteSpan, events_to_spans, spans_to_events};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use mosaic_ensemble::region::pitch_to_hz;
use std::f32::consts::PI;

/// Resolution of written files.
pub const TICKS_PER_QUARTER: u16 = 480;

/// Tempo assumed until the first tempo event: 120 BPM.
pub const DEFAULT_TEMPO_US: u32 = 500_000;

/// Tail rendered after the last event, in milliseconds.
const RELEASE_MS: u64 = 300;

const VELOCITY: u8 = 100;

/// Piecewise-constant tempo over ticks.
#[derive(Clone, Debug)]
struct TempoMap {
    ticks_per_quarter: f64,
    /// `(tick, microseconds per quarter)`, sorted, starting at tick 0
    changes: Vec<(u64, u32)>,
}

impl TempoMap {
    fn new(ticks_per_quarter: u16, mut changes: Vec<(u64, u32)>) -> Self {
        changes.sort_by_key(|(tick, _)| *tick);
        if changes.first().is_none_or(|(tick, _)| *tick > 0) {
            changes.insert(0, (0, DEFAULT_TEMPO_US));
        }
        Self {
            ticks_per_quarter: f64::from(ticks_per_quarter.max(1)),
            changes,
        }
    }

    fn ms_at(&self, tick: u64) -> u64 {
        let mut elapsed_us = 0.0;
        for (i, &(start, tempo)) in self.changes.iter().enumerate() {
            if start >= tick {
                break;
            }
            let end = self
                .changes
                .get(i + 1)
                .map_or(tick, |&(next, _)| next.min(tick));
            elapsed_us += (end - start) as f64 * f64::from(tempo) / self.ticks_per_quarter;
        }
        (elapsed_us / 1000.0).round() as u64
    }
}

/// Extract time-ordered note events from MIDI file bytes, honouring tempo changes.
///
/// A note-on with velocity 0 counts as a release. SMPTE timing falls back to
/// 480 ticks per quarter.
pub fn parse_midi(bytes: &[u8]) -> Result<Vec<NoteEvent>> {
    let smf = Smf::parse(bytes)?;

    let ppq = match smf.header.timing {
        Timing::Metrical(t) => t.as_int(),
        Timing::Timecode(_fps, _tpf) => 480,
    };

    let mut tempo_changes = Vec::new();
    let mut notes: Vec<(u64, u8, NoteAction)> = Vec::new();

    for track in &smf.tracks {
        let mut tick = 0u64;

        for event in track {
            tick += u64::from(event.delta.as_int());

            match event.kind {
                TrackEventKind::Midi { message, .. } => match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        notes.push((tick, key.as_int(), NoteAction::On));
                    }
                    MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                        notes.push((tick, key.as_int(), NoteAction::Off));
                    }
                    _ => {}
                },
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    tempo_changes.push((tick, tempo.as_int()));
                }
                _ => {}
            }
        }
    }

    let tempo = TempoMap::new(ppq, tempo_changes);
    notes.sort_by_key(|&(tick, _, action)| (tick, action == NoteAction::On));

    let events: Vec<NoteEvent> = notes
        .into_iter()
        .map(|(tick, pitch, action)| NoteEvent {
            pitch,
            time_ms: tempo.ms_at(tick),
            action,
        })
        .collect();

    tracing::debug!(ppq, events = events.len(), "parsed MIDI notes");
    Ok(events)
}

/// Milliseconds to ticks at the default tempo.
fn ms_to_ticks(ms: u64) -> u64 {
    ms * u64::from(TICKS_PER_QUARTER) * 1000 / u64::from(DEFAULT_TEMPO_US)
}

/// Write notes as a single-track MIDI file at the default tempo.
pub fn write_midi(spans: &[NoteSpan]) -> Result<Vec<u8>> {
    let header = Header::new(Format::SingleTrack, Timing::Metrical(TICKS_PER_QUARTER.into()));

    let mut track: Vec<TrackEvent<'static>> = vec![TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(DEFAULT_TEMPO_US.into())),
    }];

    let mut last_tick = 0u64;
    for event in spans_to_events(spans) {
        let tick = ms_to_ticks(event.time_ms);
        let delta = u32::try_from(tick - last_tick).unwrap_or(u32::MAX);
        last_tick = tick;

        let message = match event.action {
            NoteAction::On => MidiMessage::NoteOn {
                key: event.pitch.into(),
                vel: VELOCITY.into(),
            },
            NoteAction::Off => MidiMessage::NoteOff {
                key: event.pitch.into(),
                vel: 0u8.into(),
            },
        };

        track.push(TrackEvent {
            delta: delta.into(),
            kind: TrackEventKind::Midi {
                channel: 0u8.into(),
                message,
            },
        });
    }

    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header,
        tracks: vec![track],
    };

    let mut buffer = Vec::new();
    smf.write(&mut buffer)
        .map_err(|e| MidiError::Write(e.to_string()))?;
    Ok(buffer)
}

/// Render note events with a small additive sine synthesiser.
///
/// Each note gets three harmonics, a short attack, an exponential decay
/// while held and a linear release. The mix is normalised below full scale.
pub fn render_notes(events: &[NoteEvent], sample_rate: u32) -> Vec<f32> {
    let end_ms = events.iter().map(|e| e.time_ms).max().unwrap_or(0);
    let spans = events_to_spans(events, end_ms);

    let rate = sample_rate as f32;
    let to_samples = |ms: u64| (ms * u64::from(sample_rate) / 1000) as usize;
    let len = to_samples(end_ms + RELEASE_MS);
    let mut out = vec![0.0f32; len];

    let attack = 0.005 * rate;
    let release = 0.1 * rate;

    for span in &spans {
        let freq = pitch_to_hz(f32::from(span.pitch));
        let start = to_samples(span.start_ms);
        let held = to_samples(span.end_ms - span.start_ms);
        let stop = (start + held + release as usize).min(len);

        for (i, sample) in out[start.min(len)..stop].iter_mut().enumerate() {
            let t = i as f32 / rate;
            let i = i as f32;
            let envelope = (i / attack).min(1.0)
                * (-2.0 * t).exp()
                * if i < held as f32 {
                    1.0
                } else {
                    (1.0 - (i - held as f32) / release).max(0.0)
                };

            let phase = 2.0 * PI * freq * t;
            let tone = phase.sin() + 0.5 * (2.0 * phase).sin() + 0.25 * (3.0 * phase).sin();
            *sample += 0.2 * envelope * tone;
        }
    }

    let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 0.8 {
        let gain = 0.8 / peak;
        out.iter_mut().for_each(|s| *s *= gain);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans() -> Vec<NoteSpan> {
        vec![
            NoteSpan {
                pitch: 60,
                start_ms: 0,
                end_ms: 500,
            },
            NoteSpan {
                pitch: 64,
                start_ms: 250,
                end_ms: 1000,
            },
        ]
    }

    #[test]
    fn written_file_parses_back() {
        let bytes = write_midi(&spans()).unwrap();
        assert_eq!(&bytes[..4], b"MThd");

        let events = parse_midi(&bytes).unwrap();
        assert_eq!(
            events,
            vec![
                NoteEvent::on(60, 0),
                NoteEvent::on(64, 250),
                NoteEvent::off(60, 500),
                NoteEvent::off(64, 1000),
            ]
        );
    }

    #[test]
    fn honours_tempo_changes() {
        let header = Header::new(Format::SingleTrack, Timing::Metrical(TICKS_PER_QUARTER.into()));
        let note = |delta: u32, vel: u8| TrackEvent {
            delta: delta.into(),
            kind: TrackEventKind::Midi {
                channel: 0u8.into(),
                message: MidiMessage::NoteOn {
                    key: 69u8.into(),
                    vel: vel.into(),
                },
            },
        };
        // One quarter at 120 BPM, then 60 BPM.
        let track = vec![
            note(0, 100),
            note(480, 0),
            TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(1_000_000u32.into())),
            },
            note(480, 100),
            TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            },
        ];
        let mut bytes = Vec::new();
        Smf {
            header,
            tracks: vec![track],
        }
        .write(&mut bytes)
        .unwrap();

        let events = parse_midi(&bytes).unwrap();
        assert_eq!(
            events,
            vec![NoteEvent::on(69, 0), NoteEvent::off(69, 500), NoteEvent::on(69, 1500)]
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_midi(b"RIFF....WAVE"),
            Err(crate::error::Error::Midi(MidiError::Parse(_)))
        ));
    }

    #[test]
    fn renders_audible_notes() {
        let events = spans_to_events(&spans());
        let audio = render_notes(&events, 8000);

        assert_eq!(audio.len(), 10_400);
        let peak = audio.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.05 && peak <= 0.8 + f32::EPSILON);
        assert!(audio[audio.len() - 1].abs() < 1e-3);
    }
}
