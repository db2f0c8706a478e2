//! WAV loading, downmixing and resampling.

use crate::error::{AudioError, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::{Cursor, Read};
use std::path::Path;

/// Sample rate the front end works at.
pub const SAMPLE_RATE: u32 = 44100;

/// Decode every sample of a WAV stream to f32 in `[-1, 1]`, interleaved.
pub fn load_audio<R: Read>(mut reader: WavReader<R>) -> Result<(Vec<f32>, WavSpec)> {
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<hound::Result<_>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<hound::Result<_>>()?
        }
    };

    Ok((samples, spec))
}

/// Average interleaved stereo down to mono. Mono passes through.
pub fn to_mono(samples: Vec<f32>, channels: u16) -> Result<Vec<f32>> {
    match channels {
        1 => Ok(samples),
        2 => Ok(samples
            .chunks(2)
            .map(|chunk| chunk.iter().sum::<f32>() / 2.0)
            .collect()),
        n => Err(AudioError::InvalidChannels(n).into()),
    }
}

/// Linear-interpolation resampling from `from` Hz to `to` Hz.
pub fn resample(samples: &[f32], from: u32, to: u32) -> Vec<f32> {
    if from == to || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(from) / f64::from(to);
    let len = ((samples.len() as f64) / ratio).floor() as usize;
    let last = samples.len() - 1;

    (0..len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let left = (pos.floor() as usize).min(last);
            let right = (left + 1).min(last);
            let frac = (pos - left as f64) as f32;
            samples[left] * (1.0 - frac) + samples[right] * frac
        })
        .collect()
}

fn mono_at<R: Read>(reader: WavReader<R>, sample_rate: u32) -> Result<Vec<f32>> {
    let (audio, spec) = load_audio(reader)?;
    if spec.sample_rate == 0 {
        return Err(AudioError::InvalidSampleRate(spec.sample_rate).into());
    }

    let audio = to_mono(audio, spec.channels)?;
    if audio.is_empty() {
        return Err(AudioError::Empty.into());
    }

    if spec.sample_rate != sample_rate {
        tracing::debug!(from = spec.sample_rate, to = sample_rate, "resampling audio");
    }
    Ok(resample(&audio, spec.sample_rate, sample_rate))
}

/// Load a WAV file as mono f32 samples at `sample_rate`.
///
/// # Errors
///
/// Returns error if:
/// - File cannot be read or is not a WAV file
/// - Channel count is invalid (0 or > 2)
/// - The file holds no samples
pub fn read_audio_mono(path: impl AsRef<Path>, sample_rate: u32) -> Result<Vec<f32>> {
    mono_at(WavReader::open(path)?, sample_rate)
}

/// Decode in-memory WAV bytes as mono f32 samples at `sample_rate`.
pub fn decode_audio_mono(bytes: &[u8], sample_rate: u32) -> Result<Vec<f32>> {
    mono_at(WavReader::new(Cursor::new(bytes))?, sample_rate)
}

fn pcm16_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Encode mono samples as 16-bit PCM WAV bytes.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, pcm16_spec(sample_rate))?;
        for &sample in samples {
            writer.write_sample((sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Write mono samples to a 16-bit PCM WAV file.
pub fn write_wav(path: impl AsRef<Path>, samples: &[f32], sample_rate: u32) -> Result<()> {
    let mut writer = WavWriter::create(path, pcm16_spec(sample_rate))?;
    for &sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn create_test_wav(
        path: &Path,
        sample_rate: u32,
        channels: u16,
        samples: &[f32],
    ) -> hound::Result<()> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec)?;
        for &sample in samples {
            writer.write_sample((sample * 32767.0) as i16)?;
        }
        writer.finalize()?;
        Ok(())
    }

    #[test]
    fn reads_mono_at_native_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let test_samples = vec![0.1, 0.2, 0.3];
        create_test_wav(&path, SAMPLE_RATE, 1, &test_samples).unwrap();

        let result = read_audio_mono(&path, SAMPLE_RATE).unwrap();

        assert_eq!(result.len(), 3);
        for (expected, actual) in test_samples.iter().zip(result.iter()) {
            assert!((expected - actual).abs() < 0.01);
        }
    }

    #[test]
    fn converts_stereo_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        create_test_wav(&path, SAMPLE_RATE, 2, &[0.2, 0.4, 0.6, 0.8]).unwrap();

        let result = read_audio_mono(&path, SAMPLE_RATE).unwrap();

        assert_eq!(result.len(), 2);
        assert!((result[0] - 0.3).abs() < 0.01);
        assert!((result[1] - 0.7).abs() < 0.01);
    }

    #[test]
    fn resamples_to_target_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("low.wav");
        create_test_wav(&path, 22050, 1, &[0.5; 2205]).unwrap();

        let result = read_audio_mono(&path, 44100).unwrap();

        assert_eq!(result.len(), 4410);
        assert!(result.iter().all(|s| (s - 0.5).abs() < 0.01));
    }

    #[test]
    fn rejects_invalid_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surround.wav");
        create_test_wav(&path, SAMPLE_RATE, 6, &[0.0; 12]).unwrap();

        let result = read_audio_mono(&path, SAMPLE_RATE);
        assert!(matches!(
            result,
            Err(Error::Audio(AudioError::InvalidChannels(6)))
        ));
    }

    #[test]
    fn rejects_non_wav_bytes() {
        let result = decode_audio_mono(b"MThd not a wav", SAMPLE_RATE);
        assert!(matches!(result, Err(Error::Audio(AudioError::Hound(_)))));
    }

    #[test]
    fn encoded_bytes_decode_back() {
        let samples: Vec<f32> = (0..100).map(|i| (i as f32 / 100.0) - 0.5).collect();
        let bytes = encode_wav(&samples, SAMPLE_RATE).unwrap();

        let decoded = decode_audio_mono(&bytes, SAMPLE_RATE).unwrap();
        assert_eq!(decoded.len(), samples.len());
        assert!((decoded[10] - samples[10]).abs() < 0.001);
    }
}
