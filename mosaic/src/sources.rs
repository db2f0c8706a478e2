//! Finding labelled audio in training and test directories.

use eyre::{Context, Result};
use mosaic_audio::frontend::{is_midi_path, is_wav_path};
use std::path::{Path, PathBuf};

/// MIDI files, and WAV files with a sibling `.csv` label file, sorted by path.
pub fn labelled_sources(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .wrap_err_with(|| format!("failed to read directory: {:?}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if is_midi_path(&path) {
            files.push(path);
        } else if is_wav_path(&path) {
            if path.with_extension("csv").is_file() {
                files.push(path);
            } else {
                tracing::warn!(path = ?path.display(), "skipping wav without labels");
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Labelled sources of every directory in order.
pub fn labelled_sources_in(dirs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for dir in dirs {
        files.extend(labelled_sources(dir)?);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_midi_and_labelled_wav() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.mid", "a.wav", "a.csv", "c.wav", "d.txt", "e.MIDI"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let files = labelled_sources(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .filter_map(|p| p.file_name()?.to_str())
            .collect();
        assert_eq!(names, ["a.wav", "b.mid", "e.MIDI"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(labelled_sources(&dir.path().join("nope")).is_err());
    }
}
