//! Model directory layout and file helpers.
//!
//! ```text
//! <root>/
//!   main_params.json
//!   note_map.txt          (when location conditioning or voting is enabled)
//!   model_0/params.json
//!   model_0/encoder.bin
//!   model_0/memory.bin    (when the sequence memory is enabled)
//!   model_0/classifier.bin
//!   ...
//!   voting/params.json
//!   voting/memory.bin
//!   voting/classifier.bin
//! ```

use crate::error::{ConfigError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const MAIN_PARAMS: &str = "main_params.json";
pub const PARAMS: &str = "params.json";
pub const NOTE_MAP: &str = "note_map.txt";
pub const VOTING_DIR: &str = "voting";
pub const ENCODER_BLOB: &str = "encoder.bin";
pub const MEMORY_BLOB: &str = "memory.bin";
pub const CLASSIFIER_BLOB: &str = "classifier.bin";

const MODEL_PREFIX: &str = "model_";

/// Directory of region model `index` under `root`.
pub fn model_dir(root: &Path, index: usize) -> PathBuf {
    root.join(format!("{MODEL_PREFIX}{index}"))
}

/// Region model directories under `root`, sorted by numeric index.
pub fn model_dirs(root: &Path) -> Result<Vec<(usize, PathBuf)>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(index) = name
            .to_str()
            .and_then(|n| n.strip_prefix(MODEL_PREFIX))
            .and_then(|n| n.parse::<usize>().ok())
        else {
            continue;
        };
        dirs.push((index, entry.path()));
    }
    dirs.sort_by_key(|(index, _)| *index);
    Ok(dirs)
}

/// Write pretty JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

/// Read a parameter file. Missing or malformed files are configuration errors.
pub fn read_params<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::MissingParams(path.to_path_buf()).into());
        }
        Err(e) => return Err(e.into()),
    };

    serde_json::from_str(&text).map_err(|source| {
        ConfigError::InvalidParams {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

/// Write a binary weight blob.
pub fn write_blob<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

/// Read a binary weight blob. A missing file is logged and yields `None`.
pub fn read_blob<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = ?path.display(), "weight file missing");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    Ok(Some(bincode::deserialize_from(BufReader::new(file))?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn lists_model_dirs_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        for i in [10, 2, 0] {
            std::fs::create_dir(model_dir(dir.path(), i)).unwrap();
        }
        std::fs::create_dir(dir.path().join(VOTING_DIR)).unwrap();
        std::fs::write(dir.path().join("model_7"), "not a dir").unwrap();

        let indices: Vec<_> = model_dirs(dir.path()).unwrap().into_iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![0, 2, 10]);
    }

    #[test]
    fn missing_params_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result: Result<serde_json::Value> = read_params(&dir.path().join(PARAMS));
        assert!(matches!(result, Err(Error::Config(ConfigError::MissingParams(_)))));
    }

    #[test]
    fn malformed_params_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PARAMS);
        std::fs::write(&path, "{ nope").unwrap();
        let result: Result<serde_json::Value> = read_params(&path);
        assert!(matches!(result, Err(Error::Config(ConfigError::InvalidParams { .. }))));
    }

    #[test]
    fn missing_blob_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let blob: Option<Vec<u32>> = read_blob(&dir.path().join(ENCODER_BLOB)).unwrap();
        assert!(blob.is_none());

        let path = dir.path().join(CLASSIFIER_BLOB);
        write_blob(&path, &vec![1u32, 2, 3]).unwrap();
        assert_eq!(read_blob::<Vec<u32>>(&path).unwrap(), Some(vec![1, 2, 3]));
    }
}
