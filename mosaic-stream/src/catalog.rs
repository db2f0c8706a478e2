//! Saved ensembles available for selection.

use crate::error::{CatalogError, Result};
use mosaic_ensemble::ensemble::Ensemble;
use mosaic_ensemble::persist::MAIN_PARAMS;
use std::path::{Path, PathBuf};

/// A models root whose sub-directories holding `main_params.json` are
/// selectable ensembles, plus the name of the one in use.
#[derive(Clone, Debug)]
pub struct ModelCatalog {
    root: PathBuf,
    current: Option<String>,
}

impl ModelCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            current: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sorted names of the selectable ensembles.
    pub fn names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.path().join(MAIN_PARAMS).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Directory of the ensemble called `name`.
    pub fn path(&self, name: &str) -> Result<PathBuf> {
        if self.names()?.iter().any(|n| n == name) {
            Ok(self.root.join(name))
        } else {
            Err(CatalogError::UnknownModel(name.to_owned()).into())
        }
    }

    /// Load the ensemble called `name` without selecting it.
    pub fn load(&self, name: &str) -> Result<Ensemble> {
        let path = self.path(name)?;
        tracing::info!(name, path = ?path.display(), "loading model");
        Ok(Ensemble::load(&path)?)
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Mark `name` as the ensemble in use.
    pub fn select(&mut self, name: &str) -> Result<()> {
        self.path(name)?;
        self.current = Some(name.to_owned());
        Ok(())
    }

    /// Load the first ensemble in name order and select it.
    pub fn load_default(&mut self) -> Result<(String, Ensemble)> {
        let name = self
            .names()?
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::Empty(self.root.clone()))?;
        let ensemble = self.load(&name)?;
        self.current = Some(name.clone());
        Ok((name, ensemble))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use mosaic_ensemble::config::EnsembleConfig;
    use mosaic_ensemble::region::grid;

    fn save_model(root: &Path, name: &str) {
        let config = EnsembleConfig {
            frame_width: 8,
            frame_height: 16,
            regions: grid(8, 16, 2, 1),
            ..EnsembleConfig::default()
        };
        Ensemble::setup(config).unwrap().save(&root.join(name)).unwrap();
    }

    #[test]
    fn lists_only_saved_ensembles() {
        let dir = tempfile::tempdir().unwrap();
        save_model(dir.path(), "zeta");
        save_model(dir.path(), "alpha");
        std::fs::create_dir(dir.path().join("scratch")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let catalog = ModelCatalog::new(dir.path());
        assert_eq!(catalog.names().unwrap(), ["alpha", "zeta"]);
    }

    #[test]
    fn selects_known_models_only() {
        let dir = tempfile::tempdir().unwrap();
        save_model(dir.path(), "alpha");

        let mut catalog = ModelCatalog::new(dir.path());
        assert_eq!(catalog.current(), None);

        let (name, ensemble) = catalog.load_default().unwrap();
        assert_eq!(name, "alpha");
        assert_eq!(ensemble.region_count(), 2);
        assert_eq!(catalog.current(), Some("alpha"));

        let err = catalog.select("missing").unwrap_err();
        assert!(matches!(err, Error::Catalog(CatalogError::UnknownModel(n)) if n == "missing"));
        assert_eq!(catalog.current(), Some("alpha"));
    }

    #[test]
    fn empty_root_has_no_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = ModelCatalog::new(dir.path());
        assert!(matches!(
            catalog.load_default(),
            Err(Error::Catalog(CatalogError::Empty(_)))
        ));
    }
}
