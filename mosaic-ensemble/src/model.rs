//! Region model: one ensemble member bound to a fixed rectangle of the frame.
//!
//! A region model crops its rectangle, binarizes it into an input code,
//! encodes it into sparse columns, optionally extends the columns with its
//! sequence memory's prediction, and classifies the result into pitches.

use crate::codebook::{NoteCode, NoteCodeBook};
use crate::config::{CONFIG_VERSION, RegionModelConfig};
use crate::error::{ConfigError, Result};
use crate::persist::{self, CLASSIFIER_BLOB, ENCODER_BLOB, MEMORY_BLOB, PARAMS};
use crate::primitives::{
    ColumnEncoder, LabelClassifier, SdrClassifier, SequenceMemory, SpatialEncoder,
    TransitionMemory,
};
use crate::region::{FrequencyAxis, PitchRange};
use crate::sdr::Sdr;
use crate::types::{Image, MAX_PITCH, PitchSet, Region, SILENCE};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Label space of an unrestricted region: silence plus every pitch.
const FULL_LABEL_COUNT: usize = MAX_PITCH as usize + 1;

/// Contents of `model_<i>/params.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionModelParams {
    pub version: u32,
    pub index: usize,
    pub region: Region,
    /// Informational; recomputed from the region on load
    pub pitch_range: Option<PitchRange>,
    pub config: RegionModelConfig,
}

#[derive(Debug)]
pub struct RegionModel {
    index: usize,
    region: Region,
    config: RegionModelConfig,
    pitch_range: Option<PitchRange>,
    location: Option<NoteCode>,
    encoder: ColumnEncoder,
    memory: Option<TransitionMemory>,
    classifier: SdrClassifier,
    rng: ChaCha8Rng,
    activation: Sdr,
    restored: bool,
}

impl RegionModel {
    /// Fresh model for `region`. `codebook` supplies the location code when conditioning is on.
    pub fn new(
        index: usize,
        region: Region,
        config: &RegionModelConfig,
        axis: &FrequencyAxis,
        codebook: &NoteCodeBook,
    ) -> Self {
        let seed = config.seed.wrapping_add(index as u64);

        let pitch_range = config
            .restrict_pitch_range
            .then(|| PitchRange::for_region(&region, axis));

        let location = config
            .location_conditioning
            .then(|| codebook.encode(axis.row_to_pitch(region.center_row())).clone());

        let pixels = match config.input_size {
            Some((w, h)) => w * h,
            None => region.area(),
        };
        let input_width = pixels + location.as_ref().map_or(0, Sdr::width);

        let encoder = ColumnEncoder::new(input_width, config.encoder.clone(), seed);
        let columns = encoder.output_width();
        let memory = config
            .memory
            .clone()
            .map(|m| TransitionMemory::new(columns, m));
        let label_count = pitch_range.map_or(FULL_LABEL_COUNT, |r| r.len() + 1);
        let classifier = SdrClassifier::new(columns, label_count, config.classifier.clone());

        Self {
            index,
            region,
            config: config.clone(),
            pitch_range,
            location,
            encoder,
            memory,
            classifier,
            rng: ChaCha8Rng::seed_from_u64(seed ^ 0xA5A5_A5A5),
            activation: Sdr::new(columns),
            restored: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn config(&self) -> &RegionModelConfig {
        &self.config
    }

    pub fn pitch_range(&self) -> Option<PitchRange> {
        self.pitch_range
    }

    /// Encoder columns active in the most recent step.
    pub fn activation(&self) -> &Sdr {
        &self.activation
    }

    /// Whether every weight file was found on the last load.
    pub fn is_restored(&self) -> bool {
        self.restored
    }

    /// Binary input code for this region of `image`.
    pub fn input(&self, image: &Image) -> Sdr {
        let crop = self.region.crop(image);
        let threshold = self.config.binary_thresh;

        let bits: Vec<bool> = match self.config.input_size {
            Some((w, h)) => {
                let (rows, cols) = crop.dim();
                (0..h)
                    .flat_map(|r| (0..w).map(move |c| (r * rows / h, c * cols / w)))
                    .map(|(r, c)| crop[[r, c]] >= threshold)
                    .collect()
            }
            None => crop.iter().map(|&px| px >= threshold).collect(),
        };

        let pixels = Sdr::from_dense(&bits);
        match &self.location {
            Some(code) => Sdr::concat([&pixels, code]),
            None => pixels,
        }
    }

    fn encode(&mut self, input: &Sdr, learn: bool) -> Sdr {
        let columns = self.encoder.encode(input, learn);
        let code = match &mut self.memory {
            Some(memory) => memory.step(&columns, learn),
            None => columns.clone(),
        };
        self.activation = columns;
        code
    }

    /// Classifier labels for ground truth, local to the pitch band when restricted.
    pub fn labels(&self, truth: &PitchSet) -> Vec<u32> {
        match &self.pitch_range {
            Some(range) => range.localize(truth),
            None => truth.labels(),
        }
    }

    /// One training step. The encoder always learns; the classifier learns only with ground truth.
    pub fn train(&mut self, image: &Image, truth: Option<&PitchSet>) {
        let mut input = self.input(image);
        input.add_noise(self.config.train_noise, &mut self.rng);
        let code = self.encode(&input, true);

        if let Some(truth) = truth {
            let labels = self.labels(truth);
            self.classifier.learn(&code, &labels);
        }
    }

    /// Pitches this region predicts above `pred_thresh`. Silence is never returned.
    pub fn infer(&mut self, image: &Image, pred_thresh: f32) -> PitchSet {
        let input = self.input(image);
        let code = self.encode(&input, false);
        let pdf = self.classifier.infer(&code);
        let labels = SdrClassifier::labels_above(&pdf, pred_thresh);

        match &self.pitch_range {
            Some(range) => range.globalize(labels),
            None => labels
                .into_iter()
                .filter(|&l| l != u32::from(SILENCE))
                .filter_map(|l| u8::try_from(l).ok())
                .collect(),
        }
    }

    pub fn reset_memory(&mut self) {
        if let Some(memory) = &mut self.memory {
            memory.reset();
        }
    }

    /// Square grayscale rendering of the active encoder columns.
    pub fn activation_image(&self) -> Image {
        let width = self.activation.width().max(1);
        let side = (width as f64).sqrt().ceil() as usize;
        let mut image = Image::zeros((side, side));
        for &column in self.activation.active() {
            let column = column as usize;
            image[[column / side, column % side]] = 255;
        }
        image
    }

    pub fn params(&self) -> RegionModelParams {
        RegionModelParams {
            version: CONFIG_VERSION,
            index: self.index,
            region: self.region,
            pitch_range: self.pitch_range,
            config: self.config.clone(),
        }
    }

    /// Write `params.json` and the weight blobs into `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        persist::write_json(&dir.join(PARAMS), &self.params())?;
        persist::write_blob(&dir.join(ENCODER_BLOB), &self.encoder)?;
        if let Some(memory) = &self.memory {
            persist::write_blob(&dir.join(MEMORY_BLOB), memory)?;
        }
        persist::write_blob(&dir.join(CLASSIFIER_BLOB), &self.classifier)?;
        Ok(())
    }

    /// Construct from `dir/params.json` and restore whatever weights are present.
    pub fn load(dir: &Path, axis: &FrequencyAxis, codebook: &NoteCodeBook) -> Result<Self> {
        let params = Self::read_params(dir)?;
        Self::from_params(dir, params, axis, codebook)
    }

    /// Like [`RegionModel::load`], but fails before allocating anything when
    /// the stored rectangle differs from `region`.
    pub fn load_region(
        dir: &Path,
        region: Region,
        axis: &FrequencyAxis,
        codebook: &NoteCodeBook,
    ) -> Result<Self> {
        let params = Self::read_params(dir)?;
        if params.region != region {
            return Err(ConfigError::InvalidParam {
                name: "regions",
                reason: format!(
                    "model_{} covers {:?}, expected {region:?}",
                    params.index, params.region
                ),
            }
            .into());
        }
        Self::from_params(dir, params, axis, codebook)
    }

    fn read_params(dir: &Path) -> Result<RegionModelParams> {
        let params: RegionModelParams = persist::read_params(&dir.join(PARAMS))?;
        if params.version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: params.version,
                expected: CONFIG_VERSION,
            }
            .into());
        }
        Ok(params)
    }

    fn from_params(
        dir: &Path,
        params: RegionModelParams,
        axis: &FrequencyAxis,
        codebook: &NoteCodeBook,
    ) -> Result<Self> {
        let mut model = Self::new(params.index, params.region, &params.config, axis, codebook);
        model.load_weights(dir)?;
        Ok(model)
    }

    /// Restore weight blobs from `dir`.
    ///
    /// Returns `false` when any expected file is missing; the missing parts
    /// keep their fresh initialization.
    pub fn load_weights(&mut self, dir: &Path) -> Result<bool> {
        let mut complete = true;

        match persist::read_blob::<ColumnEncoder>(&dir.join(ENCODER_BLOB))? {
            Some(encoder) if encoder.input_width() == self.encoder.input_width() => {
                self.encoder = encoder;
            }
            Some(_) => {
                tracing::warn!(index = self.index, "encoder input width changed, keeping fresh encoder");
                complete = false;
            }
            None => complete = false,
        }

        if self.memory.is_some() {
            match persist::read_blob::<TransitionMemory>(&dir.join(MEMORY_BLOB))? {
                Some(memory) => self.memory = Some(memory),
                None => complete = false,
            }
        }

        match persist::read_blob::<SdrClassifier>(&dir.join(CLASSIFIER_BLOB))? {
            Some(classifier) if classifier.label_count() == self.classifier.label_count() => {
                self.classifier = classifier;
            }
            Some(_) => {
                tracing::warn!(index = self.index, "classifier label space changed, keeping fresh classifier");
                complete = false;
            }
            None => complete = false,
        }

        self.restored = complete;
        Ok(complete)
    }
}
