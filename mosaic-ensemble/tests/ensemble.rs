//! End-to-end tests: training on synthetic frames and model directory round trips.

use mosaic_ensemble::accuracy::AccuracyStats;
use mosaic_ensemble::config::{EnsembleConfig, RegionModelConfig, VotingConfig};
use mosaic_ensemble::ensemble::Ensemble;
use mosaic_ensemble::error::{ConfigError, Error};
use mosaic_ensemble::persist::{CLASSIFIER_BLOB, MAIN_PARAMS, NOTE_MAP, PARAMS, VOTING_DIR};
use mosaic_ensemble::primitives::{ClassifierConfig, EncoderConfig, MemoryConfig};
use mosaic_ensemble::region::{FrequencyAxis, grid, pitch_to_hz};
use mosaic_ensemble::types::{Frame, Image, PitchSet};

const WIDTH: usize = 32;
const HEIGHT: usize = 48;
const FRAMES: usize = 86;
const HOP_SECS: f64 = 1024.0 / 44100.0;
const MIDDLE_C: u8 = 60;

fn is_sounding(index: usize) -> bool {
    (10..=40).contains(&index)
}

/// Two seconds of frames: middle C drawn as a bright line on frames 10..=40, silence elsewhere.
fn synthetic_frames() -> Vec<Frame> {
    let axis = FrequencyAxis::hearing(HEIGHT);
    let row = axis.hz_to_row(pitch_to_hz(f32::from(MIDDLE_C))).round() as usize;

    (0..FRAMES)
        .map(|i| {
            let mut image = Image::zeros((HEIGHT, WIDTH));
            let mut truth = PitchSet::new();
            if is_sounding(i) {
                truth.insert(MIDDLE_C);
                for r in row.saturating_sub(1)..=(row + 1).min(HEIGHT - 1) {
                    image.row_mut(r).fill(255);
                }
            }
            Frame::new(image, i as f64 * HOP_SECS).with_truth(truth)
        })
        .collect()
}

fn config() -> EnsembleConfig {
    EnsembleConfig {
        frame_width: WIDTH,
        frame_height: HEIGHT,
        regions: grid(WIDTH, HEIGHT, 3, 2),
        model: RegionModelConfig {
            train_noise: 0.05,
            encoder: EncoderConfig {
                columns: 256,
                sparsity: 0.04,
                potential_pct: 0.5,
                ..EncoderConfig::default()
            },
            classifier: ClassifierConfig { alpha: 0.1 },
            ..RegionModelConfig::default()
        },
        vote_repeats: 1,
        max_in_flight: 2,
        voting: VotingConfig {
            memory: None,
            classifier: ClassifierConfig { alpha: 0.1 },
            ..VotingConfig::default()
        },
        ..EnsembleConfig::default()
    }
}

fn train(ensemble: &mut Ensemble, frames: &[Frame], epochs: usize) {
    for _ in 0..epochs {
        ensemble.reset_memories();
        for frame in frames {
            ensemble.train(frame).unwrap();
        }
    }
}

fn assert_learned_middle_c(ensemble: &mut Ensemble, frames: &[Frame]) {
    let mut stats = AccuracyStats::default();
    ensemble.reset_memories();

    for (i, frame) in frames.iter().enumerate() {
        let predicted = ensemble.infer(frame).unwrap();
        if is_sounding(i) {
            stats.record(frame.truth.as_ref().unwrap(), &predicted);
        } else {
            assert!(predicted.is_empty(), "frame {i} predicted {predicted}");
        }
    }

    assert!(stats.recall() >= 0.9, "recall too low: {stats}");
}

#[test]
fn learns_middle_c_from_synthetic_frames() {
    let frames = synthetic_frames();
    let mut ensemble = Ensemble::setup(config()).unwrap();
    assert_eq!(ensemble.region_count(), 3);

    train(&mut ensemble, &frames, 5);
    assert_learned_middle_c(&mut ensemble, &frames);
}

#[test]
fn learns_middle_c_with_restricted_pitch_ranges() {
    let frames = synthetic_frames();
    let mut config = config();
    config.model.restrict_pitch_range = true;
    config.model.memory = Some(MemoryConfig::default());

    let mut ensemble = Ensemble::setup(config).unwrap();
    assert!(ensemble.models().iter().all(|m| m.pitch_range().is_some_and(|r| r.contains(MIDDLE_C))));

    train(&mut ensemble, &frames, 5);
    assert_learned_middle_c(&mut ensemble, &frames);
}

#[test]
fn frames_without_truth_do_not_teach_pitches() {
    let frames: Vec<Frame> = synthetic_frames()
        .into_iter()
        .map(|mut f| {
            f.truth = None;
            f
        })
        .collect();
    let mut ensemble = Ensemble::setup(config()).unwrap();
    train(&mut ensemble, &frames, 2);

    // Untrained classifiers spread confidence over all 128 labels, below the threshold.
    assert!(ensemble.infer(&frames[20]).unwrap().is_empty());
}

#[test]
fn save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let frames = synthetic_frames();

    let mut config = config();
    config.use_voting = true;
    let mut ensemble = Ensemble::setup(config).unwrap();
    train(&mut ensemble, &frames, 3);
    for frame in &frames {
        assert!(ensemble.train_voting(frame).unwrap());
    }
    ensemble.save(dir.path()).unwrap();

    assert!(dir.path().join(MAIN_PARAMS).is_file());
    assert!(dir.path().join(NOTE_MAP).is_file());
    assert!(dir.path().join("model_2").join(PARAMS).is_file());
    assert!(dir.path().join(VOTING_DIR).join(PARAMS).is_file());

    let mut loaded = Ensemble::load(dir.path()).unwrap();
    assert!(loaded.is_fully_restored());
    assert_eq!(loaded.config(), ensemble.config());

    for frame in [&frames[5], &frames[25]] {
        let expected = ensemble.infer_detailed(frame).unwrap();
        let actual = loaded.infer_detailed(frame).unwrap();
        assert_eq!(actual, expected);
    }

    assert!(loaded.infer_voting(&frames[25]).unwrap().is_some());
}

#[test]
fn missing_weights_load_with_fresh_state() {
    let dir = tempfile::tempdir().unwrap();
    let ensemble = Ensemble::setup(config()).unwrap();
    ensemble.save(dir.path()).unwrap();

    std::fs::remove_file(dir.path().join("model_1").join(CLASSIFIER_BLOB)).unwrap();

    let loaded = Ensemble::load(dir.path()).unwrap();
    assert!(!loaded.is_fully_restored());
    assert!(loaded.models()[0].is_restored());
    assert!(!loaded.models()[1].is_restored());
}

#[test]
fn missing_main_params_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Ensemble::load(dir.path()),
        Err(Error::Config(ConfigError::MissingParams(_)))
    ));
}

#[test]
fn missing_region_dir_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    let ensemble = Ensemble::setup(config()).unwrap();
    ensemble.save(dir.path()).unwrap();
    std::fs::remove_dir_all(dir.path().join("model_2")).unwrap();

    assert!(matches!(
        Ensemble::load(dir.path()),
        Err(Error::Config(ConfigError::RegionCountMismatch { expected: 3, found: 2 }))
    ));
}

#[test]
fn saving_a_smaller_layout_replaces_the_larger_one() {
    let dir = tempfile::tempdir().unwrap();

    let mut wide = config();
    wide.regions = grid(WIDTH, HEIGHT, 4, 1);
    Ensemble::setup(wide).unwrap().save(dir.path()).unwrap();
    assert!(dir.path().join("model_3").is_dir());

    let mut narrow = config();
    narrow.regions = grid(WIDTH, HEIGHT, 2, 1);
    Ensemble::setup(narrow.clone()).unwrap().save(dir.path()).unwrap();
    assert!(!dir.path().join("model_2").exists());
    assert!(!dir.path().join("model_3").exists());

    let loaded = Ensemble::load(dir.path()).unwrap();
    assert_eq!(loaded.region_count(), 2);
    assert_eq!(loaded.config().regions, narrow.regions);
}

#[test]
fn overflowing_region_in_main_params_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    Ensemble::setup(config()).unwrap().save(dir.path()).unwrap();

    let path = dir.path().join(MAIN_PARAMS);
    let mut params: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    params["regions"][0]["x"] = serde_json::json!(u64::MAX);
    std::fs::write(&path, params.to_string()).unwrap();

    assert!(matches!(
        Ensemble::load(dir.path()),
        Err(Error::Config(ConfigError::RegionOutOfBounds { index: 0, .. }))
    ));
}

#[test]
fn region_model_with_a_different_rectangle_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    Ensemble::setup(config()).unwrap().save(dir.path()).unwrap();

    let path = dir.path().join("model_1").join(PARAMS);
    let mut params: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    params["region"]["width"] = serde_json::json!(u64::MAX);
    std::fs::write(&path, params.to_string()).unwrap();

    assert!(matches!(
        Ensemble::load(dir.path()),
        Err(Error::Config(ConfigError::InvalidParam { name: "regions", .. }))
    ));
}
