//! Region layouts and the region pitch-range policy.
//!
//! The frame image carries frequency on its vertical axis on a logarithmic
//! scale: row 0 is the highest frequency, the last row the lowest. A region's
//! vertical extent therefore covers a contiguous band of pitches, which
//! [`PitchRange`] uses to give each region a small, dense local label space.

use crate::types::{MAX_PITCH, PitchSet, Region, SILENCE};
use serde::{Deserialize, Serialize};

/// Lowest frequency on the image axis (A0).
pub const MIN_HZ: f32 = 27.5;

/// Highest frequency on the image axis.
pub const MAX_HZ: f32 = 8186.0;

/// Frequency in Hz of a (possibly fractional) MIDI pitch.
pub fn pitch_to_hz(pitch: f32) -> f32 {
    440.0 * 2f32.powf((pitch - 69.0) / 12.0)
}

/// Fractional MIDI pitch of a frequency in Hz.
pub fn hz_to_pitch(hz: f32) -> f32 {
    69.0 + 12.0 * (hz / 440.0).log2()
}

/// Logarithmic frequency axis over image rows.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrequencyAxis {
    pub min_hz: f32,
    pub max_hz: f32,
    pub rows: usize,
}

impl FrequencyAxis {
    /// Hearing-range axis over `rows` image rows.
    pub const fn hearing(rows: usize) -> Self {
        Self {
            min_hz: MIN_HZ,
            max_hz: MAX_HZ,
            rows,
        }
    }

    /// Frequency shown at `row`. Row 0 maps to `max_hz`.
    pub fn row_to_hz(&self, row: f32) -> f32 {
        let span = (self.rows.max(2) - 1) as f32;
        let t = 1.0 - (row / span).clamp(0.0, 1.0);
        self.min_hz * (self.max_hz / self.min_hz).powf(t)
    }

    /// Fractional row showing `hz`.
    pub fn hz_to_row(&self, hz: f32) -> f32 {
        let span = (self.rows.max(2) - 1) as f32;
        let t = (hz / self.min_hz).ln() / (self.max_hz / self.min_hz).ln();
        (1.0 - t) * span
    }

    /// Nearest pitch shown at `row`, clamped to `1..=127`.
    pub fn row_to_pitch(&self, row: f32) -> u8 {
        hz_to_pitch(self.row_to_hz(row)).round().clamp(1.0, f32::from(MAX_PITCH)) as u8
    }
}

/// Inclusive pitch band `[low, high]` covered by a region.
///
/// Local labels are `1..=len()`, with 0 kept for silence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitchRange {
    pub low: u8,
    pub high: u8,
}

impl PitchRange {
    /// Band covered by the rows of `region`.
    pub fn for_region(region: &Region, axis: &FrequencyAxis) -> Self {
        let top = axis.row_to_pitch(region.y as f32);
        let bottom = axis.row_to_pitch(region.bottom().saturating_sub(1) as f32);
        Self {
            low: top.min(bottom),
            high: top.max(bottom),
        }
    }

    pub fn contains(&self, pitch: u8) -> bool {
        (self.low..=self.high).contains(&pitch)
    }

    /// Number of pitches in the band.
    pub fn len(&self) -> usize {
        usize::from(self.high - self.low) + 1
    }

    /// Local label of a global pitch, `None` outside the band.
    pub fn to_local(&self, pitch: u8) -> Option<u32> {
        self.contains(pitch)
            .then(|| u32::from(pitch - self.low) + 1)
    }

    /// Global pitch of a local label, `None` for silence or labels past the band.
    pub fn to_global(&self, local: u32) -> Option<u8> {
        (1..=self.len() as u32)
            .contains(&local)
            .then(|| (local - 1) as u8 + self.low)
    }

    /// Classifier labels for a ground-truth set: in-band pitches, or silence.
    pub fn localize(&self, pitches: &PitchSet) -> Vec<u32> {
        let labels: Vec<u32> = pitches.iter().filter_map(|p| self.to_local(p)).collect();
        if labels.is_empty() {
            vec![u32::from(SILENCE)]
        } else {
            labels
        }
    }

    /// Global pitches for predicted local labels. Silence is dropped.
    pub fn globalize(&self, labels: impl IntoIterator<Item = u32>) -> PitchSet {
        labels.into_iter().filter_map(|l| self.to_global(l)).collect()
    }
}

/// Grid of `count` tiles close to square, each grown by `overlap` pixels and clamped.
pub fn grid(width: usize, height: usize, count: usize, overlap: usize) -> Vec<Region> {
    if count == 0 {
        return Vec::new();
    }

    let rows = (count as f64).sqrt() as usize;
    let cols = count.div_ceil(rows);
    let (tile_w, tile_h) = (width / cols, height / rows);

    (0..rows)
        .flat_map(|r| (0..cols).map(move |c| (r, c)))
        .take(count)
        .map(|(r, c)| {
            let x0 = (c * tile_w).saturating_sub(overlap);
            let y0 = (r * tile_h).saturating_sub(overlap);
            let x1 = ((c + 1) * tile_w + overlap).min(width);
            let y1 = ((r + 1) * tile_h + overlap).min(height);
            Region::new(x0, y0, x1 - x0, y1 - y0)
        })
        .collect()
}

/// Central square fovea followed by up to eight surrounding petals.
pub fn foveated(
    width: usize,
    height: usize,
    petals: usize,
    fovea: usize,
    overlap: usize,
) -> Vec<Region> {
    const OFFSETS: [(isize, isize); 8] = [
        (0, -1),
        (0, 1),
        (-1, 0),
        (1, 0),
        (-1, -1),
        (1, -1),
        (-1, 1),
        (1, 1),
    ];

    let (cx, cy) = ((width / 2) as isize, (height / 2) as isize);
    let half = (fovea / 2) as isize;

    let mut regions = vec![Region::new(
        (cx - half).max(0) as usize,
        (cy - half).max(0) as usize,
        fovea.min(width),
        fovea.min(height),
    )];

    for &(dx, dy) in OFFSETS.iter().take(petals) {
        let x = (cx + dx * fovea as isize - half - overlap as isize).max(0) as usize;
        let y = (cy + dy * fovea as isize - half - overlap as isize).max(0) as usize;
        if x >= width || y >= height {
            continue;
        }
        let w = (fovea + 2 * overlap).min(width - x);
        let h = (fovea + 2 * overlap).min(height - y);
        regions.push(Region::new(x, y, w, h));
    }

    regions
}

/// `count` horizontal bands spaced logarithmically down the image, `band_width` pixels wide.
pub fn log_bands(
    width: usize,
    height: usize,
    count: usize,
    band_width: usize,
    overlap: usize,
) -> Vec<Region> {
    let min = 1.0f32;
    let max = (height as f32 + 1.0).log2();
    let step = (max - min) / count.max(1) as f32;

    (0..count)
        .filter_map(|i| {
            let f0 = 2f32.powf(min + i as f32 * step) - 1.0;
            let f1 = 2f32.powf(min + (i + 1) as f32 * step) - 1.0;
            let y0 = (f0 as usize).saturating_sub(overlap);
            let y1 = (f1 as usize + overlap).min(height);
            (y1 > y0).then(|| Region::new(0, y0, band_width.min(width), y1 - y0))
        })
        .collect()
}

/// Hand-placed five-region layout for an 800x600 frame.
pub fn basic_regions() -> Vec<Region> {
    vec![
        Region::new(96, 41, 147, 526),
        Region::new(314, 234, 375, 174),
        Region::new(512, 249, 200, 253),
        Region::new(503, 69, 100, 412),
        Region::new(114, 140, 341, 138),
    ]
}

/// Hand-placed four-region layout for an 800x600 frame.
pub fn more_regions() -> Vec<Region> {
    vec![
        Region::new(410, 142, 318, 159),
        Region::new(300, 31, 233, 492),
        Region::new(132, 298, 563, 253),
        Region::new(136, 47, 526, 203),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_maps_rows_to_frequencies() {
        let axis = FrequencyAxis::hearing(600);
        assert!((axis.row_to_hz(0.0) - MAX_HZ).abs() < 0.5);
        assert!((axis.row_to_hz(599.0) - MIN_HZ).abs() < 0.01);
        let row = axis.hz_to_row(440.0);
        assert!((axis.row_to_hz(row) - 440.0).abs() < 0.01);
        assert_eq!(axis.row_to_pitch(599.0), 21);
    }

    #[test]
    fn pitch_conversions() {
        assert!((pitch_to_hz(69.0) - 440.0).abs() < 1e-3);
        assert!((hz_to_pitch(261.63) - 60.0).abs() < 0.01);
    }

    #[test]
    fn range_follows_region_rows() {
        let axis = FrequencyAxis::hearing(600);
        let low_band = PitchRange::for_region(&Region::new(0, 400, 100, 200), &axis);
        let high_band = PitchRange::for_region(&Region::new(0, 0, 100, 200), &axis);
        assert!(low_band.low < high_band.low);
        assert!(low_band.high <= high_band.low + 1);
    }

    #[test]
    fn local_labels_round_trip() {
        let range = PitchRange { low: 48, high: 72 };
        for local in 1..=range.len() as u32 {
            let global = range.to_global(local).unwrap();
            assert_eq!(range.to_local(global), Some(local));
        }
        assert_eq!(range.to_global(0), None);
        assert_eq!(range.to_global(range.len() as u32 + 1), None);
    }

    #[test]
    fn out_of_band_pitches_are_dropped() {
        let range = PitchRange { low: 48, high: 72 };
        assert_eq!(range.to_local(47), None);
        assert_eq!(range.to_local(73), None);

        let truth: PitchSet = [30, 60, 100].into_iter().collect();
        assert_eq!(range.localize(&truth), vec![13]);

        let outside: PitchSet = [30].into_iter().collect();
        assert_eq!(range.localize(&outside), vec![0]);

        let back = range.globalize([0, 13, 99]);
        assert_eq!(back, [60].into_iter().collect());
    }

    #[test]
    fn grid_covers_frame() {
        let regions = grid(800, 600, 4, 10);
        assert_eq!(regions.len(), 4);
        assert!(regions.iter().all(|r| r.fits(800, 600)));
        assert_eq!(regions[0], Region::new(0, 0, 410, 310));
    }

    #[test]
    fn foveated_layout_stays_in_bounds() {
        let regions = foveated(800, 600, 8, 200, 10);
        assert_eq!(regions[0], Region::new(300, 200, 200, 200));
        assert!(regions.iter().all(|r| r.fits(800, 600)));
        assert!(regions.len() <= 9);
    }

    #[test]
    fn hand_placed_layouts_fit() {
        assert!(basic_regions().iter().all(|r| r.fits(800, 600)));
        assert!(more_regions().iter().all(|r| r.fits(800, 600)));
        assert!(log_bands(800, 600, 6, 32, 4).iter().all(|r| r.fits(800, 600)));
    }
}
