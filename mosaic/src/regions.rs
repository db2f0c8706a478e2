//! Regions subcommand - print a region layout as JSON.

use eyre::{Result, bail};
use mosaic_ensemble::config::{DEFAULT_FRAME_HEIGHT, DEFAULT_FRAME_WIDTH};
use mosaic_ensemble::presets;
use mosaic_ensemble::region::{FrequencyAxis, PitchRange, grid};
use mosaic_ensemble::types::Region;
use serde_json::{Value, json};

/// CLI arguments for layout printing.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Print the layout of this preset
    #[arg(short, long, conflicts_with = "grid")]
    pub preset: Option<String>,

    /// Overlapping grid with this many regions
    #[arg(short, long)]
    pub grid: Option<usize>,

    /// Pixels each grid tile extends into its neighbours
    #[arg(long, default_value_t = 16)]
    pub overlap: usize,

    /// Frame width for grid layouts
    #[arg(long, default_value_t = DEFAULT_FRAME_WIDTH)]
    pub width: usize,

    /// Frame height for grid layouts
    #[arg(long, default_value_t = DEFAULT_FRAME_HEIGHT)]
    pub height: usize,
}

/// Resolved layout.
#[derive(Debug)]
pub struct Config {
    pub regions: Vec<Region>,
    pub height: usize,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        match (args.preset, args.grid) {
            (Some(name), _) => {
                let config = presets::preset(&name)?;
                Ok(Self {
                    height: config.frame_height,
                    regions: config.regions,
                })
            }
            (None, Some(count)) => Ok(Self {
                regions: grid(args.width, args.height, count, args.overlap),
                height: args.height,
            }),
            (None, None) => bail!("either --preset or --grid is required"),
        }
    }
}

/// Each region with the pitch band its rows cover.
pub fn describe(config: &Config) -> Value {
    let axis = FrequencyAxis::hearing(config.height);
    let regions: Vec<_> = config
        .regions
        .iter()
        .map(|region| {
            let range = PitchRange::for_region(region, &axis);
            json!({ "region": region, "pitches": range })
        })
        .collect();
    Value::Array(regions)
}

pub fn execute(config: Config) -> Result<()> {
    tracing::debug!(regions = config.regions.len(), "describing layout");
    println!("{}", serde_json::to_string_pretty(&describe(&config))?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_layout_lists_pitch_bands() {
        let config = Config {
            regions: grid(800, 600, 2, 0),
            height: 600,
        };
        let described = describe(&config);
        let entries = described.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["region"]["width"], 400);

        let low = entries[0]["pitches"]["low"].as_u64().unwrap();
        let high = entries[0]["pitches"]["high"].as_u64().unwrap();
        assert!(low <= high);
    }

    #[test]
    fn requires_a_layout() {
        let args = Args {
            preset: None,
            grid: None,
            overlap: 16,
            width: 800,
            height: 600,
        };
        assert!(Config::try_from(args).is_err());
    }
}
