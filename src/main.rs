//! photowarp - batch perspective correction and cropping
//!
//! Loads every input image, optionally deforms it by four normalised corner
//! positions and rotates/scales it, then exports the centered selection frame
//! at the target resolution as `<name>_edited.png`.

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use photowarp::config::Config;
use photowarp::gallery::{ExportReport, Gallery, LoadReport};
use photowarp::geometry::{ImageSpace, Point};
use photowarp::io::is_supported;
use photowarp::Resolution;

/// A corner position as fractions of the image size, `x,y`
#[derive(Debug, Clone, Copy, PartialEq)]
struct NormalizedCorner {
    x: f64,
    y: f64,
}

impl FromStr for NormalizedCorner {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| format!("expected x,y, got {:?}", s))?;
        let x: f64 = x.trim().parse().map_err(|e| format!("bad x {:?}: {}", x, e))?;
        let y: f64 = y.trim().parse().map_err(|e| format!("bad y {:?}: {}", y, e))?;
        if !x.is_finite() || !y.is_finite() {
            return Err(format!("corner must be finite, got {}", s));
        }
        Ok(Self { x, y })
    }
}

impl NormalizedCorner {
    /// (0,0) is the top-left pixel center, (1,1) the bottom-right one
    fn to_pixels(self, width: u32, height: u32) -> Point<ImageSpace> {
        Point::new(
            self.x * (width as f64 - 1.0),
            self.y * (height as f64 - 1.0),
        )
    }
}

/// photowarp - perspective correction and cropping for batches of images
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Images to process (directories are scanned for supported files)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Where the edited PNGs are written
    #[arg(short, long, default_value = "edited")]
    output_dir: PathBuf,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Export resolution, e.g. 1024x768 (overrides the config file)
    #[arg(short, long)]
    target: Option<Resolution>,

    /// Move the image corners to these positions: four x,y pairs in
    /// TL TR BR BL order, as fractions of the image size
    #[arg(long, num_args = 4, value_names = ["TL", "TR", "BR", "BL"])]
    corners: Option<Vec<NormalizedCorner>>,

    /// Rotate by this many degrees (clockwise)
    #[arg(long, allow_hyphen_values = true)]
    rotate: Option<f64>,

    /// Uniform scale factor
    #[arg(long)]
    scale: Option<f64>,

    /// Print a JSON summary of the run to stdout
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    target: String,
    load: LoadReport,
    export: ExportReport,
    skipped_edits: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout is reserved for --json
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!("photowarp v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_or_create(&args.config)?;
    if let Some(target) = args.target {
        config.export.target_width = target.width;
        config.export.target_height = target.height;
    }
    let target = config.export.target();
    info!("Target resolution: {}", target);

    if let Some(scale) = args.scale {
        if !(scale.is_finite() && scale > 0.0) {
            bail!("--scale must be a positive number, got {}", scale);
        }
    }

    let inputs = collect_inputs(&args.inputs)?;
    let mut gallery = Gallery::new(config.slot_settings(), config.grid_layout());
    let load = gallery.load(&inputs);
    if gallery.is_empty() {
        bail!("None of the {} input files could be loaded", inputs.len());
    }

    let skipped_edits = apply_edits(&mut gallery, &args);

    let export = gallery
        .export_all(&args.output_dir, &config.export.suffix)
        .with_context(|| format!("Failed to export to {:?}", args.output_dir))?;

    info!(
        "Done: {} saved, {} failed to save, {} failed to load",
        export.saved.len(),
        export.failed.len(),
        load.failed.len()
    );

    if args.json {
        let summary = RunSummary {
            target: target.to_string(),
            load,
            export,
            skipped_edits,
        };
        let json = serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?;
        println!("{}", json);
    }

    Ok(())
}

/// Expand directories into the supported image files they contain, sorted by name
fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("Failed to read directory {:?}", input))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_supported(p))
                .collect();
            found.sort();
            info!("Found {} images in {:?}", found.len(), input);
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

/// Apply the command-line edits to every slot, returning the images the
/// deformation could not be applied to
fn apply_edits(gallery: &mut Gallery, args: &Args) -> Vec<PathBuf> {
    let mut skipped = Vec::new();
    for index in 0..gallery.len() {
        let Some(slot) = gallery.slot_mut(index) else {
            continue;
        };
        let name = slot
            .source()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(format!("image_{}", index + 1)));

        if let Some(corners) = &args.corners {
            let (w, h) = slot.original().dimensions();
            let quad = [0, 1, 2, 3].map(|i| corners[i].to_pixels(w, h));
            if let Err(e) = slot.apply_quad(quad) {
                warn!("{:?}: {}, deformation skipped", name, e);
                skipped.push(name.clone());
            }
        }

        if args.rotate.is_some() || args.scale.is_some() {
            let angle = args.rotate.unwrap_or(0.0);
            let scale = args.scale.unwrap_or(1.0);
            slot.edit_affine(|affine| {
                affine.angle += angle;
                affine.scale_x *= scale;
                affine.scale_y *= scale;
            });
        }
    }
    skipped
}
