//! word-crop: cut every detected word out of document photos, in reading order.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use word_crop_ort::models::YoloWordModel;
use word_crop_ort::overlay::OverlayStyle;
use word_crop_ort::{CropEncoding, DetectionPipeline, PipelineConfig, ReadingOrder};

#[derive(Parser)]
#[command(name = "word-crop", version, about = "Crop detected words from document images in reading order")]
struct Cli {
    /// ONNX word detection model
    #[arg(short, long)]
    model: PathBuf,

    /// Images, or directories of images, to process
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Minimum detector confidence
    #[arg(short, long, default_value_t = PipelineConfig::DEFAULT_CONFIDENCE)]
    confidence: f32,

    /// Folder crops are written to; one subfolder per image, named after its file, when several images are given
    #[arg(short, long, default_value = PipelineConfig::DEFAULT_OUTPUT_FOLDER)]
    output: PathBuf,

    /// Save each annotated overview here as `<image file name>.png`
    #[arg(long)]
    overview_dir: Option<PathBuf>,

    /// Also save the source and overview side by side
    #[arg(long, requires = "overview_dir")]
    draw_graphs: bool,

    /// Font used to print confidences on the overview instead of the bundled one
    #[arg(long)]
    font: Option<PathBuf>,

    /// Line bucket height as a fraction of the mean word height
    #[arg(long, default_value_t = ReadingOrder::DEFAULT_LINE_TOLERANCE_FACTOR)]
    line_tolerance: f32,

    /// Vertical distance of confidence labels above their box
    #[arg(long, default_value_t = OverlayStyle::DEFAULT_LABEL_OFFSET)]
    label_offset: f32,

    /// Write crops as JPEG (quality 100) instead of PNG
    #[arg(long)]
    jpeg: bool,

    /// Square input side the model was exported with
    #[arg(
        long,
        default_value_t = YoloWordModel::DEFAULT_INPUT_SIZE,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    input_size: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tif", "tiff", "webp"];

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let model = match YoloWordModel::load(&cli.model) {
        Ok(model) => model.with_input_size(cli.input_size),
        Err(err) => {
            tracing::error!("could not load detector from {}: {err}", cli.model.display());
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut overlay = OverlayStyle::default().with_label_offset(cli.label_offset);
    if let Some(font) = &cli.font {
        overlay = overlay
            .with_font_file(font)
            .with_context(|| format!("loading font {}", font.display()))?;
    }

    let config = PipelineConfig::default()
        .with_confidence(cli.confidence)
        .with_draw_graphs(cli.draw_graphs)
        .with_reading_order(ReadingOrder::new(cli.line_tolerance))
        .with_crop_encoding(if cli.jpeg {
            CropEncoding::JPEG_BEST
        } else {
            CropEncoding::Png
        });

    let mut pipeline = DetectionPipeline::new(config).with_overlay(overlay);

    if let Some(dir) = &cli.overview_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let mut images = vec![];
    for input in &cli.inputs {
        if input.is_dir() {
            images.extend(list_images(input)?);
        } else {
            images.push(input.clone());
        }
    }
    let per_image_folder = images.len() > 1;

    let mut failures = 0;
    for (image_path, key) in images.iter().zip(image_keys(&images)) {
        pipeline.config_mut().output_folder = if per_image_folder {
            cli.output.join(&key)
        } else {
            cli.output.clone()
        };

        let overview_dir = cli.overview_dir.as_deref();
        if let Err(err) = process(&pipeline, &model, image_path, overview_dir, &key) {
            tracing::error!("{}: {err:#}", image_path.display());
            failures += 1;
        }
    }

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn process(
    pipeline: &DetectionPipeline,
    model: &YoloWordModel,
    image_path: &Path,
    overview_dir: Option<&Path>,
    key: &OsString,
) -> Result<()> {
    let result = pipeline.run(model, image_path)?;

    let (Some(dir), Some(overview)) = (overview_dir, &result.overview) else {
        return Ok(());
    };

    let path = dir.join(with_suffix(key, ".png"));
    overview
        .save(&path)
        .with_context(|| format!("saving overview {}", path.display()))?;

    if let Some(comparison) = &result.comparison {
        let path = dir.join(with_suffix(key, ".comparison.png"));
        comparison
            .save(&path)
            .with_context(|| format!("saving comparison {}", path.display()))?;
    }

    Ok(())
}

/// Names each image by its file name; repeats (same name, different
/// directories) get a `~N` suffix so no two images share output files.
fn image_keys(images: &[PathBuf]) -> Vec<OsString> {
    let mut seen = HashSet::new();
    images
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(OsString::from)
                .unwrap_or_else(|| OsString::from("image"));
            let mut key = name.clone();
            let mut n = 1;
            while !seen.insert(key.clone()) {
                key = with_suffix(&name, &format!("~{n}"));
                n += 1;
            }
            key
        })
        .collect()
}

fn with_suffix(name: &OsString, suffix: &str) -> OsString {
    let mut name = name.clone();
    name.push(suffix);
    name
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .collect();
    images.sort();
    Ok(images)
}
