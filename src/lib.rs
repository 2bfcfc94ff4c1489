//! # Overview
//!
//! Extracts word crops from document photos in reading order.
//! A YOLO word detector exported to ONNX runs through onnxruntime (bindings via [ort](https://github.com/pykeio/ort)).
//! Detected boxes are grouped into text lines and read left to right, and each
//! word is cut out of the page and written to disk along with an annotated overview.
//!
//! ```no_run
//! use word_crop_ort::{models::YoloWordModel, DetectionPipeline, PipelineConfig};
//!
//! # fn main() -> word_crop_ort::Result<()> {
//! let model = YoloWordModel::load("weights/best.onnx")?;
//! let pipeline = DetectionPipeline::new(PipelineConfig::default());
//! let result = pipeline.run(&model, "page.jpg")?;
//! println!("{} words", result.crops.len());
//! # Ok(())
//! # }
//! ```

mod detector;
mod error;
pub mod loader;
pub mod overlay;
pub mod pipeline;
pub mod reading_order;
mod utils;
mod word_box;
pub mod writer;

pub use error::{Error, Result};

// re-exports
pub use ort;
pub use image;
pub use geo_types;

pub mod models;

pub use detector::Detector;
pub use pipeline::{detect_words, DetectionPipeline, DetectionResult, PipelineConfig};
pub use reading_order::{sort_boxes, LineGroup, LineKey, ReadingOrder};
pub use word_box::WordBox;
pub use writer::{CropEncoding, OutputWriter};
