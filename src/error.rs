use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("ort (onnxruntime) error: {0}")]
    Ort(#[from] ort::Error),
    #[error("hf-hub: {0}")]
    HuggingFace(#[from] hf_hub::api::sync::ApiError),
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid font file")]
    Font(#[from] ab_glyph::InvalidFont),
    #[error("could not load detector from {location}: {source}")]
    DetectorLoad {
        location: String,
        #[source]
        source: Box<Error>,
    },
    #[error("could not load image {}: {source}", path.display())]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("could not write crop #{index} to {}: {source}", path.display())]
    CropWrite {
        index: usize,
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("unexpected model output shape {0:?}")]
    OutputShape(Vec<usize>),
}

impl Error {
    /// Failures the pipeline absorbs into an empty result instead of returning.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::DetectorLoad { .. } | Error::ImageLoad { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
