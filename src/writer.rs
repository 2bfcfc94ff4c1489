use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageResult};

use crate::{Error, Result};

/// Encoding used for every crop written by an [`OutputWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CropEncoding {
    /// Lossless; a crop read back is pixel-identical to the one written.
    #[default]
    Png,
    Jpeg { quality: u8 },
}

impl CropEncoding {
    /// JPEG at the highest quality setting.
    pub const JPEG_BEST: Self = Self::Jpeg { quality: 100 };

    pub fn extension(&self) -> &'static str {
        match self {
            CropEncoding::Png => "png",
            CropEncoding::Jpeg { .. } => "jpg",
        }
    }

    fn encode(&self, img: &DynamicImage, path: &Path) -> ImageResult<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        match self {
            CropEncoding::Png => img.write_with_encoder(PngEncoder::new(&mut writer))?,
            CropEncoding::Jpeg { quality } => {
                img.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, *quality))?
            }
        }
        std::io::Write::flush(&mut writer)?;
        Ok(())
    }
}

/// Persists crops as `{folder}/{index}.{ext}`, `index` being the reading-order position.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    folder: PathBuf,
    encoding: CropEncoding,
}

impl OutputWriter {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            encoding: CropEncoding::default(),
        }
    }

    pub fn with_encoding(mut self, encoding: CropEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn crop_path(&self, index: usize) -> PathBuf {
        self.folder.join(format!("{index}.{}", self.encoding.extension()))
    }

    /// Writes every crop, overwriting files from earlier runs.
    ///
    /// A crop that fails to write does not stop the remaining ones; the first
    /// failure is returned once all crops were attempted.
    pub fn write_all(&self, crops: &[DynamicImage]) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.folder)?;

        let mut written = Vec::with_capacity(crops.len());
        let mut first_error = None;

        for (index, crop) in crops.iter().enumerate() {
            let path = self.crop_path(index);
            match self.encoding.encode(crop, &path) {
                Ok(()) => written.push(path),
                Err(source) => {
                    tracing::error!("failed to write crop #{index} to {}: {source}", path.display());
                    first_error.get_or_insert(Error::CropWrite {
                        index,
                        path,
                        source,
                    });
                }
            }
        }

        tracing::debug!("wrote {} crops to {}", written.len(), self.folder.display());

        match first_error {
            Some(err) => Err(err),
            None => Ok(written),
        }
    }
}
