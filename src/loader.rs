//! Decoding source images into the canonical form the pipeline works on:
//! upright (EXIF orientation applied) 8-bit RGB.

use std::io::{BufRead, Cursor, Seek};
use std::path::Path;

use image::{DynamicImage, ImageDecoder, ImageReader, ImageResult};

/// Loads the image at `path`, applies its EXIF orientation and converts it to RGB.
pub fn load_image(path: impl AsRef<Path>) -> ImageResult<DynamicImage> {
    decode(ImageReader::open(path)?)
}

/// Same as [`load_image`] for an encoded image held in memory.
pub fn load_image_from_memory(bytes: &[u8]) -> ImageResult<DynamicImage> {
    decode(ImageReader::new(Cursor::new(bytes)))
}

fn decode<R: BufRead + Seek>(reader: ImageReader<R>) -> ImageResult<DynamicImage> {
    let mut decoder = reader.with_guessed_format()?.into_decoder()?;
    let orientation = decoder.orientation()?;

    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);

    Ok(DynamicImage::ImageRgb8(img.into_rgb8()))
}
