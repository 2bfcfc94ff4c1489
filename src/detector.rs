use crate::{Result, WordBox};

/// Anything that can locate words on an image.
///
/// Implementations must apply `confidence_threshold` themselves: boxes scoring
/// at or below it are never returned. Any `Fn(&DynamicImage, f32) -> Result<Vec<WordBox>>`
/// is a detector, which lets the pipeline run on synthetic boxes.
pub trait Detector {
    fn detect(
        &self,
        image: &image::DynamicImage,
        confidence_threshold: f32,
    ) -> Result<Vec<WordBox>>;
}

impl<F> Detector for F
where
    F: Fn(&image::DynamicImage, f32) -> Result<Vec<WordBox>>,
{
    fn detect(
        &self,
        image: &image::DynamicImage,
        confidence_threshold: f32,
    ) -> Result<Vec<WordBox>> {
        self(image, confidence_threshold)
    }
}
