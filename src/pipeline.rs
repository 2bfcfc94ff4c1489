//! End-to-end word extraction: source image in, reading-ordered crops out.

use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbImage};

use crate::loader::load_image;
use crate::models::YoloWordModel;
use crate::overlay::{side_by_side, OverlayStyle};
use crate::reading_order::ReadingOrder;
use crate::writer::{CropEncoding, OutputWriter};
use crate::{Detector, Error, Result, WordBox};

/// Caller-supplied settings for a [`DetectionPipeline`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineConfig {
    /// Boxes scoring at or below this are ignored.
    pub confidence: f32,
    /// Where crops are written.
    pub output_folder: PathBuf,
    /// Also render the source and the overview side by side.
    pub draw_graphs: bool,
    pub reading_order: ReadingOrder,
    pub crop_encoding: CropEncoding,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence: Self::DEFAULT_CONFIDENCE,
            output_folder: PathBuf::from(Self::DEFAULT_OUTPUT_FOLDER),
            draw_graphs: false,
            reading_order: ReadingOrder::default(),
            crop_encoding: CropEncoding::default(),
        }
    }
}

impl PipelineConfig {
    pub const DEFAULT_CONFIDENCE: f32 = 0.5;
    pub const DEFAULT_OUTPUT_FOLDER: &'static str = "output";

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_output_folder(mut self, output_folder: impl Into<PathBuf>) -> Self {
        self.output_folder = output_folder.into();
        self
    }

    pub fn with_draw_graphs(mut self, draw_graphs: bool) -> Self {
        self.draw_graphs = draw_graphs;
        self
    }

    pub fn with_reading_order(mut self, reading_order: ReadingOrder) -> Self {
        self.reading_order = reading_order;
        self
    }

    pub fn with_crop_encoding(mut self, crop_encoding: CropEncoding) -> Self {
        self.crop_encoding = crop_encoding;
        self
    }
}

/// What one pipeline run produced.
///
/// `boxes[i]` is the region `crops[i]` was cut from, and `crops[i]` was written
/// as `{output_folder}/{i}.{ext}`. A run that could not load its detector or
/// image yields the empty default.
#[derive(Debug, Clone, Default)]
pub struct DetectionResult {
    pub boxes: Vec<WordBox>,
    pub crops: Vec<DynamicImage>,
    /// Source image with every box outlined.
    pub overview: Option<RgbImage>,
    /// Source and overview side by side; only with `draw_graphs`.
    pub comparison: Option<RgbImage>,
    /// Files the crops were written to.
    pub crop_paths: Vec<PathBuf>,
}

impl DetectionResult {
    pub fn is_empty(&self) -> bool {
        self.crops.is_empty() && self.overview.is_none()
    }
}

/// Detects words, orders them, crops them and writes the crops to disk.
///
/// Holds no state between runs; the detector is owned by the caller.
#[derive(Debug, Default)]
pub struct DetectionPipeline {
    config: PipelineConfig,
    overlay: OverlayStyle,
}

impl DetectionPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            overlay: OverlayStyle::default(),
        }
    }

    pub fn with_overlay(mut self, overlay: OverlayStyle) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut PipelineConfig {
        &mut self.config
    }

    /// Runs on the image at `image_path`.
    ///
    /// An unreadable image is logged and yields an empty [`DetectionResult`].
    pub fn run<D: Detector + ?Sized>(
        &self,
        detector: &D,
        image_path: impl AsRef<Path>,
    ) -> Result<DetectionResult> {
        let image_path = image_path.as_ref();
        match self.load(image_path) {
            Ok(image) => self.run_on_image(detector, image),
            Err(err) => Self::recover(err),
        }
    }

    /// Initializes a detector with `load_detector`, then runs on `image_path`.
    ///
    /// Failing to initialize the detector or to load the image is logged and
    /// yields an empty [`DetectionResult`].
    pub fn run_with<D, F>(
        &self,
        load_detector: F,
        image_path: impl AsRef<Path>,
    ) -> Result<DetectionResult>
    where
        D: Detector,
        F: FnOnce() -> Result<D>,
    {
        match load_detector() {
            Ok(detector) => self.run(&detector, image_path),
            Err(err @ Error::DetectorLoad { .. }) => Self::recover(err),
            Err(source) => Self::recover(Error::DetectorLoad {
                location: std::any::type_name::<D>().to_string(),
                source: Box::new(source),
            }),
        }
    }

    /// Runs on an already decoded image.
    ///
    /// The image is converted to RGB but its orientation is left as is.
    pub fn run_on_image<D: Detector + ?Sized>(
        &self,
        detector: &D,
        image: DynamicImage,
    ) -> Result<DetectionResult> {
        let image = DynamicImage::ImageRgb8(image.into_rgb8());
        let (width, height) = (image.width(), image.height());

        let detected = detector.detect(&image, self.config.confidence)?;
        let detected_count = detected.len();

        let boxes: Vec<WordBox> = detected
            .into_iter()
            .map(|mut word| {
                word.clamp_to(width, height);
                word
            })
            .filter(|word| word.pixel_rect().is_some())
            .collect();
        if boxes.len() < detected_count {
            tracing::warn!(
                "dropped {} boxes with no area inside the {width}x{height} image",
                detected_count - boxes.len()
            );
        }

        if boxes.is_empty() {
            tracing::warn!("no words with confidence > {} on the image", self.config.confidence);
        }

        let order = &self.config.reading_order;
        let boxes = order.sort(boxes);
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!("{} boxes on {} lines", boxes.len(), order.lines(&boxes).len());
        }

        let crops: Vec<DynamicImage> = boxes.iter().map(|b| b.crop_from_image(&image)).collect();

        let source = image.into_rgb8();
        let overview = self.overlay.annotate(&source, &boxes);
        let comparison = self
            .config
            .draw_graphs
            .then(|| side_by_side(&source, &overview));

        let writer = OutputWriter::new(&self.config.output_folder)
            .with_encoding(self.config.crop_encoding);
        let crop_paths = writer.write_all(&crops)?;

        tracing::info!(
            "found {} words with confidence > {}",
            crops.len(),
            self.config.confidence
        );

        Ok(DetectionResult {
            boxes,
            crops,
            overview: Some(overview),
            comparison,
            crop_paths,
        })
    }

    fn load(&self, image_path: &Path) -> Result<DynamicImage> {
        let image = load_image(image_path).map_err(|source| Error::ImageLoad {
            path: image_path.to_path_buf(),
            source,
        })?;
        tracing::info!("loaded image {}", image_path.display());
        Ok(image)
    }

    fn recover(err: Error) -> Result<DetectionResult> {
        if err.is_recoverable() {
            tracing::error!("{err}");
            Ok(DetectionResult::default())
        } else {
            Err(err)
        }
    }
}

/// Loads the ONNX word detector at `model_path` and extracts the words of `image_path`.
///
/// Loads the model on every call; keep a [`YoloWordModel`] and use
/// [`DetectionPipeline::run`] to process many images.
pub fn detect_words(
    model_path: impl AsRef<Path>,
    image_path: impl AsRef<Path>,
    config: PipelineConfig,
) -> Result<DetectionResult> {
    let model_path = model_path.as_ref();
    DetectionPipeline::new(config).run_with(
        || {
            YoloWordModel::load(model_path).map_err(|source| Error::DetectorLoad {
                location: model_path.display().to_string(),
                source: Box::new(source),
            })
        },
        image_path,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::cell::Cell;

    /// 200x100 page where every pixel encodes its own coordinates.
    fn page() -> RgbImage {
        RgbImage::from_fn(200, 100, |x, y| Rgb([x as u8, y as u8, 7]))
    }

    fn save_page(dir: &Path) -> PathBuf {
        let path = dir.join("page.png");
        page().save(&path).unwrap();
        path
    }

    fn config(dir: &Path) -> PipelineConfig {
        PipelineConfig::default().with_output_folder(dir.join("output"))
    }

    fn fixed_boxes(
        boxes: Vec<WordBox>,
    ) -> impl Fn(&DynamicImage, f32) -> Result<Vec<WordBox>> {
        move |_: &DynamicImage, threshold: f32| {
            Ok(boxes
                .iter()
                .filter(|b| b.confidence > threshold)
                .cloned()
                .collect())
        }
    }

    fn words() -> Vec<WordBox> {
        vec![
            WordBox::new(120.0, 52.0, 160.0, 70.0, 0.8),
            WordBox::new(100.0, 10.0, 140.0, 30.0, 0.9),
            WordBox::new(10.0, 50.0, 60.0, 70.0, 0.7),
            WordBox::new(20.0, 12.0, 80.0, 30.0, 0.95),
            WordBox::new(30.0, 80.0, 90.0, 95.0, 0.3),
        ]
    }

    #[test]
    fn test_crops_follow_reading_order() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = save_page(dir.path());
        let pipeline = DetectionPipeline::new(config(dir.path()));

        let result = pipeline.run(&fixed_boxes(words()), &image_path).unwrap();

        // the 0.3 box is below the default threshold
        assert_eq!(result.crops.len(), 4);
        assert_eq!(result.boxes.len(), 4);
        let lefts: Vec<f32> = result.boxes.iter().map(|b| b.x1()).collect();
        assert_eq!(lefts, vec![20.0, 100.0, 10.0, 120.0]);

        // each crop starts at its box's top-left corner
        for (word, crop) in result.boxes.iter().zip(&result.crops) {
            let (x, y, w, h) = word.pixel_rect().unwrap();
            assert_eq!((crop.width(), crop.height()), (w, h));
            assert_eq!(crop.to_rgb8().get_pixel(0, 0), &Rgb([x as u8, y as u8, 7]));
        }
    }

    #[test]
    fn test_persisted_files_match_crops() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = save_page(dir.path());
        let pipeline = DetectionPipeline::new(config(dir.path()));

        let result = pipeline.run(&fixed_boxes(words()), &image_path).unwrap();

        assert_eq!(result.crop_paths.len(), result.crops.len());
        for (i, crop) in result.crops.iter().enumerate() {
            let path = dir.path().join("output").join(format!("{i}.png"));
            assert_eq!(result.crop_paths[i], path);
            assert_eq!(image::open(&path).unwrap().to_rgb8(), crop.to_rgb8());
        }
    }

    #[test]
    fn test_threshold_is_passed_to_detector() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = save_page(dir.path());
        let pipeline = DetectionPipeline::new(config(dir.path()).with_confidence(0.85));

        let seen = Cell::new(0.0);
        let detector = |img: &DynamicImage, threshold: f32| {
            seen.set(threshold);
            fixed_boxes(words())(img, threshold)
        };

        let result = pipeline.run(&detector, &image_path).unwrap();
        assert_eq!(seen.get(), 0.85);
        assert_eq!(result.crops.len(), 2);
    }

    #[test]
    fn test_no_words_returns_plain_overview() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = save_page(dir.path());
        let pipeline = DetectionPipeline::new(config(dir.path()));

        let result = pipeline.run(&fixed_boxes(vec![]), &image_path).unwrap();

        assert!(result.crops.is_empty());
        assert_eq!(result.overview, Some(page()));
        assert!(result.comparison.is_none());
        assert!(dir.path().join("output").is_dir());
    }

    #[test]
    fn test_overview_and_comparison() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = save_page(dir.path());
        let pipeline = DetectionPipeline::new(config(dir.path()).with_draw_graphs(true));

        let result = pipeline.run(&fixed_boxes(words()), &image_path).unwrap();

        let overview = result.overview.unwrap();
        assert_eq!(overview.get_pixel(20, 20), &Rgb([255, 0, 0]));
        let comparison = result.comparison.unwrap();
        assert_eq!(comparison.dimensions(), (400, 100));
        assert_eq!(comparison.get_pixel(20, 20), page().get_pixel(20, 20));
        assert_eq!(comparison.get_pixel(220, 20), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_boxes_are_clamped_and_degenerate_ones_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = save_page(dir.path());
        let pipeline = DetectionPipeline::new(config(dir.path()));

        let boxes = vec![
            WordBox::new(180.0, 90.0, 260.0, 130.0, 0.9),
            WordBox::new(300.0, 10.0, 340.0, 30.0, 0.9),
        ];
        let result = pipeline.run(&fixed_boxes(boxes), &image_path).unwrap();

        assert_eq!(result.crops.len(), 1);
        assert_eq!(result.boxes[0].x2(), 200.0);
        assert_eq!(result.boxes[0].y2(), 100.0);
        assert_eq!((result.crops[0].width(), result.crops[0].height()), (20, 10));
    }

    #[test]
    fn test_unreadable_image_yields_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.png");
        std::fs::write(&bogus, b"not a png").unwrap();
        let pipeline = DetectionPipeline::new(config(dir.path()));

        for path in [bogus, dir.path().join("missing.jpg")] {
            for _ in 0..2 {
                let result = pipeline.run(&fixed_boxes(words()), &path).unwrap();
                assert!(result.is_empty());
            }
        }
        assert!(!dir.path().join("output").exists());
    }

    #[test]
    fn test_detector_load_failure_yields_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = save_page(dir.path());
        let pipeline = DetectionPipeline::new(config(dir.path()));

        let result = pipeline
            .run_with(
                || -> Result<fn(&DynamicImage, f32) -> Result<Vec<WordBox>>> {
                    Err(std::io::Error::from(std::io::ErrorKind::NotFound).into())
                },
                &image_path,
            )
            .unwrap();
        assert!(result.is_empty());
    }

    /// Stands in for a model whose inference fails at run time.
    struct BrokenModel;

    impl Detector for BrokenModel {
        fn detect(&self, _image: &DynamicImage, _threshold: f32) -> Result<Vec<WordBox>> {
            Err(std::io::Error::other("inference failed").into())
        }
    }

    #[test]
    fn test_inference_failure_is_not_an_empty_page() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = save_page(dir.path());
        let pipeline = DetectionPipeline::new(config(dir.path()));

        let err = pipeline.run(&BrokenModel, &image_path).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_recoverable());
        assert!(!dir.path().join("output").exists());

        let err = pipeline
            .run_with(|| Ok(BrokenModel), &image_path)
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_detector_errors_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = save_page(dir.path());
        let pipeline = DetectionPipeline::new(config(dir.path()));

        let failing = |_: &DynamicImage, _: f32| -> Result<Vec<WordBox>> {
            Err(Error::OutputShape(vec![1, 2]))
        };
        let err = pipeline.run(&failing, &image_path).unwrap_err();
        assert!(matches!(err, Error::OutputShape(_)));
    }
}
