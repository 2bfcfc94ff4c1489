use std::path::Path;

use image::imageops;
use itertools::Itertools;
use ndarray::{s, Array, Array1, Array2, ArrayBase, ArrayView2, Dim, Ix3, OwnedRepr};
use ort::{Session, SessionBuilder};

pub use crate::error::{Error, Result};
use crate::{utils, Detector, WordBox};

/// A single-class [YOLO](https://github.com/ultralytics/ultralytics) word detector exported to ONNX.
///
/// The model is expected to produce one output of shape `[1, 4 + classes, anchors]`
/// holding `cx, cy, w, h` followed by per-class scores, as the Ultralytics ONNX
/// export does.
pub struct YoloWordModel {
    model_name: String,
    model: ort::Session,
    input_size: u32,
    iou_threshold: f32,
}

/// Maps model input coordinates back to the source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Letterbox {
    ratio: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    /// Scales `width`x`height` to fit a `size` square, centred.
    ///
    /// Returns the scaled dimensions along with the mapping back to the source.
    fn fit(size: u32, width: u32, height: u32) -> (u32, u32, Self) {
        let size = size.max(1);
        let (width, height) = (width.max(1), height.max(1));

        let ratio = f32::min(size as f32 / width as f32, size as f32 / height as f32);
        let new_width = ((width as f32 * ratio).round() as u32).clamp(1, size);
        let new_height = ((height as f32 * ratio).round() as u32).clamp(1, size);

        let letterbox = Self {
            ratio,
            pad_x: ((size - new_width) / 2) as f32,
            pad_y: ((size - new_height) / 2) as f32,
        };
        (new_width, new_height, letterbox)
    }

    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.ratio, (y - self.pad_y) / self.ratio)
    }
}

impl YoloWordModel {
    /// Default square input side.
    pub const DEFAULT_INPUT_SIZE: u32 = 640;
    /// Default IoU above which overlapping boxes are suppressed.
    pub const DEFAULT_IOU_THRESHOLD: f32 = 0.7;
    const PAD_VALUE: f32 = 114.0 / 255.0;

    /// Construct a [`YoloWordModel`] from a model file.
    pub fn new_from_file(
        file_path: impl AsRef<Path>,
        session_builder: SessionBuilder,
    ) -> Result<Self> {
        let file_path = file_path.as_ref();
        let model = session_builder.commit_from_file(file_path)?;

        let model_name = file_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "yolo".to_string());

        tracing::info!("loaded word detector from {}", file_path.display());

        Ok(Self::with_session(model_name, model))
    }

    /// Construct a [`YoloWordModel`] with a model file downloaded from Hugging Face.
    pub fn from_hf_hub(
        repo: &str,
        filename: &str,
        session_builder: SessionBuilder,
    ) -> Result<Self> {
        let api = hf_hub::api::sync::Api::new()?;
        let filename = api.model(repo.to_string()).get(filename)?;

        let model = session_builder.commit_from_file(&filename)?;

        tracing::info!("loaded word detector {repo} from {}", filename.display());

        Ok(Self::with_session(repo.to_string(), model))
    }

    /// Construct a [`YoloWordModel`] from a model file with a default session.
    pub fn load(file_path: impl AsRef<Path>) -> Result<Self> {
        Self::new_from_file(file_path, Session::builder()?)
    }

    fn with_session(model_name: String, model: Session) -> Self {
        Self {
            model_name,
            model,
            input_size: Self::DEFAULT_INPUT_SIZE,
            iou_threshold: Self::DEFAULT_IOU_THRESHOLD,
        }
    }

    /// Square input side the model was exported with; at least 1.
    pub fn with_input_size(mut self, input_size: u32) -> Self {
        self.input_size = input_size.max(1);
        self
    }

    pub fn with_iou_threshold(mut self, iou_threshold: f32) -> Self {
        self.iou_threshold = iou_threshold;
        self
    }

    /// Predict [`WordBox`]es scoring above `confidence_threshold` on the image provided.
    pub fn predict(
        &self,
        img: &image::DynamicImage,
        confidence_threshold: f32,
    ) -> Result<Vec<WordBox>> {
        let (input, letterbox) = self.preprocess(img);

        let input_name = &self.model.inputs[0].name;

        let outputs = self.model.run(ort::inputs![input_name => input]?)?;
        let output = outputs[0].try_extract_tensor::<f32>()?;
        let shape = output.shape().to_vec();
        let output = output
            .into_dimensionality::<Ix3>()
            .map_err(|_| Error::OutputShape(shape.clone()))?;
        if shape[0] != 1 {
            return Err(Error::OutputShape(shape));
        }

        let words = postprocess(
            output.slice(s![0, .., ..]),
            confidence_threshold,
            self.iou_threshold,
            letterbox,
            (img.width(), img.height()),
        )?;

        tracing::debug!(
            "{}: {} words above confidence {confidence_threshold}",
            self.model_name,
            words.len()
        );

        Ok(words)
    }

    fn preprocess(
        &self,
        img: &image::DynamicImage,
    ) -> (ArrayBase<OwnedRepr<f32>, Dim<[usize; 4]>>, Letterbox) {
        let size = self.input_size;
        let (new_width, new_height, letterbox) = Letterbox::fit(size, img.width(), img.height());

        let mut padded_img =
            Array::from_elem((1, 3, size as usize, size as usize), Self::PAD_VALUE);

        let resized_img =
            img.resize_exact(new_width, new_height, imageops::FilterType::Triangle);

        for pixel in resized_img.into_rgb8().enumerate_pixels() {
            let x = pixel.0 as usize + letterbox.pad_x as usize;
            let y = pixel.1 as usize + letterbox.pad_y as usize;
            let [r, g, b] = pixel.2 .0;
            padded_img[[0, 0, y, x]] = r as f32 / 255.0;
            padded_img[[0, 1, y, x]] = g as f32 / 255.0;
            padded_img[[0, 2, y, x]] = b as f32 / 255.0;
        }

        (padded_img, letterbox)
    }
}

impl Detector for YoloWordModel {
    fn detect(
        &self,
        image: &image::DynamicImage,
        confidence_threshold: f32,
    ) -> Result<Vec<WordBox>> {
        self.predict(image, confidence_threshold)
    }
}

/// Turns raw `[4 + classes, anchors]` predictions into word boxes on the source image.
pub(crate) fn postprocess(
    predictions: ArrayView2<f32>,
    confidence_threshold: f32,
    iou_threshold: f32,
    letterbox: Letterbox,
    (img_width, img_height): (u32, u32),
) -> Result<Vec<WordBox>> {
    let (rows, anchors) = predictions.dim();
    if rows < 5 {
        return Err(Error::OutputShape(vec![rows, anchors]));
    }

    let mut candidates = vec![];
    let mut scores = vec![];

    for column in predictions.columns() {
        let score = column
            .slice(s![4..])
            .fold(f32::NEG_INFINITY, |max, &v| f32::max(max, v));
        if score.is_nan() || score <= confidence_threshold {
            continue;
        }

        let [cx, cy, w, h] = utils::vec_to_bbox(column.slice(s![0..4]).to_vec());
        let (x1, y1) = letterbox.to_source(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_source(cx + w / 2.0, cy + h / 2.0);

        candidates.extend_from_slice(&[x1, y1, x2, y2]);
        scores.push(score);
    }

    if scores.is_empty() {
        return Ok(vec![]);
    }

    let boxes = Array2::from_shape_vec((scores.len(), 4), candidates)
        .map_err(|_| Error::OutputShape(vec![rows, anchors]))?;
    let scores = Array1::from_vec(scores);

    let keep = nms(&boxes, &scores, iou_threshold);

    let words = keep
        .into_iter()
        .map(|i| {
            let [x1, y1, x2, y2] = utils::vec_to_bbox(boxes.row(i).to_vec());
            let mut word = WordBox::new(x1, y1, x2, y2, scores[i]);
            word.clamp_to(img_width, img_height);
            word
        })
        .filter(WordBox::is_valid)
        .collect();

    Ok(words)
}

fn nms(boxes: &Array2<f32>, scores: &Array1<f32>, nms_thr: f32) -> Vec<usize> {
    let x1 = boxes.slice(s![.., 0]);
    let y1 = boxes.slice(s![.., 1]);
    let x2 = boxes.slice(s![.., 2]);
    let y2 = boxes.slice(s![.., 3]);

    let areas = (&x2 - &x1 + 1_f32) * (&y2 - &y1 + 1_f32);
    let mut order = {
        let mut o = utils::argsort_by(scores, |a, b| a.total_cmp(b));
        o.reverse();
        o
    };

    let mut keep = vec![];

    while !order.is_empty() {
        let i = order[0];
        keep.push(i);

        let rest = Array1::from_iter(order.iter().skip(1).copied());

        let xx1 = rest.mapv(|o_i| f32::max(x1[i], x1[o_i]));
        let yy1 = rest.mapv(|o_i| f32::max(y1[i], y1[o_i]));
        let xx2 = rest.mapv(|o_i| f32::min(x2[i], x2[o_i]));
        let yy2 = rest.mapv(|o_i| f32::min(y2[i], y2[o_i]));

        let w = ((&xx2 - &xx1) + 1_f32).mapv(|v| f32::max(0.0, v));
        let h = ((&yy2 - &yy1) + 1_f32).mapv(|v| f32::max(0.0, v));
        let inter = w * h;
        let ovr = &inter / (areas[i] + rest.mapv(|e| areas[e]) - &inter);

        order = ovr
            .iter()
            .zip_eq(rest.iter())
            .filter(|(o, _)| **o <= nms_thr)
            .map(|(_, j)| *j)
            .collect();
    }

    keep
}
