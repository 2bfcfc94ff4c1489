//! Implemented word detection models.

mod yolo;

pub use yolo::YoloWordModel;
