//! Reading order for detected words.
//!
//! Words are bucketed into text lines by the top edge of their box, using a
//! tolerance derived from the mean box height, then read line by line, left
//! to right.

use crate::WordBox;

/// Sorts [`WordBox`]es into the order a person would read them.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadingOrder {
    /// Line bucket height as a fraction of the mean box height.
    pub line_tolerance_factor: f32,
    /// Order boxes sharing a line bucket and left edge by their top edge.
    pub break_ties_by_top: bool,
}

impl Default for ReadingOrder {
    fn default() -> Self {
        Self {
            line_tolerance_factor: Self::DEFAULT_LINE_TOLERANCE_FACTOR,
            break_ties_by_top: false,
        }
    }
}

/// Identifies the text line a box was assigned to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineKey {
    /// Index of the tolerance bucket the top edge falls into.
    Bucket(i64),
    /// Exact top edge, used when no tolerance can be derived.
    Top(f32),
}

/// Boxes sharing a [`LineKey`], in reading order.
#[derive(Debug, Clone, PartialEq)]
pub struct LineGroup {
    pub key: LineKey,
    pub boxes: Vec<WordBox>,
}

impl ReadingOrder {
    pub const DEFAULT_LINE_TOLERANCE_FACTOR: f32 = 0.7;

    pub fn new(line_tolerance_factor: f32) -> Self {
        Self {
            line_tolerance_factor,
            ..Default::default()
        }
    }

    pub fn with_top_tie_break(mut self, enabled: bool) -> Self {
        self.break_ties_by_top = enabled;
        self
    }

    /// Vertical bucket size: mean box height times the tolerance factor.
    ///
    /// `None` when `boxes` is empty or the result is not a positive number
    /// (e.g. every box has zero height).
    pub fn line_tolerance(&self, boxes: &[WordBox]) -> Option<f32> {
        if boxes.is_empty() {
            return None;
        }
        let avg_height = boxes.iter().map(|b| b.height()).sum::<f32>() / boxes.len() as f32;
        let tolerance = avg_height * self.line_tolerance_factor;

        (tolerance.is_finite() && tolerance > 0.0).then_some(tolerance)
    }

    /// Sorts `boxes` line by line, left to right.
    ///
    /// The sort is stable: boxes with equal keys keep their input order.
    pub fn sort(&self, mut boxes: Vec<WordBox>) -> Vec<WordBox> {
        let tolerance = self.line_tolerance(&boxes);
        if tolerance.is_none() && !boxes.is_empty() {
            tracing::debug!("no usable line tolerance, ordering {} boxes by top edge", boxes.len());
        }

        boxes.sort_by(|a, b| {
            let ord = match tolerance {
                Some(t) => line_bucket(a.y1(), t)
                    .cmp(&line_bucket(b.y1(), t))
                    .then_with(|| a.x1().total_cmp(&b.x1())),
                None => a.y1().total_cmp(&b.y1()).then_with(|| a.x1().total_cmp(&b.x1())),
            };
            if self.break_ties_by_top {
                ord.then_with(|| a.y1().total_cmp(&b.y1()))
            } else {
                ord
            }
        });

        boxes
    }

    /// The line each box belongs to under this ordering.
    pub fn line_key(&self, word: &WordBox, tolerance: Option<f32>) -> LineKey {
        match tolerance {
            Some(t) => LineKey::Bucket(line_bucket(word.y1(), t)),
            None => LineKey::Top(word.y1()),
        }
    }

    /// Groups boxes that are already in reading order into text lines.
    pub fn lines(&self, sorted: &[WordBox]) -> Vec<LineGroup> {
        let tolerance = self.line_tolerance(sorted);
        let mut lines: Vec<LineGroup> = vec![];

        for word in sorted {
            let key = self.line_key(word, tolerance);
            match lines.last_mut() {
                Some(line) if line.key == key => line.boxes.push(word.clone()),
                _ => lines.push(LineGroup {
                    key,
                    boxes: vec![word.clone()],
                }),
            }
        }

        lines
    }
}

fn line_bucket(y1: f32, tolerance: f32) -> i64 {
    (y1 / tolerance).floor() as i64
}

/// Sorts `boxes` with the default [`ReadingOrder`].
pub fn sort_boxes(boxes: Vec<WordBox>) -> Vec<WordBox> {
    ReadingOrder::default().sort(boxes)
}

impl LineGroup {
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}
