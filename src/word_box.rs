use geo_types::{coord, Rect};

/// A detected word region with the detector's confidence score.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WordBox {
    pub bbox: Rect<f32>,
    pub confidence: f32,
}

impl WordBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Self {
        let bbox = Rect::new(coord! { x: x1, y: y1 }, coord! { x: x2, y: y2 });

        Self { bbox, confidence }
    }

    pub fn x1(&self) -> f32 {
        self.bbox.min().x
    }

    pub fn y1(&self) -> f32 {
        self.bbox.min().y
    }

    pub fn x2(&self) -> f32 {
        self.bbox.max().x
    }

    pub fn y2(&self) -> f32 {
        self.bbox.max().y
    }

    pub fn width(&self) -> f32 {
        self.bbox.width()
    }

    pub fn height(&self) -> f32 {
        self.bbox.height()
    }

    /// Clamps the box so it lies within an image of the given dimensions.
    pub fn clamp_to(&mut self, width: u32, height: u32) {
        let (w, h) = (width as f32, height as f32);
        self.bbox = Rect::new(
            coord! { x: self.x1().clamp(0.0, w), y: self.y1().clamp(0.0, h) },
            coord! { x: self.x2().clamp(0.0, w), y: self.y2().clamp(0.0, h) },
        );
    }

    /// A box is valid when it has finite coordinates and a positive area.
    pub fn is_valid(&self) -> bool {
        let finite = [self.x1(), self.y1(), self.x2(), self.y2()]
            .iter()
            .all(|v| v.is_finite());
        finite && self.width() > 0.0 && self.height() > 0.0
    }

    /// Integer `(x, y, width, height)` of the pixels covered by this box.
    ///
    /// Coordinates are truncated. Returns `None` if nothing is left after truncation.
    pub fn pixel_rect(&self) -> Option<(u32, u32, u32, u32)> {
        if !self.is_valid() {
            return None;
        }
        let (x1, y1) = (self.x1().max(0.0) as u32, self.y1().max(0.0) as u32);
        let (x2, y2) = (self.x2().max(0.0) as u32, self.y2().max(0.0) as u32);

        match (x2.checked_sub(x1), y2.checked_sub(y1)) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((x1, y1, w, h)),
            _ => None,
        }
    }

    /// Cuts this box out of `img`. A degenerate box yields an empty image.
    pub fn crop_from_image(&self, img: &image::DynamicImage) -> image::DynamicImage {
        let (x, y, width, height) = self.pixel_rect().unwrap_or_default();

        img.crop_imm(x, y, width, height)
    }
}
