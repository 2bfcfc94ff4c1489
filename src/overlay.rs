//! Diagnostic overview images: detected words outlined on the source page.

use std::path::Path;

use ab_glyph::{FontArc, FontRef, FontVec, PxScale};
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::{Result, WordBox};

/// DejaVu Sans Mono, used for confidence labels unless another font is set.
const BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");

/// How boxes and their confidence labels are drawn.
pub struct OverlayStyle {
    pub color: Rgb<u8>,
    pub thickness: u32,
    /// Distance between a box's top edge and the top of its label.
    pub label_offset: f32,
    pub font_scale: f32,
    font: Option<FontArc>,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        let font = match FontRef::try_from_slice(BUNDLED_FONT) {
            Ok(font) => Some(FontArc::new(font)),
            Err(err) => {
                tracing::warn!("bundled font unusable, confidence labels disabled: {err}");
                None
            }
        };

        Self {
            color: Rgb([255, 0, 0]),
            thickness: 3,
            label_offset: Self::DEFAULT_LABEL_OFFSET,
            font_scale: 14.0,
            font,
        }
    }
}

impl std::fmt::Debug for OverlayStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayStyle")
            .field("color", &self.color)
            .field("thickness", &self.thickness)
            .field("label_offset", &self.label_offset)
            .field("font_scale", &self.font_scale)
            .field("has_font", &self.font.is_some())
            .finish()
    }
}

impl OverlayStyle {
    pub const DEFAULT_LABEL_OFFSET: f32 = 15.0;

    pub fn with_font(mut self, font: impl Into<FontArc>) -> Self {
        self.font = Some(font.into());
        self
    }

    /// Loads a TrueType/OpenType font for confidence labels.
    pub fn with_font_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path)?;
        Ok(self.with_font(FontVec::try_from_vec(data)?))
    }

    pub fn with_label_offset(mut self, label_offset: f32) -> Self {
        self.label_offset = label_offset;
        self
    }

    /// Returns a copy of `image` with every box outlined and its confidence
    /// printed `label_offset` pixels above it.
    pub fn annotate(&self, image: &RgbImage, boxes: &[WordBox]) -> RgbImage {
        let mut canvas = image.clone();

        for word in boxes {
            let Some((x, y, width, height)) = word.pixel_rect() else {
                continue;
            };

            for t in 0..self.thickness {
                let inner_w = width.saturating_sub(2 * t);
                let inner_h = height.saturating_sub(2 * t);
                if inner_w == 0 || inner_h == 0 {
                    break;
                }
                let rect = Rect::at((x + t) as i32, (y + t) as i32).of_size(inner_w, inner_h);
                draw_hollow_rect_mut(&mut canvas, rect, self.color);
            }

            if let Some(font) = &self.font {
                draw_text_mut(
                    &mut canvas,
                    self.color,
                    x as i32,
                    (y as f32 - self.label_offset) as i32,
                    PxScale::from(self.font_scale),
                    font,
                    &confidence_label(word.confidence),
                );
            }
        }

        canvas
    }
}

/// The text drawn next to a box.
pub fn confidence_label(confidence: f32) -> String {
    format!("{confidence:.2}")
}

/// Places `left` and `right` next to each other on a white canvas.
pub fn side_by_side(left: &RgbImage, right: &RgbImage) -> RgbImage {
    let width = left.width() + right.width();
    let height = left.height().max(right.height());

    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    imageops::replace(&mut canvas, left, 0, 0);
    imageops::replace(&mut canvas, right, left.width() as i64, 0);

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    const RED: Rgb<u8> = Rgb([255, 0, 0]);

    #[test]
    fn test_annotate_draws_outline_on_copy() {
        let page = RgbImage::from_pixel(100, 60, WHITE);
        let boxes = vec![WordBox::new(10.0, 20.0, 50.0, 40.0, 0.87)];

        let overview = OverlayStyle::default().annotate(&page, &boxes);

        // three pixel wide border
        for offset in 0..3 {
            assert_eq!(overview.get_pixel(10 + offset, 30), &RED);
            assert_eq!(overview.get_pixel(30, 20 + offset), &RED);
            assert_eq!(overview.get_pixel(49 - offset, 30), &RED);
        }
        assert_eq!(overview.get_pixel(13, 30), &WHITE);
        assert_eq!(overview.get_pixel(30, 30), &WHITE);
        assert!(page.pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn test_annotate_prints_confidence_above_box() {
        let page = RgbImage::from_pixel(100, 80, WHITE);
        let boxes = vec![WordBox::new(10.0, 40.0, 60.0, 60.0, 0.87)];

        let overview = OverlayStyle::default().annotate(&page, &boxes);

        // label starts at y1 - 15 = 25 and ends before the outline at y = 40
        let ink: Vec<&Rgb<u8>> = (25..40)
            .flat_map(|y| (10..60).map(move |x| (x, y)))
            .map(|(x, y)| overview.get_pixel(x, y))
            .filter(|p| **p != WHITE)
            .collect();
        assert!(!ink.is_empty());
        // anti-aliased red over white
        assert!(ink.iter().all(|p| p.0[0] >= p.0[1] && p.0[1] == p.0[2]));
        assert!(ink.iter().any(|p| p.0[0] > 200 && p.0[1] < 128));

        // nothing drawn left of the box
        assert!((0..80).all(|y| overview.get_pixel(5, y) == &WHITE));
    }

    #[test]
    fn test_annotate_without_boxes_is_identity() {
        let page = RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]));
        assert_eq!(OverlayStyle::default().annotate(&page, &[]), page);
    }

    #[test]
    fn test_thin_box_does_not_panic() {
        let page = RgbImage::from_pixel(20, 20, WHITE);
        let boxes = vec![WordBox::new(2.0, 2.0, 4.0, 12.0, 0.5)];

        let overview = OverlayStyle::default().annotate(&page, &boxes);
        assert_eq!(overview.get_pixel(2, 5), &RED);
    }

    #[test]
    fn test_confidence_label_two_decimals() {
        assert_eq!(confidence_label(0.5), "0.50");
        assert_eq!(confidence_label(0.876), "0.88");
    }

    #[test]
    fn test_side_by_side() {
        let left = RgbImage::from_pixel(4, 3, Rgb([0, 0, 0]));
        let right = RgbImage::from_pixel(2, 5, RED);

        let combined = side_by_side(&left, &right);
        assert_eq!(combined.dimensions(), (6, 5));
        assert_eq!(combined.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(combined.get_pixel(0, 4), &WHITE);
        assert_eq!(combined.get_pixel(5, 4), &RED);
    }

    #[test]
    fn test_missing_font_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = OverlayStyle::default()
            .with_font_file(dir.path().join("nope.ttf"))
            .unwrap_err();
        assert!(matches!(err, crate::Error::Io(_)));
    }
}
