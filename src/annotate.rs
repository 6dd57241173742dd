//! Display overlays for the live preview.
//!
//! Callers hand the annotator a copy of the frame; the source frame stays clean for
//! cropping. Text uses a built-in 5x7 bitmap font, upper-cased.

use image::{Rgb, RgbImage};

use crate::detect::{Detection, ObjectClass};
use crate::frame::Frame;

const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Box colour per class.
pub fn class_color(class: ObjectClass) -> Rgb<u8> {
    match class {
        ObjectClass::Motorcycle => Rgb([0, 140, 255]),
        ObjectClass::Helmet => Rgb([50, 255, 0]),
        ObjectClass::LicensePlate => Rgb([0, 255, 255]),
        ObjectClass::NoHelmet => Rgb([255, 0, 0]),
        _ => Rgb([128, 128, 128]),
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FrameAnnotator {
    thickness: i32,
    text_scale: i32,
}

impl Default for FrameAnnotator {
    fn default() -> Self {
        Self {
            thickness: 2,
            text_scale: 2,
        }
    }
}

impl FrameAnnotator {
    pub fn new(thickness: i32, text_scale: i32) -> Self {
        Self {
            thickness: thickness.max(1),
            text_scale: text_scale.max(1),
        }
    }

    /// Boxes plus a filled label plate reading `LABEL (0.87)` above each box.
    ///
    /// Boxes are clamped to the frame first; one lying wholly outside is skipped.
    pub fn draw_detections(&self, frame: &mut Frame, detections: &[Detection]) {
        let (width, height) = (frame.width(), frame.height());
        let image = frame.image_mut();
        for det in detections {
            let Some(b) = det.bbox.clamp_to(width, height) else {
                continue;
            };
            let color = class_color(det.class);
            for t in 0..self.thickness {
                draw_rectangle(
                    image,
                    b.x1.saturating_add(t),
                    b.y1.saturating_add(t),
                    b.x2.saturating_sub(1 + t),
                    b.y2.saturating_sub(1 + t),
                    color,
                );
            }

            let label = format!("{} ({:.2})", det.class.label(), det.confidence);
            let text_w = text_width(&label, self.text_scale);
            let text_h = GLYPH_HEIGHT.saturating_mul(self.text_scale);
            let top = b.y1.saturating_sub(text_h + 6).max(0);
            fill_rect(
                image,
                b.x1,
                top,
                b.x1.saturating_add(text_w).saturating_add(6),
                top.saturating_add(text_h + 6),
                color,
            );
            draw_text(image, b.x1 + 3, top + 3, &label, self.text_scale, WHITE);
        }
    }

    /// Processing banner and the instantaneous frame rate, top-left.
    pub fn draw_status(&self, frame: &mut Frame, fps: f32) {
        let image = frame.image_mut();
        let line = GLYPH_HEIGHT * self.text_scale + 8;
        draw_text(image, 10, 10, "Processing...", self.text_scale, WHITE);
        draw_text(
            image,
            10,
            10 + line,
            &format!("FPS: {:.1}", fps),
            self.text_scale,
            WHITE,
        );
    }
}

fn text_width(text: &str, scale: i32) -> i32 {
    (text.chars().count() as i32).saturating_mul((GLYPH_WIDTH + 1).saturating_mul(scale))
}

fn put(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_rectangle(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    if right < left || bottom < top {
        return;
    }
    let (w, h) = (image.width() as i32, image.height() as i32);
    for x in left.max(0)..=right.min(w - 1) {
        put(image, x, top, color);
        put(image, x, bottom, color);
    }
    for y in top.max(0)..=bottom.min(h - 1) {
        put(image, left, y, color);
        put(image, right, y, color);
    }
}

fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let left = left.max(0);
    let top = top.max(0);
    let right = right.min(image.width() as i32 - 1);
    let bottom = bottom.min(image.height() as i32 - 1);
    for y in top..=bottom {
        for x in left..=right {
            put(image, x, y, color);
        }
    }
}

fn draw_text(image: &mut RgbImage, x: i32, y: i32, text: &str, scale: i32, color: Rgb<u8>) {
    let mut cursor = x;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(rows) = glyph_bits(ch) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                        continue;
                    }
                    for dy in 0..scale {
                        for dx in 0..scale {
                            put(
                                image,
                                cursor + col * scale + dx,
                                y + row as i32 * scale + dy,
                                color,
                            );
                        }
                    }
                }
            }
        }
        cursor += (GLYPH_WIDTH + 1) * scale;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '.' => [0, 0, 0, 0, 0, 0b01100, 0b01100],
        ':' => [0, 0b01100, 0b01100, 0, 0b01100, 0b01100, 0],
        '(' => [0b00010, 0b00100, 0b01000, 0b01000, 0b01000, 0b00100, 0b00010],
        ')' => [0b01000, 0b00100, 0b00010, 0b00010, 0b00010, 0b00100, 0b01000],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '_' => [0, 0, 0, 0, 0, 0, 0b11111],
        '%' => [0b11000, 0b11001, 0b00010, 0b00100, 0b01000, 0b10011, 0b00011],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn blank(width: u32, height: u32) -> Frame {
        Frame::new(0, RgbImage::new(width, height))
    }

    #[test]
    fn draws_box_edges_in_class_color() {
        let mut frame = blank(120, 120);
        let det = Detection::new(3, 0.5, BoundingBox::new(40, 60, 80, 100));
        FrameAnnotator::default().draw_detections(&mut frame, &[det]);
        let red = class_color(ObjectClass::NoHelmet);
        assert_eq!(frame.image().get_pixel(40, 80), &red);
        assert_eq!(frame.image().get_pixel(79, 80), &red);
        assert_eq!(frame.image().get_pixel(60, 99), &red);
        // interior untouched
        assert_eq!(frame.image().get_pixel(60, 80), &Rgb([0, 0, 0]));
    }

    #[test]
    fn boxes_outside_frame_do_not_panic() {
        let mut frame = blank(16, 16);
        let det = Detection::new(0, 0.9, BoundingBox::new(-30, -30, 400, 400));
        FrameAnnotator::default().draw_detections(&mut frame, &[det]);
        FrameAnnotator::new(1, 1).draw_status(&mut frame, 29.7);
    }

    #[test]
    fn non_finite_model_boxes_are_clamped_or_skipped() {
        let mut frame = blank(16, 16);
        let wild = [
            Detection::new(0, 0.9, BoundingBox::from_f32(f32::INFINITY, 0.0, f32::INFINITY, 10.0)),
            Detection::new(2, 0.9, BoundingBox::from_f32(f32::NEG_INFINITY, 2.0, 1e20, 12.0)),
            Detection::new(3, 0.9, BoundingBox::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX)),
        ];
        FrameAnnotator::default().draw_detections(&mut frame, &wild);
        // The whole-frame plate box still lands on the left edge.
        assert_eq!(frame.image().get_pixel(0, 8), &class_color(ObjectClass::NoHelmet));
    }

    #[test]
    fn status_text_touches_top_left() {
        let mut frame = blank(200, 80);
        FrameAnnotator::default().draw_status(&mut frame, 30.0);
        let lit = frame
            .image()
            .enumerate_pixels()
            .filter(|(x, y, p)| *x < 120 && *y < 60 && **p == WHITE)
            .count();
        assert!(lit > 0);
    }

    #[test]
    fn every_label_character_has_a_glyph() {
        for ch in "MOTORCYCLE HELMET LICENSEPLATE NOHELMET UNKNOWN (0.87) PROCESSING... FPS: 29.9".chars() {
            assert!(ch == ' ' || glyph_bits(ch).is_some(), "missing glyph {ch:?}");
        }
    }
}
