//! Annotation rendering.
//!
//! `annotate` is the detector's render step: it draws every detection's
//! bounding box and label tag onto a copy of the frame. The input frame is
//! never touched; with zero detections the copy is pixel-identical to the
//! input.

use anyhow::{anyhow, Result};
use image::{ImageBuffer, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detect::labels::resolve;
use crate::detect::result::Detection;
use crate::frame::Frame;

const BOX_COLOR: Rgb<u8> = Rgb([0, 220, 60]);
const TAG_BACKGROUND: Rgb<u8> = Rgb([16, 16, 16]);
const TAG_TEXT: Rgb<u8> = Rgb([255, 255, 255]);

const GLYPH_WIDTH: u32 = 8;
const GLYPH_HEIGHT: u32 = 12;

/// Draw detections onto a copy of `frame`.
pub fn annotate(
    frame: &Frame,
    detections: &[Detection],
    labels: &'static [&'static str],
) -> Result<Frame> {
    if detections.is_empty() {
        // Nothing to draw; the copy must stay pixel-identical.
        return frame.with_pixels(frame.pixels().to_vec());
    }

    let mut img: RgbImage =
        ImageBuffer::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;

    for detection in detections {
        let Some(rect) = clip_rect(&img, detection) else {
            continue;
        };

        draw_hollow_rect_mut(&mut img, rect, BOX_COLOR);
        if rect.width() > 2 && rect.height() > 2 {
            let inner = Rect::at(rect.left() + 1, rect.top() + 1)
                .of_size(rect.width() - 2, rect.height() - 2);
            draw_hollow_rect_mut(&mut img, inner, BOX_COLOR);
        }

        let label = resolve(labels, detection.class_id);
        let tag = format!("{} {:.0}%", label, detection.confidence * 100.0);
        draw_tag(&mut img, rect, &tag);
    }

    frame.with_pixels(img.into_raw())
}

/// Clamp a detection's box to the image bounds; drop degenerate boxes.
fn clip_rect(img: &RgbImage, detection: &Detection) -> Option<Rect> {
    let (iw, ih) = (img.width() as i32, img.height() as i32);
    let x1 = (detection.bbox.x as i32).clamp(0, iw - 1);
    let y1 = (detection.bbox.y as i32).clamp(0, ih - 1);
    let x2 = ((detection.bbox.x + detection.bbox.width) as i32).clamp(0, iw - 1);
    let y2 = ((detection.bbox.y + detection.bbox.height) as i32).clamp(0, ih - 1);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(Rect::at(x1, y1).of_size((x2 - x1) as u32, (y2 - y1) as u32))
}

/// Draw a label strip above the box (below when there is no room).
fn draw_tag(img: &mut RgbImage, rect: Rect, tag: &str) {
    let tag_width = (tag.chars().count() as u32 * GLYPH_WIDTH + 4).min(img.width());
    let tag_height = GLYPH_HEIGHT + 2;

    let x = (rect.left() as u32).min(img.width().saturating_sub(tag_width));
    let y = if rect.top() as u32 >= tag_height {
        rect.top() as u32 - tag_height
    } else {
        (rect.bottom() as u32 + 1).min(img.height().saturating_sub(tag_height))
    };

    draw_filled_rect_mut(
        img,
        Rect::at(x as i32, y as i32).of_size(tag_width, tag_height),
        TAG_BACKGROUND,
    );
    draw_text(img, tag, x + 2, y + 1, TAG_TEXT);
}

/// Render text with the built-in 8x12 bitmap glyphs.
fn draw_text(img: &mut RgbImage, text: &str, start_x: u32, start_y: u32, color: Rgb<u8>) {
    let mut x = start_x;
    for ch in text.chars() {
        if x + GLYPH_WIDTH > img.width() {
            break;
        }
        if let Some(pattern) = glyph(ch) {
            for (row, bits) in pattern.iter().enumerate() {
                let y = start_y + row as u32;
                if y >= img.height() {
                    break;
                }
                for col in 0..GLYPH_WIDTH {
                    if (bits >> (7 - col)) & 1 == 1 {
                        img.put_pixel(x + col, y, color);
                    }
                }
            }
        }
        x += GLYPH_WIDTH;
    }
}

/// 8x12 bitmap glyphs covering the characters label tags use: lowercase
/// letters, digits, space, percent, period. Unknown characters render as a
/// blank cell.
fn glyph(ch: char) -> Option<[u8; 12]> {
    let pattern = match ch {
        'a' => [0x00, 0x00, 0x00, 0x3C, 0x02, 0x3E, 0x42, 0x42, 0x46, 0x3A, 0x00, 0x00],
        'b' => [0x00, 0x40, 0x40, 0x5C, 0x62, 0x42, 0x42, 0x42, 0x62, 0x5C, 0x00, 0x00],
        'c' => [0x00, 0x00, 0x00, 0x3C, 0x42, 0x40, 0x40, 0x40, 0x42, 0x3C, 0x00, 0x00],
        'd' => [0x00, 0x02, 0x02, 0x3A, 0x46, 0x42, 0x42, 0x42, 0x46, 0x3A, 0x00, 0x00],
        'e' => [0x00, 0x00, 0x00, 0x3C, 0x42, 0x7E, 0x40, 0x40, 0x42, 0x3C, 0x00, 0x00],
        'f' => [0x00, 0x0C, 0x10, 0x7C, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x00, 0x00],
        'g' => [0x00, 0x00, 0x00, 0x3A, 0x46, 0x42, 0x46, 0x3A, 0x02, 0x3C, 0x00, 0x00],
        'h' => [0x00, 0x40, 0x40, 0x5C, 0x62, 0x42, 0x42, 0x42, 0x42, 0x42, 0x00, 0x00],
        'i' => [0x00, 0x08, 0x00, 0x18, 0x08, 0x08, 0x08, 0x08, 0x08, 0x3E, 0x00, 0x00],
        'j' => [0x00, 0x04, 0x00, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x44, 0x38, 0x00, 0x00],
        'k' => [0x00, 0x40, 0x40, 0x44, 0x48, 0x70, 0x48, 0x44, 0x42, 0x41, 0x00, 0x00],
        'l' => [0x00, 0x18, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x3E, 0x00, 0x00],
        'm' => [0x00, 0x00, 0x00, 0x76, 0x49, 0x49, 0x49, 0x49, 0x49, 0x49, 0x00, 0x00],
        'n' => [0x00, 0x00, 0x00, 0x5C, 0x62, 0x42, 0x42, 0x42, 0x42, 0x42, 0x00, 0x00],
        'o' => [0x00, 0x00, 0x00, 0x3C, 0x42, 0x42, 0x42, 0x42, 0x42, 0x3C, 0x00, 0x00],
        'p' => [0x00, 0x00, 0x00, 0x5C, 0x62, 0x42, 0x62, 0x5C, 0x40, 0x40, 0x00, 0x00],
        'q' => [0x00, 0x00, 0x00, 0x3A, 0x46, 0x42, 0x46, 0x3A, 0x02, 0x02, 0x00, 0x00],
        'r' => [0x00, 0x00, 0x00, 0x5C, 0x62, 0x40, 0x40, 0x40, 0x40, 0x40, 0x00, 0x00],
        's' => [0x00, 0x00, 0x00, 0x3E, 0x40, 0x3C, 0x02, 0x02, 0x42, 0x3C, 0x00, 0x00],
        't' => [0x00, 0x10, 0x10, 0x7C, 0x10, 0x10, 0x10, 0x10, 0x10, 0x0C, 0x00, 0x00],
        'u' => [0x00, 0x00, 0x00, 0x42, 0x42, 0x42, 0x42, 0x42, 0x46, 0x3A, 0x00, 0x00],
        'v' => [0x00, 0x00, 0x00, 0x42, 0x42, 0x42, 0x24, 0x24, 0x18, 0x18, 0x00, 0x00],
        'w' => [0x00, 0x00, 0x00, 0x42, 0x42, 0x42, 0x5A, 0x66, 0x42, 0x42, 0x00, 0x00],
        'x' => [0x00, 0x00, 0x00, 0x42, 0x24, 0x18, 0x18, 0x24, 0x42, 0x42, 0x00, 0x00],
        'y' => [0x00, 0x00, 0x00, 0x42, 0x42, 0x42, 0x26, 0x1A, 0x02, 0x3C, 0x00, 0x00],
        'z' => [0x00, 0x00, 0x00, 0x7E, 0x04, 0x08, 0x10, 0x20, 0x40, 0x7E, 0x00, 0x00],
        '0' => [0x00, 0x3C, 0x42, 0x46, 0x4A, 0x52, 0x62, 0x42, 0x42, 0x3C, 0x00, 0x00],
        '1' => [0x00, 0x08, 0x18, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x3E, 0x00, 0x00],
        '2' => [0x00, 0x3C, 0x42, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x7E, 0x00, 0x00],
        '3' => [0x00, 0x3C, 0x42, 0x02, 0x1C, 0x02, 0x02, 0x02, 0x42, 0x3C, 0x00, 0x00],
        '4' => [0x00, 0x04, 0x0C, 0x14, 0x24, 0x44, 0x7E, 0x04, 0x04, 0x04, 0x00, 0x00],
        '5' => [0x00, 0x7E, 0x40, 0x40, 0x7C, 0x02, 0x02, 0x02, 0x42, 0x3C, 0x00, 0x00],
        '6' => [0x00, 0x1C, 0x20, 0x40, 0x7C, 0x42, 0x42, 0x42, 0x42, 0x3C, 0x00, 0x00],
        '7' => [0x00, 0x7E, 0x02, 0x04, 0x08, 0x08, 0x10, 0x10, 0x20, 0x20, 0x00, 0x00],
        '8' => [0x00, 0x3C, 0x42, 0x42, 0x3C, 0x42, 0x42, 0x42, 0x42, 0x3C, 0x00, 0x00],
        '9' => [0x00, 0x3C, 0x42, 0x42, 0x42, 0x3E, 0x02, 0x04, 0x08, 0x70, 0x00, 0x00],
        '%' => [0x00, 0x62, 0x64, 0x08, 0x10, 0x10, 0x20, 0x26, 0x46, 0x00, 0x00, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x18, 0x18, 0x00, 0x00],
        ' ' => [0x00; 12],
        _ => return None,
    };
    Some(pattern)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::labels::{COCO_LABELS, PERSON_CLASS_ID};
    use crate::detect::result::BoundingBox;

    fn gradient_frame(width: u32, height: u32) -> Frame {
        let data: Vec<u8> = (0..(width * height * 3) as usize)
            .map(|i| (i % 251) as u8)
            .collect();
        Frame::new(data, width, height, 0).unwrap()
    }

    #[test]
    fn zero_detections_yield_pixel_identical_copy() {
        let frame = gradient_frame(64, 48);
        let annotated = annotate(&frame, &[], &COCO_LABELS).unwrap();
        assert_eq!(annotated.pixels(), frame.pixels());
    }

    #[test]
    fn detections_change_pixels_but_not_the_input() {
        let frame = gradient_frame(64, 48);
        let original = frame.pixels().to_vec();
        let detections = vec![Detection {
            class_id: PERSON_CLASS_ID,
            confidence: 0.9,
            bbox: BoundingBox::new(10.0, 20.0, 30.0, 20.0),
        }];

        let annotated = annotate(&frame, &detections, &COCO_LABELS).unwrap();

        assert_ne!(annotated.pixels(), frame.pixels());
        assert_eq!(frame.pixels(), original.as_slice());
        assert_eq!(annotated.width(), frame.width());
        assert_eq!(annotated.height(), frame.height());
    }

    #[test]
    fn out_of_bounds_boxes_are_clipped_not_fatal() {
        let frame = gradient_frame(32, 32);
        let detections = vec![Detection {
            class_id: PERSON_CLASS_ID,
            confidence: 0.7,
            bbox: BoundingBox::new(-10.0, -10.0, 200.0, 200.0),
        }];

        assert!(annotate(&frame, &detections, &COCO_LABELS).is_ok());
    }
}
