//! Letterbox geometry: square zero-padding and its inverse on detections
//!
//! The detector consumes square frames. Incoming frames are aspect-preserving
//! resized by `r` and centered on a zero square canvas; every box the
//! detector returns is mapped back to sensor coordinates by inverting the
//! same transform.

use crate::error::{PerceptionError, Result};
use crate::types::{BoundingBox2D, ImageData, ImageFormat};
use image::{imageops, ImageBuffer, Rgb, RgbImage};

#[derive(Debug, Clone)]
pub struct Letterbox {
    image_rows: u32,
    image_cols: u32,
    /// Side length of the square canvas.
    image_size: u32,
    /// Scale applied to the last padded frame.
    r: f32,
    padding_rows: u32,
    padding_cols: u32,
}

impl Letterbox {
    pub fn new(image_rows: u32, image_cols: u32) -> Self {
        Self {
            image_rows,
            image_cols,
            image_size: image_rows.max(image_cols),
            r: 1.0,
            padding_rows: 0,
            padding_cols: 0,
        }
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    pub fn scale(&self) -> f32 {
        self.r
    }

    pub fn padding(&self) -> (u32, u32) {
        (self.padding_rows, self.padding_cols)
    }

    /// Letterbox a frame onto the square canvas, remembering the scale and
    /// padding for the inverse mapping.
    pub fn pad(&mut self, image: &ImageData) -> Result<ImageData> {
        if !image.validate() {
            return Err(PerceptionError::preprocessing(
                "image buffer does not match its dimensions",
            ));
        }

        let rgb = to_rgb_buffer(image)?;
        self.r = self.image_size as f32 / image.width.max(image.height) as f32;

        let scaled = if (self.r - 1.0).abs() > f32::EPSILON {
            let new_w = (image.width as f32 * self.r).round() as u32;
            let new_h = (image.height as f32 * self.r).round() as u32;
            imageops::resize(&rgb, new_w, new_h, imageops::FilterType::Triangle)
        } else {
            rgb
        };

        self.padding_rows = (self.image_size - scaled.height()) / 2;
        self.padding_cols = (self.image_size - scaled.width()) / 2;

        let mut canvas: RgbImage = ImageBuffer::new(self.image_size, self.image_size);
        imageops::replace(
            &mut canvas,
            &scaled,
            self.padding_cols as i64,
            self.padding_rows as i64,
        );

        Ok(ImageData::new(
            canvas.into_raw(),
            self.image_size,
            self.image_size,
            ImageFormat::Rgb,
        ))
    }

    /// Map detector boxes from padded coordinates back to the sensor frame:
    /// x <- (x - padding_cols) / r, w <- w / r, and likewise for y, h.
    pub fn adjust_boxes(&self, bboxes: &mut [Vec<BoundingBox2D>]) {
        let max_x = self.image_cols as f32;
        let max_y = self.image_rows as f32;
        for class_boxes in bboxes.iter_mut() {
            for bbox in class_boxes.iter_mut() {
                if !bbox.valid {
                    continue;
                }
                bbox.x = (bbox.x - self.padding_cols as f32) / self.r;
                bbox.y = (bbox.y - self.padding_rows as f32) / self.r;
                bbox.w /= self.r;
                bbox.h /= self.r;
                // Detections bleeding into the padding clamp onto the sensor
                bbox.x = bbox.x.clamp(0.0, max_x - 1.0);
                bbox.y = bbox.y.clamp(0.0, max_y - 1.0);
                bbox.update_corners();
                bbox.x_min = bbox.x_min.max(0.0);
                bbox.y_min = bbox.y_min.max(0.0);
                bbox.x_max = bbox.x_max.min(max_x);
                bbox.y_max = bbox.y_max.min(max_y);
            }
        }
    }
}

fn to_rgb_buffer(image: &ImageData) -> Result<RgbImage> {
    let data = match image.format {
        ImageFormat::Rgb => image.data.clone(),
        ImageFormat::Bgr => {
            let mut rgb = Vec::with_capacity(image.data.len());
            for chunk in image.data.chunks_exact(3) {
                rgb.push(chunk[2]);
                rgb.push(chunk[1]);
                rgb.push(chunk[0]);
            }
            rgb
        }
    };
    ImageBuffer::<Rgb<u8>, _>::from_raw(image.width, image.height, data)
        .ok_or_else(|| PerceptionError::preprocessing("failed to build image buffer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn frame(width: u32, height: u32) -> ImageData {
        ImageData::new(vec![255; (width * height * 3) as usize], width, height, ImageFormat::Rgb)
    }

    #[test]
    fn pad_centers_landscape_frame() {
        let mut letterbox = Letterbox::new(480, 640);
        let padded = letterbox.pad(&frame(640, 480)).unwrap();

        assert_eq!(padded.width, 640);
        assert_eq!(padded.height, 640);
        assert_abs_diff_eq!(letterbox.scale(), 1.0);
        assert_eq!(letterbox.padding(), (80, 0));

        // First padded row is zeros, first content row is not
        assert!(padded.data[..640 * 3].iter().all(|&b| b == 0));
        let content_row = 80 * 640 * 3;
        assert!(padded.data[content_row..content_row + 640 * 3]
            .iter()
            .all(|&b| b == 255));
    }

    #[test]
    fn pad_downscales_large_frames() {
        let mut letterbox = Letterbox::new(480, 640);
        let padded = letterbox.pad(&frame(1280, 960)).unwrap();

        assert_eq!(padded.width, 640);
        assert_abs_diff_eq!(letterbox.scale(), 0.5);
        assert_eq!(letterbox.padding(), (80, 0));
    }

    #[test]
    fn adjust_inverts_the_padding() {
        let mut letterbox = Letterbox::new(480, 640);
        letterbox.pad(&frame(640, 480)).unwrap();

        let mut bboxes = vec![vec![BoundingBox2D::new(320.0, 320.0, 40.0, 60.0, 0.9, 0)]];
        letterbox.adjust_boxes(&mut bboxes);

        let bbox = &bboxes[0][0];
        assert_abs_diff_eq!(bbox.x, 320.0);
        assert_abs_diff_eq!(bbox.y, 240.0);
        assert_abs_diff_eq!(bbox.w, 40.0);
        assert_abs_diff_eq!(bbox.x_min, 300.0);
        assert_abs_diff_eq!(bbox.y_max, 270.0);
    }

    #[test]
    fn adjusted_centers_stay_inside_the_sensor() {
        let mut letterbox = Letterbox::new(480, 640);
        letterbox.pad(&frame(640, 480)).unwrap();

        // Boxes all over the padded canvas, including inside the padding
        let mut bboxes = vec![(0..20)
            .map(|i| {
                BoundingBox2D::new(32.0 * i as f32, 10.0 + 31.0 * i as f32, 20.0, 20.0, 0.5, 0)
            })
            .collect::<Vec<_>>()];
        letterbox.adjust_boxes(&mut bboxes);

        for bbox in &bboxes[0] {
            assert!(bbox.x >= 0.0 && bbox.x < 640.0);
            assert!(bbox.y >= 0.0 && bbox.y < 480.0);
        }
    }
}
