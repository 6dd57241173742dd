//! Decoded video frames.
//!
//! - `Frame`: an RGB image plus its decode index within the source video.
//!
//! The producer loop keeps the frame it received from the source untouched and
//! draws overlays on a clone, so crops are always taken from clean pixels.

use anyhow::{anyhow, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::detect::BoundingBox;

/// One decoded frame in RGB order.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Zero-based position in decode order.
    pub index: u64,
    image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    /// Build a frame from tightly packed RGB24 bytes.
    pub fn from_rgb(index: u64, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("failed to wrap RGB buffer"))?;
        Ok(Self { index, image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Resize to the working resolution. A frame that already matches is returned as-is.
    pub fn resized(self, width: u32, height: u32) -> Self {
        if self.image.width() == width && self.image.height() == height {
            return self;
        }
        let image = imageops::resize(&self.image, width, height, FilterType::Triangle);
        Self {
            index: self.index,
            image,
        }
    }

    /// Copy out the region covered by `bbox`, clamped to the frame bounds.
    pub fn crop(&self, bbox: &BoundingBox) -> Result<RgbImage> {
        let clamped = bbox
            .clamp_to(self.width(), self.height())
            .ok_or_else(|| anyhow!("crop region {:?} is empty inside frame bounds", bbox))?;
        Ok(imageops::crop_imm(
            &self.image,
            clamped.x1 as u32,
            clamped.y1 as u32,
            clamped.width(),
            clamped.height(),
        )
        .to_image())
    }

    /// Encode the frame as a baseline JPEG.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        encode_jpeg(&self.image, quality)
    }
}

/// Encode an RGB image as JPEG. Quality is clamped to 1..=100.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|err| anyhow!("JPEG encode failed: {err}"))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Frame {
        let image = RgbImage::from_fn(width, height, |x, y| image::Rgb([x as u8, y as u8, 7]));
        Frame::new(3, image)
    }

    #[test]
    fn from_rgb_rejects_short_buffers() {
        assert!(Frame::from_rgb(0, 4, 4, vec![0; 47]).is_err());
        assert!(Frame::from_rgb(0, 4, 4, vec![0; 48]).is_ok());
    }

    #[test]
    fn resize_keeps_index() {
        let frame = gradient(32, 24).resized(16, 12);
        assert_eq!(frame.index, 3);
        assert_eq!((frame.width(), frame.height()), (16, 12));
    }

    #[test]
    fn crop_is_clamped_to_frame() {
        let frame = gradient(32, 24);
        let crop = frame
            .crop(&BoundingBox::new(20, 10, 100, 100))
            .expect("crop");
        assert_eq!((crop.width(), crop.height()), (12, 14));
        assert_eq!(crop.get_pixel(0, 0), &image::Rgb([20, 10, 7]));
    }

    #[test]
    fn crop_outside_frame_fails() {
        let frame = gradient(32, 24);
        assert!(frame.crop(&BoundingBox::new(40, 40, 50, 50)).is_err());
        assert!(frame.crop(&BoundingBox::new(5, 5, 5, 9)).is_err());
    }

    #[test]
    fn encode_produces_jpeg_magic() {
        let jpeg = gradient(16, 16).encode_jpeg(90).expect("encode");
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
