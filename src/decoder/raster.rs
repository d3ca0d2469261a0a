//! # Raster decoder
//!
//! ## Design
//!
//! A [`Decoder`] over the `image` crate for ordinary single-resolution codecs
//! (PNG, JPEG, ...). It reports zero decomposition levels, which the tiered
//! loader rounds up to one, so only requests for tier 0 make sense against it.
//!
//! These codecs cannot render a truncated body. In progressive mode the first
//! fragment that is not the complete file fails the pass, and the request ends
//! with a single `decode` failure. Progressive loading needs an engine that
//! decodes partial bitstreams; with this one it only succeeds when the whole
//! body arrives as one fragment.
//!
//! ## Implementation
//!
//! 1. Signature probe (`infer`) rejects non-image bytes early
//! 2. Header-only dimension read, checked against the pixel budget
//! 3. Full decode into the native pixel layout

use std::io::Cursor;

use image::{DynamicImage, GenericImageView, ImageReader};

use super::{Decoder, FrameInfo};
use crate::error::LoadError;

pub struct RasterDecoder {
    encoded: Vec<u8>,
    frame_info: FrameInfo,
    pixels: Vec<u8>,
    max_decoded_pixels: u64,
}

impl RasterDecoder {
    pub fn new(max_decoded_pixels: u64) -> Self {
        Self {
            encoded: Vec::new(),
            frame_info: FrameInfo::default(),
            pixels: Vec::new(),
            max_decoded_pixels,
        }
    }

    fn validate_signature(bytes: &[u8]) -> Result<(), LoadError> {
        if bytes.is_empty() {
            return Err(LoadError::Decode("encoded buffer is empty".to_string()));
        }

        let kind = infer::get(bytes)
            .ok_or_else(|| LoadError::Decode("unrecognized image signature".to_string()))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(LoadError::Decode(format!(
                "signature is not an image: {}",
                kind.mime_type()
            )));
        }

        Ok(())
    }

    fn validate_pixel_limits(&self, width: u32, height: u32) -> Result<(), LoadError> {
        let pixels = u64::from(width)
            .checked_mul(u64::from(height))
            .ok_or_else(|| LoadError::ResourceLimit("pixel count overflow".to_string()))?;

        if pixels > self.max_decoded_pixels {
            return Err(LoadError::ResourceLimit(format!(
                "image too large: {} pixels (limit {})",
                pixels, self.max_decoded_pixels
            )));
        }

        Ok(())
    }

    fn describe(image: &DynamicImage) -> FrameInfo {
        let color = image.color();
        let components = color.channel_count();
        let bits_per_sample = color.bits_per_pixel() / u16::from(components.max(1));

        let (width, height) = image.dimensions();

        FrameInfo {
            width,
            height,
            bits_per_sample: bits_per_sample as u8,
            component_count: components,
            is_signed: false,
            is_using_color_transform: false,
        }
    }
}

impl Decoder for RasterDecoder {
    fn encoded_buffer(&mut self, size: usize) -> &mut [u8] {
        self.encoded.clear();
        self.encoded.resize(size, 0);
        self.pixels.clear();
        self.frame_info = FrameInfo::default();
        &mut self.encoded
    }

    fn read_header(&mut self) -> Result<(), LoadError> {
        Self::validate_signature(&self.encoded)?;

        let (width, height) = ImageReader::new(Cursor::new(&self.encoded))
            .with_guessed_format()
            .map_err(|e| LoadError::Decode(format!("cannot detect image format: {}", e)))?
            .into_dimensions()
            .map_err(|e| LoadError::Decode(format!("cannot read image header: {}", e)))?;

        self.validate_pixel_limits(width, height)?;
        self.frame_info.width = width;
        self.frame_info.height = height;
        Ok(())
    }

    fn decode(&mut self) -> Result<(), LoadError> {
        let image = image::load_from_memory(&self.encoded)
            .map_err(|e| LoadError::Decode(format!("image decode failed: {}", e)))?;

        self.frame_info = Self::describe(&image);
        self.pixels = image.into_bytes();

        log::debug!(
            "🖼️ raster decode {}x{} components={} bits={}",
            self.frame_info.width,
            self.frame_info.height,
            self.frame_info.component_count,
            self.frame_info.bits_per_sample
        );

        Ok(())
    }

    fn frame_info(&self) -> FrameInfo {
        self.frame_info
    }

    fn decoded_buffer(&self) -> &[u8] {
        &self.pixels
    }

    fn decomposition_levels(&self) -> u32 {
        0
    }

    fn encoded_size_at_level(&self, _level_from_top: u32) -> u64 {
        self.encoded.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DecoderHandle;
    use image::{ImageBuffer, ImageFormat, Rgba};

    fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let r = (x % 255) as u8;
            let g = (y % 255) as u8;
            let b = ((x + y) % 255) as u8;
            Rgba([r, g, b, 255])
        });

        let dyn_img = DynamicImage::ImageRgba8(img);
        let mut cursor = Cursor::new(Vec::new());
        dyn_img
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    #[tokio::test]
    async fn decodes_png_through_handle() {
        let handle = DecoderHandle::new(RasterDecoder::new(1_000_000));
        let png = create_png_bytes(16, 8);

        let frame = handle.decode(&png, true).await.expect("png should decode");

        assert_eq!(frame.frame_info.width, 16);
        assert_eq!(frame.frame_info.height, 8);
        assert_eq!(frame.frame_info.component_count, 4);
        assert_eq!(frame.frame_info.bits_per_sample, 8);
        assert_eq!(frame.pixels.len(), 16 * 8 * 4);
        assert_eq!(frame.encoded_size, png.len());
        assert_eq!(frame.decomposition_levels, 0);

        let table = frame.level_sizes.expect("table requested");
        assert_eq!(table.len(), 1);
        assert_eq!(table[&0], png.len() as u64);
    }

    #[tokio::test]
    async fn rejects_non_image_payload() {
        let handle = DecoderHandle::new(RasterDecoder::new(1_000_000));
        let result = handle.decode(b"<html><body>nope</body></html>", false).await;

        assert!(matches!(result, Err(LoadError::Decode(_))));
    }

    #[tokio::test]
    async fn rejects_frames_over_pixel_budget() {
        let handle = DecoderHandle::new(RasterDecoder::new(100));
        let result = handle.decode(&create_png_bytes(20, 20), false).await;

        assert!(matches!(result, Err(LoadError::ResourceLimit(_))));
    }

    #[tokio::test]
    async fn truncated_png_fails_decode() {
        let handle = DecoderHandle::new(RasterDecoder::new(1_000_000));
        let png = create_png_bytes(32, 32);

        let result = handle.decode(&png[..png.len() / 2], false).await;
        assert!(result.is_err());
    }
}
