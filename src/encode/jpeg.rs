use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::error::{RenderError, RenderResult};
use crate::render::canvas::Canvas;

pub const DEFAULT_QUALITY: u8 = 95;

/// One compressed frame and its position in the render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedFrame {
    pub index: usize,
    pub jpeg: Vec<u8>,
}

impl EncodedFrame {
    /// `data:image/jpeg;base64,...` form used by the frame upload endpoint.
    pub fn data_url(&self) -> String {
        format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.jpeg)
        )
    }
}

/// Compress an opaque canvas as baseline JPEG.
pub fn encode_jpeg(canvas: &Canvas, index: usize, quality: u8) -> RenderResult<EncodedFrame> {
    let rgb = canvas.to_rgb_bytes();
    let mut jpeg = Vec::with_capacity(rgb.len() / 8);
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .write_image(&rgb, canvas.width(), canvas.height(), ExtendedColorType::Rgb8)
        .map_err(|e| RenderError::upload(index, format!("JPEG encoding failed: {}", e)))?;
    Ok(EncodedFrame { index, jpeg })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::canvas::Color;

    #[test]
    fn encodes_decodable_jpeg() {
        let mut canvas = Canvas::new(64, 48);
        for y in 8..40 {
            for x in 16..48 {
                canvas.blend(x, y, Color::rgb(200, 40, 40), 1.0);
            }
        }
        let frame = encode_jpeg(&canvas, 7, DEFAULT_QUALITY).unwrap();
        assert_eq!(frame.index, 7);
        assert_eq!(&frame.jpeg[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&frame.jpeg).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (64, 48));
        let centre = decoded.get_pixel(32, 24).0;
        assert!(centre[0] > 170 && centre[1] < 80, "{:?}", centre);
    }

    #[test]
    fn data_url_is_base64_jpeg() {
        let frame = EncodedFrame {
            index: 0,
            jpeg: vec![0xFF, 0xD8, 0xFF],
        };
        assert_eq!(frame.data_url(), "data:image/jpeg;base64,/9j/");
    }
}
