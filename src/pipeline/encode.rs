//! Raster encoding for the image-mode extraction fallback.
//!
//! Only reached when the text layer is empty or text-mode extraction failed,
//! which in practice means scanned or image-only résumés. The first page is
//! PNG-encoded (lossless keeps small print legible) and sent with
//! `detail: "high"` so the model gets the full tile budget.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Longest edge sent to the service; larger renders are downscaled.
pub const MAX_EDGE_PX: u32 = 2000;

/// Encode a rendered page as a base64 PNG ready for the vision call.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let resized;
    let img = if img.width().max(img.height()) > MAX_EDGE_PX {
        resized = img.resize(MAX_EDGE_PX, MAX_EDGE_PX, image::imageops::FilterType::Triangle);
        &resized
    } else {
        img
    };

    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} page → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encodes_png() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert!(decoded.starts_with(b"\x89PNG"));
    }

    #[test]
    fn oversized_pages_are_downscaled() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4000, 100, Rgba([0, 0, 0, 255])));
        let data = encode_page(&img).expect("encode");
        let png = STANDARD.decode(&data.data).expect("base64");
        let back = image::load_from_memory(&png).expect("decode");
        assert_eq!(back.width(), MAX_EDGE_PX);
    }
}
