//! Turning pixel buffers into portable encoded images.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::rendering::PixelBuffer;
use crate::{Error, Result};

/// Quality used for lossy output when the requested one is out of range.
pub const DEFAULT_JPEG_QUALITY: f32 = 0.92;

/// Output encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    /// Lossless WebP
    Webp,
}

impl ImageFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Webp => "webp",
        }
    }

    /// Only lossy formats honor a quality setting.
    pub fn is_lossy(&self) -> bool {
        matches!(self, ImageFormat::Jpeg)
    }

    fn image_format(&self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Webp => image::ImageFormat::WebP,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" | "image/png" => Ok(ImageFormat::Png),
            "jpeg" | "jpg" | "image/jpeg" => Ok(ImageFormat::Jpeg),
            "webp" | "image/webp" => Ok(ImageFormat::Webp),
            other => Err(Error::Config(format!("unsupported image format `{other}`"))),
        }
    }
}

/// Quality on the encoder's 1-100 scale, `None` for formats that ignore it.
pub fn encoder_quality(format: ImageFormat, quality: f32) -> Option<u8> {
    if !format.is_lossy() {
        return None;
    }
    let q = if quality.is_finite() && quality > 0.0 && quality <= 1.0 {
        quality
    } else {
        DEFAULT_JPEG_QUALITY
    };
    Some((q * 100.0).round().clamp(1.0, 100.0) as u8)
}

/// Encoded bytes plus the format they are declared as.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Vec<u8>,
    format: ImageFormat,
    width: u32,
    height: u32,
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl EncodedImage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn mime(&self) -> &'static str {
        self.format.mime()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `<stem>.<extension>`
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.format.extension())
    }

    /// Lowercase hex SHA-256 of the encoded bytes.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }

    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime(),
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }

    /// Parses a base64 data URL produced by [`EncodedImage::to_data_url`].
    pub fn from_data_url(url: &str) -> Result<Self> {
        let invalid = |why: &str| Error::EncodingFailed(format!("invalid image data url: {why}"));
        let rest = url.strip_prefix("data:").ok_or_else(|| invalid("missing scheme"))?;
        let (meta, payload) = rest.split_once(',').ok_or_else(|| invalid("missing payload"))?;
        let mime = meta.strip_suffix(";base64").ok_or_else(|| invalid("not base64"))?;
        let format = ImageFormat::from_str(mime).map_err(|_| invalid("unsupported mime type"))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| invalid(&e.to_string()))?;
        let decoded = image::load_from_memory_with_format(&bytes, format.image_format())
            .map_err(|e| invalid(&e.to_string()))?;
        Ok(Self {
            width: decoded.width(),
            height: decoded.height(),
            bytes,
            format,
        })
    }

    /// Decodes back to straight-alpha pixels.
    pub fn decode(&self) -> Result<RgbaImage> {
        image::load_from_memory_with_format(&self.bytes, self.format.image_format())
            .map(|img| img.to_rgba8())
            .map_err(|e| Error::EncodingFailed(format!("cannot decode {}: {}", self.mime(), e)))
    }
}

/// Encodes off the event loop. Quality is used for lossy formats only.
pub async fn encode(buffer: &PixelBuffer, format: ImageFormat, quality: f32) -> Result<EncodedImage> {
    let (width, height) = (buffer.width(), buffer.height());
    let pixels = match format {
        // Premultiplied channels are the composite over black, which is
        // what a surface without alpha shows.
        ImageFormat::Jpeg => buffer.data().chunks_exact(4).flat_map(|p| [p[0], p[1], p[2]]).collect(),
        _ => buffer.to_rgba(),
    };
    tokio::task::spawn_blocking(move || encode_pixels(&pixels, width, height, format, quality))
        .await
        .map_err(|e| Error::EncodingFailed(format!("encoder task failed: {e}")))?
}

/// Synchronous encoder. `pixels` is RGB for JPEG and straight RGBA otherwise.
pub fn encode_pixels(pixels: &[u8], width: u32, height: u32, format: ImageFormat, quality: f32) -> Result<EncodedImage> {
    let mut out = Cursor::new(Vec::new());
    let result = match format {
        ImageFormat::Png => PngEncoder::new(&mut out).write_image(pixels, width, height, ExtendedColorType::Rgba8),
        ImageFormat::Jpeg => {
            let q = encoder_quality(format, quality).unwrap_or(92);
            JpegEncoder::new_with_quality(&mut out, q).write_image(pixels, width, height, ExtendedColorType::Rgb8)
        }
        ImageFormat::Webp => {
            WebPEncoder::new_lossless(&mut out).write_image(pixels, width, height, ExtendedColorType::Rgba8)
        }
    };
    result.map_err(|e| Error::EncodingFailed(format!("{} encoder: {}", format, e)))?;
    let bytes = out.into_inner();
    if bytes.is_empty() {
        return Err(Error::EncodingFailed(format!("{} encoder produced no data", format)));
    }
    Ok(EncodedImage {
        bytes,
        format,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::Color;

    fn noisy_buffer() -> PixelBuffer {
        let mut buffer = PixelBuffer::with_background(64.0, 64.0, 1.0, Some(Color::WHITE)).unwrap();
        let data = buffer.pixmap_mut().data_mut();
        let mut seed: u32 = 7;
        for px in data.chunks_exact_mut(4) {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            px[0] = (seed >> 16) as u8;
            px[1] = (seed >> 8) as u8;
        }
        buffer
    }

    #[tokio::test]
    async fn encodes_each_format_with_magic_bytes() {
        let buffer = PixelBuffer::with_background(20.0, 10.0, 1.0, Some(Color::rgb(1, 2, 3))).unwrap();
        let png = encode(&buffer, ImageFormat::Png, 1.0).await.unwrap();
        assert_eq!(&png.bytes()[..4], b"\x89PNG");
        assert_eq!(png.mime(), "image/png");
        assert_eq!((png.width(), png.height()), (20, 10));

        let jpeg = encode(&buffer, ImageFormat::Jpeg, 0.8).await.unwrap();
        assert_eq!(&jpeg.bytes()[..2], &[0xFF, 0xD8]);

        let webp = encode(&buffer, ImageFormat::Webp, 0.1).await.unwrap();
        assert_eq!(&webp.bytes()[..4], b"RIFF");
        assert_eq!(&webp.bytes()[8..12], b"WEBP");
    }

    #[tokio::test]
    async fn quality_only_affects_lossy_output() {
        let buffer = noisy_buffer();
        let low = encode(&buffer, ImageFormat::Jpeg, 0.1).await.unwrap();
        let high = encode(&buffer, ImageFormat::Jpeg, 1.0).await.unwrap();
        assert!(low.len() < high.len());

        let a = encode(&buffer, ImageFormat::Png, 0.1).await.unwrap();
        let b = encode(&buffer, ImageFormat::Png, 1.0).await.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn out_of_range_quality_uses_default() {
        assert_eq!(encoder_quality(ImageFormat::Jpeg, 0.5), Some(50));
        assert_eq!(encoder_quality(ImageFormat::Jpeg, 0.0), Some(92));
        assert_eq!(encoder_quality(ImageFormat::Jpeg, 7.0), Some(92));
        assert_eq!(encoder_quality(ImageFormat::Jpeg, f32::NAN), Some(92));
        assert_eq!(encoder_quality(ImageFormat::Png, 0.5), None);
    }

    #[test]
    fn data_url_round_trip() {
        let buffer = PixelBuffer::with_background(3.0, 2.0, 1.0, Some(Color::rgb(200, 100, 50))).unwrap();
        let image = encode_pixels(&buffer.to_rgba(), 3, 2, ImageFormat::Png, 1.0).unwrap();
        let url = image.to_data_url();
        assert!(url.starts_with("data:image/png;base64,iVBOR"));
        let back = EncodedImage::from_data_url(&url).unwrap();
        assert_eq!(back, image);
        let pixels = back.decode().unwrap();
        assert_eq!(pixels.get_pixel(2, 1).0, [200, 100, 50, 255]);
        assert!(EncodedImage::from_data_url("data:text/plain;base64,AAAA").is_err());
    }

    #[test]
    fn names_and_digests() {
        let image = encode_pixels(&[0, 0, 0, 255], 1, 1, ImageFormat::Png, 1.0).unwrap();
        assert_eq!(image.file_name("screenshot"), "screenshot.png");
        assert_eq!(image.digest().len(), 64);
        assert_eq!(image.digest(), image.clone().digest());
        assert_eq!("JPG".parse::<ImageFormat>().unwrap(), ImageFormat::Jpeg);
        assert!("gif".parse::<ImageFormat>().is_err());
    }
}
