use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use log::{debug, warn};

pub const DEFAULT_MAX_IMAGE_DIM: u32 = 1024;
const JPEG_QUALITY: u8 = 90;

/// A product photo ready to be sent inline: base64 body plus its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub mime_type: String,
    pub data: String,
}

impl CapturedImage {
    pub fn from_bytes(bytes: &[u8], mime_type: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: BASE64.encode(bytes),
        }
    }

    pub fn encoded_len(&self) -> usize {
        self.data.len()
    }
}

/// Loads a photo from disk, flattens transparency onto white, shrinks it to
/// `max_dim` on the longest side and re-encodes it as JPEG.
///
/// Files the `image` crate cannot decode are sent as-is.
pub fn capture_image(path: &Path, max_dim: u32) -> Result<CapturedImage> {
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    if bytes.is_empty() {
        bail!("{} is empty", path.display());
    }

    match image::load_from_memory(&bytes) {
        Ok(decoded) => {
            let jpeg = encode_jpeg(&decoded, max_dim.max(64))
                .with_context(|| format!("failed re-encoding {}", path.display()))?;
            debug!(
                "captured {} ({} bytes -> {} bytes jpeg)",
                path.display(),
                bytes.len(),
                jpeg.len()
            );
            Ok(CapturedImage::from_bytes(&jpeg, "image/jpeg"))
        }
        Err(err) => {
            warn!(
                "could not decode {} ({err}); sending raw bytes",
                path.display()
            );
            Ok(CapturedImage::from_bytes(&bytes, guess_image_mime(path)))
        }
    }
}

/// Photo that is already encoded (camera frame, clipboard paste). No re-encoding.
pub fn capture_image_bytes(bytes: &[u8], mime_type: &str) -> Result<CapturedImage> {
    if bytes.is_empty() {
        bail!("captured image is empty");
    }
    let mime_type = mime_type.trim();
    if !mime_type.starts_with("image/") {
        bail!("unsupported capture type {mime_type:?}");
    }
    Ok(CapturedImage::from_bytes(bytes, mime_type))
}

fn encode_jpeg(image: &DynamicImage, max_dim: u32) -> Result<Vec<u8>> {
    let rgba = image.to_rgba8();
    let mut flattened = RgbaImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend =
            |channel: u8| -> u8 { (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8 };
        flattened.put_pixel(
            x,
            y,
            Rgba([blend(pixel[0]), blend(pixel[1]), blend(pixel[2]), 255]),
        );
    }
    let mut flat = DynamicImage::ImageRgba8(flattened);
    let (width, height) = flat.dimensions();
    if width.max(height) > max_dim {
        flat = flat.resize(max_dim, max_dim, FilterType::Triangle);
    }

    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
    encoder.encode_image(&flat.to_rgb8())?;
    Ok(bytes)
}

fn guess_image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "heif" => "image/heif",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use base64::Engine as _;
    use image::{GenericImageView, Rgba, RgbaImage};

    use super::{capture_image, capture_image_bytes, guess_image_mime, CapturedImage, BASE64};

    #[test]
    fn large_png_is_downscaled_to_jpeg() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("phone.png");
        RgbaImage::from_pixel(300, 150, Rgba([10, 20, 30, 128])).save(&path)?;

        let captured = capture_image(&path, 100)?;
        assert_eq!(captured.mime_type, "image/jpeg");

        let jpeg = BASE64.decode(captured.data.as_bytes())?;
        let decoded = image::load_from_memory(&jpeg)?;
        assert_eq!(decoded.dimensions(), (100, 50));
        Ok(())
    }

    #[test]
    fn small_image_keeps_its_size() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("shoe.png");
        RgbaImage::from_pixel(80, 60, Rgba([200, 0, 0, 255])).save(&path)?;

        let captured = capture_image(&path, 1024)?;
        let decoded = image::load_from_memory(&BASE64.decode(captured.data.as_bytes())?)?;
        assert_eq!(decoded.dimensions(), (80, 60));
        Ok(())
    }

    #[test]
    fn undecodable_file_is_sent_raw() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("photo.webp");
        std::fs::write(&path, b"not really an image")?;

        let captured = capture_image(&path, 1024)?;
        assert_eq!(captured.mime_type, "image/webp");
        assert_eq!(BASE64.decode(captured.data.as_bytes())?, b"not really an image");
        Ok(())
    }

    #[test]
    fn missing_or_empty_file_is_an_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        assert!(capture_image(&temp.path().join("nope.jpg"), 1024).is_err());
        let empty = temp.path().join("empty.jpg");
        std::fs::write(&empty, b"")?;
        assert!(capture_image(&empty, 1024).is_err());
        Ok(())
    }

    #[test]
    fn mime_guess_defaults_to_jpeg() {
        assert_eq!(guess_image_mime(Path::new("a.PNG")), "image/png");
        assert_eq!(guess_image_mime(Path::new("a")), "image/jpeg");
        assert_eq!(
            CapturedImage::from_bytes(b"abc", "image/png").data,
            "YWJj".to_string()
        );
    }

    #[test]
    fn encoded_bytes_pass_through_untouched() -> anyhow::Result<()> {
        let captured = capture_image_bytes(b"\xff\xd8frame", " image/jpeg ")?;
        assert_eq!(captured.mime_type, "image/jpeg");
        assert_eq!(BASE64.decode(captured.data.as_bytes())?, b"\xff\xd8frame");
        assert!(capture_image_bytes(b"", "image/jpeg").is_err());
        assert!(capture_image_bytes(b"text", "text/plain").is_err());
        Ok(())
    }
}
