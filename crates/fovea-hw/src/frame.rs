//! Frame and pixel-format types, plus raw-buffer unpacking helpers.

use serde::Serialize;
use std::time::Instant;

/// Shape of an image buffer: width, height, channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

impl Geometry {
    /// Bytes required for a tightly packed 8-bit buffer of this shape.
    pub fn required_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

/// Pixel layout of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PixelFormat {
    /// 1-channel 8-bit grayscale.
    Mono8,
    /// 3-channel 8-bit packed BGR — the pipeline's working format.
    Bgr8,
    /// 1-channel 16-bit signed.
    Mono16,
    /// 4-channel 8-bit packed RGBA.
    Rgba8,
    /// Packed YUV 4:2:2 as delivered by many UVC cameras. Camera-internal;
    /// has no egress encoding and must be unpacked before publishing.
    Yuyv,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Mono8 => 1,
            PixelFormat::Bgr8 => 3,
            PixelFormat::Mono16 => 2,
            PixelFormat::Rgba8 => 4,
            PixelFormat::Yuyv => 2,
        }
    }

    /// Egress encoding tag for this format. `None` means the format has no
    /// wire mapping and must never reach the publish path.
    pub fn encoding(&self) -> Option<&'static str> {
        match self {
            PixelFormat::Mono8 => Some("mono8"),
            PixelFormat::Bgr8 => Some("bgr8"),
            PixelFormat::Mono16 => Some("mono16"),
            PixelFormat::Rgba8 => Some("rgba8"),
            PixelFormat::Yuyv => None,
        }
    }
}

/// A captured camera frame.
///
/// Valid for one scheduler tick; the pipeline never retains a frame across
/// ticks.
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Bytes per row. Equals `width * bytes_per_pixel` when tightly packed.
    pub stride: u32,
    pub format: PixelFormat,
    pub timestamp: Instant,
    pub sequence: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Convert packed YUYV (4:2:2) to packed BGR8 using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; U and V are shared by
/// the pixel pair, so frames must have an even pixel count.
pub fn yuyv_to_bgr(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = width as usize * height as usize;
    let expected = pixels * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut bgr = Vec::with_capacity(pixels * 3);
    for pair in yuyv[..expected].chunks_exact(4) {
        let u = pair[1] as f32 - 128.0;
        let v = pair[3] as f32 - 128.0;
        for &y in &[pair[0], pair[2]] {
            let y = y as f32;
            let r = y + 1.402 * v;
            let g = y - 0.344136 * u - 0.714136 * v;
            let b = y + 1.772 * u;
            bgr.push(b.round().clamp(0.0, 255.0) as u8);
            bgr.push(g.round().clamp(0.0, 255.0) as u8);
            bgr.push(r.round().clamp(0.0, 255.0) as u8);
        }
    }
    Ok(bgr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_required_len() {
        let g = Geometry {
            width: 224,
            height: 224,
            channels: 3,
        };
        assert_eq!(g.required_len(), 150_528);
    }

    #[test]
    fn test_encoding_mapping_total_for_supported_formats() {
        assert_eq!(PixelFormat::Mono8.encoding(), Some("mono8"));
        assert_eq!(PixelFormat::Bgr8.encoding(), Some("bgr8"));
        assert_eq!(PixelFormat::Mono16.encoding(), Some("mono16"));
        assert_eq!(PixelFormat::Rgba8.encoding(), Some("rgba8"));
    }

    #[test]
    fn test_encoding_unmapped_for_camera_internal_format() {
        assert_eq!(PixelFormat::Yuyv.encoding(), None);
    }

    #[test]
    fn test_yuyv_to_bgr_neutral_gray() {
        // Two pixels, Y=128, U=V=128 (no chroma): gray stays gray.
        let yuyv = vec![128, 128, 128, 128];
        let bgr = yuyv_to_bgr(&yuyv, 2, 1).unwrap();
        assert_eq!(bgr, vec![128; 6]);
    }

    #[test]
    fn test_yuyv_to_bgr_luma_only() {
        // Neutral chroma, distinct luma per pixel of the pair.
        let yuyv = vec![100, 128, 200, 128];
        let bgr = yuyv_to_bgr(&yuyv, 2, 1).unwrap();
        assert_eq!(bgr, vec![100, 100, 100, 200, 200, 200]);
    }

    #[test]
    fn test_yuyv_to_bgr_chroma() {
        // Full-scale V with mid luma pushes red up and blue down.
        let yuyv = vec![128, 128, 128, 255];
        let bgr = yuyv_to_bgr(&yuyv, 2, 1).unwrap();
        let b = bgr[0] as i32;
        let g = bgr[1] as i32;
        let r = bgr[2] as i32;
        assert_eq!(b, 128);
        assert!(r > 200, "red should saturate upward, got {r}");
        assert!(g < 128, "green should drop, got {g}");
        // Both pixels of the pair share chroma.
        assert_eq!(&bgr[..3], &bgr[3..]);
    }

    #[test]
    fn test_yuyv_to_bgr_output_length() {
        let yuyv = vec![128u8; 4 * 2 * 2];
        let bgr = yuyv_to_bgr(&yuyv, 4, 2).unwrap();
        assert_eq!(bgr.len(), 4 * 2 * 3);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![128, 128]; // too short for 2x1
        assert!(yuyv_to_bgr(&yuyv, 2, 1).is_err());
    }
}
