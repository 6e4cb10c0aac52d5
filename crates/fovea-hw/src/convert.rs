//! Combined resize + format normalization into the negotiated tensor buffer.
//!
//! Source and destination are wrapped as region descriptors and checked for
//! compatibility before every conversion. The check is not optional: the
//! destination geometry is fixed at startup, but source frame geometry may
//! change from tick to tick.

use crate::frame::{Frame, Geometry, PixelFormat};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("incompatible source/destination: {0}")]
    IncompatibleFormat(String),
    #[error("destination buffer allocation failed ({0} bytes)")]
    Allocation(usize),
}

/// Fixed destination buffer sized to the negotiated input geometry.
///
/// Allocated once at startup, reused on every tick, freed at teardown.
#[derive(Debug)]
pub struct ResizeBuffer {
    data: Vec<u8>,
    geometry: Geometry,
    format: PixelFormat,
}

impl ResizeBuffer {
    /// Allocate a destination buffer for the given geometry.
    ///
    /// The working format is packed BGR8, so the geometry must be 3-channel;
    /// anything else is rejected here rather than failing on every tick.
    pub fn new(geometry: Geometry) -> Result<Self, ConvertError> {
        if geometry.channels != 3 {
            return Err(ConvertError::IncompatibleFormat(format!(
                "destination must be 3-channel packed BGR8, model wants {} channels",
                geometry.channels
            )));
        }
        let len = geometry.required_len();
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| ConvertError::Allocation(len))?;
        data.resize(len, 0);
        Ok(Self {
            data,
            geometry,
            format: PixelFormat::Bgr8,
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Bytes per destination row (tightly packed).
    pub fn stride(&self) -> u32 {
        self.geometry.width * self.geometry.channels
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn region(&self) -> Region {
        Region {
            width: self.geometry.width,
            height: self.geometry.height,
            stride: self.stride(),
            format: self.format,
            len: self.data.len(),
        }
    }
}

/// Geometry and layout of one side of a conversion.
#[derive(Debug, Clone, Copy)]
pub struct Region {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
    pub len: usize,
}

impl Region {
    fn of_frame(frame: &Frame) -> Region {
        Region {
            width: frame.width,
            height: frame.height,
            stride: frame.stride,
            format: frame.format,
            len: frame.data.len(),
        }
    }
}

/// Transient source/destination pairing, rebuilt for every conversion.
/// Never holds buffer pointers across ticks.
#[derive(Debug, Clone, Copy)]
pub struct Descriptor {
    pub src: Region,
    pub dst: Region,
}

impl Descriptor {
    /// Compatibility check. A passing check is the precondition for touching
    /// the destination buffer.
    pub fn check(&self) -> Result<(), ConvertError> {
        for (side, r) in [("source", &self.src), ("destination", &self.dst)] {
            if r.width == 0 || r.height == 0 {
                return Err(ConvertError::IncompatibleFormat(format!(
                    "{side} region is empty: {}x{}",
                    r.width, r.height
                )));
            }
        }

        if self.src.format != PixelFormat::Bgr8 || self.dst.format != PixelFormat::Bgr8 {
            return Err(ConvertError::IncompatibleFormat(format!(
                "conversion requires packed BGR8 on both sides, got {:?} -> {:?}",
                self.src.format, self.dst.format
            )));
        }

        let src_row = self.src.width as usize * self.src.format.bytes_per_pixel();
        if (self.src.stride as usize) < src_row {
            return Err(ConvertError::IncompatibleFormat(format!(
                "source stride {} shorter than row of {} bytes",
                self.src.stride, src_row
            )));
        }

        let src_min = self.src.stride as usize * (self.src.height as usize - 1) + src_row;
        if self.src.len < src_min {
            return Err(ConvertError::IncompatibleFormat(format!(
                "source buffer too short: need at least {src_min} bytes, got {}",
                self.src.len
            )));
        }

        let dst_expected = self.dst.stride as usize * self.dst.height as usize;
        if self.dst.len != dst_expected {
            return Err(ConvertError::IncompatibleFormat(format!(
                "destination buffer is {} bytes, geometry requires {dst_expected}",
                self.dst.len
            )));
        }

        Ok(())
    }
}

/// Resize + normalize `frame` into `dst` in one pass.
///
/// Identity geometry degenerates to a row copy, preserving bytes exactly.
/// The destination is never mutated unless the descriptor check passes;
/// incompatibility is reported to the caller, which owns the failure policy.
pub fn convert(frame: &Frame, dst: &mut ResizeBuffer) -> Result<(), ConvertError> {
    let desc = Descriptor {
        src: Region::of_frame(frame),
        dst: dst.region(),
    };
    desc.check()?;

    if frame.width == dst.geometry.width && frame.height == dst.geometry.height {
        copy_rows(frame, dst);
    } else {
        resize_bilinear(frame, dst);
    }
    Ok(())
}

/// Identity-geometry path: copy row payloads, dropping any source padding.
fn copy_rows(frame: &Frame, dst: &mut ResizeBuffer) {
    let row = frame.width as usize * 3;
    let sstride = frame.stride as usize;
    for y in 0..frame.height as usize {
        let src = &frame.data[y * sstride..y * sstride + row];
        dst.data[y * row..(y + 1) * row].copy_from_slice(src);
    }
}

/// Bilinear resize of interleaved BGR, sub-pixel centered sampling.
fn resize_bilinear(frame: &Frame, dst: &mut ResizeBuffer) {
    let sw = frame.width as usize;
    let sh = frame.height as usize;
    let sstride = frame.stride as usize;
    let dw = dst.geometry.width as usize;
    let dh = dst.geometry.height as usize;
    let ch = dst.geometry.channels as usize;

    let x_ratio = sw as f32 / dw as f32;
    let y_ratio = sh as f32 / dh as f32;

    for y in 0..dh {
        let src_y = (y as f32 + 0.5) * y_ratio - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, sh as i32 - 1) as usize;
        let y1 = (y0 + 1).min(sh - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..dw {
            let src_x = (x as f32 + 0.5) * x_ratio - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, sw as i32 - 1) as usize;
            let x1 = (x0 + 1).min(sw - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            for c in 0..ch {
                let tl = frame.data[y0 * sstride + x0 * ch + c] as f32;
                let tr = frame.data[y0 * sstride + x1 * ch + c] as f32;
                let bl = frame.data[y1 * sstride + x0 * ch + c] as f32;
                let br = frame.data[y1 * sstride + x1 * ch + c] as f32;

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                dst.data[(y * dw + x) * ch + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn bgr_frame(width: u32, height: u32, data: Vec<u8>) -> Frame {
        Frame {
            stride: width * 3,
            data,
            width,
            height,
            format: PixelFormat::Bgr8,
            timestamp: Instant::now(),
            sequence: 0,
        }
    }

    fn geo(width: u32, height: u32) -> Geometry {
        Geometry {
            width,
            height,
            channels: 3,
        }
    }

    #[test]
    fn test_identity_conversion_is_byte_exact() {
        let data: Vec<u8> = (0..4 * 4 * 3).map(|i| i as u8).collect();
        let frame = bgr_frame(4, 4, data.clone());
        let mut dst = ResizeBuffer::new(geo(4, 4)).unwrap();

        convert(&frame, &mut dst).unwrap();
        assert_eq!(dst.as_slice(), &data[..]);
    }

    #[test]
    fn test_identity_conversion_drops_row_padding() {
        // 2x2 BGR with 2 bytes of padding per row.
        let mut frame = bgr_frame(2, 2, Vec::new());
        frame.stride = 8;
        frame.data = vec![
            1, 2, 3, 4, 5, 6, 0xAA, 0xAA, // row 0 + padding
            7, 8, 9, 10, 11, 12, 0xAA, 0xAA, // row 1 + padding
        ];
        let mut dst = ResizeBuffer::new(geo(2, 2)).unwrap();

        convert(&frame, &mut dst).unwrap();
        assert_eq!(dst.as_slice(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn test_upscale_produces_required_len() {
        let frame = bgr_frame(2, 2, vec![77; 2 * 2 * 3]);
        let mut dst = ResizeBuffer::new(geo(8, 8)).unwrap();

        convert(&frame, &mut dst).unwrap();
        assert_eq!(dst.as_slice().len(), dst.geometry().required_len());
        // Uniform input stays uniform through bilinear sampling.
        assert!(dst.as_slice().iter().all(|&p| p == 77));
    }

    #[test]
    fn test_downscale_produces_required_len() {
        let frame = bgr_frame(8, 8, vec![31; 8 * 8 * 3]);
        let mut dst = ResizeBuffer::new(geo(4, 4)).unwrap();

        convert(&frame, &mut dst).unwrap();
        assert_eq!(dst.as_slice().len(), 4 * 4 * 3);
        assert!(dst.as_slice().iter().all(|&p| p == 31));
    }

    #[test]
    fn test_failed_check_never_mutates_destination() {
        let good = bgr_frame(4, 4, vec![200; 4 * 4 * 3]);
        let mut dst = ResizeBuffer::new(geo(4, 4)).unwrap();
        convert(&good, &mut dst).unwrap();
        let snapshot = dst.as_slice().to_vec();

        // Wrong source format.
        let mut bad = bgr_frame(4, 4, vec![0; 4 * 4 * 2]);
        bad.format = PixelFormat::Yuyv;
        bad.stride = 8;
        assert!(convert(&bad, &mut dst).is_err());
        assert_eq!(dst.as_slice(), &snapshot[..]);

        // Short source buffer.
        let truncated = bgr_frame(4, 4, vec![0; 10]);
        assert!(convert(&truncated, &mut dst).is_err());
        assert_eq!(dst.as_slice(), &snapshot[..]);
    }

    #[test]
    fn test_empty_region_rejected() {
        let frame = bgr_frame(0, 4, Vec::new());
        let mut dst = ResizeBuffer::new(geo(4, 4)).unwrap();
        assert!(matches!(
            convert(&frame, &mut dst),
            Err(ConvertError::IncompatibleFormat(_))
        ));
    }

    #[test]
    fn test_stride_shorter_than_row_rejected() {
        let mut frame = bgr_frame(4, 4, vec![0; 4 * 4 * 3]);
        frame.stride = 4; // row needs 12 bytes
        let mut dst = ResizeBuffer::new(geo(4, 4)).unwrap();
        assert!(convert(&frame, &mut dst).is_err());
    }

    #[test]
    fn test_resize_buffer_rejects_non_bgr_channel_count() {
        let err = ResizeBuffer::new(Geometry {
            width: 4,
            height: 4,
            channels: 1,
        })
        .unwrap_err();
        assert!(matches!(err, ConvertError::IncompatibleFormat(_)));
    }

    #[test]
    fn test_resize_buffer_sized_to_geometry() {
        let dst = ResizeBuffer::new(geo(224, 224)).unwrap();
        assert_eq!(dst.as_slice().len(), 150_528);
        assert_eq!(dst.stride(), 224 * 3);
    }
}
