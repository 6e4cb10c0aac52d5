//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame, PixelFormat};
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Anything the pipeline scheduler can pull frames from.
///
/// `Ok(None)` means the device had nothing ready this tick. It is not an
/// error; the tick is silently skipped. Retry policy belongs to the
/// scheduler, never to the source.
pub trait FrameSource {
    fn acquire(&mut self) -> Result<Option<Frame>, CameraError>;
}

/// Wire format negotiated with the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    /// Packed 24-bit BGR, passed through.
    Bgr3,
    /// Packed YUYV 4:2:2, unpacked to BGR at acquire time.
    Yuyv,
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    source_format: SourceFormat,
}

impl Camera {
    /// Open `/dev/video{index}` and negotiate a capture format.
    ///
    /// The requested resolution is a best-effort hint; the driver's
    /// negotiated geometry is read back and must not be assumed. Downstream
    /// conversion tolerates the mismatch.
    pub fn open(index: u32, width_hint: u32, height_hint: u32) -> Result<Self, CameraError> {
        let device_path = format!("/dev/video{index}");
        if !Path::new(&device_path).exists() {
            return Err(CameraError::DeviceUnavailable(device_path));
        }

        let device = Device::with_path(&device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceUnavailable(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::DeviceUnavailable(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = %device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        // Request packed BGR at the hinted resolution. Drivers that cannot
        // deliver BGR3 get a second request for YUYV, the common UVC default.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        fmt.width = width_hint;
        fmt.height = height_hint;
        fmt.fourcc = FourCC::new(b"BGR3");

        let mut negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        if negotiated.fourcc != FourCC::new(b"BGR3") {
            fmt.fourcc = FourCC::new(b"YUYV");
            negotiated = device.set_format(&fmt).map_err(|e| {
                CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
            })?;
        }

        let source_format = if negotiated.fourcc == FourCC::new(b"BGR3") {
            SourceFormat::Bgr3
        } else if negotiated.fourcc == FourCC::new(b"YUYV") {
            SourceFormat::Yuyv
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need BGR3 or YUYV)",
                negotiated.fourcc
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path,
            fourcc: negotiated.fourcc,
            source_format,
        })
    }

    /// Dequeue one buffer and unpack it to a packed BGR8 frame.
    fn capture_bgr(&self) -> Result<Option<Frame>, CameraError> {
        let mut stream =
            MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4).map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        if meta.bytesused == 0 {
            // Some drivers emit empty buffers while the sensor settles.
            return Ok(None);
        }

        let pixels = self.width as usize * self.height as usize;
        let data = match self.source_format {
            SourceFormat::Bgr3 => {
                let expected = pixels * 3;
                if buf.len() < expected {
                    return Err(CameraError::CaptureFailed(format!(
                        "BGR3 buffer too short: expected {expected}, got {}",
                        buf.len()
                    )));
                }
                buf[..expected].to_vec()
            }
            SourceFormat::Yuyv => frame::yuyv_to_bgr(buf, self.width, self.height)
                .map_err(|e| CameraError::CaptureFailed(format!("YUYV conversion failed: {e}")))?,
        };

        Ok(Some(Frame {
            data,
            width: self.width,
            height: self.height,
            stride: self.width * 3,
            format: PixelFormat::Bgr8,
            timestamp: Instant::now(),
            sequence: meta.sequence,
        }))
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

impl FrameSource for Camera {
    fn acquire(&mut self) -> Result<Option<Frame>, CameraError> {
        self.capture_bgr()
    }
}
