//! Live cameras through Video4Linux2.
//!
//! Devices are asked for MJPEG at the session resolution. Drivers that
//! refuse MJPEG usually settle on YUYV, which is converted here; any other
//! pixel format is rejected at open time.

use std::io;

use image::{ImageFormat, RgbImage};
use tracing::{debug, info};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::{CameraFeed, CaptureError};
use crate::frame::{CameraId, Frame};

/// Buffers mapped per stream.
const BUFFER_COUNT: u32 = 4;

const MJPG: &[u8; 4] = b"MJPG";
const YUYV: &[u8; 4] = b"YUYV";

/// One V4L2 capture device, e.g. `/dev/video0` for index 0.
pub struct DeviceCamera {
    camera: CameraId,
    index: usize,
    width: u32,
    height: u32,
    fourcc: FourCC,
    stream: Stream<'static>,
}

impl DeviceCamera {
    /// Open device `index` and start streaming at `width`x`height`.
    ///
    /// The driver may pick a different size; the capture self-test catches
    /// that before the session starts.
    pub fn open(camera: CameraId, index: usize, width: u32, height: u32) -> Result<Self, CaptureError> {
        let device_error = |source: io::Error| CaptureError::Device {
            camera,
            index,
            source,
        };

        let mut device = Device::new(index).map_err(device_error)?;
        let mut format = device.format().map_err(device_error)?;
        format.width = width;
        format.height = height;
        format.fourcc = FourCC::new(MJPG);
        let format = device.set_format(&format).map_err(device_error)?;

        if format.fourcc != FourCC::new(MJPG) && format.fourcc != FourCC::new(YUYV) {
            return Err(CaptureError::Format {
                camera,
                format: format.fourcc.to_string(),
            });
        }

        let stream = Stream::with_buffers(&mut device, Type::VideoCapture, BUFFER_COUNT).map_err(device_error)?;
        info!(
            camera = %camera,
            index,
            width = format.width,
            height = format.height,
            format = %format.fourcc,
            "Camera device opened"
        );
        Ok(Self {
            camera,
            index,
            width: format.width,
            height: format.height,
            fourcc: format.fourcc,
            stream,
        })
    }

    fn decode(&self, data: &[u8]) -> Result<Frame, CaptureError> {
        if self.fourcc == FourCC::new(MJPG) {
            let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg).map_err(|e| {
                CaptureError::Decode {
                    camera: self.camera,
                    reason: e.to_string(),
                }
            })?;
            return Ok(image.to_rgb8());
        }
        yuyv_to_rgb(data, self.width, self.height).ok_or_else(|| CaptureError::Decode {
            camera: self.camera,
            reason: format!("short YUYV buffer of {} bytes", data.len()),
        })
    }
}

impl CameraFeed for DeviceCamera {
    fn camera(&self) -> CameraId {
        self.camera
    }

    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        let (camera, index) = (self.camera, self.index);
        let (buffer, meta) = self
            .stream
            .next()
            .map_err(|source| CaptureError::Device { camera, index, source })?;
        let used = (meta.bytesused as usize).min(buffer.len());
        // The mapped buffer is reused by the next dequeue.
        let data = buffer[..used].to_vec();
        debug!(camera = %camera, bytes = used, sequence = meta.sequence, "Camera frame dequeued");
        self.decode(&data)
    }

    fn describe(&self) -> String {
        format!("/dev/video{} ({})", self.index, self.fourcc)
    }
}

/// Convert packed YUYV 4:2:2 to RGB. `None` when `data` is too short.
pub(crate) fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Option<RgbImage> {
    let needed = width as usize * height as usize * 2;
    if data.len() < needed || width % 2 != 0 {
        return None;
    }
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for chunk in data[..needed].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }
    RgbImage::from_raw(width, height, rgb)
}

/// BT.601 full-range conversion.
fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y = f32::from(y);
    let cb = f32::from(cb) - 128.0;
    let cr = f32::from(cr) - 128.0;
    let clamp = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    [
        clamp(y + 1.402 * cr),
        clamp(y - 0.344_136 * cb - 0.714_136 * cr),
        clamp(y + 1.772 * cb),
    ]
}
