use anyhow::{Context, Result};
use image::{ImageBuffer, Rgb};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

pub type RgbFrame = ImageBuffer<Rgb<u8>, Vec<u8>>;

/// Live V4L2 capture. `open` negotiates the pixel format and returns only
/// once the frame geometry is known, so callers never run detection against
/// an unready source.
pub struct Camera {
    stream: Stream<'static>,
    width: u32,
    height: u32,
    fourcc: FourCC,
}

impl Camera {
    pub fn open(device: &str) -> Result<Self> {
        let dev = Device::with_path(device)
            .with_context(|| format!("open camera device {device}"))?;
        let mut fmt = dev.format().context("query camera format")?;
        let start = fmt.fourcc;
        negotiate_fourcc(start, |wanted| {
            match dev.set_format(&Format::new(fmt.width, fmt.height, wanted)) {
                Ok(granted) => {
                    fmt = granted;
                    fmt.fourcc
                }
                Err(_) => fmt.fourcc,
            }
        });
        let stream =
            Stream::with_buffers(&dev, Type::VideoCapture, 4).context("start capture stream")?;
        log::info!(
            "camera ready: {}x{} {:?}",
            fmt.width,
            fmt.height,
            fmt.fourcc
        );
        Ok(Self {
            stream,
            width: fmt.width,
            height: fmt.height,
            fourcc: fmt.fourcc,
        })
    }

    /// Frame geometry negotiated at open time.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Capture the next frame and convert it to RGB.
    pub fn frame(&mut self) -> Result<RgbFrame> {
        let (data, meta) = self.stream.next().context("capture frame")?;
        log::debug!(
            "frame seq={:?} len={} fourcc={:?}",
            meta.sequence,
            data.len(),
            self.fourcc
        );
        let rgb = match self.fourcc {
            f if f == FourCC::new(b"RGB3") => data.to_vec(),
            f if f == FourCC::new(b"YUYV") => yuyv_to_rgb(self.width, self.height, data)?,
            f if f == FourCC::new(b"GREY") => grey_to_rgb(self.width, self.height, data)?,
            other => {
                log::warn!("unhandled pixel format {other:?}, treating as packed RGB");
                data.to_vec()
            }
        };
        let expected = (self.width * self.height * 3) as usize;
        if rgb.len() < expected {
            anyhow::bail!(
                "frame buffer too small: got {} bytes, expected {expected}",
                rgb.len()
            );
        }
        ImageBuffer::from_raw(self.width, self.height, rgb)
            .ok_or_else(|| anyhow::anyhow!("failed to build frame image buffer"))
    }
}

/// Formats `frame()` can consume natively or convert in software, most
/// preferred first.
const PREFERRED_FOURCCS: [&[u8; 4]; 2] = [b"RGB3", b"YUYV"];

/// Walk the preference list until the device is already on a preferred
/// format or `try_set` reports one was granted. `try_set` returns the
/// format in effect after the request; a granted format ends the walk so a
/// later, less preferred candidate never clobbers it.
fn negotiate_fourcc(current: FourCC, mut try_set: impl FnMut(FourCC) -> FourCC) -> FourCC {
    let mut fourcc = current;
    for candidate in PREFERRED_FOURCCS {
        let wanted = FourCC::new(candidate);
        if fourcc == wanted {
            break;
        }
        fourcc = try_set(wanted);
        if fourcc == wanted {
            break;
        }
    }
    fourcc
}

fn yuyv_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        anyhow::bail!("short YUYV buffer: {} < {expected}", data.len());
    }
    let mut out = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;
        for y in [y0, y1] {
            out.push(clamp_u8(y + 1.402 * v));
            out.push(clamp_u8(y - 0.344136 * u - 0.714136 * v));
            out.push(clamp_u8(y + 1.772 * u));
        }
    }
    Ok(out)
}

fn grey_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height) as usize;
    if data.len() < expected {
        anyhow::bail!("short GREY buffer: {} < {expected}", data.len());
    }
    let mut out = Vec::with_capacity(expected * 3);
    for &y in &data[..expected] {
        out.extend_from_slice(&[y, y, y]);
    }
    Ok(out)
}

fn clamp_u8(v: f32) -> u8 {
    v.max(0.0).min(255.0) as u8
}
