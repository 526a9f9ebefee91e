//! Fixtures shared by unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};

use crate::error::SourceError;
use crate::format::AssetType;
use crate::media::decoder::ImageSource;
use crate::media::types::RawImage;

pub const FRAME_WIDTH: u32 = 4;
pub const FRAME_HEIGHT: u32 = 2;

pub fn solid(width: u32, height: u32, pixel: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(pixel))
}

/// Encode an in-memory GIF: one full-canvas frame per `(color, delay_cs)`.
pub fn encode_gif(width: u16, height: u16, frames: &[([u8; 4], u16)]) -> Vec<u8> {
    let frames = frames
        .iter()
        .map(|&(color, delay)| {
            let mut frame = gif_frame(color, (0, 0, width, height), gif::DisposalMethod::Keep);
            frame.delay = delay;
            frame
        })
        .collect::<Vec<_>>();
    encode_gif_frames(width, height, &frames)
}

/// A solid sub-image at `(left, top, width, height)` on the logical screen.
pub fn gif_frame(
    color: [u8; 4],
    (left, top, width, height): (u16, u16, u16, u16),
    dispose: gif::DisposalMethod,
) -> gif::Frame<'static> {
    let mut pixels = solid(u32::from(width), u32::from(height), color).into_raw();
    let mut frame = gif::Frame::from_rgba_speed(width, height, &mut pixels, 10);
    frame.left = left;
    frame.top = top;
    frame.dispose = dispose;
    frame.delay = 10;
    frame
}

pub fn encode_gif_frames(width: u16, height: u16, frames: &[gif::Frame<'static>]) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut bytes, width, height, &[]).unwrap();
        encoder.set_repeat(gif::Repeat::Infinite).unwrap();
        for frame in frames {
            encoder.write_frame(frame).unwrap();
        }
    }
    bytes
}

/// Encode an animated WebP: one full-canvas lossless frame per
/// `(color, delay_ms)`. `alpha` sets the container's alpha flag, without it
/// frames decode as RGB.
pub fn encode_animated_webp(
    width: u32,
    height: u32,
    frames: &[([u8; 4], u32)],
    alpha: bool,
) -> Vec<u8> {
    fn chunk(out: &mut Vec<u8>, fourcc: &[u8; 4], data: &[u8]) {
        out.extend_from_slice(fourcc);
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
        if data.len() % 2 == 1 {
            out.push(0);
        }
    }
    fn u24(out: &mut Vec<u8>, value: u32) {
        out.extend_from_slice(&value.to_le_bytes()[..3]);
    }

    let mut body = Vec::new();
    let flags = if alpha { 0b0001_0010 } else { 0b0000_0010 };
    let mut vp8x = vec![flags, 0, 0, 0];
    u24(&mut vp8x, width - 1);
    u24(&mut vp8x, height - 1);
    chunk(&mut body, b"VP8X", &vp8x);
    // background color and loop count
    chunk(&mut body, b"ANIM", &[0; 6]);

    for &(color, delay_ms) in frames {
        let still = encode_webp(&solid(width, height, color));
        // a simple-format file is RIFF header, then one VP8L chunk
        let len = u32::from_le_bytes(still[16..20].try_into().unwrap()) as usize;
        let bitstream = &still[20..20 + len];

        let mut anmf = Vec::new();
        u24(&mut anmf, 0);
        u24(&mut anmf, 0);
        u24(&mut anmf, width - 1);
        u24(&mut anmf, height - 1);
        u24(&mut anmf, delay_ms);
        // no blending, no disposal
        anmf.push(0b10);
        chunk(&mut anmf, b"VP8L", bitstream);
        chunk(&mut body, b"ANMF", &anmf);
    }

    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&(body.len() as u32 + 4).to_le_bytes());
    out.extend_from_slice(b"WEBP");
    out.extend(body);
    out
}

/// Encode a still lossless WebP.
pub fn encode_webp(image: &RgbaImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image_webp::WebPEncoder::new(&mut bytes)
        .encode(
            image.as_raw(),
            image.width(),
            image.height(),
            image_webp::ColorType::Rgba8,
        )
        .unwrap();
    bytes
}

/// Synthetic source counting decode calls. Frame `i` is a solid
/// `FRAME_WIDTH x FRAME_HEIGHT` image whose red channel is `i`.
pub struct CountingSource {
    frame_count: usize,
    duration: Duration,
    failing: HashSet<usize>,
    decode_delay: Duration,
    decodes: AtomicUsize,
}

impl CountingSource {
    pub fn new(frame_count: usize, duration: Duration) -> Self {
        Self {
            frame_count,
            duration,
            failing: HashSet::new(),
            decode_delay: Duration::ZERO,
            decodes: AtomicUsize::new(0),
        }
    }

    /// Make `decode` fail for these indices.
    pub fn failing(mut self, indices: &[usize]) -> Self {
        self.failing.extend(indices);
        self
    }

    /// Sleep this long inside every `decode`.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.decode_delay = delay;
        self
    }

    pub fn len(&self) -> usize {
        self.frame_count
    }

    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

impl ImageSource for CountingSource {
    fn asset_type(&self) -> AssetType {
        AssetType::Gif
    }

    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn decode(&self, index: usize) -> Result<RawImage, SourceError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        if !self.decode_delay.is_zero() {
            std::thread::sleep(self.decode_delay);
        }
        if index >= self.frame_count {
            return Err(SourceError::FrameOutOfRange {
                index,
                count: self.frame_count,
            });
        }
        if self.failing.contains(&index) {
            return Err(SourceError::NoFrames);
        }
        Ok(solid(FRAME_WIDTH, FRAME_HEIGHT, [index as u8, 0, 0, 255]))
    }

    fn frame_duration(&self, index: usize) -> Duration {
        if index < self.frame_count {
            self.duration
        } else {
            Duration::MAX
        }
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
