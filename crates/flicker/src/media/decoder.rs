use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use image::{DynamicImage, Rgba, RgbImage, RgbaImage};

use super::types::{RawImage, frame_delay};
use crate::error::SourceError;
use crate::format::AssetType;

/// An ordered, randomly addressable sequence of frames.
///
/// Implementations are shared between the foreground store and its preload
/// worker, so decoding takes `&self`.
pub trait ImageSource: Send + Sync {
    fn asset_type(&self) -> AssetType;

    fn frame_count(&self) -> usize;

    /// Decode the frame at `index` into a fresh RGBA buffer.
    fn decode(&self, index: usize) -> Result<RawImage, SourceError>;

    /// Display duration of the frame at `index`. Out of range is `Duration::MAX`.
    fn frame_duration(&self, index: usize) -> Duration;
}

/// Encoded image held in memory, decoded one frame at a time on request.
///
/// Opening scans the container once for dimensions and delays. Frame pixels
/// are produced by `decode`; GIF and animated WebP decode sequentially, so the
/// source parks its decoder after each call and resumes from there when the
/// next request is further along.
pub struct AnimatedSource {
    asset_type: AssetType,
    bytes: Arc<[u8]>,
    width: u32,
    height: u32,
    delays: Vec<Duration>,
    frames: FrameReader,
}

enum FrameReader {
    Still,
    Gif(Mutex<Option<GifCursor>>),
    Webp(Mutex<Option<WebpCursor>>),
}

impl AnimatedSource {
    /// Read an image file and scan its frames.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Sniff `bytes` and scan frame metadata. No frame is kept decoded.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SourceError> {
        let asset_type = AssetType::detect(Some(bytes));
        let bytes: Arc<[u8]> = Arc::from(bytes);
        let source = match asset_type {
            AssetType::Gif => scan_gif(bytes)?,
            AssetType::Webp => scan_webp(bytes)?,
            AssetType::Png | AssetType::Jpeg => scan_still(bytes, asset_type)?,
            other => return Err(SourceError::Unsupported(other)),
        };

        log::info!(
            "Loaded {}: {}x{}, {} frame{}",
            source.asset_type,
            source.width,
            source.height,
            source.delays.len(),
            if source.delays.len() == 1 { "" } else { "s" }
        );
        Ok(source)
    }

    /// Canvas dimensions (all frames share them).
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl ImageSource for AnimatedSource {
    fn asset_type(&self) -> AssetType {
        self.asset_type
    }

    fn frame_count(&self) -> usize {
        self.delays.len()
    }

    fn decode(&self, index: usize) -> Result<RawImage, SourceError> {
        let count = self.delays.len();
        if index >= count {
            return Err(SourceError::FrameOutOfRange { index, count });
        }
        match &self.frames {
            FrameReader::Still => Ok(image::load_from_memory(&self.bytes)?.into_rgba8()),
            FrameReader::Gif(parked) => decode_sequential(parked, &self.bytes, index),
            FrameReader::Webp(parked) => decode_sequential(parked, &self.bytes, index),
        }
    }

    fn frame_duration(&self, index: usize) -> Duration {
        self.delays.get(index).copied().unwrap_or(Duration::MAX)
    }
}

/// A decoder that can only move forward through the frames of one container.
trait SequentialCursor: Sized {
    fn start(bytes: &Arc<[u8]>) -> Result<Self, SourceError>;

    /// Index of the frame the next `advance_to` step will read.
    fn next_index(&self) -> usize;

    /// Read forward up to and including `index` and return that frame.
    fn advance_to(&mut self, index: usize) -> Result<RawImage, SourceError>;
}

/// Resume the parked cursor when it has not passed `index`, otherwise start
/// over from the first frame. A cursor that fails is dropped.
fn decode_sequential<C: SequentialCursor>(
    parked: &Mutex<Option<C>>,
    bytes: &Arc<[u8]>,
    index: usize,
) -> Result<RawImage, SourceError> {
    let mut parked = parked.lock().unwrap_or_else(PoisonError::into_inner);
    let mut cursor = match parked.take() {
        Some(cursor) if cursor.next_index() <= index => cursor,
        _ => C::start(bytes)?,
    };
    let frame = cursor.advance_to(index)?;
    *parked = Some(cursor);
    Ok(frame)
}

/// Still image: only the header is read here, pixels on every `decode`.
fn scan_still(bytes: Arc<[u8]>, asset_type: AssetType) -> Result<AnimatedSource, SourceError> {
    let (width, height) = image::ImageReader::new(Cursor::new(&bytes[..]))
        .with_guessed_format()?
        .into_dimensions()?;
    Ok(AnimatedSource {
        asset_type,
        bytes,
        width,
        height,
        delays: vec![Duration::ZERO],
        frames: FrameReader::Still,
    })
}

/// Walk every GIF frame once to collect delays.
fn scan_gif(bytes: Arc<[u8]>) -> Result<AnimatedSource, SourceError> {
    let mut reader = gif::DecodeOptions::new().read_info(Cursor::new(bytes.clone()))?;
    let width = u32::from(reader.width());
    let height = u32::from(reader.height());

    let mut delays = Vec::new();
    while let Some(frame) = reader.read_next_frame()? {
        // GIF delay is in centiseconds
        delays.push(frame_delay(u32::from(frame.delay) * 10));
    }
    if delays.is_empty() {
        return Err(SourceError::NoFrames);
    }

    Ok(AnimatedSource {
        asset_type: AssetType::Gif,
        bytes,
        width,
        height,
        delays,
        frames: FrameReader::Gif(Mutex::new(None)),
    })
}

/// Composites GIF frames onto the logical screen in file order.
struct GifCursor {
    reader: gif::Decoder<Cursor<Arc<[u8]>>>,
    canvas: RgbaImage,
    next: usize,
}

impl SequentialCursor for GifCursor {
    fn start(bytes: &Arc<[u8]>) -> Result<Self, SourceError> {
        let mut options = gif::DecodeOptions::new();
        options.set_color_output(gif::ColorOutput::RGBA);
        let reader = options.read_info(Cursor::new(bytes.clone()))?;
        let canvas = RgbaImage::new(u32::from(reader.width()), u32::from(reader.height()));
        Ok(Self {
            reader,
            canvas,
            next: 0,
        })
    }

    fn next_index(&self) -> usize {
        self.next
    }

    fn advance_to(&mut self, index: usize) -> Result<RawImage, SourceError> {
        loop {
            let Some(frame) = self.reader.read_next_frame()? else {
                return Err(SourceError::FrameOutOfRange {
                    index,
                    count: self.next,
                });
            };
            let rect = FrameRect {
                left: u32::from(frame.left),
                top: u32::from(frame.top),
                width: u32::from(frame.width),
                height: u32::from(frame.height),
            };
            let restore =
                (frame.dispose == gif::DisposalMethod::Previous).then(|| self.canvas.clone());

            composite(&mut self.canvas, &frame.buffer, rect);
            let shown = self.next;
            self.next += 1;
            let output = (shown == index).then(|| self.canvas.clone());

            match frame.dispose {
                gif::DisposalMethod::Background => clear(&mut self.canvas, rect),
                gif::DisposalMethod::Previous => {
                    if let Some(previous) = restore {
                        self.canvas = previous;
                    }
                }
                gif::DisposalMethod::Keep | gif::DisposalMethod::Any => {}
            }

            if let Some(output) = output {
                return Ok(output);
            }
        }
    }
}

/// Read an animated WebP's frame delays. Stills go through the `image` crate.
fn scan_webp(bytes: Arc<[u8]>) -> Result<AnimatedSource, SourceError> {
    let mut decoder = image_webp::WebPDecoder::new(Cursor::new(bytes.clone()))?;
    if !decoder.is_animated() {
        return scan_still(bytes, AssetType::Webp);
    }

    let (width, height) = decoder.dimensions();
    let buffer_size = decoder
        .output_buffer_size()
        .ok_or(SourceError::FrameBuffer { width, height })?;
    let mut buf = vec![0u8; buffer_size];

    let mut delays = Vec::with_capacity(decoder.num_frames() as usize);
    for _ in 0..decoder.num_frames() {
        delays.push(frame_delay(decoder.read_frame(&mut buf)?));
    }
    if delays.is_empty() {
        return Err(SourceError::NoFrames);
    }

    Ok(AnimatedSource {
        asset_type: AssetType::Webp,
        bytes,
        width,
        height,
        delays,
        frames: FrameReader::Webp(Mutex::new(None)),
    })
}

/// Animated WebP decoder plus its reusable canvas buffer. image-webp does the
/// compositing; frames come out RGB when the file declares no alpha.
struct WebpCursor {
    decoder: image_webp::WebPDecoder<Cursor<Arc<[u8]>>>,
    buf: Vec<u8>,
    width: u32,
    height: u32,
    has_alpha: bool,
    next: usize,
}

impl SequentialCursor for WebpCursor {
    fn start(bytes: &Arc<[u8]>) -> Result<Self, SourceError> {
        let decoder = image_webp::WebPDecoder::new(Cursor::new(bytes.clone()))?;
        let (width, height) = decoder.dimensions();
        let buffer_size = decoder
            .output_buffer_size()
            .ok_or(SourceError::FrameBuffer { width, height })?;
        Ok(Self {
            has_alpha: decoder.has_alpha(),
            decoder,
            buf: vec![0u8; buffer_size],
            width,
            height,
            next: 0,
        })
    }

    fn next_index(&self) -> usize {
        self.next
    }

    fn advance_to(&mut self, index: usize) -> Result<RawImage, SourceError> {
        while self.next < index {
            self.decoder.read_frame(&mut self.buf)?;
            self.next += 1;
        }
        self.decoder.read_frame(&mut self.buf)?;
        self.next += 1;
        webp_canvas_to_rgba(&self.buf, self.width, self.height, self.has_alpha)
    }
}

fn webp_canvas_to_rgba(
    buf: &[u8],
    width: u32,
    height: u32,
    has_alpha: bool,
) -> Result<RgbaImage, SourceError> {
    let invalid = || SourceError::FrameBuffer { width, height };
    if has_alpha {
        RgbaImage::from_raw(width, height, buf.to_vec()).ok_or_else(invalid)
    } else {
        let rgb = RgbImage::from_raw(width, height, buf.to_vec()).ok_or_else(invalid)?;
        Ok(DynamicImage::ImageRgb8(rgb).into_rgba8())
    }
}

/// Placement of a GIF sub-image on the logical screen.
#[derive(Debug, Clone, Copy)]
struct FrameRect {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
}

/// Draw RGBA `pixels` onto `canvas`. Fully transparent source pixels leave the
/// canvas untouched; pixels falling outside the canvas are dropped.
fn composite(canvas: &mut RgbaImage, pixels: &[u8], rect: FrameRect) {
    for y in 0..rect.height {
        for x in 0..rect.width {
            let dst_x = rect.left + x;
            let dst_y = rect.top + y;
            if dst_x >= canvas.width() || dst_y >= canvas.height() {
                continue;
            }
            let src_idx = ((y * rect.width + x) * 4) as usize;
            let Some(src) = pixels.get(src_idx..src_idx + 4) else {
                return;
            };
            if src[3] > 0 {
                canvas.put_pixel(dst_x, dst_y, Rgba([src[0], src[1], src[2], src[3]]));
            }
        }
    }
}

/// Restore a region to transparent background.
fn clear(canvas: &mut RgbaImage, rect: FrameRect) {
    let right = (rect.left + rect.width).min(canvas.width());
    let bottom = (rect.top + rect.height).min(canvas.height());
    for y in rect.top..bottom {
        for x in rect.left..right {
            canvas.put_pixel(x, y, Rgba([0, 0, 0, 0]));
        }
    }
}
