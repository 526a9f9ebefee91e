//! Container sniffing from leading magic bytes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Asset container type detected from a byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    /// Not enough data, or a format we don't recognize.
    #[default]
    Unknown,
    Jpeg,
    Png,
    Gif,
    Tiff,
    Webp,
    Heic,
    Heif,
    Mp4,
    M4v,
    Mov,
}

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Brands found at offset 8 of an ISO-BMFF `ftyp` box.
const HEIC_BRANDS: [&[u8; 4]; 5] = [b"heic", b"heis", b"heix", b"hevc", b"hevx"];
const HEIF_BRANDS: [&[u8; 4]; 2] = [b"mif1", b"msf1"];

/// Minimum buffer length before the single-byte fallback is attempted.
const FALLBACK_MIN_LEN: usize = 12;

impl AssetType {
    /// Detect the asset type of `bytes`. `None` yields `Unknown`.
    pub fn detect(bytes: Option<&[u8]>) -> Self {
        match bytes {
            Some(data) => Self::sniff(data),
            None => Self::Unknown,
        }
    }

    fn sniff(data: &[u8]) -> Self {
        if matches_at(data, 0, &[Some(0xFF), Some(0xD8), Some(0xFF)]) {
            return Self::Jpeg;
        }
        if data.starts_with(&PNG_SIGNATURE) {
            return Self::Png;
        }
        if data.starts_with(b"GIF") {
            return Self::Gif;
        }

        // "RIFF" <4 byte chunk size> "WEBP"
        let webp = [
            Some(b'R'),
            Some(b'I'),
            Some(b'F'),
            Some(b'F'),
            None,
            None,
            None,
            None,
            Some(b'W'),
            Some(b'E'),
            Some(b'B'),
            Some(b'P'),
        ];
        if matches_at(data, 0, &webp) {
            return Self::Webp;
        }

        if let Some(brand) = data.get(4..12) {
            match brand {
                b"ftypisom" => return Self::Mp4,
                b"ftypmp42" => return Self::M4v,
                b"ftypqt  " => return Self::Mov,
                _ => {}
            }
        }

        if data.len() < FALLBACK_MIN_LEN {
            return Self::Unknown;
        }
        Self::from_leading_byte(data)
    }

    /// Looser dispatch on the first byte. Caller guarantees `data.len() >= 12`.
    fn from_leading_byte(data: &[u8]) -> Self {
        match data[0] {
            0xFF => Self::Jpeg,
            0x89 => Self::Png,
            0x47 => Self::Gif,
            0x49 | 0x4D => Self::Tiff,
            0x52 => {
                let head = &data[..FALLBACK_MIN_LEN];
                if head.is_ascii() && head.starts_with(b"RIFF") && head.ends_with(b"WEBP") {
                    Self::Webp
                } else {
                    Self::Unknown
                }
            }
            0x00 => {
                let brand = &data[8..12];
                if !brand.is_ascii() {
                    Self::Unknown
                } else if HEIC_BRANDS.iter().any(|b| brand == b.as_slice()) {
                    Self::Heic
                } else if HEIF_BRANDS.iter().any(|b| brand == b.as_slice()) {
                    Self::Heif
                } else {
                    Self::Unknown
                }
            }
            _ => Self::Unknown,
        }
    }

    /// Uniform type identifier for this asset type.
    pub fn uti(self) -> &'static str {
        match self {
            Self::Unknown => "public.unknown",
            Self::Jpeg => "public.jpeg",
            Self::Png => "public.png",
            Self::Gif => "com.compuserve.gif",
            Self::Tiff => "public.tiff",
            Self::Webp => "public.webp",
            Self::Heic => "public.heic",
            Self::Heif => "public.heif",
            Self::Mp4 => "public.mp4",
            Self::M4v => "public.m4v",
            Self::Mov => "public.mov",
        }
    }

    pub fn is_video(self) -> bool {
        matches!(self, Self::Mp4 | Self::M4v | Self::Mov)
    }

    /// Containers `AnimatedSource` can play as more than one frame. PNG plays
    /// as a still: APNG frames are not decoded.
    pub fn is_animatable(self) -> bool {
        matches!(self, Self::Gif | Self::Webp)
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uti())
    }
}

/// Compare `pattern` against `data` starting at `offset`. `None` entries match any byte.
fn matches_at(data: &[u8], offset: usize, pattern: &[Option<u8>]) -> bool {
    let Some(window) = data.get(offset..offset + pattern.len()) else {
        return false;
    };
    window
        .iter()
        .zip(pattern)
        .all(|(byte, expected)| expected.is_none_or(|e| *byte == e))
}
