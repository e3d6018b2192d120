//! Camera image message.
//!
//! Field layout follows the ROS `sensor_msgs/Image` message (without the
//! header): dimensions, encoding name, endianness flag, row stride, data.
//!
//! Wire format (little-endian):
//!
//! ```text
//! "IMG1" | height u32 | width u32 | encoding (u32 len + utf8)
//!        | is_bigendian u8 | step u32 | data (u32 len + bytes)
//! ```

use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;

use crate::frame::Frame;

const MAGIC: &[u8; 4] = b"IMG1";
const MAX_ENCODING_LEN: usize = 32;
/// 64 MiB covers 4K RGBA frames with room to spare.
const MAX_DATA_LEN: usize = 64 * 1024 * 1024;

/// Pixel encodings the converter understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageEncoding {
    Bgr8,
    Rgb8,
    Bgra8,
    Rgba8,
    Mono8,
}

impl ImageEncoding {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            ImageEncoding::Bgr8 | ImageEncoding::Rgb8 => 3,
            ImageEncoding::Bgra8 | ImageEncoding::Rgba8 => 4,
            ImageEncoding::Mono8 => 1,
        }
    }

    /// BGR triple for one source pixel.
    fn to_bgr(self, px: &[u8]) -> [u8; 3] {
        match self {
            ImageEncoding::Bgr8 | ImageEncoding::Bgra8 => [px[0], px[1], px[2]],
            ImageEncoding::Rgb8 | ImageEncoding::Rgba8 => [px[2], px[1], px[0]],
            ImageEncoding::Mono8 => [px[0], px[0], px[0]],
        }
    }
}

impl FromStr for ImageEncoding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bgr8" => Ok(ImageEncoding::Bgr8),
            "rgb8" => Ok(ImageEncoding::Rgb8),
            "bgra8" => Ok(ImageEncoding::Bgra8),
            "rgba8" => Ok(ImageEncoding::Rgba8),
            "mono8" | "8UC1" => Ok(ImageEncoding::Mono8),
            other => Err(anyhow!("unsupported image encoding '{}'", other)),
        }
    }
}

impl fmt::Display for ImageEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageEncoding::Bgr8 => "bgr8",
            ImageEncoding::Rgb8 => "rgb8",
            ImageEncoding::Bgra8 => "bgra8",
            ImageEncoding::Rgba8 => "rgba8",
            ImageEncoding::Mono8 => "mono8",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageMessage {
    pub height: u32,
    pub width: u32,
    pub encoding: String,
    pub is_bigendian: u8,
    /// Row length in bytes, including any padding.
    pub step: u32,
    pub data: Vec<u8>,
}

impl ImageMessage {
    /// Tightly packed BGR8 message for a frame.
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            height: frame.height,
            width: frame.width,
            encoding: ImageEncoding::Bgr8.to_string(),
            is_bigendian: 0,
            step: frame.width * frame.channels as u32,
            data: frame.pixels().to_vec(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let encoding = self.encoding.as_bytes();
        if encoding.len() > MAX_ENCODING_LEN {
            return Err(anyhow!(
                "encoding name length {} exceeds maximum {}",
                encoding.len(),
                MAX_ENCODING_LEN
            ));
        }
        if self.data.len() > MAX_DATA_LEN {
            return Err(anyhow!(
                "image data length {} exceeds maximum {}",
                self.data.len(),
                MAX_DATA_LEN
            ));
        }
        let mut out = Vec::with_capacity(self.data.len() + 32 + encoding.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.width.to_le_bytes());
        write_bytes(&mut out, encoding);
        out.push(self.is_bigendian);
        out.extend_from_slice(&self.step.to_le_bytes());
        write_bytes(&mut out, &self.data);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = 0usize;
        if read_slice(bytes, &mut cursor, MAGIC.len())? != MAGIC {
            return Err(anyhow!("not an image message (bad magic)"));
        }
        let height = read_u32(bytes, &mut cursor)?;
        let width = read_u32(bytes, &mut cursor)?;
        let encoding = read_vec_bounded(bytes, &mut cursor, MAX_ENCODING_LEN)?;
        let encoding =
            String::from_utf8(encoding).map_err(|_| anyhow!("invalid encoding name"))?;
        let is_bigendian = read_slice(bytes, &mut cursor, 1)?[0];
        let step = read_u32(bytes, &mut cursor)?;
        let data = read_vec_bounded(bytes, &mut cursor, MAX_DATA_LEN)?;
        if cursor != bytes.len() {
            return Err(anyhow!(
                "{} trailing bytes after image message",
                bytes.len() - cursor
            ));
        }
        Ok(Self {
            height,
            width,
            encoding,
            is_bigendian,
            step,
            data,
        })
    }

    /// Convert to a packed BGR8 frame, dropping row padding and alpha.
    pub fn to_bgr8(&self) -> Result<Frame> {
        let encoding: ImageEncoding = self.encoding.parse()?;
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!(
                "empty image ({}x{})",
                self.width,
                self.height
            ));
        }
        let bpp = encoding.bytes_per_pixel();
        let width = self.width as usize;
        let height = self.height as usize;
        let row_bytes = width
            .checked_mul(bpp)
            .ok_or_else(|| anyhow!("image dimensions overflow"))?;
        let step = self.step as usize;
        if step < row_bytes {
            return Err(anyhow!(
                "step {} is shorter than a {}-pixel {} row",
                step,
                width,
                encoding
            ));
        }
        let needed = step
            .checked_mul(height)
            .ok_or_else(|| anyhow!("image dimensions overflow"))?;
        if self.data.len() < needed {
            return Err(anyhow!(
                "image data truncated: {} bytes, expected {}",
                self.data.len(),
                needed
            ));
        }

        let mut out = Vec::with_capacity(width * height * 3);
        for row in self.data.chunks(step).take(height) {
            for px in row[..row_bytes].chunks_exact(bpp) {
                out.extend_from_slice(&encoding.to_bgr(px));
            }
        }
        Frame::from_bgr8(self.width, self.height, out)
    }
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    let slice = read_slice(bytes, cursor, 4)?;
    Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

fn read_slice<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8]> {
    if *cursor + len > bytes.len() {
        return Err(anyhow!("image message truncated"));
    }
    let out = &bytes[*cursor..*cursor + len];
    *cursor += len;
    Ok(out)
}

fn read_vec_bounded(bytes: &[u8], cursor: &mut usize, max_len: usize) -> Result<Vec<u8>> {
    let len = read_u32(bytes, cursor)? as usize;
    if len > max_len {
        return Err(anyhow!("field length {} exceeds maximum {}", len, max_len));
    }
    Ok(read_slice(bytes, cursor, len)?.to_vec())
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}
