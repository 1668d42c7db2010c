//! Frame types passed between producers, the dispatcher, and callbacks.

use std::borrow::Cow;
use std::fmt;

use screentap_platform_core::DisplayId;
use serde::{Deserialize, Serialize};

/// Pixel layout of frame data. Both variants are 4 bytes per pixel in B, G, R, A order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Blue, green, red, alpha.
    #[default]
    Bgra,
    /// Blue, green, red, padding byte with undefined content.
    Bgrx,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        4
    }
}

/// A frame as handed over by a native producer.
///
/// Producers that already own a scaled buffer pass it as [`Cow::Owned`]
/// so the dispatcher does not copy it a second time.
pub struct RawFrame<'a> {
    pub data: Cow<'a, [u8]>,
    pub width: u32,
    pub height: u32,
    /// Byte length of one row, including any padding.
    pub stride: usize,
    pub format: PixelFormat,
    /// Monotonic capture time in nanoseconds.
    pub timestamp_ns: u64,
}

impl<'a> RawFrame<'a> {
    pub fn borrowed(
        data: &'a [u8],
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        timestamp_ns: u64,
    ) -> Self {
        Self {
            data: Cow::Borrowed(data),
            width,
            height,
            stride,
            format,
            timestamp_ns,
        }
    }

    pub fn owned(
        data: Vec<u8>,
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        timestamp_ns: u64,
    ) -> RawFrame<'static> {
        RawFrame {
            data: Cow::Owned(data),
            width,
            height,
            stride,
            format,
            timestamp_ns,
        }
    }

    /// Whether `data` covers the described geometry.
    pub fn is_well_formed(&self) -> bool {
        required_len(self.width, self.height, self.stride, self.format)
            .is_some_and(|len| self.data.len() >= len)
    }
}

fn required_len(width: u32, height: u32, stride: usize, format: PixelFormat) -> Option<usize> {
    let row = (width as usize).checked_mul(format.bytes_per_pixel())?;
    if stride < row {
        return None;
    }
    if height == 0 {
        return Some(0);
    }
    stride.checked_mul(height as usize - 1)?.checked_add(row)
}

/// An owned frame queued between the producer and the dispatch thread.
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub format: PixelFormat,
    pub timestamp_ns: u64,
    pub display_id: DisplayId,
    /// Position of the frame in its session's submission order, starting at 0.
    pub sequence: u64,
}

impl CapturedFrame {
    pub(crate) fn from_raw(raw: RawFrame<'_>, display_id: DisplayId, sequence: u64) -> Self {
        Self {
            data: raw.data.into_owned(),
            width: raw.width,
            height: raw.height,
            stride: raw.stride,
            format: raw.format,
            timestamp_ns: raw.timestamp_ns,
            display_id,
            sequence,
        }
    }

    /// Borrow this frame as a [`FrameBuffer`].
    pub fn as_buffer(&self) -> FrameBuffer<'_> {
        FrameBuffer {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: self.format,
            timestamp_ns: self.timestamp_ns,
            display_id: self.display_id,
            sequence: self.sequence,
        }
    }
}

impl fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("bytes", &self.data.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .field("timestamp_ns", &self.timestamp_ns)
            .field("display_id", &self.display_id)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// A borrowed view of one frame, valid only for the callback invocation
/// that receives it. Copy the pixels (see [`FrameBuffer::to_owned_frame`])
/// to keep them longer.
#[derive(Clone, Copy)]
pub struct FrameBuffer<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub format: PixelFormat,
    pub timestamp_ns: u64,
    pub display_id: DisplayId,
    pub sequence: u64,
}

impl<'a> FrameBuffer<'a> {
    /// Total byte size of the pixel data.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Pixel bytes of row `y`, without trailing padding.
    pub fn row(&self, y: u32) -> Option<&'a [u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride;
        let end = start + self.width as usize * self.format.bytes_per_pixel();
        self.data.get(start..end)
    }

    /// The four bytes of the pixel at (`x`, `y`).
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width {
            return None;
        }
        let row = self.row(y)?;
        let offset = x as usize * self.format.bytes_per_pixel();
        let px = row.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Copy the frame out of the callback.
    pub fn to_owned_frame(&self) -> CapturedFrame {
        CapturedFrame {
            data: self.data.to_vec(),
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: self.format,
            timestamp_ns: self.timestamp_ns,
            display_id: self.display_id,
            sequence: self.sequence,
        }
    }
}

impl fmt::Debug for FrameBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("bytes", &self.data.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .field("timestamp_ns", &self.timestamp_ns)
            .field("display_id", &self.display_id)
            .field("sequence", &self.sequence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(width: u32, height: u32, stride: usize) -> Vec<u8> {
        let mut data = vec![0u8; stride * height as usize];
        for y in 0..height as usize {
            for x in 0..width as usize {
                let v = ((x + y) % 2 * 255) as u8;
                data[y * stride + x * 4..y * stride + x * 4 + 4].copy_from_slice(&[v, v, v, 255]);
            }
        }
        data
    }

    #[test]
    fn well_formed_accounts_for_padding() {
        let data = checker(4, 2, 20);
        let frame = RawFrame::borrowed(&data, 4, 2, 20, PixelFormat::Bgra, 0);
        assert!(frame.is_well_formed());

        // Last row does not need trailing padding.
        let short = &data[..20 + 16];
        assert!(RawFrame::borrowed(short, 4, 2, 20, PixelFormat::Bgra, 0).is_well_formed());
        assert!(!RawFrame::borrowed(&short[..35], 4, 2, 20, PixelFormat::Bgra, 0).is_well_formed());
    }

    #[test]
    fn stride_narrower_than_row_is_malformed() {
        let data = vec![0u8; 64];
        assert!(!RawFrame::borrowed(&data, 4, 2, 8, PixelFormat::Bgra, 0).is_well_formed());
    }

    #[test]
    fn buffer_rows_skip_padding() {
        let data = checker(3, 2, 16);
        let raw = RawFrame::borrowed(&data, 3, 2, 16, PixelFormat::Bgra, 42);
        let frame = CapturedFrame::from_raw(raw, DisplayId(7), 3);
        let buffer = frame.as_buffer();

        assert_eq!(buffer.row(0).map(<[u8]>::len), Some(12));
        assert_eq!(buffer.row(2), None);
        assert_eq!(buffer.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(buffer.pixel(1, 0), Some([255, 255, 255, 255]));
        assert_eq!(buffer.pixel(3, 0), None);
        assert_eq!(buffer.display_id, DisplayId(7));
        assert_eq!(buffer.sequence, 3);
        assert_eq!(buffer.to_owned_frame(), frame);
    }
}
