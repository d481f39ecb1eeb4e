//! Framebuffer compression metadata
//!
//! AFBC and SAJC buffers are handed to the hardware with their plane addresses
//! untouched. SBWC buffers are split into header and payload sub-regions per
//! plane whose sizes depend on the full buffer size and the bit depth; the
//! helpers here compute those sizes.

use serde::{Deserialize, Serialize};

use crate::format::{BitDepth, PixelFormat};
use crate::geometry::align_up;

/// AFBC superblock layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AfbcBlock {
    #[default]
    Block16x16,
    Block32x8,
    Block64x4,
}

impl AfbcBlock {
    pub fn size(&self) -> (u32, u32) {
        match self {
            Self::Block16x16 => (16, 16),
            Self::Block32x8 => (32, 8),
            Self::Block64x4 => (64, 4),
        }
    }
}

/// Compression rate of lossy SBWC, in percent of the lossless payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LossyRate {
    Percent50,
    #[default]
    Percent75,
}

impl LossyRate {
    pub fn percent(&self) -> u32 {
        match self {
            Self::Percent50 => 50,
            Self::Percent75 => 75,
        }
    }
}

/// Compression applied to a layer's buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompressionKind {
    #[default]
    None,
    Afbc(AfbcBlock),
    Sajc,
    Sbwc,
    SbwcLossy(LossyRate),
}

impl CompressionKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Afbc(_) => "AFBC",
            Self::Sajc => "SAJC",
            Self::Sbwc => "SBWC",
            Self::SbwcLossy(_) => "SBWC-lossy",
        }
    }

    /// Any block-based compression
    pub fn is_compressed(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// SBWC variants, which split planes into header and payload
    pub fn is_sbwc(&self) -> bool {
        matches!(self, Self::Sbwc | Self::SbwcLossy(_))
    }

    /// Size in pixels of one compression block
    pub fn block_size(&self) -> Option<(u32, u32)> {
        match self {
            Self::None => None,
            Self::Afbc(block) => Some(block.size()),
            Self::Sajc | Self::Sbwc | Self::SbwcLossy(_) => Some((SBWC_BLOCK_WIDTH, SBWC_BLOCK_HEIGHT)),
        }
    }

    /// Check if the compression scheme can encode the given pixel format
    pub fn supports_format(&self, format: PixelFormat) -> bool {
        match self {
            Self::None => true,
            Self::Afbc(_) => !format.is_yuv(),
            Self::Sajc => matches!(
                format,
                PixelFormat::Argb8888
                    | PixelFormat::Abgr8888
                    | PixelFormat::Rgba8888
                    | PixelFormat::Bgra8888
                    | PixelFormat::Xrgb8888
                    | PixelFormat::Xbgr8888
            ),
            Self::Sbwc | Self::SbwcLossy(_) => matches!(
                format,
                PixelFormat::Nv12 | PixelFormat::Nv21 | PixelFormat::P010
            ),
        }
    }
}

impl std::fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// SBWC compresses 32x4 pixel blocks
pub const SBWC_BLOCK_WIDTH: u32 = 32;
pub const SBWC_BLOCK_HEIGHT: u32 = 4;

/// Payload bytes per block row of one 32 pixel wide column
fn sbwc_block_bytes(depth: BitDepth) -> u32 {
    match depth {
        BitDepth::Bit8 => 128,
        BitDepth::Bit10 => 160,
    }
}

/// Number of 4-line block rows in the luma plane
pub fn sbwc_luma_block_rows(full_height: u32) -> u32 {
    align_up(full_height, 16).div_ceil(SBWC_BLOCK_HEIGHT)
}

/// Number of 4-line block rows in the chroma plane
pub fn sbwc_chroma_block_rows(full_height: u32) -> u32 {
    (align_up(full_height, 16) / 2).div_ceil(SBWC_BLOCK_HEIGHT)
}

/// Lossless payload stride: bytes per block row
pub fn sbwc_payload_stride(full_width: u32, depth: BitDepth) -> u32 {
    sbwc_block_bytes(depth) * full_width.div_ceil(SBWC_BLOCK_WIDTH)
}

/// Header stride: bytes per block row, shared by luma and chroma
pub fn sbwc_header_stride(full_width: u32) -> u32 {
    align_up(full_width.div_ceil(64), 16)
}

/// Lossy payload stride for the given rate
pub fn sbwc_lossy_stride(full_width: u32, depth: BitDepth, rate: LossyRate) -> u32 {
    (sbwc_block_bytes(depth) * rate.percent() / 100) * full_width.div_ceil(SBWC_BLOCK_WIDTH)
}

/// Byte sizes of the four lossless SBWC sub-regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbwcPlaneSizes {
    pub luma_payload: u64,
    pub luma_header: u64,
    pub chroma_payload: u64,
    pub chroma_header: u64,
}

impl SbwcPlaneSizes {
    /// Sizes for a lossless buffer of the given full dimensions
    pub fn lossless(full_width: u32, full_height: u32, depth: BitDepth) -> Self {
        let stride = sbwc_payload_stride(full_width, depth) as u64;
        let hd_stride = sbwc_header_stride(full_width) as u64;
        let y_rows = sbwc_luma_block_rows(full_height) as u64;
        let c_rows = sbwc_chroma_block_rows(full_height) as u64;

        Self {
            luma_payload: stride * y_rows + 64,
            luma_header: align_up((hd_stride * y_rows + 256) as u32, 32) as u64,
            chroma_payload: stride * c_rows + 64,
            chroma_header: hd_stride * c_rows + 128,
        }
    }

    /// Sizes for a lossy buffer; lossy buffers carry no headers
    pub fn lossy(full_width: u32, full_height: u32, depth: BitDepth, rate: LossyRate) -> Self {
        let stride = sbwc_lossy_stride(full_width, depth, rate) as u64;
        Self {
            luma_payload: stride * sbwc_luma_block_rows(full_height) as u64 + 64,
            luma_header: 0,
            chroma_payload: stride * sbwc_chroma_block_rows(full_height) as u64 + 64,
            chroma_header: 0,
        }
    }

    /// Full luma plane size (payload followed by header)
    pub fn luma_total(&self) -> u64 {
        self.luma_payload + self.luma_header
    }

    pub fn chroma_total(&self) -> u64 {
        self.chroma_payload + self.chroma_header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_compatibility() {
        assert!(CompressionKind::Afbc(AfbcBlock::Block32x8).supports_format(PixelFormat::Argb8888));
        assert!(!CompressionKind::Afbc(AfbcBlock::Block16x16).supports_format(PixelFormat::Nv12));
        assert!(CompressionKind::Sbwc.supports_format(PixelFormat::P010));
        assert!(!CompressionKind::SbwcLossy(LossyRate::Percent50).supports_format(PixelFormat::Rgb565));
        assert!(!CompressionKind::Sajc.supports_format(PixelFormat::Argb2101010));
        assert!(CompressionKind::None.supports_format(PixelFormat::Yuv420));
    }

    #[test]
    fn test_sbwc_sizes_1080p_8bit() {
        // 1920 / 32 = 60 columns, 1088 / 4 = 272 luma block rows
        assert_eq!(sbwc_payload_stride(1920, BitDepth::Bit8), 7680);
        assert_eq!(sbwc_header_stride(1920), 32);
        assert_eq!(sbwc_luma_block_rows(1080), 272);
        assert_eq!(sbwc_chroma_block_rows(1080), 136);

        let sizes = SbwcPlaneSizes::lossless(1920, 1080, BitDepth::Bit8);
        assert_eq!(sizes.luma_payload, 7680 * 272 + 64);
        assert_eq!(sizes.luma_header, 32 * 272 + 256);
        assert_eq!(sizes.chroma_payload, 7680 * 136 + 64);
        assert_eq!(sizes.chroma_header, 32 * 136 + 128);
    }

    #[test]
    fn test_ten_bit_is_wider() {
        let s8 = sbwc_payload_stride(1920, BitDepth::Bit8);
        let s10 = sbwc_payload_stride(1920, BitDepth::Bit10);
        assert!(s10 > s8);
        assert_eq!(sbwc_lossy_stride(1920, BitDepth::Bit8, LossyRate::Percent50), 64 * 60);
    }

    #[test]
    fn test_block_sizes() {
        assert_eq!(CompressionKind::None.block_size(), None);
        assert_eq!(CompressionKind::Afbc(AfbcBlock::Block64x4).block_size(), Some((64, 4)));
        assert_eq!(CompressionKind::Sbwc.block_size(), Some((32, 4)));
    }
}
