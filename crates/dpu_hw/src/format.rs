//! Pixel format metadata
//!
//! Only the properties the configuration builder and the validators need:
//! plane count, bytes per pixel, chroma subsampling and bit depth.

use serde::{Deserialize, Serialize};

/// Bit depth class of a format's color components
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BitDepth {
    Bit8,
    Bit10,
}

impl BitDepth {
    /// Bits per component
    pub fn bits(&self) -> u32 {
        match self {
            Self::Bit8 => 8,
            Self::Bit10 => 10,
        }
    }
}

/// Pixel formats the layer processors can fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Argb8888,
    Abgr8888,
    Rgba8888,
    Bgra8888,
    Xrgb8888,
    Xbgr8888,
    Rgbx8888,
    Bgrx8888,
    Rgb565,
    Bgr565,
    Argb2101010,
    Abgr2101010,
    Rgba1010102,
    Bgra1010102,
    /// 2-plane YUV 4:2:0, CbCr order
    Nv12,
    /// 2-plane YUV 4:2:0, CrCb order
    Nv21,
    /// 2-plane YUV 4:2:2, CbCr order
    Nv16,
    /// 2-plane YUV 4:2:2, CrCb order
    Nv61,
    /// 2-plane YUV 4:2:0, 10 bit in 16 bit containers
    P010,
    /// 3-plane YUV 4:2:0
    Yuv420,
}

impl PixelFormat {
    /// Every known format
    pub const ALL: [PixelFormat; 20] = [
        Self::Argb8888,
        Self::Abgr8888,
        Self::Rgba8888,
        Self::Bgra8888,
        Self::Xrgb8888,
        Self::Xbgr8888,
        Self::Rgbx8888,
        Self::Bgrx8888,
        Self::Rgb565,
        Self::Bgr565,
        Self::Argb2101010,
        Self::Abgr2101010,
        Self::Rgba1010102,
        Self::Bgra1010102,
        Self::Nv12,
        Self::Nv21,
        Self::Nv16,
        Self::Nv61,
        Self::P010,
        Self::Yuv420,
    ];

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Argb8888 => "ARGB8888",
            Self::Abgr8888 => "ABGR8888",
            Self::Rgba8888 => "RGBA8888",
            Self::Bgra8888 => "BGRA8888",
            Self::Xrgb8888 => "XRGB8888",
            Self::Xbgr8888 => "XBGR8888",
            Self::Rgbx8888 => "RGBX8888",
            Self::Bgrx8888 => "BGRX8888",
            Self::Rgb565 => "RGB565",
            Self::Bgr565 => "BGR565",
            Self::Argb2101010 => "ARGB2101010",
            Self::Abgr2101010 => "ABGR2101010",
            Self::Rgba1010102 => "RGBA1010102",
            Self::Bgra1010102 => "BGRA1010102",
            Self::Nv12 => "NV12",
            Self::Nv21 => "NV21",
            Self::Nv16 => "NV16",
            Self::Nv61 => "NV61",
            Self::P010 => "P010",
            Self::Yuv420 => "YUV420",
        }
    }

    /// Number of memory planes
    pub fn num_planes(&self) -> usize {
        match self {
            Self::Nv12 | Self::Nv21 | Self::Nv16 | Self::Nv61 | Self::P010 => 2,
            Self::Yuv420 => 3,
            _ => 1,
        }
    }

    pub fn is_yuv(&self) -> bool {
        matches!(
            self,
            Self::Nv12 | Self::Nv21 | Self::Nv16 | Self::Nv61 | Self::P010 | Self::Yuv420
        )
    }

    pub fn is_yuv420(&self) -> bool {
        matches!(self, Self::Nv12 | Self::Nv21 | Self::P010 | Self::Yuv420)
    }

    pub fn has_alpha(&self) -> bool {
        matches!(
            self,
            Self::Argb8888
                | Self::Abgr8888
                | Self::Rgba8888
                | Self::Bgra8888
                | Self::Argb2101010
                | Self::Abgr2101010
                | Self::Rgba1010102
                | Self::Bgra1010102
        )
    }

    pub fn bit_depth(&self) -> BitDepth {
        match self {
            Self::Argb2101010
            | Self::Abgr2101010
            | Self::Rgba1010102
            | Self::Bgra1010102
            | Self::P010 => BitDepth::Bit10,
            _ => BitDepth::Bit8,
        }
    }

    /// Horizontal and vertical chroma subsampling factors
    pub fn chroma_subsampling(&self) -> (u32, u32) {
        match self {
            Self::Nv12 | Self::Nv21 | Self::P010 | Self::Yuv420 => (2, 2),
            Self::Nv16 | Self::Nv61 => (2, 1),
            _ => (1, 1),
        }
    }

    /// Bytes per pixel of the given plane, horizontally
    pub fn bytes_per_pixel(&self, plane: usize) -> u32 {
        match (self, plane) {
            (Self::Rgb565 | Self::Bgr565, 0) => 2,
            (Self::Nv12 | Self::Nv21 | Self::Nv16 | Self::Nv61 | Self::Yuv420, 0) => 1,
            // Interleaved CbCr: two 1-byte samples per chroma pixel pair
            (Self::Nv12 | Self::Nv21 | Self::Nv16 | Self::Nv61, 1) => 1,
            (Self::Yuv420, 1 | 2) => 1,
            (Self::P010, 0 | 1) => 2,
            (_, 0) if !self.is_yuv() => 4,
            _ => 0,
        }
    }

    /// Line stride in bytes of a plane for a buffer `full_width` pixels wide
    pub fn plane_stride(&self, plane: usize, full_width: u32) -> u32 {
        let (h_sub, _) = self.chroma_subsampling();
        match (self, plane) {
            (Self::Yuv420, 1 | 2) => full_width.div_ceil(h_sub),
            _ => full_width * self.bytes_per_pixel(plane),
        }
    }

    /// Number of lines of a plane for a buffer `full_height` lines high
    pub fn plane_lines(&self, plane: usize, full_height: u32) -> u32 {
        let (_, v_sub) = self.chroma_subsampling();
        if plane == 0 {
            full_height
        } else {
            full_height.div_ceil(v_sub)
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuv_metadata() {
        assert!(PixelFormat::Nv12.is_yuv());
        assert!(PixelFormat::Nv12.is_yuv420());
        assert!(!PixelFormat::Nv16.is_yuv420());
        assert_eq!(PixelFormat::Nv16.chroma_subsampling(), (2, 1));
        assert_eq!(PixelFormat::Argb8888.chroma_subsampling(), (1, 1));
        assert_eq!(PixelFormat::P010.bit_depth(), BitDepth::Bit10);
        assert_eq!(PixelFormat::Yuv420.num_planes(), 3);
    }

    #[test]
    fn test_plane_strides() {
        assert_eq!(PixelFormat::Argb8888.plane_stride(0, 1080), 4320);
        assert_eq!(PixelFormat::Rgb565.plane_stride(0, 1080), 2160);
        assert_eq!(PixelFormat::Nv12.plane_stride(1, 1080), 1080);
        assert_eq!(PixelFormat::P010.plane_stride(1, 1080), 2160);
        assert_eq!(PixelFormat::Yuv420.plane_stride(2, 1081), 541);
        assert_eq!(PixelFormat::Nv12.plane_lines(1, 1081), 541);
        assert_eq!(PixelFormat::Nv16.plane_lines(1, 1080), 1080);
    }

    #[test]
    fn test_all_has_unique_names() {
        let mut names: Vec<_> = PixelFormat::ALL.iter().map(|f| f.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), PixelFormat::ALL.len());
    }
}
