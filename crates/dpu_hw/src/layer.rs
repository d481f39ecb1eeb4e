//! Declarative description of one input layer
//!
//! A descriptor is built by the requester for every commit and handed once to
//! the configuration builder. It is never mutated inside a commit.

use serde::{Deserialize, Serialize};

use crate::color::ColorInfo;
use crate::compression::CompressionKind;
use crate::format::PixelFormat;
use crate::geometry::{Rect, SubpixelRect};
use crate::rotation::Rotation;

/// Maximum number of buffer planes a layer can reference
pub const MAX_PLANES: usize = 4;

/// Input layer description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    /// Source crop in 16.16 fixed point
    pub src: SubpixelRect,
    /// Destination on the output, whole pixels
    pub dst: Rect,
    /// Full buffer width in pixels
    pub full_width: u32,
    /// Full buffer height in pixels
    pub full_height: u32,
    pub format: PixelFormat,
    pub compression: CompressionKind,
    pub rotation: Rotation,
    /// Base address of every plane; unused entries are zero
    pub planes: [u64; MAX_PLANES],
    /// Number of valid entries in `planes`
    pub plane_count: usize,
    pub color: ColorInfo,
    /// Layer is one half of a split-rendered frame
    pub split: bool,
    /// Opaque region inside the destination the hardware may skip fetching
    pub block: Option<Rect>,
    /// Buffer holds protected content
    pub protected: bool,
    /// Blending order, 0 is the bottom
    pub zpos: u32,
}

impl LayerDescriptor {
    /// Unscaled, unrotated layer reading a whole `width` x `height` buffer at
    /// `base` and placing it at `(x, y)` on the output
    pub fn new(format: PixelFormat, width: u32, height: u32, base: u64) -> Self {
        let mut planes = [0u64; MAX_PLANES];
        let plane_count = format.num_planes();
        let mut offset = 0u64;
        for (index, plane) in planes.iter_mut().enumerate().take(plane_count) {
            *plane = base + offset;
            offset += format.plane_stride(index, width) as u64 * format.plane_lines(index, height) as u64;
        }

        Self {
            src: SubpixelRect::from_pixels(0, 0, width, height),
            dst: Rect::from_size(width, height),
            full_width: width,
            full_height: height,
            format,
            compression: CompressionKind::None,
            rotation: Rotation::ROTATE_0,
            planes,
            plane_count,
            color: ColorInfo::default(),
            split: false,
            block: None,
            protected: false,
            zpos: 0,
        }
    }

    /// Set the source crop in whole pixels
    pub fn with_src(mut self, src: Rect) -> Self {
        self.src = SubpixelRect::from_pixels(src.x, src.y, src.w, src.h);
        self
    }

    pub fn with_dst(mut self, dst: Rect) -> Self {
        self.dst = dst;
        self
    }

    pub fn with_compression(mut self, compression: CompressionKind) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_split(mut self, split: bool) -> Self {
        self.split = split;
        self
    }

    pub fn with_block(mut self, block: Rect) -> Self {
        self.block = Some(block);
        self
    }

    pub fn with_color(mut self, color: ColorInfo) -> Self {
        self.color = color;
        self
    }

    pub fn with_protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }

    pub fn with_zpos(mut self, zpos: u32) -> Self {
        self.zpos = zpos;
        self
    }

    /// Replace the plane addresses
    pub fn with_planes(mut self, planes: &[u64]) -> Self {
        self.planes = [0; MAX_PLANES];
        let count = planes.len().min(MAX_PLANES);
        self.planes[..count].copy_from_slice(&planes[..count]);
        self.plane_count = count;
        self
    }

    /// Valid plane addresses
    pub fn plane_addresses(&self) -> &[u64] {
        &self.planes[..self.plane_count.min(MAX_PLANES)]
    }
}

/// Geometry of the output the layer is composed onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationMode {
    /// Active width in pixels
    pub width: u32,
    /// Active height in pixels
    pub height: u32,
    /// Reflections the panel mounting requires on every layer
    pub reflection: Rotation,
    /// Current bus clock, when known
    pub bus_clock_khz: Option<u32>,
}

impl DestinationMode {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            reflection: Rotation::empty(),
            bus_clock_khz: None,
        }
    }

    pub fn with_bus_clock(mut self, khz: u32) -> Self {
        self.bus_clock_khz = Some(khz);
        self
    }

    pub fn with_reflection(mut self, reflection: Rotation) -> Self {
        self.reflection = reflection;
        self
    }

    pub fn rect(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_lays_out_planes() {
        let desc = LayerDescriptor::new(PixelFormat::Nv12, 1920, 1080, 0x1000_0000);
        assert_eq!(desc.plane_count, 2);
        assert_eq!(desc.plane_addresses(), &[0x1000_0000, 0x1000_0000 + 1920 * 1080]);
        assert_eq!(desc.src.to_pixels(), Rect::from_size(1920, 1080));
    }

    #[test]
    fn test_with_planes_truncates() {
        let desc = LayerDescriptor::new(PixelFormat::Argb8888, 64, 64, 0)
            .with_planes(&[1, 2, 3, 4, 5]);
        assert_eq!(desc.plane_count, MAX_PLANES);
        assert_eq!(desc.plane_addresses(), &[1, 2, 3, 4]);
    }
}
