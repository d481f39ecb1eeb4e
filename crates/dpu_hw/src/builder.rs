//! Hardware configuration builder
//!
//! Pure mapping from a [`LayerDescriptor`] and the output geometry to the flat
//! parameter record a layer processor programs: integer rectangles, the
//! internal rotation mask, fixed-point scale ratios and per-plane addressing.
//!
//! ## Scale ratios
//!
//! Ratios are `source / destination` in 12.20 fixed point, so `1 << 20` is
//! unity, `1 << 19` a 2x upscale and `1 << 22` a 4x downscale. A rotated
//! layer uses its swapped source size.
//!
//! ## SBWC addressing
//!
//! ```text
//! lossless                           lossy
//! plane0 ─► ┌──────────────┐         plane0 ─► ┌──────────────┐
//!           │ luma payload │                   │ luma payload │ (header == payload)
//!           ├──────────────┤                   └──────────────┘
//!           │ luma header  │         plane1 ─► ┌──────────────┐
//!           └──────────────┘                   │chroma payload│
//! plane1 ─► ┌──────────────┐                   └──────────────┘
//!           │chroma payload│
//!           ├──────────────┤
//!           │chroma header │
//!           └──────────────┘
//! ```
//!
//! When a single allocation holds both planes, the chroma base follows the
//! complete luma plane.

use serde::{Deserialize, Serialize};

use crate::color::ColorInfo;
use crate::compression::{
    sbwc_header_stride, sbwc_lossy_stride, sbwc_payload_stride, CompressionKind, SbwcPlaneSizes,
};
use crate::error::{DpuError, DpuResult};
use crate::format::PixelFormat;
use crate::geometry::Rect;
use crate::layer::{DestinationMode, LayerDescriptor, MAX_PLANES};
use crate::rotation::HwRotation;

/// Fractional bits of a scale ratio
pub const RATIO_SHIFT: u32 = 20;

/// Ratio of an unscaled axis
pub const RATIO_UNITY: u32 = 1 << RATIO_SHIFT;

/// Pixels removed from the split-rendering numerator
pub const SPLIT_SCALE_PADDING: u32 = 4;

/// Watchdog threshold used when no bus clock is known
pub const DEFAULT_RECOVERY_THRESHOLD: u32 = 0x7fff_ffff;

/// Watchdog window, in milliseconds of bus clock cycles
pub const RECOVERY_WINDOW_MS: u32 = 17;

/// Header and payload sub-regions of one SBWC plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompressedPlane {
    pub header_addr: u64,
    pub payload_addr: u64,
    pub header_stride: u32,
    pub payload_stride: u32,
    pub header_size: u64,
    pub payload_size: u64,
}

impl CompressedPlane {
    /// Byte range of the header region
    pub fn header_range(&self) -> std::ops::Range<u64> {
        self.header_addr..self.header_addr + self.header_size
    }

    /// Byte range of the payload region
    pub fn payload_range(&self) -> std::ops::Range<u64> {
        self.payload_addr..self.payload_addr + self.payload_size
    }
}

/// Memory addressing of a configured layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaneLayout {
    /// Plane addresses used verbatim (uncompressed, AFBC, SAJC)
    Direct {
        addresses: [u64; MAX_PLANES],
        strides: [u32; MAX_PLANES],
        count: usize,
    },
    /// SBWC header/payload addressing
    Sbwc {
        lossy: bool,
        luma: CompressedPlane,
        chroma: CompressedPlane,
    },
}

/// Parameters derived for one layer, one commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareConfig {
    pub src: Rect,
    pub src_full_width: u32,
    pub src_full_height: u32,
    pub dst: Rect,
    pub dst_full_width: u32,
    pub dst_full_height: u32,
    pub format: PixelFormat,
    pub compression: CompressionKind,
    pub rotation: HwRotation,
    pub h_ratio: u32,
    pub v_ratio: u32,
    pub is_scaled: bool,
    pub planes: PlaneLayout,
    /// Compression block size in pixels
    pub comp_block: Option<(u32, u32)>,
    pub is_block: bool,
    pub block: Option<Rect>,
    pub color: ColorInfo,
    pub protected: bool,
    pub zpos: u32,
    /// Cycles before the hardware watchdog declares a deadlock
    pub recovery_threshold: u32,
}

impl HardwareConfig {
    /// Source size as seen by the scaler (swapped when rotated)
    pub fn effective_src_size(&self) -> (u32, u32) {
        if self.rotation.is_rotated() {
            (self.src.h, self.src.w)
        } else {
            (self.src.w, self.src.h)
        }
    }
}

/// Derive the hardware parameters of one layer
pub fn build(desc: &LayerDescriptor, mode: &DestinationMode) -> DpuResult<HardwareConfig> {
    if !desc.compression.supports_format(desc.format) {
        return Err(DpuError::UnsupportedFormat(format!(
            "{} cannot be {} compressed",
            desc.format, desc.compression
        )));
    }
    if desc.plane_count == 0 || desc.plane_count > MAX_PLANES {
        return Err(DpuError::InvalidArgument(format!(
            "{} plane addresses given",
            desc.plane_count
        )));
    }

    let src = desc.src.to_pixels();
    let dst = desc.dst;
    if dst.w == 0 || dst.h == 0 {
        return Err(DpuError::BadRange {
            field: if dst.w == 0 { "dst_w" } else { "dst_h" },
            value: 0,
            min: 1,
            max: u32::MAX,
        });
    }

    let rotation = HwRotation::from_request(desc.rotation, mode.reflection);
    let (h_ratio, v_ratio) = scale_ratios(desc, src, dst, rotation);
    let planes = plane_layout(desc)?;

    let config = HardwareConfig {
        src,
        src_full_width: desc.full_width,
        src_full_height: desc.full_height,
        dst,
        dst_full_width: mode.width,
        dst_full_height: mode.height,
        format: desc.format,
        compression: desc.compression,
        rotation,
        h_ratio,
        v_ratio,
        is_scaled: h_ratio != RATIO_UNITY || v_ratio != RATIO_UNITY,
        planes,
        comp_block: desc.compression.block_size(),
        is_block: desc.block.map_or(false, |b| !b.is_empty()),
        block: desc.block.filter(|b| !b.is_empty()),
        color: desc.color,
        protected: desc.protected,
        zpos: desc.zpos,
        recovery_threshold: recovery_threshold(mode),
    };

    log::trace!(
        "built config {}x{} -> {}x{} ratio {:#x}/{:#x} rot {:?}",
        src.w,
        src.h,
        dst.w,
        dst.h,
        h_ratio,
        v_ratio,
        rotation
    );

    Ok(config)
}

fn scale_ratios(desc: &LayerDescriptor, src: Rect, dst: Rect, rotation: HwRotation) -> (u32, u32) {
    let (mut src_w, mut src_h) = (src.w, src.h);

    // Split rendering pads the half that runs along the longer side of the
    // framebuffer; a square framebuffer counts as landscape.
    if desc.split {
        if desc.full_width >= desc.full_height {
            src_w = src_w.saturating_sub(SPLIT_SCALE_PADDING);
        } else {
            src_h = src_h.saturating_sub(SPLIT_SCALE_PADDING);
        }
    }

    if rotation.is_rotated() {
        std::mem::swap(&mut src_w, &mut src_h);
    }

    (ratio(src_w, dst.w), ratio(src_h, dst.h))
}

/// `(src << 20) / dst`, saturated to the 32-bit register width
pub fn ratio(src: u32, dst: u32) -> u32 {
    let value = ((src as u64) << RATIO_SHIFT) / dst.max(1) as u64;
    value.min(u32::MAX as u64) as u32
}

fn plane_layout(desc: &LayerDescriptor) -> DpuResult<PlaneLayout> {
    match desc.compression {
        CompressionKind::Sbwc => Ok(sbwc_lossless(desc)),
        CompressionKind::SbwcLossy(_) => Ok(sbwc_lossy(desc)),
        CompressionKind::None | CompressionKind::Afbc(_) | CompressionKind::Sajc => {
            let required = if desc.compression.is_compressed() {
                1
            } else {
                desc.format.num_planes()
            };
            if desc.plane_count < required {
                return Err(DpuError::InvalidArgument(format!(
                    "{} needs {} planes, got {}",
                    desc.format, required, desc.plane_count
                )));
            }

            let mut strides = [0u32; MAX_PLANES];
            if !desc.compression.is_compressed() {
                for (plane, stride) in strides.iter_mut().enumerate().take(desc.plane_count) {
                    *stride = desc.format.plane_stride(plane, desc.full_width);
                }
            }
            Ok(PlaneLayout::Direct {
                addresses: desc.planes,
                strides,
                count: desc.plane_count,
            })
        }
    }
}

fn sbwc_lossless(desc: &LayerDescriptor) -> PlaneLayout {
    let depth = desc.format.bit_depth();
    let sizes = SbwcPlaneSizes::lossless(desc.full_width, desc.full_height, depth);
    let payload_stride = sbwc_payload_stride(desc.full_width, depth);
    let header_stride = sbwc_header_stride(desc.full_width);

    let luma_base = desc.planes[0];
    let chroma_base = if desc.plane_count >= 2 {
        desc.planes[1]
    } else {
        luma_base + sizes.luma_total()
    };

    let luma = CompressedPlane {
        header_addr: luma_base + sizes.luma_payload,
        payload_addr: luma_base,
        header_stride,
        payload_stride,
        header_size: sizes.luma_header,
        payload_size: sizes.luma_payload,
    };
    let chroma = CompressedPlane {
        header_addr: chroma_base + sizes.chroma_payload,
        payload_addr: chroma_base,
        header_stride,
        payload_stride,
        header_size: sizes.chroma_header,
        payload_size: sizes.chroma_payload,
    };

    PlaneLayout::Sbwc {
        lossy: false,
        luma,
        chroma,
    }
}

fn sbwc_lossy(desc: &LayerDescriptor) -> PlaneLayout {
    let rate = match desc.compression {
        CompressionKind::SbwcLossy(rate) => rate,
        _ => Default::default(),
    };
    let depth = desc.format.bit_depth();
    let sizes = SbwcPlaneSizes::lossy(desc.full_width, desc.full_height, depth, rate);
    let payload_stride = sbwc_lossy_stride(desc.full_width, depth, rate);

    let luma_base = desc.planes[0];
    let chroma_base = if desc.plane_count >= 2 {
        desc.planes[1]
    } else {
        luma_base + sizes.luma_total()
    };

    // Lossy buffers have no header: it aliases the payload with a zero stride
    let luma = CompressedPlane {
        header_addr: luma_base,
        payload_addr: luma_base,
        header_stride: 0,
        payload_stride,
        header_size: 0,
        payload_size: sizes.luma_payload,
    };
    let chroma = CompressedPlane {
        header_addr: chroma_base,
        payload_addr: chroma_base,
        header_stride: 0,
        payload_stride,
        header_size: 0,
        payload_size: sizes.chroma_payload,
    };

    PlaneLayout::Sbwc {
        lossy: true,
        luma,
        chroma,
    }
}

fn recovery_threshold(mode: &DestinationMode) -> u32 {
    match mode.bus_clock_khz {
        Some(khz) if khz > 0 => {
            let cycles = khz as u64 * RECOVERY_WINDOW_MS as u64;
            cycles.min(DEFAULT_RECOVERY_THRESHOLD as u64) as u32
        }
        _ => DEFAULT_RECOVERY_THRESHOLD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{AfbcBlock, LossyRate};
    use crate::error::ErrorKind;
    use crate::rotation::Rotation;

    fn mode() -> DestinationMode {
        DestinationMode::new(3840, 2160)
    }

    #[test]
    fn test_upscale_ratio() {
        let desc = LayerDescriptor::new(PixelFormat::Argb8888, 1920, 1080, 0x8000_0000)
            .with_dst(Rect::from_size(3840, 2160));
        let config = build(&desc, &mode()).unwrap();
        assert_eq!(config.h_ratio, 1 << 19);
        assert_eq!(config.v_ratio, 1 << 19);
        assert!(config.is_scaled);
    }

    #[test]
    fn test_unscaled_layer() {
        let desc = LayerDescriptor::new(PixelFormat::Argb8888, 1920, 1080, 0);
        let config = build(&desc, &mode()).unwrap();
        assert_eq!(config.h_ratio, RATIO_UNITY);
        assert_eq!(config.v_ratio, RATIO_UNITY);
        assert!(!config.is_scaled);
        assert_eq!(config.recovery_threshold, DEFAULT_RECOVERY_THRESHOLD);
    }

    #[test]
    fn test_rotation_swaps_ratio_axes() {
        // 1080x1920 portrait buffer rotated onto a 1920x1080 landscape window
        let desc = LayerDescriptor::new(PixelFormat::Nv12, 1080, 1920, 0)
            .with_dst(Rect::from_size(1920, 1080))
            .with_rotation(Rotation::ROTATE_90);
        let config = build(&desc, &mode()).unwrap();
        assert!(config.rotation.is_rotated());
        assert_eq!(config.h_ratio, RATIO_UNITY);
        assert_eq!(config.v_ratio, RATIO_UNITY);
        assert!(!config.is_scaled);
        assert_eq!(config.effective_src_size(), (1920, 1080));
    }

    #[test]
    fn test_split_padding_follows_long_side() {
        let landscape = LayerDescriptor::new(PixelFormat::Argb8888, 2000, 1000, 0)
            .with_dst(Rect::from_size(1000, 1000))
            .with_split(true);
        let config = build(&landscape, &mode()).unwrap();
        assert_eq!(config.h_ratio, ratio(2000 - SPLIT_SCALE_PADDING, 1000));
        assert_eq!(config.v_ratio, RATIO_UNITY);

        let portrait = LayerDescriptor::new(PixelFormat::Argb8888, 1000, 2000, 0)
            .with_dst(Rect::from_size(1000, 1000))
            .with_split(true);
        let config = build(&portrait, &mode()).unwrap();
        assert_eq!(config.h_ratio, RATIO_UNITY);
        assert_eq!(config.v_ratio, ratio(2000 - SPLIT_SCALE_PADDING, 1000));
    }

    #[test]
    fn test_subpixel_source_is_truncated() {
        let mut desc = LayerDescriptor::new(PixelFormat::Argb8888, 1920, 1080, 0);
        desc.src.x = (10 << 16) | 0x4000;
        desc.src.w = (1900 << 16) | 0xc000;
        desc.dst = Rect::new(0, 0, 1900, 1080);
        let config = build(&desc, &mode()).unwrap();
        assert_eq!(config.src.x, 10);
        assert_eq!(config.src.w, 1900);
        assert!(!config.is_scaled);
    }

    #[test]
    fn test_direct_planes_verbatim() {
        let desc = LayerDescriptor::new(PixelFormat::Nv12, 1920, 1080, 0x1000)
            .with_planes(&[0x1000, 0x9000]);
        let config = build(&desc, &mode()).unwrap();
        match config.planes {
            PlaneLayout::Direct { addresses, strides, count } => {
                assert_eq!(count, 2);
                assert_eq!(&addresses[..2], &[0x1000, 0x9000]);
                assert_eq!(&strides[..2], &[1920, 1920]);
            }
            other => panic!("unexpected layout {:?}", other),
        }
    }

    #[test]
    fn test_afbc_keeps_address_and_block() {
        let desc = LayerDescriptor::new(PixelFormat::Argb8888, 1920, 1080, 0x4000)
            .with_compression(CompressionKind::Afbc(AfbcBlock::Block32x8));
        let config = build(&desc, &mode()).unwrap();
        assert_eq!(config.comp_block, Some((32, 8)));
        match config.planes {
            PlaneLayout::Direct { addresses, strides, .. } => {
                assert_eq!(addresses[0], 0x4000);
                assert_eq!(strides[0], 0);
            }
            other => panic!("unexpected layout {:?}", other),
        }
    }

    #[test]
    fn test_sbwc_lossless_addresses() {
        let base = 0x2000_0000u64;
        let desc = LayerDescriptor::new(PixelFormat::Nv12, 1920, 1080, base)
            .with_planes(&[base])
            .with_compression(CompressionKind::Sbwc);
        let config = build(&desc, &mode()).unwrap();
        let sizes = SbwcPlaneSizes::lossless(1920, 1080, crate::format::BitDepth::Bit8);

        match config.planes {
            PlaneLayout::Sbwc { lossy, luma, chroma } => {
                assert!(!lossy);
                assert_eq!(luma.payload_addr, base);
                assert_eq!(luma.header_addr, base + sizes.luma_payload);
                assert_eq!(chroma.payload_addr, base + sizes.luma_total());
                assert_eq!(chroma.header_addr, chroma.payload_addr + sizes.chroma_payload);
                assert_eq!(luma.payload_stride, 7680);
                assert_eq!(luma.header_stride, 32);
            }
            other => panic!("unexpected layout {:?}", other),
        }
    }

    #[test]
    fn test_sbwc_lossy_shares_base() {
        let desc = LayerDescriptor::new(PixelFormat::Nv12, 1920, 1080, 0x100)
            .with_planes(&[0x100, 0x80_0000])
            .with_compression(CompressionKind::SbwcLossy(LossyRate::Percent50));
        let config = build(&desc, &mode()).unwrap();
        match config.planes {
            PlaneLayout::Sbwc { lossy, luma, chroma } => {
                assert!(lossy);
                assert_eq!(luma.header_addr, luma.payload_addr);
                assert_eq!(luma.payload_addr, 0x100);
                assert_eq!(chroma.payload_addr, 0x80_0000);
                assert_eq!(luma.header_stride, 0);
                assert_eq!(luma.payload_stride, 64 * 60);
            }
            other => panic!("unexpected layout {:?}", other),
        }
    }

    #[test]
    fn test_incompatible_compression() {
        let desc = LayerDescriptor::new(PixelFormat::Argb8888, 64, 64, 0)
            .with_compression(CompressionKind::Sbwc);
        let err = build(&desc, &mode()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_zero_destination_rejected() {
        let desc = LayerDescriptor::new(PixelFormat::Argb8888, 64, 64, 0).with_dst(Rect::new(0, 0, 0, 64));
        let err = build(&desc, &mode()).unwrap_err();
        assert_eq!(err.field(), Some("dst_w"));
    }

    #[test]
    fn test_recovery_threshold_uses_bus_clock() {
        let desc = LayerDescriptor::new(PixelFormat::Argb8888, 64, 64, 0);
        let config = build(&desc, &mode().with_bus_clock(400_000)).unwrap();
        assert_eq!(config.recovery_threshold, 400_000 * RECOVERY_WINDOW_MS);
    }

    #[test]
    fn test_block_region_flag() {
        let desc = LayerDescriptor::new(PixelFormat::Argb8888, 256, 256, 0).with_block(Rect::new(0, 0, 128, 128));
        let config = build(&desc, &mode()).unwrap();
        assert!(config.is_block);

        let desc = LayerDescriptor::new(PixelFormat::Argb8888, 256, 256, 0).with_block(Rect::default());
        let config = build(&desc, &mode()).unwrap();
        assert!(!config.is_block);
        assert_eq!(config.block, None);
    }
}
