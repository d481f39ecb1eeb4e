//! Per device class capability and limit tables
//!
//! Every layer processor and capture device is registered with one of these
//! tables. The tables are immutable once loaded and shared read-only between
//! the commit path and anyone dumping them (the `hardware_restrictions` blob).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{DpuError, DpuResult};
use crate::geometry::is_aligned;

bitflags! {
    /// Features a device advertises
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Capabilities: u32 {
        const AFBC = 1 << 0;
        const SAJC = 1 << 1;
        const SBWC = 1 << 2;
        const SBWC_LOSSY = 1 << 3;
        const SCALE = 1 << 4;
        const ROTATION = 1 << 5;
        const FLIP = 1 << 6;
        const YUV = 1 << 7;
        const HDR = 1 << 8;
        const CSC = 1 << 9;
        const PROTECTION = 1 << 10;
        const BLOCK = 1 << 11;
        const WRITEBACK = 1 << 12;
    }
}

/// Hardware variants a device can be registered as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// Graphics layer: RGB, AFBC/SAJC, no scaler
    Gf,
    /// Video layer: adds YUV and lossless SBWC
    Vg,
    /// Video layer with scaler
    Vgs,
    /// Video layer with rotation, flip, scaler and lossy SBWC
    Vgrfs,
    /// Capture (writeback) sink
    Wb,
}

impl DeviceClass {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gf => "GF",
            Self::Vg => "VG",
            Self::Vgs => "VGS",
            Self::Vgrfs => "VGRFS",
            Self::Wb => "WB",
        }
    }

    /// Capability bitset of the class
    pub fn capabilities(&self) -> Capabilities {
        let graphics = Capabilities::AFBC
            | Capabilities::SAJC
            | Capabilities::FLIP
            | Capabilities::BLOCK
            | Capabilities::PROTECTION;
        match self {
            Self::Gf => graphics,
            Self::Vg => graphics | Capabilities::YUV | Capabilities::SBWC | Capabilities::CSC,
            Self::Vgs => {
                graphics | Capabilities::YUV | Capabilities::SBWC | Capabilities::CSC | Capabilities::SCALE
            }
            Self::Vgrfs => Capabilities::all() - Capabilities::WRITEBACK,
            Self::Wb => Capabilities::WRITEBACK | Capabilities::YUV | Capabilities::CSC,
        }
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Allowed `[min, max]` range plus alignment of one dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SizeRange {
    pub min: u32,
    pub max: u32,
    pub align: u32,
}

impl SizeRange {
    pub const fn new(min: u32, max: u32, align: u32) -> Self {
        Self { min, max, align }
    }

    /// Check `value` against the range, with `mult` applied to the minimum and
    /// the alignment (chroma subsampling)
    pub fn check(&self, field: &'static str, value: u32, mult: u32) -> DpuResult<()> {
        self.check_with_max(field, value, mult, self.max)
    }

    /// Same as [`SizeRange::check`] with an overridden ceiling
    pub fn check_with_max(&self, field: &'static str, value: u32, mult: u32, max: u32) -> DpuResult<()> {
        let min = self.min * mult;
        if value < min || value > max {
            return Err(DpuError::BadRange {
                field,
                value,
                min,
                max,
            });
        }
        let align = self.align * mult;
        if !is_aligned(value, align) {
            return Err(DpuError::BadAlignment { field, value, align });
        }
        Ok(())
    }
}

/// Limits of one device class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionTable {
    pub class: DeviceClass,

    pub src_f_w: SizeRange,
    pub src_f_h: SizeRange,
    pub src_w: SizeRange,
    pub src_h: SizeRange,
    pub src_x_align: u32,
    pub src_y_align: u32,

    pub dst_f_w: SizeRange,
    pub dst_f_h: SizeRange,
    pub dst_w: SizeRange,
    pub dst_h: SizeRange,
    pub dst_x_align: u32,
    pub dst_y_align: u32,

    pub blk_w: SizeRange,
    pub blk_h: SizeRange,
    pub blk_x_align: u32,
    pub blk_y_align: u32,

    /// Width ceiling of a rotated source
    pub src_w_rot_max: u32,
    /// Height ceiling of a rotated source
    pub src_h_rot_max: u32,

    /// Maximum downscale factor (source / destination)
    pub scale_down: u32,
    /// Maximum upscale factor (destination / source)
    pub scale_up: u32,
}

impl RestrictionTable {
    /// Built-in table for a device class
    pub fn for_class(class: DeviceClass) -> Self {
        let mut table = Self {
            class,
            src_f_w: SizeRange::new(16, 65534, 1),
            src_f_h: SizeRange::new(16, 8190, 1),
            src_w: SizeRange::new(16, 8192, 1),
            src_h: SizeRange::new(16, 4320, 1),
            src_x_align: 1,
            src_y_align: 1,
            dst_f_w: SizeRange::new(16, 8190, 1),
            dst_f_h: SizeRange::new(16, 8190, 1),
            dst_w: SizeRange::new(16, 8192, 1),
            dst_h: SizeRange::new(16, 4320, 1),
            dst_x_align: 1,
            dst_y_align: 1,
            blk_w: SizeRange::new(4, 8192, 1),
            blk_h: SizeRange::new(1, 4320, 1),
            blk_x_align: 1,
            blk_y_align: 1,
            src_w_rot_max: 8192,
            src_h_rot_max: 4320,
            scale_down: 1,
            scale_up: 1,
        };

        match class {
            DeviceClass::Gf | DeviceClass::Vg => {}
            DeviceClass::Vgs => {
                table.scale_down = 2;
                table.scale_up = 8;
            }
            DeviceClass::Vgrfs => {
                table.scale_down = 4;
                table.scale_up = 8;
                table.src_w_rot_max = 4096;
                table.src_h_rot_max = 4096;
            }
            DeviceClass::Wb => {
                table.src_w = SizeRange::new(16, 4096, 1);
                table.src_h = SizeRange::new(16, 4096, 1);
                table.dst_f_w = SizeRange::new(16, 4096, 2);
                table.dst_f_h = SizeRange::new(16, 4096, 2);
                table.dst_w = SizeRange::new(16, 4096, 2);
                table.dst_h = SizeRange::new(16, 4096, 2);
                table.dst_x_align = 2;
                table.dst_y_align = 2;
                table.src_w_rot_max = 4096;
                table.src_h_rot_max = 4096;
            }
        }

        table
    }

    /// Smallest accepted ratio (maximum upscale), unity = 1 << 20
    pub fn min_ratio(&self) -> u32 {
        (1u32 << 20) / self.scale_up.max(1)
    }

    /// Largest accepted ratio (maximum downscale), unity = 1 << 20
    pub fn max_ratio(&self) -> u32 {
        self.scale_down.max(1) << 20
    }

    /// Encode as the immutable `hardware_restrictions` blob
    pub fn to_blob(&self) -> DpuResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a blob produced by [`RestrictionTable::to_blob`]
    pub fn from_blob(blob: &[u8]) -> DpuResult<Self> {
        Ok(bincode::deserialize(blob)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_size_range_check() {
        let range = SizeRange::new(16, 4096, 2);
        assert!(range.check("src_w", 1920, 1).is_ok());

        let err = range.check("src_w", 8, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRange);

        let err = range.check("src_w", 1921, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadAlignment);
        assert_eq!(err.field(), Some("src_w"));

        // YUV doubles both the minimum and the alignment
        let err = range.check("src_w", 18, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRange);
        let err = range.check("src_w", 34, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadAlignment);
        assert!(range.check("src_w", 36, 2).is_ok());
    }

    #[test]
    fn test_class_capabilities() {
        assert!(!DeviceClass::Gf.capabilities().contains(Capabilities::SCALE));
        assert!(DeviceClass::Vgs.capabilities().contains(Capabilities::SCALE));
        assert!(!DeviceClass::Vgs.capabilities().contains(Capabilities::SBWC_LOSSY));
        assert!(DeviceClass::Vgrfs.capabilities().contains(Capabilities::ROTATION));
        assert!(!DeviceClass::Vgrfs.capabilities().contains(Capabilities::WRITEBACK));
        assert!(DeviceClass::Wb.capabilities().contains(Capabilities::WRITEBACK));
    }

    #[test]
    fn test_ratio_limits() {
        let table = RestrictionTable::for_class(DeviceClass::Vgrfs);
        assert_eq!(table.max_ratio(), 4 << 20);
        assert_eq!(table.min_ratio(), 1 << 17);

        let table = RestrictionTable::for_class(DeviceClass::Gf);
        assert_eq!(table.max_ratio(), 1 << 20);
        assert_eq!(table.min_ratio(), 1 << 20);
    }

    #[test]
    fn test_blob_roundtrip() {
        let table = RestrictionTable::for_class(DeviceClass::Wb);
        let blob = table.to_blob().unwrap();
        assert_eq!(RestrictionTable::from_blob(&blob).unwrap(), table);
        assert!(RestrictionTable::from_blob(&blob[..4]).is_err());
    }
}
