//! Color metadata
//!
//! Per-layer color standard, transfer and range, plus the output-wide color
//! mode and render intent a requester can select.

use serde::{Deserialize, Serialize};

/// Color primaries / matrix of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorStandard {
    #[default]
    Unspecified,
    /// Rec.601 (SD video)
    Bt601,
    /// Rec.709 / sRGB primaries
    Bt709,
    /// Rec.2020 (wide gamut, HDR)
    Bt2020,
    /// DCI-P3 (digital cinema)
    DciP3,
}

impl ColorStandard {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Bt601 => "BT.601",
            Self::Bt709 => "BT.709",
            Self::Bt2020 => "BT.2020",
            Self::DciP3 => "DCI-P3",
        }
    }

    /// Check if the primaries are wider than BT.709
    pub fn is_wide_gamut(&self) -> bool {
        matches!(self, Self::Bt2020 | Self::DciP3)
    }
}

/// Transfer function (EOTF) of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorTransfer {
    #[default]
    Unspecified,
    /// sRGB piecewise gamma
    Srgb,
    /// SMPTE 170M (SD/HD video)
    Smpte170m,
    /// Linear (for intermediate processing)
    Linear,
    /// Perceptual Quantizer (HDR10)
    St2084,
    /// Hybrid Log-Gamma
    Hlg,
}

impl ColorTransfer {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Srgb => "sRGB",
            Self::Smpte170m => "SMPTE 170M",
            Self::Linear => "linear",
            Self::St2084 => "ST 2084 (PQ)",
            Self::Hlg => "HLG",
        }
    }

    /// Check if this is an HDR transfer function
    pub fn is_hdr(&self) -> bool {
        matches!(self, Self::St2084 | Self::Hlg)
    }
}

/// Quantization range of a layer or capture buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorRange {
    #[default]
    Unspecified,
    Limited,
    Full,
}

/// Layer color description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ColorInfo {
    pub standard: ColorStandard,
    pub transfer: ColorTransfer,
    pub range: ColorRange,
}

impl ColorInfo {
    /// Check if the layer needs an HDR-capable processor
    pub fn is_hdr(&self) -> bool {
        self.transfer.is_hdr()
    }
}

/// Output color mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorMode {
    #[default]
    Native,
    StandardBt601,
    StandardBt709,
    Srgb,
    DciP3,
    DisplayP3,
    Bt2020,
    Bt2100Pq,
    Bt2100Hlg,
}

impl ColorMode {
    pub const ALL: [ColorMode; 9] = [
        Self::Native,
        Self::StandardBt601,
        Self::StandardBt709,
        Self::Srgb,
        Self::DciP3,
        Self::DisplayP3,
        Self::Bt2020,
        Self::Bt2100Pq,
        Self::Bt2100Hlg,
    ];

    /// Numeric id used in property values
    pub fn id(&self) -> i64 {
        Self::ALL.iter().position(|m| m == self).unwrap_or(0) as i64
    }

    pub fn from_id(id: i64) -> Option<Self> {
        usize::try_from(id).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn is_hdr(&self) -> bool {
        matches!(self, Self::Bt2100Pq | Self::Bt2100Hlg)
    }
}

/// How out-of-gamut content is mapped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RenderIntent {
    #[default]
    Colorimetric,
    Enhance,
    ToneMapColorimetric,
    ToneMapEnhance,
}

impl RenderIntent {
    pub const ALL: [RenderIntent; 4] = [
        Self::Colorimetric,
        Self::Enhance,
        Self::ToneMapColorimetric,
        Self::ToneMapEnhance,
    ];

    pub fn id(&self) -> i64 {
        Self::ALL.iter().position(|m| m == self).unwrap_or(0) as i64
    }

    pub fn from_id(id: i64) -> Option<Self> {
        usize::try_from(id).ok().and_then(|i| Self::ALL.get(i).copied())
    }
}
