//! Rotation and reflection masks
//!
//! Requesters describe orientation as one counter-clockwise rotation plus
//! optional reflections. The layer processor only understands a transpose
//! (90 degree rotation) followed by independent X/Y flips, so every request is
//! folded into that form.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Orientation requested for a layer
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Rotation: u32 {
        const ROTATE_0 = 1 << 0;
        const ROTATE_90 = 1 << 1;
        const ROTATE_180 = 1 << 2;
        const ROTATE_270 = 1 << 3;
        const REFLECT_X = 1 << 4;
        const REFLECT_Y = 1 << 5;
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Rotation::ROTATE_0
    }
}

bitflags! {
    /// Internal rotation mask programmed into the layer processor
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct HwRotation: u32 {
        const FLIP_X = 1 << 0;
        const FLIP_Y = 1 << 1;
        const ROT_90 = 1 << 2;
    }
}

impl HwRotation {
    /// Fold a requested orientation and the reflections the output needs
    /// into the internal mask
    pub fn from_request(requested: Rotation, required: Rotation) -> Self {
        let mut mask = Self::base(requested);
        let reflections = (requested ^ required) & (Rotation::REFLECT_X | Rotation::REFLECT_Y);
        if reflections.contains(Rotation::REFLECT_X) {
            mask.toggle(Self::FLIP_X);
        }
        if reflections.contains(Rotation::REFLECT_Y) {
            mask.toggle(Self::FLIP_Y);
        }
        mask
    }

    fn base(rotation: Rotation) -> Self {
        if rotation.contains(Rotation::ROTATE_270) {
            Self::ROT_90 | Self::FLIP_X | Self::FLIP_Y
        } else if rotation.contains(Rotation::ROTATE_180) {
            Self::FLIP_X | Self::FLIP_Y
        } else if rotation.contains(Rotation::ROTATE_90) {
            Self::ROT_90
        } else {
            Self::empty()
        }
    }

    /// Source width and height swap places
    pub fn is_rotated(&self) -> bool {
        self.contains(Self::ROT_90)
    }
}
