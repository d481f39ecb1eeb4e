//! Rectangles and fixed-point helpers

use serde::{Deserialize, Serialize};

/// Number of fractional bits in sub-pixel source coordinates
pub const SUBPIXEL_SHIFT: u32 = 16;

/// Integer pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Rectangle anchored at the origin
    pub const fn from_size(w: u32, h: u32) -> Self {
        Self { x: 0, y: 0, w, h }
    }

    /// Exclusive right edge
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.w)
    }

    /// Exclusive bottom edge
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.h)
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Same size, ignoring position
    pub fn same_size(&self, other: &Rect) -> bool {
        self.w == other.w && self.h == other.h
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let r = self.right().max(other.right());
        let b = self.bottom().max(other.bottom());
        Rect::new(x, y, r - x, b - y)
    }

    /// Overlapping area, `None` when disjoint
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let r = self.right().min(other.right());
        let b = self.bottom().min(other.bottom());
        if r <= x || b <= y {
            None
        } else {
            Some(Rect::new(x, y, r - x, b - y))
        }
    }

    /// Check if `other` lies entirely inside this rectangle
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// Source rectangle in 16.16 fixed point, as handed over by the requester
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SubpixelRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl SubpixelRect {
    /// Build from whole pixels
    pub const fn from_pixels(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self {
            x: x << SUBPIXEL_SHIFT,
            y: y << SUBPIXEL_SHIFT,
            w: w << SUBPIXEL_SHIFT,
            h: h << SUBPIXEL_SHIFT,
        }
    }

    /// Drop the fractional part of every field
    pub fn to_pixels(&self) -> Rect {
        Rect::new(
            self.x >> SUBPIXEL_SHIFT,
            self.y >> SUBPIXEL_SHIFT,
            self.w >> SUBPIXEL_SHIFT,
            self.h >> SUBPIXEL_SHIFT,
        )
    }
}

/// Round `value` up to a multiple of `align` (`align` of 0 or 1 is a no-op)
pub fn align_up(value: u32, align: u32) -> u32 {
    if align <= 1 {
        return value;
    }
    value.div_ceil(align) * align
}

/// Round `value` down to a multiple of `align`
pub fn align_down(value: u32, align: u32) -> u32 {
    if align <= 1 {
        return value;
    }
    value - value % align
}

pub fn is_aligned(value: u32, align: u32) -> bool {
    align <= 1 || value % align == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subpixel_truncates() {
        let src = SubpixelRect {
            x: (10 << 16) | 0x8000,
            y: 3 << 16,
            w: (100 << 16) | 0xffff,
            h: 50 << 16,
        };
        assert_eq!(src.to_pixels(), Rect::new(10, 3, 100, 50));
    }

    #[test]
    fn test_union_and_intersection() {
        let a = Rect::new(0, 0, 100, 100);
        let b = Rect::new(50, 80, 100, 100);
        assert_eq!(a.union(&b), Rect::new(0, 0, 150, 180));
        assert_eq!(a.intersection(&b), Some(Rect::new(50, 80, 50, 20)));
        assert_eq!(a.intersection(&Rect::new(200, 0, 5, 5)), None);
        assert_eq!(Rect::default().union(&b), b);
    }

    #[test]
    fn test_alignment_helpers() {
        assert_eq!(align_up(17, 16), 32);
        assert_eq!(align_up(32, 16), 32);
        assert_eq!(align_down(17, 16), 16);
        assert_eq!(align_up(5, 0), 5);
        assert!(is_aligned(64, 32));
        assert!(!is_aligned(65, 2));
        assert!(is_aligned(7, 1));
    }
}
