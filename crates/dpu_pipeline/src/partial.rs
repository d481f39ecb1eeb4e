//! Partial-region update
//!
//! The panel keeps the previous frame, so a partial update must redraw both
//! the area requested now and the area that changed last frame. The result is
//! expanded to the panel's update granularity and clamped to the mode.

use dpu_hw::geometry::{align_down, align_up};
use dpu_hw::Rect;

/// Redraw rectangle tracker of one output
#[derive(Debug, Clone)]
pub struct PartialUpdate {
    align_w: u32,
    align_h: u32,
    /// Region drawn by the previous frame; `None` after a full update
    prev: Option<Rect>,
}

impl PartialUpdate {
    pub fn new(align_w: u32, align_h: u32) -> Self {
        Self {
            align_w: align_w.max(1),
            align_h: align_h.max(1),
            prev: None,
        }
    }

    /// Area the next frame must redraw, `None` for a full-frame update
    pub fn redraw_rect(&mut self, requested: Option<Rect>, mode: Rect) -> Option<Rect> {
        let Some(requested) = requested else {
            self.prev = None;
            return None;
        };

        // After a full update the whole panel counts as changed
        let prev = self.prev.unwrap_or(mode);
        let union = prev.union(&requested);
        let aligned = self.align(union, mode);

        self.prev = Some(requested);
        if aligned == mode {
            None
        } else {
            Some(aligned)
        }
    }

    fn align(&self, rect: Rect, mode: Rect) -> Rect {
        let x = align_down(rect.x, self.align_w);
        let y = align_down(rect.y, self.align_h);
        let right = align_up(rect.right(), self.align_w).min(mode.right());
        let bottom = align_up(rect.bottom(), self.align_h).min(mode.bottom());
        Rect::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }

    /// Forget history, next partial update redraws everything
    pub fn reset(&mut self) {
        self.prev = None;
    }
}

impl Default for PartialUpdate {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODE: Rect = Rect::from_size(1080, 2400);

    #[test]
    fn test_first_partial_after_full_redraws_all() {
        let mut partial = PartialUpdate::new(4, 4);
        assert_eq!(partial.redraw_rect(Some(Rect::new(0, 0, 100, 100)), MODE), None);
    }

    #[test]
    fn test_union_with_previous() {
        let mut partial = PartialUpdate::new(1, 1);
        partial.redraw_rect(Some(Rect::new(0, 0, 100, 100)), MODE);
        let redraw = partial.redraw_rect(Some(Rect::new(200, 200, 50, 50)), MODE);
        assert_eq!(redraw, Some(Rect::new(0, 0, 250, 250)));

        let redraw = partial.redraw_rect(Some(Rect::new(200, 200, 50, 50)), MODE);
        assert_eq!(redraw, Some(Rect::new(200, 200, 50, 50)));
    }

    #[test]
    fn test_alignment_and_clamp() {
        let mut partial = PartialUpdate::new(8, 16);
        partial.redraw_rect(Some(Rect::new(1000, 2390, 70, 10)), MODE);
        let redraw = partial.redraw_rect(Some(Rect::new(1003, 2391, 70, 9)), MODE);
        assert_eq!(redraw, Some(Rect::new(1000, 2384, 80, 16)));
    }

    #[test]
    fn test_full_update_resets() {
        let mut partial = PartialUpdate::new(1, 1);
        partial.redraw_rect(Some(Rect::new(0, 0, 10, 10)), MODE);
        assert_eq!(partial.redraw_rect(None, MODE), None);
        assert_eq!(partial.redraw_rect(Some(Rect::new(0, 0, 10, 10)), MODE), None);
    }
}
