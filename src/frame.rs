use crate::types::{Pt, Rect};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Fits; `top` is the y of the reserved band.
    Placed { top: Pt },
    /// Taller than an empty frame; placed anyway so pagination keeps moving.
    Forced { top: Pt },
    Overflow,
}

/// Vertical content region of one page with a downward cursor.
#[derive(Debug, Clone)]
pub struct Frame {
    rect: Rect,
    cursor_y: Pt,
}

impl Frame {
    pub fn new(rect: Rect) -> Self {
        Self {
            rect,
            cursor_y: Pt::ZERO,
        }
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Absolute y of the cursor.
    pub fn cursor(&self) -> Pt {
        self.rect.y + self.cursor_y
    }

    pub fn remaining_height(&self) -> Pt {
        (self.rect.height - self.cursor_y).max(Pt::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.cursor_y <= Pt::ZERO
    }

    pub fn fits(&self, height: Pt) -> bool {
        height <= self.remaining_height()
    }

    /// Reserves `height` below the cursor.
    pub fn place(&mut self, height: Pt) -> Placement {
        let top = self.cursor();
        if self.fits(height) {
            self.cursor_y += height;
            return Placement::Placed { top };
        }
        if self.is_empty() {
            self.cursor_y = self.rect.height.max(height);
            return Placement::Forced { top };
        }
        Placement::Overflow
    }

    /// Moves the cursor without a fit check; spacing may run past the bottom.
    pub fn advance(&mut self, amount: Pt) {
        self.cursor_y += amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(height: i32) -> Frame {
        Frame::new(Rect::new(
            Pt::from_i32(72),
            Pt::from_i32(72),
            Pt::from_i32(451),
            Pt::from_i32(height),
        ))
    }

    #[test]
    fn places_until_full() {
        let mut frame = frame(100);
        assert_eq!(
            frame.place(Pt::from_i32(60)),
            Placement::Placed {
                top: Pt::from_i32(72)
            }
        );
        assert_eq!(frame.cursor(), Pt::from_i32(132));
        assert_eq!(frame.place(Pt::from_i32(50)), Placement::Overflow);
        assert_eq!(
            frame.place(Pt::from_i32(40)),
            Placement::Placed {
                top: Pt::from_i32(132)
            }
        );
        assert!(!frame.fits(Pt::from_f32(0.5)));
    }

    #[test]
    fn oversized_content_is_forced_into_an_empty_frame() {
        let mut frame = frame(100);
        assert_eq!(
            frame.place(Pt::from_i32(500)),
            Placement::Forced {
                top: Pt::from_i32(72)
            }
        );
        assert_eq!(frame.remaining_height(), Pt::ZERO);
        assert_eq!(frame.place(Pt::from_i32(1)), Placement::Overflow);
    }
}
