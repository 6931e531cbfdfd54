use fixed::types::I32F32;

/// Layout length in PDF points.
///
/// Values are snapped to thousandths of a point and held in `I32F32`, so the
/// same template always sums to the same page positions.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Pt(I32F32);

const FRAC_ONE: i128 = 1 << 32;

impl Pt {
    pub const ZERO: Pt = Pt(I32F32::from_bits(0));

    pub fn from_i32(value: i32) -> Pt {
        Pt::from_milli(value as i128 * 1000)
    }

    pub fn from_f32(value: f32) -> Pt {
        Pt::from_f64(value as f64)
    }

    pub fn from_f64(value: f64) -> Pt {
        // f64 inputs share the f32 grid.
        let narrowed = value as f32;
        if !narrowed.is_finite() {
            return Pt::ZERO;
        }
        let milli = (narrowed as f64 * 1000.0).round();
        Pt::from_milli(milli.clamp(i64::MIN as f64, i64::MAX as f64) as i128)
    }

    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    pub fn to_milli_i64(self) -> i64 {
        self.milli().clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn max(self, other: Pt) -> Pt {
        if other > self { other } else { self }
    }

    pub fn min(self, other: Pt) -> Pt {
        if other < self { other } else { self }
    }

    /// `self * num / denom`, rounded half away from zero; zero when `denom` is 0.
    pub fn mul_ratio(self, num: i32, denom: i32) -> Pt {
        Pt::from_milli(rounded_div(
            self.milli().saturating_mul(num as i128),
            denom as i128,
        ))
    }

    fn milli(self) -> i128 {
        rounded_div(self.0.to_bits() as i128 * 1000, FRAC_ONE)
    }

    fn from_milli(milli: i128) -> Pt {
        let bits = rounded_div(milli.saturating_mul(FRAC_ONE), 1000);
        Pt(I32F32::from_bits(
            bits.clamp(i64::MIN as i128, i64::MAX as i128) as i64,
        ))
    }
}

fn rounded_div(num: i128, den: i128) -> i128 {
    if den == 0 {
        return 0;
    }
    let half = den.abs() / 2;
    if (num < 0) == (den < 0) {
        (num.abs() + half) / den.abs()
    } else {
        -((num.abs() + half) / den.abs())
    }
}

macro_rules! pt_additive {
    ($op:ident, $method:ident, $assign:ident, $assign_method:ident, $combine:ident) => {
        impl std::ops::$op for Pt {
            type Output = Pt;
            fn $method(self, rhs: Pt) -> Pt {
                Pt::from_milli(self.milli().$combine(rhs.milli()))
            }
        }

        impl std::ops::$assign for Pt {
            fn $assign_method(&mut self, rhs: Pt) {
                *self = std::ops::$op::$method(*self, rhs);
            }
        }
    };
}

pt_additive!(Add, add, AddAssign, add_assign, saturating_add);
pt_additive!(Sub, sub, SubAssign, sub_assign, saturating_sub);

impl std::ops::Mul<i32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: i32) -> Pt {
        self.mul_ratio(rhs, 1)
    }
}

impl std::ops::Div<i32> for Pt {
    type Output = Pt;
    fn div(self, rhs: i32) -> Pt {
        self.mul_ratio(1, rhs)
    }
}

impl std::ops::Mul<f32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: f32) -> Pt {
        Pt::from_f32(self.to_f32() * rhs)
    }
}

impl std::iter::Sum for Pt {
    fn sum<I: Iterator<Item = Pt>>(iter: I) -> Pt {
        iter.fold(Pt::ZERO, |acc, v| acc + v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSize {
    A3,
    #[default]
    A4,
    A5,
    Letter,
    Legal,
}

impl PageSize {
    /// Unknown names fall back to A4.
    pub fn from_name(name: &str) -> PageSize {
        match name.trim().to_ascii_uppercase().as_str() {
            "A3" => PageSize::A3,
            "A5" => PageSize::A5,
            "LETTER" => PageSize::Letter,
            "LEGAL" => PageSize::Legal,
            _ => PageSize::A4,
        }
    }

    fn dimensions(self) -> (i32, i32) {
        match self {
            PageSize::A3 => (842, 1191),
            PageSize::A4 => (595, 842),
            PageSize::A5 => (420, 595),
            PageSize::Letter => (612, 792),
            PageSize::Legal => (612, 1008),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: Pt,
    pub height: Pt,
}

impl Size {
    pub fn for_page(page: PageSize, landscape: bool) -> Self {
        let (w, h) = page.dimensions();
        let (w, h) = if landscape { (h, w) } else { (w, h) };
        Self {
            width: Pt::from_i32(w),
            height: Pt::from_i32(h),
        }
    }

    pub fn a4() -> Self {
        Self::for_page(PageSize::A4, false)
    }

    pub fn letter() -> Self {
        Self::for_page(PageSize::Letter, false)
    }
}

/// Axis-aligned box in top-left page coordinates (y grows downward).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: Pt,
    pub y: Pt,
    pub width: Pt,
    pub height: Pt,
}

impl Rect {
    pub fn new(x: Pt, y: Pt, width: Pt, height: Pt) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> Pt {
        self.y + self.height
    }

    pub fn right(&self) -> Pt {
        self.x + self.width
    }

    /// PDF user-space rectangle `[llx lly urx ury]` for a page of the given height.
    pub fn to_pdf_rect(&self, page_height: Pt) -> [f32; 4] {
        [
            self.x.to_f32(),
            (page_height - self.bottom()).to_f32(),
            self.right().to_f32(),
            (page_height - self.y).to_f32(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn gray(level: f32) -> Self {
        Self::rgb(level, level, level)
    }

    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pt_addition_is_exact_in_milli_units() {
        let mut total = Pt::ZERO;
        for _ in 0..500 {
            total += Pt::from_f32(25.0);
        }
        assert_eq!(total.to_milli_i64(), 12_500_000);
    }

    #[test]
    fn landscape_swaps_dimensions() {
        let portrait = Size::for_page(PageSize::Letter, false);
        let landscape = Size::for_page(PageSize::Letter, true);
        assert_eq!(portrait.width, landscape.height);
        assert_eq!(portrait.height, landscape.width);
        assert_eq!(Size::a4().height, Pt::from_i32(842));
    }

    #[test]
    fn unknown_page_names_use_a4() {
        assert_eq!(PageSize::from_name("tabloid"), PageSize::A4);
        assert_eq!(PageSize::from_name(" legal "), PageSize::Legal);
    }

    #[test]
    fn rect_flips_into_pdf_space() {
        let rect = Rect::new(
            Pt::from_i32(10),
            Pt::from_i32(20),
            Pt::from_i32(30),
            Pt::from_i32(40),
        );
        assert_eq!(rect.to_pdf_rect(Pt::from_i32(100)), [10.0, 40.0, 40.0, 80.0]);
    }
}
