use crate::error::{AssemblyError, Result};
use crate::types::{Color, Pt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

/// Independent stroke widths for the four cell edges. Zero means no stroke.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Borders {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl Borders {
    pub fn any(&self) -> bool {
        self.left > 0.0 || self.right > 0.0 || self.top > 0.0 || self.bottom > 0.0
    }

    /// Parses the `l:r:t:b` page border string. Missing or malformed fields are zero.
    pub fn from_page_border(raw: &str) -> Borders {
        let mut values = [0.0f32; 4];
        for (slot, part) in values.iter_mut().zip(raw.split(':')) {
            *slot = part.trim().parse::<f32>().unwrap_or(0.0).max(0.0);
        }
        Borders {
            left: values[0],
            right: values[1],
            top: values[2],
            bottom: values[3],
        }
    }
}

/// Parsed `font:size:style:align:left:right:top:bottom` descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct CellProps {
    pub font: String,
    pub size: f32,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub align: Align,
    pub borders: Borders,
}

impl Default for CellProps {
    fn default() -> Self {
        Self {
            font: "Helvetica".to_string(),
            size: 12.0,
            bold: false,
            italic: false,
            underline: false,
            align: Align::Left,
            borders: Borders::default(),
        }
    }
}

impl CellProps {
    pub fn parse(raw: &str) -> Result<CellProps> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(CellProps::default());
        }
        let parts: Vec<&str> = raw.split(':').map(str::trim).collect();
        if parts.len() < 4 || parts.len() > 8 {
            return Err(AssemblyError::TemplateValidation(format!(
                "props '{raw}' must have 4 to 8 ':'-separated fields"
            )));
        }

        let mut props = CellProps::default();
        if !parts[0].is_empty() {
            props.font = parts[0].to_string();
        }
        props.size = match parts[1].parse::<f32>() {
            Ok(size) if size.is_finite() && size > 0.0 => size,
            _ => {
                return Err(AssemblyError::TemplateValidation(format!(
                    "props '{raw}' has invalid font size '{}'",
                    parts[1]
                )));
            }
        };

        let style = parts[2].as_bytes();
        if style.len() != 3 || !style.iter().all(|b| *b == b'0' || *b == b'1') {
            return Err(AssemblyError::TemplateValidation(format!(
                "props '{raw}' style must be three 0/1 digits"
            )));
        }
        props.bold = style[0] == b'1';
        props.italic = style[1] == b'1';
        props.underline = style[2] == b'1';

        props.align = match parts[3].to_ascii_lowercase().as_str() {
            "center" | "centre" => Align::Center,
            "right" => Align::Right,
            _ => Align::Left,
        };

        let mut borders = [0.0f32; 4];
        for (slot, part) in borders.iter_mut().zip(parts.iter().skip(4)) {
            *slot = match part.parse::<f32>() {
                Ok(width) if width.is_finite() && width >= 0.0 => width,
                _ => {
                    return Err(AssemblyError::TemplateValidation(format!(
                        "props '{raw}' has invalid border width '{part}'"
                    )));
                }
            };
        }
        props.borders = Borders {
            left: borders[0],
            right: borders[1],
            top: borders[2],
            bottom: borders[3],
        };
        Ok(props)
    }

    pub fn size_pt(&self) -> Pt {
        Pt::from_f32(self.size)
    }
}

/// `#RRGGBB` or `#RRGGBBAA`. A zero alpha byte means "no colour".
pub fn parse_hex_color(raw: &str) -> Option<Color> {
    let hex = raw.trim().trim_start_matches('#');
    if !(hex.len() == 6 || hex.len() == 8) || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let (r, g, b) = (byte(0)?, byte(2)?, byte(4)?);
    if hex.len() == 8 && byte(6)? == 0 {
        return None;
    }
    Some(Color::from_rgb8(r, g, b))
}

/// Resolves an optional colour string, logging values that fail to parse.
pub fn resolve_color(raw: Option<&str>) -> Option<Color> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    let color = parse_hex_color(raw);
    if color.is_none() && !is_transparent(raw) {
        log::warn!("ignoring malformed colour '{raw}'");
    }
    color
}

fn is_transparent(raw: &str) -> bool {
    let hex = raw.trim_start_matches('#');
    hex.len() == 8 && hex.ends_with("00") && hex.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_props() {
        let props = CellProps::parse("Times-Roman:14:101:right:1:0:2:0").unwrap();
        assert_eq!(props.font, "Times-Roman");
        assert_eq!(props.size, 14.0);
        assert!(props.bold && !props.italic && props.underline);
        assert_eq!(props.align, Align::Right);
        assert_eq!(
            props.borders,
            Borders {
                left: 1.0,
                right: 0.0,
                top: 2.0,
                bottom: 0.0
            }
        );
    }

    #[test]
    fn footer_style_props_omit_borders() {
        let props = CellProps::parse("Helvetica:10:000:center").unwrap();
        assert_eq!(props.align, Align::Center);
        assert!(!props.borders.any());
    }

    #[test]
    fn empty_props_use_defaults() {
        assert_eq!(CellProps::parse("").unwrap(), CellProps::default());
    }

    #[test]
    fn malformed_props_are_validation_errors() {
        for raw in [
            "Helvetica",
            "Helvetica:abc:000:left",
            "Helvetica:12:0x0:left",
            "Helvetica:12:00:left",
            "Helvetica:12:000:left:1:x:0:0",
            "Helvetica:12:000:left:1:1:1:1:1",
        ] {
            let err = CellProps::parse(raw).unwrap_err();
            assert!(
                matches!(err, AssemblyError::TemplateValidation(_)),
                "{raw} -> {err}"
            );
        }
    }

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex_color("#FF0000"), Some(Color::rgb(1.0, 0.0, 0.0)));
        assert_eq!(parse_hex_color("#00ff00ff"), Some(Color::rgb(0.0, 1.0, 0.0)));
        assert_eq!(parse_hex_color("#00ff0000"), None);
        assert_eq!(parse_hex_color("#12345"), None);
        assert_eq!(parse_hex_color("#GGGGGG"), None);
        assert_eq!(resolve_color(Some("")), None);
    }

    #[test]
    fn page_border_fields_default_to_zero() {
        let borders = Borders::from_page_border("2:x:1");
        assert_eq!(borders.left, 2.0);
        assert_eq!(borders.right, 0.0);
        assert_eq!(borders.top, 1.0);
        assert_eq!(borders.bottom, 0.0);
    }
}
