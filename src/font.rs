use crate::error::{AssemblyError, Result};
use crate::types::Pt;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Searched for metric-compatible substitutes when no font directory is configured.
const SYSTEM_SUBSTITUTE_DIRS: [&str; 5] = [
    "/usr/share/fonts/truetype/liberation",
    "/usr/share/fonts/truetype/liberation2",
    "/usr/share/fonts/liberation",
    "/usr/share/fonts/liberation-sans",
    "/usr/local/share/fonts/liberation",
];

/// The fourteen faces every conforming reader ships. Their resource names are
/// fixed (`F1`..`F14`) in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    TimesRoman,
    TimesBold,
    TimesItalic,
    TimesBoldItalic,
    Courier,
    CourierBold,
    CourierOblique,
    CourierBoldOblique,
    Symbol,
    ZapfDingbats,
}

const STANDARD_FONTS: [StandardFont; 14] = [
    StandardFont::Helvetica,
    StandardFont::HelveticaBold,
    StandardFont::HelveticaOblique,
    StandardFont::HelveticaBoldOblique,
    StandardFont::TimesRoman,
    StandardFont::TimesBold,
    StandardFont::TimesItalic,
    StandardFont::TimesBoldItalic,
    StandardFont::Courier,
    StandardFont::CourierBold,
    StandardFont::CourierOblique,
    StandardFont::CourierBoldOblique,
    StandardFont::Symbol,
    StandardFont::ZapfDingbats,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Helvetica,
    Times,
    Courier,
}

impl Family {
    /// Custom font names that stand in for the whole family.
    fn names(self) -> &'static [&'static str] {
        match self {
            Family::Helvetica => &["Helvetica"],
            Family::Times => &["Times-Roman", "Times"],
            Family::Courier => &["Courier"],
        }
    }
}

impl StandardFont {
    pub fn base_name(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::HelveticaOblique => "Helvetica-Oblique",
            StandardFont::HelveticaBoldOblique => "Helvetica-BoldOblique",
            StandardFont::TimesRoman => "Times-Roman",
            StandardFont::TimesBold => "Times-Bold",
            StandardFont::TimesItalic => "Times-Italic",
            StandardFont::TimesBoldItalic => "Times-BoldItalic",
            StandardFont::Courier => "Courier",
            StandardFont::CourierBold => "Courier-Bold",
            StandardFont::CourierOblique => "Courier-Oblique",
            StandardFont::CourierBoldOblique => "Courier-BoldOblique",
            StandardFont::Symbol => "Symbol",
            StandardFont::ZapfDingbats => "ZapfDingbats",
        }
    }

    pub fn resource_name(self) -> String {
        let index = STANDARD_FONTS.iter().position(|f| *f == self).unwrap_or(0);
        format!("F{}", index + 1)
    }

    pub fn is_symbolic(self) -> bool {
        matches!(self, StandardFont::Symbol | StandardFont::ZapfDingbats)
    }

    fn family(self) -> Option<Family> {
        match self {
            StandardFont::Helvetica
            | StandardFont::HelveticaBold
            | StandardFont::HelveticaOblique
            | StandardFont::HelveticaBoldOblique => Some(Family::Helvetica),
            StandardFont::TimesRoman
            | StandardFont::TimesBold
            | StandardFont::TimesItalic
            | StandardFont::TimesBoldItalic => Some(Family::Times),
            StandardFont::Courier
            | StandardFont::CourierBold
            | StandardFont::CourierOblique
            | StandardFont::CourierBoldOblique => Some(Family::Courier),
            StandardFont::Symbol | StandardFont::ZapfDingbats => None,
        }
    }

    /// Metric-compatible Liberation file embedded in place of this face.
    pub fn substitute_file(self) -> Option<&'static str> {
        Some(match self {
            StandardFont::Helvetica => "LiberationSans-Regular.ttf",
            StandardFont::HelveticaBold => "LiberationSans-Bold.ttf",
            StandardFont::HelveticaOblique => "LiberationSans-Italic.ttf",
            StandardFont::HelveticaBoldOblique => "LiberationSans-BoldItalic.ttf",
            StandardFont::TimesRoman => "LiberationSerif-Regular.ttf",
            StandardFont::TimesBold => "LiberationSerif-Bold.ttf",
            StandardFont::TimesItalic => "LiberationSerif-Italic.ttf",
            StandardFont::TimesBoldItalic => "LiberationSerif-BoldItalic.ttf",
            StandardFont::Courier => "LiberationMono-Regular.ttf",
            StandardFont::CourierBold => "LiberationMono-Bold.ttf",
            StandardFont::CourierOblique => "LiberationMono-Italic.ttf",
            StandardFont::CourierBoldOblique => "LiberationMono-BoldItalic.ttf",
            StandardFont::Symbol | StandardFont::ZapfDingbats => return None,
        })
    }

    fn from_base_name(name: &str) -> Option<StandardFont> {
        STANDARD_FONTS
            .iter()
            .copied()
            .find(|font| font.base_name().eq_ignore_ascii_case(name))
    }

    fn styled(family: Family, bold: bool, italic: bool) -> StandardFont {
        match (family, bold, italic) {
            (Family::Helvetica, false, false) => StandardFont::Helvetica,
            (Family::Helvetica, true, false) => StandardFont::HelveticaBold,
            (Family::Helvetica, false, true) => StandardFont::HelveticaOblique,
            (Family::Helvetica, true, true) => StandardFont::HelveticaBoldOblique,
            (Family::Times, false, false) => StandardFont::TimesRoman,
            (Family::Times, true, false) => StandardFont::TimesBold,
            (Family::Times, false, true) => StandardFont::TimesItalic,
            (Family::Times, true, true) => StandardFont::TimesBoldItalic,
            (Family::Courier, false, false) => StandardFont::Courier,
            (Family::Courier, true, false) => StandardFont::CourierBold,
            (Family::Courier, false, true) => StandardFont::CourierOblique,
            (Family::Courier, true, true) => StandardFont::CourierBoldOblique,
        }
    }

    /// Advance width in 1/1000 em.
    fn advance(self, ch: char) -> u16 {
        let code = ch as u32;
        let table = match self {
            StandardFont::Courier
            | StandardFont::CourierBold
            | StandardFont::CourierOblique
            | StandardFont::CourierBoldOblique => return 600,
            StandardFont::Symbol | StandardFont::ZapfDingbats => return 600,
            // italic faces reuse the upright widths
            StandardFont::Helvetica | StandardFont::HelveticaOblique => &HELVETICA_WIDTHS,
            StandardFont::HelveticaBold | StandardFont::HelveticaBoldOblique => {
                &HELVETICA_BOLD_WIDTHS
            }
            StandardFont::TimesRoman | StandardFont::TimesItalic => &TIMES_ROMAN_WIDTHS,
            StandardFont::TimesBold | StandardFont::TimesBoldItalic => &TIMES_BOLD_WIDTHS,
        };
        if (32..=126).contains(&code) {
            table[(code - 32) as usize]
        } else {
            match self {
                StandardFont::TimesRoman
                | StandardFont::TimesItalic
                | StandardFont::TimesBold
                | StandardFont::TimesBoldItalic => 450,
                _ => 500,
            }
        }
    }
}

const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, 1015, 667, 667, 722, 722, 667,
    611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667,
    667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500,
    222, 833, 556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, 975, 722, 722, 722, 722, 667,
    611, 778, 722, 278, 556, 722, 611, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667,
    667, 611, 333, 278, 333, 584, 556, 333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556,
    278, 889, 611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

const TIMES_ROMAN_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278, 500, 500, 500,
    500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444, 921, 722, 667, 667, 722, 611,
    556, 722, 722, 333, 389, 722, 611, 889, 722, 722, 556, 722, 667, 556, 611, 722, 722, 944, 722,
    722, 611, 333, 278, 333, 469, 500, 333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500,
    278, 778, 500, 500, 500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

const TIMES_BOLD_WIDTHS: [u16; 95] = [
    250, 333, 555, 500, 500, 1000, 833, 278, 333, 333, 500, 570, 250, 333, 250, 278, 500, 500, 500,
    500, 500, 500, 500, 500, 500, 500, 333, 333, 570, 570, 570, 500, 930, 722, 667, 722, 722, 667,
    611, 778, 778, 389, 500, 778, 667, 944, 722, 778, 611, 778, 722, 556, 667, 722, 722, 1000, 722,
    722, 667, 333, 278, 333, 581, 500, 333, 500, 556, 444, 556, 444, 333, 500, 556, 278, 333, 556,
    278, 833, 556, 500, 556, 556, 444, 389, 333, 556, 500, 722, 500, 500, 444, 394, 220, 394, 520,
];

/// Handle returned by the registry; `resource` is the name used in content
/// streams (`/F1`, `/CF2`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FontRef {
    pub resource: String,
    pub kind: FontKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontKind {
    Standard(StandardFont),
    Custom(usize),
}

#[derive(Debug)]
pub struct RegisteredFont {
    pub name: String,
    pub postscript_name: String,
    pub data: Vec<u8>,
    pub metrics: FontMetrics,
}

#[derive(Debug)]
pub struct FontMetrics {
    pub first_char: u8,
    pub last_char: u8,
    pub widths: Vec<u16>,
    pub ascent: i16,
    pub descent: i16,
    pub cap_height: i16,
    pub italic_angle: i16,
    pub stem_v: i16,
    pub bbox: (i16, i16, i16, i16),
    pub missing_width: u16,
    pub is_fixed_pitch: bool,
    symbolic: bool,
}

/// Per-assembly font arena: standard faces by reference, custom TrueType
/// programs parsed once and embedded on demand.
#[derive(Debug, Default)]
pub struct FontRegistry {
    custom: Vec<RegisteredFont>,
    lookup: HashMap<String, usize>,
    used: BTreeSet<FontOrder>,
    forced_embedding: bool,
    substitute_dir: Option<PathBuf>,
    warned: HashSet<String>,
}

/// Sorts standard faces before custom ones, each by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum FontOrder {
    Standard(usize),
    Custom(usize),
}

impl FontRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay used by archival output: every standard face is replaced by an
    /// embedded substitute. Substitutes come from custom fonts named after the
    /// face or its family, then from Liberation files in `substitute_dir`
    /// (or the usual system font directories when unset).
    pub fn set_forced_embedding(&mut self, enabled: bool, substitute_dir: Option<PathBuf>) {
        self.forced_embedding = enabled;
        self.substitute_dir = substitute_dir;
    }

    pub fn forced_embedding(&self) -> bool {
        self.forced_embedding
    }

    pub fn register_custom(&mut self, name: &str, data: Vec<u8>) -> Result<FontRef> {
        let face = ttf_parser::Face::parse(&data, 0).map_err(|err| {
            AssemblyError::Resource(format!("corrupt font program for '{name}': {err}"))
        })?;
        let metrics = FontMetrics::from_face(&face);
        let postscript_name = postscript_name(&face).unwrap_or_else(|| sanitize_font_name(name));
        let index = self.custom.len();
        self.custom.push(RegisteredFont {
            name: name.to_string(),
            postscript_name,
            data,
            metrics,
        });
        self.lookup.insert(normalize_name(name), index);
        log::debug!("registered custom font '{name}' as CF{}", index + 1);
        Ok(custom_ref(index))
    }

    /// Resolves a logical font name plus style flags and marks it as used.
    /// Under forced embedding a standard face without a substitute is a
    /// resource error.
    pub fn register_font(&mut self, name: &str, bold: bool, italic: bool) -> Result<FontRef> {
        let mut font = self.resolve(name, bold, italic);
        if let FontKind::Standard(face) = font.kind {
            if self.forced_embedding {
                font = self.embedded_substitute(face)?;
            }
        }
        match font.kind {
            FontKind::Standard(face) => {
                let index = STANDARD_FONTS.iter().position(|f| *f == face).unwrap_or(0);
                self.used.insert(FontOrder::Standard(index));
            }
            FontKind::Custom(index) => {
                self.used.insert(FontOrder::Custom(index));
            }
        }
        Ok(font)
    }

    /// Handle for `face` as it would currently resolve, without loading anything.
    pub fn peek_standard(&self, face: StandardFont) -> FontRef {
        if let Some(index) = self.lookup.get(&normalize_name(face.base_name())).copied() {
            return custom_ref(index);
        }
        if self.forced_embedding {
            if let Some(index) = self.family_substitute(face) {
                return custom_ref(index);
            }
        }
        FontRef {
            resource: face.resource_name(),
            kind: FontKind::Standard(face),
        }
    }

    fn family_substitute(&self, face: StandardFont) -> Option<usize> {
        face.family()?
            .names()
            .iter()
            .find_map(|name| self.lookup.get(&normalize_name(name)).copied())
    }

    fn embedded_substitute(&mut self, face: StandardFont) -> Result<FontRef> {
        if let Some(index) = self.family_substitute(face) {
            return Ok(custom_ref(index));
        }
        let Some(file) = face.substitute_file() else {
            return Err(AssemblyError::Resource(format!(
                "standard font '{}' must be embedded but has no substitute; register a custom font with that name",
                face.base_name()
            )));
        };
        let dirs: Vec<&Path> = match &self.substitute_dir {
            Some(dir) => vec![dir.as_path()],
            None => SYSTEM_SUBSTITUTE_DIRS.iter().map(Path::new).collect(),
        };
        for dir in dirs {
            let path = dir.join(file);
            if let Ok(data) = std::fs::read(&path) {
                log::debug!("embedding {} for '{}'", path.display(), face.base_name());
                return self.register_custom(face.base_name(), data);
            }
        }
        Err(AssemblyError::Resource(format!(
            "standard font '{}' must be embedded but {file} was not found; set pdfa.fontDir or register a custom font with that name",
            face.base_name()
        )))
    }

    fn resolve(&mut self, name: &str, bold: bool, italic: bool) -> FontRef {
        if let Some(index) = self.lookup.get(&normalize_name(name)).copied() {
            return custom_ref(index);
        }
        let face = resolve_standard(name, bold, italic).unwrap_or_else(|| {
            if self.warned.insert(format!("font:{name}")) {
                log::warn!("unknown font '{name}', falling back to Helvetica");
            }
            StandardFont::styled(Family::Helvetica, bold, italic)
        });
        // a custom program registered under the standard face's own name replaces it
        if let Some(index) = self.lookup.get(&normalize_name(face.base_name())).copied() {
            return custom_ref(index);
        }
        FontRef {
            resource: face.resource_name(),
            kind: FontKind::Standard(face),
        }
    }

    pub fn custom(&self, index: usize) -> Option<&RegisteredFont> {
        self.custom.get(index)
    }

    /// Fonts referenced by any content, standard faces first.
    pub fn used_fonts(&self) -> Vec<FontRef> {
        self.used
            .iter()
            .map(|order| match order {
                FontOrder::Standard(index) => {
                    let face = STANDARD_FONTS[*index];
                    FontRef {
                        resource: face.resource_name(),
                        kind: FontKind::Standard(face),
                    }
                }
                FontOrder::Custom(index) => custom_ref(*index),
            })
            .collect()
    }

    pub fn measure_text_width(&self, font: &FontRef, font_size: Pt, text: &str) -> Pt {
        let units: i64 = match font.kind {
            FontKind::Standard(face) => text.chars().map(|ch| face.advance(ch) as i64).sum(),
            FontKind::Custom(index) => match self.custom.get(index) {
                Some(registered) => text
                    .chars()
                    .map(|ch| registered.metrics.advance_for_char(ch) as i64)
                    .sum(),
                None => text.chars().count() as i64 * 500,
            },
        };
        if units <= 0 {
            return Pt::ZERO;
        }
        font_size.mul_ratio(units.min(i32::MAX as i64) as i32, 1000)
    }

    /// Greedy word wrap. Words wider than `max_width` are split into
    /// character chunks; explicit newlines always break.
    pub fn wrap_text(&self, font: &FontRef, font_size: Pt, text: &str, max_width: Pt) -> Vec<String> {
        if max_width <= Pt::ZERO {
            return vec![text.to_string()];
        }
        let mut lines = Vec::new();
        for paragraph in text.split('\n') {
            let mut current = String::new();
            for word in paragraph.split_whitespace() {
                if self.measure_text_width(font, font_size, word) > max_width {
                    if !current.is_empty() {
                        lines.push(std::mem::take(&mut current));
                    }
                    let mut chunks = self.break_word(font, font_size, word, max_width);
                    current = chunks.pop().unwrap_or_default();
                    lines.extend(chunks);
                    continue;
                }
                let candidate = if current.is_empty() {
                    word.to_string()
                } else {
                    format!("{current} {word}")
                };
                if self.measure_text_width(font, font_size, &candidate) <= max_width {
                    current = candidate;
                } else {
                    lines.push(std::mem::replace(&mut current, word.to_string()));
                }
            }
            if !current.is_empty() || lines.is_empty() {
                lines.push(current);
            }
        }
        if lines.is_empty() {
            lines.push(String::new());
        }
        lines
    }

    fn break_word(&self, font: &FontRef, font_size: Pt, word: &str, max_width: Pt) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut chunk = String::new();
        for ch in word.chars() {
            chunk.push(ch);
            if chunk.chars().count() > 1 && self.measure_text_width(font, font_size, &chunk) > max_width {
                chunk.pop();
                chunks.push(std::mem::take(&mut chunk));
                chunk.push(ch);
            }
        }
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
        chunks
    }
}

fn custom_ref(index: usize) -> FontRef {
    FontRef {
        resource: format!("CF{}", index + 1),
        kind: FontKind::Custom(index),
    }
}

fn resolve_standard(name: &str, bold: bool, italic: bool) -> Option<StandardFont> {
    let trimmed = name.trim();
    let family = match trimmed.to_ascii_lowercase().as_str() {
        "helvetica" | "arial" | "sans-serif" => Some(Family::Helvetica),
        "times" | "times-roman" | "times new roman" | "serif" => Some(Family::Times),
        "courier" | "courier new" | "monospace" => Some(Family::Courier),
        _ => None,
    };
    if let Some(family) = family {
        return Some(StandardFont::styled(family, bold, italic));
    }
    // Explicit face names keep their own style; flags may still add to it.
    let face = StandardFont::from_base_name(trimmed)?;
    let Some(family) = face.family() else {
        return Some(face);
    };
    let lower = trimmed.to_ascii_lowercase();
    let face_bold = lower.contains("bold");
    let face_italic = lower.contains("oblique") || lower.contains("italic");
    Some(StandardFont::styled(family, bold || face_bold, italic || face_italic))
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> Self {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let first_char = 32u8;
        let last_char = 255u8;
        let (symbolic, symbol_subtable) = select_symbol_subtable(face);
        let widths = build_widths(face, scale, first_char, last_char, symbol_subtable);
        let missing_width = widths
            .get((b' ' - first_char) as usize)
            .copied()
            .unwrap_or(0);

        let ascent = scale_i16(face.ascender(), scale);
        let descent = scale_i16(face.descender(), scale);
        let cap_height = face
            .capital_height()
            .map(|value| scale_i16(value, scale))
            .unwrap_or(ascent);
        let bbox = face.global_bounding_box();
        let bbox = (
            scale_i16(bbox.x_min, scale),
            scale_i16(bbox.y_min, scale),
            scale_i16(bbox.x_max, scale),
            scale_i16(bbox.y_max, scale),
        );
        let italic_angle = face
            .italic_angle()
            .map(|value| value.round() as i16)
            .unwrap_or(0);

        Self {
            first_char,
            last_char,
            widths,
            ascent,
            descent,
            cap_height,
            italic_angle,
            stem_v: 80,
            bbox,
            missing_width,
            is_fixed_pitch: face.is_monospaced(),
            symbolic,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        self.symbolic
    }

    fn advance_for_char(&self, ch: char) -> u16 {
        let code = ch as u32;
        let first = self.first_char as u32;
        let last = self.last_char as u32;
        if code < first || code > last {
            return self.missing_width;
        }
        let idx = (code - first) as usize;
        self.widths.get(idx).copied().unwrap_or(self.missing_width)
    }
}

fn select_symbol_subtable<'a>(
    face: &'a ttf_parser::Face<'a>,
) -> (bool, Option<ttf_parser::cmap::Subtable<'a>>) {
    let Some(cmap) = face.tables().cmap else {
        return (false, None);
    };
    let mut first = None;
    let mut symbol = None;
    let mut has_unicode = false;
    for subtable in cmap.subtables {
        if first.is_none() {
            first = Some(subtable);
        }
        if subtable.platform_id == ttf_parser::name::PlatformId::Windows
            && subtable.encoding_id == 0
        {
            symbol = Some(subtable);
        }
        if subtable.is_unicode() {
            has_unicode = true;
        }
    }
    if has_unicode {
        (false, None)
    } else {
        (symbol.is_some(), symbol.or(first))
    }
}

fn glyph_index_for_codepoint<'a>(
    face: &'a ttf_parser::Face<'a>,
    codepoint: u32,
    fallback: Option<ttf_parser::cmap::Subtable<'a>>,
) -> Option<ttf_parser::GlyphId> {
    if let Some(ch) = char::from_u32(codepoint) {
        if let Some(id) = face.glyph_index(ch) {
            return Some(id);
        }
    }
    let subtable = fallback?;
    if let Some(id) = subtable.glyph_index(codepoint) {
        return Some(id);
    }
    subtable.glyph_index(codepoint + 0xF000)
}

fn build_widths(
    face: &ttf_parser::Face<'_>,
    scale: f32,
    first: u8,
    last: u8,
    fallback: Option<ttf_parser::cmap::Subtable<'_>>,
) -> Vec<u16> {
    let mut widths = Vec::with_capacity((last - first) as usize + 1);
    for code in first..=last {
        let width = glyph_index_for_codepoint(face, code as u32, fallback)
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(0);
        let scaled = (width as f32 * scale).round() as i32;
        widths.push(scaled.clamp(0, u16::MAX as i32) as u16);
    }
    widths
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn postscript_name(face: &ttf_parser::Face<'_>) -> Option<String> {
    use ttf_parser::name::name_id;
    face.names()
        .into_iter()
        .filter(|entry| entry.name_id == name_id::POST_SCRIPT_NAME)
        .find_map(|entry| entry.to_string())
        .map(|name| sanitize_font_name(&name))
        .filter(|name| !name.is_empty())
}

pub fn sanitize_font_name(name: &str) -> String {
    name.chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
        .collect()
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dejavu() -> Vec<u8> {
        std::fs::read(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/DejaVuSansMono.ttf")).unwrap()
    }

    #[test]
    fn standard_faces_have_fixed_resource_names() {
        let mut registry = FontRegistry::new();
        let helv = registry.register_font("Helvetica", false, false).unwrap();
        let times_bold = registry.register_font("Times-Roman", true, false).unwrap();
        let zapf = registry.register_font("ZapfDingbats", false, false).unwrap();
        assert_eq!(helv.resource, "F1");
        assert_eq!(times_bold.resource, "F6");
        assert_eq!(zapf.resource, "F14");
        let used: Vec<_> = registry.used_fonts().into_iter().map(|f| f.resource).collect();
        assert_eq!(used, vec!["F1", "F6", "F14"]);
    }

    #[test]
    fn unknown_font_falls_back_to_helvetica_family() {
        let mut registry = FontRegistry::new();
        let font = registry.register_font("Comic Sans", true, true).unwrap();
        assert_eq!(font.kind, FontKind::Standard(StandardFont::HelveticaBoldOblique));
    }

    #[test]
    fn helvetica_widths_match_afm() {
        let registry = FontRegistry::new();
        let font = FontRef {
            resource: "F1".into(),
            kind: FontKind::Standard(StandardFont::Helvetica),
        };
        // H=722 e=556 l=222 l=222 o=556 -> 2278 units
        let width = registry.measure_text_width(&font, Pt::from_i32(10), "Hello");
        assert_eq!(width.to_milli_i64(), 22_780);
    }

    #[test]
    fn courier_is_monospaced() {
        let registry = FontRegistry::new();
        let font = FontRef {
            resource: "F9".into(),
            kind: FontKind::Standard(StandardFont::Courier),
        };
        let a = registry.measure_text_width(&font, Pt::from_i32(12), "iiii");
        let b = registry.measure_text_width(&font, Pt::from_i32(12), "WWWW");
        assert_eq!(a, b);
    }

    #[test]
    fn custom_font_uses_real_glyph_widths() {
        let mut registry = FontRegistry::new();
        let font = registry.register_custom("Mono", dejavu()).unwrap();
        assert_eq!(font.resource, "CF1");
        let resolved = registry.register_font("mono", false, false).unwrap();
        assert_eq!(resolved, font);
        let narrow = registry.measure_text_width(&font, Pt::from_i32(10), "iiii");
        let wide = registry.measure_text_width(&font, Pt::from_i32(10), "WWWW");
        assert_eq!(narrow, wide);
        assert!(narrow > Pt::ZERO);
        assert!(registry.custom(0).unwrap().metrics.is_fixed_pitch);
    }

    #[test]
    fn corrupt_font_program_is_a_resource_error() {
        let mut registry = FontRegistry::new();
        let err = registry.register_custom("Broken", vec![0, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, AssemblyError::Resource(_)));
    }

    #[test]
    fn custom_font_named_after_standard_face_replaces_it() {
        let mut registry = FontRegistry::new();
        registry.register_custom("Helvetica", dejavu()).unwrap();
        let font = registry.register_font("Helvetica", false, false).unwrap();
        assert_eq!(font.kind, FontKind::Custom(0));
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("docforge-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn forced_embedding_uses_family_substitute_for_every_style() {
        let mut registry = FontRegistry::new();
        registry.register_custom("Times", dejavu()).unwrap();
        registry.set_forced_embedding(true, Some(scratch_dir("family")));
        let bold = registry.register_font("Times-Roman", true, false).unwrap();
        let italic = registry.register_font("Times-Italic", false, false).unwrap();
        assert_eq!(bold.kind, FontKind::Custom(0));
        assert_eq!(italic.kind, FontKind::Custom(0));
        assert!(registry.used_fonts().iter().all(|font| matches!(font.kind, FontKind::Custom(_))));
        assert_eq!(registry.peek_standard(StandardFont::TimesBold), custom_ref(0));
    }

    #[test]
    fn forced_embedding_loads_liberation_file_from_font_dir() {
        let dir = scratch_dir("liberation");
        std::fs::write(dir.join("LiberationSans-Regular.ttf"), dejavu()).unwrap();
        let mut registry = FontRegistry::new();
        registry.set_forced_embedding(true, Some(dir));
        let first = registry.register_font("Helvetica", false, false).unwrap();
        let again = registry.register_font("Arial", false, false).unwrap();
        assert_eq!(first.kind, FontKind::Custom(0));
        assert_eq!(again, first);
        assert_eq!(registry.custom(0).unwrap().name, "Helvetica");
        assert_eq!(registry.peek_standard(StandardFont::Helvetica), first);
        assert_eq!(registry.used_fonts(), vec![first]);
    }

    #[test]
    fn forced_embedding_without_substitute_is_a_resource_error() {
        let mut registry = FontRegistry::new();
        registry.set_forced_embedding(true, Some(scratch_dir("empty")));
        let missing = registry.register_font("Courier", true, false).unwrap_err();
        assert!(matches!(&missing, AssemblyError::Resource(msg) if msg.contains("LiberationMono-Bold.ttf")));
        let symbolic = registry.register_font("Symbol", false, false).unwrap_err();
        assert!(matches!(symbolic, AssemblyError::Resource(_)));
        assert!(registry.used_fonts().is_empty());
    }

    #[test]
    fn wraps_on_whitespace() {
        let registry = FontRegistry::new();
        let font = FontRef {
            resource: "F9".into(),
            kind: FontKind::Standard(StandardFont::Courier),
        };
        // Courier 10pt: 6pt per char, 60pt fits 10 chars.
        let lines = registry.wrap_text(&font, Pt::from_i32(10), "alpha beta gamma delta", Pt::from_i32(60));
        assert_eq!(lines, vec!["alpha beta", "gamma", "delta"]);
    }

    #[test]
    fn overlong_words_break_into_chunks() {
        let registry = FontRegistry::new();
        let font = FontRef {
            resource: "F9".into(),
            kind: FontKind::Standard(StandardFont::Courier),
        };
        let lines = registry.wrap_text(&font, Pt::from_i32(10), "abcdefghijklmnopqrstuvwxy z", Pt::from_i32(60));
        assert_eq!(lines, vec!["abcdefghij", "klmnopqrst", "uvwxy z"]);
    }

    #[test]
    fn wrap_edge_cases() {
        let registry = FontRegistry::new();
        let font = FontRef {
            resource: "F1".into(),
            kind: FontKind::Standard(StandardFont::Helvetica),
        };
        assert_eq!(registry.wrap_text(&font, Pt::from_i32(10), "", Pt::from_i32(50)), vec![""]);
        assert_eq!(
            registry.wrap_text(&font, Pt::from_i32(10), "no wrap here", Pt::ZERO),
            vec!["no wrap here"]
        );
        assert_eq!(
            registry.wrap_text(&font, Pt::from_i32(10), "a\nb", Pt::from_i32(500)),
            vec!["a", "b"]
        );
    }

    proptest::proptest! {
        #[test]
        fn wrapped_lines_fit_unless_single_char(text in "[a-z ]{0,80}", width in 20i32..200) {
            let registry = FontRegistry::new();
            let font = FontRef {
                resource: "F1".into(),
                kind: FontKind::Standard(StandardFont::Helvetica),
            };
            let max = Pt::from_i32(width);
            for line in registry.wrap_text(&font, Pt::from_i32(10), &text, max) {
                proptest::prop_assert!(
                    line.chars().count() <= 1 || registry.measure_text_width(&font, Pt::from_i32(10), &line) <= max
                );
            }
        }
    }
}
