//! Translator for a constrained SVG subset: `svg`, `g`, `path`, `rect`,
//! `circle`, `ellipse`, `line`, `polyline`, `polygon`, with `fill`, `stroke`,
//! `stroke-width`, `transform` and inline `style` declarations.
//!
//! Output is a typed command list already in PDF user space (bottom-left
//! origin), scaled into the destination box.

use crate::types::{Color, Pt, Rect};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SvgError {
    #[error("invalid svg xml: {0}")]
    InvalidXml(String),
    #[error("root element is <{0}>, not <svg>")]
    NotSvg(String),
    #[error("malformed path data at byte {offset}: {reason}")]
    MalformedPath { offset: usize, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSeg {
    MoveTo(f32, f32),
    LineTo(f32, f32),
    CurveTo(f32, f32, f32, f32, f32, f32),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintOp {
    Fill,
    Stroke,
    FillStroke,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SvgCommand {
    SaveState,
    RestoreState,
    FillColor(Color),
    StrokeColor(Color),
    LineWidth(f32),
    MoveTo(f32, f32),
    LineTo(f32, f32),
    CurveTo(f32, f32, f32, f32, f32, f32),
    ClosePath,
    Paint(PaintOp),
}

#[derive(Debug, Clone, Default)]
pub struct SvgGraphic {
    pub commands: Vec<SvgCommand>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    fn translate(tx: f32, ty: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    fn scale(sx: f32, sy: f32) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    fn rotate(deg: f32) -> Self {
        let rad = deg.to_radians();
        let s = libm::sinf(rad);
        let c = libm::cosf(rad);
        Self::new(c, s, -s, c, 0.0, 0.0)
    }

    fn mul(self, other: Self) -> Self {
        Self {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    fn apply(self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    fn scale_factor(self) -> f32 {
        let det = self.a * self.d - self.b * self.c;
        libm::sqrtf(det.abs())
    }
}

#[derive(Debug, Clone, Copy)]
struct Style {
    fill: Option<Color>,
    stroke: Option<Color>,
    stroke_width: f32,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            fill: Some(Color::BLACK),
            stroke: None,
            stroke_width: 1.0,
        }
    }
}

/// Translates `svg_xml` into drawing commands placed in `dest` (top-left page
/// coordinates) on a page of height `page_height`.
pub fn translate_svg(svg_xml: &str, dest: Rect, page_height: Pt) -> Result<SvgGraphic, SvgError> {
    let doc = roxmltree::Document::parse(svg_xml).map_err(|err| SvgError::InvalidXml(err.to_string()))?;
    let root = doc.root_element();
    if root.tag_name().name() != "svg" {
        return Err(SvgError::NotSvg(root.tag_name().name().to_string()));
    }

    let box_w = dest.width.to_f32();
    let box_h = dest.height.to_f32();
    let view_box = parse_viewbox(root.attribute("viewBox")).or_else(|| {
        let w = root.attribute("width").and_then(parse_number)?;
        let h = root.attribute("height").and_then(parse_number)?;
        (w > 0.0 && h > 0.0).then_some((0.0, 0.0, w, h))
    });
    let flip = Matrix::new(1.0, 0.0, 0.0, -1.0, 0.0, page_height.to_f32());
    let placement = flip
        .mul(Matrix::translate(dest.x.to_f32(), dest.y.to_f32()))
        .mul(viewbox_to_viewport_matrix(view_box, box_w, box_h));

    let mut graphic = SvgGraphic::default();
    let style = apply_style(root, Style::default());
    let ctm = placement.mul(node_transform(root));
    for child in root.children().filter(|n| n.is_element()) {
        translate_node(child, ctm, style, &mut graphic)?;
    }
    Ok(graphic)
}

fn translate_node(
    node: roxmltree::Node<'_, '_>,
    parent_ctm: Matrix,
    parent_style: Style,
    out: &mut SvgGraphic,
) -> Result<(), SvgError> {
    let name = node.tag_name().name();
    let style = apply_style(node, parent_style);
    let ctm = parent_ctm.mul(node_transform(node));

    let segs = match name {
        "g" | "svg" => {
            for child in node.children().filter(|n| n.is_element()) {
                translate_node(child, ctm, style, out)?;
            }
            return Ok(());
        }
        "path" => parse_path_data(node.attribute("d").unwrap_or(""))?,
        "rect" => rect_to_path(node),
        "circle" => circle_to_path(node),
        "ellipse" => ellipse_to_path(node),
        "line" => line_to_path(node),
        "polyline" => poly_points_to_path(node, false),
        "polygon" => poly_points_to_path(node, true),
        "title" | "desc" | "metadata" | "defs" => return Ok(()),
        other => {
            out.warnings.push(format!("unsupported svg element <{other}> skipped"));
            return Ok(());
        }
    };
    // lines have no interior
    let fill = if name == "line" { None } else { style.fill };
    emit_path(&segs, ctm, fill, style, out);
    Ok(())
}

fn emit_path(segs: &[PathSeg], ctm: Matrix, fill: Option<Color>, style: Style, out: &mut SvgGraphic) {
    let paint = match (fill.is_some(), style.stroke.is_some()) {
        (true, true) => PaintOp::FillStroke,
        (true, false) => PaintOp::Fill,
        (false, true) => PaintOp::Stroke,
        (false, false) => return,
    };
    if segs.is_empty() {
        return;
    }
    out.commands.push(SvgCommand::SaveState);
    if let Some(color) = fill {
        out.commands.push(SvgCommand::FillColor(color));
    }
    if let Some(color) = style.stroke {
        out.commands.push(SvgCommand::StrokeColor(color));
        out.commands
            .push(SvgCommand::LineWidth(style.stroke_width * ctm.scale_factor()));
    }
    for seg in segs {
        out.commands.push(match *seg {
            PathSeg::MoveTo(x, y) => {
                let (x, y) = ctm.apply(x, y);
                SvgCommand::MoveTo(x, y)
            }
            PathSeg::LineTo(x, y) => {
                let (x, y) = ctm.apply(x, y);
                SvgCommand::LineTo(x, y)
            }
            PathSeg::CurveTo(x1, y1, x2, y2, x, y) => {
                let (x1, y1) = ctm.apply(x1, y1);
                let (x2, y2) = ctm.apply(x2, y2);
                let (x, y) = ctm.apply(x, y);
                SvgCommand::CurveTo(x1, y1, x2, y2, x, y)
            }
            PathSeg::Close => SvgCommand::ClosePath,
        });
    }
    out.commands.push(SvgCommand::Paint(paint));
    out.commands.push(SvgCommand::RestoreState);
}

fn node_transform(node: roxmltree::Node<'_, '_>) -> Matrix {
    node.attribute("transform")
        .map(parse_transform)
        .unwrap_or_else(Matrix::identity)
}

fn apply_style(node: roxmltree::Node<'_, '_>, inherited: Style) -> Style {
    let mut style = inherited;
    let mut apply = |key: &str, value: &str| match key.trim() {
        "fill" => style.fill = parse_color(value),
        "stroke" => style.stroke = parse_color(value),
        "stroke-width" => {
            if let Some(width) = parse_number(value) {
                style.stroke_width = width.max(0.0);
            }
        }
        _ => {}
    };
    for attr in ["fill", "stroke", "stroke-width"] {
        if let Some(value) = node.attribute(attr) {
            apply(attr, value);
        }
    }
    if let Some(inline) = node.attribute("style") {
        for decl in inline.split(';') {
            if let Some((key, value)) = decl.split_once(':') {
                apply(key, value);
            }
        }
    }
    style
}

fn parse_viewbox(view_box: Option<&str>) -> Option<(f32, f32, f32, f32)> {
    let nums = parse_number_list(view_box?);
    if nums.len() != 4 || nums[2] <= 0.0 || nums[3] <= 0.0 {
        return None;
    }
    Some((nums[0], nums[1], nums[2], nums[3]))
}

/// "meet" scaling, centred in the viewport.
fn viewbox_to_viewport_matrix(view_box: Option<(f32, f32, f32, f32)>, w: f32, h: f32) -> Matrix {
    let Some((min_x, min_y, vb_w, vb_h)) = view_box else {
        return Matrix::identity();
    };
    let s = (w / vb_w).min(h / vb_h);
    let tx = (w - vb_w * s) * 0.5 - min_x * s;
    let ty = (h - vb_h * s) * 0.5 - min_y * s;
    Matrix::translate(tx, ty).mul(Matrix::scale(s, s))
}

fn parse_color(input: &str) -> Option<Color> {
    let v = input.trim();
    if let Some(hex) = v.strip_prefix('#') {
        let digits: Vec<u8> = hex
            .chars()
            .map(|c| c.to_digit(16).map(|d| d as u8))
            .collect::<Option<Vec<_>>>()?;
        return match digits.as_slice() {
            [r, g, b] => Some(Color::from_rgb8(r * 17, g * 17, b * 17)),
            [r1, r2, g1, g2, b1, b2] => {
                Some(Color::from_rgb8(r1 * 16 + r2, g1 * 16 + g2, b1 * 16 + b2))
            }
            _ => None,
        };
    }
    if let Some(args) = v.strip_prefix("rgb(").and_then(|s| s.strip_suffix(')')) {
        let parts = parse_number_list(args);
        if parts.len() == 3 {
            let c = |x: f32| x.clamp(0.0, 255.0) as u8;
            return Some(Color::from_rgb8(c(parts[0]), c(parts[1]), c(parts[2])));
        }
        return None;
    }
    match v.to_ascii_lowercase().as_str() {
        "black" => Some(Color::BLACK),
        "white" => Some(Color::WHITE),
        "red" => Some(Color::rgb(1.0, 0.0, 0.0)),
        "green" => Some(Color::rgb(0.0, 0.5, 0.0)),
        "blue" => Some(Color::rgb(0.0, 0.0, 1.0)),
        "gray" | "grey" => Some(Color::gray(0.5)),
        "yellow" => Some(Color::rgb(1.0, 1.0, 0.0)),
        "orange" => Some(Color::rgb(1.0, 0.647, 0.0)),
        _ => None,
    }
}

fn parse_number(input: &str) -> Option<f32> {
    let s = input
        .trim()
        .trim_end_matches("px")
        .trim_end_matches("pt")
        .trim();
    s.parse::<f32>().ok().filter(|v| v.is_finite())
}

fn parse_transform(input: &str) -> Matrix {
    let mut out = Matrix::identity();
    let mut s = input.trim();
    while !s.is_empty() {
        let Some(open) = s.find('(') else { break };
        let name = s[..open].trim().trim_start_matches(',').trim();
        let Some(close) = s[open + 1..].find(')') else {
            break;
        };
        let args = parse_number_list(&s[open + 1..open + 1 + close]);
        let arg = |i: usize, default: f32| args.get(i).copied().unwrap_or(default);
        let m = match name {
            "translate" => Matrix::translate(arg(0, 0.0), arg(1, 0.0)),
            "scale" => Matrix::scale(arg(0, 1.0), arg(1, arg(0, 1.0))),
            "rotate" if args.len() >= 3 => Matrix::translate(args[1], args[2])
                .mul(Matrix::rotate(args[0]))
                .mul(Matrix::translate(-args[1], -args[2])),
            "rotate" => Matrix::rotate(arg(0, 0.0)),
            "matrix" if args.len() >= 6 => {
                Matrix::new(args[0], args[1], args[2], args[3], args[4], args[5])
            }
            _ => Matrix::identity(),
        };
        out = out.mul(m);
        s = s[open + 1 + close + 1..].trim_start();
    }
    out
}

fn parse_number_list(input: &str) -> Vec<f32> {
    input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<f32>().ok())
        .collect()
}

fn attr_number(node: roxmltree::Node<'_, '_>, name: &str) -> f32 {
    node.attribute(name).and_then(parse_number).unwrap_or(0.0)
}

fn rect_to_path(node: roxmltree::Node<'_, '_>) -> Vec<PathSeg> {
    let (x, y) = (attr_number(node, "x"), attr_number(node, "y"));
    let (w, h) = (attr_number(node, "width"), attr_number(node, "height"));
    if w <= 0.0 || h <= 0.0 {
        return Vec::new();
    }
    vec![
        PathSeg::MoveTo(x, y),
        PathSeg::LineTo(x + w, y),
        PathSeg::LineTo(x + w, y + h),
        PathSeg::LineTo(x, y + h),
        PathSeg::Close,
    ]
}

fn circle_to_path(node: roxmltree::Node<'_, '_>) -> Vec<PathSeg> {
    let r = attr_number(node, "r");
    ellipse_segments(attr_number(node, "cx"), attr_number(node, "cy"), r, r)
}

fn ellipse_to_path(node: roxmltree::Node<'_, '_>) -> Vec<PathSeg> {
    ellipse_segments(
        attr_number(node, "cx"),
        attr_number(node, "cy"),
        attr_number(node, "rx"),
        attr_number(node, "ry"),
    )
}

pub(crate) fn ellipse_segments(cx: f32, cy: f32, rx: f32, ry: f32) -> Vec<PathSeg> {
    if rx <= 0.0 || ry <= 0.0 {
        return Vec::new();
    }
    let k = 0.5522847498f32;
    let ox = rx * k;
    let oy = ry * k;
    vec![
        PathSeg::MoveTo(cx + rx, cy),
        PathSeg::CurveTo(cx + rx, cy + oy, cx + ox, cy + ry, cx, cy + ry),
        PathSeg::CurveTo(cx - ox, cy + ry, cx - rx, cy + oy, cx - rx, cy),
        PathSeg::CurveTo(cx - rx, cy - oy, cx - ox, cy - ry, cx, cy - ry),
        PathSeg::CurveTo(cx + ox, cy - ry, cx + rx, cy - oy, cx + rx, cy),
        PathSeg::Close,
    ]
}

fn line_to_path(node: roxmltree::Node<'_, '_>) -> Vec<PathSeg> {
    vec![
        PathSeg::MoveTo(attr_number(node, "x1"), attr_number(node, "y1")),
        PathSeg::LineTo(attr_number(node, "x2"), attr_number(node, "y2")),
    ]
}

fn poly_points_to_path(node: roxmltree::Node<'_, '_>, close: bool) -> Vec<PathSeg> {
    let nums = parse_number_list(node.attribute("points").unwrap_or(""));
    let points: Vec<(f32, f32)> = nums.chunks_exact(2).map(|p| (p[0], p[1])).collect();
    let Some((first, rest)) = points.split_first() else {
        return Vec::new();
    };
    if rest.is_empty() {
        return Vec::new();
    }
    let mut segs = vec![PathSeg::MoveTo(first.0, first.1)];
    segs.extend(rest.iter().map(|(x, y)| PathSeg::LineTo(*x, *y)));
    if close {
        segs.push(PathSeg::Close);
    }
    segs
}

/// Grammar-driven path parser. Quadratics and arcs are normalised to cubics.
/// Any deviation from the path grammar rejects the whole expression.
pub(crate) fn parse_path_data(d: &str) -> Result<Vec<PathSeg>, SvgError> {
    let mut p = PathParser::new(d);
    let mut segs = Vec::new();
    let (mut cur_x, mut cur_y) = (0.0f32, 0.0f32);
    let (mut start_x, mut start_y) = (0.0f32, 0.0f32);
    let mut last_cubic_ctrl2: Option<(f32, f32)> = None;
    let mut last_quad_ctrl: Option<(f32, f32)> = None;
    let mut command: Option<char> = None;

    loop {
        p.skip_ws();
        if p.at_end() {
            break;
        }
        let c = match p.peek_command() {
            Some(c) => {
                p.bump();
                c
            }
            // implicit repetition of the previous command
            None => match command {
                Some('M') => 'L',
                Some('m') => 'l',
                Some('Z') | Some('z') | None => return Err(p.error("expected a path command")),
                Some(prev) => prev,
            },
        };
        if command.is_none() && !matches!(c, 'M' | 'm') {
            return Err(p.error("path data must begin with a moveto"));
        }
        command = Some(c);
        let rel = c.is_ascii_lowercase();
        let (ox, oy) = if rel { (cur_x, cur_y) } else { (0.0, 0.0) };

        match c.to_ascii_uppercase() {
            'M' => {
                let (x, y) = p.pair()?;
                let (x, y) = (ox + x, oy + y);
                segs.push(PathSeg::MoveTo(x, y));
                (cur_x, cur_y, start_x, start_y) = (x, y, x, y);
                last_cubic_ctrl2 = None;
                last_quad_ctrl = None;
            }
            'L' => {
                let (x, y) = p.pair()?;
                (cur_x, cur_y) = (ox + x, oy + y);
                segs.push(PathSeg::LineTo(cur_x, cur_y));
                last_cubic_ctrl2 = None;
                last_quad_ctrl = None;
            }
            'H' => {
                let x = p.number()?;
                cur_x = ox + x;
                segs.push(PathSeg::LineTo(cur_x, cur_y));
                last_cubic_ctrl2 = None;
                last_quad_ctrl = None;
            }
            'V' => {
                let y = p.number()?;
                cur_y = oy + y;
                segs.push(PathSeg::LineTo(cur_x, cur_y));
                last_cubic_ctrl2 = None;
                last_quad_ctrl = None;
            }
            'C' => {
                let (x1, y1) = p.pair()?;
                let (x2, y2) = p.pair()?;
                let (x, y) = p.pair()?;
                let (x1, y1, x2, y2) = (ox + x1, oy + y1, ox + x2, oy + y2);
                (cur_x, cur_y) = (ox + x, oy + y);
                segs.push(PathSeg::CurveTo(x1, y1, x2, y2, cur_x, cur_y));
                last_cubic_ctrl2 = Some((x2, y2));
                last_quad_ctrl = None;
            }
            'S' => {
                let (x2, y2) = p.pair()?;
                let (x, y) = p.pair()?;
                let (x1, y1) = match last_cubic_ctrl2 {
                    Some((px, py)) => (2.0 * cur_x - px, 2.0 * cur_y - py),
                    None => (cur_x, cur_y),
                };
                let (x2, y2) = (ox + x2, oy + y2);
                (cur_x, cur_y) = (ox + x, oy + y);
                segs.push(PathSeg::CurveTo(x1, y1, x2, y2, cur_x, cur_y));
                last_cubic_ctrl2 = Some((x2, y2));
                last_quad_ctrl = None;
            }
            'Q' => {
                let (qx, qy) = p.pair()?;
                let (x, y) = p.pair()?;
                let (qx, qy, x, y) = (ox + qx, oy + qy, ox + x, oy + y);
                let (c1x, c1y, c2x, c2y) = quad_to_cubic(cur_x, cur_y, qx, qy, x, y);
                segs.push(PathSeg::CurveTo(c1x, c1y, c2x, c2y, x, y));
                (cur_x, cur_y) = (x, y);
                last_quad_ctrl = Some((qx, qy));
                last_cubic_ctrl2 = None;
            }
            'T' => {
                let (x, y) = p.pair()?;
                let (x, y) = (ox + x, oy + y);
                let (qx, qy) = match last_quad_ctrl {
                    Some((px, py)) => (2.0 * cur_x - px, 2.0 * cur_y - py),
                    None => (cur_x, cur_y),
                };
                let (c1x, c1y, c2x, c2y) = quad_to_cubic(cur_x, cur_y, qx, qy, x, y);
                segs.push(PathSeg::CurveTo(c1x, c1y, c2x, c2y, x, y));
                (cur_x, cur_y) = (x, y);
                last_quad_ctrl = Some((qx, qy));
                last_cubic_ctrl2 = None;
            }
            'A' => {
                let rx = p.number()?;
                let ry = p.number()?;
                let rotation = p.number()?;
                let large_arc = p.flag()?;
                let sweep = p.flag()?;
                let (x, y) = p.pair()?;
                let (x, y) = (ox + x, oy + y);
                segs.extend(arc_to_cubics(cur_x, cur_y, rx, ry, rotation, large_arc, sweep, x, y));
                (cur_x, cur_y) = (x, y);
                last_cubic_ctrl2 = None;
                last_quad_ctrl = None;
            }
            'Z' => {
                segs.push(PathSeg::Close);
                (cur_x, cur_y) = (start_x, start_y);
                last_cubic_ctrl2 = None;
                last_quad_ctrl = None;
            }
            _ => return Err(p.error(&format!("unknown path command '{c}'"))),
        }
    }
    Ok(segs)
}

fn quad_to_cubic(x0: f32, y0: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> (f32, f32, f32, f32) {
    let c1x = x0 + (2.0 / 3.0) * (x1 - x0);
    let c1y = y0 + (2.0 / 3.0) * (y1 - y0);
    let c2x = x2 + (2.0 / 3.0) * (x1 - x2);
    let c2y = y2 + (2.0 / 3.0) * (y1 - y2);
    (c1x, c1y, c2x, c2y)
}

/// Endpoint arc to cubic segments via the centre parameterisation.
#[allow(clippy::too_many_arguments)]
fn arc_to_cubics(
    x0: f32,
    y0: f32,
    rx_in: f32,
    ry_in: f32,
    x_axis_rotation_deg: f32,
    large_arc: bool,
    sweep: bool,
    x1: f32,
    y1: f32,
) -> Vec<PathSeg> {
    use std::f32::consts::PI;

    let mut rx = rx_in.abs();
    let mut ry = ry_in.abs();
    if rx == 0.0 || ry == 0.0 || (x0 == x1 && y0 == y1) {
        return vec![PathSeg::LineTo(x1, y1)];
    }

    let phi = x_axis_rotation_deg.to_radians();
    let sin_phi = libm::sinf(phi);
    let cos_phi = libm::cosf(phi);

    let dx2 = (x0 - x1) / 2.0;
    let dy2 = (y0 - y1) / 2.0;
    let x1p = cos_phi * dx2 + sin_phi * dy2;
    let y1p = -sin_phi * dx2 + cos_phi * dy2;

    let lambda = (x1p * x1p) / (rx * rx) + (y1p * y1p) / (ry * ry);
    if lambda > 1.0 {
        let s = libm::sqrtf(lambda);
        rx *= s;
        ry *= s;
    }

    let rx2 = rx * rx;
    let ry2 = ry * ry;
    let num = rx2 * ry2 - rx2 * y1p * y1p - ry2 * x1p * x1p;
    let den = rx2 * y1p * y1p + ry2 * x1p * x1p;
    let coef = if den != 0.0 {
        let sign = if large_arc == sweep { -1.0 } else { 1.0 };
        sign * libm::sqrtf((num / den).max(0.0))
    } else {
        0.0
    };
    let cxp = coef * (rx * y1p / ry);
    let cyp = coef * (-ry * x1p / rx);
    let cx = cos_phi * cxp - sin_phi * cyp + (x0 + x1) / 2.0;
    let cy = sin_phi * cxp + cos_phi * cyp + (y0 + y1) / 2.0;

    let angle = |ux: f32, uy: f32, vx: f32, vy: f32| libm::atan2f(ux * vy - uy * vx, ux * vx + uy * vy);
    let ux = (x1p - cxp) / rx;
    let uy = (y1p - cyp) / ry;
    let vx = (-x1p - cxp) / rx;
    let vy = (-y1p - cyp) / ry;
    let mut theta = angle(1.0, 0.0, ux, uy);
    let mut dtheta = angle(ux, uy, vx, vy);
    if !sweep && dtheta > 0.0 {
        dtheta -= 2.0 * PI;
    } else if sweep && dtheta < 0.0 {
        dtheta += 2.0 * PI;
    }

    let count = libm::ceilf(dtheta.abs() / (PI / 2.0)).max(1.0) as i32;
    let delta = dtheta / count as f32;
    let map = |x: f32, y: f32| {
        let (x, y) = (rx * x, ry * y);
        (cx + cos_phi * x - sin_phi * y, cy + sin_phi * x + cos_phi * y)
    };

    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let t1 = theta;
        let t2 = theta + delta;
        let k = (4.0 / 3.0) * libm::tanf(delta / 4.0);
        let (s1, c1) = (libm::sinf(t1), libm::cosf(t1));
        let (s2, c2) = (libm::sinf(t2), libm::cosf(t2));
        let (c1x, c1y) = map(c1 - k * s1, s1 + k * c1);
        let (c2x, c2y) = map(c2 + k * s2, s2 - k * c2);
        let (ex, ey) = map(c2, s2);
        out.push(PathSeg::CurveTo(c1x, c1y, c2x, c2y, ex, ey));
        theta = t2;
    }
    out
}

struct PathParser<'a> {
    bytes: &'a [u8],
    i: usize,
}

impl<'a> PathParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            i: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.i >= self.bytes.len()
    }

    fn bump(&mut self) {
        self.i += 1;
    }

    fn error(&self, reason: &str) -> SvgError {
        SvgError::MalformedPath {
            offset: self.i,
            reason: reason.to_string(),
        }
    }

    fn skip_ws(&mut self) {
        while let Some(b) = self.bytes.get(self.i) {
            if matches!(b, b' ' | b'\n' | b'\r' | b'\t' | b',') {
                self.i += 1;
            } else {
                break;
            }
        }
    }

    fn peek_command(&self) -> Option<char> {
        let c = *self.bytes.get(self.i)? as char;
        // 'e'/'E' only appear inside numbers, which are consumed whole
        (c.is_ascii_alphabetic()).then_some(c)
    }

    fn number(&mut self) -> Result<f32, SvgError> {
        self.skip_ws();
        let start = self.i;
        let mut digits = false;
        if matches!(self.bytes.get(self.i), Some(b'+' | b'-')) {
            self.i += 1;
        }
        while self.bytes.get(self.i).is_some_and(u8::is_ascii_digit) {
            self.i += 1;
            digits = true;
        }
        if self.bytes.get(self.i) == Some(&b'.') {
            self.i += 1;
            while self.bytes.get(self.i).is_some_and(u8::is_ascii_digit) {
                self.i += 1;
                digits = true;
            }
        }
        if !digits {
            self.i = start;
            return Err(self.error("expected a number"));
        }
        if matches!(self.bytes.get(self.i), Some(b'e' | b'E')) {
            let mark = self.i;
            self.i += 1;
            if matches!(self.bytes.get(self.i), Some(b'+' | b'-')) {
                self.i += 1;
            }
            let exp_start = self.i;
            while self.bytes.get(self.i).is_some_and(u8::is_ascii_digit) {
                self.i += 1;
            }
            if self.i == exp_start {
                self.i = mark;
            }
        }
        std::str::from_utf8(&self.bytes[start..self.i])
            .ok()
            .and_then(|s| s.parse::<f32>().ok())
            .filter(|v| v.is_finite())
            .ok_or_else(|| SvgError::MalformedPath {
                offset: start,
                reason: "number out of range".to_string(),
            })
    }

    fn flag(&mut self) -> Result<bool, SvgError> {
        self.skip_ws();
        match self.bytes.get(self.i) {
            Some(b'0') => {
                self.i += 1;
                Ok(false)
            }
            Some(b'1') => {
                self.i += 1;
                Ok(true)
            }
            _ => Err(self.error("expected an arc flag (0 or 1)")),
        }
    }

    fn pair(&mut self) -> Result<(f32, f32), SvgError> {
        Ok((self.number()?, self.number()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest() -> Rect {
        Rect::new(Pt::from_i32(100), Pt::from_i32(100), Pt::from_i32(200), Pt::from_i32(100))
    }

    #[test]
    fn parses_simple_path() {
        let segs = parse_path_data("M 0 0 L 10 0 L 10 10 Z").unwrap();
        assert_eq!(
            segs,
            vec![
                PathSeg::MoveTo(0.0, 0.0),
                PathSeg::LineTo(10.0, 0.0),
                PathSeg::LineTo(10.0, 10.0),
                PathSeg::Close
            ]
        );
    }

    #[test]
    fn implicit_lineto_after_moveto_and_relative_commands() {
        let segs = parse_path_data("m1 1 2 0 h3 v-1").unwrap();
        assert_eq!(
            segs,
            vec![
                PathSeg::MoveTo(1.0, 1.0),
                PathSeg::LineTo(3.0, 1.0),
                PathSeg::LineTo(6.0, 1.0),
                PathSeg::LineTo(6.0, 0.0)
            ]
        );
    }

    #[test]
    fn quadratics_and_arcs_become_cubics() {
        let segs = parse_path_data("M 0 0 Q 10 0 10 10 T 20 20 A 5 5 0 0 1 30 30 Z").unwrap();
        assert!(segs.iter().filter(|s| matches!(s, PathSeg::CurveTo(..))).count() >= 3);
        let compact = parse_path_data("M10 10 A5 5 0 01 20 20").unwrap();
        assert!(compact.iter().any(|s| matches!(s, PathSeg::CurveTo(..))));
    }

    #[test]
    fn malformed_paths_are_rejected() {
        for d in ["L 10 10", "M 0 0 L 10", "M 0 0 X 1 1", "M 0 0 A 5 5 0 2 1 3 3", "M 0 0 Z 5"] {
            assert!(
                matches!(parse_path_data(d), Err(SvgError::MalformedPath { .. })),
                "{d}"
            );
        }
    }

    #[test]
    fn exponent_numbers_parse() {
        let segs = parse_path_data("M1e1 2E-1L-.5.5").unwrap();
        assert_eq!(segs[0], PathSeg::MoveTo(10.0, 0.2));
        assert_eq!(segs[1], PathSeg::LineTo(-0.5, 0.5));
    }

    #[test]
    fn rect_is_flipped_and_scaled_into_the_box() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 20 10"><rect x="0" y="0" width="20" height="10" fill="#ff0000"/></svg>"##;
        let graphic = translate_svg(svg, dest(), Pt::from_i32(842)).unwrap();
        assert!(graphic.warnings.is_empty());
        // viewBox top-left (0,0) lands at the box's top-left, flipped: y = 842 - 100
        assert!(graphic.commands.contains(&SvgCommand::MoveTo(100.0, 742.0)));
        // bottom-right (20,10) -> (300, 842 - 200)
        assert!(graphic.commands.contains(&SvgCommand::LineTo(300.0, 642.0)));
        assert!(graphic.commands.contains(&SvgCommand::FillColor(Color::rgb(1.0, 0.0, 0.0))));
        assert!(graphic.commands.contains(&SvgCommand::Paint(PaintOp::Fill)));
    }

    #[test]
    fn unsupported_elements_warn_but_do_not_fail() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10"><text>hi</text><circle cx="5" cy="5" r="5" stroke="black" fill="none"/></svg>"#;
        let graphic = translate_svg(svg, dest(), Pt::from_i32(842)).unwrap();
        assert_eq!(graphic.warnings.len(), 1);
        assert!(graphic.warnings[0].contains("text"));
        assert!(graphic.commands.contains(&SvgCommand::Paint(PaintOp::Stroke)));
    }

    #[test]
    fn malformed_path_fails_the_graphic() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg"><path d="M 0 0 L"/></svg>"#;
        assert!(matches!(
            translate_svg(svg, dest(), Pt::from_i32(842)),
            Err(SvgError::MalformedPath { .. })
        ));
        assert!(matches!(
            translate_svg("<html/>", dest(), Pt::from_i32(842)),
            Err(SvgError::NotSvg(_))
        ));
    }

    #[test]
    fn group_styles_and_transforms_inherit() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="100"><g style="fill:none;stroke:#00f" transform="translate(10,0)"><line x1="0" y1="0" x2="10" y2="0"/></g></svg>"##;
        let graphic = translate_svg(svg, dest(), Pt::from_i32(842)).unwrap();
        assert!(graphic.commands.contains(&SvgCommand::MoveTo(110.0, 742.0)));
        assert!(graphic.commands.contains(&SvgCommand::StrokeColor(Color::rgb(0.0, 0.0, 1.0))));
    }
}
