//! Layout and pagination.
//!
//! The engine walks the template in document order and drives a [`Canvas`]
//! through an explicit state machine:
//! `NewPage -> PlacingTitle -> PlacingElement -> RowOverflowCheck -> FinalizingPage -> Done`.
//! Every block is measured before it is committed; a block that does not fit
//! finalizes the page and is retried on a fresh one, and a block taller than
//! an empty page is forced onto it alone so pagination always terminates.

use std::collections::VecDeque;

use serde_json::json;

use crate::annot::{resolve_link, PlacedLink, PlacedWidget};
use crate::canvas::{Canvas, Document};
use crate::debug::DebugLogger;
use crate::error::{AssemblyError, Result};
use crate::font::{FontRef, FontRegistry};
use crate::frame::{Frame, Placement};
use crate::images::{decode_image_data, is_svg, ImageRef, ImageRegistry};
use crate::props::{resolve_color, Align, Borders, CellProps};
use crate::svg::translate_svg;
use crate::template::{
    Cell, Divider, ElementRef, FormField, FormFieldKind, ImageSpec, Table, TemplateDocument,
};
use crate::types::{Color, PageSize, Pt, Rect, Size};

pub const MARGIN: i32 = 72;
const BASE_ROW_HEIGHT: f64 = 25.0;
const CELL_PADDING: i32 = 5;
const TABLE_SPACING: i32 = 20;
const IMAGE_SPACING: i32 = 20;
const DEFAULT_IMAGE_WIDTH: f64 = 300.0;
const DEFAULT_IMAGE_HEIGHT: f64 = 200.0;
const CHECKBOX_SIZE: i32 = 10;
const TOGGLE_WIDGET_SIZE: i32 = 12;
const FOOTER_INSET: i32 = 20;
const PAGE_NUMBER_SIZE: i32 = 10;
const WATERMARK_GRAY: f32 = 0.85;
const DIAGONAL: [f32; 4] = [0.7071, 0.7071, -0.7071, 0.7071];
const TITLE_DEFAULT_PROPS: &str = "Helvetica:18:100:center";
const FOOTER_DEFAULT_PROPS: &str = "Helvetica:10:000:left";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutState {
    NewPage,
    PlacingTitle,
    PlacingElement,
    RowOverflowCheck,
    FinalizingPage,
    Done,
}

/// Work queue entry. Tables expand into their rows plus trailing spacing.
#[derive(Clone, Copy)]
enum Block<'a> {
    Table(&'a Table),
    Row { table: &'a Table, index: usize },
    Gap(Pt),
    Spacer(Pt),
    Image(&'a ImageSpec),
    Divider(&'a Divider),
}

/// A measured block waiting for a placement decision.
enum Placeable<'a> {
    Row(PreparedRow<'a>),
    Spacer(Pt),
    Image(PreparedImage<'a>),
    Divider { thickness: Pt, color: Color },
}

impl Placeable<'_> {
    fn height(&self) -> Pt {
        match self {
            Placeable::Row(row) => row.height,
            Placeable::Spacer(height) => *height,
            Placeable::Image(image) => image.height + Pt::from_i32(IMAGE_SPACING),
            Placeable::Divider { thickness, .. } => *thickness + Pt::from_i32(10),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Placeable::Row(_) => "row",
            Placeable::Spacer(_) => "spacer",
            Placeable::Image(_) => "image",
            Placeable::Divider { .. } => "divider",
        }
    }
}

struct PreparedRow<'a> {
    index: usize,
    height: Pt,
    cells: Vec<PreparedCell<'a>>,
}

struct PreparedCell<'a> {
    cell: &'a Cell,
    props: CellProps,
    font: FontRef,
    x: Pt,
    width: Pt,
    height: Option<Pt>,
    lines: Vec<String>,
    fill: Option<Color>,
    text_color: Color,
}

enum ImageContent {
    Raster(ImageRef),
    Vector(String),
}

struct PreparedImage<'a> {
    spec: &'a ImageSpec,
    content: ImageContent,
    width: Pt,
    height: Pt,
}

pub struct LayoutEngine<'a> {
    template: &'a TemplateDocument,
    fonts: &'a mut FontRegistry,
    images: &'a mut ImageRegistry,
    debug: Option<DebugLogger>,
    canvas: Canvas,
    frame: Frame,
    page_size: Size,
    margin: Pt,
    page_border: Borders,
    page_number_font: FontRef,
    queue: VecDeque<Block<'a>>,
    pending: Option<Placeable<'a>>,
    title_placed: bool,
    exhausted: bool,
}

impl<'a> LayoutEngine<'a> {
    pub fn new(
        template: &'a TemplateDocument,
        fonts: &'a mut FontRegistry,
        images: &'a mut ImageRegistry,
    ) -> Result<Self> {
        let config = &template.config;
        let page_size = Size::for_page(PageSize::from_name(&config.page), config.landscape());
        let margin = Pt::from_i32(MARGIN);
        if page_size.width <= margin * 2 || page_size.height <= margin * 2 {
            return Err(AssemblyError::Layout(format!(
                "page {}x{} leaves no room inside the margins",
                page_size.width.to_f32(),
                page_size.height.to_f32()
            )));
        }
        let page_number_font = fonts.register_font("Helvetica", false, false)?;
        let queue = template
            .ordered_elements()?
            .into_iter()
            .map(|element| match element {
                ElementRef::Table(table) => Block::Table(table),
                ElementRef::Spacer(spacer) => Block::Spacer(Pt::from_f64(spacer.height.max(0.0))),
                ElementRef::Image(image) => Block::Image(image),
                ElementRef::Divider(divider) => Block::Divider(divider),
            })
            .collect();
        let content = content_rect(page_size, margin);
        Ok(Self {
            template,
            fonts,
            images,
            debug: None,
            canvas: Canvas::new(page_size),
            frame: Frame::new(content),
            page_size,
            margin,
            page_border: Borders::from_page_border(&config.page_border),
            page_number_font,
            queue,
            pending: None,
            title_placed: false,
            exhausted: false,
        })
    }

    pub(crate) fn with_debug(mut self, debug: Option<DebugLogger>) -> Self {
        self.debug = debug;
        self
    }

    pub fn run(mut self) -> Result<Document> {
        let mut state = LayoutState::NewPage;
        loop {
            state = match state {
                LayoutState::NewPage => {
                    self.begin_page()?;
                    if !self.title_placed {
                        LayoutState::PlacingTitle
                    } else if self.pending.is_some() {
                        LayoutState::RowOverflowCheck
                    } else {
                        LayoutState::PlacingElement
                    }
                }
                LayoutState::PlacingTitle => {
                    self.place_title()?;
                    LayoutState::PlacingElement
                }
                LayoutState::PlacingElement => self.next_block()?,
                LayoutState::RowOverflowCheck => self.commit_pending()?,
                LayoutState::FinalizingPage => {
                    self.finish_page()?;
                    if self.exhausted {
                        LayoutState::Done
                    } else {
                        LayoutState::NewPage
                    }
                }
                LayoutState::Done => break,
            };
        }

        let mut document = self.canvas.finish();
        let fonts: &FontRegistry = &*self.fonts;
        let font = &self.page_number_font;
        document.resolve_page_numbers(|_, size, text| fonts.measure_text_width(font, size, text));
        log::debug!("layout finished with {} page(s)", document.pages.len());
        if let Some(debug) = &self.debug {
            debug.record("layout.done", json!({ "pages": document.pages.len() }));
        }
        Ok(document)
    }

    fn content_width(&self) -> Pt {
        self.frame.rect().width
    }

    fn page_number(&self) -> usize {
        self.canvas.page_index() + 1
    }

    fn trace(&self, kind: &str, fields: serde_json::Value) {
        if let Some(debug) = &self.debug {
            debug.record(kind, fields);
        }
    }

    fn count(&self, key: &str) {
        if let Some(debug) = &self.debug {
            debug.increment(key, 1);
        }
    }

    fn begin_page(&mut self) -> Result<()> {
        self.frame = Frame::new(content_rect(self.page_size, self.margin));
        let page = self.page_number();
        log::debug!("layout: page {page} started");
        self.trace("layout.page_start", json!({ "page": page }));
        self.count("layout.pages");
        self.draw_page_border();
        self.draw_watermark()
    }

    fn next_block(&mut self) -> Result<LayoutState> {
        let Some(block) = self.queue.pop_front() else {
            self.exhausted = true;
            return Ok(LayoutState::FinalizingPage);
        };
        let placeable = match block {
            Block::Table(table) => {
                self.queue.push_front(Block::Gap(Pt::from_i32(TABLE_SPACING)));
                for index in (0..table.rows.len()).rev() {
                    self.queue.push_front(Block::Row { table, index });
                }
                return Ok(LayoutState::PlacingElement);
            }
            Block::Gap(amount) => {
                self.frame.advance(amount);
                return Ok(LayoutState::PlacingElement);
            }
            Block::Row { table, index } => Placeable::Row(self.prepare_row(table, index)?),
            Block::Spacer(height) => Placeable::Spacer(height),
            Block::Image(spec) => match self.prepare_image(spec) {
                Some(image) => Placeable::Image(image),
                None => return Ok(LayoutState::PlacingElement),
            },
            Block::Divider(divider) => Placeable::Divider {
                thickness: Pt::from_f64(divider.thickness.filter(|t| *t > 0.0).unwrap_or(1.0)),
                color: resolve_color(divider.color.as_deref()).unwrap_or(Color::BLACK),
            },
        };
        self.pending = Some(placeable);
        Ok(LayoutState::RowOverflowCheck)
    }

    fn commit_pending(&mut self) -> Result<LayoutState> {
        let Some(item) = self.pending.take() else {
            return Ok(LayoutState::PlacingElement);
        };
        let height = item.height();
        match self.frame.place(height) {
            Placement::Placed { top } => {
                log::trace!(
                    "placed {} ({}pt) at y={} on page {}",
                    item.kind(),
                    height.to_f32(),
                    top.to_f32(),
                    self.page_number()
                );
                self.draw(item, top);
                Ok(LayoutState::PlacingElement)
            }
            Placement::Forced { top } => {
                log::debug!(
                    "{} of {}pt exceeds an empty page; forced onto page {}",
                    item.kind(),
                    height.to_f32(),
                    self.page_number()
                );
                self.trace(
                    "layout.forced",
                    json!({ "page": self.page_number(), "kind": item.kind(), "height": height.to_f32() }),
                );
                self.count("layout.forced");
                self.draw(item, top);
                Ok(LayoutState::PlacingElement)
            }
            Placement::Overflow => {
                log::debug!(
                    "page break before {} on page {} (needs {}pt, {}pt left)",
                    item.kind(),
                    self.page_number(),
                    height.to_f32(),
                    self.frame.remaining_height().to_f32()
                );
                self.trace(
                    "layout.page_break",
                    json!({
                        "page": self.page_number(),
                        "kind": item.kind(),
                        "needed": height.to_f32(),
                        "remaining": self.frame.remaining_height().to_f32(),
                    }),
                );
                self.pending = Some(item);
                Ok(LayoutState::FinalizingPage)
            }
        }
    }

    fn draw(&mut self, item: Placeable<'a>, top: Pt) {
        match item {
            Placeable::Row(row) => self.draw_row(&row, top),
            Placeable::Spacer(_) => {}
            Placeable::Image(image) => self.draw_element_image(image, top + Pt::from_i32(IMAGE_SPACING)),
            Placeable::Divider { thickness, color } => {
                let y = top + Pt::from_i32(5) + thickness / 2;
                let left = self.frame.rect().x;
                self.canvas.save_state();
                self.canvas.set_stroke_color(color);
                self.canvas.set_line_width(thickness);
                self.canvas.stroke_line(left, y, left + self.content_width(), y);
                self.canvas.restore_state();
            }
        }
    }

    fn finish_page(&mut self) -> Result<()> {
        self.draw_footer()?;
        self.canvas.page_number(
            &self.page_number_font.resource,
            Pt::from_i32(PAGE_NUMBER_SIZE),
            Pt::from_i32(FOOTER_INSET),
            Pt::from_i32(FOOTER_INSET),
        );
        let page = self.page_number();
        self.trace(
            "layout.page_finalize",
            json!({ "page": page, "used": (self.frame.cursor() - self.frame.rect().y).to_f32() }),
        );
        self.canvas.show_page();
        Ok(())
    }

    fn draw_page_border(&mut self) {
        let borders = self.page_border;
        if !borders.any() {
            return;
        }
        let m = self.margin;
        let right = self.page_size.width - m;
        let bottom = self.page_size.height - m;
        self.canvas.save_state();
        self.canvas.set_stroke_color(Color::BLACK);
        stroke_edges(&mut self.canvas, borders, Rect::new(m, m, right - m, bottom - m));
        self.canvas.restore_state();
    }

    fn draw_watermark(&mut self) -> Result<()> {
        let template = self.template;
        let Some(text) = template
            .config
            .watermark
            .as_deref()
            .filter(|text| !text.trim().is_empty())
        else {
            return Ok(());
        };
        let width = self.page_size.width;
        let height = self.page_size.height;
        let size = Pt::from_i32((width.to_f32() / 8.0) as i32).max(Pt::from_i32(40));
        let font = self.fonts.register_font("Helvetica", false, false)?;
        self.canvas.save_state();
        self.canvas.set_fill_color(Color::gray(WATERMARK_GRAY));
        self.canvas.set_font(&font.resource, size);
        self.canvas.draw_string_transformed(
            width.mul_ratio(2, 10),
            height - height.mul_ratio(3, 10),
            text,
            DIAGONAL,
        );
        self.canvas.restore_state();
        Ok(())
    }

    fn draw_footer(&mut self) -> Result<()> {
        let template = self.template;
        let Some(footer) = &template.footer else {
            return Ok(());
        };
        let Some(text) = footer.text.as_deref().filter(|text| !text.is_empty()) else {
            return Ok(());
        };
        let props = CellProps::parse(footer.font.as_deref().unwrap_or(FOOTER_DEFAULT_PROPS))?;
        let font = self.fonts.register_font(&props.font, props.bold, props.italic)?;
        let size = props.size_pt();
        let text_width = self.fonts.measure_text_width(&font, size, text);
        let inset = Pt::from_i32(FOOTER_INSET);
        let x = match props.align {
            Align::Left => inset,
            Align::Center => (self.page_size.width - text_width) / 2,
            Align::Right => self.page_size.width - inset - text_width,
        };
        let baseline = self.page_size.height - inset;
        self.canvas.set_fill_color(Color::BLACK);
        self.canvas.set_font(&font.resource, size);
        self.canvas.draw_string(x, baseline, text);
        if let Some(target) = footer.link.as_deref().and_then(resolve_link) {
            self.canvas.add_link(PlacedLink {
                rect: Rect::new(x, baseline - size, text_width, size + Pt::from_i32(2)),
                target,
            });
        }
        Ok(())
    }

    fn place_title(&mut self) -> Result<()> {
        self.title_placed = true;
        let template = self.template;
        let Some(title) = &template.title else {
            return Ok(());
        };
        if let Some(text) = title.text.as_deref().filter(|text| !text.is_empty()) {
            let props = CellProps::parse(title.props.as_deref().unwrap_or(TITLE_DEFAULT_PROPS))?;
            let font = self.fonts.register_font(&props.font, props.bold, props.italic)?;
            let size = props.size_pt();
            self.frame.advance(size + Pt::from_i32(20));
            let baseline = self.frame.cursor();
            let left = self.frame.rect().x;
            let available = self.content_width();
            let text_width = self.fonts.measure_text_width(&font, size, text);
            let x = match props.align {
                Align::Left => left,
                Align::Center => left + (available - text_width) / 2,
                Align::Right => self.page_size.width - self.margin - text_width,
            };
            if let Some(fill) = resolve_color(title.bgcolor.as_deref()) {
                self.canvas.save_state();
                self.canvas.set_fill_color(fill);
                self.canvas.fill_rect(Rect::new(
                    left,
                    baseline - size - Pt::from_i32(4),
                    available,
                    size + Pt::from_i32(8),
                ));
                self.canvas.restore_state();
            }
            let color = resolve_color(title.textcolor.as_deref()).unwrap_or(Color::BLACK);
            self.draw_text_line(&font, size, color, x, baseline, text, props.underline);
            if let Some(target) = title.link.as_deref().and_then(resolve_link) {
                self.canvas.add_link(PlacedLink {
                    rect: Rect::new(x, baseline - size, text_width, size + Pt::from_i32(2)),
                    target,
                });
            }
            self.frame.advance(Pt::from_i32(30));
            self.trace("layout.title", json!({ "page": self.page_number(), "text": text }));
        }
        if let Some(table) = &title.table {
            self.queue.push_front(Block::Table(table));
        }
        Ok(())
    }

    fn prepare_row(&mut self, table: &'a Table, index: usize) -> Result<PreparedRow<'a>> {
        let row = &table.rows[index];
        let columns = column_widths(table, self.content_width());
        let mut height = base_row_height(table, index);
        let mut x = self.frame.rect().x;
        let padding = Pt::from_i32(CELL_PADDING);
        let mut cells = Vec::with_capacity(row.row.len().min(columns.len()));

        for (column, cell) in row.row.iter().enumerate().take(columns.len()) {
            let props = match &cell.props {
                Some(raw) => CellProps::parse(raw)?,
                None => CellProps::default(),
            };
            let font = self.fonts.register_font(&props.font, props.bold, props.italic)?;
            let width = positive(cell.width).map(Pt::from_f64).unwrap_or(columns[column]);
            let cell_height = positive(cell.height).map(Pt::from_f64);
            let size = props.size_pt();

            let lines = match cell.text.as_deref().filter(|text| !text.is_empty()) {
                Some(text) if cell.wrap.unwrap_or(true) => {
                    let lines = self.fonts.wrap_text(&font, size, text, width - padding * 2);
                    let wrapped = size.mul_ratio(12 * lines.len() as i32, 10) + Pt::from_i32(10);
                    height = height.max(wrapped);
                    lines
                }
                Some(text) => vec![text.to_string()],
                None => Vec::new(),
            };
            if let Some(cell_height) = cell_height {
                height = height.max(cell_height);
            }

            cells.push(PreparedCell {
                cell,
                fill: resolve_color(cell.bgcolor.as_deref())
                    .or_else(|| resolve_color(table.bgcolor.as_deref())),
                text_color: resolve_color(cell.textcolor.as_deref())
                    .or_else(|| resolve_color(table.textcolor.as_deref()))
                    .unwrap_or(Color::BLACK),
                props,
                font,
                x,
                width,
                height: cell_height,
                lines,
            });
            x += width;
        }

        Ok(PreparedRow {
            index,
            height,
            cells,
        })
    }

    fn draw_row(&mut self, row: &PreparedRow<'a>, top: Pt) {
        log::trace!("row {} at y={} (h={})", row.index, top.to_f32(), row.height.to_f32());
        self.trace(
            "layout.row",
            json!({
                "page": self.page_number(),
                "row": row.index,
                "y": top.to_f32(),
                "height": row.height.to_f32(),
            }),
        );
        self.count("layout.rows");

        for cell in &row.cells {
            let rect = Rect::new(cell.x, top, cell.width, cell.height.unwrap_or(row.height));
            if let Some(fill) = cell.fill {
                self.canvas.save_state();
                self.canvas.set_fill_color(fill);
                self.canvas.fill_rect(rect);
                self.canvas.restore_state();
            }
            if cell.props.borders.any() {
                self.canvas.save_state();
                self.canvas.set_stroke_color(Color::BLACK);
                stroke_edges(&mut self.canvas, cell.props.borders, rect);
                self.canvas.restore_state();
            }

            if let Some(field) = &cell.cell.form_field {
                self.place_widget(field, rect);
            } else if let Some(spec) = cell.cell.image.as_ref().filter(|spec| !spec.imagedata.is_empty()) {
                self.draw_cell_image(spec, rect);
            } else if let Some(checked) = cell.cell.chequebox {
                draw_checkbox(&mut self.canvas, rect, checked);
            } else if !cell.lines.is_empty() {
                self.draw_cell_text(cell, rect);
            }

            if let Some(target) = cell.cell.link.as_deref().and_then(resolve_link) {
                self.canvas.add_link(PlacedLink { rect, target });
            }
            if let Some(dest) = cell.cell.dest.as_deref().filter(|dest| !dest.is_empty()) {
                self.canvas.add_destination(dest, top);
            }
        }
    }

    fn draw_cell_text(&mut self, cell: &PreparedCell<'a>, rect: Rect) {
        let size = cell.props.size_pt();
        let padding = Pt::from_i32(CELL_PADDING);
        let line_height = size.mul_ratio(12, 10);
        let count = cell.lines.len() as i32;
        let first_baseline = if count <= 1 {
            rect.y + rect.height / 2 + size / 2
        } else {
            rect.y + (rect.height - line_height * count) / 2 + size
        };
        for (index, line) in cell.lines.iter().enumerate() {
            let text_width = self.fonts.measure_text_width(&cell.font, size, line);
            let x = match cell.props.align {
                Align::Left => rect.x + padding,
                Align::Center => rect.x + (rect.width - text_width) / 2,
                Align::Right => rect.right() - text_width - padding,
            };
            let baseline = first_baseline + line_height * index as i32;
            self.draw_text_line(
                &cell.font,
                size,
                cell.text_color,
                x,
                baseline,
                line,
                cell.props.underline,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_text_line(
        &mut self,
        font: &FontRef,
        size: Pt,
        color: Color,
        x: Pt,
        baseline: Pt,
        text: &str,
        underline: bool,
    ) {
        self.canvas.set_fill_color(color);
        self.canvas.set_font(&font.resource, size);
        self.canvas.draw_string(x, baseline, text);
        if underline {
            let width = self.fonts.measure_text_width(font, size, text);
            let y = baseline + Pt::from_i32(2);
            self.canvas.save_state();
            self.canvas.set_stroke_color(color);
            self.canvas.set_line_width(Pt::from_f32(0.5));
            self.canvas.stroke_line(x, y, x + width, y);
            self.canvas.restore_state();
        }
    }

    fn place_widget(&mut self, field: &FormField, rect: Rect) {
        let widget_rect = match field.kind {
            FormFieldKind::Checkbox | FormFieldKind::Radio => {
                let side = Pt::from_i32(TOGGLE_WIDGET_SIZE);
                Rect::new(
                    rect.x + (rect.width - side) / 2,
                    rect.y + (rect.height - side) / 2,
                    side,
                    side,
                )
            }
            FormFieldKind::Text => {
                let inset = Pt::from_i32(2);
                Rect::new(
                    rect.x + inset,
                    rect.y + inset,
                    (rect.width - inset * 2).max(Pt::ZERO),
                    (rect.height - inset * 2).max(Pt::ZERO),
                )
            }
        };
        self.canvas.add_widget(PlacedWidget {
            rect: widget_rect,
            field: field.clone(),
        });
    }

    fn draw_cell_image(&mut self, spec: &ImageSpec, cell: Rect) {
        let inner = Pt::from_i32(CELL_PADDING * 2);
        let max_width = (cell.width - inner).max(Pt::ZERO);
        let max_height = (cell.height - inner).max(Pt::ZERO);
        let Some(content) = self.load_image(spec) else {
            return;
        };
        let natural = match &content {
            ImageContent::Raster(image) => Some((image.width, image.height)),
            ImageContent::Vector(_) => None,
        };
        let (width, height) = fit_image(spec, natural, max_width, max_height);
        let rect = Rect::new(
            cell.x + (cell.width - width) / 2,
            cell.y + (cell.height - height) / 2,
            width,
            height,
        );
        self.draw_image_content(&spec.imagename, content, rect);
    }

    fn prepare_image(&mut self, spec: &'a ImageSpec) -> Option<PreparedImage<'a>> {
        let content = self.load_image(spec)?;
        let mut width = Pt::from_f64(positive(spec.width).unwrap_or(DEFAULT_IMAGE_WIDTH));
        let mut height = Pt::from_f64(positive(spec.height).unwrap_or(DEFAULT_IMAGE_HEIGHT));
        let available = self.content_width();
        if width > available {
            height = height.mul_ratio(
                available.to_milli_i64().min(i32::MAX as i64) as i32,
                width.to_milli_i64().min(i32::MAX as i64) as i32,
            );
            width = available;
        }
        if let ImageContent::Vector(xml) = &content {
            let bounds = Rect::new(Pt::ZERO, Pt::ZERO, width, height);
            if let Err(err) = translate_svg(xml, bounds, self.page_size.height) {
                self.skip_image(&spec.imagename, &err.to_string());
                return None;
            }
        }
        Some(PreparedImage {
            spec,
            content,
            width,
            height,
        })
    }

    fn draw_element_image(&mut self, image: PreparedImage<'a>, top: Pt) {
        let PreparedImage {
            spec,
            content,
            width,
            height,
        } = image;
        let rect = Rect::new((self.page_size.width - width) / 2, top, width, height);
        self.draw_image_content(&spec.imagename, content, rect);
        if let Some(target) = spec.link.as_deref().and_then(resolve_link) {
            self.canvas.add_link(PlacedLink { rect, target });
        }
    }

    /// Decodes and registers an image payload. Malformed payloads are skipped.
    fn load_image(&mut self, spec: &ImageSpec) -> Option<ImageContent> {
        let bytes = match decode_image_data(&spec.imagedata) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.skip_image(&spec.imagename, &err.to_string());
                return None;
            }
        };
        if is_svg(&spec.imagename, &bytes) {
            return match String::from_utf8(bytes) {
                Ok(xml) => Some(ImageContent::Vector(xml)),
                Err(_) => {
                    self.skip_image(&spec.imagename, "svg payload is not utf-8");
                    None
                }
            };
        }
        match self.images.register_image(&bytes) {
            Ok(handle) => Some(ImageContent::Raster(handle)),
            Err(err) => {
                self.skip_image(&spec.imagename, &err.to_string());
                None
            }
        }
    }

    fn draw_image_content(&mut self, name: &str, content: ImageContent, rect: Rect) {
        match content {
            ImageContent::Raster(handle) => self.canvas.draw_image(rect, handle.resource),
            ImageContent::Vector(xml) => match translate_svg(&xml, rect, self.page_size.height) {
                Ok(graphic) => {
                    for warning in &graphic.warnings {
                        log::warn!("svg '{name}': {warning}");
                    }
                    self.canvas.save_state();
                    self.canvas.draw_vector(graphic.commands);
                    self.canvas.restore_state();
                }
                Err(err) => self.skip_image(name, &err.to_string()),
            },
        }
    }

    fn skip_image(&self, name: &str, reason: &str) {
        log::warn!("skipping image '{name}': {reason}");
        self.trace(
            "layout.image_skipped",
            json!({ "page": self.page_number(), "image": name, "reason": reason }),
        );
        self.count("layout.images_skipped");
    }
}

fn content_rect(page_size: Size, margin: Pt) -> Rect {
    Rect::new(
        margin,
        margin,
        page_size.width - margin * 2,
        page_size.height - margin * 2,
    )
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

fn base_row_height(table: &Table, index: usize) -> Pt {
    match table.rowheights.get(index).copied().and_then(|w| positive(Some(w))) {
        Some(weight) => Pt::from_f64(BASE_ROW_HEIGHT * weight),
        None => Pt::from_f64(BASE_ROW_HEIGHT),
    }
}

/// Relative weights apply only when one is given per column and their sum
/// is positive; otherwise the width is split evenly.
fn column_widths(table: &Table, available: Pt) -> Vec<Pt> {
    let columns = if table.maxcolumns > 0 {
        table.maxcolumns
    } else {
        table.rows.iter().map(|row| row.row.len()).max().unwrap_or(1).max(1)
    };
    let weights: Vec<f64> = table
        .columnwidths
        .iter()
        .map(|w| if w.is_finite() { w.max(0.0) } else { 0.0 })
        .collect();
    let total: f64 = weights.iter().sum();
    if weights.len() == columns && total > 0.0 {
        let available = available.to_f32() as f64;
        return weights
            .iter()
            .map(|w| Pt::from_f64(available * w / total))
            .collect();
    }
    vec![available / columns as i32; columns]
}

/// Requested dimensions clamped to the box; without any, a raster keeps its
/// aspect ratio inside the box.
fn fit_image(spec: &ImageSpec, natural: Option<(u32, u32)>, max_width: Pt, max_height: Pt) -> (Pt, Pt) {
    match (positive(spec.width), positive(spec.height), natural) {
        (None, None, Some((w, h))) if w > 0 && h > 0 => {
            let scale = (max_width.to_f32() / w as f32).min(max_height.to_f32() / h as f32);
            (Pt::from_f32(w as f32 * scale), Pt::from_f32(h as f32 * scale))
        }
        (width, height, _) => (
            width.map(Pt::from_f64).unwrap_or(max_width).min(max_width),
            height.map(Pt::from_f64).unwrap_or(max_height).min(max_height),
        ),
    }
}

/// Strokes each edge with its own width; zero-width edges are left out.
fn stroke_edges(canvas: &mut Canvas, borders: Borders, rect: Rect) {
    let (left, top, right, bottom) = (rect.x, rect.y, rect.right(), rect.bottom());
    let edges = [
        (borders.left, (left, bottom, left, top)),
        (borders.right, (right, bottom, right, top)),
        (borders.top, (left, top, right, top)),
        (borders.bottom, (left, bottom, right, bottom)),
    ];
    for (width, (x1, y1, x2, y2)) in edges {
        if width > 0.0 {
            canvas.set_line_width(Pt::from_f32(width));
            canvas.stroke_line(x1, y1, x2, y2);
        }
    }
}

fn draw_checkbox(canvas: &mut Canvas, cell: Rect, checked: bool) {
    let side = Pt::from_i32(CHECKBOX_SIZE);
    let x = cell.x + (cell.width - side) / 2;
    let y = cell.y + (cell.height - side) / 2;
    canvas.save_state();
    canvas.set_stroke_color(Color::BLACK);
    canvas.set_line_width(Pt::from_i32(1));
    canvas.move_to(x, y);
    canvas.line_to(x + side, y);
    canvas.line_to(x + side, y + side);
    canvas.line_to(x, y + side);
    canvas.close_path();
    canvas.stroke();
    if checked {
        let inset = Pt::from_i32(2);
        canvas.stroke_line(x + inset, y + inset, x + side - inset, y + side - inset);
        canvas.stroke_line(x + inset, y + side - inset, x + side - inset, y + inset);
    }
    canvas.restore_state();
}

/// Lays out `template` into pages, registering every font and image it uses.
pub fn layout_document(
    template: &TemplateDocument,
    fonts: &mut FontRegistry,
    images: &mut ImageRegistry,
    debug: Option<DebugLogger>,
) -> Result<Document> {
    LayoutEngine::new(template, fonts, images)?.with_debug(debug).run()
}
