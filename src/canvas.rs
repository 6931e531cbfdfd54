use crate::annot::{PlacedLink, PlacedWidget};
use crate::svg::SvgCommand;
use crate::types::{Color, Pt, Rect, Size};

/// Drawing commands in top-left page coordinates; the renderer flips y.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Pt),
    SetFont {
        resource: String,
        size: Pt,
    },
    MoveTo {
        x: Pt,
        y: Pt,
    },
    LineTo {
        x: Pt,
        y: Pt,
    },
    ClosePath,
    Fill,
    Stroke,
    FillRect {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
    },
    // `y` is the text baseline.
    DrawString {
        x: Pt,
        y: Pt,
        text: String,
    },
    // Text placed with an explicit linear transform at (x, y).
    DrawStringTransformed {
        x: Pt,
        y: Pt,
        text: String,
        m00: f32,
        m01: f32,
        m10: f32,
        m11: f32,
    },
    DrawImage {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: String,
    },
    // Already in PDF user space.
    Vector(Vec<SvgCommand>),
    // Replaced with "Page X of Y" once the total page count is known.
    PageNumber {
        resource: String,
        size: Pt,
        right_inset: Pt,
        baseline_from_bottom: Pt,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub commands: Vec<Command>,
    pub links: Vec<PlacedLink>,
    pub widgets: Vec<PlacedWidget>,
    /// Named destinations anchored on this page, with their top-left y.
    pub destinations: Vec<(String, Pt)>,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub page_size: Size,
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone, PartialEq)]
struct GraphicsState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Pt,
    font: Option<(String, Pt)>,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Pt::from_f32(1.0),
            font: None,
        }
    }
}

pub struct Canvas {
    page_size: Size,
    pages: Vec<Page>,
    current: Page,
    state_stack: Vec<GraphicsState>,
    current_state: GraphicsState,
}

impl Canvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
            current: Page::default(),
            state_stack: Vec::new(),
            current_state: GraphicsState::default(),
        }
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    /// Zero-based index of the page currently being drawn.
    pub fn page_index(&self) -> usize {
        self.pages.len()
    }

    pub fn save_state(&mut self) {
        self.state_stack.push(self.current_state.clone());
        self.current.commands.push(Command::SaveState);
    }

    pub fn restore_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.current_state = state;
            self.current.commands.push(Command::RestoreState);
        }
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.current.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == color {
            return;
        }
        self.current_state.stroke_color = color;
        self.current.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: Pt) {
        let width = width.max(Pt::ZERO);
        if self.current_state.line_width == width {
            return;
        }
        self.current_state.line_width = width;
        self.current.commands.push(Command::SetLineWidth(width));
    }

    pub fn set_font(&mut self, resource: &str, size: Pt) {
        if let Some((current, current_size)) = &self.current_state.font {
            if current == resource && *current_size == size {
                return;
            }
        }
        self.current_state.font = Some((resource.to_string(), size));
        self.current.commands.push(Command::SetFont {
            resource: resource.to_string(),
            size,
        });
    }

    pub fn move_to(&mut self, x: Pt, y: Pt) {
        self.current.commands.push(Command::MoveTo { x, y });
    }

    pub fn line_to(&mut self, x: Pt, y: Pt) {
        self.current.commands.push(Command::LineTo { x, y });
    }

    pub fn close_path(&mut self) {
        self.current.commands.push(Command::ClosePath);
    }

    pub fn fill(&mut self) {
        self.current.commands.push(Command::Fill);
    }

    pub fn stroke(&mut self) {
        self.current.commands.push(Command::Stroke);
    }

    /// Strokes a single segment with the current stroke state.
    pub fn stroke_line(&mut self, x1: Pt, y1: Pt, x2: Pt, y2: Pt) {
        self.move_to(x1, y1);
        self.line_to(x2, y2);
        self.stroke();
    }

    pub fn fill_rect(&mut self, rect: Rect) {
        self.current.commands.push(Command::FillRect {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        });
    }

    pub fn draw_string(&mut self, x: Pt, baseline: Pt, text: impl Into<String>) {
        self.current.commands.push(Command::DrawString {
            x,
            y: baseline,
            text: text.into(),
        });
    }

    pub fn draw_string_transformed(
        &mut self,
        x: Pt,
        y: Pt,
        text: impl Into<String>,
        matrix: [f32; 4],
    ) {
        self.current.commands.push(Command::DrawStringTransformed {
            x,
            y,
            text: text.into(),
            m00: matrix[0],
            m01: matrix[1],
            m10: matrix[2],
            m11: matrix[3],
        });
    }

    pub fn draw_image(&mut self, rect: Rect, resource_id: impl Into<String>) {
        self.current.commands.push(Command::DrawImage {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            resource_id: resource_id.into(),
        });
    }

    pub fn draw_vector(&mut self, commands: Vec<SvgCommand>) {
        if !commands.is_empty() {
            self.current.commands.push(Command::Vector(commands));
        }
    }

    pub fn page_number(&mut self, resource: &str, size: Pt, right_inset: Pt, baseline_from_bottom: Pt) {
        // the next SetFont must not be deduplicated against a placeholder
        self.current_state.font = None;
        self.current.commands.push(Command::PageNumber {
            resource: resource.to_string(),
            size,
            right_inset,
            baseline_from_bottom,
        });
    }

    pub fn add_link(&mut self, link: PlacedLink) {
        self.current.links.push(link);
    }

    pub fn add_widget(&mut self, widget: PlacedWidget) {
        self.current.widgets.push(widget);
    }

    pub fn add_destination(&mut self, name: impl Into<String>, y: Pt) {
        self.current.destinations.push((name.into(), y));
    }

    pub fn show_page(&mut self) {
        let current = std::mem::take(&mut self.current);
        self.pages.push(current);
        self.state_stack.clear();
        self.current_state = GraphicsState::default();
    }

    pub fn finish(mut self) -> Document {
        if !self.current.commands.is_empty() || self.pages.is_empty() {
            self.show_page();
        }
        Document {
            page_size: self.page_size,
            pages: self.pages,
        }
    }
}

impl Document {
    /// Replaces page-number placeholders using `measure(resource, size, text)`
    /// to right-align the final label.
    pub fn resolve_page_numbers(&mut self, measure: impl Fn(&str, Pt, &str) -> Pt) {
        let total = self.pages.len();
        let height = self.page_size.height;
        let width = self.page_size.width;
        for (index, page) in self.pages.iter_mut().enumerate() {
            let label = format!("Page {} of {}", index + 1, total);
            let mut resolved = Vec::with_capacity(page.commands.len());
            for command in page.commands.drain(..) {
                match command {
                    Command::PageNumber {
                        resource,
                        size,
                        right_inset,
                        baseline_from_bottom,
                    } => {
                        let text_width = measure(&resource, size, &label);
                        resolved.push(Command::SaveState);
                        resolved.push(Command::SetFillColor(Color::BLACK));
                        resolved.push(Command::SetFont { resource, size });
                        resolved.push(Command::DrawString {
                            x: width - text_width - right_inset,
                            y: height - baseline_from_bottom,
                            text: label.clone(),
                        });
                        resolved.push(Command::RestoreState);
                    }
                    other => resolved.push(other),
                }
            }
            page.commands = resolved;
        }
    }
}
