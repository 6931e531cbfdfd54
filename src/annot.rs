//! Link annotations, form-field widgets and the interactive form dictionary.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::object::{fmt, Dict, Object, Stream};
use crate::pdf::ObjectWriter;
use crate::template::{FormField, FormFieldKind};
use crate::types::{Pt, Rect};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    Uri(String),
    /// Named destination declared by a cell `dest`.
    Destination(String),
}

const URI_SCHEMES: [&str; 6] = ["http://", "https://", "mailto:", "tel:", "ftp://", "ftps://"];

/// Classifies a raw `link` value. Returns `None` for blank or unusable input.
pub fn resolve_link(raw: &str) -> Option<LinkTarget> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(name) = raw.strip_prefix('#') {
        return (!name.is_empty()).then(|| LinkTarget::Destination(name.to_string()));
    }
    let lower = raw.to_ascii_lowercase();
    if URI_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        return Some(LinkTarget::Uri(raw.to_string()));
    }
    if looks_like_host(raw) {
        return Some(LinkTarget::Uri(format!("https://{raw}")));
    }
    log::warn!("ignoring unrecognised link '{raw}'");
    None
}

fn looks_like_host(raw: &str) -> bool {
    let host = raw.split(['/', '?', '#']).next().unwrap_or("");
    let Some((name, tld)) = host.rsplit_once('.') else {
        return false;
    };
    !name.is_empty()
        && tld.len() >= 2
        && tld.chars().all(|c| c.is_ascii_alphabetic())
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == ':')
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLink {
    pub rect: Rect,
    pub target: LinkTarget,
}

#[derive(Debug, Clone)]
pub struct PlacedWidget {
    pub rect: Rect,
    pub field: FormField,
}

pub fn link_annotation(link: &PlacedLink, page_height: Pt) -> Dict {
    let dict = Dict::typed("Annot")
        .with("Subtype", Object::name("Link"))
        .with("Rect", Object::rect(link.rect.to_pdf_rect(page_height)))
        .with("Border", Object::Array(vec![Object::Int(0); 3]))
        .with("H", Object::name("I"));
    match &link.target {
        LinkTarget::Uri(uri) => dict.with(
            "A",
            Dict::new()
                .with("S", Object::name("URI"))
                .with("URI", Object::Str(uri.as_bytes().to_vec())),
        ),
        LinkTarget::Destination(name) => dict.with("Dest", Object::text(name)),
    }
}

/// Accumulates form fields across pages; radio buttons are grouped under one
/// parent field per group name.
#[derive(Debug, Default)]
pub struct FormCollector {
    fields: Vec<u32>,
    radio_groups: BTreeMap<String, RadioGroup>,
    signature_field: Option<u32>,
}

#[derive(Debug)]
struct RadioGroup {
    parent_id: u32,
    kids: Vec<u32>,
    selected: Option<String>,
}

impl FormCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.radio_groups.is_empty() && self.signature_field.is_none()
    }

    pub fn set_signature_field(&mut self, id: u32) {
        self.signature_field = Some(id);
    }

    /// Writes one widget (plus its appearance streams) and returns the
    /// annotation object number for the page's `/Annots`.
    pub fn write_widget(
        &mut self,
        writer: &mut ObjectWriter,
        widget: &PlacedWidget,
        page_id: u32,
        page_height: Pt,
    ) -> Result<u32> {
        let field = &widget.field;
        let w = widget.rect.width.to_f32();
        let h = widget.rect.height.to_f32();
        let mut dict = Dict::typed("Annot")
            .with("Subtype", Object::name("Widget"))
            .with("Rect", Object::rect(widget.rect.to_pdf_rect(page_height)))
            .with("F", 4i64)
            .with("P", Object::Ref(page_id));

        let id = writer.reserve();
        match field.kind {
            FormFieldKind::Checkbox => {
                let state = if field.checked { "Yes" } else { "Off" };
                let on = writer.add(&appearance(w, h, &checkbox_on(w, h)))?;
                let off = writer.add(&appearance(w, h, &box_outline(w, h)))?;
                dict.set("T", Object::text(&field.name));
                dict.set("FT", Object::name("Btn"));
                dict.set("V", Object::name(state));
                dict.set("AS", Object::name(state));
                dict.set(
                    "AP",
                    Dict::new().with("N", Dict::new().with("Yes", Object::Ref(on)).with("Off", Object::Ref(off))),
                );
                self.fields.push(id);
            }
            FormFieldKind::Radio => {
                let on_state = radio_state_name(field);
                let round = !field.shape.as_deref().is_some_and(|s| s.eq_ignore_ascii_case("square"));
                let (on_ops, off_ops) = if round {
                    let ring = circle_path(w / 2.0, h / 2.0, (w.min(h) / 2.0 - 1.0).max(0.5));
                    let dot = circle_path(w / 2.0, h / 2.0, ((w.min(h) / 2.0 - 1.0) / 2.0).max(0.25));
                    (
                        format!("q 1 w 0 0 0 RG {ring} S {dot} f Q"),
                        format!("q 1 w 0 0 0 RG {ring} S Q"),
                    )
                } else {
                    (
                        format!(
                            "q 1 w 0 0 0 RG 0 0 {} {} re S 3 3 {} {} re f Q",
                            fmt(w),
                            fmt(h),
                            fmt((w - 6.0).max(0.0)),
                            fmt((h - 6.0).max(0.0))
                        ),
                        box_outline(w, h),
                    )
                };
                let on = writer.add(&appearance(w, h, &on_ops))?;
                let off = writer.add(&appearance(w, h, &off_ops))?;
                let group_name = field
                    .group_name
                    .clone()
                    .filter(|g| !g.trim().is_empty())
                    .unwrap_or_else(|| field.name.clone());
                let group = self
                    .radio_groups
                    .entry(group_name)
                    .or_insert_with(|| RadioGroup {
                        parent_id: writer.reserve(),
                        kids: Vec::new(),
                        selected: None,
                    });
                group.kids.push(id);
                if field.checked {
                    group.selected = Some(on_state.clone());
                }
                dict.set("Parent", Object::Ref(group.parent_id));
                dict.set(
                    "AS",
                    Object::name(if field.checked { on_state.as_str() } else { "Off" }),
                );
                dict.set(
                    "AP",
                    Dict::new().with(
                        "N",
                        Dict::new()
                            .with(&on_state, Object::Ref(on))
                            .with("Off", Object::Ref(off)),
                    ),
                );
            }
            FormFieldKind::Text => {
                let ap = writer.add(&appearance(w, h, &box_outline(w, h)))?;
                dict.set("T", Object::text(&field.name));
                dict.set("FT", Object::name("Tx"));
                dict.set("V", Object::text(field.value.as_deref().unwrap_or("")));
                dict.set("DA", Object::Str(b"/Helv 10 Tf 0 g".to_vec()));
                dict.set("AP", Dict::new().with("N", Object::Ref(ap)));
                self.fields.push(id);
            }
        }
        writer.write(id, &dict.into())?;
        Ok(id)
    }

    /// Writes radio parents and the `/AcroForm` dictionary. Returns `None`
    /// when the document has no fields.
    pub fn finish(self, writer: &mut ObjectWriter, helv_font: Option<u32>) -> Result<Option<u32>> {
        if self.is_empty() {
            return Ok(None);
        }
        let mut fields = self.fields;
        for (name, group) in self.radio_groups {
            let value = group.selected.as_deref().unwrap_or("Off");
            let parent = Dict::new()
                .with("FT", Object::name("Btn"))
                .with("Ff", 49152i64)
                .with("T", Object::text(&name))
                .with("V", Object::name(value))
                .with("Kids", Object::refs(&group.kids));
            writer.write(group.parent_id, &parent.into())?;
            fields.push(group.parent_id);
        }
        let mut acroform = Dict::new();
        if let Some(sig) = self.signature_field {
            fields.push(sig);
            acroform.set("SigFlags", 3i64);
        }
        acroform.set("Fields", Object::refs(&fields));
        acroform.set("DA", Object::Str(b"/Helv 0 Tf 0 g".to_vec()));
        if let Some(font) = helv_font {
            acroform.set(
                "DR",
                Dict::new().with("Font", Dict::new().with("Helv", Object::Ref(font))),
            );
        }
        let id = writer.add(&acroform.into())?;
        Ok(Some(id))
    }
}

fn radio_state_name(field: &FormField) -> String {
    let raw = field.value.as_deref().unwrap_or("").trim();
    let name: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if name.is_empty() || name == "Off" {
        "On".to_string()
    } else {
        name
    }
}

fn appearance(w: f32, h: f32, ops: &str) -> Object {
    let dict = Dict::typed("XObject")
        .with("Subtype", Object::name("Form"))
        .with("BBox", Object::rect([0.0, 0.0, w, h]))
        .with("Resources", Dict::new());
    Stream::new(dict, ops.as_bytes().to_vec()).into()
}

fn box_outline(w: f32, h: f32) -> String {
    format!("q 1 w 0 0 0 RG 0 0 {} {} re S Q", fmt(w), fmt(h))
}

fn checkbox_on(w: f32, h: f32) -> String {
    format!(
        "q 1 w 0 0 0 RG 0 0 {w} {h} re S 2 2 m {w2} {h2} l 2 {h2} m {w2} 2 l S Q",
        w = fmt(w),
        h = fmt(h),
        w2 = fmt(w - 2.0),
        h2 = fmt(h - 2.0)
    )
}

fn circle_path(cx: f32, cy: f32, r: f32) -> String {
    let k = 0.55228 * r;
    let p = |x: f32, y: f32| format!("{} {}", fmt(x), fmt(y));
    format!(
        "{} m {} {} {} c {} {} {} c {} {} {} c {} {} {} c",
        p(cx + r, cy),
        p(cx + r, cy + k),
        p(cx + k, cy + r),
        p(cx, cy + r),
        p(cx - k, cy + r),
        p(cx - r, cy + k),
        p(cx - r, cy),
        p(cx - r, cy - k),
        p(cx - k, cy - r),
        p(cx, cy - r),
        p(cx + k, cy - r),
        p(cx + r, cy - k),
        p(cx + r, cy),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::serialize;
    use crate::pdf::PdfVersion;

    fn rect() -> Rect {
        Rect::new(Pt::from_i32(100), Pt::from_i32(100), Pt::from_i32(12), Pt::from_i32(12))
    }

    #[test]
    fn link_classification() {
        assert_eq!(resolve_link("#total"), Some(LinkTarget::Destination("total".into())));
        assert_eq!(
            resolve_link("https://example.com/a"),
            Some(LinkTarget::Uri("https://example.com/a".into()))
        );
        assert_eq!(
            resolve_link("mailto:someone@example.com"),
            Some(LinkTarget::Uri("mailto:someone@example.com".into()))
        );
        assert_eq!(
            resolve_link("example.org/docs"),
            Some(LinkTarget::Uri("https://example.org/docs".into()))
        );
        assert_eq!(resolve_link("   "), None);
        assert_eq!(resolve_link("#"), None);
        assert_eq!(resolve_link("not a link"), None);
    }

    #[test]
    fn uri_annotation_shape() {
        let link = PlacedLink {
            rect: rect(),
            target: LinkTarget::Uri("https://example.com".into()),
        };
        let out = String::from_utf8(serialize(&link_annotation(&link, Pt::from_i32(842)).into(), None)).unwrap();
        assert!(out.contains("/Subtype /Link"));
        assert!(out.contains("/Rect [100 730 112 742]"));
        assert!(out.contains("/Border [0 0 0]"));
        assert!(out.contains("/A << /S /URI /URI (https://example.com) >>"));
    }

    #[test]
    fn radio_buttons_share_a_parent() {
        let mut writer = ObjectWriter::new(PdfVersion::Pdf17);
        let mut forms = FormCollector::new();
        for (value, checked) in [("a", false), ("b", true)] {
            let widget = PlacedWidget {
                rect: rect(),
                field: FormField {
                    kind: FormFieldKind::Radio,
                    name: format!("choice_{value}"),
                    value: Some(value.to_string()),
                    checked,
                    group_name: Some("choice".into()),
                    shape: None,
                },
            };
            forms.write_widget(&mut writer, &widget, 1, Pt::from_i32(842)).unwrap();
        }
        let acroform = forms.finish(&mut writer, None).unwrap();
        assert!(acroform.is_some());
        let text = String::from_utf8_lossy(writer.body()).into_owned();
        assert!(text.contains("/Ff 49152 /T (choice) /V /b /Kids ["));
        assert_eq!(text.matches("/Parent ").count(), 2);
    }

    #[test]
    fn checkbox_appearances_and_state() {
        let mut writer = ObjectWriter::new(PdfVersion::Pdf17);
        let mut forms = FormCollector::new();
        let widget = PlacedWidget {
            rect: rect(),
            field: FormField {
                kind: FormFieldKind::Checkbox,
                name: "agree".into(),
                checked: true,
                ..FormField::default()
            },
        };
        forms.write_widget(&mut writer, &widget, 1, Pt::from_i32(842)).unwrap();
        let text = String::from_utf8_lossy(writer.body()).into_owned();
        assert!(text.contains("/T (agree) /FT /Btn /V /Yes /AS /Yes"));
        assert!(text.contains("2 2 m 10 10 l 2 10 m 10 2 l S"));
    }
}
