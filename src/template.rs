//! Template document model as accepted on the wire.
//!
//! Field names follow the established JSON layout: `config` keys are
//! camelCase, table and cell keys are lowercase.

use crate::error::{AssemblyError, Result};
use crate::props::CellProps;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateDocument {
    pub config: Config,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<Title>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub table: Vec<Table>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub spacer: Vec<Spacer>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub image: Vec<ImageSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<Element>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<Footer>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bookmarks: Vec<Bookmark>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub page: String,
    pub page_alignment: i32,
    pub page_border: String,
    pub watermark: Option<String>,
    pub pdf_title: Option<String>,
    pub pdfa_compliant: bool,
    pub arlington_compatible: bool,
    pub embed_fonts: bool,
    pub custom_fonts: Vec<CustomFont>,
    pub security: Option<SecurityConfig>,
    pub signature: Option<SignatureConfig>,
    pub pdfa: Option<PdfaConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page: "A4".to_string(),
            page_alignment: 1,
            page_border: String::new(),
            watermark: None,
            pdf_title: None,
            pdfa_compliant: false,
            arlington_compatible: false,
            embed_fonts: false,
            custom_fonts: Vec::new(),
            security: None,
            signature: None,
            pdfa: None,
        }
    }
}

impl Config {
    pub fn landscape(&self) -> bool {
        self.page_alignment == 2
    }

    pub fn pdfa_enabled(&self) -> bool {
        self.pdfa_compliant || self.pdfa.as_ref().is_some_and(|p| p.enabled)
    }

    pub fn substitute_font_dir(&self) -> Option<PathBuf> {
        self.pdfa.as_ref()?.font_dir.as_deref().map(PathBuf::from)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CustomFont {
    pub name: String,
    pub file_path: Option<String>,
    pub font_data: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecurityConfig {
    pub enabled: bool,
    pub user_password: String,
    pub owner_password: String,
    pub allow_printing: bool,
    pub allow_modifying: bool,
    pub allow_copying: bool,
    pub allow_annotations: bool,
    pub allow_form_filling: bool,
    pub allow_accessibility: bool,
    pub allow_assembly: bool,
    pub allow_high_quality_print: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SignatureConfig {
    pub enabled: bool,
    pub certificate_pem: String,
    pub private_key_pem: String,
    pub certificate_chain: Vec<String>,
    pub visible: bool,
    pub page: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub reason: Option<String>,
    pub location: Option<String>,
    pub contact_info: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfaConfig {
    pub enabled: bool,
    pub conformance: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub keywords: Option<String>,
    /// Directory holding the Liberation substitutes for standard fonts.
    #[serde(rename = "fontDir", skip_serializing_if = "Option::is_none")]
    pub font_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Title {
    pub props: Option<String>,
    pub text: Option<String>,
    pub table: Option<Table>,
    pub bgcolor: Option<String>,
    pub textcolor: Option<String>,
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Table {
    pub maxcolumns: usize,
    pub rows: Vec<Row>,
    pub columnwidths: Vec<f64>,
    pub rowheights: Vec<f64>,
    pub bgcolor: Option<String>,
    pub textcolor: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Row {
    pub row: Vec<Cell>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Cell {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub props: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chequebox: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_field: Option<FormField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bgcolor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub textcolor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrap: Option<bool>,
}

impl Cell {
    pub fn text(props: &str, text: &str) -> Self {
        Self {
            props: Some(props.to_string()),
            text: Some(text.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSpec {
    pub imagename: String,
    pub imagedata: String,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormFieldKind {
    #[default]
    Checkbox,
    Radio,
    Text,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormField {
    #[serde(rename = "type")]
    pub kind: FormFieldKind,
    pub name: String,
    pub value: Option<String>,
    pub checked: bool,
    pub group_name: Option<String>,
    pub shape: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Spacer {
    pub height: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Divider {
    pub thickness: Option<f64>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Table,
    Spacer,
    Image,
    Divider,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<Table>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spacer: Option<Spacer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub divider: Option<Divider>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Footer {
    pub font: Option<String>,
    pub text: Option<String>,
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Bookmark {
    pub title: String,
    pub dest: Option<String>,
    pub page: Option<usize>,
    pub y: Option<f64>,
    pub children: Vec<Bookmark>,
    pub open: bool,
}

/// An element resolved against the legacy top-level arrays.
#[derive(Debug, Clone, Copy)]
pub enum ElementRef<'a> {
    Table(&'a Table),
    Spacer(&'a Spacer),
    Image(&'a ImageSpec),
    Divider(&'a Divider),
}

impl TemplateDocument {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Canonical serialized form, used to derive the document ID.
    pub fn canonical_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Elements in placement order. Without an explicit `elements` list the
    /// legacy order is all tables, then spacers, then images.
    pub fn ordered_elements(&self) -> Result<Vec<ElementRef<'_>>> {
        if self.elements.is_empty() {
            let mut out = Vec::new();
            out.extend(self.table.iter().map(ElementRef::Table));
            out.extend(self.spacer.iter().map(ElementRef::Spacer));
            out.extend(self.image.iter().map(ElementRef::Image));
            return Ok(out);
        }
        self.elements
            .iter()
            .enumerate()
            .map(|(position, element)| self.resolve_element(position, element))
            .collect()
    }

    fn resolve_element<'a>(&'a self, position: usize, element: &'a Element) -> Result<ElementRef<'a>> {
        fn pick<'a, T>(
            inline: Option<&'a T>,
            index: Option<usize>,
            pool: &'a [T],
            what: &str,
            position: usize,
        ) -> Result<&'a T> {
            if let Some(value) = inline {
                return Ok(value);
            }
            let Some(index) = index else {
                return Err(AssemblyError::TemplateValidation(format!(
                    "element {position} ({what}) has neither an inline value nor an index"
                )));
            };
            pool.get(index).ok_or_else(|| {
                AssemblyError::TemplateValidation(format!(
                    "element {position} references {what} index {index}, but only {} exist",
                    pool.len()
                ))
            })
        }

        Ok(match element.kind {
            ElementKind::Table => ElementRef::Table(pick(
                element.table.as_ref(),
                element.index,
                &self.table,
                "table",
                position,
            )?),
            ElementKind::Spacer => ElementRef::Spacer(pick(
                element.spacer.as_ref(),
                element.index,
                &self.spacer,
                "spacer",
                position,
            )?),
            ElementKind::Image => ElementRef::Image(pick(
                element.image.as_ref(),
                element.index,
                &self.image,
                "image",
                position,
            )?),
            ElementKind::Divider => {
                static DEFAULT_DIVIDER: Divider = Divider {
                    thickness: None,
                    color: None,
                };
                ElementRef::Divider(element.divider.as_ref().unwrap_or(&DEFAULT_DIVIDER))
            }
        })
    }

    /// Fails fast on structural problems before anything is laid out.
    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            if let Some(props) = &title.props {
                CellProps::parse(props)?;
            }
            if let Some(table) = &title.table {
                validate_table(table, "title table")?;
            }
        }
        for element in self.ordered_elements()? {
            match element {
                ElementRef::Table(table) => validate_table(table, "table")?,
                ElementRef::Spacer(spacer) => {
                    if !spacer.height.is_finite() || spacer.height < 0.0 {
                        return Err(AssemblyError::TemplateValidation(format!(
                            "spacer height {} must be a non-negative number",
                            spacer.height
                        )));
                    }
                }
                ElementRef::Image(_) | ElementRef::Divider(_) => {}
            }
        }
        if let Some(footer) = &self.footer {
            if let Some(font) = &footer.font {
                CellProps::parse(font)?;
            }
        }
        validate_bookmarks(&self.bookmarks)?;
        if let Some(signature) = self.config.signature.as_ref().filter(|s| s.enabled) {
            if signature.certificate_pem.trim().is_empty() || signature.private_key_pem.trim().is_empty() {
                return Err(AssemblyError::SecurityConfig(
                    "signature requires certificatePem and privateKeyPem".to_string(),
                ));
            }
        }
        for font in &self.config.custom_fonts {
            if font.name.trim().is_empty() {
                return Err(AssemblyError::TemplateValidation(
                    "custom font entry without a name".to_string(),
                ));
            }
            if font.file_path.is_none() && font.font_data.is_none() {
                return Err(AssemblyError::TemplateValidation(format!(
                    "custom font '{}' needs filePath or fontData",
                    font.name
                )));
            }
        }
        Ok(())
    }
}

fn validate_table(table: &Table, what: &str) -> Result<()> {
    if table.maxcolumns == 0 && table.rows.iter().any(|r| !r.row.is_empty()) {
        return Err(AssemblyError::TemplateValidation(format!(
            "{what} has cells but maxcolumns is 0"
        )));
    }
    for row in &table.rows {
        for cell in &row.row {
            if let Some(props) = &cell.props {
                CellProps::parse(props)?;
            }
            if let Some(field) = &cell.form_field {
                if field.name.trim().is_empty() {
                    return Err(AssemblyError::TemplateValidation(format!(
                        "{what} has a form field without a name"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_bookmarks(bookmarks: &[Bookmark]) -> Result<()> {
    for bookmark in bookmarks {
        if bookmark.title.is_empty() {
            return Err(AssemblyError::TemplateValidation(
                "bookmark without a title".to_string(),
            ));
        }
        validate_bookmarks(&bookmark.children)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"{
        "config": {"page": "LETTER", "pageAlignment": 2, "pageBorder": "1:1:1:1", "pdfTitle": "Invoice"},
        "title": {"props": "Helvetica:18:100:center", "text": "Invoice"},
        "table": [{"maxcolumns": 2, "rows": [{"row": [
            {"props": "Helvetica:12:000:left:1:1:1:1", "text": "A"},
            {"props": "Helvetica:12:000:left:1:1:1:1", "chequebox": true}
        ]}]}],
        "elements": [{"type": "spacer", "spacer": {"height": 12}}, {"type": "table", "index": 0}],
        "footer": {"font": "Helvetica:8:000:left", "text": "Confidential"},
        "bookmarks": [{"title": "Start", "page": 1, "children": [{"title": "Child", "dest": "intro"}]}]
    }"##;

    #[test]
    fn parses_wire_format() {
        let doc = TemplateDocument::from_json(SAMPLE).unwrap();
        assert!(doc.config.landscape());
        assert_eq!(doc.config.pdf_title.as_deref(), Some("Invoice"));
        assert_eq!(doc.table[0].rows[0].row[1].chequebox, Some(true));
        assert_eq!(doc.bookmarks[0].children[0].dest.as_deref(), Some("intro"));
        doc.validate().unwrap();
    }

    #[test]
    fn explicit_elements_keep_document_order() {
        let doc = TemplateDocument::from_json(SAMPLE).unwrap();
        let order = doc.ordered_elements().unwrap();
        assert!(matches!(order[0], ElementRef::Spacer(_)));
        assert!(matches!(order[1], ElementRef::Table(_)));
    }

    #[test]
    fn legacy_order_is_tables_spacers_images() {
        let mut doc = TemplateDocument::from_json(SAMPLE).unwrap();
        doc.elements.clear();
        doc.spacer.push(Spacer { height: 5.0 });
        doc.image.push(ImageSpec::default());
        let order = doc.ordered_elements().unwrap();
        assert!(matches!(
            order.as_slice(),
            [ElementRef::Table(_), ElementRef::Spacer(_), ElementRef::Image(_)]
        ));
    }

    #[test]
    fn dangling_element_index_fails_validation() {
        let mut doc = TemplateDocument::from_json(SAMPLE).unwrap();
        doc.elements.push(Element {
            kind: ElementKind::Table,
            index: Some(4),
            table: None,
            spacer: None,
            image: None,
            divider: None,
        });
        assert!(matches!(
            doc.validate(),
            Err(AssemblyError::TemplateValidation(_))
        ));
    }

    #[test]
    fn malformed_cell_props_fail_validation() {
        let json = SAMPLE.replace("Helvetica:12:000:left:1:1:1:1\", \"text\"", "Helvetica:twelve\", \"text\"");
        let doc = TemplateDocument::from_json(&json).unwrap();
        assert!(matches!(
            doc.validate(),
            Err(AssemblyError::TemplateValidation(_))
        ));
    }

    #[test]
    fn signature_without_key_material_is_a_security_error() {
        let mut doc = TemplateDocument::from_json(SAMPLE).unwrap();
        doc.config.signature = Some(SignatureConfig {
            enabled: true,
            ..SignatureConfig::default()
        });
        assert!(matches!(
            doc.validate(),
            Err(AssemblyError::SecurityConfig(_))
        ));
    }

    #[test]
    fn canonical_json_is_stable() {
        let doc = TemplateDocument::from_json(SAMPLE).unwrap();
        assert_eq!(doc.canonical_json().unwrap(), doc.canonical_json().unwrap());
    }
}
