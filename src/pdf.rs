//! Object graph construction, content-stream rendering and the
//! cross-reference writer.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

use crate::annot::{link_annotation, FormCollector, LinkTarget};
use crate::canvas::{Command, Document, Page};
use crate::error::{AssemblyError, Result};
use crate::font::{FontKind, FontRegistry, RegisteredFont, StandardFont};
use crate::images::{ImageFilter, ImageRegistry, ImageResource};
use crate::object::{
    escape_literal, fmt, fmt_pt, hex_upper, serialize, winansi_bytes, CryptContext, Dict, Object,
    ObjectCipher, Stream,
};
use crate::outline::{write_named_destinations, write_outlines, Destinations};
use crate::pdfa::ArchivalOverlay;
use crate::security::encrypt::EncryptionSetup;
use crate::security::sign::SignaturePlan;
use crate::subset::subset_truetype;
use crate::svg::{PaintOp, SvgCommand};
use crate::template::Bookmark;
use crate::types::{Color, Pt, Rect, Size};

pub const PRODUCER: &str = concat!("docforge ", env!("CARGO_PKG_VERSION"));

const PDF_CATALOG_ID: u32 = 1;
const PDF_PAGES_ID: u32 = 2;
const PDF_RESOURCES_ID: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PdfVersion {
    #[default]
    Pdf17,
    Pdf20,
}

fn pdf_header_bytes(version: PdfVersion) -> &'static [u8] {
    match version {
        PdfVersion::Pdf17 => b"%PDF-1.7\n",
        PdfVersion::Pdf20 => b"%PDF-2.0\n",
    }
}

/// Sequential writer that owns the output buffer and the offset table.
/// Object numbers are handed out by `reserve` and must all be written
/// before `finish`.
pub struct ObjectWriter {
    buf: Vec<u8>,
    offsets: Vec<Option<usize>>,
    cipher: Option<Box<dyn ObjectCipher>>,
    plaintext: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct Trailer {
    pub root: u32,
    pub info: Option<u32>,
    pub encrypt: Option<u32>,
    pub file_id: [u8; 16],
}

impl ObjectWriter {
    pub fn new(version: PdfVersion) -> Self {
        let mut buf = Vec::with_capacity(64 * 1024);
        buf.extend_from_slice(pdf_header_bytes(version));
        buf.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Self {
            buf,
            offsets: Vec::new(),
            cipher: None,
            plaintext: Vec::new(),
        }
    }

    pub fn reserve(&mut self) -> u32 {
        self.offsets.push(None);
        self.offsets.len() as u32
    }

    /// Installs the per-object cipher. Objects in `plaintext` are never encrypted.
    pub fn set_cipher(&mut self, cipher: Box<dyn ObjectCipher>, plaintext: &[u32]) {
        self.cipher = Some(cipher);
        self.plaintext.extend_from_slice(plaintext);
    }

    pub fn write(&mut self, id: u32, object: &Object) -> Result<()> {
        let slot = id
            .checked_sub(1)
            .and_then(|index| self.offsets.get_mut(index as usize))
            .ok_or_else(|| AssemblyError::InternalWrite(format!("object {id} was never reserved")))?;
        if slot.is_some() {
            return Err(AssemblyError::InternalWrite(format!("object {id} written twice")));
        }
        *slot = Some(self.buf.len());

        let crypt = match &self.cipher {
            Some(cipher) if !self.plaintext.contains(&id) => Some(CryptContext {
                cipher: cipher.as_ref(),
                obj_num: id,
                gen_num: 0,
            }),
            _ => None,
        };
        let body = serialize(object, crypt);
        self.buf.extend_from_slice(format!("{id} 0 obj\n").as_bytes());
        self.buf.extend_from_slice(&body);
        self.buf.extend_from_slice(b"\nendobj\n");
        Ok(())
    }

    pub fn add(&mut self, object: &Object) -> Result<u32> {
        let id = self.reserve();
        self.write(id, object)?;
        Ok(id)
    }

    pub fn body(&self) -> &[u8] {
        &self.buf
    }

    /// Byte offset of `id`'s `obj` header, once written.
    pub fn offset_of(&self, id: u32) -> Option<usize> {
        let index = id.checked_sub(1)? as usize;
        self.offsets.get(index).copied().flatten()
    }

    pub fn finish(mut self, trailer: &Trailer) -> Result<Vec<u8>> {
        let mut offsets = Vec::with_capacity(self.offsets.len());
        for (index, offset) in self.offsets.iter().enumerate() {
            let offset = offset.ok_or_else(|| {
                AssemblyError::InternalWrite(format!("object {} reserved but never written", index + 1))
            })?;
            offsets.push(offset);
        }

        let size = offsets.len() + 1;
        let xref_start = self.buf.len();
        self.buf.extend_from_slice(format!("xref\n0 {size}\n").as_bytes());
        self.buf.extend_from_slice(b"0000000000 65535 f \n");
        for offset in &offsets {
            self.buf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }

        let id_hex = hex_upper(&trailer.file_id);
        let mut dict = Dict::new()
            .with("Size", size as i64)
            .with("Root", Object::Ref(trailer.root));
        if let Some(info) = trailer.info {
            dict.set("Info", Object::Ref(info));
        }
        if let Some(encrypt) = trailer.encrypt {
            dict.set("Encrypt", Object::Ref(encrypt));
        }
        dict.set("ID", Object::Raw(format!("[<{id_hex}> <{id_hex}>]")));
        self.buf.extend_from_slice(b"trailer\n");
        self.buf.extend_from_slice(&serialize(&dict.into(), None));
        self.buf
            .extend_from_slice(format!("\nstartxref\n{xref_start}\n%%EOF\n").as_bytes());
        Ok(self.buf)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
}

pub struct WriteContext<'a> {
    pub version: PdfVersion,
    pub fonts: &'a FontRegistry,
    pub images: &'a ImageRegistry,
    pub bookmarks: &'a [Bookmark],
    pub info: DocumentInfo,
    pub compress: bool,
    pub file_id: [u8; 16],
    pub margin: Pt,
    pub encryption: Option<EncryptionSetup>,
    pub signature: Option<SignaturePlan>,
    pub archival: Option<ArchivalOverlay>,
}

/// Serialized file plus the location of the signature dictionary, when one
/// was reserved.
#[derive(Debug)]
pub struct WrittenDocument {
    pub bytes: Vec<u8>,
    pub signature_offset: Option<usize>,
}

pub fn pdf_date(date: &DateTime<Utc>) -> String {
    date.format("D:%Y%m%d%H%M%S+00'00'").to_string()
}

/// Serializes a laid-out document into a complete file.
pub fn write_document(document: &Document, ctx: WriteContext<'_>) -> Result<WrittenDocument> {
    let destinations = Destinations::from_pages(&document.pages);
    for page in &document.pages {
        for link in &page.links {
            if let LinkTarget::Destination(name) = &link.target {
                if !destinations.contains(name) {
                    return Err(AssemblyError::TemplateValidation(format!(
                        "link target '#{name}' has no matching destination"
                    )));
                }
            }
        }
    }

    let mut writer = ObjectWriter::new(ctx.version);
    let catalog_id = writer.reserve();
    let pages_id = writer.reserve();
    let resources_id = writer.reserve();
    debug_assert_eq!(
        (catalog_id, pages_id, resources_id),
        (PDF_CATALOG_ID, PDF_PAGES_ID, PDF_RESOURCES_ID)
    );

    let encrypt_id = match ctx.encryption {
        Some(setup) => {
            let id = writer.add(&setup.dict.clone().into())?;
            writer.set_cipher(Box::new(setup.handler), &[id]);
            Some(id)
        }
        None => None,
    };

    // form fields and the signature appearance draw with /Helv
    let helv = ctx.fonts.peek_standard(StandardFont::Helvetica);
    let usage = glyph_usage(document, &helv.resource, ctx.signature.as_ref());
    let font_ids = write_fonts(&mut writer, ctx.fonts, &usage, ctx.compress)?;
    let image_ids = write_images(&mut writer, ctx.images)?;
    let mut helv_id = font_ids.get(&helv.resource).copied();

    let page_height = document.page_size.height;
    let page_ids: Vec<u32> = document.pages.iter().map(|_| writer.reserve()).collect();
    let mut forms = FormCollector::new();
    let mut annots: Vec<Vec<u32>> = vec![Vec::new(); document.pages.len()];

    for (index, page) in document.pages.iter().enumerate() {
        for link in &page.links {
            annots[index].push(writer.add(&link_annotation(link, page_height).into())?);
        }
        for widget in &page.widgets {
            annots[index].push(forms.write_widget(&mut writer, widget, page_ids[index], page_height)?);
        }
    }

    let mut signature_offset = None;
    if let Some(plan) = &ctx.signature {
        let page_index = plan.page_index.min(document.pages.len().saturating_sub(1));
        let sig_value_id = writer.add(&plan.dict.clone().into())?;
        signature_offset = writer.offset_of(sig_value_id);
        let mut widget = Dict::typed("Annot")
            .with("Subtype", Object::name("Widget"))
            .with("FT", Object::name("Sig"))
            .with("T", Object::text("Signature1"))
            .with("F", 132i64)
            .with("V", Object::Ref(sig_value_id))
            .with("P", Object::Ref(page_ids[page_index]));
        match plan.rect {
            Some(rect) if !plan.appearance_lines.is_empty() => {
                let helv = ensure_helvetica(&mut writer, ctx.fonts, &mut helv_id)?;
                let ap = signature_appearance(rect, &plan.appearance_lines, helv);
                let ap_id = writer.add(&ap)?;
                widget.set("Rect", Object::rect(rect.to_pdf_rect(page_height)));
                widget.set("AP", Dict::new().with("N", Object::Ref(ap_id)));
            }
            _ => widget.set("Rect", Object::rect([0.0; 4])),
        }
        let widget_id = writer.add(&widget.into())?;
        annots[page_index].push(widget_id);
        forms.set_signature_field(widget_id);
    }

    let acroform_id = if forms.is_empty() {
        None
    } else {
        let helv = ensure_helvetica(&mut writer, ctx.fonts, &mut helv_id)?;
        forms.finish(&mut writer, Some(helv))?
    };

    // resources shared by every page
    let mut resources = Dict::new();
    let mut all_fonts = font_ids.clone();
    if let Some(id) = helv_id {
        all_fonts.entry(helv.resource.clone()).or_insert(id);
    }
    if !all_fonts.is_empty() {
        let mut fonts = Dict::new();
        for (name, id) in &all_fonts {
            fonts.set(name, Object::Ref(*id));
        }
        resources.set("Font", fonts);
    }
    if !image_ids.is_empty() {
        let mut xobjects = Dict::new();
        for (name, id) in &image_ids {
            xobjects.set(name, Object::Ref(*id));
        }
        resources.set("XObject", xobjects);
    }
    writer.write(resources_id, &resources.into())?;

    let media_box = Object::rect([
        0.0,
        0.0,
        document.page_size.width.to_f32(),
        document.page_size.height.to_f32(),
    ]);
    for (index, page) in document.pages.iter().enumerate() {
        let content = render_page(page, document.page_size, &image_ids);
        let mut stream = Stream::new(Dict::new(), content.into_bytes());
        if ctx.compress {
            stream = stream.compressed()?;
        }
        let content_id = writer.add(&stream.into())?;
        let mut page_dict = Dict::typed("Page")
            .with("Parent", Object::Ref(pages_id))
            .with("MediaBox", media_box.clone())
            .with("Resources", Object::Ref(resources_id))
            .with("Contents", Object::Ref(content_id));
        if !annots[index].is_empty() {
            page_dict.set("Annots", Object::refs(&annots[index]));
        }
        writer.write(page_ids[index], &page_dict.into())?;
    }

    writer.write(
        pages_id,
        &Dict::typed("Pages")
            .with("Kids", Object::refs(&page_ids))
            .with("Count", page_ids.len() as i64)
            .into(),
    )?;

    let dests_id = write_named_destinations(&mut writer, &destinations, &page_ids, page_height)?;
    let outlines_id = write_outlines(
        &mut writer,
        ctx.bookmarks,
        &destinations,
        &page_ids,
        page_height,
        ctx.margin,
    )?;

    let archival = match &ctx.archival {
        Some(overlay) => Some(overlay.write_objects(&mut writer, &ctx.info, ctx.compress)?),
        None => None,
    };

    let mut info = Dict::new();
    if let Some(title) = ctx.info.title.as_deref() {
        info.set("Title", Object::text(title));
    }
    if let Some(author) = ctx.info.author.as_deref() {
        info.set("Author", Object::text(author));
    }
    if let Some(subject) = ctx.info.subject.as_deref() {
        info.set("Subject", Object::text(subject));
    }
    if let Some(keywords) = ctx.info.keywords.as_deref() {
        info.set("Keywords", Object::text(keywords));
    }
    info.set("Producer", Object::text(PRODUCER));
    if let Some(date) = &ctx.info.creation_date {
        info.set("CreationDate", Object::text(&pdf_date(date)));
        info.set("ModDate", Object::text(&pdf_date(date)));
    }
    let info_id = writer.add(&info.into())?;

    let mut catalog = Dict::typed("Catalog").with("Pages", Object::Ref(pages_id));
    if let Some(outlines) = outlines_id {
        catalog.set("Outlines", Object::Ref(outlines));
        catalog.set("PageMode", Object::name("UseOutlines"));
    }
    if let Some(dests) = dests_id {
        catalog.set("Names", Dict::new().with("Dests", Object::Ref(dests)));
    }
    if let Some(acroform) = acroform_id {
        catalog.set("AcroForm", Object::Ref(acroform));
    }
    if let Some(refs) = archival {
        catalog.set("Metadata", Object::Ref(refs.metadata));
        catalog.set("OutputIntents", Object::refs(&[refs.output_intent]));
        catalog.set("MarkInfo", Dict::new().with("Marked", true));
    }
    writer.write(catalog_id, &catalog.into())?;

    let trailer = Trailer {
        root: catalog_id,
        info: Some(info_id),
        encrypt: encrypt_id,
        file_id: ctx.file_id,
    };
    let bytes = writer.finish(&trailer)?;
    log::debug!(
        "wrote {} pages, {} fonts, {} images ({} bytes)",
        document.pages.len(),
        font_ids.len(),
        image_ids.len(),
        bytes.len()
    );
    Ok(WrittenDocument {
        bytes,
        signature_offset,
    })
}

fn ensure_helvetica(writer: &mut ObjectWriter, fonts: &FontRegistry, helv_id: &mut Option<u32>) -> Result<u32> {
    if let Some(id) = *helv_id {
        return Ok(id);
    }
    if fonts.forced_embedding() {
        return Err(AssemblyError::InternalWrite(
            "Helvetica substitute was never registered for an embedded-fonts document".to_string(),
        ));
    }
    let id = writer.add(&standard_font_object(StandardFont::Helvetica))?;
    *helv_id = Some(id);
    Ok(id)
}

/// Characters drawn with each font resource.
fn glyph_usage(
    document: &Document,
    helv: &str,
    signature: Option<&SignaturePlan>,
) -> BTreeMap<String, BTreeSet<char>> {
    let mut usage: BTreeMap<String, BTreeSet<char>> = BTreeMap::new();
    for page in &document.pages {
        let mut current: Option<&str> = None;
        let mut saved = Vec::new();
        for command in &page.commands {
            match command {
                Command::SaveState => saved.push(current),
                Command::RestoreState => current = saved.pop().flatten(),
                Command::SetFont { resource, .. } => current = Some(resource.as_str()),
                Command::DrawString { text, .. } | Command::DrawStringTransformed { text, .. } => {
                    if let Some(resource) = current {
                        usage.entry(resource.to_string()).or_default().extend(text.chars());
                    }
                }
                _ => {}
            }
        }
        for widget in &page.widgets {
            if let Some(value) = &widget.field.value {
                usage.entry(helv.to_string()).or_default().extend(value.chars());
            }
        }
    }
    if let Some(plan) = signature {
        let chars = plan.appearance_lines.iter().flat_map(|line| line.chars());
        usage.entry(helv.to_string()).or_default().extend(chars);
    }
    usage
}

fn write_fonts(
    writer: &mut ObjectWriter,
    fonts: &FontRegistry,
    usage: &BTreeMap<String, BTreeSet<char>>,
    compress: bool,
) -> Result<BTreeMap<String, u32>> {
    let unused = BTreeSet::new();
    let mut ids = BTreeMap::new();
    for font in fonts.used_fonts() {
        let id = match font.kind {
            FontKind::Standard(face) => writer.add(&standard_font_object(face))?,
            FontKind::Custom(index) => {
                let Some(registered) = fonts.custom(index) else {
                    return Err(AssemblyError::InternalWrite(format!(
                        "font {} is not registered",
                        font.resource
                    )));
                };
                let chars = usage.get(&font.resource).unwrap_or(&unused);
                let (program, base_font) = match subset_truetype(&registered.data, chars) {
                    Some(subset) => {
                        log::debug!(
                            "embedding {} of {} as subset {} ({} glyphs kept)",
                            font.resource,
                            registered.name,
                            subset.tag,
                            subset.kept_glyphs
                        );
                        (subset.data, format!("{}+{}", subset.tag, registered.postscript_name))
                    }
                    None => {
                        log::debug!("embedding full program for {}", registered.name);
                        (registered.data.clone(), registered.postscript_name.clone())
                    }
                };
                let file_id = writer.add(&font_file_object(&program, compress)?)?;
                let descriptor_id = writer.add(&font_descriptor_object(registered, &base_font, file_id))?;
                writer.add(&truetype_font_object(registered, &base_font, descriptor_id))?
            }
        };
        ids.insert(font.resource.clone(), id);
    }
    Ok(ids)
}

fn standard_font_object(face: StandardFont) -> Object {
    let dict = Dict::typed("Font")
        .with("Subtype", Object::name("Type1"))
        .with("BaseFont", Object::name(face.base_name()));
    if face.is_symbolic() {
        dict.into()
    } else {
        dict.with("Encoding", Object::name("WinAnsiEncoding")).into()
    }
}

fn truetype_font_object(font: &RegisteredFont, base_font: &str, descriptor_id: u32) -> Object {
    let metrics = &font.metrics;
    let widths = metrics.widths.iter().map(|w| Object::Int(*w as i64)).collect();
    let dict = Dict::typed("Font")
        .with("Subtype", Object::name("TrueType"))
        .with("BaseFont", Object::name(base_font))
        .with("FirstChar", metrics.first_char as i64)
        .with("LastChar", metrics.last_char as i64)
        .with("Widths", Object::Array(widths))
        .with("FontDescriptor", Object::Ref(descriptor_id));
    if metrics.is_symbolic() {
        dict.into()
    } else {
        dict.with("Encoding", Object::name("WinAnsiEncoding")).into()
    }
}

fn font_descriptor_object(font: &RegisteredFont, font_name: &str, font_file_id: u32) -> Object {
    let metrics = &font.metrics;
    let mut flags = if metrics.is_symbolic() { 4 } else { 32 };
    if metrics.is_fixed_pitch {
        flags |= 1;
    }
    let (x0, y0, x1, y1) = metrics.bbox;
    Dict::typed("FontDescriptor")
        .with("FontName", Object::name(font_name))
        .with("Flags", flags as i64)
        .with(
            "FontBBox",
            Object::Array(vec![
                Object::Int(x0 as i64),
                Object::Int(y0 as i64),
                Object::Int(x1 as i64),
                Object::Int(y1 as i64),
            ]),
        )
        .with("ItalicAngle", metrics.italic_angle as i64)
        .with("Ascent", metrics.ascent as i64)
        .with("Descent", metrics.descent as i64)
        .with("CapHeight", metrics.cap_height as i64)
        .with("StemV", metrics.stem_v as i64)
        .with("MissingWidth", metrics.missing_width as i64)
        .with("FontFile2", Object::Ref(font_file_id))
        .into()
}

fn font_file_object(data: &[u8], compress: bool) -> Result<Object> {
    let stream = Stream::new(Dict::new().with("Length1", data.len() as i64), data.to_vec());
    Ok(if compress { stream.compressed()? } else { stream }.into())
}

fn write_images(writer: &mut ObjectWriter, images: &ImageRegistry) -> Result<BTreeMap<String, u32>> {
    let mut ids = BTreeMap::new();
    for (index, image) in images.images().iter().enumerate() {
        let smask_id = match &image.alpha {
            Some(alpha) => Some(writer.add(&image_smask_object(image, alpha))?),
            None => None,
        };
        let id = writer.add(&image_object(image, smask_id))?;
        ids.insert(format!("Im{}", index + 1), id);
    }
    Ok(ids)
}

fn image_object(image: &ImageResource, smask_id: Option<u32>) -> Object {
    let filter = match image.filter {
        ImageFilter::Dct => "DCTDecode",
        ImageFilter::Flate => "FlateDecode",
    };
    let mut dict = Dict::typed("XObject")
        .with("Subtype", Object::name("Image"))
        .with("Width", image.width as i64)
        .with("Height", image.height as i64)
        .with("ColorSpace", Object::name(image.color_space.pdf_name()))
        .with("BitsPerComponent", image.bits_per_component as i64)
        .with("Filter", Object::name(filter));
    if image.inverted {
        dict.set("Decode", Object::Array(vec![vec![Object::Int(1), Object::Int(0)]; 4].concat()));
    }
    if let Some(id) = smask_id {
        dict.set("SMask", Object::Ref(id));
    }
    Stream::new(dict, image.data.clone()).into()
}

fn image_smask_object(image: &ImageResource, alpha: &[u8]) -> Object {
    let dict = Dict::typed("XObject")
        .with("Subtype", Object::name("Image"))
        .with("Width", image.width as i64)
        .with("Height", image.height as i64)
        .with("ColorSpace", Object::name("DeviceGray"))
        .with("BitsPerComponent", 8i64)
        .with("Filter", Object::name("FlateDecode"));
    Stream::new(dict, alpha.to_vec()).into()
}

fn signature_appearance(rect: Rect, lines: &[String], helv_id: u32) -> Object {
    let w = rect.width.to_f32();
    let h = rect.height.to_f32();
    let size = 8.0f32;
    let mut ops = format!("q 0.5 w 0 0 0 RG 0 0 {} {} re S Q\n", fmt(w), fmt(h));
    ops.push_str("BT\n0 0 0 rg\n");
    ops.push_str(&format!("/Helv {} Tf\n", fmt(size)));
    let mut y = h - size - 4.0;
    for line in lines {
        if y < 2.0 {
            break;
        }
        ops.push_str(&format!(
            "1 0 0 1 4 {} Tm\n({}) Tj\n",
            fmt(y),
            escape_literal(&winansi_bytes(line))
        ));
        y -= size * 1.25;
    }
    ops.push_str("ET\n");
    let dict = Dict::typed("XObject")
        .with("Subtype", Object::name("Form"))
        .with("BBox", Object::rect([0.0, 0.0, w, h]))
        .with(
            "Resources",
            Dict::new().with("Font", Dict::new().with("Helv", Object::Ref(helv_id))),
        );
    Stream::new(dict, ops.into_bytes()).into()
}

fn color_to_pdf_fill(color: Color) -> String {
    format!("{} {} {} rg\n", fmt(color.r), fmt(color.g), fmt(color.b))
}

fn color_to_pdf_stroke(color: Color) -> String {
    format!("{} {} {} RG\n", fmt(color.r), fmt(color.g), fmt(color.b))
}

fn fmt4(value: f32) -> String {
    format!("{value:.4}")
}

/// Renders one page's commands into content-stream operators.
pub fn render_page(page: &Page, page_size: Size, image_ids: &BTreeMap<String, u32>) -> String {
    let page_height = page_size.height;
    let mut out = String::new();
    let mut font: Option<(String, Pt)> = None;

    for cmd in &page.commands {
        match cmd {
            Command::SaveState => out.push_str("q\n"),
            Command::RestoreState => out.push_str("Q\n"),
            Command::SetFillColor(color) => out.push_str(&color_to_pdf_fill(*color)),
            Command::SetStrokeColor(color) => out.push_str(&color_to_pdf_stroke(*color)),
            Command::SetLineWidth(width) => out.push_str(&format!("{} w\n", fmt_pt(*width))),
            Command::SetFont { resource, size } => font = Some((resource.clone(), *size)),
            Command::MoveTo { x, y } => {
                out.push_str(&format!("{} {} m\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::LineTo { x, y } => {
                out.push_str(&format!("{} {} l\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::ClosePath => out.push_str("h\n"),
            Command::Fill => out.push_str("f\n"),
            Command::Stroke => out.push_str("S\n"),
            Command::FillRect {
                x,
                y,
                width,
                height,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} re\nf\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - *height),
                    fmt_pt(*width),
                    fmt_pt(*height)
                ));
            }
            Command::DrawString { x, y, text } => {
                let (resource, size) = font
                    .clone()
                    .unwrap_or_else(|| ("F1".to_string(), Pt::from_i32(12)));
                out.push_str("BT\n");
                out.push_str(&format!("/{} {} Tf\n", resource, fmt_pt(size)));
                out.push_str(&format!("{} {} Td\n", fmt_pt(*x), fmt_pt(page_height - *y)));
                out.push_str(&format!("({}) Tj\n", escape_literal(&winansi_bytes(text))));
                out.push_str("ET\n");
            }
            Command::DrawStringTransformed {
                x,
                y,
                text,
                m00,
                m01,
                m10,
                m11,
            } => {
                let (resource, size) = font
                    .clone()
                    .unwrap_or_else(|| ("F1".to_string(), Pt::from_i32(12)));
                out.push_str("BT\n");
                out.push_str(&format!("/{} {} Tf\n", resource, fmt_pt(size)));
                out.push_str(&format!(
                    "{} {} {} {} {} {} Tm\n",
                    fmt4(*m00),
                    fmt4(*m01),
                    fmt4(*m10),
                    fmt4(*m11),
                    fmt_pt(*x),
                    fmt_pt(page_height - *y)
                ));
                out.push_str(&format!("({}) Tj\n", escape_literal(&winansi_bytes(text))));
                out.push_str("ET\n");
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                if image_ids.contains_key(resource_id) {
                    out.push_str("q\n");
                    out.push_str(&format!(
                        "{} 0 0 {} {} {} cm\n",
                        fmt_pt(*width),
                        fmt_pt(*height),
                        fmt_pt(*x),
                        fmt_pt(page_height - *y - *height)
                    ));
                    out.push_str(&format!("/{resource_id} Do\n"));
                    out.push_str("Q\n");
                }
            }
            Command::Vector(commands) => render_vector(commands, &mut out),
            Command::PageNumber { .. } => {
                log::warn!("unresolved page number placeholder dropped");
            }
        }
    }
    out
}

fn render_vector(commands: &[SvgCommand], out: &mut String) {
    for cmd in commands {
        match cmd {
            SvgCommand::SaveState => out.push_str("q\n"),
            SvgCommand::RestoreState => out.push_str("Q\n"),
            SvgCommand::FillColor(color) => out.push_str(&color_to_pdf_fill(*color)),
            SvgCommand::StrokeColor(color) => out.push_str(&color_to_pdf_stroke(*color)),
            SvgCommand::LineWidth(width) => out.push_str(&format!("{} w\n", fmt(*width))),
            SvgCommand::MoveTo(x, y) => out.push_str(&format!("{} {} m\n", fmt(*x), fmt(*y))),
            SvgCommand::LineTo(x, y) => out.push_str(&format!("{} {} l\n", fmt(*x), fmt(*y))),
            SvgCommand::CurveTo(x1, y1, x2, y2, x, y) => out.push_str(&format!(
                "{} {} {} {} {} {} c\n",
                fmt(*x1),
                fmt(*y1),
                fmt(*x2),
                fmt(*y2),
                fmt(*x),
                fmt(*y)
            )),
            SvgCommand::ClosePath => out.push_str("h\n"),
            SvgCommand::Paint(PaintOp::Fill) => out.push_str("f\n"),
            SvgCommand::Paint(PaintOp::Stroke) => out.push_str("S\n"),
            SvgCommand::Paint(PaintOp::FillStroke) => out.push_str("B\n"),
        }
    }
}
