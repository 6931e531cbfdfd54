//! Deterministic template-to-PDF document assembly.
//!
//! A [`TemplateDocument`] (page config, title, ordered elements, footer,
//! bookmarks) is laid out into pages and serialized into a complete PDF file,
//! optionally encrypted with the standard security handler and signed with a
//! detached CMS signature. Identical input with an identical seed produces
//! byte-identical output.

mod annot;
mod canvas;
mod debug;
mod error;
mod font;
mod frame;
mod images;
mod layout;
mod object;
mod outline;
mod pdf;
mod pdfa;
mod props;
pub mod security;
mod subset;
mod svg;
mod template;
mod types;

use base64::Engine;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde_json::json;
use std::path::PathBuf;

use debug::DebugLogger;
use font::FontRegistry;
use images::ImageRegistry;
use pdf::{DocumentInfo, WriteContext};
use pdfa::ArchivalOverlay;
use security::{encrypt, sign};

pub use error::{AssemblyError, Result};
pub use object::{Dict, Object};
pub use pdf::{PdfVersion, PRODUCER};
pub use security::{authenticate, EncryptionAlgorithm, Permissions, SignatureFormat};
pub use template::{
    Bookmark, Cell, Config, CustomFont, Divider, Element, ElementKind, Footer, FormField,
    FormFieldKind, ImageSpec, PdfaConfig, Row, SecurityConfig, SignatureConfig, Spacer, Table,
    TemplateDocument, Title,
};
pub use types::{Color, PageSize, Pt, Rect, Size};

/// Per-call knobs that are not part of the template itself.
#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    /// Source of every random byte (IVs, salts, file keys) and part of the file ID.
    pub seed: u64,
    pub compress: bool,
    /// Written to the Info dictionary and XMP metadata; `None` keeps output reproducible.
    pub creation_date: Option<DateTime<Utc>>,
    pub encryption: EncryptionAlgorithm,
    pub signature_format: SignatureFormat,
    pub debug_log: Option<PathBuf>,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            seed: 0,
            compress: true,
            creation_date: None,
            encryption: EncryptionAlgorithm::default(),
            signature_format: SignatureFormat::default(),
            debug_log: None,
        }
    }
}

/// Reusable assembler. Each call owns its own font and image registries, so
/// one instance can serve many documents concurrently.
pub struct Assembler {
    options: AssemblyOptions,
    debug: Option<DebugLogger>,
}

#[derive(Debug, Clone, Default)]
pub struct AssemblerBuilder {
    options: AssemblyOptions,
}

impl Default for Assembler {
    fn default() -> Self {
        Self {
            options: AssemblyOptions::default(),
            debug: None,
        }
    }
}

impl Assembler {
    pub fn builder() -> AssemblerBuilder {
        AssemblerBuilder::new()
    }

    pub fn options(&self) -> &AssemblyOptions {
        &self.options
    }

    /// Runs the full pipeline: validate, register fonts, lay out, write,
    /// then sign last since the signature covers the final bytes.
    pub fn assemble(&self, template: &TemplateDocument) -> Result<Vec<u8>> {
        template.validate()?;
        let config = &template.config;
        let options = &self.options;
        let archival = config.pdfa_enabled();

        let mut fonts = FontRegistry::new();
        fonts.set_forced_embedding(archival || config.embed_fonts, config.substitute_font_dir());
        for custom in &config.custom_fonts {
            let data = load_custom_font(custom)?;
            fonts.register_custom(&custom.name, data)?;
        }
        let mut images = ImageRegistry::new();
        let debug = self.debug.as_ref().map(DebugLogger::scoped);

        log::debug!("laying out template");
        let document = layout::layout_document(template, &mut fonts, &mut images, debug.clone())?;

        let file_id = file_id(options.seed, template)?;
        let version = if config.arlington_compatible {
            PdfVersion::Pdf20
        } else {
            PdfVersion::Pdf17
        };

        let encryption = match config.security.as_ref().filter(|s| s.enabled) {
            Some(security) => {
                log::debug!("encrypting with {:?}", options.encryption);
                Some(encrypt::prepare(security, options.encryption, &file_id, options.seed)?)
            }
            None => None,
        };

        let signing = match config.signature.as_ref().filter(|s| s.enabled) {
            Some(signature) => {
                let material = sign::load_material(signature)?;
                let plan = sign::signature_plan(
                    signature,
                    &material,
                    options.signature_format,
                    options.creation_date.as_ref(),
                );
                Some((material, plan))
            }
            None => None,
        };

        let pdfa = config.pdfa.clone().unwrap_or_default();
        let info = DocumentInfo {
            title: pdfa.title.clone().or_else(|| config.pdf_title.clone()),
            author: pdfa.author.clone(),
            subject: pdfa.subject.clone(),
            keywords: pdfa.keywords.clone(),
            creation_date: options.creation_date,
        };
        let overlay = archival.then(|| ArchivalOverlay {
            version,
            conformance: pdfa.conformance.clone(),
            creator: pdfa.creator.clone(),
        });

        let (material, plan) = match signing {
            Some((material, plan)) => (Some(material), Some(plan)),
            None => (None, None),
        };
        let written = pdf::write_document(
            &document,
            WriteContext {
                version,
                fonts: &fonts,
                images: &images,
                bookmarks: &template.bookmarks,
                info,
                compress: options.compress,
                file_id,
                margin: Pt::from_i32(layout::MARGIN),
                encryption,
                signature: plan,
                archival: overlay,
            },
        )?;

        let bytes = match (material, written.signature_offset) {
            (Some(material), Some(signature_at)) => {
                log::debug!("signing {} bytes", written.bytes.len());
                sign::sign_document(
                    written.bytes,
                    signature_at,
                    &material,
                    options.signature_format,
                    options.creation_date,
                )?
            }
            (Some(_), None) => {
                return Err(AssemblyError::InternalWrite(
                    "signature dictionary was not written".to_string(),
                ));
            }
            (None, _) => written.bytes,
        };

        if let Some(debug) = &debug {
            debug.record(
                "assemble.done",
                json!({ "pages": document.pages.len(), "bytes": bytes.len(), "images": images.len() }),
            );
            debug.emit_summary("assemble");
            debug.flush();
        }
        Ok(bytes)
    }

    pub fn assemble_json(&self, json: &str) -> Result<Vec<u8>> {
        self.assemble(&TemplateDocument::from_json(json)?)
    }

    /// Assembles independent documents on the rayon pool; results keep input order.
    pub fn assemble_batch(&self, templates: &[TemplateDocument]) -> Vec<Result<Vec<u8>>> {
        use rayon::prelude::*;

        templates
            .par_iter()
            .map(|template| self.assemble(template))
            .collect()
    }
}

impl AssemblerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.options.seed = seed;
        self
    }

    pub fn compress(mut self, enabled: bool) -> Self {
        self.options.compress = enabled;
        self
    }

    pub fn creation_date(mut self, date: DateTime<Utc>) -> Self {
        self.options.creation_date = Some(date);
        self
    }

    pub fn encryption(mut self, algorithm: EncryptionAlgorithm) -> Self {
        self.options.encryption = algorithm;
        self
    }

    pub fn signature_format(mut self, format: SignatureFormat) -> Self {
        self.options.signature_format = format;
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.debug_log = Some(path.into());
        self
    }

    pub fn options(mut self, options: AssemblyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<Assembler> {
        let debug = match &self.options.debug_log {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        Ok(Assembler {
            options: self.options,
            debug,
        })
    }
}

/// Assembles with default options.
pub fn assemble(template: &TemplateDocument) -> Result<Vec<u8>> {
    Assembler::default().assemble(template)
}

pub fn assemble_json(json: &str) -> Result<Vec<u8>> {
    Assembler::default().assemble_json(json)
}

pub fn assemble_batch(templates: &[TemplateDocument]) -> Vec<Result<Vec<u8>>> {
    Assembler::default().assemble_batch(templates)
}

/// MD5 over the seed and the canonical template JSON.
pub(crate) fn file_id(seed: u64, template: &TemplateDocument) -> Result<[u8; 16]> {
    let mut hasher = Md5::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(template.canonical_json()?);
    Ok(hasher.finalize().into())
}

fn load_custom_font(font: &CustomFont) -> Result<Vec<u8>> {
    if let Some(data) = font.font_data.as_deref().filter(|d| !d.trim().is_empty()) {
        let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
        return base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|err| AssemblyError::Resource(format!("font '{}' data is not base64: {err}", font.name)));
    }
    match font.file_path.as_deref() {
        Some(path) => std::fs::read(path).map_err(|err| {
            AssemblyError::Resource(format!("cannot read font '{}' from {path}: {err}", font.name))
        }),
        None => Err(AssemblyError::TemplateValidation(format!(
            "custom font '{}' needs filePath or fontData",
            font.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CERT: &str = include_str!("../testdata/signer_cert.pem");
    const KEY: &str = include_str!("../testdata/signer_pkcs8.pem");

    fn hello() -> TemplateDocument {
        TemplateDocument {
            table: vec![Table {
                maxcolumns: 1,
                rows: vec![Row {
                    row: vec![Cell::text("Helvetica:12:000:left:0:0:0:0", "Hello")],
                }],
                ..Table::default()
            }],
            ..TemplateDocument::default()
        }
    }

    fn rows(count: usize) -> TemplateDocument {
        let mut template = hello();
        template.table[0].rows = (0..count)
            .map(|i| Row {
                row: vec![Cell::text("Helvetica:10:000:left:0:0:0:0", &format!("Line {i}"))],
            })
            .collect();
        template
    }

    fn uncompressed() -> Assembler {
        Assembler::builder().compress(false).build().unwrap()
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).rposition(|w| w == needle)
    }

    /// Offsets from the xref table, indexed by object number - 1.
    fn xref_offsets(pdf: &[u8]) -> Vec<usize> {
        let at = rfind(pdf, b"startxref\n").unwrap();
        let tail = std::str::from_utf8(&pdf[at + 10..]).unwrap();
        let start: usize = tail.lines().next().unwrap().trim().parse().unwrap();
        let xref = std::str::from_utf8(&pdf[start..at]).unwrap();
        xref.lines()
            .skip(3)
            .take_while(|line| line.ends_with(" n "))
            .map(|line| line[..10].parse().unwrap())
            .collect()
    }

    fn stream_data(pdf: &[u8], id: u32) -> Vec<u8> {
        let offset = xref_offsets(pdf)[id as usize - 1];
        let object = &pdf[offset..];
        let length_at = find(object, b"/Length ").unwrap() + 8;
        let digits: String = object[length_at..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .map(|b| *b as char)
            .collect();
        let length: usize = digits.parse().unwrap();
        let data_at = find(object, b"\nstream\n").unwrap() + 8;
        object[data_at..data_at + length].to_vec()
    }

    fn first_content_id(pdf: &[u8]) -> u32 {
        let at = find(pdf, b"/Contents ").unwrap() + 10;
        let digits: String = pdf[at..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .map(|b| *b as char)
            .collect();
        digits.parse().unwrap()
    }

    #[test]
    fn hello_scenario_yields_one_page_with_the_text() {
        let pdf = uncompressed().assemble(&hello()).unwrap();
        assert!(pdf.starts_with(b"%PDF-1.7\n"));
        assert!(pdf.ends_with(b"%%EOF\n"));
        let content = stream_data(&pdf, first_content_id(&pdf));
        let content = String::from_utf8(content).unwrap();
        assert!(content.contains("(Hello) Tj"));
        assert!(content.contains("(Page 1 of 1) Tj"));

        let doc = lopdf::Document::load_mem(&pdf).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn page_label_does_not_inherit_cell_text_colour() {
        let mut template = hello();
        template.table[0].rows[0].row[0].textcolor = Some("#FF0000".to_string());
        let pdf = uncompressed().assemble(&template).unwrap();
        let content = String::from_utf8(stream_data(&pdf, first_content_id(&pdf))).unwrap();
        assert!(content.contains("1 0 0 rg"));
        let label_at = content.find("(Page 1 of 1) Tj").unwrap();
        let fill_in_force = content[..label_at]
            .lines()
            .filter(|line| line.ends_with(" rg"))
            .last()
            .unwrap();
        assert_eq!(fill_in_force, "0 0 0 rg");
    }

    #[test]
    fn identical_input_and_seed_give_identical_bytes() {
        let assembler = Assembler::builder().seed(7).build().unwrap();
        let mut template = rows(40);
        template.config.watermark = Some("DRAFT".to_string());
        template.config.security = Some(SecurityConfig {
            enabled: true,
            user_password: "user".to_string(),
            owner_password: "owner".to_string(),
            ..SecurityConfig::default()
        });
        let first = assembler.assemble(&template).unwrap();
        let second = assembler.assemble(&template).unwrap();
        assert_eq!(first, second);

        let other = Assembler::builder().seed(8).build().unwrap();
        assert_ne!(first, other.assemble(&template).unwrap());
    }

    #[test]
    fn xref_offsets_point_at_object_headers() {
        let mut template = rows(120);
        template.config.page_border = "1:1:1:1".to_string();
        template.bookmarks = vec![Bookmark {
            title: "Start".to_string(),
            page: Some(1),
            ..Bookmark::default()
        }];
        let pdf = assemble(&template).unwrap();
        let offsets = xref_offsets(&pdf);
        assert!(offsets.len() > 5);
        for (index, offset) in offsets.iter().enumerate() {
            let header = format!("{} 0 obj\n", index + 1);
            assert!(pdf[*offset..].starts_with(header.as_bytes()), "object {}", index + 1);
        }
        let size = format!("/Size {}", offsets.len() + 1);
        assert!(find(&pdf, size.as_bytes()).is_some());
    }

    #[test]
    fn five_hundred_rows_span_whole_row_pages() {
        let mut template = rows(500);
        template.config.page_border = "1:1:1:1".to_string();
        template.footer = Some(Footer {
            font: Some("Helvetica:8:000:left".to_string()),
            text: Some("Quarterly ledger".to_string()),
            link: None,
        });
        let pdf = uncompressed().assemble(&template).unwrap();
        let doc = lopdf::Document::load_mem(&pdf).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 19);
        for page_id in pages.values() {
            let content = String::from_utf8(doc.get_page_content(*page_id).unwrap()).unwrap();
            assert!(content.contains("(Quarterly ledger) Tj"));
            assert!(content.contains("72 72 m\n72 770 l\nS"));
        }
    }

    #[test]
    fn encrypted_output_opens_with_either_password_only() {
        let security = SecurityConfig {
            enabled: true,
            user_password: "reader".to_string(),
            owner_password: "author".to_string(),
            allow_printing: true,
            allow_copying: false,
            ..SecurityConfig::default()
        };
        let mut template = hello();
        template.config.security = Some(security.clone());
        for algorithm in [
            EncryptionAlgorithm::Rc4_128,
            EncryptionAlgorithm::Aes128,
            EncryptionAlgorithm::Aes256,
        ] {
            let assembler = Assembler::builder()
                .seed(11)
                .compress(false)
                .encryption(algorithm)
                .build()
                .unwrap();
            let pdf = assembler.assemble(&template).unwrap();

            // the dictionary derives from the same seed and file ID
            let id = file_id(11, &template).unwrap();
            let setup = encrypt::prepare(&security, algorithm, &id, 11).unwrap();
            let serialized = object::serialize(&setup.dict.clone().into(), None);
            assert!(find(&pdf, &serialized).is_some(), "{algorithm:?}");

            let permissions = Permissions::from_config(&security);
            assert!(!permissions.copy);
            let p_entry = format!("/P {}", permissions.p_value());
            assert!(find(&pdf, p_entry.as_bytes()).is_some());

            let content_id = first_content_id(&pdf);
            let encrypted = stream_data(&pdf, content_id);
            assert!(find(&encrypted, b"(Hello) Tj").is_none());
            for password in ["author", "reader"] {
                let handler = authenticate(&setup.dict, &id, password).unwrap();
                let plain = handler.decrypt(&encrypted, content_id, 0).unwrap();
                assert!(find(&plain, b"(Hello) Tj").is_some(), "{algorithm:?} {password}");
            }
            assert!(matches!(
                authenticate(&setup.dict, &id, "intruder"),
                Err(AssemblyError::SecurityConfig(_))
            ));
        }
    }

    #[test]
    fn signed_output_covers_everything_but_the_signature() {
        let mut template = hello();
        let lookalike = "https://example.com/[0 0000000000 0000000000 0000000000]";
        template.table[0].rows[0].row[0].link = Some(lookalike.to_string());
        template.config.signature = Some(SignatureConfig {
            enabled: true,
            certificate_pem: CERT.to_string(),
            private_key_pem: KEY.to_string(),
            visible: true,
            page: 1,
            x: 300.0,
            y: 600.0,
            reason: Some("Approval".to_string()),
            ..SignatureConfig::default()
        });
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let assembler = Assembler::builder().creation_date(date).build().unwrap();
        let pdf = assembler.assemble(&template).unwrap();

        assert!(find(&pdf, format!("({lookalike})").as_bytes()).is_some());
        let sig_at = find(&pdf, b"/Type /Sig").unwrap();
        let at = sig_at + find(&pdf[sig_at..], b"/ByteRange [").unwrap() + 12;
        let end = at + find(&pdf[at..], b"]").unwrap();
        let ranges: Vec<usize> = std::str::from_utf8(&pdf[at..end])
            .unwrap()
            .split_whitespace()
            .map(|v| v.parse().unwrap())
            .collect();
        assert_eq!(ranges[0], 0);
        assert_eq!(ranges[2] + ranges[3], pdf.len());
        assert_eq!(pdf[ranges[1]], b'<');
        assert_eq!(pdf[ranges[2] - 1], b'>');
        assert_eq!(ranges[2] - ranges[1], sign::SIGNATURE_HEX_LEN + 2);
        assert_ne!(&pdf[ranges[1] + 1..ranges[1] + 5], b"0000");
        assert!(find(&pdf, b"/SigFlags 3").is_some());
        assert!(find(&pdf, b"/M (D:20240301120000+00'00')").is_some());
    }

    #[test]
    fn dangling_internal_link_fails_the_build() {
        let mut template = hello();
        template.table[0].rows[0].row[0].link = Some("#nowhere".to_string());
        assert!(matches!(
            assemble(&template),
            Err(AssemblyError::TemplateValidation(_))
        ));

        template.table[0].rows[0].row[0].dest = Some("nowhere".to_string());
        let pdf = assemble(&template).unwrap();
        assert!(find(&pdf, b"(nowhere)").is_some());
    }

    #[test]
    fn malformed_json_is_a_validation_error() {
        assert!(matches!(
            assemble_json("{\"config\": "),
            Err(AssemblyError::TemplateValidation(_))
        ));
        let pdf = assemble_json(r#"{"title": {"text": "Empty"}}"#).unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
    }

    #[test]
    fn batch_results_match_single_assembly_in_order() {
        let templates = vec![hello(), rows(60), rows(3)];
        let batch = assemble_batch(&templates);
        assert_eq!(batch.len(), 3);
        for (template, result) in templates.iter().zip(batch) {
            assert_eq!(result.unwrap(), assemble(template).unwrap());
        }
    }

    #[test]
    fn archival_overlay_embeds_fonts_and_metadata() {
        let font = std::fs::read(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/DejaVuSansMono.ttf")).unwrap();
        let font_dir = std::env::temp_dir().join(format!("docforge-archival-fonts-{}", std::process::id()));
        std::fs::create_dir_all(&font_dir).unwrap();
        std::fs::write(font_dir.join("LiberationSans-Regular.ttf"), &font).unwrap();
        let mut template = hello();
        template.table[0].rows.push(Row {
            row: vec![Cell::text("Mono:12:000:left", "Hello")],
        });
        template.config.pdfa = Some(PdfaConfig {
            enabled: true,
            title: Some("Archive".to_string()),
            font_dir: Some(font_dir.to_string_lossy().into_owned()),
            ..PdfaConfig::default()
        });
        template.config.custom_fonts = vec![CustomFont {
            name: "Mono".to_string(),
            file_path: None,
            font_data: Some(base64::engine::general_purpose::STANDARD.encode(&font)),
        }];
        let pdf = uncompressed().assemble(&template).unwrap();
        let _ = std::fs::remove_dir_all(&font_dir);
        assert_eq!(pdf.windows(10).filter(|w| *w == b"/FontFile2").count(), 2);
        assert!(find(&pdf, b"/Type1").is_none());
        assert!(find(&pdf, b"/Helvetica").is_none());
        assert!(find(&pdf, b"/OutputIntents").is_some());
        assert!(find(&pdf, b"pdfaid:part").is_some());
        assert!(find(&pdf, b"/Title (Archive)").is_some());
        assert!(find(&pdf, b"/CreationDate").is_none());
    }

    #[test]
    fn embedded_custom_font_is_trimmed_to_a_tagged_subset() {
        let font = std::fs::read(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/DejaVuSansMono.ttf")).unwrap();
        let mut template = hello();
        template.table[0].rows[0].row[0] = Cell::text("Mono:12:000:left", "Grüße");
        template.config.custom_fonts = vec![CustomFont {
            name: "Mono".to_string(),
            file_path: None,
            font_data: Some(base64::engine::general_purpose::STANDARD.encode(&font)),
        }];
        let pdf = uncompressed().assemble(&template).unwrap();
        let text = String::from_utf8_lossy(&pdf).into_owned();
        let base_font = text
            .match_indices("/BaseFont /")
            .map(|(at, _)| text[at + 11..].split(|c: char| c.is_whitespace() || c == '/').next().unwrap())
            .find(|name| name.contains('+'))
            .unwrap();
        let (tag, name) = base_font.split_once('+').unwrap();
        assert_eq!(tag.len(), 6);
        assert!(tag.chars().all(|c| c.is_ascii_uppercase()));
        assert!(name.starts_with("DejaVuSansMono"));
        assert!(text.contains(&format!("/FontName /{base_font}")));
        let length1: usize = text
            .find("/Length1 ")
            .map(|at| text[at + 9..].split(|c: char| !c.is_ascii_digit()).next().unwrap())
            .unwrap()
            .parse()
            .unwrap();
        assert!(length1 < font.len());

        let parsed = lopdf::Document::load_mem(&pdf).unwrap();
        assert_eq!(parsed.get_pages().len(), 1);
    }

    #[test]
    fn archival_output_without_a_font_substitute_fails() {
        let font_dir = std::env::temp_dir().join(format!("docforge-no-fonts-{}", std::process::id()));
        std::fs::create_dir_all(&font_dir).unwrap();
        let mut template = hello();
        template.config.pdfa = Some(PdfaConfig {
            enabled: true,
            font_dir: Some(font_dir.to_string_lossy().into_owned()),
            ..PdfaConfig::default()
        });
        let err = assemble(&template).unwrap_err();
        assert!(matches!(err, AssemblyError::Resource(msg) if msg.contains("Helvetica")));
    }

    #[test]
    fn arlington_flag_selects_the_2_0_header() {
        let mut template = hello();
        template.config.arlington_compatible = true;
        assert!(assemble(&template).unwrap().starts_with(b"%PDF-2.0\n"));
    }

    #[test]
    fn debug_log_records_layout_and_summary() {
        let path = std::env::temp_dir().join(format!("docforge-debug-{}.jsonl", std::process::id()));
        let assembler = Assembler::builder().debug_log(&path).build().unwrap();
        assembler.assemble(&rows(40)).unwrap();
        let log = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        let records: Vec<serde_json::Value> = log
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert!(records.iter().any(|r| r["type"] == "layout.page_break"));
        let summary = records.last().unwrap();
        assert_eq!(summary["type"], "debug.summary");
        assert_eq!(summary["counts"]["layout.rows"], 40);
        assert_eq!(summary["counts"]["layout.pages"], 2);
    }

    #[test]
    fn batch_debug_summaries_are_per_document() {
        let path = std::env::temp_dir().join(format!("docforge-batch-debug-{}.jsonl", std::process::id()));
        let assembler = Assembler::builder().debug_log(&path).build().unwrap();
        let results = assembler.assemble_batch(&[rows(40), rows(3), rows(7)]);
        assert!(results.iter().all(Result::is_ok));
        let log = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        let mut counted: Vec<(u64, u64)> = log
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
            .filter(|record| record["type"] == "debug.summary")
            .map(|record| {
                let counts = &record["counts"];
                (counts["layout.rows"].as_u64().unwrap(), counts["layout.pages"].as_u64().unwrap())
            })
            .collect();
        counted.sort();
        assert_eq!(counted, vec![(3, 1), (7, 1), (40, 2)]);
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(16))]
        #[test]
        fn assembly_is_deterministic(texts in proptest::collection::vec("[a-zA-Z0-9 ]{0,40}", 1..30), seed in 0u64..1000) {
            let mut template = hello();
            template.table[0].rows = texts
                .iter()
                .map(|text| Row { row: vec![Cell::text("Helvetica:11:000:left:1:0:1:0", text)] })
                .collect();
            let assembler = Assembler::builder().seed(seed).build().unwrap();
            proptest::prop_assert_eq!(assembler.assemble(&template).unwrap(), assembler.assemble(&template).unwrap());
        }
    }
}
