//! Archival overlay: XMP metadata packet, sRGB output intent and the
//! catalog markers that go with them.

use crate::error::Result;
use crate::object::{Dict, Object, Stream};
use crate::pdf::{DocumentInfo, ObjectWriter, PdfVersion, PRODUCER};

#[derive(Debug, Clone, Default)]
pub struct ArchivalOverlay {
    pub version: PdfVersion,
    /// Conformance letter for part 2 output (`B` when unset).
    pub conformance: Option<String>,
    pub creator: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchivalRefs {
    pub metadata: u32,
    pub output_intent: u32,
}

impl ArchivalOverlay {
    pub fn write_objects(
        &self,
        writer: &mut ObjectWriter,
        info: &DocumentInfo,
        compress: bool,
    ) -> Result<ArchivalRefs> {
        let xmp = build_xmp_metadata(self, info);
        let metadata = writer.add(
            &Stream::new(
                Dict::typed("Metadata").with("Subtype", Object::name("XML")),
                xmp.into_bytes(),
            )
            .into(),
        )?;

        let profile = Stream::new(Dict::new().with("N", 3i64), srgb_icc_profile());
        let profile = if compress { profile.compressed()? } else { profile };
        let icc_id = writer.add(&profile.into())?;
        let output_intent = writer.add(&output_intent_object(icc_id))?;
        Ok(ArchivalRefs {
            metadata,
            output_intent,
        })
    }
}

fn output_intent_object(icc_id: u32) -> Object {
    Dict::typed("OutputIntent")
        .with("S", Object::name("GTS_PDFA1"))
        .with("DestOutputProfile", Object::Ref(icc_id))
        .with("OutputConditionIdentifier", Object::text("sRGB IEC61966-2.1"))
        .with("OutputCondition", Object::text("sRGB IEC61966-2.1"))
        .with("RegistryName", Object::text("http://www.color.org"))
        .with("Info", Object::text("sRGB IEC61966-2.1"))
        .into()
}

fn escape_xml_text(input: &str) -> String {
    let mut out = String::new();
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

fn build_xmp_metadata(overlay: &ArchivalOverlay, info: &DocumentInfo) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?>"#);
    out.push_str("\n<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n");
    out.push_str("<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n");

    out.push_str("<rdf:Description rdf:about=\"\" xmlns:pdfaid=\"http://www.aiim.org/pdfa/ns/id/\" ");
    match overlay.version {
        PdfVersion::Pdf20 => out.push_str("pdfaid:part=\"4\" pdfaid:rev=\"2020\"/>\n"),
        PdfVersion::Pdf17 => {
            let conformance = overlay
                .conformance
                .as_deref()
                .map(|c| c.trim().to_ascii_uppercase())
                .filter(|c| matches!(c.as_str(), "A" | "B" | "U"))
                .unwrap_or_else(|| "B".to_string());
            out.push_str(&format!(
                "pdfaid:part=\"2\" pdfaid:conformance=\"{conformance}\"/>\n"
            ));
        }
    }

    out.push_str("<rdf:Description rdf:about=\"\" xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n");
    out.push_str("<dc:format>application/pdf</dc:format>\n");
    if let Some(title) = info.title.as_deref() {
        out.push_str("<dc:title><rdf:Alt><rdf:li xml:lang=\"x-default\">");
        out.push_str(&escape_xml_text(title));
        out.push_str("</rdf:li></rdf:Alt></dc:title>\n");
    }
    if let Some(author) = info.author.as_deref() {
        out.push_str("<dc:creator><rdf:Seq><rdf:li>");
        out.push_str(&escape_xml_text(author));
        out.push_str("</rdf:li></rdf:Seq></dc:creator>\n");
    }
    if let Some(subject) = info.subject.as_deref() {
        out.push_str("<dc:description><rdf:Alt><rdf:li xml:lang=\"x-default\">");
        out.push_str(&escape_xml_text(subject));
        out.push_str("</rdf:li></rdf:Alt></dc:description>\n");
    }
    out.push_str("</rdf:Description>\n");

    out.push_str("<rdf:Description rdf:about=\"\" xmlns:pdf=\"http://ns.adobe.com/pdf/1.3/\">\n");
    out.push_str(&format!("<pdf:Producer>{}</pdf:Producer>\n", escape_xml_text(PRODUCER)));
    if let Some(keywords) = info.keywords.as_deref() {
        out.push_str(&format!("<pdf:Keywords>{}</pdf:Keywords>\n", escape_xml_text(keywords)));
    }
    out.push_str("</rdf:Description>\n");

    let has_tool = overlay.creator.is_some();
    if has_tool || info.creation_date.is_some() {
        out.push_str("<rdf:Description rdf:about=\"\" xmlns:xmp=\"http://ns.adobe.com/xap/1.0/\">\n");
        if let Some(creator) = overlay.creator.as_deref() {
            out.push_str(&format!("<xmp:CreatorTool>{}</xmp:CreatorTool>\n", escape_xml_text(creator)));
        }
        if let Some(date) = &info.creation_date {
            let stamp = date.format("%Y-%m-%dT%H:%M:%SZ");
            out.push_str(&format!("<xmp:CreateDate>{stamp}</xmp:CreateDate>\n"));
            out.push_str(&format!("<xmp:ModifyDate>{stamp}</xmp:ModifyDate>\n"));
        }
        out.push_str("</rdf:Description>\n");
    }

    out.push_str("</rdf:RDF>\n</x:xmpmeta>\n");
    out.push_str("<?xpacket end=\"w\"?>");
    out
}

fn s15_fixed16(value: f64) -> [u8; 4] {
    ((value * 65536.0).round() as i32).to_be_bytes()
}

fn xyz_tag(x: f64, y: f64, z: f64) -> Vec<u8> {
    let mut tag = b"XYZ \0\0\0\0".to_vec();
    tag.extend_from_slice(&s15_fixed16(x));
    tag.extend_from_slice(&s15_fixed16(y));
    tag.extend_from_slice(&s15_fixed16(z));
    tag
}

fn gamma_tag(gamma: f64) -> Vec<u8> {
    let mut tag = b"curv\0\0\0\0".to_vec();
    tag.extend_from_slice(&1u32.to_be_bytes());
    tag.extend_from_slice(&((gamma * 256.0).round() as u16).to_be_bytes());
    tag
}

fn text_description_tag(text: &str) -> Vec<u8> {
    let mut tag = b"desc\0\0\0\0".to_vec();
    tag.extend_from_slice(&(text.len() as u32 + 1).to_be_bytes());
    tag.extend_from_slice(text.as_bytes());
    tag.push(0);
    // empty unicode and scriptcode records
    tag.extend_from_slice(&[0; 8]);
    tag.extend_from_slice(&[0; 3]);
    tag.extend_from_slice(&[0; 67]);
    tag
}

fn text_tag(text: &str) -> Vec<u8> {
    let mut tag = b"text\0\0\0\0".to_vec();
    tag.extend_from_slice(text.as_bytes());
    tag.push(0);
    tag
}

/// Minimal ICC v2 display profile for sRGB: D50-adapted colorants and a
/// 2.2 gamma curve per channel.
pub fn srgb_icc_profile() -> Vec<u8> {
    let trc = gamma_tag(2.2);
    let tags: Vec<(&[u8; 4], Vec<u8>)> = vec![
        (b"desc", text_description_tag("sRGB IEC61966-2.1")),
        (b"cprt", text_tag("No copyright, use freely")),
        (b"wtpt", xyz_tag(0.9642, 1.0, 0.8249)),
        (b"rXYZ", xyz_tag(0.4361, 0.2225, 0.0139)),
        (b"gXYZ", xyz_tag(0.3851, 0.7169, 0.0971)),
        (b"bXYZ", xyz_tag(0.1431, 0.0606, 0.7141)),
        (b"rTRC", trc.clone()),
        (b"gTRC", trc.clone()),
        (b"bTRC", trc),
    ];

    let table_len = 4 + tags.len() * 12;
    let mut data = Vec::new();
    let mut table = Vec::with_capacity(table_len);
    table.extend_from_slice(&(tags.len() as u32).to_be_bytes());
    let mut offset = 128 + table_len;
    for (signature, body) in &tags {
        table.extend_from_slice(*signature);
        table.extend_from_slice(&(offset as u32).to_be_bytes());
        table.extend_from_slice(&(body.len() as u32).to_be_bytes());
        data.extend_from_slice(body);
        while data.len() % 4 != 0 {
            data.push(0);
        }
        offset = 128 + table_len + data.len();
    }

    let total = 128 + table_len + data.len();
    let mut header = vec![0u8; 128];
    header[0..4].copy_from_slice(&(total as u32).to_be_bytes());
    header[8..12].copy_from_slice(&[0x02, 0x10, 0x00, 0x00]);
    header[12..16].copy_from_slice(b"mntr");
    header[16..20].copy_from_slice(b"RGB ");
    header[20..24].copy_from_slice(b"XYZ ");
    header[36..40].copy_from_slice(b"acsp");
    header[68..72].copy_from_slice(&s15_fixed16(0.9642));
    header[72..76].copy_from_slice(&s15_fixed16(1.0));
    header[76..80].copy_from_slice(&s15_fixed16(0.8249));

    let mut profile = header;
    profile.extend_from_slice(&table);
    profile.extend_from_slice(&data);
    profile
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn be_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    #[test]
    fn icc_profile_is_self_consistent() {
        let profile = srgb_icc_profile();
        assert_eq!(be_u32(&profile, 0) as usize, profile.len());
        assert_eq!(&profile[36..40], b"acsp");
        let count = be_u32(&profile, 128) as usize;
        assert_eq!(count, 9);
        for index in 0..count {
            let entry = 132 + index * 12;
            let offset = be_u32(&profile, entry + 4) as usize;
            let size = be_u32(&profile, entry + 8) as usize;
            assert_eq!(offset % 4, 0);
            assert!(offset + size <= profile.len());
        }
    }

    #[test]
    fn xmp_declares_part_per_version() {
        let info = DocumentInfo {
            title: Some("Q3 <Report>".to_string()),
            author: Some("Ops".to_string()),
            ..DocumentInfo::default()
        };
        let legacy = build_xmp_metadata(&ArchivalOverlay::default(), &info);
        assert!(legacy.contains("pdfaid:part=\"2\" pdfaid:conformance=\"B\""));
        assert!(legacy.contains("Q3 &lt;Report&gt;"));
        assert!(legacy.contains("<rdf:li>Ops</rdf:li>"));
        assert!(!legacy.contains("xmp:CreateDate"));

        let modern = ArchivalOverlay {
            version: PdfVersion::Pdf20,
            ..ArchivalOverlay::default()
        };
        let dated = DocumentInfo {
            creation_date: Some(Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()),
            ..DocumentInfo::default()
        };
        let xmp = build_xmp_metadata(&modern, &dated);
        assert!(xmp.contains("pdfaid:part=\"4\""));
        assert!(xmp.contains("<xmp:CreateDate>2024-05-06T07:08:09Z</xmp:CreateDate>"));
    }

    #[test]
    fn overlay_writes_metadata_and_intent() {
        let mut writer = ObjectWriter::new(PdfVersion::Pdf17);
        let refs = ArchivalOverlay::default()
            .write_objects(&mut writer, &DocumentInfo::default(), false)
            .unwrap();
        assert_eq!(refs.metadata, 1);
        assert_eq!(refs.output_intent, 3);
        let text = String::from_utf8_lossy(writer.body()).into_owned();
        assert!(text.contains("/Type /Metadata /Subtype /XML"));
        assert!(text.contains("/S /GTS_PDFA1 /DestOutputProfile 2 0 R"));
    }
}
