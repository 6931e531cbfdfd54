//! Detached CMS signatures patched into a reserved `/Contents` slot.

use std::time::Duration;

use chrono::{DateTime, Utc};
use cms::builder::{SignedDataBuilder, SignerInfoBuilder};
use cms::cert::x509::attr::Attribute;
use cms::cert::x509::Certificate;
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::signed_data::{EncapsulatedContentInfo, SignerIdentifier};
use der::asn1::{ObjectIdentifier, SetOfVec, UtcTime};
use der::{Any, Decode, Encode};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use spki::AlgorithmIdentifierOwned;

use crate::error::{AssemblyError, Result};
use crate::object::{Dict, Object};
use crate::pdf::pdf_date;
use crate::template::SignatureConfig;
use crate::types::{Pt, Rect};

/// Hex digits reserved for the DER signature container.
pub const SIGNATURE_HEX_LEN: usize = 16384;

const BYTE_RANGE_PLACEHOLDER: &str = "[0 0000000000 0000000000 0000000000]";

const ID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
const ID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
const ID_SIGNING_TIME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");
const ID_SIGNING_CERTIFICATE_V2: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.2.47");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureFormat {
    #[default]
    Pkcs7Detached,
    CadesDetached,
}

impl SignatureFormat {
    fn sub_filter(self) -> &'static str {
        match self {
            SignatureFormat::Pkcs7Detached => "adbe.pkcs7.detached",
            SignatureFormat::CadesDetached => "ETSI.CAdES.detached",
        }
    }
}

/// Parsed signer key and certificate chain, leaf first.
pub struct SigningMaterial {
    key: RsaPrivateKey,
    chain: Vec<Certificate>,
    leaf_der: Vec<u8>,
    common_name: Option<String>,
}

impl std::fmt::Debug for SigningMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningMaterial")
            .field("chain", &self.chain.len())
            .field("common_name", &self.common_name)
            .finish_non_exhaustive()
    }
}

impl SigningMaterial {
    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }
}

fn security(message: impl Into<String>) -> AssemblyError {
    AssemblyError::SecurityConfig(message.into())
}

fn certificate_blocks(pem: &str) -> Result<Vec<Vec<u8>>> {
    let mut blocks = Vec::new();
    for block in x509_parser::pem::Pem::iter_from_buffer(pem.as_bytes()) {
        let block = block.map_err(|err| security(format!("invalid certificate PEM: {err}")))?;
        if block.label == "CERTIFICATE" {
            blocks.push(block.contents);
        }
    }
    Ok(blocks)
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|err| security(format!("unsupported private key: {err}")))
}

/// Loads the certificate chain and RSA key and checks that they belong together.
pub fn load_material(config: &SignatureConfig) -> Result<SigningMaterial> {
    let mut ders = certificate_blocks(&config.certificate_pem)?;
    if ders.is_empty() {
        return Err(security("signature certificate is missing"));
    }
    for extra in &config.certificate_chain {
        ders.extend(certificate_blocks(extra)?);
    }

    let chain = ders
        .iter()
        .map(|der| Certificate::from_der(der).map_err(|err| security(format!("invalid certificate: {err}"))))
        .collect::<Result<Vec<_>>>()?;
    let leaf_der = ders[0].clone();

    let common_name = match x509_parser::parse_x509_certificate(&leaf_der) {
        Ok((_, parsed)) => parsed
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string),
        Err(err) => return Err(security(format!("invalid certificate: {err}"))),
    };

    let key = parse_private_key(&config.private_key_pem)?;
    let public = key
        .to_public_key()
        .to_public_key_der()
        .map_err(|err| security(format!("cannot encode public key: {err}")))?;
    let certified = chain[0]
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|err| security(format!("cannot encode certificate key: {err}")))?;
    if public.as_bytes() != certified.as_slice() {
        return Err(security("private key does not match the signing certificate"));
    }

    Ok(SigningMaterial {
        key,
        chain,
        leaf_der,
        common_name,
    })
}

/// Everything the object writer needs to emit the signature field.
#[derive(Debug, Clone)]
pub struct SignaturePlan {
    /// Signature value dictionary with the reserved `/ByteRange` and `/Contents`.
    pub dict: Dict,
    pub page_index: usize,
    /// Visible box in top-left page coordinates.
    pub rect: Option<Rect>,
    pub appearance_lines: Vec<String>,
}

pub fn signature_plan(
    config: &SignatureConfig,
    material: &SigningMaterial,
    format: SignatureFormat,
    signing_time: Option<&DateTime<Utc>>,
) -> SignaturePlan {
    let mut dict = Dict::typed("Sig")
        .with("Filter", Object::name("Adobe.PPKLite"))
        .with("SubFilter", Object::name(format.sub_filter()))
        .with("ByteRange", Object::Raw(BYTE_RANGE_PLACEHOLDER.to_string()))
        .with("Contents", Object::Raw(format!("<{}>", "0".repeat(SIGNATURE_HEX_LEN))));
    let signer_name = config
        .name
        .clone()
        .or_else(|| material.common_name.clone());
    if let Some(reason) = config.reason.as_deref() {
        dict.set("Reason", Object::text(reason));
    }
    if let Some(location) = config.location.as_deref() {
        dict.set("Location", Object::text(location));
    }
    if let Some(contact) = config.contact_info.as_deref() {
        dict.set("ContactInfo", Object::text(contact));
    }
    if let Some(name) = signer_name.as_deref() {
        dict.set("Name", Object::text(name));
    }
    if let Some(time) = signing_time {
        dict.set("M", Object::text(&pdf_date(time)));
    }

    let (rect, appearance_lines) = if config.visible {
        let width = if config.width > 0.0 { config.width } else { 200.0 };
        let height = if config.height > 0.0 { config.height } else { 50.0 };
        let rect = Rect::new(
            Pt::from_f64(config.x),
            Pt::from_f64(config.y),
            Pt::from_f64(width),
            Pt::from_f64(height),
        );
        let mut lines = vec![format!(
            "Digitally signed by {}",
            signer_name.as_deref().unwrap_or("unknown signer")
        )];
        if let Some(time) = signing_time {
            lines.push(format!("Date: {}", time.format("%Y-%m-%d %H:%M:%S UTC")));
        }
        if let Some(reason) = config.reason.as_deref() {
            lines.push(format!("Reason: {reason}"));
        }
        if let Some(location) = config.location.as_deref() {
            lines.push(format!("Location: {location}"));
        }
        (Some(rect), lines)
    } else {
        (None, Vec::new())
    };

    SignaturePlan {
        dict,
        page_index: config.page.saturating_sub(1),
        rect,
        appearance_lines,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn attribute(oid: ObjectIdentifier, value: Any) -> Result<Attribute> {
    let values = SetOfVec::try_from(vec![value])
        .map_err(|err| AssemblyError::InternalWrite(format!("attribute set: {err}")))?;
    Ok(Attribute { oid, values })
}

fn signing_time_attribute(time: DateTime<Utc>) -> Result<Attribute> {
    let seconds = u64::try_from(time.timestamp()).unwrap_or(0);
    let utc = UtcTime::from_unix_duration(Duration::from_secs(seconds))
        .map_err(|err| security(format!("signing time out of range: {err}")))?;
    let value = Any::encode_from(&utc).map_err(|err| AssemblyError::InternalWrite(err.to_string()))?;
    attribute(ID_SIGNING_TIME, value)
}

/// ESS signing-certificate-v2 with the default SHA-256 hash algorithm.
fn signing_certificate_v2_attribute(leaf_der: &[u8]) -> Result<Attribute> {
    let mut der = vec![0x30, 0x26, 0x30, 0x24, 0x30, 0x22, 0x04, 0x20];
    der.extend_from_slice(&Sha256::digest(leaf_der));
    let value = Any::from_der(&der).map_err(|err| AssemblyError::InternalWrite(err.to_string()))?;
    attribute(ID_SIGNING_CERTIFICATE_V2, value)
}

fn build_cms(
    material: &SigningMaterial,
    digest: &[u8],
    format: SignatureFormat,
    signing_time: DateTime<Utc>,
) -> Result<Vec<u8>> {
    let cms_err = |err: cms::builder::Error| security(format!("signature container: {err:?}"));
    let leaf = &material.chain[0];
    let content = EncapsulatedContentInfo {
        econtent_type: ID_DATA,
        econtent: None,
    };
    let digest_algorithm = AlgorithmIdentifierOwned {
        oid: ID_SHA256,
        parameters: None,
    };
    let sid = SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
        issuer: leaf.tbs_certificate.issuer.clone(),
        serial_number: leaf.tbs_certificate.serial_number.clone(),
    });
    let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(material.key.clone());

    let mut signer_info = SignerInfoBuilder::new(
        &signer,
        sid,
        digest_algorithm.clone(),
        &content,
        Some(digest),
    )
    .map_err(cms_err)?;
    signer_info
        .add_signed_attribute(signing_time_attribute(signing_time)?)
        .map_err(cms_err)?;
    if format == SignatureFormat::CadesDetached {
        signer_info
            .add_signed_attribute(signing_certificate_v2_attribute(&material.leaf_der)?)
            .map_err(cms_err)?;
    }

    let mut builder = SignedDataBuilder::new(&content);
    builder.add_digest_algorithm(digest_algorithm).map_err(cms_err)?;
    for cert in &material.chain {
        builder
            .add_certificate(CertificateChoices::Certificate(cert.clone()))
            .map_err(cms_err)?;
    }
    builder
        .add_signer_info::<_, rsa::pkcs1v15::Signature>(signer_info)
        .map_err(cms_err)?;
    let content_info = builder.build().map_err(cms_err)?;
    content_info
        .to_der()
        .map_err(|err| AssemblyError::InternalWrite(format!("signature encoding: {err}")))
}

/// Fills `/ByteRange`, digests the covered bytes and writes the CMS container
/// into the reserved slot. `signature_at` is the offset of the `/Sig` object;
/// slots are only looked up from there. The buffer length never changes.
pub fn sign_document(
    mut pdf: Vec<u8>,
    signature_at: usize,
    material: &SigningMaterial,
    format: SignatureFormat,
    signing_time: Option<DateTime<Utc>>,
) -> Result<Vec<u8>> {
    let object = pdf
        .get(signature_at..)
        .ok_or_else(|| AssemblyError::InternalWrite("signature object offset out of range".to_string()))?;
    let object_end = signature_at
        + find(object, b"\nendobj\n")
            .ok_or_else(|| AssemblyError::InternalWrite("signature object is unterminated".to_string()))?;
    let range_at = find(&pdf[signature_at..object_end], BYTE_RANGE_PLACEHOLDER.as_bytes())
        .map(|offset| signature_at + offset)
        .ok_or_else(|| AssemblyError::InternalWrite("signature byte range slot not found".to_string()))?;
    let contents_key = find(&pdf[range_at..object_end], b"/Contents <")
        .map(|offset| range_at + offset)
        .ok_or_else(|| AssemblyError::InternalWrite("signature contents slot not found".to_string()))?;
    let lt = contents_key + "/Contents ".len();
    let gt = lt + 1 + SIGNATURE_HEX_LEN;
    if pdf.get(gt) != Some(&b'>') {
        return Err(AssemblyError::InternalWrite("signature contents slot is malformed".to_string()));
    }

    let len = pdf.len();
    let byte_range = format!("[0 {:010} {:010} {:010}]", lt, gt + 1, len - (gt + 1));
    if byte_range.len() != BYTE_RANGE_PLACEHOLDER.len() {
        return Err(AssemblyError::InternalWrite("file too large for the byte range slot".to_string()));
    }
    pdf[range_at..range_at + byte_range.len()].copy_from_slice(byte_range.as_bytes());

    let mut hasher = Sha256::new();
    hasher.update(&pdf[..lt]);
    hasher.update(&pdf[gt + 1..]);
    let digest = hasher.finalize();

    let container = build_cms(material, &digest, format, signing_time.unwrap_or_else(Utc::now))?;
    let hex = crate::object::hex_upper(&container);
    if hex.len() > SIGNATURE_HEX_LEN {
        return Err(security(format!(
            "signature container needs {} hex digits, only {SIGNATURE_HEX_LEN} reserved",
            hex.len()
        )));
    }
    pdf[lt + 1..lt + 1 + hex.len()].copy_from_slice(hex.as_bytes());
    log::debug!("signed {} bytes, container {} bytes", len - (gt + 1 - lt), container.len());
    Ok(pdf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Dict;
    use crate::pdf::{ObjectWriter, PdfVersion, Trailer};
    use chrono::TimeZone;
    use cms::content_info::ContentInfo;
    use cms::signed_data::SignedData;

    const CERT: &str = include_str!("../../testdata/signer_cert.pem");
    const PKCS1: &str = include_str!("../../testdata/signer_pkcs1.pem");
    const PKCS8: &str = include_str!("../../testdata/signer_pkcs8.pem");
    const DECOY_URI: &str = "https://example.com/[0 0000000000 0000000000 0000000000]";

    fn config(key: &str) -> SignatureConfig {
        SignatureConfig {
            enabled: true,
            certificate_pem: CERT.to_string(),
            private_key_pem: key.to_string(),
            reason: Some("Approval".to_string()),
            ..SignatureConfig::default()
        }
    }

    fn signed_fixture(format: SignatureFormat) -> (Vec<u8>, Vec<u8>) {
        let material = load_material(&config(PKCS8)).unwrap();
        let time = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let plan = signature_plan(&config(PKCS8), &material, format, Some(&time));
        let mut writer = ObjectWriter::new(PdfVersion::Pdf17);
        let root = writer.reserve();
        // A link whose text equals the unfilled slot, written before the signature.
        let decoy = writer
            .add(&Dict::typed("Annot").with("URI", Object::text(DECOY_URI)).into())
            .unwrap();
        let sig = writer.add(&plan.dict.into()).unwrap();
        let signature_at = writer.offset_of(sig).unwrap();
        writer
            .write(
                root,
                &Dict::typed("Catalog")
                    .with("Sig", Object::Ref(sig))
                    .with("Link", Object::Ref(decoy))
                    .into(),
            )
            .unwrap();
        let unsigned = writer
            .finish(&Trailer {
                root,
                info: None,
                encrypt: None,
                file_id: [1; 16],
            })
            .unwrap();
        let signed =
            sign_document(unsigned.clone(), signature_at, &material, format, Some(time)).unwrap();
        (unsigned, signed)
    }

    fn byte_range(pdf: &[u8]) -> [usize; 4] {
        let at = find(pdf, b"/ByteRange [").unwrap() + "/ByteRange [".len();
        let end = at + pdf[at..].iter().position(|b| *b == b']').unwrap();
        let values: Vec<usize> = std::str::from_utf8(&pdf[at..end])
            .unwrap()
            .split_whitespace()
            .map(|v| v.parse().unwrap())
            .collect();
        [values[0], values[1], values[2], values[3]]
    }

    #[test]
    fn both_key_encodings_load() {
        for key in [PKCS1, PKCS8] {
            let material = load_material(&config(key)).unwrap();
            assert_eq!(material.common_name(), Some("Docforge Test Signer"));
        }
    }

    #[test]
    fn missing_certificate_is_a_config_error() {
        let mut cfg = config(PKCS8);
        cfg.certificate_pem = String::new();
        assert!(matches!(load_material(&cfg), Err(AssemblyError::SecurityConfig(_))));
        cfg.certificate_pem = CERT.to_string();
        cfg.private_key_pem = "garbage".to_string();
        assert!(matches!(load_material(&cfg), Err(AssemblyError::SecurityConfig(_))));
    }

    #[test]
    fn byte_range_covers_everything_but_the_slot() {
        let (unsigned, signed) = signed_fixture(SignatureFormat::Pkcs7Detached);
        assert_eq!(unsigned.len(), signed.len());
        let [start, first_len, second_start, second_len] = byte_range(&signed);
        assert_eq!(start, 0);
        assert_eq!(signed[first_len], b'<');
        assert_eq!(signed[second_start - 1], b'>');
        assert_eq!(second_start - first_len, SIGNATURE_HEX_LEN + 2);
        assert_eq!(second_start + second_len, signed.len());
    }

    #[test]
    fn earlier_text_matching_the_slot_is_left_alone() {
        let (unsigned, signed) = signed_fixture(SignatureFormat::Pkcs7Detached);
        let decoy = format!("({DECOY_URI})");
        let decoy_at = find(&unsigned, decoy.as_bytes()).unwrap();
        let sig_at = find(&unsigned, b"/Type /Sig").unwrap();
        assert!(decoy_at < sig_at);
        assert_eq!(&signed[decoy_at..decoy_at + decoy.len()], decoy.as_bytes());
        assert!(find(&signed[sig_at..], BYTE_RANGE_PLACEHOLDER.as_bytes()).is_none());
    }

    #[test]
    fn container_digest_matches_covered_bytes() {
        for format in [SignatureFormat::Pkcs7Detached, SignatureFormat::CadesDetached] {
            let (_, signed) = signed_fixture(format);
            let [_, first_len, second_start, _] = byte_range(&signed);
            let mut hasher = Sha256::new();
            hasher.update(&signed[..first_len]);
            hasher.update(&signed[second_start..]);
            let expected = hasher.finalize();

            let hex = std::str::from_utf8(&signed[first_len + 1..second_start - 1]).unwrap();
            let slot: Vec<u8> = (0..hex.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
                .collect();
            // outer SEQUENCE uses a two-byte long-form length
            assert_eq!(&slot[..2], &[0x30, 0x82]);
            let total = 4 + u16::from_be_bytes([slot[2], slot[3]]) as usize;
            let content_info = ContentInfo::from_der(&slot[..total]).unwrap();
            let signed_data = SignedData::from_der(&content_info.content.to_der().unwrap()).unwrap();
            let signer = signed_data.signer_infos.0.iter().next().unwrap();
            let attrs = signer.signed_attrs.as_ref().unwrap();
            let digest_attr = attrs
                .iter()
                .find(|a| a.oid == ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4"))
                .unwrap();
            assert_eq!(digest_attr.values.iter().next().unwrap().value(), expected.as_slice());
            let has_ess = attrs.iter().any(|a| a.oid == ID_SIGNING_CERTIFICATE_V2);
            assert_eq!(has_ess, format == SignatureFormat::CadesDetached);
        }
    }

    #[test]
    fn visible_plan_uses_common_name_fallback() {
        let mut cfg = config(PKCS8);
        cfg.visible = true;
        cfg.page = 2;
        let material = load_material(&cfg).unwrap();
        let plan = signature_plan(&cfg, &material, SignatureFormat::Pkcs7Detached, None);
        assert_eq!(plan.page_index, 1);
        assert_eq!(plan.rect.unwrap().width, Pt::from_i32(200));
        assert_eq!(plan.appearance_lines[0], "Digitally signed by Docforge Test Signer");
        assert!(plan.dict.get("M").is_none());
    }
}
