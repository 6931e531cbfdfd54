//! Typed PDF object model and its byte serialization.
//!
//! Dictionaries keep insertion order so output is stable across runs.

use fixed::types::I32F32;
use std::io::Write;

use crate::types::Pt;

/// Per-object string/stream transform applied while serializing.
pub trait ObjectCipher {
    fn encrypt_string(&self, data: &[u8], obj_num: u32, gen_num: u16) -> Vec<u8>;
    fn encrypt_stream(&self, data: &[u8], obj_num: u32, gen_num: u16) -> Vec<u8>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Null,
    Bool(bool),
    Int(i64),
    Real(f32),
    Name(String),
    /// Literal string `( ... )`.
    Str(Vec<u8>),
    /// Hex string `< ... >`.
    HexStr(Vec<u8>),
    Array(Vec<Object>),
    Dict(Dict),
    Stream(Stream),
    Ref(u32),
    /// Pre-formatted token emitted as-is and never encrypted.
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dict(Vec<(String, Object)>);

#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub dict: Dict,
    pub data: Vec<u8>,
}

impl Object {
    pub fn name(value: impl Into<String>) -> Object {
        Object::Name(value.into())
    }

    pub fn text(value: &str) -> Object {
        Object::Str(text_string_bytes(value))
    }

    pub fn real(value: f32) -> Object {
        Object::Real(value)
    }

    pub fn rect(values: [f32; 4]) -> Object {
        Object::Array(values.iter().map(|v| Object::Real(*v)).collect())
    }

    pub fn refs(ids: &[u32]) -> Object {
        Object::Array(ids.iter().map(|id| Object::Ref(*id)).collect())
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Object::Dict(dict) => Some(dict),
            Object::Stream(stream) => Some(&stream.dict),
            _ => None,
        }
    }
}

impl From<Dict> for Object {
    fn from(dict: Dict) -> Self {
        Object::Dict(dict)
    }
}

impl From<Stream> for Object {
    fn from(stream: Stream) -> Self {
        Object::Stream(stream)
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Object::Int(value)
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Object::Bool(value)
    }
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn typed(type_name: &str) -> Self {
        Self::new().with("Type", Object::name(type_name))
    }

    pub fn with(mut self, key: &str, value: impl Into<Object>) -> Self {
        self.set(key, value);
        self
    }

    /// Replaces an existing key in place, otherwise appends.
    pub fn set(&mut self, key: &str, value: impl Into<Object>) {
        let value = value.into();
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
        } else {
            self.0.push((key.to_string(), value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Object> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<Object> {
        let index = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Object)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Stream {
    pub fn new(dict: Dict, data: Vec<u8>) -> Self {
        Self { dict, data }
    }

    /// Flate-compresses the payload unless it is already filtered.
    pub fn compressed(mut self) -> crate::error::Result<Self> {
        if self.dict.get("Filter").is_none() {
            self.data = crate::images::flate_compress(&self.data)?;
            self.dict.set("Filter", Object::name("FlateDecode"));
        }
        Ok(self)
    }
}

/// Context for encrypting the strings and streams of one indirect object.
#[derive(Clone, Copy)]
pub struct CryptContext<'a> {
    pub cipher: &'a dyn ObjectCipher,
    pub obj_num: u32,
    pub gen_num: u16,
}

pub fn serialize(object: &Object, crypt: Option<CryptContext<'_>>) -> Vec<u8> {
    let mut out = Vec::new();
    write_object(&mut out, object, crypt);
    out
}

fn write_object(out: &mut Vec<u8>, object: &Object, crypt: Option<CryptContext<'_>>) {
    match object {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Bool(v) => out.extend_from_slice(if *v { b"true" } else { b"false" }),
        Object::Int(v) => out.extend_from_slice(v.to_string().as_bytes()),
        Object::Real(v) => out.extend_from_slice(fmt(*v).as_bytes()),
        Object::Name(name) => {
            out.push(b'/');
            out.extend_from_slice(escape_name(name).as_bytes());
        }
        Object::Str(bytes) => match crypt {
            Some(ctx) => {
                let encrypted = ctx.cipher.encrypt_string(bytes, ctx.obj_num, ctx.gen_num);
                write_hex(out, &encrypted);
            }
            None => {
                out.push(b'(');
                out.extend_from_slice(escape_literal(bytes).as_bytes());
                out.push(b')');
            }
        },
        Object::HexStr(bytes) => match crypt {
            Some(ctx) => write_hex(out, &ctx.cipher.encrypt_string(bytes, ctx.obj_num, ctx.gen_num)),
            None => write_hex(out, bytes),
        },
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(out, item, crypt);
            }
            out.push(b']');
        }
        Object::Dict(dict) => write_dict(out, dict, crypt),
        Object::Stream(stream) => {
            let data = match crypt {
                Some(ctx) => ctx.cipher.encrypt_stream(&stream.data, ctx.obj_num, ctx.gen_num),
                None => stream.data.clone(),
            };
            let mut dict = stream.dict.clone();
            dict.set("Length", Object::Int(data.len() as i64));
            write_dict(out, &dict, crypt);
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(&data);
            out.extend_from_slice(b"\nendstream");
        }
        Object::Ref(id) => {
            let _ = write!(out, "{id} 0 R");
        }
        Object::Raw(raw) => out.extend_from_slice(raw.as_bytes()),
    }
}

fn write_dict(out: &mut Vec<u8>, dict: &Dict, crypt: Option<CryptContext<'_>>) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        out.extend_from_slice(b" /");
        out.extend_from_slice(escape_name(key).as_bytes());
        out.push(b' ');
        write_object(out, value, crypt);
    }
    out.extend_from_slice(b" >>");
}

fn write_hex(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(b'<');
    out.extend_from_slice(hex_upper(bytes).as_bytes());
    out.push(b'>');
}

pub fn hex_upper(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = std::fmt::Write::write_fmt(&mut s, format_args!("{b:02X}"));
    }
    s
}

/// Fixed three-decimal formatting with trailing zeros trimmed.
pub fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let fixed = I32F32::saturating_from_num(value);
    let scaled = fixed.saturating_mul(I32F32::from_num(1000)).round();
    let milli: i64 = scaled.to_num();
    format_milli(milli)
}

pub fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{sign}{int_part}")
    } else {
        let mut s = format!("{sign}{int_part}.{frac_part:03}");
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

pub fn escape_name(input: &str) -> String {
    let mut out = String::new();
    for b in input.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'+' | b'*' | b',') {
            out.push(b as char);
        } else {
            out.push_str(&format!("#{b:02X}"));
        }
    }
    out
}

/// Escapes raw bytes for a literal string; bytes outside printable ASCII
/// become octal escapes.
pub fn escape_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for b in bytes {
        match *b {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b if !(0x20..0x7f).contains(&b) => out.push_str(&format!("\\{b:03o}")),
            b => out.push(b as char),
        }
    }
    out
}

/// Maps text to WinAnsi (cp1252) bytes. Unmappable characters become `?`.
pub fn winansi_bytes(input: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\u{2265}' => out.extend_from_slice(b">="),
            '\u{2264}' => out.extend_from_slice(b"<="),
            _ => out.push(winansi_byte(ch).unwrap_or(b'?')),
        }
    }
    out
}

pub fn winansi_byte(ch: char) -> Option<u8> {
    Some(match ch {
        '\u{0000}'..='\u{007F}' => ch as u8,
        '\u{00A0}'..='\u{00FF}' => ch as u8,
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        _ => return None,
    })
}

/// PDF text string: plain ASCII as-is, anything else as UTF-16BE with BOM.
pub fn text_string_bytes(input: &str) -> Vec<u8> {
    if input.is_ascii() {
        return input.as_bytes().to_vec();
    }
    let mut out = vec![0xFE, 0xFF];
    for unit in input.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Reverse;

    impl ObjectCipher for Reverse {
        fn encrypt_string(&self, data: &[u8], _: u32, _: u16) -> Vec<u8> {
            data.iter().rev().copied().collect()
        }

        fn encrypt_stream(&self, data: &[u8], _: u32, _: u16) -> Vec<u8> {
            let mut out = data.to_vec();
            out.extend_from_slice(b"!!");
            out
        }
    }

    #[test]
    fn dictionaries_keep_insertion_order() {
        let dict = Dict::typed("Page")
            .with("Parent", Object::Ref(2))
            .with("MediaBox", Object::rect([0.0, 0.0, 595.0, 842.0]));
        let bytes = serialize(&dict.into(), None);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] >>"
        );
    }

    #[test]
    fn set_replaces_in_place() {
        let mut dict = Dict::new().with("A", 1i64).with("B", 2i64);
        dict.set("A", 3i64);
        assert_eq!(dict.get("A"), Some(&Object::Int(3)));
        assert_eq!(dict.iter().next().map(|(k, _)| k), Some("A"));
    }

    #[test]
    fn literal_strings_escape_delimiters_and_high_bytes() {
        let bytes = serialize(&Object::Str(b"a(b)\\\xE9".to_vec()), None);
        assert_eq!(String::from_utf8(bytes).unwrap(), "(a\\(b\\)\\\\\\351)");
    }

    #[test]
    fn encrypted_strings_are_hex_and_streams_get_new_length() {
        let cipher = Reverse;
        let ctx = CryptContext {
            cipher: &cipher,
            obj_num: 4,
            gen_num: 0,
        };
        let out = serialize(&Object::text("AB"), Some(ctx));
        assert_eq!(out, b"<4241>");
        let stream = Stream::new(Dict::new(), b"xyz".to_vec());
        let out = String::from_utf8(serialize(&stream.into(), Some(ctx))).unwrap();
        assert!(out.starts_with("<< /Length 5 >>\nstream\nxyz!!"));
    }

    #[test]
    fn raw_tokens_bypass_encryption() {
        let cipher = Reverse;
        let ctx = CryptContext {
            cipher: &cipher,
            obj_num: 1,
            gen_num: 0,
        };
        assert_eq!(serialize(&Object::Raw("<00FF>".into()), Some(ctx)), b"<00FF>");
    }

    #[test]
    fn numbers_format_without_trailing_zeros() {
        assert_eq!(fmt(1.5), "1.5");
        assert_eq!(fmt(-0.25), "-0.25");
        assert_eq!(fmt(12.0), "12");
        assert_eq!(fmt(f32::NAN), "0");
    }

    #[test]
    fn text_strings_use_utf16_outside_ascii() {
        assert_eq!(text_string_bytes("Hi"), b"Hi");
        assert_eq!(text_string_bytes("é"), vec![0xFE, 0xFF, 0x00, 0xE9]);
        assert_eq!(winansi_bytes("€x\u{4E00}"), vec![0x80, b'x', b'?']);
    }

    #[test]
    fn names_escape_delimiters() {
        assert_eq!(escape_name("Font Name"), "Font#20Name");
        assert_eq!(escape_name("Im1"), "Im1");
    }
}
