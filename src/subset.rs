//! Glyph trimming for embedded TrueType programs.
//!
//! Glyph ids and every table except `glyf`/`loca` are kept, so the font's
//! cmap, metrics and the `/Widths` written from them stay valid. Outlines of
//! glyphs no content can reach are emptied.

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

const CHECKSUM_MAGIC: u32 = 0xB1B0_AFBA;

// composite glyph component flags
const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
const WE_HAVE_A_SCALE: u16 = 0x0008;
const MORE_COMPONENTS: u16 = 0x0020;
const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

/// A trimmed font program and the tag that marks it as a subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subset {
    pub data: Vec<u8>,
    pub tag: String,
    pub kept_glyphs: usize,
}

struct TableRecord {
    tag: [u8; 4],
    offset: usize,
    length: usize,
}

/// Trims `data` down to the glyphs for `chars`, printable ASCII and `.notdef`.
/// Returns `None` for programs without `glyf` outlines (CFF flavoured
/// OpenType) or with tables that do not parse.
pub fn subset_truetype(data: &[u8], chars: &BTreeSet<char>) -> Option<Subset> {
    let face = ttf_parser::Face::parse(data, 0).ok()?;
    let tables = table_directory(data)?;
    let table = |tag: &[u8; 4]| tables.iter().find(|t| &t.tag == tag);
    let head = slice(data, table(b"head")?)?;
    let loca = slice(data, table(b"loca")?)?;
    let glyf = slice(data, table(b"glyf")?)?;
    let long_offsets = read_u16(head, 50)? != 0;
    let num_glyphs = face.number_of_glyphs() as usize;
    let offsets = read_loca(loca, num_glyphs, long_offsets)?;

    let mut keep = BTreeSet::from([0u16]);
    for ch in chars.iter().copied().chain((0x20u8..0x7F).map(char::from)) {
        if let Some(id) = face.glyph_index(ch) {
            keep.insert(id.0);
        }
    }
    let mut pending: Vec<u16> = keep.iter().copied().collect();
    while let Some(gid) = pending.pop() {
        let outline = glyph_bytes(glyf, &offsets, gid as usize)?;
        for component in composite_components(outline)? {
            if (component as usize) < num_glyphs && keep.insert(component) {
                pending.push(component);
            }
        }
    }

    let align = if long_offsets { 4 } else { 2 };
    let mut new_glyf = Vec::with_capacity(glyf.len());
    let mut new_offsets = Vec::with_capacity(num_glyphs + 1);
    for gid in 0..num_glyphs {
        new_offsets.push(new_glyf.len());
        if keep.contains(&(gid as u16)) {
            new_glyf.extend_from_slice(glyph_bytes(glyf, &offsets, gid)?);
            while new_glyf.len() % align != 0 {
                new_glyf.push(0);
            }
        }
    }
    new_offsets.push(new_glyf.len());
    if !long_offsets && new_glyf.len() / 2 > u16::MAX as usize {
        return None;
    }
    let new_loca = write_loca(&new_offsets, long_offsets);

    let mut out_tables: Vec<([u8; 4], Vec<u8>)> = Vec::with_capacity(tables.len());
    for record in &tables {
        let body = match &record.tag {
            b"glyf" => new_glyf.clone(),
            b"loca" => new_loca.clone(),
            // a digital signature no longer matches the rewritten program
            b"DSIG" => continue,
            _ => slice(data, record)?.to_vec(),
        };
        out_tables.push((record.tag, body));
    }
    let program = assemble_font(data, out_tables)?;
    Some(Subset {
        tag: subset_tag(data, &keep),
        kept_glyphs: keep.len(),
        data: program,
    })
}

fn table_directory(data: &[u8]) -> Option<Vec<TableRecord>> {
    let count = read_u16(data, 4)? as usize;
    (0..count)
        .map(|i| {
            let at = 12 + i * 16;
            let tag: [u8; 4] = data.get(at..at + 4)?.try_into().ok()?;
            Some(TableRecord {
                tag,
                offset: read_u32(data, at + 8)? as usize,
                length: read_u32(data, at + 12)? as usize,
            })
        })
        .collect()
}

fn slice<'a>(data: &'a [u8], record: &TableRecord) -> Option<&'a [u8]> {
    data.get(record.offset..record.offset.checked_add(record.length)?)
}

fn read_u16(data: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes(data.get(at..at + 2)?.try_into().ok()?))
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_be_bytes(data.get(at..at + 4)?.try_into().ok()?))
}

fn read_loca(loca: &[u8], num_glyphs: usize, long_offsets: bool) -> Option<Vec<usize>> {
    (0..=num_glyphs)
        .map(|i| match long_offsets {
            true => read_u32(loca, i * 4).map(|v| v as usize),
            false => read_u16(loca, i * 2).map(|v| v as usize * 2),
        })
        .collect()
}

fn write_loca(offsets: &[usize], long_offsets: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(offsets.len() * if long_offsets { 4 } else { 2 });
    for offset in offsets {
        if long_offsets {
            out.extend_from_slice(&(*offset as u32).to_be_bytes());
        } else {
            out.extend_from_slice(&((*offset / 2) as u16).to_be_bytes());
        }
    }
    out
}

fn glyph_bytes<'a>(glyf: &'a [u8], offsets: &[usize], gid: usize) -> Option<&'a [u8]> {
    let start = *offsets.get(gid)?;
    let end = *offsets.get(gid + 1)?;
    if end < start {
        return None;
    }
    glyf.get(start..end)
}

/// Glyph ids referenced by a composite outline; empty for simple glyphs.
fn composite_components(outline: &[u8]) -> Option<Vec<u16>> {
    if outline.len() < 10 || (read_u16(outline, 0)? as i16) >= 0 {
        return Some(Vec::new());
    }
    let mut components = Vec::new();
    let mut at = 10;
    loop {
        let flags = read_u16(outline, at)?;
        components.push(read_u16(outline, at + 2)?);
        at += 4;
        at += if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 };
        if flags & WE_HAVE_A_SCALE != 0 {
            at += 2;
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            at += 4;
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            at += 8;
        }
        if flags & MORE_COMPONENTS == 0 {
            return Some(components);
        }
    }
}

fn table_checksum(bytes: &[u8]) -> u32 {
    bytes.chunks(4).fold(0u32, |sum, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(u32::from_be_bytes(word))
    })
}

/// Lays the tables out again after a fresh directory and fixes up
/// `head.checkSumAdjustment`.
fn assemble_font(original: &[u8], mut tables: Vec<([u8; 4], Vec<u8>)>) -> Option<Vec<u8>> {
    let count = tables.len();
    let mut search_range = 1usize;
    let mut entry_selector = 0u16;
    while search_range * 2 <= count {
        search_range *= 2;
        entry_selector += 1;
    }
    search_range *= 16;

    let mut head_at = None;
    let mut out = Vec::with_capacity(original.len());
    out.extend_from_slice(original.get(0..4)?);
    out.extend_from_slice(&(count as u16).to_be_bytes());
    out.extend_from_slice(&(search_range as u16).to_be_bytes());
    out.extend_from_slice(&entry_selector.to_be_bytes());
    out.extend_from_slice(&((count * 16 - search_range) as u16).to_be_bytes());

    let mut offset = 12 + count * 16;
    for (tag, body) in &mut tables {
        if tag == b"head" {
            body.get_mut(8..12)?.copy_from_slice(&[0; 4]);
            head_at = Some(offset);
        }
        out.extend_from_slice(tag.as_slice());
        out.extend_from_slice(&table_checksum(body).to_be_bytes());
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        offset += body.len().next_multiple_of(4);
    }
    for (_, body) in &tables {
        out.extend_from_slice(body);
        out.resize(out.len().next_multiple_of(4), 0);
    }

    let adjustment = CHECKSUM_MAGIC.wrapping_sub(table_checksum(&out));
    let head_at = head_at?;
    out.get_mut(head_at + 8..head_at + 12)?
        .copy_from_slice(&adjustment.to_be_bytes());
    Some(out)
}

/// Six uppercase letters derived from the program and the kept glyph set.
fn subset_tag(data: &[u8], keep: &BTreeSet<u16>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    for gid in keep {
        hasher.update(gid.to_be_bytes());
    }
    hasher
        .finalize()
        .iter()
        .take(6)
        .map(|byte| char::from(b'A' + byte % 26))
        .collect()
}
