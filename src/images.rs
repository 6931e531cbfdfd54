use crate::error::{AssemblyError, Result};
use base64::Engine;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFilter {
    /// JPEG bytes stored untouched.
    Dct,
    Flate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageColorSpace {
    DeviceRgb,
    DeviceGray,
    DeviceCmyk,
}

impl ImageColorSpace {
    pub fn pdf_name(self) -> &'static str {
        match self {
            ImageColorSpace::DeviceRgb => "DeviceRGB",
            ImageColorSpace::DeviceGray => "DeviceGray",
            ImageColorSpace::DeviceCmyk => "DeviceCMYK",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageResource {
    pub fingerprint: [u8; 32],
    pub width: u32,
    pub height: u32,
    pub color_space: ImageColorSpace,
    pub bits_per_component: u8,
    pub filter: ImageFilter,
    /// Adobe-written CMYK JPEGs store inverted samples and need `/Decode [1 0 ...]`.
    pub inverted: bool,
    pub data: Vec<u8>,
    /// Flate-compressed 8-bit soft mask, present only when some pixel is not opaque.
    pub alpha: Option<Vec<u8>>,
    pub ref_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub index: usize,
    pub resource: String,
    pub width: u32,
    pub height: u32,
}

/// Per-assembly image store keyed by a SHA-256 of the raw bytes.
#[derive(Debug, Default)]
pub struct ImageRegistry {
    images: Vec<ImageResource>,
    by_fingerprint: HashMap<[u8; 32], usize>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_image(&mut self, bytes: &[u8]) -> Result<ImageRef> {
        let fingerprint: [u8; 32] = Sha256::digest(bytes).into();
        if let Some(index) = self.by_fingerprint.get(&fingerprint).copied() {
            let image = &mut self.images[index];
            image.ref_count += 1;
            log::trace!("image Im{} reused ({} refs)", index + 1, image.ref_count);
            return Ok(image_ref(index, image));
        }

        let mut image = decode_image_bytes(bytes)?;
        image.fingerprint = fingerprint;
        let index = self.images.len();
        let handle = image_ref(index, &image);
        self.images.push(image);
        self.by_fingerprint.insert(fingerprint, index);
        Ok(handle)
    }

    pub fn images(&self) -> &[ImageResource] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

fn image_ref(index: usize, image: &ImageResource) -> ImageRef {
    ImageRef {
        index,
        resource: format!("Im{}", index + 1),
        width: image.width,
        height: image.height,
    }
}

fn decode_image_bytes(data: &[u8]) -> Result<ImageResource> {
    let format = image::guess_format(data)
        .map_err(|_| AssemblyError::Resource("unrecognised image data".to_string()))?;
    if !matches!(format, image::ImageFormat::Png | image::ImageFormat::Jpeg) {
        return Err(AssemblyError::Resource(format!(
            "unsupported image format {format:?}"
        )));
    }
    if format == image::ImageFormat::Jpeg {
        return jpeg_passthrough(data);
    }
    let decoded = image::load_from_memory_with_format(data, format)
        .map_err(|err| AssemblyError::Resource(format!("cannot decode image: {err}")))?;
    let (width, height) = (decoded.width(), decoded.height());

    let rgba = decoded.to_rgba8();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    let mut has_alpha = false;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        if a != 255 {
            has_alpha = true;
        }
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }

    Ok(ImageResource {
        fingerprint: [0; 32],
        width,
        height,
        color_space: ImageColorSpace::DeviceRgb,
        bits_per_component: 8,
        filter: ImageFilter::Flate,
        inverted: false,
        data: flate_compress(&rgb)?,
        alpha: if has_alpha {
            Some(flate_compress(&alpha)?)
        } else {
            None
        },
        ref_count: 1,
    })
}

/// Reads only the frame header; the scan data is embedded as-is.
fn jpeg_passthrough(data: &[u8]) -> Result<ImageResource> {
    use image::ImageDecoder;

    let decoder = image::codecs::jpeg::JpegDecoder::new(std::io::Cursor::new(data))
        .map_err(|err| AssemblyError::Resource(format!("cannot read JPEG header: {err}")))?;
    let (width, height) = decoder.dimensions();
    let markers = JpegMarkers::scan(data);
    let color_space = match markers.components {
        Some(4) => ImageColorSpace::DeviceCmyk,
        _ => jpeg_color_space(decoder.original_color_type())?,
    };
    Ok(ImageResource {
        fingerprint: [0; 32],
        width,
        height,
        color_space,
        bits_per_component: 8,
        filter: ImageFilter::Dct,
        inverted: color_space == ImageColorSpace::DeviceCmyk && markers.adobe,
        data: data.to_vec(),
        alpha: None,
        ref_count: 1,
    })
}

fn jpeg_color_space(color: image::ExtendedColorType) -> Result<ImageColorSpace> {
    use image::ExtendedColorType as C;

    match color {
        C::L8 | C::La8 => Ok(ImageColorSpace::DeviceGray),
        C::Rgb8 | C::Rgba8 => Ok(ImageColorSpace::DeviceRgb),
        C::Cmyk8 => Ok(ImageColorSpace::DeviceCmyk),
        other => Err(AssemblyError::Resource(format!(
            "unsupported JPEG colour type {other:?}"
        ))),
    }
}

/// Segments of interest ahead of the first scan.
#[derive(Debug, Default, PartialEq, Eq)]
struct JpegMarkers {
    /// An APP14 `Adobe` segment was present.
    adobe: bool,
    /// Component count from the frame header.
    components: Option<u8>,
}

impl JpegMarkers {
    fn scan(data: &[u8]) -> Self {
        let mut found = JpegMarkers::default();
        let mut pos = 2;
        while pos + 4 <= data.len() {
            if data[pos] != 0xFF {
                break;
            }
            let marker = data[pos + 1];
            if marker == 0xFF {
                pos += 1;
                continue;
            }
            if marker == 0xDA || marker == 0xD9 {
                break;
            }
            let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            let body = data.get(pos + 4..pos + 2 + len).unwrap_or_default();
            match marker {
                0xEE if body.starts_with(b"Adobe") => found.adobe = true,
                0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                    found.components = body.get(5).copied();
                }
                _ => {}
            }
            pos += 2 + len;
        }
        found
    }
}

pub(crate) fn flate_compress(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Accepts a `data:` URI or bare base64.
pub fn decode_image_data(raw: &str) -> Result<Vec<u8>> {
    let payload = match raw.trim().strip_prefix("data:") {
        Some(rest) => {
            let Some((header, body)) = rest.split_once(',') else {
                return Err(AssemblyError::Resource("malformed data URI".to_string()));
            };
            if !header.contains("base64") {
                return Ok(body.as_bytes().to_vec());
            }
            body
        }
        None => raw.trim(),
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|err| AssemblyError::Resource(format!("invalid base64 image data: {err}")))
}

pub fn is_svg(name: &str, bytes: &[u8]) -> bool {
    if name.to_ascii_lowercase().ends_with(".svg") {
        return true;
    }
    let head = &bytes[..bytes.len().min(256)];
    let head = String::from_utf8_lossy(head);
    let head = head.trim_start();
    head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg"))
}
