//! Resolution metadata patching for encoded containers.
//!
//! - JPEG: JFIF APP0 density, inserted after SOI when the encoder wrote none.
//! - PNG: `pHYs` chunk in pixels per metre, replaced or inserted after IHDR.
//! - TIFF: XResolution/YResolution rationals and ResolutionUnit = inch. When
//!   the first IFD lacks one of the tags, a rewritten IFD is appended and the
//!   header is pointed at it.
//!
//! Other formats are returned unchanged.

use tracing::trace;

use super::{EncodeError, OutputFormat};

const INCH_IN_METRES: f64 = 0.0254;

const TAG_X_RESOLUTION: u16 = 282;
const TAG_Y_RESOLUTION: u16 = 283;
const TAG_RESOLUTION_UNIT: u16 = 296;

const TIFF_SHORT: u16 = 3;
const TIFF_RATIONAL: u16 = 5;
const RESOLUTION_UNIT_INCH: u16 = 2;

/// Embed `dpi` (horizontal, vertical) into encoded `bytes`.
pub fn patch_resolution(
    format: OutputFormat,
    bytes: Vec<u8>,
    dpi: (u16, u16),
) -> Result<Vec<u8>, EncodeError> {
    let dpi = (dpi.0.max(1), dpi.1.max(1));
    trace!(%format, ?dpi, "Patching resolution metadata");
    match format {
        OutputFormat::Jpg => patch_jfif(bytes, dpi),
        OutputFormat::Png => patch_png(bytes, dpi),
        OutputFormat::Tif => patch_tiff(bytes, dpi),
        OutputFormat::Webp | OutputFormat::Pdf | OutputFormat::Jp2 => Ok(bytes),
    }
}

fn malformed(format: OutputFormat, reason: &'static str) -> EncodeError {
    EncodeError::MalformedContainer { format, reason }
}

fn patch_jfif(mut bytes: Vec<u8>, (h, v): (u16, u16)) -> Result<Vec<u8>, EncodeError> {
    if bytes.get(0..2) != Some(&[0xFF, 0xD8][..]) {
        return Err(malformed(OutputFormat::Jpg, "missing SOI marker"));
    }

    // APP0 layout: marker(2) length(2) "JFIF\0"(5) version(2) units(1)
    // x density(2) y density(2) thumbnail size(2).
    let has_jfif = bytes.get(2..4) == Some(&[0xFF, 0xE0][..])
        && bytes.get(6..11) == Some(&b"JFIF\0"[..])
        && bytes.len() >= 18;

    if has_jfif {
        bytes[13] = 1;
        bytes[14..16].copy_from_slice(&h.to_be_bytes());
        bytes[16..18].copy_from_slice(&v.to_be_bytes());
    } else {
        let mut app0 = Vec::with_capacity(18);
        app0.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
        app0.extend_from_slice(b"JFIF\0");
        app0.extend_from_slice(&[1, 2, 1]);
        app0.extend_from_slice(&h.to_be_bytes());
        app0.extend_from_slice(&v.to_be_bytes());
        app0.extend_from_slice(&[0, 0]);
        bytes.splice(2..2, app0);
    }
    Ok(bytes)
}

fn pixels_per_metre(dpi: u16) -> u32 {
    (dpi as f64 / INCH_IN_METRES).round() as u32
}

fn png_chunk(tag: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(12 + data.len());
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(tag);
    out.extend_from_slice(data);
    out.extend_from_slice(&crc32(tag, data).to_be_bytes());
    out
}

fn crc32(tag: &[u8], data: &[u8]) -> u32 {
    static TABLE: std::sync::OnceLock<[u32; 256]> = std::sync::OnceLock::new();
    let table = TABLE.get_or_init(|| {
        let mut t = [0u32; 256];
        for (n, slot) in t.iter_mut().enumerate() {
            let mut c = n as u32;
            for _ in 0..8 {
                c = if c & 1 != 0 {
                    0xEDB8_8320 ^ (c >> 1)
                } else {
                    c >> 1
                };
            }
            *slot = c;
        }
        t
    });
    let mut c = 0xFFFF_FFFFu32;
    for &b in tag.iter().chain(data.iter()) {
        c = table[((c ^ b as u32) & 0xFF) as usize] ^ (c >> 8);
    }
    c ^ 0xFFFF_FFFF
}

fn patch_png(mut bytes: Vec<u8>, (h, v): (u16, u16)) -> Result<Vec<u8>, EncodeError> {
    const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    if bytes.get(0..8) != Some(&SIGNATURE[..]) {
        return Err(malformed(OutputFormat::Png, "missing PNG signature"));
    }

    let mut data = [0u8; 9];
    data[0..4].copy_from_slice(&pixels_per_metre(h).to_be_bytes());
    data[4..8].copy_from_slice(&pixels_per_metre(v).to_be_bytes());
    data[8] = 1; // metres
    let phys = png_chunk(b"pHYs", &data);

    let mut pos = 8;
    let mut after_ihdr = None;
    while pos + 12 <= bytes.len() {
        let len = u32::from_be_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]]);
        let end = pos + 12 + len as usize;
        if end > bytes.len() {
            return Err(malformed(OutputFormat::Png, "truncated chunk"));
        }
        match &bytes[pos + 4..pos + 8] {
            b"IHDR" => after_ihdr = Some(end),
            b"pHYs" => {
                bytes.splice(pos..end, phys);
                return Ok(bytes);
            }
            b"IDAT" | b"IEND" => break,
            _ => {}
        }
        pos = end;
    }

    let at = after_ihdr.ok_or_else(|| malformed(OutputFormat::Png, "missing IHDR chunk"))?;
    bytes.splice(at..at, phys);
    Ok(bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn read_u16(self, bytes: &[u8], at: usize) -> Option<u16> {
        let raw: [u8; 2] = bytes.get(at..at + 2)?.try_into().ok()?;
        Some(match self {
            ByteOrder::Little => u16::from_le_bytes(raw),
            ByteOrder::Big => u16::from_be_bytes(raw),
        })
    }

    fn read_u32(self, bytes: &[u8], at: usize) -> Option<u32> {
        let raw: [u8; 4] = bytes.get(at..at + 4)?.try_into().ok()?;
        Some(match self {
            ByteOrder::Little => u32::from_le_bytes(raw),
            ByteOrder::Big => u32::from_be_bytes(raw),
        })
    }

    fn u16_bytes(self, v: u16) -> [u8; 2] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }

    fn u32_bytes(self, v: u32) -> [u8; 4] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }

    fn entry(self, tag: u16, kind: u16, value: [u8; 4]) -> [u8; 12] {
        let mut e = [0u8; 12];
        e[0..2].copy_from_slice(&self.u16_bytes(tag));
        e[2..4].copy_from_slice(&self.u16_bytes(kind));
        e[4..8].copy_from_slice(&self.u32_bytes(1));
        e[8..12].copy_from_slice(&value);
        e
    }
}

/// Append `data` at the next word boundary and return its offset.
fn append_aligned(bytes: &mut Vec<u8>, data: &[u8]) -> Result<u32, EncodeError> {
    if bytes.len() % 2 == 1 {
        bytes.push(0);
    }
    let offset = u32::try_from(bytes.len())
        .map_err(|_| malformed(OutputFormat::Tif, "file exceeds 4 GiB"))?;
    bytes.extend_from_slice(data);
    Ok(offset)
}

fn patch_tiff(mut bytes: Vec<u8>, (h, v): (u16, u16)) -> Result<Vec<u8>, EncodeError> {
    let bad = |reason| malformed(OutputFormat::Tif, reason);

    let order = match bytes.get(0..2) {
        Some(b"II") => ByteOrder::Little,
        Some(b"MM") => ByteOrder::Big,
        _ => return Err(bad("unknown byte order")),
    };
    if order.read_u16(&bytes, 2) != Some(42) {
        return Err(bad("missing TIFF magic"));
    }

    let ifd = order.read_u32(&bytes, 4).ok_or_else(|| bad("truncated header"))? as usize;
    let count = order.read_u16(&bytes, ifd).ok_or_else(|| bad("truncated IFD"))? as usize;
    let table = ifd + 2;
    let next_ifd = order
        .read_u32(&bytes, table + count * 12)
        .ok_or_else(|| bad("truncated IFD"))?;

    let mut entries: Vec<[u8; 12]> = bytes[table..table + count * 12]
        .chunks_exact(12)
        .filter_map(|chunk| chunk.try_into().ok())
        .collect();

    let rational = |n: u16| {
        let mut data = [0u8; 8];
        data[0..4].copy_from_slice(&order.u32_bytes(n as u32));
        data[4..8].copy_from_slice(&order.u32_bytes(1));
        data
    };
    let x_offset = append_aligned(&mut bytes, &rational(h))?;
    let y_offset = append_aligned(&mut bytes, &rational(v))?;

    let mut unit_value = [0u8; 4];
    unit_value[0..2].copy_from_slice(&order.u16_bytes(RESOLUTION_UNIT_INCH));

    let updates = [
        order.entry(TAG_X_RESOLUTION, TIFF_RATIONAL, order.u32_bytes(x_offset)),
        order.entry(TAG_Y_RESOLUTION, TIFF_RATIONAL, order.u32_bytes(y_offset)),
        order.entry(TAG_RESOLUTION_UNIT, TIFF_SHORT, unit_value),
    ];

    let tag_of = |entry: &[u8; 12]| order.read_u16(entry, 0).unwrap_or(u16::MAX);
    let mut grew = false;
    for update in updates {
        match entries.iter_mut().find(|e| tag_of(&**e) == tag_of(&update)) {
            Some(existing) => *existing = update,
            None => {
                entries.push(update);
                grew = true;
            }
        }
    }

    if grew {
        entries.sort_by_key(tag_of);
        let mut block = Vec::with_capacity(2 + entries.len() * 12 + 4);
        block.extend_from_slice(&order.u16_bytes(entries.len() as u16));
        for entry in &entries {
            block.extend_from_slice(entry);
        }
        block.extend_from_slice(&order.u32_bytes(next_ifd));
        let new_ifd = append_aligned(&mut bytes, &block)?;
        bytes[4..8].copy_from_slice(&order.u32_bytes(new_ifd));
    } else {
        for (i, entry) in entries.iter().enumerate() {
            let at = table + i * 12;
            bytes[at..at + 12].copy_from_slice(entry);
        }
    }
    Ok(bytes)
}
