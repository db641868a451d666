//! Minimal single-HDU FITS reader/writer.
//!
//! Covers what the pipeline needs: one primary HDU, 2-D image data,
//! BITPIX 8/16/32/-32/-64 on read (with BSCALE/BZERO applied), BITPIX -32
//! on write. Header cards are kept in file order.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use memmap2::Mmap;
use ndarray::Array2;

use crate::error::{NocturneError, Result};

/// FITS files are organized in fixed-size blocks.
pub const BLOCK_SIZE: usize = 2880;
const CARD_SIZE: usize = 80;
const CARDS_PER_BLOCK: usize = BLOCK_SIZE / CARD_SIZE;

/// A parsed header card value.
#[derive(Clone, Debug, PartialEq)]
pub enum CardValue {
    Logical(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl CardValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Real(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// An ordered FITS header. Structural keys (SIMPLE/BITPIX/NAXIS*) are
/// managed by the reader/writer, not stored here.
#[derive(Clone, Debug, Default)]
pub struct FitsHeader {
    cards: Vec<(String, CardValue, Option<String>)>,
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&CardValue> {
        self.cards
            .iter()
            .find(|(k, _, _)| k == key)
            .map(|(_, v, _)| v)
    }

    /// Set a card, replacing an existing one with the same key.
    pub fn set(&mut self, key: &str, value: CardValue) {
        self.set_with_comment(key, value, None)
    }

    pub fn set_with_comment(&mut self, key: &str, value: CardValue, comment: Option<&str>) {
        let comment = comment.map(str::to_string);
        if let Some(card) = self.cards.iter_mut().find(|(k, _, _)| k == key) {
            card.1 = value;
            card.2 = comment;
        } else {
            self.cards.push((key.to_string(), value, comment));
        }
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(CardValue::as_i64)
    }

    pub fn real(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(CardValue::as_f64)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(CardValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, CardValue, Option<String>)> {
        self.cards.iter()
    }
}

/// A decoded primary HDU: header cards plus pixel data as f32.
///
/// `data` is 0x0 for a header-only HDU (NAXIS = 0).
#[derive(Clone, Debug)]
pub struct FitsImage {
    pub header: FitsHeader,
    pub data: Array2<f32>,
}

/// Read a FITS file, mapping it into memory.
pub fn read_fits(path: &Path) -> Result<FitsImage> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };

    if mmap.len() < BLOCK_SIZE {
        return Err(NocturneError::InvalidFits(format!(
            "{}: file smaller than one FITS block",
            path.display()
        )));
    }
    if &mmap[0..6] != b"SIMPLE" {
        return Err(NocturneError::InvalidFits(format!(
            "{}: missing SIMPLE card",
            path.display()
        )));
    }

    let (header, raw, data_offset) = parse_header(&mmap, path)?;

    let data = if raw.naxis == 0 {
        Array2::zeros((0, 0))
    } else {
        let rows = raw.naxis2 as usize;
        let cols = raw.naxis1 as usize;
        let bytes_per_pixel = (raw.bitpix.unsigned_abs() / 8) as usize;
        let data_len = rows * cols * bytes_per_pixel;
        if mmap.len() < data_offset + data_len {
            return Err(NocturneError::InvalidFits(format!(
                "{}: truncated data unit, expected {} bytes",
                path.display(),
                data_len
            )));
        }
        decode_data(
            &mmap[data_offset..data_offset + data_len],
            rows,
            cols,
            raw.bitpix,
            raw.bscale,
            raw.bzero,
        )?
    };

    Ok(FitsImage { header, data })
}

struct StructuralKeys {
    bitpix: i64,
    naxis: i64,
    naxis1: i64,
    naxis2: i64,
    bscale: f64,
    bzero: f64,
}

fn parse_header(mmap: &[u8], path: &Path) -> Result<(FitsHeader, StructuralKeys, usize)> {
    let mut header = FitsHeader::new();
    let mut raw = StructuralKeys {
        bitpix: 0,
        naxis: -1,
        naxis1: 0,
        naxis2: 0,
        bscale: 1.0,
        bzero: 0.0,
    };

    let invalid = |msg: String| NocturneError::InvalidFits(format!("{}: {msg}", path.display()));

    let mut offset = 0;
    let mut ended = false;
    'blocks: while !ended {
        if offset + BLOCK_SIZE > mmap.len() {
            return Err(invalid("header without END card".into()));
        }
        for i in 0..CARDS_PER_BLOCK {
            let card = &mmap[offset + i * CARD_SIZE..offset + (i + 1) * CARD_SIZE];
            let key = std::str::from_utf8(&card[0..8])
                .map_err(|_| invalid("non-ASCII header keyword".into()))?
                .trim_end()
                .to_string();
            if key == "END" {
                ended = true;
                offset += BLOCK_SIZE;
                break 'blocks;
            }
            if key.is_empty() || key == "COMMENT" || key == "HISTORY" || &card[8..10] != b"= " {
                continue;
            }
            let value = parse_value(&card[10..])
                .ok_or_else(|| invalid(format!("unparsable value for {key}")))?;
            match key.as_str() {
                "SIMPLE" => {}
                "BITPIX" => raw.bitpix = value.as_i64().unwrap_or(0),
                "NAXIS" => raw.naxis = value.as_i64().unwrap_or(-1),
                "NAXIS1" => raw.naxis1 = value.as_i64().unwrap_or(0),
                "NAXIS2" => raw.naxis2 = value.as_i64().unwrap_or(0),
                "BSCALE" => raw.bscale = value.as_f64().unwrap_or(1.0),
                "BZERO" => raw.bzero = value.as_f64().unwrap_or(0.0),
                _ => header.set(&key, value),
            }
        }
        offset += BLOCK_SIZE;
    }

    match raw.naxis {
        0 => {}
        2 => {
            if raw.naxis1 <= 0 || raw.naxis2 <= 0 {
                return Err(invalid(format!(
                    "bad image dimensions {}x{}",
                    raw.naxis1, raw.naxis2
                )));
            }
        }
        n => return Err(invalid(format!("unsupported NAXIS = {n}"))),
    }
    if raw.naxis != 0 && !matches!(raw.bitpix, 8 | 16 | 32 | -32 | -64) {
        return Err(invalid(format!("unsupported BITPIX = {}", raw.bitpix)));
    }

    Ok((header, raw, offset))
}

fn parse_value(field: &[u8]) -> Option<CardValue> {
    let s = std::str::from_utf8(field).ok()?;
    let trimmed = s.trim_start();
    if let Some(rest) = trimmed.strip_prefix('\'') {
        // Quoted string; '' is an escaped quote.
        let mut out = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    out.push('\'');
                    chars.next();
                } else {
                    return Some(CardValue::Text(out.trim_end().to_string()));
                }
            } else {
                out.push(c);
            }
        }
        None
    } else {
        let token = trimmed.split('/').next()?.trim();
        match token {
            "T" => Some(CardValue::Logical(true)),
            "F" => Some(CardValue::Logical(false)),
            "" => None,
            _ => {
                if let Ok(v) = token.parse::<i64>() {
                    Some(CardValue::Integer(v))
                } else {
                    token.replace(['D', 'd'], "E").parse::<f64>().ok().map(CardValue::Real)
                }
            }
        }
    }
}

fn decode_data(
    raw: &[u8],
    rows: usize,
    cols: usize,
    bitpix: i64,
    bscale: f64,
    bzero: f64,
) -> Result<Array2<f32>> {
    let n = rows * cols;
    let mut values = Vec::with_capacity(n);
    match bitpix {
        8 => values.extend(raw.iter().map(|&b| b as f64)),
        16 => {
            for chunk in raw.chunks_exact(2) {
                values.push(BigEndian::read_i16(chunk) as f64);
            }
        }
        32 => {
            for chunk in raw.chunks_exact(4) {
                values.push(BigEndian::read_i32(chunk) as f64);
            }
        }
        -32 => {
            for chunk in raw.chunks_exact(4) {
                values.push(BigEndian::read_f32(chunk) as f64);
            }
        }
        -64 => {
            for chunk in raw.chunks_exact(8) {
                values.push(BigEndian::read_f64(chunk));
            }
        }
        other => {
            return Err(NocturneError::InvalidFits(format!(
                "unsupported BITPIX = {other}"
            )))
        }
    }
    let data: Vec<f32> = values
        .into_iter()
        .map(|v| (bzero + bscale * v) as f32)
        .collect();
    Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| NocturneError::InvalidFits(format!("shape error: {e}")))
}

/// Write a single-HDU FITS file with BITPIX = -32 data.
pub fn write_fits(path: &Path, header: &FitsHeader, data: &Array2<f32>) -> Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    let mut cards: Vec<String> = Vec::new();
    cards.push(format_card("SIMPLE", "T", Some("conforms to FITS standard")));
    if data.is_empty() {
        cards.push(format_card("BITPIX", "8", None));
        cards.push(format_card("NAXIS", "0", None));
    } else {
        cards.push(format_card("BITPIX", "-32", None));
        cards.push(format_card("NAXIS", "2", None));
        cards.push(format_card("NAXIS1", &data.ncols().to_string(), None));
        cards.push(format_card("NAXIS2", &data.nrows().to_string(), None));
    }
    for (key, value, comment) in header.iter() {
        cards.push(format_card(key, &format_value(value), comment.as_deref()));
    }
    cards.push({
        let mut end = String::from("END");
        end.push_str(&" ".repeat(CARD_SIZE - 3));
        end
    });

    let mut written = 0;
    for card in &cards {
        debug_assert_eq!(card.len(), CARD_SIZE);
        w.write_all(card.as_bytes())?;
        written += CARD_SIZE;
    }
    pad_block(&mut w, written, b' ')?;

    written = 0;
    for &v in data.iter() {
        w.write_f32::<BigEndian>(v)?;
        written += 4;
    }
    pad_block(&mut w, written, 0)?;

    w.flush()?;
    Ok(())
}

fn pad_block(w: &mut impl Write, written: usize, fill: u8) -> Result<()> {
    let rem = written % BLOCK_SIZE;
    if rem != 0 {
        w.write_all(&vec![fill; BLOCK_SIZE - rem])?;
    }
    Ok(())
}

fn format_value(value: &CardValue) -> String {
    match value {
        CardValue::Logical(true) => "T".into(),
        CardValue::Logical(false) => "F".into(),
        CardValue::Integer(v) => v.to_string(),
        CardValue::Real(v) => format_real(*v),
        CardValue::Text(s) => {
            let escaped = s.replace('\'', "''");
            format!("'{escaped:<8}'")
        }
    }
}

/// Format a real with enough digits for Julian dates, without trailing
/// zero noise.
fn format_real(v: f64) -> String {
    let mut s = format!("{v:.10}");
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.push('0');
    }
    s
}

fn format_card(key: &str, value: &str, comment: Option<&str>) -> String {
    let mut card = format!("{key:<8}= {value:>20}");
    if let Some(c) = comment {
        card.push_str(" / ");
        card.push_str(c);
    }
    card.truncate(CARD_SIZE);
    while card.len() < CARD_SIZE {
        card.push(' ');
    }
    card
}
