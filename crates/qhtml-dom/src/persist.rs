//! Compact text persistence of a document.
//!
//! `serialize` stacks three stages on top of the canonical byte
//! encoding: LZW over 8-bit symbols, base-128 varint packing of the
//! code stream, and standard base64 under a fixed format prefix.
//! `deserialize` reverses each stage exactly; any damage is a hard
//! error, never a partial tree.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::document::Document;
use crate::encode::{self, DecodeError};

/// Leading marker of every serialized payload.
pub const FORMAT_PREFIX: &str = "qhtmlz1:";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistError {
    #[error("payload does not carry the 'qhtmlz1:' prefix")]
    BadPrefix,

    #[error("payload ends in the middle of a value")]
    TruncatedStream,

    #[error("dictionary code {code} out of range")]
    InvalidCode { code: u32 },

    #[error("corrupt payload: {0}")]
    Corrupt(&'static str),
}

impl From<DecodeError> for PersistError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Truncated => PersistError::TruncatedStream,
            DecodeError::Corrupt(what) => PersistError::Corrupt(what),
        }
    }
}

pub fn serialize(doc: &Document) -> String {
    let bytes = encode::encode_document(doc);
    let codes = lzw_compress(&bytes);
    let packed = pack_codes(&codes);
    tracing::debug!(
        bytes = bytes.len(),
        codes = codes.len(),
        packed = packed.len(),
        "serialized document"
    );
    format!("{FORMAT_PREFIX}{}", STANDARD.encode(packed))
}

pub fn deserialize(text: &str) -> Result<Document, PersistError> {
    let payload = text
        .strip_prefix(FORMAT_PREFIX)
        .ok_or(PersistError::BadPrefix)?;
    let packed = STANDARD
        .decode(payload)
        .map_err(|_| PersistError::Corrupt("invalid base64"))?;
    let codes = unpack_codes(&packed)?;
    let bytes = lzw_decompress(&codes)?;
    Ok(encode::decode_document(&bytes)?)
}

fn lzw_compress(bytes: &[u8]) -> Vec<u32> {
    let mut dict: HashMap<Vec<u8>, u32> = HashMap::with_capacity(512);
    for i in 0..=255u8 {
        dict.insert(vec![i], i as u32);
    }
    let mut codes = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    // Code of `current`; meaningful only while `current` is non-empty.
    let mut current_code = 0u32;
    for &byte in bytes {
        current.push(byte);
        match dict.get(&current) {
            Some(&code) => current_code = code,
            None => {
                codes.push(current_code);
                let next_code = dict.len() as u32;
                dict.insert(std::mem::take(&mut current), next_code);
                current.push(byte);
                current_code = byte as u32;
            }
        }
    }
    if !current.is_empty() {
        codes.push(current_code);
    }
    codes
}

fn lzw_decompress(codes: &[u32]) -> Result<Vec<u8>, PersistError> {
    let Some((&first, rest)) = codes.split_first() else {
        return Ok(Vec::new());
    };
    if first >= 256 {
        return Err(PersistError::InvalidCode { code: first });
    }
    let mut dict: Vec<Vec<u8>> = (0u32..256).map(|i| vec![i as u8]).collect();
    let mut previous = vec![first as u8];
    let mut out = previous.clone();
    for &code in rest {
        let entry = if (code as usize) < dict.len() {
            dict[code as usize].clone()
        } else if code as usize == dict.len() {
            // The code defined by this very step: previous + its own
            // first byte.
            let mut entry = previous.clone();
            entry.push(previous[0]);
            entry
        } else {
            return Err(PersistError::InvalidCode { code });
        };
        out.extend_from_slice(&entry);
        let mut defined = previous;
        defined.push(entry[0]);
        dict.push(defined);
        previous = entry;
    }
    Ok(out)
}

fn pack_codes(codes: &[u32]) -> Vec<u8> {
    let mut packed = Vec::with_capacity(codes.len() * 2);
    for &code in codes {
        let mut v = code;
        loop {
            let mut byte = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                byte |= 0x80;
            }
            packed.push(byte);
            if v == 0 {
                break;
            }
        }
    }
    packed
}

fn unpack_codes(packed: &[u8]) -> Result<Vec<u32>, PersistError> {
    let mut codes = Vec::new();
    let mut iter = packed.iter();
    while let Some(&byte) = iter.next() {
        let mut result = (byte & 0x7f) as u32;
        let mut shift = 7;
        let mut byte = byte;
        while byte & 0x80 != 0 {
            byte = *iter.next().ok_or(PersistError::TruncatedStream)?;
            if shift >= 32 || (shift == 28 && byte & 0x7f > 0x0f) {
                return Err(PersistError::Corrupt("code varint overflow"));
            }
            result |= ((byte & 0x7f) as u32) << shift;
            shift += 7;
        }
        codes.push(result);
    }
    Ok(codes)
}
