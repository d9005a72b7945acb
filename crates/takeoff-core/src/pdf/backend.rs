//! Thin wrapper over `lopdf` isolating the rest of the crate from its
//! object model. One [`LoadedDoc`] per physical PDF file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use lopdf::content::Content;

use crate::error::TakeoffError;

/// Mirrors `lopdf::ObjectId`: (object number, generation number).
pub type PageId = (u32, u16);

/// Font facts needed by the text walker, resolved per resource key.
#[derive(Debug, Clone)]
pub struct FontInfo {
    /// Resource-dictionary key (e.g. `b"F1"`).
    pub key: Vec<u8>,
    pub base_font: Option<String>,
    pub encoding: Option<String>,
}

pub struct LoadedDoc {
    doc: lopdf::Document,
    path: PathBuf,
}

impl LoadedDoc {
    pub fn open(path: &Path) -> Result<Self, TakeoffError> {
        let doc = lopdf::Document::load(path).map_err(|e| TakeoffError::PdfParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if doc.is_encrypted() {
            return Err(TakeoffError::Encrypted(path.to_path_buf()));
        }
        Ok(LoadedDoc {
            doc,
            path: path.to_path_buf(),
        })
    }

    pub fn from_bytes(data: &[u8], path: &Path) -> Result<Self, TakeoffError> {
        let doc = lopdf::Document::load_mem(data).map_err(|e| TakeoffError::PdfParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if doc.is_encrypted() {
            return Err(TakeoffError::Encrypted(path.to_path_buf()));
        }
        Ok(LoadedDoc {
            doc,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Page ids in document order (lopdf keys them by 1-based number).
    pub fn page_ids(&self) -> Vec<PageId> {
        self.doc.get_pages().values().copied().collect()
    }

    /// MediaBox as `(llx, lly, width, height)`. The lower-left origin is
    /// needed once, to normalize the page frame to (0,0).
    pub fn page_box(&self, page: PageId) -> Result<(f32, f32, f32, f32), TakeoffError> {
        let dict = self
            .doc
            .get_object(page)
            .ok()
            .and_then(|o| o.as_dict().ok())
            .ok_or_else(|| self.parse_err("page object is not a dictionary"))?;

        let media_box = self
            .find_media_box(dict)
            .ok_or_else(|| self.parse_err("MediaBox not found"))?;

        let nums: Vec<f32> = media_box.iter().filter_map(|o| as_number(o)).collect();
        if nums.len() < 4 {
            return Err(self.parse_err("MediaBox has fewer than 4 numbers"));
        }
        Ok((nums[0], nums[1], nums[2] - nums[0], nums[3] - nums[1]))
    }

    /// Raw decompressed content-stream bytes for a page.
    pub fn page_content(&self, page: PageId) -> Result<Vec<u8>, TakeoffError> {
        self.doc
            .get_page_content(page)
            .map_err(|e| self.parse_err(&format!("cannot get page content: {e}")))
    }

    pub fn decode_content(&self, data: &[u8]) -> Result<Content, TakeoffError> {
        Content::decode(data).map_err(|e| self.parse_err(&format!("content decode error: {e}")))
    }

    /// Font info per resource key for a page. Missing resources are not
    /// an error; the walker falls back to generic decoding.
    pub fn page_fonts(&self, page: PageId) -> Vec<FontInfo> {
        let Ok(fonts) = self.doc.get_page_fonts(page) else {
            return Vec::new();
        };
        fonts
            .iter()
            .map(|(key, dict)| FontInfo {
                key: key.clone(),
                base_font: dict
                    .get(b"BaseFont")
                    .ok()
                    .and_then(|o| o.as_name().ok())
                    .map(|n| String::from_utf8_lossy(n).into_owned()),
                encoding: dict.get(b"Encoding").ok().and_then(|o| match o {
                    lopdf::Object::Name(n) => Some(String::from_utf8_lossy(n).into_owned()),
                    _ => None,
                }),
            })
            .collect()
    }

    fn parse_err(&self, reason: &str) -> TakeoffError {
        TakeoffError::PdfParse {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    /// MediaBox may live on an ancestor node of the page tree.
    fn find_media_box(&self, dict: &lopdf::Dictionary) -> Option<Vec<lopdf::Object>> {
        if let Ok(obj) = dict.get(b"MediaBox") {
            if let Some(arr) = self.resolve_array(obj) {
                return Some(arr);
            }
        }
        let parent_id = dict.get(b"Parent").ok()?.as_reference().ok()?;
        let parent = self.doc.get_object(parent_id).ok()?.as_dict().ok()?;
        self.find_media_box(parent)
    }

    fn resolve_array(&self, obj: &lopdf::Object) -> Option<Vec<lopdf::Object>> {
        match obj {
            lopdf::Object::Array(arr) => Some(arr.clone()),
            lopdf::Object::Reference(id) => self
                .doc
                .get_object(*id)
                .ok()
                .and_then(|o| o.as_array().ok())
                .cloned(),
            _ => None,
        }
    }
}

/// Numeric operand as f32, accepting integer and real.
pub fn as_number(obj: &lopdf::Object) -> Option<f32> {
    match obj {
        lopdf::Object::Integer(i) => Some(*i as f32),
        lopdf::Object::Real(f) => Some(*f),
        _ => None,
    }
}

/// Best-effort decoding of raw PDF string bytes.
///
/// UTF-16BE with BOM, then UTF-8, then Latin-1 byte mapping.
pub fn decode_text_bytes(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks(2)
            .filter(|c| c.len() == 2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Decode string bytes shown with a specific font. Identity-encoded CID
/// fonts use 2-byte codes that usually map straight to UTF-16BE.
pub fn decode_with_font(bytes: &[u8], font: Option<&FontInfo>) -> String {
    if let Some(info) = font {
        if let Some(enc) = &info.encoding {
            if enc.contains("Identity") && bytes.len() >= 2 && bytes.len() % 2 == 0 {
                let units: Vec<u16> = bytes
                    .chunks(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                let decoded = String::from_utf16_lossy(&units);
                if !decoded.is_empty() && !decoded.chars().all(|c| c == '\u{FFFD}' || c == '\0') {
                    return decoded;
                }
            }
        }
    }
    decode_text_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8() {
        assert_eq!(decode_text_bytes(b"E101 LIGHTING"), "E101 LIGHTING");
    }

    #[test]
    fn test_decode_latin1_fallback() {
        let input: &[u8] = &[0x63, 0x61, 0x66, 0xE9];
        assert_eq!(decode_text_bytes(input), "caf\u{00E9}");
    }

    #[test]
    fn test_decode_utf16be_bom() {
        let input: &[u8] = &[0xFE, 0xFF, 0x00, 0x41, 0x00, 0x31];
        assert_eq!(decode_text_bytes(input), "A1");
    }

    #[test]
    fn test_identity_font_two_byte_codes() {
        let font = FontInfo {
            key: b"F1".to_vec(),
            base_font: Some("ArialMT".into()),
            encoding: Some("Identity-H".into()),
        };
        let input: &[u8] = &[0x00, 0x45, 0x00, 0x31];
        assert_eq!(decode_with_font(input, Some(&font)), "E1");
    }

    #[test]
    fn test_as_number() {
        assert_eq!(as_number(&lopdf::Object::Integer(612)), Some(612.0));
        assert_eq!(as_number(&lopdf::Object::Real(79.25)), Some(79.25));
        assert_eq!(as_number(&lopdf::Object::Null), None);
    }
}
