//! Document loading: one multi-page PDF or a folder of single-page PDFs
//! in, ordered [`Page`]s with geometry access out.

pub mod backend;
pub mod content;
pub mod tables;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::TakeoffError;
use crate::geom::{group_words_into_lines, Rect, Segment, Word};
use crate::model::Page;

/// Everything extracted from one physical page, in the zero-origin
/// page-point frame.
#[derive(Debug, Clone, Default)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub words: Vec<Word>,
    pub segments: Vec<Segment>,
    /// Raw content-stream size in bytes; very large streams mark dense
    /// vector drawings whose slow text fallbacks should be skipped.
    pub content_len: usize,
}

impl PageGeometry {
    /// Words whose center falls inside `region`.
    pub fn words_in(&self, region: &Rect) -> Vec<&Word> {
        self.words
            .iter()
            .filter(|w| {
                let (cx, cy) = w.center();
                region.contains(cx, cy)
            })
            .collect()
    }

    /// All word text concatenated in reading order.
    pub fn full_text(&self) -> String {
        group_words_into_lines(&self.words, 3.0)
            .iter()
            .map(|l| l.text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The seam between the pipeline and its input. The production
/// implementation is [`PdfSource`]; tests inject prebuilt geometry.
pub trait DrawingSource: Send + Sync {
    /// Ordered page skeletons (codes and types unresolved).
    fn pages(&self) -> Result<Vec<Page>, TakeoffError>;

    /// Geometry for the physical page behind `page`. Virtual pages share
    /// their parent's geometry.
    fn geometry(&self, page: &Page) -> Result<Arc<PageGeometry>, TakeoffError>;

    /// Name of this source (for diagnostics).
    fn source_name(&self) -> &str;
}

/// PDF-backed [`DrawingSource`]. Eagerly parses every page at open time
/// so later stages can run in parallel over immutable geometry.
#[derive(Debug)]
pub struct PdfSource {
    root: PathBuf,
    pages: Vec<Page>,
    geometry: HashMap<(PathBuf, usize), Arc<PageGeometry>>,
}

impl PdfSource {
    /// Open a single multi-page PDF or a folder of PDFs (sorted by file
    /// name, each contributing its pages in order).
    pub fn open(path: &Path) -> Result<Self, TakeoffError> {
        let files = collect_pdf_files(path)?;
        if files.is_empty() {
            return Err(TakeoffError::EmptySource(path.to_path_buf()));
        }

        let mut pages = Vec::new();
        let mut geometry = HashMap::new();
        let mut page_number = 1usize;

        for file in &files {
            let doc = backend::LoadedDoc::open(file)?;
            for (pdf_index, page_id) in doc.page_ids().into_iter().enumerate() {
                let geo = extract_geometry(&doc, page_id).unwrap_or_else(|e| {
                    warn!(page = page_number, error = %e, "page extraction failed, continuing with empty geometry");
                    PageGeometry::default()
                });

                let mut page = Page::new(page_number, file.clone(), pdf_index);
                if let Some(code) = read_title_block_code(&geo) {
                    debug!(page = page_number, code = %code, "title block sheet code");
                    page.sheet_code = Some(code);
                }
                page.sheet_title = read_title_block_title(&geo);

                geometry.insert((file.clone(), pdf_index), Arc::new(geo));
                pages.push(page);
                page_number += 1;
            }
        }

        if pages.is_empty() {
            return Err(TakeoffError::EmptySource(path.to_path_buf()));
        }

        Ok(PdfSource {
            root: path.to_path_buf(),
            pages,
            geometry,
        })
    }
}

impl DrawingSource for PdfSource {
    fn pages(&self) -> Result<Vec<Page>, TakeoffError> {
        Ok(self.pages.clone())
    }

    fn geometry(&self, page: &Page) -> Result<Arc<PageGeometry>, TakeoffError> {
        self.geometry
            .get(&(page.source_path.clone(), page.pdf_page_index))
            .cloned()
            .ok_or_else(|| {
                TakeoffError::Extraction(format!(
                    "no geometry for {} page {}",
                    page.source_path.display(),
                    page.pdf_page_index
                ))
            })
    }

    fn source_name(&self) -> &str {
        self.root.to_str().unwrap_or("pdf")
    }
}

fn collect_pdf_files(path: &Path) -> Result<Vec<PathBuf>, TakeoffError> {
    let meta = std::fs::metadata(path).map_err(|e| TakeoffError::SourceUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if meta.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(path)
        .map_err(|e| TakeoffError::SourceUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

fn extract_geometry(
    doc: &backend::LoadedDoc,
    page_id: backend::PageId,
) -> Result<PageGeometry, TakeoffError> {
    let (llx, lly, width, height) = doc.page_box(page_id)?;
    let raw = doc.page_content(page_id)?;
    let content_len = raw.len();
    let decoded = doc.decode_content(&raw)?;
    let fonts = doc.page_fonts(page_id);
    let items = content::walk_content(&decoded, &fonts, (llx, lly));
    Ok(PageGeometry {
        width,
        height,
        words: items.words,
        segments: items.segments,
        content_len,
    })
}

/// Best-effort sheet-code read from the title block (bottom-right corner).
///
/// Looks for a short drawing-number pattern, preferring the largest font
/// and the lowest position — the sheet number cell is conventionally the
/// corner-most, biggest text in the block.
pub fn read_title_block_code(geo: &PageGeometry) -> Option<String> {
    if geo.words.is_empty() || geo.width <= 0.0 {
        return None;
    }
    let region = Rect::new(geo.width * 0.75, 0.0, geo.width, geo.height * 0.20);
    let code_re = sheet_code_regex();

    let mut best: Option<(&Word, f32)> = None;
    for word in geo.words_in(&region) {
        let text = word.text.trim_end_matches([':', '.']);
        if !code_re.is_match(text) {
            continue;
        }
        // Score: big fonts first, low-on-page breaks ties.
        let score = word.font_size * 10.0 - word.y * 0.01;
        if best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((word, score));
        }
    }
    best.map(|(w, _)| w.text.trim_end_matches([':', '.']).to_string())
}

/// The short alphanumeric drawing-identifier shape: "E601", "E1.1",
/// "ED101", "CS", "A-101".
pub fn sheet_code_regex() -> Regex {
    Regex::new(r"^[A-Z]{1,3}-?\d{0,4}(\.\d{1,2})?[A-Z]?$").expect("static regex")
}

/// True when `text` plausibly is a sheet code (and not a plain word).
pub fn looks_like_sheet_code(text: &str) -> bool {
    let t = text.trim();
    if t.len() < 2 || t.len() > 8 {
        return false;
    }
    // Pure alphabetic strings only qualify at discipline-prefix length
    // ("CS", "E"), otherwise ordinary words like "AND" slip through.
    if t.chars().all(|c| c.is_ascii_alphabetic()) && t.len() > 2 {
        return false;
    }
    sheet_code_regex().is_match(t)
}

/// Best-effort sheet title: the longest multi-word line in the title
/// block region.
fn read_title_block_title(geo: &PageGeometry) -> String {
    if geo.words.is_empty() || geo.width <= 0.0 {
        return String::new();
    }
    let region = Rect::new(geo.width * 0.75, 0.0, geo.width, geo.height * 0.25);
    let words: Vec<Word> = geo.words_in(&region).into_iter().cloned().collect();
    group_words_into_lines(&words, 3.0)
        .iter()
        .filter(|l| l.words.len() >= 2)
        .map(|l| l.text())
        .max_by_key(|t| t.len())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_sheet_code() {
        for good in ["E601", "E1.1", "ED101", "CS", "A-101", "E101A"] {
            assert!(looks_like_sheet_code(good), "{good} should match");
        }
        for bad in ["NOTES", "SCHEDULE", "AND", "2x4", "A", "", "THE-LONG-ONE"] {
            assert!(!looks_like_sheet_code(bad), "{bad} should not match");
        }
    }

    #[test]
    fn test_title_block_code_prefers_large_font() {
        let mut geo = PageGeometry {
            width: 1000.0,
            height: 800.0,
            ..PageGeometry::default()
        };
        geo.words.push(Word {
            text: "E101".into(),
            x: 900.0,
            y: 20.0,
            width: 40.0,
            height: 24.0,
            font_size: 24.0,
        });
        geo.words.push(Word {
            text: "E1".into(),
            x: 900.0,
            y: 100.0,
            width: 12.0,
            height: 6.0,
            font_size: 6.0,
        });
        assert_eq!(read_title_block_code(&geo).as_deref(), Some("E101"));
    }

    #[test]
    fn test_title_block_code_outside_region_ignored() {
        let mut geo = PageGeometry {
            width: 1000.0,
            height: 800.0,
            ..PageGeometry::default()
        };
        // Top-left corner: not the title block.
        geo.words.push(Word {
            text: "E101".into(),
            x: 10.0,
            y: 780.0,
            width: 40.0,
            height: 12.0,
            font_size: 12.0,
        });
        assert_eq!(read_title_block_code(&geo), None);
    }
}
