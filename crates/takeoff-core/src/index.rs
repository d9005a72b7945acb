//! Sheet index discovery.
//!
//! Scans a small set of candidate pages (page 1, page 2, and anything that
//! advertises itself as a cover/legend/symbols sheet) for the project's
//! drawing index and parses it into `sheet_code -> description` entries.
//! An empty result is an expected outcome, not an error: it lowers
//! downstream confidence but never halts the run.

use tracing::{debug, info};

use crate::geom::group_words_into_lines;
use crate::model::{Page, PageType, SheetIndexEntry};
use crate::pdf::tables::{detect_ruled_tables, Table, TableConfig};
use crate::pdf::{looks_like_sheet_code, DrawingSource, PageGeometry};

/// Headers that mark a column as holding sheet codes.
const CODE_HEADERS: [&str; 5] = ["sheet", "number", "no.", "code", "drawing"];

/// Headers that mark a column as holding descriptions.
const DESCRIPTION_HEADERS: [&str; 3] = ["description", "title", "name"];

/// Score describing how code-like or description-like a column's values
/// are. Built once per candidate column and compared by pure functions;
/// nothing mutates a score after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnScore {
    code_points: u32,
    description_points: u32,
    non_empty: u32,
}

impl ColumnScore {
    fn for_values<'a>(values: impl Iterator<Item = &'a str>) -> ColumnScore {
        let mut code_points = 0;
        let mut description_points = 0;
        let mut non_empty = 0;
        for value in values {
            let v = value.trim();
            if v.is_empty() {
                continue;
            }
            non_empty += 1;
            if looks_like_sheet_code(v) {
                code_points += 2;
            } else if v.len() <= 8 && !v.contains(' ') {
                code_points += 1;
            }
            if v.len() >= 12 || v.split_whitespace().count() >= 2 {
                description_points += 2;
            } else if v.len() >= 8 {
                description_points += 1;
            }
        }
        ColumnScore {
            code_points,
            description_points,
            non_empty,
        }
    }

    fn is_code_column(&self) -> bool {
        self.non_empty >= 2 && self.code_points > self.description_points
    }

    fn is_description_column(&self) -> bool {
        self.non_empty >= 2 && self.description_points > self.code_points
    }
}

/// Discover the drawing index. Returns an ordered entry list; empty when
/// no candidate page yields at least two parsed entries.
pub fn discover_sheet_index(
    pages: &[Page],
    source: &dyn DrawingSource,
    warnings: &mut Vec<String>,
) -> Vec<SheetIndexEntry> {
    let candidates: Vec<&Page> = pages.iter().filter(|p| is_candidate(p)).collect();

    for page in candidates {
        let Ok(geo) = source.geometry(page) else {
            continue;
        };

        let from_tables = best_table_entries(&geo);
        if from_tables.len() >= 2 {
            info!(
                page = page.page_number,
                entries = from_tables.len(),
                "sheet index parsed from ruled table"
            );
            return from_tables;
        }

        let from_lines = parse_index_lines(&geo);
        if from_lines.len() >= 2 {
            info!(
                page = page.page_number,
                entries = from_lines.len(),
                "sheet index parsed from line patterns"
            );
            return from_lines;
        }
        debug!(page = page.page_number, "candidate page yielded no index");
    }

    warnings.push("no sheet index found; page classification relies on title blocks".into());
    Vec::new()
}

fn is_candidate(page: &Page) -> bool {
    if page.page_number <= 2 {
        return true;
    }
    let mut haystack = page.sheet_title.to_lowercase();
    if let Some(code) = &page.sheet_code {
        haystack.push(' ');
        haystack.push_str(&code.to_lowercase());
    }
    if let Some(name) = page.source_path.file_stem().and_then(|s| s.to_str()) {
        haystack.push(' ');
        haystack.push_str(&name.to_lowercase());
    }
    ["cover", "legend", "symbol", "index", "title sheet"]
        .iter()
        .any(|kw| haystack.contains(kw))
}

/// Parse every ruled table on the page, keep the one with the most
/// entries.
fn best_table_entries(geo: &PageGeometry) -> Vec<SheetIndexEntry> {
    let tables = detect_ruled_tables(&geo.words, &geo.segments, None, &TableConfig::default());
    tables
        .iter()
        .map(parse_index_table)
        .max_by_key(|entries| entries.len())
        .unwrap_or_default()
}

fn parse_index_table(table: &Table) -> Vec<SheetIndexEntry> {
    let n_cols = table.rows.first().map(|r| r.len()).unwrap_or(0);
    if n_cols < 2 || table.rows.len() < 2 {
        return Vec::new();
    }

    let header_row = &table.rows[0];
    let header_code_col = find_header_column(header_row, &CODE_HEADERS);
    let header_desc_col = find_header_column(header_row, &DESCRIPTION_HEADERS);
    let headers_present = header_code_col.is_some() || header_desc_col.is_some();
    let data_start = usize::from(headers_present);

    let scores: Vec<ColumnScore> = (0..n_cols)
        .map(|c| {
            ColumnScore::for_values(
                table.rows[data_start..]
                    .iter()
                    .filter_map(|row| row.get(c).map(String::as_str)),
            )
        })
        .collect();

    // Statistical column scoring only applies to headerless tables. A
    // labeled table without a code-labeled column is some other schedule
    // (fixtures, equipment), not the drawing index.
    let code_col = if headers_present {
        header_code_col
    } else {
        scores
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_code_column())
            .max_by_key(|(_, s)| s.code_points)
            .map(|(c, _)| c)
    };
    let Some(code_col) = code_col else {
        return Vec::new();
    };

    let desc_col = header_desc_col.or_else(|| {
        scores
            .iter()
            .enumerate()
            .filter(|(c, s)| *c != code_col && s.is_description_column())
            .max_by_key(|(_, s)| s.description_points)
            .map(|(c, _)| c)
    });
    let Some(desc_col) = desc_col else {
        return Vec::new();
    };

    table.rows[data_start..]
        .iter()
        .filter_map(|row| {
            let code = row.get(code_col)?.trim();
            let description = row.get(desc_col)?.trim();
            entry_from(code, description)
        })
        .collect()
}

fn find_header_column(header_row: &[String], labels: &[&str]) -> Option<usize> {
    header_row.iter().position(|cell| {
        let lower = cell.to_lowercase();
        labels.iter().any(|l| lower.contains(l))
    })
}

/// Line-pattern fallback over raw page text. Tries code-then-description,
/// description-then-code, and embedded mid-line codes; the pattern with
/// the most hits wins so one page does not mix conventions.
fn parse_index_lines(geo: &PageGeometry) -> Vec<SheetIndexEntry> {
    let lines = group_words_into_lines(&geo.words, 3.0);

    let mut code_first: Vec<SheetIndexEntry> = Vec::new();
    let mut code_last: Vec<SheetIndexEntry> = Vec::new();
    let mut embedded: Vec<SheetIndexEntry> = Vec::new();

    for line in &lines {
        let tokens: Vec<&str> = line.words.iter().map(|w| w.text.as_str()).collect();
        if tokens.len() < 2 {
            continue;
        }

        let first = tokens[0].trim_end_matches([':', '.', '-']);
        let last = tokens[tokens.len() - 1];

        if looks_like_sheet_code(first) {
            let desc = tokens[1..].join(" ");
            if let Some(e) = entry_from(first, &desc) {
                code_first.push(e);
            }
            continue;
        }
        if looks_like_sheet_code(last) {
            let desc = tokens[..tokens.len() - 1].join(" ");
            if let Some(e) = entry_from(last, &desc) {
                code_last.push(e);
            }
            continue;
        }
        // Embedded: a code token mid-line, description following it.
        if let Some(pos) = tokens
            .iter()
            .skip(1)
            .position(|t| looks_like_sheet_code(t))
            .map(|p| p + 1)
        {
            if tokens.len() - pos >= 3 {
                let desc = tokens[pos + 1..].join(" ");
                if let Some(e) = entry_from(tokens[pos], &desc) {
                    embedded.push(e);
                }
            }
        }
    }

    let best = [code_first, code_last, embedded]
        .into_iter()
        .max_by_key(|v| v.len())
        .unwrap_or_default();
    if best.len() >= 2 {
        best
    } else {
        Vec::new()
    }
}

fn entry_from(code: &str, description: &str) -> Option<SheetIndexEntry> {
    let code = code.trim();
    let description = description.trim();
    if !looks_like_sheet_code(code) || description.len() < 4 {
        return None;
    }
    // Index rows describe drawings; a "description" that is itself a code
    // is a column mixup.
    if looks_like_sheet_code(description) {
        return None;
    }
    // Digit-heavy "descriptions" come from data tables (sizes, voltages),
    // not from a drawing index.
    let tokens: Vec<&str> = description.split_whitespace().collect();
    let digit_tokens = tokens
        .iter()
        .filter(|t| t.chars().any(|c| c.is_ascii_digit()))
        .count();
    if digit_tokens * 2 > tokens.len() {
        return None;
    }
    Some(SheetIndexEntry {
        sheet_code: code.to_uppercase(),
        description: description.to_string(),
        inferred_type: PageType::from_description(description),
    })
}

/// Lookup table from a discovered index.
pub fn index_lookup(entries: &[SheetIndexEntry]) -> std::collections::HashMap<String, &SheetIndexEntry> {
    entries
        .iter()
        .map(|e| (e.sheet_code.to_uppercase(), e))
        .collect()
}
