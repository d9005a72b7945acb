//! Luminaire-schedule table interpretation: header scoring, row mapping,
//! panel-schedule rejection, and the headerless content-signature parser.

use regex::Regex;

use crate::model::FixtureRecord;
use crate::pdf::tables::Table;

/// The nine spec fields a schedule column can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Code,
    Description,
    Style,
    Voltage,
    Mounting,
    Lumens,
    Cct,
    Dimming,
    MaxVa,
}

/// Ranked keyword lists per field. Multi-word kinds are checked before
/// `Code` so "MOUNTING TYPE" maps to mounting, not to the bare "type".
const KIND_KEYWORDS: [(FieldKind, &[&str]); 9] = [
    (FieldKind::Mounting, &["mounting", "mount", "mtg"]),
    (FieldKind::Voltage, &["voltage", "volts", "volt"]),
    (FieldKind::Lumens, &["lumens", "lumen", "delivered lm"]),
    (FieldKind::Cct, &["cct", "color temp", "kelvin", "color temperature"]),
    (FieldKind::Dimming, &["dimming", "dimmable", "driver type", "dim"]),
    (FieldKind::MaxVa, &["max va", "watts", "wattage", "input w", "va", "load"]),
    (
        FieldKind::Description,
        &["description", "luminaire description", "remarks"],
    ),
    (
        FieldKind::Style,
        &["style", "manufacturer", "catalog", "model", "series"],
    ),
    (
        FieldKind::Code,
        &["type", "mark", "symbol", "designation", "tag", "label", "code", "id"],
    ),
];

/// First rows of a panel/equipment schedule carry these; a table whose
/// head matches is electrical distribution, not luminaires.
const PANEL_KEYWORDS: [&str; 9] = [
    "panelboard",
    "breaker",
    "circuit breaker",
    "motor schedule",
    "equipment schedule",
    "kaic",
    "mcb",
    "mlo",
    "poles",
];

/// An explicit luminaire-schedule phrase anywhere in the head accepts the
/// table unconditionally.
const ACCEPT_PHRASES: [&str; 3] = ["luminaire schedule", "fixture schedule", "lighting schedule"];

/// At least two of these must appear somewhere in a headerless table,
/// otherwise the text is likely garbled (reversed custom-font output).
const SANITY_KEYWORDS: [&str; 9] = [
    "led", "fixture", "luminaire", "lamp", "driver", "lens", "housing", "troffer", "downlight",
];

/// Resolved header: which row it is and what each column means.
#[derive(Debug, Clone)]
pub struct HeaderMap {
    pub row_index: usize,
    /// True when two consecutive rows were merged to resolve split
    /// group/sub-column headers.
    pub merged_rows: bool,
    pub columns: Vec<Option<FieldKind>>,
}

impl HeaderMap {
    fn distinct_kinds(&self) -> usize {
        let mut kinds: Vec<FieldKind> = self.columns.iter().flatten().copied().collect();
        kinds.dedup();
        kinds.sort_by_key(|k| *k as usize);
        kinds.dedup();
        kinds.len()
    }

    fn has_code(&self) -> bool {
        self.columns.contains(&Some(FieldKind::Code))
    }

    pub fn code_column(&self) -> Option<usize> {
        self.columns.iter().position(|c| *c == Some(FieldKind::Code))
    }
}

/// Accept/reject the table before any row mapping.
pub fn is_panel_schedule(table: &Table) -> bool {
    let head: String = table
        .rows
        .iter()
        .take(3)
        .flat_map(|row| row.iter())
        .map(|cell| cell.replace('\n', " "))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if ACCEPT_PHRASES.iter().any(|p| head.contains(p)) {
        return false;
    }
    if PANEL_KEYWORDS.iter().any(|k| head.contains(k)) {
        return true;
    }
    // "PANEL <id>" header. The regex crate has no lookaround, so the
    // fixture-description cases are excluded by context instead: "FLAT
    // PANEL" and "PANEL LED" describe luminaires.
    let panel_id = Regex::new(r"\bpanel\b\s+[a-z0-9]{1,6}\b").expect("static regex");
    for m in panel_id.find_iter(&head) {
        let before = &head[..m.start()];
        let matched = m.as_str();
        let flat_before = before.trim_end().ends_with("flat");
        let led_after = matched.ends_with("led") || head[m.end()..].trim_start().starts_with("led");
        if !flat_before && !led_after {
            return true;
        }
    }
    false
}

/// Find the header row within the first 10 rows, optionally merging two
/// consecutive rows. Valid only when at least two distinct fields map and
/// one of them is the code column.
pub fn find_header(table: &Table) -> Option<HeaderMap> {
    let limit = table.rows.len().min(10);
    let mut best: Option<HeaderMap> = None;

    for r in 0..limit {
        let single = map_columns(&table.rows[r]);
        consider(&mut best, HeaderMap {
            row_index: r,
            merged_rows: false,
            columns: single,
        });

        if r + 1 < table.rows.len() {
            let merged_cells: Vec<String> = table.rows[r]
                .iter()
                .zip(table.rows[r + 1].iter())
                .map(|(a, b)| format!("{a} {b}"))
                .collect();
            consider(&mut best, HeaderMap {
                row_index: r,
                merged_rows: true,
                columns: map_columns(&merged_cells),
            });
        }
    }

    best.filter(|h| h.distinct_kinds() >= 2 && h.has_code())
}

fn consider(best: &mut Option<HeaderMap>, candidate: HeaderMap) {
    let score = |h: &HeaderMap| (h.distinct_kinds(), usize::from(!h.merged_rows));
    let better = match best {
        Some(current) => score(&candidate) > score(current),
        None => candidate.distinct_kinds() > 0,
    };
    if better {
        *best = Some(candidate);
    }
}

fn map_columns<S: AsRef<str>>(cells: &[S]) -> Vec<Option<FieldKind>> {
    cells.iter().map(|c| match_kind(c.as_ref())).collect()
}

/// Map one header cell to a field kind by ranked keyword match.
pub fn match_kind(cell: &str) -> Option<FieldKind> {
    let lower = cell.replace('\n', " ").to_lowercase();
    let lower = lower.trim().to_string();
    if lower.is_empty() {
        return None;
    }
    for (kind, keywords) in KIND_KEYWORDS {
        if keywords.iter().any(|kw| contains_word(&lower, kw)) {
            return Some(kind);
        }
    }
    None
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(i, _)| {
        let before_ok = i == 0
            || !haystack[..i]
                .chars()
                .next_back()
                .map(|c| c.is_ascii_alphanumeric())
                .unwrap_or(false);
        let after = i + needle.len();
        let after_ok = after >= haystack.len()
            || !haystack[after..]
                .chars()
                .next()
                .map(|c| c.is_ascii_alphanumeric())
                .unwrap_or(false);
        before_ok && after_ok
    })
}

/// Validate a fixture-code cell: short, alphanumeric with limited
/// punctuation, and not a leaked header word like "TYPE".
pub fn valid_code(cell: &str) -> Option<String> {
    let code = cell.split_whitespace().next()?.trim();
    if code.is_empty() || code.len() > 15 {
        return None;
    }
    if !code.chars().next()?.is_ascii_alphanumeric() {
        return None;
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '/' | '+'))
    {
        return None;
    }
    // A pure 4+ letter word is table-header leakage, not a code.
    if code.len() >= 4 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(code.to_uppercase())
}

/// Recover the merged header+data case: a cell holding "MARK A" (or
/// "MARK\nA") contributes "A" as the first data value once the matched
/// header keyword is stripped.
pub fn strip_header_keyword(cell: &str) -> Option<String> {
    let flattened = cell.replace('\n', " ");
    let mut parts = flattened.splitn(2, char::is_whitespace);
    let first = parts.next()?;
    let rest = parts.next()?.trim();
    if rest.is_empty() {
        return None;
    }
    if match_kind(first).is_some() {
        Some(rest.to_string())
    } else {
        None
    }
}

/// Map data rows below a resolved header into fixture records.
pub fn rows_to_fixtures(table: &Table, header: &HeaderMap) -> Vec<FixtureRecord> {
    let code_col = match header.code_column() {
        Some(c) => c,
        None => return Vec::new(),
    };
    let first_data = header.row_index + if header.merged_rows { 2 } else { 1 };

    let mut fixtures = Vec::new();

    // Merged header+data recovery: the header row's own cells may carry
    // the first data row.
    if let Some(row) = table.rows.get(header.row_index) {
        if let Some(stripped) = row.get(code_col).and_then(|c| strip_header_keyword(c)) {
            if let Some(code) = valid_code(&stripped) {
                let mut rec = FixtureRecord::with_code(code);
                for (c, kind) in header.columns.iter().enumerate() {
                    if c == code_col {
                        continue;
                    }
                    if let (Some(kind), Some(cell)) = (kind, row.get(c)) {
                        if let Some(value) = strip_header_keyword(cell) {
                            assign_field(&mut rec, *kind, &value);
                        }
                    }
                }
                fixtures.push(rec);
            }
        }
    }

    for row in table.rows.iter().skip(first_data) {
        let Some(code) = row.get(code_col).and_then(|c| valid_code(c)) else {
            continue;
        };
        let mut rec = FixtureRecord::with_code(code);
        for (c, kind) in header.columns.iter().enumerate() {
            if c == code_col {
                continue;
            }
            if let (Some(kind), Some(cell)) = (kind, row.get(c)) {
                let value = cell.replace('\n', " ").trim().to_string();
                if !value.is_empty() {
                    assign_field(&mut rec, *kind, &value);
                }
            }
        }
        fixtures.push(rec);
    }

    fixtures
}

pub fn assign_field(rec: &mut FixtureRecord, kind: FieldKind, value: &str) {
    let slot = match kind {
        FieldKind::Code => return,
        FieldKind::Description => &mut rec.description,
        FieldKind::Style => &mut rec.style,
        FieldKind::Voltage => &mut rec.voltage,
        FieldKind::Mounting => &mut rec.mounting,
        FieldKind::Lumens => &mut rec.lumens,
        FieldKind::Cct => &mut rec.cct,
        FieldKind::Dimming => &mut rec.dimming,
        FieldKind::MaxVa => &mut rec.max_va,
    };
    if slot.is_empty() {
        *slot = value.to_string();
    }
}

/// A parsed table whose codes are mostly bare numbers is a panel or
/// circuit schedule that slipped through.
pub fn mostly_numeric_codes(fixtures: &[FixtureRecord]) -> bool {
    if fixtures.is_empty() {
        return false;
    }
    let numeric = fixtures
        .iter()
        .filter(|f| f.code.chars().all(|c| c.is_ascii_digit()))
        .count();
    numeric * 100 >= fixtures.len() * 60
}

/// Headerless fallback: accept rows whose first cell looks like a code,
/// classifying the remaining cells by content signature instead of column
/// position.
pub fn parse_headerless(table: &Table) -> Vec<FixtureRecord> {
    let all_text: String = table
        .rows
        .iter()
        .flat_map(|r| r.iter())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let sanity = SANITY_KEYWORDS
        .iter()
        .filter(|k| all_text.contains(*k))
        .count();
    if sanity < 2 {
        return Vec::new();
    }

    let mut fixtures = Vec::new();
    for row in &table.rows {
        let Some(first) = row.first() else { continue };
        let Some(code) = valid_code(first) else {
            continue;
        };
        let rest: Vec<&String> = row.iter().skip(1).filter(|c| !c.trim().is_empty()).collect();
        if rest.is_empty() && first.split_whitespace().count() < 2 {
            continue;
        }
        let mut rec = FixtureRecord::with_code(code);
        for cell in rest {
            let value = cell.replace('\n', " ").trim().to_string();
            if let Some(kind) = classify_cell(&value) {
                assign_field(&mut rec, kind, &value);
            }
        }
        fixtures.push(rec);
    }
    fixtures
}

/// Content signature of a data cell: what field is this value?
pub fn classify_cell(value: &str) -> Option<FieldKind> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    let lower = v.to_lowercase();

    let voltage = Regex::new(r"^\d{2,3}(/\d{2,3})?\s*v(olts?)?$").expect("static regex");
    if voltage.is_match(&lower) || matches!(lower.as_str(), "120" | "277" | "347" | "480") {
        return Some(FieldKind::Voltage);
    }
    let cct = Regex::new(r"^\d{4}\s*k$").expect("static regex");
    if cct.is_match(&lower) {
        return Some(FieldKind::Cct);
    }
    let lumens = Regex::new(r"^\d{3,6}\s*(lm|lumens?)$").expect("static regex");
    if lumens.is_match(&lower) {
        return Some(FieldKind::Lumens);
    }
    let watts = Regex::new(r"^\d{1,4}(\.\d+)?\s*(w|va|watts?)$").expect("static regex");
    if watts.is_match(&lower) {
        return Some(FieldKind::MaxVa);
    }
    if ["recessed", "surface", "pendant", "wall", "ceiling", "pole", "suspended", "flush"]
        .iter()
        .any(|m| lower.contains(m))
    {
        return Some(FieldKind::Mounting);
    }
    if ["0-10", "dimmable", "dimming", "dali", "triac", "elv"]
        .iter()
        .any(|d| lower.contains(d))
    {
        return Some(FieldKind::Dimming);
    }
    if lower.split_whitespace().count() >= 2 || v.len() >= 12 {
        return Some(FieldKind::Description);
    }
    Some(FieldKind::Style)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Rect;

    fn table(rows: Vec<Vec<&str>>) -> Table {
        Table {
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(String::from).collect())
                .collect(),
            bbox: Rect::new(0.0, 0.0, 100.0, 100.0),
        }
    }

    #[test]
    fn test_round_trip_type_description_voltage() {
        let t = table(vec![
            vec!["TYPE", "DESCRIPTION", "VOLTAGE"],
            vec!["A1", "2x4 TROFFER", "120"],
        ]);
        let header = find_header(&t).unwrap();
        assert_eq!(header.code_column(), Some(0));
        let fixtures = rows_to_fixtures(&t, &header);
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].code, "A1");
        assert_eq!(fixtures[0].description, "2x4 TROFFER");
        assert_eq!(fixtures[0].voltage, "120");
    }

    #[test]
    fn test_header_requires_code_field() {
        let t = table(vec![
            vec!["DESCRIPTION", "VOLTAGE"],
            vec!["2x4 TROFFER", "120"],
        ]);
        assert!(find_header(&t).is_none());
    }

    #[test]
    fn test_merged_two_row_header() {
        // Group header split over two rows: the "ELECTRICAL" group label
        // only resolves once merged with its "VOLTS" sub-column row.
        let t = table(vec![
            vec!["FIXTURE MARK", "DESCRIPTION", "ELECTRICAL"],
            vec!["", "", "VOLTS"],
            vec!["A1", "2x4 LED TROFFER", "120"],
        ]);
        let header = find_header(&t).unwrap();
        assert!(header.merged_rows);
        let fixtures = rows_to_fixtures(&t, &header);
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].voltage, "120");
    }

    #[test]
    fn test_merged_header_and_data_cell_recovered() {
        let t = table(vec![
            vec!["MARK A1", "DESCRIPTION 2x4 TROFFER", "VOLTAGE 120"],
            vec!["B2", "DOWNLIGHT 6IN", "277"],
        ]);
        let header = find_header(&t).unwrap();
        let fixtures = rows_to_fixtures(&t, &header);
        assert_eq!(fixtures.len(), 2);
        assert_eq!(fixtures[0].code, "A1");
        assert_eq!(fixtures[0].description, "2x4 TROFFER");
        assert_eq!(fixtures[1].code, "B2");
    }

    #[test]
    fn test_panel_schedule_rejected() {
        let t = table(vec![
            vec!["PANEL LP1", "120/208V", "225A MLO"],
            vec!["1", "LIGHTS", "20"],
        ]);
        assert!(is_panel_schedule(&t));
    }

    #[test]
    fn test_flat_panel_led_not_rejected() {
        let t = table(vec![
            vec!["TYPE", "DESCRIPTION"],
            vec!["FP1", "2X2 FLAT PANEL LED"],
        ]);
        assert!(!is_panel_schedule(&t));
    }

    #[test]
    fn test_explicit_phrase_accepts_unconditionally() {
        let t = table(vec![
            vec!["LUMINAIRE SCHEDULE", ""],
            vec!["PANEL A", "THIS WOULD OTHERWISE REJECT"],
        ]);
        assert!(!is_panel_schedule(&t));
    }

    #[test]
    fn test_code_validation() {
        assert_eq!(valid_code("A1"), Some("A1".into()));
        assert_eq!(valid_code("al-2"), Some("AL-2".into()));
        assert_eq!(valid_code("F1E"), Some("F1E".into()));
        assert_eq!(valid_code("TYPE"), None);
        assert_eq!(valid_code("MARK"), None);
        assert_eq!(valid_code(""), None);
        assert_eq!(valid_code("THIS-IS-FAR-TOO-LONG"), None);
    }

    #[test]
    fn test_mostly_numeric_codes_rejects() {
        let fixtures: Vec<FixtureRecord> = ["1", "2", "3", "A1"]
            .iter()
            .map(|c| FixtureRecord::with_code(*c))
            .collect();
        assert!(mostly_numeric_codes(&fixtures));
        let ok: Vec<FixtureRecord> = ["A1", "B2", "3"]
            .iter()
            .map(|c| FixtureRecord::with_code(*c))
            .collect();
        assert!(!mostly_numeric_codes(&ok));
    }

    #[test]
    fn test_headerless_content_signatures() {
        let t = table(vec![
            vec!["A1", "LED TROFFER 2X4", "120", "3500 K", "4000 LM"],
            vec!["B2", "LED DOWNLIGHT FIXTURE", "277", "RECESSED", "21W"],
        ]);
        let fixtures = parse_headerless(&t);
        assert_eq!(fixtures.len(), 2);
        assert_eq!(fixtures[0].voltage, "120");
        assert_eq!(fixtures[0].cct, "3500 K");
        assert_eq!(fixtures[0].lumens, "4000 LM");
        assert_eq!(fixtures[1].mounting, "RECESSED");
        assert_eq!(fixtures[1].max_va, "21W");
    }

    #[test]
    fn test_headerless_sanity_keywords_guard() {
        // Garbled text with no lighting vocabulary anywhere.
        let t = table(vec![
            vec!["A1", "XQZPV NRRW", "120"],
            vec!["B2", "ZZKW PQRS", "277"],
        ]);
        assert!(parse_headerless(&t).is_empty());
    }

    #[test]
    fn test_match_kind_ranking() {
        assert_eq!(match_kind("MOUNTING TYPE"), Some(FieldKind::Mounting));
        assert_eq!(match_kind("TYPE"), Some(FieldKind::Code));
        assert_eq!(match_kind("MARK"), Some(FieldKind::Code));
        assert_eq!(match_kind("INPUT WATTS"), Some(FieldKind::MaxVa));
        assert_eq!(match_kind(""), None);
        assert_eq!(match_kind("UNRELATED"), None);
    }
}
