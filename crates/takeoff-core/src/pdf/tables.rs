//! Table reconstruction from page geometry.
//!
//! Two strategies, tried in this order by callers:
//! 1. Ruled-line extraction — cluster horizontal/vertical rules into a
//!    grid and drop words into the cells.
//! 2. Text-position detection — no rules, columns inferred from X-start
//!    positions that repeat across rows.

use std::collections::HashSet;

use crate::geom::{group_words_into_lines, Rect, Segment, Word};

/// A reconstructed table. `rows[r][c]` is the cell text; multi-line cell
/// content keeps its line breaks.
#[derive(Debug, Clone)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
    pub bbox: Rect,
}

impl Table {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Tuning knobs for both strategies.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Rules shorter than this are ignored (tick marks, arrowheads).
    pub min_rule_len: f32,
    /// Axis-alignment tolerance for calling a segment horizontal/vertical.
    pub axis_tolerance: f32,
    /// Two rule positions closer than this merge into one boundary.
    pub merge_distance: f32,
    /// Gap between consecutive row boundaries, as a multiple of the
    /// median row height, that splits one grid into two tables.
    pub table_split_factor: f32,
    /// Text-position detection: minimum rows and columns.
    pub min_rows: usize,
    pub min_columns: usize,
    /// Fraction of rows that must align with a candidate column.
    pub min_alignment_ratio: f32,
    /// Minimum horizontal gap between detected columns.
    pub min_column_gap: f32,
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig {
            min_rule_len: 18.0,
            axis_tolerance: 1.5,
            merge_distance: 3.0,
            table_split_factor: 3.0,
            min_rows: 2,
            min_columns: 2,
            min_alignment_ratio: 0.5,
            min_column_gap: 12.0,
        }
    }
}

/// Extract every ruled grid on the page (or within `region` when given).
pub fn detect_ruled_tables(
    words: &[Word],
    segments: &[Segment],
    region: Option<&Rect>,
    config: &TableConfig,
) -> Vec<Table> {
    let in_region = |x: f32, y: f32| region.map(|r| r.contains(x, y)).unwrap_or(true);

    let mut h_rules: Vec<&Segment> = Vec::new();
    let mut v_rules: Vec<&Segment> = Vec::new();
    for seg in segments {
        if seg.len() < config.min_rule_len {
            continue;
        }
        let (mx, my) = seg.midpoint();
        if !in_region(mx, my) {
            continue;
        }
        if seg.is_horizontal(config.axis_tolerance) {
            h_rules.push(seg);
        } else if seg.is_vertical(config.axis_tolerance) {
            v_rules.push(seg);
        }
    }

    let row_bounds = merge_positions(h_rules.iter().map(|s| s.y0), config.merge_distance);
    let col_bounds = merge_positions(v_rules.iter().map(|s| s.x0), config.merge_distance);
    if row_bounds.len() < 3 || col_bounds.len() < 3 {
        return Vec::new();
    }

    // Split the row boundaries into bands: a much-larger-than-typical gap
    // means two stacked tables sharing column rules.
    let bands = split_into_bands(&row_bounds, config.table_split_factor);

    let mut tables = Vec::new();
    for band in bands {
        if band.len() < 3 {
            continue;
        }
        if let Some(table) = build_grid(words, &band, &col_bounds) {
            tables.push(table);
        }
    }
    tables
}

/// Merge scalar positions within `distance` of each other, returning the
/// sorted cluster means.
fn merge_positions(values: impl Iterator<Item = f32>, distance: f32) -> Vec<f32> {
    let mut sorted: Vec<f32> = values.collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut merged: Vec<f32> = Vec::new();
    let mut cluster: Vec<f32> = Vec::new();
    for v in sorted {
        match cluster.last() {
            Some(&last) if (v - last) <= distance => cluster.push(v),
            _ => {
                if !cluster.is_empty() {
                    merged.push(cluster.iter().sum::<f32>() / cluster.len() as f32);
                }
                cluster = vec![v];
            }
        }
    }
    if !cluster.is_empty() {
        merged.push(cluster.iter().sum::<f32>() / cluster.len() as f32);
    }
    merged
}

fn split_into_bands(row_bounds: &[f32], split_factor: f32) -> Vec<Vec<f32>> {
    if row_bounds.len() < 2 {
        return vec![row_bounds.to_vec()];
    }
    let mut gaps: Vec<f32> = row_bounds.windows(2).map(|w| w[1] - w[0]).collect();
    gaps.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median_gap = gaps[gaps.len() / 2];

    let mut bands: Vec<Vec<f32>> = vec![vec![row_bounds[0]]];
    for w in row_bounds.windows(2) {
        if (w[1] - w[0]) > median_gap * split_factor {
            bands.push(Vec::new());
        }
        if let Some(band) = bands.last_mut() {
            band.push(w[1]);
        }
    }
    bands
}

/// Fill a grid defined by boundary positions with the words that land in
/// each cell. Row 0 is the topmost row.
fn build_grid(words: &[Word], row_bounds: &[f32], col_bounds: &[f32]) -> Option<Table> {
    let bbox = Rect::new(
        *col_bounds.first()?,
        *row_bounds.first()?,
        *col_bounds.last()?,
        *row_bounds.last()?,
    );

    let n_rows = row_bounds.len() - 1;
    let n_cols = col_bounds.len() - 1;
    let mut cells: Vec<Vec<Vec<Word>>> = vec![vec![Vec::new(); n_cols]; n_rows];

    for word in words {
        let (cx, cy) = word.center();
        if !bbox.contains(cx, cy) {
            continue;
        }
        // Rows are numbered top-down while boundaries are sorted
        // bottom-up in the y-up frame.
        let band = row_bounds.windows(2).position(|w| cy >= w[0] && cy < w[1]);
        let col = col_bounds.windows(2).position(|w| cx >= w[0] && cx < w[1]);
        if let (Some(band), Some(col)) = (band, col) {
            cells[n_rows - 1 - band][col].push(word.clone());
        }
    }

    let rows: Vec<Vec<String>> = cells
        .into_iter()
        .map(|row| row.into_iter().map(cell_text).collect())
        .collect();

    // A grid where nothing landed is rule noise, not a table.
    if rows
        .iter()
        .all(|row| row.iter().all(|cell| cell.is_empty()))
    {
        return None;
    }

    Some(Table { rows, bbox })
}

fn cell_text(mut words: Vec<Word>) -> String {
    if words.is_empty() {
        return String::new();
    }
    words.sort_by(|a, b| {
        b.y.partial_cmp(&a.y)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_y = words[0].y;
    for word in &words {
        if (word.y - current_y).abs() > word.height.max(2.0) * 0.6 {
            lines.push(std::mem::take(&mut current));
            current_y = word.y;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word.text);
    }
    lines.push(current);
    lines.join("\n")
}

/// Text-position table detection for tables drawn without rules.
///
/// Columns are X-start positions that at least `min_alignment_ratio` of
/// the rows share; each word line becomes a row with words assigned to
/// the nearest column at or left of their start.
pub fn detect_text_table(words: &[Word], region: Option<&Rect>, config: &TableConfig) -> Option<Table> {
    let scoped: Vec<Word> = words
        .iter()
        .filter(|w| {
            region
                .map(|r| {
                    let (cx, cy) = w.center();
                    r.contains(cx, cy)
                })
                .unwrap_or(true)
        })
        .cloned()
        .collect();
    if scoped.is_empty() {
        return None;
    }

    let median_size = median_font_size(&scoped);
    let lines = group_words_into_lines(&scoped, median_size * 0.6);
    if lines.len() < config.min_rows {
        return None;
    }

    // Vote for column positions: one vote per rounded X bucket per row.
    let mut votes: Vec<(i32, f32)> = Vec::new();
    for line in &lines {
        let mut seen: HashSet<i32> = HashSet::new();
        for word in &line.words {
            let bucket = (word.x / 4.0).round() as i32;
            if seen.insert(bucket) {
                votes.push((bucket, word.x));
            }
        }
    }
    let min_votes = ((lines.len() as f32) * config.min_alignment_ratio).ceil() as usize;

    let mut buckets: Vec<(i32, Vec<f32>)> = Vec::new();
    votes.sort_by_key(|(b, _)| *b);
    for (bucket, x) in votes {
        match buckets.last_mut() {
            Some((last, xs)) if *last == bucket => xs.push(x),
            _ => buckets.push((bucket, vec![x])),
        }
    }

    let mut columns: Vec<f32> = Vec::new();
    for (_, xs) in buckets {
        if xs.len() < min_votes {
            continue;
        }
        let mean = xs.iter().sum::<f32>() / xs.len() as f32;
        if let Some(&last) = columns.last() {
            if (mean - last) < config.min_column_gap {
                continue;
            }
        }
        columns.push(mean);
    }
    if columns.len() < config.min_columns {
        return None;
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut x_min = f32::INFINITY;
    let mut x_max = f32::NEG_INFINITY;
    let mut y_min = f32::INFINITY;
    let mut y_max = f32::NEG_INFINITY;
    for line in &lines {
        let mut cells = vec![String::new(); columns.len()];
        for word in &line.words {
            let col = columns
                .iter()
                .rposition(|&c| word.x >= c - config.min_column_gap / 2.0)
                .unwrap_or(0);
            if !cells[col].is_empty() {
                cells[col].push(' ');
            }
            cells[col].push_str(&word.text);
            x_min = x_min.min(word.x);
            x_max = x_max.max(word.x + word.width);
            y_min = y_min.min(word.y);
            y_max = y_max.max(word.y + word.height);
        }
        rows.push(cells);
    }

    Some(Table {
        rows,
        bbox: Rect::new(x_min, y_min, x_max, y_max),
    })
}

fn median_font_size(words: &[Word]) -> f32 {
    let mut sizes: Vec<f32> = words.iter().map(|w| w.font_size.max(1.0)).collect();
    sizes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sizes[sizes.len() / 2]
}
