//! Page-space geometry primitives.
//!
//! Every page is normalized to a zero-origin frame at load time: (0,0) is
//! the bottom-left corner and y increases upward (PDF convention). All
//! downstream region math (title blocks, viewport bboxes, exclusion zones)
//! assumes this frame and never re-corrects origins.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Rect {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x0 <= other.x1 && self.x1 >= other.x0 && self.y0 <= other.y1 && self.y1 >= other.y0
    }

    /// Map this page-point rect to a pixel crop box `(left, top, right,
    /// bottom)` for a raster rendered at `dpi`, given the page height in
    /// points. Pixel space has its origin at the top-left, so the y axis
    /// flips here and nowhere else.
    pub fn to_pixel_box(&self, dpi: u32, page_height: f32) -> (u32, u32, u32, u32) {
        let scale = dpi as f32 / 72.0;
        let left = (self.x0 * scale).floor().max(0.0) as u32;
        let right = (self.x1 * scale).ceil() as u32;
        let top = ((page_height - self.y1) * scale).floor().max(0.0) as u32;
        let bottom = ((page_height - self.y0) * scale).ceil() as u32;
        (left, top, right, bottom)
    }
}

/// A single word with its position on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub font_size: f32,
}

impl Word {
    pub fn bbox(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// A straight line segment from the page's vector content. Curves
/// contribute their chord.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Segment {
    pub fn len(&self) -> f32 {
        ((self.x1 - self.x0).powi(2) + (self.y1 - self.y0).powi(2)).sqrt()
    }

    pub fn midpoint(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    pub fn is_horizontal(&self, tolerance: f32) -> bool {
        (self.y1 - self.y0).abs() <= tolerance
    }

    pub fn is_vertical(&self, tolerance: f32) -> bool {
        (self.x1 - self.x0).abs() <= tolerance
    }
}

/// A horizontal run of words sharing (approximately) one baseline.
#[derive(Debug, Clone, Default)]
pub struct WordLine {
    pub words: Vec<Word>,
    pub y: f32,
}

impl WordLine {
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn x_min(&self) -> f32 {
        self.words.iter().map(|w| w.x).fold(f32::INFINITY, f32::min)
    }

    pub fn x_max(&self) -> f32 {
        self.words
            .iter()
            .map(|w| w.x + w.width)
            .fold(f32::NEG_INFINITY, f32::max)
    }
}

/// Group words into horizontal lines by baseline proximity.
///
/// Two words share a line when their Y values differ by no more than
/// `y_tolerance`. Lines come back sorted top-to-bottom (descending Y, the
/// reading order in a y-up frame) with words sorted left-to-right.
pub fn group_words_into_lines(words: &[Word], y_tolerance: f32) -> Vec<WordLine> {
    if words.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<&Word> = words.iter().collect();
    sorted.sort_by(|a, b| {
        b.y.partial_cmp(&a.y)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut lines: Vec<WordLine> = Vec::new();
    let mut current: Vec<Word> = vec![sorted[0].clone()];
    let mut current_y = sorted[0].y;

    for word in sorted.iter().skip(1) {
        if (word.y - current_y).abs() <= y_tolerance {
            current.push((*word).clone());
        } else {
            lines.push(finish_line(std::mem::take(&mut current)));
            current_y = word.y;
            current.push((*word).clone());
        }
    }
    if !current.is_empty() {
        lines.push(finish_line(current));
    }

    lines
}

fn finish_line(mut words: Vec<Word>) -> WordLine {
    words.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
    let y = words.iter().map(|w| w.y).sum::<f32>() / words.len() as f32;
    WordLine { words, y }
}

/// Split one word line into segments wherever the horizontal gap between
/// adjacent words exceeds `max_gap`. Used to break co-linear viewport
/// titles apart.
pub fn split_line_at_gaps(line: &WordLine, max_gap: f32) -> Vec<WordLine> {
    if line.words.len() <= 1 {
        return vec![line.clone()];
    }

    let mut out = Vec::new();
    let mut current: Vec<Word> = vec![line.words[0].clone()];

    for pair in line.words.windows(2) {
        let gap = pair[1].x - (pair[0].x + pair[0].width);
        if gap > max_gap {
            out.push(finish_line(std::mem::take(&mut current)));
        }
        current.push(pair[1].clone());
    }
    if !current.is_empty() {
        out.push(finish_line(current));
    }

    out
}
