//! Content-stream interpretation: one walk produces both positioned words
//! and vector line segments.
//!
//! The text side is a simplified PDF text-rendering state machine
//! (BT/ET, Tf, Td/TD/Tm/T*, TL/Tc/Tw/Tz/Ts, Tj/TJ/'/"); the graphics side
//! follows path construction (m/l/c/v/y/h/re) under the q/Q/cm
//! transformation stack. Curves contribute their chord — keynote symbols
//! and table rules are straight-line work, and the enclosure test only
//! needs endpoints.

use lopdf::content::Content;

use super::backend::{as_number, decode_with_font, FontInfo};
use crate::geom::{Segment, Word};

/// Approximate glyph width as a fraction of font size. Drawing fonts are
/// mostly proportional; 0.5 keeps estimated widths close enough for
/// region tests and gap splitting.
const APPROX_CHAR_WIDTH_RATIO: f32 = 0.5;

/// Row-major 2D affine matrix [a, b, c, d, e, f].
type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

fn mat_mul(m: Matrix, n: Matrix) -> Matrix {
    // Apply m first, then n.
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn apply(m: &Matrix, x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

#[derive(Clone)]
struct TextState {
    font_key: Vec<u8>,
    font_size: f32,
    text_matrix: Matrix,
    line_matrix: Matrix,
    horiz_scale: f32,
    char_spacing: f32,
    word_spacing: f32,
    text_rise: f32,
    leading: f32,
}

impl Default for TextState {
    fn default() -> Self {
        TextState {
            font_key: Vec::new(),
            font_size: 0.0,
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            horiz_scale: 1.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            text_rise: 0.0,
            leading: 0.0,
        }
    }
}

impl TextState {
    fn translate_line(&mut self, tx: f32, ty: f32) {
        let moved = mat_mul([1.0, 0.0, 0.0, 1.0, tx, ty], self.line_matrix);
        self.line_matrix = moved;
        self.text_matrix = moved;
    }

    /// Device-space position of the current text origin.
    fn device_origin(&self, ctm: &Matrix) -> (f32, f32) {
        let combined = mat_mul(self.text_matrix, *ctm);
        apply(&combined, 0.0, self.text_rise)
    }

    /// Rendered font size after both text matrix and CTM scaling.
    fn device_font_size(&self, ctm: &Matrix) -> f32 {
        let m = mat_mul(self.text_matrix, *ctm);
        let scale = (m[1].powi(2) + m[3].powi(2)).sqrt();
        (self.font_size * scale).abs()
    }

    /// Advance the text matrix by `dx` text-space units.
    fn advance(&mut self, dx: f32) {
        self.text_matrix[4] += dx * self.text_matrix[0];
        self.text_matrix[5] += dx * self.text_matrix[1];
    }

    fn char_advance(&self, ch: char) -> f32 {
        let mut dx = self.font_size * APPROX_CHAR_WIDTH_RATIO * self.horiz_scale;
        dx += self.char_spacing;
        if ch == ' ' {
            dx += self.word_spacing;
        }
        dx
    }
}

/// Everything one content walk yields.
#[derive(Debug, Default)]
pub struct PageContentItems {
    pub words: Vec<Word>,
    pub segments: Vec<Segment>,
}

/// Walk decoded content operations, producing words and segments in a
/// zero-origin page frame (`origin` is the MediaBox lower-left corner).
pub fn walk_content(content: &Content, fonts: &[FontInfo], origin: (f32, f32)) -> PageContentItems {
    let mut items = PageContentItems::default();

    // Fold the origin shift into the base CTM so every emitted coordinate
    // is already normalized.
    let base_ctm: Matrix = [1.0, 0.0, 0.0, 1.0, -origin.0, -origin.1];
    let mut ctm = base_ctm;
    let mut ctm_stack: Vec<Matrix> = Vec::new();

    let mut text = TextState::default();

    // Path construction state.
    let mut current: Option<(f32, f32)> = None;
    let mut subpath_start: Option<(f32, f32)> = None;

    for op in &content.operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            // -- Graphics state ----------------------------------------
            "q" => ctm_stack.push(ctm),
            "Q" => {
                if let Some(m) = ctm_stack.pop() {
                    ctm = m;
                }
            }
            "cm" => {
                if let Some(m) = six_numbers(operands) {
                    ctm = mat_mul(m, ctm);
                }
            }

            // -- Path construction -------------------------------------
            "m" => {
                if let Some(p) = point(operands, &ctm) {
                    current = Some(p);
                    subpath_start = Some(p);
                }
            }
            "l" => {
                if let (Some(from), Some(to)) = (current, point(operands, &ctm)) {
                    push_segment(&mut items.segments, from, to);
                    current = Some(to);
                }
            }
            "c" => {
                // Chord of the cubic: current -> final control point.
                if let (Some(from), Some(to)) = (current, point_at(operands, 4, &ctm)) {
                    push_segment(&mut items.segments, from, to);
                    current = Some(to);
                }
            }
            "v" | "y" => {
                if let (Some(from), Some(to)) = (current, point_at(operands, 2, &ctm)) {
                    push_segment(&mut items.segments, from, to);
                    current = Some(to);
                }
            }
            "h" => {
                if let (Some(from), Some(to)) = (current, subpath_start) {
                    push_segment(&mut items.segments, from, to);
                    current = Some(to);
                }
            }
            "re" => {
                if let Some(rect) = four_numbers(operands) {
                    let (x, y, w, h) = rect;
                    let corners = [
                        apply(&ctm, x, y),
                        apply(&ctm, x + w, y),
                        apply(&ctm, x + w, y + h),
                        apply(&ctm, x, y + h),
                    ];
                    for i in 0..4 {
                        push_segment(&mut items.segments, corners[i], corners[(i + 1) % 4]);
                    }
                    current = Some(corners[0]);
                    subpath_start = Some(corners[0]);
                }
            }

            // -- Text object -------------------------------------------
            "BT" => {
                text.text_matrix = IDENTITY;
                text.line_matrix = IDENTITY;
            }
            "ET" => {
                // Font state persists; some producers set it once.
            }
            "Tf" => {
                if operands.len() >= 2 {
                    if let lopdf::Object::Name(key) = &operands[0] {
                        text.font_key = key.clone();
                    }
                    if let Some(size) = as_number(&operands[1]) {
                        text.font_size = size;
                    }
                }
            }
            "Tm" => {
                if let Some(m) = six_numbers(operands) {
                    text.text_matrix = m;
                    text.line_matrix = m;
                }
            }
            "Td" => {
                if let Some((tx, ty)) = two_numbers(operands) {
                    text.translate_line(tx, ty);
                }
            }
            "TD" => {
                if let Some((tx, ty)) = two_numbers(operands) {
                    text.leading = -ty;
                    text.translate_line(tx, ty);
                }
            }
            "T*" => {
                let leading = text.leading;
                text.translate_line(0.0, -leading);
            }
            "TL" => {
                if let Some(v) = operands.first().and_then(as_number) {
                    text.leading = v;
                }
            }
            "Tc" => {
                if let Some(v) = operands.first().and_then(as_number) {
                    text.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some(v) = operands.first().and_then(as_number) {
                    text.word_spacing = v;
                }
            }
            "Tz" => {
                if let Some(v) = operands.first().and_then(as_number) {
                    text.horiz_scale = v / 100.0;
                }
            }
            "Ts" => {
                if let Some(v) = operands.first().and_then(as_number) {
                    text.text_rise = v;
                }
            }

            // -- Show text ---------------------------------------------
            "Tj" => {
                if let Some(obj) = operands.first() {
                    show_string(obj, fonts, &mut text, &ctm, &mut items.words);
                }
            }
            "'" => {
                let leading = text.leading;
                text.translate_line(0.0, -leading);
                if let Some(obj) = operands.first() {
                    show_string(obj, fonts, &mut text, &ctm, &mut items.words);
                }
            }
            "\"" => {
                if operands.len() >= 3 {
                    if let Some(aw) = as_number(&operands[0]) {
                        text.word_spacing = aw;
                    }
                    if let Some(ac) = as_number(&operands[1]) {
                        text.char_spacing = ac;
                    }
                    let leading = text.leading;
                    text.translate_line(0.0, -leading);
                    show_string(&operands[2], fonts, &mut text, &ctm, &mut items.words);
                }
            }
            "TJ" => {
                if let Some(lopdf::Object::Array(arr)) = operands.first() {
                    for elem in arr {
                        match elem {
                            lopdf::Object::String(..) => {
                                show_string(elem, fonts, &mut text, &ctm, &mut items.words);
                            }
                            other => {
                                if let Some(adj) = as_number(other) {
                                    // Kerning in thousandths of text space;
                                    // negative moves the pen right.
                                    text.advance(
                                        -adj / 1000.0 * text.font_size * text.horiz_scale,
                                    );
                                }
                            }
                        }
                    }
                }
            }

            _ => {}
        }
    }

    items
}

/// Decode a shown string and emit one [`Word`] per whitespace-separated
/// run, each at its own advanced position.
fn show_string(
    obj: &lopdf::Object,
    fonts: &[FontInfo],
    text: &mut TextState,
    ctm: &Matrix,
    words: &mut Vec<Word>,
) {
    let lopdf::Object::String(bytes, _) = obj else {
        return;
    };
    let font = fonts.iter().find(|f| f.key == text.font_key);
    let decoded = decode_with_font(bytes, font);
    if decoded.is_empty() {
        return;
    }

    let font_size = text.device_font_size(ctm);
    let mut buf = String::new();
    let mut word_origin = text.device_origin(ctm);

    for ch in decoded.chars() {
        if ch.is_whitespace() {
            flush_word(&mut buf, word_origin, font_size, text, ctm, words);
            text.advance(text.char_advance(ch));
            word_origin = text.device_origin(ctm);
        } else {
            if buf.is_empty() {
                word_origin = text.device_origin(ctm);
            }
            buf.push(ch);
            text.advance(text.char_advance(ch));
        }
    }
    flush_word(&mut buf, word_origin, font_size, text, ctm, words);
}

fn flush_word(
    buf: &mut String,
    origin: (f32, f32),
    font_size: f32,
    text: &TextState,
    ctm: &Matrix,
    words: &mut Vec<Word>,
) {
    if buf.is_empty() {
        return;
    }
    let end = text.device_origin(ctm);
    let width = ((end.0 - origin.0).powi(2) + (end.1 - origin.1).powi(2)).sqrt();
    words.push(Word {
        text: std::mem::take(buf),
        x: origin.0,
        y: origin.1,
        width,
        height: font_size,
        font_size,
    });
}

fn push_segment(segments: &mut Vec<Segment>, from: (f32, f32), to: (f32, f32)) {
    if from == to {
        return;
    }
    segments.push(Segment {
        x0: from.0,
        y0: from.1,
        x1: to.0,
        y1: to.1,
    });
}

fn two_numbers(operands: &[lopdf::Object]) -> Option<(f32, f32)> {
    if operands.len() < 2 {
        return None;
    }
    Some((as_number(&operands[0])?, as_number(&operands[1])?))
}

fn four_numbers(operands: &[lopdf::Object]) -> Option<(f32, f32, f32, f32)> {
    if operands.len() < 4 {
        return None;
    }
    Some((
        as_number(&operands[0])?,
        as_number(&operands[1])?,
        as_number(&operands[2])?,
        as_number(&operands[3])?,
    ))
}

fn six_numbers(operands: &[lopdf::Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let vals: Vec<f32> = operands.iter().take(6).filter_map(as_number).collect();
    if vals.len() != 6 {
        return None;
    }
    Some([vals[0], vals[1], vals[2], vals[3], vals[4], vals[5]])
}

fn point(operands: &[lopdf::Object], ctm: &Matrix) -> Option<(f32, f32)> {
    let (x, y) = two_numbers(operands)?;
    Some(apply(ctm, x, y))
}

/// The point at `operands[offset..offset+2]`, transformed.
fn point_at(operands: &[lopdf::Object], offset: usize, ctm: &Matrix) -> Option<(f32, f32)> {
    if operands.len() < offset + 2 {
        return None;
    }
    let x = as_number(&operands[offset])?;
    let y = as_number(&operands[offset + 1])?;
    Some(apply(ctm, x, y))
}
