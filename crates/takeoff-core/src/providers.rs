//! Escalation capabilities injected at pipeline construction.
//!
//! The deterministic text/geometry path needs none of these. Each trait
//! wraps an external collaborator (renderer, OCR engine, vision model);
//! all of them are optional and a failure in any of them is recoverable —
//! the stage keeps its text-based result and records a warning.

use std::path::Path;

use crate::error::TakeoffError;

/// Renders one page of a source file to an encoded image (PNG or JPEG
/// bytes). Scaling must be sub-pixel consistent so page-point bboxes map
/// cleanly to pixel crop boxes (see `Rect::to_pixel_box`).
pub trait Rasterizer: Send + Sync {
    fn render_page(
        &self,
        source: &Path,
        page_index: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, TakeoffError>;

    /// Render a page cropped to `region` (page-point coordinates, y-up;
    /// `page_height` lets the implementation flip into pixel space via
    /// `Rect::to_pixel_box`). The default ignores the crop and returns
    /// the full page — escalation still works, just with more context in
    /// frame.
    fn render_crop(
        &self,
        source: &Path,
        page_index: usize,
        dpi: u32,
        _region: Option<crate::geom::Rect>,
        _page_height: Option<f32>,
    ) -> Result<Vec<u8>, TakeoffError> {
        self.render_page(source, page_index, dpi)
    }
}

/// Segmentation strategy hint for the OCR engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrMode {
    /// Automatic block detection; suits multi-line fixture blocks.
    AutoBlock,
    /// Assume uniform table rows; suits single-line schedule rows.
    TableRows,
}

/// Reads an image, returns recognized text.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &[u8], mode: OcrMode) -> Result<String, TakeoffError>;

    /// Name of this engine (for diagnostics).
    fn engine_name(&self) -> &str;
}

/// A vision-language model taking 1-2 images plus a prompt and returning
/// free text that usually, but not reliably, contains JSON. Parsing of
/// the reply lives in [`crate::jsonx`].
pub trait VisionModel: Send + Sync {
    fn query(
        &self,
        images: &[Vec<u8>],
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, TakeoffError>;

    /// Name of this model (for diagnostics).
    fn model_name(&self) -> &str;
}

/// The full set of optional capabilities, decided once at startup.
#[derive(Default)]
pub struct Providers {
    pub rasterizer: Option<Box<dyn Rasterizer>>,
    pub ocr: Option<Box<dyn OcrEngine>>,
    pub vision: Option<Box<dyn VisionModel>>,
}

impl Providers {
    pub fn none() -> Self {
        Providers::default()
    }

    /// Vision escalation needs both a renderer and a model.
    pub fn can_escalate_vision(&self) -> bool {
        self.rasterizer.is_some() && self.vision.is_some()
    }

    pub fn can_escalate_ocr(&self) -> bool {
        self.rasterizer.is_some() && self.ocr.is_some()
    }

    /// Render one page, cropped to `bbox` when the caller passes one.
    ///
    /// Cropping is delegated to the vision model's attention when no
    /// pixel-level crop is possible: the raster comes back full-page and
    /// the bbox is mapped by the caller into the prompt. Rasterizer
    /// implementations that support cropping can read the pixel box from
    /// `Rect::to_pixel_box` themselves; the core treats the returned
    /// bytes as opaque.
    pub fn render(
        &self,
        source: &Path,
        page_index: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, TakeoffError> {
        match &self.rasterizer {
            Some(r) => r.render_page(source, page_index, dpi),
            None => Err(TakeoffError::RasterFailed {
                path: source.to_path_buf(),
                page_index,
                reason: "no rasterizer configured".into(),
            }),
        }
    }
}
