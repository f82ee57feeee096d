use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    data_structures::Rectangle,
    error::{RenderError, RenderResult},
    font::FontShaper,
    objects::{Dictionary, Object, Reference, StreamObject},
    resolve::Resolve,
};

/// One page, as delivered by the external parser.
///
/// Content stream payloads are still encoded; the renderer runs the filter
/// chain. Annotations stay as dictionaries until the annotation pass.
#[derive(Debug, Clone)]
pub struct PageObject {
    pub media_box: Rectangle,
    pub crop_box: Option<Rectangle>,

    /// Clockwise page rotation in degrees; a multiple of 90
    pub rotation: i32,

    pub resources: Option<Dictionary>,
    pub contents: Vec<Arc<StreamObject>>,
    pub annotations: Vec<Dictionary>,
}

/// The external PDF parser, seen from the renderer.
///
/// The renderer never touches raw file offsets: everything arrives as
/// [`Object`]s through this trait. All methods take `&self` and
/// `render_pages` requires `Sync`, so an implementation backed by a
/// mutable lexer must synchronize internally (a mutex around the lexer is
/// the expected shape).
pub trait PdfDocument: Resolve {
    fn page_count(&self) -> usize;

    /// Pages are addressed 1-based, matching render parameters.
    fn page(&self, index: usize) -> RenderResult<PageObject>;
}

/// A cooperative cancellation flag, checked between top-level operators.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Parameters of a page render.
#[derive(Clone)]
pub struct RenderParams {
    /// Output resolution; 72 dpi maps one PDF point to one pixel.
    pub dpi: f32,

    /// Straight-alpha RGBA the surface is cleared to before rendering;
    /// `None` leaves it fully transparent.
    pub background: Option<[f32; 4]>,

    /// The glyph provider. Without one, a built-in box-glyph fallback
    /// keeps text visible as filled rectangles.
    pub font_shaper: Option<Arc<dyn FontShaper>>,

    pub cancel: Option<CancelToken>,

    /// Entry bound of the per-context decoded-image and pattern-tile
    /// caches.
    pub cache_capacity: usize,

    /// Optional age bound for cache entries.
    pub cache_ttl: Option<Duration>,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            dpi: 72.0,
            background: None,
            font_shaper: None,
            cancel: None,
            cache_capacity: 64,
            cache_ttl: None,
        }
    }
}

impl std::fmt::Debug for RenderParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderParams")
            .field("dpi", &self.dpi)
            .field("background", &self.background)
            .field("has_font_shaper", &self.font_shaper.is_some())
            .field("cache_capacity", &self.cache_capacity)
            .finish()
    }
}

/// A self-contained document over already-materialized objects.
///
/// This is the bridging implementation used by the tests and the debug
/// binary; a real deployment implements [`PdfDocument`] over an actual
/// file parser instead.
#[derive(Debug, Default)]
pub struct InMemoryDocument {
    pages: Vec<PageObject>,
    objects: HashMap<Reference, Object>,
}

impl InMemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single page of the given size over one raw content stream.
    pub fn single_page(width: f32, height: f32, content: Vec<u8>) -> Self {
        let mut doc = Self::new();

        doc.push_page(PageObject {
            media_box: Rectangle::new(0.0, 0.0, width, height),
            crop_box: None,
            rotation: 0,
            resources: None,
            contents: vec![Arc::new(StreamObject {
                dict: Dictionary::empty(),
                data: content,
            })],
            annotations: Vec::new(),
        });

        doc
    }

    pub fn push_page(&mut self, page: PageObject) {
        self.pages.push(page);
    }

    pub fn insert_object(&mut self, reference: Reference, object: Object) {
        self.objects.insert(reference, object);
    }

    pub fn page_mut(&mut self, index: usize) -> Option<&mut PageObject> {
        self.pages.get_mut(index.wrapping_sub(1))
    }
}

impl Resolve for InMemoryDocument {
    fn resolve_reference(&self, reference: Reference) -> RenderResult<Object> {
        self.objects
            .get(&reference)
            .cloned()
            .ok_or_else(|| RenderError::missing(format!("{} 0 R", reference.object_number)))
    }
}

impl PdfDocument for InMemoryDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page(&self, index: usize) -> RenderResult<PageObject> {
        self.pages
            .get(index.wrapping_sub(1))
            .cloned()
            .ok_or_else(|| RenderError::missing(format!("page {}", index)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cancel_token_flips_once() {
        let token = CancelToken::new();
        let observer = token.clone();

        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn pages_are_one_based() {
        let doc = InMemoryDocument::single_page(612.0, 792.0, b"q Q".to_vec());

        assert_eq!(doc.page_count(), 1);
        assert!(doc.page(1).is_ok());
        assert!(doc.page(0).is_err());
        assert!(doc.page(2).is_err());
    }
}
