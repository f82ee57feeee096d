#![allow(
    dead_code,
    // color space and operator names follow the pdf spelling
    clippy::enum_variant_names,
    clippy::large_enum_variant,
    clippy::too_many_arguments,
    clippy::manual_range_contains,
)]

#[macro_use]
mod macros;

mod annotation;
mod cache;
mod color;
mod content;
mod data_structures;
mod document;
mod error;
mod filter;
mod font;
mod function;
mod objects;
mod raster;
mod render;
mod resolve;
mod resources;
mod shading;
mod xobject;

use rayon::prelude::*;

use crate::{data_structures::Matrix, render::Renderer, resources::Resources};

pub use crate::{
    content::{ContentLexer, ContentToken, InlineImage, Operator, OperatorParser, TextItem},
    data_structures::{Matrix as AffineMatrix, Rectangle},
    document::{CancelToken, InMemoryDocument, PageObject, PdfDocument, RenderParams},
    error::{RenderError, RenderResult, Warning},
    font::{BoxGlyphShaper, Font, FontEncoding, FontShaper, Glyph},
    objects::{Dictionary, Object, Reference, StreamObject},
    raster::{BlendMode, CompositeOperator, Surface, SurfaceFormat},
    resolve::{NullResolver, Resolve},
};

/// The worker pool size [`render_pages`] falls back to when asked for 0
/// workers.
pub const DEFAULT_WORKERS: usize = 4;

/// A completed page render: the pixel surface plus the recoverable
/// failures that were skipped along the way.
#[derive(Debug)]
pub struct RenderedPage {
    pub surface: Surface,
    pub warnings: Vec<Warning>,
}

/// Render one page to an ARGB32 pre-multiplied surface.
///
/// `page_index` is 1-based. The output size is the page's crop box (or
/// media box) scaled by `dpi / 72`, with `/Rotate` applied. The call
/// either completes the surface or returns the first unrecoverable error;
/// best-effort skips are collected as warnings on the result.
pub fn render_page<D: PdfDocument>(
    doc: &D,
    page_index: usize,
    params: &RenderParams,
) -> RenderResult<RenderedPage> {
    let page = doc.page(page_index)?;

    let media = page
        .crop_box
        .and_then(|crop| crop.intersection(&page.media_box))
        .unwrap_or(page.media_box);

    let scale = params.dpi / 72.0;
    if !(scale > 0.0) || !scale.is_finite() {
        return Err(RenderError::decode(format!("invalid dpi {}", params.dpi)));
    }

    let scaled_width = media.width() * scale;
    let scaled_height = media.height() * scale;

    let rotation = page.rotation.rem_euclid(360);

    let (pixel_width, pixel_height) = match rotation {
        90 | 270 => (scaled_height, scaled_width),
        _ => (scaled_width, scaled_height),
    };
    let pixel_width = (pixel_width.round().max(1.0)) as usize;
    let pixel_height = (pixel_height.round().max(1.0)) as usize;

    if pixel_width.saturating_mul(pixel_height) > (1 << 28) {
        return Err(RenderError::ResourceExhausted {
            what: "page surface too large",
        });
    }

    let mut surface = Surface::new(pixel_width, pixel_height, SurfaceFormat::Argb32Premul);

    if let Some(background) = params.background {
        surface.clear(background);
    }

    // one explicit page-entry transform: media-box origin, dpi scale,
    // Y flip, display rotation
    let flip = Matrix::scale(1.0, -1.0) * Matrix::translation(0.0, scaled_height);

    let rotate = match rotation {
        90 => Matrix::new(0.0, 1.0, -1.0, 0.0, scaled_height, 0.0),
        180 => Matrix::new(-1.0, 0.0, 0.0, -1.0, scaled_width, scaled_height),
        270 => Matrix::new(0.0, -1.0, 1.0, 0.0, 0.0, scaled_width),
        _ => Matrix::identity(),
    };

    let base_ctm = Matrix::translation(-media.lower_left_x, -media.lower_left_y)
        * Matrix::scale(scale, scale)
        * flip
        * rotate;

    let resources = Resources::from_dict(page.resources.as_ref(), doc);

    let mut renderer = Renderer::new(doc, surface, resources, base_ctm, params);

    // the streams of a page form one logical stream; tokens may span the
    // boundaries, so decode and concatenate before parsing
    let mut content = Vec::new();
    for stream in &page.contents {
        let decoded = crate::filter::decode_stream(&stream.data, &stream.dict, doc)?;
        content.extend_from_slice(&decoded);
        content.push(b'\n');
    }

    renderer.render_content(&content)?;
    renderer.render_annotations(&page)?;

    debug_assert_eq!(renderer.stack_depth(), 0);

    let (surface, warnings) = renderer.into_output();

    Ok(RenderedPage { surface, warnings })
}

/// Render several pages concurrently on a bounded worker pool.
///
/// Each page gets an independent render context and surface; the document
/// is only required to hand out immutable data, which is why it must be
/// `Sync`. Pass `workers == 0` for the default pool size of 4. Per-page
/// failures land in the per-page results; the outer error covers pool
/// construction only.
pub fn render_pages<D: PdfDocument + Sync>(
    doc: &D,
    pages: &[usize],
    params: &RenderParams,
    workers: usize,
) -> RenderResult<Vec<RenderResult<RenderedPage>>> {
    let workers = if workers == 0 { DEFAULT_WORKERS } else { workers };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|err| RenderError::Internal {
            reason: format!("worker pool: {}", err),
        })?;

    Ok(pool.install(|| {
        pages
            .par_iter()
            .map(|&index| render_page(doc, index, params))
            .collect()
    }))
}

/// Render a bare content stream onto a fresh page of the given size in
/// points. The debugging entry point behind the companion binary; tests
/// use it too.
pub fn render_raw_content(
    content: &[u8],
    width: f32,
    height: f32,
    params: &RenderParams,
) -> RenderResult<RenderedPage> {
    let doc = InMemoryDocument::single_page(width, height, content.to_vec());

    render_page(&doc, 1, params)
}
