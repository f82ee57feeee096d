use std::{collections::HashSet, rc::Rc, sync::Arc};

use log::{debug, warn};

use crate::{
    annotation::Annotation,
    cache::RenderCache,
    color::ColorSpace,
    content::{InlineImage, Operator, OperatorParser, TextItem},
    data_structures::Matrix,
    document::{CancelToken, PageObject, RenderParams},
    error::{RenderError, RenderResult, Warning},
    filter::decode_stream,
    font::{BoxGlyphShaper, Font, FontShaper},
    objects::Reference,
    raster::{
        composite::{composite_pixel, mul_div_255, premultiply, unpremultiply},
        rasterizer::fill_polygons,
        BlendMode, CompositeOperator, CoverageMask, FillRule, LineCap, LineJoin, StrokeStyle,
        Surface, SurfaceFormat,
    },
    resolve::Resolve,
    resources::{
        graphics_state_parameters::SoftMaskSource,
        pattern::{PaintType, Pattern, TilingPattern},
        Resources,
    },
    shading::Shading,
    xobject::{DecodedImage, FormXObject, ImageXObject, TransparencyGroup, XObject},
};

use self::{
    graphics_state::{AlphaPlane, GraphicsState, Paint},
    path::Path,
    text_state::TextRenderingMode,
};

pub(crate) mod graphics_state;
pub(crate) mod path;
pub(crate) mod text_state;

/// Curve flattening tolerance in device pixels.
const FLATTEN_TOLERANCE: f32 = 0.25;

/// Form XObjects may nest at most this deep.
const MAX_XOBJECT_DEPTH: usize = 32;

/// Pattern tiles are rasterized at most this large on either axis.
const MAX_TILE_EXTENT: usize = 2048;

/// Executes one page's operators against a target surface.
///
/// The renderer is single-threaded and runs each content stream to
/// completion. All state lives here: the graphics-state stack, the text
/// state, the current path, and the resource tables.
pub struct Renderer<'a> {
    resolver: &'a dyn Resolve,
    surface: Surface,
    graphics_state: GraphicsState,
    graphics_state_stack: Vec<GraphicsState>,
    current_path: Path,

    /// Set by `W`/`W*`; the next painting operator intersects the path
    /// into the clip region.
    pending_clip: Option<FillRule>,

    resources_stack: Vec<Rc<Resources>>,

    /// The page-entry transform (dpi scale, Y flip, page rotation), which
    /// pattern space is anchored to.
    base_ctm: Matrix,

    shaper: Arc<dyn FontShaper>,
    cache: RenderCache,
    warnings: Vec<Warning>,
    cancel: Option<CancelToken>,

    xobject_depth: usize,
    active_xobjects: HashSet<Reference>,

    /// Glyph outlines accumulated by text rendering modes 4-7, applied to
    /// the clip at `ET`.
    text_clip: Vec<Vec<(f32, f32)>>,
    text_clip_active: bool,

    /// Inside a knockout group, painting reads its backdrop from here
    /// instead of the working surface.
    knockout_backdrop: Option<Rc<Surface>>,
}

/// What a paint operation reads its per-pixel source color from.
enum PaintSource {
    /// A solid pre-multiplied color
    Solid([u8; 4]),

    /// A decoded image placed over the unit square
    Image {
        decoded: Rc<DecodedImage>,
        inv: Matrix,
        interpolate: bool,
        alpha: f32,
    },

    /// A 1-bit stencil painted with the current fill color
    Stencil {
        stencil: crate::xobject::DecodedStencil,
        inv: Matrix,
        color: [u8; 4],
    },

    /// A shading evaluated per pixel in its target space
    Gradient {
        shading: Rc<Shading>,
        inv: Matrix,
        alpha: f32,
    },

    /// A pre-rendered pattern tile repeated over pattern space
    Tile {
        tile: Rc<Surface>,
        inv: Matrix,
        origin: (f32, f32),
        step: (f32, f32),
        scale: (f32, f32),
        /// For uncolored patterns: the separately specified color poured
        /// through the tile's alpha
        stencil_color: Option<[u8; 4]>,
        alpha: f32,
    },
}

impl PaintSource {
    /// The pre-multiplied source color and an extra coverage factor for
    /// the device pixel centered at `(x, y)`.
    fn sample(&self, x: i32, y: i32) -> ([u8; 4], u8) {
        let center = (x as f32 + 0.5, y as f32 + 0.5);

        match self {
            &PaintSource::Solid(color) => (color, 255),
            PaintSource::Image {
                decoded,
                inv,
                interpolate,
                alpha,
            } => {
                let (u, v) = inv.transform_point(center.0, center.1);

                if !(-0.001..=1.001).contains(&u) || !(-0.001..=1.001).contains(&v) {
                    return ([0; 4], 0);
                }

                let [r, g, b, a] =
                    decoded.sample(u.clamp(0.0, 1.0), v.clamp(0.0, 1.0), *interpolate);

                (premultiply([r, g, b, a * alpha]), 255)
            }
            PaintSource::Stencil {
                stencil,
                inv,
                color,
            } => {
                let (u, v) = inv.transform_point(center.0, center.1);

                if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
                    return ([0; 4], 0);
                }

                (*color, stencil.sample(u, v))
            }
            PaintSource::Gradient {
                shading,
                inv,
                alpha,
            } => {
                let (sx, sy) = inv.transform_point(center.0, center.1);

                match shading.color_at(sx, sy, *alpha) {
                    Some(rgba) => (premultiply(rgba), 255),
                    None => ([0; 4], 0),
                }
            }
            PaintSource::Tile {
                tile,
                inv,
                origin,
                step,
                scale,
                stencil_color,
                alpha,
            } => {
                let (px, py) = inv.transform_point(center.0, center.1);

                let u = (px - origin.0).rem_euclid(step.0);
                let v = (py - origin.1).rem_euclid(step.1);

                let tx = ((u * scale.0) as usize).min(tile.width().saturating_sub(1));
                let ty_from_bottom = (v * scale.1) as usize;
                let ty = tile
                    .height()
                    .saturating_sub(1)
                    .saturating_sub(ty_from_bottom.min(tile.height().saturating_sub(1)));

                let pixel = tile.pixel(tx, ty);

                match stencil_color {
                    Some(color) => (*color, pixel[3]),
                    None => {
                        let a = (alpha * 255.0 + 0.5) as u8;
                        let mut out = pixel;
                        for ch in &mut out {
                            *ch = mul_div_255(*ch, a);
                        }

                        (out, 255)
                    }
                }
            }
        }
    }
}

impl<'a> Renderer<'a> {
    pub fn new(
        resolver: &'a dyn Resolve,
        surface: Surface,
        resources: Rc<Resources>,
        base_ctm: Matrix,
        params: &RenderParams,
    ) -> Self {
        let shaper = params
            .font_shaper
            .clone()
            .unwrap_or_else(|| Arc::new(BoxGlyphShaper));

        let mut graphics_state = GraphicsState::default();
        graphics_state.ctm = base_ctm;

        Self {
            resolver,
            surface,
            graphics_state,
            graphics_state_stack: Vec::new(),
            current_path: Path::new(),
            pending_clip: None,
            resources_stack: vec![resources],
            base_ctm,
            shaper,
            cache: RenderCache::new(params.cache_capacity, params.cache_ttl),
            warnings: Vec::new(),
            cancel: params.cancel.clone(),
            xobject_depth: 0,
            active_xobjects: HashSet::new(),
            text_clip: Vec::new(),
            text_clip_active: false,
            knockout_backdrop: None,
        }
    }

    pub fn into_output(self) -> (Surface, Vec<Warning>) {
        (self.surface, self.warnings)
    }

    pub fn stack_depth(&self) -> usize {
        self.graphics_state_stack.len()
    }

    fn resources(&self) -> &Rc<Resources> {
        self.resources_stack.last().expect("resources stack is never empty")
    }

    /// Run a content stream to completion.
    ///
    /// Recoverable operator failures are logged and recorded; lexical
    /// errors, cancellation and resource exhaustion abort. The
    /// graphics-state stack is restored to its entry depth on every exit
    /// path.
    pub fn render_content(&mut self, content: &[u8]) -> RenderResult<()> {
        let entry_depth = self.graphics_state_stack.len();

        let result = self.run_operators(content);

        while self.graphics_state_stack.len() > entry_depth {
            self.restore_graphics_state();
        }

        result
    }

    fn run_operators(&mut self, content: &[u8]) -> RenderResult<()> {
        for operator in OperatorParser::new(content) {
            if let Some(cancel) = &self.cancel {
                if cancel.is_cancelled() {
                    return Err(RenderError::Cancelled);
                }
            }

            let operator = operator?;

            match self.execute(operator) {
                Ok(()) => {}
                Err(err) if err.is_recoverable() => {
                    warn!("skipping operator: {}", err);
                    self.warnings.push(Warning::new(err.to_string()));
                }
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    fn execute(&mut self, operator: Operator) -> RenderResult<()> {
        match operator {
            Operator::SaveState => self.save_graphics_state(),
            Operator::RestoreState => self.restore_graphics_state(),
            Operator::ConcatMatrix(m) => {
                self.graphics_state.ctm = m * self.graphics_state.ctm;
            }
            Operator::SetLineWidth(w) => self.graphics_state.line_width = w,
            Operator::SetLineCap(cap) => {
                self.graphics_state.line_cap = LineCap::from_integer(cap)?;
            }
            Operator::SetLineJoin(join) => {
                self.graphics_state.line_join = LineJoin::from_integer(join)?;
            }
            Operator::SetMiterLimit(limit) => self.graphics_state.miter_limit = limit,
            Operator::SetDashPattern { array, phase } => {
                self.graphics_state.dash_array = array;
                self.graphics_state.dash_phase = phase;
            }
            Operator::SetRenderingIntent(name) => {
                if let Ok(intent) =
                    crate::resources::graphics_state_parameters::RenderingIntent::from_str(&name)
                {
                    self.graphics_state.rendering_intent = intent;
                }
            }
            Operator::SetFlatness(flatness) => self.graphics_state.flatness = flatness,
            Operator::SetExtGState(name) => self.apply_ext_g_state(&name)?,

            Operator::MoveTo { x, y } => self.current_path.move_to(x, y),
            Operator::LineTo { x, y } => self.current_path.line_to(x, y),
            Operator::CurveTo {
                x1,
                y1,
                x2,
                y2,
                x3,
                y3,
            } => self.current_path.curve_to(x1, y1, x2, y2, x3, y3),
            Operator::CurveToInitial { x2, y2, x3, y3 } => {
                self.current_path.curve_to_initial(x2, y2, x3, y3);
            }
            Operator::CurveToFinal { x1, y1, x3, y3 } => {
                self.current_path.curve_to_final(x1, y1, x3, y3);
            }
            Operator::Rect {
                x,
                y,
                width,
                height,
            } => self.current_path.rect(x, y, width, height),
            Operator::ClosePath => self.current_path.close(),

            Operator::Stroke => self.paint_path(None, true, false)?,
            Operator::CloseStroke => self.paint_path(None, true, true)?,
            Operator::Fill => self.paint_path(Some(FillRule::NonZero), false, false)?,
            Operator::FillEvenOdd => self.paint_path(Some(FillRule::EvenOdd), false, false)?,
            Operator::FillStroke => self.paint_path(Some(FillRule::NonZero), true, false)?,
            Operator::FillStrokeEvenOdd => self.paint_path(Some(FillRule::EvenOdd), true, false)?,
            Operator::CloseFillStroke => self.paint_path(Some(FillRule::NonZero), true, true)?,
            Operator::CloseFillStrokeEvenOdd => {
                self.paint_path(Some(FillRule::EvenOdd), true, true)?
            }
            Operator::EndPath => self.paint_path(None, false, false)?,
            Operator::Clip => self.pending_clip = Some(FillRule::NonZero),
            Operator::ClipEvenOdd => self.pending_clip = Some(FillRule::EvenOdd),

            Operator::SetStrokeColorSpace(name) => self.set_color_space(&name, true)?,
            Operator::SetFillColorSpace(name) => self.set_color_space(&name, false)?,
            Operator::SetStrokeColor(components) => self.set_color(components, None, true)?,
            Operator::SetFillColor(components) => self.set_color(components, None, false)?,
            Operator::SetStrokeColorExtended {
                components,
                pattern,
            } => self.set_color(components, pattern, true)?,
            Operator::SetFillColorExtended {
                components,
                pattern,
            } => self.set_color(components, pattern, false)?,
            Operator::SetStrokeGray(gray) => {
                self.graphics_state.stroke_paint = device_paint(ColorSpace::DeviceGray, vec![gray]);
            }
            Operator::SetFillGray(gray) => {
                self.graphics_state.fill_paint = device_paint(ColorSpace::DeviceGray, vec![gray]);
            }
            Operator::SetStrokeRgb(r, g, b) => {
                self.graphics_state.stroke_paint =
                    device_paint(ColorSpace::DeviceRgb, vec![r, g, b]);
            }
            Operator::SetFillRgb(r, g, b) => {
                self.graphics_state.fill_paint = device_paint(ColorSpace::DeviceRgb, vec![r, g, b]);
            }
            Operator::SetStrokeCmyk(c, m, y, k) => {
                self.graphics_state.stroke_paint =
                    device_paint(ColorSpace::DeviceCmyk, vec![c, m, y, k]);
            }
            Operator::SetFillCmyk(c, m, y, k) => {
                self.graphics_state.fill_paint =
                    device_paint(ColorSpace::DeviceCmyk, vec![c, m, y, k]);
            }

            Operator::PaintShading(name) => self.paint_shading(&name)?,
            Operator::PaintXObject(name) => self.paint_xobject(&name)?,
            Operator::InlineImage(image) => self.paint_inline_image(image)?,

            Operator::BeginText => {
                self.graphics_state.text.reinit();
                self.text_clip.clear();
                self.text_clip_active = false;
            }
            Operator::EndText => self.end_text(),
            Operator::SetCharSpacing(spacing) => {
                self.graphics_state.text.character_spacing = spacing;
            }
            Operator::SetWordSpacing(spacing) => self.graphics_state.text.word_spacing = spacing,
            Operator::SetHorizontalScaling(percent) => {
                self.graphics_state.text.horizontal_scaling = percent / 100.0;
            }
            Operator::SetLeading(leading) => self.graphics_state.text.leading = leading,
            Operator::SetFont { name, size } => {
                self.graphics_state.text.font = Some(self.resources().font(&name)?);
                self.graphics_state.text.font_size = size;
            }
            Operator::SetRenderingMode(mode) => {
                self.graphics_state.text.rendering_mode = TextRenderingMode::from_integer(mode)?;
            }
            Operator::SetRise(rise) => self.graphics_state.text.rise = rise,
            Operator::MoveText { tx, ty } => self.move_text_position(tx, ty),
            Operator::MoveTextSetLeading { tx, ty } => {
                self.graphics_state.text.leading = -ty;
                self.move_text_position(tx, ty);
            }
            Operator::SetTextMatrix(m) => {
                self.graphics_state.text.text_matrix = m;
                self.graphics_state.text.text_line_matrix = m;
            }
            Operator::NextLine => self.next_line(),
            Operator::ShowText(text) => self.show_text(&text)?,
            Operator::ShowTextAdjusted(items) => {
                for item in items {
                    match item {
                        TextItem::Text(text) => self.show_text(&text)?,
                        TextItem::Adjust(amount) => {
                            let ts = &mut self.graphics_state.text;
                            let tx = -amount / 1000.0 * ts.font_size * ts.horizontal_scaling;
                            ts.text_matrix = Matrix::translation(tx, 0.0) * ts.text_matrix;
                        }
                    }
                }
            }
            Operator::NextLineShowText(text) => {
                self.next_line();
                self.show_text(&text)?;
            }
            Operator::NextLineShowTextSpaced {
                word_spacing,
                char_spacing,
                text,
            } => {
                self.graphics_state.text.word_spacing = word_spacing;
                self.graphics_state.text.character_spacing = char_spacing;
                self.next_line();
                self.show_text(&text)?;
            }

            // marked content influences structure, not pixels
            Operator::BeginMarkedContent(tag)
            | Operator::BeginMarkedContentWithProperties(tag)
            | Operator::MarkedContentPoint(tag)
            | Operator::MarkedContentPointWithProperties(tag) => {
                debug!("marked content {:?}", tag);
            }
            Operator::EndMarkedContent => {}
            Operator::BeginCompatibility | Operator::EndCompatibility => {}
        }

        Ok(())
    }

    /// Save the current graphics state on the graphics state stack
    fn save_graphics_state(&mut self) {
        self.graphics_state_stack.push(self.graphics_state.clone());
    }

    /// Restore the graphics state by removing the most recently saved
    /// state from the stack. Over-popping is clamped: the stack never
    /// drops below its entry state.
    fn restore_graphics_state(&mut self) {
        if let Some(state) = self.graphics_state_stack.pop() {
            self.graphics_state = state;
        }
    }

    fn apply_ext_g_state(&mut self, name: &str) -> RenderResult<()> {
        let params = self.resources().ext_g_state(name)?;
        let gs = &mut self.graphics_state;

        if let Some(width) = params.line_width {
            gs.line_width = width;
        }
        if let Some(cap) = params.line_cap {
            gs.line_cap = cap;
        }
        if let Some(join) = params.line_join {
            gs.line_join = join;
        }
        if let Some(limit) = params.miter_limit {
            gs.miter_limit = limit;
        }
        if let Some((array, phase)) = &params.dash_pattern {
            gs.dash_array = array.clone();
            gs.dash_phase = *phase;
        }
        if let Some(intent) = params.rendering_intent {
            gs.rendering_intent = intent;
        }
        if let Some(mode) = params.blend_mode {
            gs.blend_mode = mode;
        }
        if let Some(alpha) = params.stroking_alpha {
            gs.stroke_alpha = alpha.clamp(0.0, 1.0);
        }
        if let Some(alpha) = params.nonstroking_alpha {
            gs.fill_alpha = alpha.clamp(0.0, 1.0);
        }
        if let Some(shape) = params.alpha_is_shape {
            gs.alpha_is_shape = shape;
        }
        if let Some(knockout) = params.text_knockout {
            gs.text_knockout = knockout;
        }
        if let Some(mode) = params.overprint_mode {
            gs.overprint_mode = mode;
        }
        if let Some((font_dict, size)) = &params.font {
            let font = Font::from_dict(font_dict, self.resolver)?;
            self.graphics_state.text.font = Some(Rc::new(font));
            self.graphics_state.text.font_size = *size;
        }

        if let Some(source) = params.soft_mask.clone() {
            let mask = self.build_soft_mask(&source)?;
            self.graphics_state.soft_mask = mask;
        }

        Ok(())
    }

    fn set_color_space(&mut self, name: &str, stroking: bool) -> RenderResult<()> {
        let space = match ColorSpace::from_name(name) {
            Ok(space) => Rc::new(space),
            Err(..) => self.resources().color_space(name)?,
        };

        let paint = Paint {
            components: space.default_color(),
            color_space: space,
            pattern: None,
        };

        if stroking {
            self.graphics_state.stroke_paint = paint;
        } else {
            self.graphics_state.fill_paint = paint;
        }

        Ok(())
    }

    fn set_color(
        &mut self,
        components: Vec<f32>,
        pattern: Option<String>,
        stroking: bool,
    ) -> RenderResult<()> {
        let pattern = pattern
            .map(|name| self.resources().pattern(&name))
            .transpose()?;

        let paint = if stroking {
            &mut self.graphics_state.stroke_paint
        } else {
            &mut self.graphics_state.fill_paint
        };

        if !components.is_empty() {
            paint.components = components;
        }
        paint.pattern = pattern;

        Ok(())
    }

    /// Move to the start of the next line, offset from the start of the
    /// current line by `(tx, ty)`:
    ///
    /// `Tm = Tlm = [1 0 0 1 tx ty] × Tlm`
    fn move_text_position(&mut self, tx: f32, ty: f32) {
        let ts = &mut self.graphics_state.text;
        let matrix = Matrix::translation(tx, ty) * ts.text_line_matrix;

        ts.text_matrix = matrix;
        ts.text_line_matrix = matrix;
    }

    /// `T*`: equivalent to `0 -leading Td`.
    fn next_line(&mut self) {
        let leading = self.graphics_state.text.leading;
        self.move_text_position(0.0, -leading);
    }

    /// Show a text string: decode to CIDs, fetch outlines from the shaper,
    /// paint per the rendering mode, and advance the text matrix.
    fn show_text(&mut self, bytes: &[u8]) -> RenderResult<()> {
        let font = self
            .graphics_state
            .text
            .font
            .clone()
            .ok_or_else(|| RenderError::missing("no font selected before text showing"))?;

        // a raw newline in a literal string starts a new line
        if font.encoding == crate::font::FontEncoding::Simple && bytes.contains(&b'\n') {
            let mut first = true;
            for line in bytes.split(|&b| b == b'\n') {
                if !first {
                    self.next_line();
                }
                first = false;
                self.show_text_run(&font, line)?;
            }

            return Ok(());
        }

        self.show_text_run(&font, bytes)
    }

    fn show_text_run(&mut self, font: &Rc<Font>, bytes: &[u8]) -> RenderResult<()> {
        for (cid, is_space) in font.decode_cids(bytes) {
            let glyph = self.shaper.glyph(font, cid);

            let advance = font
                .width(cid)
                .or_else(|| glyph.as_ref().map(|g| g.advance))
                .unwrap_or(0.5);

            let mode = self.graphics_state.text.rendering_mode;

            if mode != TextRenderingMode::Invisible || mode.clips() {
                if let Some(outline) = glyph.and_then(|g| g.outline) {
                    self.paint_glyph(&outline, mode)?;
                }
            }

            let ts = &mut self.graphics_state.text;
            let word_spacing = if is_space { ts.word_spacing } else { 0.0 };
            let tx = (advance * ts.font_size + ts.character_spacing + word_spacing)
                * ts.horizontal_scaling;

            ts.text_matrix = Matrix::translation(tx, 0.0) * ts.text_matrix;
        }

        Ok(())
    }

    /// Paint one glyph outline (in em space) through the text rendering
    /// matrix: `[size·h 0 0 size 0 rise] × Tm × CTM`.
    fn paint_glyph(&mut self, outline: &Path, mode: TextRenderingMode) -> RenderResult<()> {
        let ts = &self.graphics_state.text;

        let glyph_to_device = Matrix::new(
            ts.font_size * ts.horizontal_scaling,
            0.0,
            0.0,
            ts.font_size,
            0.0,
            ts.rise,
        ) * ts.text_matrix
            * self.graphics_state.ctm;

        let flattened = outline.flatten(&glyph_to_device, FLATTEN_TOLERANCE);
        let polygons: Vec<Vec<(f32, f32)>> =
            flattened.iter().map(|(points, _)| points.clone()).collect();

        if mode.fills() {
            if let Some(mask) = fill_polygons(
                &polygons,
                FillRule::NonZero,
                self.surface.width(),
                self.surface.height(),
            ) {
                let source = self.paint_source(false)?;
                self.composite_mask(&mask, &source);
            }
        }

        if mode.strokes() {
            self.stroke_flattened(&flattened)?;
        }

        if mode.clips() {
            self.text_clip_active = true;
            self.text_clip.extend(polygons);
        }

        Ok(())
    }

    /// `ET`: apply any clip accumulated by rendering modes 4-7.
    fn end_text(&mut self) {
        if !self.text_clip_active {
            return;
        }

        let mask = fill_polygons(
            &self.text_clip,
            FillRule::NonZero,
            self.surface.width(),
            self.surface.height(),
        );

        self.intersect_clip(mask);
        self.text_clip.clear();
        self.text_clip_active = false;
    }

    /// Shared tail of every path-painting operator: optionally close,
    /// fill, stroke, apply a pending clip, and discard the path.
    ///
    /// A failed paint (a bad pattern, say) is downgraded to a warning, but
    /// the clip and the path-clearing side effects still happen; page-fatal
    /// errors pass through after the cleanup.
    fn paint_path(
        &mut self,
        fill: Option<FillRule>,
        stroke: bool,
        close_first: bool,
    ) -> RenderResult<()> {
        if close_first {
            self.current_path.close();
        }

        let result = self.paint_path_inner(fill, stroke);

        if let Some(rule) = self.pending_clip.take() {
            let polygons: Vec<Vec<(f32, f32)>> = self
                .current_path
                .flatten(&self.graphics_state.ctm, FLATTEN_TOLERANCE)
                .into_iter()
                .map(|(points, _)| points)
                .collect();

            let mask = fill_polygons(
                &polygons,
                rule,
                self.surface.width(),
                self.surface.height(),
            );

            self.intersect_clip(mask);
        }

        self.current_path = Path::new();

        match result {
            Err(err) if err.is_recoverable() => {
                warn!("painting failed: {}", err);
                self.warnings.push(Warning::new(err.to_string()));
                Ok(())
            }
            other => other,
        }
    }

    fn paint_path_inner(&mut self, fill: Option<FillRule>, stroke: bool) -> RenderResult<()> {
        if let Some(rule) = fill {
            let polygons: Vec<Vec<(f32, f32)>> = self
                .current_path
                .flatten(&self.graphics_state.ctm, FLATTEN_TOLERANCE)
                .into_iter()
                .map(|(points, _)| points)
                .collect();

            if let Some(mask) = fill_polygons(
                &polygons,
                rule,
                self.surface.width(),
                self.surface.height(),
            ) {
                let source = self.paint_source(false)?;
                self.composite_mask(&mask, &source);
            }
        }

        if stroke {
            let flattened = self
                .current_path
                .flatten(&self.graphics_state.ctm, FLATTEN_TOLERANCE);
            self.stroke_flattened(&flattened)?;
        }

        Ok(())
    }

    fn stroke_flattened(&mut self, flattened: &[(Vec<(f32, f32)>, bool)]) -> RenderResult<()> {
        let gs = &self.graphics_state;
        let scale = gs.ctm.mapped_line_width();

        // zero-width strokes render as one device pixel
        let width = match gs.line_width * scale {
            w if w > 0.0 => w,
            _ => 1.0,
        };

        let style = StrokeStyle {
            width,
            cap: gs.line_cap,
            join: gs.line_join,
            miter_limit: gs.miter_limit,
            dash_array: gs.dash_array.iter().map(|d| d * scale).collect(),
            dash_phase: gs.dash_phase * scale,
        };

        let polygons = crate::raster::stroke::stroke_polylines(flattened, &style);

        if let Some(mask) = fill_polygons(
            &polygons,
            FillRule::NonZero,
            self.surface.width(),
            self.surface.height(),
        ) {
            let source = self.paint_source(true)?;
            self.composite_mask(&mask, &source);
        }

        Ok(())
    }

    /// Build the per-pixel source for the current fill or stroke paint.
    fn paint_source(&mut self, stroking: bool) -> RenderResult<PaintSource> {
        let (paint, alpha) = if stroking {
            (
                self.graphics_state.stroke_paint.clone(),
                self.graphics_state.stroke_alpha,
            )
        } else {
            (
                self.graphics_state.fill_paint.clone(),
                self.graphics_state.fill_alpha,
            )
        };

        let pattern = match &paint.pattern {
            Some(pattern) => pattern.clone(),
            None => return Ok(PaintSource::Solid(premultiply(paint.srgba(alpha)))),
        };

        match &*pattern {
            Pattern::Shading(shading_pattern) => {
                let to_device = shading_pattern.matrix * self.base_ctm;
                let inv = to_device
                    .invert()
                    .ok_or_else(|| RenderError::decode("singular shading pattern matrix"))?;

                Ok(PaintSource::Gradient {
                    shading: shading_pattern.shading.clone(),
                    inv,
                    alpha,
                })
            }
            Pattern::Tiling(tiling) => self.tile_source(&pattern, tiling, &paint, alpha),
        }
    }

    /// Rasterize (or fetch) the pattern cell and describe how it repeats.
    fn tile_source(
        &mut self,
        pattern: &Rc<Pattern>,
        tiling: &TilingPattern,
        paint: &Paint,
        alpha: f32,
    ) -> RenderResult<PaintSource> {
        let to_device = tiling.matrix * self.base_ctm;
        let inv = to_device
            .invert()
            .ok_or_else(|| RenderError::decode("singular pattern matrix"))?;

        let (sx_x, sx_y) = to_device.transform_distance(1.0, 0.0);
        let (sy_x, sy_y) = to_device.transform_distance(0.0, 1.0);
        let scale_x = sx_x.hypot(sx_y).max(0.01);
        let scale_y = sy_x.hypot(sy_y).max(0.01);

        let step_x = tiling.x_step.abs();
        let step_y = tiling.y_step.abs();

        let tile_width = ((step_x * scale_x).ceil() as usize).clamp(1, MAX_TILE_EXTENT);
        let tile_height = ((step_y * scale_y).ceil() as usize).clamp(1, MAX_TILE_EXTENT);

        // effective sample density after clamping
        let scale = (
            tile_width as f32 / step_x,
            tile_height as f32 / step_y,
        );

        let key = RenderCache::tile_key(pattern);
        let tile = match self.cache.tiles.get(&key) {
            Some((_, tile)) => tile,
            None => {
                let tile = Rc::new(self.render_tile(tiling, tile_width, tile_height, scale)?);
                self.cache
                    .tiles
                    .insert(key, (pattern.clone(), tile.clone()));
                tile
            }
        };

        let stencil_color = match tiling.paint_type {
            PaintType::Uncolored => Some(premultiply(paint.srgba(alpha))),
            PaintType::Colored => None,
        };

        Ok(PaintSource::Tile {
            tile,
            inv,
            origin: (tiling.bbox.lower_left_x, tiling.bbox.lower_left_y),
            step: (step_x, step_y),
            scale,
            stencil_color,
            alpha,
        })
    }

    /// Render one pattern cell into a fresh tile surface with a child
    /// renderer.
    fn render_tile(
        &mut self,
        tiling: &TilingPattern,
        tile_width: usize,
        tile_height: usize,
        scale: (f32, f32),
    ) -> RenderResult<Surface> {
        let surface = Surface::new(tile_width, tile_height, SurfaceFormat::Argb32Premul);

        // pattern space -> tile pixels, y flipped
        let tile_ctm = Matrix::translation(-tiling.bbox.lower_left_x, -tiling.bbox.lower_left_y)
            * Matrix::scale(scale.0, scale.1)
            * Matrix::scale(1.0, -1.0)
            * Matrix::translation(0.0, tile_height as f32);

        let resources = match &tiling.resources {
            Some(dict) => Resources::from_dict(Some(dict), self.resolver),
            None => self.resources().clone(),
        };

        let params = RenderParams {
            font_shaper: Some(self.shaper.clone()),
            cancel: self.cancel.clone(),
            ..RenderParams::default()
        };

        let mut child = Renderer::new(self.resolver, surface, resources, tile_ctm, &params);
        child.xobject_depth = self.xobject_depth + 1;

        if child.xobject_depth > MAX_XOBJECT_DEPTH {
            return Err(RenderError::ResourceExhausted {
                what: "pattern recursion too deep",
            });
        }

        let content = decode_stream(&tiling.stream.data, &tiling.stream.dict, self.resolver)?;
        child.render_content(&content)?;

        let (tile, mut warnings) = child.into_output();
        self.warnings.append(&mut warnings);

        Ok(tile)
    }

    /// `sh`: fill the current clip region with a shading.
    fn paint_shading(&mut self, name: &str) -> RenderResult<()> {
        let shading = self.resources().shading(name)?;

        let inv = self
            .graphics_state
            .ctm
            .invert()
            .ok_or_else(|| RenderError::decode("singular CTM for sh"))?;

        let mask = CoverageMask::full(self.surface.width(), self.surface.height());

        let source = PaintSource::Gradient {
            shading,
            inv,
            alpha: self.graphics_state.fill_alpha,
        };

        self.composite_mask(&mask, &source);

        Ok(())
    }

    /// Multiply a rasterized path into the clip region. A degenerate mask
    /// clips everything out.
    fn intersect_clip(&mut self, mask: Option<CoverageMask>) {
        let width = self.surface.width();
        let height = self.surface.height();

        let mut plane = match &self.graphics_state.clip {
            Some(plane) => plane.as_ref().clone(),
            None => vec![255u8; width * height],
        };

        match mask {
            Some(mask) => mask.intersect_into_page(&mut plane, width, height),
            None => plane.fill(0),
        }

        self.graphics_state.clip = Some(Rc::new(plane));
    }

    /// The composite loop every paint funnels through: modulate coverage
    /// by the clip region and soft mask, sample the source, and composite
    /// with the current blend mode.
    fn composite_mask(&mut self, mask: &CoverageMask, source: &PaintSource) {
        let (x0, y0, mask_width, mask_height) = mask.bounds();
        let width = self.surface.width();
        let blend = self.graphics_state.blend_mode;
        let clip = self.graphics_state.clip.clone();
        let soft_mask = self.graphics_state.soft_mask.clone();

        for y in y0..y0 + mask_height as i32 {
            for x in x0..x0 + mask_width as i32 {
                let mut coverage = mask.coverage(x, y);

                if coverage == 0 {
                    continue;
                }

                let index = y as usize * width + x as usize;

                if let Some(clip) = &clip {
                    coverage = mul_div_255(coverage, clip[index]);
                }
                if let Some(soft) = &soft_mask {
                    coverage = mul_div_255(coverage, soft[index]);
                }
                if coverage == 0 {
                    continue;
                }

                let (src, extra) = source.sample(x, y);
                let coverage = mul_div_255(coverage, extra);

                if coverage == 0 || (src[3] == 0 && blend == BlendMode::Normal) {
                    continue;
                }

                let dst = match &self.knockout_backdrop {
                    Some(backdrop) => backdrop.pixel(x as usize, y as usize),
                    None => self.surface.pixel(x as usize, y as usize),
                };

                let out = composite_pixel(dst, src, coverage, CompositeOperator::Over, blend);
                self.surface.put_pixel(x as usize, y as usize, out);
            }
        }
    }

    /// Paint the XObject named in the current resource dictionary. The
    /// effect depends on the XObject's subtype.
    fn paint_xobject(&mut self, name: &str) -> RenderResult<()> {
        let (xobject, reference) = self.resources().xobject(name)?;

        match xobject {
            XObject::Image(image) => self.paint_image(&image, reference),
            XObject::Form(form) => self.paint_form(&form, reference),
        }
    }

    /// Place an image XObject over the unit square under the CTM.
    fn paint_image(
        &mut self,
        image: &Rc<ImageXObject>,
        reference: Option<Reference>,
    ) -> RenderResult<()> {
        let ctm = self.graphics_state.ctm;

        let inv = ctm
            .invert()
            .ok_or_else(|| RenderError::decode("singular CTM for image"))?;

        let quad = [vec![
            ctm.transform_point(0.0, 0.0),
            ctm.transform_point(1.0, 0.0),
            ctm.transform_point(1.0, 1.0),
            ctm.transform_point(0.0, 1.0),
        ]];

        let mask = match fill_polygons(
            &quad,
            FillRule::NonZero,
            self.surface.width(),
            self.surface.height(),
        ) {
            Some(mask) => mask,
            None => return Ok(()),
        };

        let source = if image.image_mask {
            let stencil = image.decode_stencil(self.resolver)?;
            let color = premultiply(
                self.graphics_state
                    .fill_paint
                    .srgba(self.graphics_state.fill_alpha),
            );

            PaintSource::Stencil {
                stencil,
                inv,
                color,
            }
        } else {
            let decoded = match reference.and_then(|r| self.cache.images.get(&r)) {
                Some(decoded) => decoded,
                None => {
                    let decoded = Rc::new(image.decode_rgba(self.resolver)?);
                    if let Some(reference) = reference {
                        self.cache.images.insert(reference, decoded.clone());
                    }
                    decoded
                }
            };

            PaintSource::Image {
                decoded,
                inv,
                interpolate: image.interpolate,
                alpha: self.graphics_state.fill_alpha,
            }
        };

        self.composite_mask(&mask, &source);

        Ok(())
    }

    fn paint_inline_image(&mut self, inline: InlineImage) -> RenderResult<()> {
        let resources = self.resources().clone();

        let image = ImageXObject::from_inline(inline.dict, inline.data, self.resolver, &|name| {
            resources.color_space_opt(name)
        })?;

        self.paint_image(&Rc::new(image), None)
    }

    /// Execute a form XObject: concatenate its matrix, clip to its BBox,
    /// bring its resources into scope, and run its content stream,
    /// through an off-screen surface when a transparency group is
    /// attached.
    fn paint_form(
        &mut self,
        form: &Rc<FormXObject>,
        reference: Option<Reference>,
    ) -> RenderResult<()> {
        if self.xobject_depth >= MAX_XOBJECT_DEPTH {
            return Err(RenderError::ResourceExhausted {
                what: "form XObject recursion too deep",
            });
        }

        if let Some(reference) = reference {
            if !self.active_xobjects.insert(reference) {
                return Err(RenderError::ResourceExhausted {
                    what: "form XObject cycle",
                });
            }
        }

        self.xobject_depth += 1;
        self.save_graphics_state();

        self.graphics_state.ctm = form.matrix * self.graphics_state.ctm;

        // clip to the form's bounding box
        let mut bbox_path = Path::new();
        bbox_path.rect(
            form.bbox.lower_left_x,
            form.bbox.lower_left_y,
            form.bbox.width(),
            form.bbox.height(),
        );
        let polygons: Vec<Vec<(f32, f32)>> = bbox_path
            .flatten(&self.graphics_state.ctm, FLATTEN_TOLERANCE)
            .into_iter()
            .map(|(points, _)| points)
            .collect();
        self.intersect_clip(fill_polygons(
            &polygons,
            FillRule::NonZero,
            self.surface.width(),
            self.surface.height(),
        ));

        let resources = match &form.resources {
            Some(dict) => Resources::from_dict(Some(dict), self.resolver),
            None => self.resources().clone(),
        };
        self.resources_stack.push(resources);

        let result = decode_stream(&form.stream.data, &form.stream.dict, self.resolver)
            .map(|content| content.into_owned())
            .and_then(|content| match &form.group {
                Some(group) => self.render_group(&content, group),
                None => self.render_content(&content),
            });

        self.resources_stack.pop();
        self.restore_graphics_state();
        self.xobject_depth -= 1;

        if let Some(reference) = reference {
            self.active_xobjects.remove(&reference);
        }

        result
    }

    /// Render content into a transparency-group surface, then composite
    /// the group onto the backdrop as a unit with the group-entry blend
    /// mode, alpha and soft mask.
    fn render_group(&mut self, content: &[u8], group: &TransparencyGroup) -> RenderResult<()> {
        let outer_blend = self.graphics_state.blend_mode;
        let outer_alpha = self.graphics_state.fill_alpha;
        let outer_soft_mask = self.graphics_state.soft_mask.clone();
        let outer_clip = self.graphics_state.clip.clone();

        let mut swapped = if group.isolated {
            Surface::new(
                self.surface.width(),
                self.surface.height(),
                SurfaceFormat::Argb32Premul,
            )
        } else {
            self.surface.clone()
        };

        // blend parameters implicitly reset at group entry
        self.graphics_state.blend_mode = BlendMode::Normal;
        self.graphics_state.fill_alpha = 1.0;
        self.graphics_state.stroke_alpha = 1.0;
        self.graphics_state.soft_mask = None;

        std::mem::swap(&mut self.surface, &mut swapped);

        let saved_knockout = self.knockout_backdrop.take();
        if group.knockout {
            self.knockout_backdrop = Some(Rc::new(self.surface.clone()));
        }

        let result = self.render_content(content);

        self.knockout_backdrop = saved_knockout;

        // surface becomes the backdrop again; swapped holds the group
        std::mem::swap(&mut self.surface, &mut swapped);

        if result.is_ok() {
            self.composite_group(
                &swapped,
                group.isolated,
                outer_blend,
                outer_alpha,
                &outer_soft_mask,
                &outer_clip,
            );
        }

        result
    }

    fn composite_group(
        &mut self,
        group: &Surface,
        isolated: bool,
        blend: BlendMode,
        alpha: f32,
        soft_mask: &Option<AlphaPlane>,
        clip: &Option<AlphaPlane>,
    ) {
        let width = self.surface.width();
        let height = self.surface.height();
        let alpha_byte = (alpha.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;

        for y in 0..height {
            for x in 0..width {
                let index = y * width + x;

                let mut factor = alpha_byte;
                if let Some(soft) = soft_mask {
                    factor = mul_div_255(factor, soft[index]);
                }
                if let Some(clip) = clip {
                    factor = mul_div_255(factor, clip[index]);
                }

                if factor == 0 {
                    continue;
                }

                let g = group.pixel(x, y);
                let dst = self.surface.pixel(x, y);

                let out = if isolated {
                    if g[3] == 0 && blend == BlendMode::Normal {
                        continue;
                    }

                    composite_pixel(dst, g, factor, CompositeOperator::Over, blend)
                } else {
                    // the group started from the backdrop: interpolate
                    let mut out = [0u8; 4];
                    for i in 0..4 {
                        out[i] = mul_div_255(dst[i], 255 - factor)
                            .saturating_add(mul_div_255(g[i], factor));
                    }
                    out
                };

                self.surface.put_pixel(x, y, out);
            }
        }
    }

    /// Render an ExtGState soft mask group and reduce it to a per-pixel
    /// alpha plane.
    fn build_soft_mask(&mut self, source: &SoftMaskSource) -> RenderResult<Option<AlphaPlane>> {
        let (luminosity, group, backdrop) = match source {
            SoftMaskSource::None => return Ok(None),
            SoftMaskSource::Mask {
                luminosity,
                group,
                backdrop,
            } => (*luminosity, group, backdrop),
        };

        let form = FormXObject::from_stream(group.clone(), self.resolver)?;

        let mut mask_surface = Surface::new(
            self.surface.width(),
            self.surface.height(),
            SurfaceFormat::Argb32Premul,
        );

        if luminosity {
            // the luminosity backdrop defaults to black
            let bc = backdrop.as_deref().unwrap_or(&[]);
            let rgba = match &form.group {
                Some(group) if !bc.is_empty() => group
                    .color_space
                    .as_ref()
                    .map(|space| space.to_srgba(bc, 1.0))
                    .unwrap_or([0.0, 0.0, 0.0, 1.0]),
                _ => [0.0, 0.0, 0.0, 1.0],
            };

            mask_surface.clear(rgba);
        }

        std::mem::swap(&mut self.surface, &mut mask_surface);

        self.save_graphics_state();
        let saved_stack_len = self.graphics_state_stack.len();

        self.graphics_state.clip = None;
        self.graphics_state.soft_mask = None;
        self.graphics_state.blend_mode = BlendMode::Normal;
        self.graphics_state.fill_alpha = 1.0;
        self.graphics_state.stroke_alpha = 1.0;

        let result = (|| -> RenderResult<()> {
            self.graphics_state.ctm = form.matrix * self.graphics_state.ctm;

            let resources = match &form.resources {
                Some(dict) => Resources::from_dict(Some(dict), self.resolver),
                None => self.resources().clone(),
            };
            self.resources_stack.push(resources);

            let content = decode_stream(&form.stream.data, &form.stream.dict, self.resolver)?;
            let render_result = self.render_content(&content);

            self.resources_stack.pop();
            render_result
        })();

        debug_assert_eq!(self.graphics_state_stack.len(), saved_stack_len);
        self.restore_graphics_state();

        std::mem::swap(&mut self.surface, &mut mask_surface);

        result?;

        let width = mask_surface.width();
        let height = mask_surface.height();
        let mut plane = vec![0u8; width * height];

        for y in 0..height {
            for x in 0..width {
                let px = mask_surface.pixel(x, y);

                plane[y * width + x] = if luminosity {
                    let [r, g, b, _] = unpremultiply(px);
                    (0.3 * r as f32 + 0.59 * g as f32 + 0.11 * b as f32 + 0.5) as u8
                } else {
                    px[3]
                };
            }
        }

        Ok(Some(Rc::new(plane)))
    }

    /// Render the page's annotations after its content streams.
    pub fn render_annotations(&mut self, page: &PageObject) -> RenderResult<()> {
        for dict in &page.annotations {
            let annotation = match Annotation::from_dict(dict, self.resolver) {
                Ok(annotation) => annotation,
                Err(err) => {
                    warn!("skipping malformed annotation: {}", err);
                    self.warnings.push(Warning::new(err.to_string()));
                    continue;
                }
            };

            if annotation.is_hidden() {
                continue;
            }

            if let Some(cancel) = &self.cancel {
                if cancel.is_cancelled() {
                    return Err(RenderError::Cancelled);
                }
            }

            if let Err(err) = self.render_annotation(&annotation) {
                if err.is_recoverable() {
                    warn!("skipping annotation: {}", err);
                    self.warnings.push(Warning::new(err.to_string()));
                } else {
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    fn render_annotation(&mut self, annotation: &Annotation) -> RenderResult<()> {
        if let Some(appearance) = &annotation.appearance {
            return self.render_appearance_stream(annotation, appearance.clone());
        }

        crate::annotation::synthesize_appearance(self, annotation)
    }

    /// Map an appearance stream's (transformed) BBox onto the
    /// annotation's Rect and execute it as a form.
    fn render_appearance_stream(
        &mut self,
        annotation: &Annotation,
        stream: Arc<crate::objects::StreamObject>,
    ) -> RenderResult<()> {
        let form = Rc::new(FormXObject::from_stream(stream, self.resolver)?);

        let bounds = form.bbox.transformed_bounds(&form.matrix);
        let rect = annotation.rect;

        let scale_x = if bounds.width() > 0.0 {
            rect.width() / bounds.width()
        } else {
            1.0
        };
        let scale_y = if bounds.height() > 0.0 {
            rect.height() / bounds.height()
        } else {
            1.0
        };

        let placement = Matrix::translation(-bounds.lower_left_x, -bounds.lower_left_y)
            * Matrix::scale(scale_x, scale_y)
            * Matrix::translation(rect.lower_left_x, rect.lower_left_y);

        self.save_graphics_state();
        self.graphics_state.ctm = placement * self.base_ctm;

        let result = self.paint_form(&form, None);

        self.restore_graphics_state();

        result
    }

    /// Fill a path given in page coordinates with a straight-alpha color,
    /// bypassing the current paint. Annotation synthesis runs through
    /// this.
    pub(crate) fn fill_page_path(&mut self, path: &Path, rgba: [f32; 4]) {
        let polygons: Vec<Vec<(f32, f32)>> = path
            .flatten(&self.base_ctm, FLATTEN_TOLERANCE)
            .into_iter()
            .map(|(points, _)| points)
            .collect();

        if let Some(mask) = fill_polygons(
            &polygons,
            FillRule::NonZero,
            self.surface.width(),
            self.surface.height(),
        ) {
            let source = PaintSource::Solid(premultiply(rgba));
            self.composite_mask(&mask, &source);
        }
    }

    /// Stroke a path given in page coordinates with a straight-alpha
    /// color and width, bypassing the graphics state.
    pub(crate) fn stroke_page_path(&mut self, path: &Path, rgba: [f32; 4], width: f32) {
        let flattened = path.flatten(&self.base_ctm, FLATTEN_TOLERANCE);
        let scale = self.base_ctm.mapped_line_width();

        let style = StrokeStyle {
            width: (width * scale).max(1.0),
            cap: LineCap::Butt,
            join: LineJoin::Miter,
            miter_limit: 10.0,
            dash_array: Vec::new(),
            dash_phase: 0.0,
        };

        let polygons = crate::raster::stroke::stroke_polylines(&flattened, &style);

        if let Some(mask) = fill_polygons(
            &polygons,
            FillRule::NonZero,
            self.surface.width(),
            self.surface.height(),
        ) {
            let source = PaintSource::Solid(premultiply(rgba));
            self.composite_mask(&mask, &source);
        }
    }

    /// Draw a short single-line string in page coordinates with the
    /// fallback shaper. Used for synthesized widget values.
    pub(crate) fn draw_label(&mut self, text: &str, x: f32, y: f32, size: f32, rgba: [f32; 4]) {
        let font = Font::fallback();
        let shaper = BoxGlyphShaper;
        let mut pen_x = x;

        for byte in text.bytes() {
            let glyph = match shaper.glyph(&font, byte as u32) {
                Some(glyph) => glyph,
                None => continue,
            };

            if let Some(outline) = &glyph.outline {
                let placement = Matrix::scale(size, size) * Matrix::translation(pen_x, y);
                let polygons: Vec<Vec<(f32, f32)>> = outline
                    .flatten(&(placement * self.base_ctm), FLATTEN_TOLERANCE)
                    .into_iter()
                    .map(|(points, _)| points)
                    .collect();

                if let Some(mask) = fill_polygons(
                    &polygons,
                    FillRule::NonZero,
                    self.surface.width(),
                    self.surface.height(),
                ) {
                    let source = PaintSource::Solid(premultiply(rgba));
                    self.composite_mask(&mask, &source);
                }
            }

            pen_x += glyph.advance * size;
        }
    }
}

fn device_paint(space: ColorSpace, components: Vec<f32>) -> Paint {
    Paint {
        color_space: Rc::new(space),
        components,
        pattern: None,
    }
}

#[cfg(test)]
mod test;
