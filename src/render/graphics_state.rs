use std::rc::Rc;

use crate::{
    color::ColorSpace,
    data_structures::Matrix,
    raster::{BlendMode, LineCap, LineJoin},
    render::text_state::TextState,
    resources::graphics_state_parameters::RenderingIntent,
    resources::pattern::Pattern,
};

/// A full-page alpha plane. Used for both the clip region and the soft
/// mask; shared by reference so `q` stays cheap.
pub type AlphaPlane = Rc<Vec<u8>>;

/// One paint target: a color in its color space, or a pattern.
#[derive(Debug, Clone)]
pub struct Paint {
    pub color_space: Rc<ColorSpace>,
    pub components: Vec<f32>,
    pub pattern: Option<Rc<Pattern>>,
}

impl Paint {
    pub fn black() -> Self {
        Self {
            color_space: Rc::new(ColorSpace::DeviceGray),
            components: vec![0.0],
            pattern: None,
        }
    }

    /// The paint as straight-alpha sRGB. Patterns have no single color;
    /// callers check `pattern` first.
    pub fn srgba(&self, alpha: f32) -> [f32; 4] {
        self.color_space.to_srgba(&self.components, alpha)
    }
}

/// The graphics state. `q` clones the whole structure onto a stack and
/// `Q` pops it; everything here is either `Copy` or behind an `Rc`, so the
/// clone is shallow.
#[derive(Debug, Clone)]
pub struct GraphicsState {
    /// The current transformation matrix, mapping user space positions to
    /// device coordinates. Modified by each application of the coordinate
    /// transformation operator, `cm`.
    pub ctm: Matrix,

    /// The current clipping region as a device-space alpha plane; `None`
    /// is the whole page. Painting multiplies through this.
    pub clip: Option<AlphaPlane>,

    pub stroke_paint: Paint,
    pub fill_paint: Paint,

    /// The thickness, in user space units, of paths to be stroked.
    ///
    /// Initial value: 1.0.
    pub line_width: f32,

    /// The shape of the endpoints of any open stroked path.
    ///
    /// Initial value: 0, for square butt caps.
    pub line_cap: LineCap,

    /// The shape of joints between connected segments of a stroked path.
    ///
    /// Initial value: 0, for mitered joins.
    pub line_join: LineJoin,

    /// Limits the length of spikes produced when line segments join at
    /// sharp angles.
    ///
    /// Initial value: 10.0, for a miter cutoff below approximately 11.5
    /// degrees.
    pub miter_limit: f32,

    /// The dash pattern to be used when paths are stroked: the on/off
    /// cycle and the starting phase.
    ///
    /// Initial value: a solid line.
    pub dash_array: Vec<f32>,
    pub dash_phase: f32,

    /// The rendering intent for CIE-based color conversion. Parsed and
    /// carried; the conversion path here implements relative colorimetric
    /// behavior for all intents.
    pub rendering_intent: RenderingIntent,

    /// The maximum curve-flattening error in device pixels.
    pub flatness: f32,

    /// The blend mode for the transparent imaging model.
    ///
    /// Initial value: Normal.
    pub blend_mode: BlendMode,

    /// The constant alpha for non-stroking and stroking operations.
    ///
    /// Initial value: 1.0.
    pub fill_alpha: f32,
    pub stroke_alpha: f32,

    /// The soft mask as a device-space alpha plane, or `None`.
    pub soft_mask: Option<AlphaPlane>,

    /// Whether the soft mask and alpha constants are shape (true) or
    /// opacity (false) values.
    pub alpha_is_shape: bool,

    /// Whether text in a knockout group composites against the group
    /// backdrop glyph by glyph.
    pub text_knockout: bool,

    /// The overprint controls. Carried for `gs`/`OPM` fidelity; an sRGB
    /// raster target has no separate colorants to leave unchanged.
    pub overprint_mode: i32,

    pub text: TextState,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::identity(),
            clip: None,
            stroke_paint: Paint::black(),
            fill_paint: Paint::black(),
            line_width: 1.0,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            miter_limit: 10.0,
            dash_array: Vec::new(),
            dash_phase: 0.0,
            rendering_intent: RenderingIntent::RelativeColorimetric,
            flatness: 1.0,
            blend_mode: BlendMode::Normal,
            fill_alpha: 1.0,
            stroke_alpha: 1.0,
            soft_mask: None,
            alpha_is_shape: false,
            text_knockout: true,
            overprint_mode: 0,
            text: TextState::default(),
        }
    }
}
