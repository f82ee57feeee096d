use std::{rc::Rc, sync::Arc};

use crate::{
    data_structures::{Matrix, Rectangle},
    error::{RenderError, RenderResult},
    objects::{Dictionary, Object, StreamObject},
    pdf_enum,
    resolve::Resolve,
    shading::Shading,
};

#[derive(Debug, Clone)]
pub enum Pattern {
    /// Tiling patterns consist of a small graphical figure (called a
    /// pattern cell) that is replicated at fixed horizontal and vertical
    /// intervals to fill the area to be painted. The graphics objects to
    /// use for tiling are described by a content stream.
    Tiling(TilingPattern),

    /// Shading patterns define a gradient fill that produces a smooth
    /// transition between colours across the area.
    Shading(ShadingPattern),
}

impl Pattern {
    pub fn from_obj(obj: Object, resolver: &dyn Resolve) -> RenderResult<Self> {
        match resolver.resolve(obj)? {
            Object::Stream(stream) => {
                Ok(Pattern::Tiling(TilingPattern::from_stream(stream, resolver)?))
            }
            Object::Dictionary(dict) => Ok(Pattern::Shading(ShadingPattern::from_dict(
                &dict, resolver,
            )?)),
            obj => Err(RenderError::decode(format!(
                "invalid pattern object: {:?}",
                obj
            ))),
        }
    }

    pub fn matrix(&self) -> Matrix {
        match self {
            Pattern::Tiling(tiling) => tiling.matrix,
            Pattern::Shading(shading) => shading.matrix,
        }
    }
}

pdf_enum!(
    int
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum PaintType {
        /// The pattern's content stream specifies its own colours
        Colored = 1,

        /// The content stream is a stencil through which the separately
        /// specified current colour is poured; it may not set colours
        /// itself
        Uncolored = 2,
    }
);

pdf_enum!(
    int
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum TilingType {
        /// Pattern cells spaced by a consistent multiple of a device pixel,
        /// distorting the cell by up to one pixel if needed
        ConstantSpacing = 1,

        /// The cell is never distorted; spacing between cells may vary by
        /// up to one device pixel
        NoDistortion = 2,

        /// Constant spacing with additional distortion permitted for a
        /// more efficient implementation
        ConstantSpacingAndFasterTiling = 3,
    }
);

#[derive(Debug, Clone)]
pub struct TilingPattern {
    /// A code that determines how the colour of the pattern cell shall be
    /// specified
    pub paint_type: PaintType,

    /// A code that controls adjustments to the spacing of tiles relative
    /// to the device pixel grid
    pub tiling_type: TilingType,

    /// The pattern cell's bounding box in the pattern coordinate system,
    /// used to clip the cell
    pub bbox: Rectangle,

    /// The desired horizontal spacing between pattern cells, measured in
    /// the pattern coordinate system
    pub x_step: f32,

    /// The desired vertical spacing between pattern cells.
    ///
    /// XStep and YStep may differ from the dimensions of the cell implied
    /// by BBox, allowing tiling with irregularly shaped figures; either
    /// may be negative, but not zero
    pub y_step: f32,

    /// The named resources required by the pattern's content stream
    pub resources: Option<Dictionary>,

    /// Maps pattern space into the default coordinate space of the
    /// pattern's parent content stream.
    ///
    /// Default value: the identity matrix.
    pub matrix: Matrix,

    pub stream: Arc<StreamObject>,
}

impl TilingPattern {
    pub fn from_stream(stream: Arc<StreamObject>, resolver: &dyn Resolve) -> RenderResult<Self> {
        let dict = &stream.dict;

        let paint_type = PaintType::from_integer(dict.expect_integer("PaintType", resolver)?)?;
        let tiling_type = TilingType::from_integer(dict.expect_integer("TilingType", resolver)?)?;
        let bbox = dict.expect_rectangle("BBox", resolver)?;
        let x_step = dict.expect_number("XStep", resolver)?;
        let y_step = dict.expect_number("YStep", resolver)?;
        let resources = dict.get_dict("Resources", resolver)?;
        let matrix = dict
            .get_matrix("Matrix", resolver)?
            .unwrap_or_else(Matrix::identity);

        if x_step == 0.0 || y_step == 0.0 {
            return Err(RenderError::decode("tiling pattern step of zero"));
        }

        Ok(Self {
            paint_type,
            tiling_type,
            bbox,
            x_step,
            y_step,
            resources,
            matrix,
            stream,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ShadingPattern {
    /// The shading defining this pattern's gradient fill
    pub shading: Rc<Shading>,

    /// Maps the shading's target coordinate space into the default space
    /// of the pattern's parent content stream.
    ///
    /// Default value: the identity matrix.
    pub matrix: Matrix,
}

impl ShadingPattern {
    pub fn from_dict(dict: &Dictionary, resolver: &dyn Resolve) -> RenderResult<Self> {
        let shading = dict
            .get("Shading", resolver)?
            .ok_or_else(|| RenderError::missing("Shading"))?;

        let matrix = dict
            .get_matrix("Matrix", resolver)?
            .unwrap_or_else(Matrix::identity);

        Ok(Self {
            shading: Rc::new(Shading::from_obj(shading, resolver)?),
            matrix,
        })
    }
}
