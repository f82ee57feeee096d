use std::rc::Rc;

use crate::{
    color::ColorSpace,
    data_structures::Rectangle,
    error::{RenderError, RenderResult},
    function::Function,
    objects::Object,
    pdf_enum,
    resolve::Resolve,
};

pub use axial::AxialShading;
pub use radial::RadialShading;

mod axial;
mod radial;

pdf_enum!(
    int
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ShadingType {
        FunctionBased = 1,
        Axial = 2,
        Radial = 3,

        /// Free-form Gouraud-shaded triangle mesh
        Freeform = 4,

        /// Lattice-form Gouraud-shaded triangle mesh
        Latticeform = 5,
        CoonsPatchMesh = 6,
        TensorProductPatchMesh = 7,
    }
);

/// The color function of a shading: either one 1-in n-out function, or an
/// array of n 1-in 1-out functions, one per color component.
#[derive(Debug, Clone)]
pub enum ShadingFunction {
    Single(Function),
    PerComponent(Vec<Function>),
}

impl ShadingFunction {
    fn from_obj(obj: Object, resolver: &dyn Resolve) -> RenderResult<Self> {
        match resolver.resolve(obj)? {
            Object::Array(arr) => Ok(ShadingFunction::PerComponent(
                arr.into_iter()
                    .map(|obj| Function::from_obj(obj, resolver))
                    .collect::<RenderResult<Vec<Function>>>()?,
            )),
            obj => Ok(ShadingFunction::Single(Function::from_obj(obj, resolver)?)),
        }
    }

    pub fn eval(&self, t: f32) -> Vec<f32> {
        match self {
            ShadingFunction::Single(function) => function.eval(t),
            ShadingFunction::PerComponent(functions) => functions
                .iter()
                .flat_map(|function| function.eval(t))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ShadingKind {
    Axial(AxialShading),
    Radial(RadialShading),
}

/// A shading dictionary reduced to what painting needs: the geometry kind,
/// the color space, and the color function.
///
/// Mesh shadings (types 4-7) and type 1 function-based shadings are not
/// implemented; they surface as `UnsupportedFeature` and the paint
/// operator is skipped.
#[derive(Debug, Clone)]
pub struct Shading {
    pub kind: ShadingKind,
    pub color_space: Rc<ColorSpace>,

    /// Fills the area outside the shading geometry when the shading is
    /// used as a pattern fill. Not applied by the `sh` operator.
    pub background: Option<Vec<f32>>,

    /// A clip applied in the shading's target coordinate space, in
    /// addition to the current clip.
    pub bbox: Option<Rectangle>,

    pub function: ShadingFunction,
}

impl Shading {
    pub fn from_obj(obj: Object, resolver: &dyn Resolve) -> RenderResult<Self> {
        let dict = resolver.assert_dict(resolver.resolve(obj)?)?;

        let shading_type = ShadingType::from_integer(dict.expect_integer("ShadingType", resolver)?)?;

        let color_space = Rc::new(ColorSpace::from_obj(
            dict.get("ColorSpace", resolver)?
                .ok_or_else(|| RenderError::missing("ColorSpace"))?,
            resolver,
        )?);

        let background = dict.get_number_arr("Background", resolver)?;
        let bbox = dict.get_rectangle("BBox", resolver)?;

        let function = ShadingFunction::from_obj(
            dict.get("Function", resolver)?
                .ok_or_else(|| RenderError::missing("Function"))?,
            resolver,
        )?;

        let kind = match shading_type {
            ShadingType::Axial => ShadingKind::Axial(AxialShading::from_dict(&dict, resolver)?),
            ShadingType::Radial => ShadingKind::Radial(RadialShading::from_dict(&dict, resolver)?),
            ty => {
                return Err(RenderError::unsupported(format!(
                    "shading type {:?}",
                    ty
                )))
            }
        };

        Ok(Self {
            kind,
            color_space,
            background,
            bbox,
            function,
        })
    }

    /// The straight-alpha sRGB color at a point in the shading's target
    /// coordinate space, or `None` where the shading does not paint.
    pub fn color_at(&self, x: f32, y: f32, alpha: f32) -> Option<[f32; 4]> {
        if let Some(bbox) = &self.bbox {
            if x < bbox.lower_left_x
                || x > bbox.upper_right_x
                || y < bbox.lower_left_y
                || y > bbox.upper_right_y
            {
                return None;
            }
        }

        let t = match &self.kind {
            ShadingKind::Axial(axial) => axial.param_at(x, y)?,
            ShadingKind::Radial(radial) => radial.param_at(x, y)?,
        };

        let components = self.function.eval(t);

        Some(self.color_space.to_srgba(&components, alpha))
    }
}
