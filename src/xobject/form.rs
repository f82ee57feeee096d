use std::{rc::Rc, sync::Arc};

use crate::{
    color::ColorSpace,
    data_structures::{Matrix, Rectangle},
    error::RenderResult,
    objects::{Dictionary, StreamObject},
    resolve::Resolve,
};

/// A group attributes dictionary (`/Group` with `/S /Transparency`)
/// attached to a form XObject. When present, the form's contents are
/// composited to an off-screen surface first and then onto the backdrop as
/// a unit.
#[derive(Debug, Clone)]
pub struct TransparencyGroup {
    /// An isolated group starts fully transparent; a non-isolated group is
    /// initialized with the backdrop
    pub isolated: bool,

    /// In a knockout group, members composite against the group's initial
    /// backdrop instead of each other
    pub knockout: bool,

    /// The blending color space of the group. Compositing here is always
    /// carried out in sRGB; the entry is retained for conversion of the
    /// backdrop color of a luminosity soft mask.
    pub color_space: Option<Rc<ColorSpace>>,
}

impl TransparencyGroup {
    pub fn from_dict(dict: &Dictionary, resolver: &dyn Resolve) -> RenderResult<Self> {
        let isolated = dict.get_bool("I", resolver)?.unwrap_or(false);
        let knockout = dict.get_bool("K", resolver)?.unwrap_or(false);

        let color_space = dict
            .get("CS", resolver)?
            .map(|obj| ColorSpace::from_obj(obj, resolver))
            .transpose()?
            .map(Rc::new);

        Ok(Self {
            isolated,
            knockout,
            color_space,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FormXObject {
    /// The form's bounding box in form space. It clips the form's content
    /// and sizes the off-screen surface of a transparency group
    pub bbox: Rectangle,

    /// Maps form space into the space of the invoking content stream
    ///
    /// Default value: the identity matrix.
    pub matrix: Matrix,

    /// The named resources the form's content stream uses. When absent,
    /// lookups fall through to the invoking stream's resources
    pub resources: Option<Dictionary>,

    pub group: Option<TransparencyGroup>,

    pub stream: Arc<StreamObject>,
}

impl FormXObject {
    pub fn from_stream(stream: Arc<StreamObject>, resolver: &dyn Resolve) -> RenderResult<Self> {
        let dict = &stream.dict;

        let bbox = dict.expect_rectangle("BBox", resolver)?;

        let matrix = dict
            .get_matrix("Matrix", resolver)?
            .unwrap_or_else(Matrix::identity);

        let resources = dict.get_dict("Resources", resolver)?;

        let group = match dict.get_dict("Group", resolver)? {
            Some(group_dict)
                if group_dict.get_name("S", resolver)?.as_deref() == Some("Transparency") =>
            {
                Some(TransparencyGroup::from_dict(&group_dict, resolver)?)
            }
            _ => None,
        };

        Ok(Self {
            bbox,
            matrix,
            resources,
            group,
            stream,
        })
    }
}
