use std::{rc::Rc, sync::Arc};

use crate::{
    error::{RenderError, RenderResult},
    objects::StreamObject,
    resolve::Resolve,
};

pub use form::{FormXObject, TransparencyGroup};
pub use image::{DecodedImage, DecodedStencil, ImageXObject};

mod form;
mod image;

#[derive(Debug, Clone)]
pub enum XObject {
    Form(Rc<FormXObject>),
    Image(Rc<ImageXObject>),
}

impl XObject {
    pub fn from_stream(stream: Arc<StreamObject>, resolver: &dyn Resolve) -> RenderResult<Self> {
        let subtype = stream.dict.expect_name("Subtype", resolver)?;

        match subtype.as_str() {
            "Image" => Ok(XObject::Image(Rc::new(ImageXObject::from_stream(
                stream, resolver,
            )?))),
            "Form" => Ok(XObject::Form(Rc::new(FormXObject::from_stream(
                stream, resolver,
            )?))),
            subtype => Err(RenderError::unsupported(format!(
                "XObject subtype {:?}",
                subtype
            ))),
        }
    }
}
