use std::{collections::HashMap, rc::Rc};

use log::warn;

use crate::{
    color::ColorSpace,
    error::{RenderError, RenderResult},
    font::Font,
    objects::{Dictionary, Object, Reference},
    resolve::Resolve,
    shading::Shading,
    xobject::XObject,
};

use self::{graphics_state_parameters::GraphicsStateParameters, pattern::Pattern};

pub mod graphics_state_parameters;
pub mod pattern;

/// The resource tables of one content stream: name → object maps for each
/// resource kind.
///
/// Tables are parsed eagerly when a page or form comes into scope; an
/// entry that fails to parse is logged and dropped, so referencing it
/// later degrades to `InvalidReference` and a skipped operator rather
/// than a failed page.
#[derive(Debug, Default)]
pub struct Resources {
    /// Maps resource names to graphics state parameter dictionaries
    ext_g_state: HashMap<String, Rc<GraphicsStateParameters>>,

    /// Maps resource names to color spaces
    color_space: HashMap<String, Rc<ColorSpace>>,

    /// Maps resource names to pattern objects
    pattern: HashMap<String, Rc<Pattern>>,

    /// Maps resource names to shading dictionaries
    shading: HashMap<String, Rc<Shading>>,

    /// Maps resource names to external objects, remembering the indirect
    /// reference behind each one so decoded results can be cached by
    /// object identity
    xobject: HashMap<String, (XObject, Option<Reference>)>,

    /// Maps resource names to fonts
    font: HashMap<String, Rc<Font>>,

    /// Maps resource names to marked-content property lists
    properties: HashMap<String, Dictionary>,
}

impl Resources {
    pub fn from_dict(dict: Option<&Dictionary>, resolver: &dyn Resolve) -> Rc<Self> {
        let dict = match dict {
            Some(dict) => dict,
            None => return Rc::new(Self::default()),
        };

        let mut resources = Self::default();

        for_each_entry(dict, "ExtGState", resolver, |name, obj| {
            let params = GraphicsStateParameters::from_dict(&resolver.assert_dict(obj)?, resolver)?;
            resources.ext_g_state.insert(name, Rc::new(params));
            Ok(())
        });

        for_each_entry(dict, "ColorSpace", resolver, |name, obj| {
            let space = ColorSpace::from_obj(obj, resolver)?;
            resources.color_space.insert(name, Rc::new(space));
            Ok(())
        });

        for_each_entry(dict, "Pattern", resolver, |name, obj| {
            let pattern = Pattern::from_obj(obj, resolver)?;
            resources.pattern.insert(name, Rc::new(pattern));
            Ok(())
        });

        for_each_entry(dict, "Shading", resolver, |name, obj| {
            let shading = Shading::from_obj(obj, resolver)?;
            resources.shading.insert(name, Rc::new(shading));
            Ok(())
        });

        for_each_entry(dict, "XObject", resolver, |name, obj| {
            let reference = match &obj {
                Object::Reference(r) => Some(*r),
                _ => None,
            };

            let xobject = XObject::from_stream(resolver.assert_stream(obj)?, resolver)?;
            resources.xobject.insert(name, (xobject, reference));
            Ok(())
        });

        for_each_entry(dict, "Font", resolver, |name, obj| {
            let font = Font::from_dict(&resolver.assert_dict(obj)?, resolver)?;
            resources.font.insert(name, Rc::new(font));
            Ok(())
        });

        for_each_entry(dict, "Properties", resolver, |name, obj| {
            resources
                .properties
                .insert(name, resolver.assert_dict(obj)?);
            Ok(())
        });

        Rc::new(resources)
    }

    pub fn ext_g_state(&self, name: &str) -> RenderResult<Rc<GraphicsStateParameters>> {
        self.ext_g_state
            .get(name)
            .cloned()
            .ok_or_else(|| RenderError::missing(format!("ExtGState /{}", name)))
    }

    pub fn color_space(&self, name: &str) -> RenderResult<Rc<ColorSpace>> {
        self.color_space
            .get(name)
            .cloned()
            .ok_or_else(|| RenderError::missing(format!("ColorSpace /{}", name)))
    }

    pub fn color_space_opt(&self, name: &str) -> Option<Rc<ColorSpace>> {
        self.color_space.get(name).cloned()
    }

    pub fn pattern(&self, name: &str) -> RenderResult<Rc<Pattern>> {
        self.pattern
            .get(name)
            .cloned()
            .ok_or_else(|| RenderError::missing(format!("Pattern /{}", name)))
    }

    pub fn shading(&self, name: &str) -> RenderResult<Rc<Shading>> {
        self.shading
            .get(name)
            .cloned()
            .ok_or_else(|| RenderError::missing(format!("Shading /{}", name)))
    }

    pub fn xobject(&self, name: &str) -> RenderResult<(XObject, Option<Reference>)> {
        self.xobject
            .get(name)
            .cloned()
            .ok_or_else(|| RenderError::missing(format!("XObject /{}", name)))
    }

    pub fn font(&self, name: &str) -> RenderResult<Rc<Font>> {
        self.font
            .get(name)
            .cloned()
            .ok_or_else(|| RenderError::missing(format!("Font /{}", name)))
    }

    pub fn properties(&self, name: &str) -> Option<&Dictionary> {
        self.properties.get(name)
    }
}

fn for_each_entry(
    dict: &Dictionary,
    kind: &str,
    resolver: &dyn Resolve,
    mut insert: impl FnMut(String, Object) -> RenderResult<()>,
) {
    let table = match dict.get_dict(kind, resolver) {
        Ok(Some(table)) => table,
        Ok(None) => return,
        Err(err) => {
            warn!("skipping malformed {} resource table: {}", kind, err);
            return;
        }
    };

    for (name, obj) in table.entries() {
        if let Err(err) = insert(name.clone(), obj.clone()) {
            warn!("skipping {} resource /{}: {}", kind, name, err);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resolve::NullResolver;

    #[test]
    fn missing_names_report_invalid_reference() {
        let resources = Resources::from_dict(None, &NullResolver);

        assert!(matches!(
            resources.font("F1"),
            Err(RenderError::InvalidReference { .. })
        ));
    }

    #[test]
    fn a_bad_entry_does_not_poison_the_table() {
        let mut color_spaces = Dictionary::empty();
        color_spaces.insert("Good", Object::Name("DeviceRGB".to_owned()));
        color_spaces.insert("Bad", Object::Integer(42));

        let mut dict = Dictionary::empty();
        dict.insert("ColorSpace", Object::Dictionary(color_spaces));

        let resources = Resources::from_dict(Some(&dict), &NullResolver);

        assert!(resources.color_space("Good").is_ok());
        assert!(resources.color_space("Bad").is_err());
    }
}
