use std::sync::Arc;

use crate::{
    error::RenderResult,
    objects::{Dictionary, Object, StreamObject},
    pdf_enum,
    raster::{BlendMode, LineCap, LineJoin},
    resolve::Resolve,
};

pdf_enum!(
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum RenderingIntent {
        AbsoluteColorimetric = "AbsoluteColorimetric",
        RelativeColorimetric = "RelativeColorimetric",
        Saturation = "Saturation",
        Perceptual = "Perceptual",
    }
);

impl Default for RenderingIntent {
    fn default() -> Self {
        RenderingIntent::RelativeColorimetric
    }
}

/// The `SMask` entry of an ExtGState: either the name `/None`, clearing
/// the soft mask, or a mask dictionary whose `G` group renders to the
/// per-pixel mask values.
#[derive(Debug, Clone)]
pub enum SoftMaskSource {
    None,
    Mask {
        /// `/Luminosity` derives mask values from the rendered group's
        /// luminosity; `/Alpha` from its alpha channel
        luminosity: bool,

        /// The transparency group XObject to render
        group: Arc<StreamObject>,

        /// The color the luminosity group's backdrop is initialized to
        backdrop: Option<Vec<f32>>,
    },
}

/// The recognized subset of a graphics state parameter dictionary
/// (`ExtGState`). Each field is optional: `gs` merges only the keys the
/// dictionary actually carries into the current graphics state. Keys
/// outside this set are ignored.
#[derive(Debug, Clone, Default)]
pub struct GraphicsStateParameters {
    /// `LW`: the line width
    pub line_width: Option<f32>,

    /// `LC`: the line cap style
    pub line_cap: Option<LineCap>,

    /// `LJ`: the line join style
    pub line_join: Option<LineJoin>,

    /// `ML`: the miter limit
    pub miter_limit: Option<f32>,

    /// `D`: the dash pattern, `[dash_array phase]`
    pub dash_pattern: Option<(Vec<f32>, f32)>,

    /// `RI`: the rendering intent
    pub rendering_intent: Option<RenderingIntent>,

    /// `BM`: the blend mode. An array names fallbacks; the first entry
    /// wins here since every separable and non-separable mode is known
    pub blend_mode: Option<BlendMode>,

    /// `CA`: the stroking alpha constant
    pub stroking_alpha: Option<f32>,

    /// `ca`: the nonstroking alpha constant
    pub nonstroking_alpha: Option<f32>,

    /// `SMask`: the soft mask
    pub soft_mask: Option<SoftMaskSource>,

    /// `AIS`: the alpha source flag, selecting between shape and opacity
    /// interpretation of the soft mask and alpha constants
    pub alpha_is_shape: Option<bool>,

    /// `TK`: the text knockout flag
    pub text_knockout: Option<bool>,

    /// `OPM`: the overprint mode
    pub overprint_mode: Option<i32>,

    /// `Font`: `[font_dict size]`, equivalent to `Tf` with an inline font
    pub font: Option<(Dictionary, f32)>,
}

impl GraphicsStateParameters {
    pub fn from_dict(dict: &Dictionary, resolver: &dyn Resolve) -> RenderResult<Self> {
        let line_width = dict.get_number("LW", resolver)?;

        let line_cap = dict
            .get_integer("LC", resolver)?
            .map(LineCap::from_integer)
            .transpose()?;

        let line_join = dict
            .get_integer("LJ", resolver)?
            .map(LineJoin::from_integer)
            .transpose()?;

        let miter_limit = dict.get_number("ML", resolver)?;

        let dash_pattern = match dict.get_arr("D", resolver)? {
            Some(entry) if entry.len() == 2 => {
                let array = resolver
                    .assert_arr(entry[0].clone())?
                    .into_iter()
                    .map(|obj| resolver.assert_number(obj))
                    .collect::<RenderResult<Vec<f32>>>()?;
                let phase = resolver.assert_number(entry[1].clone())?;

                Some((array, phase))
            }
            _ => None,
        };

        let rendering_intent = dict
            .get_name("RI", resolver)?
            .map(|name| RenderingIntent::from_str(&name))
            .transpose()?;

        let blend_mode = match dict.get("BM", resolver)? {
            Some(Object::Name(name)) => Some(BlendMode::from_name(&name)),
            Some(Object::Array(arr)) => arr
                .first()
                .cloned()
                .map(|obj| resolver.assert_name(obj))
                .transpose()?
                .map(|name| BlendMode::from_name(&name)),
            _ => None,
        };

        let stroking_alpha = dict.get_number("CA", resolver)?;
        let nonstroking_alpha = dict.get_number("ca", resolver)?;

        let soft_mask = match dict.get("SMask", resolver)? {
            Some(Object::Name(name)) if name == "None" => Some(SoftMaskSource::None),
            Some(Object::Dictionary(mask_dict)) => {
                let luminosity = mask_dict
                    .get_name("S", resolver)?
                    .map_or(false, |s| s == "Luminosity");

                let group = mask_dict.get_stream("G", resolver)?;
                let backdrop = mask_dict.get_number_arr("BC", resolver)?;

                group.map(|group| SoftMaskSource::Mask {
                    luminosity,
                    group,
                    backdrop,
                })
            }
            _ => None,
        };

        let alpha_is_shape = dict.get_bool("AIS", resolver)?;
        let text_knockout = dict.get_bool("TK", resolver)?;
        let overprint_mode = dict.get_integer("OPM", resolver)?;

        let font = match dict.get_arr("Font", resolver)? {
            Some(entry) if entry.len() == 2 => {
                let font_dict = resolver.assert_dict(entry[0].clone())?;
                let size = resolver.assert_number(entry[1].clone())?;

                Some((font_dict, size))
            }
            _ => None,
        };

        Ok(Self {
            line_width,
            line_cap,
            line_join,
            miter_limit,
            dash_pattern,
            rendering_intent,
            blend_mode,
            stroking_alpha,
            nonstroking_alpha,
            soft_mask,
            alpha_is_shape,
            text_knockout,
            overprint_mode,
            font,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resolve::NullResolver;

    #[test]
    fn unknown_keys_are_ignored() {
        let mut dict = Dictionary::empty();
        dict.insert("LW", Object::Real(2.5));
        dict.insert("SomeVendorKey", Object::True);

        let params = GraphicsStateParameters::from_dict(&dict, &NullResolver).unwrap();

        assert_eq!(params.line_width, Some(2.5));
        assert!(params.blend_mode.is_none());
    }

    #[test]
    fn blend_mode_arrays_take_the_first_entry() {
        let mut dict = Dictionary::empty();
        dict.insert(
            "BM",
            Object::Array(vec![
                Object::Name("Multiply".to_owned()),
                Object::Name("Normal".to_owned()),
            ]),
        );

        let params = GraphicsStateParameters::from_dict(&dict, &NullResolver).unwrap();

        assert_eq!(params.blend_mode, Some(BlendMode::Multiply));
    }

    #[test]
    fn smask_none_clears() {
        let mut dict = Dictionary::empty();
        dict.insert("SMask", Object::Name("None".to_owned()));

        let params = GraphicsStateParameters::from_dict(&dict, &NullResolver).unwrap();

        assert!(matches!(params.soft_mask, Some(SoftMaskSource::None)));
    }
}
