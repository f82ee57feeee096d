use std::rc::Rc;

use crate::{
    error::{RenderError, RenderResult},
    function::Function,
    objects::{assert_len, Object},
    resolve::Resolve,
};

mod cie;

/// A color space and its conversion to straight-alpha sRGB.
///
/// The compositor only ever sees sRGBA out of [`ColorSpace::to_srgba`];
/// every variant clamps its output into [0, 1].
#[derive(Debug, Clone)]
pub enum ColorSpace {
    // Device
    DeviceGray,
    DeviceRgb,
    DeviceCmyk,

    // CIE-based
    CalGray {
        white_point: [f32; 3],
        gamma: f32,
    },
    CalRgb {
        white_point: [f32; 3],
        gamma: [f32; 3],
        /// Column-major XYZ conversion: `[XA YA ZA XB YB ZB XC YC ZC]`
        matrix: [f32; 9],
    },
    Lab {
        white_point: [f32; 3],
        /// `[amin amax bmin bmax]`
        range: [f32; 4],
    },

    /// No ICC engine is linked; conversion delegates to the stream's
    /// `Alternate` space, or to the device space matching `N` when the
    /// alternate is absent. This is a documented approximation.
    IccBased {
        n: usize,
        alternate: Rc<ColorSpace>,
    },

    // Special
    Indexed {
        base: Rc<ColorSpace>,
        hival: u32,
        lookup: Vec<u8>,
    },
    Separation {
        alternate: Rc<ColorSpace>,
        tint_transform: Function,
    },
    DeviceN {
        n: usize,
        alternate: Rc<ColorSpace>,
        tint_transform: Function,
    },
    Pattern {
        base: Option<Rc<ColorSpace>>,
    },
}

impl ColorSpace {
    pub fn from_name(name: &str) -> RenderResult<Self> {
        Ok(match name {
            "DeviceGray" | "G" | "CalGray" => ColorSpace::DeviceGray,
            "DeviceRGB" | "RGB" | "CalRGB" => ColorSpace::DeviceRgb,
            "DeviceCMYK" | "CMYK" => ColorSpace::DeviceCmyk,
            "Pattern" => ColorSpace::Pattern { base: None },
            "Indexed" | "I" | "Lab" | "ICCBased" | "Separation" | "DeviceN" => {
                return Err(RenderError::decode(format!(
                    "color space {:?} requires parameters",
                    name
                )))
            }
            _ => {
                return Err(RenderError::unsupported(format!(
                    "color space {:?}",
                    name
                )))
            }
        })
    }

    pub fn from_obj(obj: Object, resolver: &dyn Resolve) -> RenderResult<Self> {
        match resolver.resolve(obj)? {
            Object::Name(name) => Self::from_name(&name),
            Object::Array(arr) => {
                if arr.is_empty() {
                    return Err(RenderError::decode("empty color space array"));
                }

                let name = resolver.assert_name(arr[0].clone())?;

                match name.as_str() {
                    "DeviceGray" | "G" => Ok(ColorSpace::DeviceGray),
                    "DeviceRGB" | "RGB" => Ok(ColorSpace::DeviceRgb),
                    "DeviceCMYK" | "CMYK" => Ok(ColorSpace::DeviceCmyk),
                    "CalGray" => {
                        assert_len(&arr, 2)?;
                        let dict = resolver.assert_dict(arr[1].clone())?;

                        let white_point = triple(
                            dict.get_number_arr("WhitePoint", resolver)?,
                            [1.0, 1.0, 1.0],
                        );
                        let gamma = dict.get_number("Gamma", resolver)?.unwrap_or(1.0);

                        Ok(ColorSpace::CalGray { white_point, gamma })
                    }
                    "CalRGB" => {
                        assert_len(&arr, 2)?;
                        let dict = resolver.assert_dict(arr[1].clone())?;

                        let white_point = triple(
                            dict.get_number_arr("WhitePoint", resolver)?,
                            [1.0, 1.0, 1.0],
                        );
                        let gamma =
                            triple(dict.get_number_arr("Gamma", resolver)?, [1.0, 1.0, 1.0]);

                        let matrix = match dict.get_number_arr("Matrix", resolver)? {
                            Some(m) if m.len() == 9 => {
                                let mut out = [0.0f32; 9];
                                out.copy_from_slice(&m);
                                out
                            }
                            _ => [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
                        };

                        Ok(ColorSpace::CalRgb {
                            white_point,
                            gamma,
                            matrix,
                        })
                    }
                    "Lab" => {
                        assert_len(&arr, 2)?;
                        let dict = resolver.assert_dict(arr[1].clone())?;

                        let white_point = triple(
                            dict.get_number_arr("WhitePoint", resolver)?,
                            [1.0, 1.0, 1.0],
                        );

                        let range = match dict.get_number_arr("Range", resolver)? {
                            Some(r) if r.len() == 4 => [r[0], r[1], r[2], r[3]],
                            _ => [-100.0, 100.0, -100.0, 100.0],
                        };

                        Ok(ColorSpace::Lab { white_point, range })
                    }
                    "ICCBased" => {
                        assert_len(&arr, 2)?;
                        let stream = resolver.assert_stream(arr[1].clone())?;

                        let n = stream.dict.get_integer("N", resolver)?.unwrap_or(3).max(1) as usize;

                        let alternate = match stream.dict.get("Alternate", resolver)? {
                            Some(obj) => ColorSpace::from_obj(obj, resolver)?,
                            None => match n {
                                1 => ColorSpace::DeviceGray,
                                4 => ColorSpace::DeviceCmyk,
                                _ => ColorSpace::DeviceRgb,
                            },
                        };

                        Ok(ColorSpace::IccBased {
                            n,
                            alternate: Rc::new(alternate),
                        })
                    }
                    "Indexed" | "I" => {
                        assert_len(&arr, 4)?;

                        let base = ColorSpace::from_obj(arr[1].clone(), resolver)?;
                        let hival = resolver.assert_integer(arr[2].clone())?.max(0) as u32;

                        let lookup = match resolver.resolve(arr[3].clone())? {
                            Object::String(bytes) => bytes,
                            Object::Stream(stream) => {
                                crate::filter::decode_stream(&stream.data, &stream.dict, resolver)?
                                    .into_owned()
                            }
                            obj => {
                                return Err(RenderError::decode(format!(
                                    "invalid Indexed lookup table: {:?}",
                                    obj
                                )))
                            }
                        };

                        Ok(ColorSpace::Indexed {
                            base: Rc::new(base),
                            hival,
                            lookup,
                        })
                    }
                    "Separation" => {
                        assert_len(&arr, 4)?;

                        let alternate = ColorSpace::from_obj(arr[2].clone(), resolver)?;
                        let tint_transform = Function::from_obj(arr[3].clone(), resolver)?;

                        Ok(ColorSpace::Separation {
                            alternate: Rc::new(alternate),
                            tint_transform,
                        })
                    }
                    "DeviceN" => {
                        let names = resolver.assert_arr(arr[1].clone())?;
                        let alternate = ColorSpace::from_obj(arr[2].clone(), resolver)?;
                        let tint_transform = Function::from_obj(arr[3].clone(), resolver)?;

                        Ok(ColorSpace::DeviceN {
                            n: names.len().max(1),
                            alternate: Rc::new(alternate),
                            tint_transform,
                        })
                    }
                    "Pattern" => {
                        let base = arr
                            .get(1)
                            .map(|obj| ColorSpace::from_obj(obj.clone(), resolver))
                            .transpose()?
                            .map(Rc::new);

                        Ok(ColorSpace::Pattern { base })
                    }
                    name => Err(RenderError::unsupported(format!(
                        "color space {:?}",
                        name
                    ))),
                }
            }
            obj => Err(RenderError::decode(format!(
                "invalid color space object: {:?}",
                obj
            ))),
        }
    }

    pub fn num_components(&self) -> usize {
        match self {
            ColorSpace::DeviceGray | ColorSpace::CalGray { .. } => 1,
            ColorSpace::DeviceRgb | ColorSpace::CalRgb { .. } | ColorSpace::Lab { .. } => 3,
            ColorSpace::DeviceCmyk => 4,
            ColorSpace::IccBased { n, .. } => *n,
            ColorSpace::Indexed { .. } => 1,
            ColorSpace::Separation { .. } => 1,
            ColorSpace::DeviceN { n, .. } => *n,
            ColorSpace::Pattern { base } => {
                base.as_ref().map(|base| base.num_components()).unwrap_or(0)
            }
        }
    }

    /// The initial color in this space: black for device and CIE spaces,
    /// full tint for separations, index zero for indexed.
    pub fn default_color(&self) -> Vec<f32> {
        match self {
            ColorSpace::DeviceCmyk => vec![0.0, 0.0, 0.0, 1.0],
            ColorSpace::Separation { .. } => vec![1.0],
            ColorSpace::DeviceN { n, .. } => vec![1.0; *n],
            _ => vec![0.0; self.num_components()],
        }
    }

    /// The default `Decode` array, as `[min, max]` pairs per component,
    /// for samples with `bits_per_component` bits.
    pub fn default_decode(&self, bits_per_component: u32) -> Vec<f32> {
        match self {
            ColorSpace::Indexed { .. } => {
                vec![0.0, ((1u32 << bits_per_component) - 1) as f32]
            }
            ColorSpace::Lab { range, .. } => {
                vec![0.0, 100.0, range[0], range[1], range[2], range[3]]
            }
            _ => (0..self.num_components())
                .flat_map(|_| [0.0, 1.0])
                .collect(),
        }
    }

    /// Convert a component tuple to straight-alpha sRGB, clamped to [0, 1].
    pub fn to_srgba(&self, components: &[f32], alpha: f32) -> [f32; 4] {
        let alpha = alpha.clamp(0.0, 1.0);

        let [r, g, b] = match self {
            ColorSpace::DeviceGray => {
                let gray = component(components, 0);
                [gray, gray, gray]
            }
            ColorSpace::DeviceRgb => [
                component(components, 0),
                component(components, 1),
                component(components, 2),
            ],
            ColorSpace::DeviceCmyk => {
                let c = component(components, 0);
                let m = component(components, 1);
                let y = component(components, 2);
                let k = component(components, 3);

                [
                    (1.0 - c) * (1.0 - k),
                    (1.0 - m) * (1.0 - k),
                    (1.0 - y) * (1.0 - k),
                ]
            }
            ColorSpace::CalGray { white_point, gamma } => {
                cie::cal_gray_to_srgb(component(components, 0), white_point, *gamma)
            }
            ColorSpace::CalRgb {
                white_point,
                gamma,
                matrix,
            } => cie::cal_rgb_to_srgb(
                [
                    component(components, 0),
                    component(components, 1),
                    component(components, 2),
                ],
                white_point,
                gamma,
                matrix,
            ),
            ColorSpace::Lab { white_point, range } => {
                let l = components.first().copied().unwrap_or(0.0).clamp(0.0, 100.0);
                let a = components
                    .get(1)
                    .copied()
                    .unwrap_or(0.0)
                    .clamp(range[0], range[1]);
                let b = components
                    .get(2)
                    .copied()
                    .unwrap_or(0.0)
                    .clamp(range[2], range[3]);

                cie::lab_to_srgb([l, a, b], white_point)
            }
            ColorSpace::IccBased { alternate, .. } => {
                let [r, g, b, _] = alternate.to_srgba(components, alpha);
                [r, g, b]
            }
            ColorSpace::Indexed {
                base,
                hival,
                lookup,
            } => {
                let index = components
                    .first()
                    .copied()
                    .unwrap_or(0.0)
                    .round()
                    .clamp(0.0, *hival as f32) as usize;

                let n = base.num_components();
                let start = index * n;

                let base_components: Vec<f32> = (0..n)
                    .map(|i| lookup.get(start + i).copied().unwrap_or(0) as f32 / 255.0)
                    .collect();

                let [r, g, b, _] = base.to_srgba(&base_components, alpha);
                [r, g, b]
            }
            ColorSpace::Separation {
                alternate,
                tint_transform,
            } => {
                let tint = component(components, 0);
                let alt = tint_transform.eval(tint);

                let [r, g, b, _] = alternate.to_srgba(&alt, alpha);
                [r, g, b]
            }
            ColorSpace::DeviceN {
                alternate,
                tint_transform,
                ..
            } => {
                // the tint transform for DeviceN takes the first component;
                // multi-input sampled transforms are not implemented
                let tint = component(components, 0);
                let alt = tint_transform.eval(tint);

                let [r, g, b, _] = alternate.to_srgba(&alt, alpha);
                [r, g, b]
            }
            ColorSpace::Pattern { base } => match base {
                Some(base) => {
                    let [r, g, b, _] = base.to_srgba(components, alpha);
                    [r, g, b]
                }
                None => [0.0, 0.0, 0.0],
            },
        };

        [
            r.clamp(0.0, 1.0),
            g.clamp(0.0, 1.0),
            b.clamp(0.0, 1.0),
            alpha,
        ]
    }
}

fn component(components: &[f32], idx: usize) -> f32 {
    components.get(idx).copied().unwrap_or(0.0).clamp(0.0, 1.0)
}

fn triple(arr: Option<Vec<f32>>, default: [f32; 3]) -> [f32; 3] {
    match arr {
        Some(v) if v.len() == 3 => [v[0], v[1], v[2]],
        _ => default,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn gray_replicates_to_all_channels() {
        let [r, g, b, a] = ColorSpace::DeviceGray.to_srgba(&[0.25], 1.0);

        assert_eq!([r, g, b], [0.25, 0.25, 0.25]);
        assert_eq!(a, 1.0);
    }

    #[test]
    fn cyan_converts_blue_green() {
        let [r, g, b, _] = ColorSpace::DeviceCmyk.to_srgba(&[1.0, 0.0, 0.0, 0.0], 1.0);

        assert_eq!(r, 0.0);
        assert_eq!(g, 1.0);
        assert_eq!(b, 1.0);
    }

    #[test]
    fn black_key_wins() {
        let [r, g, b, _] = ColorSpace::DeviceCmyk.to_srgba(&[0.0, 0.0, 0.0, 1.0], 1.0);

        assert_eq!([r, g, b], [0.0, 0.0, 0.0]);
    }

    #[test]
    fn outputs_clamp_for_wild_inputs() {
        let spaces: Vec<ColorSpace> = vec![
            ColorSpace::DeviceGray,
            ColorSpace::DeviceRgb,
            ColorSpace::DeviceCmyk,
            ColorSpace::Lab {
                white_point: [0.9505, 1.0, 1.089],
                range: [-100.0, 100.0, -100.0, 100.0],
            },
        ];

        for space in spaces {
            for &v in &[-10.0f32, 0.0, 0.5, 1.0, 250.0] {
                let out = space.to_srgba(&vec![v; space.num_components()], 2.0);

                for ch in out {
                    assert!((0.0..=1.0).contains(&ch), "{:?} escaped range", out);
                }
            }
        }
    }

    #[test]
    fn indexed_looks_up_palette_entries() {
        let space = ColorSpace::Indexed {
            base: Rc::new(ColorSpace::DeviceRgb),
            hival: 1,
            lookup: vec![0, 0, 0, 0, 255, 0],
        };

        assert_eq!(space.to_srgba(&[0.0], 1.0), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(space.to_srgba(&[1.0], 1.0), [0.0, 1.0, 0.0, 1.0]);
        // out-of-range indices clamp to hival
        assert_eq!(space.to_srgba(&[9.0], 1.0), [0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn separation_runs_the_tint_transform() {
        let space = ColorSpace::Separation {
            alternate: Rc::new(ColorSpace::DeviceRgb),
            tint_transform: Function::Exponential {
                domain: [0.0, 1.0],
                c0: vec![1.0, 1.0, 1.0],
                c1: vec![1.0, 0.0, 0.0],
                n: 1.0,
            },
        };

        assert_eq!(space.to_srgba(&[0.0], 1.0), [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(space.to_srgba(&[1.0], 1.0), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn indexed_default_decode_spans_the_index_range() {
        let space = ColorSpace::Indexed {
            base: Rc::new(ColorSpace::DeviceRgb),
            hival: 255,
            lookup: Vec::new(),
        };

        assert_eq!(space.default_decode(4), vec![0.0, 15.0]);
        assert_eq!(ColorSpace::DeviceRgb.default_decode(8).len(), 6);
    }
}
