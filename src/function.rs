use crate::{
    error::{RenderError, RenderResult},
    objects::Object,
    resolve::Resolve,
};

/// A 1-in, n-out PDF function, as used by shadings and tint transforms.
///
/// Sampled (type 0) and PostScript calculator (type 4) functions are not
/// implemented; encountering one reports `UnsupportedFeature` and the
/// caller skips the shading.
#[derive(Debug, Clone)]
pub enum Function {
    /// Type 2 functions define an exponential interpolation of one input
    /// value and n output values: `yj = C0j + x^N * (C1j - C0j)`
    Exponential {
        domain: [f32; 2],
        c0: Vec<f32>,
        c1: Vec<f32>,
        n: f32,
    },

    /// Type 3 functions stitch the subdomains of several 1-input functions
    /// into a single new 1-input function
    Stitching {
        domain: [f32; 2],
        functions: Vec<Function>,

        /// k - 1 numbers in increasing order splitting `domain` into the
        /// intervals the sub-functions apply to
        bounds: Vec<f32>,

        /// 2k numbers mapping, in pairs, each subdomain onto the domain of
        /// the corresponding sub-function
        encode: Vec<f32>,
    },
}

impl Function {
    pub fn from_obj(obj: Object, resolver: &dyn Resolve) -> RenderResult<Self> {
        let dict = resolver.assert_dict(resolver.resolve(obj)?)?;

        let function_type = dict.expect_integer("FunctionType", resolver)?;
        let domain = dict
            .get_number_arr("Domain", resolver)?
            .filter(|domain| domain.len() >= 2)
            .map(|domain| [domain[0], domain[1]])
            .unwrap_or([0.0, 1.0]);

        match function_type {
            2 => {
                let c0 = dict
                    .get_number_arr("C0", resolver)?
                    .unwrap_or_else(|| vec![0.0]);
                let c1 = dict
                    .get_number_arr("C1", resolver)?
                    .unwrap_or_else(|| vec![1.0]);
                let n = dict.expect_number("N", resolver)?;

                Ok(Function::Exponential { domain, c0, c1, n })
            }
            3 => {
                let functions = dict
                    .expect_arr("Functions", resolver)?
                    .into_iter()
                    .map(|obj| Function::from_obj(obj, resolver))
                    .collect::<RenderResult<Vec<Function>>>()?;

                let bounds = dict.get_number_arr("Bounds", resolver)?.unwrap_or_default();
                let encode = dict.get_number_arr("Encode", resolver)?.unwrap_or_default();

                if functions.is_empty() || bounds.len() + 1 != functions.len() {
                    return Err(RenderError::decode("malformed stitching function"));
                }

                Ok(Function::Stitching {
                    domain,
                    functions,
                    bounds,
                    encode,
                })
            }
            ty => Err(RenderError::unsupported(format!("function type {}", ty))),
        }
    }

    /// Evaluate at `t`, clamped into the function's domain.
    pub fn eval(&self, t: f32) -> Vec<f32> {
        match self {
            Function::Exponential { domain, c0, c1, n } => {
                let t = t.clamp(domain[0], domain[1]);
                let tn = if *n == 1.0 { t } else { t.powf(*n) };

                c0.iter()
                    .zip(c1.iter().chain(std::iter::repeat(&0.0)))
                    .map(|(&a, &b)| a + tn * (b - a))
                    .collect()
            }
            Function::Stitching {
                domain,
                functions,
                bounds,
                encode,
            } => {
                let t = t.clamp(domain[0], domain[1]);

                let k = bounds.iter().position(|&bound| t < bound).unwrap_or(bounds.len());

                let low = if k == 0 { domain[0] } else { bounds[k - 1] };
                let high = if k == bounds.len() { domain[1] } else { bounds[k] };

                let e0 = encode.get(2 * k).copied().unwrap_or(0.0);
                let e1 = encode.get(2 * k + 1).copied().unwrap_or(1.0);

                let t = if high == low {
                    e0
                } else {
                    e0 + (t - low) / (high - low) * (e1 - e0)
                };

                functions[k].eval(t)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exponential_interpolates_endpoints() {
        let f = Function::Exponential {
            domain: [0.0, 1.0],
            c0: vec![0.0, 1.0],
            c1: vec![1.0, 0.0],
            n: 1.0,
        };

        assert_eq!(f.eval(0.0), vec![0.0, 1.0]);
        assert_eq!(f.eval(1.0), vec![1.0, 0.0]);
        assert_eq!(f.eval(0.5), vec![0.5, 0.5]);
    }

    #[test]
    fn exponent_applies_before_interpolation() {
        let f = Function::Exponential {
            domain: [0.0, 1.0],
            c0: vec![0.0],
            c1: vec![1.0],
            n: 2.0,
        };

        assert_eq!(f.eval(0.5), vec![0.25]);
    }

    #[test]
    fn out_of_domain_inputs_clamp() {
        let f = Function::Exponential {
            domain: [0.0, 1.0],
            c0: vec![0.0],
            c1: vec![1.0],
            n: 1.0,
        };

        assert_eq!(f.eval(-2.0), vec![0.0]);
        assert_eq!(f.eval(5.0), vec![1.0]);
    }

    #[test]
    fn stitching_selects_and_re_encodes() {
        let half = |c0, c1| Function::Exponential {
            domain: [0.0, 1.0],
            c0: vec![c0],
            c1: vec![c1],
            n: 1.0,
        };

        let f = Function::Stitching {
            domain: [0.0, 1.0],
            functions: vec![half(0.0, 1.0), half(1.0, 0.0)],
            bounds: vec![0.5],
            encode: vec![0.0, 1.0, 0.0, 1.0],
        };

        assert_eq!(f.eval(0.25), vec![0.5]);
        assert_eq!(f.eval(0.75), vec![0.5]);
        assert_eq!(f.eval(0.0), vec![0.0]);
    }
}
