use std::{rc::Rc, sync::Arc};

use crate::{
    color::ColorSpace,
    error::{RenderError, RenderResult},
    filter::decode_stream,
    objects::{Dictionary, Object, StreamObject},
    resolve::Resolve,
};

/// Refuse to decode images beyond this many pixels.
const MAX_IMAGE_PIXELS: u64 = 1 << 26;

#[derive(Debug, Clone)]
pub struct ImageXObject {
    /// The width of the image, in samples
    pub width: u32,

    /// The height of the image, in samples
    pub height: u32,

    /// The colour space the samples are specified in. Absent only for
    /// image masks
    pub color_space: Option<Rc<ColorSpace>>,

    /// The number of bits per colour component: 1, 2, 4, 8, or 16. Image
    /// masks always use 1
    pub bits_per_component: u32,

    /// When set, the image is a 1-bit stencil painted with the current
    /// nonstroking colour; unmasked areas paint, masked areas are left
    /// untouched
    pub image_mask: bool,

    /// Maps decoded sample values into the component range of the colour
    /// space, `[min max]` per component. For image masks `[1 0]` inverts
    /// the stencil
    pub decode: Option<Vec<f32>>,

    /// Whether to interpolate when the image is scaled up
    pub interpolate: bool,

    /// A soft-mask image supplying per-pixel alpha, decoded as DeviceGray
    /// and resampled to this image's dimensions when they differ
    pub smask: Option<Rc<ImageXObject>>,

    pub stream: Arc<StreamObject>,
}

impl ImageXObject {
    pub fn from_stream(stream: Arc<StreamObject>, resolver: &dyn Resolve) -> RenderResult<Self> {
        let dict = stream.dict.clone();

        let width = dict.expect_integer("Width", resolver)?.max(0) as u32;
        let height = dict.expect_integer("Height", resolver)?.max(0) as u32;

        let image_mask = dict.get_bool("ImageMask", resolver)?.unwrap_or(false);

        let color_space = match dict.get("ColorSpace", resolver)? {
            Some(obj) if !image_mask => Some(Rc::new(ColorSpace::from_obj(obj, resolver)?)),
            _ => None,
        };

        let bits_per_component = if image_mask {
            1
        } else {
            dict.get_integer("BitsPerComponent", resolver)?.unwrap_or(8) as u32
        };

        let decode = dict.get_number_arr("Decode", resolver)?;
        let interpolate = dict.get_bool("Interpolate", resolver)?.unwrap_or(false);

        let smask = dict
            .get_stream("SMask", resolver)?
            .map(|smask| ImageXObject::from_stream(smask, resolver))
            .transpose()?
            .map(Rc::new);

        Ok(Self {
            width,
            height,
            color_space,
            bits_per_component,
            image_mask,
            decode,
            interpolate,
            smask,
            stream,
        })
    }

    /// Build from an inline image's abbreviated dictionary. A color-space
    /// name that is not a device space is looked up in the enclosing
    /// resource dictionary through `named_color_space`.
    pub fn from_inline(
        dict: Dictionary,
        data: Vec<u8>,
        resolver: &dyn Resolve,
        named_color_space: &dyn Fn(&str) -> Option<Rc<ColorSpace>>,
    ) -> RenderResult<Self> {
        fn entry<'d>(dict: &'d Dictionary, long: &str, short: &str) -> Option<&'d Object> {
            dict.get_object(long).or_else(|| dict.get_object(short))
        }

        let width = match entry(&dict, "Width", "W") {
            Some(obj) => resolver.assert_integer(obj.clone())?.max(0) as u32,
            None => return Err(RenderError::missing("inline image width")),
        };
        let height = match entry(&dict, "Height", "H") {
            Some(obj) => resolver.assert_integer(obj.clone())?.max(0) as u32,
            None => return Err(RenderError::missing("inline image height")),
        };

        let image_mask = match entry(&dict, "ImageMask", "IM") {
            Some(obj) => resolver.assert_bool(obj.clone())?,
            None => false,
        };

        let color_space = match entry(&dict, "ColorSpace", "CS") {
            Some(obj) if !image_mask => {
                let obj = resolver.resolve(obj.clone())?;

                Some(match &obj {
                    Object::Name(name) => match ColorSpace::from_name(name) {
                        Ok(space) => Rc::new(space),
                        Err(..) => named_color_space(name)
                            .ok_or_else(|| RenderError::missing(name.clone()))?,
                    },
                    _ => Rc::new(ColorSpace::from_obj(obj, resolver)?),
                })
            }
            _ => None,
        };

        let bits_per_component = if image_mask {
            1
        } else {
            match entry(&dict, "BitsPerComponent", "BPC") {
                Some(obj) => resolver.assert_integer(obj.clone())?.max(1) as u32,
                None => 8,
            }
        };

        let decode = match entry(&dict, "Decode", "D") {
            Some(obj) => Some(
                resolver
                    .assert_arr(obj.clone())?
                    .into_iter()
                    .map(|obj| resolver.assert_number(obj))
                    .collect::<RenderResult<Vec<f32>>>()?,
            ),
            None => None,
        };

        let interpolate = match entry(&dict, "Interpolate", "I") {
            Some(obj) => resolver.assert_bool(obj.clone()).unwrap_or(false),
            None => false,
        };

        // rebuild a stream dictionary so the shared filter chain applies;
        // inline images spell Filter/DecodeParms as F/DP
        let mut stream_dict = Dictionary::empty();
        if let Some(filter) = entry(&dict, "Filter", "F") {
            stream_dict.insert("Filter", filter.clone());
        }
        if let Some(parms) = entry(&dict, "DecodeParms", "DP") {
            stream_dict.insert("DecodeParms", parms.clone());
        }

        Ok(Self {
            width,
            height,
            color_space,
            bits_per_component,
            image_mask,
            decode,
            interpolate,
            smask: None,
            stream: Arc::new(StreamObject {
                dict: stream_dict,
                data,
            }),
        })
    }

    fn check_size(&self) -> RenderResult<()> {
        if self.width as u64 * self.height as u64 > MAX_IMAGE_PIXELS {
            return Err(RenderError::ResourceExhausted {
                what: "image too large",
            });
        }

        if self.width == 0 || self.height == 0 {
            return Err(RenderError::decode("empty image"));
        }

        Ok(())
    }

    /// Run the full sample pipeline: filter chain, predictor, bit
    /// unpacking, `Decode` mapping, color conversion, soft mask. The
    /// result is straight-alpha RGBA.
    pub fn decode_rgba(&self, resolver: &dyn Resolve) -> RenderResult<DecodedImage> {
        self.check_size()?;

        let color_space = self
            .color_space
            .clone()
            .ok_or_else(|| RenderError::decode("image without color space"))?;

        let samples = decode_stream(&self.stream.data, &self.stream.dict, resolver)?;

        let n = color_space.num_components();
        let width = self.width as usize;
        let height = self.height as usize;
        let bpc = self.bits_per_component;

        let row_bytes = (width * n * bpc as usize + 7) / 8;
        if samples.len() < row_bytes * height {
            return Err(RenderError::decode(format!(
                "image data truncated: {} bytes for {}x{}x{}@{}",
                samples.len(),
                width,
                height,
                n,
                bpc
            )));
        }

        let decode = match &self.decode {
            Some(decode) if decode.len() == 2 * n => decode.clone(),
            _ => color_space.default_decode(bpc),
        };

        let max = ((1u64 << bpc) - 1) as f32;

        let mut pixels = vec![0u8; width * height * 4];
        let mut components = vec![0.0f32; n];

        for y in 0..height {
            let mut reader = BitReader::new(&samples[y * row_bytes..(y + 1) * row_bytes], bpc);

            for x in 0..width {
                for (i, component) in components.iter_mut().enumerate() {
                    let raw = reader.next_sample() as f32;
                    let dmin = decode[2 * i];
                    let dmax = decode[2 * i + 1];

                    *component = dmin + raw * (dmax - dmin) / max;
                }

                let [r, g, b, a] = color_space.to_srgba(&components, 1.0);

                let offset = (y * width + x) * 4;
                pixels[offset] = (r * 255.0 + 0.5) as u8;
                pixels[offset + 1] = (g * 255.0 + 0.5) as u8;
                pixels[offset + 2] = (b * 255.0 + 0.5) as u8;
                pixels[offset + 3] = (a * 255.0 + 0.5) as u8;
            }
        }

        let mut image = DecodedImage {
            width,
            height,
            pixels,
        };

        if let Some(smask) = &self.smask {
            image.apply_smask(smask, resolver)?;
        }

        Ok(image)
    }

    /// Decode a 1-bit image mask into per-pixel coverage: 255 where the
    /// current fill color paints, 0 where the surface shows through. The
    /// default `Decode` of `[0 1]` paints 0-samples; `[1 0]` inverts.
    pub fn decode_stencil(&self, resolver: &dyn Resolve) -> RenderResult<DecodedStencil> {
        self.check_size()?;

        let samples = decode_stream(&self.stream.data, &self.stream.dict, resolver)?;

        let width = self.width as usize;
        let height = self.height as usize;
        let row_bytes = (width + 7) / 8;

        if samples.len() < row_bytes * height {
            return Err(RenderError::decode("image mask data truncated"));
        }

        let inverted = matches!(self.decode.as_deref(), Some([min, _, ..]) if *min == 1.0);

        let mut coverage = vec![0u8; width * height];

        for y in 0..height {
            let row = &samples[y * row_bytes..(y + 1) * row_bytes];

            for x in 0..width {
                let bit = (row[x / 8] >> (7 - x % 8)) & 1 == 1;
                let paint = bit == inverted;

                coverage[y * width + x] = if paint { 255 } else { 0 };
            }
        }

        Ok(DecodedStencil {
            width,
            height,
            coverage,
        })
    }
}

/// A fully decoded image: straight-alpha RGBA, row-major from the top-left.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        let offset = (y.min(self.height - 1) * self.width + x.min(self.width - 1)) * 4;

        [
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
            self.pixels[offset + 3],
        ]
    }

    /// Sample at `(u, v)` in the image's unit square, `v = 0` at the
    /// bottom (PDF image space). Bilinear when `interpolate` is set,
    /// nearest otherwise.
    pub fn sample(&self, u: f32, v: f32, interpolate: bool) -> [f32; 4] {
        let x = u * self.width as f32 - 0.5;
        let y = (1.0 - v) * self.height as f32 - 0.5;

        if !interpolate {
            let px = self.pixel(
                x.round().max(0.0) as usize,
                y.round().max(0.0) as usize,
            );

            return [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
                px[3] as f32 / 255.0,
            ];
        }

        let x0 = x.floor().max(0.0) as usize;
        let y0 = y.floor().max(0.0) as usize;
        let fx = (x - x.floor()).clamp(0.0, 1.0);
        let fy = (y - y.floor()).clamp(0.0, 1.0);

        let p00 = self.pixel(x0, y0);
        let p10 = self.pixel(x0 + 1, y0);
        let p01 = self.pixel(x0, y0 + 1);
        let p11 = self.pixel(x0 + 1, y0 + 1);

        let mut out = [0.0f32; 4];
        for i in 0..4 {
            let top = p00[i] as f32 * (1.0 - fx) + p10[i] as f32 * fx;
            let bottom = p01[i] as f32 * (1.0 - fx) + p11[i] as f32 * fx;

            out[i] = (top * (1.0 - fy) + bottom * fy) / 255.0;
        }

        out
    }

    /// Multiply a DeviceGray soft mask into the alpha channel, resampling
    /// (nearest) when dimensions differ. Straight-alpha combine, as the
    /// pixels here are not yet premultiplied.
    fn apply_smask(&mut self, smask: &ImageXObject, resolver: &dyn Resolve) -> RenderResult<()> {
        let mask = smask.decode_rgba(resolver)?;

        for y in 0..self.height {
            let my = y * mask.height / self.height;

            for x in 0..self.width {
                let mx = x * mask.width / self.width;

                // DeviceGray decoded: r == g == b == gray
                let alpha = mask.pixel(mx, my)[0];

                let offset = (y * self.width + x) * 4;
                self.pixels[offset + 3] =
                    crate::raster::composite::mul_div_255(self.pixels[offset + 3], alpha);
            }
        }

        Ok(())
    }
}

/// A decoded 1-bit image mask.
#[derive(Debug, Clone)]
pub struct DecodedStencil {
    pub width: usize,
    pub height: usize,
    pub coverage: Vec<u8>,
}

impl DecodedStencil {
    /// Nearest-neighbor coverage at `(u, v)` in the unit square, `v = 0`
    /// at the bottom.
    pub fn sample(&self, u: f32, v: f32) -> u8 {
        let x = (u * self.width as f32) as usize;
        let y = ((1.0 - v) * self.height as f32) as usize;

        self.coverage[y.min(self.height - 1) * self.width + x.min(self.width - 1)]
    }
}

/// MSB-first sample reader over one image row.
struct BitReader<'a> {
    row: &'a [u8],
    bit: usize,
    bits_per_sample: u32,
}

impl<'a> BitReader<'a> {
    fn new(row: &'a [u8], bits_per_sample: u32) -> Self {
        Self {
            row,
            bit: 0,
            bits_per_sample,
        }
    }

    fn next_sample(&mut self) -> u32 {
        let mut value = 0u32;

        for _ in 0..self.bits_per_sample {
            let byte = self.row.get(self.bit / 8).copied().unwrap_or(0);
            let bit = (byte >> (7 - self.bit % 8)) & 1;

            value = (value << 1) | bit as u32;
            self.bit += 1;
        }

        value
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resolve::NullResolver;

    fn image(
        width: u32,
        height: u32,
        bpc: u32,
        color_space: ColorSpace,
        data: Vec<u8>,
    ) -> ImageXObject {
        ImageXObject {
            width,
            height,
            color_space: Some(Rc::new(color_space)),
            bits_per_component: bpc,
            image_mask: false,
            decode: None,
            interpolate: false,
            smask: None,
            stream: Arc::new(StreamObject {
                dict: Dictionary::empty(),
                data,
            }),
        }
    }

    #[test]
    fn cmyk_cyan_pixel_converts() {
        let img = image(1, 1, 8, ColorSpace::DeviceCmyk, vec![0xff, 0, 0, 0]);
        let decoded = img.decode_rgba(&NullResolver).unwrap();

        let [r, g, b, a] = decoded.pixel(0, 0);
        assert_eq!(r, 0);
        assert!(g as f32 / 255.0 >= 0.78);
        assert!(b as f32 / 255.0 >= 0.78);
        assert_eq!(a, 255);
    }

    #[test]
    fn indexed_palette_resolves_exactly() {
        let palette = ColorSpace::Indexed {
            base: Rc::new(ColorSpace::DeviceRgb),
            hival: 1,
            lookup: vec![0, 0, 0, 0, 255, 0],
        };

        // 2x2 1-bpc samples: rows `10` and `01`, each row byte-padded
        let img = image(2, 2, 1, palette, vec![0b0100_0000, 0b1000_0000]);
        let decoded = img.decode_rgba(&NullResolver).unwrap();

        assert_eq!(decoded.pixel(0, 0), [0, 0, 0, 255]);
        assert_eq!(decoded.pixel(1, 0), [0, 255, 0, 255]);
        assert_eq!(decoded.pixel(0, 1), [0, 255, 0, 255]);
        assert_eq!(decoded.pixel(1, 1), [0, 0, 0, 255]);
    }

    #[test]
    fn smask_multiplies_into_alpha() {
        let mask = ImageXObject {
            width: 4,
            height: 1,
            color_space: Some(Rc::new(ColorSpace::DeviceGray)),
            bits_per_component: 8,
            image_mask: false,
            decode: None,
            interpolate: false,
            smask: None,
            stream: Arc::new(StreamObject {
                dict: Dictionary::empty(),
                data: vec![0, 128, 255, 0],
            }),
        };

        let mut img = image(
            4,
            1,
            8,
            ColorSpace::DeviceRgb,
            vec![255, 0, 0, 255, 0, 0, 255, 0, 0, 255, 0, 0],
        );
        img.smask = Some(Rc::new(mask));

        let decoded = img.decode_rgba(&NullResolver).unwrap();

        assert_eq!(decoded.pixel(0, 0)[3], 0);
        assert_eq!(decoded.pixel(1, 0)[3], 128);
        assert_eq!(decoded.pixel(2, 0)[3], 255);
        assert_eq!(decoded.pixel(3, 0)[3], 0);
        // rgb stays red where alpha > 0 (straight alpha)
        assert_eq!(decoded.pixel(1, 0)[0], 255);
        assert_eq!(decoded.pixel(2, 0)[0], 255);
    }

    #[test]
    fn decode_array_inverts() {
        let mut img = image(2, 1, 8, ColorSpace::DeviceGray, vec![0, 255]);
        img.decode = Some(vec![1.0, 0.0]);

        let decoded = img.decode_rgba(&NullResolver).unwrap();

        assert_eq!(decoded.pixel(0, 0)[0], 255);
        assert_eq!(decoded.pixel(1, 0)[0], 0);
    }

    #[test]
    fn stencil_polarity_follows_decode() {
        let mut img = image(8, 1, 1, ColorSpace::DeviceGray, vec![0b1010_0000]);
        img.image_mask = true;
        img.color_space = None;

        let stencil = img.decode_stencil(&NullResolver).unwrap();
        // default decode [0 1]: 0-bits paint
        assert_eq!(stencil.coverage[0], 0);
        assert_eq!(stencil.coverage[1], 255);

        img.decode = Some(vec![1.0, 0.0]);
        let stencil = img.decode_stencil(&NullResolver).unwrap();
        assert_eq!(stencil.coverage[0], 255);
        assert_eq!(stencil.coverage[1], 0);
    }

    #[test]
    fn sixteen_bit_samples_read_msb_first() {
        let img = image(1, 1, 16, ColorSpace::DeviceGray, vec![0xff, 0xff]);
        let decoded = img.decode_rgba(&NullResolver).unwrap();

        assert_eq!(decoded.pixel(0, 0)[0], 255);
    }

    #[test]
    fn truncated_data_is_a_decode_error() {
        let img = image(4, 4, 8, ColorSpace::DeviceRgb, vec![0; 10]);

        assert!(matches!(
            img.decode_rgba(&NullResolver),
            Err(RenderError::DecodeError { .. })
        ));
    }
}
