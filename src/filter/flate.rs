use std::{borrow::Cow, cmp::min, io::Read};

use flate2::read::ZlibDecoder;

use crate::{
    error::{RenderError, RenderResult},
    objects::Dictionary,
    resolve::Resolve,
};

/// <https://www.adobe.com/content/dam/acom/en/devnet/postscript/pdfs/TN5603.Filters.pdf>
#[derive(Debug, Clone, Copy)]
pub struct FlateDecoderParams {
    /// The default value is 1 (no prediction)
    predictor: i32,

    /// Specifies the number of samples in a sampled row.
    ///
    /// Only meaningful when `predictor` is greater than 1.
    ///
    /// The default value is 1
    columns: usize,

    /// Specifies the number of interleaved color components in a sample.
    ///
    /// The default value is 1
    colors: usize,

    /// The number of bits used to represent each component.
    ///
    /// The possible values are 1, 2, 4, 8, and 16
    ///
    /// The default value is 8
    bits_per_component: usize,
}

impl FlateDecoderParams {
    pub fn from_dict(dict: &Dictionary, resolver: &dyn Resolve) -> RenderResult<Self> {
        let predictor = dict.get_integer("Predictor", resolver)?.unwrap_or(1);
        let columns = dict.get_integer("Columns", resolver)?.unwrap_or(1).max(1) as usize;
        let colors = dict.get_integer("Colors", resolver)?.unwrap_or(1).max(1) as usize;
        let bits_per_component = dict
            .get_integer("BitsPerComponent", resolver)?
            .unwrap_or(8) as usize;

        if !matches!(bits_per_component, 1 | 2 | 4 | 8 | 16) {
            return Err(RenderError::decode(format!(
                "invalid BitsPerComponent {}",
                bits_per_component
            )));
        }

        Ok(Self {
            predictor,
            columns,
            colors,
            bits_per_component,
        })
    }

    /// Whole bytes per pixel as the predictors see them; sub-byte samples
    /// predict on single bytes.
    const fn bytes_per_pixel(&self) -> usize {
        let bits = self.colors * self.bits_per_component;
        if bits < 8 {
            1
        } else {
            bits / 8
        }
    }

    const fn bytes_per_row(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component + 7) / 8
    }
}

#[derive(Debug)]
pub struct FlateDecoder {
    params: FlateDecoderParams,
    buffer: Vec<u8>,
}

impl FlateDecoder {
    pub fn new(buffer: Cow<[u8]>, params: FlateDecoderParams) -> RenderResult<Self> {
        let mut decoder = ZlibDecoder::new(&*buffer);
        let mut out = Vec::new();

        decoder
            .read_to_end(&mut out)
            .map_err(|err| RenderError::decode(format!("flate: {}", err)))?;

        Ok(Self {
            buffer: out,
            params,
        })
    }

    pub fn decode(self) -> RenderResult<Vec<u8>> {
        match self.params.predictor {
            1 => Ok(self.buffer),
            2 => self.undo_tiff_predictor(),
            10..=15 => self.undo_png_predictor(),
            predictor => Err(RenderError::decode(format!(
                "unknown predictor {}",
                predictor
            ))),
        }
    }

    /// TIFF predictor 2: horizontal differencing per component.
    fn undo_tiff_predictor(mut self) -> RenderResult<Vec<u8>> {
        if self.params.bits_per_component != 8 {
            return Err(RenderError::unsupported(format!(
                "TIFF predictor with {} bits per component",
                self.params.bits_per_component
            )));
        }

        let bytes_per_row = self.params.bytes_per_row();
        let colors = self.params.colors;

        for row in self.buffer.chunks_mut(bytes_per_row) {
            for i in colors..row.len() {
                row[i] = row[i].wrapping_add(row[i - colors]);
            }
        }

        Ok(self.buffer)
    }

    /// PNG predictors: each row is prefixed with a filter-type byte and
    /// un-filtered against the row above.
    fn undo_png_predictor(self) -> RenderResult<Vec<u8>> {
        let bytes_per_row = self.params.bytes_per_row();
        let bpp = self.params.bytes_per_pixel();
        let row_with_tag = bytes_per_row + 1;

        let mut out: Vec<u8> = Vec::with_capacity(self.buffer.len());

        for raw_row in self.buffer.chunks(row_with_tag) {
            if raw_row.len() < 2 {
                break;
            }

            let tag = raw_row[0];
            let row_start = out.len();
            out.extend_from_slice(&raw_row[1..]);

            let (previous, row) = out.split_at_mut(row_start);
            let row_above = if row_start == 0 {
                &[][..]
            } else {
                &previous[row_start - bytes_per_row..]
            };

            match tag {
                0 => {}
                1 => decode_sub(row, bpp),
                2 => decode_up(row, row_above),
                3 => decode_average(row, row_above, bpp),
                4 => decode_paeth(row, row_above, bpp),
                tag => {
                    return Err(RenderError::decode(format!(
                        "invalid png row filter {}",
                        tag
                    )))
                }
            }
        }

        Ok(out)
    }
}

fn decode_sub(row: &mut [u8], bpp: usize) {
    for i in bpp..row.len() {
        row[i] = row[i].wrapping_add(row[i - bpp]);
    }
}

fn decode_up(row: &mut [u8], row_above: &[u8]) {
    for (i, byte) in row.iter_mut().enumerate() {
        let above = row_above.get(i).copied().unwrap_or(0);
        *byte = byte.wrapping_add(above);
    }
}

fn decode_average(row: &mut [u8], row_above: &[u8], bpp: usize) {
    for i in 0..row.len() {
        let left = if i >= bpp { row[i - bpp] } else { 0 };
        let above = row_above.get(i).copied().unwrap_or(0);

        row[i] = row[i].wrapping_add(((u16::from(left) + u16::from(above)) / 2) as u8);
    }
}

fn decode_paeth(row: &mut [u8], row_above: &[u8], bpp: usize) {
    for i in 0..row.len() {
        let left = if i >= bpp { row[i - bpp] } else { 0 };
        let above = row_above.get(i).copied().unwrap_or(0);
        let above_left = if i >= bpp {
            row_above.get(i - bpp).copied().unwrap_or(0)
        } else {
            0
        };

        let p = paeth_predictor(i16::from(left), i16::from(above), i16::from(above_left));
        row[i] = row[i].wrapping_add(p);
    }
}

fn paeth_predictor(a: i16, b: i16, c: i16) -> u8 {
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    match min(min(pa, pb), pc) {
        // order here for ties is important
        diff if diff == pa => a as u8,
        diff if diff == pb => b as u8,
        diff if diff == pc => c as u8,
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    use flate2::{write::ZlibEncoder, Compression};

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn params(predictor: i32, columns: usize, colors: usize) -> FlateDecoderParams {
        FlateDecoderParams {
            predictor,
            columns,
            colors,
            bits_per_component: 8,
        }
    }

    #[test]
    fn plain_flate_round_trips() {
        let data = b"BT /F1 12 Tf (Hello) Tj ET";
        let decoder = FlateDecoder::new(Cow::Owned(deflate(data)), params(1, 1, 1)).unwrap();

        assert_eq!(decoder.decode().unwrap(), data);
    }

    #[test]
    fn png_sub_predictor() {
        // 1 row, 4 columns, deltas of 1 starting at 10
        let filtered = [1u8, 10, 1, 1, 1];
        let decoder =
            FlateDecoder::new(Cow::Owned(deflate(&filtered)), params(15, 4, 1)).unwrap();

        assert_eq!(decoder.decode().unwrap(), vec![10, 11, 12, 13]);
    }

    #[test]
    fn png_up_predictor() {
        let filtered = [0u8, 1, 2, 3, /* row 2, up */ 2, 1, 1, 1];
        let decoder =
            FlateDecoder::new(Cow::Owned(deflate(&filtered)), params(15, 3, 1)).unwrap();

        assert_eq!(decoder.decode().unwrap(), vec![1, 2, 3, 2, 3, 4]);
    }

    #[test]
    fn png_paeth_predictor_ties_prefer_left() {
        assert_eq!(paeth_predictor(5, 5, 5), 5);
        assert_eq!(paeth_predictor(1, 9, 5), 5);
        assert_eq!(paeth_predictor(10, 2, 4), 10);
    }

    #[test]
    fn tiff_predictor_accumulates_per_component() {
        // two rgb pixels per row, horizontally differenced
        let filtered = [10u8, 20, 30, 5, 5, 5];
        let decoder =
            FlateDecoder::new(Cow::Owned(deflate(&filtered)), params(2, 2, 3)).unwrap();

        assert_eq!(decoder.decode().unwrap(), vec![10, 20, 30, 15, 25, 35]);
    }
}
