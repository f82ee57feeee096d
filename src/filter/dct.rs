use std::{
    borrow::Cow,
    io::{BufReader, Cursor},
};

use crate::error::{RenderError, RenderResult};

pub struct DctDecoder<'a> {
    buffer: Cow<'a, [u8]>,
}

impl<'a> DctDecoder<'a> {
    pub fn new(buffer: Cow<'a, [u8]>) -> Self {
        Self { buffer }
    }

    /// Decoded 8-bit samples, interleaved per component in scan order.
    /// Grayscale JPEGs yield one component per pixel, YCbCr three, CMYK
    /// four; the image pipeline interprets them through the image's
    /// declared color space.
    pub fn decode(self) -> RenderResult<Vec<u8>> {
        let mut decoder = jpeg_decoder::Decoder::new(BufReader::new(Cursor::new(&*self.buffer)));

        decoder
            .decode()
            .map_err(|err| RenderError::decode(format!("dct: {}", err)))
    }
}
