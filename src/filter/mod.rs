use std::borrow::Cow;

use crate::{
    error::{RenderError, RenderResult},
    objects::{Dictionary, Object},
    resolve::Resolve,
};

use flate::{FlateDecoder, FlateDecoderParams};

pub mod ascii;
pub mod dct;
pub mod flate;
pub mod run_length;

/// Run a stream's filter chain, producing the raw bytes.
///
/// `Filter` may be a single name or an array; `DecodeParms` lines up with
/// it entry for entry. A stream without filters passes through untouched.
pub(crate) fn decode_stream<'a>(
    stream: &'a [u8],
    stream_dict: &Dictionary,
    resolver: &dyn Resolve,
) -> RenderResult<Cow<'a, [u8]>> {
    let filters = match stream_dict.get("Filter", resolver)? {
        Some(Object::Name(name)) => vec![FilterKind::from_name(&name)?],
        Some(Object::Array(arr)) => arr
            .into_iter()
            .map(|obj| FilterKind::from_name(&resolver.assert_name(obj)?))
            .collect::<RenderResult<Vec<FilterKind>>>()?,
        Some(Object::Null) | None => return Ok(Cow::Borrowed(stream)),
        Some(obj) => {
            return Err(RenderError::decode(format!(
                "malformed Filter entry: {:?}",
                obj
            )))
        }
    };

    if filters.is_empty() {
        return Ok(Cow::Borrowed(stream));
    }

    let decode_params = match stream_dict.get("DecodeParms", resolver)? {
        Some(Object::Dictionary(dict)) => vec![Some(dict)],
        Some(Object::Array(arr)) => arr
            .into_iter()
            .map(|obj| match resolver.resolve(obj)? {
                Object::Dictionary(dict) => Ok(Some(dict)),
                _ => Ok(None),
            })
            .collect::<RenderResult<Vec<Option<Dictionary>>>>()?,
        _ => Vec::new(),
    };

    let mut stream = stream.to_vec();

    for (idx, filter) in filters.iter().enumerate() {
        let params = decode_params
            .get(idx)
            .cloned()
            .flatten()
            .unwrap_or_else(Dictionary::empty);

        stream = match filter {
            FilterKind::AsciiHex => ascii::decode_ascii_hex(&stream),
            FilterKind::Ascii85 => ascii::decode_ascii_85(&stream)?,
            FilterKind::Flate => {
                let params = FlateDecoderParams::from_dict(&params, resolver)?;

                FlateDecoder::new(Cow::Owned(stream), params)?.decode()?
            }
            FilterKind::RunLength => run_length::decode_run_length(&stream)?,
            FilterKind::Dct => dct::DctDecoder::new(Cow::Owned(stream)).decode()?,
            FilterKind::Lzw
            | FilterKind::CcittFax
            | FilterKind::Jbig2
            | FilterKind::Jpx
            | FilterKind::Crypt => {
                return Err(RenderError::unsupported(format!(
                    "{:?} filter",
                    filter
                )))
            }
        };
    }

    Ok(Cow::Owned(stream))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Decodes data encoded in an ASCII hexadecimal representation,
    /// reproducing the original binary data
    AsciiHex,

    /// Decodes data encoded in an ASCII base-85 representation, reproducing
    /// the original binary data
    Ascii85,

    /// Decompresses data encoded using the LZW (Lempel-Ziv-Welch) adaptive
    /// compression method
    Lzw,

    /// Decompresses data encoded using the zlib/deflate compression method,
    /// reproducing the original text or binary data
    Flate,

    /// Decompresses data encoded using a byte-oriented run-length encoding
    /// algorithm (typically monochrome image data, or any data that contains
    /// frequent long runs of a single byte value)
    RunLength,

    /// Decompresses data encoded using the CCITT facsimile standard
    CcittFax,

    /// Decompresses data encoded using the JBIG2 standard
    Jbig2,

    /// Decompresses data encoded using a DCT (discrete cosine transform)
    /// technique based on the JPEG standard
    Dct,

    /// Decompresses data encoded using the wavelet-based JPEG2000 standard
    Jpx,

    /// Decrypts data encrypted by a security handler
    Crypt,
}

impl FilterKind {
    /// Inline images spell filters with abbreviated names; both forms are
    /// accepted everywhere.
    pub fn from_name(name: &str) -> RenderResult<Self> {
        Ok(match name {
            "ASCIIHexDecode" | "AHx" => FilterKind::AsciiHex,
            "ASCII85Decode" | "A85" => FilterKind::Ascii85,
            "LZWDecode" | "LZW" => FilterKind::Lzw,
            "FlateDecode" | "Fl" => FilterKind::Flate,
            "RunLengthDecode" | "RL" => FilterKind::RunLength,
            "CCITTFaxDecode" | "CCF" => FilterKind::CcittFax,
            "JBIG2Decode" => FilterKind::Jbig2,
            "DCTDecode" | "DCT" => FilterKind::Dct,
            "JPXDecode" => FilterKind::Jpx,
            "Crypt" => FilterKind::Crypt,
            _ => {
                return Err(RenderError::unsupported(format!("filter {:?}", name)));
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resolve::NullResolver;

    #[test]
    fn empty_filter_chain_is_the_identity() {
        let bytes = b"q 1 0 0 RG Q";
        let dict = Dictionary::empty();

        let decoded = decode_stream(bytes, &dict, &NullResolver).unwrap();
        assert_eq!(&*decoded, bytes);

        let mut dict = Dictionary::empty();
        dict.insert("Filter", Object::Array(Vec::new()));
        let decoded = decode_stream(bytes, &dict, &NullResolver).unwrap();
        assert_eq!(&*decoded, bytes);
    }

    #[test]
    fn abbreviated_filter_names_resolve() {
        assert_eq!(FilterKind::from_name("Fl").unwrap(), FilterKind::Flate);
        assert_eq!(
            FilterKind::from_name("FlateDecode").unwrap(),
            FilterKind::Flate
        );
        assert!(FilterKind::from_name("NotAFilter").is_err());
    }

    #[test]
    fn chained_filters_apply_in_order() {
        // ascii-hex wrapping run-length: "ab" run-length encoded then hexed
        let mut dict = Dictionary::empty();
        dict.insert(
            "Filter",
            Object::Array(vec![
                Object::Name("ASCIIHexDecode".to_owned()),
                Object::Name("RunLengthDecode".to_owned()),
            ]),
        );

        // RL: literal run of 2 bytes (length byte 1), then EOD (0x80)
        let decoded = decode_stream(b"01616280>", &dict, &NullResolver).unwrap();
        assert_eq!(&*decoded, b"ab");
    }
}
