use std::{collections::HashMap, sync::Arc};

use once_cell::sync::Lazy;

use crate::{
    error::RenderResult,
    objects::{Dictionary, Object, StreamObject},
    render::path::Path,
    resolve::Resolve,
};

/// Advance widths for the fallback shaper, in em fractions, coarsely
/// patterned after the Helvetica metrics: narrow lowercase letters and
/// punctuation take less room than capitals, `m` and `w` take more.
static FALLBACK_ADVANCES: Lazy<[f32; 256]> = Lazy::new(|| {
    let mut advances = [0.5f32; 256];

    for b in 0..=255u8 {
        advances[b as usize] = match b {
            b' ' => 0.28,
            b'i' | b'j' | b'l' | b'.' | b',' | b'\'' | b'!' | b'|' => 0.22,
            b'f' | b't' | b'r' | b'(' | b')' | b'[' | b']' | b'-' => 0.33,
            b'm' | b'w' | b'M' | b'W' | b'@' => 0.83,
            _ => 0.5,
        };
    }

    advances
});

/// How string bytes map to CIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontEncoding {
    /// One byte per code; the CID is the byte value
    Simple,

    /// Two bytes per CID, big-endian, the Identity-H mapping of composite
    /// fonts
    IdentityH,
}

/// A glyph as delivered by a [`FontShaper`]: the advance and outline are
/// both in em units, so the renderer scales them by the font size.
#[derive(Debug, Clone)]
pub struct Glyph {
    pub advance: f32,
    pub outline: Option<Path>,
}

/// The glyph-providing capability.
///
/// Font file parsing, cmap lookup and shaping live behind this trait; the
/// renderer only asks for an advance and an outline per CID and pushes the
/// outline through the ordinary path machinery. Implementations must be
/// shareable across page workers.
pub trait FontShaper: Send + Sync {
    fn glyph(&self, font: &Font, cid: u32) -> Option<Glyph>;
}

/// The fallback shaper used when no real shaper is attached: every glyph
/// is a filled box of half an em, spaces advance without painting. Keeps
/// text extents and positioning observable without any font machinery.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoxGlyphShaper;

impl FontShaper for BoxGlyphShaper {
    fn glyph(&self, font: &Font, cid: u32) -> Option<Glyph> {
        let advance = match u8::try_from(cid) {
            Ok(byte) => FALLBACK_ADVANCES[byte as usize],
            Err(..) => 0.5,
        };

        if font.encoding == FontEncoding::Simple && cid == 0x20 {
            return Some(Glyph {
                advance,
                outline: None,
            });
        }

        let mut outline = Path::new();
        outline.move_to(0.08, 0.0);
        outline.line_to(0.42, 0.0);
        outline.line_to(0.42, 0.66);
        outline.line_to(0.08, 0.66);
        outline.close();

        Some(Glyph {
            advance,
            outline: Some(outline),
        })
    }
}

/// A font resource reduced to what rendering needs: the encoding, the
/// width tables, and the embedded program for the shaper to chew on.
#[derive(Debug, Clone)]
pub struct Font {
    /// `BaseFont`, e.g. `Helvetica` or `ABCDEF+Subset`
    pub base_name: String,

    /// `Type1`, `TrueType`, `Type0`, `Type3`, `MMType1`
    pub subtype: String,

    pub encoding: FontEncoding,

    /// Whether the encoding maps codes to glyph indices untranslated
    pub is_identity: bool,

    /// Widths in em fractions: per code for simple fonts (from
    /// `FirstChar`/`Widths`), per CID for composite fonts (from `W`)
    widths: HashMap<u32, f32>,

    /// `DW` of composite fonts, in em fractions
    default_width: Option<f32>,

    /// The embedded font program (`FontFile`/`FontFile2`/`FontFile3`),
    /// raw, for consumption by the shaper
    pub embedded: Option<Arc<StreamObject>>,

    /// The `ToUnicode` CMap, raw; carried for text-extraction consumers,
    /// unused by rasterization
    pub to_unicode: Option<Arc<StreamObject>>,
}

impl Font {
    /// A synthetic simple font for callers that need to draw a label
    /// without any font resource in scope.
    pub fn fallback() -> Self {
        Self {
            base_name: "Helvetica".to_owned(),
            subtype: "Type1".to_owned(),
            encoding: FontEncoding::Simple,
            is_identity: false,
            widths: HashMap::new(),
            default_width: None,
            embedded: None,
            to_unicode: None,
        }
    }

    pub fn from_dict(dict: &Dictionary, resolver: &dyn Resolve) -> RenderResult<Self> {
        let base_name = dict
            .get_name("BaseFont", resolver)?
            .unwrap_or_else(|| "Unknown".to_owned());

        let subtype = dict
            .get_name("Subtype", resolver)?
            .unwrap_or_else(|| "Type1".to_owned());

        let to_unicode = dict.get_stream("ToUnicode", resolver)?;

        if subtype == "Type0" {
            return Self::from_composite(dict, base_name, subtype, to_unicode, resolver);
        }

        let mut widths = HashMap::new();

        if let (Some(first_char), Some(width_arr)) = (
            dict.get_integer("FirstChar", resolver)?,
            dict.get_number_arr("Widths", resolver)?,
        ) {
            for (i, width) in width_arr.into_iter().enumerate() {
                widths.insert(first_char.max(0) as u32 + i as u32, width / 1000.0);
            }
        }

        let embedded = match dict.get_dict("FontDescriptor", resolver)? {
            Some(descriptor) => font_file(&descriptor, resolver)?,
            None => None,
        };

        Ok(Self {
            base_name,
            subtype,
            encoding: FontEncoding::Simple,
            is_identity: false,
            widths,
            default_width: None,
            embedded,
            to_unicode,
        })
    }

    fn from_composite(
        dict: &Dictionary,
        base_name: String,
        subtype: String,
        to_unicode: Option<Arc<StreamObject>>,
        resolver: &dyn Resolve,
    ) -> RenderResult<Self> {
        let is_identity = matches!(
            dict.get_name("Encoding", resolver)?.as_deref(),
            Some("Identity-H") | Some("Identity-V") | None
        );

        let mut widths = HashMap::new();
        let mut default_width = None;
        let mut embedded = None;

        if let Some(descendants) = dict.get_arr("DescendantFonts", resolver)? {
            if let Some(descendant) = descendants.first() {
                let descendant = resolver.assert_dict(descendant.clone())?;

                default_width = descendant
                    .get_number("DW", resolver)?
                    .map(|dw| dw / 1000.0);

                if let Some(w) = descendant.get_arr("W", resolver)? {
                    parse_cid_widths(&w, &mut widths, resolver)?;
                }

                if let Some(descriptor) = descendant.get_dict("FontDescriptor", resolver)? {
                    embedded = font_file(&descriptor, resolver)?;
                }
            }
        }

        Ok(Self {
            base_name,
            subtype,
            encoding: FontEncoding::IdentityH,
            is_identity,
            widths,
            default_width,
            embedded,
            to_unicode,
        })
    }

    /// Decode string bytes into CIDs. The `is_space` flag marks the
    /// single-byte code 32, the only code word spacing applies to.
    pub fn decode_cids(&self, bytes: &[u8]) -> Vec<(u32, bool)> {
        match self.encoding {
            FontEncoding::Simple => bytes.iter().map(|&b| (b as u32, b == 0x20)).collect(),
            FontEncoding::IdentityH => bytes
                .chunks(2)
                .map(|pair| {
                    let cid = match pair {
                        [hi, lo] => u16::from_be_bytes([*hi, *lo]) as u32,
                        [hi] => (*hi as u32) << 8,
                        _ => 0,
                    };

                    (cid, false)
                })
                .collect(),
        }
    }

    /// The advance from the font dictionary's width tables, in em
    /// fractions. `None` defers to the shaper.
    pub fn width(&self, cid: u32) -> Option<f32> {
        self.widths.get(&cid).copied().or(self.default_width)
    }
}

fn font_file(
    descriptor: &Dictionary,
    resolver: &dyn Resolve,
) -> RenderResult<Option<Arc<StreamObject>>> {
    for key in ["FontFile2", "FontFile3", "FontFile"] {
        if let Some(stream) = descriptor.get_stream(key, resolver)? {
            return Ok(Some(stream));
        }
    }

    Ok(None)
}

/// `W` arrays mix two forms: `c [w1 w2 ...]` assigns consecutive widths
/// starting at CID c; `c_first c_last w` assigns one width to a range.
fn parse_cid_widths(
    w: &[Object],
    widths: &mut HashMap<u32, f32>,
    resolver: &dyn Resolve,
) -> RenderResult<()> {
    let mut i = 0;

    while i < w.len() {
        let first = resolver.assert_integer(w[i].clone())?.max(0) as u32;

        match w.get(i + 1) {
            Some(Object::Array(run)) => {
                for (offset, width) in run.iter().enumerate() {
                    let width = resolver.assert_number(width.clone())?;
                    widths.insert(first + offset as u32, width / 1000.0);
                }

                i += 2;
            }
            Some(_) => {
                let last = match w.get(i + 1) {
                    Some(obj) => resolver.assert_integer(obj.clone())?.max(0) as u32,
                    None => break,
                };
                let width = match w.get(i + 2) {
                    Some(obj) => resolver.assert_number(obj.clone())? / 1000.0,
                    None => break,
                };

                for cid in first..=last.min(first + 0xffff) {
                    widths.insert(cid, width);
                }

                i += 3;
            }
            None => break,
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resolve::NullResolver;

    fn simple_font() -> Font {
        Font {
            base_name: "Helvetica".to_owned(),
            subtype: "Type1".to_owned(),
            encoding: FontEncoding::Simple,
            is_identity: false,
            widths: HashMap::new(),
            default_width: None,
            embedded: None,
            to_unicode: None,
        }
    }

    #[test]
    fn simple_fonts_decode_byte_per_cid() {
        let cids = simple_font().decode_cids(b"Hi !");

        assert_eq!(
            cids,
            vec![
                (b'H' as u32, false),
                (b'i' as u32, false),
                (0x20, true),
                (b'!' as u32, false),
            ]
        );
    }

    #[test]
    fn identity_h_decodes_two_byte_cids() {
        let mut font = simple_font();
        font.encoding = FontEncoding::IdentityH;

        let cids = font.decode_cids(&[0x01, 0x02, 0x00, 0x20]);

        // the 0x0020 CID is not a space in two-byte codes
        assert_eq!(cids, vec![(0x0102, false), (0x0020, false)]);
    }

    #[test]
    fn w_array_supports_both_forms() {
        let w = vec![
            Object::Integer(1),
            Object::Array(vec![Object::Integer(500), Object::Integer(600)]),
            Object::Integer(10),
            Object::Integer(12),
            Object::Integer(250),
        ];

        let mut widths = HashMap::new();
        parse_cid_widths(&w, &mut widths, &NullResolver).unwrap();

        assert_eq!(widths.get(&1), Some(&0.5));
        assert_eq!(widths.get(&2), Some(&0.6));
        assert_eq!(widths.get(&10), Some(&0.25));
        assert_eq!(widths.get(&11), Some(&0.25));
        assert_eq!(widths.get(&12), Some(&0.25));
        assert_eq!(widths.get(&13), None);
    }

    #[test]
    fn box_shaper_skips_spaces() {
        let font = simple_font();

        assert!(BoxGlyphShaper.glyph(&font, 0x20).unwrap().outline.is_none());
        assert!(BoxGlyphShaper.glyph(&font, b'A' as u32).unwrap().outline.is_some());
    }
}
