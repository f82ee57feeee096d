use log::warn;

use crate::{
    content::{ContentLexer, ContentToken, InlineImage},
    data_structures::Matrix,
    error::{RenderError, RenderResult},
    objects::Object,
};

/// One element of a `TJ` array.
#[derive(Debug, Clone, PartialEq)]
pub enum TextItem {
    Text(Vec<u8>),
    /// Thousandths of a text-space unit, subtracted from the current
    /// horizontal position
    Adjust(f32),
}

/// A content-stream operator with its operands already typed.
///
/// Operands are immutable once constructed; the renderer dispatches on the
/// variant directly, with no table lookup in the hot loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// Save graphics state
    SaveState,

    /// Restore graphics state
    RestoreState,

    /// Concatenate matrix to current transformation matrix
    ConcatMatrix(Matrix),

    /// Set line width
    SetLineWidth(f32),

    /// Set line cap style
    SetLineCap(i32),

    /// Set line join style
    SetLineJoin(i32),

    /// Set miter limit
    SetMiterLimit(f32),

    /// Set line dash pattern
    SetDashPattern { array: Vec<f32>, phase: f32 },

    /// Set color rendering intent
    SetRenderingIntent(String),

    /// Set flatness tolerance
    SetFlatness(f32),

    /// Set parameters from graphics state parameter dictionary
    SetExtGState(String),

    /// Begin new subpath
    MoveTo { x: f32, y: f32 },

    /// Append straight line segment to path
    LineTo { x: f32, y: f32 },

    /// Append curved segment to path (three control points)
    CurveTo {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        x3: f32,
        y3: f32,
    },

    /// Append curved segment to path (initial point replicated)
    CurveToInitial { x2: f32, y2: f32, x3: f32, y3: f32 },

    /// Append curved segment to path (final point replicated)
    CurveToFinal { x1: f32, y1: f32, x3: f32, y3: f32 },

    /// Append rectangle to path
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },

    /// Close subpath
    ClosePath,

    /// Stroke path
    Stroke,

    /// Close and stroke path
    CloseStroke,

    /// Fill path using nonzero winding number rule. `F` is an obsolete
    /// alias.
    Fill,

    /// Fill path using even-odd rule
    FillEvenOdd,

    /// Fill and stroke path using nonzero winding number rule
    FillStroke,

    /// Fill and stroke path using even-odd rule
    FillStrokeEvenOdd,

    /// Close, fill, and stroke path using nonzero winding number rule
    CloseFillStroke,

    /// Close, fill, and stroke path using even-odd rule
    CloseFillStrokeEvenOdd,

    /// End path without filling or stroking
    EndPath,

    /// Set clipping path using nonzero winding number rule
    Clip,

    /// Set clipping path using even-odd rule
    ClipEvenOdd,

    /// Set color space for stroking operations
    SetStrokeColorSpace(String),

    /// Set color space for nonstroking operations
    SetFillColorSpace(String),

    /// Set color for stroking operations
    SetStrokeColor(Vec<f32>),

    /// Set color for nonstroking operations
    SetFillColor(Vec<f32>),

    /// Set color for stroking operations (ICCBased and special colour
    /// spaces); a trailing name selects a pattern
    SetStrokeColorExtended {
        components: Vec<f32>,
        pattern: Option<String>,
    },

    /// Set color for nonstroking operations (ICCBased and special colour
    /// spaces); a trailing name selects a pattern
    SetFillColorExtended {
        components: Vec<f32>,
        pattern: Option<String>,
    },

    /// Set gray level for stroking operations
    SetStrokeGray(f32),

    /// Set gray level for nonstroking operations
    SetFillGray(f32),

    /// Set RGB color for stroking operations
    SetStrokeRgb(f32, f32, f32),

    /// Set RGB color for nonstroking operations
    SetFillRgb(f32, f32, f32),

    /// Set CMYK color for stroking operations
    SetStrokeCmyk(f32, f32, f32, f32),

    /// Set CMYK color for nonstroking operations
    SetFillCmyk(f32, f32, f32, f32),

    /// Paint area defined by shading pattern
    PaintShading(String),

    /// Invoke named XObject
    PaintXObject(String),

    /// A complete inline image (`BI ... ID <bytes> EI`)
    InlineImage(InlineImage),

    /// Begin text object
    BeginText,

    /// End text object
    EndText,

    /// Set character spacing
    SetCharSpacing(f32),

    /// Set word spacing
    SetWordSpacing(f32),

    /// Set horizontal text scaling
    SetHorizontalScaling(f32),

    /// Set text leading
    SetLeading(f32),

    /// Set text font and size
    SetFont { name: String, size: f32 },

    /// Set text rendering mode
    SetRenderingMode(i32),

    /// Set text rise
    SetRise(f32),

    /// Move text position
    MoveText { tx: f32, ty: f32 },

    /// Move text position and set leading
    MoveTextSetLeading { tx: f32, ty: f32 },

    /// Set text matrix and text line matrix
    SetTextMatrix(Matrix),

    /// Move to start of next text line
    NextLine,

    /// Show text
    ShowText(Vec<u8>),

    /// Show text, allowing individual glyph positioning
    ShowTextAdjusted(Vec<TextItem>),

    /// Move to next line and show text
    NextLineShowText(Vec<u8>),

    /// Set word and character spacing, move to next line, and show text
    NextLineShowTextSpaced {
        word_spacing: f32,
        char_spacing: f32,
        text: Vec<u8>,
    },

    /// Begin marked-content sequence
    BeginMarkedContent(String),

    /// Begin marked-content sequence with property list
    BeginMarkedContentWithProperties(String),

    /// End marked-content sequence
    EndMarkedContent,

    /// Define marked-content point
    MarkedContentPoint(String),

    /// Define marked-content point with property list
    MarkedContentPointWithProperties(String),

    /// Begin compatibility section
    BeginCompatibility,

    /// End compatibility section
    EndCompatibility,
}

/// Drives the [`ContentLexer`], accumulating operands on a stack and
/// emitting a typed [`Operator`] for each operator token.
///
/// Unknown operators consume the pending operand stack and vanish; a known
/// operator over a mismatched stack is skipped the same way. Only lexical
/// errors (unterminated tokens) surface to the caller.
pub struct OperatorParser<'a> {
    lexer: ContentLexer<'a>,
    stack: Vec<Object>,
}

impl<'a> OperatorParser<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            lexer: ContentLexer::new(buffer),
            stack: Vec::new(),
        }
    }
}

impl<'a> Iterator for OperatorParser<'a> {
    type Item = RenderResult<Operator>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lexer.next()? {
                Ok(ContentToken::Object(obj)) => self.stack.push(obj),
                Ok(ContentToken::InlineImage(image)) => {
                    self.stack.clear();
                    return Some(Ok(Operator::InlineImage(image)));
                }
                Ok(ContentToken::Operator(tag)) => {
                    let result = build_operator(&tag, &mut self.stack);
                    self.stack.clear();

                    match result {
                        Some(op) => return Some(Ok(op)),
                        // mismatched stack or unknown operator: skip it
                        None => continue,
                    }
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

struct Operands<'a> {
    stack: &'a mut Vec<Object>,
}

impl<'a> Operands<'a> {
    fn pop(&mut self) -> RenderResult<Object> {
        self.stack.pop().ok_or(RenderError::MalformedStream {
            reason: "operand stack underflow",
        })
    }

    fn pop_number(&mut self) -> RenderResult<f32> {
        match self.pop()? {
            Object::Integer(i) => Ok(i as f32),
            Object::Real(r) => Ok(r),
            _ => Err(RenderError::MalformedStream {
                reason: "expected number operand",
            }),
        }
    }

    fn pop_integer(&mut self) -> RenderResult<i32> {
        Ok(self.pop_number()? as i32)
    }

    fn pop_name(&mut self) -> RenderResult<String> {
        match self.pop()? {
            Object::Name(name) => Ok(name),
            _ => Err(RenderError::MalformedStream {
                reason: "expected name operand",
            }),
        }
    }

    fn pop_string(&mut self) -> RenderResult<Vec<u8>> {
        match self.pop()? {
            Object::String(s) => Ok(s),
            _ => Err(RenderError::MalformedStream {
                reason: "expected string operand",
            }),
        }
    }

    fn pop_arr(&mut self) -> RenderResult<Vec<Object>> {
        match self.pop()? {
            Object::Array(a) => Ok(a),
            _ => Err(RenderError::MalformedStream {
                reason: "expected array operand",
            }),
        }
    }

    fn pop_matrix(&mut self) -> RenderResult<Matrix> {
        let f = self.pop_number()?;
        let e = self.pop_number()?;
        let d = self.pop_number()?;
        let c = self.pop_number()?;
        let b = self.pop_number()?;
        let a = self.pop_number()?;

        Ok(Matrix::new(a, b, c, d, e, f))
    }

    /// Everything left on the stack, as numbers, in operand order.
    fn drain_numbers(&mut self) -> RenderResult<Vec<f32>> {
        let mut out = Vec::with_capacity(self.stack.len());

        for obj in self.stack.drain(..) {
            match obj {
                Object::Integer(i) => out.push(i as f32),
                Object::Real(r) => out.push(r),
                _ => {
                    return Err(RenderError::MalformedStream {
                        reason: "expected number operand",
                    })
                }
            }
        }

        Ok(out)
    }

    /// A marked-content tag: `BDC`/`DP` carry a properties operand (inline
    /// dictionary or a name into the Properties resource) after the tag.
    fn pop_tag_with_properties(&mut self) -> RenderResult<String> {
        // discard the property list
        match self.pop()? {
            Object::Dictionary(_) | Object::Name(_) => {}
            _ => {
                return Err(RenderError::MalformedStream {
                    reason: "expected property list operand",
                })
            }
        }

        self.pop_name()
    }
}

/// `None` means "skip this operator": either the tag is unknown or the
/// operand stack did not hold what its arity requires.
fn build_operator(tag: &str, stack: &mut Vec<Object>) -> Option<Operator> {
    let mut operands = Operands { stack };

    match try_build(tag, &mut operands) {
        Ok(Some(op)) => Some(op),
        Ok(None) => {
            warn!("skipping unknown operator {:?}", tag);
            None
        }
        Err(err) => {
            warn!("skipping operator {:?}: {}", tag, err);
            None
        }
    }
}

fn try_build(tag: &str, o: &mut Operands) -> RenderResult<Option<Operator>> {
    Ok(Some(match tag {
        "q" => Operator::SaveState,
        "Q" => Operator::RestoreState,
        "cm" => Operator::ConcatMatrix(o.pop_matrix()?),
        "w" => Operator::SetLineWidth(o.pop_number()?),
        "J" => Operator::SetLineCap(o.pop_integer()?),
        "j" => Operator::SetLineJoin(o.pop_integer()?),
        "M" => Operator::SetMiterLimit(o.pop_number()?),
        "d" => {
            let phase = o.pop_number()?;
            let array = o
                .pop_arr()?
                .into_iter()
                .map(|obj| {
                    obj.as_number().ok_or(RenderError::MalformedStream {
                        reason: "dash array entry is not a number",
                    })
                })
                .collect::<RenderResult<Vec<f32>>>()?;

            Operator::SetDashPattern { array, phase }
        }
        "ri" => Operator::SetRenderingIntent(o.pop_name()?),
        "i" => Operator::SetFlatness(o.pop_number()?),
        "gs" => Operator::SetExtGState(o.pop_name()?),

        "m" => {
            let y = o.pop_number()?;
            let x = o.pop_number()?;
            Operator::MoveTo { x, y }
        }
        "l" => {
            let y = o.pop_number()?;
            let x = o.pop_number()?;
            Operator::LineTo { x, y }
        }
        "c" => {
            let y3 = o.pop_number()?;
            let x3 = o.pop_number()?;
            let y2 = o.pop_number()?;
            let x2 = o.pop_number()?;
            let y1 = o.pop_number()?;
            let x1 = o.pop_number()?;
            Operator::CurveTo {
                x1,
                y1,
                x2,
                y2,
                x3,
                y3,
            }
        }
        "v" => {
            let y3 = o.pop_number()?;
            let x3 = o.pop_number()?;
            let y2 = o.pop_number()?;
            let x2 = o.pop_number()?;
            Operator::CurveToInitial { x2, y2, x3, y3 }
        }
        "y" => {
            let y3 = o.pop_number()?;
            let x3 = o.pop_number()?;
            let y1 = o.pop_number()?;
            let x1 = o.pop_number()?;
            Operator::CurveToFinal { x1, y1, x3, y3 }
        }
        "re" => {
            let height = o.pop_number()?;
            let width = o.pop_number()?;
            let y = o.pop_number()?;
            let x = o.pop_number()?;
            Operator::Rect {
                x,
                y,
                width,
                height,
            }
        }
        "h" => Operator::ClosePath,

        "S" => Operator::Stroke,
        "s" => Operator::CloseStroke,
        "f" | "F" => Operator::Fill,
        "f*" => Operator::FillEvenOdd,
        "B" => Operator::FillStroke,
        "B*" => Operator::FillStrokeEvenOdd,
        "b" => Operator::CloseFillStroke,
        "b*" => Operator::CloseFillStrokeEvenOdd,
        "n" => Operator::EndPath,
        "W" => Operator::Clip,
        "W*" => Operator::ClipEvenOdd,

        "CS" => Operator::SetStrokeColorSpace(o.pop_name()?),
        "cs" => Operator::SetFillColorSpace(o.pop_name()?),
        "SC" => Operator::SetStrokeColor(o.drain_numbers()?),
        "sc" => Operator::SetFillColor(o.drain_numbers()?),
        "SCN" => {
            let pattern = pop_optional_pattern_name(o);
            Operator::SetStrokeColorExtended {
                components: o.drain_numbers()?,
                pattern,
            }
        }
        "scn" => {
            let pattern = pop_optional_pattern_name(o);
            Operator::SetFillColorExtended {
                components: o.drain_numbers()?,
                pattern,
            }
        }
        "G" => Operator::SetStrokeGray(o.pop_number()?),
        "g" => Operator::SetFillGray(o.pop_number()?),
        "RG" => {
            let b = o.pop_number()?;
            let g = o.pop_number()?;
            let r = o.pop_number()?;
            Operator::SetStrokeRgb(r, g, b)
        }
        "rg" => {
            let b = o.pop_number()?;
            let g = o.pop_number()?;
            let r = o.pop_number()?;
            Operator::SetFillRgb(r, g, b)
        }
        "K" => {
            let k = o.pop_number()?;
            let y = o.pop_number()?;
            let m = o.pop_number()?;
            let c = o.pop_number()?;
            Operator::SetStrokeCmyk(c, m, y, k)
        }
        "k" => {
            let k = o.pop_number()?;
            let y = o.pop_number()?;
            let m = o.pop_number()?;
            let c = o.pop_number()?;
            Operator::SetFillCmyk(c, m, y, k)
        }

        "sh" => Operator::PaintShading(o.pop_name()?),
        "Do" => Operator::PaintXObject(o.pop_name()?),

        "BT" => Operator::BeginText,
        "ET" => Operator::EndText,
        "Tc" => Operator::SetCharSpacing(o.pop_number()?),
        "Tw" => Operator::SetWordSpacing(o.pop_number()?),
        "Tz" => Operator::SetHorizontalScaling(o.pop_number()?),
        "TL" => Operator::SetLeading(o.pop_number()?),
        "Tf" => {
            let size = o.pop_number()?;
            let name = o.pop_name()?;
            Operator::SetFont { name, size }
        }
        "Tr" => Operator::SetRenderingMode(o.pop_integer()?),
        "Ts" => Operator::SetRise(o.pop_number()?),
        "Td" => {
            let ty = o.pop_number()?;
            let tx = o.pop_number()?;
            Operator::MoveText { tx, ty }
        }
        "TD" => {
            let ty = o.pop_number()?;
            let tx = o.pop_number()?;
            Operator::MoveTextSetLeading { tx, ty }
        }
        "Tm" => Operator::SetTextMatrix(o.pop_matrix()?),
        "T*" => Operator::NextLine,
        "Tj" => Operator::ShowText(o.pop_string()?),
        "TJ" => {
            let items = o
                .pop_arr()?
                .into_iter()
                .map(|obj| match obj {
                    Object::String(s) => Ok(TextItem::Text(s)),
                    Object::Integer(i) => Ok(TextItem::Adjust(i as f32)),
                    Object::Real(r) => Ok(TextItem::Adjust(r)),
                    _ => Err(RenderError::MalformedStream {
                        reason: "TJ array entry is not a string or number",
                    }),
                })
                .collect::<RenderResult<Vec<TextItem>>>()?;

            Operator::ShowTextAdjusted(items)
        }
        "'" => Operator::NextLineShowText(o.pop_string()?),
        "\"" => {
            let text = o.pop_string()?;
            let char_spacing = o.pop_number()?;
            let word_spacing = o.pop_number()?;
            Operator::NextLineShowTextSpaced {
                word_spacing,
                char_spacing,
                text,
            }
        }

        "BMC" => Operator::BeginMarkedContent(o.pop_name()?),
        "BDC" => Operator::BeginMarkedContentWithProperties(o.pop_tag_with_properties()?),
        "EMC" => Operator::EndMarkedContent,
        "MP" => Operator::MarkedContentPoint(o.pop_name()?),
        "DP" => Operator::MarkedContentPointWithProperties(o.pop_tag_with_properties()?),
        "BX" => Operator::BeginCompatibility,
        "EX" => Operator::EndCompatibility,

        _ => return Ok(None),
    }))
}

fn pop_optional_pattern_name(o: &mut Operands) -> Option<String> {
    match o.stack.last() {
        Some(Object::Name(..)) => match o.stack.pop() {
            Some(Object::Name(name)) => Some(name),
            _ => unreachable!(),
        },
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(buffer: &[u8]) -> Vec<Operator> {
        OperatorParser::new(buffer)
            .collect::<RenderResult<Vec<Operator>>>()
            .unwrap()
    }

    #[test]
    fn operands_pop_in_written_order() {
        assert_eq!(
            parse(b"10 20 m 1 2 3 4 5 6 cm"),
            vec![
                Operator::MoveTo { x: 10.0, y: 20.0 },
                Operator::ConcatMatrix(Matrix::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0)),
            ]
        );
    }

    #[test]
    fn each_operator_consumes_exactly_its_arity() {
        // a well-formed stream leaves nothing behind: the stray `99`
        // belongs to nobody and is dropped by the next operator
        assert_eq!(
            parse(b"99 1 0 0 RG S"),
            vec![Operator::SetStrokeRgb(1.0, 0.0, 0.0), Operator::Stroke]
        );
    }

    #[test]
    fn unknown_operators_are_skipped() {
        assert_eq!(
            parse(b"1 2 frob 5 w"),
            vec![Operator::SetLineWidth(5.0)]
        );
    }

    #[test]
    fn mismatched_stack_degrades_to_skip() {
        // `re` wants four numbers; give it two
        assert_eq!(parse(b"1 2 re h"), vec![Operator::ClosePath]);
    }

    #[test]
    fn scn_takes_an_optional_pattern_name() {
        assert_eq!(
            parse(b"/P0 scn 0.1 0.2 0.3 scn"),
            vec![
                Operator::SetFillColorExtended {
                    components: vec![],
                    pattern: Some("P0".to_owned()),
                },
                Operator::SetFillColorExtended {
                    components: vec![0.1, 0.2, 0.3],
                    pattern: None,
                },
            ]
        );
    }

    #[test]
    fn tj_arrays_mix_strings_and_adjustments() {
        assert_eq!(
            parse(b"[(He) 120 (llo)] TJ"),
            vec![Operator::ShowTextAdjusted(vec![
                TextItem::Text(b"He".to_vec()),
                TextItem::Adjust(120.0),
                TextItem::Text(b"llo".to_vec()),
            ])]
        );
    }

    #[test]
    fn dash_pattern_parses_array_and_phase() {
        assert_eq!(
            parse(b"[2 1] 0.5 d"),
            vec![Operator::SetDashPattern {
                array: vec![2.0, 1.0],
                phase: 0.5,
            }]
        );
    }

    #[test]
    fn bdc_discards_inline_property_lists() {
        assert_eq!(
            parse(b"/OC << /Type /OCMD >> BDC EMC"),
            vec![
                Operator::BeginMarkedContentWithProperties("OC".to_owned()),
                Operator::EndMarkedContent,
            ]
        );
    }

    #[test]
    fn quote_operator_shows_on_the_next_line() {
        assert_eq!(
            parse(b"(hi) ' 1 2 (bye) \""),
            vec![
                Operator::NextLineShowText(b"hi".to_vec()),
                Operator::NextLineShowTextSpaced {
                    word_spacing: 1.0,
                    char_spacing: 2.0,
                    text: b"bye".to_vec(),
                },
            ]
        );
    }
}
