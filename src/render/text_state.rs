use std::rc::Rc;

use crate::{data_structures::Matrix, font::Font, pdf_enum};

pdf_enum!(
    int
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum TextRenderingMode {
        Fill = 0,
        Stroke = 1,
        FillThenStroke = 2,
        Invisible = 3,
        FillAndAddToClipping = 4,
        StrokeAndAddToClipping = 5,
        FillThenStrokeAndAddToClipping = 6,
        AddToClipping = 7,
    }
);

impl TextRenderingMode {
    pub fn fills(self) -> bool {
        matches!(
            self,
            Self::Fill
                | Self::FillThenStroke
                | Self::FillAndAddToClipping
                | Self::FillThenStrokeAndAddToClipping
        )
    }

    pub fn strokes(self) -> bool {
        matches!(
            self,
            Self::Stroke
                | Self::FillThenStroke
                | Self::StrokeAndAddToClipping
                | Self::FillThenStrokeAndAddToClipping
        )
    }

    /// Modes 4 through 7 accumulate glyph outlines into a clip applied at
    /// the end of the text object.
    pub fn clips(self) -> bool {
        matches!(
            self,
            Self::FillAndAddToClipping
                | Self::StrokeAndAddToClipping
                | Self::FillThenStrokeAndAddToClipping
                | Self::AddToClipping
        )
    }
}

#[derive(Debug, Clone)]
pub struct TextState {
    /// The character-spacing parameter, in unscaled text space units
    /// (subject to scaling by the horizontal scaling parameter). Added to
    /// each glyph's horizontal displacement; a positive value expands the
    /// distance between glyphs.
    pub character_spacing: f32,

    /// Word spacing works the same way as character spacing but applies
    /// only to the single-byte character code 32. It does not apply to
    /// occurrences of the byte value 32 in multiple-byte codes.
    pub word_spacing: f32,

    /// Stretches or compresses glyphs and their displacements in the
    /// horizontal direction, stored as a fraction of normal width (the
    /// `Tz` operand divided by 100).
    pub horizontal_scaling: f32,

    /// The vertical distance between the baselines of adjacent lines of
    /// text, in unscaled text space units.
    pub leading: f32,

    pub font: Option<Rc<Font>>,
    pub font_size: f32,
    pub rendering_mode: TextRenderingMode,

    /// The distance to move the baseline up or down from its default
    /// location, in unscaled text space units. Positive values move the
    /// baseline up.
    pub rise: f32,

    /// Set at `BT`, updated by positioning operators and by showing text.
    pub text_matrix: Matrix,

    /// Tracks the origin of the current line; positioning operators
    /// compose against this, not against the text matrix.
    pub text_line_matrix: Matrix,
}

impl TextState {
    /// `BT`: both text matrices reset to the identity.
    pub fn reinit(&mut self) {
        self.text_matrix = Matrix::identity();
        self.text_line_matrix = Matrix::identity();
    }
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            character_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 1.0,
            leading: 0.0,
            font: None,
            font_size: 0.0,
            rendering_mode: TextRenderingMode::Fill,
            rise: 0.0,
            text_matrix: Matrix::identity(),
            text_line_matrix: Matrix::identity(),
        }
    }
}
