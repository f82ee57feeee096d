use std::sync::Arc;

use crate::{
    data_structures::Rectangle,
    error::RenderResult,
    objects::{Dictionary, Object, StreamObject},
    render::{path::Path, Renderer},
    resolve::Resolve,
};

/// Annotation flag bits (1-based positions per the PDF spec).
const FLAG_HIDDEN: u32 = 1 << 1;

/// Widget field flag marking a radio button.
const FIELD_FLAG_RADIO: u32 = 1 << 15;

/// An annotation reduced to what appearance rendering needs.
///
/// When `appearance` is present it is the normal (`AP/N`) appearance
/// stream, already narrowed by the `AS` state; otherwise a recognized
/// subtype gets a synthesized appearance and everything else is skipped.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub subtype: String,

    /// The annotation rectangle in page coordinates
    pub rect: Rectangle,

    /// A set of flags; bit 2 hides the annotation entirely
    pub flags: u32,

    pub appearance: Option<Arc<StreamObject>>,

    /// `8 × n` numbers giving the corners of `n` highlighted quads
    pub quad_points: Option<Vec<f32>>,

    /// The annotation color (`C`), 1, 3 or 4 components
    pub color: Option<Vec<f32>>,

    /// The field type of a widget annotation: `Tx`, `Btn` or `Ch`
    pub field_type: Option<String>,

    /// The field value, as text where representable
    pub field_value: Option<String>,

    /// The appearance state (`AS`) selecting among appearance sub-streams
    pub appearance_state: Option<String>,

    /// Widget field flags (`Ff`)
    pub field_flags: u32,
}

impl Annotation {
    pub fn from_dict(dict: &Dictionary, resolver: &dyn Resolve) -> RenderResult<Self> {
        let subtype = dict
            .get_name("Subtype", resolver)?
            .unwrap_or_else(|| "Unknown".to_owned());

        let rect = dict.expect_rectangle("Rect", resolver)?;
        let flags = dict.get_integer("F", resolver)?.unwrap_or(0).max(0) as u32;

        let appearance_state = dict.get_name("AS", resolver)?;

        let appearance = match dict.get_dict("AP", resolver)? {
            Some(ap) => match ap.get("N", resolver)? {
                Some(Object::Stream(stream)) => Some(stream),
                Some(Object::Dictionary(states)) => match &appearance_state {
                    Some(state) => states.get_stream(state, resolver)?,
                    None => None,
                },
                _ => None,
            },
            None => None,
        };

        let quad_points = dict.get_number_arr("QuadPoints", resolver)?;
        let color = dict.get_number_arr("C", resolver)?;

        let field_type = dict.get_name("FT", resolver)?;
        let field_flags = dict.get_integer("Ff", resolver)?.unwrap_or(0).max(0) as u32;

        let field_value = match dict.get("V", resolver)? {
            Some(Object::String(bytes)) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Some(Object::Name(name)) => Some(name),
            _ => None,
        };

        Ok(Self {
            subtype,
            rect,
            flags,
            appearance,
            quad_points,
            color,
            field_type,
            field_value,
            appearance_state,
            field_flags,
        })
    }

    pub fn is_hidden(&self) -> bool {
        self.flags & FLAG_HIDDEN != 0
    }

    /// A checkbox or radio button is "on" unless its state is `Off`.
    fn is_checked(&self) -> bool {
        let state = self
            .appearance_state
            .as_deref()
            .or(self.field_value.as_deref());

        matches!(state, Some(state) if state != "Off")
    }

    /// The annotation color as sRGB, with a default per subtype.
    fn srgb(&self, default: [f32; 3]) -> [f32; 3] {
        match self.color.as_deref() {
            Some([gray]) => [*gray; 3],
            Some([r, g, b]) => [*r, *g, *b],
            Some([c, m, y, k]) => [
                (1.0 - c) * (1.0 - k),
                (1.0 - m) * (1.0 - k),
                (1.0 - y) * (1.0 - k),
            ],
            _ => default,
        }
    }
}

/// Draw a stand-in appearance for annotations that carry none.
pub(crate) fn synthesize_appearance(
    renderer: &mut Renderer,
    annotation: &Annotation,
) -> RenderResult<()> {
    let rect = annotation.rect;

    match (
        annotation.subtype.as_str(),
        annotation.field_type.as_deref(),
    ) {
        ("Text", _) => {
            // a rounded note icon
            let [r, g, b] = annotation.srgb([1.0, 0.82, 0.2]);

            let mut icon = Path::new();
            icon.rounded_rect(
                rect.lower_left_x,
                rect.lower_left_y,
                rect.width().min(20.0),
                rect.height().min(20.0),
                3.0,
            );

            renderer.fill_page_path(&icon, [r, g, b, 1.0]);
            renderer.stroke_page_path(&icon, [0.0, 0.0, 0.0, 1.0], 1.0);
        }
        ("Highlight", _) => {
            let [r, g, b] = annotation.srgb([1.0, 0.9, 0.0]);

            let mut quads = Path::new();

            match annotation.quad_points.as_deref() {
                Some(points) if points.len() >= 8 => {
                    // order per spec: upper-left, upper-right, lower-left,
                    // lower-right
                    for quad in points.chunks_exact(8) {
                        quads.move_to(quad[0], quad[1]);
                        quads.line_to(quad[2], quad[3]);
                        quads.line_to(quad[6], quad[7]);
                        quads.line_to(quad[4], quad[5]);
                        quads.close();
                    }
                }
                _ => {
                    quads.rect(
                        rect.lower_left_x,
                        rect.lower_left_y,
                        rect.width(),
                        rect.height(),
                    );
                }
            }

            renderer.fill_page_path(&quads, [r, g, b, 0.4]);
        }
        ("Widget", Some("Tx")) | ("Widget", Some("Ch")) => {
            let mut frame = Path::new();
            frame.rect(
                rect.lower_left_x,
                rect.lower_left_y,
                rect.width(),
                rect.height(),
            );

            renderer.fill_page_path(&frame, [1.0, 1.0, 1.0, 1.0]);
            renderer.stroke_page_path(&frame, [0.25, 0.25, 0.25, 1.0], 1.0);

            if let Some(value) = annotation.field_value.clone() {
                let size = (rect.height() - 4.0).clamp(4.0, 12.0);

                renderer.draw_label(
                    &value,
                    rect.lower_left_x + 2.0,
                    rect.lower_left_y + 2.0,
                    size,
                    [0.0, 0.0, 0.0, 1.0],
                );
            }
        }
        ("Widget", Some("Btn")) if annotation.field_flags & FIELD_FLAG_RADIO != 0 => {
            let cx = rect.lower_left_x + rect.width() / 2.0;
            let cy = rect.lower_left_y + rect.height() / 2.0;
            let radius = (rect.width().min(rect.height()) / 2.0 - 1.0).max(1.0);

            let mut ring = Path::new();
            ring.ellipse(cx, cy, radius, radius);

            renderer.fill_page_path(&ring, [1.0, 1.0, 1.0, 1.0]);
            renderer.stroke_page_path(&ring, [0.25, 0.25, 0.25, 1.0], 1.0);

            if annotation.is_checked() {
                let mut dot = Path::new();
                dot.ellipse(cx, cy, radius / 2.0, radius / 2.0);
                renderer.fill_page_path(&dot, [0.0, 0.0, 0.0, 1.0]);
            }
        }
        ("Widget", Some("Btn")) => {
            let mut frame = Path::new();
            frame.rect(
                rect.lower_left_x,
                rect.lower_left_y,
                rect.width(),
                rect.height(),
            );

            renderer.fill_page_path(&frame, [1.0, 1.0, 1.0, 1.0]);
            renderer.stroke_page_path(&frame, [0.25, 0.25, 0.25, 1.0], 1.0);

            if annotation.is_checked() {
                let inset = (rect.width().min(rect.height()) * 0.2).max(1.0);

                let mut cross = Path::new();
                cross.move_to(rect.lower_left_x + inset, rect.lower_left_y + inset);
                cross.line_to(rect.upper_right_x - inset, rect.upper_right_y - inset);
                cross.move_to(rect.lower_left_x + inset, rect.upper_right_y - inset);
                cross.line_to(rect.upper_right_x - inset, rect.lower_left_y + inset);

                renderer.stroke_page_path(&cross, [0.0, 0.0, 0.0, 1.0], 1.5);
            }
        }
        (subtype, _) => {
            log::debug!("no appearance for annotation subtype {:?}", subtype);
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resolve::NullResolver;

    fn base_dict() -> Dictionary {
        let mut dict = Dictionary::empty();
        dict.insert(
            "Rect",
            Object::Array(vec![
                Object::Integer(10),
                Object::Integer(10),
                Object::Integer(60),
                Object::Integer(30),
            ]),
        );
        dict.insert("Subtype", Object::Name("Text".to_owned()));
        dict
    }

    #[test]
    fn hidden_flag_is_bit_two() {
        let mut dict = base_dict();
        dict.insert("F", Object::Integer(2));

        let annotation = Annotation::from_dict(&dict, &NullResolver).unwrap();
        assert!(annotation.is_hidden());

        let mut dict = base_dict();
        dict.insert("F", Object::Integer(4));
        let annotation = Annotation::from_dict(&dict, &NullResolver).unwrap();
        assert!(!annotation.is_hidden());
    }

    #[test]
    fn appearance_state_selects_the_sub_stream() {
        let on_stream = Arc::new(StreamObject {
            dict: Dictionary::empty(),
            data: b"".to_vec(),
        });

        let mut states = Dictionary::empty();
        states.insert("Yes", Object::Stream(on_stream));

        let mut ap = Dictionary::empty();
        ap.insert("N", Object::Dictionary(states));

        let mut dict = base_dict();
        dict.insert("AP", Object::Dictionary(ap));
        dict.insert("AS", Object::Name("Yes".to_owned()));

        let annotation = Annotation::from_dict(&dict, &NullResolver).unwrap();
        assert!(annotation.appearance.is_some());

        let mut dict = base_dict();
        let mut states = Dictionary::empty();
        states.insert(
            "Yes",
            Object::Stream(Arc::new(StreamObject {
                dict: Dictionary::empty(),
                data: Vec::new(),
            })),
        );
        let mut ap = Dictionary::empty();
        ap.insert("N", Object::Dictionary(states));
        dict.insert("AP", Object::Dictionary(ap));
        dict.insert("AS", Object::Name("Off".to_owned()));

        let annotation = Annotation::from_dict(&dict, &NullResolver).unwrap();
        assert!(annotation.appearance.is_none());
    }

    #[test]
    fn checked_state_ignores_off() {
        let mut dict = base_dict();
        dict.insert("AS", Object::Name("Off".to_owned()));
        let annotation = Annotation::from_dict(&dict, &NullResolver).unwrap();
        assert!(!annotation.is_checked());

        let mut dict = base_dict();
        dict.insert("AS", Object::Name("Yes".to_owned()));
        let annotation = Annotation::from_dict(&dict, &NullResolver).unwrap();
        assert!(annotation.is_checked());
    }
}
