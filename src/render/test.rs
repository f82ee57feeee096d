use std::sync::Arc;

use super::*;
use crate::{
    document::{InMemoryDocument, PdfDocument},
    objects::{Dictionary, Object, StreamObject},
    render_page, render_raw_content,
    resolve::NullResolver,
};

fn name(value: &str) -> Object {
    Object::Name(value.to_owned())
}

fn int(value: i32) -> Object {
    Object::Integer(value)
}

fn real(value: f32) -> Object {
    Object::Real(value)
}

fn numbers(values: &[f32]) -> Object {
    Object::Array(values.iter().map(|&v| Object::Real(v)).collect())
}

fn dict(entries: &[(&str, Object)]) -> Dictionary {
    let mut out = Dictionary::empty();
    for (key, value) in entries {
        out.insert(*key, value.clone());
    }
    out
}

fn stream(dict_entries: &[(&str, Object)], data: &[u8]) -> Object {
    Object::Stream(Arc::new(StreamObject {
        dict: dict(dict_entries),
        data: data.to_vec(),
    }))
}

fn page_with_resources(
    width: f32,
    height: f32,
    content: &[u8],
    resources: Dictionary,
) -> InMemoryDocument {
    let mut doc = InMemoryDocument::single_page(width, height, content.to_vec());
    doc.page_mut(1).unwrap().resources = Some(resources);
    doc
}

fn helvetica_resources() -> Dictionary {
    dict(&[(
        "Font",
        Object::Dictionary(dict(&[(
            "F1",
            Object::Dictionary(dict(&[
                ("Type", name("Font")),
                ("Subtype", name("Type1")),
                ("BaseFont", name("Helvetica")),
            ])),
        )])),
    )])
}

fn rgba_at(surface: &Surface, x: usize, y: usize) -> [u8; 4] {
    crate::raster::composite::unpremultiply(surface.pixel(x, y))
}

fn alpha_sum(surface: &Surface) -> u64 {
    let mut sum = 0u64;
    for y in 0..surface.height() {
        for x in 0..surface.width() {
            sum += surface.pixel(x, y)[3] as u64;
        }
    }
    sum
}

#[test]
fn graphics_state_stack_returns_to_entry_depth() {
    // unbalanced saves and an over-popped restore both normalize
    let page = render_raw_content(b"Q q q q 1 0 0 rg Q", 100.0, 100.0, &RenderParams::default())
        .unwrap();

    assert!(page.warnings.is_empty());
}

#[test]
fn painting_operators_clear_the_current_path() {
    let surface = Surface::new(50, 50, SurfaceFormat::Argb32Premul);
    let resources = crate::resources::Resources::from_dict(None, &NullResolver);
    let mut renderer = Renderer::new(
        &NullResolver,
        surface,
        resources,
        Matrix::identity(),
        &RenderParams::default(),
    );

    for op in [
        Operator::Stroke,
        Operator::CloseStroke,
        Operator::Fill,
        Operator::FillEvenOdd,
        Operator::FillStroke,
        Operator::FillStrokeEvenOdd,
        Operator::CloseFillStroke,
        Operator::CloseFillStrokeEvenOdd,
        Operator::EndPath,
    ] {
        renderer
            .execute(Operator::Rect {
                x: 5.0,
                y: 5.0,
                width: 10.0,
                height: 10.0,
            })
            .unwrap();
        assert!(!renderer.current_path.is_empty());

        renderer.execute(op).unwrap();
        assert!(renderer.current_path.is_empty());
    }
}

#[test]
fn bt_resets_both_text_matrices() {
    let surface = Surface::new(10, 10, SurfaceFormat::Argb32Premul);
    let resources = crate::resources::Resources::from_dict(None, &NullResolver);
    let mut renderer = Renderer::new(
        &NullResolver,
        surface,
        resources,
        Matrix::identity(),
        &RenderParams::default(),
    );

    renderer
        .execute(Operator::SetTextMatrix(Matrix::translation(5.0, 9.0)))
        .unwrap();
    renderer
        .execute(Operator::MoveText { tx: 1.0, ty: 2.0 })
        .unwrap();
    renderer.execute(Operator::BeginText).unwrap();

    assert_eq!(renderer.graphics_state.text.text_matrix, Matrix::identity());
    assert_eq!(
        renderer.graphics_state.text.text_line_matrix,
        Matrix::identity()
    );
}

#[test]
fn red_rectangle_fills_the_lower_left_corner() {
    // scenario: a 100x50 red region at the PDF origin on a white page
    let content = b"q 1 0 0 RG 1 0 0 rg 0 0 m 100 0 l 100 50 l 0 50 l h f Q";

    let params = RenderParams {
        background: Some([1.0, 1.0, 1.0, 1.0]),
        ..RenderParams::default()
    };

    let page = render_raw_content(content, 612.0, 792.0, &params).unwrap();

    // PDF origin is the bottom-left; the device origin is the top-left
    for &(x, y) in &[(5, 790), (50, 770), (99, 743)] {
        assert_eq!(rgba_at(&page.surface, x, y), [255, 0, 0, 255], "at ({x}, {y})");
    }

    // outside the rectangle stays white
    assert_eq!(rgba_at(&page.surface, 150, 770), [255, 255, 255, 255]);
    assert_eq!(rgba_at(&page.surface, 50, 700), [255, 255, 255, 255]);
}

#[test]
fn even_odd_ring_keeps_the_hole_background_colored() {
    let content = b"1 0 0 rg 10 10 60 60 re 30 30 20 20 re f*";

    let params = RenderParams {
        background: Some([1.0, 1.0, 1.0, 1.0]),
        ..RenderParams::default()
    };

    let page = render_raw_content(content, 100.0, 100.0, &params).unwrap();

    // in the ring (device y = 100 - pdf y)
    assert_eq!(rgba_at(&page.surface, 15, 50), [255, 0, 0, 255]);
    assert_eq!(rgba_at(&page.surface, 50, 85), [255, 0, 0, 255]);

    // the inner square shows the background
    assert_eq!(rgba_at(&page.surface, 40, 60), [255, 255, 255, 255]);
}

#[test]
fn two_line_hello_places_glyphs_one_leading_apart() {
    let content = b"BT /F1 12 Tf 14 TL 100 700 Td (Hello) Tj T* (World) Tj ET";

    let doc = page_with_resources(612.0, 792.0, content, helvetica_resources());
    let page = render_page(&doc, 1, &RenderParams::default()).unwrap();

    // box glyphs sit on the baseline: Hello at y=700, World at y=686
    let line_one_y = 792 - 700 - 3;
    let line_two_y = 792 - 686 - 3;

    assert!(page.surface.pixel(102, line_one_y)[3] > 0, "no ink on line one");
    assert!(page.surface.pixel(102, line_two_y)[3] > 0, "no ink on line two");

    // the gap between baselines is exactly the leading
    assert_eq!(line_two_y - line_one_y, 14);

    // nothing renders left of the text origin
    assert_eq!(page.surface.pixel(50, line_one_y)[3], 0);
}

#[test]
fn tj_adjustments_move_subsequent_glyphs() {
    // -1000 units at 12pt shifts the next glyph 12pt right
    let adjusted = b"BT /F1 12 Tf 10 50 Td [(A) -1000 (B)] TJ ET";
    let plain = b"BT /F1 12 Tf 10 50 Td (AB) Tj ET";

    let doc = page_with_resources(200.0, 100.0, adjusted, helvetica_resources());
    let with_adjust = render_page(&doc, 1, &RenderParams::default()).unwrap();

    let doc = page_with_resources(200.0, 100.0, plain, helvetica_resources());
    let without = render_page(&doc, 1, &RenderParams::default()).unwrap();

    // in the plain run, B starts at 10 + 6pt; with the adjustment it
    // starts 12pt later
    let y = 100 - 50 - 3;
    let b_start_plain = 10.0 + 6.0 + 0.08 * 12.0;
    let b_start_adjusted = b_start_plain + 12.0;

    assert!(without.surface.pixel(b_start_plain as usize + 1, y)[3] > 0);
    assert_eq!(with_adjust.surface.pixel(b_start_plain as usize + 1, y)[3], 0);
    assert!(with_adjust.surface.pixel(b_start_adjusted as usize + 1, y)[3] > 0);
}

#[test]
fn inline_cmyk_image_paints_cyan() {
    // 1x1 DeviceCMYK sample C=1: placed over a 20pt square
    let content = b"q 20 0 0 20 10 10 cm BI /W 1 /H 1 /CS /CMYK /BPC 8 ID \xff\x00\x00\x00 EI Q";

    let page = render_raw_content(content, 100.0, 100.0, &RenderParams::default()).unwrap();

    let [r, g, b, a] = rgba_at(&page.surface, 20, 80);
    assert_eq!(a, 255);
    assert_eq!(r, 0);
    assert!(g as f32 / 255.0 >= 0.78, "g = {}", g);
    assert!(b as f32 / 255.0 >= 0.78, "b = {}", b);
}

#[test]
fn indexed_image_xobject_renders_its_palette() {
    let image = stream(
        &[
            ("Type", name("XObject")),
            ("Subtype", name("Image")),
            ("Width", int(2)),
            ("Height", int(2)),
            ("BitsPerComponent", int(8)),
            (
                "ColorSpace",
                Object::Array(vec![
                    name("Indexed"),
                    name("DeviceRGB"),
                    int(1),
                    Object::String(vec![0, 0, 0, 0, 255, 0]),
                ]),
            ),
        ],
        &[0, 1, 1, 0],
    );

    let resources = dict(&[(
        "XObject",
        Object::Dictionary(dict(&[("Im0", image)])),
    )]);

    let content = b"q 2 0 0 2 0 0 cm /Im0 Do Q";
    let doc = page_with_resources(2.0, 2.0, content, resources);
    let page = render_page(&doc, 1, &RenderParams::default()).unwrap();

    assert_eq!(rgba_at(&page.surface, 0, 0), [0, 0, 0, 255]);
    assert_eq!(rgba_at(&page.surface, 1, 0), [0, 255, 0, 255]);
    assert_eq!(rgba_at(&page.surface, 0, 1), [0, 255, 0, 255]);
    assert_eq!(rgba_at(&page.surface, 1, 1), [0, 0, 0, 255]);
}

#[test]
fn clip_confines_subsequent_painting() {
    let content = b"0 0 50 100 re W n 1 0 0 rg 0 0 100 100 re f";

    let page = render_raw_content(content, 100.0, 100.0, &RenderParams::default()).unwrap();

    assert_eq!(rgba_at(&page.surface, 25, 50), [255, 0, 0, 255]);
    assert_eq!(page.surface.pixel(75, 50)[3], 0);
}

#[test]
fn axial_shading_sweeps_red_to_blue() {
    let resources = dict(&[(
        "Shading",
        Object::Dictionary(dict(&[(
            "Sh0",
            Object::Dictionary(dict(&[
                ("ShadingType", int(2)),
                ("ColorSpace", name("DeviceRGB")),
                ("Coords", numbers(&[0.0, 0.0, 100.0, 0.0])),
                (
                    "Function",
                    Object::Dictionary(dict(&[
                        ("FunctionType", int(2)),
                        ("C0", numbers(&[1.0, 0.0, 0.0])),
                        ("C1", numbers(&[0.0, 0.0, 1.0])),
                        ("N", real(1.0)),
                    ])),
                ),
                ("Extend", Object::Array(vec![Object::True, Object::True])),
            ])),
        )])),
    )]);

    let doc = page_with_resources(100.0, 100.0, b"/Sh0 sh", resources);
    let page = render_page(&doc, 1, &RenderParams::default()).unwrap();

    let left = rgba_at(&page.surface, 5, 50);
    let right = rgba_at(&page.surface, 95, 50);
    let middle = rgba_at(&page.surface, 50, 50);

    assert!(left[0] > 220 && left[2] < 40, "left = {:?}", left);
    assert!(right[2] > 220 && right[0] < 40, "right = {:?}", right);
    assert!(
        (middle[0] as i32 - middle[2] as i32).abs() < 30,
        "middle = {:?}",
        middle
    );
}

#[test]
fn form_xobject_draws_through_its_matrix_and_bbox() {
    let form = stream(
        &[
            ("Type", name("XObject")),
            ("Subtype", name("Form")),
            ("BBox", numbers(&[0.0, 0.0, 10.0, 10.0])),
        ],
        b"1 0 0 rg 0 0 20 20 re f",
    );

    let resources = dict(&[(
        "XObject",
        Object::Dictionary(dict(&[("Fm0", form)])),
    )]);

    // the form's 20x20 fill is clipped to its 10x10 bbox, scaled x4
    let content = b"q 4 0 0 4 10 10 cm /Fm0 Do Q";
    let doc = page_with_resources(100.0, 100.0, content, resources);
    let page = render_page(&doc, 1, &RenderParams::default()).unwrap();

    // inside bbox: pdf (20, 20) -> device (20, 80)
    assert_eq!(rgba_at(&page.surface, 20, 80), [255, 0, 0, 255]);

    // outside bbox but inside the fill: pdf (70, 20) stays empty
    assert_eq!(page.surface.pixel(70, 80)[3], 0);
}

#[test]
fn recursive_forms_hit_the_depth_bound() {
    let reference = crate::objects::Reference {
        object_number: 7,
        generation: 0,
    };

    let form = StreamObject {
        dict: dict(&[
            ("Type", name("XObject")),
            ("Subtype", name("Form")),
            ("BBox", numbers(&[0.0, 0.0, 100.0, 100.0])),
            (
                "Resources",
                Object::Dictionary(dict(&[(
                    "XObject",
                    Object::Dictionary(dict(&[("Fm0", Object::Reference(reference))])),
                )])),
            ),
        ]),
        data: b"/Fm0 Do".to_vec(),
    };

    let resources = dict(&[(
        "XObject",
        Object::Dictionary(dict(&[("Fm0", Object::Reference(reference))])),
    )]);

    let mut doc = page_with_resources(100.0, 100.0, b"/Fm0 Do", resources);
    doc.insert_object(reference, Object::Stream(Arc::new(form)));

    // the cycle is detected and aborts the page
    let result = render_page(&doc, 1, &RenderParams::default());

    assert!(matches!(
        result,
        Err(RenderError::ResourceExhausted { .. })
    ));
}

#[test]
fn ext_g_state_applies_fill_alpha() {
    let resources = dict(&[(
        "ExtGState",
        Object::Dictionary(dict(&[(
            "G0",
            Object::Dictionary(dict(&[("ca", real(0.5))])),
        )])),
    )]);

    let content = b"/G0 gs 1 0 0 rg 0 0 100 100 re f";
    let doc = page_with_resources(100.0, 100.0, content, resources);
    let page = render_page(&doc, 1, &RenderParams::default()).unwrap();

    let alpha = page.surface.pixel(50, 50)[3];
    assert!((alpha as i32 - 128).abs() <= 1, "alpha = {}", alpha);
}

#[test]
fn hidden_annotations_contribute_no_pixels() {
    let annotation = dict(&[
        ("Subtype", name("Text")),
        ("Rect", numbers(&[10.0, 10.0, 30.0, 30.0])),
        ("F", int(2)),
    ]);

    let mut doc = InMemoryDocument::single_page(100.0, 100.0, Vec::new());
    doc.page_mut(1).unwrap().annotations.push(annotation);

    let page = render_page(&doc, 1, &RenderParams::default()).unwrap();
    assert_eq!(alpha_sum(&page.surface), 0);

    // the same annotation without the hidden flag paints its icon
    let annotation = dict(&[
        ("Subtype", name("Text")),
        ("Rect", numbers(&[10.0, 10.0, 30.0, 30.0])),
    ]);

    let mut doc = InMemoryDocument::single_page(100.0, 100.0, Vec::new());
    doc.page_mut(1).unwrap().annotations.push(annotation);

    let page = render_page(&doc, 1, &RenderParams::default()).unwrap();
    assert!(alpha_sum(&page.surface) > 0);
}

#[test]
fn widget_appearance_streams_map_onto_the_rect() {
    let appearance = stream(
        &[
            ("Subtype", name("Form")),
            ("BBox", numbers(&[0.0, 0.0, 1.0, 1.0])),
        ],
        b"0 0 1 rg 0 0 1 1 re f",
    );

    let annotation = dict(&[
        ("Subtype", name("Widget")),
        ("Rect", numbers(&[20.0, 20.0, 60.0, 40.0])),
        ("AP", Object::Dictionary(dict(&[("N", appearance)]))),
    ]);

    let mut doc = InMemoryDocument::single_page(100.0, 100.0, Vec::new());
    doc.page_mut(1).unwrap().annotations.push(annotation);

    let page = render_page(&doc, 1, &RenderParams::default()).unwrap();

    // the unit-square appearance stretches over the 40x20 rect
    assert_eq!(rgba_at(&page.surface, 40, 70), [0, 0, 255, 255]);
    assert_eq!(page.surface.pixel(70, 70)[3], 0);
}

#[test]
fn cancellation_aborts_between_operators() {
    let cancel = crate::document::CancelToken::new();
    cancel.cancel();

    let params = RenderParams {
        cancel: Some(cancel),
        ..RenderParams::default()
    };

    let result = render_raw_content(b"1 0 0 rg 0 0 10 10 re f", 100.0, 100.0, &params);

    assert!(matches!(result, Err(RenderError::Cancelled)));
}

#[test]
fn page_rotation_swaps_surface_dimensions() {
    let mut doc = InMemoryDocument::single_page(100.0, 200.0, b"1 0 0 rg 0 0 10 10 re f".to_vec());
    doc.page_mut(1).unwrap().rotation = 90;

    let page = render_page(&doc, 1, &RenderParams::default()).unwrap();

    assert_eq!(page.surface.width(), 200);
    assert_eq!(page.surface.height(), 100);
    assert!(alpha_sum(&page.surface) > 0);
}

#[test]
fn dpi_scales_the_output_surface() {
    let params = RenderParams {
        dpi: 144.0,
        ..RenderParams::default()
    };

    let page = render_raw_content(b"1 0 0 rg 0 0 50 50 re f", 100.0, 100.0, &params).unwrap();

    assert_eq!(page.surface.width(), 200);
    assert_eq!(page.surface.height(), 200);

    // the 50pt square covers 100 device pixels
    assert_eq!(rgba_at(&page.surface, 99, 101), [255, 0, 0, 255]);
    assert_eq!(page.surface.pixel(101, 99)[3], 0);
}

#[test]
fn unknown_resources_are_skipped_with_warnings() {
    let page = render_raw_content(
        b"/NoSuchGs gs /NoSuchXObject Do BT /NoSuchFont 10 Tf (x) Tj ET 1 0 0 rg 0 0 10 10 re f",
        100.0,
        100.0,
        &RenderParams::default(),
    )
    .unwrap();

    // rendering finished and the final rect still painted
    assert!(page.warnings.len() >= 3);
    assert!(page.surface.pixel(5, 95)[3] > 0);
}

#[test]
fn tiling_pattern_repeats_its_cell() {
    let pattern = stream(
        &[
            ("Type", name("Pattern")),
            ("PatternType", int(1)),
            ("PaintType", int(1)),
            ("TilingType", int(1)),
            ("BBox", numbers(&[0.0, 0.0, 10.0, 10.0])),
            ("XStep", real(10.0)),
            ("YStep", real(10.0)),
            ("Resources", Object::Dictionary(Dictionary::empty())),
        ],
        b"1 0 0 rg 0 0 5 10 re f",
    );

    let resources = dict(&[(
        "Pattern",
        Object::Dictionary(dict(&[("P0", pattern)])),
    )]);

    let content = b"/Pattern cs /P0 scn 0 0 100 100 re f";
    let doc = page_with_resources(100.0, 100.0, content, resources);
    let page = render_page(&doc, 1, &RenderParams::default()).unwrap();

    // left half of each 10pt cell is red, right half is empty
    assert_eq!(rgba_at(&page.surface, 2, 50), [255, 0, 0, 255]);
    assert_eq!(page.surface.pixel(7, 50)[3], 0);
    assert_eq!(rgba_at(&page.surface, 12, 50), [255, 0, 0, 255]);
    assert_eq!(page.surface.pixel(17, 50)[3], 0);
}

#[test]
fn render_pages_renders_concurrently() {
    let mut doc = InMemoryDocument::new();
    for _ in 0..6 {
        let page = InMemoryDocument::single_page(50.0, 50.0, b"1 0 0 rg 0 0 50 50 re f".to_vec())
            .page(1)
            .unwrap();
        doc.push_page(page);
    }

    let results = crate::render_pages(
        &doc,
        &[1, 2, 3, 4, 5, 6],
        &RenderParams::default(),
        0,
    )
    .unwrap();

    assert_eq!(results.len(), 6);
    for result in results {
        let page = result.unwrap();
        assert_eq!(rgba_at(&page.surface, 25, 25), [255, 0, 0, 255]);
    }
}
