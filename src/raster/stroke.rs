use crate::pdf_enum;

pdf_enum!(
    int
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum LineCap {
        /// The stroke ends squarely at the endpoint
        Butt = 0,

        /// A semicircle of the line width is drawn around the endpoint
        Round = 1,

        /// The stroke continues half the line width past the endpoint
        Square = 2,
    }
);

pdf_enum!(
    int
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum LineJoin {
        /// Outer edges extended until they meet, subject to the miter limit
        Miter = 0,

        Round = 1,

        /// The corner is cut off with a single straight segment
        Bevel = 2,
    }
);

/// Stroke parameters in device units. The caller is responsible for
/// multiplying the user-space line width by the CTM scale and substituting
/// one device pixel for zero-width strokes before building this.
#[derive(Debug, Clone)]
pub struct StrokeStyle {
    pub width: f32,
    pub cap: LineCap,
    pub join: LineJoin,
    pub miter_limit: f32,
    /// A cycle of on/off lengths measured along the path; empty means solid.
    pub dash_array: Vec<f32>,
    pub dash_phase: f32,
}

/// Segments used to approximate round caps and joins.
const ARC_STEPS: usize = 16;

/// Expand flattened polylines into a set of polygons whose nonzero-rule
/// union is the stroked outline.
///
/// Each segment contributes its own quad and each vertex a join (or cap)
/// polygon; overlaps are harmless because the caller fills the result with
/// the nonzero winding rule.
pub fn stroke_polylines(
    polylines: &[(Vec<(f32, f32)>, bool)],
    style: &StrokeStyle,
) -> Vec<Vec<(f32, f32)>> {
    let mut out = Vec::new();
    let half = (style.width / 2.0).max(0.0);

    if half == 0.0 {
        return out;
    }

    for (points, closed) in polylines {
        for piece in apply_dash(points, *closed, &style.dash_array, style.dash_phase) {
            stroke_one(&piece.0, piece.1, half, style, &mut out);
        }
    }

    out
}

fn stroke_one(
    points: &[(f32, f32)],
    closed: bool,
    half: f32,
    style: &StrokeStyle,
    out: &mut Vec<Vec<(f32, f32)>>,
) {
    let points = dedup(points);

    if points.len() < 2 {
        // a degenerate subpath still draws its cap when the cap has area
        if let Some(&p) = points.first() {
            match style.cap {
                LineCap::Butt => {}
                LineCap::Round => out.push(circle(p, half)),
                LineCap::Square => out.push(vec![
                    (p.0 - half, p.1 - half),
                    (p.0 + half, p.1 - half),
                    (p.0 + half, p.1 + half),
                    (p.0 - half, p.1 + half),
                ]),
            }
        }
        return;
    }

    // one quad per segment
    for window in points.windows(2) {
        let (p, q) = (window[0], window[1]);
        let n = normal(p, q, half);

        out.push(vec![
            (p.0 + n.0, p.1 + n.1),
            (q.0 + n.0, q.1 + n.1),
            (q.0 - n.0, q.1 - n.1),
            (p.0 - n.0, p.1 - n.1),
        ]);
    }

    // joins at interior vertices
    for i in 1..points.len() - 1 {
        join_at(points[i - 1], points[i], points[i + 1], half, style, out);
    }

    if closed {
        let last = points.len() - 1;
        let (p, q) = (points[last], points[0]);

        if p == q {
            join_at(points[last - 1], points[0], points[1], half, style, out);
        } else {
            // the closing segment and the joins at both of its ends
            let n = normal(p, q, half);
            out.push(vec![
                (p.0 + n.0, p.1 + n.1),
                (q.0 + n.0, q.1 + n.1),
                (q.0 - n.0, q.1 - n.1),
                (p.0 - n.0, p.1 - n.1),
            ]);
            join_at(points[last - 1], points[last], points[0], half, style, out);
            join_at(points[last], points[0], points[1], half, style, out);
        }
    } else {
        cap_at(points[1], points[0], half, style.cap, out);
        cap_at(points[points.len() - 2], points[points.len() - 1], half, style.cap, out);
    }
}

fn join_at(
    prev: (f32, f32),
    vertex: (f32, f32),
    next: (f32, f32),
    half: f32,
    style: &StrokeStyle,
    out: &mut Vec<Vec<(f32, f32)>>,
) {
    let d1 = unit(prev, vertex);
    let d2 = unit(vertex, next);

    let cross = d1.0 * d2.1 - d1.1 * d2.0;

    if cross.abs() < 1e-6 {
        return;
    }

    if style.join == LineJoin::Round {
        out.push(circle(vertex, half));
        return;
    }

    // the gap opens on the side the path turns away from
    let sign = if cross < 0.0 { 1.0 } else { -1.0 };
    let n1 = (-d1.1 * half * sign, d1.0 * half * sign);
    let n2 = (-d2.1 * half * sign, d2.0 * half * sign);

    let a = (vertex.0 + n1.0, vertex.1 + n1.1);
    let b = (vertex.0 + n2.0, vertex.1 + n2.1);

    if style.join == LineJoin::Miter {
        if let Some(m) = line_intersection(a, d1, b, d2) {
            let miter_length = ((m.0 - vertex.0).hypot(m.1 - vertex.1)) / half;

            if miter_length <= style.miter_limit {
                out.push(vec![vertex, a, m, b]);
                return;
            }
        }
    }

    out.push(vec![vertex, a, b]);
}

fn cap_at(
    from: (f32, f32),
    end: (f32, f32),
    half: f32,
    cap: LineCap,
    out: &mut Vec<Vec<(f32, f32)>>,
) {
    match cap {
        LineCap::Butt => {}
        LineCap::Round => out.push(circle(end, half)),
        LineCap::Square => {
            let d = unit(from, end);
            let n = (-d.1 * half, d.0 * half);
            let ext = (end.0 + d.0 * half, end.1 + d.1 * half);

            out.push(vec![
                (end.0 + n.0, end.1 + n.1),
                (ext.0 + n.0, ext.1 + n.1),
                (ext.0 - n.0, ext.1 - n.1),
                (end.0 - n.0, end.1 - n.1),
            ]);
        }
    }
}

/// Split a polyline into its "on" pieces under the dash cycle.
///
/// Lengths are measured along the flattened path starting `phase` into the
/// cycle. Returns `(points, closed)` pieces; a solid line passes through
/// untouched.
fn apply_dash(
    points: &[(f32, f32)],
    closed: bool,
    dash_array: &[f32],
    phase: f32,
) -> Vec<(Vec<(f32, f32)>, bool)> {
    let total: f32 = dash_array.iter().sum();

    if dash_array.is_empty() || total <= 0.0 || dash_array.iter().any(|&d| d < 0.0) {
        return vec![(points.to_vec(), closed)];
    }

    let mut points = points.to_vec();
    if closed {
        if let Some(&first) = points.first() {
            points.push(first);
        }
    }

    let mut index = 0;
    let mut remaining = dash_array[0];
    let mut phase = phase.rem_euclid(total.max(f32::MIN_POSITIVE));

    while phase > 0.0 {
        if phase >= remaining {
            phase -= remaining;
            index = (index + 1) % dash_array.len();
            remaining = dash_array[index];
        } else {
            remaining -= phase;
            phase = 0.0;
        }
    }

    let mut on = index % 2 == 0;
    let mut pieces = Vec::new();
    let mut current: Vec<(f32, f32)> = Vec::new();

    if on {
        current.push(points[0]);
    }

    for window in points.windows(2) {
        let (p, q) = (window[0], window[1]);
        let mut segment_left = (q.0 - p.0).hypot(q.1 - p.1);
        let mut cursor = p;

        while segment_left > remaining {
            let t = remaining / segment_left.max(f32::MIN_POSITIVE);
            let split = (
                cursor.0 + (q.0 - cursor.0) * t,
                cursor.1 + (q.1 - cursor.1) * t,
            );

            if on {
                current.push(split);
                if current.len() >= 2 {
                    pieces.push((std::mem::take(&mut current), false));
                } else {
                    current.clear();
                }
            } else {
                current.clear();
                current.push(split);
            }

            segment_left -= remaining;
            cursor = split;
            index = (index + 1) % dash_array.len();
            remaining = dash_array[index];
            on = !on;
        }

        remaining -= segment_left;

        if on {
            current.push(q);
        }
    }

    if on && current.len() >= 2 {
        pieces.push((current, false));
    }

    pieces
}

fn dedup(points: &[(f32, f32)]) -> Vec<(f32, f32)> {
    let mut out: Vec<(f32, f32)> = Vec::with_capacity(points.len());

    for &p in points {
        if out.last() != Some(&p) {
            out.push(p);
        }
    }

    out
}

fn unit(from: (f32, f32), to: (f32, f32)) -> (f32, f32) {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let len = dx.hypot(dy).max(f32::MIN_POSITIVE);

    (dx / len, dy / len)
}

fn normal(from: (f32, f32), to: (f32, f32), half: f32) -> (f32, f32) {
    let d = unit(from, to);

    (-d.1 * half, d.0 * half)
}

fn circle(center: (f32, f32), radius: f32) -> Vec<(f32, f32)> {
    (0..ARC_STEPS)
        .map(|i| {
            let theta = i as f32 / ARC_STEPS as f32 * std::f32::consts::TAU;
            (
                center.0 + radius * theta.cos(),
                center.1 + radius * theta.sin(),
            )
        })
        .collect()
}

fn line_intersection(
    p: (f32, f32),
    d: (f32, f32),
    q: (f32, f32),
    e: (f32, f32),
) -> Option<(f32, f32)> {
    let det = d.0 * e.1 - d.1 * e.0;

    if det.abs() < 1e-9 {
        return None;
    }

    let t = ((q.0 - p.0) * e.1 - (q.1 - p.1) * e.0) / det;

    Some((p.0 + d.0 * t, p.1 + d.1 * t))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::raster::rasterizer::{fill_polygons, FillRule};

    fn solid(width: f32) -> StrokeStyle {
        StrokeStyle {
            width,
            cap: LineCap::Butt,
            join: LineJoin::Miter,
            miter_limit: 10.0,
            dash_array: Vec::new(),
            dash_phase: 0.0,
        }
    }

    #[test]
    fn horizontal_line_strokes_to_its_width() {
        let polys = stroke_polylines(
            &[(vec![(2.0, 5.0), (10.0, 5.0)], false)],
            &solid(4.0),
        );
        let mask = fill_polygons(&polys, FillRule::NonZero, 16, 16).unwrap();

        assert_eq!(mask.coverage(6, 4), 255);
        assert_eq!(mask.coverage(6, 6), 255);
        assert_eq!(mask.coverage(6, 1), 0);
        // butt cap: nothing before the start point
        assert_eq!(mask.coverage(0, 5), 0);
    }

    #[test]
    fn square_cap_extends_past_endpoint() {
        let mut style = solid(4.0);
        style.cap = LineCap::Square;

        let polys = stroke_polylines(&[(vec![(4.0, 5.0), (10.0, 5.0)], false)], &style);
        let mask = fill_polygons(&polys, FillRule::NonZero, 16, 16).unwrap();

        assert_eq!(mask.coverage(2, 5), 255);
        assert_eq!(mask.coverage(11, 5), 255);
    }

    #[test]
    fn dash_splits_into_on_pieces() {
        let pieces = apply_dash(&[(0.0, 0.0), (10.0, 0.0)], false, &[2.0, 2.0], 0.0);

        // on segments at [0,2), [4,6), [8,10)
        assert_eq!(pieces.len(), 3);
        assert!((pieces[0].0[0].0 - 0.0).abs() < 1e-5);
        assert!((pieces[0].0[1].0 - 2.0).abs() < 1e-5);
        assert!((pieces[1].0[0].0 - 4.0).abs() < 1e-5);
    }

    #[test]
    fn dash_phase_shifts_the_cycle() {
        let pieces = apply_dash(&[(0.0, 0.0), (10.0, 0.0)], false, &[2.0, 2.0], 1.0);

        // first on piece is the remaining [0,1)
        assert!((pieces[0].0[1].0 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_dash_array_is_solid() {
        let pieces = apply_dash(&[(0.0, 0.0), (10.0, 0.0)], false, &[], 0.0);

        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].0.len(), 2);
    }

    #[test]
    fn miter_limit_falls_back_to_bevel() {
        // a hairpin turn would miter out to a long spike
        let mut style = solid(2.0);
        style.miter_limit = 1.5;

        let polys = stroke_polylines(
            &[(vec![(0.0, 0.0), (10.0, 0.1), (0.0, 0.2)], false)],
            &style,
        );

        // no polygon vertex should extend far past the turn vertex
        let max_x = polys
            .iter()
            .flatten()
            .map(|p| p.0)
            .fold(f32::MIN, f32::max);
        assert!(max_x < 14.0, "miter spike reached {}", max_x);
    }
}
