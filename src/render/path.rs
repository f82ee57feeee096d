use crate::data_structures::Matrix;

/// Bezier circle constant: the control-point offset that makes four cubics
/// approximate a circle.
pub const KAPPA: f32 = 0.5522847498;

/// Maximum recursion depth when flattening curves.
const MAX_FLATTEN_DEPTH: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    MoveTo(Point),
    LineTo(Point),
    CurveTo { c1: Point, c2: Point, to: Point },
    Rect { x: f32, y: f32, width: f32, height: f32 },
}

/// One subpath: a leading `MoveTo` (or a standalone `Rect`, which is
/// closed by construction) followed by line and curve segments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subpath {
    pub segments: Vec<Segment>,
    pub closed: bool,
}

/// The current path being built between path-construction and
/// path-painting operators. Coordinates stay in user space; the transform
/// to device space happens at flatten time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    pub subpaths: Vec<Subpath>,
    current_point: Option<Point>,
    subpath_start: Option<Point>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.subpaths.is_empty()
    }

    pub fn current_point(&self) -> Option<Point> {
        self.current_point
    }

    pub fn move_to(&mut self, x: f32, y: f32) {
        let point = Point::new(x, y);

        self.subpaths.push(Subpath {
            segments: vec![Segment::MoveTo(point)],
            closed: false,
        });

        self.current_point = Some(point);
        self.subpath_start = Some(point);
    }

    /// A `l` with no current point is ignored; the stream is malformed but
    /// recoverable. A segment following a closed subpath starts a fresh
    /// subpath at the closing point.
    pub fn line_to(&mut self, x: f32, y: f32) {
        if !self.reopen() {
            return;
        }

        let point = Point::new(x, y);
        self.subpaths
            .last_mut()
            .unwrap()
            .segments
            .push(Segment::LineTo(point));
        self.current_point = Some(point);
    }

    pub fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x3: f32, y3: f32) {
        if !self.reopen() {
            return;
        }

        let to = Point::new(x3, y3);
        self.subpaths
            .last_mut()
            .unwrap()
            .segments
            .push(Segment::CurveTo {
                c1: Point::new(x1, y1),
                c2: Point::new(x2, y2),
                to,
            });
        self.current_point = Some(to);
    }

    /// `v`: the current point doubles as the first control point.
    pub fn curve_to_initial(&mut self, x2: f32, y2: f32, x3: f32, y3: f32) {
        if let Some(current) = self.current_point {
            self.curve_to(current.x, current.y, x2, y2, x3, y3);
        }
    }

    /// `y`: the endpoint doubles as the second control point.
    pub fn curve_to_final(&mut self, x1: f32, y1: f32, x3: f32, y3: f32) {
        self.curve_to(x1, y1, x3, y3, x3, y3);
    }

    /// `re`: a complete closed rectangular subpath. The current point
    /// moves to the rectangle's origin.
    pub fn rect(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.subpaths.push(Subpath {
            segments: vec![Segment::Rect {
                x,
                y,
                width,
                height,
            }],
            closed: true,
        });

        self.current_point = Some(Point::new(x, y));
        self.subpath_start = Some(Point::new(x, y));
    }

    pub fn close(&mut self) {
        if let Some(subpath) = self.subpaths.last_mut() {
            subpath.closed = true;
        }

        self.current_point = self.subpath_start;
    }

    /// Ensure the last subpath accepts segments. Returns false when there
    /// is no current point to continue from.
    fn reopen(&mut self) -> bool {
        match self.subpaths.last() {
            Some(subpath) if !subpath.closed => true,
            _ => match self.current_point {
                Some(point) => {
                    self.move_to(point.x, point.y);
                    true
                }
                None => false,
            },
        }
    }

    /// A full ellipse as four cubics.
    pub fn ellipse(&mut self, cx: f32, cy: f32, rx: f32, ry: f32) {
        let kx = rx * KAPPA;
        let ky = ry * KAPPA;

        self.move_to(cx + rx, cy);
        self.curve_to(cx + rx, cy + ky, cx + kx, cy + ry, cx, cy + ry);
        self.curve_to(cx - kx, cy + ry, cx - rx, cy + ky, cx - rx, cy);
        self.curve_to(cx - rx, cy - ky, cx - kx, cy - ry, cx, cy - ry);
        self.curve_to(cx + kx, cy - ry, cx + rx, cy - ky, cx + rx, cy);
        self.close();
    }

    /// A rectangle with rounded corners, used by synthesized annotation
    /// appearances.
    pub fn rounded_rect(&mut self, x: f32, y: f32, width: f32, height: f32, radius: f32) {
        let r = radius.min(width / 2.0).min(height / 2.0);
        let k = r * KAPPA;

        self.move_to(x + r, y);
        self.line_to(x + width - r, y);
        self.curve_to(x + width - r + k, y, x + width, y + r - k, x + width, y + r);
        self.line_to(x + width, y + height - r);
        self.curve_to(
            x + width,
            y + height - r + k,
            x + width - r + k,
            y + height,
            x + width - r,
            y + height,
        );
        self.line_to(x + r, y + height);
        self.curve_to(x + r - k, y + height, x, y + height - r + k, x, y + height - r);
        self.line_to(x, y + r);
        self.curve_to(x, y + r - k, x + r - k, y, x + r, y);
        self.close();
    }

    /// Flatten into device-space polylines: transform control points by
    /// `ctm`, subdivide curves to within `tolerance` device pixels, and
    /// expand rectangles. Returns one `(points, closed)` entry per
    /// subpath.
    pub fn flatten(&self, ctm: &Matrix, tolerance: f32) -> Vec<(Vec<(f32, f32)>, bool)> {
        let mut out = Vec::with_capacity(self.subpaths.len());

        for subpath in &self.subpaths {
            let mut points: Vec<(f32, f32)> = Vec::new();

            for segment in &subpath.segments {
                match segment {
                    Segment::MoveTo(p) => points.push(ctm.transform_point(p.x, p.y)),
                    Segment::LineTo(p) => points.push(ctm.transform_point(p.x, p.y)),
                    Segment::CurveTo { c1, c2, to } => {
                        let from = match points.last() {
                            Some(&p) => p,
                            None => continue,
                        };

                        flatten_cubic(
                            from,
                            ctm.transform_point(c1.x, c1.y),
                            ctm.transform_point(c2.x, c2.y),
                            ctm.transform_point(to.x, to.y),
                            tolerance,
                            0,
                            &mut points,
                        );
                    }
                    &Segment::Rect {
                        x,
                        y,
                        width,
                        height,
                    } => {
                        points.push(ctm.transform_point(x, y));
                        points.push(ctm.transform_point(x + width, y));
                        points.push(ctm.transform_point(x + width, y + height));
                        points.push(ctm.transform_point(x, y + height));
                    }
                }
            }

            if points.len() >= 2 {
                out.push((points, subpath.closed));
            }
        }

        out
    }
}

/// Recursive subdivision: a curve whose control points sit within the
/// tolerance of the chord is replaced by that chord.
fn flatten_cubic(
    p0: (f32, f32),
    p1: (f32, f32),
    p2: (f32, f32),
    p3: (f32, f32),
    tolerance: f32,
    depth: u32,
    out: &mut Vec<(f32, f32)>,
) {
    if depth >= MAX_FLATTEN_DEPTH || flatness_sq(p0, p1, p2, p3) <= tolerance * tolerance {
        out.push(p3);
        return;
    }

    // de Casteljau split at t = 0.5
    let mid = |a: (f32, f32), b: (f32, f32)| ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0);

    let p01 = mid(p0, p1);
    let p12 = mid(p1, p2);
    let p23 = mid(p2, p3);
    let p012 = mid(p01, p12);
    let p123 = mid(p12, p23);
    let p0123 = mid(p012, p123);

    flatten_cubic(p0, p01, p012, p0123, tolerance, depth + 1, out);
    flatten_cubic(p0123, p123, p23, p3, tolerance, depth + 1, out);
}

/// Squared max distance of the control points from the chord.
fn flatness_sq(p0: (f32, f32), p1: (f32, f32), p2: (f32, f32), p3: (f32, f32)) -> f32 {
    let dx = p3.0 - p0.0;
    let dy = p3.1 - p0.1;
    let len_sq = dx * dx + dy * dy;

    if len_sq < 1e-12 {
        let d1 = (p1.0 - p0.0).powi(2) + (p1.1 - p0.1).powi(2);
        let d2 = (p2.0 - p0.0).powi(2) + (p2.1 - p0.1).powi(2);

        return d1.max(d2);
    }

    let dist_sq = |p: (f32, f32)| {
        let cross = (p.0 - p0.0) * dy - (p.1 - p0.1) * dx;
        cross * cross / len_sq
    };

    dist_sq(p1).max(dist_sq(p2))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn painting_operators_see_an_empty_path_after_clear() {
        let mut path = Path::new();
        path.move_to(0.0, 0.0);
        path.line_to(10.0, 0.0);

        assert!(!path.is_empty());

        path = Path::new();
        assert!(path.is_empty());
    }

    #[test]
    fn rect_subpaths_are_closed() {
        let mut path = Path::new();
        path.rect(1.0, 2.0, 3.0, 4.0);

        assert!(path.subpaths[0].closed);
        assert_eq!(path.current_point(), Some(Point::new(1.0, 2.0)));
    }

    #[test]
    fn close_returns_to_the_subpath_start() {
        let mut path = Path::new();
        path.move_to(5.0, 5.0);
        path.line_to(10.0, 5.0);
        path.line_to(10.0, 10.0);
        path.close();

        assert_eq!(path.current_point(), Some(Point::new(5.0, 5.0)));
        assert!(path.subpaths[0].closed);
    }

    #[test]
    fn line_without_current_point_is_dropped() {
        let mut path = Path::new();
        path.line_to(3.0, 4.0);

        assert!(path.is_empty());
    }

    #[test]
    fn v_uses_the_current_point_as_first_control() {
        let mut path = Path::new();
        path.move_to(1.0, 1.0);
        path.curve_to_initial(5.0, 5.0, 9.0, 1.0);

        match &path.subpaths[0].segments[1] {
            Segment::CurveTo { c1, .. } => assert_eq!(*c1, Point::new(1.0, 1.0)),
            other => panic!("expected curve, found {:?}", other),
        }
    }

    #[test]
    fn flattened_curve_stays_within_tolerance() {
        let mut path = Path::new();
        path.move_to(0.0, 0.0);
        path.curve_to(0.0, 10.0, 10.0, 10.0, 10.0, 0.0);

        let flattened = path.flatten(&Matrix::identity(), 0.25);
        let (points, _) = &flattened[0];

        // enough segments that no chord deviates visibly
        assert!(points.len() > 4);

        // the curve's extreme y is 7.5 for these control points
        let max_y = points.iter().map(|p| p.1).fold(f32::MIN, f32::max);
        assert!((max_y - 7.5).abs() < 0.3, "max_y = {}", max_y);
    }

    #[test]
    fn flatten_applies_the_transform() {
        let mut path = Path::new();
        path.rect(0.0, 0.0, 1.0, 1.0);

        let flattened = path.flatten(&Matrix::scale(100.0, 50.0), 0.25);
        let (points, closed) = &flattened[0];

        assert!(*closed);
        assert_eq!(points[2], (100.0, 50.0));
    }

    #[test]
    fn ellipse_is_a_single_closed_subpath() {
        let mut path = Path::new();
        path.ellipse(0.0, 0.0, 10.0, 5.0);

        assert_eq!(path.subpaths.len(), 1);
        assert!(path.subpaths[0].closed);

        let flattened = path.flatten(&Matrix::identity(), 0.1);
        let (points, _) = &flattened[0];

        for &(x, y) in points {
            let d = (x / 10.0).powi(2) + (y / 5.0).powi(2);
            assert!((d - 1.0).abs() < 0.05, "point ({}, {}) off the ellipse", x, y);
        }
    }
}
