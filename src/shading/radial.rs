use crate::{
    error::RenderResult,
    objects::{assert_len, Dictionary, Object},
    resolve::Resolve,
};

use super::axial::extend_flags;

/// Type 3 (radial) shadings define a colour blend that varies between two
/// circles. Shadings of this type are commonly used to depict
/// three-dimensional spheres and cones.
#[derive(Debug, Clone)]
pub struct RadialShading {
    /// `[x0 y0 r0 x1 y1 r1]`: the centres and radii of the starting and
    /// ending circles. If one radius is 0 the corresponding circle is a
    /// point; if both are 0 nothing is painted
    start: Circle,
    end: Circle,

    /// Default value: [0.0 1.0].
    domain: [f32; 2],

    /// Default value: [false false].
    extend: [bool; 2],
}

#[derive(Debug, Clone, Copy)]
struct Circle {
    x: f32,
    y: f32,
    radius: f32,
}

impl Circle {
    fn from_arr(mut arr: Vec<Object>, resolver: &dyn Resolve) -> RenderResult<Self> {
        assert_len(&arr, 3)?;

        let radius = resolver.assert_number(arr.pop().unwrap())?;
        let y = resolver.assert_number(arr.pop().unwrap())?;
        let x = resolver.assert_number(arr.pop().unwrap())?;

        Ok(Self { x, y, radius })
    }
}

impl RadialShading {
    pub fn from_dict(dict: &Dictionary, resolver: &dyn Resolve) -> RenderResult<Self> {
        let mut coords = dict.expect_arr("Coords", resolver)?;
        assert_len(&coords, 6)?;

        let end = Circle::from_arr(coords.split_off(3), resolver)?;
        let start = Circle::from_arr(coords, resolver)?;

        let domain = match dict.get_number_arr("Domain", resolver)? {
            Some(d) if d.len() == 2 => [d[0], d[1]],
            _ => [0.0, 1.0],
        };

        let extend = extend_flags(dict, resolver)?;

        Ok(Self {
            start,
            end,
            domain,
            extend,
        })
    }

    /// Solve for the interpolation parameter at a point.
    ///
    /// A point lies on the blend circle `c(s) = c0 + s·(c1 − c0)` with
    /// radius `r(s) = r0 + s·(r1 − r0)`; the equation
    /// `|p − c(s)|² = r(s)²` is quadratic in s. The smallest solution with
    /// a non-negative radius wins, with the extend flags deciding whether
    /// values outside [0, 1] paint at all.
    pub fn param_at(&self, x: f32, y: f32) -> Option<f32> {
        if self.start.radius == 0.0 && self.end.radius == 0.0 {
            return None;
        }

        let cdx = self.end.x - self.start.x;
        let cdy = self.end.y - self.start.y;
        let dr = self.end.radius - self.start.radius;

        let px = x - self.start.x;
        let py = y - self.start.y;

        let a = cdx * cdx + cdy * cdy - dr * dr;
        let b = -2.0 * (px * cdx + py * cdy + self.start.radius * dr);
        let c = px * px + py * py - self.start.radius * self.start.radius;

        let mut roots = [f32::NAN; 2];
        let mut count = 0;

        if a.abs() < 1e-6 {
            if b.abs() > 1e-9 {
                roots[0] = -c / b;
                count = 1;
            }
        } else {
            let disc = b * b - 4.0 * a * c;

            if disc < 0.0 {
                return None;
            }

            let sqrt = disc.sqrt();
            roots[0] = (-b - sqrt) / (2.0 * a);
            roots[1] = (-b + sqrt) / (2.0 * a);
            count = 2;

            if roots[0] > roots[1] {
                roots.swap(0, 1);
            }
        }

        for &s in roots.iter().take(count) {
            if self.start.radius + s * dr < 0.0 {
                continue;
            }

            let clamped = if s < 0.0 {
                if !self.extend[0] {
                    continue;
                }
                0.0
            } else if s > 1.0 {
                if !self.extend[1] {
                    continue;
                }
                1.0
            } else {
                s
            };

            return Some(self.domain[0] + clamped * (self.domain[1] - self.domain[0]));
        }

        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn concentric() -> RadialShading {
        RadialShading {
            start: Circle {
                x: 0.0,
                y: 0.0,
                radius: 0.0,
            },
            end: Circle {
                x: 0.0,
                y: 0.0,
                radius: 10.0,
            },
            domain: [0.0, 1.0],
            extend: [false, false],
        }
    }

    #[test]
    fn concentric_circles_interpolate_by_distance() {
        let shading = concentric();

        let t = shading.param_at(5.0, 0.0).unwrap();
        assert!((t - 0.5).abs() < 1e-5);

        let t = shading.param_at(0.0, 10.0).unwrap();
        assert!((t - 1.0).abs() < 1e-5);
    }

    #[test]
    fn outside_the_outer_circle_needs_extend() {
        let mut shading = concentric();

        assert_eq!(shading.param_at(20.0, 0.0), None);

        shading.extend = [false, true];
        let t = shading.param_at(20.0, 0.0).unwrap();
        assert!((t - 1.0).abs() < 1e-5);
    }

    #[test]
    fn degenerate_circles_paint_nothing() {
        let shading = RadialShading {
            start: Circle {
                x: 0.0,
                y: 0.0,
                radius: 0.0,
            },
            end: Circle {
                x: 5.0,
                y: 0.0,
                radius: 0.0,
            },
            domain: [0.0, 1.0],
            extend: [true, true],
        };

        assert_eq!(shading.param_at(2.0, 3.0), None);
    }
}
