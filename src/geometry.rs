use nalgebra::{Matrix3, Vector3};

/// Angles closer to zero than this are treated as "already straight".
pub const ANGLE_SNAP_EPSILON: f64 = 0.1;

/// Boundary of a detected content region, in full-resolution source-image
/// pixels. This is the only contour type the rectifier accepts.
#[derive(Debug, Clone)]
pub struct SourceContour {
    pub points: Vec<(f64, f64)>,
}

/// Boundary of a detected content region, in the coordinates of a downscaled
/// work copy. Carries the work scale (work / source, <= 1) so that
/// [`WorkContour::to_source`] is the only way back to source coordinates.
#[derive(Debug, Clone)]
pub struct WorkContour {
    pub points: Vec<(f64, f64)>,
    pub scale: f64,
}

impl WorkContour {
    /// Rescale every point into source-image space.
    pub fn to_source(&self) -> SourceContour {
        let inv = 1.0 / self.scale;
        SourceContour {
            points: self
                .points
                .iter()
                .map(|&(x, y)| (x * inv, y * inv))
                .collect(),
        }
    }
}

/// A rotated rectangle fit around a contour: center, side lengths, and the
/// angle (degrees) of the `width` edge measured in image coordinates.
#[derive(Debug, Clone, Copy)]
pub struct OrientedBox {
    pub center: (f64, f64),
    pub width: f64,
    pub height: f64,
    pub angle_degrees: f64,
}

impl OrientedBox {
    /// Map the raw orientation into (-45°, 45°], swapping the side lengths
    /// whenever a ±45° boundary is crossed. This guarantees the corrective
    /// rotation is the smallest possible turn: a nearly upright page is never
    /// rotated by ~90° or ~180°. Angles within [`ANGLE_SNAP_EPSILON`] of 0°
    /// (or landing on ±90°) snap to exactly 0.
    pub fn normalized(&self) -> OrientedBox {
        let mut angle = self.angle_degrees;
        let mut width = self.width;
        let mut height = self.height;

        if angle <= -45.0 {
            angle += 90.0;
            std::mem::swap(&mut width, &mut height);
        } else if angle > 45.0 {
            angle -= 90.0;
            std::mem::swap(&mut width, &mut height);
        }

        if angle.abs() < ANGLE_SNAP_EPSILON || (angle.abs() - 90.0).abs() < ANGLE_SNAP_EPSILON {
            angle = 0.0;
        }

        OrientedBox {
            center: self.center,
            width,
            height,
            angle_degrees: angle,
        }
    }

    /// Rescale a box measured on a work copy back to source-image space.
    /// Center and side lengths scale; the angle is scale-invariant.
    pub fn to_source(&self, work_scale: f64) -> OrientedBox {
        let inv = 1.0 / work_scale;
        OrientedBox {
            center: (self.center.0 * inv, self.center.1 * inv),
            width: self.width * inv,
            height: self.height * inv,
            angle_degrees: self.angle_degrees,
        }
    }

    /// The four corner points, in order around the rectangle.
    pub fn corners(&self) -> [(f64, f64); 4] {
        let rad = self.angle_degrees.to_radians();
        let (ux, uy) = (rad.cos(), rad.sin());
        let (vx, vy) = (-uy, ux);
        let (hw, hh) = (self.width / 2.0, self.height / 2.0);
        let (cx, cy) = self.center;

        [
            (cx - ux * hw - vx * hh, cy - uy * hw - vy * hh),
            (cx + ux * hw - vx * hh, cy + uy * hw - vy * hh),
            (cx + ux * hw + vx * hh, cy + uy * hw + vy * hh),
            (cx - ux * hw + vx * hh, cy - uy * hw + vy * hh),
        ]
    }
}

/// Fit the minimum-area bounding rectangle to a set of points using rotating
/// calipers over the convex hull. The reported angle is reduced into
/// [-90°, 0), with `width` measuring the extent along the reported edge.
pub fn min_area_rect(points: &[(f64, f64)]) -> Option<OrientedBox> {
    if points.is_empty() {
        return None;
    }

    let hull = convex_hull(points);
    if hull.len() < 3 {
        // Degenerate input (point or line): fall back to the axis-aligned box.
        let (min_x, min_y, max_x, max_y) = extent(points);
        return Some(OrientedBox {
            center: ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0),
            width: max_x - min_x,
            height: max_y - min_y,
            angle_degrees: 0.0,
        });
    }

    let n = hull.len();
    let mut best: Option<(f64, OrientedBox)> = None;

    for i in 0..n {
        let (x1, y1) = hull[i];
        let (x2, y2) = hull[(i + 1) % n];
        let (ex, ey) = (x2 - x1, y2 - y1);
        let len = (ex * ex + ey * ey).sqrt();
        if len < 1e-9 {
            continue;
        }

        // Edge direction and its perpendicular.
        let (ux, uy) = (ex / len, ey / len);
        let (vx, vy) = (-uy, ux);

        let mut min_u = f64::MAX;
        let mut max_u = f64::MIN;
        let mut min_v = f64::MAX;
        let mut max_v = f64::MIN;

        for &(px, py) in &hull {
            let u = px * ux + py * uy;
            let v = px * vx + py * vy;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let width = max_u - min_u;
        let height = max_v - min_v;
        let area = width * height;

        if best.as_ref().map_or(true, |(a, _)| area < *a) {
            let cu = (min_u + max_u) / 2.0;
            let cv = (min_v + max_v) / 2.0;
            let rect = reduce_to_rect_range(OrientedBox {
                center: (cu * ux + cv * vx, cu * uy + cv * vy),
                width,
                height,
                angle_degrees: uy.atan2(ux).to_degrees(),
            });
            best = Some((area, rect));
        }
    }

    best.map(|(_, rect)| rect)
}

/// Bring a raw calipers angle into [-90°, 0), swapping sides as needed so
/// `width` keeps measuring the extent along the reported edge.
fn reduce_to_rect_range(mut rect: OrientedBox) -> OrientedBox {
    while rect.angle_degrees >= 90.0 {
        rect.angle_degrees -= 180.0;
    }
    while rect.angle_degrees < -90.0 {
        rect.angle_degrees += 180.0;
    }
    if rect.angle_degrees >= 0.0 {
        rect.angle_degrees -= 90.0;
        std::mem::swap(&mut rect.width, &mut rect.height);
    }
    rect
}

/// Andrew's monotone chain. Returns hull vertices ordered around the hull.
fn convex_hull(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut sorted: Vec<(f64, f64)> = points.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted.dedup();

    if sorted.len() <= 2 {
        return sorted;
    }

    let cross = |o: (f64, f64), a: (f64, f64), b: (f64, f64)| -> f64 {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    };

    let mut lower: Vec<(f64, f64)> = Vec::new();
    for &p in &sorted {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<(f64, f64)> = Vec::new();
    for &p in sorted.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

fn extent(points: &[(f64, f64)]) -> (f64, f64, f64, f64) {
    let mut min_x = f64::MAX;
    let mut min_y = f64::MAX;
    let mut max_x = f64::MIN;
    let mut max_y = f64::MIN;
    for &(x, y) in points {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    (min_x, min_y, max_x, max_y)
}

/// Build the affine rotation matrix about `center` by `angle` degrees, in the
/// convention where a box reported at some angle by [`min_area_rect`] is
/// straightened by rotating with that same angle.
pub fn rotation_about(center: (f64, f64), angle_degrees: f64) -> Matrix3<f64> {
    let rad = angle_degrees.to_radians();
    let (a, b) = (rad.cos(), rad.sin());
    let (cx, cy) = center;

    Matrix3::new(
        a, b, (1.0 - a) * cx - b * cy,
        -b, a, b * cx + (1.0 - a) * cy,
        0.0, 0.0, 1.0,
    )
}

/// Transform a point using the affine matrix.
pub fn transform_point(matrix: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let p = Vector3::new(x, y, 1.0);
    let result = matrix * p;
    (result.x / result.z, result.y / result.z)
}

/// Integer axis-aligned bounding box (x, y, width, height) enclosing a point
/// set, or `None` for an empty set.
pub fn bounding_rect(points: &[(f64, f64)]) -> Option<(i64, i64, i64, i64)> {
    if points.is_empty() {
        return None;
    }
    let (min_x, min_y, max_x, max_y) = extent(points);
    let x = min_x.floor() as i64;
    let y = min_y.floor() as i64;
    let w = max_x.ceil() as i64 - x;
    let h = max_y.ceil() as i64 - y;
    Some((x, y, w, h))
}
