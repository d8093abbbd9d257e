use super::vec3d::Vec3D;

/// Squared lengths and determinants below this are treated as zero.
const EPSILON: f64 = 1e-10;

/// Minimum Euclidean distance between the segments `p1 -> p2` and `p3 -> p4`.
///
/// Solves for the closest points of the two supporting lines and keeps both line parameters
/// inside `[0, 1]`. When the lines are (nearly) parallel the parameter on the first segment is
/// fixed first and the second one is resolved against it. Degenerate segments collapse to
/// point-to-segment or point-to-point distances.
pub fn segment_distance(p1: Vec3D<f64>, p2: Vec3D<f64>, p3: Vec3D<f64>, p4: Vec3D<f64>) -> f64 {
    let (c1, c2) = closest_points(p1, p2, p3, p4);
    c1.euclid_distance(&c2)
}

/// Closest pair of points `(on p1 -> p2, on p3 -> p4)`.
pub fn closest_points(
    p1: Vec3D<f64>,
    p2: Vec3D<f64>,
    p3: Vec3D<f64>,
    p4: Vec3D<f64>,
) -> (Vec3D<f64>, Vec3D<f64>) {
    let d1 = p1.to(&p2);
    let d2 = p3.to(&p4);
    let r = p3.to(&p1);
    let a = d1.abs_sq();
    let e = d2.abs_sq();
    let f = d2.dot(r);

    let (s, t) = if a <= EPSILON && e <= EPSILON {
        (0.0, 0.0)
    } else if a <= EPSILON {
        (0.0, clamp_unit(f / e))
    } else {
        let c = d1.dot(r);
        if e <= EPSILON {
            (clamp_unit(-c / a), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let s_line = if denom.abs() > EPSILON * a * e {
                clamp_unit((b * f - c * e) / denom)
            } else {
                // parallel: pin the first segment, resolve the second against it
                clamp_unit(-c / a)
            };
            let t_line = (b * s_line + f) / e;
            if t_line < 0.0 {
                (clamp_unit(-c / a), 0.0)
            } else if t_line > 1.0 {
                (clamp_unit((b - c) / a), 1.0)
            } else {
                (s_line, t_line)
            }
        }
    };
    (p1.lerp(&p2, s), p3.lerp(&p4, t))
}

fn clamp_unit(v: f64) -> f64 { v.clamp(0.0, 1.0) }
