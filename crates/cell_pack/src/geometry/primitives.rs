//! Low-level intersection and proximity routines on triangles, rays and boxes.
use glam::Vec3;

const PARALLEL_EPSILON: f32 = 1e-9;

/// Möller–Trumbore ray/triangle intersection.
///
/// Returns the ray parameter `t > 0` of the hit, or `None` when the ray misses
/// or runs parallel to the triangle plane.
pub fn ray_triangle(origin: Vec3, dir: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    line_triangle(origin, dir, a, b, c).filter(|&t| t > 0.0)
}

/// Line parameter `t` (any sign) where `origin + t·dir` meets triangle `abc`.
fn line_triangle(origin: Vec3, dir: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    let e1 = b - a;
    let e2 = c - a;
    let pvec = dir.cross(e2);
    let det = e1.dot(pvec);
    if det.abs() < PARALLEL_EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let tvec = origin - a;
    let u = tvec.dot(pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let qvec = tvec.cross(e1);
    let v = dir.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    Some(e2.dot(qvec) * inv_det)
}

/// True when the closed segment `p..q` touches triangle `abc`, endpoints included.
pub fn segment_crosses_triangle(p: Vec3, q: Vec3, a: Vec3, b: Vec3, c: Vec3) -> bool {
    matches!(line_triangle(p, q - p, a, b, c), Some(t) if (0.0..=1.0).contains(&t))
}

/// Closest point to `p` on triangle `abc` (Ericson, Real-Time Collision Detection 5.1.5).
pub fn closest_point_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/// Separating-axis overlap test between triangle `abc` and the axis-aligned box
/// centred at `center` with half extents `half` (Akenine-Möller).
pub fn triangle_intersects_aabb(center: Vec3, half: Vec3, a: Vec3, b: Vec3, c: Vec3) -> bool {
    let v0 = a - center;
    let v1 = b - center;
    let v2 = c - center;
    let edges = [v1 - v0, v2 - v1, v0 - v2];

    // Nine cross-product axes.
    for edge in edges {
        for axis in [
            Vec3::new(0.0, -edge.z, edge.y),
            Vec3::new(edge.z, 0.0, -edge.x),
            Vec3::new(-edge.y, edge.x, 0.0),
        ] {
            if axis.length_squared() < PARALLEL_EPSILON {
                continue;
            }
            let p0 = v0.dot(axis);
            let p1 = v1.dot(axis);
            let p2 = v2.dot(axis);
            let r = half.dot(axis.abs());
            let lo = p0.min(p1).min(p2);
            let hi = p0.max(p1).max(p2);
            if lo > r || hi < -r {
                return false;
            }
        }
    }

    // Box face normals.
    let tri_min = v0.min(v1).min(v2);
    let tri_max = v0.max(v1).max(v2);
    if tri_min.cmpgt(half).any() || tri_max.cmplt(-half).any() {
        return false;
    }

    // Triangle plane.
    let normal = edges[0].cross(edges[1]);
    let d = normal.dot(v0);
    let r = half.dot(normal.abs());
    d.abs() <= r
}
