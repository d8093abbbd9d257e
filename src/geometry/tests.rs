use super::{Position, Vec3D, closest_points, segment_distance};
use rand::Rng;

const TOL: f64 = 1e-9;

fn get_rand_pos() -> Position {
    let mut rng = rand::rng();
    Vec3D::new(
        rng.random_range(-1.0..1.0),
        rng.random_range(-1.0..1.0),
        rng.random_range(0.0..2.0),
    )
}

#[test]
fn test_parallel_segments_with_full_overlap() {
    for d in [0.05, 0.15, 0.7] {
        let dist = segment_distance(
            Vec3D::new(0.0, 0.0, 1.0),
            Vec3D::new(1.0, 0.0, 1.0),
            Vec3D::new(0.0, d, 1.0),
            Vec3D::new(1.0, d, 1.0),
        );
        assert!((dist - d).abs() < TOL, "expected {d}, got {dist}");
    }
}

#[test]
fn test_antiparallel_segments() {
    let dist = segment_distance(
        Vec3D::new(-0.5, 0.0, 0.5),
        Vec3D::new(0.5, 0.0, 0.5),
        Vec3D::new(0.5, 0.0, 0.8),
        Vec3D::new(-0.5, 0.0, 0.8),
    );
    assert!((dist - 0.3).abs() < TOL);
}

#[test]
fn test_collinear_disjoint_segments() {
    let dist = segment_distance(
        Vec3D::new(0.0, 0.0, 0.0),
        Vec3D::new(1.0, 0.0, 0.0),
        Vec3D::new(2.0, 0.0, 0.0),
        Vec3D::new(3.0, 0.0, 0.0),
    );
    assert!((dist - 1.0).abs() < TOL);
}

#[test]
fn test_shared_endpoint_is_zero() {
    let shared = Vec3D::new(0.3, -0.2, 1.1);
    let dist = segment_distance(
        Vec3D::new(-0.4, 0.5, 0.9),
        shared,
        shared,
        Vec3D::new(0.9, 0.1, 1.7),
    );
    assert!(dist.abs() < TOL);
}

#[test]
fn test_crossing_segments() {
    let dist = segment_distance(
        Vec3D::new(-1.0, 0.0, 1.0),
        Vec3D::new(1.0, 0.0, 1.0),
        Vec3D::new(0.0, -1.0, 1.2),
        Vec3D::new(0.0, 1.0, 1.2),
    );
    assert!((dist - 0.2).abs() < TOL);
}

#[test]
fn test_closest_points_clamped_to_segments() {
    // supporting lines cross at x = 2, outside the first segment
    let (c1, c2) = closest_points(
        Vec3D::new(0.0, 0.0, 0.0),
        Vec3D::new(1.0, 0.0, 0.0),
        Vec3D::new(2.0, -1.0, 0.0),
        Vec3D::new(2.0, 1.0, 0.0),
    );
    assert!(c1.euclid_distance(&Vec3D::new(1.0, 0.0, 0.0)) < TOL);
    assert!(c2.euclid_distance(&Vec3D::new(2.0, 0.0, 0.0)) < TOL);
}

#[test]
fn test_degenerate_segments() {
    let p = Vec3D::new(0.0, 0.0, 1.0);
    let q = Vec3D::new(0.0, 0.0, 1.5);
    assert!((segment_distance(p, p, q, q) - 0.5).abs() < TOL);
    let on_line = segment_distance(
        Vec3D::new(0.5, 0.3, 0.0),
        Vec3D::new(0.5, 0.3, 0.0),
        Vec3D::new(0.0, 0.0, 0.0),
        Vec3D::new(1.0, 0.0, 0.0),
    );
    assert!((on_line - 0.3).abs() < TOL);
}

#[test]
fn test_segment_distance_symmetry() {
    for _ in 0..500 {
        let (p1, p2, p3, p4) = (get_rand_pos(), get_rand_pos(), get_rand_pos(), get_rand_pos());
        let forward = segment_distance(p1, p2, p3, p4);
        let swapped = segment_distance(p3, p4, p1, p2);
        let reversed = segment_distance(p2, p1, p4, p3);
        assert!((forward - swapped).abs() < 1e-7, "{forward} != {swapped}");
        assert!((forward - reversed).abs() < 1e-7, "{forward} != {reversed}");
        assert!(forward <= p1.euclid_distance(&p3) + TOL);
    }
}

#[test]
fn test_vec3d_ops() {
    let a: Vec3D<f64> = Vec3D::new(1.0, 2.0, 2.0);
    let b: Vec3D<f64> = Vec3D::new(0.0, 0.0, 0.0);
    assert!((a.abs() - 3.0).abs() < TOL);
    assert!((a.euclid_distance(&b) - 3.0).abs() < TOL);
    assert!((a.planar_distance(&b) - 5.0_f64.sqrt()).abs() < TOL);
    assert_eq!(b.lerp(&a, 0.5), Vec3D::new(0.5, 1.0, 1.0));
    assert_eq!(a - a, Vec3D::zero());
    assert_eq!(format!("{}", Vec3D::new(1.0, 0.5, 0.25)), "[1.000, 0.500, 0.250]");
}
