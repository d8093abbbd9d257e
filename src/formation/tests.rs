use super::{
    Axis, FormationCalculator, FormationError, FormationKind, FormationMembership, Layout,
    PositionSet,
};
use crate::config::{AxisRange, Boundaries, SwarmConfig};
use crate::fleet_control::VehicleKey;
use crate::geometry::Vec3D;
use itertools::Itertools;
use rand::{Rng, seq::SliceRandom};

const EPS: f64 = 1e-9;
const THRESHOLD: f64 = 0.15;

fn keys(n: usize) -> Vec<VehicleKey> {
    (1..=n).map(|i| VehicleKey::from(format!("radio://0/80/2M/E7E7E7E7{i:02}"))).collect()
}

fn calculator() -> FormationCalculator { FormationCalculator::from_config(&SwarmConfig::default()) }

fn within(b: &Boundaries, p: &Vec3D<f64>) -> bool {
    let inside = |r: &AxisRange, v: f64| v >= r.min - EPS && v <= r.max + EPS;
    inside(&b.x, p.x()) && inside(&b.y, p.y()) && inside(&b.z, p.z())
}

fn assert_steps_safe(start: &PositionSet, steps: &[PositionSet]) {
    let mut previous = start;
    for (i, step) in steps.iter().enumerate() {
        let hit = FormationCalculator::positions_intersect(previous, step, THRESHOLD).unwrap();
        let min_d = FormationCalculator::min_pairwise_distance(previous, step).unwrap();
        assert!(!hit, "step {i} has a close approach of {min_d:?}");
        previous = step;
    }
}

#[test]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn test_flat_square_grid_validity() {
    let calc = calculator();
    for n in 1..=81 {
        let vehicles = keys(n);
        let grid = calc.flat_square(&vehicles).unwrap();
        assert_eq!(grid.len(), n);
        let n_side = (n as f64).sqrt().ceil() as usize;
        let spacing = 2.0 / (n_side + 1) as f64;
        assert!(spacing >= calc.min_spacing());
        for pos in grid.values() {
            assert!(within(calc.boundaries(), pos), "{pos} outside boundaries");
            assert!((pos.z() - 1.0).abs() < EPS);
        }
        for (a, b) in grid.values().tuple_combinations() {
            let dx = (a.x() - b.x()).abs();
            let dy = (a.y() - b.y()).abs();
            assert!(dx >= spacing - EPS || dy >= spacing - EPS, "{a} and {b} too close");
        }
    }
}

#[test]
fn test_flat_square_is_centered() {
    let grid = calculator().flat_square(&keys(4)).unwrap();
    let expected = [(-1.0 / 3.0, -1.0 / 3.0), (1.0 / 3.0, -1.0 / 3.0), (-1.0 / 3.0, 1.0 / 3.0), (1.0 / 3.0, 1.0 / 3.0)];
    for (pos, (x, y)) in grid.values().zip(expected) {
        assert!((pos.x() - x).abs() < EPS && (pos.y() - y).abs() < EPS, "unexpected slot {pos}");
    }
}

#[test]
fn test_empty_formations() {
    let calc = calculator();
    assert!(calc.flat_square(&[]).unwrap().is_empty());
    assert!(calc.circle(&[]).unwrap().is_empty());
    let wave = calc.sin_wave(&[], 0.5, 12.0, 30).unwrap();
    assert!(wave.start.is_empty() && wave.trajectories.is_empty());
}

#[test]
fn test_capacity_failures() {
    let calc = calculator();
    let crowd = keys(100);
    let grid_err = calc.flat_square(&crowd).unwrap_err();
    assert!(grid_err.is_capacity());
    assert!(matches!(grid_err, FormationError::InsufficientSpacing { axis: Axis::X, .. }));
    assert!(calc.circle(&crowd).unwrap_err().is_capacity());
    assert!(calc.tilted_plane(&crowd, 45.0, 45.0).unwrap_err().is_capacity());

    let start = calc.flat_square(&keys(12)).unwrap();
    let end = calc.circle(&keys(12)).unwrap();
    let plan_err = calc.transition_plan(&start, &end).unwrap_err();
    assert!(matches!(plan_err, FormationError::InsufficientSpacing { axis: Axis::Z, .. }));

    let tiny = FormationCalculator::new(
        Boundaries {
            x: AxisRange::new(0.0, 0.5),
            y: AxisRange::new(0.0, 0.5),
            z: AxisRange::new(0.0, 2.0),
        },
        0.2,
        0.2,
    );
    assert!(matches!(tiny.circle(&keys(2)), Err(FormationError::RadiusTooSmall { .. })));
}

#[test]
fn test_tilted_plane_clamped() {
    let config = SwarmConfig::default();
    let calc = calculator();
    let vehicles = keys(9);
    let flat = calc.flat_square(&vehicles).unwrap();
    let tilted = calc.tilted_plane(&vehicles, 45.0, 45.0).unwrap();
    let (z_lo, z_hi) = (config.boundaries.z.min + config.boundary_margin, config.boundaries.z.max - config.boundary_margin);
    for (key, pos) in &tilted {
        let base = flat[key];
        assert!((pos.x() - base.x()).abs() < EPS && (pos.y() - base.y()).abs() < EPS);
        let raw = base.z() + base.x() + base.y();
        assert!((pos.z() - raw.clamp(z_lo, z_hi)).abs() < 1e-6);
    }
    // corners of the 3x3 grid hit both clamps
    assert!(tilted.values().any(|p| (p.z() - z_lo).abs() < EPS));
    assert!(tilted.values().any(|p| (p.z() - z_hi).abs() < EPS));
    assert!(calc.tilted_plane(&vehicles, 90.0, 0.0).is_err());
}

#[test]
fn test_circle_even_spacing() {
    let calc = calculator();
    for n in 2..=9 {
        let ring = calc.circle(&keys(n)).unwrap();
        let center = Vec3D::new(0.0, 0.0, 1.0);
        for pos in ring.values() {
            assert!((pos.euclid_distance(&center) - 0.6).abs() < 1e-9);
        }
        let neighbours: Vec<f64> = ring
            .values()
            .circular_tuple_windows()
            .map(|(a, b)| a.euclid_distance(b))
            .collect();
        let first = neighbours[0];
        assert!(neighbours.iter().all(|d| (d - first).abs() < 1e-9));
        assert!(first >= calc.min_spacing());
    }
}

#[test]
fn test_moving_circle_rigid_rotation() {
    let calc = calculator();
    let vehicles = keys(5);
    let dynamic = calc.moving_circle(&vehicles, 12.0, 30).unwrap();
    assert_eq!(dynamic.waypoint_dt, chrono::TimeDelta::milliseconds(400));
    let center = Vec3D::new(0.0, 0.0, 1.0);
    for (key, traj) in &dynamic.trajectories {
        assert_eq!(traj.len(), 30);
        assert_eq!(traj.first().unwrap().position, dynamic.start[key]);
        for wp in traj.waypoints() {
            let to_center = wp.position.to(&center);
            let heading = to_center.y().atan2(to_center.x()).to_degrees();
            let diff = (heading - wp.yaw_deg).rem_euclid(360.0);
            assert!(diff < 1e-6 || (360.0 - diff) < 1e-6, "yaw {} vs heading {heading}", wp.yaw_deg);
            assert!(wp.yaw_deg > -180.0 && wp.yaw_deg <= 180.0);
        }
    }
    let reference: Vec<f64> = dynamic
        .start
        .values()
        .tuple_combinations()
        .map(|(a, b)| a.euclid_distance(b))
        .collect();
    for k in 0..30 {
        let at_k: Vec<f64> = dynamic
            .trajectories
            .values()
            .map(|t| t.at(k).unwrap().position)
            .tuple_combinations()
            .map(|(a, b)| a.euclid_distance(&b))
            .collect();
        for (r, d) in reference.iter().zip(at_k) {
            assert!((r - d).abs() < 1e-9);
        }
    }
}

#[test]
fn test_dynamic_waypoint_interval_must_be_positive() {
    let calc = calculator();
    let vehicles = keys(2);
    assert!(matches!(
        calc.moving_circle(&vehicles, 1e-7, 30),
        Err(FormationError::InvalidParameter(_))
    ));
    assert!(matches!(calc.moving_circle(&vehicles, 0.0, 30), Err(FormationError::InvalidParameter(_))));
    assert!(matches!(calc.moving_circle(&vehicles, 1.0, 0), Err(FormationError::InvalidParameter(_))));
    let fast = calc.moving_circle(&vehicles, 3e-4, 30).unwrap();
    assert!(fast.waypoint_dt > chrono::TimeDelta::zero());
}

#[test]
#[allow(clippy::cast_precision_loss)]
fn test_sin_wave_profile() {
    let config = SwarmConfig::default();
    let calc = calculator();
    let vehicles = keys(4);
    let amplitude = config.sin_wave_amplitude;
    let wave = calc.sin_wave(&vehicles, amplitude, 12.0, 24).unwrap();
    let xs: Vec<f64> = vehicles.iter().map(|k| wave.start[k].x()).collect();
    for (a, b) in xs.iter().tuple_windows() {
        assert!((b - a - 0.4).abs() < EPS);
    }
    for (key, traj) in &wave.trajectories {
        let start = wave.start[key];
        let phase_x = std::f64::consts::TAU * (start.x() + 1.0) / 2.0;
        for (k, wp) in traj.waypoints().iter().enumerate() {
            assert!((wp.position.x() - start.x()).abs() < EPS);
            assert!((wp.position.y() - start.y()).abs() < EPS);
            let expected = 1.0 + amplitude * (phase_x + std::f64::consts::TAU * k as f64 / 24.0).sin();
            assert!((wp.position.z() - expected).abs() < 1e-9);
        }
    }
    let loud = calc.sin_wave(&vehicles, 5.0, 12.0, 24).unwrap();
    for traj in loud.trajectories.values() {
        for wp in traj.waypoints() {
            assert!(wp.position.z() >= 0.2 - EPS && wp.position.z() <= 1.8 + EPS);
        }
    }
    assert!(calc.sin_wave(&vehicles, amplitude, 12.0, 0).unwrap_err().is_validation());
    assert!(calc.sin_wave(&vehicles, amplitude, -1.0, 10).unwrap_err().is_validation());
}

#[test]
fn test_layout_dispatch() {
    let config = SwarmConfig::default();
    let calc = calculator();
    let vehicles = keys(4);
    let kinds = [
        FormationKind::FlatSquare,
        FormationKind::tilted_plane(&config),
        FormationKind::Circle,
        FormationKind::moving_circle(&config),
        FormationKind::sin_wave(&config),
    ];
    for kind in kinds {
        let layout = calc.layout(kind, &vehicles).unwrap();
        assert_eq!(layout.start_positions().len(), 4);
        assert_eq!(matches!(layout, Layout::Dynamic(_)), kind.is_dynamic(), "{kind}");
    }
}

#[test]
fn test_positions_intersect_validation() {
    let calc = calculator();
    let start = calc.flat_square(&keys(4)).unwrap();
    let end = calc.circle(&keys(3)).unwrap();
    assert_eq!(
        FormationCalculator::positions_intersect(&start, &end, THRESHOLD),
        Err(FormationError::MismatchedVehicleSets { start: 4, end: 3 })
    );
    let mut other = calc.circle(&keys(4)).unwrap();
    let moved = other.remove(&keys(4)[3]).unwrap();
    other.insert(VehicleKey::from("radio://0/80/2M/DEADBEEF"), moved);
    assert!(matches!(
        FormationCalculator::positions_intersect(&start, &other, THRESHOLD),
        Err(FormationError::UnknownVehicle(_))
    ));
    assert!(calc.transition_plan(&start, &other).unwrap_err().is_validation());
}

#[test]
fn test_swap_needs_transition_and_plan_is_safe() {
    let calc = calculator();
    let vehicles = keys(4);
    let start = calc.flat_square(&vehicles).unwrap();
    let mut end = start.clone();
    let (a, b) = (&vehicles[0], &vehicles[3]);
    end.insert(a.clone(), start[b]);
    end.insert(b.clone(), start[a]);
    assert!(FormationCalculator::positions_intersect(&start, &end, THRESHOLD).unwrap());

    let plan = calc.transition_plan(&start, &end).unwrap();
    assert_eq!(plan.len(), 3);
    assert!(plan.is_transition());
    assert_eq!(plan.final_step(), Some(&end));
    assert_steps_safe(&start, plan.steps());

    // lift keeps x/y, bands are distinct and ordered like the start altitudes
    let lifted = &plan.steps()[0];
    for (key, pos) in lifted {
        assert!((pos.x() - start[key].x()).abs() < EPS && (pos.y() - start[key].y()).abs() < EPS);
    }
    let bands: Vec<f64> = lifted.values().map(Vec3D::z).sorted_by(f64::total_cmp).collect();
    for (lo, hi) in bands.iter().tuple_windows() {
        assert!(hi - lo >= calc.min_spacing() - EPS);
    }
    // shift goes to each vehicle's own target x/y at its band altitude
    for (key, pos) in &plan.steps()[1] {
        assert!((pos.x() - end[key].x()).abs() < EPS && (pos.y() - end[key].y()).abs() < EPS);
        assert!((pos.z() - lifted[key].z()).abs() < EPS);
    }
}

#[test]
fn test_transition_orders_bands_by_start_height() {
    let calc = calculator();
    let vehicles = keys(9);
    let start = calc.tilted_plane(&vehicles, 45.0, 45.0).unwrap();
    let end = calc.circle(&vehicles).unwrap();
    let plan = calc.transition_plan(&start, &end).unwrap();
    let lifted = &plan.steps()[0];
    for (a, b) in vehicles.iter().tuple_combinations() {
        if start[a].z() < start[b].z() - EPS {
            assert!(lifted[a].z() < lifted[b].z());
        }
    }
    assert_steps_safe(&start, plan.steps());
}

#[test]
fn test_random_permutations_transition_safety() {
    let calc = calculator();
    let mut rng = rand::rng();
    for _ in 0..50 {
        let n = rng.random_range(2..=9);
        let vehicles = keys(n);
        let mut shuffled = vehicles.clone();
        shuffled.shuffle(&mut rng);
        let start = calc.flat_square(&vehicles).unwrap();
        let end = if rng.random_bool(0.5) {
            calc.flat_square(&shuffled).unwrap()
        } else {
            calc.circle(&shuffled).unwrap()
        };
        let plan = calc.transition_plan(&start, &end).unwrap();
        assert_steps_safe(&start, plan.steps());
    }
}

#[test]
fn test_membership_join_leave() {
    let vehicles = keys(3);
    let mut membership = FormationMembership::new(&vehicles);
    assert_eq!(membership.count(), 0);
    assert!(membership.available_set().is_empty());

    assert!(membership.join(&vehicles[2]));
    assert!(membership.join(&vehicles[0]));
    assert!(!membership.join(&vehicles[0]));
    assert!(!membership.join(&VehicleKey::from("radio://unknown")));
    assert_eq!(membership.count(), 2);
    assert_eq!(membership.available_set(), vec![vehicles[0].clone(), vehicles[2].clone()]);

    assert!(membership.leave(&vehicles[0]));
    assert!(!membership.leave(&vehicles[0]));
    assert!(!membership.leave(&vehicles[1]));
    assert!(!membership.leave(&VehicleKey::from("radio://unknown")));
    assert_eq!(membership.count(), 1);
    assert!(membership.is_member(&vehicles[2]));
    assert!(!membership.is_member(&vehicles[0]));
}
