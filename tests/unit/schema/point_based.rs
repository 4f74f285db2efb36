use super::*;
use crate::path::Path;
use crate::stage::{Stage, StageOpts};

const FPS: f64 = 24.0;

fn positions1() -> Vec<[f32; 3]> {
    vec![[1.0, 2.0, 3.0]]
}

fn positions2() -> Vec<[f32; 3]> {
    vec![[1.0, 2.0, 3.0], [6.0, 3.0, 2.0]]
}

fn positions3() -> Vec<[f32; 3]> {
    vec![[8.0, 3.0, 5.0], [-4.0, -5.0, 17.0], [-4.0, 23.0, 12.0]]
}

fn velocities1() -> Vec<[f32; 3]> {
    vec![[10.0, 10.0, 10.0]]
}

fn velocities2() -> Vec<[f32; 3]> {
    vec![[4.0, 12.0, 75.0], [-4.0, -83.0, 65.0]]
}

fn velocities3() -> Vec<[f32; 3]> {
    vec![
        [-8.0, 13.0, -5.0],
        [-24.0, -45.0, 17.0],
        [-44.0, 23.0, 112.0],
    ]
}

fn add(p: &[[f32; 3]], v: &[[f32; 3]], dt: f64) -> Vec<[f32; 3]> {
    let dt = dt as f32;
    p.iter()
        .zip(v)
        .map(|(p, v)| [p[0] + v[0] * dt, p[1] + v[1] * dt, p[2] + v[2] * dt])
        .collect()
}

fn assert_close(got: &[[f32; 3]], want: &[[f32; 3]]) {
    assert_eq!(got.len(), want.len(), "{got:?} vs {want:?}");
    for (g, w) in got.iter().zip(want) {
        for k in 0..3 {
            assert!((g[k] - w[k]).abs() <= 1e-4, "{got:?} vs {want:?}");
        }
    }
}

fn t(v: f64) -> TimeCode {
    TimeCode::new(v)
}

fn points_prim(type_name: &str) -> PointBased {
    let stage = Stage::create_in_memory(StageOpts::default()).unwrap();
    stage.set_frames_per_second(FPS).unwrap();
    let prim = stage
        .define_prim(&Path::new("/points").unwrap(), type_name)
        .unwrap();
    PointBased::new(prim).unwrap()
}

#[test]
fn only_point_based_kinds_get_a_view() {
    let stage = Stage::create_in_memory(StageOpts::default()).unwrap();
    let xform = stage
        .define_prim(&Path::new("/xf").unwrap(), "Xform")
        .unwrap();
    assert!(PointBased::new(xform).is_none());
    let mesh = stage
        .define_prim(&Path::new("/mesh").unwrap(), "Mesh")
        .unwrap();
    assert!(PointBased::new(mesh).is_some());
}

#[test]
fn points_follow_velocities_from_the_base_sample() {
    let points = points_prim("Points");
    assert!(
        points
            .compute_positions_at_time(t(1.0), t(2.0), 1.0)
            .is_none()
    );

    let pts = points.points_attr();
    pts.set(positions1(), t(1.0)).unwrap();
    pts.set(positions2(), t(2.0)).unwrap();
    pts.set(positions3(), t(3.0)).unwrap();

    // No velocities: sampled points, held when the point counts differ.
    let at = |time: f64, base: f64, scale: f32| {
        points
            .compute_positions_at_time(t(time), t(base), scale)
            .unwrap()
    };
    assert_close(&at(1.4, 1.0, 1.0), &positions1());
    assert_close(&at(2.8, 2.0, 1.0), &positions2());

    points.velocities_attr().set(velocities1(), t(1.0)).unwrap();
    assert_close(&at(2.8, 2.0, 1.0), &positions2());

    let defaulted = points
        .compute_positions_at_time(t(1.4), TimeCode::DEFAULT, 1.0)
        .unwrap();
    assert_close(&defaulted, &add(&positions1(), &velocities1(), 0.4 / FPS));
    assert_close(
        &at(1.4, 1.0, 1.0),
        &add(&positions1(), &velocities1(), 0.4 / FPS),
    );
    assert_close(
        &at(1.4, 1.0, 0.8),
        &add(&positions1(), &velocities1(), 0.4 * 0.8 / FPS),
    );

    points.velocities_attr().set(velocities2(), t(2.0)).unwrap();
    points.velocities_attr().set(velocities3(), t(3.0)).unwrap();
    assert_close(
        &at(2.2, 2.0, 0.8),
        &add(&positions2(), &velocities2(), 0.2 * 0.8 / FPS),
    );
    assert_close(
        &at(1.2, 2.0, 1.0),
        &add(&positions2(), &velocities2(), (1.2 - 2.0) / FPS),
    );
    assert_close(
        &at(3.4, 3.0, 1.0),
        &add(&positions3(), &velocities3(), 0.4 / FPS),
    );
}

#[test]
fn many_times_share_one_base_sample() {
    let points = points_prim("Points");
    let pts = points.points_attr();
    pts.set(positions2(), t(2.0)).unwrap();
    points.velocities_attr().set(velocities2(), t(2.0)).unwrap();

    let out = points.compute_positions_at_times(&[t(2.0), t(2.5), t(3.0)], t(2.0), 1.0);
    assert_eq!(out.len(), 3);
    assert_close(&out[0], &positions2());
    assert_close(&out[1], &add(&positions2(), &velocities2(), 0.5 / FPS));
    assert_close(&out[2], &add(&positions2(), &velocities2(), 1.0 / FPS));

    assert!(
        points
            .compute_positions_at_times(&[], t(2.0), 1.0)
            .is_empty()
    );
    assert!(
        points
            .compute_positions_at_times(&[t(2.0)], TimeCode::DEFAULT, 1.0)
            .is_empty()
    );
}

#[test]
fn sampled_fallback_stops_at_the_first_topology_change() {
    let mesh = points_prim("Mesh");
    let pts = mesh.points_attr();
    pts.set(positions2(), t(1.0)).unwrap();
    pts.set(positions2(), t(2.0)).unwrap();
    pts.set(positions3(), t(3.0)).unwrap();

    let out = mesh.compute_positions_at_times(&[t(1.0), t(2.0), t(3.0)], t(1.0), 1.0);
    assert_eq!(out.len(), 2);

    // Mesh velocities must match both bracketing samples.
    mesh.velocities_attr().set(velocities2(), t(1.0)).unwrap();
    let out = mesh.compute_positions_at_times(&[t(1.5)], t(1.5), 1.0);
    assert_close(&out[0], &positions2());
}

#[test]
fn points_fallback_needs_stable_ids() {
    let points = points_prim("Points");
    let pts = points.points_attr();
    pts.set(positions2(), t(1.0)).unwrap();
    pts.set(positions2(), t(2.0)).unwrap();

    // Without ids only the first sample is trusted.
    let out = points.compute_positions_at_times(&[t(1.0), t(2.0)], t(1.0), 1.0);
    assert_eq!(out.len(), 1);

    let ids = points.ids_attr();
    ids.set(Value::IntArray(vec![7, 8]), t(1.0)).unwrap();
    ids.set(Value::IntArray(vec![7, 8]), t(2.0)).unwrap();
    let out = points.compute_positions_at_times(&[t(1.0), t(2.0)], t(1.0), 1.0);
    assert_eq!(out.len(), 2);

    ids.set(Value::IntArray(vec![8, 7]), t(2.0)).unwrap();
    let out = points.compute_positions_at_times(&[t(1.0), t(2.0)], t(1.0), 1.0);
    assert_eq!(out.len(), 1);
}

#[test]
fn extents_cover_points_and_widths() {
    assert_eq!(compute_extent(&[]), None);
    assert_eq!(
        compute_extent(&positions3()),
        Some([[-4.0, -5.0, 5.0], [8.0, 23.0, 17.0]])
    );
    assert_eq!(
        compute_extent_with_widths(&positions1(), &[2.0]),
        Some([[0.0, 1.0, 2.0], [2.0, 3.0, 4.0]])
    );
    assert_eq!(compute_extent_with_widths(&positions1(), &[]), None);

    let points = points_prim("Points");
    points
        .points_attr()
        .set(positions1(), TimeCode::DEFAULT)
        .unwrap();
    assert_eq!(
        points.compute_extent_at_time(TimeCode::DEFAULT),
        Some([[1.0, 2.0, 3.0], [1.0, 2.0, 3.0]])
    );
    points
        .widths_attr()
        .set(Value::FloatArray(vec![2.0]), TimeCode::DEFAULT)
        .unwrap();
    assert_eq!(
        points.compute_extent_at_time(TimeCode::DEFAULT),
        Some([[0.0, 1.0, 2.0], [2.0, 3.0, 4.0]])
    );
}
