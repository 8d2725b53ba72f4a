//! Integration tests for sharpcrate-algorithms
//!
//! These run the full pipeline on small synthetic clouds with known geometry.

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sharpcrate_algorithms::*;
use sharpcrate_core::{OrientedPoint, OrientedPointCloud, Point3d, Vector3d};

/// Unit square in the z = 0 plane, `n` samples per side, normals +z
fn create_flat_square(n: usize) -> OrientedPointCloud {
    let spacing = 1.0 / (n - 1) as f64;
    (0..n)
        .flat_map(|i| {
            (0..n).map(move |j| {
                OrientedPoint::new(Point3d::new(i as f64 * spacing, j as f64 * spacing, 0.0), Vector3d::z())
            })
        })
        .collect()
}

/// Floor `x in [0, 0.5], y in [0, 1], z = 0` facing +z and wall
/// `x = 0.5, z in (0, 0.5]` facing +x, spacing 0.05. The bounding box has a
/// longest side of 1, so normalization leaves positions unchanged.
fn create_dihedral_edge() -> OrientedPointCloud {
    let mut cloud = OrientedPointCloud::new();
    for i in 0..=10 {
        for j in 0..=20 {
            cloud.push(OrientedPoint::new(
                Point3d::new(i as f64 * 0.05, j as f64 * 0.05, 0.0),
                Vector3d::z(),
            ));
        }
    }
    for k in 1..=10 {
        for j in 0..=20 {
            cloud.push(OrientedPoint::new(
                Point3d::new(0.5, j as f64 * 0.05, k as f64 * 0.05),
                Vector3d::x(),
            ));
        }
    }
    cloud
}

/// Distance from `p` to the crease line `x = 0.5, z = 0`
fn distance_to_edge(p: &Point3d) -> f64 {
    ((p.x - 0.5).powi(2) + p.z.powi(2)).sqrt()
}

fn assert_acceptance_bound(result: &FeatureExtraction) {
    for (&i, refined) in &result.feature_points {
        let displacement = (result.cloud[i].position - refined).norm();
        assert!(
            displacement >= 1e-5 && displacement <= result.radius(),
            "feature {} moved {} with radius {}",
            i,
            displacement,
            result.radius()
        );
    }
}

#[test]
fn test_flat_plane_has_no_features() {
    let result = extract_sharp_features(&create_flat_square(21)).unwrap();

    assert_eq!(result.stats.inert_count, 0);
    for i in 0..result.cloud.len() {
        assert_eq!(result.is_smooth(i), Some(true), "point {} should be smooth", i);
        assert_eq!(result.is_confident(i), Some(true), "point {} should be confident", i);
        assert!(result.is_excluded(i));
    }
    assert!(result.feature_points.is_empty());
    assert_eq!(result.stats.accepted_count, 0);
    assert_eq!(result.stats.kept_normals, result.cloud.len());
}

#[test]
fn test_dihedral_edge() {
    let cloud = create_dihedral_edge();
    let result = extract_sharp_features(&cloud).unwrap();

    assert_relative_eq!(result.normalization.scale, 1.0);
    assert_relative_eq!(result.radius(), 0.112, epsilon = 1e-9);

    for (i, point) in result.cloud.iter().enumerate() {
        let p = point.position;
        if p.z == 0.0 && (p.x - 0.5).abs() < 1e-12 {
            assert_eq!(result.is_smooth(i), Some(false), "crease point {:?} should not be smooth", p);
        }
        if p.z == 0.0 && p.x <= 0.2 + 1e-12 {
            assert_eq!(result.is_smooth(i), Some(true), "far point {:?} should be smooth", p);
            assert!(result.is_excluded(i));
        }
    }

    // the crease row and the floor row beside it reach position refinement
    for (i, point) in result.cloud.iter().enumerate() {
        let p = point.position;
        if p.z == 0.0 && p.x >= 0.45 - 1e-12 {
            assert!(
                result.outcomes[i].map_or(false, |o| o.was_refined()),
                "point {:?} next to the crease was not refined: {:?}",
                p,
                result.outcomes[i]
            );
        }
    }

    assert!(!result.feature_points.is_empty());
    assert_acceptance_bound(&result);

    // accepted points come from next to the edge and move towards it
    for (&i, refined) in &result.feature_points {
        let original = result.cloud[i].position;
        assert!(distance_to_edge(&original) <= 2.0 * result.radius());
        assert!(distance_to_edge(refined) < distance_to_edge(&original));
    }
}

/// Angle in degrees between `normal` and the nearer of the two face normals
fn angle_to_nearest_face(normal: &Vector3d) -> f64 {
    normal.angle(&Vector3d::z()).min(normal.angle(&Vector3d::x())).to_degrees()
}

#[test]
fn test_noisy_dihedral_edge() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut cloud = create_dihedral_edge();
    for point in cloud.iter_mut() {
        let jitter = Vector3d::new(
            rng.gen_range(-0.05..0.05),
            rng.gen_range(-0.05..0.05),
            rng.gen_range(-0.05..0.05),
        );
        point.normal = (point.normal + jitter).normalize();
    }

    let result = extract_sharp_features(&cloud).unwrap();

    for (i, point) in result.cloud.iter().enumerate() {
        let p = point.position;
        let far_floor = p.z == 0.0 && p.x <= 0.2 + 1e-12;
        let far_wall = p.z >= 0.3 - 1e-12;
        if far_floor || far_wall {
            assert_eq!(result.is_smooth(i), Some(true), "far point {:?} should be smooth", p);
        }
    }

    // averaged normals settle onto a face
    let mut averaged = 0;
    let mut before = 0.0;
    let mut after = 0.0;
    for i in 0..result.cloud.len() {
        if let Some(DenoiseOutcome::Averaged { .. }) = result.denoise_outcomes[i] {
            averaged += 1;
            before += angle_to_nearest_face(&result.cloud[i].normal);
            after += angle_to_nearest_face(&result.normals[i]);
        }
    }
    assert!(averaged > 0);
    assert!(
        after < before,
        "mean angle to the nearest face grew from {} to {}",
        before / averaged as f64,
        after / averaged as f64
    );

    assert!(!result.feature_points.is_empty());
    assert_acceptance_bound(&result);
}

#[test]
fn test_smooth_and_confident_normals_are_unchanged() {
    let result = extract_sharp_features(&create_dihedral_edge()).unwrap();

    let mut kept = 0;
    for i in 0..result.cloud.len() {
        if result.is_smooth(i) == Some(true) && result.is_confident(i) == Some(true) {
            assert_eq!(result.normals[i], result.cloud[i].normal);
            assert_eq!(result.denoise_outcomes[i], Some(DenoiseOutcome::Kept));
            kept += 1;
        }
    }
    assert!(kept > 0);
    assert_eq!(kept, result.stats.kept_normals);
}

#[test]
fn test_smooth_label_agrees_with_fit() {
    let result = extract_sharp_features(&create_dihedral_edge()).unwrap();
    for labels in result.labels.iter().flatten() {
        let separation = (labels.fit.first_normal - labels.fit.second_normal).norm();
        assert_eq!(labels.smooth, separation < 0.29);
    }
}

#[test]
fn test_isolated_point_is_inert() {
    let mut cloud = create_flat_square(21);
    cloud.push(OrientedPoint::new(Point3d::new(1.5, 1.5, 0.0), Vector3d::z()));
    let isolated = cloud.len() - 1;

    let result = extract_sharp_features(&cloud).unwrap();

    assert_eq!(result.stats.inert_count, 1);
    assert!(result.labels[isolated].is_none());
    assert!(result.denoise_outcomes[isolated].is_none());
    assert!(result.outcomes[isolated].is_none());
    assert!(!result.feature_points.contains_key(&isolated));
    assert_eq!(result.neighborhoods.min_count, 1);
    assert!(result.neighborhoods.max_count >= 30);
}

#[test]
fn test_input_units_are_restored() {
    let mut cloud = create_dihedral_edge();
    for point in cloud.iter_mut() {
        point.position = Point3d::new(10.0, -4.0, 2.0) + point.position.coords * 3.0;
    }

    let result = extract_sharp_features(&cloud).unwrap();
    assert_relative_eq!(result.normalization.scale, 3.0, epsilon = 1e-12);
    assert_relative_eq!(result.cloud[5].position, Point3d::new(0.0, 0.25, 0.0), epsilon = 1e-12);

    let restored_points = result.restored_feature_points();
    assert_eq!(restored_points.len(), result.feature_points.len());
    for (i, restored) in &restored_points {
        let refined = result.feature_points[i];
        assert_relative_eq!(
            *restored,
            Point3d::new(10.0, -4.0, 2.0) + refined.coords * 3.0,
            epsilon = 1e-9
        );
    }
}

#[test]
fn test_sequential_run_matches_parallel_run() {
    let cloud = create_dihedral_edge();
    let parallel = extract_sharp_features(&cloud).unwrap();
    let sequential = FeaturePipeline::new(
        PipelineConfig::default().with_parallel(ThreadPoolConfig::default().with_enabled(false)),
    )
    .run(&cloud)
    .unwrap();

    assert_eq!(parallel.feature_points, sequential.feature_points);
    assert_eq!(parallel.normals, sequential.normals);
    assert_eq!(parallel.outcomes, sequential.outcomes);
}

#[test]
fn test_random_cloud_terminates() {
    let mut rng = StdRng::seed_from_u64(7);
    let positions: Vec<Point3d> = (0..400)
        .map(|_| Point3d::new(rng.gen(), rng.gen(), rng.gen()))
        .collect();
    let normals: Vec<Vector3d> = (0..400)
        .map(|_| Vector3d::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(0.1..1.0)))
        .collect();
    let cloud = OrientedPointCloud::from_parts(&positions, &normals);

    let result = extract_sharp_features(&cloud).unwrap();
    let neighborhoods = &result.neighborhoods;
    assert!(neighborhoods.min_count >= 7 || neighborhoods.max_count >= 30);
    assert_eq!(result.labels.len(), 400);
    assert_acceptance_bound(&result);

    for (i, labels) in result.labels.iter().enumerate() {
        assert_eq!(labels.is_none(), neighborhoods.get(i).len() < 5);
    }
}
