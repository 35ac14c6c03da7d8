mod common;

use std::fs;
use std::path::Path;

use common::{crop, textured_image, MemoryRaster, RecordingTranslator};
use georeg::core::GeotransformError;
use georeg::features::{BinaryDescriptor, Features, Keypoint};
use georeg::{
    coregister, AreaOfInterest, FeatureAlgorithm, GeoTransform, OutcomeKind, Polygon, Registrar,
    RegistrationConfig, RegistrationError, RegistrationOutcome, RegistrationReport,
    RegistrationStage, MIN_GCPS,
};
use nalgebra::Point2;

fn descriptor(k: u8) -> BinaryDescriptor {
    let mut d = [0u8; 32];
    for (i, b) in d.iter_mut().enumerate() {
        *b = k.wrapping_mul(37).wrapping_add(i as u8).rotate_left(k as u32 % 8);
    }
    BinaryDescriptor(d)
}

/// Eight descriptors that match one-to-one; the target side is in reverse order.
fn eight_mutual_matches() -> (Features<BinaryDescriptor>, Features<BinaryDescriptor>) {
    let reference = Features::from_parts(
        (0..8).map(|k| Keypoint::at(10.0 * k as f32, 5.0 * k as f32)).collect(),
        (0..8).map(descriptor).collect(),
    )
    .unwrap();
    let target = Features::from_parts(
        (0..8).rev().map(|k| Keypoint::at(k as f32, 2.0 * k as f32)).collect(),
        (0..8).rev().map(descriptor).collect(),
    )
    .unwrap();
    (reference, target)
}

fn scenario_gt() -> GeoTransform {
    GeoTransform::new([500000.0, 1.0, 0.0, 4000000.0, 0.0, -1.0]).unwrap()
}

fn report() -> RegistrationReport {
    RegistrationReport::new(Path::new("target.tif"), Path::new("ref.tif"), FeatureAlgorithm::Orb)
}

#[test]
fn top_five_of_eight_matches_are_passed_to_the_warp() {
    let (reference, target) = eight_mutual_matches();
    let config = RegistrationConfig {
        limit: Some(5),
        ..RegistrationConfig::default()
    };
    let translator = RecordingTranslator::default();
    let registrar = Registrar::new(&config, &translator, scenario_gt(), None);
    let mut report = report();

    let outcome = registrar
        .register_features(&reference, &target, Path::new("/data/target.tif"), &mut report)
        .unwrap();

    let RegistrationOutcome::Registered { output, gcps } = outcome else {
        panic!("expected a registered outcome");
    };
    assert_eq!(gcps.len(), 5);
    assert_eq!(output, Path::new("/data/target_orb_registered.tif"));
    assert_eq!(report.matches, 8);
    assert_eq!(report.selected, 5);
    assert_eq!(report.accepted, 5);

    let requests = translator.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].gcps, gcps);
    assert_eq!(requests[0].args().iter().filter(|a| *a == "-gcp").count(), 5);

    // every GCP ties a target pixel to the geocode of its matching reference pixel
    for g in &gcps {
        let k = g.target.x;
        assert_eq!(g.target.y, 2.0 * k);
        assert_eq!(g.reference.lon(), 500000.0 + 10.0 * k);
        assert_eq!(g.reference.lat(), 4000000.0 - 5.0 * k);
    }
}

#[test]
fn aoi_that_excludes_everything_aborts_without_warping() {
    let (reference, target) = eight_mutual_matches();
    let dir = tempfile::tempdir().unwrap();
    let gcp_path = dir.path().join("gcps.geojson");
    let config = RegistrationConfig {
        gcp_path: Some(gcp_path.clone()),
        ..RegistrationConfig::default()
    };
    let far_away = Polygon::new(
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ],
        vec![],
    );
    let translator = RecordingTranslator::default();
    let registrar = Registrar::new(
        &config,
        &translator,
        scenario_gt(),
        Some(AreaOfInterest::new(vec![far_away])),
    );
    let mut report = report();

    let outcome = registrar
        .register_features(&reference, &target, Path::new("target.tif"), &mut report)
        .unwrap();

    assert_eq!(
        outcome,
        RegistrationOutcome::Aborted {
            gcps: vec![],
            required: MIN_GCPS
        }
    );
    assert_eq!(translator.calls(), 0);
    assert_eq!(report.selected, 8);
    assert_eq!(report.accepted, 0);

    // the GCP file is written even for aborted runs
    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&gcp_path).unwrap()).unwrap();
    assert_eq!(written["features"].as_array().map(Vec::len), Some(0));
}

#[test]
fn four_gcps_abort_and_five_register() {
    let (reference, target) = eight_mutual_matches();
    let translator = RecordingTranslator::default();

    for (limit, registered) in [(4, false), (5, true)] {
        let config = RegistrationConfig {
            limit: Some(limit),
            ..RegistrationConfig::default()
        };
        let registrar = Registrar::new(&config, &translator, scenario_gt(), None);
        let outcome = registrar
            .register_features(&reference, &target, Path::new("t.tif"), &mut report())
            .unwrap();
        assert_eq!(outcome.is_registered(), registered, "limit {limit}");
        assert_eq!(outcome.gcps().len(), limit as usize);
    }
    assert_eq!(translator.calls(), 1);
}

#[test]
fn five_value_geotransform_fails_before_any_decoding() {
    let img = textured_image(128, 128, 1);
    let target = MemoryRaster::new("target.tif", img.clone());
    let reference = MemoryRaster::new("ref.tif", img);
    let config = RegistrationConfig {
        reference_geotransform: Some("(500000, 1, 0, 4000000, 0)".to_string()),
        ..RegistrationConfig::default()
    };
    let translator = RecordingTranslator::default();

    let err = coregister(&target, &reference, &config, &translator).unwrap_err();
    match err {
        RegistrationError::InvalidGeotransform { stage, source, .. } => {
            assert_eq!(stage, RegistrationStage::Idle);
            assert_eq!(source, GeotransformError::WrongCount { got: 5 });
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(target.decodes(), 0);
    assert_eq!(reference.decodes(), 0);
    assert_eq!(translator.calls(), 0);
}

#[test]
fn missing_reference_georeferencing_is_invalid_geotransform() {
    let img = textured_image(64, 64, 2);
    let target = MemoryRaster::new("target.tif", img.clone());
    let reference = MemoryRaster::new("ref.tif", img)
        .with_geotransform(GeoTransform::from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]));
    let translator = RecordingTranslator::default();

    let err = coregister(&target, &reference, &RegistrationConfig::default(), &translator)
        .unwrap_err();
    assert!(matches!(err, RegistrationError::InvalidGeotransform { .. }));
    assert_eq!(err.stage(), RegistrationStage::Idle);
    assert_eq!(reference.decodes(), 0);
}

#[test]
fn negative_limit_is_rejected_up_front() {
    let img = textured_image(64, 64, 2);
    let target = MemoryRaster::new("target.tif", img.clone());
    let reference = MemoryRaster::new("ref.tif", img).with_geotransform(Ok(scenario_gt()));
    let config = RegistrationConfig {
        limit: Some(-3),
        ..RegistrationConfig::default()
    };
    let err = coregister(&target, &reference, &config, &RecordingTranslator::default()).unwrap_err();
    assert!(matches!(err, RegistrationError::Features { stage: RegistrationStage::Idle, .. }));
    assert_eq!(target.decodes(), 0);
}

#[test]
fn featureless_raster_fails_extraction() {
    let flat = image::GrayImage::from_pixel(200, 200, image::Luma([77]));
    let target = MemoryRaster::new("target.tif", flat.clone());
    let reference = MemoryRaster::new("ref.tif", flat).with_geotransform(Ok(scenario_gt()));
    let err = coregister(&target, &reference, &RegistrationConfig::default(), &RecordingTranslator::default())
        .unwrap_err();
    assert_eq!(err.stage(), RegistrationStage::ExtractingFeatures);
}

#[test]
fn orb_registers_a_translated_crop() {
    let big = textured_image(300, 300, 9);
    let reference_img = crop(&big, 0, 0, 280, 280);
    let target_img = crop(&big, 12, 7, 280, 280);
    let gt = GeoTransform::north_up(500000.0, 4000000.0, 2.0).unwrap();

    let target = MemoryRaster::new("/scenes/target.png", target_img);
    let reference = MemoryRaster::new("/scenes/ref.png", reference_img).with_geotransform(Ok(gt));
    let mut config = RegistrationConfig::default();
    config.detectors.orb.pyramid_levels = 1;
    let translator = RecordingTranslator::default();

    let run = coregister(&target, &reference, &config, &translator).unwrap();
    assert_eq!(target.decodes(), 1);
    assert_eq!(reference.decodes(), 1);
    assert_eq!(run.report.outcome, Some(OutcomeKind::Registered));
    assert!(run.report.reference_keypoints > 0);
    assert!(run.report.target_keypoints > 0);

    let gcps = run.outcome.gcps();
    assert_eq!(gcps.len(), 10);
    let consistent = gcps
        .iter()
        .filter(|g| {
            let expected = gt.pixel_to_geo(g.target.x + 12.0, g.target.y + 7.0);
            (g.reference.lon() - expected.lon()).abs() < 3.0
                && (g.reference.lat() - expected.lat()).abs() < 3.0
        })
        .count();
    assert!(consistent >= 8, "{consistent}/10 GCPs consistent with the shift");

    let requests = translator.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].output, Path::new("/scenes/target_orb_registered.png"));
}

#[test]
fn dry_run_skips_the_translator_but_reports_arguments() {
    let big = textured_image(300, 300, 9);
    let target = MemoryRaster::new("target.tif", crop(&big, 12, 7, 280, 280));
    let reference = MemoryRaster::new("ref.tif", crop(&big, 0, 0, 280, 280))
        .with_geotransform(Ok(scenario_gt()));
    let mut config = RegistrationConfig {
        dry_run: true,
        parallel_extraction: false,
        ..RegistrationConfig::default()
    };
    config.detectors.orb.pyramid_levels = 1;
    let translator = RecordingTranslator::default();

    let run = coregister(&target, &reference, &config, &translator).unwrap();
    assert!(run.outcome.is_registered());
    assert_eq!(translator.calls(), 0);
    assert!(run.report.dry_run);
    assert_eq!(run.report.translate_args.first().map(String::as_str), Some("-of"));
    assert_eq!(run.report.gcps.len(), 10);
}

#[test]
fn translate_failure_is_an_external_invocation_error() {
    let (reference, target) = eight_mutual_matches();
    let config = RegistrationConfig::default();
    let translator = RecordingTranslator::failing();
    let registrar = Registrar::new(&config, &translator, scenario_gt(), None);

    let err = registrar
        .register_features(&reference, &target, Path::new("t.tif"), &mut report())
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::ExternalInvocation {
            stage: RegistrationStage::Registering,
            ..
        }
    ));
}
