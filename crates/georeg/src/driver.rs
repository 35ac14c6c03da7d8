//! The registration run: validate, extract, match, filter, decide, warp.

use std::path::{Path, PathBuf};
use std::time::Instant;

use georeg_core::{Gcp, GeoTransform};
use georeg_features::{
    extract, match_descriptors, select_correspondences, Descriptor, FeatureAlgorithm,
    FeatureDetector, FeatureError, Features, OrbDetector, Side, SiftDetector,
};

use crate::{
    filter_correspondences, load_polygons, registered_output_path, AreaOfInterest, GcpSet,
    RasterError, RasterSource, RegistrationConfig, RegistrationError, RegistrationReport,
    RegistrationStage, TranslateRequest, Translator, MIN_GCPS,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// How a run that did not fail ended.
#[derive(Clone, Debug, PartialEq)]
pub enum RegistrationOutcome {
    /// The translate step ran (or would have, in dry-run mode) and wrote `output`.
    Registered { output: PathBuf, gcps: Vec<Gcp> },
    /// Too few GCPs survived filtering; nothing was warped.
    Aborted { gcps: Vec<Gcp>, required: usize },
}

impl RegistrationOutcome {
    pub fn gcps(&self) -> &[Gcp] {
        match self {
            RegistrationOutcome::Registered { gcps, .. } | RegistrationOutcome::Aborted { gcps, .. } => {
                gcps
            }
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(self, RegistrationOutcome::Registered { .. })
    }
}

/// Outcome together with the run report.
#[derive(Clone, Debug)]
pub struct Registration {
    pub outcome: RegistrationOutcome,
    pub report: RegistrationReport,
}

#[inline]
fn enter(stage: RegistrationStage) {
    log::info!("stage: {stage}");
}

#[inline]
fn ms_since(t: Instant) -> f64 {
    t.elapsed().as_secs_f64() * 1e3
}

/// Co-register `target` onto `reference`.
pub fn coregister<R1, R2, T>(
    target: &R1,
    reference: &R2,
    config: &RegistrationConfig,
    translator: &T,
) -> Result<Registration, RegistrationError>
where
    R1: RasterSource + ?Sized,
    R2: RasterSource + ?Sized,
    T: Translator + ?Sized,
{
    let mut report = RegistrationReport::new(target.path(), reference.path(), config.algorithm);
    let outcome = coregister_with_report(target, reference, config, translator, &mut report)?;
    Ok(Registration { outcome, report })
}

/// Like [`coregister`], filling a caller-owned report so it survives failures.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip_all,
        fields(target = %target.path().display(), reference = %reference.path().display(), algorithm = %config.algorithm)
    )
)]
pub fn coregister_with_report<R1, R2, T>(
    target: &R1,
    reference: &R2,
    config: &RegistrationConfig,
    translator: &T,
    report: &mut RegistrationReport,
) -> Result<RegistrationOutcome, RegistrationError>
where
    R1: RasterSource + ?Sized,
    R2: RasterSource + ?Sized,
    T: Translator + ?Sized,
{
    let started = Instant::now();
    report.dry_run = config.dry_run;

    let result = run(target, reference, config, translator, report);
    report.timings.total_ms = ms_since(started);
    match &result {
        Ok(outcome) => report.record_outcome(outcome),
        Err(e) => report.record_error(e),
    }
    log::info!(
        "co-registration finished in {:.2}s",
        started.elapsed().as_secs_f64()
    );
    result
}

fn run<R1, R2, T>(
    target: &R1,
    reference: &R2,
    config: &RegistrationConfig,
    translator: &T,
    report: &mut RegistrationReport,
) -> Result<RegistrationOutcome, RegistrationError>
where
    R1: RasterSource + ?Sized,
    R2: RasterSource + ?Sized,
    T: Translator + ?Sized,
{
    enter(RegistrationStage::Idle);
    let geotransform = reference_geotransform(reference, config)?;
    report.reference_geotransform = Some(geotransform.coefficients());
    georeg_features::keypoint_limit(config.limit).map_err(|source| {
        RegistrationError::Features {
            stage: RegistrationStage::Idle,
            input: "keypoint limit".to_string(),
            source,
        }
    })?;
    let aoi = config
        .aoi_path
        .as_ref()
        .map(load_polygons)
        .transpose()
        .map_err(|source| RegistrationError::Aoi {
            stage: RegistrationStage::Idle,
            source,
        })?;

    let registrar = Registrar::new(config, translator, geotransform, aoi);
    match config.algorithm {
        FeatureAlgorithm::Orb => {
            let detector = OrbDetector::new(config.detectors.orb.clone());
            registrar.extract_and_register(&detector, target, reference, report)
        }
        FeatureAlgorithm::Sift => {
            log::warn!("SIFT is memory-intensive; large rasters can need several GB of RAM");
            let detector = SiftDetector::new(config.detectors.sift.clone());
            registrar.extract_and_register(&detector, target, reference, report)
        }
    }
}

fn reference_geotransform<R: RasterSource + ?Sized>(
    reference: &R,
    config: &RegistrationConfig,
) -> Result<GeoTransform, RegistrationError> {
    let stage = RegistrationStage::Idle;
    if let Some(parsed) = config.geotransform_override() {
        return parsed.map_err(|source| RegistrationError::InvalidGeotransform {
            stage,
            input: "configured reference geotransform".to_string(),
            source,
        });
    }
    let input = format!("reference raster {}", reference.path().display());
    reference.geotransform().map_err(|e| match e {
        RasterError::Geotransform { source, .. } => RegistrationError::InvalidGeotransform {
            stage,
            input,
            source,
        },
        other => RegistrationError::Raster {
            stage,
            input,
            source: other,
        },
    })
}

fn extract_from<F, R>(
    detector: &F,
    raster: &R,
    side: Side,
) -> Result<Features<F::Descriptor>, RegistrationError>
where
    F: FeatureDetector + ?Sized,
    R: RasterSource + ?Sized,
{
    let stage = RegistrationStage::ExtractingFeatures;
    let input = || format!("{side} raster {}", raster.path().display());
    let image = raster
        .decode_gray()
        .map_err(|source| RegistrationError::Raster {
            stage,
            input: input(),
            source,
        })?;
    let features = extract(detector, &image).map_err(|source| RegistrationError::Features {
        stage,
        input: input(),
        source,
    })?;
    drop(image);
    log::info!(
        "{side}: {} {} keypoints in {}",
        features.len(),
        detector.name(),
        raster.path().display()
    );
    Ok(features)
}

fn features_err(
    stage: RegistrationStage,
    input: &'static str,
) -> impl FnOnce(FeatureError) -> RegistrationError {
    move |source| RegistrationError::Features {
        stage,
        input: input.to_string(),
        source,
    }
}

/// Everything after validation: owns the resolved inputs of one run.
pub struct Registrar<'a, T: Translator + ?Sized> {
    config: &'a RegistrationConfig,
    translator: &'a T,
    geotransform: GeoTransform,
    aoi: Option<AreaOfInterest>,
}

impl<'a, T: Translator + ?Sized> Registrar<'a, T> {
    pub fn new(
        config: &'a RegistrationConfig,
        translator: &'a T,
        geotransform: GeoTransform,
        aoi: Option<AreaOfInterest>,
    ) -> Self {
        Self {
            config,
            translator,
            geotransform,
            aoi,
        }
    }

    fn extract_and_register<F, R1, R2>(
        &self,
        detector: &F,
        target: &R1,
        reference: &R2,
        report: &mut RegistrationReport,
    ) -> Result<RegistrationOutcome, RegistrationError>
    where
        F: FeatureDetector,
        R1: RasterSource + ?Sized,
        R2: RasterSource + ?Sized,
    {
        enter(RegistrationStage::ExtractingFeatures);
        let t = Instant::now();
        let (reference_features, target_features) = if self.config.parallel_extraction {
            rayon::join(
                || extract_from(detector, reference, Side::Reference),
                || extract_from(detector, target, Side::Target),
            )
        } else {
            (
                extract_from(detector, reference, Side::Reference),
                extract_from(detector, target, Side::Target),
            )
        };
        let (reference_features, target_features) = (reference_features?, target_features?);
        report.timings.extract_ms = ms_since(t);
        report.reference_keypoints = reference_features.len();
        report.target_keypoints = target_features.len();

        self.register_features(&reference_features, &target_features, target.path(), report)
    }

    /// Run matching through warping on already extracted features.
    pub fn register_features<D: Descriptor>(
        &self,
        reference: &Features<D>,
        target: &Features<D>,
        target_path: &Path,
        report: &mut RegistrationReport,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        enter(RegistrationStage::Matching);
        let t = Instant::now();
        let matches = match_descriptors(reference.descriptors(), target.descriptors())
            .map_err(features_err(RegistrationStage::Matching, "descriptor sets"))?;
        log::info!("{} cross-checked matches ({})", matches.len(), D::METRIC);
        let selected = select_correspondences(
            &matches,
            reference.keypoints(),
            target.keypoints(),
            self.config.limit,
        )
        .map_err(features_err(RegistrationStage::Matching, "match selection"))?;
        report.matches = matches.len();
        report.selected = selected.len();
        report.timings.match_ms = ms_since(t);

        enter(RegistrationStage::Filtering);
        let t = Instant::now();
        let accepted = filter_correspondences(
            &selected.reference,
            &selected.target,
            &self.geotransform,
            self.aoi.as_ref(),
        )
        .map_err(features_err(RegistrationStage::Filtering, "selected correspondences"))?;
        report.accepted = accepted.len();
        log::info!("{}/{} correspondences accepted", accepted.len(), selected.len());
        let gcps = GcpSet::assemble(accepted);
        if let Some(path) = &self.config.gcp_path {
            gcps.write_geojson(path)
                .map_err(|source| RegistrationError::GcpWrite {
                    stage: RegistrationStage::Filtering,
                    source,
                })?;
        }
        report.timings.filter_ms = ms_since(t);

        enter(RegistrationStage::DecidingSufficiency);
        if !gcps.is_sufficient() {
            enter(RegistrationStage::Aborted);
            log::warn!(
                "only {} GCPs found, at least {MIN_GCPS} are needed; {} is left unregistered",
                gcps.len(),
                target_path.display()
            );
            return Ok(RegistrationOutcome::Aborted {
                gcps: gcps.into_vec(),
                required: MIN_GCPS,
            });
        }

        enter(RegistrationStage::Registering);
        let t = Instant::now();
        let output = registered_output_path(target_path, self.config.algorithm);
        let request = TranslateRequest::new(target_path, &output, gcps.as_slice());
        report.translate_args = request.args();
        if self.config.dry_run {
            log::info!("dry run: skipping translate to {}", output.display());
        } else {
            self.translator
                .translate(&request)
                .map_err(|source| RegistrationError::ExternalInvocation {
                    stage: RegistrationStage::Registering,
                    input: target_path.display().to_string(),
                    source,
                })?;
            log::info!("registered raster written to {}", output.display());
        }
        report.timings.translate_ms = ms_since(t);

        Ok(RegistrationOutcome::Registered {
            output,
            gcps: gcps.into_vec(),
        })
    }
}
