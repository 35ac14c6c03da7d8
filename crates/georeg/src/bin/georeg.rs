use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use georeg::{
    coregister_with_report, FeatureAlgorithm, GeoTiffRaster, GeoregError, RegistrationConfig,
    RegistrationOutcome, RegistrationReport,
};

/// Co-register a raster to a georeferenced reference raster.
#[derive(Parser, Debug)]
#[command(name = "georeg", version, about)]
struct Cli {
    /// Raster to register.
    target: PathBuf,
    /// Georeferenced reference raster.
    reference: PathBuf,
    /// Feature algorithm: orb or sift.
    #[arg(long)]
    algorithm: Option<FeatureAlgorithm>,
    /// Number of top-ranked matches to use (0 uses all) [default: 10].
    #[arg(long, allow_negative_numbers = true)]
    limit: Option<i64>,
    /// GeoJSON polygons restricting where GCPs may lie.
    #[arg(long)]
    aoi: Option<PathBuf>,
    /// Write the GCPs as GeoJSON to this path.
    #[arg(long)]
    gcps: Option<PathBuf>,
    /// JSON config file; command-line flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write a JSON run report to this path.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Run everything except the translate process.
    #[arg(long)]
    dry_run: bool,
    /// Program used for the translate step [default: gdal_translate].
    #[arg(long)]
    translate_program: Option<PathBuf>,
    /// Kill the translate step after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Reference geotransform override, e.g. "(500000, 1, 0, 4000000, 0, -1)".
    #[arg(long, allow_hyphen_values = true)]
    geotransform: Option<String>,
    /// More log output (repeatable).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Less log output (repeatable).
    #[arg(short, long, action = ArgAction::Count)]
    quiet: u8,
}

impl Cli {
    fn build_config(&self) -> Result<RegistrationConfig, GeoregError> {
        let mut config = match &self.config {
            Some(path) => RegistrationConfig::load_json(path)?,
            None => RegistrationConfig::default(),
        };
        if let Some(algorithm) = self.algorithm {
            config.algorithm = algorithm;
        }
        if let Some(limit) = self.limit {
            config.limit = Some(limit);
        }
        if let Some(aoi) = &self.aoi {
            config.aoi_path = Some(aoi.clone());
        }
        if let Some(gcps) = &self.gcps {
            config.gcp_path = Some(gcps.clone());
        }
        if self.dry_run {
            config.dry_run = true;
        }
        if let Some(program) = &self.translate_program {
            config.translate_program = program.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout_secs = Some(secs);
        }
        if let Some(gt) = &self.geotransform {
            config.reference_geotransform = Some(gt.clone());
        }
        Ok(config)
    }
}

fn init_logging(cli: &Cli) {
    let level = georeg::core::level_from_verbosity(cli.verbose, cli.quiet);
    #[cfg(feature = "tracing")]
    {
        let _ = tracing_log::LogTracer::init();
        georeg::core::init_tracing(false, level);
    }
    #[cfg(not(feature = "tracing"))]
    {
        if let Err(e) = georeg::core::init_with_level(level) {
            eprintln!("georeg: cannot install logger: {e}");
        }
    }
}

fn run(cli: &Cli) -> Result<RegistrationOutcome, GeoregError> {
    let config = cli.build_config()?;
    let mut report = RegistrationReport::new(&cli.target, &cli.reference, config.algorithm);

    let result = GeoTiffRaster::open(&cli.target)
        .and_then(|target| Ok((target, GeoTiffRaster::open(&cli.reference)?)))
        .map_err(GeoregError::from)
        .and_then(|(target, reference)| {
            let translator = config.translator();
            coregister_with_report(&target, &reference, &config, &translator, &mut report)
                .map_err(GeoregError::from)
        });
    if let Err(e) = &result {
        if report.outcome.is_none() {
            report.record_error(e);
        }
    }

    if let Some(path) = &cli.report {
        report.write_json(path)?;
        log::info!("report written to {}", path.display());
    }
    result
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // help and version go to stdout and are not failures
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_logging(&cli);

    match run(&cli) {
        Ok(RegistrationOutcome::Registered { output, gcps }) => {
            log::info!("registered with {} GCPs: {}", gcps.len(), output.display());
            ExitCode::SUCCESS
        }
        Ok(RegistrationOutcome::Aborted { gcps, required }) => {
            log::warn!(
                "not enough GCPs ({} of {required} required); no output written",
                gcps.len()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("georeg: {e}");
            ExitCode::FAILURE
        }
    }
}
