//! `motorpool`: run synthetic studies and specimen analyses from the shell.
//!
//! ```bash
//! motorpool simulate --iterations 20 --sample 13
//! motorpool analyse --signals gw65_purple.json --specimen gw65 --json
//! motorpool analyse --signals gw65_e1.json --signals gw65_e2.json --specimen gw65
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use motorpool_core::{
    AnalysisConfig, AnalysisError, Driver, MotorPool, OptimizerConfig, RecordingFile, Result,
    RunReport, SpecimenRecordings, SpecimenTrial, SyntheticTrials, ThresholdOptimizer, TrialSource,
};

#[derive(Parser)]
#[command(name = "motorpool", version)]
#[command(about = "Recover motor units from fibre activity traces", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "MOTORPOOL_CONFIG")]
    config: Option<PathBuf>,

    /// Print the full report as JSON instead of a summary
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sample a synthetic motor pool repeatedly and optimise each sample
    Simulate {
        /// Number of samples (overrides `study.iterations`)
        #[arg(long)]
        iterations: Option<usize>,
        /// Units per sample (overrides `study.sample_size`)
        #[arg(long)]
        sample: Option<usize>,
    },
    /// Filter specimen recordings and compare each against the annotation
    Analyse {
        /// JSON recording file, one per electrode; repeat for several
        #[arg(long, value_name = "FILE", required = true)]
        signals: Vec<PathBuf>,
        /// Specimen id (built-in: gw65, gw64, gw55, 7391)
        #[arg(long)]
        specimen: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::from_path(path)?,
        None => AnalysisConfig::default(),
    };

    let optimizer_config = config.optimizer_config()?;
    let mut unannotated = Vec::new();
    let report = match &cli.command {
        Command::Simulate { iterations, sample } => {
            if let Some(n) = iterations {
                config.study.iterations = *n;
            }
            if let Some(k) = sample {
                config.study.sample_size = *k;
            }
            config.validate()?;
            let pool = MotorPool::generate(config.pool.clone())?;
            info!(
                units = pool.units().len(),
                fibres = pool.fibre_count(),
                sample = config.study.sample_size,
                iterations = config.study.iterations,
                "simulating"
            );
            let trials =
                SyntheticTrials::new(&pool, config.study.sample_size, config.study.iterations);
            run_study(&optimizer_config, &trials)?
        }
        Command::Analyse { signals, specimen } => {
            let specimen_config = config
                .specimen(specimen)
                .ok_or_else(|| AnalysisError::config(format!("unknown specimen '{specimen}'")))?;
            let mut recordings = Vec::with_capacity(signals.len());
            for path in signals {
                let mut recording = RecordingFile::from_path(path)?.into_recording()?;
                if recording.electrode.is_none() && signals.len() > 1 {
                    recording.electrode =
                        path.file_stem().map(|stem| stem.to_string_lossy().into_owned());
                }
                let trial = SpecimenTrial::new(specimen_config.clone(), recording.clone());
                let fibres = trial.unannotated_fibres()?;
                info!(
                    trial = %trial.label(),
                    fibres = recording.signals.len(),
                    unannotated = fibres.len(),
                    "analysing"
                );
                unannotated.push((trial.label(), fibres));
                recordings.push(recording);
            }
            run_study(&optimizer_config, &SpecimenRecordings::new(specimen_config, recordings)?)?
        }
    };

    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        print_summary(&report);
        print_unannotated(&unannotated);
    }
    Ok(())
}

fn run_study(config: &OptimizerConfig, source: &impl TrialSource) -> Result<RunReport> {
    let driver = Driver::new(ThresholdOptimizer::new(config.clone())?);
    let study = driver.run(source)?;
    Ok(RunReport::from_study(&study, config))
}

fn print_summary(report: &RunReport) {
    println!(
        "{:<16} {:>10} {:>10} {:>6} {:>6} {:>9}",
        "trial", report.parameter, "score", "found", "ref", "agreement"
    );
    for t in &report.trials {
        let score = t.score.map_or_else(|| "-".to_string(), |s| format!("{s:.4}"));
        let agreement = t.agreement.map_or_else(|| "-".to_string(), |a| format!("{a:.3}"));
        println!(
            "{:<16} {:>10.4} {:>10} {:>6} {:>6} {:>9}",
            t.label, t.optimal_parameter, score, t.community_count, t.reference_count, agreement
        );
    }
    let s = &report.summary;
    println!();
    println!("trials:            {}", s.trials);
    println!("optimum:           {:.4} ± {:.4}", s.mean_parameter, s.std_parameter);
    println!("found / expected:  {:.3} ± {:.3}", s.mean_count_ratio, s.std_count_ratio);
    if let Some(a) = s.mean_agreement {
        println!("mean agreement:    {a:.3}");
    }
    if let [single] = report.trials.as_slice() {
        println!();
        for unit in &single.units {
            println!("unit {:>3}: {:?}", unit.id, unit.members);
        }
    }
}

fn print_unannotated(unannotated: &[(String, Vec<usize>)]) {
    for (label, fibres) in unannotated.iter().filter(|(_, fibres)| !fibres.is_empty()) {
        println!();
        println!("{label}: {} fibres outside the annotation: {fibres:?}", fibres.len());
    }
}
