use std::process::ExitCode;

use practice_sim::analysis::{lineup, standard_contenders, Report};
use practice_sim::config::RunConfig;
use practice_sim::logging::init_tracing;
use practice_sim::scenario::load_scenario;

/// Bumped whenever simulation semantics change, so old caches stop matching.
const SCENARIO_VERSION: u32 = 1;

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let config = match RunConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = init_tracing(&config.log_level);

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "simulation run failed");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &RunConfig) -> practice_sim::Result<()> {
    let mut scenario = load_scenario(&config.settings, &config.scenario, SCENARIO_VERSION)?;
    tracing::info!(
        scenario = %scenario.name(),
        hash = %scenario.config_hash(),
        skip_cache = config.skip_cache,
        "scenario ready"
    );
    let artifacts = scenario.filename(&config.destination);
    if !config.skip_cache {
        scenario.load(&config.destination)?;
    }

    let contenders = standard_contenders(&scenario);
    let entries = lineup(&mut scenario, &contenders)?;
    let report = Report::build(&mut scenario, &entries, |group| config.runs_group(group))?;
    report.write(artifacts.join("report.json"))?;

    if !config.skip_cache {
        scenario.save_simulators()?;
        scenario.save(&config.destination, false)?;
    }

    for summary in &report.simulators {
        tracing::info!(
            name = %summary.name,
            rmse = summary.rmse,
            jaccard = summary.jaccard.mean,
            intersection = summary.intersection.mean,
            "simulator summary"
        );
    }
    Ok(())
}
