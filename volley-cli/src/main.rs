use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

use volley_config::{ConfigLoader, LogLevel, VolleyConfig};
use volley_core::{HttpGetTask, RunContext, RunSummary, Schedule, Threshold};
use volley_http::{HttpManager, MockResponse};
use volley_logging::{init_logging_from_config, init_simple_tracing};

mod cli;
use cli::{Cli, Commands, ConfigCommands};

/// Load configuration from file (if given) with environment overrides
fn load_config(config_path: Option<&PathBuf>) -> Result<VolleyConfig> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) => {
            info!("Loading configuration from: {:?}", path);
            loader
                .from_file(path)
                .with_context(|| format!("Failed to load configuration from {:?}", path))
        }
        None => {
            debug!("No configuration file specified. Loading from environment or defaults.");
            loader
                .from_env()
                .context("Failed to load configuration from environment")
        }
    }
}

/// Initialize logging from configuration with fallback to simple tracing
fn init_logging_with_config(config: &VolleyConfig, log_level: Option<&str>) -> Result<()> {
    // If CLI log level is provided, override config level
    let mut logging_config = config.logging.clone();
    if let Some(level_str) = log_level {
        match level_str.parse::<LogLevel>() {
            Ok(level) => logging_config.level = level,
            Err(_) => eprintln!(
                "Invalid log level '{}', using '{}' from configuration",
                level_str,
                logging_config.level.as_str()
            ),
        }
    }

    if let Err(e) = init_logging_from_config(&logging_config) {
        eprintln!(
            "Failed to initialize structured logging: {}, falling back to simple tracing",
            e
        );
        init_simple_tracing(logging_config.level.as_str())?;
    }

    Ok(())
}

struct RunOptions {
    url: Option<String>,
    offline: bool,
    mock_status: u16,
    mock_latency: Duration,
    summary_export: Option<PathBuf>,
}

async fn run_command(mut config: VolleyConfig, options: RunOptions) -> Result<RunSummary> {
    if let Some(url) = options.url {
        config.scenario.target_url = Some(url);
    }
    let target_url = config
        .target_url()
        .context("No target URL: pass --url, set VOLLEY_TARGET_URL or URL, or set scenario.target_url")?
        .to_string();

    let mut manager = HttpManager::with_config(config.http.clone().into())
        .context("Failed to build HTTP client")?;
    if options.offline {
        info!(
            "Offline mode: every request answers {} after {:?}",
            options.mock_status, options.mock_latency
        );
        manager.set_offline();
        manager.add_mock(
            target_url.clone(),
            MockResponse::status(options.mock_status).with_latency(options.mock_latency),
        );
    }

    let task = HttpGetTask::new(manager, target_url.clone());
    let context = RunContext::from_config(&config, task).context("Invalid run configuration")?;

    info!(
        "Run {} against {} for {:?}",
        context.run_id(),
        target_url,
        context.schedule().total_duration()
    );
    let _ctrl_c = context.shutdown_handle().spawn_ctrl_c_handler();

    let summary = context.run().await;
    summary.log();
    print_summary(&summary);

    if let Some(path) = options.summary_export.as_deref() {
        export_summary(&summary, path)?;
        println!("📝 Summary written to {:?}", path);
    }

    Ok(summary)
}

fn print_summary(summary: &RunSummary) {
    let iterations = &summary.iterations;
    let latency = &summary.latency;

    println!();
    println!(
        "iterations.........: {} ({:.1}/s)",
        iterations.success + iterations.failed,
        iterations.rate
    );
    println!(
        "http_req_failed....: {:.2}% ({} of {})",
        iterations.failed_rate * 100.0,
        iterations.failed,
        iterations.total
    );
    println!(
        "http_req_duration..: avg={:.2}ms min={:.2}ms med={:.2}ms max={:.2}ms p(90)={:.2}ms p(95)={:.2}ms",
        latency.avg_ms, latency.min_ms, latency.p50_ms, latency.max_ms, latency.p90_ms, latency.p95_ms
    );
    println!("dropped_iterations.: {}", iterations.dropped);
    if iterations.interrupted > 0 {
        println!("interrupted........: {}", iterations.interrupted);
    }
    println!(
        "workers............: peak {} busy, {} created (max {})",
        summary.workers.peak_busy, summary.workers.created, summary.workers.max
    );
    println!();

    for result in &summary.verdict.results {
        let mark = if result.passed { "✅" } else { "❌" };
        println!(
            "{} {}: {} (actual {:.4})",
            mark, result.metric, result.expression, result.actual
        );
    }
    if summary.passed {
        println!("✅ All thresholds passed");
    } else {
        println!(
            "❌ {} threshold(s) crossed",
            summary.verdict.violations().count()
        );
    }
}

fn export_summary(summary: &RunSummary, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create summary directory")?;
    }
    fs::write(path, json).with_context(|| format!("Failed to write summary to {:?}", path))
}

/// Handle configuration validation
fn handle_validate(config_file: Option<&PathBuf>) -> Result<()> {
    let config_file = config_file.context("validate needs --config PATH")?;
    info!("Validating configuration file: {:?}", config_file);

    let result = load_config(Some(config_file)).and_then(|config| {
        let schedule = Schedule::try_from(&config.scenario)?;
        let thresholds = Threshold::from_config(&config.thresholds)?;
        Ok((schedule, thresholds))
    });

    match result {
        Ok((schedule, thresholds)) => {
            println!("✅ Configuration file is valid");
            println!(
                "   {} stage(s) over {:?}, ~{:.0} arrivals, peak {:.0}/s, up to {} workers",
                schedule.stages().len(),
                schedule.total_duration(),
                schedule.expected_arrivals(),
                schedule.peak_rate(),
                schedule.max_concurrent()
            );
            for threshold in &thresholds {
                println!("   threshold {}", threshold);
            }
            info!("Configuration validation passed");
            Ok(())
        }
        Err(e) => {
            println!("❌ Configuration validation failed: {:#}", e);
            error!("Configuration validation failed: {:#}", e);
            Err(e)
        }
    }
}

/// Handle configuration generation
fn handle_config_generate(output: Option<&PathBuf>, force: bool) -> Result<()> {
    let sample = VolleyConfig::generate_sample();

    let Some(output) = output else {
        print!("{}", sample);
        return Ok(());
    };

    if output.exists() && !force {
        return Err(anyhow::anyhow!(
            "Output file already exists: {:?}. Use --force to overwrite.",
            output
        ));
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    fs::write(output, sample).context("Failed to write configuration file")?;

    println!("✅ Sample configuration generated at: {:?}", output);
    println!("🔧 Validate with: volley validate --config {:?}", output);
    Ok(())
}

fn handle_config_show(config: &VolleyConfig) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to render configuration")?;
    print!("{}", yaml);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Sample generation must work without any configuration present
    if let Commands::Config {
        config_cmd: ConfigCommands::Generate { output, force },
    } = &cli.command
    {
        return handle_config_generate(output.as_ref(), *force);
    }

    // Load configuration first
    let config = load_config(cli.config.as_ref())?;
    init_logging_with_config(&config, cli.log_level.as_deref())?;
    debug!("Volley CLI starting");

    match cli.command {
        Commands::Run {
            url,
            offline,
            mock_status,
            mock_latency_ms,
            summary_export,
        } => {
            let options = RunOptions {
                url,
                offline,
                mock_status,
                mock_latency: Duration::from_millis(mock_latency_ms),
                summary_export,
            };
            let summary = run_command(config, options).await?;
            if !summary.passed {
                std::process::exit(summary.exit_code());
            }
        }
        Commands::Validate => handle_validate(cli.config.as_ref())?,
        Commands::Config { config_cmd } => match config_cmd {
            ConfigCommands::Show => handle_config_show(&config)?,
            ConfigCommands::Generate { .. } => {}
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volley.yaml");

        handle_config_generate(Some(&path), false).unwrap();
        assert!(handle_config_generate(Some(&path), false).is_err());
        handle_config_generate(Some(&path), true).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("max_workers"));
    }

    #[test]
    fn test_validate_generated_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volley.yaml");
        handle_config_generate(Some(&path), false).unwrap();

        handle_validate(Some(&path)).unwrap();
    }

    #[test]
    fn test_validate_reports_bad_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(
            &path,
            "scenario:\n  duration: 1s\nthresholds:\n  http_req_failed: \"rate<<0.01\"\n",
        )
        .unwrap();

        let err = handle_validate(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("rate<<0.01"));
        assert!(handle_validate(None).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_run_exports_summary() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("reports/summary.json");

        let mut config = VolleyConfig::default();
        config.scenario.start_rate = 20.0;
        config.scenario.duration = Some(Duration::from_secs(1));
        config.thresholds.insert("http_req_failed", "rate<0.01");

        let options = RunOptions {
            url: Some("http://target.test/".to_string()),
            offline: true,
            mock_status: 503,
            mock_latency: Duration::from_millis(5),
            summary_export: Some(export.clone()),
        };
        let summary = run_command(config, options).await.unwrap();

        assert!(!summary.passed);
        assert_eq!(summary.iterations.total, 20);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&export).unwrap()).unwrap();
        assert_eq!(json["passed"], false);
        assert_eq!(json["iterations"]["failed"], 20);
    }

    #[tokio::test]
    async fn test_run_without_target_url_fails() {
        let config = VolleyConfig::default();
        let options = RunOptions {
            url: None,
            offline: true,
            mock_status: 200,
            mock_latency: Duration::ZERO,
            summary_export: None,
        };
        let err = run_command(config, options).await.unwrap_err();
        assert!(err.to_string().contains("No target URL"));
    }
}
