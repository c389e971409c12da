use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use inquire::Password;
use tracing::info;
use weather_alerts_core::{
    Config, CycleOutcome, EvaluationRecord, EvaluationResult, InMemoryRuleStore, RuleEvaluator,
    Scheduler, SchedulerIntervals, Timestep, WeatherClient, WeatherSnapshot,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-alerts", version, about = "Threshold alerts over live weather data")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the Tomorrow.io API key in the config file.
    Configure,

    /// Show current conditions for a location.
    Current {
        /// Location name from the config table, or a "lat,lon" pair.
        location: String,
    },

    /// Print the raw forecast payload for a location.
    Forecast {
        location: String,

        /// Time granularity: 1m, 1h or 1d.
        #[arg(long, default_value = "1h")]
        timesteps: String,
    },

    /// Evaluate a single rule now.
    Evaluate {
        /// JSON file with an array of rules.
        #[arg(long)]
        rules: PathBuf,

        rule_id: String,
    },

    /// Evaluate all active rules on a fixed schedule until Ctrl-C.
    Run {
        /// JSON file with an array of rules.
        #[arg(long)]
        rules: PathBuf,

        /// Run a single cycle and exit.
        #[arg(long)]
        once: bool,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Current { location } => {
                let client = client()?;
                let snapshot = client.get_current_weather(&location).await?;
                print_snapshot(&location, &snapshot);
                Ok(())
            }
            Command::Forecast { location, timesteps } => {
                let timestep = Timestep::try_from(timesteps.as_str())?;
                let payload = client()?.get_forecast(&location, timestep).await?;
                println!("{}", serde_json::to_string_pretty(&payload)?);
                Ok(())
            }
            Command::Evaluate { rules, rule_id } => {
                let client = Arc::new(client()?);
                let store = Arc::new(InMemoryRuleStore::load_json(&rules)?);
                let evaluator = RuleEvaluator::new(client, store);

                let record = evaluator.evaluate_one(&rule_id).await?;
                print_record(&rule_id, &record);
                Ok(())
            }
            Command::Run { rules, once } => run(rules, once).await,
        }
    }
}

fn client() -> anyhow::Result<WeatherClient> {
    let config = Config::load()?;
    WeatherClient::from_config(&config)
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let api_key = Password::new("Tomorrow.io API key:")
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    config.set_api_key(api_key.trim().to_string());
    config.save()?;

    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

async fn run(rules: PathBuf, once: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let client = Arc::new(WeatherClient::from_config(&config)?);
    let store = Arc::new(InMemoryRuleStore::load_json(&rules)?);
    let evaluator = Arc::new(
        RuleEvaluator::new(client.clone(), store)
            .with_max_concurrent(config.scheduler.max_concurrent_evaluations),
    );

    if once {
        if let CycleOutcome::Completed(results) = evaluator.run_cycle().await? {
            results.iter().for_each(print_result);
        }
        print_limits(&client);
        return Ok(());
    }

    info!("Watching rules from {}, press Ctrl-C to stop", rules.display());
    let scheduler = Scheduler::start(evaluator, client.clone(), SchedulerIntervals::from(&config));

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    scheduler.shutdown().await;
    print_limits(&client);

    Ok(())
}

fn print_snapshot(location: &str, s: &WeatherSnapshot) {
    println!("Weather for {location} (observed {})", s.observed_at.format("%Y-%m-%d %H:%M UTC"));
    println!("  {} (code {})", s.weather_description, s.weather_code);
    println!("  Temperature:   {:.1}°C (feels like {:.1}°C)", s.temperature, s.feels_like);
    println!("  Humidity:      {:.0}%", s.humidity);
    println!("  Wind:          {:.1} m/s from {:.0}°", s.wind_speed, s.wind_direction);
    println!("  Precipitation: {:.1} mm/h", s.precipitation);
    println!("  Pressure:      {:.1} hPa", s.pressure);
    println!("  Visibility:    {:.1} km", s.visibility);
    println!("  UV index:      {:.0}", s.uv_index);
    println!("  Cloud cover:   {:.0}%", s.cloud_cover);
}

fn print_record(name: &str, record: &EvaluationRecord) {
    let state = if record.is_triggered { "TRIGGERED" } else { "ok" };
    println!(
        "{name}: {state} (observed {}, threshold {}) at {}",
        record.observed_value,
        record.threshold_value,
        record.timestamp.to_rfc3339()
    );
}

fn print_result(result: &EvaluationResult) {
    match &result.outcome {
        Ok(record) => print_record(&result.rule_name, record),
        Err(e) => println!("{}: could not evaluate: {e}", result.rule_name),
    }
}

fn print_limits(client: &WeatherClient) {
    let status = client.rate_limit_status();
    let reset = status
        .reset_time
        .map(|at| format!("{:?}", at.saturating_duration_since(tokio::time::Instant::now())))
        .unwrap_or_else(|| "no open window".to_string());

    println!(
        "Rate limit: {} request(s) remaining, resets in {reset}, can proceed: {}",
        status.remaining_requests, status.can_proceed
    );
}
