use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use keyforge::{Backoff, JsonRecord, KeyforgeConfig, RetrySettings, TimeUnit};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "keyforge-tool")]
#[command(about = "Developer tooling for keyforge key strategies and retry plans")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Key a JSON array of records with a configured strategy.
    Key {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        entity: String,
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Build a generator for every configured strategy.
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
    /// Print the sleep schedule of a retry plan.
    Backoff {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        attempts: Option<u32>,
        #[arg(long)]
        base: Option<u64>,
        #[arg(long, value_enum)]
        unit: Option<UnitArg>,
        #[arg(long, value_enum)]
        strategy: Option<BackoffArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum UnitArg {
    Ns,
    Us,
    Ms,
    S,
    Min,
    H,
}

impl From<UnitArg> for TimeUnit {
    fn from(unit: UnitArg) -> Self {
        match unit {
            UnitArg::Ns => TimeUnit::Nanoseconds,
            UnitArg::Us => TimeUnit::Microseconds,
            UnitArg::Ms => TimeUnit::Milliseconds,
            UnitArg::S => TimeUnit::Seconds,
            UnitArg::Min => TimeUnit::Minutes,
            UnitArg::H => TimeUnit::Hours,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum BackoffArg {
    Fixed,
    Linear,
    Exponential,
}

impl From<BackoffArg> for Backoff {
    fn from(backoff: BackoffArg) -> Self {
        match backoff {
            BackoffArg::Fixed => Backoff::Fixed,
            BackoffArg::Linear => Backoff::Linear,
            BackoffArg::Exponential => Backoff::Exponential,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Key {
            config,
            entity,
            input,
            out,
        } => key_records(&config, &entity, &input, out.as_deref()),
        Command::Validate { config } => validate(&config),
        Command::Backoff {
            config,
            attempts,
            base,
            unit,
            strategy,
        } => {
            let mut settings = match config {
                Some(path) => load_config(&path)?.retry,
                None => RetrySettings::default(),
            };
            if let Some(attempts) = attempts {
                settings = settings.max_attempts(attempts);
            }
            if let Some(base) = base {
                settings = settings.base_delay(base);
            }
            if let Some(unit) = unit {
                settings = settings.unit(unit.into());
            }
            if let Some(strategy) = strategy {
                settings = settings.backoff(strategy.into());
            }
            print_backoff(&settings)
        }
    }
}

fn load_config(path: &Path) -> Result<KeyforgeConfig> {
    KeyforgeConfig::load(path)
        .with_context(|| format!("Failed to load config '{}'", path.display()))
}

/// Schedule lines printed before the listing is elided.
const MAX_SCHEDULE_LINES: usize = 32;

struct KeyedRecords {
    keyed: usize,
    total: usize,
    rendered: String,
}

fn key_records(config: &Path, entity: &str, input: &Path, out: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let raw = fs::read_to_string(input)
        .with_context(|| format!("Failed to read records from '{}'", input.display()))?;
    let output = key_json(&config, entity, &raw)
        .with_context(|| format!("Failed to key records from '{}'", input.display()))?;

    match out {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create parent directory '{}'", parent.display())
                })?;
            }
            fs::write(path, &output.rendered)
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
            println!(
                "Keyed {} of {} record(s) into {}",
                output.keyed,
                output.total,
                path.display()
            );
        }
        None => println!("{}", output.rendered),
    }
    Ok(())
}

fn key_json(config: &KeyforgeConfig, entity: &str, raw: &str) -> Result<KeyedRecords> {
    let strategy = config.strategy(entity)?;
    let generator = JsonRecord::generator(entity, strategy)?;
    let mut records: Vec<JsonRecord> =
        serde_json::from_str(raw).context("Input must contain a JSON array of objects")?;

    let mut keyed = 0;
    for record in &mut records {
        if generator.assign(record) {
            keyed += 1;
        }
    }

    Ok(KeyedRecords {
        keyed,
        total: records.len(),
        rendered: serde_json::to_string_pretty(&records)?,
    })
}

fn validate(config: &Path) -> Result<()> {
    let config = load_config(config)?;
    let (report, failures) = validation_report(&config)?;
    print!("{report}");
    if failures > 0 {
        return Err(anyhow!(
            "{failures} invalid key strateg{}",
            if failures == 1 { "y" } else { "ies" }
        ));
    }
    Ok(())
}

/// One line per configured strategy, plus the number that failed to build.
fn validation_report(config: &KeyforgeConfig) -> Result<(String, usize)> {
    if config.strategies.is_empty() {
        return Err(anyhow!("No key strategies configured"));
    }

    let mut report = String::new();
    let mut failures = 0;
    for (entity, strategy) in &config.strategies {
        let line = match JsonRecord::generator(entity, strategy) {
            Ok(generator) => format!(
                "{entity}: ok ({} component(s), {})",
                generator.components().len(),
                if generator.is_deterministic() {
                    "deterministic"
                } else {
                    "non-deterministic"
                }
            ),
            Err(err) => {
                failures += 1;
                format!("{entity}: {err}")
            }
        };
        report.push_str(&line);
        report.push('\n');
    }
    Ok((report, failures))
}

fn print_backoff(settings: &RetrySettings) -> Result<()> {
    print!("{}", render_backoff(settings)?);
    Ok(())
}

fn render_backoff(settings: &RetrySettings) -> Result<String> {
    let plan = settings.stages().matching(|_: &anyhow::Error| true).build()?;
    let unit = plan.unit();
    let mut text = format!(
        "{} attempt(s), base {} {unit}, {} backoff\n",
        plan.max_attempts(),
        plan.base_delay(),
        settings.backoff
    );

    let retries = plan.max_attempts().saturating_sub(1) as usize;
    for (step, delay) in plan.backoff_steps().take(MAX_SCHEDULE_LINES).enumerate() {
        text.push_str(&format!("  after attempt {}: sleep {delay} {unit}\n", step + 1));
    }
    if retries > MAX_SCHEDULE_LINES {
        text.push_str(&format!("  ... {} more\n", retries - MAX_SCHEDULE_LINES));
    }
    text.push_str(&format!("  total: {:?}\n", plan.total_backoff()));
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CONFIG: &str = r#"{
        "strategies": {
            "person": { "segments": ["property", "property"], "properties": ["last", "first"], "separator": "," },
            "event": { "segments": ["inverse_time"] }
        }
    }"#;

    fn config() -> KeyforgeConfig {
        KeyforgeConfig::from_json_str(CONFIG).unwrap()
    }

    #[test]
    fn key_assigns_ids_only_to_unkeyed_records() {
        let output = key_json(
            &config(),
            "person",
            r#"[{ "last": "Cooper", "first": "Robert" }, { "id": "kept", "last": "Lovelace" }]"#,
        )
        .unwrap();
        assert_eq!(output.keyed, 1);
        assert_eq!(output.total, 2);

        let records: Vec<JsonRecord> = serde_json::from_str(&output.rendered).unwrap();
        assert_eq!(records[0].id.as_deref(), Some("Cooper,Robert"));
        assert_eq!(records[1].id.as_deref(), Some("kept"));
    }

    #[test]
    fn key_writes_the_output_file() {
        let mut config_file = NamedTempFile::new().unwrap();
        config_file.write_all(CONFIG.as_bytes()).unwrap();
        let mut input = NamedTempFile::new().unwrap();
        input.write_all(br#"[{ "last": "Hopper", "first": "Grace" }]"#).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("keyed.json");

        key_records(config_file.path(), "person", input.path(), Some(&out)).unwrap();

        let records: Vec<JsonRecord> =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(records[0].id.as_deref(), Some("Hopper,Grace"));
    }

    #[test]
    fn key_rejects_unknown_entities_and_bad_input() {
        assert!(key_json(&config(), "missing", "[]").is_err());
        assert!(key_json(&config(), "person", "{}").is_err());
    }

    #[test]
    fn validate_reports_a_lone_inverse_time_strategy() {
        let (report, failures) = validation_report(&config()).unwrap();
        assert_eq!(failures, 1);
        assert!(report.contains("person: ok (2 component(s), deterministic)"));
        assert!(report.contains("event: Configuration error"));

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        assert!(validate(file.path()).is_err());
    }

    #[test]
    fn backoff_prints_the_exponential_schedule() {
        let text = render_backoff(&RetrySettings::default()).unwrap();
        assert!(text.starts_with("3 attempt(s), base 250 ms, exponential backoff\n"));
        assert!(text.contains("  after attempt 1: sleep 250 ms\n"));
        assert!(text.contains("  after attempt 2: sleep 62500 ms\n"));
        assert!(text.contains("  total: 62.75s\n"));
    }

    #[test]
    fn backoff_listing_is_capped_for_large_attempt_counts() {
        let settings = RetrySettings::new()
            .max_attempts(100)
            .backoff(keyforge::Backoff::Fixed);
        let text = render_backoff(&settings).unwrap();
        assert_eq!(text.matches("after attempt").count(), MAX_SCHEDULE_LINES);
        assert!(text.contains("  ... 67 more\n"));
        assert!(text.contains("  total: 24.75s\n"));
    }
}
