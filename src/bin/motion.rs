//! Motion CLI - Command-line interface for the Healtec motion engine
//!
//! Commands:
//! - replay: Drive a tracker from a recorded sample stream (virtual time)
//! - simulate: Generate a synthetic overnight scenario and run it
//! - validate: Check a sample stream for problems the engine assumes away
//! - schema: Print sample and snapshot shapes

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use healtec_motion::clock::{Clock, ManualClock};
use healtec_motion::error::TrackerError;
use healtec_motion::stream::SampleStream;
use healtec_motion::tracker::{ActivityTracker, TrackerConfig};
use healtec_motion::types::{MotionSample, SensorStatus, SleepPhase, TrackerSnapshot};
use healtec_motion::{ENGINE_NAME, ENGINE_VERSION};

/// Motion - On-device inference engine for steps and sleep sessions
#[derive(Parser)]
#[command(name = "motion")]
#[command(author = "Healtec")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Derive steps and sleep sessions from accelerometer streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a tracker from a recorded sample stream (virtual time)
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        /// Seconds of virtual time between driver ticks
        #[arg(long, default_value = "1")]
        tick_seconds: u32,
    },

    /// Generate a synthetic overnight scenario and run it
    Simulate {
        /// Scenario start time (RFC 3339, UTC)
        #[arg(long, default_value = "2024-01-15T21:00:00Z")]
        start: String,

        /// Minutes of light pre-sleep noise
        #[arg(long, default_value = "120")]
        presleep_minutes: i64,

        /// Minutes of stillness after the noise
        #[arg(long, default_value = "120")]
        quiet_minutes: i64,

        /// Minutes of restless movement at the end
        #[arg(long, default_value = "10")]
        burst_minutes: i64,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Check a sample stream for problems the engine assumes away
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print sample and snapshot shapes
    Schema {
        /// Schema to print (sample or snapshot)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one sample per line)
    Ndjson,
    /// JSON array of samples
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (transition lines, then the snapshot)
    Ndjson,
    /// Single JSON report
    Json,
    /// Pretty-printed JSON report
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input shape (motion.sample.v1)
    Sample,
    /// Output shape (motion.snapshot.v1)
    Snapshot,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), MotionCliError> {
    match cli.command {
        Commands::Replay {
            input,
            input_format,
            output_format,
            tick_seconds,
        } => cmd_replay(&input, input_format, output_format, tick_seconds),

        Commands::Simulate {
            start,
            presleep_minutes,
            quiet_minutes,
            burst_minutes,
            output_format,
        } => cmd_simulate(
            &start,
            presleep_minutes,
            quiet_minutes,
            burst_minutes,
            output_format,
        ),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn cmd_replay(
    input: &PathBuf,
    input_format: InputFormat,
    output_format: OutputFormat,
    tick_seconds: u32,
) -> Result<(), MotionCliError> {
    if tick_seconds == 0 {
        return Err(TrackerError::InvalidConfig(
            "tick interval must be at least one second".to_string(),
        )
        .into());
    }

    let input_data = read_input(input)?;
    let samples = parse_samples(&input_data, &input_format)?;

    if samples.is_empty() {
        return Err(MotionCliError::NoSamples);
    }

    let (transitions, snapshot) =
        drive_stream(&samples, Duration::seconds(i64::from(tick_seconds)));

    let report = ReplayReport {
        transitions,
        snapshot,
    };
    print!("{}", format_report(&report, &output_format)?);

    Ok(())
}

fn cmd_simulate(
    start: &str,
    presleep_minutes: i64,
    quiet_minutes: i64,
    burst_minutes: i64,
    output_format: OutputFormat,
) -> Result<(), MotionCliError> {
    let start: DateTime<Utc> = start
        .parse()
        .map_err(|e| TrackerError::InvalidTimestamp(format!("bad --start value: {}", e)))?;

    if presleep_minutes < 0 || quiet_minutes < 0 || burst_minutes < 0 {
        return Err(TrackerError::InvalidConfig(
            "scenario phase lengths must be non-negative".to_string(),
        )
        .into());
    }

    let samples = generate_overnight(start, presleep_minutes, quiet_minutes, burst_minutes);
    let (transitions, snapshot) = drive_stream(&samples, Duration::seconds(1));

    let report = ReplayReport {
        transitions,
        snapshot,
    };
    print!("{}", format_report(&report, &output_format)?);

    Ok(())
}

fn cmd_validate(
    input: &PathBuf,
    input_format: InputFormat,
    json: bool,
) -> Result<(), MotionCliError> {
    let input_data = read_input(input)?;
    let samples = parse_samples(&input_data, &input_format)?;

    let issues = SampleStream::validate(&samples);

    let report = ValidationReport {
        total_samples: samples.len(),
        issue_count: issues.len(),
        issues: issues
            .iter()
            .map(|issue| IssueDetail {
                index: issue.index,
                timestamp: samples[issue.index].timestamp,
                issue: issue.kind.as_str().to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total samples: {}", report.total_samples);
        println!("Issues:        {}", report.issue_count);

        if !report.issues.is_empty() {
            println!("\nDetails:");
            for issue in &report.issues {
                println!(
                    "  - sample {} ({}): {}",
                    issue.index,
                    issue.timestamp.to_rfc3339(),
                    issue.issue
                );
            }
        }
    }

    if report.issue_count > 0 {
        Err(MotionCliError::ValidationFailed(report.issue_count))
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), MotionCliError> {
    match schema_type {
        SchemaType::Sample => {
            if json_schema {
                println!("{}", get_sample_json_schema());
            } else {
                println!("Input Shape: motion.sample.v1");
                println!();
                println!("One accelerometer reading per line (or array element):");
                println!();
                println!("- x, y, z: acceleration components (numbers)");
                println!("- timestamp: RFC 3339 UTC instant the reading was taken");
                println!();
                println!("The engine compares successive magnitudes; samples should");
                println!("arrive in chronological order at roughly 1 Hz.");
            }
        }
        SchemaType::Snapshot => {
            if json_schema {
                println!("{}", get_snapshot_json_schema());
            } else {
                println!("Output Shape: motion.snapshot.v1");
                println!();
                println!("A tracker snapshot contains:");
                println!();
                println!("- engine: {{ name: \"{}\", version, instance_id }}", ENGINE_NAME);
                println!("- captured_at: when the snapshot was taken");
                println!("- sensor: unknown | available | unavailable");
                println!("- steps: {{ count, last_step_at }}");
                println!("- sleep: {{ phase, session, total_movements,");
                println!("           movements_last_half_hour, movements_per_hour }}");
                println!();
                println!("session holds start_time, end_time, duration_minutes and the");
                println!("final quality (excellent / good / fair / poor). The rate field");
                println!("is omitted until enough movement history has accumulated.");
            }
        }
    }

    Ok(())
}

// Helper functions

fn read_input(path: &PathBuf) -> Result<String, MotionCliError> {
    if path.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            eprintln!("reading samples from stdin; pipe a stream or finish with Ctrl-D");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn parse_samples(
    input_data: &str,
    input_format: &InputFormat,
) -> Result<Vec<MotionSample>, MotionCliError> {
    let samples = match input_format {
        InputFormat::Ndjson => SampleStream::parse_ndjson(input_data)?,
        InputFormat::Json => SampleStream::parse_array(input_data)?,
    };
    Ok(samples)
}

/// Run the 1 Hz driver loop over a stream in virtual time.
///
/// The clock starts at the first sample's timestamp and advances by
/// `tick_interval`; samples are delivered as their timestamps come due, and
/// the driver ticks once per interval until the stream is exhausted.
fn drive_stream(
    samples: &[MotionSample],
    tick_interval: Duration,
) -> (Vec<PhaseTransition>, TrackerSnapshot) {
    let mut tracker = ActivityTracker::new(TrackerConfig::default());
    tracker.set_sensor_status(SensorStatus::Available);

    let clock = ManualClock::new(samples[0].timestamp);
    let mut transitions = Vec::new();
    let mut last_phase = tracker.phase();
    let mut pending = samples.iter().peekable();

    loop {
        let now = clock.now();

        while let Some(sample) = pending.next_if(|s| s.timestamp <= now) {
            tracker.handle_sample(sample);
        }
        tracker.tick(now);

        let phase = tracker.phase();
        if phase != last_phase {
            transitions.push(PhaseTransition {
                at: now,
                from: last_phase,
                to: phase,
            });
            last_phase = phase;
        }

        if pending.peek().is_none() {
            break;
        }
        clock.advance(tick_interval);
    }

    let snapshot = tracker.snapshot(clock.now());
    (transitions, snapshot)
}

/// Build an overnight stream at 1 Hz: light noise before bed, a long still
/// stretch, then a restless stretch that should end the session.
fn generate_overnight(
    start: DateTime<Utc>,
    presleep_minutes: i64,
    quiet_minutes: i64,
    burst_minutes: i64,
) -> Vec<MotionSample> {
    let total_seconds = (presleep_minutes + quiet_minutes + burst_minutes) * 60;
    let burst_start = (presleep_minutes + quiet_minutes) * 60;
    let mut samples = Vec::with_capacity(total_seconds as usize + 1);

    for sec in 0..=total_seconds {
        let minute = sec / 60;
        let magnitude = if sec >= burst_start {
            // Restless: alternate 20 s of agitation with 20 s of stillness.
            if sec % 40 < 20 {
                1.4
            } else {
                1.0
            }
        } else if minute < presleep_minutes && minute % 20 == 10 && sec % 60 == 0 {
            // One brief disturbance at the top of every 20th minute.
            1.4
        } else {
            1.0
        };
        samples.push(MotionSample::new(
            magnitude,
            0.0,
            0.0,
            start + Duration::seconds(sec),
        ));
    }

    samples
}

fn format_report(
    report: &ReplayReport,
    format: &OutputFormat,
) -> Result<String, MotionCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for transition in &report.transitions {
                lines.push(serde_json::to_string(transition)?);
            }
            lines.push(serde_json::to_string(&report.snapshot)?);
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(report)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(report)?),
    }
}

fn get_sample_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "$id": "https://healtec.app/schemas/motion.sample.v1.json",
        "title": "motion.sample.v1",
        "description": "One accelerometer reading",
        "type": "object",
        "required": ["x", "y", "z", "timestamp"],
        "properties": {
            "x": { "type": "number" },
            "y": { "type": "number" },
            "z": { "type": "number" },
            "timestamp": { "type": "string", "format": "date-time" }
        }
    })
    .to_string()
}

fn get_snapshot_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "$id": "https://healtec.app/schemas/motion.snapshot.v1.json",
        "title": "motion.snapshot.v1",
        "description": "Point-in-time view of a tracker",
        "type": "object",
        "required": ["engine", "captured_at", "sensor", "steps", "sleep"],
        "properties": {
            "engine": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "version": { "type": "string" },
                    "instance_id": { "type": "string", "format": "uuid" }
                }
            },
            "captured_at": { "type": "string", "format": "date-time" },
            "sensor": {
                "type": "string",
                "enum": ["unknown", "available", "unavailable"]
            },
            "steps": {
                "type": "object",
                "properties": {
                    "count": { "type": "integer" },
                    "last_step_at": { "type": "string", "format": "date-time" }
                }
            },
            "sleep": {
                "type": "object",
                "properties": {
                    "phase": {
                        "type": "string",
                        "enum": ["monitoring", "sleeping", "awake"]
                    },
                    "session": {
                        "type": "object",
                        "properties": {
                            "start_time": { "type": ["string", "null"], "format": "date-time" },
                            "end_time": { "type": ["string", "null"], "format": "date-time" },
                            "duration_minutes": { "type": "integer" },
                            "quality": {
                                "type": "string",
                                "enum": ["poor", "fair", "good", "excellent"]
                            }
                        }
                    },
                    "total_movements": { "type": "integer" },
                    "movements_last_half_hour": { "type": "integer" },
                    "movements_per_hour": { "type": "number" }
                }
            }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum MotionCliError {
    Io(io::Error),
    Tracker(TrackerError),
    Json(serde_json::Error),
    NoSamples,
    ValidationFailed(usize),
}

impl From<io::Error> for MotionCliError {
    fn from(e: io::Error) -> Self {
        MotionCliError::Io(e)
    }
}

impl From<TrackerError> for MotionCliError {
    fn from(e: TrackerError) -> Self {
        MotionCliError::Tracker(e)
    }
}

impl From<serde_json::Error> for MotionCliError {
    fn from(e: serde_json::Error) -> Self {
        MotionCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<MotionCliError> for CliError {
    fn from(e: MotionCliError) -> Self {
        match e {
            MotionCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            MotionCliError::Tracker(e) => CliError {
                code: "INPUT_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Ensure input matches motion.sample.v1 (run 'motion schema sample')".to_string()),
            },
            MotionCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            MotionCliError::NoSamples => CliError {
                code: "NO_SAMPLES".to_string(),
                message: "No samples found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            MotionCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} issues found in sample stream", count),
                hint: Some("Fix the reported issues and retry".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct ReplayReport {
    transitions: Vec<PhaseTransition>,
    snapshot: TrackerSnapshot,
}

#[derive(Serialize)]
struct PhaseTransition {
    at: DateTime<Utc>,
    from: SleepPhase,
    to: SleepPhase,
}

#[derive(Serialize)]
struct ValidationReport {
    total_samples: usize,
    issue_count: usize,
    issues: Vec<IssueDetail>,
}

#[derive(Serialize)]
struct IssueDetail {
    index: usize,
    timestamp: DateTime<Utc>,
    issue: String,
}
