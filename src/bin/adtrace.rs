//! adtrace CLI - Replay and inspect recorded ad-unit signal logs
//!
//! Commands:
//! - replay: Run a recorded signal log through a fresh session and emit the
//!   analytics events it produces
//! - validate: Validate a signal log against adunit.signal.v1
//! - schema: Print schema information

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::cell::RefCell;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use adtrace::signal::{RawSignal, SignalLog};
use adtrace::{
    AdUnitSession, AnalyticsBackend, CarouselConfig, MediaConfig, Signal, TrackError, UnitLayout,
    VideoKind, ADTRACE_VERSION, PRODUCER_NAME, SCHEMA_VERSION,
};

/// adtrace - Interaction instrumentation engine for simulated ad units
#[derive(Parser)]
#[command(name = "adtrace")]
#[command(version = ADTRACE_VERSION)]
#[command(about = "Replay ad-unit interaction signal logs into analytics events", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a signal log through a fresh session
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Participant identifier (as the URL query parameter would carry)
        #[arg(long)]
        identity: Option<String>,

        /// Playback surface present in the unit
        #[arg(long, value_enum, default_value = "none")]
        media: MediaSurface,

        /// Milestone seconds, comma-separated (e.g. "5,10,15")
        #[arg(long)]
        milestones: Option<String>,

        /// Carousel slide count (omit for no carousel)
        #[arg(long)]
        slides: Option<usize>,

        /// Carousel waits for a start-gate gesture
        #[arg(long)]
        gated: bool,

        /// Minimum dwell (ms) for a slide to count as viewed
        #[arg(long, default_value = "2000")]
        min_dwell_ms: i64,
    },

    /// Validate a signal log against the schema
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

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one signal per line)
    Ndjson,
    /// JSON array of signals
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, Copy, ValueEnum)]
enum MediaSurface {
    None,
    Native,
    Embedded,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (adunit.signal.v1)
    Input,
    /// Output schema (analytics events)
    Output,
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

fn run(cli: Cli) -> Result<(), AdtraceCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            input_format,
            output_format,
            identity,
            media,
            milestones,
            slides,
            gated,
            min_dwell_ms,
        } => cmd_replay(
            &input,
            &output,
            input_format,
            output_format,
            identity,
            media,
            milestones.as_deref(),
            slides,
            gated,
            min_dwell_ms,
        ),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Schema { schema_type } => cmd_schema(schema_type),
    }
}

/// Backend collecting fully-merged submissions (event name + identity +
/// load_id) for later formatting.
#[derive(Clone, Default)]
struct BufferBackend {
    records: Rc<RefCell<Vec<Value>>>,
}

impl AnalyticsBackend for BufferBackend {
    fn submit(&mut self, name: &str, properties: &Value) -> Result<(), TrackError> {
        let mut record = serde_json::Map::new();
        record.insert("event".to_string(), Value::String(name.to_string()));
        if let Value::Object(props) = properties {
            for (k, v) in props {
                record.insert(k.clone(), v.clone());
            }
        }
        self.records.borrow_mut().push(Value::Object(record));
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_replay(
    input: &PathBuf,
    output: &PathBuf,
    input_format: InputFormat,
    output_format: OutputFormat,
    identity: Option<String>,
    media: MediaSurface,
    milestones: Option<&str>,
    slides: Option<usize>,
    gated: bool,
    min_dwell_ms: i64,
) -> Result<(), AdtraceCliError> {
    let input_data = read_input(input)?;
    let signals = parse_signals(&input_data, &input_format)?;

    if signals.is_empty() {
        return Err(AdtraceCliError::NoSignals);
    }

    let layout = build_layout(media, milestones, slides, gated, min_dwell_ms)?;

    let buffer = BufferBackend::default();
    let mut session = AdUnitSession::new(Box::new(buffer.clone()), identity);
    session.sink_ready_at(layout, signals[0].timestamp)?;

    for signal in &signals {
        session.dispatch_raw(signal)?;
    }

    // Logs recorded without a lifecycle signal still get their terminal
    // flush; a second unload is a no-op.
    if let Some(last) = signals.last() {
        session.dispatch(&Signal::PageUnload, last.timestamp);
    }

    let records = buffer.records.borrow();
    let output_data = format_output(&records, &output_format)?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_validate(
    input: &PathBuf,
    input_format: InputFormat,
    json: bool,
) -> Result<(), AdtraceCliError> {
    let input_data = read_input(input)?;
    let signals = parse_signals(&input_data, &input_format)?;
    let issues = SignalLog::validate_all(&signals);

    let report = ValidationReport {
        producer: PRODUCER_NAME,
        version: ADTRACE_VERSION,
        total_signals: signals.len(),
        valid_signals: signals.len() - issues.len(),
        invalid_signals: issues.len(),
        errors: issues
            .iter()
            .map(|i| ValidationErrorDetail {
                index: i.index,
                kind: i.kind.clone(),
                error: i.error.clone(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total signals:   {}", report.total_signals);
        println!("Valid signals:   {}", report.valid_signals);
        println!("Invalid signals: {}", report.invalid_signals);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Signal {} ({}): {}", err.index, err.kind, err.error);
            }
        }
    }

    if report.invalid_signals > 0 {
        Err(AdtraceCliError::ValidationFailed(report.invalid_signals))
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType) -> Result<(), AdtraceCliError> {
    match schema_type {
        SchemaType::Input => {
            println!("Input Schema: {}", SCHEMA_VERSION);
            println!();
            println!("One signal per record: {{schema_version, timestamp, signal}}.");
            println!("Signal types:");
            println!();
            println!("  video_play {{duration_s?}} / video_pause / video_ended - native element state");
            println!("  video_position {{position_s, duration_s}} - synchronous position read");
            println!("  frame_message {{data}} - opaque embedded-player message");
            println!("  gate_dismissed - start-gate gesture");
            println!("  carousel_offset {{offset_pct}} - container offset, % of width");
            println!("  carousel_index {{index}} - explicit index notification");
            println!("  page_hidden / page_unload - lifecycle signals");
        }
        SchemaType::Output => {
            println!("Output: analytics events, one JSON object per record");
            println!();
            println!("  video_start {{video_type, duration_s}}");
            println!("  video_progress {{second, duration_s, video_type}}");
            println!("  video_complete {{watched_ms, percent_watched, max_watched_s,");
            println!("                  duration_s, video_type, completed_naturally?}}");
            println!("  carousel_start {{total_slides}}");
            println!("  slide_view {{slide_index, direction}}");
            println!("  dwell_end {{slide_index, dwell_ms}}");
            println!("  carousel_complete {{total_dwell_ms, all_viewed}}");
            println!();
            println!("Every event additionally carries participant_id (when resolved)");
            println!("and load_id (per page load), merged by the sink adapter.");
        }
    }

    Ok(())
}

// Helper functions

fn read_input(input: &PathBuf) -> Result<String, AdtraceCliError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            eprintln!("Reading signals from terminal; finish with Ctrl-D");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_signals(data: &str, format: &InputFormat) -> Result<Vec<RawSignal>, AdtraceCliError> {
    let signals = match format {
        InputFormat::Ndjson => SignalLog::parse_ndjson(data)?,
        InputFormat::Json => SignalLog::parse_array(data)?,
    };
    Ok(signals)
}

fn build_layout(
    media: MediaSurface,
    milestones: Option<&str>,
    slides: Option<usize>,
    gated: bool,
    min_dwell_ms: i64,
) -> Result<UnitLayout, AdtraceCliError> {
    let mut layout = UnitLayout::default();

    let video_type = match media {
        MediaSurface::None => None,
        MediaSurface::Native => Some(VideoKind::Native),
        MediaSurface::Embedded => Some(VideoKind::Embedded),
    };
    if let Some(video_type) = video_type {
        let mut config = MediaConfig::new(video_type);
        if let Some(list) = milestones {
            config = config.with_milestones(parse_milestones(list)?);
        }
        layout = layout.with_media(config);
    }

    if let Some(slide_count) = slides {
        let mut config = CarouselConfig::new(slide_count).with_min_dwell_ms(min_dwell_ms);
        if gated {
            config = config.gated();
        }
        layout = layout.with_carousel(config);
    }

    Ok(layout)
}

fn parse_milestones(list: &str) -> Result<Vec<u32>, AdtraceCliError> {
    list.split(',')
        .map(|part| {
            part.trim().parse::<u32>().map_err(|_| {
                AdtraceCliError::ParseError(format!("invalid milestone second: {:?}", part.trim()))
            })
        })
        .collect()
}

fn format_output(records: &[Value], format: &OutputFormat) -> Result<String, AdtraceCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}

// Error types

#[derive(Debug)]
enum AdtraceCliError {
    Io(io::Error),
    Track(TrackError),
    Json(serde_json::Error),
    NoSignals,
    ValidationFailed(usize),
    ParseError(String),
}

impl From<io::Error> for AdtraceCliError {
    fn from(e: io::Error) -> Self {
        AdtraceCliError::Io(e)
    }
}

impl From<TrackError> for AdtraceCliError {
    fn from(e: TrackError) -> Self {
        AdtraceCliError::Track(e)
    }
}

impl From<serde_json::Error> for AdtraceCliError {
    fn from(e: serde_json::Error) -> Self {
        AdtraceCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<AdtraceCliError> for CliError {
    fn from(e: AdtraceCliError) -> Self {
        match e {
            AdtraceCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            AdtraceCliError::Track(e) => CliError {
                code: "TRACK_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(format!("Ensure input matches the {} schema", SCHEMA_VERSION)),
            },
            AdtraceCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            AdtraceCliError::NoSignals => CliError {
                code: "NO_SIGNALS".to_string(),
                message: "No signals found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            AdtraceCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} signals failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            AdtraceCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    producer: &'static str,
    version: &'static str,
    total_signals: usize,
    valid_signals: usize,
    invalid_signals: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    kind: String,
    error: String,
}
