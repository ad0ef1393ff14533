use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use illustrator_contracts::batch::{BatchConfig, BatchItemStatus, ResumePolicy, DEFAULT_PREFIX};
use illustrator_contracts::events::{now_utc_iso, EventKind, EventWriter};
use illustrator_contracts::learning::{LearningRecord, LearningStore};
use illustrator_contracts::prompt::{PromptInput, VariationHints};
use illustrator_contracts::providers::{Credentials, ProviderKind};
use illustrator_contracts::request::{CandidateCount, ReferenceImage};
use illustrator_contracts::runs::{write_summary, BatchSummary, ItemSummary};
use illustrator_engine::{
    load_analysis_prompt, load_reference_images, AdapterOptions, BatchOptions, BatchReport, BatchRunner,
    CandidateGenerator, CandidateJob, CoverAnalyzer, HttpTransport, ItemOutcome, JsonTransport, ProviderAdapter,
};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const TEMPLATE_DIR: &str = "prompts";
const VARIED_TEMPLATE: &str = "varied-styles.md";
const ANALYSIS_TEMPLATE: &str = "learning-analysis.md";

#[derive(Debug, Parser)]
#[command(name = "illustrator", version, about = "Illustration and cover image generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate one image (or several candidates) from a prompt.
    Generate(GenerateArgs),
    /// Generate every item of a batch config, skipping finished ones.
    Batch(BatchArgs),
    /// Analyze high-performing covers and inspect the learning document.
    #[command(subcommand)]
    Learn(LearnCommand),
}

#[derive(Debug, Args)]
struct GenerationArgs {
    /// gemini or openrouter; defaults to whichever key is set (Gemini on a tie).
    #[arg(long)]
    provider: Option<String>,
    #[arg(short, long)]
    model: Option<String>,
    /// WxH, W:H, portrait, landscape or square.
    #[arg(long)]
    size: Option<String>,
    /// Style reference image; at most 3 are used.
    #[arg(long = "ref", value_name = "PATH")]
    references: Vec<PathBuf>,
    /// Accepted for compatibility; has no effect.
    #[arg(long)]
    ref_weight: Option<f32>,
    #[arg(long, default_value_t = 1)]
    candidates: u8,
    /// Give each candidate its own style hint.
    #[arg(long)]
    varied: bool,
    /// Defaults to `prompts/varied-styles.md` in the working directory or
    /// beside the executable.
    #[arg(long)]
    varied_template: Option<PathBuf>,
    /// Learning document consulted for cover prompts.
    #[arg(long)]
    learnings_file: Option<PathBuf>,
    /// Append JSONL run events to this file.
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(short, long, conflicts_with = "prompt_file")]
    prompt: Option<String>,
    #[arg(short = 'f', long)]
    prompt_file: Option<PathBuf>,
    #[arg(short, long, default_value = "generated.png")]
    output: PathBuf,
    #[command(flatten)]
    generation: GenerationArgs,
}

#[derive(Debug, Args)]
struct BatchArgs {
    #[arg(short, long)]
    config: PathBuf,
    #[arg(short, long, default_value = "./illustrations")]
    output_dir: PathBuf,
    /// Delay between generation requests, in milliseconds.
    #[arg(short, long, default_value_t = 1000)]
    delay: u64,
    #[arg(long, default_value = DEFAULT_PREFIX)]
    prefix: String,
    /// Regenerate items whose outputs already exist.
    #[arg(long)]
    force: bool,
    /// Comma-separated ids to regenerate, e.g. `3,5`.
    #[arg(long)]
    regenerate: Option<String>,
    /// Write a JSON run summary to this file.
    #[arg(long)]
    summary: Option<PathBuf>,
    #[command(flatten)]
    generation: GenerationArgs,
}

#[derive(Debug, Subcommand)]
enum LearnCommand {
    /// Analyze one cover image and fold its patterns into the document.
    Analyze(AnalyzeArgs),
    /// Print the learning document.
    Show(ShowArgs),
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    image: PathBuf,
    /// Context for the analysis, e.g. "CTR 8.5%".
    #[arg(long)]
    note: Option<String>,
    #[arg(short, long)]
    model: Option<String>,
    /// Defaults to `prompts/learning-analysis.md` in the working directory or
    /// beside the executable.
    #[arg(long)]
    analysis_template: Option<PathBuf>,
    #[arg(long)]
    learnings_file: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ShowArgs {
    #[arg(long)]
    learnings_file: Option<PathBuf>,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("illustrator error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Batch(args) => run_batch(args),
        Command::Learn(LearnCommand::Analyze(args)) => run_learn_analyze(args),
        Command::Learn(LearnCommand::Show(args)) => run_learn_show(args),
    }
}

/// Everything `generate` and `batch` share once flags are validated.
struct GenerationSetup {
    adapter: ProviderAdapter,
    generator: CandidateGenerator,
    references: Vec<ReferenceImage>,
    learnings: Option<String>,
}

fn prepare_generation(args: &GenerationArgs) -> Result<GenerationSetup> {
    let count = CandidateCount::new(args.candidates)?;
    let references = load_reference_images(&args.references)?;
    if let Some(weight) = args.ref_weight {
        debug!(weight, "--ref-weight has no effect");
    }

    let credentials = Credentials::from_env();
    credentials.require_any()?;
    let preferred = args.provider.as_deref().map(ProviderKind::parse).transpose()?;
    let transport: Arc<dyn JsonTransport> = Arc::new(HttpTransport::new());
    let adapter = ProviderAdapter::connect(
        &credentials,
        &AdapterOptions {
            provider: preferred,
            model: args.model.clone(),
            needs_reference_images: !references.is_empty(),
        },
        transport,
    )?;
    for reason in adapter.fallback_reasons() {
        println!("Note: {reason}");
    }

    let mut generator = CandidateGenerator::new(count);
    if args.varied {
        let template = template_path(args.varied_template.as_deref(), VARIED_TEMPLATE);
        generator = generator.varied(VariationHints::load(&template));
    }

    Ok(GenerationSetup {
        adapter,
        generator,
        references,
        learnings: learnings_block(args.learnings_file.as_deref()),
    })
}

/// An explicit flag wins; otherwise the first `prompts/<name>` found under
/// the working directory or the executable's directory and its parents.
/// A path that does not exist makes the loaders use their built-in text.
fn template_path(explicit: Option<&Path>, name: &str) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    find_template(name, &template_roots()).unwrap_or_else(|| Path::new(TEMPLATE_DIR).join(name))
}

fn template_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    if let Some(dir) = exe_dir {
        // `target/<profile>/` builds keep the templates two levels up.
        roots.extend(dir.ancestors().take(3).map(Path::to_path_buf));
    }
    roots
}

fn find_template(name: &str, roots: &[PathBuf]) -> Option<PathBuf> {
    roots
        .iter()
        .map(|root| root.join(TEMPLATE_DIR).join(name))
        .find(|path| path.is_file())
}

fn learning_store(path: Option<&Path>) -> Result<LearningStore> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => LearningStore::default_path()?,
    };
    Ok(LearningStore::new(path))
}

/// Learned patterns are an optional enrichment; any problem just leaves them out.
fn learnings_block(path: Option<&Path>) -> Option<String> {
    let store = match learning_store(path) {
        Ok(store) => store,
        Err(err) => {
            debug!(error = %err, "no learning document");
            return None;
        }
    };
    match store.prompt_block() {
        Ok(block) => block,
        Err(err) => {
            warn!(error = %err, "ignoring unreadable learning document");
            None
        }
    }
}

fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn read_prompt(args: &GenerateArgs) -> Result<String> {
    let prompt = match (&args.prompt, &args.prompt_file) {
        (Some(prompt), _) => prompt.clone(),
        (None, Some(path)) => {
            fs::read_to_string(path).with_context(|| format!("failed to read prompt file {}", path.display()))?
        }
        (None, None) => bail!("--prompt or --prompt-file is required"),
    };
    if prompt.trim().is_empty() {
        bail!("prompt is empty");
    }
    Ok(prompt)
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let prompt = read_prompt(&args)?;
    let setup = prepare_generation(&args.generation)?;

    println!("Generating image with {} ({})...", setup.adapter.model(), setup.adapter.provider());
    println!("Prompt: {}", preview(&prompt, 100));

    let job = CandidateJob {
        prompt: PromptInput {
            reference_count: setup.references.len(),
            learnings: setup.learnings.as_deref(),
            ..PromptInput::new(&prompt)
        },
        references: &setup.references,
        model: None,
        size: args.generation.size.as_deref(),
        output: &args.output,
    };
    let report = setup.generator.run(&setup.adapter, &job)?;

    for written in &report.written {
        println!("Image saved to: {} ({})", written.path.display(), kilobytes(written.bytes));
    }
    for failure in &report.failures {
        eprintln!("✗ {}: {}", failure.path.display(), failure.reason);
    }

    if let Some(path) = args.generation.events.as_deref() {
        let events = EventWriter::new(path, new_run_id());
        let kind = if report.succeeded() {
            EventKind::ItemGenerated
        } else {
            EventKind::ItemFailed
        };
        let files: Vec<Value> = report
            .written
            .iter()
            .map(|written| {
                json!({
                    "path": written.path.display().to_string(),
                    "bytes": written.bytes,
                    "sha256": written.sha256,
                    "mime_type": written.mime_type,
                })
            })
            .collect();
        let mut payload = Map::new();
        payload.insert("files".to_string(), Value::Array(files));
        payload.insert("failed_candidates".to_string(), json!(report.failures.len()));
        if let Some(reason) = report.first_failure() {
            payload.insert("error".to_string(), json!(reason));
        }
        events.emit(kind, payload)?;
    }

    if report.succeeded() {
        Ok(0)
    } else {
        eprintln!("Error: no image generated");
        Ok(1)
    }
}

fn run_batch(args: BatchArgs) -> Result<i32> {
    let plan = BatchConfig::load(&args.config)?.plan(&args.prefix)?;
    let setup = prepare_generation(&args.generation)?;
    let run_id = new_run_id();
    let started_at = now_utc_iso();

    println!("\nBatch Image Generation");
    println!("======================");
    println!("Provider: {}", setup.adapter.provider());
    println!("Model: {}", setup.adapter.model());
    println!("Total: {} items", plan.items.len());
    println!("Output: {}\n", args.output_dir.display());

    let mut options = BatchOptions::new(&args.output_dir);
    options.policy = ResumePolicy::new(args.force, args.regenerate.as_deref());
    options.delay = Duration::from_millis(args.delay);
    options.candidates = setup.generator.clone();
    options.references = setup.references.clone();
    options.size = args.generation.size.clone();
    options.learnings = setup.learnings.clone();

    let events = args
        .generation
        .events
        .as_deref()
        .map(|path| EventWriter::new(path, run_id.clone()));
    let mut runner = BatchRunner::new(&setup.adapter, options);
    if let Some(events) = events.as_ref() {
        runner = runner.with_events(events);
    }
    let report = runner.run(&plan, print_outcome)?;

    let tally = report.tally;
    println!("\n======================");
    println!(
        "Complete: {} succeeded, {} skipped, {} failed",
        tally.succeeded, tally.skipped, tally.failed
    );
    println!("Output directory: {}", args.output_dir.display());

    if let Some(path) = args.summary.as_deref() {
        let summary = batch_summary(&report, &run_id, started_at, &setup.adapter);
        let mut extra = Map::new();
        extra.insert("config".to_string(), json!(args.config.display().to_string()));
        extra.insert("output_dir".to_string(), json!(args.output_dir.display().to_string()));
        write_summary(path, &summary, Some(&extra))
            .with_context(|| format!("failed to write run summary {}", path.display()))?;
    }

    Ok(if tally.has_failures() { 1 } else { 0 })
}

fn print_outcome(outcome: &ItemOutcome) {
    if let Some(line) = outcome_line(outcome) {
        println!("{line}");
    }
}

/// `None` for an item the runner has not settled yet.
fn outcome_line(outcome: &ItemOutcome) -> Option<String> {
    let line = match outcome.status {
        BatchItemStatus::Succeeded => {
            let files: Vec<String> = outcome.files.iter().map(|path| path.display().to_string()).collect();
            let verb = if outcome.regenerated { "regenerated" } else { "saved" };
            format!("[{}] ✓ {verb} {}", outcome.id, files.join(", "))
        }
        BatchItemStatus::Skipped => format!("[{}] - skipped (exists)", outcome.id),
        BatchItemStatus::Failed => format!(
            "[{}] ✗ {}",
            outcome.id,
            outcome.reason.as_deref().unwrap_or("no image generated")
        ),
        BatchItemStatus::Pending => return None,
    };
    Some(line)
}

fn batch_summary(report: &BatchReport, run_id: &str, started_at: String, adapter: &ProviderAdapter) -> BatchSummary {
    let items = report
        .outcomes
        .iter()
        .map(|outcome| {
            let mut item = ItemSummary::new(&outcome.id, outcome.status);
            item.files = outcome.files.iter().map(|path| path.display().to_string()).collect();
            item.error = match outcome.status {
                BatchItemStatus::Failed => outcome.reason.clone(),
                _ => None,
            };
            item
        })
        .collect();
    BatchSummary {
        run_id: run_id.to_string(),
        started_at,
        finished_at: now_utc_iso(),
        provider: adapter.provider().to_string(),
        model: adapter.model().to_string(),
        succeeded: report.tally.succeeded,
        skipped: report.tally.skipped,
        failed: report.tally.failed,
        items,
    }
}

fn run_learn_analyze(args: AnalyzeArgs) -> Result<i32> {
    if !args.image.is_file() {
        bail!("image not found: {}", args.image.display());
    }
    let store = learning_store(args.learnings_file.as_deref())?;
    let credentials = Credentials::from_env();
    let transport: Arc<dyn JsonTransport> = Arc::new(HttpTransport::new());
    let Some(analyzer) = CoverAnalyzer::from_credentials(&credentials, args.model.as_deref(), transport) else {
        bail!("cover analysis needs GEMINI_API_KEY or OPENROUTER_API_KEY");
    };

    let name = args
        .image
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.image.display().to_string());
    println!("Analyzing cover image: {name}");
    let template = template_path(args.analysis_template.as_deref(), ANALYSIS_TEMPLATE);
    let instruction = load_analysis_prompt(Some(&template), args.note.as_deref());
    let Some(record) = analyzer.analyze(&args.image, &instruction) else {
        eprintln!("Analysis failed: no usable result from {}", analyzer.provider());
        return Ok(1);
    };

    let document = store.record(&record)?;
    println!("✓ Learning saved to: {}", store.path().display());

    if let Some(path) = args.events.as_deref() {
        let events = EventWriter::new(path, new_run_id());
        let mut payload = Map::new();
        payload.insert("image".to_string(), json!(record.source));
        payload.insert("learnings_file".to_string(), json!(store.path().display().to_string()));
        payload.insert("patterns".to_string(), json!(record.patterns));
        payload.insert("avoid_patterns".to_string(), json!(record.avoid_patterns));
        payload.insert("recommended_total".to_string(), json!(document.patterns.recommended.len()));
        payload.insert("avoid_total".to_string(), json!(document.patterns.avoid.len()));
        events.emit(EventKind::LearningRecorded, payload)?;
    }

    print!("{}", analysis_report(&record));
    Ok(0)
}

fn analysis_report(record: &LearningRecord) -> String {
    let elements = &record.elements;
    let mut out = String::from("\n--- Analysis Results ---\n");
    out.push_str(&format!("Composition: {}\n", elements.composition));
    out.push_str(&format!("Color scheme: {}\n", elements.color_scheme));
    out.push_str(&format!("Text usage: {}\n", elements.text_usage));
    out.push_str(&format!("Emotion: {}\n", elements.emotion));
    out.push_str(&format!("Focal point: {}\n", elements.focus_point));
    out.push_str("\nPatterns learned:\n");
    for pattern in &record.patterns {
        out.push_str(&format!("  ✓ {pattern}\n"));
    }
    if !record.avoid_patterns.is_empty() {
        out.push_str("\nTo avoid:\n");
        for pattern in &record.avoid_patterns {
            out.push_str(&format!("  ✗ {pattern}\n"));
        }
    }
    out
}

fn run_learn_show(args: ShowArgs) -> Result<i32> {
    let store = learning_store(args.learnings_file.as_deref())?;
    match store.raw()? {
        Some(raw) => println!("{raw}"),
        None => {
            println!("No learnings found yet. Analyze some covers first!");
            println!("Learnings file: {}", store.path().display());
        }
    }
    Ok(0)
}

fn preview(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(max_chars).collect();
    format!("{head}...")
}

fn kilobytes(bytes: usize) -> String {
    format!("{:.1} KB", bytes as f64 / 1024.0)
}
