//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use orgscout_core::{
    EntityOutcome, EntityStatus, Run, RunProgress, RunSummary, Services, merge_entity,
    run_entities,
};
use orgscout_crawler::HttpFetcher;
use orgscout_discovery::BraveSearch;
use orgscout_extract::OpenAiExtractor;
use orgscout_schema::{FieldKind, GlobalAvoidSource, Schema};
use orgscout_shared::{
    AppConfig, PipelineConfig, entity_key, init_config, load_config, parse_entities,
    require_api_key,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// orgscout: schema-driven organization profiles from the open web.
#[derive(Parser)]
#[command(
    name = "orgscout",
    version,
    about = "Search, fetch, and extract schema-shaped organization profiles.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Where the schema comes from. Inline text wins over a path.
#[derive(Args, Clone)]
pub(crate) struct SchemaSource {
    /// Path to the schema document (JSON).
    #[arg(long, env = "ORGSCOUT_SCHEMA")]
    pub schema: Option<PathBuf>,

    /// Inline schema document, used instead of --schema.
    #[arg(long)]
    pub schema_text: Option<String>,

    /// Comma-separated hostnames banned for every field (overrides env and sidecar).
    #[arg(long, value_delimiter = ',')]
    pub global_avoid: Option<Vec<String>>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Crawl every entity in a list and write canonical records to a new run workspace.
    Run {
        #[command(flatten)]
        source: SchemaSource,

        /// Entity list document: JSON array of {name, url}.
        #[arg(long)]
        entities: PathBuf,

        /// Output root for run workspaces (defaults to config `output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Field-URL fetches in flight per entity.
        #[arg(long)]
        field_concurrency: Option<usize>,

        /// Entities in flight at once.
        #[arg(long)]
        entity_concurrency: Option<usize>,

        /// Pause between entity starts, in milliseconds.
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Candidate URLs kept per field.
        #[arg(long)]
        results_per_field: Option<usize>,
    },

    /// Re-merge the partial records left for one entity in a run workspace.
    Merge {
        #[command(flatten)]
        source: SchemaSource,

        /// Run workspace directory.
        #[arg(long)]
        run_dir: PathBuf,

        /// Entity name as listed in the entity document.
        #[arg(long)]
        entity: String,
    },

    /// Schema utilities.
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Schema subcommands.
#[derive(Subcommand)]
pub(crate) enum SchemaAction {
    /// Load a schema and print its fields.
    Check {
        #[command(flatten)]
        source: SchemaSource,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "orgscout=info,orgscout_core=info,orgscout_discovery=warn,orgscout_crawler=warn",
        1 => "orgscout=debug,orgscout_core=debug,orgscout_schema=debug,orgscout_discovery=debug,orgscout_crawler=debug,orgscout_extract=debug",
        _ => "orgscout=trace,orgscout_core=trace,orgscout_schema=trace,orgscout_discovery=trace,orgscout_crawler=trace,orgscout_extract=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            source,
            entities,
            out,
            field_concurrency,
            entity_concurrency,
            delay_ms,
            results_per_field,
        } => {
            let overrides = RunOverrides {
                out,
                field_concurrency,
                entity_concurrency,
                delay_ms,
                results_per_field,
            };
            cmd_run(&source, &entities, overrides).await
        }
        Command::Merge {
            source,
            run_dir,
            entity,
        } => cmd_merge(&source, &run_dir, &entity),
        Command::Schema { action } => match action {
            SchemaAction::Check { source } => cmd_schema_check(&source),
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

/// Load the schema, resolving the global avoid-list once.
fn load_schema(source: &SchemaSource, config: &AppConfig) -> Result<Schema> {
    let avoid = GlobalAvoidSource {
        inline: source.global_avoid.clone(),
        ..GlobalAvoidSource::from_env(&config.avoid.env_var)
    };
    let schema = Schema::load(
        source.schema_text.as_deref(),
        source.schema.as_deref(),
        &avoid,
    )?;
    Ok(schema)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

struct RunOverrides {
    out: Option<PathBuf>,
    field_concurrency: Option<usize>,
    entity_concurrency: Option<usize>,
    delay_ms: Option<u64>,
    results_per_field: Option<usize>,
}

impl RunOverrides {
    fn apply(self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(out) = self.out {
            config.output_root = out;
        }
        if let Some(n) = self.field_concurrency {
            config.field_concurrency = n.max(1);
        }
        if let Some(n) = self.entity_concurrency {
            config.entity_concurrency = n.max(1);
        }
        if let Some(ms) = self.delay_ms {
            config.entity_delay = Duration::from_millis(ms);
        }
        if let Some(k) = self.results_per_field {
            config.results_per_field = k;
        }
        config
    }
}

async fn cmd_run(source: &SchemaSource, entities_path: &Path, overrides: RunOverrides) -> Result<()> {
    let config = load_config()?;

    // Fail fast on missing credentials before any network work.
    let search_key = require_api_key(&config.search.api_key_env, "Search")?;
    let extraction_key = require_api_key(&config.extraction.api_key_env, "Extraction")?;

    let schema = Arc::new(load_schema(source, &config)?);

    let entities_text = std::fs::read_to_string(entities_path)
        .wrap_err_with(|| format!("cannot read entity list {}", entities_path.display()))?;
    let entities = parse_entities(&entities_text)
        .wrap_err_with(|| format!("malformed entity list {}", entities_path.display()))?;
    if entities.is_empty() {
        return Err(eyre!("entity list {} is empty", entities_path.display()));
    }

    let pipeline = overrides.apply(PipelineConfig::from(&config));

    let services = Services {
        search: Arc::new(
            BraveSearch::new(&config.search.endpoint, search_key)?
                .with_count(config.search.results_per_query),
        ),
        fetcher: Arc::new(HttpFetcher::new()?.with_max_chars(pipeline.max_page_chars)),
        extractor: Arc::new(OpenAiExtractor::new(
            &config.extraction.base_url,
            extraction_key,
            &config.extraction.model,
        )?),
    };

    info!(
        entities = entities.len(),
        output_root = %pipeline.output_root.display(),
        field_concurrency = pipeline.field_concurrency,
        entity_concurrency = pipeline.entity_concurrency,
        "starting run"
    );

    let progress = Arc::new(CliProgress::new(entities.len()));
    let summary = run_entities(&entities, schema, &pipeline, &services, progress).await?;

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("  Run {} complete", summary.run_id);
    println!("  Merged:  {}", summary.merged());
    println!("  Failed:  {}", summary.failed());
    println!("  Path:    {}", summary.run_dir.display());
    println!("  Time:    {:.1}s", summary.elapsed.as_secs_f64());

    for outcome in summary.outcomes.iter().filter(|o| !o.is_merged()) {
        match &outcome.status {
            EntityStatus::Failed { stage, error } => {
                println!("    ✗ {} ({stage}): {error}", outcome.name);
            }
            EntityStatus::Skipped { reason } => {
                println!("    - {}: {reason}", outcome.name);
            }
            EntityStatus::Merged { .. } => {}
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
    total: usize,
}

impl CliProgress {
    fn new(total: usize) -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} [{pos}/{len}] {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "]),
            );
        }
        spinner.set_length(total as u64);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner, total }
    }
}

impl RunProgress for CliProgress {
    fn entity_started(&self, name: &str, index: usize, _total: usize) {
        self.spinner
            .set_message(format!("Crawling {name} ({} of {})", index + 1, self.total));
    }

    fn entity_finished(&self, outcome: &EntityOutcome) {
        self.spinner.inc(1);
        if let EntityStatus::Failed { stage, .. } = &outcome.status {
            self.spinner
                .println(format!("  ✗ {} failed during {stage}", outcome.name));
        }
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// merge
// ---------------------------------------------------------------------------

fn cmd_merge(source: &SchemaSource, run_dir: &Path, entity: &str) -> Result<()> {
    let config = load_config()?;
    let schema = load_schema(source, &config)?;
    let run = Run::open(run_dir)?;
    let key = entity_key(entity);

    let record = merge_entity(&key, &run, &schema)?;
    run.record_event(&format!("{entity}: re-merged"));

    println!("  Merged {entity} ({} fields)", record.fields.len());
    println!("  Path:   {}", run.canonical_path(&key).display());
    Ok(())
}

// ---------------------------------------------------------------------------
// schema check
// ---------------------------------------------------------------------------

fn cmd_schema_check(source: &SchemaSource) -> Result<()> {
    let config = load_config()?;
    let schema = load_schema(source, &config)?;

    println!("  Fields:");
    for field in schema.fields() {
        let mut line = format!(
            "    {}{}: {}",
            field.name,
            if field.optional { "?" } else { "" },
            field.kind.label()
        );
        if let FieldKind::ListOfRecords(shape) = &field.kind {
            let attrs: Vec<String> = shape
                .attrs()
                .map(|(name, kind)| format!("{name}{}", if kind.is_optional() { "?" } else { "" }))
                .collect();
            line.push_str(&format!(" {{{}}}", attrs.join(", ")));
        }
        if let Some(keyword) = &field.search_keyword {
            line.push_str(&format!("  search=\"{keyword}\""));
        }
        if let Some(key) = &field.dedupe_key {
            line.push_str(&format!("  dedupeBy={key}"));
        }
        if !field.avoid_domains.is_empty() {
            let hosts: Vec<&str> = field.avoid_domains.iter().collect();
            line.push_str(&format!("  avoid=[{}]", hosts.join(", ")));
        }
        println!("{line}");
    }

    let global: Vec<&str> = schema.global_avoid().iter().collect();
    println!(
        "  Global avoid-list: {}",
        if global.is_empty() { "(empty)".to_string() } else { global.join(", ") }
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "orgscout",
            "run",
            "--schema",
            "fixtures/schema/university.json",
            "--entities",
            "fixtures/json/universities.json",
            "--entity-concurrency",
            "1",
            "--global-avoid",
            "usnews.com,niche.com",
        ])
        .unwrap();

        let Command::Run {
            source,
            entity_concurrency,
            ..
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(entity_concurrency, Some(1));
        assert_eq!(
            source.global_avoid,
            Some(vec!["usnews.com".to_string(), "niche.com".to_string()])
        );
    }

    #[test]
    fn overrides_apply_over_config() {
        let overrides = RunOverrides {
            out: Some(PathBuf::from("/tmp/runs")),
            field_concurrency: Some(0),
            entity_concurrency: None,
            delay_ms: Some(250),
            results_per_field: Some(5),
        };
        let config = overrides.apply(PipelineConfig::from(&AppConfig::default()));

        assert_eq!(config.output_root, PathBuf::from("/tmp/runs"));
        assert_eq!(config.field_concurrency, 1);
        assert_eq!(config.entity_concurrency, 3);
        assert_eq!(config.entity_delay, Duration::from_millis(250));
        assert_eq!(config.results_per_field, 5);
    }

    #[test]
    fn schema_check_reads_fixture() {
        let source = SchemaSource {
            schema: Some(PathBuf::from("../../fixtures/schema/university.json")),
            schema_text: None,
            global_avoid: None,
        };
        let schema = load_schema(&source, &AppConfig::default()).unwrap();
        assert_eq!(schema.fields().count(), 7);
    }
}
