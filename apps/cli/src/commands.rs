//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use workspacebuilder_core::{
    ComponentOutcome, ComponentRegistry, DirectoryOutputter, FailurePolicy, Pipeline,
    PipelineOptions, ProgressReporter, RunReport, builtin_registry, default_request,
    resolve_order,
};
use workspacebuilder_shared::{
    AppConfig, ComponentId, Role, SettingsSource, init_config, load_config, load_config_from,
    parse_setting_override,
};
use workspacebuilder_storage::GraphStore;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Workspace builder: model Kubernetes environments and render workspaces.
#[derive(Parser)]
#[command(
    name = "workspace-builder",
    version,
    about = "Discover Kubernetes resources, enrich them and render workspace output.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.workspacebuilder/workspacebuilder.toml.
    #[arg(long, global = true, env = "WORKSPACEBUILDER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the pipeline for the given components and everything they depend on.
    Run {
        /// Components to run as role:name, comma-separated (defaults to the
        /// config file's list, or indexer:kubeapi with every enricher and
        /// renderer).
        #[arg(short, long, value_delimiter = ',')]
        components: Vec<ComponentId>,

        /// Output directory for rendered files.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Graph database file.
        #[arg(long)]
        db: Option<PathBuf>,

        /// Keep going after enricher or renderer failures.
        #[arg(long)]
        continue_on_error: bool,

        /// Keep the graph from the previous run instead of starting empty.
        #[arg(long)]
        keep_graph: bool,

        /// Setting override (repeatable), e.g. --set WORKSPACE_NAME=ops.
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// List registered components.
    Components,

    /// List settings declared by the registered components.
    Settings,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
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
        0 => "workspacebuilder=info",
        1 => "workspacebuilder=debug",
        _ => "workspacebuilder=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

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
    let config_path = cli.config;
    match cli.command {
        Command::Run {
            components,
            out,
            db,
            continue_on_error,
            keep_graph,
            set,
        } => {
            let args = RunArgs {
                components,
                out,
                db,
                continue_on_error,
                keep_graph,
                set,
            };
            cmd_run(config_path.as_deref(), args).await
        }
        Command::Components => cmd_components(),
        Command::Settings => cmd_settings(),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

fn load_app_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

struct RunArgs {
    components: Vec<ComponentId>,
    out: Option<PathBuf>,
    db: Option<PathBuf>,
    continue_on_error: bool,
    keep_graph: bool,
    set: Vec<String>,
}

async fn cmd_run(config_path: Option<&Path>, args: RunArgs) -> Result<()> {
    let config = load_app_config(config_path)?;
    let registry = builtin_registry()?;

    let requested = select_components(&registry, args.components, &config)?;
    let order = resolve_order(&registry, &requested)?;
    ensure_graph_source(&order, args.keep_graph)?;

    let overrides = args
        .set
        .iter()
        .map(|raw| parse_setting_override(raw))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let keys = registry.settings().iter().map(|s| s.key);
    let source = SettingsSource::from_config_and_env(&config, keys).with_overrides(overrides);

    let out_dir = args
        .out
        .unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir));
    let db_path = args
        .db
        .unwrap_or_else(|| PathBuf::from(&config.defaults.database_path));

    let graph = Arc::new(GraphStore::open(&db_path).await?);
    if !args.keep_graph {
        graph.reset().await?;
    }

    let failure_policy = if args.continue_on_error || config.pipeline.continue_on_error {
        FailurePolicy::ContinueOnError
    } else {
        FailurePolicy::FailFast
    };

    // Ctrl-C stops the run before the next component starts.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after the current component");
                cancel.cancel();
            }
        });
    }

    info!(
        out = %out_dir.display(),
        db = %db_path.display(),
        requested = requested.len(),
        ?failure_policy,
        "starting workspace builder"
    );

    let reporter = CliProgress::new();
    let result = Pipeline::new(
        &registry,
        &source,
        graph,
        Arc::new(DirectoryOutputter::new(&out_dir)),
    )
    .with_options(PipelineOptions { failure_policy })
    .with_cancellation(cancel)
    .run(&requested, &reporter)
    .await;
    reporter.clear();
    let report = result?;

    // Print summary
    println!();
    println!("  Run complete");
    println!("  Run ID:   {}", report.run_id);
    println!("  Executed: {}", report.executed.len());
    println!("  Output:   {}", out_dir.display());
    println!("  Time:     {:.1}s", report.elapsed.as_secs_f64());
    for failure in &report.failed {
        println!("  Failed:   {} ({})", failure.component, failure.error);
    }
    for skipped in &report.skipped {
        println!("  Skipped:  {skipped}");
    }
    println!();

    if !report.is_success() {
        return Err(eyre!(
            "{} component(s) failed, {} skipped",
            report.failed.len(),
            report.skipped.len()
        ));
    }
    Ok(())
}

/// Command-line components, else the config file's list, else the default
/// request.
fn select_components(
    registry: &ComponentRegistry,
    from_cli: Vec<ComponentId>,
    config: &AppConfig,
) -> Result<Vec<ComponentId>> {
    if !from_cli.is_empty() {
        return Ok(from_cli);
    }
    if config.defaults.components.is_empty() {
        return Ok(default_request(registry));
    }
    config
        .defaults
        .components
        .iter()
        .map(|raw| raw.parse::<ComponentId>().map_err(|e| eyre!(e)))
        .collect()
}

/// The graph is emptied before a run, so something in the run must index it.
fn ensure_graph_source(order: &[ComponentId], keep_graph: bool) -> Result<()> {
    if keep_graph || order.iter().any(|id| id.role == Role::Indexer) {
        return Ok(());
    }
    Err(eyre!(
        "no indexer in this run and the graph is reset first; add indexer:kubeapi or \
         indexer:load_resources to --components, or pass --keep-graph"
    ))
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn clear(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, role: Role) {
        self.spinner.set_message(format!("Running {} phase", role.phase_name()));
    }

    fn component_started(&self, id: &ComponentId) {
        self.spinner.set_message(format!("{id}"));
    }

    fn component_finished(&self, id: &ComponentId, outcome: ComponentOutcome) {
        match outcome {
            ComponentOutcome::Succeeded => {}
            ComponentOutcome::Failed => self.spinner.println(format!("  ✗ {id} failed")),
            ComponentOutcome::Skipped => self.spinner.println(format!("  - {id} skipped")),
        }
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// components / settings
// ---------------------------------------------------------------------------

fn cmd_components() -> Result<()> {
    let registry = builtin_registry()?;
    print_components(&registry);
    Ok(())
}

fn print_components(registry: &ComponentRegistry) {
    for component in registry.iter() {
        println!("{}", component.id());
        if !component.documentation().is_empty() {
            println!("    {}", component.documentation());
        }
        for dep in component.settings() {
            let required = if dep.required { "required" } else { "optional" };
            println!("    setting:    {} ({required})", dep.setting.name);
        }
        for dep in component.dependencies() {
            println!("    depends on: {}", dep.id());
        }
    }
}

fn cmd_settings() -> Result<()> {
    let registry = builtin_registry()?;
    for setting in registry.settings().iter() {
        println!("{} [{}]", setting.name, setting.setting_type);
        println!("    key:     {}", setting.key);
        if let Some(default) = setting.default {
            println!("    default: {default}");
        }
        println!("    {}", setting.description);
    }
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

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = load_app_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "workspace-builder",
            "run",
            "--components",
            "indexer:load_resources,renderer:debug",
            "--set",
            "WORKSPACE_NAME=ops",
            "--set",
            "DEFAULT_LOD=1",
            "--continue-on-error",
        ])
        .unwrap();

        match cli.command {
            Command::Run {
                components,
                set,
                continue_on_error,
                keep_graph,
                ..
            } => {
                assert_eq!(
                    components,
                    vec![
                        ComponentId::indexer("load_resources"),
                        ComponentId::renderer("debug")
                    ]
                );
                assert_eq!(set.len(), 2);
                assert!(continue_on_error);
                assert!(!keep_graph);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn bad_component_rejected() {
        assert!(Cli::try_parse_from(["workspace-builder", "run", "-c", "loader"]).is_err());
    }

    #[test]
    fn default_run_needs_only_the_live_cluster_source() {
        let registry = builtin_registry().unwrap();
        let requested = select_components(&registry, Vec::new(), &AppConfig::default()).unwrap();
        let order = resolve_order(&registry, &requested).unwrap();

        assert!(order.contains(&ComponentId::indexer("kubeapi")));
        assert!(!order.contains(&ComponentId::indexer("load_resources")));
        assert!(ensure_graph_source(&order, false).is_ok());

        let required: Vec<&str> = order
            .iter()
            .filter_map(|id| registry.get(id))
            .flat_map(|c| c.settings())
            .filter(|dep| dep.required)
            .map(|dep| dep.setting.name)
            .collect();
        assert!(!required.contains(&"RESOURCE_LOAD_FILE"));
    }

    #[test]
    fn config_list_beats_default_and_cli_beats_config() {
        let registry = builtin_registry().unwrap();
        let mut config = AppConfig::default();
        config.defaults.components = vec!["indexer:load_resources".into()];

        let from_config = select_components(&registry, Vec::new(), &config).unwrap();
        assert_eq!(from_config, vec![ComponentId::indexer("load_resources")]);

        let from_cli =
            select_components(&registry, vec![ComponentId::renderer("debug")], &config).unwrap();
        assert_eq!(from_cli, vec![ComponentId::renderer("debug")]);
    }

    #[test]
    fn run_without_indexer_needs_kept_graph() {
        let registry = builtin_registry().unwrap();
        let order = resolve_order(&registry, &[ComponentId::renderer("debug")]).unwrap();
        assert!(order.iter().all(|id| id.role != Role::Indexer));

        let err = ensure_graph_source(&order, false).unwrap_err();
        assert!(err.to_string().contains("--keep-graph"));
        assert!(ensure_graph_source(&order, true).is_ok());
    }
}
