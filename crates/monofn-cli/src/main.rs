//! # monofn CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Start the runtime (REDIS_OUTPUT_KEY must be set or passed)
//! monofn runtime --script handler.js --output-key monofn-output
//!
//! # Start the dashboard
//! monofn dashboard --key monofn-output --refresh-ms 2000
//!
//! # Invoke the function once (outputs the raw JSON acknowledgment)
//! monofn invoke http://127.0.0.1:8080 --input '{"a": 2, "b": 3}'
//!
//! # Watch the dashboard in the terminal
//! monofn top http://127.0.0.1:8501
//!
//! # Write mock results for the dashboard
//! monofn seed --key monofn-output --count 20
//! ```
//!
//! Every setting also has an environment variable; flags take precedence.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use argh::FromArgs;
use monofn_cli::client::RuntimeClient;
use monofn_cli::validate_http_url;
use monofn_common::config::{self, Overrides};
use monofn_common::store::{OutputMode, RedisStore, ResultStore, StoreConfig};
use monofn_dashboard::{DashboardConfig, DashboardServer, DashboardSnapshot, Poller, SharedSnapshot};
use monofn_runtime::{Executor, HandlerBinding, InputWatcher, RuntimeConfig, RuntimeServer, Worker};
use tokio::sync::watch;

#[derive(FromArgs)]
/// monofn - single-function serverless runtime
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Runtime(RuntimeArgs),
    Dashboard(DashboardArgs),
    Invoke(InvokeArgs),
    Top(TopArgs),
    Seed(SeedArgs),
}

/// Arguments for starting the runtime.
///
/// # Example
///
/// ```bash
/// REDIS_HOST=redis monofn runtime -s /opt/usermodule.js -b 0.0.0.0:8080 --output-key results
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "runtime")]
/// start the function runtime
struct RuntimeArgs {
    /// path to the handler script (env USER_MODULE_PATH)
    ///
    /// The script must define a global function `handler(input, context)`.
    #[argh(option, short = 's')]
    script: Option<String>,

    /// address to bind the HTTP server to (env BIND_ADDR)
    #[argh(option, short = 'b')]
    bind: Option<String>,

    /// key results are written to (env REDIS_OUTPUT_KEY)
    #[argh(option, long = "output-key")]
    output_key: Option<String>,

    /// maximum handler run time in milliseconds (env EXECUTION_TIMEOUT_MS)
    #[argh(option, long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// maximum number of handlers running at once (env MAX_CONCURRENCY)
    #[argh(option, long = "max-concurrency")]
    max_concurrency: Option<usize>,
}

/// Arguments for starting the dashboard.
#[derive(FromArgs)]
#[argh(subcommand, name = "dashboard")]
/// start the results dashboard
struct DashboardArgs {
    /// address to bind the HTTP server to (env BIND_ADDR)
    #[argh(option, short = 'b')]
    bind: Option<String>,

    /// key to poll for results (env REDIS_KEY)
    #[argh(option, short = 'k')]
    key: Option<String>,

    /// poll and page refresh interval in milliseconds (env REFRESH_MS)
    #[argh(option, long = "refresh-ms")]
    refresh_ms: Option<u64>,

    /// number of recent invocations to keep (env HISTORY_LIMIT)
    #[argh(option, long = "history")]
    history: Option<usize>,
}

/// Arguments for invoking the function once.
///
/// Prints the invocation acknowledgment as raw JSON on stdout, suitable for
/// piping to `jq`.
#[derive(FromArgs)]
#[argh(subcommand, name = "invoke")]
/// invoke the function on a runtime
struct InvokeArgs {
    /// address of the runtime, including http:// or https://
    #[argh(positional)]
    server_address: String,

    /// JSON input passed as the handler's first argument
    #[argh(option, short = 'i', default = "\"{}\".into()")]
    input: String,

    /// JSON object passed as the handler's context
    #[argh(option, short = 'c', default = "\"{}\".into()")]
    context: String,
}

/// Arguments for the terminal dashboard view.
///
/// Press `q` or `Q` to quit.
#[derive(FromArgs)]
#[argh(subcommand, name = "top")]
/// watch a dashboard in the terminal
struct TopArgs {
    /// address of the dashboard, including http:// or https://
    #[argh(positional)]
    dashboard_address: String,

    /// refresh interval in milliseconds
    #[argh(option, short = 'i', long = "interval", default = "1000")]
    interval_ms: u64,
}

/// Arguments for seeding the store with mock results.
#[derive(FromArgs)]
#[argh(subcommand, name = "seed")]
/// write mock results to the store
struct SeedArgs {
    /// key to write (env REDIS_KEY)
    #[argh(option, short = 'k')]
    key: Option<String>,

    /// number of results to write
    #[argh(option, short = 'n', default = "20")]
    count: usize,

    /// append to a list instead of storing one JSON array
    #[argh(switch)]
    list: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // invoke prints JSON for scripting and top owns the terminal
    if !matches!(cli.command, Commands::Invoke(_) | Commands::Top(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Runtime(args) => run_runtime(args).await,
        Commands::Dashboard(args) => run_dashboard(args).await,
        Commands::Invoke(args) => run_invoke(args).await,
        Commands::Top(args) => {
            validate_http_url(&args.dashboard_address, "dashboard address")?;
            monofn_cli::top::run_top(args.dashboard_address, args.interval_ms).await
        }
        Commands::Seed(args) => run_seed(args).await,
    }
}

/// Flips the returned receiver to `true` on Ctrl-C.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(forward_signal(tokio::signal::ctrl_c(), tx));
    rx
}

/// Sends `true` once `signal` fires. If the signal cannot be listened for, the
/// process keeps running and the sender is held so receivers never see it close.
async fn forward_signal<F>(signal: F, tx: watch::Sender<bool>)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            tracing::info!("Shutting down");
            let _ = tx.send(true);
        }
        Err(e) => {
            tracing::error!("Cannot listen for Ctrl-C, running until killed: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

async fn until_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn check_store(store: &RedisStore) {
    match store.ping().await {
        Ok(()) => tracing::info!("Connected to store at {}", store.config().addr()),
        Err(e) => tracing::warn!("Store at {} is not reachable yet: {}", store.config().addr(), e),
    }
}

async fn run_runtime(args: RuntimeArgs) -> Result<()> {
    let env = Overrides::new(config::process_env())
        .set("USER_MODULE_PATH", args.script)
        .set("BIND_ADDR", args.bind)
        .set("REDIS_OUTPUT_KEY", args.output_key)
        .set("EXECUTION_TIMEOUT_MS", args.timeout_ms)
        .set("MAX_CONCURRENCY", args.max_concurrency);
    let config = RuntimeConfig::from_lookup(&env)?;

    tracing::info!("Starting monofn runtime with script: {}", config.script_path.display());
    tracing::info!(
        "Writing results to '{}' ({} mode)",
        config.output.key,
        config.output.mode
    );
    tracing::info!(
        "Execution timeout: {}ms, max concurrency: {}",
        config.limits.execution_timeout.as_millis(),
        config.limits.max_concurrency
    );

    let binding = HandlerBinding::load(&config.script_path, &config.limits)?;
    let store = Arc::new(RedisStore::new(config.store.clone()));
    check_store(&store).await;

    let executor = Executor::new(Arc::new(binding), config.limits.clone());
    let worker = Arc::new(Worker::new(executor, store, config.output.clone()));
    let shutdown = shutdown_on_ctrl_c();

    let watcher = config.input.clone().map(|input| {
        tracing::info!("Watching input key '{}'", input.key);
        tokio::spawn(InputWatcher::new(worker.clone(), input).run(shutdown.clone()))
    });

    RuntimeServer::new(worker)
        .run(config.bind_addr, until_shutdown(shutdown))
        .await?;

    if let Some(handle) = watcher {
        let _ = handle.await;
    }
    Ok(())
}

async fn run_dashboard(args: DashboardArgs) -> Result<()> {
    let env = Overrides::new(config::process_env())
        .set("BIND_ADDR", args.bind)
        .set("REDIS_KEY", args.key)
        .set("REFRESH_MS", args.refresh_ms)
        .set("HISTORY_LIMIT", args.history);
    let config = DashboardConfig::from_lookup(&env)?;

    tracing::info!(
        "Starting monofn dashboard for key '{}' (refresh {}ms)",
        config.key,
        config.refresh.as_millis()
    );

    let store = Arc::new(RedisStore::new(config.store.clone()));
    check_store(&store).await;

    let shared = SharedSnapshot::new(DashboardSnapshot::empty(config.key.clone()));
    let poller = Poller::new(store, &config, shared.clone());
    let shutdown = shutdown_on_ctrl_c();
    let polling = tokio::spawn(poller.run(shutdown.clone()));

    DashboardServer::new(shared, config.refresh)
        .run(config.bind_addr, until_shutdown(shutdown))
        .await?;

    let _ = polling.await;
    Ok(())
}

/// Executes the `invoke` subcommand. Handler errors are reported inside the
/// acknowledgment; only transport and protocol failures exit non-zero.
async fn run_invoke(args: InvokeArgs) -> Result<()> {
    validate_http_url(&args.server_address, "runtime address")?;

    let input: serde_json::Value =
        serde_json::from_str(&args.input).context("Invalid JSON in --input")?;
    let context: serde_json::Value =
        serde_json::from_str(&args.context).context("Invalid JSON in --context")?;
    if !context.is_object() {
        anyhow::bail!("--context must be a JSON object");
    }

    let ack = RuntimeClient::new(args.server_address)
        .invoke(input, context)
        .await?;

    println!("{}", serde_json::to_string(&ack)?);
    Ok(())
}

async fn run_seed(args: SeedArgs) -> Result<()> {
    let env = Overrides::new(config::process_env()).set("REDIS_KEY", args.key);
    let key = config::string_or(&env, "REDIS_KEY", monofn_dashboard::config::DEFAULT_KEY);
    let store_config = StoreConfig::from_env(&env)?;
    let store = RedisStore::new(store_config.clone());

    let mode = if args.list { OutputMode::List } else { OutputMode::Latest };
    let results = monofn_cli::seed::mock_results(args.count);
    monofn_cli::seed::seed(&store, &key, mode, &results)
        .await
        .with_context(|| format!("Failed to seed '{}' on {}", key, store_config.addr()))?;

    tracing::info!(
        "Seeded {} results into '{}' on {}/{} ({} mode)",
        results.len(),
        key,
        store_config.addr(),
        store_config.db,
        mode
    );
    Ok(())
}
