use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use casebot::config as cfg;
use casebot::engine::{ActionInfo, register};
use casebot::executor::Driver;

/// Casebot CLI
#[derive(Debug, Parser)]
#[command(
    name = casebot::PKG_NAME,
    version = casebot::PKG_VERSION,
    about = "Run declarative action scripts against a shared context"
)]
struct Args {
    /// Path to the global JSON document
    #[arg(short = 'c', long = "conf", default_value = "global.json")]
    conf: PathBuf,

    /// Script files to run instead of scanning the global `cases` directory
    scripts: Vec<PathBuf>,

    /// Leave the context (and its resources) open after the run
    #[arg(long = "debug")]
    debug: bool,

    /// Set log level (e.g., trace, debug, info, warn, error). Overrides RUST_LOG.
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Print the usage of every registered action and exit
    #[arg(long = "list-actions")]
    list_actions: bool,

    /// Print the JSON Schema of the global and case documents and exit
    #[arg(long = "print-schema")]
    print_schema: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    casebot::init_tracing(args.log_level.as_deref());

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    if args.print_schema {
        cfg::write_schema_to_writer(std::io::stdout().lock())?;
        return Ok(());
    }

    let registry = register()?;
    if args.list_actions {
        print_actions(registry.list());
        return Ok(());
    }

    info!(
        version = casebot::PKG_VERSION,
        conf = %args.conf.display(),
        scripts = args.scripts.len(),
        "Starting casebot"
    );
    let global = cfg::load_global_from_path_async(&args.conf).await?;
    debug!(target: "casebot", actions = registry.len(), "Global document loaded");

    let mut driver = Driver::new(registry, global);
    driver.set_debug(args.debug);

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let scripts = args.scripts;
    let mut task = tokio::task::spawn_blocking(move || driver.run(&scripts, &token));

    tokio::select! {
        joined = &mut task => joined?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, stopping after the current action");
            cancel.cancel();
            task.await?
        }
    }
}

/// Usage text grouped by category, then identity.
fn print_actions(actions: Vec<ActionInfo>) {
    let mut grouped: BTreeMap<&str, Vec<ActionInfo>> = BTreeMap::new();
    for info in actions {
        grouped.entry(info.category).or_default().push(info);
    }
    for (category, mut infos) in grouped {
        infos.sort_by_key(|i| i.identity);
        println!("# {category}");
        for info in infos {
            println!("{}", info.usage);
        }
    }
}
