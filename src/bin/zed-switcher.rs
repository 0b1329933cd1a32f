use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::info;
use zed_switcher::common::config::Config;
use zed_switcher::common::log;
use zed_switcher::ipc::server;
use zed_switcher::switcher::Switcher;
use zed_switcher::switcher::activation::ActivationTarget;
use zed_switcher::sys::dialog::MainThread;

#[derive(Parser)]
#[command(version, about = "Window switcher for the Zed editor")]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve JSON-lines requests on stdin/stdout for the UI process.
    Serve,
    /// List open editor windows.
    Windows,
    /// List workspaces known to the editor.
    Workspaces,
    /// Print the saved project list.
    Projects,
    /// Raise the window for a path or name, opening it if needed.
    Open { target: String },
    /// Open the Nth saved project (1-based).
    Nth { index: usize },
    /// Pick a folder and print it as a project entry.
    Pick,
}

fn main() -> anyhow::Result<()> {
    sigpipe::reset();
    log::init_logging();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting tokio runtime")?;

    // Native dialogs must be shown from the main thread, so the runtime is
    // driven from a worker and main services dialog jobs until it is done.
    let (main_thread, main_loop) = MainThread::channel();
    let worker = thread::Builder::new()
        .name("runtime".into())
        .spawn(move || {
            let result = runtime.block_on(run(cli.command, config, main_thread));
            drop(runtime);
            result
        })
        .context("starting runtime thread")?;
    main_loop.run();
    worker.join().map_err(|_| anyhow!("runtime thread panicked"))?
}

async fn run(command: Command, config: Config, main_thread: MainThread) -> anyhow::Result<()> {
    let switcher = Switcher::new(config, main_thread);
    match command {
        Command::Serve => serve(switcher).await,
        Command::Windows => print(&switcher.list_windows().await),
        Command::Workspaces => print(&switcher.workspaces().await),
        Command::Projects => print(&switcher.get_projects().await?),
        Command::Open { target } => {
            print(&switcher.open_project(&ActivationTarget::parse(&target)).await)
        }
        Command::Nth { index } => print(&switcher.activate_nth(index).await?),
        Command::Pick => print(&switcher.pick_folder().await),
    }
}

async fn serve(switcher: Switcher) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let frontmost = switcher.spawn_frontmost_poller(cancel.child_token());
    let switcher = Arc::new(switcher);
    info!("serving requests on stdin");

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = server::serve(switcher, frontmost, stdin, tokio::io::stdout()) => {
            result.context("request stream failed")?;
        }
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }
    cancel.cancel();
    Ok(())
}

fn print(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
