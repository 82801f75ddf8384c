use crate::demo::{run_demo, run_reconcile, DemoArgs, ReconcileArgs};
use crate::server;
use campusflow::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "CampusFlow Admissions Platform",
    about = "Run the multi-tenant admissions service and its reconciliation worker",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run one reconciliation cycle over seeded fixture data and print the report
    Reconcile(ReconcileArgs),
    /// Run an end-to-end CLI demo covering intake, reconciliation and stage transitions
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Start without the background reconciliation worker
    #[arg(long)]
    pub(crate) no_worker: bool,
    /// Override how long the worker sleeps between reconciliation cycles
    #[arg(long)]
    pub(crate) worker_interval_seconds: Option<u64>,
    /// Override how many cached prospections one cycle promotes
    #[arg(long)]
    pub(crate) worker_batch_size: Option<usize>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Reconcile(args) => run_reconcile(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}
