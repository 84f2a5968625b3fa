use std::path::PathBuf;

use clap::Parser;
use reminder_chain::daemon::{self, DaemonOptions};
use reminder_chain::error::Result;

#[derive(Parser, Debug)]
#[command(name = "reminder-chaind")]
#[command(about = "Reminder scheduler daemon")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("REMINDER_CHAIN_GIT_SHA"), ")"))]
struct Cli {
    /// SQLite database; overrides the config file.
    #[arg(long, env = "REMINDER_CHAIN_DB")]
    db: Option<String>,

    #[arg(long, env = "REMINDER_CHAIN_CONFIG")]
    config: Option<PathBuf>,

    /// Replace all reminders with the records in this JSON file before serving.
    #[arg(long, value_name = "FILE")]
    import: Option<PathBuf>,

    /// Export all reminders to FILE (or a dated file inside a directory) and exit.
    /// Without a value the dated file goes to the backups directory.
    #[arg(long, value_name = "FILE", num_args = 0..=1)]
    export: Option<Option<PathBuf>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    reminder_chain::logging::init_tracing("reminder_chaind");
    let cli = Cli::parse();

    daemon::run(DaemonOptions {
        db_path: cli.db,
        config_path: cli.config,
        import: cli.import,
        export: cli
            .export
            .map(|path| path.unwrap_or_else(reminder_chain::runtime_paths::default_export_dir)),
    })
    .await
}
