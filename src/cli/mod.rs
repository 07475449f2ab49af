use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "tracksync",
    about = "Sync the trailing days of Toggl time entries into a warehouse table"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum Commands {
    /// Sync the rolling window once (the default)
    Run,
    /// Stay resident and sync once a day at `sync_time`
    Service,
    /// Check configuration without contacting any service
    Doctor,
}
