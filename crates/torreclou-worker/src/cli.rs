//! Startup flags only — per the external-interface contract, this binary is
//! a long-running process with no interactive commands beyond the ones that
//! shape its environment at launch.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "torreclou-worker")]
#[command(about = "Background worker: download, upload, sync, and recovery stages for one or more queues.")]
pub struct Cli {
    /// Comma-separated queue names to serve (default: all of torrents,
    /// googledrive, s3, sync). Overrides `TORRECLOU_QUEUES`.
    #[arg(long, value_delimiter = ',')]
    pub queues: Option<Vec<String>>,

    /// Postgres connection string. Overrides `DATABASE_URL`.
    #[arg(long)]
    pub database_url: Option<String>,

    /// Redis connection string. Overrides `REDIS_URL`.
    #[arg(long)]
    pub redis_url: Option<String>,

    /// Root directory under which `<jobId>/` download directories are
    /// created. Overrides `TORRENT_ROOT`.
    #[arg(long)]
    pub torrent_root: Option<String>,

    /// Concurrent tasks processed per queue's worker pool.
    #[arg(long, default_value = "4")]
    pub concurrency: usize,

    /// Increase log verbosity (`-v` debug, `-vv` trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
