//! Structured logging to stderr, the convention for a long-running daemon
//! process rather than the teacher's file-under-XDG-state-dir CLI logging —
//! this process is meant to run under a supervisor that already captures
//! stderr (systemd, a container runtime), not to manage its own log file.

use tracing_subscriber::EnvFilter;

pub fn init(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info,torreclou=info",
        1 => "info,torreclou=debug",
        _ => "debug,torreclou=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}
