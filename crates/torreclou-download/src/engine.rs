//! `TorrentEngine`: the capability contract (§9) between the Download Stage
//! and whatever BitTorrent implementation backs it, so the monitoring loop
//! (§4.7 step 7) and the selective-file logic are unit-testable without a
//! live swarm. `librqbit` is the concrete, production implementation.

use async_trait::async_trait;

use crate::selection::FilePriority;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Downloading,
    Seeding,
    Error,
}

#[derive(Debug, Clone)]
pub struct EngineProgress {
    pub state: EngineState,
    /// 0.0-100.0.
    pub percent: f64,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TorrentFile {
    pub relative_path: String,
    pub length: u64,
}

#[derive(Debug, Clone)]
pub struct TorrentInfo {
    pub name: String,
    pub total_bytes: u64,
    pub files: Vec<TorrentFile>,
    /// §4.7 step 2: BitTorrent v2-only torrents fail the job with
    /// `V2OnlyNotSupported`.
    pub is_v2_only: bool,
}

/// One running download, handed back by `TorrentEngine::start`.
#[async_trait]
pub trait TorrentHandle: Send + Sync {
    async fn progress(&self) -> anyhow::Result<EngineProgress>;
    async fn set_file_priorities(&self, priorities: &[(String, FilePriority)]) -> anyhow::Result<()>;
    async fn save_fastresume(&self) -> anyhow::Result<()>;
    async fn pause(&self) -> anyhow::Result<()>;
}

/// The engine itself: loads torrent metadata and starts a handle bound to a
/// download directory (§4.7 steps 2 and 4).
#[async_trait]
pub trait TorrentEngine: Send + Sync {
    /// Parses a `.torrent` file or magnet/HTTPS source (§4.7 step 2).
    /// Returns `V2OnlyNotSupported` via the caller's classification of the
    /// returned `TorrentInfo.is_v2_only` flag.
    async fn load(&self, torrent_source: &str) -> anyhow::Result<TorrentInfo>;

    /// Starts (or resumes, if fast-resume state already exists in
    /// `download_path`) the download with auto-save fast-resume and DHT
    /// cache enabled (§4.7 step 4).
    async fn start(&self, torrent_source: &str, download_path: &str) -> anyhow::Result<Box<dyn TorrentHandle>>;
}
