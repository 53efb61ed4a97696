//! Download Stage (§4.7): BitTorrent download with selective-file priority,
//! periodic fast-resume checkpointing, and progress reporting.

pub mod engine;
pub mod librqbit_engine;
pub mod selection;
pub mod stage;

pub use engine::{EngineProgress, EngineState, TorrentEngine, TorrentHandle, TorrentInfo};
pub use librqbit_engine::LibrqbitEngine;
pub use selection::{assign_priorities, is_selected, FilePriority};
pub use stage::{DownloadStage, DownloadStageError};
