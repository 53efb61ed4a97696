//! Named background-task queues (§4.6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    Torrents,
    Googledrive,
    S3,
    Sync,
    Default,
}

impl QueueName {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueName::Torrents => "torrents",
            QueueName::Googledrive => "googledrive",
            QueueName::S3 => "s3",
            QueueName::Sync => "sync",
            QueueName::Default => "default",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "torrents" => QueueName::Torrents,
            "googledrive" => QueueName::Googledrive,
            "s3" => QueueName::S3,
            "sync" => QueueName::Sync,
            "default" => QueueName::Default,
            _ => return None,
        })
    }

    pub fn all() -> [QueueName; 5] {
        [
            QueueName::Torrents,
            QueueName::Googledrive,
            QueueName::S3,
            QueueName::Sync,
            QueueName::Default,
        ]
    }
}
