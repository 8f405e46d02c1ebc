use thiserror::Error;

use crate::classifier::ClassifierError;
use crate::feed::FeedError;
use crate::search::SearchError;

/// Startup and wiring failures. Per-claim faults never surface here.
#[derive(Error, Debug)]
pub enum TruthGuardError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Feed client error: {0}")]
    Feed(#[from] FeedError),

    #[error("Search client error: {0}")]
    Search(#[from] SearchError),

    #[error("Classifier client error: {0}")]
    Classifier(#[from] ClassifierError),
}
