use std::path::PathBuf;

use thiserror::Error;

/// Library error type for schedule scanning and render queueing.
#[derive(Debug, Error)]
pub enum Error {
    /// A directory of the media tree could not be listed; the whole rescan is abandoned.
    #[error("failed to list {}: {source}", path.display())]
    List {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// A folder or file name does not follow the expected naming pattern.
    #[error("malformed name {name:?}: expected {expected}")]
    MalformedName { name: String, expected: &'static str },

    /// The consumer side of a render or orphan queue has shut down.
    #[error("{0} queue closed")]
    QueueClosed(&'static str),
}

impl Error {
    pub(crate) fn malformed(name: &str, expected: &'static str) -> Self {
        Self::MalformedName {
            name: name.to_string(),
            expected,
        }
    }
}
