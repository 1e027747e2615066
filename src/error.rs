use std::{fmt::Display, io, path::PathBuf};

/// Which part of a selector an [`DvdError::IndexOutOfRange`] refers to.
///
/// [`DvdError::IndexOutOfRange`]: enum.DvdError.html#variant.IndexOutOfRange
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IndexKind {
    Title,
    Chapter,
    Angle,
}

impl Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexKind::Title => write!(f, "title"),
            IndexKind::Chapter => write!(f, "chapter"),
            IndexKind::Angle => write!(f, "angle"),
        }
    }
}

/// The error type of this crate.
///
/// Desynchronized navigation data is not represented here: it is recovered
/// locally by the traversal engine and only shows up in the logs and in
/// [`TraversalStats`].
///
/// [`TraversalStats`]: ../nav/struct.TraversalStats.html
#[derive(Debug, thiserror::Error)]
pub enum DvdError {
    /// An IFO file could not be opened or parsed.
    #[error("invalid disc structure in {what}: {reason}")]
    DiscStructure { what: String, reason: String },

    /// A title, chapter or angle outside the bounds found on the disc. Values
    /// are 1-based, as a user would type them.
    #[error("{kind} {value} out of range (disc has {max})")]
    IndexOutOfRange {
        kind: IndexKind,
        value: u32,
        max: u32,
    },

    /// Reading sectors from the medium failed.
    #[error("failed to read {count} sector(s) at block {lba}")]
    SectorRead {
        lba: u32,
        count: u32,
        #[source]
        source: io::Error,
    },

    /// The advisory device lock was not obtained within the retry bound.
    #[error("lock {} still held by another process after {attempts} attempts", path.display())]
    LockTimeout { path: PathBuf, attempts: u32 },

    /// Lock acquisition was cancelled before it completed.
    #[error("lock acquisition cancelled")]
    LockCancelled,

    /// The lock marker file could not be created, read or removed.
    #[error("lock file {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The output sink rejected data.
    #[error("failed to write output: {0}")]
    Write(#[source] io::Error),

    /// A `title[,chapter[-chapter2][,angle]]` string could not be parsed.
    #[error("invalid selector {input:?}: {reason}")]
    Selector { input: String, reason: &'static str },

    /// Any other I/O error, e.g. while opening the disc directory.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DvdError {
    pub(crate) fn structure<W: Into<String>, R: Display>(what: W, reason: R) -> Self {
        DvdError::DiscStructure {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DvdError>;
