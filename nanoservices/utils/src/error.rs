use std::time::Duration;
use thiserror::Error;

/// Error type returned by user-supplied capabilities (inlets, outlets, processors, hooks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Phase of a link's work in which a node failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Pull,
    Process,
    Batch,
    Push,
    Start,
    Shutdown,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Pull => "pull",
            Stage::Process => "process",
            Stage::Batch => "batch",
            Stage::Push => "push",
            Stage::Start => "on_start",
            Stage::Shutdown => "on_shutdown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    /// A node failed. The original error is kept as `source()`.
    #[error("{stage} failed for `{node}` in {context}: {source}")]
    Node {
        stage: Stage,
        node: String,
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("transfer panicked in {link}: {message}")]
    Panicked { link: String, message: String },

    #[error("failed to build transfer runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl TransferError {
    pub fn node(
        stage: Stage,
        node: impl Into<String>,
        context: impl Into<String>,
        source: BoxError,
    ) -> Self {
        TransferError::Node {
            stage,
            node: node.into(),
            context: context.into(),
            source,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            TransferError::Node { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The error raised by the failing node, if any.
    pub fn node_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            TransferError::Node { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("link already contains inlet: {0}")]
    DuplicateInlet(String),

    #[error("link already contains outlet: {0}")]
    DuplicateOutlet(String),

    #[error("link does not contain inlet: {0}")]
    MissingInlet(String),

    #[error("link does not contain outlet: {0}")]
    MissingOutlet(String),
}

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("planner already contains link: {0}")]
    DuplicateLink(String),

    #[error("planner does not contain link: {0}")]
    MissingLink(String),

    #[error(
        "link interval must be greater than or equal to refresh interval. Link interval: {interval:?}, refresh interval: {refresh:?}"
    )]
    ScheduleInterval { interval: Duration, refresh: Duration },

    #[error("invalid interval {interval:?} for link {link}")]
    InvalidInterval { link: String, interval: Duration },

    #[error("scheduler is not running")]
    NotRunning,

    #[error("failed to build scheduler runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("{source}\n\nRaised when executing {link}")]
    Transfer {
        link: String,
        #[source]
        source: TransferError,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Transfer Error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Link Error: {0}")]
    Link(#[from] LinkError),

    #[error("Planner Error: {0}")]
    Planner(#[from] PlannerError),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}
