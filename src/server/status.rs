//! Cluster status as reported by `pg_ctl status`.

use std::fmt;

/// Observed state of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The state could not be determined.
    Unknown,
    /// The cluster exists and no server process is attached to it.
    Stopped,
    /// A server process is running against the cluster.
    Running,
    /// `pg_ctl` rejected the data directory.
    Invalid,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Invalid => "invalid",
        };
        f.write_str(name)
    }
}
