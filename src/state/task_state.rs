/// Task state definitions for tracking crawl progress
///
/// A task is the scheduling record attached to a stored entity (today always a
/// URL). Its state, together with its last-update timestamp, decides whether the
/// scheduler picks it up.
use std::fmt;

/// Represents the current state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Task was created and has never been attempted
    New,

    /// Task is being processed (or was interrupted mid-processing)
    Running,

    /// Fetch and link storage succeeded
    Completed,

    /// Fetch or parse failed, or the page had no content
    Failed,

    /// Fetch exceeded its deadline
    Timeout,
}

impl TaskState {
    /// Returns true if the task should be picked up without waiting for expiry
    ///
    /// `Running` is included: a running task found in the store belongs to a
    /// crawl that was interrupted and must be resumed.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::New | Self::Running)
    }

    /// Returns true if the task finished an attempt (successfully or not)
    ///
    /// Settled tasks become eligible again once they expire.
    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// Returns true if this represents a failed attempt
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed | Self::Timeout)
    }

    /// Converts the task state to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }

    /// Parses a task state from a database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "timeout" => Some(Self::Timeout),
            _ => None,
        }
    }

    /// Returns all possible task states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::New,
            Self::Running,
            Self::Completed,
            Self::Failed,
            Self::Timeout,
        ]
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// The operation a task is (or was last) performing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskAction {
    /// No operation attempted yet
    Unknown,

    /// Fetch the page, store its content and follow its links
    Crawl,
}

impl TaskAction {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Crawl => "crawl",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(Self::Unknown),
            "crawl" => Some(Self::Crawl),
            _ => None,
        }
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// The kind of entity a task refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefType {
    Url,
}

impl RefType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Url => "url",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "url" => Some(Self::Url),
            _ => None,
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
