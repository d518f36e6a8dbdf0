use serde::{Deserialize, Serialize};

/// Which identity dimension a notification addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "target")]
pub enum NotificationTarget {
    /// Send to a single user
    User(String),
    /// Send to every user connected under a site
    Site(String),
    /// Send to every user connected under a company
    Company(String),
}

impl NotificationTarget {
    /// The addressed identity value
    pub fn id(&self) -> &str {
        match self {
            Self::User(id) | Self::Site(id) | Self::Company(id) => id,
        }
    }

    /// Target class label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Site(_) => "site",
            Self::Company(_) => "company",
        }
    }
}

/// One notification to relay
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub target: NotificationTarget,
    /// Event name recipients must have enabled
    pub event_cmd: String,
    /// Message payload forwarded verbatim
    pub message: String,
}

impl DispatchRequest {
    pub(crate) fn is_valid(&self) -> bool {
        !self.target.id().is_empty() && !self.event_cmd.is_empty() && !self.message.is_empty()
    }
}

/// Outcome of a dispatch attempt.
///
/// `NoTargets` is a non-error outcome: the request was well-formed but no
/// connected recipient passed the identity + preference filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    /// Required fields missing or empty
    Invalid,
    /// Zero eligible recipients (unknown target id included)
    NoTargets,
    /// Message handed to this many connections
    Delivered(usize),
}

impl DispatchResult {
    pub fn delivered_count(&self) -> usize {
        match self {
            Self::Delivered(count) => *count,
            _ => 0,
        }
    }
}
