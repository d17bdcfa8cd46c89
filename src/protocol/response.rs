//! Provider response classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified outcome of one update attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateResult {
    /// The address was updated.
    Success,
    /// The address already had the requested value.
    NoChange,
    /// Username or token rejected.
    NoAuth,
    /// Dynamic DNS is not enabled for the domain.
    NoService,
    /// A request parameter was invalid.
    IllegalInput,
    /// Updated again before the provider's minimum interval.
    TooSoon,
    /// Partner information missing or not recognized.
    NoPartner,
    /// Generic provider-side error.
    ServerError,
    /// None of the known codes were found.
    #[serde(rename = "UNKNOWN_RESPONSE")]
    Unknown,
    /// Failure on this side before a response was read.
    LocalError,
}

impl UpdateResult {
    /// Only `SUCCESS` and `NO_CHANGE` count as success.
    pub fn is_success(self) -> bool {
        matches!(self, UpdateResult::Success | UpdateResult::NoChange)
    }

    /// The provider code for this result.
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateResult::Success => "SUCCESS",
            UpdateResult::NoChange => "NO_CHANGE",
            UpdateResult::NoAuth => "NO_AUTH",
            UpdateResult::NoService => "NO_SERVICE",
            UpdateResult::IllegalInput => "ILLEGAL_INPUT",
            UpdateResult::TooSoon => "TOO_SOON",
            UpdateResult::NoPartner => "NO_PARTNER",
            UpdateResult::ServerError => "SERVER_ERROR",
            UpdateResult::Unknown => "UNKNOWN_RESPONSE",
            UpdateResult::LocalError => "LOCAL_ERROR",
        }
    }
}

impl fmt::Display for UpdateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token groups checked in order. The bare `>ERROR<` is last so it cannot
/// shadow a more specific code.
const FAILURE_TOKENS: &[(&[&str], UpdateResult)] = &[
    (&[">NO_AUTH<", ">NOACCESS<"], UpdateResult::NoAuth),
    (&[">NOSERVICE<", ">NO_SERVICE<"], UpdateResult::NoService),
    (&[">ILLEGAL<", ">ILLEGAL_INPUT<"], UpdateResult::IllegalInput),
    (&[">TOOSOON<", ">TOO_FREQ<"], UpdateResult::TooSoon),
    (&[">NO_PARTNER<", ">NOPARTNER<"], UpdateResult::NoPartner),
    (&[">ERROR<"], UpdateResult::ServerError),
];

/// Classify a raw response body, returning `(success, result)`.
pub fn classify(body: &str) -> (bool, UpdateResult) {
    if body.contains(">OK<") || body.contains(">NOERROR<") {
        if body.contains(" updated to ") {
            return (true, UpdateResult::Success);
        }
        return (true, UpdateResult::NoChange);
    }

    FAILURE_TOKENS
        .iter()
        .find(|(tokens, _)| tokens.iter().any(|t| body.contains(t)))
        .map(|&(_, result)| (false, result))
        .unwrap_or((false, UpdateResult::Unknown))
}
