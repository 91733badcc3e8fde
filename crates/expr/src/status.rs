// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job status tokens recognized in dependency expressions.

use serde::{Deserialize, Serialize};

/// The reserved status keywords an expression atom may reference.
///
/// These are the uppercase tokens that appear on the right side of an atom
/// (`build=COMPLETED`). Lowercase or mixed-case spellings are rejected by the
/// parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Completed,
    Failed,
    Running,
    Pending,
    Stopped,
    Cancelled,
}

impl Status {
    /// All reserved statuses, in declaration order.
    pub const ALL: [Status; 6] = [
        Status::Completed,
        Status::Failed,
        Status::Running,
        Status::Pending,
        Status::Stopped,
        Status::Cancelled,
    ];

    /// The uppercase keyword form used in expression source text.
    pub fn keyword(&self) -> &'static str {
        match self {
            Status::Completed => "COMPLETED",
            Status::Failed => "FAILED",
            Status::Running => "RUNNING",
            Status::Pending => "PENDING",
            Status::Stopped => "STOPPED",
            Status::Cancelled => "CANCELLED",
        }
    }

    /// Parse an uppercase status keyword. Case-sensitive.
    pub fn from_keyword(s: &str) -> Option<Status> {
        match s {
            "COMPLETED" => Some(Status::Completed),
            "FAILED" => Some(Status::Failed),
            "RUNNING" => Some(Status::Running),
            "PENDING" => Some(Status::Pending),
            "STOPPED" => Some(Status::Stopped),
            "CANCELLED" => Some(Status::Cancelled),
            _ => None,
        }
    }

    /// Whether this status is terminal (the job will never leave it).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Completed | Status::Failed | Status::Stopped | Status::Cancelled
        )
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
