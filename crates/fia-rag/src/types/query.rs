//! Query lifecycle types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of a single `ask` call.
///
/// `Received → Embedding → Searching → Composing → Done`, with `Failed` reachable
/// from every non-terminal stage. Stages are never skipped or repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStage {
    Received,
    Embedding,
    Searching,
    Composing,
    Done,
    Failed,
}

impl QueryStage {
    /// The stage that follows this one on the success path
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Received => Some(Self::Embedding),
            Self::Embedding => Some(Self::Searching),
            Self::Searching => Some(Self::Composing),
            Self::Composing => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Embedding => "embedding",
            Self::Searching => "searching",
            Self::Composing => "composing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Recorded stage transitions of one query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTrace {
    stages: Vec<QueryStage>,
}

impl Default for QueryTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryTrace {
    /// Start a trace in `Received`
    pub fn new() -> Self {
        Self {
            stages: vec![QueryStage::Received],
        }
    }

    pub fn current(&self) -> QueryStage {
        self.stages.last().copied().unwrap_or(QueryStage::Received)
    }

    pub fn stages(&self) -> &[QueryStage] {
        &self.stages
    }

    /// Move to the next success-path stage. Returns the new stage.
    pub fn advance(&mut self) -> QueryStage {
        let current = self.current();
        match current.next() {
            Some(next) => {
                tracing::debug!("query stage {} -> {}", current, next);
                self.stages.push(next);
                next
            }
            None => current,
        }
    }

    /// Mark the query failed in its current stage
    pub fn fail(&mut self) {
        let current = self.current();
        if !current.is_terminal() {
            tracing::debug!("query stage {} -> failed", current);
            self.stages.push(QueryStage::Failed);
        }
    }

    /// Stage in which the query failed, if it did
    pub fn failed_during(&self) -> Option<QueryStage> {
        match self.stages.as_slice() {
            [.., before, QueryStage::Failed] => Some(*before),
            _ => None,
        }
    }
}
