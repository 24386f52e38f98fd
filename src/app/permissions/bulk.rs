use serde::Serialize;

use crate::app::error::AppError;
use crate::app::models::{Permission, PermissionSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkGrantState {
    Idle,
    Confirming,
    Granting { index: usize },
    Failed { index: usize, error: String },
    Done,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BulkGrantOutcome {
    NoSelection,
    NothingToGrant,
    Cancelled {
        pending: usize,
    },
    Completed {
        granted: Vec<Permission>,
    },
    /// Everything in `granted` stays granted; nothing is rolled back.
    Failed {
        granted: Vec<Permission>,
        failed: Permission,
        error: String,
    },
}

impl BulkGrantOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, BulkGrantOutcome::Failed { .. })
    }

    /// A failed grant or a missing selection is an error; declining the
    /// prompt and having nothing to grant are not.
    pub fn into_result(self, trace_id: &str) -> Result<(), AppError> {
        match self {
            BulkGrantOutcome::Failed { error, .. } => Err(AppError::dependency(error, trace_id)),
            BulkGrantOutcome::NoSelection => Err(AppError::no_selection(trace_id)),
            BulkGrantOutcome::NothingToGrant
            | BulkGrantOutcome::Cancelled { .. }
            | BulkGrantOutcome::Completed { .. } => Ok(()),
        }
    }
}

/// One pass of "grant everything that is missing".
///
/// `Idle -> Confirming -> Granting(0) -> .. -> Granting(n-1) -> Done`, with
/// `Granting(i) -> Failed` on the first error and `Confirming -> Cancelled`
/// when the operator declines. Grants are issued one at a time in queue order.
pub struct BulkGrant {
    queue: Vec<Permission>,
    granted: Vec<Permission>,
    state: BulkGrantState,
}

impl BulkGrant {
    pub fn from_set(set: &PermissionSet) -> Self {
        Self {
            queue: set.missing(),
            granted: Vec::new(),
            state: BulkGrantState::Idle,
        }
    }

    pub fn state(&self) -> &BulkGrantState {
        &self.state
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn confirmation_message(&self) -> String {
        format!("Grant {} missing permissions?", self.queue.len())
    }

    pub fn request_confirmation(&mut self) {
        if self.state == BulkGrantState::Idle {
            self.state = BulkGrantState::Confirming;
        }
    }

    pub fn confirm(&mut self, approved: bool) {
        if self.state != BulkGrantState::Confirming {
            return;
        }
        self.state = if !approved {
            BulkGrantState::Cancelled
        } else if self.queue.is_empty() {
            BulkGrantState::Done
        } else {
            BulkGrantState::Granting { index: 0 }
        };
    }

    /// The permission to grant next, if the pass is still running.
    pub fn current(&self) -> Option<&Permission> {
        match self.state {
            BulkGrantState::Granting { index } => self.queue.get(index),
            _ => None,
        }
    }

    /// Records the result of granting [`Self::current`].
    pub fn record(&mut self, error: Option<String>) {
        let BulkGrantState::Granting { index } = self.state else {
            return;
        };
        if let Some(error) = error {
            self.state = BulkGrantState::Failed { index, error };
            return;
        }
        if let Some(permission) = self.queue.get(index) {
            let mut granted = permission.clone();
            granted.granted = true;
            self.granted.push(granted);
        }
        let next = index + 1;
        self.state = if next >= self.queue.len() {
            BulkGrantState::Done
        } else {
            BulkGrantState::Granting { index: next }
        };
    }

    pub fn granted(&self) -> &[Permission] {
        &self.granted
    }

    pub fn into_outcome(self) -> BulkGrantOutcome {
        match self.state {
            BulkGrantState::Done if self.queue.is_empty() => BulkGrantOutcome::NothingToGrant,
            BulkGrantState::Done => BulkGrantOutcome::Completed {
                granted: self.granted,
            },
            BulkGrantState::Failed { index, error } => match self.queue.into_iter().nth(index) {
                Some(failed) => BulkGrantOutcome::Failed {
                    granted: self.granted,
                    failed,
                    error,
                },
                None => BulkGrantOutcome::NothingToGrant,
            },
            BulkGrantState::Idle if self.queue.is_empty() => BulkGrantOutcome::NothingToGrant,
            BulkGrantState::Idle | BulkGrantState::Confirming | BulkGrantState::Cancelled => {
                BulkGrantOutcome::Cancelled {
                    pending: self.queue.len(),
                }
            }
            BulkGrantState::Granting { index } => BulkGrantOutcome::Cancelled {
                pending: self.queue.len() - index,
            },
        }
    }
}
