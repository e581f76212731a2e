/// Lifecycle of the record currently being processed
///
/// A record moves `Pending → Located → ActionAttempted` and ends in one of the
/// three terminal states. Error edges lead straight to `NotFound` (before the
/// record was located) or `PartialFailure` (after).
use crate::state::Outcome;
use crate::CrawlError;
use std::fmt;

/// Represents the processing state of a single record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    // ===== Active States =====
    /// Record index is known but nothing has been looked up yet
    Pending,

    /// Record row was found in the listing
    Located,

    /// Download of the primary artifact was triggered
    ActionAttempted,

    // ===== Terminal States =====
    /// Primary artifact downloaded and stored
    Succeeded,

    /// Record was located but its primary artifact could not be stored
    PartialFailure,

    /// Record could not be located
    NotFound,
}

impl ItemState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::PartialFailure | Self::NotFound)
    }

    /// Returns true if the record has been located in the listing
    pub fn is_located(&self) -> bool {
        !matches!(self, Self::Pending | Self::NotFound)
    }

    /// Returns true if `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: ItemState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Located)
                | (Self::Pending, Self::NotFound)
                | (Self::Located, Self::ActionAttempted)
                | (Self::Located, Self::PartialFailure)
                | (Self::ActionAttempted, Self::Succeeded)
                | (Self::ActionAttempted, Self::PartialFailure)
        )
    }

    /// Moves to `next`, rejecting illegal transitions
    pub fn transition(&mut self, next: ItemState) -> Result<(), CrawlError> {
        if !self.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }

    /// Moves to the failure state appropriate for how far the record got
    pub fn fail(&mut self) -> Outcome {
        if self.is_located() {
            *self = Self::PartialFailure;
            Outcome::PartialFailure
        } else {
            *self = Self::NotFound;
            Outcome::NotFound
        }
    }

    /// Converts a terminal state into its outcome
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Self::Succeeded => Some(Outcome::Succeeded),
            Self::PartialFailure => Some(Outcome::PartialFailure),
            Self::NotFound => Some(Outcome::NotFound),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Located => "located",
            Self::ActionAttempted => "action_attempted",
            Self::Succeeded => "succeeded",
            Self::PartialFailure => "partial_failure",
            Self::NotFound => "not_found",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
