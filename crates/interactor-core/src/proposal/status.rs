//! Proposal lifecycle states.
//!
//! ```text
//! Idle ──► Building ──► AwaitingSignature ──► Submitting ──► AwaitingConfirmation
//!  │          │               │                   │                 │
//!  ▼          ▼               ▼                   ▼                 ├──► Confirmed
//! Failed  Cancelled/Failed Cancelled/Failed Cancelled/Failed        ├──► Reverted
//!                                                                   ├──► TimedOut
//!                                                                   └──► Failed
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// The lifecycle state of one proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Created, preconditions not yet checked.
    #[default]
    Idle,

    /// The multisig transaction is being assembled.
    Building,

    /// Waiting for the connected owner to sign.
    AwaitingSignature,

    /// The signed transaction is being executed.
    Submitting,

    /// Submitted, waiting for the receipt.
    AwaitingConfirmation,

    /// Mined and executed successfully (terminal).
    Confirmed,

    /// Mined but reverted (terminal).
    Reverted,

    /// The owner declined to sign (terminal).
    Cancelled,

    /// Failed before or during submission (terminal).
    Failed,

    /// No receipt within the confirmation timeout (terminal).
    TimedOut,
}

impl ProposalStatus {
    /// Returns `true` if this is a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::Reverted | Self::Cancelled | Self::Failed | Self::TimedOut
        )
    }

    /// Returns `true` if the proposal executed on chain.
    #[must_use]
    pub const fn is_successful(&self) -> bool {
        matches!(self, Self::Confirmed)
    }

    /// Returns `true` while the proposal holds its in-flight slot.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Building | Self::AwaitingSignature | Self::Submitting | Self::AwaitingConfirmation
        )
    }

    /// Returns the state as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Building => "building",
            Self::AwaitingSignature => "awaiting_signature",
            Self::Submitting => "submitting",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Confirmed => "confirmed",
            Self::Reverted => "reverted",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }

    /// Returns the valid transitions from this state.
    #[must_use]
    pub const fn valid_transitions(&self) -> &'static [Self] {
        match self {
            Self::Idle => &[Self::Building, Self::Failed],
            Self::Building => &[Self::AwaitingSignature, Self::Cancelled, Self::Failed],
            Self::AwaitingSignature => &[Self::Submitting, Self::Cancelled, Self::Failed],
            // The wallet prompts again when the execution transaction is sent.
            Self::Submitting => &[Self::AwaitingConfirmation, Self::Cancelled, Self::Failed],
            Self::AwaitingConfirmation => {
                &[Self::Confirmed, Self::Reverted, Self::Failed, Self::TimedOut]
            },
            Self::Confirmed | Self::Reverted | Self::Cancelled | Self::Failed | Self::TimedOut => {
                &[]
            },
        }
    }

    /// Returns `true` if transitioning to `target` is valid from this state.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        self.valid_transitions().contains(&target)
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
