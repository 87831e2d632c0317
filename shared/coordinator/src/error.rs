use crate::aggregator::AggregationError;
use covey_core::ParticipantId;
use thiserror::Error;

/// Error kinds a coordinator operation surfaces to the offending caller.
///
/// None of these propagate to other participants.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// Any operation other than rendezvous from a caller that never
    /// rendezvoused, or was evicted since.
    #[error("unknown participant {0}, rendezvous with the coordinator before making requests")]
    UnknownParticipant(ParticipantId),

    /// A request that is not allowed in the current coordinator state, for
    /// instance training requests outside of a round.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The same participant submitted more than one update within a round.
    #[error("participant {0} already submitted an update for this round")]
    DuplicatedUpdate(ParticipantId),

    /// The aggregator rejected the collected updates.
    #[error("aggregation failed: {0}")]
    AggregationFailed(#[from] AggregationError),
}
