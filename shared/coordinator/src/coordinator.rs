use crate::aggregator::Aggregator;
use crate::error::CoordinatorError;
use crate::registry::Registry;
use crate::round::{LocalUpdate, Round};
use crate::selector::Selector;
use crate::{FederatedAveraging, RandomSelector};
use covey_core::{ParticipantId, Weights};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Global state of a training session.
///
/// STANDBY while waiting for enough participants, ROUND while one is in
/// progress, FINISHED once the last round aggregated. FINISHED is terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    #[default]
    Standby,
    Round,
    Finished,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Standby => write!(f, "standby"),
            RunState::Round => write!(f, "round"),
            RunState::Finished => write!(f, "finished"),
        }
    }
}

/// Session parameters, fixed for the coordinator's lifetime.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Total rounds in the session.
    pub num_rounds: u32,
    /// Minimum participants selected per round.
    pub min_in_round: usize,
    /// Fraction of connected participants selected per round, in (0, 1].
    pub fraction: f64,
    /// Local epoch count, handed to participants verbatim.
    pub epochs: u32,
    /// Starting epoch index, handed to participants verbatim.
    pub epoch_base: u32,
    /// Expected interval between heartbeats.
    pub heartbeat_period: Duration,
    /// Grace beyond one period before eviction.
    pub heartbeat_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            num_rounds: 10,
            min_in_round: 1,
            fraction: 1.0,
            epochs: 0,
            epoch_base: 0,
            heartbeat_period: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    pub fn check(&self) -> bool {
        self.num_rounds >= 1
            && self.min_in_round >= 1
            && self.fraction > 0.0
            && self.fraction <= 1.0
            && self.heartbeat_period > Duration::ZERO
    }

    /// Registry size at which STANDBY advances to ROUND: how many connected
    /// participants it takes to select `min_in_round` of them at `fraction`.
    pub fn min_connected(&self) -> usize {
        (self.min_in_round as f64 / self.fraction).ceil() as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RendezvousDecision {
    Accept,
    Later,
}

/// What a heartbeat reply advertises to one participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeartbeatStatus {
    pub state: RunState,
    pub round: u32,
}

/// Snapshot handed to a selected participant when it starts training.
#[derive(Clone, Debug)]
pub struct RoundStart {
    pub weights: Weights,
    pub epochs: u32,
    pub epoch_base: u32,
}

/// A round that just closed: its number and the aggregated global weights.
#[derive(Clone, Debug)]
pub struct CompletedRound {
    pub round: u32,
    pub weights: Weights,
}

/// The coordinator state machine.
///
/// Owns the participant registry, the current round and the global weights,
/// and reacts to participant requests. Callers inject the current time, so
/// the machine itself has no clock and every transition is testable
/// synchronously. Concurrent access is the caller's problem; the server
/// wraps the whole machine in one mutex.
pub struct Coordinator {
    config: SessionConfig,
    min_connected: usize,
    registry: Registry,
    round: Round,
    weights: Weights,
    state: RunState,
    current_round: u32,
    selector: Box<dyn Selector>,
    aggregator: Box<dyn Aggregator>,
}

impl Coordinator {
    pub fn new(
        config: SessionConfig,
        weights: Weights,
        selector: Box<dyn Selector>,
        aggregator: Box<dyn Aggregator>,
    ) -> Self {
        let min_connected = config.min_connected();
        let registry = Registry::new(config.heartbeat_period, config.heartbeat_timeout);
        Self {
            config,
            min_connected,
            registry,
            round: Round::default(),
            weights,
            state: RunState::Standby,
            current_round: 0,
            selector,
            aggregator,
        }
    }

    /// Coordinator with the reference policies: uniform random selection and
    /// federated averaging.
    pub fn with_defaults(config: SessionConfig, weights: Weights) -> Self {
        Self::new(
            config,
            weights,
            Box::new(RandomSelector::new()),
            Box::new(FederatedAveraging),
        )
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn num_connected(&self) -> usize {
        self.registry.len()
    }

    pub fn selected(&self) -> &[ParticipantId] {
        self.round.selected()
    }

    /// Participants whose heartbeat deadline elapsed, for the monitor.
    pub fn expired_participants(&self, now: Instant) -> Vec<ParticipantId> {
        self.registry.expired_ids(now)
    }

    /// The monitor's sleep hint: the earliest heartbeat deadline.
    pub fn next_expiration(&self, now: Instant) -> Instant {
        self.registry.next_expiration(now)
    }

    /// Admits `id`, or asks it to come back later once the session is full.
    ///
    /// Always permitted regardless of state. A re-announce by an admitted
    /// participant is accepted without counting twice. The admission that
    /// reaches `min_connected` selects the participants of the next round
    /// and moves STANDBY to ROUND.
    pub fn rendezvous(&mut self, id: ParticipantId, now: Instant) -> RendezvousDecision {
        if self.registry.contains(&id) {
            self.registry.refresh(&id, now);
            return RendezvousDecision::Accept;
        }
        if self.registry.len() >= self.min_connected {
            info!(participant = %id, connected = self.registry.len(), "rejecting rendezvous, session is full");
            return RendezvousDecision::Later;
        }

        self.registry.add(id.clone(), now);
        info!(participant = %id, connected = self.registry.len(), "accepted participant");

        if self.registry.len() == self.min_connected && self.state == RunState::Standby {
            self.select_and_init_round();
            self.state = RunState::Round;
            if self.current_round == 0 {
                self.current_round = 1;
            }
            info!(
                round = self.current_round,
                selected = self.round.selected().len(),
                "starting round"
            );
        }
        RendezvousDecision::Accept
    }

    /// Refreshes `id`'s deadline and reports the state specialized for it:
    /// ROUND if it is selected for the current round, STANDBY if connected
    /// but idle, FINISHED once the session is over.
    pub fn heartbeat(
        &mut self,
        id: &ParticipantId,
        now: Instant,
    ) -> Result<HeartbeatStatus, CoordinatorError> {
        if !self.registry.contains(id) {
            return Err(CoordinatorError::UnknownParticipant(id.clone()));
        }
        self.registry.refresh(id, now);

        let state = if self.state == RunState::Finished {
            RunState::Finished
        } else if self.round.is_selected(id) {
            RunState::Round
        } else {
            RunState::Standby
        };
        Ok(HeartbeatStatus {
            state,
            round: self.current_round,
        })
    }

    /// Hands `id` the current global weights and the local-training
    /// hyperparameters. Only valid during a round, and only for selected
    /// participants.
    pub fn start_training(&self, id: &ParticipantId) -> Result<RoundStart, CoordinatorError> {
        if !self.registry.contains(id) {
            return Err(CoordinatorError::UnknownParticipant(id.clone()));
        }
        if self.state != RunState::Round || !self.round.is_selected(id) {
            return Err(CoordinatorError::InvalidRequest(format!(
                "participant {id} asked to start training outside of a round"
            )));
        }
        Ok(RoundStart {
            weights: self.weights.clone(),
            epochs: self.config.epochs,
            epoch_base: self.config.epoch_base,
        })
    }

    /// Accepts `id`'s update. The submission that completes the round
    /// triggers aggregation; the closed round is returned so the caller can
    /// hand the new weights to a storage sink.
    pub fn end_training(
        &mut self,
        id: &ParticipantId,
        update: LocalUpdate,
    ) -> Result<Option<CompletedRound>, CoordinatorError> {
        if !self.registry.contains(id) {
            return Err(CoordinatorError::UnknownParticipant(id.clone()));
        }
        if self.state != RunState::Round || !self.round.is_selected(id) {
            return Err(CoordinatorError::InvalidRequest(format!(
                "participant {id} submitted an update outside of a round"
            )));
        }
        self.round.submit(id.clone(), update)?;
        if !self.round.is_finished() {
            return Ok(None);
        }

        info!(round = self.current_round, "round complete, aggregating");
        let (update_weights, sample_counts) = self.round.snapshot();
        match self.aggregator.aggregate(&update_weights, &sample_counts) {
            Ok(new_weights) => {
                self.weights = new_weights;
                let completed = CompletedRound {
                    round: self.current_round,
                    weights: self.weights.clone(),
                };
                if self.current_round == self.config.num_rounds {
                    self.state = RunState::Finished;
                    info!(rounds = self.current_round, "training session finished");
                } else {
                    self.current_round += 1;
                    self.select_and_init_round();
                    info!(
                        round = self.current_round,
                        selected = self.round.selected().len(),
                        "starting round"
                    );
                }
                Ok(Some(completed))
            }
            Err(err) => {
                // Drop the bad round's updates and re-select for the same
                // round number; the registry still satisfies the admission
                // threshold, so the session stays live.
                warn!(round = self.current_round, error = %err, "aggregation failed, reselecting round");
                self.select_and_init_round();
                Err(CoordinatorError::AggregationFailed(err))
            }
        }
    }

    /// Drops `id` from the session, typically after its heartbeat expired or
    /// its connection closed. Falling below the admission threshold
    /// mid-round reverts to STANDBY; the round itself is left in place and
    /// replaced wholesale by the next selection.
    pub fn remove_participant(&mut self, id: &ParticipantId) {
        if !self.registry.contains(id) {
            return;
        }
        self.registry.remove(id);
        info!(participant = %id, connected = self.registry.len(), "removed participant");

        if self.registry.len() < self.min_connected && self.state == RunState::Round {
            self.state = RunState::Standby;
            info!(round = self.current_round, "below minimum, back to standby");
        }
    }

    fn select_and_init_round(&mut self) {
        let candidates = self.registry.ids();
        let selected = self.selector.select_ids(&candidates, self.config.fraction);
        self.round = Round::new(selected);
    }
}
