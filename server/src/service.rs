use crate::store::WeightsStore;
use covey_coordinator::{
    Coordinator, CoordinatorError, LocalUpdate, RendezvousDecision, RunState,
};
use covey_core::{ParticipantId, Weights};
use covey_protocol::{ErrorReply, RendezvousReply, Request, Response};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Shared handle to the coordinator state machine.
///
/// Request handlers and the heartbeat monitor all go through this; the inner
/// mutex serializes every coordinator operation, including aggregation at
/// round close, which keeps round closure atomic at the cost of briefly
/// blocking other callers.
#[derive(Clone)]
pub struct Service {
    coordinator: Arc<Mutex<Coordinator>>,
    store: Arc<dyn WeightsStore>,
}

impl Service {
    pub fn new(coordinator: Coordinator, store: Arc<dyn WeightsStore>) -> Self {
        Self {
            coordinator: Arc::new(Mutex::new(coordinator)),
            store,
        }
    }

    /// Routes one request to the coordinator and shapes the reply.
    pub async fn handle(&self, from: &ParticipantId, request: Request) -> Response {
        match request {
            Request::Rendezvous => {
                let decision = self
                    .coordinator
                    .lock()
                    .await
                    .rendezvous(from.clone(), Instant::now());
                Response::Rendezvous(match decision {
                    RendezvousDecision::Accept => RendezvousReply::Accept,
                    RendezvousDecision::Later => RendezvousReply::Later,
                })
            }
            Request::Heartbeat => {
                let result = self.coordinator.lock().await.heartbeat(from, Instant::now());
                match result {
                    Ok(status) => Response::Heartbeat {
                        state: status.state,
                        round: status.round,
                    },
                    Err(err) => error_response(from, err),
                }
            }
            Request::StartTrainingRound => {
                let result = self.coordinator.lock().await.start_training(from);
                match result {
                    Ok(start) => Response::StartTrainingRound {
                        weights: start.weights,
                        epochs: start.epochs,
                        epoch_base: start.epoch_base,
                    },
                    Err(err) => error_response(from, err),
                }
            }
            Request::EndTrainingRound(result) => {
                let update = LocalUpdate {
                    weights: result.weights,
                    sample_count: result.sample_count,
                    metrics: result.metrics,
                };
                let outcome = self.coordinator.lock().await.end_training(from, update);
                match outcome {
                    Ok(Some(completed)) => {
                        // fire-and-forget: a failing sink never fails the round
                        if let Err(err) = self.store.write(completed.round, &completed.weights).await
                        {
                            warn!(
                                round = completed.round,
                                "failed to store aggregated weights: {err:#}"
                            );
                        }
                        Response::EndTrainingRound
                    }
                    Ok(None) => Response::EndTrainingRound,
                    Err(err) => error_response(from, err),
                }
            }
        }
    }

    pub async fn remove_participant(&self, id: &ParticipantId) {
        self.coordinator.lock().await.remove_participant(id);
    }

    pub async fn expired_participants(&self, now: Instant) -> Vec<ParticipantId> {
        self.coordinator.lock().await.expired_participants(now)
    }

    pub async fn next_expiration(&self, now: Instant) -> Instant {
        self.coordinator.lock().await.next_expiration(now)
    }

    pub async fn run_state(&self) -> RunState {
        self.coordinator.lock().await.state()
    }

    pub async fn current_round(&self) -> u32 {
        self.coordinator.lock().await.current_round()
    }

    pub async fn num_connected(&self) -> usize {
        self.coordinator.lock().await.num_connected()
    }

    pub async fn weights(&self) -> Weights {
        self.coordinator.lock().await.weights().clone()
    }
}

fn error_response(from: &ParticipantId, err: CoordinatorError) -> Response {
    debug!(participant = %from, "rejecting request: {err}");
    Response::Error(ErrorReply::from(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NoopStore;
    use covey_coordinator::SessionConfig;
    use covey_core::Tensor;
    use covey_protocol::{StatusCode, TrainingResult};
    use pretty_assertions::assert_eq;

    fn service(num_rounds: u32, min_in_round: usize) -> Service {
        let config = SessionConfig {
            num_rounds,
            min_in_round,
            epochs: 5,
            epoch_base: 2,
            ..SessionConfig::default()
        };
        let weights = vec![Tensor::from_f64(vec![4], &[1.0, 2.0, 3.0, 4.0]).unwrap()];
        Service::new(
            Coordinator::with_defaults(config, weights),
            Arc::new(NoopStore),
        )
    }

    fn pid(name: &str) -> ParticipantId {
        ParticipantId::new(name)
    }

    fn result(values: &[f64], sample_count: u32) -> TrainingResult {
        TrainingResult {
            weights: vec![Tensor::from_f64(vec![values.len() as u64], values).unwrap()],
            sample_count,
            metrics: Default::default(),
        }
    }

    #[tokio::test]
    async fn single_round_over_the_service() {
        let service = service(1, 1);
        let p1 = pid("p1");

        let reply = service.handle(&p1, Request::Rendezvous).await;
        assert!(matches!(
            reply,
            Response::Rendezvous(RendezvousReply::Accept)
        ));

        let reply = service.handle(&p1, Request::Heartbeat).await;
        let Response::Heartbeat { state, round } = reply else {
            panic!("expected heartbeat reply");
        };
        assert_eq!((state, round), (RunState::Round, 1));

        let reply = service.handle(&p1, Request::StartTrainingRound).await;
        let Response::StartTrainingRound { epochs, epoch_base, .. } = reply else {
            panic!("expected start-training reply");
        };
        assert_eq!((epochs, epoch_base), (5, 2));

        let reply = service
            .handle(&p1, Request::EndTrainingRound(result(&[2.0, 4.0, 6.0, 8.0], 1)))
            .await;
        assert!(matches!(reply, Response::EndTrainingRound));
        assert_eq!(service.run_state().await, RunState::Finished);
    }

    #[tokio::test]
    async fn errors_map_to_their_status_codes() {
        let service = service(1, 1);
        let ghost = pid("ghost");

        let Response::Error(err) = service.handle(&ghost, Request::Heartbeat).await else {
            panic!("expected an error reply");
        };
        assert_eq!(err.code, StatusCode::PermissionDenied);

        let p1 = pid("p1");
        service.handle(&p1, Request::Rendezvous).await;
        service
            .handle(&p1, Request::EndTrainingRound(result(&[1.0], 1)))
            .await;

        // the session is finished now, so another submission is out of state
        let Response::Error(err) = service
            .handle(&p1, Request::EndTrainingRound(result(&[1.0], 1)))
            .await
        else {
            panic!("expected an error reply");
        };
        assert_eq!(err.code, StatusCode::FailedPrecondition);
    }

    #[tokio::test]
    async fn duplicate_update_maps_to_already_exists() {
        let service = service(1, 2);
        let (p1, p2) = (pid("p1"), pid("p2"));
        service.handle(&p1, Request::Rendezvous).await;
        service.handle(&p2, Request::Rendezvous).await;

        service
            .handle(&p1, Request::EndTrainingRound(result(&[1.0], 1)))
            .await;
        let Response::Error(err) = service
            .handle(&p1, Request::EndTrainingRound(result(&[2.0], 1)))
            .await
        else {
            panic!("expected an error reply");
        };
        assert_eq!(err.code, StatusCode::AlreadyExists);
    }
}
