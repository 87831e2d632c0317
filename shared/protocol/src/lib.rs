//! The four request/reply pairs spoken between participants and the
//! coordinator, plus the status codes failed requests carry.

use covey_coordinator::{CoordinatorError, RunState};
use covey_core::Weights;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A participant-to-coordinator request. The caller's identity travels with
/// the transport, not in the message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Request {
    Rendezvous,
    Heartbeat,
    StartTrainingRound,
    EndTrainingRound(TrainingResult),
}

/// The payload of `EndTrainingRound`: updated weights, the number of
/// examples they were trained on, and optional training metrics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingResult {
    pub weights: Weights,
    pub sample_count: u32,
    #[serde(default)]
    pub metrics: BTreeMap<String, Vec<f64>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RendezvousReply {
    Accept,
    Later,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Response {
    Rendezvous(RendezvousReply),
    Heartbeat {
        state: RunState,
        round: u32,
    },
    StartTrainingRound {
        weights: Weights,
        epochs: u32,
        epoch_base: u32,
    },
    EndTrainingRound,
    Error(ErrorReply),
}

/// Transport status of a failed request, expressed as gRPC-style codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    PermissionDenied,
    FailedPrecondition,
    AlreadyExists,
    Internal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorReply {
    pub code: StatusCode,
    pub message: String,
}

impl From<&CoordinatorError> for StatusCode {
    fn from(err: &CoordinatorError) -> Self {
        match err {
            CoordinatorError::UnknownParticipant(_) => StatusCode::PermissionDenied,
            CoordinatorError::InvalidRequest(_) => StatusCode::FailedPrecondition,
            CoordinatorError::DuplicatedUpdate(_) => StatusCode::AlreadyExists,
            CoordinatorError::AggregationFailed(_) => StatusCode::Internal,
        }
    }
}

impl From<CoordinatorError> for ErrorReply {
    fn from(err: CoordinatorError) -> Self {
        Self {
            code: (&err).into(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covey_coordinator::AggregationError;
    use covey_core::{ParticipantId, Tensor};
    use pretty_assertions::assert_eq;

    #[test]
    fn status_codes_match_the_error_kinds() {
        let p = ParticipantId::new("p1");
        let cases: [(CoordinatorError, StatusCode); 4] = [
            (
                CoordinatorError::UnknownParticipant(p.clone()),
                StatusCode::PermissionDenied,
            ),
            (
                CoordinatorError::InvalidRequest("nope".into()),
                StatusCode::FailedPrecondition,
            ),
            (
                CoordinatorError::DuplicatedUpdate(p),
                StatusCode::AlreadyExists,
            ),
            (
                CoordinatorError::AggregationFailed(AggregationError::Empty),
                StatusCode::Internal,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(ErrorReply::from(err).code, code);
        }
    }

    #[test]
    fn requests_roundtrip_on_the_wire() {
        use covey_core::Networkable;

        let request = Request::EndTrainingRound(TrainingResult {
            weights: vec![Tensor::from_f32(vec![2], &[1.0, 2.0]).unwrap()],
            sample_count: 3,
            metrics: [("loss".to_string(), vec![0.5, 0.25])].into(),
        });
        let decoded = Request::from_bytes(&request.to_bytes()).unwrap();
        let Request::EndTrainingRound(result) = decoded else {
            panic!("wrong variant");
        };
        assert_eq!(result.sample_count, 3);
        assert_eq!(result.metrics["loss"], vec![0.5, 0.25]);
        assert_eq!(result.weights[0].to_f64_vec().unwrap(), vec![1.0, 2.0]);
    }
}
