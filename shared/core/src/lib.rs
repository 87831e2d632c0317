mod participant_id;
mod serde_wire;
mod tensor;

pub use participant_id::ParticipantId;
pub use serde_wire::Networkable;
pub use tensor::{Dtype, Tensor, TensorError, Weights};
