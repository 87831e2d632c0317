mod participant;
mod trainer;

pub use participant::Participant;
pub use trainer::{DummyTrainer, Trainer};
