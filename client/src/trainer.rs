use anyhow::Result;
use async_trait::async_trait;
use covey_core::Weights;
use covey_protocol::TrainingResult;

/// Local training hook: given the global weights and the epoch parameters,
/// produce an updated set of weights and the number of examples behind it.
#[async_trait]
pub trait Trainer: Send {
    async fn train_round(
        &mut self,
        weights: Weights,
        epochs: u32,
        epoch_base: u32,
    ) -> Result<TrainingResult>;
}

/// Trainer that hands the global weights straight back.
///
/// Good for protocol smoke runs and tests; a full deployment plugs a real
/// training loop in here.
pub struct DummyTrainer {
    pub sample_count: u32,
}

impl Default for DummyTrainer {
    fn default() -> Self {
        Self { sample_count: 1 }
    }
}

#[async_trait]
impl Trainer for DummyTrainer {
    async fn train_round(
        &mut self,
        weights: Weights,
        _epochs: u32,
        _epoch_base: u32,
    ) -> Result<TrainingResult> {
        Ok(TrainingResult {
            weights,
            sample_count: self.sample_count,
            metrics: Default::default(),
        })
    }
}
