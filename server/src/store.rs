use anyhow::{Context, Result};
use async_trait::async_trait;
use covey_core::{Networkable, Weights};
use std::path::PathBuf;
use tracing::info;

/// Sink for aggregated global weights, handed a copy after every completed
/// round.
///
/// Writes are fire-and-forget from the coordinator's perspective: a failing
/// sink is logged and never fails the round.
#[async_trait]
pub trait WeightsStore: Send + Sync {
    async fn write(&self, round: u32, weights: &Weights) -> Result<()>;
}

/// Discards everything.
pub struct NoopStore;

#[async_trait]
impl WeightsStore for NoopStore {
    async fn write(&self, _round: u32, _weights: &Weights) -> Result<()> {
        Ok(())
    }
}

/// Writes each round's weights as a postcard blob under one directory.
///
/// Stands in for the object-store upload of a full deployment.
pub struct FsWeightsStore {
    dir: PathBuf,
}

impl FsWeightsStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create weights directory {dir:?}"))?;
        Ok(Self { dir })
    }
}

#[async_trait]
impl WeightsStore for FsWeightsStore {
    async fn write(&self, round: u32, weights: &Weights) -> Result<()> {
        let path = self.dir.join(format!("round-{round}.bin"));
        tokio::fs::write(&path, weights.to_bytes())
            .await
            .with_context(|| format!("failed to write weights to {path:?}"))?;
        info!(round, path = %path.display(), "stored aggregated weights");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covey_core::Tensor;

    #[tokio::test]
    async fn written_weights_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsWeightsStore::new(dir.path().to_path_buf()).unwrap();
        let weights = vec![Tensor::from_f32(vec![3], &[1.0, 2.0, 3.0]).unwrap()];

        store.write(2, &weights).await.unwrap();

        let blob = std::fs::read(dir.path().join("round-2.bin")).unwrap();
        assert_eq!(Weights::from_bytes(&blob).unwrap(), weights);
    }
}
