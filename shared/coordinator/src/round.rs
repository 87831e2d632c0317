use crate::error::CoordinatorError;
use covey_core::{ParticipantId, Weights};
use std::collections::{BTreeMap, HashMap};

/// One participant's local training result.
#[derive(Clone, Debug)]
pub struct LocalUpdate {
    pub weights: Weights,
    /// Number of training examples behind the update, the weight used for
    /// federated averaging.
    pub sample_count: u32,
    /// Per-round training metrics. Carried through, never interpreted.
    pub metrics: BTreeMap<String, Vec<f64>>,
}

/// Collects the updates of one global training round.
///
/// Selection order is preserved so aggregation input is stable across reruns
/// of the same selection.
#[derive(Debug, Default)]
pub struct Round {
    selected: Vec<ParticipantId>,
    updates: HashMap<ParticipantId, LocalUpdate>,
}

impl Round {
    pub fn new(selected: Vec<ParticipantId>) -> Self {
        Self {
            selected,
            updates: HashMap::new(),
        }
    }

    /// Extends the selection, preserving insertion order.
    pub fn add_selected(&mut self, ids: impl IntoIterator<Item = ParticipantId>) {
        self.selected.extend(ids);
    }

    /// Removes `id` from the selection if present.
    pub fn remove_selected(&mut self, id: &ParticipantId) {
        self.selected.retain(|selected| selected != id);
    }

    pub fn is_selected(&self, id: &ParticipantId) -> bool {
        self.selected.contains(id)
    }

    pub fn selected(&self) -> &[ParticipantId] {
        &self.selected
    }

    /// Records a participant's update.
    ///
    /// Membership in the selection is checked by the coordinator; this only
    /// rejects double submissions.
    pub fn submit(&mut self, id: ParticipantId, update: LocalUpdate) -> Result<(), CoordinatorError> {
        if self.updates.contains_key(&id) {
            return Err(CoordinatorError::DuplicatedUpdate(id));
        }
        self.updates.insert(id, update);
        Ok(())
    }

    /// True once every selected participant has submitted.
    pub fn is_finished(&self) -> bool {
        self.selected.iter().all(|id| self.updates.contains_key(id))
    }

    pub fn updates_len(&self) -> usize {
        self.updates.len()
    }

    /// Weight and sample-count lists in selection order.
    ///
    /// Meaningful only once [`Round::is_finished`] holds; the coordinator
    /// never snapshots an open round.
    pub fn snapshot(&self) -> (Vec<Weights>, Vec<u32>) {
        let mut weights = Vec::with_capacity(self.selected.len());
        let mut counts = Vec::with_capacity(self.selected.len());
        for id in &self.selected {
            if let Some(update) = self.updates.get(id) {
                weights.push(update.weights.clone());
                counts.push(update.sample_count);
            }
        }
        (weights, counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covey_core::Tensor;
    use pretty_assertions::assert_eq;

    fn pid(name: &str) -> ParticipantId {
        ParticipantId::new(name)
    }

    fn update(value: f32, sample_count: u32) -> LocalUpdate {
        LocalUpdate {
            weights: vec![Tensor::from_f32(vec![1], &[value]).unwrap()],
            sample_count,
            metrics: BTreeMap::new(),
        }
    }

    #[test]
    fn finishes_when_every_selected_id_submitted() {
        let mut round = Round::new(vec![pid("p1"), pid("p2")]);
        assert!(!round.is_finished());

        round.submit(pid("p1"), update(1.0, 1)).unwrap();
        assert!(!round.is_finished());

        round.submit(pid("p2"), update(2.0, 3)).unwrap();
        assert!(round.is_finished());
    }

    #[test]
    fn duplicate_submission_is_rejected_and_leaves_the_round_unchanged() {
        let mut round = Round::new(vec![pid("p1")]);
        round.submit(pid("p1"), update(1.0, 1)).unwrap();

        let err = round.submit(pid("p1"), update(9.0, 9)).unwrap_err();
        assert!(matches!(err, CoordinatorError::DuplicatedUpdate(_)));
        assert_eq!(round.updates_len(), 1);

        let (weights, counts) = round.snapshot();
        assert_eq!(counts, vec![1]);
        assert_eq!(weights[0][0].to_f64_vec().unwrap(), vec![1.0]);
    }

    #[test]
    fn snapshot_follows_selection_order() {
        let mut round = Round::new(vec![pid("b"), pid("a"), pid("c")]);
        // submitted out of selection order
        round.submit(pid("c"), update(3.0, 3)).unwrap();
        round.submit(pid("a"), update(2.0, 2)).unwrap();
        round.submit(pid("b"), update(1.0, 1)).unwrap();

        let (_, counts) = round.snapshot();
        assert_eq!(counts, vec![1, 2, 3]);
    }

    #[test]
    fn selection_can_shrink_and_grow() {
        let mut round = Round::new(vec![pid("p1"), pid("p2")]);
        round.remove_selected(&pid("p2"));
        round.remove_selected(&pid("absent"));
        assert_eq!(round.selected(), &[pid("p1")]);

        round.add_selected([pid("p3")]);
        assert_eq!(round.selected(), &[pid("p1"), pid("p3")]);

        round.submit(pid("p1"), update(1.0, 1)).unwrap();
        assert!(!round.is_finished());
        round.submit(pid("p3"), update(2.0, 1)).unwrap();
        assert!(round.is_finished());
    }
}
