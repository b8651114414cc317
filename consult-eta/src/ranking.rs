use std::collections::HashMap;

/// Dense 1-based rank of every distinct number issued in a session.
#[derive(Debug, Clone)]
pub struct SequenceRanking {
    ranks: HashMap<u32, u32>,
}

impl SequenceRanking {
    pub fn new(numbers: &[u32]) -> Self {
        let mut sorted = numbers.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let ranks = sorted
            .into_iter()
            .enumerate()
            .map(|(i, number)| (number, i as u32 + 1))
            .collect();

        Self { ranks }
    }

    /// `None` means the number was never issued in this session.
    pub fn rank(&self, patient_number: u32) -> Option<u32> {
        self.ranks.get(&patient_number).copied()
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}
