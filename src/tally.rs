use crate::model::{ChannelId, ChannelSet, RoundRecord};
use std::collections::{hash_map::Entry, HashMap, HashSet};

/// Per-round recommendation counts.
///
/// Each candidate counts once per distinct source that recommended it. Ties
/// rank by the order candidates were first observed during the scan.
#[derive(Debug, Clone, Default)]
pub struct RecommendationTally {
    counts: HashMap<ChannelId, usize>,
    sources: HashSet<ChannelId>,
    first_seen: Vec<ChannelId>,
}

impl RecommendationTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one source's recommendations. The caller filters out ineligible
    /// candidates; a source observed twice only counts the first time.
    pub fn observe<'a>(
        &mut self,
        source: &ChannelId,
        candidates: impl IntoIterator<Item = &'a ChannelId>,
    ) {
        if !self.sources.insert(source.clone()) {
            return;
        }
        let mut seen = HashSet::new();
        for candidate in candidates {
            if !seen.insert(candidate) {
                continue;
            }
            match self.counts.entry(candidate.clone()) {
                Entry::Occupied(mut e) => *e.get_mut() += 1,
                Entry::Vacant(e) => {
                    self.first_seen.push(candidate.clone());
                    e.insert(1);
                }
            }
        }
    }

    pub fn count(&self, id: &ChannelId) -> usize {
        self.counts.get(id).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.first_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first_seen.is_empty()
    }

    /// Candidates by descending count, first-observed order within a count.
    pub fn ranked(&self) -> Vec<(ChannelId, usize)> {
        let mut ranked: Vec<_> = self
            .first_seen
            .iter()
            .map(|id| (id.clone(), self.counts[id]))
            .collect();
        // stable
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }

    pub fn winner(&self) -> Option<(ChannelId, usize)> {
        let mut best: Option<(&ChannelId, usize)> = None;
        for id in &self.first_seen {
            let count = self.counts[id];
            if best.map_or(true, |(_, n)| count > n) {
                best = Some((id, count));
            }
        }
        best.map(|(id, n)| (id.clone(), n))
    }

    /// Rebuilds a recorded round's tally. `members` is the set as it stood
    /// before the round; blacklisted channels are already absent from records.
    pub fn replay(record: &RoundRecord, members: &[ChannelId]) -> Self {
        let members: ChannelSet = members
            .iter()
            .take(record.set_size_before)
            .cloned()
            .collect::<Vec<_>>()
            .into();
        let mut tally = Self::new();
        for source in &record.sources {
            tally.observe(
                &source.channel_id,
                source.recommended.iter().filter(|c| !members.contains(c)),
            );
        }
        tally
    }
}
