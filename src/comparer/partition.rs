use std::collections::BTreeSet;

/// The five-way split of `local keys ∪ remote keys`. Every key lands in
/// exactly one set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscrepancyPartition {
    pub only_local: BTreeSet<String>,
    pub only_remote: BTreeSet<String>,
    pub newer_local: BTreeSet<String>,
    pub newer_remote: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
}

impl DiscrepancyPartition {
    pub fn len(&self) -> usize {
        self.sets().iter().map(|set| set.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all_keys(&self) -> BTreeSet<String> {
        self.sets()
            .iter()
            .flat_map(|set| set.iter().cloned())
            .collect()
    }

    pub fn is_disjoint(&self) -> bool {
        self.all_keys().len() == self.len()
    }

    pub fn has_changes(&self) -> bool {
        !(self.only_local.is_empty()
            && self.only_remote.is_empty()
            && self.newer_local.is_empty()
            && self.newer_remote.is_empty())
    }

    fn sets(&self) -> [&BTreeSet<String>; 5] {
        [
            &self.only_local,
            &self.only_remote,
            &self.newer_local,
            &self.newer_remote,
            &self.unchanged,
        ]
    }
}
