use std::collections::BTreeMap;

use foundation::CountryCode;
use futures_util::FutureExt;

use crate::prober::{ProbeFuture, RegionalDataset};

/// Lifecycle of one country's regional entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SlotState {
    /// A probe is running; later callers join it.
    InFlight,
    Resident,
}

#[derive(Clone)]
enum CacheSlot {
    InFlight(ProbeFuture),
    Resident(RegionalDataset),
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub joins: u64,
    pub misses: u64,
}

/// Session cache of regional datasets keyed by country code.
///
/// Entries are never invalidated: once a country resolves (or is found to be
/// unavailable) the result is reused for the rest of the session.
#[derive(Default)]
pub struct RegionalCache {
    entries: BTreeMap<CountryCode, CacheSlot>,
    stats: CacheStats,
}

impl RegionalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn state(&self, code: &CountryCode) -> Option<SlotState> {
        self.entries.get(code).map(|slot| match slot {
            CacheSlot::InFlight(_) => SlotState::InFlight,
            CacheSlot::Resident(_) => SlotState::Resident,
        })
    }

    pub fn resident(&self, code: &CountryCode) -> Option<&RegionalDataset> {
        match self.entries.get(code) {
            Some(CacheSlot::Resident(ds)) => Some(ds),
            _ => None,
        }
    }

    /// Future for an already known code: the resident value or the shared
    /// in-flight probe. Counts a miss when the code is unknown.
    pub fn lookup(&mut self, code: &CountryCode) -> Option<ProbeFuture> {
        match self.entries.get(code) {
            Some(CacheSlot::Resident(ds)) => {
                self.stats.hits += 1;
                Some(futures_util::future::ready(ds.clone()).boxed_local().shared())
            }
            Some(CacheSlot::InFlight(fut)) => {
                self.stats.joins += 1;
                Some(fut.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn insert_in_flight(&mut self, code: CountryCode, fut: ProbeFuture) {
        self.entries.insert(code, CacheSlot::InFlight(fut));
    }

    pub fn mark_resident(&mut self, code: CountryCode, dataset: RegionalDataset) {
        self.entries.insert(code, CacheSlot::Resident(dataset));
    }
}

impl std::fmt::Debug for RegionalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let states: BTreeMap<&str, SlotState> = self
            .entries
            .keys()
            .filter_map(|k| self.state(k).map(|s| (k.as_str(), s)))
            .collect();
        f.debug_struct("RegionalCache")
            .field("entries", &states)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{RegionalCache, SlotState};
    use crate::prober::RegionalDataset;
    use foundation::CountryCode;

    #[tokio::test]
    async fn resident_entries_are_served_as_ready_futures() {
        let mut cache = RegionalCache::new();
        let fr = CountryCode::new("FR");
        assert!(cache.lookup(&fr).is_none());

        cache.mark_resident(fr.clone(), RegionalDataset::Unavailable);
        assert_eq!(cache.state(&fr), Some(SlotState::Resident));

        let fut = cache.lookup(&fr).expect("resident");
        assert_eq!(fut.await, RegionalDataset::Unavailable);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }
}
