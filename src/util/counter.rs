use std::borrow::{Borrow, ToOwned};
use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CounterValue {
    Increment,
    Decrement,
}

/// Ranked occurrence counts of a given key, as reported to feeds in
/// `ChainStatsUpdate`: the top entries plus a rollup of everything else.
#[derive(Serialize)]
pub struct Ranking<K> {
    pub list: Vec<(K, u64)>,
    pub other: u64,
    pub unknown: u64,
}

/// Counts occurrences of a key across all nodes on a chain, so a rolling
/// tally can be kept up to date on every node add/remove instead of being
/// recomputed from scratch.
#[derive(Default)]
pub struct Counter<K> {
    map: HashMap<K, u64>,
    empty: u64,
}

impl<K> Counter<K>
where
    K: Sized + Hash + Eq,
{
    pub fn modify<Q>(&mut self, key: Option<&Q>, op: CounterValue)
    where
        Q: ?Sized + Hash + Eq + ToOwned<Owned = K>,
        K: Borrow<Q>,
    {
        if let Some(key) = key {
            if let Some(entry) = self.map.get_mut(key) {
                match op {
                    CounterValue::Increment => *entry += 1,
                    CounterValue::Decrement => {
                        *entry -= 1;
                        if *entry == 0 {
                            self.map.remove(key);
                        }
                    }
                }
            } else {
                debug_assert_eq!(op, CounterValue::Increment);
                self.map.insert(key.to_owned(), 1);
            }
        } else {
            match op {
                CounterValue::Increment => self.empty += 1,
                CounterValue::Decrement => self.empty = self.empty.saturating_sub(1),
            }
        }
    }

    pub fn generate_ranking_top(&self, max_count: usize) -> Ranking<K>
    where
        K: Clone,
    {
        let mut all: Vec<(&K, u64)> = self.map.iter().map(|(key, &count)| (key, count)).collect();
        all.sort_unstable_by_key(|&(_, count)| std::cmp::Reverse(count));

        let list = all
            .iter()
            .take(max_count)
            .map(|&(key, count)| (key.clone(), count))
            .collect();

        let other = all
            .iter()
            .skip(max_count)
            .fold(0, |sum, &(_, count)| sum + count);

        Ranking {
            list,
            other,
            unknown: self.empty,
        }
    }

    pub fn generate_ranking_ordered(&self) -> Ranking<K>
    where
        K: Copy + Ord,
    {
        let mut list: Vec<(K, u64)> = self.map.iter().map(|(&key, &count)| (key, count)).collect();
        list.sort_unstable_by_key(|&(key, _)| key);

        Ranking {
            list,
            other: 0,
            unknown: self.empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_removes_empty_entries() {
        let mut counter: Counter<String> = Counter::default();

        counter.modify(Some("linux"), CounterValue::Increment);
        counter.modify(Some("linux"), CounterValue::Increment);
        counter.modify(Some("linux"), CounterValue::Decrement);

        let ranking = counter.generate_ranking_top(10);
        assert_eq!(ranking.list, vec![("linux".to_string(), 1)]);

        counter.modify(Some("linux"), CounterValue::Decrement);
        let ranking = counter.generate_ranking_top(10);
        assert!(ranking.list.is_empty());
    }

    #[test]
    fn none_keys_tally_as_unknown() {
        let mut counter: Counter<String> = Counter::default();
        counter.modify(None, CounterValue::Increment);
        counter.modify(None, CounterValue::Increment);

        let ranking = counter.generate_ranking_top(10);
        assert_eq!(ranking.unknown, 2);
    }
}
