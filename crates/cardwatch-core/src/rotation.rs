//! Calendar-keyed rotation over the active and inactive card pools.
//!
//! Each pool is cut into fixed windows of `quota` ids. The window for a run is
//! `day_index mod window_count`, so every card comes up at least once every
//! `ceil(pool_len / quota)` days without any persisted cursor. The last window
//! wraps around to the start of the pool so that every run fills its quota.

use chrono::NaiveDate;

/// All record ids split into active and inactive pools, each sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoveragePool {
    pub active: Vec<String>,
    pub inactive: Vec<String>,
}

impl CoveragePool {
    /// Build a pool from `(id, is_active)` pairs. Ids are sorted and de-duplicated.
    pub fn from_membership<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        let mut pool = Self::default();
        for (id, active) in entries {
            if active {
                pool.active.push(id.into());
            } else {
                pool.inactive.push(id.into());
            }
        }
        pool.active.sort();
        pool.active.dedup();
        pool.inactive.sort();
        pool.inactive.dedup();
        pool
    }

    pub fn len(&self) -> usize {
        self.active.len() + self.inactive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The ids chosen for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub day_index: i64,
    /// Active window first, then the inactive window.
    pub chosen_ids: Vec<String>,
}

/// Rotation cursor for a calendar date: days since 1970-01-01 plus `offset`.
pub fn day_index(date: NaiveDate, offset: i64) -> i64 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN);
    (date - epoch).num_days() + offset
}

/// Choose this run's ids from both pools.
///
/// `active_quota` is clamped to `total_quota`; the inactive pool gets the rest.
pub fn select(
    active: &[String],
    inactive: &[String],
    day_index: i64,
    active_quota: usize,
    total_quota: usize,
) -> Selection {
    let active_quota = active_quota.min(total_quota);
    let inactive_quota = total_quota - active_quota;

    let mut chosen_ids = window(active, day_index, active_quota);
    chosen_ids.extend(window(inactive, day_index, inactive_quota));

    Selection {
        day_index,
        chosen_ids,
    }
}

fn window(pool: &[String], day_index: i64, quota: usize) -> Vec<String> {
    let len = pool.len();
    let take = quota.min(len);
    if take == 0 {
        return Vec::new();
    }
    let window_count = len.div_ceil(take) as i64;
    let slot = day_index.rem_euclid(window_count) as usize;
    let start = slot * take;
    (0..take).map(|i| pool[(start + i) % len].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn five_cards_quota_two_wraps() {
        let active = ids(&["a", "b", "c", "d", "e"]);
        assert_eq!(select(&active, &[], 0, 2, 2).chosen_ids, ids(&["a", "b"]));
        assert_eq!(select(&active, &[], 1, 2, 2).chosen_ids, ids(&["c", "d"]));
        assert_eq!(select(&active, &[], 2, 2, 2).chosen_ids, ids(&["e", "a"]));
        assert_eq!(select(&active, &[], 3, 2, 2).chosen_ids, ids(&["a", "b"]));
    }

    #[test]
    fn same_day_is_deterministic() {
        let active = ids(&["a", "b", "c", "d", "e", "f", "g"]);
        let inactive = ids(&["x", "y", "z"]);
        let first = select(&active, &inactive, 12345, 3, 4);
        let second = select(&active, &inactive, 12345, 3, 4);
        assert_eq!(first, second);
    }

    #[test]
    fn every_card_covered_within_window_count_days() {
        for n in 1..=23usize {
            for q in 1..=7usize {
                let pool: Vec<String> = (0..n).map(|i| format!("card-{i:02}")).collect();
                let take = q.min(n);
                let days = n.div_ceil(take) as i64;
                for start_day in [0i64, 5, 19_000, -3] {
                    let mut seen = HashSet::new();
                    for d in start_day..start_day + days {
                        seen.extend(select(&pool, &[], d, q, q).chosen_ids);
                    }
                    assert_eq!(seen.len(), n, "n={n} q={q} start={start_day}");
                }
            }
        }
    }

    #[test]
    fn inactive_pool_gets_remaining_quota() {
        let active = ids(&["a", "b", "c", "d"]);
        let inactive = ids(&["x", "y", "z"]);
        let sel = select(&active, &inactive, 0, 2, 3);
        assert_eq!(sel.chosen_ids, ids(&["a", "b", "x"]));
        let sel = select(&active, &inactive, 1, 2, 3);
        assert_eq!(sel.chosen_ids, ids(&["c", "d", "y"]));
    }

    #[test]
    fn small_pools_are_taken_whole() {
        let active = ids(&["a"]);
        let inactive = ids(&["x", "y"]);
        let sel = select(&active, &inactive, 7, 5, 10);
        assert_eq!(sel.chosen_ids, ids(&["a", "x", "y"]));
    }

    #[test]
    fn empty_pools_select_nothing() {
        assert!(select(&[], &[], 3, 2, 4).chosen_ids.is_empty());
        let active = ids(&["a", "b"]);
        assert_eq!(select(&active, &[], 3, 2, 4).chosen_ids, ids(&["a", "b"]));
    }

    #[test]
    fn active_quota_clamped_to_total() {
        let active = ids(&["a", "b", "c"]);
        let inactive = ids(&["x"]);
        let sel = select(&active, &inactive, 0, 5, 2);
        assert_eq!(sel.chosen_ids, ids(&["a", "b"]));
    }

    #[test]
    fn zero_quota_selects_nothing() {
        let active = ids(&["a", "b"]);
        assert!(select(&active, &[], 0, 0, 0).chosen_ids.is_empty());
    }

    #[test]
    fn day_index_counts_from_epoch() {
        let d = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(day_index(d, 0), 0);
        let d = NaiveDate::from_ymd_opt(1970, 1, 11).unwrap();
        assert_eq!(day_index(d, 0), 10);
        assert_eq!(day_index(d, -3), 7);
    }

    #[test]
    fn pool_from_membership_sorts_and_splits() {
        let pool = CoveragePool::from_membership(vec![
            ("c", true),
            ("a", true),
            ("z", false),
            ("b", false),
        ]);
        assert_eq!(pool.active, ids(&["a", "c"]));
        assert_eq!(pool.inactive, ids(&["b", "z"]));
        assert_eq!(pool.len(), 4);
    }
}
