//! Closest-snapshot windowing
//!
//! Given one owner's keys with their creation times, find the nearest key
//! strictly before the target, a key exactly at the target, and the nearest
//! key strictly after it.
//!
//! Ties are resolved by encounter order: a later entry only replaces the
//! current candidate of a bucket when it is strictly better, so the first
//! key seen wins in every bucket.

use std::cmp::Ordering;

/// Single pass over `entries`, returning `[before?, exact?, after?]`
///
/// Times are compared as given; callers normalize them to one precision.
pub fn closest<K: Copy>(entries: &[(K, u64)], target: u64) -> Vec<K> {
    let mut before: Option<(K, u64)> = None;
    let mut exact: Option<K> = None;
    let mut after: Option<(K, u64)> = None;

    for &(key, time) in entries {
        match time.cmp(&target) {
            Ordering::Less => {
                if before.map_or(true, |(_, best)| time > best) {
                    before = Some((key, time));
                }
            }
            Ordering::Equal => {
                if exact.is_none() {
                    exact = Some(key);
                }
            }
            Ordering::Greater => {
                if after.map_or(true, |(_, best)| time < best) {
                    after = Some((key, time));
                }
            }
        }
    }

    [before.map(|(key, _)| key), exact, after.map(|(key, _)| key)]
        .into_iter()
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entries(times: &[u64]) -> Vec<(usize, u64)> {
        times.iter().copied().enumerate().collect()
    }

    #[test]
    fn test_window_around_existing_time() {
        let e = entries(&[10, 20, 30]);
        assert_eq!(closest(&e, 20), vec![0, 1, 2]);
    }

    #[test]
    fn test_window_between_times() {
        let e = entries(&[10, 20, 30]);
        assert_eq!(closest(&e, 25), vec![1, 2]);
    }

    #[test]
    fn test_window_before_everything() {
        let e = entries(&[10, 20, 30]);
        assert_eq!(closest(&e, 5), vec![0]);
    }

    #[test]
    fn test_window_after_everything() {
        let e = entries(&[30, 10, 20]);
        assert_eq!(closest(&e, 99), vec![0]);
    }

    #[test]
    fn test_empty() {
        assert!(closest::<usize>(&[], 10).is_empty());
    }

    #[test]
    fn test_first_seen_wins_ties() {
        let e = entries(&[15, 15, 20, 20, 25, 25]);
        assert_eq!(closest(&e, 20), vec![0, 2, 4]);
    }

    #[test]
    fn test_unordered_input() {
        let e = entries(&[40, 5, 22, 18, 31]);
        assert_eq!(closest(&e, 20), vec![3, 2]);
    }

    proptest! {
        #[test]
        fn prop_buckets_are_nearest(
            times in prop::collection::vec(0u64..100, 0..40),
            target in 0u64..100,
        ) {
            let e = entries(&times);
            let picked = closest(&e, target);
            prop_assert!(picked.len() <= 3);

            let before = times.iter().copied().filter(|t| *t < target).max();
            let after = times.iter().copied().filter(|t| *t > target).min();
            let has_exact = times.contains(&target);
            let expected_len = before.is_some() as usize + has_exact as usize + after.is_some() as usize;
            prop_assert_eq!(picked.len(), expected_len);

            // Output is ordered by time and brackets the target
            let picked_times: Vec<u64> = picked.iter().map(|i| times[*i]).collect();
            prop_assert!(picked_times.windows(2).all(|w| w[0] < w[1]));
            if let Some(b) = before {
                prop_assert_eq!(picked_times[0], b);
                // first index carrying that time
                prop_assert_eq!(picked[0], times.iter().position(|t| *t == b).unwrap());
            }
            if let Some(a) = after {
                prop_assert_eq!(*picked_times.last().unwrap(), a);
            }
        }
    }
}
