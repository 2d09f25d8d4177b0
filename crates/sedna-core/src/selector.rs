//! History-aware track selection.
//!
//! `select_next` prefers tracks not yet played this session.  When the pool
//! is exhausted the played set collapses to the current track and selection
//! starts over, so the same episode is never picked twice in a row unless the
//! pool has a single entry.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::error::Result;
use crate::history::PlaybackHistory;

/// Pick the next track from `pool` and record it in `history`.
///
/// Returns `None` only for an empty pool.
pub fn select_next<R: Rng + ?Sized>(
    history: &mut PlaybackHistory,
    pool: &[String],
    rng: &mut R,
) -> Option<String> {
    if pool.is_empty() {
        return None;
    }

    let chosen = match pick_unplayed(history, pool, rng) {
        Some(url) => url,
        None => {
            debug!(
                "selector: pool of {} exhausted, resetting played set",
                pool.len()
            );
            history.reset_played();
            pick_unplayed(history, pool, rng).unwrap_or_else(|| pool[0].clone())
        }
    };

    history.push(chosen.clone());
    Some(chosen)
}

/// Step back in history.  No state change on `NoPrevious`.
pub fn select_previous(history: &mut PlaybackHistory) -> Result<String> {
    history.back().map(str::to_string)
}

fn pick_unplayed<R: Rng + ?Sized>(
    history: &PlaybackHistory,
    pool: &[String],
    rng: &mut R,
) -> Option<String> {
    let unplayed: Vec<&String> = pool.iter().filter(|u| !history.has_played(u)).collect();
    unplayed.choose(rng).map(|u| (*u).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SednaError;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn pool(urls: &[&str]) -> Vec<String> {
        urls.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_pool() {
        let mut h = PlaybackHistory::new();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(select_next(&mut h, &[], &mut rng), None);
        assert!(h.is_idle());
    }

    #[test]
    fn test_two_picks_cover_pool() {
        let p = pool(&["u1", "u2"]);
        for seed in 0..16 {
            let mut h = PlaybackHistory::new();
            let mut rng = StdRng::seed_from_u64(seed);
            let a = select_next(&mut h, &p, &mut rng).unwrap();
            let b = select_next(&mut h, &p, &mut rng).unwrap();
            let got: HashSet<String> = [a, b].into_iter().collect();
            assert_eq!(got.len(), 2, "seed {}", seed);
        }
    }

    #[test]
    fn test_exhaustion_avoids_immediate_repeat() {
        let p = pool(&["u1", "u2", "u3"]);
        let mut h = PlaybackHistory::new();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..3 {
            select_next(&mut h, &p, &mut rng).unwrap();
        }
        let last = h.current().unwrap().to_string();
        let next = select_next(&mut h, &p, &mut rng).unwrap();
        assert_ne!(next, last);
        assert_eq!(h.played().len(), 2);
    }

    #[test]
    fn test_single_entry_pool_repeats_deterministically() {
        let p = pool(&["only"]);
        let mut h = PlaybackHistory::new();
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(select_next(&mut h, &p, &mut rng).as_deref(), Some("only"));
        assert_eq!(select_next(&mut h, &p, &mut rng).as_deref(), Some("only"));
        assert_eq!(h.stack().len(), 2);
    }

    #[test]
    fn test_previous_after_first_pick() {
        let p = pool(&["u1", "u2"]);
        let mut h = PlaybackHistory::new();
        let mut rng = StdRng::seed_from_u64(5);
        select_next(&mut h, &p, &mut rng);
        assert_eq!(select_previous(&mut h), Err(SednaError::NoPrevious));
        assert_eq!(h.index(), Some(0));
    }
}
