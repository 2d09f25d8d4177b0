use rand::rngs::StdRng;
use rand::SeedableRng;
use sedna_core::catalog::{parse_catalog_from_toml_str, Catalog};
use sedna_core::channels::{default_channels, Channel, ChannelFilter, ChannelRule};
use sedna_core::history::PlaybackHistory;
use sedna_core::selector::{select_next, select_previous};
use sedna_core::SednaError;
use std::collections::HashSet;
use std::path::PathBuf;

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

fn fixture_filter() -> ChannelFilter {
    let content = std::fs::read_to_string(workspace_root().join("episodes.toml"))
        .expect("failed to read episodes.toml");
    let catalog = parse_catalog_from_toml_str(&content).expect("failed to parse episodes.toml");
    ChannelFilter::new(catalog, default_channels())
}

#[test]
fn bundled_catalog_is_partitioned_by_default_channels() {
    let filter = fixture_filter();
    let counts = filter.validate_counts();
    assert!(counts.total > 0);
    assert_eq!(counts.sum, counts.total);
    assert!(counts.valid);

    let total: usize = filter
        .channels()
        .iter()
        .map(|c| filter.list_for_channel(c.id).len())
        .sum();
    assert_eq!(total, filter.list_all().len());
}

#[test]
fn unknown_channels_are_empty() {
    let filter = fixture_filter();
    for id in [0u8, 5, 99, 255] {
        assert!(filter.list_for_channel(id).is_empty());
    }
}

#[test]
fn inclusion_channel_example() {
    let catalog = Catalog::from_urls(["u1", "u2", "u3"]);
    let filter = ChannelFilter::new(
        catalog,
        vec![Channel {
            id: 1,
            name: "X".into(),
            description: String::new(),
            rule: ChannelRule::Include("u2".into()),
        }],
    );
    assert_eq!(filter.list_for_channel(1), vec!["u2"]);
    assert!(filter.list_for_channel(99).is_empty());
}

#[test]
fn two_picks_cover_a_two_track_pool() {
    let pool = vec!["u1".to_string(), "u2".to_string()];
    for seed in 0..16 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut history = PlaybackHistory::new();
        let a = select_next(&mut history, &pool, &mut rng).unwrap();
        let b = select_next(&mut history, &pool, &mut rng).unwrap();
        let got: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(got.len(), 2, "seed {seed}");
    }
}

#[test]
fn no_repeats_until_pool_is_exhausted() {
    let filter = fixture_filter();
    let pool = filter.list_all();
    let mut rng = StdRng::seed_from_u64(3);
    let mut history = PlaybackHistory::new();

    let mut seen = HashSet::new();
    for _ in 0..pool.len() {
        let url = select_next(&mut history, &pool, &mut rng).unwrap();
        assert!(seen.insert(url), "repeat before exhaustion");
    }
    assert_eq!(seen.len(), pool.len());

    // Exhausted: the next pick still succeeds and the played set shrinks.
    let current = history.current().map(str::to_string);
    let url = select_next(&mut history, &pool, &mut rng).unwrap();
    assert_ne!(Some(url), current);
    assert!(history.played().len() < pool.len());
    assert!(history.played().iter().all(|u| pool.contains(u)));
}

#[test]
fn previous_after_first_pick_is_rejected() {
    let pool = vec!["u1".to_string(), "u2".to_string()];
    let mut rng = StdRng::seed_from_u64(9);
    let mut history = PlaybackHistory::new();
    select_next(&mut history, &pool, &mut rng).unwrap();
    assert_eq!(select_previous(&mut history), Err(SednaError::NoPrevious));
    assert_eq!(history.index(), Some(0));
}

#[test]
fn channel_switch_keeps_shared_played_set() {
    let filter = fixture_filter();
    let mut rng = StdRng::seed_from_u64(11);
    let mut history = PlaybackHistory::new();

    let morning = filter.pool(Some(1)).unwrap();
    for _ in 0..morning.len() {
        select_next(&mut history, &morning, &mut rng).unwrap();
    }
    let evening = filter.pool(Some(3)).unwrap();
    select_next(&mut history, &evening, &mut rng).unwrap();

    // Every morning episode is still marked as played after the switch.
    assert!(morning.iter().all(|u| history.has_played(u)));
}
