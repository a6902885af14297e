// ABOUTME: Integration tests for deployment state and history persistence.
// ABOUTME: Covers round-trips, newest-first history, the history cap, and release lookups.

use fleetflip::deploy::{DeploymentState, HistoryEntry, MAX_HISTORY, Phase, StateStore, StoreError};
use fleetflip::traffic::TrafficSplit;
use fleetflip::types::{Color, ResourceName};
use std::fs;
use tempfile::TempDir;

fn store() -> (TempDir, StateStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("state"), ResourceName::new("shop").unwrap());
    (dir, store)
}

/// A flip from `from` to the other color with `release` on the new active.
fn flip_entry(version: u64, from: Color, release: Option<&str>) -> HistoryEntry {
    let before = DeploymentState::initial(from, true);
    let mut after = before.clone();
    after.active_color = from.other();
    after.phase = Phase::Flipping;
    after.version = version;
    *after.releases.get_mut(from.other()) = release.map(str::to_string);
    HistoryEntry::record("flip", &before, &after)
}

#[test]
fn state_round_trips_through_disk() {
    let (_dir, store) = store();
    let mut state = DeploymentState::initial(Color::Blue, true);
    state.traffic_split = TrafficSplit::canary(Color::Blue, 80, 20);
    state.phase = Phase::Canary(20);
    state.releases.green = Some("v7".to_string());
    state.version = 4;

    store.save(&state).unwrap();

    assert_eq!(store.load().unwrap(), Some(state));
    assert!(store.state_path().ends_with("shop.state.json"));
}

#[test]
fn save_creates_the_state_directory() {
    let (_dir, store) = store();
    assert!(!store.dir().exists());
    store.save(&DeploymentState::initial(Color::Green, false)).unwrap();
    assert!(store.dir().is_dir());
}

#[test]
fn history_is_newest_first() {
    let (_dir, store) = store();
    store.append_history(flip_entry(1, Color::Blue, Some("v1"))).unwrap();
    store.append_history(flip_entry(2, Color::Green, Some("v2"))).unwrap();

    let versions: Vec<u64> = store.history(10).unwrap().iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![2, 1]);
    assert_eq!(store.history(1).unwrap().len(), 1);
}

#[test]
fn history_is_capped() {
    let (_dir, store) = store();
    for version in 1..=(MAX_HISTORY as u64 + 5) {
        store.append_history(flip_entry(version, Color::Blue, None)).unwrap();
    }

    let history = store.history(usize::MAX).unwrap();
    assert_eq!(history.len(), MAX_HISTORY);
    assert_eq!(history[0].version, MAX_HISTORY as u64 + 5);
}

#[test]
fn releases_come_from_history() {
    let (_dir, store) = store();
    assert_eq!(store.current_release().unwrap(), None);
    assert_eq!(store.previous_release().unwrap(), None);

    store.append_history(flip_entry(1, Color::Blue, Some("v1"))).unwrap();
    store.append_history(flip_entry(2, Color::Green, Some("v2"))).unwrap();
    store.append_history(flip_entry(3, Color::Blue, Some("v2"))).unwrap();

    assert_eq!(store.current_release().unwrap().as_deref(), Some("v2"));
    assert_eq!(store.previous_release().unwrap().as_deref(), Some("v1"));
}

#[test]
fn history_records_the_transition() {
    let entry = flip_entry(3, Color::Blue, Some("v3"));
    assert_eq!(entry.intent, "flip");
    assert_eq!(entry.from_active, Color::Blue);
    assert_eq!(entry.to_active, Color::Green);
    assert_eq!(entry.phase, Phase::Flipping);
    assert_eq!(entry.release.as_deref(), Some("v3"));
    assert!(!entry.actor.is_empty());
}

#[test]
fn corrupt_history_is_reported() {
    let (_dir, store) = store();
    fs::create_dir_all(store.dir()).unwrap();
    fs::write(store.history_path(), "[{").unwrap();
    assert!(matches!(store.history(5), Err(StoreError::Corrupt { .. })));
}
