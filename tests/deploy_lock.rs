// ABOUTME: Integration tests for deploy lock functionality.
// ABOUTME: Tests lock acquisition, stale detection, and force breaking.

use chrono::{Duration, Utc};
use fleetflip::deploy::{DeployLock, LockError, LockInfo, with_lock};
use fleetflip::types::ResourceName;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

fn service(name: &str) -> ResourceName {
    ResourceName::new(name).unwrap()
}

fn write_lock(dir: &Path, service: &ResourceName, info: &LockInfo) {
    fs::create_dir_all(dir).unwrap();
    fs::write(
        LockInfo::lock_path(dir, service),
        serde_json::to_vec(info).unwrap(),
    )
    .unwrap();
}

/// Lock held by someone else, started `age` ago.
fn foreign_lock(service: &ResourceName, age: Duration) -> LockInfo {
    LockInfo {
        holder: "other-host".to_string(),
        pid: 4242,
        started_at: Utc::now() - age,
        service: service.to_string(),
    }
}

#[test]
fn lock_acquired_prevents_second_deployment() {
    let dir = tempfile::tempdir().unwrap();
    let service = service("lock-prevent");

    let lock = DeployLock::acquire(dir.path(), &service, false).unwrap();
    assert!(lock.path().exists());

    let err = DeployLock::acquire(dir.path(), &service, false).unwrap_err();
    let LockError::Held { holder, pid, .. } = err else {
        panic!("expected lock held, got {err}");
    };
    assert!(!holder.is_empty());
    assert_eq!(pid, std::process::id());

    lock.release().unwrap();
    let again = DeployLock::acquire(dir.path(), &service, false).unwrap();
    again.release().unwrap();
}

#[test]
fn locks_are_per_service() {
    let dir = tempfile::tempdir().unwrap();
    let shop = DeployLock::acquire(dir.path(), &service("shop"), false).unwrap();
    let cart = DeployLock::acquire(dir.path(), &service("cart"), false).unwrap();
    assert_ne!(shop.path(), cart.path());
}

#[test]
fn held_error_names_the_holder() {
    let dir = tempfile::tempdir().unwrap();
    let service = service("lock-info");
    write_lock(dir.path(), &service, &foreign_lock(&service, Duration::minutes(5)));

    let err = DeployLock::acquire(dir.path(), &service, false).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("other-host"));
    assert!(message.contains("4242"));
    assert!(message.contains("--force"));
}

#[test]
fn stale_lock_is_broken_automatically() {
    let dir = tempfile::tempdir().unwrap();
    let service = service("lock-stale");
    write_lock(dir.path(), &service, &foreign_lock(&service, Duration::hours(2)));

    let lock = DeployLock::acquire(dir.path(), &service, false).unwrap();
    let content = fs::read_to_string(lock.path()).unwrap();
    let info: LockInfo = serde_json::from_str(&content).unwrap();
    assert_eq!(info.pid, std::process::id());
}

#[test]
fn force_breaks_a_fresh_lock() {
    let dir = tempfile::tempdir().unwrap();
    let service = service("lock-force");
    write_lock(dir.path(), &service, &foreign_lock(&service, Duration::minutes(1)));

    assert!(DeployLock::acquire(dir.path(), &service, false).is_err());
    DeployLock::acquire(dir.path(), &service, true).unwrap();
}

/// Push the lock file's modification time `age` into the past.
fn age_lock_file(path: &Path, age: std::time::Duration) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

#[test]
fn lock_file_being_written_is_respected() {
    let dir = tempfile::tempdir().unwrap();
    let service = service("lock-empty");
    fs::write(LockInfo::lock_path(dir.path(), &service), "").unwrap();

    let err = DeployLock::acquire(dir.path(), &service, false).unwrap_err();
    assert!(matches!(err, LockError::Held { .. }));
    assert!(LockInfo::lock_path(dir.path(), &service).exists());
}

#[test]
fn fresh_corrupt_lock_is_respected_until_stale() {
    let dir = tempfile::tempdir().unwrap();
    let service = service("lock-corrupt");
    let path = LockInfo::lock_path(dir.path(), &service);
    fs::write(&path, "garbage").unwrap();

    assert!(matches!(
        DeployLock::acquire(dir.path(), &service, false),
        Err(LockError::Held { .. })
    ));

    age_lock_file(&path, std::time::Duration::from_secs(2 * 3600));
    let lock = DeployLock::acquire(dir.path(), &service, false).unwrap();
    let info: LockInfo = serde_json::from_str(&fs::read_to_string(lock.path()).unwrap()).unwrap();
    assert_eq!(info.pid, std::process::id());
}

#[test]
fn force_breaks_a_corrupt_lock() {
    let dir = tempfile::tempdir().unwrap();
    let service = service("lock-corrupt-force");
    fs::write(LockInfo::lock_path(dir.path(), &service), "{").unwrap();

    DeployLock::acquire(dir.path(), &service, true).unwrap();
}

#[test]
fn acquiring_leaves_only_the_lock_file() {
    let dir = tempfile::tempdir().unwrap();
    let service = service("lock-tidy");
    write_lock(dir.path(), &service, &foreign_lock(&service, Duration::hours(3)));

    let lock = DeployLock::acquire(dir.path(), &service, false).unwrap();
    let names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["lock-tidy.lock".to_string()]);
    lock.release().unwrap();
}

#[test]
fn dropping_the_lock_releases_it() {
    let dir = tempfile::tempdir().unwrap();
    let service = service("lock-drop");
    let path = {
        let lock = DeployLock::acquire(dir.path(), &service, false).unwrap();
        lock.path().to_path_buf()
    };
    assert!(!path.exists());
}

#[tokio::test]
async fn with_lock_releases_after_the_body() {
    let dir = tempfile::tempdir().unwrap();
    let service = service("lock-scoped");

    let value: Result<u32, LockError> = with_lock(dir.path(), &service, false, || async {
        assert!(LockInfo::lock_path(dir.path(), &service).exists());
        Ok(7)
    })
    .await;

    assert_eq!(value.unwrap(), 7);
    assert!(!LockInfo::lock_path(dir.path(), &service).exists());
}

#[tokio::test]
async fn with_lock_does_not_run_the_body_when_held() {
    let dir = tempfile::tempdir().unwrap();
    let service = service("lock-busy");
    let _held = DeployLock::acquire(dir.path(), &service, false).unwrap();

    let mut ran = false;
    let result: Result<(), LockError> = with_lock(dir.path(), &service, false, || {
        ran = true;
        async { Ok(()) }
    })
    .await;

    assert!(matches!(result, Err(LockError::Held { .. })));
    assert!(!ran);
}
