mod common;

use std::fs;

use common::FakeBackend;
use exam_session::{CredentialEvent, CredentialStore, JsonFile, Role};
use serde_json::json;

#[test]
fn credential_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session").join("credentials.json");
    let backend = FakeBackend::new();

    let store = CredentialStore::persistent(JsonFile::new(&path));
    assert!(!store.is_authenticated());
    store.set(backend.issue_credential());
    assert!(path.exists());

    let saved: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["accessToken"], "access-1");
    assert_eq!(saved["refreshToken"], "refresh-1");
    assert_eq!(saved["userRole"], "ROLE_STUDENT");

    let reopened = CredentialStore::persistent(JsonFile::new(&path));
    assert_eq!(reopened.get(), store.get());
    assert_eq!(reopened.identity().unwrap().role, Role::Student);
}

#[test]
fn partial_credential_file_means_logged_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    fs::write(
        &path,
        json!({ "accessToken": "a", "userEmail": "x@okul.com", "userRole": "ROLE_STUDENT" }).to_string(),
    )
    .unwrap();

    let store = CredentialStore::persistent(JsonFile::new(&path));

    assert!(!store.is_authenticated());
    assert!(!path.exists());
}

#[test]
fn unknown_role_or_garbage_is_discarded() {
    let dir = tempfile::tempdir().unwrap();

    let path = dir.path().join("role.json");
    fs::write(
        &path,
        json!({
            "accessToken": "a",
            "refreshToken": "r",
            "userEmail": "x@okul.com",
            "userRole": "ROLE_JANITOR"
        })
        .to_string(),
    )
    .unwrap();
    assert!(!CredentialStore::persistent(JsonFile::new(&path)).is_authenticated());
    assert!(!path.exists());

    let path = dir.path().join("garbage.json");
    fs::write(&path, "{ not json").unwrap();
    assert!(!CredentialStore::persistent(JsonFile::new(&path)).is_authenticated());
    assert!(!path.exists());
}

#[test]
fn clear_removes_the_file_and_notifies_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let backend = FakeBackend::new();
    let store = CredentialStore::persistent(JsonFile::new(&path));
    store.set(backend.issue_credential());
    let mut events = store.subscribe();

    assert!(store.clear());
    assert!(!store.clear());

    assert!(!path.exists());
    assert_eq!(events.try_recv().unwrap(), CredentialEvent::Cleared);
    assert!(events.try_recv().is_err());
}

#[test]
fn concurrent_set_and_clear_keep_file_and_memory_in_step() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let backend = FakeBackend::new();
    let store = CredentialStore::persistent(JsonFile::new(&path));

    for round in 0..20 {
        let writers: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                let credential = backend.issue_credential();
                std::thread::spawn(move || {
                    if (i + round) % 2 == 0 {
                        store.set(credential);
                    } else {
                        store.clear();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(store.is_authenticated(), path.exists(), "round {round}");
        if store.is_authenticated() {
            let reopened = CredentialStore::persistent(JsonFile::new(&path));
            assert_eq!(reopened.get(), store.get(), "round {round}");
        }
    }
}
