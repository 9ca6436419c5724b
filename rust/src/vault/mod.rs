//! The script vault: owner-scoped records with duplicate detection, a durable
//! snapshot after every mutation, and gated raw reads.
//!
//! Every operation holds one mutex for its whole check-mutate-persist cycle, so
//! two concurrent creates of the same script by the same owner cannot both
//! succeed. Mutations are applied to a working copy and only committed once the
//! snapshot write has succeeded.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{SubsecRound, Utc};
use tracing::{debug, error, info, warn};

use crate::storage::{Snapshot, SnapshotStore};

pub mod error;
pub mod gate;
pub mod ids;
pub mod normalize;
pub mod record;

pub use error::{InvalidField, VaultError};
pub use gate::{ClientGate, MarkerGate};
pub use record::{ScriptId, ScriptRecord, StoredScript};

use normalize::{normalize, trim_script};

pub struct Vault {
    records: Mutex<Snapshot>,
    store: Box<dyn SnapshotStore>,
    gate: Arc<dyn ClientGate>,
}

impl Vault {
    /// Opens the vault on top of `store`, loading whatever snapshot it holds.
    ///
    /// Loading is best effort: an absent or unreadable snapshot yields an empty
    /// vault and a log line instead of an error.
    pub fn open(store: impl SnapshotStore + 'static, gate: impl ClientGate + 'static) -> Self {
        let records = match store.load() {
            Ok(Some(snapshot)) => {
                info!(scripts = snapshot.len(), "loaded scripts from snapshot");
                snapshot
            }
            Ok(None) => {
                info!("no snapshot found, starting with an empty vault");
                Snapshot::new()
            }
            Err(err) => {
                error!(error = %err, "snapshot load failed, starting with an empty vault");
                Snapshot::new()
            }
        };

        Self {
            records: Mutex::new(records),
            store: Box::new(store),
            gate: Arc::new(gate),
        }
    }

    /// Releases the vault.
    ///
    /// Every committed mutation is already on disk, so nothing is written here.
    /// A snapshot that failed to load stays untouched until the next mutation.
    pub fn close(self) -> Result<(), VaultError> {
        let records = self.lock()?;
        info!(scripts = records.len(), "vault closed");
        Ok(())
    }

    /// Stores a new script for `owner_id` and returns its id.
    pub fn create(&self, content: &str, owner_id: &str) -> Result<ScriptId, VaultError> {
        let content = trim_script(content);
        if content.is_empty() {
            return Err(VaultError::InvalidInput(InvalidField::Script));
        }
        if owner_id.is_empty() {
            return Err(VaultError::InvalidInput(InvalidField::UserId));
        }

        let mut records = self.lock()?;
        if let Some(existing) = find_duplicate(&records, owner_id, content, None) {
            debug!(id = %existing, "create rejected as duplicate");
            return Err(VaultError::DuplicateScript {
                existing: Some(existing),
            });
        }

        let id = ids::allocate_unique_id(|candidate| records.contains_key(candidate))
            .ok_or_else(|| VaultError::Internal("could not allocate a free script id".to_string()))?;

        let mut next = Snapshot::clone(&records);
        next.insert(
            id.clone(),
            StoredScript {
                script: content.to_string(),
                user_id: owner_id.to_string(),
                // Snapshots keep milliseconds; match them so reloads are exact.
                created_at: Utc::now().trunc_subsecs(3),
            },
        );
        self.commit(&mut records, next)?;

        info!(id = %id, "script created");
        Ok(id)
    }

    /// Replaces the content of `id` on behalf of `owner_id`.
    pub fn update(&self, id: &ScriptId, content: &str, owner_id: &str) -> Result<(), VaultError> {
        let mut records = self.lock()?;
        let current = records.get(id).ok_or(VaultError::NotFound)?;
        if current.user_id != owner_id {
            warn!(id = %id, "update rejected: owner mismatch");
            return Err(VaultError::Forbidden);
        }

        let content = trim_script(content);
        if content.is_empty() {
            return Err(VaultError::InvalidInput(InvalidField::Script));
        }
        if find_duplicate(&records, owner_id, content, Some(id)).is_some() {
            debug!(id = %id, "update rejected as duplicate");
            return Err(VaultError::DuplicateScript { existing: None });
        }

        let mut next = Snapshot::clone(&records);
        if let Some(stored) = next.get_mut(id) {
            stored.script = content.to_string();
        }
        self.commit(&mut records, next)?;

        info!(id = %id, "script updated");
        Ok(())
    }

    /// Removes `id` on behalf of `owner_id`.
    pub fn delete(&self, id: &ScriptId, owner_id: &str) -> Result<(), VaultError> {
        let mut records = self.lock()?;
        let current = records.get(id).ok_or(VaultError::NotFound)?;
        if current.user_id != owner_id {
            warn!(id = %id, "delete rejected: owner mismatch");
            return Err(VaultError::Forbidden);
        }

        let mut next = Snapshot::clone(&records);
        next.shift_remove(id);
        self.commit(&mut records, next)?;

        info!(id = %id, "script deleted");
        Ok(())
    }

    /// All scripts owned by `owner_id`, in creation order.
    pub fn list_by_owner(&self, owner_id: &str) -> Result<Vec<ScriptRecord>, VaultError> {
        let records = self.lock()?;
        Ok(records
            .iter()
            .filter(|(_, stored)| stored.user_id == owner_id)
            .map(|(id, stored)| ScriptRecord::from_stored(id, stored))
            .collect())
    }

    /// Returns the raw content of `id` if `client_identity` passes the gate.
    ///
    /// Existence is checked first, so unknown ids report `NotFound` to every
    /// client while known ids report `AccessDenied` to gated-out clients.
    pub fn gated_read(&self, id: &ScriptId, client_identity: &str) -> Result<String, VaultError> {
        let records = self.lock()?;
        let stored = records.get(id).ok_or(VaultError::NotFound)?;
        if !self.gate.allows(client_identity) {
            debug!(id = %id, client = client_identity, "raw read refused by gate");
            return Err(VaultError::AccessDenied);
        }
        Ok(stored.script.clone())
    }

    /// Owner-agnostic lookup for operator tooling.
    pub fn get(&self, id: &ScriptId) -> Result<Option<ScriptRecord>, VaultError> {
        let records = self.lock()?;
        Ok(records.get(id).map(|stored| ScriptRecord::from_stored(id, stored)))
    }

    pub fn len(&self) -> Result<usize, VaultError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, VaultError> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Snapshot>, VaultError> {
        self.records
            .lock()
            .map_err(|_| VaultError::Internal("vault lock poisoned".to_string()))
    }

    fn commit(&self, records: &mut MutexGuard<'_, Snapshot>, next: Snapshot) -> Result<(), VaultError> {
        if let Err(err) = self.store.save(&next) {
            error!(error = %err, "snapshot save failed, mutation discarded");
            return Err(err.into());
        }
        **records = next;
        Ok(())
    }
}

fn find_duplicate(
    records: &Snapshot,
    owner_id: &str,
    content: &str,
    exclude: Option<&ScriptId>,
) -> Option<ScriptId> {
    let wanted = normalize(content);
    records
        .iter()
        .filter(|(id, _)| Some(*id) != exclude)
        .find(|(_, stored)| stored.user_id == owner_id && normalize(&stored.script) == wanted)
        .map(|(id, _)| id.clone())
}

#[cfg(test)]
mod tests {
    use super::{InvalidField, MarkerGate, ScriptId, StoredScript, Vault, VaultError};
    use crate::storage::{JsonFileStore, MemoryStore, Snapshot};
    use chrono::{TimeZone, Utc};
    use std::fs;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    const ROBLOX: &str = "Roblox/WinInet";

    fn memory_vault() -> (Vault, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Vault::open(store.clone(), MarkerGate::default()), store)
    }

    #[test]
    fn create_trims_and_deduplicates_per_owner() {
        let (vault, _) = memory_vault();
        let first = vault.create("  print(1)  ", "u1").unwrap();
        assert_eq!(vault.gated_read(&first, ROBLOX).unwrap(), "print(1)");

        match vault.create("print(1)", "u1") {
            Err(VaultError::DuplicateScript { existing }) => assert_eq!(existing, Some(first.clone())),
            other => panic!("expected duplicate, got {other:?}"),
        }

        let other_owner = vault.create("print(1)", "u2").unwrap();
        assert_ne!(other_owner, first);
        assert_eq!(vault.len().unwrap(), 2);
    }

    #[test]
    fn duplicate_detection_ignores_whitespace_layout() {
        let (vault, _) = memory_vault();
        let first = vault.create("local a = 1\nprint(a)", "u1").unwrap();
        let err = vault.create("  local  a = 1   print(a)\t", "u1").unwrap_err();
        assert!(matches!(err, VaultError::DuplicateScript { existing: Some(id) } if id == first));
    }

    #[test]
    fn stored_content_keeps_inner_whitespace() {
        let (vault, _) = memory_vault();
        let id = vault.create("\n  a  =  1\n\n", "u1").unwrap();
        assert_eq!(vault.gated_read(&id, ROBLOX).unwrap(), "a  =  1");
    }

    #[test]
    fn create_rejects_blank_input() {
        let (vault, store) = memory_vault();
        assert!(matches!(vault.create("   \n", "u1"), Err(VaultError::InvalidInput(InvalidField::Script))));
        assert!(matches!(vault.create("print(1)", ""), Err(VaultError::InvalidInput(InvalidField::UserId))));
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn every_mutation_persists_a_snapshot() {
        let (vault, store) = memory_vault();
        let id = vault.create("print(1)", "u1").unwrap();
        assert_eq!(store.save_count(), 1);
        vault.update(&id, "print(2)", "u1").unwrap();
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.snapshot().unwrap()[&id].script, "print(2)");
        vault.delete(&id, "u1").unwrap();
        assert_eq!(store.save_count(), 3);
        assert!(store.snapshot().unwrap().is_empty());
    }

    #[test]
    fn update_checks_existence_then_owner_then_content() {
        let (vault, _) = memory_vault();
        let id = vault.create("print(1)", "u1").unwrap();

        let missing = ScriptId::from("0000000000000000");
        assert!(matches!(vault.update(&missing, "", "u1"), Err(VaultError::NotFound)));
        assert!(matches!(vault.update(&id, "", "u2"), Err(VaultError::Forbidden)));
        assert!(matches!(vault.update(&id, "  ", "u1"), Err(VaultError::InvalidInput(InvalidField::Script))));
    }

    #[test]
    fn update_rejects_collision_with_other_record_but_not_itself() {
        let (vault, _) = memory_vault();
        let a = vault.create("print('a')", "u1").unwrap();
        let b = vault.create("print('b')", "u1").unwrap();

        let err = vault.update(&b, "print('a')", "u1").unwrap_err();
        assert!(matches!(err, VaultError::DuplicateScript { existing: None }));

        vault.update(&a, "  print('a')  ", "u1").unwrap();
        assert_eq!(vault.gated_read(&a, ROBLOX).unwrap(), "print('a')");
    }

    #[test]
    fn update_may_match_another_owners_script() {
        let (vault, _) = memory_vault();
        vault.create("print(1)", "u2").unwrap();
        let mine = vault.create("print(0)", "u1").unwrap();
        vault.update(&mine, "print(1)", "u1").unwrap();
    }

    #[test]
    fn update_keeps_owner_and_creation_time() {
        let (vault, _) = memory_vault();
        let id = vault.create("print(1)", "u1").unwrap();
        let before = vault.get(&id).unwrap().unwrap();
        vault.update(&id, "print(2)", "u1").unwrap();
        let after = vault.get(&id).unwrap().unwrap();
        assert_eq!(after.owner_id, "u1");
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.content, "print(2)");
    }

    #[test]
    fn delete_enforces_ownership() {
        let (vault, _) = memory_vault();
        let id = vault.create("print(1)", "u1").unwrap();
        assert!(matches!(vault.delete(&id, "u2"), Err(VaultError::Forbidden)));
        assert!(matches!(
            vault.delete(&ScriptId::from("nope"), "u1"),
            Err(VaultError::NotFound)
        ));
        vault.delete(&id, "u1").unwrap();
        assert!(vault.is_empty().unwrap());
    }

    #[test]
    fn deleted_scripts_read_as_not_found_for_everyone() {
        let (vault, _) = memory_vault();
        let id = vault.create("print(1)", "u1").unwrap();
        vault.delete(&id, "u1").unwrap();
        assert!(matches!(vault.gated_read(&id, ROBLOX), Err(VaultError::NotFound)));
        assert!(matches!(vault.gated_read(&id, "curl/8.0"), Err(VaultError::NotFound)));
    }

    #[test]
    fn delete_frees_content_for_reuse() {
        let (vault, _) = memory_vault();
        let id = vault.create("print(1)", "u1").unwrap();
        vault.delete(&id, "u1").unwrap();
        vault.create("print(1)", "u1").unwrap();
    }

    #[test]
    fn gate_runs_after_existence_check() {
        let (vault, _) = memory_vault();
        let id = vault.create("print(1)", "u1").unwrap();
        assert!(matches!(vault.gated_read(&id, "Mozilla/5.0"), Err(VaultError::AccessDenied)));
        assert!(matches!(
            vault.gated_read(&ScriptId::from("missing"), "Mozilla/5.0"),
            Err(VaultError::NotFound)
        ));
        assert_eq!(vault.gated_read(&id, "Executor HttpGet").unwrap(), "print(1)");
    }

    #[test]
    fn custom_gate_replaces_markers() {
        let vault = Vault::open(MemoryStore::new(), |identity: &str| identity == "trusted");
        let id = vault.create("print(1)", "u1").unwrap();
        assert!(matches!(vault.gated_read(&id, ROBLOX), Err(VaultError::AccessDenied)));
        assert_eq!(vault.gated_read(&id, "trusted").unwrap(), "print(1)");
    }

    #[test]
    fn list_returns_only_the_owners_scripts_in_creation_order() {
        let (vault, _) = memory_vault();
        let a = vault.create("print('a')", "u1").unwrap();
        vault.create("print('a')", "u2").unwrap();
        let c = vault.create("print('c')", "u1").unwrap();

        let listed = vault.list_by_owner("u1").unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![a, c]);
        assert!(listed.iter().all(|r| r.owner_id == "u1"));
        assert!(vault.list_by_owner("nobody").unwrap().is_empty());
    }

    #[test]
    fn failed_save_leaves_store_untouched() {
        let (vault, store) = memory_vault();
        let id = vault.create("print(1)", "u1").unwrap();
        store.fail_writes(true);

        assert!(matches!(vault.create("print(2)", "u1"), Err(VaultError::Persist(_))));
        assert!(matches!(vault.update(&id, "print(3)", "u1"), Err(VaultError::Persist(_))));
        assert!(matches!(vault.delete(&id, "u1"), Err(VaultError::Persist(_))));

        assert_eq!(vault.len().unwrap(), 1);
        assert_eq!(vault.gated_read(&id, ROBLOX).unwrap(), "print(1)");

        store.fail_writes(false);
        vault.create("print(2)", "u1").unwrap();
    }

    #[test]
    fn concurrent_identical_creates_admit_one() {
        let (vault, _) = memory_vault();
        let vault = Arc::new(vault);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let vault = vault.clone();
                thread::spawn(move || vault.create("print('race')", "u1").is_ok())
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(created, 1);
        assert_eq!(vault.len().unwrap(), 1);
    }

    #[test]
    fn reopening_a_file_store_reproduces_the_vault() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scripts.json");

        let vault = Vault::open(JsonFileStore::new(&path), MarkerGate::default());
        let a = vault.create("print('a')", "u1").unwrap();
        let b = vault.create("print('b')", "u2").unwrap();
        let before_a = vault.get(&a).unwrap().unwrap();
        let before_b = vault.get(&b).unwrap().unwrap();
        vault.close().unwrap();

        let reopened = Vault::open(JsonFileStore::new(&path), MarkerGate::default());
        assert_eq!(reopened.get(&a).unwrap(), Some(before_a));
        assert_eq!(reopened.get(&b).unwrap(), Some(before_b));
        assert_eq!(reopened.list_by_owner("u1").unwrap().len(), 1);
    }

    #[test]
    fn corrupt_snapshot_opens_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scripts.json");
        fs::write(&path, "[1, 2").unwrap();
        let vault = Vault::open(JsonFileStore::new(&path), MarkerGate::default());
        assert!(vault.is_empty().unwrap());
    }

    #[test]
    fn preloaded_snapshot_is_served() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            ScriptId::from("00112233aabbccdd"),
            StoredScript {
                script: "print(1)".to_string(),
                user_id: "u1".to_string(),
                created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            },
        );
        let vault = Vault::open(MemoryStore::with_snapshot(snapshot), MarkerGate::default());

        let id = ScriptId::from("00112233aabbccdd");
        assert_eq!(vault.gated_read(&id, ROBLOX).unwrap(), "print(1)");
        match vault.create(" print(1) ", "u1") {
            Err(VaultError::DuplicateScript { existing }) => assert_eq!(existing, Some(id)),
            other => panic!("expected duplicate, got {other:?}"),
        }
    }

    #[test]
    fn close_does_not_rewrite_the_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let vault = Vault::open(store.clone(), MarkerGate::default());
        vault.close().unwrap();
        assert_eq!(store.save_count(), 0);
        assert!(store.snapshot().is_none());
    }

    #[test]
    fn corrupt_snapshot_survives_open_and_close() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scripts.json");
        let raw = r#"{"abc": {"script": "print(1)", "userId": "u1", "createdAt": "bad"}}"#;
        fs::write(&path, raw).unwrap();

        let vault = Vault::open(JsonFileStore::new(&path), MarkerGate::default());
        assert!(vault.is_empty().unwrap());
        vault.close().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), raw);
    }

    #[test]
    fn created_at_round_trips_exactly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scripts.json");
        let vault = Vault::open(JsonFileStore::new(&path), MarkerGate::default());
        let id = vault.create("print(1)", "u1").unwrap();
        let before = vault.list_by_owner("u1").unwrap();
        assert_eq!(before[0].created_at.timestamp_subsec_nanos() % 1_000_000, 0);

        let reopened = Vault::open(JsonFileStore::new(&path), MarkerGate::default());
        assert_eq!(reopened.list_by_owner("u1").unwrap(), before);
        assert_eq!(reopened.get(&id).unwrap().unwrap().created_at, before[0].created_at);
    }

    #[test]
    fn byte_order_mark_counts_as_whitespace() {
        let (vault, _) = memory_vault();
        let id = vault.create("\u{feff}print(1)\u{feff}", "u1").unwrap();
        assert_eq!(vault.gated_read(&id, ROBLOX).unwrap(), "print(1)");
        assert!(matches!(
            vault.create("print(1)", "u1"),
            Err(VaultError::DuplicateScript { existing: Some(existing) }) if existing == id
        ));
        assert!(vault.create("\u{85}", "u1").is_ok());
    }
}
