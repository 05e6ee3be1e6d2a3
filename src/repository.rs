//! Durable player store: one JSON document holding every record.
//!
//! Every mutation takes an exclusive lock on `<store>.lock`, re-reads the document, applies the
//! change to a copy, writes a uniquely named temp file beside the store, fsyncs it and renames it
//! over the store. Writers in other processes (or other repository instances) are serialised by
//! the lock file; readers only ever see a complete document. The cache is replaced only after the
//! rename succeeded, so a failed write leaves memory and disk in agreement.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use fs2::FileExt;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::IdentityConfig;
use crate::error::{IdentityError, IdentityResult, StorageError};
use crate::player::{Player, PlayerId, PlayerPatch};
use crate::security::PasswordHashing;

const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    #[serde(default)]
    players: Vec<Player>,
}

fn read_document(path: &Path) -> Result<Vec<Player>, StorageError> {
    if !path.exists() { return Ok(Vec::new()); }
    let bytes = fs::read(path).map_err(|e| StorageError::io(path, e))?;
    if bytes.iter().all(|b| b.is_ascii_whitespace()) { return Ok(Vec::new()); }
    let doc: StoreDocument = serde_json::from_slice(&bytes)?;
    Ok(doc.players)
}

fn store_dir(path: &Path) -> Result<PathBuf, StorageError> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
    Ok(dir)
}

fn write_document(path: &Path, players: &[Player]) -> Result<(), StorageError> {
    let dir = store_dir(path)?;
    let doc = StoreDocument { version: STORE_VERSION, players: players.to_vec() };
    let bytes = serde_json::to_vec_pretty(&doc)?;
    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| StorageError::io(&dir, e))?;
    tmp.write_all(&bytes).map_err(|e| StorageError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| StorageError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| StorageError::io(path, e.error))?;
    Ok(())
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

/// Exclusive advisory lock on the store's sidecar lock file, released when the handle drops.
fn lock_store(path: &Path) -> Result<File, StorageError> {
    store_dir(path)?;
    let lock = lock_path(path);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&lock)
        .map_err(|e| StorageError::io(&lock, e))?;
    file.lock_exclusive().map_err(|e| StorageError::io(&lock, e))?;
    Ok(file)
}

/// Alias is checked before email, so a record colliding on both reports `DuplicateAlias`.
fn check_unique(players: &[Player], alias: &str, email: &str, except: Option<PlayerId>) -> IdentityResult<()> {
    let others = || players.iter().filter(move |p| Some(p.id) != except);
    if others().any(|p| p.alias == alias) {
        return Err(IdentityError::DuplicateAlias(alias.to_string()));
    }
    if others().any(|p| p.email == email) {
        return Err(IdentityError::DuplicateEmail(email.to_string()));
    }
    Ok(())
}

pub struct PlayerRepository {
    path: PathBuf,
    hashing: PasswordHashing,
    players: RwLock<Vec<Player>>,
}

impl PlayerRepository {
    /// Load the store at `path`, creating an empty one (and its directories) if missing.
    pub fn open(path: impl Into<PathBuf>, hashing: PasswordHashing) -> Result<Self, StorageError> {
        let path = path.into();
        if !path.exists() {
            let _lock = lock_store(&path)?;
            if !path.exists() {
                write_document(&path, &[])?;
                info!(target: "starport::repository", "created empty player store at {}", path.display());
            }
        }
        let players = read_document(&path)?;
        debug!(target: "starport::repository", "loaded {} player(s) from {}", players.len(), path.display());
        Ok(Self { path, hashing, players: RwLock::new(players) })
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn hashing(&self) -> &PasswordHashing { &self.hashing }

    /// Discard the cache and re-read the store. Other processes may have written since.
    pub fn reload(&self) -> Result<(), StorageError> {
        let mut guard = self.players.write();
        *guard = read_document(&self.path)?;
        Ok(())
    }

    pub fn get_by_alias(&self, alias: &str) -> Option<Player> {
        self.players.read().iter().find(|p| p.alias == alias).cloned()
    }

    pub fn get_by_email(&self, email: &str) -> Option<Player> {
        self.players.read().iter().find(|p| p.email == email).cloned()
    }

    pub fn get_by_id(&self, id: PlayerId) -> Option<Player> {
        self.players.read().iter().find(|p| p.id == id).cloned()
    }

    pub fn get_by_confirmation_token(&self, token: &str) -> Option<Player> {
        self.players.read().iter()
            .find(|p| p.confirmation_token.as_deref().is_some_and(|t| t.as_bytes() == token.as_bytes()))
            .cloned()
    }

    pub fn all(&self) -> Vec<Player> { self.players.read().clone() }

    pub fn len(&self) -> usize { self.players.read().len() }

    pub fn is_empty(&self) -> bool { self.players.read().is_empty() }

    /// Apply `f` to a freshly loaded copy of the store and persist the result atomically.
    /// `Ok` means the change is on disk; no other writer can interleave between read and rename.
    fn mutate<T>(&self, f: impl FnOnce(&mut Vec<Player>) -> IdentityResult<T>) -> IdentityResult<T> {
        let mut guard = self.players.write();
        let _lock = lock_store(&self.path)?;
        let mut next = read_document(&self.path)?;
        let out = f(&mut next)?;
        write_document(&self.path, &next)?;
        *guard = next;
        Ok(out)
    }

    pub fn add(&self, player: Player) -> IdentityResult<Player> {
        if player.password_hash.is_empty() {
            return Err(IdentityError::invalid("password", "password hash must not be empty"));
        }
        let stored = self.mutate(|players| {
            check_unique(players, &player.alias, &player.email, None)?;
            if players.iter().any(|p| p.id == player.id) {
                return Err(IdentityError::invalid("id", "player id already in use"));
            }
            players.push(player.clone());
            Ok(player)
        })?;
        info!(target: "starport::repository", "added player id={} alias={}", stored.id, stored.alias);
        Ok(stored)
    }

    pub fn update(&self, id: PlayerId, patch: PlayerPatch) -> IdentityResult<Player> {
        let updated = self.mutate(|players| {
            let idx = players.iter().position(|p| p.id == id).ok_or(IdentityError::NotFound)?;
            let mut candidate = players[idx].clone();
            patch.apply(&mut candidate);
            check_unique(players, &candidate.alias, &candidate.email, Some(id))?;
            candidate.updated_at = Utc::now();
            players[idx] = candidate.clone();
            Ok(candidate)
        })?;
        debug!(target: "starport::repository", "updated player id={}", id);
        Ok(updated)
    }

    /// Mark the holder of `token` as confirmed and clear the token in one atomic step, so a
    /// token can be consumed once even with concurrent callers.
    pub fn consume_confirmation_token(&self, token: &str) -> IdentityResult<Player> {
        if token.is_empty() { return Err(IdentityError::InvalidToken); }
        let confirmed = self.mutate(|players| {
            let p = players.iter_mut()
                .find(|p| p.confirmation_token.as_deref().is_some_and(|t| t.as_bytes() == token.as_bytes()))
                .ok_or(IdentityError::InvalidToken)?;
            p.email_confirmed = true;
            p.confirmation_token = None;
            p.updated_at = Utc::now();
            Ok(p.clone())
        })?;
        info!(target: "starport::repository", "email confirmed for player id={}", confirmed.id);
        Ok(confirmed)
    }

    /// Re-hash and store a new password for `email`. Returns `false` when no player has that
    /// email; the caller decides what to tell the user.
    pub fn update_password(&self, email: &str, new_password: &str) -> Result<bool, StorageError> {
        let hash = self.hashing.hash(new_password)?;
        let res = self.mutate(|players| {
            let Some(p) = players.iter_mut().find(|p| p.email == email) else { return Ok(None); };
            p.password_hash = hash;
            p.updated_at = Utc::now();
            Ok(Some(p.id))
        });
        match res {
            Ok(Some(id)) => {
                info!(target: "starport::repository", "password updated for player id={}", id);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(IdentityError::StorageFailure(e)) => Err(e),
            Err(other) => Err(StorageError::Hashing(other.to_string())),
        }
    }
}

static SHARED: OnceCell<Arc<PlayerRepository>> = OnceCell::new();

/// Process-wide repository, opened (load-or-create) on first use and kept until exit.
/// Later calls return the same instance regardless of the config passed.
pub fn shared_repository(cfg: &IdentityConfig) -> Result<Arc<PlayerRepository>, StorageError> {
    SHARED
        .get_or_try_init(|| PlayerRepository::open(cfg.store_path.clone(), PasswordHashing::new(cfg.hashing)).map(Arc::new))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashingConfig;
    use tempfile::tempdir;

    fn repo_at(dir: &Path) -> PlayerRepository {
        PlayerRepository::open(dir.join("players.json"), PasswordHashing::new(HashingConfig::fast_for_tests())).unwrap()
    }

    fn player(alias: &str, email: &str) -> Player {
        Player::new(alias.into(), "Test Pilot".into(), email.into(), "$argon2id$v=19$placeholder".into(), None)
    }

    #[test]
    fn open_creates_missing_store() {
        let tmp = tempdir().unwrap();
        let nested = tmp.path().join("data").join("players.json");
        let repo = PlayerRepository::open(&nested, PasswordHashing::default()).unwrap();
        assert!(nested.exists());
        assert!(repo.is_empty());
    }

    #[test]
    fn duplicates_rejected_and_store_unchanged() {
        let tmp = tempdir().unwrap();
        let repo = repo_at(tmp.path());
        repo.add(player("Mel", "mel@x.com")).unwrap();
        let before = fs::read(repo.path()).unwrap();
        assert!(matches!(repo.add(player("Mel", "other@x.com")), Err(IdentityError::DuplicateAlias(_))));
        assert!(matches!(repo.add(player("Other", "mel@x.com")), Err(IdentityError::DuplicateEmail(_))));
        assert_eq!(fs::read(repo.path()).unwrap(), before);
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn lookups_are_exact() {
        let tmp = tempdir().unwrap();
        let repo = repo_at(tmp.path());
        let p = repo.add(player("Mel", "mel@x.com")).unwrap();
        assert_eq!(repo.get_by_alias("Mel").map(|p| p.id), Some(p.id));
        assert!(repo.get_by_alias("mel").is_none());
        assert!(repo.get_by_email("MEL@x.com").is_none());
        assert_eq!(repo.get_by_id(p.id).unwrap().email, "mel@x.com");
    }

    #[test]
    fn update_checks_other_records_only() {
        let tmp = tempdir().unwrap();
        let repo = repo_at(tmp.path());
        let a = repo.add(player("A", "a@x.com")).unwrap();
        repo.add(player("B", "b@x.com")).unwrap();
        // re-submitting own alias is fine
        let same = repo.update(a.id, PlayerPatch { alias: Some("A".into()), ..Default::default() }).unwrap();
        assert_eq!(same.alias, "A");
        let err = repo.update(a.id, PlayerPatch { email: Some("b@x.com".into()), ..Default::default() }).unwrap_err();
        assert!(matches!(err, IdentityError::DuplicateEmail(_)));
        let missing = Player::new("Z".into(), String::new(), "z@x.com".into(), "h".into(), None).id;
        assert!(matches!(repo.update(missing, PlayerPatch::default()), Err(IdentityError::NotFound)));
    }

    #[test]
    fn update_password_reports_unknown_email_as_false() {
        let tmp = tempdir().unwrap();
        let repo = repo_at(tmp.path());
        repo.add(player("Mel", "mel@x.com")).unwrap();
        assert!(!repo.update_password("nobody@x.com", "NewPass1").unwrap());
        assert!(repo.update_password("mel@x.com", "NewPass1").unwrap());
        let stored = repo.get_by_email("mel@x.com").unwrap();
        assert!(crate::security::verify_password(&stored.password_hash, "NewPass1"));
    }

    #[test]
    fn atomic_write_leaves_no_temp_file_and_is_visible_to_other_instances() {
        let tmp = tempdir().unwrap();
        let a = repo_at(tmp.path());
        let b = repo_at(tmp.path());
        a.add(player("Mel", "mel@x.com")).unwrap();
        let mut names: Vec<_> = fs::read_dir(tmp.path()).unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["players.json", "players.json.lock"]);
        assert!(b.get_by_alias("Mel").is_none(), "cache is stale until reload");
        b.reload().unwrap();
        assert!(b.get_by_alias("Mel").is_some());
        // b writes after reading the file again, so uniqueness holds across instances
        assert!(matches!(b.add(player("Mel", "x@x.com")), Err(IdentityError::DuplicateAlias(_))));
    }

    #[test]
    fn malformed_store_is_a_storage_failure() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("players.json");
        fs::write(&path, b"{ not json").unwrap();
        let err = PlayerRepository::open(&path, PasswordHashing::default()).err().unwrap();
        assert!(matches!(err, StorageError::Malformed(_)));
    }
}
