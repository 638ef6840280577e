//! The saved-game library.
//!
//! Named saves live under `chess-game-saves/<id>`, one JSON record per key.
//! The auto-save slot and the library settings have fixed keys. The number of
//! named saves is bounded by `max_saved_games`; saving into a full library
//! evicts the least recently modified records first.

use std::sync::Arc;

use chess_core::RulesEngine;
use chrono::{DateTime, Utc};
use game_session::{to_record, GameSession, SavedRecord};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use validator::Validate;

use crate::error::StoreError;
use crate::store::KeyValueStore;

pub const SAVES_PREFIX: &str = "chess-game-saves/";
pub const AUTO_SAVE_KEY: &str = "chess-game-autosave";
pub const SETTINGS_KEY: &str = "chess-game-storage-settings";

pub const AUTO_SAVE_ID: &str = "autosave";
pub const AUTO_SAVE_NAME: &str = "Auto-saved Game";

/// Budget reported by `storage_info`; browsers give local storage 5-10 MiB.
pub const STORAGE_ESTIMATE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageSettings {
    pub auto_save: bool,
    pub max_saved_games: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            auto_save: true,
            max_saved_games: 10,
        }
    }
}

/// Partial settings update; `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub auto_save: Option<bool>,
    pub max_saved_games: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub used: usize,
    pub available: usize,
    pub game_count: usize,
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct GameLibrary<S> {
    store: S,
    settings: StorageSettings,
    clock: Clock,
}

impl<S: KeyValueStore> GameLibrary<S> {
    /// Open the library, reading stored settings over the defaults.
    pub fn new(store: S) -> Self {
        let settings = match store.get(SETTINGS_KEY) {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!(error = %e, "unreadable storage settings, using defaults");
                StorageSettings::default()
            }),
            Ok(None) => StorageSettings::default(),
            Err(e) => {
                warn!(error = %e, "failed to read storage settings, using defaults");
                StorageSettings::default()
            }
        };

        Self {
            store,
            settings,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the time source used for ids and timestamps.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    // Settings

    pub fn settings(&self) -> StorageSettings {
        self.settings
    }

    pub fn update_settings(&mut self, patch: SettingsPatch) -> Result<StorageSettings, StoreError> {
        if let Some(auto_save) = patch.auto_save {
            self.settings.auto_save = auto_save;
        }
        if let Some(max) = patch.max_saved_games {
            self.settings.max_saved_games = max;
        }
        self.store
            .put(SETTINGS_KEY, &serde_json::to_string(&self.settings)?)?;
        info!(
            auto_save = self.settings.auto_save,
            max_saved_games = self.settings.max_saved_games,
            "storage settings updated"
        );
        Ok(self.settings)
    }

    // Named saves

    /// Store `record` as a new save with a fresh id and timestamps.
    pub fn save(&self, record: SavedRecord) -> Result<SavedRecord, StoreError> {
        let now = self.now();
        let record = SavedRecord {
            id: generate_id(now),
            created_at: now,
            last_modified: now,
            ..record
        };
        self.insert(&record)?;
        info!(id = %record.id, name = %record.name, "game saved");
        Ok(record)
    }

    /// Save the session under `name` (or the default name).
    pub fn save_session<E: RulesEngine>(
        &self,
        session: &GameSession<E>,
        name: Option<&str>,
    ) -> Result<SavedRecord, StoreError> {
        let now = self.now();
        self.save(to_record(session, name, &generate_id(now), now))
    }

    fn insert(&self, record: &SavedRecord) -> Result<(), StoreError> {
        record.validate()?;
        self.store
            .put(&save_key(&record.id), &serde_json::to_string(record)?)?;
        self.evict_beyond_limit(&record.id)
    }

    /// Drop the oldest saves other than `keep` until the library is back
    /// under the limit. Call only once `keep` is stored.
    fn evict_beyond_limit(&self, keep: &str) -> Result<(), StoreError> {
        let max = self.settings.max_saved_games.max(1);
        let mut others: Vec<SavedRecord> = self
            .read_saves()?
            .into_iter()
            .filter(|r| r.id != keep)
            .collect();
        let excess = others.len().saturating_sub(max - 1);
        if excess == 0 {
            return Ok(());
        }

        others.sort_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.id.cmp(&b.id))
        });
        for old in others.iter().take(excess) {
            self.store.remove(&save_key(&old.id))?;
            debug!(id = %old.id, "evicted oldest save");
        }
        Ok(())
    }

    fn read_saves(&self) -> Result<Vec<SavedRecord>, StoreError> {
        let entries = self.store.list_all(SAVES_PREFIX)?;
        Ok(entries
            .into_iter()
            .filter_map(|(key, json)| match serde_json::from_str(&json) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(key = %key, error = %e, "skipping unreadable save");
                    None
                }
            })
            .collect())
    }

    pub fn load(&self, id: &str) -> Result<Option<SavedRecord>, StoreError> {
        match self.store.get(&save_key(id))? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Modify a save in place. The id and creation time cannot change;
    /// `last_modified` is set to now.
    pub fn update<F>(&self, id: &str, patch: F) -> Result<Option<SavedRecord>, StoreError>
    where
        F: FnOnce(&mut SavedRecord),
    {
        let Some(mut record) = self.load(id)? else {
            return Ok(None);
        };
        let (id, created_at) = (record.id.clone(), record.created_at);
        patch(&mut record);
        record.id = id;
        record.created_at = created_at;
        record.last_modified = self.now();

        record.validate()?;
        self.store
            .put(&save_key(&record.id), &serde_json::to_string(&record)?)?;
        debug!(id = %record.id, "save updated");
        Ok(Some(record))
    }

    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let removed = self.store.remove(&save_key(id))?;
        if removed {
            info!(id, "save deleted");
        }
        Ok(removed)
    }

    /// All saves, most recently modified first.
    pub fn list(&self) -> Result<Vec<SavedRecord>, StoreError> {
        let mut saves = self.read_saves()?;
        saves.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(saves)
    }

    /// Remove every named save and the auto-save slot.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        for (key, _) in self.store.list_all(SAVES_PREFIX)? {
            self.store.remove(&key)?;
        }
        self.store.remove(AUTO_SAVE_KEY)?;
        info!("all saved games cleared");
        Ok(())
    }

    pub fn storage_info(&self) -> Result<StorageInfo, StoreError> {
        let entries = self.store.list_all(SAVES_PREFIX)?;
        let used: usize = entries.iter().map(|(_, json)| json.len()).sum();
        Ok(StorageInfo {
            used,
            available: STORAGE_ESTIMATE_BYTES.saturating_sub(used),
            game_count: entries.len(),
        })
    }

    // Auto-save slot

    /// Overwrite the auto-save slot with the session, unless auto-save is
    /// turned off.
    pub fn auto_save<E: RulesEngine>(
        &self,
        session: &GameSession<E>,
    ) -> Result<Option<SavedRecord>, StoreError> {
        if !self.settings.auto_save {
            return Ok(None);
        }
        let now = self.now();
        let record = SavedRecord {
            created_at: now,
            ..to_record(session, Some(AUTO_SAVE_NAME), AUTO_SAVE_ID, now)
        };
        self.store
            .put(AUTO_SAVE_KEY, &serde_json::to_string(&record)?)?;
        debug!(moves = record.move_count, "auto-saved");
        Ok(Some(record))
    }

    /// The auto-saved game; an unreadable slot counts as empty.
    pub fn load_auto_save(&self) -> Result<Option<SavedRecord>, StoreError> {
        let Some(json) = self.store.get(AUTO_SAVE_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(error = %e, "unreadable auto-save");
                Ok(None)
            }
        }
    }

    pub fn has_auto_save(&self) -> bool {
        matches!(self.load_auto_save(), Ok(Some(_)))
    }

    // Export / import

    pub fn export(&self, id: &str) -> Result<String, StoreError> {
        let record = self
            .load(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(serde_json::to_string_pretty(&record)?)
    }

    /// Add an exported record as a new save: fresh id, `last_modified` now,
    /// " (Imported)" appended to the name.
    pub fn import(&self, json: &str) -> Result<SavedRecord, StoreError> {
        let record: SavedRecord = serde_json::from_str(json)?;
        record.validate()?;

        let now = self.now();
        let record = SavedRecord {
            id: generate_id(now),
            name: format!("{} (Imported)", record.name),
            last_modified: now,
            ..record
        };
        self.insert(&record)?;
        info!(id = %record.id, "game imported");
        Ok(record)
    }
}

fn save_key(id: &str) -> String {
    format!("{SAVES_PREFIX}{id}")
}

/// `game_<unix millis>_<9 base-36 chars>`
pub fn generate_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..9)
        .filter_map(|_| std::char::from_digit(rng.random_range(0..36), 36))
        .collect();
    format!("game_{}_{}", now.timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chess_core::{GameStatus, MoveRequest, StandardRules};
    use chrono::{Duration, TimeZone};
    use game_session::audio::SilentAudio;
    use game_session::{GameMode, SessionConfig};
    use std::sync::atomic::{AtomicI64, Ordering};

    fn ticking_clock() -> impl Fn() -> DateTime<Utc> + Send + Sync + 'static {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let tick = AtomicI64::new(0);
        move || start + Duration::seconds(tick.fetch_add(1, Ordering::SeqCst))
    }

    fn library() -> GameLibrary<MemoryStore> {
        GameLibrary::new(MemoryStore::new()).with_clock(ticking_clock())
    }

    fn session(moves: &[&str]) -> GameSession<StandardRules> {
        let config = SessionConfig {
            mode: GameMode::HumanVsHuman,
            ..SessionConfig::default()
        };
        let mut session = GameSession::new(StandardRules::new(), config, Arc::new(SilentAudio));
        for uci in moves {
            let request: MoveRequest = uci.parse().unwrap();
            session.drop_piece(request.from, request.to);
        }
        session
    }

    #[test]
    fn test_generate_id_format() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let id = generate_id(now);
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "game");
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_save_load_delete() {
        let lib = library();
        let saved = lib.save_session(&session(&["e2e4"]), Some("Opening")).unwrap();
        assert!(saved.id.starts_with("game_"));
        assert_eq!(saved.created_at, saved.last_modified);

        let loaded = lib.load(&saved.id).unwrap().unwrap();
        assert_eq!(loaded, saved);

        assert!(lib.delete(&saved.id).unwrap());
        assert!(!lib.delete(&saved.id).unwrap());
        assert!(lib.load(&saved.id).unwrap().is_none());
    }

    #[test]
    fn test_eviction_keeps_most_recent() {
        let mut lib = library();
        lib.update_settings(SettingsPatch {
            max_saved_games: Some(3),
            ..SettingsPatch::default()
        })
        .unwrap();

        let ids: Vec<String> = (0..5)
            .map(|i| {
                let name = format!("Game {i}");
                lib.save_session(&session(&[]), Some(&name)).unwrap().id
            })
            .collect();

        let listed = lib.list().unwrap();
        assert_eq!(listed.len(), 3);
        let names: Vec<&str> = listed.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Game 4", "Game 3", "Game 2"]);
        assert!(lib.load(&ids[0]).unwrap().is_none());
    }

    #[test]
    fn test_update_refreshes_last_modified() {
        let lib = library();
        let saved = lib.save_session(&session(&[]), Some("Before")).unwrap();

        let updated = lib
            .update(&saved.id, |r| {
                r.name = "After".into();
                r.id = "hijacked".into();
            })
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "After");
        assert_eq!(updated.id, saved.id);
        assert_eq!(updated.created_at, saved.created_at);
        assert!(updated.last_modified > saved.last_modified);

        assert!(lib.update("game_missing", |_| {}).unwrap().is_none());
    }

    #[test]
    fn test_auto_save_slot() {
        let mut lib = library();
        assert!(!lib.has_auto_save());

        let record = lib.auto_save(&session(&["d2d4"])).unwrap().unwrap();
        assert_eq!(record.id, AUTO_SAVE_ID);
        assert_eq!(record.name, AUTO_SAVE_NAME);
        assert!(lib.has_auto_save());
        assert_eq!(lib.load_auto_save().unwrap().unwrap().move_count, 1);

        // The slot is not a named save.
        assert!(lib.list().unwrap().is_empty());

        lib.update_settings(SettingsPatch {
            auto_save: Some(false),
            ..SettingsPatch::default()
        })
        .unwrap();
        assert!(lib.auto_save(&session(&["e2e4", "e7e5"])).unwrap().is_none());
        assert_eq!(lib.load_auto_save().unwrap().unwrap().move_count, 1);
    }

    #[test]
    fn test_unreadable_auto_save_is_empty() {
        let lib = library();
        lib.store().put(AUTO_SAVE_KEY, "{not json").unwrap();
        assert!(lib.load_auto_save().unwrap().is_none());
        assert!(!lib.has_auto_save());
    }

    #[test]
    fn test_settings_persist_across_instances() {
        let store = MemoryStore::new();
        store
            .put(SETTINGS_KEY, r#"{"maxSavedGames":4}"#)
            .unwrap();
        let lib = GameLibrary::new(store);
        assert_eq!(
            lib.settings(),
            StorageSettings {
                auto_save: true,
                max_saved_games: 4
            }
        );
    }

    #[test]
    fn test_clear_all_and_storage_info() {
        let lib = library();
        lib.save_session(&session(&["e2e4"]), None).unwrap();
        lib.save_session(&session(&[]), None).unwrap();
        lib.auto_save(&session(&[])).unwrap();

        let info = lib.storage_info().unwrap();
        assert_eq!(info.game_count, 2);
        assert!(info.used > 0);
        assert_eq!(info.used + info.available, STORAGE_ESTIMATE_BYTES);

        lib.clear_all().unwrap();
        assert!(lib.list().unwrap().is_empty());
        assert!(!lib.has_auto_save());
        assert_eq!(lib.storage_info().unwrap().used, 0);
    }

    #[test]
    fn test_export_import() {
        let lib = library();
        let saved = lib.save_session(&session(&["e2e4", "e7e5"]), Some("Mine")).unwrap();

        let json = lib.export(&saved.id).unwrap();
        assert!(json.contains("\n  \"name\": \"Mine\""));

        let imported = lib.import(&json).unwrap();
        assert_ne!(imported.id, saved.id);
        assert_eq!(imported.name, "Mine (Imported)");
        assert_eq!(imported.pgn, saved.pgn);
        assert_eq!(imported.game_status, GameStatus::Playing);
        assert!(imported.last_modified > saved.last_modified);
        assert_eq!(lib.list().unwrap().len(), 2);

        assert!(matches!(lib.export("nope"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_import_rejects_bad_data() {
        let lib = library();
        assert!(matches!(lib.import("{"), Err(StoreError::Serialization(_))));

        let saved = lib.save_session(&session(&[]), None).unwrap();
        let mut value: serde_json::Value =
            serde_json::from_str(&lib.export(&saved.id).unwrap()).unwrap();
        value["fen"] = serde_json::Value::String(String::new());
        assert!(matches!(
            lib.import(&value.to_string()),
            Err(StoreError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_capacity_error_surfaces() {
        let lib = GameLibrary::new(MemoryStore::with_quota(64));
        let err = lib.save_session(&session(&[]), None).unwrap_err();
        assert!(matches!(err, StoreError::Capacity { .. }));
    }

    #[test]
    fn test_failed_save_keeps_existing_saves() {
        let limit_one = SettingsPatch {
            max_saved_games: Some(1),
            ..SettingsPatch::default()
        };

        // Size the quota to hold the settings and exactly one save.
        let mut sizing = GameLibrary::new(MemoryStore::new()).with_clock(ticking_clock());
        sizing.update_settings(limit_one).unwrap();
        sizing.save_session(&session(&[]), Some("first")).unwrap();
        let quota = sizing.store().used_bytes() + 40;

        let mut lib =
            GameLibrary::new(MemoryStore::with_quota(quota)).with_clock(ticking_clock());
        lib.update_settings(limit_one).unwrap();
        let first = lib.save_session(&session(&[]), Some("first")).unwrap();

        let err = lib
            .save_session(&session(&["e2e4", "e7e5"]), Some("second, with a longer name"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Capacity { .. }));

        assert!(lib.load(&first.id).unwrap().is_some());
        assert_eq!(lib.list().unwrap().len(), 1);
    }
}
