//! Shared bot state
//!
//! `Data` is the cheap-clone handle passed to commands and event handlers.
//! Settings (protection toggles, punishment options, whitelist) persist as a
//! YAML document under `data/`; every mutation saves before returning.
//! Tracker and warning state lives in the [`Detector`] and is volatile.

use std::ops::Deref;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::detection::Detector;
use crate::{Error, CONSOLE_TARGET};

const DATA_DIR: &str = "data";
const SETTINGS_PATH: &str = "data/settings.yaml";

fn default_true() -> bool {
    true
}

fn default_max_mentions() -> usize {
    5
}

fn default_mute_duration_days() -> u16 {
    7
}

/// Mention-spam protection options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionProtection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_mentions")]
    pub max_mentions: usize,
}

impl Default for MentionProtection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_mentions: default_max_mentions(),
        }
    }
}

/// On/off switch for one protected action category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toggle {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for Toggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Punishment options for human offenders.
///
/// Humans are currently always role-stripped and timed out for a fixed seven
/// days; these fields are kept in the document and shown by `/protections`
/// but do not alter that outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPunishment {
    #[serde(default)]
    pub ban: bool,
    #[serde(default = "default_true")]
    pub mute: bool,
    #[serde(default = "default_mute_duration_days")]
    pub mute_duration_days: u16,
    #[serde(default = "default_true")]
    pub remove_roles: bool,
}

impl Default for UserPunishment {
    fn default() -> Self {
        Self {
            ban: false,
            mute: true,
            mute_duration_days: default_mute_duration_days(),
            remove_roles: true,
        }
    }
}

/// Punishment options for bot offenders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotPunishment {
    #[serde(default = "default_true")]
    pub ban: bool,
    #[serde(default = "default_true")]
    pub remove_roles: bool,
}

impl Default for BotPunishment {
    fn default() -> Self {
        Self {
            ban: true,
            remove_roles: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PunishmentSettings {
    #[serde(default)]
    pub users: UserPunishment,
    #[serde(default)]
    pub bots: BotPunishment,
}

/// The persisted settings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub mention_protection: MentionProtection,
    #[serde(default)]
    pub channel_protection: Toggle,
    #[serde(default)]
    pub role_protection: Toggle,
    #[serde(default)]
    pub category_protection: Toggle,
    #[serde(default)]
    pub punishment: PunishmentSettings,
    #[serde(default)]
    pub whitelist: Vec<u64>,
}

pub struct DataInner {
    pub settings: RwLock<Settings>,
    pub detector: Detector,
}

/// Cheap-clone handle around the shared inner state.
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data").finish_non_exhaustive()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    /// Load settings from disk, falling back to defaults on first run.
    pub async fn load() -> Result<Self, Error> {
        let settings = match tokio::fs::read_to_string(SETTINGS_PATH).await {
            Ok(contents) => serde_yaml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    target: CONSOLE_TARGET,
                    path = SETTINGS_PATH,
                    "No settings file found, using defaults"
                );
                Settings::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self(Arc::new(DataInner {
            settings: RwLock::new(settings),
            detector: Detector::new(),
        })))
    }

    /// Write the current settings document to disk.
    pub async fn save(&self) -> Result<(), Error> {
        let contents = {
            let settings = self.settings.read().unwrap_or_else(|e| e.into_inner());
            serde_yaml::to_string(&*settings)?
        };
        tokio::fs::create_dir_all(DATA_DIR).await?;
        tokio::fs::write(SETTINGS_PATH, contents).await?;
        Ok(())
    }

    #[must_use]
    pub fn is_whitelisted(&self, user_id: u64) -> bool {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .whitelist
            .contains(&user_id)
    }

    /// Add a user to the whitelist. Returns false if already present.
    pub fn whitelist_add(&self, user_id: u64) -> bool {
        let mut settings = self.settings.write().unwrap_or_else(|e| e.into_inner());
        if settings.whitelist.contains(&user_id) {
            return false;
        }
        settings.whitelist.push(user_id);
        true
    }

    /// Remove a user from the whitelist. Returns false if absent.
    pub fn whitelist_remove(&self, user_id: u64) -> bool {
        let mut settings = self.settings.write().unwrap_or_else(|e| e.into_inner());
        let before = settings.whitelist.len();
        settings.whitelist.retain(|id| *id != user_id);
        settings.whitelist.len() != before
    }

    #[must_use]
    pub fn settings_snapshot(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Apply a mutation to the settings document. The caller saves afterward.
    pub fn update_settings(&self, mutate: impl FnOnce(&mut Settings)) {
        let mut settings = self.settings.write().unwrap_or_else(|e| e.into_inner());
        mutate(&mut settings);
    }
}
