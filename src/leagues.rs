//! Per-league configuration file.
//!
//! The file is a list of `[[leagues]]` tables. Each table is parsed and
//! validated on its own so that one bad entry only disables that league:
//!
//! ```toml
//! [[leagues]]
//! league = "nba"
//! favorite_teams = ["LAL", "BOS"]
//! live_priority = true
//! [leagues.game_limits]
//! recent_per_scope = 1
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::models::{League, Mode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeagueConfig {
    pub league: League,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Team abbreviations; list order is the order selections are concatenated in.
    #[serde(default)]
    pub favorite_teams: Vec<String>,
    #[serde(default)]
    pub display_modes: DisplayModes,
    /// Preempt normal rotation whenever this league has a live game.
    #[serde(default)]
    pub live_priority: bool,
    #[serde(default = "default_update_interval")]
    pub update_interval_seconds: u64,
    #[serde(default = "default_live_update_interval")]
    pub live_update_interval: u64,
    /// Live games from a snapshot older than this many seconds are dropped.
    #[serde(default = "default_stale_game_timeout")]
    pub stale_game_timeout: u64,
    #[serde(default)]
    pub game_limits: GameLimits,
    #[serde(default)]
    pub filtering: Filtering,
    #[serde(default)]
    pub display_durations: DisplayDurations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DisplayModes {
    #[serde(default = "default_true")]
    pub live: bool,
    #[serde(default = "default_true")]
    pub recent: bool,
    #[serde(default = "default_true")]
    pub upcoming: bool,
}

impl Default for DisplayModes {
    fn default() -> Self {
        DisplayModes {
            live: true,
            recent: true,
            upcoming: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameLimits {
    #[serde(default = "default_recent_limit")]
    pub recent_per_scope: u32,
    #[serde(default = "default_upcoming_limit")]
    pub upcoming_per_scope: u32,
}

impl Default for GameLimits {
    fn default() -> Self {
        GameLimits {
            recent_per_scope: default_recent_limit(),
            upcoming_per_scope: default_upcoming_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Filtering {
    #[serde(default)]
    pub favorite_only: bool,
    /// Live mode ignores favorites entirely.
    #[serde(default)]
    pub show_all_live: bool,
    /// How far back recent mode looks, in days.
    #[serde(default = "default_recent_days")]
    pub recent_days: u32,
}

impl Default for Filtering {
    fn default() -> Self {
        Filtering {
            favorite_only: false,
            show_all_live: false,
            recent_days: default_recent_days(),
        }
    }
}

/// Seconds each game stays on screen, per mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DisplayDurations {
    #[serde(default = "default_base_duration")]
    pub base: u64,
    #[serde(default)]
    pub live: Option<u64>,
    #[serde(default)]
    pub recent: Option<u64>,
    #[serde(default)]
    pub upcoming: Option<u64>,
}

impl Default for DisplayDurations {
    fn default() -> Self {
        DisplayDurations {
            base: default_base_duration(),
            live: None,
            recent: None,
            upcoming: None,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_update_interval() -> u64 {
    3600
}
fn default_live_update_interval() -> u64 {
    30
}
fn default_stale_game_timeout() -> u64 {
    300
}
fn default_recent_days() -> u32 {
    21
}
fn default_recent_limit() -> u32 {
    5
}
fn default_upcoming_limit() -> u32 {
    10
}
fn default_base_duration() -> u64 {
    15
}

impl LeagueConfig {
    #[cfg(test)]
    pub fn new(league: League) -> Self {
        LeagueConfig {
            league,
            enabled: true,
            favorite_teams: Vec::new(),
            display_modes: DisplayModes::default(),
            live_priority: false,
            update_interval_seconds: default_update_interval(),
            live_update_interval: default_live_update_interval(),
            stale_game_timeout: default_stale_game_timeout(),
            game_limits: GameLimits::default(),
            filtering: Filtering::default(),
            display_durations: DisplayDurations::default(),
        }
    }

    pub fn mode_enabled(&self, mode: Mode) -> bool {
        match mode {
            Mode::Live => self.display_modes.live,
            Mode::Recent => self.display_modes.recent,
            Mode::Upcoming => self.display_modes.upcoming,
        }
    }

    /// Per-scope game cap; live games are never capped.
    pub fn limit(&self, mode: Mode) -> Option<usize> {
        match mode {
            Mode::Live => None,
            Mode::Recent => Some(self.game_limits.recent_per_scope as usize),
            Mode::Upcoming => Some(self.game_limits.upcoming_per_scope as usize),
        }
    }

    pub fn display_duration(&self, mode: Mode) -> Duration {
        let d = &self.display_durations;
        let secs = match mode {
            Mode::Live => d.live,
            Mode::Recent => d.recent,
            Mode::Upcoming => d.upcoming,
        }
        .unwrap_or(d.base);
        Duration::from_secs(secs)
    }

    /// Whether this league can take over the display when it goes live.
    pub fn interrupts_on_live(&self) -> bool {
        self.enabled && self.live_priority && self.display_modes.live
    }

    pub fn needs_team_schedules(&self) -> bool {
        self.league.is_favorite_gated()
            && !self.favorite_teams.is_empty()
            && (self.display_modes.recent || self.display_modes.upcoming)
    }

    /// Oldest start time recent mode still shows.
    pub fn recent_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::days(i64::from(self.filtering.recent_days))
    }

    /// Whether a snapshot fetched at `fetched_at` is too old to trust for live state.
    pub fn is_stale(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - fetched_at > chrono::Duration::seconds(self.stale_game_timeout as i64)
    }

    pub fn poll_interval(&self, has_live: bool) -> Duration {
        if has_live {
            Duration::from_secs(self.live_update_interval)
        } else {
            Duration::from_secs(self.update_interval_seconds)
        }
    }

    /// Upper-case and de-duplicate favorites, then range-check every value.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        let league = self.league;
        let mut seen = HashSet::new();
        let mut favorites = Vec::with_capacity(self.favorite_teams.len());
        for team in &self.favorite_teams {
            let abbr = team.trim().to_uppercase();
            if abbr.is_empty() {
                return Err(ConfigError::invalid(league, "favorite_teams", "contains an empty abbreviation"));
            }
            if seen.insert(abbr.clone()) {
                favorites.push(abbr);
            }
        }
        self.favorite_teams = favorites;

        if self.game_limits.recent_per_scope == 0 {
            return Err(ConfigError::invalid(league, "game_limits.recent_per_scope", "must be > 0"));
        }
        if self.game_limits.upcoming_per_scope == 0 {
            return Err(ConfigError::invalid(league, "game_limits.upcoming_per_scope", "must be > 0"));
        }
        if self.update_interval_seconds == 0 {
            return Err(ConfigError::invalid(league, "update_interval_seconds", "must be > 0"));
        }
        if self.live_update_interval == 0 {
            return Err(ConfigError::invalid(league, "live_update_interval", "must be > 0"));
        }
        if self.stale_game_timeout == 0 {
            return Err(ConfigError::invalid(league, "stale_game_timeout", "must be > 0"));
        }
        if self.filtering.recent_days == 0 {
            return Err(ConfigError::invalid(league, "filtering.recent_days", "must be > 0"));
        }
        let d = &self.display_durations;
        for (field, value) in [
            ("display_durations.base", Some(d.base)),
            ("display_durations.live", d.live),
            ("display_durations.recent", d.recent),
            ("display_durations.upcoming", d.upcoming),
        ] {
            if value == Some(0) {
                return Err(ConfigError::invalid(league, field, "must be > 0"));
            }
        }
        Ok(self)
    }
}

/// All league configs in rotation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineSettings {
    pub leagues: Vec<LeagueConfig>,
}

#[derive(Deserialize)]
struct RawFile {
    leagues: Option<Vec<toml::Value>>,
}

impl EngineSettings {
    pub fn new(leagues: Vec<LeagueConfig>) -> Self {
        EngineSettings { leagues }
    }

    pub fn get(&self, league: League) -> Option<&LeagueConfig> {
        self.leagues.iter().find(|c| c.league == league)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &LeagueConfig> {
        self.leagues.iter().filter(|c| c.enabled)
    }

    /// Parse a league file. Entries that fail validation are dropped and
    /// returned alongside the settings; only an unreadable document fails.
    pub fn from_toml_str(content: &str) -> Result<(Self, Vec<ConfigError>), ConfigError> {
        let raw: RawFile = toml::from_str(content)?;
        let entries = raw.leagues.ok_or(ConfigError::MissingLeagues)?;

        let mut leagues: Vec<LeagueConfig> = Vec::with_capacity(entries.len());
        let mut rejected = Vec::new();
        for (index, entry) in entries.into_iter().enumerate() {
            let parsed = entry
                .try_into::<LeagueConfig>()
                .map_err(|e| ConfigError::InvalidEntry {
                    index,
                    message: e.to_string(),
                })
                .and_then(LeagueConfig::validate);
            match parsed {
                Ok(cfg) if leagues.iter().any(|c| c.league == cfg.league) => {
                    rejected.push(ConfigError::DuplicateLeague(cfg.league));
                }
                Ok(cfg) => leagues.push(cfg),
                Err(e) => rejected.push(e),
            }
        }
        Ok((EngineSettings::new(leagues), rejected))
    }

    /// Replace favorites from `COURTSIDE_FAVORITES_<LEAGUE>` style variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for cfg in &mut self.leagues {
            let var = format!("COURTSIDE_FAVORITES_{}", cfg.league.key().to_uppercase());
            if let Some(value) = lookup(&var) {
                let mut seen = HashSet::new();
                cfg.favorite_teams = value
                    .split(',')
                    .map(|t| t.trim().to_uppercase())
                    .filter(|t| !t.is_empty() && seen.insert(t.clone()))
                    .collect();
                info!("{} favorites overridden by {}: {:?}", cfg.league, var, cfg.favorite_teams);
            }
        }
    }

    /// Read, parse and validate the league file, logging every rejected entry.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let (mut settings, rejected) = Self::from_toml_str(&content)?;
        for err in &rejected {
            warn!("League disabled by config error: {}", err);
        }
        settings.apply_env_overrides(|k| std::env::var(k).ok());
        info!(
            "Loaded {} league(s) from {} ({} enabled)",
            settings.leagues.len(),
            path.display(),
            settings.enabled().count()
        );
        Ok(settings)
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Poll the league file's mtime and publish reloaded settings.
///
/// A reload that fails to parse keeps the previous settings in force.
pub fn spawn_config_watcher(
    path: PathBuf,
    every: Duration,
    tx: watch::Sender<Arc<EngineSettings>>,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_modified = modified_at(&path);
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }

            let modified = modified_at(&path);
            if modified == last_modified {
                continue;
            }
            last_modified = modified;
            debug!("Config file {} changed, reloading", path.display());

            match EngineSettings::load(&path).await {
                Ok(settings) => {
                    if **tx.borrow() != settings {
                        info!("League configuration reloaded");
                        tx.send_replace(Arc::new(settings));
                    }
                }
                Err(e) => warn!("Config reload failed, keeping previous settings: {}", e),
            }
        }
    })
}
