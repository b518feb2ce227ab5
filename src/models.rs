use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A basketball competition tracked independently by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum League {
    Nba,
    Wnba,
    /// NCAA men's college basketball
    Ncaam,
    /// NCAA women's college basketball
    Ncaaw,
}

impl League {
    pub const ALL: [League; 4] = [League::Nba, League::Wnba, League::Ncaam, League::Ncaaw];

    /// Short lowercase identifier used in config files and logs.
    pub fn key(&self) -> &'static str {
        match self {
            League::Nba => "nba",
            League::Wnba => "wnba",
            League::Ncaam => "ncaam",
            League::Ncaaw => "ncaaw",
        }
    }

    /// `sport/league` path segment on the provider side.
    pub fn provider_path(&self) -> &'static str {
        match self {
            League::Nba => "basketball/nba",
            League::Wnba => "basketball/wnba",
            League::Ncaam => "basketball/mens-college-basketball",
            League::Ncaaw => "basketball/womens-college-basketball",
        }
    }

    /// College scoreboards can't be queried by date range, so recent and
    /// upcoming games only exist through per-team schedules.
    pub fn is_favorite_gated(&self) -> bool {
        matches!(self, League::Ncaam | League::Ncaaw)
    }

    pub fn from_key(key: &str) -> Option<League> {
        League::ALL
            .into_iter()
            .find(|l| l.key().eq_ignore_ascii_case(key.trim()))
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Display category derived from game status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Live,
    Recent,
    Upcoming,
}

impl Mode {
    /// Rotation order within a league.
    pub const ORDER: [Mode; 3] = [Mode::Live, Mode::Recent, Mode::Upcoming];

    pub fn status(&self) -> GameStatus {
        match self {
            Mode::Live => GameStatus::Live,
            Mode::Recent => GameStatus::Final,
            Mode::Upcoming => GameStatus::Scheduled,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Live => "live",
            Mode::Recent => "recent",
            Mode::Upcoming => "upcoming",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Scheduled,
    Live,
    Final,
}

/// Query shape issued against the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Current day / live games.
    Scoreboard,
    /// Full season for one team, identified by its abbreviation.
    TeamSchedule { team: String },
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Scoreboard => f.write_str("scoreboard"),
            Scope::TeamSchedule { team } => write!(f, "team-schedule({})", team),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSide {
    /// Provider team id
    pub id: String,
    pub abbreviation: String,
    pub score: u32,
    /// Win-loss summary, e.g. "12-4"
    pub record: Option<String>,
    /// Poll rank (college only)
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Odds {
    /// e.g. "LAL -4.5"
    pub details: Option<String>,
    pub over_under: Option<f64>,
}

/// Snapshot of one game as of the last fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub league: League,
    pub home: TeamSide,
    pub away: TeamSide,
    pub status: GameStatus,
    /// Quarter number; 5 and up are overtimes.
    pub period: Option<u8>,
    /// Remaining time in the period, e.g. "4:32"
    pub clock: Option<String>,
    pub start_time: DateTime<Utc>,
    pub odds: Option<Odds>,
}

impl Game {
    pub fn involves(&self, abbreviation: &str) -> bool {
        self.home.abbreviation == abbreviation || self.away.abbreviation == abbreviation
    }

    pub fn is_live(&self) -> bool {
        self.status == GameStatus::Live
    }

    /// A live game sitting at 0:00 in the fourth quarter or later has ended
    /// even if the provider hasn't flipped it to final yet.
    pub fn appears_over(&self) -> bool {
        if !self.is_live() || self.period.unwrap_or(0) < 4 {
            return false;
        }
        match self.clock.as_deref().map(str::trim) {
            Some(clock) => matches!(clock, "0:00" | ":00" | "00:00" | "0.0" | "0"),
            None => false,
        }
    }

    /// Enforce status/period/clock consistency.
    pub fn normalized(mut self) -> Self {
        match self.status {
            GameStatus::Scheduled => {
                self.period = None;
                self.clock = None;
            }
            GameStatus::Final => {
                self.period = Some(self.period.unwrap_or(4).max(1));
                self.clock = None;
            }
            GameStatus::Live => {}
        }
        self
    }
}

#[cfg(test)]
pub mod fixtures {
    use super::*;

    pub fn side(abbr: &str, score: u32) -> TeamSide {
        TeamSide {
            id: abbr.to_lowercase(),
            abbreviation: abbr.to_string(),
            score,
            record: None,
            rank: None,
        }
    }

    /// Midnight UTC of the current day.
    pub fn epoch() -> DateTime<Utc> {
        Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
    }

    /// Game starting `hour` hours after [`epoch`].
    pub fn game(
        id: &str,
        league: League,
        home: &str,
        away: &str,
        status: GameStatus,
        hour: i64,
    ) -> Game {
        let start = epoch() + chrono::Duration::hours(hour);
        let (period, clock) = match status {
            GameStatus::Scheduled => (None, None),
            GameStatus::Live => (Some(2), Some("5:00".to_string())),
            GameStatus::Final => (Some(4), None),
        };
        Game {
            id: id.to_string(),
            league,
            home: side(home, 0),
            away: side(away, 0),
            status,
            period,
            clock,
            start_time: start,
            odds: None,
        }
    }
}
