use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use super::provider::GameProvider;
use crate::error::ProviderError;
use crate::models::{Game, GameStatus, League, Odds, Scope, TeamSide};

const TEAM_INDEX_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Game provider backed by ESPN's public site API.
pub struct EspnProvider {
    http: Client,
    /// Base URL, overridable for tests
    base_url: String,
    lookback_days: i64,
    lookahead_days: i64,
    team_index: RwLock<HashMap<League, TeamIndex>>,
}

/// Upper-cased abbreviation -> ESPN team id.
struct TeamIndex {
    ids: HashMap<String, String>,
    loaded_at: Instant,
}

impl EspnProvider {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        lookback_days: u32,
        lookahead_days: u32,
    ) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .with_context(|| format!("Invalid provider base URL {}", base_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("Provider base URL must be http(s), got {}", parsed.scheme());
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("courtside/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(EspnProvider {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            lookback_days: lookback_days as i64,
            lookahead_days: lookahead_days as i64,
            team_index: RwLock::new(HashMap::new()),
        })
    }

    /// College scoreboards reject date ranges, so they only get today's slate.
    fn scoreboard_url(&self, league: League, today: NaiveDate) -> String {
        let mut url = format!("{}/{}/scoreboard?limit=1000", self.base_url, league.provider_path());
        if !league.is_favorite_gated() {
            let from = today - ChronoDuration::days(self.lookback_days);
            let to = today + ChronoDuration::days(self.lookahead_days);
            url.push_str(&format!("&dates={}-{}", from.format("%Y%m%d"), to.format("%Y%m%d")));
        }
        url
    }

    fn schedule_url(&self, league: League, team_id: &str, today: NaiveDate) -> String {
        format!(
            "{}/{}/teams/{}/schedule?season={}",
            self.base_url,
            league.provider_path(),
            team_id,
            season_year(league, today)
        )
    }

    async fn get_json(&self, url: &str) -> Result<Value, ProviderError> {
        debug!("GET {}", url);
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::status(status.as_u16()));
        }
        Ok(resp.json::<Value>().await?)
    }

    async fn team_id(&self, league: League, team: &str) -> Result<String, ProviderError> {
        let key = team.to_uppercase();
        {
            let index = self.team_index.read().await;
            if let Some(entry) = index.get(&league) {
                if entry.loaded_at.elapsed() < TEAM_INDEX_TTL {
                    return entry.ids.get(&key).cloned().ok_or_else(|| ProviderError::UnknownTeam {
                        league,
                        team: key.clone(),
                    });
                }
            }
        }

        let url = format!("{}/{}/teams?limit=500", self.base_url, league.provider_path());
        let raw = self.get_json(&url).await?;
        let ids = parse_team_index(&raw)?;
        debug!("Loaded {} {} team ids", ids.len(), league);
        let found = ids.get(&key).cloned();
        self.team_index.write().await.insert(
            league,
            TeamIndex {
                ids,
                loaded_at: Instant::now(),
            },
        );
        found.ok_or(ProviderError::UnknownTeam { league, team: key })
    }
}

#[async_trait]
impl GameProvider for EspnProvider {
    fn name(&self) -> &str {
        "ESPN"
    }

    async fn fetch(&self, league: League, scope: &Scope) -> Result<Vec<Game>, ProviderError> {
        let today = Utc::now().date_naive();
        let url = match scope {
            Scope::Scoreboard => self.scoreboard_url(league, today),
            Scope::TeamSchedule { team } => {
                let id = self.team_id(league, team).await?;
                self.schedule_url(league, &id, today)
            }
        };
        let raw = self.get_json(&url).await?;
        parse_events(league, &raw)
    }
}

/// Seasons are named by the year they end in, except the WNBA's which fits
/// inside one calendar year.
pub fn season_year(league: League, today: NaiveDate) -> i32 {
    let rollover = match league {
        League::Wnba => return today.year(),
        League::Nba => 10,
        League::Ncaam | League::Ncaaw => 11,
    };
    if today.month() >= rollover {
        today.year() + 1
    } else {
        today.year()
    }
}

fn parse_team_index(raw: &Value) -> Result<HashMap<String, String>, ProviderError> {
    let teams = raw["sports"][0]["leagues"][0]["teams"]
        .as_array()
        .ok_or_else(|| ProviderError::Parse("teams list missing".into()))?;
    Ok(teams
        .iter()
        .filter_map(|t| {
            let team = &t["team"];
            let abbr = team["abbreviation"].as_str()?.to_uppercase();
            let id = string_or_number(&team["id"])?;
            Some((abbr, id))
        })
        .collect())
}

/// Scoreboard and team-schedule bodies share the `events` layout.
fn parse_events(league: League, raw: &Value) -> Result<Vec<Game>, ProviderError> {
    let events = raw["events"]
        .as_array()
        .ok_or_else(|| ProviderError::Parse("response has no events array".into()))?;

    let games = events
        .iter()
        .filter_map(|ev| {
            let game = parse_event(league, ev);
            if game.is_none() {
                debug!("Skipping malformed {} event {}", league, ev["id"]);
            }
            game
        })
        .collect();
    Ok(games)
}

fn parse_event(league: League, ev: &Value) -> Option<Game> {
    let id = string_or_number(&ev["id"])?;
    let start_time = parse_start_time(ev["date"].as_str()?)?;
    let comp = &ev["competitions"][0];

    // Scoreboard puts status on the event, schedules on the competition.
    let status_obj = if ev["status"].is_object() {
        &ev["status"]
    } else {
        &comp["status"]
    };
    let status = match status_obj["type"]["state"].as_str()? {
        "pre" => GameStatus::Scheduled,
        "in" => GameStatus::Live,
        "post" if status_obj["type"]["completed"].as_bool() == Some(false) => GameStatus::Scheduled,
        "post" => GameStatus::Final,
        _ => return None,
    };

    let competitors = comp["competitors"].as_array()?;
    let side = |which: &str| competitors.iter().find(|c| c["homeAway"].as_str() == Some(which));
    let home = parse_side(side("home")?)?;
    let away = parse_side(side("away")?)?;

    let period = status_obj["period"]
        .as_u64()
        .filter(|p| *p > 0)
        .map(|p| p.min(u8::MAX as u64) as u8);
    let clock = status_obj["displayClock"].as_str().map(str::to_string);

    let odds = comp["odds"][0].as_object().map(|o| Odds {
        details: o.get("details").and_then(Value::as_str).map(str::to_string),
        over_under: o.get("overUnder").and_then(Value::as_f64),
    });

    Some(
        Game {
            id,
            league,
            home,
            away,
            status,
            period,
            clock,
            start_time,
            odds,
        }
        .normalized(),
    )
}

fn parse_side(c: &Value) -> Option<TeamSide> {
    let team = &c["team"];
    let abbreviation = team["abbreviation"].as_str()?.to_uppercase();
    let id = string_or_number(&team["id"]).unwrap_or_else(|| abbreviation.to_lowercase());

    // "110" on scoreboards, {"value": 110.0, "displayValue": "110"} on schedules
    let score = match &c["score"] {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64().map(|v| v as u32),
        Value::Object(o) => o
            .get("value")
            .and_then(Value::as_f64)
            .map(|v| v as u32)
            .or_else(|| o.get("displayValue")?.as_str()?.parse().ok()),
        _ => None,
    }
    .unwrap_or(0);

    let record = c["records"][0]["summary"]
        .as_str()
        .or_else(|| c["record"][0]["displayValue"].as_str())
        .filter(|r| !matches!(*r, "0-0" | "0-0-0"))
        .map(str::to_string);

    let rank = c["curatedRank"]["current"]
        .as_u64()
        .filter(|r| (1..=25).contains(r))
        .map(|r| r as u32);

    Some(TeamSide {
        id,
        abbreviation,
        score,
        record,
        rank,
    })
}

fn string_or_number(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// ESPN dates usually omit seconds ("2026-01-15T00:30Z").
fn parse_start_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%MZ")
        .ok()
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn provider(base: &str) -> EspnProvider {
        EspnProvider::new(base, Duration::from_secs(5), 14, 7).unwrap()
    }

    fn scoreboard_body() -> Value {
        json!({
            "events": [
                {
                    "id": "401",
                    "date": "2026-01-15T00:30Z",
                    "status": {
                        "period": 3,
                        "displayClock": "4:32",
                        "type": { "state": "in", "completed": false }
                    },
                    "competitions": [{
                        "competitors": [
                            {
                                "homeAway": "home",
                                "score": "88",
                                "team": { "id": "13", "abbreviation": "LAL" },
                                "records": [{ "summary": "25-15" }]
                            },
                            {
                                "homeAway": "away",
                                "score": "80",
                                "team": { "id": "2", "abbreviation": "BOS" },
                                "records": [{ "summary": "0-0" }]
                            }
                        ],
                        "odds": [{ "details": "LAL -4.5", "overUnder": 225.5 }]
                    }]
                },
                {
                    "id": "402",
                    "date": "2026-01-16T01:00:00Z",
                    "status": {
                        "period": 0,
                        "displayClock": "0:00",
                        "type": { "state": "pre" }
                    },
                    "competitions": [{
                        "competitors": [
                            { "homeAway": "home", "team": { "id": "9", "abbreviation": "GSW" } },
                            { "homeAway": "away", "team": { "id": "14", "abbreviation": "MIA" } }
                        ]
                    }]
                },
                {
                    "id": "403",
                    "status": { "type": { "state": "post" } },
                    "competitions": []
                }
            ]
        })
    }

    #[test]
    fn test_parse_scoreboard_events() {
        let games = parse_events(League::Nba, &scoreboard_body()).unwrap();
        assert_eq!(games.len(), 2, "event without date/competitors is skipped");

        let live = &games[0];
        assert_eq!(live.status, GameStatus::Live);
        assert_eq!(live.home.abbreviation, "LAL");
        assert_eq!(live.home.score, 88);
        assert_eq!(live.home.record.as_deref(), Some("25-15"));
        assert_eq!(live.away.record, None);
        assert_eq!(live.period, Some(3));
        assert_eq!(live.clock.as_deref(), Some("4:32"));
        assert_eq!(live.odds.as_ref().unwrap().over_under, Some(225.5));

        let upcoming = &games[1];
        assert_eq!(upcoming.status, GameStatus::Scheduled);
        assert_eq!(upcoming.period, None);
        assert_eq!(upcoming.clock, None);
    }

    #[test]
    fn test_parse_schedule_shape() {
        let body = json!({
            "events": [{
                "id": 501,
                "date": "2025-12-01T23:00Z",
                "competitions": [{
                    "status": { "period": 2, "type": { "state": "post", "completed": true } },
                    "competitors": [
                        {
                            "homeAway": "home",
                            "score": { "value": 71.0, "displayValue": "71" },
                            "curatedRank": { "current": 3 },
                            "team": { "id": "41", "abbreviation": "uconn" }
                        },
                        {
                            "homeAway": "away",
                            "score": { "value": 65.0, "displayValue": "65" },
                            "curatedRank": { "current": 99 },
                            "team": { "id": "2579", "abbreviation": "SC" }
                        }
                    ]
                }]
            }]
        });
        let games = parse_events(League::Ncaaw, &body).unwrap();
        assert_eq!(games.len(), 1);
        let g = &games[0];
        assert_eq!(g.id, "501");
        assert_eq!(g.status, GameStatus::Final);
        assert_eq!(g.home.abbreviation, "UCONN");
        assert_eq!(g.home.score, 71);
        assert_eq!(g.home.rank, Some(3));
        assert_eq!(g.away.rank, None);
        assert_eq!(g.period, Some(2));
    }

    #[test]
    fn test_missing_events_is_parse_error() {
        let err = parse_events(League::Nba, &json!({ "leagues": [] })).unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_postponed_game_is_not_final() {
        let body = json!({
            "events": [{
                "id": "9",
                "date": "2026-02-01T00:00Z",
                "status": { "type": { "state": "post", "completed": false } },
                "competitions": [{
                    "competitors": [
                        { "homeAway": "home", "team": { "abbreviation": "NYK" } },
                        { "homeAway": "away", "team": { "abbreviation": "PHI" } }
                    ]
                }]
            }]
        });
        let games = parse_events(League::Nba, &body).unwrap();
        assert_eq!(games[0].status, GameStatus::Scheduled);
    }

    #[test]
    fn test_season_year() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert_eq!(season_year(League::Ncaam, d(2025, 11, 10)), 2026);
        assert_eq!(season_year(League::Ncaam, d(2026, 3, 20)), 2026);
        assert_eq!(season_year(League::Nba, d(2025, 10, 25)), 2026);
        assert_eq!(season_year(League::Nba, d(2025, 9, 25)), 2025);
        assert_eq!(season_year(League::Wnba, d(2025, 12, 1)), 2025);
    }

    #[test]
    fn test_rejects_bad_base_url() {
        assert!(EspnProvider::new("not a url", Duration::from_secs(1), 1, 1).is_err());
        assert!(EspnProvider::new("ftp://espn.test", Duration::from_secs(1), 1, 1).is_err());
    }

    #[test]
    fn test_scoreboard_url_date_window() {
        let p = provider("http://espn.test/sports/");
        let today = NaiveDate::from_ymd_opt(2026, 1, 20).unwrap();
        assert_eq!(
            p.scoreboard_url(League::Nba, today),
            "http://espn.test/sports/basketball/nba/scoreboard?limit=1000&dates=20260106-20260127"
        );
        assert_eq!(
            p.scoreboard_url(League::Ncaam, today),
            "http://espn.test/sports/basketball/mens-college-basketball/scoreboard?limit=1000"
        );
    }

    #[tokio::test]
    async fn test_fetch_scoreboard_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/basketball/nba/scoreboard"))
            .and(query_param("limit", "1000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(scoreboard_body()))
            .mount(&server)
            .await;

        let games = provider(&server.uri())
            .fetch(League::Nba, &Scope::Scoreboard)
            .await
            .unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].league, League::Nba);
    }

    #[tokio::test]
    async fn test_http_status_classification() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/basketball/nba/scoreboard"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/basketball/wnba/scoreboard"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/basketball/mens-college-basketball/scoreboard"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let p = provider(&server.uri());
        let err = p.fetch(League::Nba, &Scope::Scoreboard).await.unwrap_err();
        assert!(err.is_retryable());
        let err = p.fetch(League::Wnba, &Scope::Scoreboard).await.unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 404, retryable: false }));
        let err = p.fetch(League::Ncaam, &Scope::Scoreboard).await.unwrap_err();
        assert!(err.is_parse());
    }

    #[tokio::test]
    async fn test_team_schedule_resolves_and_caches_team_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/basketball/womens-college-basketball/teams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sports": [{ "leagues": [{ "teams": [
                    { "team": { "id": "41", "abbreviation": "CONN" } },
                    { "team": { "id": "2579", "abbreviation": "SC" } }
                ]}]}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/basketball/womens-college-basketball/teams/41/schedule"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "events": [] })))
            .expect(2)
            .mount(&server)
            .await;

        let p = provider(&server.uri());
        let scope = Scope::TeamSchedule { team: "conn".into() };
        assert!(p.fetch(League::Ncaaw, &scope).await.unwrap().is_empty());
        assert!(p.fetch(League::Ncaaw, &scope).await.unwrap().is_empty());

        let err = p
            .fetch(League::Ncaaw, &Scope::TeamSchedule { team: "XYZ".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownTeam { .. }));
        assert!(!err.is_retryable());
    }
}
