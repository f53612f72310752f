//! Shared fakes for the integration suite

#![allow(dead_code)]

use async_trait::async_trait;
use catalog_sync::catalog::{CatalogLeague, LeagueCatalog};
use catalog_sync::resume::{CheckpointState, CheckpointStore, ResultRecord, ResumeError};
use catalog_sync::source::{CatalogSource, Fetched, SourceError, SourceResult};
use catalog_sync::{Coach, CoachCareer, Player, Team};
use chrono::NaiveDate;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// In-memory catalog source with scripted failures
///
/// Failures are keyed by league id for `fetch_teams` and by team id for
/// `fetch_squad` / `fetch_coaches`, and consumed one per call.
#[derive(Default)]
pub struct ScriptedSource {
    teams: HashMap<i64, Vec<Team>>,
    malformed_teams: HashMap<i64, Vec<String>>,
    squads: HashMap<i64, Vec<Player>>,
    coaches: HashMap<i64, Vec<Coach>>,
    team_failures: Mutex<HashMap<i64, VecDeque<SourceError>>>,
    squad_failures: Mutex<HashMap<i64, VecDeque<SourceError>>>,
    requests: AtomicU64,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn league(mut self, league_id: i64, teams: &[(i64, &str)]) -> Self {
        self.teams.insert(
            league_id,
            teams.iter().map(|(id, name)| team(*id, name)).collect(),
        );
        self
    }

    /// A team record in `league_id`'s response that does not parse
    pub fn malformed_team(mut self, league_id: i64, message: &str) -> Self {
        self.malformed_teams
            .entry(league_id)
            .or_default()
            .push(message.to_string());
        self
    }

    pub fn squad(mut self, team_id: i64, players: usize) -> Self {
        let roster = (0..players)
            .map(|i| Player {
                id: team_id * 100 + i as i64,
                name: format!("Player {i}"),
                age: Some(20 + i as u32),
                number: Some(i as u32 + 1),
                position: Some("Midfielder".to_string()),
                photo: None,
            })
            .collect();
        self.squads.insert(team_id, roster);
        self
    }

    pub fn coach(mut self, team_id: i64, coach_id: i64, name: &str) -> Self {
        self.coaches.entry(team_id).or_default().push(Coach {
            id: coach_id,
            name: name.to_string(),
            nationality: None,
            photo: None,
            career: vec![CoachCareer {
                team_id,
                start: NaiveDate::from_ymd_opt(2022, 7, 1),
                end: None,
            }],
        });
        self
    }

    pub fn fail_teams(self, league_id: i64, error: SourceError) -> Self {
        self.team_failures
            .lock()
            .unwrap()
            .entry(league_id)
            .or_default()
            .push_back(error);
        self
    }

    pub fn fail_squad(self, team_id: i64, error: SourceError) -> Self {
        self.squad_failures
            .lock()
            .unwrap()
            .entry(team_id)
            .or_default()
            .push_back(error);
        self
    }

    fn take_failure(
        failures: &Mutex<HashMap<i64, VecDeque<SourceError>>>,
        key: i64,
    ) -> Option<SourceError> {
        failures.lock().unwrap().get_mut(&key).and_then(|q| q.pop_front())
    }
}

#[async_trait]
impl CatalogSource for ScriptedSource {
    async fn fetch_teams(&self, league_id: i64, _season: i32) -> SourceResult<Fetched<Team>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = Self::take_failure(&self.team_failures, league_id) {
            return Err(e);
        }
        Ok(Fetched {
            records: self.teams.get(&league_id).cloned().unwrap_or_default(),
            rejected: self.malformed_teams.get(&league_id).cloned().unwrap_or_default(),
        })
    }

    async fn fetch_squad(&self, team_id: i64) -> SourceResult<Fetched<Player>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = Self::take_failure(&self.squad_failures, team_id) {
            return Err(e);
        }
        Ok(self.squads.get(&team_id).cloned().unwrap_or_default().into())
    }

    async fn fetch_coaches(&self, team_id: i64) -> SourceResult<Fetched<Coach>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.coaches.get(&team_id).cloned().unwrap_or_default().into())
    }

    fn requests_made(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Checkpoint store that fails the save recording unit `fail_at` as processed
pub struct CrashingCheckpoints<S> {
    pub inner: S,
    pub fail_at: i64,
}

impl<S: CheckpointStore> CheckpointStore for CrashingCheckpoints<S> {
    fn load(&self) -> Result<Option<CheckpointState>, ResumeError> {
        self.inner.load()
    }

    fn save(&self, state: &CheckpointState) -> Result<(), ResumeError> {
        if state.last_processed_index == self.fail_at {
            return Err(ResumeError::IoError("simulated crash".to_string()));
        }
        self.inner.save(state)
    }

    fn clear(&self) -> Result<(), ResumeError> {
        self.inner.clear()
    }

    fn load_result(&self) -> Result<Option<ResultRecord>, ResumeError> {
        self.inner.load_result()
    }

    fn save_result(&self, result: &ResultRecord) -> Result<(), ResumeError> {
        self.inner.save_result(result)
    }

    fn clear_result(&self) -> Result<(), ResumeError> {
        self.inner.clear_result()
    }
}

pub fn team(id: i64, name: &str) -> Team {
    Team {
        id,
        name: name.to_string(),
        code: None,
        country: Some("England".to_string()),
        founded: Some(1900),
        national: false,
        logo: None,
        venue_name: None,
        venue_city: None,
    }
}

/// Catalog leagues in the order given
pub fn leagues(ids: &[i64]) -> Vec<CatalogLeague> {
    LeagueCatalog::load_embedded()
        .unwrap()
        .select(ids)
        .unwrap()
}
