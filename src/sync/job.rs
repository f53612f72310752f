//! Work breakdown for sync jobs
//!
//! A job is an ordered [`WorkList`]. The index of a unit in that list is what
//! checkpoints record, so list construction must be deterministic for an
//! unchanged catalog and store.

use crate::catalog::CatalogLeague;
use crate::store::{CatalogStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Kind of sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// One unit per league: fetch and store its teams
    Teams,
    /// One unit per (league, team): fetch and store squad and coach
    Squads,
}

impl JobKind {
    /// Lowercase name used for artifact file names and CLI arguments
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Teams => "teams",
            Self::Squads => "squads",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "teams" => Ok(Self::Teams),
            "squads" => Ok(Self::Squads),
            _ => Err(format!("Invalid job: {s}. Valid options: teams, squads")),
        }
    }
}

/// League reference carried by a work unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeagueRef {
    /// League id
    pub id: i64,
    /// League name
    pub name: String,
    /// Season year
    pub season: i32,
}

/// Team reference carried by a work unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRef {
    /// Team id
    pub id: i64,
    /// Team name
    pub name: String,
}

/// One schedulable step: a league, or a (league, team) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// League the unit belongs to
    pub league: LeagueRef,
    /// Team, for squad units
    pub team: Option<TeamRef>,
}

impl WorkUnit {
    /// League-only unit
    pub fn league(id: i64, name: impl Into<String>, season: i32) -> Self {
        Self {
            league: LeagueRef {
                id,
                name: name.into(),
                season,
            },
            team: None,
        }
    }

    /// League + team unit
    pub fn team(league: LeagueRef, id: i64, name: impl Into<String>) -> Self {
        Self {
            league,
            team: Some(TeamRef {
                id,
                name: name.into(),
            }),
        }
    }

    /// Short label for logs and error entries
    pub fn label(&self) -> String {
        match &self.team {
            Some(team) => format!(
                "team {} ({}) in league {}",
                team.id, team.name, self.league.id
            ),
            None => format!("league {} ({})", self.league.id, self.league.name),
        }
    }
}

/// Lifecycle of a unit inside one engine pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitStatus {
    /// Not started
    #[default]
    Pending,
    /// Remote calls and writes in flight
    InProgress,
    /// Completed (possibly with recorded errors) and checkpointed
    Persisted,
    /// Transient remote failure; will be retried after a restart
    Failed,
}

/// Ordered list of work units for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkList {
    job: JobKind,
    units: Vec<WorkUnit>,
}

impl WorkList {
    /// Build a work list from explicit units
    pub fn new(job: JobKind, units: Vec<WorkUnit>) -> Self {
        Self { job, units }
    }

    /// Teams job: one unit per league, in catalog order
    pub fn teams(leagues: Vec<CatalogLeague>, season: i32) -> Self {
        let units = leagues
            .into_iter()
            .map(|l| WorkUnit::league(l.id, l.name, season))
            .collect();
        Self::new(JobKind::Teams, units)
    }

    /// Squads job: one unit per team found in the store
    ///
    /// Leagues are walked in catalog order and teams in the order the source
    /// originally returned them. A team playing in several leagues is scheduled
    /// once, at its first occurrence.
    pub async fn squads(
        store: &dyn CatalogStore,
        leagues: Vec<CatalogLeague>,
        season: i32,
    ) -> Result<Self, StoreError> {
        let mut seen = HashSet::new();
        let mut units = Vec::new();
        for league in leagues {
            let league_ref = LeagueRef {
                id: league.id,
                name: league.name.clone(),
                season,
            };
            for (team_id, team_name) in store.league_teams(league.id, season).await? {
                if seen.insert(team_id) {
                    units.push(WorkUnit::team(league_ref.clone(), team_id, team_name));
                }
            }
        }
        Ok(Self::new(JobKind::Squads, units))
    }

    /// Job kind
    pub fn job(&self) -> JobKind {
        self.job
    }

    /// Units in processing order
    pub fn units(&self) -> &[WorkUnit] {
        &self.units
    }

    /// Number of units
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether there is nothing to do
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
