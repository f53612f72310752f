//! # Catalog Sync Library
//!
//! Mirrors a large external football catalog (leagues, teams, squads and
//! coaches) into a relational store through a rate-limited third-party API,
//! and keeps the long-running sync worker alive with a supervising watchdog.
//!
//! ## Features
//!
//! - **Checkpointed resumability**: progress is written atomically after every
//!   work unit; a restarted worker resumes at the first unprocessed unit
//! - **Rate limiting**: throttling responses trigger a fixed cooldown with a
//!   bounded number of retries; a global call counter feeds the run budget
//! - **Idempotent writes**: every entity is upserted by its natural key, so
//!   reprocessing a unit after a crash never duplicates rows
//! - **Supervision**: the watchdog restarts crashed or stalled workers and stops
//!   them before the provider quota is exhausted
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use catalog_sync::catalog::LeagueCatalog;
//! use catalog_sync::resume::FileCheckpointStore;
//! use catalog_sync::source::http::CatalogHttpClient;
//! use catalog_sync::store::sqlite::SqliteCatalogStore;
//! use catalog_sync::sync::{EngineSettings, JobKind, SyncEngine, WorkList};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = LeagueCatalog::load_embedded()?;
//! let source = Arc::new(CatalogHttpClient::new("https://v3.football.api-sports.io", None));
//! let store = Arc::new(SqliteCatalogStore::open("catalog.db").await?);
//! let checkpoints = Arc::new(FileCheckpointStore::for_job(".catalog-sync", JobKind::Teams));
//!
//! let work = WorkList::teams(catalog.ordered(), 2024);
//! let engine = SyncEngine::new(source, store, checkpoints, EngineSettings::new(JobKind::Teams));
//! let outcome = engine.run(&work).await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`catalog`] - Embedded league catalog and its processing order
//! - [`source`] - Remote catalog client with throttle handling
//! - [`store`] - Natural-key upserts into the relational store
//! - [`sync`] - Checkpointed sync engine, work lists and statistics
//! - [`resume`] - Checkpoint and result artifacts
//! - [`watchdog`] - Worker process supervision
//!
//! The engine and the watchdog run as two separate processes and communicate
//! only through the checkpoint and result artifacts in the run directory.

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// League catalog
pub mod catalog;

/// CLI command implementations
pub mod cli;

/// Observability metrics
pub mod metrics;

/// Checkpoint and result artifacts
pub mod resume;

/// Graceful shutdown coordination
pub mod shutdown;

/// Remote catalog source
pub mod source;

/// Relational store writer
pub mod store;

/// Checkpointed sync engine
pub mod sync;

/// Worker supervision
pub mod watchdog;

/// Competition from the league catalog, scoped to one season
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct League {
    /// External catalog id
    pub id: i64,
    /// Display name
    pub name: String,
    /// Country name (None for international competitions)
    pub country: Option<String>,
    /// Season year the league is synchronized for
    pub season: i32,
    /// Whether the league belongs to the priority tier
    pub priority: bool,
}

/// Club or national team
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Team {
    /// External catalog id
    pub id: i64,
    /// Display name
    pub name: String,
    /// Short code (e.g. "MUN")
    pub code: Option<String>,
    /// Country name
    pub country: Option<String>,
    /// Founding year
    pub founded: Option<i32>,
    /// National team flag
    pub national: bool,
    /// Logo URL
    pub logo: Option<String>,
    /// Home venue name
    pub venue_name: Option<String>,
    /// Home venue city
    pub venue_city: Option<String>,
}

/// Membership of a team in a league season, in the order the source returned it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeagueTeam {
    /// League id
    pub league_id: i64,
    /// Season year
    pub season: i32,
    /// Team id
    pub team_id: i64,
    /// Zero-based position in the source response
    pub position: u32,
}

/// Player entry of a squad roster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    /// External catalog id
    pub id: i64,
    /// Display name
    pub name: String,
    /// Age in years
    pub age: Option<u32>,
    /// Shirt number
    pub number: Option<u32>,
    /// Position label (Goalkeeper, Defender, ...)
    pub position: Option<String>,
    /// Photo URL
    pub photo: Option<String>,
}

/// Roster of a team for one season (natural key: team + season)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Squad {
    /// Team id
    pub team_id: i64,
    /// Season year
    pub season: i32,
    /// Players in source order
    pub players: Vec<Player>,
}

/// One stint of a coach at a team
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoachCareer {
    /// Team id
    pub team_id: i64,
    /// First day in charge
    pub start: Option<NaiveDate>,
    /// Last day in charge (None while still in charge)
    pub end: Option<NaiveDate>,
}

/// Coach with career history, as returned by the source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Coach {
    /// External catalog id
    pub id: i64,
    /// Display name
    pub name: String,
    /// Nationality
    pub nationality: Option<String>,
    /// Photo URL
    pub photo: Option<String>,
    /// Career entries
    pub career: Vec<CoachCareer>,
}

/// Resolved coach of a team for one season (natural key: team + season)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoachAssignment {
    /// Team id
    pub team_id: i64,
    /// Season year
    pub season: i32,
    /// Coach id
    pub coach_id: i64,
    /// Coach name
    pub coach_name: String,
    /// Coach nationality
    pub nationality: Option<String>,
    /// Coach photo URL
    pub photo: Option<String>,
    /// Start of the current stint
    pub started_on: Option<NaiveDate>,
}

/// Kind of persisted catalog entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// League record
    League,
    /// Team record
    Team,
    /// League membership of a team
    LeagueTeam,
    /// Squad roster
    Squad,
    /// Coach assignment
    Coach,
}

impl EntityKind {
    /// Lowercase label used in logs, metrics and error entries
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::League => "league",
            Self::Team => "team",
            Self::LeagueTeam => "league_team",
            Self::Squad => "squad",
            Self::Coach => "coach",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any entity value the store writer accepts
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogRecord {
    /// League record
    League(League),
    /// Team record
    Team(Team),
    /// League membership
    LeagueTeam(LeagueTeam),
    /// Squad roster
    Squad(Squad),
    /// Coach assignment
    Coach(CoachAssignment),
}

impl CatalogRecord {
    /// Entity kind of this record
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::League(_) => EntityKind::League,
            Self::Team(_) => EntityKind::Team,
            Self::LeagueTeam(_) => EntityKind::LeagueTeam,
            Self::Squad(_) => EntityKind::Squad,
            Self::Coach(_) => EntityKind::Coach,
        }
    }

    /// Human-readable natural key, used to make error entries actionable
    pub fn describe(&self) -> String {
        match self {
            Self::League(l) => format!("{} ({})", l.id, l.name),
            Self::Team(t) => format!("{} ({})", t.id, t.name),
            Self::LeagueTeam(m) => {
                format!("league {} season {} team {}", m.league_id, m.season, m.team_id)
            }
            Self::Squad(s) => format!("team {} season {}", s.team_id, s.season),
            Self::Coach(c) => format!(
                "team {} season {} coach {} ({})",
                c.team_id, c.season, c.coach_id, c.coach_name
            ),
        }
    }
}
