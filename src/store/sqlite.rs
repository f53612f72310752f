//! SQLite catalog store

use super::{CatalogStore, StoreCounts, StoreError, StoreResult};
use crate::{CatalogRecord, CoachAssignment, League, LeagueTeam, Player, Squad, Team};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS leagues (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    country TEXT,
    season INTEGER NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS teams (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    code TEXT,
    country TEXT,
    founded INTEGER,
    national INTEGER NOT NULL DEFAULT 0,
    logo TEXT,
    venue_name TEXT,
    venue_city TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS league_teams (
    league_id INTEGER NOT NULL,
    season INTEGER NOT NULL,
    team_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (league_id, season, team_id)
);
CREATE INDEX IF NOT EXISTS idx_league_teams_order ON league_teams(league_id, season, position);

CREATE TABLE IF NOT EXISTS squads (
    team_id INTEGER NOT NULL,
    season INTEGER NOT NULL,
    players TEXT NOT NULL,
    player_count INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (team_id, season)
);

CREATE TABLE IF NOT EXISTS coaches (
    team_id INTEGER NOT NULL,
    season INTEGER NOT NULL,
    coach_id INTEGER NOT NULL,
    coach_name TEXT NOT NULL,
    nationality TEXT,
    photo TEXT,
    started_on TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (team_id, season)
);
"#;

/// SQLite-backed [`CatalogStore`]
pub struct SqliteCatalogStore {
    pool: Pool<Sqlite>,
}

impl SqliteCatalogStore {
    /// Open (or create) the database at `path` and apply the schema
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        // one writer; avoids "database is locked" between pooled connections
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(path = %path.display(), "Catalog store opened");
        Ok(store)
    }

    /// Private in-memory database
    pub async fn in_memory() -> StoreResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // the database lives as long as its only connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Create tables and indexes if missing
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Close the pool, checkpointing the WAL into the database file
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Stored team by id
    pub async fn team(&self, id: i64) -> StoreResult<Option<Team>> {
        type Row = (
            i64,
            String,
            Option<String>,
            Option<String>,
            Option<i64>,
            bool,
            Option<String>,
            Option<String>,
            Option<String>,
        );
        let row: Option<Row> = sqlx::query_as(
            "SELECT id, name, code, country, founded, national, logo, venue_name, venue_city \
             FROM teams WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(id, name, code, country, founded, national, logo, venue_name, venue_city)| Team {
                id,
                name,
                code,
                country,
                founded: founded.and_then(|f| i32::try_from(f).ok()),
                national,
                logo,
                venue_name,
                venue_city,
            },
        ))
    }

    /// Stored squad roster for a team season
    pub async fn squad(&self, team_id: i64, season: i32) -> StoreResult<Option<Squad>> {
        let players: Option<String> =
            sqlx::query_scalar("SELECT players FROM squads WHERE team_id = ? AND season = ?")
                .bind(team_id)
                .bind(season)
                .fetch_optional(&self.pool)
                .await?;

        players
            .map(|json| {
                serde_json::from_str::<Vec<Player>>(&json)
                    .map(|players| Squad {
                        team_id,
                        season,
                        players,
                    })
                    .map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .transpose()
    }

    /// Stored coach assignment for a team season
    pub async fn coach(&self, team_id: i64, season: i32) -> StoreResult<Option<CoachAssignment>> {
        type Row = (i64, String, Option<String>, Option<String>, Option<String>);
        let row: Option<Row> = sqlx::query_as(
            "SELECT coach_id, coach_name, nationality, photo, started_on \
             FROM coaches WHERE team_id = ? AND season = ?",
        )
        .bind(team_id)
        .bind(season)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(coach_id, coach_name, nationality, photo, started_on)| CoachAssignment {
                team_id,
                season,
                coach_id,
                coach_name,
                nationality,
                photo,
                started_on: started_on
                    .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
            },
        ))
    }

    async fn write<'e, E>(executor: E, record: &CatalogRecord) -> StoreResult<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().to_rfc3339();
        match record {
            CatalogRecord::League(league) => write_league(executor, league, &now).await,
            CatalogRecord::Team(team) => write_team(executor, team, &now).await,
            CatalogRecord::LeagueTeam(membership) => {
                write_league_team(executor, membership, &now).await
            }
            CatalogRecord::Squad(squad) => write_squad(executor, squad, &now).await,
            CatalogRecord::Coach(coach) => write_coach(executor, coach, &now).await,
        }
    }
}

async fn write_league<'e, E>(executor: E, league: &League, now: &str) -> StoreResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO leagues (id, name, country, season, priority, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            country = excluded.country,
            season = excluded.season,
            priority = excluded.priority,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(league.id)
    .bind(&league.name)
    .bind(&league.country)
    .bind(league.season)
    .bind(league.priority)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

async fn write_team<'e, E>(executor: E, team: &Team, now: &str) -> StoreResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO teams (id, name, code, country, founded, national, logo, venue_name, venue_city, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            code = excluded.code,
            country = excluded.country,
            founded = excluded.founded,
            national = excluded.national,
            logo = excluded.logo,
            venue_name = excluded.venue_name,
            venue_city = excluded.venue_city,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(team.id)
    .bind(&team.name)
    .bind(&team.code)
    .bind(&team.country)
    .bind(team.founded)
    .bind(team.national)
    .bind(&team.logo)
    .bind(&team.venue_name)
    .bind(&team.venue_city)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

async fn write_league_team<'e, E>(executor: E, membership: &LeagueTeam, now: &str) -> StoreResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO league_teams (league_id, season, team_id, position, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(league_id, season, team_id) DO UPDATE SET
            position = excluded.position,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(membership.league_id)
    .bind(membership.season)
    .bind(membership.team_id)
    .bind(i64::from(membership.position))
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

async fn write_squad<'e, E>(executor: E, squad: &Squad, now: &str) -> StoreResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let players =
        serde_json::to_string(&squad.players).map_err(|e| StoreError::Serialization(e.to_string()))?;
    sqlx::query(
        r#"
        INSERT INTO squads (team_id, season, players, player_count, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(team_id, season) DO UPDATE SET
            players = excluded.players,
            player_count = excluded.player_count,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(squad.team_id)
    .bind(squad.season)
    .bind(players)
    .bind(squad.players.len() as i64)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

async fn write_coach<'e, E>(executor: E, coach: &CoachAssignment, now: &str) -> StoreResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO coaches (team_id, season, coach_id, coach_name, nationality, photo, started_on, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(team_id, season) DO UPDATE SET
            coach_id = excluded.coach_id,
            coach_name = excluded.coach_name,
            nationality = excluded.nationality,
            photo = excluded.photo,
            started_on = excluded.started_on,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(coach.team_id)
    .bind(coach.season)
    .bind(coach.coach_id)
    .bind(&coach.coach_name)
    .bind(&coach.nationality)
    .bind(&coach.photo)
    .bind(coach.started_on.map(|d| d.format("%Y-%m-%d").to_string()))
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn upsert(&self, record: &CatalogRecord) -> StoreResult<()> {
        Self::write(&self.pool, record).await
    }

    async fn upsert_chunk(&self, records: &[CatalogRecord]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            Self::write(&mut *tx, record).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn league_teams(&self, league_id: i64, season: i32) -> StoreResult<Vec<(i64, String)>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT lt.team_id, COALESCE(t.name, '')
            FROM league_teams lt
            LEFT JOIN teams t ON t.id = lt.team_id
            WHERE lt.league_id = ? AND lt.season = ?
            ORDER BY lt.position, lt.team_id
            "#,
        )
        .bind(league_id)
        .bind(season)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn counts(&self) -> StoreResult<StoreCounts> {
        let (leagues, teams, league_teams, squads, coaches): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM leagues),
                    (SELECT COUNT(*) FROM teams),
                    (SELECT COUNT(*) FROM league_teams),
                    (SELECT COUNT(*) FROM squads),
                    (SELECT COUNT(*) FROM coaches)
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreCounts {
            leagues: leagues as u64,
            teams: teams as u64,
            league_teams: league_teams as u64,
            squads: squads as u64,
            coaches: coaches as u64,
        })
    }
}
