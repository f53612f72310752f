//! Provider response parsing
//!
//! The provider wraps every payload in an envelope:
//! `{ "errors": [] | {...}, "results": n, "response": [...] }`.
//! Throttling may arrive as HTTP 200 with `errors.rateLimit` set, so the
//! envelope is classified before the payload is interpreted.

use super::{Fetched, SourceError, SourceResult};
use crate::{Coach, CoachAssignment, CoachCareer, Player, Team};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

/// Outcome of inspecting a response envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Payload records
    Records(Vec<Value>),
    /// Provider-level throttling signal
    Throttled(String),
    /// Daily quota exhausted
    QuotaExhausted(String),
    /// Any other provider error
    Error(String),
}

/// Classify a decoded response body
pub fn classify_envelope(body: Value) -> SourceResult<Envelope> {
    let mut body = match body {
        Value::Object(map) => map,
        other => {
            return Err(SourceError::ParseError(format!(
                "expected an object envelope, got {}",
                type_name(&other)
            )))
        }
    };

    if let Some(Value::Object(errors)) = body.get("errors") {
        if !errors.is_empty() {
            if let Some(message) = errors.get("rateLimit") {
                return Ok(Envelope::Throttled(value_text(message)));
            }
            if let Some(message) = errors.get("requests") {
                return Ok(Envelope::QuotaExhausted(value_text(message)));
            }
            let message = errors
                .iter()
                .map(|(key, value)| format!("{key}: {}", value_text(value)))
                .collect::<Vec<_>>()
                .join("; ");
            return Ok(Envelope::Error(message));
        }
    }

    match body.remove("response") {
        Some(Value::Array(records)) => Ok(Envelope::Records(records)),
        None | Some(Value::Null) => Ok(Envelope::Records(Vec::new())),
        Some(other) => Err(SourceError::ParseError(format!(
            "expected response array, got {}",
            type_name(&other)
        ))),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Deserialize)]
struct RawTeamItem {
    team: RawTeam,
    #[serde(default)]
    venue: Option<RawVenue>,
}

#[derive(Debug, Deserialize)]
struct RawTeam {
    id: i64,
    name: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    founded: Option<i32>,
    #[serde(default)]
    national: Option<bool>,
    #[serde(default)]
    logo: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawVenue {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    city: Option<String>,
}

/// Deserialize each record on its own, keeping the ones that parse
///
/// A rejected record is reported with the id found at `id_pointer`, when
/// the record has one.
fn parse_each<R, T>(
    records: Vec<Value>,
    kind: &str,
    id_pointer: &str,
    convert: impl Fn(R) -> T,
) -> Fetched<T>
where
    R: serde::de::DeserializeOwned,
{
    let mut fetched = Fetched::default();
    for record in records {
        let id = record.pointer(id_pointer).map(value_text);
        match serde_json::from_value::<R>(record) {
            Ok(raw) => fetched.records.push(convert(raw)),
            Err(e) => fetched.rejected.push(match id {
                Some(id) => format!("invalid {kind} record {id}: {e}"),
                None => format!("invalid {kind} record: {e}"),
            }),
        }
    }
    fetched
}

/// Parse `/teams` records
pub fn parse_teams(records: Vec<Value>) -> Fetched<Team> {
    parse_each(records, "team", "/team/id", |item: RawTeamItem| {
        let venue = item.venue.unwrap_or(RawVenue {
            name: None,
            city: None,
        });
        Team {
            id: item.team.id,
            name: item.team.name,
            code: item.team.code,
            country: item.team.country,
            founded: item.team.founded,
            national: item.team.national.unwrap_or(false),
            logo: item.team.logo,
            venue_name: venue.name,
            venue_city: venue.city,
        }
    })
}

#[derive(Debug, Deserialize)]
struct RawSquadItem {
    #[serde(default)]
    players: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawPlayer {
    id: i64,
    name: String,
    #[serde(default)]
    age: Option<u32>,
    #[serde(default)]
    number: Option<u32>,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    photo: Option<String>,
}

/// Parse `/players/squads` records into a flat roster
pub fn parse_squad(records: Vec<Value>) -> Fetched<Player> {
    let mut roster = Fetched::default();
    for record in records {
        let players = match serde_json::from_value::<RawSquadItem>(record) {
            Ok(item) => item.players,
            Err(e) => {
                roster.rejected.push(format!("invalid squad record: {e}"));
                continue;
            }
        };
        let parsed = parse_each(players, "player", "/id", |p: RawPlayer| Player {
            id: p.id,
            name: p.name,
            age: p.age,
            number: p.number,
            position: p.position,
            photo: p.photo,
        });
        roster.records.extend(parsed.records);
        roster.rejected.extend(parsed.rejected);
    }
    roster
}

#[derive(Debug, Deserialize)]
struct RawCoach {
    id: i64,
    name: String,
    #[serde(default)]
    nationality: Option<String>,
    #[serde(default)]
    photo: Option<String>,
    #[serde(default)]
    career: Vec<RawCareer>,
}

#[derive(Debug, Deserialize)]
struct RawCareer {
    team: RawCareerTeam,
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCareerTeam {
    id: Option<i64>,
}

fn parse_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
}

/// Parse `/coachs` records
///
/// Career entries without a team id are dropped; they cannot be matched.
pub fn parse_coaches(records: Vec<Value>) -> Fetched<Coach> {
    parse_each(records, "coach", "/id", |raw: RawCoach| {
        let career = raw
            .career
            .into_iter()
            .filter_map(|c| {
                c.team.id.map(|team_id| CoachCareer {
                    team_id,
                    start: parse_date(c.start),
                    end: parse_date(c.end),
                })
            })
            .collect();
        Coach {
            id: raw.id,
            name: raw.name,
            nationality: raw.nationality,
            photo: raw.photo,
            career,
        }
    })
}

/// Pick the current coach of `team_id`
///
/// Open-ended stints at the team win; among several, the latest start wins.
/// Without an open stint, the latest start at the team is used. Coaches with
/// no stint at the team are never chosen.
pub fn resolve_current_coach(
    team_id: i64,
    season: i32,
    coaches: &[Coach],
) -> Option<CoachAssignment> {
    let stints = coaches.iter().flat_map(|coach| {
        coach
            .career
            .iter()
            .filter(move |c| c.team_id == team_id)
            .map(move |c| (coach, c))
    });

    let (coach, stint) = stints.max_by(|(_, a), (_, b)| {
        let open = |c: &CoachCareer| c.end.is_none();
        open(a).cmp(&open(b)).then(a.start.cmp(&b.start))
    })?;

    Some(CoachAssignment {
        team_id,
        season,
        coach_id: coach.id,
        coach_name: coach.name.clone(),
        nationality: coach.nationality.clone(),
        photo: coach.photo.clone(),
        started_on: stint.start,
    })
}
