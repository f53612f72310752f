//! League catalog embedded in the binary
//!
//! The catalog is the fixed, externally defined list of leagues to mirror. Its
//! processing order is part of the resume contract: checkpoint indices refer to
//! positions in [`LeagueCatalog::ordered`], so the order must be stable across
//! runs. Priority leagues come first, the rest keep their file order.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Embedded catalog data
const CATALOG_JSON: &str = include_str!("leagues.json");

/// Global catalog instance (parsed once)
static CATALOG: Lazy<Result<LeagueCatalog, CatalogError>> =
    Lazy::new(|| LeagueCatalog::from_json(CATALOG_JSON));

/// One league entry of the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogLeague {
    /// External catalog id
    pub id: i64,
    /// Display name
    pub name: String,
    /// Country (None for international competitions)
    #[serde(default)]
    pub country: Option<String>,
    /// Priority tier flag
    #[serde(default)]
    pub priority: bool,
}

impl CatalogLeague {
    /// Build the season-scoped league record for the store
    pub fn to_league(&self, season: i32) -> crate::League {
        crate::League {
            id: self.id,
            name: self.name.clone(),
            country: self.country.clone(),
            season,
            priority: self.priority,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    schema_version: String,
    last_updated: String,
    leagues: Vec<CatalogLeague>,
}

/// Ordered league catalog
#[derive(Debug, Clone)]
pub struct LeagueCatalog {
    #[allow(dead_code)]
    schema_version: String,
    last_updated: String,
    leagues: Vec<CatalogLeague>,
}

impl LeagueCatalog {
    /// Load the embedded catalog (cached after the first call)
    pub fn load() -> Result<&'static Self, &'static CatalogError> {
        CATALOG.as_ref()
    }

    /// Load the embedded catalog, returning an owned copy
    pub fn load_embedded() -> Result<Self, CatalogError> {
        Self::from_json(CATALOG_JSON)
    }

    /// Parse a catalog from JSON
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog = serde_json::from_str(json)
            .map_err(|e| CatalogError::ParseError(format!("Failed to parse catalog: {e}")))?;

        let mut seen = HashSet::new();
        for league in &raw.leagues {
            if !seen.insert(league.id) {
                return Err(CatalogError::DuplicateLeague(league.id));
            }
        }

        Ok(Self {
            schema_version: raw.schema_version,
            last_updated: raw.last_updated,
            leagues: raw.leagues,
        })
    }

    /// Date the catalog table was last revised
    pub fn last_updated(&self) -> &str {
        &self.last_updated
    }

    /// Number of leagues in the catalog
    pub fn len(&self) -> usize {
        self.leagues.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.leagues.is_empty()
    }

    /// Leagues in processing order: priority leagues first, file order otherwise
    pub fn ordered(&self) -> Vec<CatalogLeague> {
        let mut leagues = self.leagues.clone();
        // stable: ties keep file order
        leagues.sort_by_key(|l| !l.priority);
        leagues
    }

    /// Ordered leagues restricted to `ids` (empty slice means all)
    ///
    /// Unknown ids are rejected so a typo cannot silently shrink a run.
    pub fn select(&self, ids: &[i64]) -> Result<Vec<CatalogLeague>, CatalogError> {
        if ids.is_empty() {
            return Ok(self.ordered());
        }
        for id in ids {
            if !self.leagues.iter().any(|l| l.id == *id) {
                return Err(CatalogError::UnknownLeague(*id));
            }
        }
        Ok(self
            .ordered()
            .into_iter()
            .filter(|l| ids.contains(&l.id))
            .collect())
    }

    /// Position of a league in processing order
    pub fn position(&self, league_id: i64) -> Option<usize> {
        self.ordered().iter().position(|l| l.id == league_id)
    }
}

/// Catalog errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    /// Catalog JSON could not be parsed
    #[error("parse error: {0}")]
    ParseError(String),

    /// Same league id listed twice
    #[error("duplicate league id in catalog: {0}")]
    DuplicateLeague(i64),

    /// Requested league is not in the catalog
    #[error("league {0} is not in the catalog")]
    UnknownLeague(i64),
}
