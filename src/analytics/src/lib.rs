//! Player Analytics - Typed player records and derived metrics
//!
//! Player records are either trusted built-in samples or user drafts that
//! pass [`PlayerRecord::new`]. Metrics are recomputed on every read and
//! never stored.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

pub mod metrics;

pub use metrics::{
    chart_series, compare_players, compute_metrics, rank_players, ChartSeries, Comparison,
    ComparisonRow, DerivedMetrics, Metric, RankedPlayer, SkillRatings, UnavailableReason,
};

/// Number of recent games tracked per player.
pub const GAMES_TRACKED: usize = 10;

// ============ Core Types ============

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Position {
    Guard,
    Forward,
    Center,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Position::Guard => "Guard",
            Position::Forward => "Forward",
            Position::Center => "Center",
        };
        f.write_str(name)
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "guard" | "g" => Ok(Position::Guard),
            "forward" | "f" => Ok(Position::Forward),
            "center" | "c" => Ok(Position::Center),
            other => Err(format!("unknown position '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerRecord {
    pub name: String,
    pub ppg: f64,
    pub rpg: f64,
    pub apg: f64,
    pub fg_pct: f64,
    pub three_pct: f64,
    pub ft_pct: f64,
    pub games: Vec<u32>,
    pub position: Option<Position>,
}

/// Unvalidated player input, as collected by the add-player form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerDraft {
    pub name: String,
    pub ppg: f64,
    pub rpg: f64,
    pub apg: f64,
    pub fg_pct: f64,
    pub three_pct: f64,
    pub ft_pct: f64,
    pub games: Vec<u32>,
    pub position: Option<Position>,
}

// ============ Errors ============

/// Every problem found in a draft, in field order.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid player: {}", .0.join("; "))]
pub struct ValidationErrors(pub Vec<String>);

impl ValidationErrors {
    pub fn messages(&self) -> &[String] {
        &self.0
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RosterError {
    #[error(transparent)]
    Invalid(#[from] ValidationErrors),
    #[error("A player named '{0}' already exists")]
    DuplicateName(String),
}

// ============ Validation ============

impl PlayerRecord {
    /// Validate a draft, collecting every failure before rejecting it
    pub fn new(draft: PlayerDraft) -> Result<Self, ValidationErrors> {
        let mut errors = Vec::new();
        let name = draft.name.trim().to_string();

        if name.is_empty() {
            errors.push("Player name is required".to_string());
        }

        let counting = [("PPG", draft.ppg), ("RPG", draft.rpg), ("APG", draft.apg)];
        for (label, value) in counting {
            if !value.is_finite() || value < 0.0 {
                errors.push(format!("{} must be a non-negative number", label));
            }
        }

        let percentages = [
            ("FG%", draft.fg_pct),
            ("3P%", draft.three_pct),
            ("FT%", draft.ft_pct),
        ];
        for (label, value) in percentages {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                errors.push(format!("{} must be between 0 and 100", label));
            }
        }

        if draft.games.len() != GAMES_TRACKED {
            errors.push(format!(
                "Exactly {} game scores are required (got {})",
                GAMES_TRACKED,
                draft.games.len()
            ));
        }
        if draft.games.iter().all(|&points| points == 0) {
            errors.push("At least one game score must be nonzero".to_string());
        }
        if counting.iter().all(|&(_, value)| value == 0.0) {
            errors.push("At least one of PPG, RPG or APG must be nonzero".to_string());
        }

        if !errors.is_empty() {
            debug!(player = %name, problems = errors.len(), "rejected player draft");
            return Err(ValidationErrors(errors));
        }

        Ok(Self {
            name,
            ppg: draft.ppg,
            rpg: draft.rpg,
            apg: draft.apg,
            fg_pct: draft.fg_pct,
            three_pct: draft.three_pct,
            ft_pct: draft.ft_pct,
            games: draft.games,
            position: draft.position,
        })
    }
}

// ============ Sample Players ============

fn sample(
    name: &str,
    stats: [f64; 6],
    games: [u32; GAMES_TRACKED],
    position: Position,
) -> PlayerRecord {
    let [ppg, rpg, apg, fg_pct, three_pct, ft_pct] = stats;
    PlayerRecord {
        name: name.to_string(),
        ppg,
        rpg,
        apg,
        fg_pct,
        three_pct,
        ft_pct,
        games: games.to_vec(),
        position: Some(position),
    }
}

/// Built-in demo roster
pub fn sample_players() -> Vec<PlayerRecord> {
    vec![
        sample(
            "LeBron James",
            [25.7, 7.3, 7.8, 54.0, 36.0, 73.0],
            [28, 22, 31, 25, 29, 26, 24, 30, 33, 27],
            Position::Forward,
        ),
        sample(
            "Stephen Curry",
            [29.1, 5.2, 6.3, 48.0, 42.0, 91.0],
            [32, 36, 29, 35, 28, 34, 31, 33, 30, 38],
            Position::Guard,
        ),
        sample(
            "Giannis Antetokounmpo",
            [30.2, 11.8, 5.6, 61.0, 30.0, 68.0],
            [34, 28, 32, 36, 29, 31, 38, 33, 30, 35],
            Position::Forward,
        ),
        sample(
            "A'ja Wilson",
            [24.8, 9.5, 2.3, 52.0, 33.0, 85.0],
            [26, 22, 28, 25, 30, 24, 27, 29, 31, 26],
            Position::Forward,
        ),
    ]
}

/// Advanced metrics worth exploring, with one-line descriptions.
pub const ADVANCED_METRICS: &[(&str, &str)] = &[
    (
        "True Shooting %",
        "Measures shooting efficiency accounting for FGs, 3Ps, and FTs",
    ),
    (
        "Usage Rate",
        "Percentage of team plays used by a player while on the floor",
    ),
    (
        "PER",
        "Player Efficiency Rating - overall rating of a player's per-minute productivity",
    ),
    (
        "VORP",
        "Value Over Replacement Player - box score estimate of points per 100 possessions",
    ),
    (
        "Defensive Win Shares",
        "Estimate of wins contributed by a player due to defense",
    ),
    (
        "Net Rating",
        "Team point differential per 100 possessions with player on court",
    ),
];

// ============ Roster ============

/// Samples followed by user-added players, in insertion order.
///
/// Only custom players are serialized. Deserializing re-validates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SavedRoster")]
pub struct Roster {
    #[serde(skip, default = "sample_players")]
    samples: Vec<PlayerRecord>,
    custom: Vec<PlayerRecord>,
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            samples: sample_players(),
            custom: Vec::new(),
        }
    }
}

/// Serialized form of a [`Roster`], read back as unvalidated drafts.
#[derive(Deserialize)]
struct SavedRoster {
    #[serde(default)]
    custom: Vec<PlayerDraft>,
}

impl TryFrom<SavedRoster> for Roster {
    type Error = RosterError;

    fn try_from(saved: SavedRoster) -> Result<Self, Self::Error> {
        let mut roster = Roster::new();
        for draft in saved.custom {
            roster.add(draft)?;
        }
        Ok(roster)
    }
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.samples.iter().chain(self.custom.iter())
    }

    pub fn custom(&self) -> &[PlayerRecord] {
        &self.custom
    }

    pub fn len(&self) -> usize {
        self.samples.len() + self.custom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Case-insensitive lookup across samples and custom players
    pub fn get(&self, name: &str) -> Option<&PlayerRecord> {
        let wanted = name.trim().to_lowercase();
        self.all().find(|p| p.name.to_lowercase() == wanted)
    }

    pub fn add(&mut self, draft: PlayerDraft) -> Result<&PlayerRecord, RosterError> {
        let record = PlayerRecord::new(draft)?;
        if self.get(&record.name).is_some() {
            return Err(RosterError::DuplicateName(record.name));
        }
        info!(player = %record.name, "added custom player");
        self.custom.push(record);
        let added = self.custom.len() - 1;
        Ok(&self.custom[added])
    }

    /// Remove a user-added player; samples are never removed
    pub fn remove(&mut self, name: &str) -> Option<PlayerRecord> {
        let wanted = name.trim().to_lowercase();
        let index = self
            .custom
            .iter()
            .position(|p| p.name.to_lowercase() == wanted)?;
        let removed = self.custom.remove(index);
        info!(player = %removed.name, "removed custom player");
        Some(removed)
    }
}

// ============ Tests ============

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str) -> PlayerDraft {
        PlayerDraft {
            name: name.to_string(),
            ppg: 18.4,
            rpg: 4.1,
            apg: 6.9,
            fg_pct: 47.0,
            three_pct: 38.5,
            ft_pct: 88.0,
            games: vec![14, 22, 19, 17, 25, 16, 20, 18, 21, 12],
            position: Some(Position::Guard),
        }
    }

    #[test]
    fn test_valid_draft_is_accepted() {
        let record = PlayerRecord::new(draft("  Jalen Brunson ")).unwrap();
        assert_eq!(record.name, "Jalen Brunson");
        assert_eq!(record.games.len(), GAMES_TRACKED);
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let bad = PlayerDraft {
            name: "   ".to_string(),
            ppg: 0.0,
            rpg: 0.0,
            apg: 0.0,
            fg_pct: 120.0,
            three_pct: -1.0,
            ft_pct: f64::NAN,
            games: vec![0, 0, 0],
            position: None,
        };

        let errors = PlayerRecord::new(bad).unwrap_err();
        let messages = errors.messages();
        assert_eq!(messages.len(), 7, "{messages:?}");
        assert_eq!(messages[0], "Player name is required");
        assert!(messages.contains(&"FG% must be between 0 and 100".to_string()));
        assert!(messages.contains(&"3P% must be between 0 and 100".to_string()));
        assert!(messages.contains(&"FT% must be between 0 and 100".to_string()));
        assert!(messages.contains(&"Exactly 10 game scores are required (got 3)".to_string()));
        assert!(messages.contains(&"At least one game score must be nonzero".to_string()));
        assert!(messages.contains(&"At least one of PPG, RPG or APG must be nonzero".to_string()));
    }

    #[test]
    fn test_empty_games_rejected() {
        let mut empty = draft("Nobody");
        empty.games.clear();
        let errors = PlayerRecord::new(empty).unwrap_err();
        assert!(errors
            .messages()
            .iter()
            .any(|m| m == "At least one game score must be nonzero"));
    }

    #[test]
    fn test_sample_players_are_ordered() {
        let names: Vec<String> = sample_players().into_iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            vec![
                "LeBron James",
                "Stephen Curry",
                "Giannis Antetokounmpo",
                "A'ja Wilson"
            ]
        );
    }

    #[test]
    fn test_roster_rejects_duplicate_names() {
        let mut roster = Roster::new();
        assert!(matches!(
            roster.add(draft("stephen curry")),
            Err(RosterError::DuplicateName(_))
        ));

        roster.add(draft("Jalen Brunson")).unwrap();
        assert!(matches!(
            roster.add(draft("JALEN BRUNSON")),
            Err(RosterError::DuplicateName(_))
        ));
        assert_eq!(roster.len(), 5);
    }

    #[test]
    fn test_roster_remove_is_idempotent() {
        let mut roster = Roster::new();
        roster.add(draft("Jalen Brunson")).unwrap();

        assert!(roster.remove("jalen brunson").is_some());
        assert!(roster.remove("Jalen Brunson").is_none());
        assert!(roster.remove("LeBron James").is_none());
        assert!(roster.get("LeBron James").is_some());
        assert!(roster.custom().is_empty());
    }

    #[test]
    fn test_roster_serializes_custom_players_only() {
        let mut roster = Roster::new();
        roster.add(draft("Jalen Brunson")).unwrap();

        let json = serde_json::to_string(&roster).unwrap();
        assert!(!json.contains("LeBron"));

        let restored: Roster = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.len(), 5);
        assert!(restored.get("LeBron James").is_some());
        assert!(restored.get("Jalen Brunson").is_some());
    }

    #[test]
    fn test_restoring_roster_revalidates_players() {
        let invalid = r#"{"custom":[{"name":"Ghost","ppg":-3.0,"rpg":1.0,"apg":1.0,
            "fg_pct":150.0,"three_pct":30.0,"ft_pct":80.0,"games":[10,12],"position":null}]}"#;
        let err = serde_json::from_str::<Roster>(invalid).unwrap_err();
        assert!(err.to_string().contains("Invalid player"));

        let duplicate = format!(
            r#"{{"custom":[{}]}}"#,
            serde_json::to_string(&PlayerRecord::new(draft("LeBron James")).unwrap()).unwrap()
        );
        assert!(serde_json::from_str::<Roster>(&duplicate).is_err());
    }

    #[test]
    fn test_position_parsing() {
        assert_eq!("Guard".parse::<Position>(), Ok(Position::Guard));
        assert_eq!(" c ".parse::<Position>(), Ok(Position::Center));
        assert!("point".parse::<Position>().is_err());
    }
}
