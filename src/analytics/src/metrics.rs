//! Derived metrics, ranking and comparison.

use crate::PlayerRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

// ============ Metric Values ============

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UnavailableReason {
    /// FG% and FT% are both zero
    ZeroShootingVolume,
    /// Every tracked game scored zero points
    ZeroScoringMean,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::ZeroShootingVolume => f.write_str("no shooting volume"),
            UnavailableReason::ZeroScoringMean => f.write_str("no points scored"),
        }
    }
}

/// A computed value, or the reason it is undefined.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Metric {
    Value(f64),
    Unavailable(UnavailableReason),
}

impl Metric {
    pub fn value(&self) -> Option<f64> {
        match self {
            Metric::Value(v) => Some(*v),
            Metric::Unavailable(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Metric::Value(_))
    }

    fn map(self, f: impl FnOnce(f64) -> f64) -> Metric {
        match self {
            Metric::Value(v) => Metric::Value(f(v)),
            unavailable => unavailable,
        }
    }

    /// Descending by value; unavailable values sort last
    fn cmp_desc(&self, other: &Metric) -> Ordering {
        match (self.value(), other.value()) {
            (Some(a), Some(b)) => b.total_cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Value(v) => write!(f, "{:.1}", v),
            Metric::Unavailable(reason) => write!(f, "n/a ({})", reason),
        }
    }
}

// ============ Derived Metrics ============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillRatings {
    pub scoring: f64,
    pub playmaking: f64,
    pub rebounding: f64,
    pub efficiency: f64,
    pub consistency: Metric,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DerivedMetrics {
    pub impact_score: f64,
    pub true_shooting: Metric,
    pub versatility: f64,
    pub efficiency: f64,
    pub skills: SkillRatings,
    pub overall_rating: Metric,
}

fn skill(value: f64, cap: f64) -> f64 {
    (value / cap * 100.0).clamp(0.0, 100.0)
}

fn true_shooting(record: &PlayerRecord) -> Metric {
    let denominator = 2.0 * (record.fg_pct / 100.0 * 10.0 + record.ft_pct / 100.0 * 4.0);
    if denominator.abs() < f64::EPSILON {
        return Metric::Unavailable(UnavailableReason::ZeroShootingVolume);
    }
    Metric::Value(record.ppg / denominator * 100.0)
}

/// 100 minus the coefficient of variation of game scores, clamped to [0, 100].
fn consistency(games: &[u32]) -> Metric {
    if games.is_empty() {
        return Metric::Unavailable(UnavailableReason::ZeroScoringMean);
    }
    let n = games.len() as f64;
    let mean = games.iter().map(|&g| f64::from(g)).sum::<f64>() / n;
    if mean == 0.0 {
        return Metric::Unavailable(UnavailableReason::ZeroScoringMean);
    }
    let variance = games
        .iter()
        .map(|&g| (f64::from(g) - mean).powi(2))
        .sum::<f64>()
        / n;
    let stddev = variance.sqrt();
    Metric::Value((100.0 - stddev / mean * 100.0).clamp(0.0, 100.0))
}

pub fn compute_metrics(record: &PlayerRecord) -> DerivedMetrics {
    let efficiency = (record.fg_pct + record.three_pct + record.ft_pct) / 3.0;
    let consistency = consistency(&record.games);

    let overall_rating = consistency.map(|c| {
        0.3 * record.ppg + 0.2 * efficiency + 0.25 * (record.rpg + record.apg) + 0.25 * c
    });

    DerivedMetrics {
        impact_score: 0.4 * record.ppg + 0.3 * record.rpg + 0.3 * record.apg,
        true_shooting: true_shooting(record),
        versatility: 10.0 * (record.ppg / 30.0 + record.rpg / 10.0 + record.apg / 10.0),
        efficiency,
        skills: SkillRatings {
            scoring: skill(record.ppg, 35.0),
            playmaking: skill(record.apg, 12.0),
            rebounding: skill(record.rpg, 15.0),
            efficiency: skill(record.fg_pct, 65.0),
            consistency,
        },
        overall_rating,
    }
}

// ============ Ranking ============

#[derive(Debug, Clone)]
pub struct RankedPlayer<'a> {
    /// 1-based position in the ranking
    pub rank: usize,
    pub record: &'a PlayerRecord,
    pub metrics: DerivedMetrics,
}

/// Stable descending sort by overall rating; ties keep input order.
pub fn rank_players<'a, I>(players: I) -> Vec<RankedPlayer<'a>>
where
    I: IntoIterator<Item = &'a PlayerRecord>,
{
    let mut ranked: Vec<RankedPlayer<'a>> = players
        .into_iter()
        .map(|record| RankedPlayer {
            rank: 0,
            record,
            metrics: compute_metrics(record),
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.metrics
            .overall_rating
            .cmp_desc(&b.metrics.overall_rating)
    });
    for (index, entry) in ranked.iter_mut().enumerate() {
        entry.rank = index + 1;
    }
    ranked
}

// ============ Comparison ============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComparisonRow {
    pub label: String,
    pub values: Vec<Metric>,
    /// Index of the highest available value; first wins ties
    pub leader: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comparison {
    pub players: Vec<String>,
    pub rows: Vec<ComparisonRow>,
}

fn row(label: &str, values: Vec<Metric>) -> ComparisonRow {
    let mut leader: Option<(usize, f64)> = None;
    for (index, value) in values.iter().enumerate() {
        if let Some(v) = value.value() {
            if leader.map_or(true, |(_, best)| v > best) {
                leader = Some((index, v));
            }
        }
    }
    ComparisonRow {
        label: label.to_string(),
        values,
        leader: leader.map(|(index, _)| index),
    }
}

pub fn compare_players(players: &[&PlayerRecord]) -> Comparison {
    let metrics: Vec<DerivedMetrics> = players.iter().map(|p| compute_metrics(p)).collect();
    let raw = |f: fn(&PlayerRecord) -> f64| -> Vec<Metric> {
        players.iter().map(|p| Metric::Value(f(*p))).collect()
    };
    let derived = |f: fn(&DerivedMetrics) -> Metric| -> Vec<Metric> {
        metrics.iter().map(f).collect()
    };

    let rows = vec![
        row("PPG", raw(|p| p.ppg)),
        row("RPG", raw(|p| p.rpg)),
        row("APG", raw(|p| p.apg)),
        row("FG%", raw(|p| p.fg_pct)),
        row("3P%", raw(|p| p.three_pct)),
        row("FT%", raw(|p| p.ft_pct)),
        row("Impact Score", derived(|m| Metric::Value(m.impact_score))),
        row("True Shooting", derived(|m| m.true_shooting)),
        row("Versatility", derived(|m| Metric::Value(m.versatility))),
        row("Efficiency", derived(|m| Metric::Value(m.efficiency))),
        row("Consistency", derived(|m| m.skills.consistency)),
        row("Overall Rating", derived(|m| m.overall_rating)),
    ];

    Comparison {
        players: players.iter().map(|p| p.name.clone()).collect(),
        rows,
    }
}

// ============ Chart Series ============

/// Data behind the player stats view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartSeries {
    pub basic: Vec<(String, f64)>,
    pub shooting: Vec<(String, f64)>,
    /// (game number starting at 1, points)
    pub trend: Vec<(usize, u32)>,
}

pub fn chart_series(record: &PlayerRecord) -> ChartSeries {
    let labelled = |pairs: [(&str, f64); 3]| -> Vec<(String, f64)> {
        pairs.iter().map(|(l, v)| (l.to_string(), *v)).collect()
    };
    ChartSeries {
        basic: labelled([("PPG", record.ppg), ("RPG", record.rpg), ("APG", record.apg)]),
        shooting: labelled([
            ("FG%", record.fg_pct),
            ("3P%", record.three_pct),
            ("FT%", record.ft_pct),
        ]),
        trend: record
            .games
            .iter()
            .enumerate()
            .map(|(i, &points)| (i + 1, points))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_players;

    fn lebron() -> PlayerRecord {
        sample_players().remove(0)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_formulas_match_reference_values() {
        let record = lebron();
        let m = compute_metrics(&record);

        assert!(approx(m.impact_score, 0.4 * 25.7 + 0.3 * 7.3 + 0.3 * 7.8));
        assert!(approx(m.versatility, 10.0 * (25.7 / 30.0 + 0.73 + 0.78)));
        assert!(approx(m.efficiency, (54.0 + 36.0 + 73.0) / 3.0));
        assert!(approx(
            m.true_shooting.value().unwrap(),
            25.7 / (2.0 * (5.4 + 2.92)) * 100.0
        ));
        assert!(approx(m.skills.scoring, 25.7 / 35.0 * 100.0));
        assert!(approx(m.skills.playmaking, 7.8 / 12.0 * 100.0));
        assert!(approx(m.skills.rebounding, 7.3 / 15.0 * 100.0));
        assert!(approx(m.skills.efficiency, 54.0 / 65.0 * 100.0));
    }

    #[test]
    fn test_consistency_strictly_inside_bounds() {
        let m = compute_metrics(&lebron());
        let consistency = m.skills.consistency.value().unwrap();
        assert!(consistency > 0.0 && consistency < 100.0);
        // population stddev 3.2016 over mean 27.5
        assert!((consistency - 88.358).abs() < 1e-3);

        let overall = m.overall_rating.value().unwrap();
        let expected = 0.3 * 25.7 + 0.2 * m.efficiency + 0.25 * (7.3 + 7.8) + 0.25 * consistency;
        assert!(approx(overall, expected));
    }

    #[test]
    fn test_skills_are_capped() {
        let mut record = lebron();
        record.ppg = 50.0;
        record.apg = 15.0;
        record.rpg = 20.0;
        record.fg_pct = 80.0;
        let m = compute_metrics(&record);
        assert_eq!(m.skills.scoring, 100.0);
        assert_eq!(m.skills.playmaking, 100.0);
        assert_eq!(m.skills.rebounding, 100.0);
        assert_eq!(m.skills.efficiency, 100.0);
    }

    #[test]
    fn test_erratic_scoring_clamps_consistency_to_zero() {
        let mut record = lebron();
        record.games = vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 90];
        let m = compute_metrics(&record);
        assert_eq!(m.skills.consistency, Metric::Value(0.0));
    }

    #[test]
    fn test_zero_shooting_reports_unavailable() {
        let mut record = lebron();
        record.fg_pct = 0.0;
        record.ft_pct = 0.0;
        let m = compute_metrics(&record);
        assert_eq!(
            m.true_shooting,
            Metric::Unavailable(UnavailableReason::ZeroShootingVolume)
        );
        assert!(m.overall_rating.is_available());
    }

    #[test]
    fn test_zero_games_mean_is_undefined_not_zero() {
        let mut record = lebron();
        record.games = vec![0; 10];
        let m = compute_metrics(&record);
        assert_eq!(
            m.skills.consistency,
            Metric::Unavailable(UnavailableReason::ZeroScoringMean)
        );
        assert!(!m.overall_rating.is_available());
        assert_eq!(m.skills.consistency.to_string(), "n/a (no points scored)");
    }

    #[test]
    fn test_ranking_is_descending() {
        let players = sample_players();
        let ranked = rank_players(&players);
        assert_eq!(ranked.len(), 4);
        for pair in ranked.windows(2) {
            let a = pair[0].metrics.overall_rating.value().unwrap();
            let b = pair[1].metrics.overall_rating.value().unwrap();
            assert!(a >= b);
        }
        let ranks: Vec<usize> = ranked.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_ranking_ties_keep_insertion_order() {
        let mut first = lebron();
        first.name = "First".to_string();
        let mut second = lebron();
        second.name = "Second".to_string();
        let mut undefined = lebron();
        undefined.name = "Undefined".to_string();
        undefined.games = vec![0; 10];
        let mut low = lebron();
        low.name = "Low".to_string();
        low.ppg = 1.0;

        let players = vec![undefined, first, low, second];
        let order: Vec<String> = rank_players(&players)
            .iter()
            .map(|r| r.record.name.clone())
            .collect();
        assert_eq!(order, vec!["First", "Second", "Low", "Undefined"]);
    }

    #[test]
    fn test_comparison_leaders() {
        let players = sample_players();
        let refs: Vec<&PlayerRecord> = players.iter().collect();
        let comparison = compare_players(&refs);

        assert_eq!(comparison.players.len(), 4);
        let leader = |label: &str| {
            let row = comparison.rows.iter().find(|r| r.label == label).unwrap();
            row.leader.map(|i| comparison.players[i].as_str())
        };
        assert_eq!(leader("PPG"), Some("Giannis Antetokounmpo"));
        assert_eq!(leader("APG"), Some("LeBron James"));
        assert_eq!(leader("FT%"), Some("Stephen Curry"));
    }

    #[test]
    fn test_chart_series_numbers_games_from_one() {
        let series = chart_series(&lebron());
        assert_eq!(series.basic[0], ("PPG".to_string(), 25.7));
        assert_eq!(series.shooting[2], ("FT%".to_string(), 73.0));
        assert_eq!(series.trend.first(), Some(&(1, 28)));
        assert_eq!(series.trend.last(), Some(&(10, 27)));
    }
}
