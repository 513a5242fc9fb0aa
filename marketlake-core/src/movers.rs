//! Gainers and losers by latest daily change.

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::change::ChangeRecord;
use crate::data::frame::{date_column, frame_err};
use crate::domain::EntityMeta;
use crate::error::ComputationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoverKind {
    Gainer,
    Loser,
}

impl MoverKind {
    /// A strictly positive change gains; zero and unknown changes lose.
    pub fn classify(change_pct: Option<f64>) -> Self {
        match change_pct {
            Some(c) if c > 0.0 => MoverKind::Gainer,
            _ => MoverKind::Loser,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MoverKind::Gainer => "gainer",
            MoverKind::Loser => "loser",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mover {
    pub entity_id: String,
    pub date: NaiveDate,
    pub close: f64,
    pub prev_close: Option<f64>,
    pub change_pct: Option<f64>,
    pub kind: MoverKind,
    pub meta: EntityMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Movers {
    /// Largest change first.
    pub gainers: Vec<Mover>,
    /// Most negative change first; unknown changes last.
    pub losers: Vec<Mover>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MoversRanker;

impl MoversRanker {
    pub fn new() -> Self {
        Self
    }

    /// Rank each entity by its most recent change record.
    ///
    /// Records without an entity, and entities without metadata, are
    /// dropped. When an entity has several records on its latest date the
    /// first one in input order is used; in [`ChangeCalculator`] output that
    /// is the record that closes the day.
    ///
    /// [`ChangeCalculator`]: crate::change::ChangeCalculator
    pub fn rank(&self, changes: &[ChangeRecord], meta: &[EntityMeta]) -> Movers {
        let mut by_id: HashMap<&str, &EntityMeta> = HashMap::with_capacity(meta.len());
        for m in meta {
            by_id.entry(m.entity_id.as_str()).or_insert(m);
        }

        let mut latest: HashMap<&str, &ChangeRecord> = HashMap::new();
        for record in changes {
            let Some(id) = record.entity_id.as_deref() else {
                continue;
            };
            match latest.get(id) {
                Some(current) if current.date >= record.date => {}
                _ => {
                    latest.insert(id, record);
                }
            }
        }

        let mut movers = Movers::default();
        for (id, record) in latest {
            let Some(m) = by_id.get(id) else {
                continue;
            };
            let kind = MoverKind::classify(record.change_pct);
            let mover = Mover {
                entity_id: id.to_string(),
                date: record.date,
                close: record.value,
                prev_close: record.prev_value,
                change_pct: record.change_pct,
                kind,
                meta: (*m).clone(),
            };
            match kind {
                MoverKind::Gainer => movers.gainers.push(mover),
                MoverKind::Loser => movers.losers.push(mover),
            }
        }

        movers
            .gainers
            .sort_by(|a, b| by_change(b, a).then_with(|| a.entity_id.cmp(&b.entity_id)));
        movers
            .losers
            .sort_by(|a, b| by_change(a, b).then_with(|| a.entity_id.cmp(&b.entity_id)));
        movers
    }
}

/// Ascending by change, unknown changes after every known one.
fn by_change(a: &Mover, b: &Mover) -> Ordering {
    match (a.change_pct, b.change_pct) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// One row per mover with its metadata and `type` column.
pub fn movers_to_frame(movers: &[Mover]) -> Result<DataFrame, ComputationError> {
    let ids: Vec<&str> = movers.iter().map(|m| m.entity_id.as_str()).collect();
    let names: Vec<Option<&str>> = movers.iter().map(|m| m.meta.name.as_deref()).collect();
    let tickers: Vec<Option<&str>> = movers.iter().map(|m| m.meta.ticker.as_deref()).collect();
    let sectors: Vec<Option<&str>> = movers.iter().map(|m| m.meta.sector.as_deref()).collect();
    let dates: Vec<Option<NaiveDate>> = movers.iter().map(|m| Some(m.date)).collect();
    let closes: Vec<f64> = movers.iter().map(|m| m.close).collect();
    let prevs: Vec<Option<f64>> = movers.iter().map(|m| m.prev_close).collect();
    let changes: Vec<Option<f64>> = movers.iter().map(|m| m.change_pct).collect();
    let kinds: Vec<&str> = movers.iter().map(|m| m.kind.as_str()).collect();

    DataFrame::new(vec![
        Column::new("entity_id".into(), ids),
        Column::new("name".into(), names),
        Column::new("ticker".into(), tickers),
        Column::new("sector".into(), sectors),
        date_column("date", &dates).map_err(frame_err)?,
        Column::new("close".into(), closes),
        Column::new("prev_close".into(), prevs),
        Column::new("change_pct".into(), changes),
        Column::new("type".into(), kinds),
    ])
    .map_err(frame_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn record(entity: &str, day: u32, change: Option<f64>) -> ChangeRecord {
        ChangeRecord {
            entity_id: Some(entity.into()),
            date: d(day),
            value: 100.0,
            prev_value: change.map(|_| 100.0),
            change_pct: change,
            is_rise: change.is_some_and(|c| c > 0.0),
        }
    }

    fn meta(ids: &[&str]) -> Vec<EntityMeta> {
        ids.iter().map(|id| EntityMeta::new(*id).with_name(format!("{id} SA"))).collect()
    }

    fn ids(movers: &[Mover]) -> Vec<&str> {
        movers.iter().map(|m| m.entity_id.as_str()).collect()
    }

    #[test]
    fn zero_change_is_a_loser() {
        let changes = vec![
            record("A", 2, Some(10.0)),
            record("B", 2, Some(-5.0)),
            record("C", 2, Some(0.0)),
        ];
        let movers = MoversRanker::new().rank(&changes, &meta(&["A", "B", "C"]));
        assert_eq!(ids(&movers.gainers), vec!["A"]);
        assert_eq!(ids(&movers.losers), vec!["B", "C"]);
        assert_eq!(movers.losers[1].kind, MoverKind::Loser);
    }

    #[test]
    fn only_latest_record_per_entity_counts() {
        let changes = vec![
            record("A", 1, Some(-50.0)),
            record("A", 3, Some(2.0)),
            record("A", 2, Some(-1.0)),
        ];
        let movers = MoversRanker::new().rank(&changes, &meta(&["A"]));
        assert_eq!(movers.gainers.len(), 1);
        assert_eq!(movers.gainers[0].date, d(3));
        assert!(movers.losers.is_empty());
    }

    #[test]
    fn views_are_sorted_by_change() {
        let changes = vec![
            record("A", 1, Some(1.0)),
            record("B", 1, Some(7.0)),
            record("C", 1, Some(-1.0)),
            record("D", 1, None),
            record("E", 1, Some(-9.0)),
        ];
        let movers = MoversRanker::new().rank(&changes, &meta(&["A", "B", "C", "D", "E"]));
        assert_eq!(ids(&movers.gainers), vec!["B", "A"]);
        assert_eq!(ids(&movers.losers), vec!["E", "C", "D"]);
    }

    #[test]
    fn entities_without_metadata_are_dropped() {
        let changes = vec![record("A", 1, Some(1.0)), record("Z", 1, Some(3.0))];
        let movers = MoversRanker::new().rank(&changes, &meta(&["A"]));
        assert_eq!(ids(&movers.gainers), vec!["A"]);
        assert_eq!(movers.gainers[0].meta.name.as_deref(), Some("A SA"));
    }

    #[test]
    fn frame_carries_type_column() {
        let changes = vec![record("A", 1, Some(1.0))];
        let movers = MoversRanker::new().rank(&changes, &meta(&["A"]));
        let df = movers_to_frame(&movers.gainers).unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(
            df.column("type").unwrap().str().unwrap().get(0),
            Some("gainer")
        );
    }
}
