//! Whitelisted filter predicates.
//!
//! A [`FilterSpec`] is a closed, compile-time table mapping a caller-facing
//! parameter name to a `(column, operator)` pair. Building a predicate only
//! ever copies column text out of that table; caller input is carried as
//! bound values, never spliced into the rendered clause.
//!
//! Rendering follows the engine's positional style:
//! - `date >= $param_date_from`
//! - `$param_entity_id IN matched_entities` (membership in a list column)

use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("'{name}' is not a valid filter parameter. Valid parameters are {valid:?}")]
    UnknownParameter {
        name: String,
        valid: Vec<&'static str>,
    },
}

/// Comparison operator of a whitelisted parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
    /// Membership of the bound value in a list-typed column.
    In,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::In => "IN",
        }
    }
}

/// One whitelist entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterParam {
    pub name: &'static str,
    pub column: &'static str,
    pub operator: Operator,
}

impl FilterParam {
    pub const fn new(name: &'static str, column: &'static str, operator: Operator) -> Self {
        Self {
            name,
            column,
            operator,
        }
    }
}

/// A value bound to a predicate parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Date(NaiveDate),
    Text(String),
}

impl FilterValue {
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FilterValue::Date(d) => Some(*d),
            FilterValue::Text(_) => None,
        }
    }

    fn to_lit(&self) -> Expr {
        match self {
            FilterValue::Date(d) => lit(*d),
            FilterValue::Text(s) => lit(s.clone()),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Date(d) => write!(f, "{d}"),
            FilterValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<NaiveDate> for FilterValue {
    fn from(d: NaiveDate) -> Self {
        FilterValue::Date(d)
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Text(s)
    }
}

/// A closed whitelist of filterable parameters.
#[derive(Debug, Clone, Copy)]
pub struct FilterSpec {
    params: &'static [FilterParam],
}

/// Date range plus single-entity equality, for bar and tick series.
pub const DATE_ENTITY: FilterSpec = FilterSpec::new(&[
    FilterParam::new("date_from", "date", Operator::Ge),
    FilterParam::new("date_to", "date", Operator::Le),
    FilterParam::new("entity_id", "entity_id", Operator::Eq),
]);

/// News: the entity filter tests membership in the matched-entities list.
pub const NEWS: FilterSpec = FilterSpec::new(&[
    FilterParam::new("date_from", "date", Operator::Ge),
    FilterParam::new("date_to", "date", Operator::Le),
    FilterParam::new("entity_id", "matched_entities", Operator::In),
]);

pub const CURRENCY: FilterSpec = FilterSpec::new(&[
    FilterParam::new("date_from", "effective_date", Operator::Ge),
    FilterParam::new("date_to", "effective_date", Operator::Le),
    FilterParam::new("code", "code", Operator::Eq),
]);

pub const GOLD: FilterSpec = FilterSpec::new(&[
    FilterParam::new("date_from", "date", Operator::Ge),
    FilterParam::new("date_to", "date", Operator::Le),
]);

/// Company metadata snapshots: entity equality only.
pub const METADATA: FilterSpec =
    FilterSpec::new(&[FilterParam::new("entity_id", "entity_id", Operator::Eq)]);

impl FilterSpec {
    pub const fn new(params: &'static [FilterParam]) -> Self {
        Self { params }
    }

    pub fn get(&self, name: &str) -> Option<&'static FilterParam> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.params.iter().map(|p| p.name).collect()
    }

    /// Build a predicate from `name → value` pairs.
    ///
    /// `None` values are skipped. Every remaining name is checked against
    /// the whitelist before a single clause is produced, so an unknown name
    /// fails without side effects. Clauses come out in whitelist order; a
    /// name given twice keeps its last value.
    pub fn build<'a, I>(&self, filters: I) -> Result<Predicate, FilterError>
    where
        I: IntoIterator<Item = (&'a str, Option<FilterValue>)>,
    {
        let present: Vec<(&'a str, FilterValue)> = filters
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)))
            .collect();

        let mut bound: BTreeMap<&'static str, FilterValue> = BTreeMap::new();
        for (name, _) in &present {
            if self.get(name).is_none() {
                return Err(FilterError::UnknownParameter {
                    name: name.to_string(),
                    valid: self.names(),
                });
            }
        }
        for (name, value) in present {
            if let Some(param) = self.get(name) {
                bound.insert(param.name, value);
            }
        }

        let mut predicate = Predicate::empty();
        for param in self.params {
            if let Some(value) = bound.remove(param.name) {
                let key = format!("param_{}", param.name);
                predicate.clauses.push(Clause {
                    name: param.name,
                    column: param.column,
                    operator: param.operator,
                    param: key.clone(),
                });
                predicate.params.insert(key, value);
            }
        }
        Ok(predicate)
    }
}

/// One rendered condition. `column` always comes from a whitelist.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub name: &'static str,
    pub column: &'static str,
    pub operator: Operator,
    pub param: String,
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::In => write!(f, "${} IN {}", self.param, self.column),
            op => write!(f, "{} {} ${}", self.column, op.as_str(), self.param),
        }
    }
}

/// ANDed clauses plus their bound parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    clauses: Vec<Clause>,
    params: BTreeMap<String, FilterValue>,
}

impl Predicate {
    /// The "no filter" predicate.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn params(&self) -> &BTreeMap<String, FilterValue> {
        &self.params
    }

    /// Bound value of a whitelisted parameter, by parameter name.
    pub fn value(&self, name: &str) -> Option<&FilterValue> {
        self.params.get(&format!("param_{name}"))
    }

    /// Rendered `WHERE` body; empty when there are no clauses.
    pub fn where_clause(&self) -> String {
        self.clauses
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Compile to a polars expression by binding each parameter's value.
    ///
    /// Returns `None` for the empty predicate.
    pub fn to_expr(&self) -> Option<Expr> {
        self.clauses
            .iter()
            .filter_map(|clause| {
                let value = self.params.get(&clause.param)?.to_lit();
                let column = col(clause.column);
                Some(match clause.operator {
                    Operator::Eq => column.eq(value),
                    Operator::Gt => column.gt(value),
                    Operator::Ge => column.gt_eq(value),
                    Operator::Lt => column.lt(value),
                    Operator::Le => column.lt_eq(value),
                    Operator::In => column.list().contains(value),
                })
            })
            .reduce(|acc, e| acc.and(e))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.where_clause())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn renders_bound_clauses_in_whitelist_order() {
        let predicate = DATE_ENTITY
            .build([
                ("entity_id", Some("PLPKO0000016".into())),
                ("date_from", Some(d("2024-01-01").into())),
            ])
            .unwrap();

        assert_eq!(
            predicate.where_clause(),
            "date >= $param_date_from AND entity_id = $param_entity_id"
        );
        assert_eq!(
            predicate.params().get("param_entity_id"),
            Some(&FilterValue::Text("PLPKO0000016".into()))
        );
        assert_eq!(
            predicate.value("date_from").and_then(|v| v.as_date()),
            Some(d("2024-01-01"))
        );
    }

    #[test]
    fn in_operator_renders_reversed() {
        let predicate = NEWS
            .build([("entity_id", Some("PLPKO0000016".into()))])
            .unwrap();
        assert_eq!(
            predicate.to_string(),
            "$param_entity_id IN matched_entities"
        );
    }

    #[test]
    fn unknown_parameter_fails_before_any_clause() {
        let err = DATE_ENTITY
            .build([
                ("date_from", Some(d("2024-01-01").into())),
                ("price; DROP TABLE x", Some("1".into())),
            ])
            .unwrap_err();
        assert_eq!(
            err,
            FilterError::UnknownParameter {
                name: "price; DROP TABLE x".into(),
                valid: vec!["date_from", "date_to", "entity_id"],
            }
        );
    }

    #[test]
    fn null_values_are_skipped_even_when_unknown() {
        let predicate = DATE_ENTITY
            .build([("date_from", None), ("whatever", None)])
            .unwrap();
        assert!(predicate.is_empty());
        assert_eq!(predicate.where_clause(), "");
        assert!(predicate.to_expr().is_none());
    }

    #[test]
    fn values_never_reach_rendered_text() {
        let hostile = "x' OR '1'='1";
        let predicate = CURRENCY.build([("code", Some(hostile.into()))]).unwrap();
        assert!(!predicate.where_clause().contains(hostile));
        assert_eq!(predicate.where_clause(), "code = $param_code");
    }

    #[test]
    fn expr_filters_frame() {
        let df = df!(
            "date" => &[d("2024-01-01"), d("2024-01-02"), d("2024-01-03")],
            "entity_id" => &["A", "B", "A"],
        )
        .unwrap();

        let predicate = DATE_ENTITY
            .build([
                ("date_from", Some(d("2024-01-02").into())),
                ("entity_id", Some("A".into())),
            ])
            .unwrap();

        let out = df
            .lazy()
            .filter(predicate.to_expr().unwrap())
            .collect()
            .unwrap();
        assert_eq!(out.height(), 1);
        let ids = out.column("entity_id").unwrap().str().unwrap();
        assert_eq!(ids.get(0), Some("A"));
    }

    #[test]
    fn in_expr_tests_list_membership() {
        let matched = Series::new(
            "matched_entities".into(),
            &[
                Series::new("".into(), &["PLPKO0000016", "PLPZU0000011"]),
                Series::new("".into(), &["PLPZU0000011"]),
            ],
        );
        let df = DataFrame::new(vec![
            Column::new("link".into(), &["a", "b"]),
            matched.into(),
        ])
        .unwrap();

        let predicate = NEWS
            .build([("entity_id", Some("PLPKO0000016".into()))])
            .unwrap();
        let out = df
            .lazy()
            .filter(predicate.to_expr().unwrap())
            .collect()
            .unwrap();
        assert_eq!(out.height(), 1);
        assert_eq!(out.column("link").unwrap().str().unwrap().get(0), Some("a"));
    }
}
