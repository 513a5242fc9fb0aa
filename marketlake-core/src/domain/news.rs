//! NewsItem: one article, keyed by its link.

use chrono::NaiveDate;
use chrono_tz::Tz;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::frame::{self, date_column, frame_err};
use crate::error::ComputationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub link: String,
    pub title: String,
    pub date: NaiveDate,
    pub summary: Option<String>,
    /// Entity ids mentioned by the article.
    #[serde(default)]
    pub matched_entities: Vec<String>,
}

/// Frame with the canonical news schema.
pub fn news_to_frame(items: &[NewsItem]) -> Result<DataFrame, ComputationError> {
    let titles: Vec<&str> = items.iter().map(|n| n.title.as_str()).collect();
    let links: Vec<&str> = items.iter().map(|n| n.link.as_str()).collect();
    let dates: Vec<Option<NaiveDate>> = items.iter().map(|n| Some(n.date)).collect();
    let summaries: Vec<Option<&str>> = items.iter().map(|n| n.summary.as_deref()).collect();
    let entities: Vec<Series> = items
        .iter()
        .map(|n| Series::new(PlSmallStr::EMPTY, n.matched_entities.as_slice()))
        .collect();

    let matched = Series::new("matched_entities".into(), entities)
        .cast(&DataType::List(Box::new(DataType::String)))
        .map_err(frame_err)?;

    DataFrame::new(vec![
        Column::new("title".into(), titles),
        Column::new("link".into(), links),
        date_column("date", &dates).map_err(frame_err)?,
        Column::new("summary".into(), summaries),
        matched.into(),
    ])
    .map_err(frame_err)
}

/// Typed news rows. `link`, `title` and `date` are required; a missing
/// `matched_entities` column reads as no matches.
pub fn news_from_frame(df: &DataFrame, tz: Tz) -> Result<Vec<NewsItem>, ComputationError> {
    let titles = frame::strings(df, "title")?;
    let links = frame::strings(df, "link")?;
    let dates = frame::dates(df, "date", tz)?;
    let summaries = match df.column("summary") {
        Ok(_) => frame::strings(df, "summary")?,
        Err(_) => vec![None; df.height()],
    };
    let matched = match df.column("matched_entities") {
        Ok(column) => entity_lists(column)?,
        Err(_) => vec![Vec::new(); df.height()],
    };

    let mut items = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        items.push(NewsItem {
            link: links[i]
                .clone()
                .ok_or_else(|| ComputationError::invalid(i, "null link"))?,
            title: titles[i]
                .clone()
                .ok_or_else(|| ComputationError::invalid(i, "null title"))?,
            date: dates[i].ok_or_else(|| ComputationError::invalid(i, "null date"))?,
            summary: summaries[i].clone(),
            matched_entities: matched[i].clone(),
        });
    }
    Ok(items)
}

fn entity_lists(column: &Column) -> Result<Vec<Vec<String>>, ComputationError> {
    let cast = column
        .cast(&DataType::List(Box::new(DataType::String)))
        .map_err(frame_err)?;
    let lists = cast.list().map_err(frame_err)?;
    lists
        .into_iter()
        .map(|entry| match entry {
            None => Ok(Vec::new()),
            Some(series) => Ok(series
                .str()
                .map_err(frame_err)?
                .into_iter()
                .flatten()
                .map(String::from)
                .collect()),
        })
        .collect()
}
