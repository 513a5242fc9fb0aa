//! Backfill date chunking.

use chrono::{Days, Months, NaiveDate};

use crate::validate::ValidationError;

/// Default backfill chunk length in months.
pub const DEFAULT_CHUNK_MONTHS: u32 = 3;

/// Split `[start, end]` into consecutive inclusive chunks of `months`
/// calendar months.
///
/// Chunk `k` starts at `start + k * months` (day clamped to month length);
/// each chunk ends the day before the next one starts, the last at `end`.
pub fn date_intervals(
    start: NaiveDate,
    end: NaiveDate,
    months: u32,
) -> Result<Vec<(NaiveDate, NaiveDate)>, ValidationError> {
    if months == 0 {
        return Err(ValidationError::InvalidInterval(
            "chunk length must be at least one month".into(),
        ));
    }
    if start > end {
        return Err(ValidationError::InvertedRange {
            from: start,
            to: end,
        });
    }

    let mut starts = Vec::new();
    for k in 0u32.. {
        let Some(step) = k.checked_mul(months) else {
            break;
        };
        match start.checked_add_months(Months::new(step)) {
            Some(s) if s <= end => starts.push(s),
            _ => break,
        }
    }

    let mut out = Vec::with_capacity(starts.len());
    for (i, s) in starts.iter().enumerate() {
        let chunk_end = match starts.get(i + 1) {
            Some(next) => next.checked_sub_days(Days::new(1)).unwrap_or(*next),
            None => end,
        };
        out.push((*s, chunk_end));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn splits_into_quarters() {
        let chunks = date_intervals(d(2024, 1, 1), d(2024, 8, 15), 3).unwrap();
        assert_eq!(
            chunks,
            vec![
                (d(2024, 1, 1), d(2024, 3, 31)),
                (d(2024, 4, 1), d(2024, 6, 30)),
                (d(2024, 7, 1), d(2024, 8, 15)),
            ]
        );
    }

    #[test]
    fn single_day_is_one_chunk() {
        let day = d(2024, 2, 29);
        assert_eq!(date_intervals(day, day, 3).unwrap(), vec![(day, day)]);
    }

    #[test]
    fn month_end_starts_clamp_without_drift() {
        let chunks = date_intervals(d(2024, 1, 31), d(2024, 4, 30), 1).unwrap();
        let starts: Vec<NaiveDate> = chunks.iter().map(|c| c.0).collect();
        assert_eq!(
            starts,
            vec![d(2024, 1, 31), d(2024, 2, 29), d(2024, 3, 31), d(2024, 4, 30)]
        );
        assert_eq!(chunks[0].1, d(2024, 2, 28));
    }

    #[test]
    fn chunks_are_contiguous() {
        let chunks = date_intervals(d(2020, 3, 17), d(2024, 11, 2), DEFAULT_CHUNK_MONTHS).unwrap();
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].1.succ_opt().unwrap(), pair[1].0);
        }
        assert_eq!(chunks.last().unwrap().1, d(2024, 11, 2));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(date_intervals(d(2024, 2, 1), d(2024, 1, 1), 3).is_err());
        assert!(matches!(
            date_intervals(d(2024, 1, 1), d(2024, 2, 1), 0),
            Err(ValidationError::InvalidInterval(_))
        ));
    }
}
