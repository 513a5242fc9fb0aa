//! Input validation run at the top of every lake operation.
//!
//! Nothing in here touches storage: a malformed date or identifier is
//! rejected before a connection is opened.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("invalid date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("invalid ISIN '{0}'")]
    InvalidIsin(String),

    #[error("invalid currency code '{0}'")]
    InvalidCurrencyCode(String),

    #[error("date_from {from} is after date_to {to}")]
    InvertedRange { from: NaiveDate, to: NaiveDate },

    #[error("unknown {kind} '{value}'")]
    UnknownName { kind: &'static str, value: String },

    #[error("invalid interval: {0}")]
    InvalidInterval(String),
}

/// Parse a strict `YYYY-MM-DD` date.
///
/// Looser forms chrono would accept (`2024-1-5`, trailing text) are rejected.
pub fn parse_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    let bytes = raw.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shape_ok {
        return Err(ValidationError::InvalidDate(raw.to_string()));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(raw.to_string()))
}

/// [`parse_date`] for optional inputs; `None` stays `None`.
pub fn parse_optional_date(raw: Option<&str>) -> Result<Option<NaiveDate>, ValidationError> {
    raw.map(parse_date).transpose()
}

/// Validate an ISIN: two uppercase letters followed by ten uppercase
/// letters or digits.
pub fn validate_isin(isin: &str) -> Result<(), ValidationError> {
    let bytes = isin.as_bytes();
    let ok = bytes.len() == 12
        && bytes[..2].iter().all(|b| b.is_ascii_uppercase())
        && bytes[2..]
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidIsin(isin.to_string()))
    }
}

/// Validate an ISO 4217 style code: three uppercase letters.
pub fn validate_currency_code(code: &str) -> Result<(), ValidationError> {
    if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidCurrencyCode(code.to_string()))
    }
}

/// Reject a range whose start is after its end. Open ends always pass.
pub fn validate_range(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<(), ValidationError> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => Err(ValidationError::InvertedRange { from, to }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strict_dates() {
        assert_eq!(
            parse_date("2024-03-15").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
        );
        for bad in ["2024-3-15", "2024/03/15", "15-03-2024", "2024-03-15x", "", "2024-02-30"] {
            assert_eq!(
                parse_date(bad),
                Err(ValidationError::InvalidDate(bad.to_string())),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn optional_date_passes_none_through() {
        assert_eq!(parse_optional_date(None).unwrap(), None);
        assert!(parse_optional_date(Some("nope")).is_err());
    }

    #[test]
    fn isin_shape() {
        assert!(validate_isin("PLPKO0000016").is_ok());
        assert!(validate_isin("US0378331005").is_ok());
        assert!(validate_isin("pLPKO0000016").is_err());
        assert!(validate_isin("PLPKO000001").is_err());
        assert!(validate_isin("PLPKO0000016'; DROP").is_err());
        assert!(validate_isin("1LPKO0000016").is_err());
    }

    #[test]
    fn currency_code_shape() {
        assert!(validate_currency_code("USD").is_ok());
        assert!(validate_currency_code("usd").is_err());
        assert!(validate_currency_code("USDT").is_err());
    }

    #[test]
    fn inverted_range_rejected() {
        let a = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(validate_range(Some(b), Some(a)).is_ok());
        assert!(validate_range(Some(a), Some(a)).is_ok());
        assert!(validate_range(Some(a), None).is_ok());
        assert_eq!(
            validate_range(Some(a), Some(b)),
            Err(ValidationError::InvertedRange { from: a, to: b })
        );
    }
}
