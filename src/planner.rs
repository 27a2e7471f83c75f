//! Bucket query planning.
//!
//! Turns a requested period (`annee`, `mois`, `semaine`, `jour`) and an
//! aggregation type (`max`, `moy`, `min`) into a [`QueryPlan`]: one of twelve
//! fixed SQL statements, the date filter to bind into it, and the number of
//! buckets the result must have.
//!
//! The SQL text never contains request data. Every statement binds the
//! building id as `$1` and the date filter as `$2` (plus `$3` for the week
//! range).

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use std::str::FromStr;

use crate::model::RequestError;

// ---------------------------------------------------------------------------
// Request vocabulary
// ---------------------------------------------------------------------------

/// Time window shape of an aggregated view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    /// One year, one bucket per month.
    Year,
    /// One month, one bucket per day.
    Month,
    /// Seven days starting at the reference date, one bucket per weekday
    /// (Monday = 0).
    Week,
    /// One day, one bucket per hour.
    Day,
}

impl FromStr for Granularity {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "annee" => Ok(Granularity::Year),
            "mois" => Ok(Granularity::Month),
            "semaine" => Ok(Granularity::Week),
            "jour" => Ok(Granularity::Day),
            other => Err(RequestError::UnknownGranularity(other.to_string())),
        }
    }
}

/// Reduction applied to the readings of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationKind {
    Maximum,
    Average,
    Minimum,
}

impl FromStr for AggregationKind {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "max" => Ok(AggregationKind::Maximum),
            "moy" => Ok(AggregationKind::Average),
            "min" => Ok(AggregationKind::Minimum),
            other => Err(RequestError::UnknownAggregation(other.to_string())),
        }
    }
}

/// Which readings a plan selects, besides the building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateFilter {
    /// Readings whose `date_mesure` text starts with this literal prefix.
    Prefix(String),
    /// Readings with `start <= date_mesure <= end`.
    Range {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

impl DateFilter {
    /// The LIKE pattern bound for a prefix filter. `%`, `_` and `\` in the
    /// prefix are escaped so they only ever match themselves.
    pub fn like_pattern(prefix: &str) -> String {
        let mut pattern = String::with_capacity(prefix.len() + 1);
        for c in prefix.chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        pattern
    }
}

/// Everything a store needs to run one aggregated query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub granularity: Granularity,
    pub kind: AggregationKind,
    pub sql: &'static str,
    pub filter: DateFilter,
    pub bucket_count: usize,
}

// ---------------------------------------------------------------------------
// Statement table
// ---------------------------------------------------------------------------

macro_rules! bucket_query {
    ($position:literal, $reduce:literal, $filter:literal) => {
        concat!(
            "SELECT ", $position, " AS pos, ",
            $reduce, "(temperature) AS temp, ",
            $reduce, "(pression) AS press, ",
            $reduce, "(humidite) AS hum ",
            "FROM donnees_capteurs ",
            "WHERE id_immeuble = $1 AND ", $filter, " ",
            "GROUP BY pos ORDER BY pos ASC"
        )
    };
}

macro_rules! query_table {
    ($granularity:expr, $kind:expr; $($g:ident => ($position:literal, $filter:literal)),+ $(,)?) => {
        match ($granularity, $kind) {
            $(
                (Granularity::$g, AggregationKind::Maximum) => bucket_query!($position, "MAX", $filter),
                (Granularity::$g, AggregationKind::Average) => bucket_query!($position, "AVG", $filter),
                (Granularity::$g, AggregationKind::Minimum) => bucket_query!($position, "MIN", $filter),
            )+
        }
    };
}

/// The fixed statement for a `(granularity, kind)` pair.
pub fn query_for(granularity: Granularity, kind: AggregationKind) -> &'static str {
    query_table!(granularity, kind;
        Year => ("(EXTRACT(MONTH FROM date_mesure) - 1)::INT", "to_char(date_mesure, 'YYYY-MM-DD HH24:MI:SS') LIKE $2"),
        Month => ("(EXTRACT(DAY FROM date_mesure) - 1)::INT", "to_char(date_mesure, 'YYYY-MM-DD HH24:MI:SS') LIKE $2"),
        Week => ("(EXTRACT(ISODOW FROM date_mesure) - 1)::INT", "date_mesure BETWEEN $2 AND $3"),
        Day => ("EXTRACT(HOUR FROM date_mesure)::INT", "to_char(date_mesure, 'YYYY-MM-DD HH24:MI:SS') LIKE $2"),
    )
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Parses the raw request strings, then plans.
pub fn plan_request(period: &str, kind: &str, reference_date: &str) -> Result<QueryPlan, RequestError> {
    plan(period.parse()?, kind.parse()?, reference_date)
}

/// Builds the plan for one aggregated view.
///
/// `reference_date` is `YYYY` for a year, `YYYY-MM` for a month, the first
/// day `YYYY-MM-DD` for a week and `YYYY-MM-DD` for a day.
pub fn plan(
    granularity: Granularity,
    kind: AggregationKind,
    reference_date: &str,
) -> Result<QueryPlan, RequestError> {
    let reference_date = reference_date.trim();

    let (filter, bucket_count) = match granularity {
        Granularity::Year => (DateFilter::Prefix(reference_date.to_string()), 12),
        Granularity::Month => {
            let (prefix, days) = month_window(reference_date)?;
            (DateFilter::Prefix(prefix), days)
        }
        Granularity::Week => (week_range(reference_date)?, 7),
        Granularity::Day => (DateFilter::Prefix(reference_date.to_string()), 24),
    };

    Ok(QueryPlan {
        granularity,
        kind,
        sql: query_for(granularity, kind),
        filter,
        bucket_count,
    })
}

/// The zero-padded `YYYY-MM` prefix of the month and its number of days.
/// "2020-1" is read as January, never as a prefix of October to December.
fn month_window(year_month: &str) -> Result<(String, usize), RequestError> {
    let invalid = || RequestError::InvalidReferenceDate {
        date: year_month.to_string(),
        expected: "YYYY-MM",
    };

    let first = NaiveDate::parse_from_str(&format!("{}-01", year_month), "%Y-%m-%d")
        .map_err(|_| invalid())?;
    let next = first.checked_add_months(chrono::Months::new(1)).ok_or_else(invalid)?;

    let days = usize::try_from((next - first).num_days()).map_err(|_| invalid())?;
    Ok((first.format("%Y-%m").to_string(), days))
}

fn week_range(first_day: &str) -> Result<DateFilter, RequestError> {
    let invalid = || RequestError::InvalidReferenceDate {
        date: first_day.to_string(),
        expected: "YYYY-MM-DD",
    };

    let start = NaiveDate::parse_from_str(first_day, "%Y-%m-%d").map_err(|_| invalid())?;
    let last = start.checked_add_days(Days::new(6)).ok_or_else(invalid)?;
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).ok_or_else(invalid)?;

    Ok(DateFilter::Range {
        start: start.and_time(NaiveTime::MIN),
        end: last.and_time(end_of_day),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_GRANULARITIES: [Granularity; 4] = [
        Granularity::Year,
        Granularity::Month,
        Granularity::Week,
        Granularity::Day,
    ];
    const ALL_KINDS: [AggregationKind; 3] = [
        AggregationKind::Maximum,
        AggregationKind::Average,
        AggregationKind::Minimum,
    ];

    fn reference_for(granularity: Granularity) -> &'static str {
        match granularity {
            Granularity::Year => "2020",
            Granularity::Month => "2020-01",
            Granularity::Week => "2020-01-06",
            Granularity::Day => "2020-01-06",
        }
    }

    // --- Bucket counts ------------------------------------------------------

    #[test]
    fn test_bucket_count_matches_granularity_for_every_kind() {
        for granularity in ALL_GRANULARITIES {
            for kind in ALL_KINDS {
                let plan = plan(granularity, kind, reference_for(granularity))
                    .expect("reference date should be valid");
                let expected = match granularity {
                    Granularity::Year => 12,
                    Granularity::Month => 31,
                    Granularity::Week => 7,
                    Granularity::Day => 24,
                };
                assert_eq!(plan.bucket_count, expected, "{:?}/{:?}", granularity, kind);
            }
        }
    }

    #[test]
    fn test_month_bucket_count_follows_calendar() {
        let count = |date| plan(Granularity::Month, AggregationKind::Average, date).unwrap().bucket_count;
        assert_eq!(count("2020-02"), 29, "2020 is a leap year");
        assert_eq!(count("2021-02"), 28);
        assert_eq!(count("2021-04"), 30);
        assert_eq!(count("2021-12"), 31);
    }

    #[test]
    fn test_month_prefix_is_zero_padded() {
        let january = plan(Granularity::Month, AggregationKind::Maximum, "2020-1").unwrap();
        assert_eq!(january.filter, DateFilter::Prefix("2020-01".to_string()));
        assert_eq!(january.bucket_count, 31);

        let october = plan(Granularity::Month, AggregationKind::Maximum, "2020-10").unwrap();
        assert_eq!(october.filter, DateFilter::Prefix("2020-10".to_string()));
    }

    #[test]
    fn test_month_rejects_unparseable_reference() {
        let result = plan(Granularity::Month, AggregationKind::Maximum, "2020-13");
        assert!(matches!(result, Err(RequestError::InvalidReferenceDate { .. })));
    }

    // --- Filters ------------------------------------------------------------

    #[test]
    fn test_week_filter_is_closed_range_ending_six_days_later() {
        let plan = plan(Granularity::Week, AggregationKind::Minimum, "2020-01-06").unwrap();
        let start = NaiveDate::from_ymd_opt(2020, 1, 6).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let end = NaiveDate::from_ymd_opt(2020, 1, 12).unwrap().and_hms_opt(23, 59, 59).unwrap();
        assert_eq!(plan.filter, DateFilter::Range { start, end });
    }

    #[test]
    fn test_week_range_crosses_month_boundary() {
        let plan = plan(Granularity::Week, AggregationKind::Average, "2020-02-27").unwrap();
        match plan.filter {
            DateFilter::Range { end, .. } => {
                assert_eq!(end.date(), NaiveDate::from_ymd_opt(2020, 3, 4).unwrap());
            }
            other => panic!("expected a range filter, got {:?}", other),
        }
    }

    #[test]
    fn test_prefix_filters_keep_reference_date() {
        let year = plan(Granularity::Year, AggregationKind::Maximum, "2020").unwrap();
        assert_eq!(year.filter, DateFilter::Prefix("2020".to_string()));

        let day = plan(Granularity::Day, AggregationKind::Maximum, "2020-01-06").unwrap();
        assert_eq!(day.filter, DateFilter::Prefix("2020-01-06".to_string()));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(DateFilter::like_pattern("2020-01"), "2020-01%");
        assert_eq!(DateFilter::like_pattern("20%"), "20\\%%");
        assert_eq!(DateFilter::like_pattern("2020_"), "2020\\_%");
    }

    // --- Statements ---------------------------------------------------------

    #[test]
    fn test_statement_uses_requested_reduction() {
        for granularity in ALL_GRANULARITIES {
            assert!(query_for(granularity, AggregationKind::Maximum).contains("MAX(temperature)"));
            assert!(query_for(granularity, AggregationKind::Average).contains("AVG(pression)"));
            assert!(query_for(granularity, AggregationKind::Minimum).contains("MIN(humidite)"));
        }
    }

    #[test]
    fn test_only_week_uses_range_parameters() {
        for granularity in ALL_GRANULARITIES {
            let sql = query_for(granularity, AggregationKind::Average);
            assert!(sql.contains("id_immeuble = $1"));
            assert!(sql.ends_with("GROUP BY pos ORDER BY pos ASC"));
            assert_eq!(sql.contains("$3"), granularity == Granularity::Week, "{}", sql);
        }
        assert!(query_for(Granularity::Week, AggregationKind::Maximum).contains("ISODOW"));
    }

    #[test]
    fn test_prefix_filters_format_timestamp_explicitly() {
        // The ::TEXT cast follows the session DateStyle; to_char does not
        for granularity in [Granularity::Year, Granularity::Month, Granularity::Day] {
            let sql = query_for(granularity, AggregationKind::Minimum);
            assert!(sql.contains("to_char(date_mesure, 'YYYY-MM-DD HH24:MI:SS') LIKE $2"), "{}", sql);
            assert!(!sql.contains("::TEXT"), "{}", sql);
        }
    }

    // --- Parsing ------------------------------------------------------------

    #[test]
    fn test_plan_request_parses_original_vocabulary() {
        let plan = plan_request("semaine", "moy", "2020-01-06").unwrap();
        assert_eq!(plan.granularity, Granularity::Week);
        assert_eq!(plan.kind, AggregationKind::Average);
    }

    #[test]
    fn test_unknown_period_or_type_is_rejected() {
        assert_eq!(
            plan_request("decennie", "max", "2020"),
            Err(RequestError::UnknownGranularity("decennie".to_string()))
        );
        assert_eq!(
            plan_request("annee", "median", "2020"),
            Err(RequestError::UnknownAggregation("median".to_string()))
        );
    }
}
