//! Query plans for time-bucketed aggregation.
//!
//! A `BucketPlan` describes the bucket width, the trailing window and the
//! result order. SQL fragments come only from the enum variants below; the
//! city and the window cutoff are always bound as parameters.

use chrono::{DateTime, Duration, Utc};

/// Calendar truncation applied to observation timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketWidth {
    Hour,
    Day,
}

impl BucketWidth {
    /// `strftime` format truncating a stored UTC timestamp to the bucket start.
    pub(crate) fn strftime_format(self) -> &'static str {
        match self {
            Self::Hour => "%Y-%m-%dT%H:00:00Z",
            Self::Day => "%Y-%m-%dT00:00:00Z",
        }
    }
}

/// Order of the returned buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketOrder {
    NewestFirst,
    OldestFirst,
}

impl BucketOrder {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            Self::NewestFirst => "DESC",
            Self::OldestFirst => "ASC",
        }
    }
}

/// Parameterized description of a grouped aggregation over a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketPlan {
    pub width: BucketWidth,
    pub window: Duration,
    pub order: BucketOrder,
}

impl BucketPlan {
    /// Hourly buckets over the trailing 24 hours, most recent first.
    pub fn hourly_last_day() -> Self {
        Self {
            width: BucketWidth::Hour,
            window: Duration::hours(24),
            order: BucketOrder::NewestFirst,
        }
    }

    /// Daily buckets over the trailing `days` days, oldest first.
    pub fn daily_trailing(days: u32) -> Self {
        Self {
            width: BucketWidth::Day,
            window: Duration::days(i64::from(days)),
            order: BucketOrder::OldestFirst,
        }
    }

    /// Earliest timestamp included in the window.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }

    /// Build the grouped aggregation statement.
    ///
    /// Selected columns: bucket, avg/min/max temperature, avg humidity, count.
    /// Parameters: `?1` city, `?2` cutoff timestamp.
    pub(crate) fn sql(&self) -> String {
        format!(
            "SELECT strftime('{fmt}', timestamp) AS bucket,
                    AVG(temperature), MIN(temperature), MAX(temperature),
                    AVG(humidity), COUNT(*)
             FROM weather_data
             WHERE city = ?1 AND timestamp >= ?2
             GROUP BY bucket
             ORDER BY bucket {order}",
            fmt = self.width.strftime_format(),
            order = self.order.sql(),
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_hourly_plan() {
        let plan = BucketPlan::hourly_last_day();
        assert_eq!(plan.width, BucketWidth::Hour);
        assert_eq!(plan.order, BucketOrder::NewestFirst);

        let now = Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap();
        assert_eq!(plan.cutoff(now), Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_daily_plan_sql() {
        let plan = BucketPlan::daily_trailing(7);
        assert_eq!(plan.window, Duration::days(7));

        let sql = plan.sql();
        assert!(sql.contains("%Y-%m-%dT00:00:00Z"));
        assert!(sql.contains("ORDER BY bucket ASC"));
        assert!(sql.contains("city = ?1"));
    }
}
