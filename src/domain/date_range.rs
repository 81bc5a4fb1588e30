// Date window used to query monitor entries
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Timezone the dashboard reports days and chart axes in.
pub const DISPLAY_TZ: Tz = chrono_tz::America::Los_Angeles;

const DEFAULT_DAYS: i64 = 3;
const QUERY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Whole days from the start of `start`'s day to the end of `end`'s day.
    /// A reversed pair is swapped.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        Self {
            start: start_of_day(start),
            end: end_of_day(end),
        }
    }

    /// The last `days` days up to the end of `now`'s day.
    pub fn last_days(now: DateTime<Utc>, days: i64) -> Self {
        Self::new(now - Duration::days(days), now)
    }

    /// Whole calendar days in the display timezone.
    pub fn from_local_dates(start: NaiveDate, end: NaiveDate) -> Self {
        let midday = |day: NaiveDate| {
            let noon = day.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN));
            DISPLAY_TZ
                .from_local_datetime(&noon)
                .earliest()
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(|| noon.and_utc())
        };
        Self::new(midday(start), midday(end))
    }

    pub fn start_param(&self) -> String {
        format_query_date(self.start)
    }

    pub fn end_param(&self) -> String {
        format_query_date(self.end)
    }
}

impl Default for DateRange {
    fn default() -> Self {
        Self::last_days(Utc::now(), DEFAULT_DAYS)
    }
}

/// UTC `YYYY-MM-DD HH:mm:ss`, as the entries endpoint expects.
pub fn format_query_date(date: DateTime<Utc>) -> String {
    date.format(QUERY_FORMAT).to_string()
}

fn at_local_time(date: DateTime<Utc>, time: NaiveTime) -> DateTime<Utc> {
    let local_day = date.with_timezone(&DISPLAY_TZ).date_naive();
    DISPLAY_TZ
        .from_local_datetime(&local_day.and_time(time))
        .earliest()
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or(date)
}

fn start_of_day(date: DateTime<Utc>) -> DateTime<Utc> {
    at_local_time(date, NaiveTime::MIN)
}

fn end_of_day(date: DateTime<Utc>) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    at_local_time(date, time)
}
