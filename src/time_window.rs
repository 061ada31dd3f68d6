use chrono::{DateTime, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

// Local clock helpers for user timezones. A timezone that does not parse
// yields `None`, and every hour check treats `None` as "not now".

pub fn parse_timezone(timezone: &str) -> Option<Tz> {
    timezone.trim().parse::<Tz>().ok()
}

pub fn local_hour_at(timezone: &str, now: DateTime<Utc>) -> Option<u32> {
    let tz = parse_timezone(timezone)?;
    Some(now.with_timezone(&tz).hour())
}

pub fn current_local_hour(timezone: &str) -> Option<u32> {
    local_hour_at(timezone, Utc::now())
}

pub fn local_date_at(timezone: &str, now: DateTime<Utc>) -> Option<NaiveDate> {
    let tz = parse_timezone(timezone)?;
    Some(now.with_timezone(&tz).date_naive())
}

/// Today's date in `timezone`, rendered `YYYY-MM-DD` by its `Display` impl.
pub fn current_local_date(timezone: &str) -> Option<NaiveDate> {
    local_date_at(timezone, Utc::now())
}

/// UTC instant at which the current local day began in `timezone`.
pub fn start_of_local_day(timezone: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let tz = parse_timezone(timezone)?;
    let date = now.with_timezone(&tz).date_naive();

    // Some zones skip midnight on DST days, so take the first hour that exists.
    (0..3).find_map(|hour| {
        let naive = date.and_hms_opt(hour, 0, 0)?;
        tz.from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// Process-wide hours during which notifications may be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationWindow {
    pub min_hour: u32,
    pub max_hour: u32,
}

impl Default for NotificationWindow {
    fn default() -> Self {
        Self {
            min_hour: 9,
            max_hour: 20,
        }
    }
}

impl NotificationWindow {
    pub fn new(min_hour: u32, max_hour: u32) -> Self {
        Self { min_hour, max_hour }
    }

    /// Half-open: `max_hour` itself is outside the window.
    pub fn contains(&self, hour: u32) -> bool {
        hour >= self.min_hour && hour < self.max_hour
    }

    pub fn admits(&self, hour: Option<u32>) -> bool {
        hour.map(|h| self.contains(h)).unwrap_or(false)
    }
}

/// The daily rollover of game content, pinned to one reference timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyReset {
    pub timezone: Tz,
    pub hour: u32,
}

impl DailyReset {
    pub fn new(timezone: Tz, hour: u32) -> Self {
        Self { timezone, hour }
    }

    pub fn hours_until_at(&self, now: DateTime<Utc>) -> u32 {
        let current = now.with_timezone(&self.timezone).hour();
        hours_until_reset(current, self.hour)
    }

    pub fn hours_until(&self) -> u32 {
        self.hours_until_at(Utc::now())
    }
}

pub fn hours_until_reset(current_hour: u32, reset_hour: u32) -> u32 {
    if current_hour >= reset_hour {
        24 - current_hour + reset_hour
    } else {
        reset_hour - current_hour
    }
}
