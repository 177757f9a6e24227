//! # Scheduled Announcements
//!
//! Recurring, timezone-aware messages such as a weekly net reminder.
//!
//! ## Rule format
//!
//! A rule is five `;`-separated fields:
//!
//! ```text
//! Days;HH:MM;Timezone;Channel;Message
//! Monday,Wed;18:45;America/Los_Angeles;1;Net starts in 15 minutes
//! ```
//!
//! - days are full names or three-letter abbreviations, any case
//! - the timezone is an IANA zone name, resolved with `chrono-tz`
//! - the message is everything after the fourth `;`
//!
//! Several rules in one string are separated by `;;;` or by newlines.
//! Rules can also be written as `[[schedule.rules]]` tables in the config
//! file. Every rule is validated when the service starts; a bad rule stops
//! startup instead of being skipped.
//!
//! Firing state lives only in memory. A restart inside a rule's due window
//! can send that rule's message a second time.

pub mod scheduler;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use thiserror::Error;

use crate::logutil::preview;

pub use scheduler::{spawn_scheduler, Announcement, Scheduler};

/// Separator between rules in a single definition string.
pub const RULE_SEPARATOR: &str = ";;;";
const PREVIEW_CHARS: usize = 30;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("expected 5 fields (Days;HH:MM;Timezone;Channel;Message), got {found}: {rule}")]
    FieldCount { found: usize, rule: String },
    #[error("rule has no days")]
    NoDays,
    #[error("invalid day name '{0}'")]
    InvalidDay(String),
    #[error("invalid time '{0}', expected HH:MM")]
    InvalidTime(String),
    #[error("unknown timezone '{0}'")]
    InvalidTimezone(String),
    #[error("invalid channel index '{0}': must be a non-negative integer")]
    InvalidChannel(String),
    #[error("rule message is empty")]
    EmptyMessage,
}

/// One recurring announcement plus the local date it last fired on.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledRule {
    pub days: Vec<Weekday>,
    pub hour: u32,
    pub minute: u32,
    pub timezone: Tz,
    pub channel: u32,
    pub message: String,
    last_fired: Option<NaiveDate>,
}

impl ScheduledRule {
    /// Build a rule from already separated fields.
    pub fn from_parts<S: AsRef<str>>(
        days: &[S],
        time: &str,
        timezone: &str,
        channel: u32,
        message: &str,
    ) -> Result<Self, ScheduleError> {
        let mut parsed = Vec::with_capacity(days.len());
        for day in days {
            let day = day.as_ref().trim();
            if day.is_empty() {
                continue;
            }
            let weekday = parse_day(day)?;
            if !parsed.contains(&weekday) {
                parsed.push(weekday);
            }
        }
        if parsed.is_empty() {
            return Err(ScheduleError::NoDays);
        }
        parsed.sort_by_key(|d| d.num_days_from_monday());

        let (hour, minute) = parse_time(time)?;
        let timezone = timezone
            .trim()
            .parse::<Tz>()
            .map_err(|_| ScheduleError::InvalidTimezone(timezone.trim().to_string()))?;
        let message = message.trim();
        if message.is_empty() {
            return Err(ScheduleError::EmptyMessage);
        }

        Ok(Self {
            days: parsed,
            hour,
            minute,
            timezone,
            channel,
            message: message.to_string(),
            last_fired: None,
        })
    }

    pub fn last_fired(&self) -> Option<NaiveDate> {
        self.last_fired
    }

    pub fn mark_fired(&mut self, date: NaiveDate) {
        self.last_fired = Some(date);
    }

    /// Local date to fire for, when the rule is due at `now`.
    ///
    /// Due means: today (in the rule's zone) is one of the rule's days, the
    /// target time passed no more than `window` ago, and the rule has not
    /// fired today. A target time skipped by a DST jump never comes due.
    pub fn due_date(&self, now: DateTime<Utc>, window: Duration) -> Option<NaiveDate> {
        let local = now.with_timezone(&self.timezone);
        let today = local.date_naive();
        if self.last_fired == Some(today) || !self.days.contains(&local.weekday()) {
            return None;
        }
        let target = today.and_hms_opt(self.hour, self.minute, 0)?;
        let target = self.timezone.from_local_datetime(&target).earliest()?;
        let elapsed = now.signed_duration_since(target);
        (elapsed >= Duration::zero() && elapsed <= window).then_some(today)
    }

    pub fn time_label(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }

    pub fn days_label(&self) -> String {
        self.days
            .iter()
            .map(|d| day_name(*d))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// One-line description used by `?reminders`.
    pub fn summary(&self) -> String {
        format!(
            "{} at {} ({}) on channel {}: {}",
            self.days_label(),
            self.time_label(),
            self.timezone.name(),
            self.channel,
            preview(&self.message, PREVIEW_CHARS)
        )
    }
}

impl FromStr for ScheduledRule {
    type Err = ScheduleError;

    fn from_str(rule: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = rule.trim().splitn(5, ';').collect();
        if fields.len() != 5 {
            return Err(ScheduleError::FieldCount {
                found: fields.len(),
                rule: rule.trim().to_string(),
            });
        }
        let channel = fields[3]
            .trim()
            .parse::<u32>()
            .map_err(|_| ScheduleError::InvalidChannel(fields[3].trim().to_string()))?;
        let days: Vec<&str> = fields[0].split(',').collect();
        Self::from_parts(&days, fields[1], fields[2], channel, fields[4])
    }
}

impl fmt::Display for ScheduledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {} ({}) ch={}",
            self.days_label(),
            self.time_label(),
            self.timezone.name(),
            self.channel
        )
    }
}

/// Parse every rule in `definitions`. Blank input yields no rules; any bad
/// rule fails the whole set.
pub fn parse_rules(definitions: &str) -> Result<Vec<ScheduledRule>, ScheduleError> {
    let pieces: Vec<&str> = if definitions.contains(RULE_SEPARATOR) {
        definitions.split(RULE_SEPARATOR).collect()
    } else {
        definitions.lines().collect()
    };
    pieces
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::parse)
        .collect()
}

fn parse_day(day: &str) -> Result<Weekday, ScheduleError> {
    let weekday = match day.to_ascii_lowercase().as_str() {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return Err(ScheduleError::InvalidDay(day.to_string())),
    };
    Ok(weekday)
}

fn parse_time(time: &str) -> Result<(u32, u32), ScheduleError> {
    let invalid = || ScheduleError::InvalidTime(time.trim().to_string());
    let (hour, minute) = time.trim().split_once(':').ok_or_else(invalid)?;
    let hour: u32 = hour.trim().parse().map_err(|_| invalid())?;
    let minute: u32 = minute.trim().parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

fn day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn la(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        chrono_tz::America::Los_Angeles
            .with_ymd_and_hms(y, m, d, h, min, s)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn parses_full_rule() {
        let rule: ScheduledRule = "Monday,wed;18:45;America/Los_Angeles;1;Net reminder"
            .parse()
            .unwrap();
        assert_eq!(rule.days, vec![Weekday::Mon, Weekday::Wed]);
        assert_eq!((rule.hour, rule.minute), (18, 45));
        assert_eq!(rule.timezone, chrono_tz::America::Los_Angeles);
        assert_eq!(rule.channel, 1);
        assert_eq!(rule.message, "Net reminder");
        assert_eq!(rule.last_fired(), None);
    }

    #[test]
    fn message_keeps_semicolons() {
        let rule: ScheduledRule = "Fri;07:00;UTC;2;Coffee; then net".parse().unwrap();
        assert_eq!(rule.message, "Coffee; then net");
    }

    #[test]
    fn rejects_malformed_rules() {
        assert!(matches!(
            "Mon;18:45;UTC;1".parse::<ScheduledRule>(),
            Err(ScheduleError::FieldCount { found: 4, .. })
        ));
        assert_eq!(
            "Funday;18:45;UTC;1;x".parse::<ScheduledRule>(),
            Err(ScheduleError::InvalidDay("Funday".into()))
        );
        assert_eq!(
            "Mon;24:00;UTC;1;x".parse::<ScheduledRule>(),
            Err(ScheduleError::InvalidTime("24:00".into()))
        );
        assert_eq!(
            "Mon;18:45;Mars/Olympus;1;x".parse::<ScheduledRule>(),
            Err(ScheduleError::InvalidTimezone("Mars/Olympus".into()))
        );
        assert_eq!(
            "Mon;18:45;UTC;-1;x".parse::<ScheduledRule>(),
            Err(ScheduleError::InvalidChannel("-1".into()))
        );
        assert_eq!(
            "Mon;18:45;UTC;1;   ".parse::<ScheduledRule>(),
            Err(ScheduleError::EmptyMessage)
        );
        assert_eq!(
            " ;18:45;UTC;1;x".parse::<ScheduledRule>(),
            Err(ScheduleError::NoDays)
        );
    }

    #[test]
    fn parse_rules_splits_on_separator_or_newlines() {
        let rules = parse_rules("Mon;09:00;UTC;1;one;;;Tue;10:00;UTC;2;two").unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].message, "two");

        let rules = parse_rules("Mon;09:00;UTC;1;one\n\nSun;10:00;UTC;0;two\n").unwrap();
        assert_eq!(rules.len(), 2);

        assert!(parse_rules("   ").unwrap().is_empty());
        assert!(parse_rules("Mon;09:00;UTC;1;ok;;;broken").is_err());
    }

    #[test]
    fn due_within_window_once_per_day() {
        let mut rule: ScheduledRule = "Monday;18:45;America/Los_Angeles;1;Net reminder"
            .parse()
            .unwrap();
        let window = Duration::seconds(30);
        // 2024-03-04 is a Monday
        assert_eq!(rule.due_date(la(2024, 3, 4, 18, 44, 50), window), None);
        let date = rule.due_date(la(2024, 3, 4, 18, 45, 10), window).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        rule.mark_fired(date);
        assert_eq!(rule.due_date(la(2024, 3, 4, 18, 45, 20), window), None);
        // too late, window missed
        let fresh: ScheduledRule = "Monday;18:45;America/Los_Angeles;1;x".parse().unwrap();
        assert_eq!(fresh.due_date(la(2024, 3, 4, 18, 46, 0), window), None);
        // wrong weekday
        assert_eq!(fresh.due_date(la(2024, 3, 5, 18, 45, 10), window), None);
        // following Monday fires again
        assert!(rule.due_date(la(2024, 3, 11, 18, 45, 10), window).is_some());
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let rule: ScheduledRule = "Mon;18:45;UTC;1;x".parse().unwrap();
        let target = Utc.with_ymd_and_hms(2024, 3, 4, 18, 45, 0).unwrap();
        let window = Duration::seconds(30);
        assert!(rule.due_date(target, window).is_some());
        assert!(rule.due_date(target + window, window).is_some());
        assert!(rule
            .due_date(target + window + Duration::seconds(1), window)
            .is_none());
    }

    #[test]
    fn spring_forward_gap_is_missed() {
        // 2024-03-10 02:30 does not exist in Los Angeles
        let rule: ScheduledRule = "Sun;02:30;America/Los_Angeles;1;x".parse().unwrap();
        let window = Duration::seconds(30);
        let mut t = Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        while t < end {
            assert!(rule.due_date(t, window).is_none());
            t += window;
        }
    }

    #[test]
    fn summary_lists_days_time_zone_and_preview() {
        let rule: ScheduledRule =
            "sun,Mon;9:05;Europe/London;2;Weekly net on the repeater, all welcome"
                .parse()
                .unwrap();
        assert_eq!(
            rule.summary(),
            "Monday, Sunday at 09:05 (Europe/London) on channel 2: Weekly net on the repeater, al..."
        );
    }
}
