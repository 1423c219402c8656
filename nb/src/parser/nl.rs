//! Natural-language due-time parsing
//!
//! Turns "remind me to water the plants tomorrow at 9am" into a description
//! plus a concrete due time. The grammar is deliberately small: relative
//! offsets ("in 20 minutes"), "tomorrow", "today at", "tonight" and bare
//! "at HH:MM" (next occurrence). Times are interpreted in UTC.

use std::sync::LazyLock;

use chrono::{DateTime, Days, Duration, NaiveDate, Utc};
use regex::Regex;
use thiserror::Error;

/// A successfully parsed task draft
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTask {
    pub description: String,
    pub due_at: DateTime<Utc>,
}

/// Why a message could not become a task
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("message is empty")]
    Empty,

    #[error("no due time found in message")]
    NoDueTime,

    #[error("nothing left to be reminded about once the time was removed")]
    NoDescription,

    #[error("invalid time: {0}")]
    InvalidTime(String),
}

static IN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bin\s+(\d{1,3})\s*(minutes?|mins?|min|m|hours?|hrs?|hr|h|days?|d)\b").expect("valid regex")
});

static TOMORROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\btomorrow(?:\s+at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?)?\b").expect("valid regex")
});

static TODAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\btoday\s+at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\b").expect("valid regex"));

static TONIGHT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\btonight\b").expect("valid regex"));

static AT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bat\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\b").expect("valid regex"));

static LEAD_IN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(please\s+)?(remind\s+me\s+(to\s+|about\s+)?|remember\s+(to\s+)?)").expect("valid regex")
});

/// Default hour for day-granular phrases ("tomorrow")
const DEFAULT_HOUR: u32 = 9;

/// Hour used for "tonight"
const TONIGHT_HOUR: u32 = 20;

/// Parse a message into a task draft
pub fn parse_task(text: &str, now: DateTime<Utc>) -> Result<ParsedTask, ParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let (range, due_at) = extract_due(text, now)?;

    let mut description = String::with_capacity(text.len());
    description.push_str(&text[..range.start]);
    description.push_str(&text[range.end..]);
    let description = tidy_description(&description);

    if description.is_empty() {
        return Err(ParseError::NoDescription);
    }

    Ok(ParsedTask { description, due_at })
}

fn extract_due(text: &str, now: DateTime<Utc>) -> Result<(std::ops::Range<usize>, DateTime<Utc>), ParseError> {
    if let Some(caps) = IN_RE.captures(text) {
        let whole = caps.get(0).expect("group 0 always present");
        let amount: i64 = caps[1].parse().map_err(|_| ParseError::InvalidTime(caps[1].to_string()))?;
        let unit = caps[2].to_lowercase();
        let delta = if unit.starts_with('h') {
            Duration::hours(amount)
        } else if unit.starts_with('d') {
            Duration::days(amount)
        } else {
            Duration::minutes(amount)
        };
        return Ok((whole.range(), now + delta));
    }

    if let Some(caps) = TOMORROW_RE.captures(text) {
        let whole = caps.get(0).expect("group 0 always present");
        let (hour, minute) = match caps.get(1) {
            Some(_) => clock_time(&caps)?,
            None => (DEFAULT_HOUR, 0),
        };
        let date = now.date_naive() + Days::new(1);
        return Ok((whole.range(), at_time(date, hour, minute)?));
    }

    if let Some(caps) = TODAY_RE.captures(text) {
        let whole = caps.get(0).expect("group 0 always present");
        let (hour, minute) = clock_time(&caps)?;
        return Ok((whole.range(), at_time(now.date_naive(), hour, minute)?));
    }

    if let Some(m) = TONIGHT_RE.find(text) {
        return Ok((m.range(), at_time(now.date_naive(), TONIGHT_HOUR, 0)?));
    }

    if let Some(caps) = AT_RE.captures(text) {
        let whole = caps.get(0).expect("group 0 always present");
        let (hour, minute) = clock_time(&caps)?;
        // next occurrence: today if still ahead, otherwise tomorrow
        let mut due = at_time(now.date_naive(), hour, minute)?;
        if due <= now {
            due = at_time(now.date_naive() + Days::new(1), hour, minute)?;
        }
        return Ok((whole.range(), due));
    }

    Err(ParseError::NoDueTime)
}

/// Extract (hour, minute) from capture groups 1-3, applying am/pm
fn clock_time(caps: &regex::Captures<'_>) -> Result<(u32, u32), ParseError> {
    let raw_hour: u32 = caps[1].parse().map_err(|_| ParseError::InvalidTime(caps[1].to_string()))?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().map_err(|_| ParseError::InvalidTime(m.as_str().to_string()))?,
        None => 0,
    };
    let meridiem = caps.get(3).map(|m| m.as_str().to_lowercase());

    let hour = match meridiem.as_deref() {
        Some("pm") if raw_hour < 12 => raw_hour + 12,
        Some("am") if raw_hour == 12 => 0,
        Some(_) if raw_hour > 12 => {
            return Err(ParseError::InvalidTime(format!("{raw_hour} with am/pm")));
        }
        _ => raw_hour,
    };

    if hour > 23 || minute > 59 {
        return Err(ParseError::InvalidTime(format!("{hour}:{minute:02}")));
    }
    Ok((hour, minute))
}

fn at_time(date: NaiveDate, hour: u32, minute: u32) -> Result<DateTime<Utc>, ParseError> {
    date.and_hms_opt(hour, minute, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ParseError::InvalidTime(format!("{hour}:{minute:02}")))
}

fn tidy_description(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let stripped = LEAD_IN_RE.replace(&collapsed, "");
    stripped.trim_matches([' ', ',', '.', '!']).to_string()
}
