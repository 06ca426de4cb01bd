//! Filename timestamp parsing

use super::{Candidate, TimeSource};
use chrono::{Datelike, FixedOffset, Month, NaiveDateTime, TimeZone, Utc};
use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::trace;

/// Oldest year accepted from a generic filename match
pub const MIN_PLAUSIBLE_YEAR: i32 = 1990;

/// Pattern: PXL_YYYYMMDD_HHmmss (Google Pixel, encodes UTC)
static PATTERN_PIXEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"PXL_(?P<y>\d{4})(?P<m>\d{2})(?P<d>\d{2})_(?P<H>\d{2})(?P<M>\d{2})(?P<S>\d{2})")
        .unwrap()
});

/// Pattern: YYYY-MM-DDTHH:mm:ss followed by Z or a numeric offset
static PATTERN_ISO_OFFSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|\D)(?P<y>\d{4})-(?P<m>\d{2})-(?P<d>\d{2})[T _](?P<H>\d{2})[:\-.]?(?P<M>\d{2})[:\-.]?(?P<S>\d{2})(?:[.,]\d+)?(?P<tz>Z|[+\-]\d{2}:?\d{2})",
    )
    .unwrap()
});

/// Pattern: YYYY-MM-DD_HH-mm-ss and screenshot variants ("2024-01-15 at 14.30.00")
static PATTERN_SEPARATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|\D)(?P<y>\d{4})[-_.](?P<m>\d{2})[-_.](?P<d>\d{2})[-_\sT]+(?:at[-_\s]+)?(?P<H>\d{1,2})[-_.:](?P<M>\d{2})[-_.:](?P<S>\d{2})",
    )
    .unwrap()
});

/// Pattern: YYYYMMDD_HHmmss, YYYYMMDD-HHmmss or YYYYMMDDHHmmss
static PATTERN_COMPACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|\D)(?P<y>\d{4})(?P<m>\d{2})(?P<d>\d{2})[_\-T]?(?P<H>\d{2})(?P<M>\d{2})(?P<S>\d{2})",
    )
    .unwrap()
});

/// Pattern: YYYY-MM-DD only, month and day may be unpadded (2024-1-5)
static PATTERN_DATE_SEPARATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\D)(?P<y>\d{4})[-_.](?P<m>\d{1,2})[-_.](?P<d>\d{1,2})(?:\D|$)").unwrap()
});

/// Pattern: YYYYMMDD only (also covers WhatsApp IMG-YYYYMMDD-WAxxxx)
static PATTERN_DATE_COMPACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\D)(?P<y>\d{4})(?P<m>\d{2})(?P<d>\d{2})(?:\D|$)").unwrap()
});

/// Pattern: 15 Jan 2024, 15-January-2024
static PATTERN_DAY_MONTH_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|[^0-9])(?P<d>\d{1,2})(?:st|nd|rd|th)?[\s_\-.]*(?P<b>[A-Za-z]{3,9})\.?[\s_\-.,]+(?P<y>\d{4})(?:\D|$)",
    )
    .unwrap()
});

/// Pattern: Jan 15 2024, January 15th, 2024
static PATTERN_MONTH_NAME_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|[^A-Za-z])(?P<b>[A-Za-z]{3,9})\.?[\s_\-.]+(?P<d>\d{1,2})(?:st|nd|rd|th)?,?[\s_\-.]+(?P<y>\d{4})(?:\D|$)",
    )
    .unwrap()
});

/// Generic patterns, tried in order until one yields a plausible date
static GENERIC_PATTERNS: &[(&str, &LazyLock<Regex>)] = &[
    ("iso-offset", &PATTERN_ISO_OFFSET),
    ("separated", &PATTERN_SEPARATED),
    ("compact", &PATTERN_COMPACT),
    ("date-separated", &PATTERN_DATE_SEPARATED),
    ("date-compact", &PATTERN_DATE_COMPACT),
    ("day-month-name", &PATTERN_DAY_MONTH_NAME),
    ("month-name-day", &PATTERN_MONTH_NAME_DAY),
];

/// Parse a timestamp candidate from a filename.
///
/// Generic matches must fall within `[1990, current year + 1]`.
pub fn parse_filename_date(filename: &str) -> Option<Candidate> {
    parse_filename_date_with_ceiling(filename, Utc::now().year() + 1)
}

/// Same as [`parse_filename_date`] with an explicit latest plausible year
pub fn parse_filename_date_with_ceiling(filename: &str, max_year: i32) -> Option<Candidate> {
    let name = strip_extension(filename);

    if let Some(naive) = try_pattern_pixel(name) {
        trace!(filename, "Matched Pixel pattern");
        return Some(Candidate::utc(naive, TimeSource::Filename));
    }

    for (pattern_name, regex) in GENERIC_PATTERNS {
        for caps in regex.captures_iter(name) {
            let Some(naive) = datetime_from_captures(&caps) else {
                continue;
            };
            if !(MIN_PLAUSIBLE_YEAR..=max_year).contains(&naive.year()) {
                trace!(filename, pattern = pattern_name, year = naive.year(), "Rejected implausible year");
                continue;
            }

            let Some(tz) = caps.name("tz") else {
                trace!(filename, pattern = pattern_name, "Matched generic pattern");
                return Some(Candidate::local(naive, TimeSource::Filename));
            };
            let Some(datetime) = parse_offset(tz.as_str())
                .and_then(|offset| offset.from_local_datetime(&naive).single())
            else {
                trace!(filename, offset = tz.as_str(), "Rejected unusable offset");
                continue;
            };
            trace!(filename, pattern = pattern_name, "Matched generic pattern with offset");
            return Some(Candidate::offset(datetime, TimeSource::Filename));
        }
    }

    None
}

fn strip_extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    }
}

fn try_pattern_pixel(s: &str) -> Option<NaiveDateTime> {
    let caps = PATTERN_PIXEL.captures(s)?;
    datetime_from_captures(&caps)
}

fn datetime_from_captures(caps: &Captures<'_>) -> Option<NaiveDateTime> {
    let field = |name: &str| caps.name(name).map_or("00", |m| m.as_str());
    let month = match (caps.name("m"), caps.name("b")) {
        (Some(m), _) => m.as_str().to_string(),
        // Month names ("Jan", "january") go through chrono's parser
        (None, Some(b)) => b.as_str().parse::<Month>().ok()?.number_from_month().to_string(),
        (None, None) => return None,
    };
    build_datetime(
        caps.name("y")?.as_str(),
        &month,
        caps.name("d")?.as_str(),
        field("H"),
        field("M"),
        field("S"),
    )
}

fn build_datetime(
    year: &str,
    month: &str,
    day: &str,
    hour: &str,
    minute: &str,
    second: &str,
) -> Option<NaiveDateTime> {
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    let second: u32 = second.parse().ok()?;

    chrono::NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

/// Parse "Z", "+09:00", "-05:00", "+0900" or "-0500"
fn parse_offset(s: &str) -> Option<FixedOffset> {
    if s == "Z" {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match s.split_at_checked(1)? {
        ("+", rest) => (1, rest),
        ("-", rest) => (-1, rest),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 4 {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
