//! Capture time resolution
//!
//! This module decides the creation timestamp reported for every uploaded
//! media file. Candidates come from:
//! - Vendor and generic filename patterns
//! - Embedded EXIF metadata
//! - The chat message post time
//!
//! Whatever the source, the canonical result is a zone-less wall-clock value
//! in the configured local zone.

pub mod exif;
pub mod filename;
pub mod resolve;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use std::fmt;

pub use resolve::{MediaContext, ResolutionPolicy};

/// Source of a timestamp candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeSource {
    /// Parsed from the attachment filename
    Filename,
    /// Read from embedded EXIF metadata
    EmbeddedMetadata,
    /// Taken from the chat message delivery time
    PostTime,
}

impl TimeSource {
    /// Provenance label shown to users
    pub fn label(&self) -> &'static str {
        match self {
            TimeSource::Filename => "filename",
            TimeSource::EmbeddedMetadata => "embedded-metadata",
            TimeSource::PostTime => "post-time",
        }
    }
}

impl fmt::Display for TimeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a candidate instant relates to a time zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZonedInstant {
    /// Known to be UTC (Pixel filenames, chat post times)
    Utc(DateTime<Utc>),
    /// Carried an explicit offset in its source text
    Offset(DateTime<FixedOffset>),
    /// Bare wall-clock value assumed to already be device-local
    Local(NaiveDateTime),
}

/// A timestamp produced by one source, before normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub instant: ZonedInstant,
    pub source: TimeSource,
}

impl Candidate {
    /// Candidate from a naive value that is known to be UTC
    pub fn utc(naive: NaiveDateTime, source: TimeSource) -> Self {
        Self {
            instant: ZonedInstant::Utc(Utc.from_utc_datetime(&naive)),
            source,
        }
    }

    /// Candidate from a value with an explicit offset
    pub fn offset(datetime: DateTime<FixedOffset>, source: TimeSource) -> Self {
        Self {
            instant: ZonedInstant::Offset(datetime),
            source,
        }
    }

    /// Candidate from a bare local wall-clock value
    pub fn local(naive: NaiveDateTime, source: TimeSource) -> Self {
        Self {
            instant: ZonedInstant::Local(naive),
            source,
        }
    }

    /// Wall-clock value of this candidate in `zone`, with the offset dropped.
    ///
    /// This is the only place zone handling happens; every source goes
    /// through it.
    pub fn to_local_wall_clock(&self, zone: &FixedOffset) -> NaiveDateTime {
        match self.instant {
            ZonedInstant::Utc(dt) => dt.with_timezone(zone).naive_local(),
            ZonedInstant::Offset(dt) => dt.with_timezone(zone).naive_local(),
            ZonedInstant::Local(naive) => naive,
        }
    }
}

/// The single resolved creation time of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalTime {
    /// Zone-less local wall-clock timestamp
    pub timestamp: NaiveDateTime,
    /// Which candidate won
    pub source: TimeSource,
}

impl CanonicalTime {
    /// ISO-8601 form without offset, as sent to the archive
    pub fn to_api_string(&self) -> String {
        self.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string()
    }

    /// EXIF `YYYY:MM:DD HH:MM:SS` form
    pub fn to_exif_string(&self) -> String {
        self.timestamp.format("%Y:%m:%d %H:%M:%S").to_string()
    }
}
