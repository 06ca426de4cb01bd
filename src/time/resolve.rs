//! Candidate priority and timezone normalization

use super::exif::read_embedded_date;
use super::filename::parse_filename_date;
use super::{CanonicalTime, Candidate, TimeSource, ZonedInstant};
use chrono::{DateTime, FixedOffset, Utc};
use tracing::debug;

/// Default source order: filename, then EXIF, then post time
pub const DEFAULT_ORDER: &[TimeSource] = &[
    TimeSource::Filename,
    TimeSource::EmbeddedMetadata,
    TimeSource::PostTime,
];

/// Inputs available for one attachment
#[derive(Debug, Clone, Copy)]
pub struct MediaContext<'a> {
    pub filename: &'a str,
    pub bytes: &'a [u8],
    pub posted_at: DateTime<Utc>,
}

/// Ordered candidate sources plus the local zone used for normalization
#[derive(Debug, Clone)]
pub struct ResolutionPolicy {
    order: Vec<TimeSource>,
    zone: FixedOffset,
}

impl ResolutionPolicy {
    /// Policy with the default source order
    pub fn new(zone: FixedOffset) -> Self {
        Self {
            order: DEFAULT_ORDER.to_vec(),
            zone,
        }
    }

    /// Replace the source order. The post time always stays the last resort.
    pub fn with_order(mut self, order: &[TimeSource]) -> Self {
        let mut order = order.iter().fold(Vec::new(), |mut acc, source| {
            if !acc.contains(source) {
                acc.push(*source);
            }
            acc
        });
        if !order.contains(&TimeSource::PostTime) {
            order.push(TimeSource::PostTime);
        }
        self.order = order;
        self
    }

    pub fn order(&self) -> &[TimeSource] {
        &self.order
    }

    /// Convert any candidate into a zone-less local wall-clock result
    pub fn normalize(&self, candidate: &Candidate) -> CanonicalTime {
        CanonicalTime {
            timestamp: candidate.to_local_wall_clock(&self.zone),
            source: candidate.source,
        }
    }

    /// Pick from already computed candidates
    pub fn resolve(
        &self,
        filename: Option<Candidate>,
        embedded: Option<Candidate>,
        posted_at: DateTime<Utc>,
    ) -> CanonicalTime {
        self.select(posted_at, |source| match source {
            TimeSource::Filename => filename,
            TimeSource::EmbeddedMetadata => embedded,
            TimeSource::PostTime => None,
        })
    }

    /// Evaluate sources lazily in priority order, stopping at the first hit
    pub fn resolve_media(&self, ctx: &MediaContext<'_>) -> CanonicalTime {
        self.select(ctx.posted_at, |source| match source {
            TimeSource::Filename => parse_filename_date(ctx.filename),
            TimeSource::EmbeddedMetadata => read_embedded_date(ctx.bytes),
            TimeSource::PostTime => None,
        })
    }

    fn select<F>(&self, posted_at: DateTime<Utc>, mut produce: F) -> CanonicalTime
    where
        F: FnMut(TimeSource) -> Option<Candidate>,
    {
        let post_time = Candidate {
            instant: ZonedInstant::Utc(posted_at),
            source: TimeSource::PostTime,
        };

        let winner = self
            .order
            .iter()
            .find_map(|&source| match source {
                TimeSource::PostTime => Some(post_time),
                other => produce(other),
            })
            .unwrap_or(post_time);

        let canonical = self.normalize(&winner);
        debug!(
            source = %canonical.source,
            timestamp = %canonical.to_api_string(),
            "Resolved capture time"
        );
        canonical
    }
}
