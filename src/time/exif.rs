//! EXIF time extraction for images

use super::{Candidate, TimeSource};
use chrono::NaiveDateTime;
use exif::{In, Reader, Tag, Value};
use std::io::Cursor;
use tracing::trace;

/// EXIF tags to try for date extraction, in priority order
const DATE_TAGS: &[Tag] = &[
    Tag::DateTimeOriginal, // When the original image was taken
    Tag::DateTime,         // File modification date/time
];

/// Read the embedded capture time from image bytes.
///
/// Returns `None` when the container cannot be decoded or no date tag
/// holds a parsable value. EXIF dates carry no offset, so the candidate is
/// always local wall-clock.
pub fn read_embedded_date(bytes: &[u8]) -> Option<Candidate> {
    let exif = match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => exif,
        Err(e) => {
            trace!(error = %e, "No readable EXIF block");
            return None;
        }
    };

    DATE_TAGS.iter().find_map(|tag| {
        let field = exif.get_field(*tag, In::PRIMARY)?;
        let datetime = ascii_value(&field.value).and_then(|s| parse_exif_datetime(&s))?;
        trace!(?tag, %datetime, "Found EXIF date");
        Some(Candidate::local(datetime, TimeSource::EmbeddedMetadata))
    })
}

fn ascii_value(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(parts) => parts
            .first()
            .map(|part| String::from_utf8_lossy(part).into_owned()),
        _ => None,
    }
}

/// Parse EXIF datetime string format: "YYYY:MM:DD HH:MM:SS"
pub(crate) fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    // EXIF format: "2024:01:15 14:30:00" or with quotes
    let s = s.trim().trim_matches(|c| c == '"' || c == '\0');

    let formats = [
        "%Y:%m:%d %H:%M:%S",
        "%Y:%m:%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
    ];

    formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}
