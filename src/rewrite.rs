//! EXIF capture-time rewriting for JPEG uploads
//!
//! The archive trusts embedded capture times over the declared upload
//! fields, so JPEG bytes get their date tags replaced with the canonical
//! wall-clock value before they are submitted. Offset tags are removed to
//! keep the value zone-less.

use crate::error::{Error, Result};
use crate::time::CanonicalTime;
use exif::experimental::Writer;
use exif::{Exif, Field, In, Reader, Tag, Value};
use img_parts::jpeg::Jpeg;
use img_parts::{Bytes, ImageEXIF};
use std::borrow::Cow;
use std::io::Cursor;
use tracing::{debug, trace};

/// Tags that receive the canonical timestamp
const REPLACED_TAGS: &[Tag] = &[Tag::DateTime, Tag::DateTimeOriginal, Tag::DateTimeDigitized];

/// Offset tags that would contradict a zone-less capture time
const STRIPPED_TAGS: &[Tag] = &[
    Tag::OffsetTime,
    Tag::OffsetTimeOriginal,
    Tag::OffsetTimeDigitized,
];

/// Pointer and data-location tags the writer regenerates itself
const STRUCTURAL_TAGS: &[Tag] = &[
    Tag::ExifIFDPointer,
    Tag::GPSInfoIFDPointer,
    Tag::InteropIFDPointer,
    Tag::JPEGInterchangeFormat,
    Tag::JPEGInterchangeFormatLength,
    Tag::StripOffsets,
    Tag::StripByteCounts,
    Tag::TileOffsets,
    Tag::TileByteCounts,
];

/// Result of a rewrite attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// New file bytes with updated metadata
    Rewritten(Vec<u8>),
    /// The format is not one we rewrite
    NotApplicable,
}

/// Best-effort rewrite: returns the original bytes on any failure
pub fn rewrite<'a>(
    bytes: &'a [u8],
    canonical: &CanonicalTime,
    content_type: Option<&str>,
) -> Cow<'a, [u8]> {
    match try_rewrite(bytes, canonical, content_type) {
        Ok(RewriteOutcome::Rewritten(new_bytes)) => {
            debug!(
                timestamp = %canonical.to_exif_string(),
                old_len = bytes.len(),
                new_len = new_bytes.len(),
                "Rewrote EXIF capture time"
            );
            Cow::Owned(new_bytes)
        }
        Ok(RewriteOutcome::NotApplicable) => {
            trace!(?content_type, "Metadata rewrite not applicable");
            Cow::Borrowed(bytes)
        }
        Err(e) => {
            debug!(error = %e, "Metadata rewrite failed, keeping original bytes");
            Cow::Borrowed(bytes)
        }
    }
}

/// Rewrite the EXIF date tags of a JPEG
pub fn try_rewrite(
    bytes: &[u8],
    canonical: &CanonicalTime,
    content_type: Option<&str>,
) -> Result<RewriteOutcome> {
    if !is_jpeg(bytes, content_type) {
        return Ok(RewriteOutcome::NotApplicable);
    }

    let mut jpeg = Jpeg::from_bytes(Bytes::copy_from_slice(bytes))
        .map_err(|e| Error::JpegParse(e.to_string()))?;

    // A corrupt block is replaced by a fresh one
    let existing: Option<Exif> =
        jpeg.exif()
            .and_then(|raw| match Reader::new().read_raw(raw.to_vec()) {
                Ok(exif) => Some(exif),
                Err(e) => {
                    debug!(error = %e, "Existing EXIF block unreadable, starting empty");
                    None
                }
            });

    let stamp = canonical.to_exif_string();
    let date_fields: Vec<Field> = REPLACED_TAGS
        .iter()
        .map(|&tag| Field {
            tag,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![stamp.as_bytes().to_vec()]),
        })
        .collect();

    let thumbnail = existing.as_ref().and_then(embedded_thumbnail);

    let mut writer = Writer::new();
    if let Some(exif) = &existing {
        for field in exif.fields().filter(|f| should_carry(f, thumbnail.is_some())) {
            writer.push_field(field);
        }
    }
    if let Some(thumbnail) = thumbnail {
        writer.set_jpeg(thumbnail, In::THUMBNAIL);
    }
    for field in &date_fields {
        writer.push_field(field);
    }

    let mut tiff = Cursor::new(Vec::new());
    writer
        .write(&mut tiff, false)
        .map_err(|e| Error::ExifWrite(e.to_string()))?;

    jpeg.set_exif(Some(Bytes::from(tiff.into_inner())));
    Ok(RewriteOutcome::Rewritten(jpeg.encoder().bytes().to_vec()))
}

/// Declared JPEG, or undeclared bytes that start with a JPEG SOI marker
fn is_jpeg(bytes: &[u8], content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) => {
            let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            matches!(mime.as_str(), "image/jpeg" | "image/jpg" | "image/pjpeg")
        }
        None => bytes.starts_with(&[0xFF, 0xD8, 0xFF]),
    }
}

fn should_carry(field: &Field, keep_thumbnail: bool) -> bool {
    if REPLACED_TAGS.contains(&field.tag)
        || STRIPPED_TAGS.contains(&field.tag)
        || STRUCTURAL_TAGS.contains(&field.tag)
    {
        return false;
    }
    if matches!(field.value, Value::Unknown(..)) {
        return false;
    }
    field.ifd_num == In::PRIMARY || (keep_thumbnail && field.ifd_num == In::THUMBNAIL)
}

/// JPEG thumbnail bytes referenced from IFD1, if any
fn embedded_thumbnail(exif: &Exif) -> Option<&[u8]> {
    let offset = exif
        .get_field(Tag::JPEGInterchangeFormat, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let len = exif
        .get_field(Tag::JPEGInterchangeFormatLength, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    exif.buf().get(offset..offset.checked_add(len)?)
}
