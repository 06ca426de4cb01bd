//! Shared fixtures for unit tests

use exif::experimental::Writer;
use exif::{Field, In, Reader, Tag, Value};
use img_parts::jpeg::Jpeg;
use img_parts::{Bytes, ImageEXIF};
use std::io::Cursor;

/// A small real JPEG without any EXIF block
pub fn plain_jpeg() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(16, 16, image::Rgb([200, 120, 40]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

pub fn ascii_field(tag: Tag, value: &str) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![value.as_bytes().to_vec()]),
    }
}

/// `plain_jpeg` with an EXIF block holding exactly `fields`
pub fn jpeg_with_fields(fields: &[Field]) -> Vec<u8> {
    let mut writer = Writer::new();
    for field in fields {
        writer.push_field(field);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();

    let mut jpeg = Jpeg::from_bytes(Bytes::from(plain_jpeg())).unwrap();
    jpeg.set_exif(Some(Bytes::from(tiff.into_inner())));
    jpeg.encoder().bytes().to_vec()
}

/// Raw ASCII value of a primary-IFD tag, if present
pub fn read_ascii(bytes: &[u8], tag: Tag) -> Option<String> {
    let exif = Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(parts) => parts
            .first()
            .map(|part| String::from_utf8_lossy(part).into_owned()),
        _ => None,
    }
}
