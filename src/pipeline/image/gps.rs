//! GPS position from embedded EXIF metadata.
//!
//! Every failure mode (no EXIF, no GPS IFD, malformed rationals, values out of
//! range) collapses to `None`. Nothing here returns an error.

use std::io::Cursor;

use exif::{In, Rational, Tag, Value};

use super::FetchedImage;
use crate::pipeline::analysis::GeoPoint;

/// GPS position of a fetched image, read from its original bytes.
pub fn extract_gps(image: &FetchedImage) -> Option<GeoPoint> {
    read_gps(&image.source_bytes)
}

/// GPS position from any EXIF-bearing container (JPEG, TIFF, PNG, WebP, HEIF).
pub fn read_gps(bytes: &[u8]) -> Option<GeoPoint> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;

    let lat = coordinate(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S')?;
    let lon = coordinate(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W')?;

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        tracing::debug!(lat, lon, "Ignoring out-of-range GPS coordinates");
        return None;
    }

    Some(GeoPoint { lat, lon })
}

/// Signed decimal degrees for one axis. `negative_ref` is `S` or `W`.
fn coordinate(exif: &exif::Exif, value_tag: Tag, ref_tag: Tag, negative_ref: u8) -> Option<f64> {
    let field = exif.get_field(value_tag, In::PRIMARY)?;
    let degrees = match &field.value {
        Value::Rational(parts) => dms_to_degrees(parts)?,
        _ => return None,
    };

    let negative = exif
        .get_field(ref_tag, In::PRIMARY)
        .and_then(|f| match &f.value {
            Value::Ascii(strings) => strings.first().and_then(|s| s.first()).copied(),
            _ => None,
        })
        .is_some_and(|c| c.eq_ignore_ascii_case(&negative_ref));

    Some(if negative { -degrees } else { degrees })
}

/// Degrees/minutes/seconds rationals to decimal degrees.
///
/// Missing minutes or seconds count as zero; a zero denominator is malformed.
pub fn dms_to_degrees(parts: &[Rational]) -> Option<f64> {
    if parts.is_empty() {
        return None;
    }

    let mut total = 0.0;
    for (part, divisor) in parts.iter().zip([1.0, 60.0, 3600.0]) {
        if part.denom == 0 {
            return None;
        }
        total += part.to_f64() / divisor;
    }

    total.is_finite().then_some(total)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::image::fetch::decode_image;
    use crate::pipeline::image::fetch::tests::make_png;
    use exif::experimental::Writer;
    use exif::Field;

    fn r(num: u32, denom: u32) -> Rational {
        Rational { num, denom }
    }

    fn ascii(s: &str) -> Value {
        Value::Ascii(vec![s.as_bytes().to_vec()])
    }

    /// Build a minimal TIFF container holding the given primary-IFD fields.
    pub(crate) fn tiff_with(fields: &[Field]) -> Vec<u8> {
        let mut writer = Writer::new();
        for field in fields {
            writer.push_field(field);
        }
        let mut buf = Cursor::new(Vec::new());
        writer.write(&mut buf, false).unwrap();
        buf.into_inner()
    }

    fn field(tag: Tag, value: Value) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value,
        }
    }

    pub(crate) fn new_york_fields() -> Vec<Field> {
        vec![
            field(Tag::GPSLatitudeRef, ascii("N")),
            field(
                Tag::GPSLatitude,
                Value::Rational(vec![r(40, 1), r(42, 1), r(4608, 100)]),
            ),
            field(Tag::GPSLongitudeRef, ascii("W")),
            field(
                Tag::GPSLongitude,
                Value::Rational(vec![r(74, 1), r(0, 1), r(2160, 100)]),
            ),
        ]
    }

    #[test]
    fn dms_conversion() {
        let deg = dms_to_degrees(&[r(40, 1), r(30, 1), r(0, 1)]).unwrap();
        assert!((deg - 40.5).abs() < 1e-9);
    }

    #[test]
    fn dms_degrees_only() {
        let deg = dms_to_degrees(&[r(81, 2)]).unwrap();
        assert!((deg - 40.5).abs() < 1e-9);
    }

    #[test]
    fn dms_zero_denominator_is_malformed() {
        assert!(dms_to_degrees(&[r(40, 0), r(1, 1), r(1, 1)]).is_none());
        assert!(dms_to_degrees(&[r(40, 1), r(1, 0)]).is_none());
    }

    #[test]
    fn dms_empty_is_none() {
        assert!(dms_to_degrees(&[]).is_none());
    }

    #[test]
    fn reads_signed_coordinates() {
        let point = read_gps(&tiff_with(&new_york_fields())).unwrap();
        assert!((point.lat - 40.7128).abs() < 1e-4, "lat was {}", point.lat);
        assert!((point.lon + 74.0060).abs() < 1e-4, "lon was {}", point.lon);
    }

    #[test]
    fn missing_reference_defaults_positive() {
        let fields = vec![
            field(Tag::GPSLatitude, Value::Rational(vec![r(10, 1), r(0, 1), r(0, 1)])),
            field(Tag::GPSLongitude, Value::Rational(vec![r(20, 1), r(0, 1), r(0, 1)])),
        ];
        let point = read_gps(&tiff_with(&fields)).unwrap();
        assert_eq!(point, GeoPoint { lat: 10.0, lon: 20.0 });
    }

    #[test]
    fn latitude_without_longitude_is_none() {
        let fields = vec![field(
            Tag::GPSLatitude,
            Value::Rational(vec![r(10, 1), r(0, 1), r(0, 1)]),
        )];
        assert!(read_gps(&tiff_with(&fields)).is_none());
    }

    #[test]
    fn out_of_range_latitude_is_none() {
        let fields = vec![
            field(Tag::GPSLatitude, Value::Rational(vec![r(95, 1)])),
            field(Tag::GPSLongitude, Value::Rational(vec![r(20, 1)])),
        ];
        assert!(read_gps(&tiff_with(&fields)).is_none());
    }

    #[test]
    fn plain_png_has_no_gps() {
        assert!(read_gps(&make_png(8, 8)).is_none());
    }

    #[test]
    fn garbage_bytes_have_no_gps() {
        assert!(read_gps(b"not an image at all").is_none());
        assert!(read_gps(&[]).is_none());
    }

    #[test]
    fn extract_from_fetched_image_without_exif() {
        let fetched = decode_image(make_png(8, 8)).unwrap();
        assert!(extract_gps(&fetched).is_none());
    }
}
