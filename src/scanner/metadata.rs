use anyhow::Result;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Dimensional and EXIF attributes extracted straight from the file.
#[derive(Debug, Clone, Default)]
pub struct ImageMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,

    // Camera info
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,

    // Exposure settings
    pub focal_length: Option<f64>,
    pub f_number: Option<f64>,
    pub exposure_time: Option<String>,
    pub iso: Option<i64>,

    // Date/time
    pub taken_at: Option<String>,

    // GPS
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub gps_altitude: Option<f64>,
}

pub fn extract_metadata(path: &Path) -> Result<ImageMetadata> {
    let mut metadata = ImageMetadata::default();

    if let Ok(reader) = image::ImageReader::open(path) {
        if let Ok(dims) = reader.into_dimensions() {
            metadata.width = Some(dims.0);
            metadata.height = Some(dims.1);
        }
    }

    if let Ok(file) = File::open(path) {
        let mut bufreader = BufReader::new(file);
        if let Ok(exif) = exif::Reader::new().read_from_container(&mut bufreader) {
            metadata.camera_make = string_field(&exif, exif::Tag::Make);
            metadata.camera_model = string_field(&exif, exif::Tag::Model);
            metadata.focal_length = rational_field(&exif, exif::Tag::FocalLength);
            metadata.f_number = rational_field(&exif, exif::Tag::FNumber);
            metadata.taken_at = string_field(&exif, exif::Tag::DateTimeOriginal);

            if let Some(field) = exif.get_field(exif::Tag::ExposureTime, exif::In::PRIMARY) {
                metadata.exposure_time = Some(field.display_value().to_string());
            }

            if let Some(field) = exif.get_field(exif::Tag::PhotographicSensitivity, exif::In::PRIMARY)
            {
                if let exif::Value::Short(ref v) = field.value {
                    if let Some(&iso) = v.first() {
                        metadata.iso = Some(iso as i64);
                    }
                }
            }

            extract_gps(&exif, &mut metadata);
        }
    }

    Ok(metadata)
}

fn string_field(exif: &exif::Exif, tag: exif::Tag) -> Option<String> {
    exif.get_field(tag, exif::In::PRIMARY)
        .map(|field| field.display_value().to_string().trim_matches('"').to_string())
}

fn rational_field(exif: &exif::Exif, tag: exif::Tag) -> Option<f64> {
    let field = exif.get_field(tag, exif::In::PRIMARY)?;
    if let exif::Value::Rational(ref v) = field.value {
        v.first().map(|r| r.num as f64 / r.denom as f64)
    } else {
        None
    }
}

fn extract_gps(exif: &exif::Exif, metadata: &mut ImageMetadata) {
    if let (Some(lat_field), Some(lat_ref), Some(lon_field), Some(lon_ref)) = (
        exif.get_field(exif::Tag::GPSLatitude, exif::In::PRIMARY),
        exif.get_field(exif::Tag::GPSLatitudeRef, exif::In::PRIMARY),
        exif.get_field(exif::Tag::GPSLongitude, exif::In::PRIMARY),
        exif.get_field(exif::Tag::GPSLongitudeRef, exif::In::PRIMARY),
    ) {
        if let (exif::Value::Rational(lat_vals), exif::Value::Rational(lon_vals)) =
            (&lat_field.value, &lon_field.value)
        {
            if lat_vals.len() >= 3 && lon_vals.len() >= 3 {
                let lat = dms_to_decimal(
                    lat_vals[0].num as f64 / lat_vals[0].denom as f64,
                    lat_vals[1].num as f64 / lat_vals[1].denom as f64,
                    lat_vals[2].num as f64 / lat_vals[2].denom as f64,
                );
                let lon = dms_to_decimal(
                    lon_vals[0].num as f64 / lon_vals[0].denom as f64,
                    lon_vals[1].num as f64 / lon_vals[1].denom as f64,
                    lon_vals[2].num as f64 / lon_vals[2].denom as f64,
                );

                let lat_ref_str = lat_ref.display_value().to_string();
                let lon_ref_str = lon_ref.display_value().to_string();

                metadata.gps_latitude = Some(if lat_ref_str.contains('S') { -lat } else { lat });
                metadata.gps_longitude = Some(if lon_ref_str.contains('W') { -lon } else { lon });
            }
        }
    }

    if let Some(alt_field) = exif.get_field(exif::Tag::GPSAltitude, exif::In::PRIMARY) {
        if let exif::Value::Rational(ref v) = alt_field.value {
            if let Some(r) = v.first() {
                let altitude = r.num as f64 / r.denom as f64;
                // GPSAltitudeRef 1 means below sea level
                let below_sea = exif
                    .get_field(exif::Tag::GPSAltitudeRef, exif::In::PRIMARY)
                    .map(|f| match f.value {
                        exif::Value::Byte(ref bytes) => bytes.first() == Some(&1),
                        _ => false,
                    })
                    .unwrap_or(false);
                metadata.gps_altitude = Some(signed_altitude(altitude, below_sea));
            }
        }
    }
}

fn signed_altitude(altitude: f64, below_sea_level: bool) -> f64 {
    if below_sea_level {
        -altitude
    } else {
        altitude
    }
}

fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}
