//! Caris SVP text reader

use crate::error::{IntelError, Result};
use crate::types::SvpMeta;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use std::path::Path;

const SVP_HEADER: &str = "[SVP_VERSION_2]";

pub fn read_caris_svp(path: &Path) -> Result<SvpMeta> {
    let text = std::fs::read_to_string(path)?;
    parse_caris_svp(&text)
        .map_err(|message| IntelError::classification(path.display().to_string(), message))
}

pub fn parse_caris_svp(text: &str) -> std::result::Result<SvpMeta, String> {
    let mut lines = text.lines();
    match lines.next() {
        Some(first) if first.trim() == SVP_HEADER => {}
        _ => return Err(format!("missing {SVP_HEADER} header")),
    }
    // Profile name line
    lines.next();

    let mut meta = SvpMeta {
        profiles: Vec::new(),
        cast_times: Vec::new(),
        julian_days: Vec::new(),
        latitudes: Vec::new(),
        longitudes: Vec::new(),
        number_of_layers: Vec::new(),
    };

    for (idx, line) in lines.enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(section) = trimmed.strip_prefix("Section ") {
            let fields: Vec<&str> = section.split_whitespace().collect();
            if fields.len() < 4 {
                return Err(format!("malformed Section line {}: '{trimmed}'", idx + 3));
            }
            let cast_time = parse_cast_time(fields[0], fields[1])
                .ok_or_else(|| format!("invalid cast time '{} {}'", fields[0], fields[1]))?;
            let latitude = parse_dms(fields[2])
                .ok_or_else(|| format!("invalid latitude '{}'", fields[2]))?;
            let longitude = parse_dms(fields[3])
                .ok_or_else(|| format!("invalid longitude '{}'", fields[3]))?;

            meta.julian_days.push(fields[0].to_string());
            meta.cast_times.push(cast_time);
            meta.latitudes.push(latitude);
            meta.longitudes.push(longitude);
            meta.profiles.push(Vec::new());
            continue;
        }

        let Some(profile) = meta.profiles.last_mut() else {
            return Err("layer data before the first Section line".to_string());
        };
        let mut values = trimmed.split_whitespace().map(str::parse::<f64>);
        match (values.next(), values.next()) {
            (Some(Ok(depth)), Some(Ok(speed))) => profile.push((depth, speed)),
            _ => return Err(format!("malformed layer line {}: '{trimmed}'", idx + 3)),
        }
    }

    if meta.profiles.is_empty() {
        return Err("no Section entries found".to_string());
    }
    meta.number_of_layers = meta.profiles.iter().map(Vec::len).collect();
    Ok(meta)
}

/// `YYYY-DDD` plus `HH:MM` or `HH:MM:SS`
fn parse_cast_time(julian: &str, clock: &str) -> Option<DateTime<Utc>> {
    let (year, day) = julian.split_once('-')?;
    let date = NaiveDate::from_yo_opt(year.parse().ok()?, day.parse().ok()?)?;
    let time = NaiveTime::parse_from_str(clock, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(clock, "%H:%M"))
        .ok()?;
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}

/// `D:M:S` with an optional leading sign, or plain decimal degrees
fn parse_dms(value: &str) -> Option<f64> {
    let (negative, unsigned) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    let mut degrees = 0.0;
    let mut scale = 1.0;
    for part in unsigned.split(':').take(3) {
        degrees += part.parse::<f64>().ok()? / scale;
        scale *= 60.0;
    }
    Some(if negative { -degrees } else { degrees })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_CASTS: &str = "[SVP_VERSION_2]
2016_288_021224.svp
Section 2016-288 02:12 37:35:23 -076:06:35
 0.0 1500.0
 5.0 1501.2
 10.0 1502.8
Section 2016-288 14:30:10 37:36:00 -076:07:00
 0.0 1499.0
 8.0 1500.5
";

    #[test]
    fn test_parse_two_casts() {
        let meta = parse_caris_svp(TWO_CASTS).unwrap();
        assert_eq!(meta.number_of_profiles(), 2);
        assert_eq!(meta.number_of_layers, vec![3, 2]);
        assert_eq!(meta.julian_days, vec!["2016-288", "2016-288"]);
        assert_eq!(meta.cast_times[0].to_rfc3339(), "2016-10-14T02:12:00+00:00");
        assert_eq!(meta.cast_times[1].to_rfc3339(), "2016-10-14T14:30:10+00:00");
        assert!((meta.latitudes[0] - (37.0 + 35.0 / 60.0 + 23.0 / 3600.0)).abs() < 1e-9);
        assert!((meta.longitudes[0] + (76.0 + 6.0 / 60.0 + 35.0 / 3600.0)).abs() < 1e-9);
        assert_eq!(meta.profiles[1], vec![(0.0, 1499.0), (8.0, 1500.5)]);
    }

    #[test]
    fn test_missing_header_rejected() {
        let err = parse_caris_svp("Section 2016-288 02:12 37:35:23 -076:06:35\n").unwrap_err();
        assert!(err.contains("SVP_VERSION_2"));
    }

    #[test]
    fn test_no_sections_rejected() {
        assert!(parse_caris_svp("[SVP_VERSION_2]\nempty.svp\n").is_err());
    }

    #[test]
    fn test_parse_dms() {
        assert_eq!(parse_dms("-076:30:00"), Some(-76.5));
        assert_eq!(parse_dms("45.25"), Some(45.25));
        assert_eq!(parse_dms("north"), None);
    }
}
