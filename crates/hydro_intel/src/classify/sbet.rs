//! POSPac SBET / SMRMSG sniffing and time range extraction
//!
//! Both are flat little-endian `f64` record files with GPS weekly seconds in
//! the first field; they only differ in record width.

use crate::error::{IntelError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::f64::consts::PI;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// 17 doubles per SBET record
pub const SBET_RECORD_LEN: u64 = 17 * 8;
/// 10 doubles per SMRMSG record
pub const SMRMSG_RECORD_LEN: u64 = 10 * 8;

const SECONDS_PER_WEEK: f64 = 604_800.0;
/// Largest gap allowed between the first two records
const MAX_RECORD_GAP_SECS: f64 = 5.0;

fn read_record<R: Read>(reader: &mut R, fields: usize) -> Result<Vec<f64>> {
    let mut record = Vec::with_capacity(fields);
    for _ in 0..fields {
        record.push(reader.read_f64::<LittleEndian>()?);
    }
    Ok(record)
}

fn weekly_seconds_valid(t: f64) -> bool {
    t.is_finite() && (0.0..SECONDS_PER_WEEK).contains(&t)
}

/// Open the file and read its first two records if the size fits `record_len`
fn first_two_records(path: &Path, record_len: u64) -> Option<(Vec<f64>, Vec<f64>)> {
    let file = File::open(path).ok()?;
    let len = file.metadata().ok()?.len();
    if len < 2 * record_len || len % record_len != 0 {
        return None;
    }
    let fields = (record_len / 8) as usize;
    let mut reader = BufReader::new(file);
    let first = read_record(&mut reader, fields).ok()?;
    let second = read_record(&mut reader, fields).ok()?;
    Some((first, second))
}

fn times_plausible(first: f64, second: f64) -> bool {
    weekly_seconds_valid(first)
        && weekly_seconds_valid(second)
        && second > first
        && second - first <= MAX_RECORD_GAP_SECS
}

/// Whether the file looks like an SBET: whole 136 byte records, increasing
/// weekly seconds and latitude/longitude within radian bounds.
pub fn looks_like_sbet(path: &Path) -> bool {
    let Some((first, second)) = first_two_records(path, SBET_RECORD_LEN) else {
        return false;
    };
    let lat = first[1];
    let lon = first[2];
    times_plausible(first[0], second[0])
        && lat.abs() <= PI / 2.0
        && lon.abs() <= 2.0 * PI
}

/// Whether the file looks like an SMRMSG error file: whole 80 byte records and
/// increasing weekly seconds.
pub fn looks_like_error_file(path: &Path) -> bool {
    let Some((first, second)) = first_two_records(path, SMRMSG_RECORD_LEN) else {
        return false;
    };
    times_plausible(first[0], second[0]) && first[1..].iter().all(|v| v.is_finite() && *v >= 0.0)
}

/// First and last record time in weekly seconds
pub fn read_time_range(path: &Path, record_len: u64) -> Result<(f64, f64)> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    if len < record_len {
        return Err(IntelError::classification(
            path.display().to_string(),
            format!("file holds no complete {record_len} byte record"),
        ));
    }
    let mut reader = BufReader::new(file);
    let start = reader.read_f64::<LittleEndian>()?;
    let last_record = (len / record_len - 1) * record_len;
    reader.seek(SeekFrom::Start(last_record))?;
    let end = reader.read_f64::<LittleEndian>()?;
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::fixtures;

    #[test]
    fn test_sbet_detection_and_range() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sbet_2019_2222.out");
        fixtures::write_sbet(&path, 210_774.0, 212_847.0);

        assert!(looks_like_sbet(&path));
        let (start, end) = read_time_range(&path, SBET_RECORD_LEN).unwrap();
        assert_eq!(start, 210_774.0);
        assert_eq!(end, 212_847.0);
    }

    #[test]
    fn test_smrmsg_detection_and_range() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("smrmsg_2019_2222.out");
        fixtures::write_smrmsg(&path, 210_774.0, 212_847.0);

        assert!(looks_like_error_file(&path));
        assert!(!looks_like_sbet(&path));
        let (start, end) = read_time_range(&path, SMRMSG_RECORD_LEN).unwrap();
        assert_eq!(start, 210_774.0);
        assert_eq!(end, 212_847.0);
    }

    #[test]
    fn test_sbet_is_not_an_error_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sbet.out");
        fixtures::write_sbet(&path, 1000.0, 1100.0);
        assert!(!looks_like_error_file(&path));
    }

    #[test]
    fn test_random_bytes_are_neither() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("junk.out");
        std::fs::write(&path, vec![0xffu8; 680]).unwrap();
        assert!(!looks_like_sbet(&path));
        assert!(!looks_like_error_file(&path));
    }
}
