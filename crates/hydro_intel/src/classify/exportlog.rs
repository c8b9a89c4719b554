//! POSPac export log parsing
//!
//! The export utility writes a block of `Key : value` lines describing the
//! exported SBET. The log is the only metadata an exported SBET carries.

use crate::error::Result;
use crate::types::NavLogMeta;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Export logs are small; anything past this is not the header block
const MAX_LOG_BYTES: u64 = 64 * 1024;

static KEY_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z][A-Za-z/ ]*?)\s*:\s*(.*?)\s*$").expect("valid export log regex")
});

/// Parse an export log. `Ok(None)` means the text lacks the export block.
pub fn read_export_log(path: &Path) -> Result<Option<NavLogMeta>> {
    let mut bytes = Vec::new();
    File::open(path)?.take(MAX_LOG_BYTES).read_to_end(&mut bytes)?;
    Ok(parse_export_log(&String::from_utf8_lossy(&bytes)))
}

pub fn parse_export_log(text: &str) -> Option<NavLogMeta> {
    let mut mission_date = None;
    let mut input_sbet_file = None;
    let mut exported_sbet_file = None;
    let mut sample_rate_hertz = None;
    let mut datum = None;
    let mut ellipsoid = None;

    for line in text.lines() {
        let Some(caps) = KEY_VALUE.captures(line) else {
            continue;
        };
        let value = caps[2].to_string();
        if value.is_empty() {
            continue;
        }
        match caps[1].to_ascii_lowercase().as_str() {
            "mission date" => mission_date = parse_mission_date(&value),
            "input file" => input_sbet_file = Some(base_name(&value)),
            "output file" => exported_sbet_file = Some(base_name(&value)),
            "output sample rate" => {
                sample_rate_hertz = leading_number(&value).or(sample_rate_hertz)
            }
            "time interval" => {
                if sample_rate_hertz.is_none() {
                    sample_rate_hertz = leading_number(&value)
                        .filter(|interval| *interval > 0.0)
                        .map(|interval| (1.0 / interval * 1000.0).round() / 1000.0);
                }
            }
            "datum" => datum = Some(value),
            "ellipsoid" => ellipsoid = Some(value),
            _ => {}
        }
    }

    Some(NavLogMeta {
        mission_date: mission_date?,
        datum,
        ellipsoid,
        input_sbet_file,
        exported_sbet_file: exported_sbet_file?,
        sample_rate_hertz,
    })
}

fn parse_mission_date(value: &str) -> Option<NaiveDate> {
    ["%m/%d/%Y", "%Y-%m-%d", "%m/%d/%y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

/// File name from a path written by either Windows or POSIX tools
fn base_name(value: &str) -> String {
    value
        .rsplit(|c| c == '\\' || c == '/')
        .next()
        .unwrap_or(value)
        .to_string()
}

fn leading_number(value: &str) -> Option<f64> {
    value.split_whitespace().next()?.parse().ok()
}
