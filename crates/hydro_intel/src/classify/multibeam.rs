//! Kongsberg multibeam header readers
//!
//! Only datagram headers are read: the first and last datagram times give the
//! line's time range, and the installation datagram gives the serial numbers.

use crate::error::{IntelError, Result};
use crate::types::{MultibeamFormat, MultibeamMeta};
use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

const ALL_STX: u8 = 0x02;
const ALL_INSTALLATION: u8 = b'I';
/// Length field plus the fixed 16 byte header that follows it
const ALL_HEADER_LEN: usize = 20;

const KMALL_HEADER_LEN: usize = 20;
const KMALL_INSTALLATION: &[u8; 4] = b"#IIP";
/// numBytesCmnPart, info and status precede the install text
const KMALL_IIP_PREAMBLE: usize = 6;

/// Read start/end time, serials and model from a `.all` file
pub fn read_all(path: &Path) -> Result<MultibeamMeta> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut offset: u64 = 0;
    let mut start: Option<DateTime<Utc>> = None;
    let mut end: Option<DateTime<Utc>> = None;
    let mut first_serial: Option<u16> = None;
    let mut installation: Option<(u16, u16)> = None;
    let mut model: Option<u16> = None;

    while offset + ALL_HEADER_LEN as u64 <= file_len {
        reader.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; ALL_HEADER_LEN];
        reader.read_exact(&mut header)?;
        let mut cursor = &header[..];

        let length = cursor.read_u32::<LittleEndian>()? as u64;
        let stx = cursor.read_u8()?;
        let kind = cursor.read_u8()?;
        let dg_model = cursor.read_u16::<LittleEndian>()?;
        let date = cursor.read_u32::<LittleEndian>()?;
        let millis = cursor.read_u32::<LittleEndian>()?;
        let _counter = cursor.read_u16::<LittleEndian>()?;
        let serial = cursor.read_u16::<LittleEndian>()?;

        if stx != ALL_STX || length < (ALL_HEADER_LEN - 4) as u64 {
            if start.is_none() {
                return Err(IntelError::classification(
                    path.display().to_string(),
                    format!("not a Kongsberg .all file (bad datagram header at byte {offset})"),
                ));
            }
            // Truncated tail from a file still being written
            break;
        }

        if let Some(time) = all_datagram_time(date, millis) {
            if start.is_none() {
                start = Some(time);
            }
            end = Some(time);
        }
        model.get_or_insert(dg_model);
        first_serial.get_or_insert(serial);

        if kind == ALL_INSTALLATION && installation.is_none() {
            let secondary = reader.read_u16::<LittleEndian>()?;
            installation = Some((serial, secondary));
        }

        offset += 4 + length;
    }

    let (start_time, end_time) = match (start, end) {
        (Some(s), Some(e)) => (s, e),
        _ => {
            return Err(IntelError::classification(
                path.display().to_string(),
                "no timestamped datagrams found",
            ))
        }
    };

    let (primary, secondary) =
        installation.unwrap_or((first_serial.unwrap_or_default(), 0));

    Ok(MultibeamMeta {
        format: MultibeamFormat::KongsbergAll,
        start_time,
        end_time,
        primary_serial: primary as u32,
        secondary_serial: secondary as u32,
        model: format!("em{}", model.unwrap_or_default()),
    })
}

fn all_datagram_time(date: u32, millis: u32) -> Option<DateTime<Utc>> {
    let day = NaiveDate::from_ymd_opt(
        (date / 10_000) as i32,
        (date / 100) % 100,
        date % 100,
    )?;
    let midnight = Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0)?);
    Some(midnight + chrono::Duration::milliseconds(millis as i64))
}

struct KmallHeader {
    length: u32,
    kind: [u8; 4],
    echosounder_id: u16,
    time: Option<DateTime<Utc>>,
}

fn read_kmall_header<R: Read>(reader: &mut R) -> Result<KmallHeader> {
    let length = reader.read_u32::<LittleEndian>()?;
    let mut kind = [0u8; 4];
    reader.read_exact(&mut kind)?;
    let _version = reader.read_u8()?;
    let _system_id = reader.read_u8()?;
    let echosounder_id = reader.read_u16::<LittleEndian>()?;
    let seconds = reader.read_u32::<LittleEndian>()?;
    let nanos = reader.read_u32::<LittleEndian>()?;
    Ok(KmallHeader {
        length,
        kind,
        echosounder_id,
        time: DateTime::from_timestamp(seconds as i64, nanos),
    })
}

/// Read start/end time, serials and model from a `.kmall` file
pub fn read_kmall(path: &Path) -> Result<MultibeamMeta> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    if file_len < KMALL_HEADER_LEN as u64 {
        return Err(IntelError::classification(
            path.display().to_string(),
            "file too short for a .kmall datagram",
        ));
    }

    let first = read_kmall_header(&mut reader)?;
    if first.kind[0] != b'#' {
        return Err(IntelError::classification(
            path.display().to_string(),
            "not a Kongsberg .kmall file (missing datagram type marker)",
        ));
    }
    let start_time = first.time.ok_or_else(|| {
        IntelError::classification(path.display().to_string(), "invalid first datagram time")
    })?;

    // Each datagram repeats its length in the trailing four bytes
    reader.seek(SeekFrom::End(-4))?;
    let last_len = reader.read_u32::<LittleEndian>()? as u64;
    let end_time = if last_len >= KMALL_HEADER_LEN as u64 && last_len <= file_len {
        reader.seek(SeekFrom::Start(file_len - last_len))?;
        read_kmall_header(&mut reader)?.time.unwrap_or(start_time)
    } else {
        start_time
    };

    let (primary, secondary) = find_kmall_serials(&mut reader, file_len)?;

    Ok(MultibeamMeta {
        format: MultibeamFormat::KongsbergKmall,
        start_time,
        end_time: end_time.max(start_time),
        primary_serial: primary,
        secondary_serial: secondary,
        model: format!("em{}", first.echosounder_id),
    })
}

fn find_kmall_serials<R: Read + Seek>(reader: &mut R, file_len: u64) -> Result<(u32, u32)> {
    let mut offset = 0u64;
    while offset + KMALL_HEADER_LEN as u64 <= file_len {
        reader.seek(SeekFrom::Start(offset))?;
        let header = read_kmall_header(reader)?;
        if (header.length as usize) < KMALL_HEADER_LEN {
            break;
        }
        if &header.kind == KMALL_INSTALLATION {
            let mut preamble = [0u8; KMALL_IIP_PREAMBLE];
            reader.read_exact(&mut preamble)?;
            // Never read past the end of the file, whatever the length field says
            let text_start = offset + (KMALL_HEADER_LEN + KMALL_IIP_PREAMBLE) as u64;
            let body_len = (header.length as u64)
                .saturating_sub((KMALL_HEADER_LEN + KMALL_IIP_PREAMBLE + 4) as u64)
                .min(file_len.saturating_sub(text_start));
            let mut text = Vec::new();
            reader.by_ref().take(body_len).read_to_end(&mut text)?;
            return Ok(parse_install_serials(&String::from_utf8_lossy(&text)));
        }
        offset += header.length as u64;
    }
    Ok((0, 0))
}

/// Pull `SN=` (primary) and `SN2=` (secondary) out of the install text
fn parse_install_serials(text: &str) -> (u32, u32) {
    let mut primary = 0;
    let mut secondary = 0;
    for entry in text.split(|c| c == ',' || c == '\n' || c == '\r') {
        let Some((key, value)) = entry.trim().split_once('=') else {
            continue;
        };
        let value: u32 = match value.trim().trim_end_matches(';').parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        match key.trim() {
            "SN" if primary == 0 => primary = value,
            "SN2" if secondary == 0 => secondary = value,
            _ => {}
        }
    }
    (primary, secondary)
}
