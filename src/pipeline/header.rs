//! JPEG 2000 header parsing
//!
//! Archive images carry their FITS header as XML inside a top-level `xml `
//! box. Only the box headers are read to locate it; image data is skipped.

use crate::ImageMetadata;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

const XML_BOX: &[u8; 4] = b"xml ";

/// Upper bound on an XML box we are willing to read (16MB)
pub const MAX_XML_BOX_SIZE: u64 = 16 * 1024 * 1024;

static ELEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<([A-Za-z0-9_\-]+)>([^<]*)</([A-Za-z0-9_\-]+)>").expect("static regex")
});

/// Header parse failures
#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    /// File could not be read
    #[error("I/O error reading {path}: {message}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        message: String,
    },

    /// Box structure is invalid
    #[error("malformed JPEG 2000 file: {0}")]
    Malformed(String),

    /// No `xml ` box present
    #[error("no XML header box found")]
    MissingXmlBox,

    /// Required keyword absent
    #[error("missing header keyword {0}")]
    MissingKeyword(&'static str),

    /// Observation date not parseable
    #[error("invalid observation date: {0}")]
    InvalidDate(String),
}

/// Maps a staged file to its metadata
pub trait HeaderParser: Send + Sync {
    /// Parse the header of the file at `path`
    fn parse(&self, path: &Path) -> Result<ImageMetadata, HeaderError>;
}

/// Parser for JP2 files with an embedded XML FITS header
#[derive(Debug, Default, Clone, Copy)]
pub struct Jp2HeaderParser;

impl HeaderParser for Jp2HeaderParser {
    fn parse(&self, path: &Path) -> Result<ImageMetadata, HeaderError> {
        let io_error = |e: std::io::Error| HeaderError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        let file = File::open(path).map_err(io_error)?;
        let mut reader = BufReader::new(file);
        let xml = read_xml_box(&mut reader)?;
        let header = parse_keywords(&xml);
        metadata_from_header(header, path)
    }
}

/// Locate the first top-level `xml ` box and return its contents.
pub fn read_xml_box<R: Read + Seek>(reader: &mut R) -> Result<String, HeaderError> {
    let io = |e: std::io::Error| HeaderError::Malformed(e.to_string());

    loop {
        let mut head = [0u8; 8];
        match reader.read_exact(&mut head) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(HeaderError::MissingXmlBox)
            }
            Err(e) => return Err(io(e)),
        }

        let lbox = u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as u64;
        let tbox = [head[4], head[5], head[6], head[7]];

        // Content length: 1 means an 8-byte extended length follows, 0 means "to end of file".
        let content_len = match lbox {
            0 => None,
            1 => {
                let mut xl = [0u8; 8];
                reader.read_exact(&mut xl).map_err(io)?;
                let total = u64::from_be_bytes(xl);
                Some(total.checked_sub(16).ok_or_else(|| {
                    HeaderError::Malformed(format!("extended box length {total} too small"))
                })?)
            }
            n if n < 8 => {
                return Err(HeaderError::Malformed(format!("box length {n} too small")))
            }
            n => Some(n - 8),
        };

        if &tbox == XML_BOX {
            let mut buf = Vec::new();
            match content_len {
                Some(len) if len > MAX_XML_BOX_SIZE => {
                    return Err(HeaderError::Malformed(format!("xml box of {len} bytes")))
                }
                Some(len) => {
                    buf.resize(len as usize, 0);
                    reader.read_exact(&mut buf).map_err(io)?;
                }
                None => {
                    reader
                        .by_ref()
                        .take(MAX_XML_BOX_SIZE)
                        .read_to_end(&mut buf)
                        .map_err(io)?;
                }
            }
            return Ok(String::from_utf8_lossy(&buf).into_owned());
        }

        match content_len {
            Some(len) => {
                let offset = i64::try_from(len)
                    .map_err(|_| HeaderError::Malformed(format!("box length {len} overflows")))?;
                reader.seek(SeekFrom::Current(offset)).map_err(io)?;
            }
            None => return Err(HeaderError::MissingXmlBox),
        }
    }
}

/// Extract `<KEY>value</KEY>` pairs; the first occurrence of each key wins.
pub fn parse_keywords(xml: &str) -> BTreeMap<String, String> {
    let mut header = BTreeMap::new();
    for caps in ELEMENT.captures_iter(xml) {
        let (open, value, close) = (&caps[1], &caps[2], &caps[3]);
        if open != close {
            continue;
        }
        header
            .entry(open.to_ascii_uppercase())
            .or_insert_with(|| value.trim().to_string());
    }
    header
}

fn keyword<'a>(header: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    header
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// Build metadata from header keywords.
pub fn metadata_from_header(
    header: BTreeMap<String, String>,
    path: &Path,
) -> Result<ImageMetadata, HeaderError> {
    let observatory = keyword(&header, "TELESCOP")
        .or_else(|| keyword(&header, "OBSRVTRY"))
        .ok_or(HeaderError::MissingKeyword("TELESCOP"))?
        .split('/')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    let instrument = keyword(&header, "INSTRUME")
        .ok_or(HeaderError::MissingKeyword("INSTRUME"))?
        .split('_')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    let detector = keyword(&header, "DETECTOR")
        .map(str::to_string)
        .unwrap_or_else(|| instrument.clone());

    let measurement = measurement_of(&header);
    let date = observation_date(&header)?;

    Ok(ImageMetadata {
        observatory,
        instrument,
        detector,
        measurement,
        date,
        path: path.to_path_buf(),
        header,
    })
}

fn measurement_of(header: &BTreeMap<String, String>) -> String {
    if let Some(content) = keyword(header, "CONTENT") {
        let content = content.to_ascii_lowercase();
        if content.contains("magnetogram") {
            return "magnetogram".to_string();
        }
        if content.contains("continuum") {
            return "continuum".to_string();
        }
    }

    keyword(header, "WAVELNTH")
        .and_then(|w| w.parse::<f64>().ok())
        .filter(|w| *w > 0.0)
        .map(|w| format!("{}", w.round() as i64))
        .unwrap_or_else(|| "white-light".to_string())
}

fn observation_date(header: &BTreeMap<String, String>) -> Result<DateTime<Utc>, HeaderError> {
    let raw = keyword(header, "DATE-OBS")
        .or_else(|| keyword(header, "DATE_OBS"))
        .ok_or(HeaderError::MissingKeyword("DATE-OBS"))?;

    let combined = if raw.contains('T') {
        raw.to_string()
    } else {
        // Date and time split across DATE-OBS (YYYY/MM/DD) and TIME-OBS.
        let time = keyword(header, "TIME-OBS")
            .or_else(|| keyword(header, "TIME_OBS"))
            .unwrap_or("00:00:00");
        format!("{}T{}", raw.replace('/', "-"), time)
    };

    parse_obs_datetime(&combined).ok_or_else(|| HeaderError::InvalidDate(combined.clone()))
}

fn parse_obs_datetime(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim().trim_end_matches('Z');
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(trimmed.trim_end_matches('T'), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
