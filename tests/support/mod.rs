//! Fixtures shared by the integration tests

use std::path::{Path, PathBuf};

/// Minimal JP2 file: signature, ftyp, an XML box holding `xml`, then an
/// unterminated codestream box.
pub fn jp2_with_xml(xml: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&12u32.to_be_bytes());
    bytes.extend_from_slice(b"jP  ");
    bytes.extend_from_slice(&[0x0d, 0x0a, 0x87, 0x0a]);
    bytes.extend_from_slice(&20u32.to_be_bytes());
    bytes.extend_from_slice(b"ftyp");
    bytes.extend_from_slice(b"jp2 \0\0\0\0jp2 ");
    bytes.extend_from_slice(&((xml.len() + 8) as u32).to_be_bytes());
    bytes.extend_from_slice(b"xml ");
    bytes.extend_from_slice(xml.as_bytes());
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(b"jp2c");
    bytes.extend_from_slice(&[0xff, 0x4f, 0xff, 0x51]);
    bytes
}

/// Header of an EIT frame observed at `time` (`HH:MM:SS`) on 2011-03-07
pub fn eit_xml(wavelength: u32, time: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><meta><fits>\
         <TELESCOP>SOHO</TELESCOP><INSTRUME>EIT</INSTRUME><DETECTOR>EIT</DETECTOR>\
         <WAVELNTH>{wavelength}</WAVELNTH><DATE-OBS>2011-03-07T{time}.000Z</DATE-OBS>\
         </fits></meta>"
    )
}

/// Header of a LASCO C2 frame with the given compression scale factor
pub fn lasco_c2_xml(time: &str, hcomp_sf: u32) -> String {
    format!(
        "<?xml version=\"1.0\"?><meta><fits>\
         <TELESCOP>SOHO</TELESCOP><INSTRUME>LASCO</INSTRUME><DETECTOR>C2</DETECTOR>\
         <DATE-OBS>2011/03/07</DATE-OBS><TIME-OBS>{time}</TIME-OBS>\
         <HCOMP_SF>{hcomp_sf}</HCOMP_SF></fits></meta>"
    )
}

/// Write `bytes` to `dir/name`, creating `dir`
pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
