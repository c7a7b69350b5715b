//! Registry.pol (PReg) codec.
//!
//! Layout:
//! ```text
//! "PReg" [version: u32 LE = 1]
//! { "[" key\0 ";" value_name\0 ";" type:u32 ";" size:u32 ";" data[size] "]" }*
//! ```
//! Strings and the bracket/separator characters are UTF-16LE code units.

use std::fs;
use std::path::Path;

use crate::error::ParseError;
use crate::merge::PolicyParser;
use crate::policy::{EntryMetadata, PolicyEntry};
use crate::value::{PolicyValue, RegType};

/// File signature.
pub const SIGNATURE: [u8; 4] = *b"PReg";

/// The only version ever shipped.
pub const VERSION: u32 = 1;

const OPEN: u16 = b'[' as u16;
const SEP: u16 = b';' as u16;
const CLOSE: u16 = b']' as u16;

/// Parser for binary Registry.pol files.
#[derive(Debug, Clone, Copy, Default)]
pub struct PregParser;

impl PolicyParser for PregParser {
    fn parse(&self, path: &Path) -> Result<Vec<PolicyEntry>, ParseError> {
        let is_pol = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pol"));
        if !is_pol {
            return Err(ParseError::UnsupportedFormat {
                path: path.to_path_buf(),
            });
        }

        let data = fs::read(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries = parse_bytes(&data)?;
        Ok(entries.into_iter().map(|e| e.with_source(path)).collect())
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(ParseError::Truncated { offset: self.pos })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, ParseError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, ParseError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn expect(&mut self, unit: u16) -> Result<(), ParseError> {
        let offset = self.pos;
        let found = self.u16()?;
        if found == unit {
            Ok(())
        } else {
            Err(ParseError::Malformed {
                offset,
                reason: format!(
                    "expected '{}', found 0x{found:04x}",
                    char::from_u32(u32::from(unit)).unwrap_or('?')
                ),
            })
        }
    }

    /// Reads a NUL-terminated UTF-16LE string.
    fn string_z(&mut self) -> Result<String, ParseError> {
        let offset = self.pos;
        let mut units = Vec::new();
        loop {
            match self.u16()? {
                0 => break,
                u => units.push(u),
            }
        }
        String::from_utf16(&units).map_err(|e| ParseError::Malformed {
            offset,
            reason: format!("invalid UTF-16: {e}"),
        })
    }
}

/// Parses the contents of a Registry.pol file.
///
/// # Errors
/// Returns `ParseError` on a bad header or any malformed record.
pub fn parse_bytes(data: &[u8]) -> Result<Vec<PolicyEntry>, ParseError> {
    let mut r = Reader { data, pos: 0 };

    if r.take(4).map_err(|_| ParseError::BadSignature)? != SIGNATURE {
        return Err(ParseError::BadSignature);
    }
    let version = r.u32()?;
    if version != VERSION {
        return Err(ParseError::UnsupportedVersion { version });
    }

    let mut entries = Vec::new();
    while !r.at_end() {
        r.expect(OPEN)?;
        let key = r.string_z()?;
        r.expect(SEP)?;
        let value_name = r.string_z()?;
        r.expect(SEP)?;
        let type_code = r.u32()?;
        r.expect(SEP)?;
        let size = r.u32()?;
        r.expect(SEP)?;
        let data_offset = r.pos;
        let raw = r.take(size as usize)?;
        r.expect(CLOSE)?;

        let value = decode_value(type_code, raw).map_err(|reason| ParseError::Malformed {
            offset: data_offset,
            reason,
        })?;

        entries.push(PolicyEntry {
            key,
            value_name,
            value,
            metadata: EntryMetadata {
                source: None,
                type_code,
                size,
            },
        });
    }

    Ok(entries)
}

fn utf16_units(raw: &[u8]) -> Result<Vec<u16>, String> {
    if raw.len() % 2 != 0 {
        return Err(format!("odd string data length {}", raw.len()));
    }
    Ok(raw
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect())
}

fn decode_string(raw: &[u8]) -> Result<String, String> {
    let mut units = utf16_units(raw)?;
    while units.last() == Some(&0) {
        units.pop();
    }
    String::from_utf16(&units).map_err(|e| format!("invalid UTF-16: {e}"))
}

fn fixed<const N: usize>(raw: &[u8], what: &str) -> Result<[u8; N], String> {
    raw.try_into()
        .map_err(|_| format!("{what} needs {N} bytes, got {}", raw.len()))
}

fn decode_value(type_code: u32, raw: &[u8]) -> Result<PolicyValue, String> {
    let value = match RegType::from_code(type_code) {
        Some(RegType::Sz) => PolicyValue::String(decode_string(raw)?),
        Some(RegType::ExpandSz) => PolicyValue::ExpandString(decode_string(raw)?),
        Some(RegType::Link) => PolicyValue::Link(decode_string(raw)?),
        Some(RegType::MultiSz) => {
            let units = utf16_units(raw)?;
            let mut items = Vec::new();
            for part in units.split(|&u| u == 0) {
                if !part.is_empty() {
                    items.push(String::from_utf16(part).map_err(|e| format!("invalid UTF-16: {e}"))?);
                }
            }
            PolicyValue::MultiString(items)
        }
        Some(RegType::Dword) => PolicyValue::Dword(u32::from_le_bytes(fixed(raw, "REG_DWORD")?)),
        Some(RegType::DwordBigEndian) => {
            PolicyValue::DwordBigEndian(u32::from_be_bytes(fixed(raw, "REG_DWORD_BIG_ENDIAN")?))
        }
        Some(RegType::Qword) => PolicyValue::Qword(u64::from_le_bytes(fixed(raw, "REG_QWORD")?)),
        Some(RegType::None) if raw.is_empty() => PolicyValue::None,
        _ => PolicyValue::Binary(raw.to_vec()),
    };
    Ok(value)
}

fn push_units(out: &mut Vec<u8>, s: &str) {
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
}

fn encode_value(value: &PolicyValue) -> Vec<u8> {
    let mut out = Vec::new();
    match value {
        PolicyValue::String(s) | PolicyValue::ExpandString(s) | PolicyValue::Link(s) => {
            push_units(&mut out, s);
            out.extend_from_slice(&[0, 0]);
        }
        PolicyValue::MultiString(items) => {
            for item in items {
                push_units(&mut out, item);
                out.extend_from_slice(&[0, 0]);
            }
            out.extend_from_slice(&[0, 0]);
        }
        PolicyValue::Dword(v) => out.extend_from_slice(&v.to_le_bytes()),
        PolicyValue::DwordBigEndian(v) => out.extend_from_slice(&v.to_be_bytes()),
        PolicyValue::Qword(v) => out.extend_from_slice(&v.to_le_bytes()),
        PolicyValue::Binary(b) => out.extend_from_slice(b),
        PolicyValue::None => {}
    }
    out
}

/// Serializes entries into Registry.pol bytes.
///
/// Values are written with the type of their `PolicyValue` variant; the
/// raw type code in the metadata is ignored.
#[must_use]
pub fn encode_entries(entries: &[PolicyEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&SIGNATURE);
    out.extend_from_slice(&VERSION.to_le_bytes());

    for entry in entries {
        let data = encode_value(&entry.value);
        out.extend_from_slice(&OPEN.to_le_bytes());
        push_units(&mut out, &entry.key);
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&SEP.to_le_bytes());
        push_units(&mut out, &entry.value_name);
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&SEP.to_le_bytes());
        out.extend_from_slice(&entry.value.reg_type().code().to_le_bytes());
        out.extend_from_slice(&SEP.to_le_bytes());
        #[allow(clippy::cast_possible_truncation)]
        let size = data.len() as u32;
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&SEP.to_le_bytes());
        out.extend_from_slice(&data);
        out.extend_from_slice(&CLOSE.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const UNITS_KEY: &str = "Software\\BaseALT\\Policies\\SystemdUnits";

    #[test]
    fn decodes_all_common_types() {
        let entries = vec![
            PolicyEntry::new(UNITS_KEY, "sshd.service", PolicyValue::Dword(1)),
            PolicyEntry::new(UNITS_KEY, "cups.service", PolicyValue::Dword(0)),
            PolicyEntry::new("Software\\Policies\\Test", "Motd", PolicyValue::String("Welcome".into())),
            PolicyEntry::new("Software\\Policies\\Test", "Path", PolicyValue::ExpandString("%HOME%\\bin".into())),
            PolicyEntry::new(
                "Software\\Policies\\Test",
                "Servers",
                PolicyValue::MultiString(vec!["ntp1".into(), "ntp2".into()]),
            ),
            PolicyEntry::new("Software\\Policies\\Test", "Quota", PolicyValue::Qword(1 << 33)),
            PolicyEntry::new("Software\\Policies\\Test", "Flags", PolicyValue::DwordBigEndian(0x0102_0304)),
            PolicyEntry::new("Software\\Policies\\Test", "Blob", PolicyValue::Binary(vec![1, 2, 3])),
            PolicyEntry::new("Software\\Policies\\Test", "**del.Old", PolicyValue::None),
        ];

        let parsed = parse_bytes(&encode_entries(&entries)).unwrap();
        assert_eq!(parsed.len(), entries.len());
        for (got, want) in parsed.iter().zip(&entries) {
            assert_eq!(got.key, want.key);
            assert_eq!(got.value_name, want.value_name);
            assert_eq!(got.value, want.value);
        }
        assert_eq!(parsed[0].metadata.type_code, 4);
        assert_eq!(parsed[0].metadata.size, 4);
    }

    #[test]
    fn empty_body_is_valid() {
        let parsed = parse_bytes(&encode_entries(&[])).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn rejects_bad_header() {
        assert!(matches!(parse_bytes(b"PRe"), Err(ParseError::BadSignature)));
        assert!(matches!(parse_bytes(b"NOPE\x01\x00\x00\x00"), Err(ParseError::BadSignature)));
        assert!(matches!(
            parse_bytes(b"PReg\x02\x00\x00\x00"),
            Err(ParseError::UnsupportedVersion { version: 2 })
        ));
    }

    #[test]
    fn rejects_truncated_record() {
        let bytes = encode_entries(&[PolicyEntry::new(UNITS_KEY, "sshd.service", PolicyValue::Dword(1))]);
        let cut = &bytes[..bytes.len() - 3];
        assert!(matches!(parse_bytes(cut), Err(ParseError::Truncated { .. })));
    }

    #[test]
    fn rejects_missing_separator() {
        let mut bytes = encode_entries(&[PolicyEntry::new("K", "V", PolicyValue::Dword(1))]);
        // The ';' after the key "K\0" sits at header(8) + '['(2) + "K\0"(4).
        bytes[14] = b'x';
        let err = parse_bytes(&bytes).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { offset: 14, .. }));
    }

    #[test]
    fn rejects_short_dword() {
        let mut entry = encode_entries(&[PolicyEntry::new("K", "V", PolicyValue::Binary(vec![1, 2]))]);
        // Rewrite the type code (REG_BINARY -> REG_DWORD); size stays 2.
        let type_offset = 8 + 2 + 4 + 2 + 4 + 2;
        entry[type_offset] = 4;
        assert!(matches!(parse_bytes(&entry), Err(ParseError::Malformed { .. })));
    }

    #[test]
    fn unknown_type_is_kept_as_binary() {
        let mut bytes = encode_entries(&[PolicyEntry::new("K", "V", PolicyValue::Binary(vec![9]))]);
        let type_offset = 8 + 2 + 4 + 2 + 4 + 2;
        bytes[type_offset] = 9;
        let parsed = parse_bytes(&bytes).unwrap();
        assert_eq!(parsed[0].value, PolicyValue::Binary(vec![9]));
        assert_eq!(parsed[0].metadata.type_code, 9);
    }

    #[test]
    fn parser_reads_file_and_records_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Registry.pol");
        fs::write(&path, encode_entries(&[PolicyEntry::new("K", "V", PolicyValue::Dword(7))])).unwrap();

        let entries = PregParser.parse(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].metadata.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn parser_rejects_other_formats() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("local.xml");
        fs::write(&path, b"<policy/>").unwrap();
        assert!(matches!(PregParser.parse(&path), Err(ParseError::UnsupportedFormat { .. })));
        assert!(matches!(
            PregParser.parse(&dir.path().join("missing.pol")),
            Err(ParseError::Io { .. })
        ));
    }
}
