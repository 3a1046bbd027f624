use indexmap::IndexMap;

use crate::AssetError;

/// Character table mapping text fragments to game-specific byte strings.
///
/// Table files hold one `HEX=text` entry per line, optionally written as
/// `HEX:COUNT=text` for control codes followed by `COUNT` argument bytes.
/// A literal `\n` in the text stands for a newline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextTable {
    lookup: IndexMap<String, Vec<u8>>,
    max_text_len: usize,
}

impl TextTable {
    pub fn parse(source: &str) -> Result<Self, AssetError> {
        let mut table = Self::default();
        for (index, line) in source.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            let Some((code, text)) = line.split_once('=') else {
                continue;
            };
            let code = code.trim();
            let code = code.split_once(':').map_or(code, |(bytes, _)| bytes);
            if code.is_empty() || !code.chars().all(|ch| ch.is_ascii_hexdigit()) {
                continue;
            }
            if text.is_empty() {
                continue;
            }
            let bytes = parse_hex_bytes(code).ok_or_else(|| AssetError::InvalidTable {
                line: index + 1,
                message: format!("odd number of hex digits in '{code}'"),
            })?;
            table.insert(text.replace("\\n", "\n"), bytes);
        }
        Ok(table)
    }

    pub fn insert(&mut self, text: impl Into<String>, bytes: Vec<u8>) {
        let text = text.into();
        self.max_text_len = self.max_text_len.max(text.chars().count());
        self.lookup.insert(text, bytes);
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    /// Encodes `text`, preferring the longest matching entry at each
    /// position. `[0xNN]` inserts a raw byte; characters without an entry
    /// are skipped.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let mut out = Vec::with_capacity(text.len());
        let mut position = 0;
        while position < chars.len() {
            let start = chars[position].0;
            let remainder = &text[start..];

            if let Some((byte, consumed)) = parse_raw_byte(remainder) {
                out.push(byte);
                position += consumed;
                continue;
            }

            let longest = self.max_text_len.min(chars.len() - position);
            let matched = (1..=longest).rev().find_map(|len| {
                let end = chars
                    .get(position + len)
                    .map_or(text.len(), |(offset, _)| *offset);
                self.lookup.get(&text[start..end]).map(|bytes| (bytes, len))
            });

            match matched {
                Some((bytes, len)) => {
                    out.extend_from_slice(bytes);
                    position += len;
                }
                None => position += 1,
            }
        }
        out
    }
}

fn parse_hex_bytes(code: &str) -> Option<Vec<u8>> {
    if code.len() % 2 != 0 {
        return None;
    }
    (0..code.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(&code[index..index + 2], 16).ok())
        .collect()
}

// `[0xNN]` escape, returning the byte and the number of chars consumed.
fn parse_raw_byte(text: &str) -> Option<(u8, usize)> {
    let rest = text.strip_prefix("[0x")?;
    let close = rest.find(']')?;
    let digits = &rest[..close];
    if digits.is_empty() || digits.len() > 2 {
        return None;
    }
    let byte = u8::from_str_radix(digits, 16).ok()?;
    Some((byte, 3 + digits.len() + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "00=A\n01=B\n0401=Cain\n02:1=[space]\n10=\\n\nFE\n/FF=end\n";

    #[test]
    fn parses_entries_and_skips_noise() {
        let table = TextTable::parse(TABLE).expect("parse");
        assert_eq!(table.len(), 5);
        assert_eq!(table.encode("\n"), vec![0x10]);
    }

    #[test]
    fn prefers_longest_match() {
        let table = TextTable::parse(TABLE).expect("parse");
        assert_eq!(table.encode("Cain"), vec![0x04, 0x01]);
        assert_eq!(table.encode("AB"), vec![0x00, 0x01]);
    }

    #[test]
    fn raw_bytes_and_unknown_characters() {
        let table = TextTable::parse(TABLE).expect("parse");
        assert_eq!(table.encode("[0x40]A"), vec![0x40, 0x00]);
        assert_eq!(table.encode("Aé?B"), vec![0x00, 0x01]);
    }

    #[test]
    fn rejects_odd_hex_codes() {
        let err = TextTable::parse("123=x").expect_err("odd digits");
        assert!(matches!(err, AssetError::InvalidTable { line: 1, .. }));
    }
}
