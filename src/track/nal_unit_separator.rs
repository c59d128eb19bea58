use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// NalUnitSeparator describes how NAL units are delimited in the frames
/// handed to a track.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NalUnitSeparator {
    /// Each unit is prefixed with its size as a 32-bit big-endian integer.
    #[default]
    #[serde(rename = "length")]
    Length,
    /// Units are separated by 0x00000001.
    #[serde(rename = "long-start-sequence")]
    LongStartSequence,
    /// Units are separated by 0x000001.
    #[serde(rename = "short-start-sequence")]
    ShortStartSequence,
    /// Units are separated by either start sequence.
    #[serde(rename = "start-sequence")]
    StartSequence,
}

const LENGTH_PREFIX_SIZE: usize = 4;

impl NalUnitSeparator {
    /// split cuts `data` into NAL units, dropping the separators. Data
    /// without any separator is returned as a single unit.
    pub fn split(&self, data: &Bytes) -> Vec<Bytes> {
        let units = match self {
            NalUnitSeparator::Length => split_length_prefixed(data),
            NalUnitSeparator::LongStartSequence => split_start_sequences(data, true, false),
            NalUnitSeparator::ShortStartSequence => split_start_sequences(data, false, true),
            NalUnitSeparator::StartSequence => split_start_sequences(data, true, true),
        };

        if units.is_empty() && !data.is_empty() {
            vec![data.clone()]
        } else {
            units
        }
    }
}

fn split_length_prefixed(data: &Bytes) -> Vec<Bytes> {
    let mut units = vec![];
    let mut offset = 0;
    while offset + LENGTH_PREFIX_SIZE <= data.len() {
        let len = u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as usize;
        offset += LENGTH_PREFIX_SIZE;

        // a truncated unit keeps what is there
        let end = (offset + len).min(data.len());
        if end > offset {
            units.push(data.slice(offset..end));
        }
        offset = end;
    }
    units
}

/// split_start_sequences finds 0x000001 codes, folding a preceding zero into
/// the code when long sequences are allowed.
fn split_start_sequences(data: &Bytes, long: bool, short: bool) -> Vec<Bytes> {
    // (code start, payload start)
    let mut codes = vec![];
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            let is_long = i > 0 && data[i - 1] == 0;
            if long && is_long {
                codes.push((i - 1, i + 3));
            } else if short {
                codes.push((i, i + 3));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut units = vec![];
    for (n, &(_, start)) in codes.iter().enumerate() {
        let end = codes.get(n + 1).map_or(data.len(), |&(next, _)| next);
        if end > start {
            units.push(data.slice(start..end));
        }
    }
    units
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_nal_unit_separator_split() {
        let tests = vec![
            (
                "length prefixed",
                NalUnitSeparator::Length,
                vec![0, 0, 0, 2, 0x67, 0x42, 0, 0, 0, 1, 0x68],
                vec![vec![0x67, 0x42], vec![0x68]],
            ),
            (
                "length truncated",
                NalUnitSeparator::Length,
                vec![0, 0, 0, 5, 0x65, 0x88],
                vec![vec![0x65, 0x88]],
            ),
            (
                "long start sequence",
                NalUnitSeparator::LongStartSequence,
                vec![0, 0, 0, 1, 0x67, 0x42, 0, 0, 0, 1, 0x68],
                vec![vec![0x67, 0x42], vec![0x68]],
            ),
            (
                "long ignores short codes",
                NalUnitSeparator::LongStartSequence,
                vec![0, 0, 0, 1, 0x67, 0, 0, 1, 0x68],
                vec![vec![0x67, 0, 0, 1, 0x68]],
            ),
            (
                "short start sequence",
                NalUnitSeparator::ShortStartSequence,
                vec![0, 0, 1, 0x67, 0x42, 0, 0, 1, 0x68],
                vec![vec![0x67, 0x42], vec![0x68]],
            ),
            (
                "mixed start sequences",
                NalUnitSeparator::StartSequence,
                vec![0, 0, 0, 1, 0x67, 0, 0, 1, 0x68, 0, 0, 0, 1, 0x65],
                vec![vec![0x67], vec![0x68], vec![0x65]],
            ),
            (
                "no separator",
                NalUnitSeparator::StartSequence,
                vec![0x65, 0x88, 0x84],
                vec![vec![0x65, 0x88, 0x84]],
            ),
            ("empty", NalUnitSeparator::Length, vec![], vec![]),
        ];

        for (name, separator, data, expected) in tests {
            let units = separator.split(&Bytes::from(data));
            let units: Vec<Vec<u8>> = units.iter().map(|u| u.to_vec()).collect();
            assert_eq!(units, expected, "{name}");
        }
    }
}
