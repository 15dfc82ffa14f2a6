//! Intel HEX decoding and encoding
//!
//! Record parsing and checksums are handled by the `ihex` crate. This module
//! tracks the extended address state, keeps line numbers for error messages
//! and lays out blocks of memory as records.

use ihex::Record;

use crate::error::{Error, Result};

/// Maximum number of data bytes per record when encoding
const RECORD_DATA_LEN: usize = 16;

/// A data record with its absolute address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRecord<'a> {
    /// 1-based line number in the source text
    pub line: usize,
    /// Absolute address of the first byte
    pub address: u32,
    /// Payload
    pub data: &'a [u8],
}

/// A contiguous block of memory to be written to a hex file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block<'a> {
    /// Hex-file address of `data[0]`
    pub address: u32,
    /// Contents
    pub data: &'a [u8],
}

/// Decode a hex file, passing every data record to `sink` in file order
///
/// Blank lines are skipped. Decoding stops at the End Of File record; a file
/// without one is an error. Start address records carry no memory contents
/// and are ignored.
pub fn decode<F>(text: &str, mut sink: F) -> Result<()>
where
    F: FnMut(DataRecord<'_>) -> Result<()>,
{
    let mut base: u32 = 0;
    let mut line_count = 0;

    for (index, raw) in split_lines(text).enumerate() {
        let line = index + 1;
        line_count = line;

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record = Record::from_record_string(trimmed).map_err(|e| Error::HexSyntax {
            line,
            message: e.to_string(),
        })?;

        match record {
            Record::Data { offset, value } => {
                if value.is_empty() {
                    continue;
                }
                sink(DataRecord {
                    line,
                    address: base + offset as u32,
                    data: &value,
                })?;
            }
            Record::ExtendedLinearAddress(upper) => base = (upper as u32) << 16,
            Record::ExtendedSegmentAddress(segment) => base = (segment as u32) * 16,
            Record::StartSegmentAddress { .. } | Record::StartLinearAddress(_) => {}
            Record::EndOfFile => return Ok(()),
        }
    }

    Err(Error::MissingEof {
        line: line_count + 1,
    })
}

/// Split text into lines ended by `\r\n`, `\n` or a bare `\r`
fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = Some(text);
    std::iter::from_fn(move || {
        let current = rest.take().filter(|r| !r.is_empty())?;
        match current.find(&['\r', '\n'][..]) {
            Some(i) => {
                let ending = if current[i..].starts_with("\r\n") { 2 } else { 1 };
                rest = Some(&current[i + ending..]);
                Some(&current[..i])
            }
            None => Some(current),
        }
    })
}

/// Encode blocks of memory as a hex file
///
/// Each record holds at most 16 bytes and never crosses a 64 KiB boundary.
/// An Extended Linear Address record is emitted whenever the upper 16 bits
/// of the address change; addresses below 64 KiB at the start of the file
/// need none.
pub fn encode(blocks: &[Block<'_>]) -> Result<String> {
    let mut records = Vec::new();
    let mut upper: u32 = 0;

    for block in blocks {
        let end = block.address as u64 + block.data.len() as u64;
        if end > u32::MAX as u64 + 1 {
            return Err(Error::HexEncode(format!(
                "block at 0x{:08X} extends past the 32-bit address space",
                block.address
            )));
        }

        let mut pos = 0usize;
        while pos < block.data.len() {
            let address = block.address + pos as u32;

            if address >> 16 != upper {
                upper = address >> 16;
                records.push(Record::ExtendedLinearAddress(upper as u16));
            }

            let to_boundary = 0x1_0000 - (address & 0xFFFF) as usize;
            let len = RECORD_DATA_LEN
                .min(block.data.len() - pos)
                .min(to_boundary);

            records.push(Record::Data {
                offset: address as u16,
                value: block.data[pos..pos + len].to_vec(),
            });
            pos += len;
        }
    }
    records.push(Record::EndOfFile);

    let mut text = ihex::create_object_file_representation(&records)
        .map_err(|e| Error::HexEncode(e.to_string()))?;
    if !text.ends_with('\n') {
        text.push('\n');
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(text: &str) -> Result<Vec<(usize, u32, Vec<u8>)>> {
        let mut out = Vec::new();
        decode(text, |r| {
            out.push((r.line, r.address, r.data.to_vec()));
            Ok(())
        })?;
        Ok(out)
    }

    #[test]
    fn test_decode_data_and_extended_address() {
        let text = ":0400000001020304F2\n:0200000400F00A\n:02000000AABB99\n:00000001FF\n";
        let records = collect(text).unwrap();
        assert_eq!(
            records,
            vec![
                (1, 0x0000, vec![1, 2, 3, 4]),
                (3, 0xF0_0000, vec![0xAA, 0xBB]),
            ]
        );
    }

    #[test]
    fn test_decode_handles_crlf_and_blank_lines() {
        let text = ":0400000001020304F2\r\n\r\n:00000001FF\r\n";
        let records = collect(text).unwrap();
        assert_eq!(records, vec![(1, 0, vec![1, 2, 3, 4])]);
    }

    #[test]
    fn test_decode_handles_bare_cr_line_endings() {
        let text = ":0400000001020304F2\r:0400000001020304F3\r:00000001FF\r";
        match collect(text) {
            Err(Error::HexSyntax { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {:?}", other),
        }

        let text = ":0400000001020304F2\r\r:00000001FF\r";
        assert_eq!(collect(text).unwrap(), vec![(1, 0, vec![1, 2, 3, 4])]);
    }

    #[test]
    fn test_split_lines_mixed_endings() {
        let lines: Vec<&str> = split_lines("a\r\nb\rc\n\nd").collect();
        assert_eq!(lines, vec!["a", "b", "c", "", "d"]);
    }

    #[test]
    fn test_decode_stops_at_eof_record() {
        let text = ":00000001FF\nthis is not a record\n";
        assert!(collect(text).unwrap().is_empty());
    }

    #[test]
    fn test_decode_bad_checksum_reports_line() {
        let text = ":0400000001020304F2\n:0400000001020304F3\n:00000001FF\n";
        match collect(text) {
            Err(Error::HexSyntax { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_decode_missing_eof() {
        let text = ":0400000001020304F2\n";
        assert!(matches!(collect(text), Err(Error::MissingEof { line: 2 })));
    }

    #[test]
    fn test_decode_segment_address() {
        // Segment 0x1000 -> base 0x10000
        let text = ":020000021000EC\n:0100000055AA\n:00000001FF\n";
        let records = collect(text).unwrap();
        assert_eq!(records, vec![(2, 0x1_0000, vec![0x55])]);
    }

    #[test]
    fn test_encode_splits_records() {
        let data: Vec<u8> = (0..40).collect();
        let text = encode(&[Block {
            address: 0x2000,
            data: &data,
        }])
        .unwrap();

        let lines: Vec<_> = text.lines().collect();
        // 16 + 16 + 8 bytes, then EOF. No extended address below 64 KiB.
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with(":10200000"));
        assert!(lines[2].starts_with(":08202000"));
        assert_eq!(lines[3], ":00000001FF");
    }

    #[test]
    fn test_encode_emits_extended_linear_address() {
        let text = encode(&[Block {
            address: 0xF0_0000,
            data: &[0x12, 0x34],
        }])
        .unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], ":0200000400F00A");
        assert!(lines[1].starts_with(":02000000"));
    }

    #[test]
    fn test_encode_does_not_cross_64k_boundary() {
        let data = [0xEE; 8];
        let text = encode(&[Block {
            address: 0xFFFC,
            data: &data,
        }])
        .unwrap();
        let records = collect(&text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].1, 0xFFFC);
        assert_eq!(records[0].2.len(), 4);
        assert_eq!(records[1].1, 0x1_0000);
        assert_eq!(records[1].2.len(), 4);
    }
}
