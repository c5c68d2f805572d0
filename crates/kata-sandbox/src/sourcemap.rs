//! Source-map encoding, decoding, and error-location remapping.
//!
//! Implements the v3 source-map `mappings` format: base64 VLQ with 5-bit
//! chunks, a continuation bit at 0x20, the sign in the low bit of the
//! reassembled value, and cumulative deltas across segment fields. `;`
//! separates generated lines, `,` separates segments within a line.
//!
//! Remapping is best-effort by contract: when no map exists or no segment
//! matches, callers fall back to the raw generated location (or the bare
//! message). Remapping never blocks error reporting.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SourceLocation;

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Continuation bit in a VLQ chunk.
const VLQ_CONTINUATION: u32 = 0x20;
/// Value mask of a VLQ chunk (low 5 bits).
const VLQ_MASK: u32 = 0x1f;

/// Pattern extracting the trailing `file:line:col` of a formatted error.
static STACK_LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([\w$./\-]+):(\d+):(\d+)").unwrap_or_else(|_| unreachable!())
});

/// One decoded mapping segment on a generated line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// 0-based column in the generated line.
    pub generated_column: u32,
    /// Index into the map's `sources`.
    pub source_index: u32,
    /// 0-based original line.
    pub original_line: u32,
    /// 0-based original column.
    pub original_column: u32,
}

/// The wire form of a source map, as attached to a compiled module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSourceMap {
    /// Always 3.
    pub version: u32,
    /// Original source file names.
    pub sources: Vec<String>,
    /// VLQ-encoded mappings.
    pub mappings: String,
}

/// A decoded source map with a per-generated-line segment index.
#[derive(Debug, Clone)]
pub struct SourceMap {
    sources: Vec<String>,
    /// `lines[i]` holds the segments of generated line `i` (0-based),
    /// sorted by `generated_column`.
    lines: Vec<Vec<Segment>>,
}

impl SourceMap {
    /// Builds a map directly from per-line segments (encoder side).
    #[must_use]
    pub fn from_segments(sources: Vec<String>, lines: Vec<Vec<Segment>>) -> Self {
        Self { sources, lines }
    }

    /// Decodes a raw map. Malformed VLQ runs are skipped rather than
    /// failing the whole map.
    #[must_use]
    pub fn decode(raw: &RawSourceMap) -> Self {
        let mut lines = Vec::new();
        // Cumulative deltas: generated column resets per line, the source
        // index / original line / original column accumulate across lines.
        let mut src_idx: i64 = 0;
        let mut orig_line: i64 = 0;
        let mut orig_col: i64 = 0;

        for line in raw.mappings.split(';') {
            let mut segments = Vec::new();
            let mut gen_col: i64 = 0;
            for chunk in line.split(',') {
                if chunk.is_empty() {
                    continue;
                }
                let Some(fields) = decode_vlq_fields(chunk) else {
                    continue;
                };
                if fields.is_empty() {
                    continue;
                }
                gen_col += fields[0];
                if fields.len() >= 4 {
                    src_idx += fields[1];
                    orig_line += fields[2];
                    orig_col += fields[3];
                    segments.push(Segment {
                        generated_column: clamp_u32(gen_col),
                        source_index: clamp_u32(src_idx),
                        original_line: clamp_u32(orig_line),
                        original_column: clamp_u32(orig_col),
                    });
                }
            }
            segments.sort_by_key(|s| s.generated_column);
            lines.push(segments);
        }

        Self {
            sources: raw.sources.clone(),
            lines,
        }
    }

    /// Encodes this map back to its wire form.
    #[must_use]
    pub fn encode(&self) -> RawSourceMap {
        let mut mappings = String::new();
        let mut src_idx: i64 = 0;
        let mut orig_line: i64 = 0;
        let mut orig_col: i64 = 0;

        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                mappings.push(';');
            }
            let mut gen_col: i64 = 0;
            for (j, seg) in line.iter().enumerate() {
                if j > 0 {
                    mappings.push(',');
                }
                encode_vlq(&mut mappings, i64::from(seg.generated_column) - gen_col);
                encode_vlq(&mut mappings, i64::from(seg.source_index) - src_idx);
                encode_vlq(&mut mappings, i64::from(seg.original_line) - orig_line);
                encode_vlq(&mut mappings, i64::from(seg.original_column) - orig_col);
                gen_col = i64::from(seg.generated_column);
                src_idx = i64::from(seg.source_index);
                orig_line = i64::from(seg.original_line);
                orig_col = i64::from(seg.original_column);
            }
        }

        RawSourceMap {
            version: 3,
            sources: self.sources.clone(),
            mappings,
        }
    }

    /// Maps a generated `(line, column)` (1-based line, 0-based column)
    /// back to an original-source location.
    ///
    /// Selects the last segment on the generated line whose
    /// `generated_column <= column`. Returns `None` if the line has no
    /// usable segment.
    #[must_use]
    pub fn lookup(&self, line: u32, column: u32) -> Option<SourceLocation> {
        let idx = line.checked_sub(1)? as usize;
        let segments = self.lines.get(idx)?;
        let seg = segments
            .iter()
            .rev()
            .find(|s| s.generated_column <= column)?;
        let file = self.sources.get(seg.source_index as usize)?.clone();
        Some(SourceLocation {
            file,
            line: seg.original_line + 1,
            column: seg.original_column,
        })
    }

    /// The original source file names.
    #[must_use]
    pub fn sources(&self) -> &[String] {
        &self.sources
    }
}

/// Parses the last `file:line:col` occurrence out of a formatted error.
///
/// Returns the generated location (1-based line, 0-based column kept as
/// written). Used by the host to find the frame to remap.
#[must_use]
pub fn parse_stack_location(text: &str) -> Option<(String, u32, u32)> {
    let caps = STACK_LOCATION.captures_iter(text).last()?;
    let file = caps.get(1)?.as_str().to_string();
    let line = caps.get(2)?.as_str().parse().ok()?;
    let col = caps.get(3)?.as_str().parse().ok()?;
    Some((file, line, col))
}

/// Encodes one signed value as base64 VLQ onto `out`.
fn encode_vlq(out: &mut String, value: i64) {
    // Sign goes in the low bit of the reassembled value.
    let mut v: u64 = if value < 0 {
        (value.unsigned_abs() << 1) | 1
    } else {
        (value as u64) << 1
    };
    loop {
        let mut digit = (v & u64::from(VLQ_MASK)) as u32;
        v >>= 5;
        if v > 0 {
            digit |= VLQ_CONTINUATION;
        }
        out.push(BASE64_ALPHABET[digit as usize] as char);
        if v == 0 {
            break;
        }
    }
}

/// Decodes every VLQ field in one segment chunk. Returns `None` on any
/// character outside the base64 alphabet or a dangling continuation.
fn decode_vlq_fields(chunk: &str) -> Option<Vec<i64>> {
    let mut fields = Vec::new();
    let mut value: u64 = 0;
    let mut shift = 0u32;
    let mut in_value = false;

    for ch in chunk.bytes() {
        let digit = base64_value(ch)?;
        value |= u64::from(digit & VLQ_MASK) << shift;
        in_value = true;
        if digit & VLQ_CONTINUATION == 0 {
            // Low bit is the sign of the reassembled value.
            let negative = value & 1 == 1;
            let magnitude = (value >> 1) as i64;
            fields.push(if negative { -magnitude } else { magnitude });
            value = 0;
            shift = 0;
            in_value = false;
        } else {
            shift += 5;
        }
    }

    if in_value {
        return None; // dangling continuation bit
    }
    Some(fields)
}

fn base64_value(ch: u8) -> Option<u32> {
    match ch {
        b'A'..=b'Z' => Some(u32::from(ch - b'A')),
        b'a'..=b'z' => Some(u32::from(ch - b'a') + 26),
        b'0'..=b'9' => Some(u32::from(ch - b'0') + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_u32(v: i64) -> u32 {
    v.clamp(0, i64::from(u32::MAX)) as u32
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn seg(gen_col: u32, src: u32, line: u32, col: u32) -> Segment {
        Segment {
            generated_column: gen_col,
            source_index: src,
            original_line: line,
            original_column: col,
        }
    }

    #[test]
    fn test_vlq_round_trip_values() {
        for value in [0i64, 1, -1, 15, -16, 16, 31, 32, 1023, -1024, 123_456] {
            let mut encoded = String::new();
            encode_vlq(&mut encoded, value);
            let decoded = decode_vlq_fields(&encoded).unwrap();
            assert_eq!(decoded, vec![value], "value {value}, encoded {encoded}");
        }
    }

    #[test]
    fn test_known_encodings() {
        // "AAAA" is four zero deltas; "IAAI" is col +4, same source/line, col +4.
        let fields = decode_vlq_fields("AAAA").unwrap();
        assert_eq!(fields, vec![0, 0, 0, 0]);
        let fields = decode_vlq_fields("IAAI").unwrap();
        assert_eq!(fields, vec![4, 0, 0, 4]);
    }

    #[test]
    fn test_map_round_trip() {
        let map = SourceMap::from_segments(
            vec!["App.tsx".to_string()],
            vec![
                vec![seg(0, 0, 0, 0)],
                vec![seg(0, 0, 1, 0), seg(10, 0, 1, 6), seg(24, 0, 1, 30)],
                vec![],
                vec![seg(2, 0, 3, 2)],
            ],
        );
        let raw = map.encode();
        assert_eq!(raw.version, 3);
        let decoded = SourceMap::decode(&raw);
        assert_eq!(decoded.sources(), map.sources());
        for line in 1..=4u32 {
            for col in [0u32, 5, 11, 25, 40] {
                assert_eq!(
                    decoded.lookup(line, col),
                    map.lookup(line, col),
                    "line {line} col {col}"
                );
            }
        }
    }

    #[test]
    fn test_lookup_selects_last_segment_at_or_before_column() {
        let map = SourceMap::from_segments(
            vec!["a.ts".to_string()],
            vec![vec![seg(0, 0, 0, 0), seg(8, 0, 0, 12), seg(20, 0, 0, 40)]],
        );

        let at_7 = map.lookup(1, 7).unwrap();
        assert_eq!(at_7.column, 0);
        let at_8 = map.lookup(1, 8).unwrap();
        assert_eq!(at_8.column, 12);
        let at_100 = map.lookup(1, 100).unwrap();
        assert_eq!(at_100.column, 40);
    }

    #[test]
    fn test_lookup_degrades_gracefully() {
        let map = SourceMap::from_segments(vec!["a.ts".to_string()], vec![vec![]]);
        assert!(map.lookup(1, 0).is_none()); // empty line
        assert!(map.lookup(2, 0).is_none()); // out of range
        assert!(map.lookup(0, 0).is_none()); // line numbers are 1-based
    }

    #[test]
    fn test_decode_skips_malformed_chunks() {
        let raw = RawSourceMap {
            version: 3,
            sources: vec!["a.ts".to_string()],
            mappings: "AAAA,????,EAAE".to_string(),
        };
        let map = SourceMap::decode(&raw);
        let loc = map.lookup(1, 2).unwrap();
        assert_eq!(loc.line, 1);
        assert_eq!(loc.column, 2);
    }

    #[test]
    fn test_parse_stack_location() {
        let text = "TypeError: x is not a function\n    at main.ts:12:8";
        let (file, line, col) = parse_stack_location(text).unwrap();
        assert_eq!(file, "main.ts");
        assert_eq!(line, 12);
        assert_eq!(col, 8);

        assert!(parse_stack_location("no location here").is_none());
    }

    #[test]
    fn test_parse_stack_location_takes_last_frame() {
        let text = "boom (utils.ts:3:1) (main.tsx:9:4)";
        let (file, line, col) = parse_stack_location(text).unwrap();
        assert_eq!(file, "main.tsx");
        assert_eq!(line, 9);
        assert_eq!(col, 4);
    }
}
