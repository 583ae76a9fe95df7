//! Parser for LRC synced lyrics.
//!
//! # Format
//! ```text
//! [00:12.34] Primera línea
//! [00:15.120] Segunda línea
//! [00:18:50] Tercera línea
//! ```
//!
//! Fractions of two digits are hundredths, three digits are milliseconds.
//! Lines without a leading timestamp and lines with no text are ignored.

use serde::{Deserialize, Serialize};

/// How long the final line stays on screen.
const LAST_LINE_MS: i64 = 5000;

/// A timed lyric line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LrcLine {
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub text: String,
}

/// Parse LRC content into timed lines.
pub fn parse_lrc(content: &str) -> Vec<LrcLine> {
    let mut lines: Vec<LrcLine> = content
        .lines()
        .filter_map(|line| parse_line(line.trim()))
        .filter(|(_, text)| !text.is_empty())
        .map(|(start_time_ms, text)| LrcLine {
            start_time_ms,
            end_time_ms: start_time_ms,
            text: text.to_string(),
        })
        .collect();

    let starts: Vec<i64> = lines.iter().map(|l| l.start_time_ms).collect();
    for (i, line) in lines.iter_mut().enumerate() {
        line.end_time_ms = match starts.get(i + 1) {
            Some(next) => *next,
            None => line.start_time_ms + LAST_LINE_MS,
        };
    }
    lines
}

/// Split `[mm:ss.xx] text` into a start time and trimmed text.
fn parse_line(line: &str) -> Option<(i64, &str)> {
    let rest = line.strip_prefix('[')?;
    let close = rest.find(']')?;
    let (stamp, text) = (&rest[..close], &rest[close + 1..]);

    if !stamp.is_ascii() {
        return None;
    }
    let bytes = stamp.as_bytes();
    if !(8..=9).contains(&bytes.len()) || bytes[2] != b':' || !matches!(bytes[5], b'.' | b':') {
        return None;
    }
    let minutes = two_digits(&stamp[0..2])?;
    let seconds = two_digits(&stamp[3..5])?;
    let fraction = &stamp[6..];
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let fraction_value: i64 = fraction.parse().ok()?;
    let millis = if fraction.len() == 2 {
        fraction_value * 10
    } else {
        fraction_value
    };

    Some(((minutes * 60 + seconds) * 1000 + millis, text.trim()))
}

fn two_digits(s: &str) -> Option<i64> {
    if s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok()
    } else {
        None
    }
}
