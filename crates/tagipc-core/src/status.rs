//! Read-only fixed-width status snapshot of the registry (§6, §4.6).
//!
//! Grounded on `examples/original_source/lib/driver.c`'s `BUFF_LEN` / fixed-record device
//! buffer (the original's `tag_info` callback was never filled in upstream; the 100-byte
//! header text and per-record layout come directly from spec §6). There is no kernel
//! character-device layer in this crate, so the snapshot is produced as an owned `String`
//! rather than streamed through `read`/`Seek`; callers needing byte-offset semantics slice the
//! returned buffer themselves.

use std::fmt::Write as _;

use crate::registry::TagSnapshot;

/// Every header and record line is padded to exactly this many bytes before its newline.
const RECORD_WIDTH: usize = 100;

const HEADER: &str = " TAG-key   TAG-creator   TAG-level   Waiting-threads ";

/// Render the fixed-width snapshot: one header line, then one record per (tag, level) pair
/// for every live tag and every live level. A tag with no levels yet contributes no records.
#[must_use]
pub fn render(tags: &[TagSnapshot]) -> String {
    let mut out = String::with_capacity(RECORD_WIDTH * (tags.len() + 1));
    push_record(&mut out, HEADER);
    for tag in tags {
        let creator = tag.owner_uid.map_or_else(|| "any".to_string(), |uid| uid.to_string());
        for level in &tag.levels {
            let mut line = String::new();
            let _ = write!(
                line,
                " {:<10}{:<15}{:<13}{:<5}",
                tag.key, creator, level.number, level.waiters
            );
            push_record(&mut out, &line);
        }
    }
    out
}

/// Pad `line` to [`RECORD_WIDTH`] bytes (truncating if it somehow overruns) and terminate it
/// with a newline, matching the original device's fixed 100-byte record stride.
fn push_record(out: &mut String, line: &str) {
    if line.len() >= RECORD_WIDTH {
        out.push_str(&line[..RECORD_WIDTH]);
    } else {
        out.push_str(line);
        out.extend(std::iter::repeat(' ').take(RECORD_WIDTH - line.len()));
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::LevelSnapshot;

    #[test]
    fn header_line_is_exactly_record_width() {
        let rendered = render(&[]);
        let header_line = rendered.lines().next().unwrap();
        assert_eq!(header_line.len(), RECORD_WIDTH);
    }

    #[test]
    fn one_record_per_tag_level_pair() {
        let tags = vec![
            TagSnapshot {
                desc: 0,
                key: 7,
                owner_uid: Some(1000),
                levels: vec![
                    LevelSnapshot { number: 0, waiters: 2 },
                    LevelSnapshot { number: 1, waiters: 0 },
                ],
            },
            TagSnapshot {
                desc: 1,
                key: 9,
                owner_uid: None,
                levels: vec![],
            },
        ];
        let rendered = render(&tags);
        let lines: Vec<&str> = rendered.lines().collect();
        // header + two records for desc 0, nothing for desc 1 (no levels yet).
        assert_eq!(lines.len(), 3);
        for line in &lines {
            assert_eq!(line.len(), RECORD_WIDTH);
        }
        assert!(lines[1].contains('7'));
        assert!(lines[1].contains("1000"));
    }
}
