//! Canonical text encoding of probe events

use std::io::Write;

use flowprobe_core::{ProbeEvent, ProbeId, Timestamp};

use crate::error::StorageError;

/// Format one event as a line, without the trailing newline
///
/// Field widths follow the legacy dump layout so existing post-processing
/// scripts keep working.
pub fn format_event(event: &ProbeEvent) -> String {
    format!(
        "{:<4} id {:<2} seq {:<8} thread {:<8} ts {} x{}",
        event.ordinal,
        event.probe_id.0,
        event.sequence,
        event.stream_id,
        event.timestamp,
        event.repeat_count
    )
}

/// Write events as newline-terminated lines, returning the number written
pub fn write_lines<W, I>(events: I, out: &mut W) -> Result<usize, StorageError>
where
    W: Write,
    I: IntoIterator<Item = ProbeEvent>,
{
    let mut written = 0;
    for event in events {
        writeln!(out, "{}", format_event(&event))?;
        written += 1;
    }
    Ok(written)
}

/// Parse a single line produced by [`format_event`]
pub fn parse_line(line: &str) -> Result<ProbeEvent, StorageError> {
    parse_fields(line).map_err(|reason| StorageError::format(1, reason))
}

/// Parse a multi-line export, skipping blank lines
///
/// Line numbers in errors are 1-based.
pub fn parse_lines(text: &str) -> Result<Vec<ProbeEvent>, StorageError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            parse_fields(line).map_err(|reason| StorageError::format(index + 1, reason))
        })
        .collect()
}

fn parse_fields(line: &str) -> Result<ProbeEvent, String> {
    let mut tokens = line.split_whitespace();

    let ordinal: u64 = number(tokens.next(), "ordinal")?;
    expect_label(tokens.next(), "id")?;
    let probe_id: u16 = number(tokens.next(), "id")?;
    expect_label(tokens.next(), "seq")?;
    let sequence: u32 = number(tokens.next(), "seq")?;
    expect_label(tokens.next(), "thread")?;
    let stream_id: u32 = number(tokens.next(), "thread")?;
    expect_label(tokens.next(), "ts")?;
    let timestamp = parse_timestamp(tokens.next().ok_or("missing ts value")?)?;
    let repeat_count: u16 = tokens
        .next()
        .and_then(|token| token.strip_prefix('x'))
        .ok_or("missing repeat count")?
        .parse()
        .map_err(|e| format!("bad repeat count: {e}"))?;

    if let Some(extra) = tokens.next() {
        return Err(format!("unexpected trailing field {extra:?}"));
    }

    Ok(ProbeEvent {
        ordinal,
        probe_id: ProbeId(probe_id),
        timestamp,
        sequence,
        stream_id,
        repeat_count,
    })
}

fn number<T: std::str::FromStr>(token: Option<&str>, field: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    token
        .ok_or_else(|| format!("missing {field} value"))?
        .parse()
        .map_err(|e| format!("bad {field} value: {e}"))
}

fn expect_label(token: Option<&str>, label: &str) -> Result<(), String> {
    match token {
        Some(found) if found == label => Ok(()),
        Some(found) => Err(format!("expected {label:?}, found {found:?}")),
        None => Err(format!("missing {label:?} label")),
    }
}

fn parse_timestamp(token: &str) -> Result<Timestamp, String> {
    let (secs, micros) = token
        .split_once('.')
        .ok_or_else(|| format!("timestamp {token:?} has no fraction"))?;
    if micros.len() != 6 {
        return Err(format!("timestamp fraction {micros:?} is not 6 digits"));
    }
    let secs: i64 = secs
        .parse()
        .map_err(|e| format!("bad timestamp seconds: {e}"))?;
    let micros: u32 = micros
        .parse()
        .map_err(|e| format!("bad timestamp micros: {e}"))?;
    Ok(Timestamp { secs, micros })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowprobe_core::{EventDraft, ProbePoint};

    fn sample_event() -> ProbeEvent {
        EventDraft::new(ProbePoint::SendTcpToIp, 1234, 7, 3)
            .stamp(12, Timestamp::new(1_700_000_000, 42))
    }

    #[test]
    fn test_matches_legacy_layout() {
        let line = format_event(&sample_event());
        assert_eq!(
            line,
            "12   id 3  seq 1234     thread 7        ts 1700000000.000042 x3"
        );
    }

    #[test]
    fn test_wide_values_are_not_truncated() {
        let event = EventDraft::new(ProbeId(600), u32::MAX, u32::MAX, u16::MAX)
            .stamp(123_456, Timestamp::new(5, 0));
        let line = format_event(&event);
        assert!(line.starts_with("123456 id 600 seq 4294967295 thread 4294967295 ts 5.000000"));
        assert_eq!(parse_line(&line).unwrap(), event);
    }

    #[test]
    fn test_parse_line() {
        let event = sample_event();
        let parsed = parse_line(&format_event(&event)).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_parse_legacy_dump_line() {
        // Legacy dump line, including the newline
        let parsed =
            parse_line("0    id 10 seq 5        thread 1        ts 12.000500 x1\n").unwrap();
        assert_eq!(parsed.probe_id, ProbePoint::RecvSocket.id());
        assert_eq!(parsed.timestamp, Timestamp::new(12, 500));
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        let bad = [
            "",
            "0 id 1 seq 2 thread 3 ts 4.000005",
            "0 id 1 seq 2 thread 3 ts 4.5 x1",
            "0 id 1 sequence 2 thread 3 ts 4.000005 x1",
            "0 id 1 seq -2 thread 3 ts 4.000005 x1",
            "0 id 1 seq 2 thread 3 ts 4.000005 x1 extra",
        ];
        for line in bad {
            let err = parse_line(line).unwrap_err();
            assert!(matches!(err, StorageError::Format { line: 1, .. }), "{line:?}");
        }
    }

    #[test]
    fn test_write_and_parse_lines() {
        let events: Vec<ProbeEvent> = (0..3)
            .map(|i| {
                EventDraft::new(ProbeId(1), i, 1, 1).stamp(u64::from(i), Timestamp::new(1, i))
            })
            .collect();

        let mut out = Vec::new();
        assert_eq!(write_lines(events.iter().copied(), &mut out).unwrap(), 3);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.ends_with('\n'));
        assert_eq!(parse_lines(&text).unwrap(), events);
    }

    #[test]
    fn test_parse_lines_reports_line_number() {
        let text = "0 id 1 seq 2 thread 3 ts 4.000005 x1\n\nbroken\n";
        let err = parse_lines(text).unwrap_err();
        assert!(matches!(err, StorageError::Format { line: 3, .. }));
    }
}
