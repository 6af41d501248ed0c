//! Reassembles `event:` / `data:` frames out of an arbitrarily chunked
//! `text/event-stream` body.
//!
//! [`parse`] is pure: the caller owns the buffer and passes the returned
//! remainder back in with the next chunk. Splitting the same text at any chunk
//! boundaries yields the same frames as parsing it in one piece.

/// One fully delimited event, before its payload is decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Value of the `event:` line.
    pub event_type: String,
    /// Value of the `data:` line(s), joined with `\n`.
    pub raw_payload: String,
}

impl Frame {
    pub fn new(event_type: impl Into<String>, raw_payload: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            raw_payload: raw_payload.into(),
        }
    }
}

/// Output of one [`parse`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutput {
    /// Complete frames in stream order.
    pub frames: Vec<Frame>,
    /// Trailing text whose terminator has not arrived yet.
    pub remainder: String,
}

/// Appends `chunk` to `buffer` and extracts every terminated frame.
///
/// A block is only yielded when it carries both an `event:` and a `data:`
/// line; terminated blocks missing either (keep-alives, comment-only blocks)
/// are consumed silently.
pub fn parse(buffer: &str, chunk: &str) -> ParseOutput {
    let mut combined = String::with_capacity(buffer.len() + chunk.len());
    combined.push_str(buffer);
    combined.push_str(chunk);

    let mut frames = Vec::new();
    let mut rest = combined.as_str();
    while let Some((idx, delim_len)) = find_frame_delimiter(rest) {
        if let Some(frame) = parse_block(&rest[..idx]) {
            frames.push(frame);
        }
        rest = &rest[idx + delim_len..];
    }

    ParseOutput {
        frames,
        remainder: rest.to_string(),
    }
}

fn find_frame_delimiter(text: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'\n' && bytes[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if i + 3 < bytes.len() && &bytes[i..i + 4] == b"\r\n\r\n" {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

fn parse_block(block: &str) -> Option<Frame> {
    let mut event_type: Option<&str> = None;
    let mut data_lines: Vec<&str> = Vec::new();
    for raw_line in block.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(value) = field_value(line, "event") {
            event_type = Some(value.trim());
        } else if let Some(value) = field_value(line, "data") {
            data_lines.push(value);
        }
    }
    let event_type = event_type.filter(|t| !t.is_empty())?;
    if data_lines.is_empty() {
        return None;
    }
    Some(Frame::new(event_type, data_lines.join("\n")))
}

fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let value = line.strip_prefix(field)?.strip_prefix(':')?;
    Some(value.strip_prefix(' ').unwrap_or(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = concat!(
        "event: status\ndata: {\"status\":\"Cloning repository\"}\n\n",
        "event: status\ndata: {\"status\":\"Repo cloned successfully\"}\n\n",
        "event: endpoints\ndata: {\"endpoints\":[{\"method\":\"GET\",\"path\":\"/api/users\"}]}\n\n",
        ": keep-alive\n\n",
        "event: completed\ndata: {\"result\":{\"repo_name\":\"dém😀\",\"zip_path\":\"/tmp/demo.zip\"}}\n\n",
    );

    fn parse_in_pieces(pieces: &[&str]) -> Vec<Frame> {
        let mut buffer = String::new();
        let mut frames = Vec::new();
        for piece in pieces {
            let out = parse(&buffer, piece);
            frames.extend(out.frames);
            buffer = out.remainder;
        }
        frames
    }

    fn char_boundaries(text: &str) -> Vec<usize> {
        (0..=text.len())
            .filter(|idx| text.is_char_boundary(*idx))
            .collect()
    }

    #[test]
    fn parses_single_complete_frame() {
        let out = parse("", "event: status\ndata: {\"status\":\"x\"}\n\n");
        assert_eq!(out.frames, vec![Frame::new("status", "{\"status\":\"x\"}")]);
        assert!(out.remainder.is_empty());
    }

    #[test]
    fn keeps_unterminated_frame_in_remainder() {
        let out = parse("", "event: status\ndata: {\"status\":\"hel");
        assert!(out.frames.is_empty());
        assert_eq!(out.remainder, "event: status\ndata: {\"status\":\"hel");

        let out = parse(&out.remainder, "lo\"}\n\n");
        assert_eq!(out.frames.len(), 1);
        assert_eq!(out.frames[0].raw_payload, "{\"status\":\"hello\"}");
        assert!(out.remainder.is_empty());
    }

    #[test]
    fn fully_received_frame_waits_for_terminator() {
        let out = parse("", "event: streamEnd\ndata: {}\n");
        assert!(out.frames.is_empty());
        let out = parse(&out.remainder, "\n");
        assert_eq!(out.frames, vec![Frame::new("streamEnd", "{}")]);
    }

    #[test]
    fn blocks_missing_event_or_data_are_dropped() {
        let out = parse(
            "",
            "data: {\"orphan\":true}\n\nevent: status\n\nevent: status\ndata: \"ok\"\n\n",
        );
        assert_eq!(out.frames, vec![Frame::new("status", "\"ok\"")]);
    }

    #[test]
    fn ignores_comments_and_unknown_fields() {
        let out = parse(
            "",
            ": ping\nid: 7\nretry: 1000\nevent: status\ndata: {}\n\n",
        );
        assert_eq!(out.frames, vec![Frame::new("status", "{}")]);
    }

    #[test]
    fn accepts_crlf_terminators_and_missing_space() {
        let out = parse("", "event:status\r\ndata:{\"a\":1}\r\n\r\nevent: error\r\n");
        assert_eq!(out.frames, vec![Frame::new("status", "{\"a\":1}")]);
        assert_eq!(out.remainder, "event: error\r\n");
    }

    #[test]
    fn joins_multiple_data_lines() {
        let out = parse("", "event: endpoints\ndata: {\"endpoints\":\ndata: []}\n\n");
        assert_eq!(out.frames[0].raw_payload, "{\"endpoints\":\n[]}");
    }

    #[test]
    fn yields_frames_in_arrival_order() {
        let frames = parse_in_pieces(&[SCENARIO]);
        let types: Vec<&str> = frames.iter().map(|f| f.event_type.as_str()).collect();
        assert_eq!(types, vec!["status", "status", "endpoints", "completed"]);
    }

    #[test]
    fn any_single_split_matches_whole_parse() {
        let whole = parse_in_pieces(&[SCENARIO]);
        for idx in char_boundaries(SCENARIO) {
            let (a, b) = SCENARIO.split_at(idx);
            assert_eq!(parse_in_pieces(&[a, b]), whole, "split at {idx}");
        }
    }

    #[test]
    fn any_two_splits_match_whole_parse() {
        let whole = parse_in_pieces(&[SCENARIO]);
        let bounds = char_boundaries(SCENARIO);
        for (pos, &first) in bounds.iter().enumerate() {
            for &second in &bounds[pos..] {
                let pieces = [
                    &SCENARIO[..first],
                    &SCENARIO[first..second],
                    &SCENARIO[second..],
                ];
                assert_eq!(
                    parse_in_pieces(&pieces),
                    whole,
                    "splits at {first}/{second}"
                );
            }
        }
    }

    #[test]
    fn byte_at_a_time_delivery_matches_whole_parse() {
        let whole = parse_in_pieces(&[SCENARIO]);
        let bounds = char_boundaries(SCENARIO);
        let pieces: Vec<&str> = bounds
            .windows(2)
            .map(|w| &SCENARIO[w[0]..w[1]])
            .collect();
        assert_eq!(parse_in_pieces(&pieces), whole);
    }
}
