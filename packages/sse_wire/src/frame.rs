//! Classification of complete frames into stream events.

use serde::Deserialize;

/// Prefix marking a data-bearing frame. The space after the colon is
/// optional on the wire.
const DATA_PREFIX: &str = "data:";

/// Sentinel payload closing a generation.
const DONE_SENTINEL: &str = "[DONE]";

/// One classified frame from the backend stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// An incremental fragment of generated text.
    Delta(String),
    /// The backend finished this generation.
    Done,
    /// Blank line, comment, non-data field, or a payload with no text.
    Skip,
    /// A complete data frame whose payload does not decode. Never fatal;
    /// callers log and move on.
    Malformed,
}

/// Incremental payload shape: `{"response": "..."}` plus fields we ignore.
#[derive(Deserialize)]
struct DeltaPayload {
    #[serde(default)]
    response: Option<String>,
}

/// Classify one complete frame.
///
/// Assumes the reassembler already established completeness, so a payload
/// that fails to decode here is genuinely malformed rather than truncated.
/// Surrounding whitespace, including the `\r` a CRLF transport leaves
/// behind, is trimmed before classification.
pub fn parse_frame(frame: &str) -> FrameEvent {
    let frame = frame.trim();
    if frame.is_empty() || frame.starts_with(':') {
        return FrameEvent::Skip;
    }
    let Some(payload) = frame.strip_prefix(DATA_PREFIX) else {
        return FrameEvent::Skip;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return FrameEvent::Done;
    }
    match serde_json::from_str::<DeltaPayload>(payload) {
        Ok(DeltaPayload {
            response: Some(text),
        }) if !text.is_empty() => FrameEvent::Delta(text),
        Ok(_) => FrameEvent::Skip,
        Err(_) => FrameEvent::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FrameReassembler;

    // ── Deltas ───────────────────────────────────────────────────

    #[test]
    fn data_frame_with_text_is_a_delta() {
        assert_eq!(
            parse_frame("data: {\"response\":\"Hello\"}"),
            FrameEvent::Delta("Hello".to_string())
        );
    }

    #[test]
    fn space_after_colon_is_optional() {
        assert_eq!(
            parse_frame("data:{\"response\":\"Hi\"}"),
            FrameEvent::Delta("Hi".to_string())
        );
    }

    #[test]
    fn extra_payload_fields_are_ignored() {
        assert_eq!(
            parse_frame("data: {\"response\":\"x\",\"p\":\"padding\",\"usage\":{}}"),
            FrameEvent::Delta("x".to_string())
        );
    }

    #[test]
    fn unicode_delta_survives() {
        assert_eq!(
            parse_frame("data: {\"response\":\"caf\u{e9} \u{1f980}\"}"),
            FrameEvent::Delta("caf\u{e9} \u{1f980}".to_string())
        );
    }

    #[test]
    fn trailing_carriage_return_is_trimmed() {
        assert_eq!(
            parse_frame("data: {\"response\":\"x\"}\r"),
            FrameEvent::Delta("x".to_string())
        );
    }

    // ── Terminal sentinel ────────────────────────────────────────

    #[test]
    fn done_sentinel() {
        assert_eq!(parse_frame("data: [DONE]"), FrameEvent::Done);
    }

    #[test]
    fn done_sentinel_without_space() {
        assert_eq!(parse_frame("data:[DONE]"), FrameEvent::Done);
    }

    #[test]
    fn done_sentinel_with_carriage_return() {
        assert_eq!(parse_frame("data: [DONE]\r"), FrameEvent::Done);
    }

    // ── Skips ────────────────────────────────────────────────────

    #[test]
    fn blank_frame_is_skipped() {
        assert_eq!(parse_frame(""), FrameEvent::Skip);
        assert_eq!(parse_frame("   "), FrameEvent::Skip);
    }

    #[test]
    fn comment_frame_is_skipped() {
        assert_eq!(parse_frame(": keep-alive"), FrameEvent::Skip);
    }

    #[test]
    fn non_data_field_is_skipped() {
        assert_eq!(parse_frame("event: message"), FrameEvent::Skip);
        assert_eq!(parse_frame("id: 42"), FrameEvent::Skip);
    }

    #[test]
    fn empty_response_field_is_skipped() {
        assert_eq!(parse_frame("data: {\"response\":\"\"}"), FrameEvent::Skip);
    }

    #[test]
    fn absent_response_field_is_skipped() {
        assert_eq!(parse_frame("data: {\"p\":\"padding\"}"), FrameEvent::Skip);
        assert_eq!(parse_frame("data: {}"), FrameEvent::Skip);
    }

    #[test]
    fn null_response_is_skipped() {
        assert_eq!(parse_frame("data: {\"response\":null}"), FrameEvent::Skip);
    }

    // ── Malformed ────────────────────────────────────────────────

    #[test]
    fn truncated_json_is_malformed() {
        assert_eq!(parse_frame("data: {\"response\":\"hal"), FrameEvent::Malformed);
    }

    #[test]
    fn non_json_payload_is_malformed() {
        assert_eq!(parse_frame("data: not json at all"), FrameEvent::Malformed);
    }

    #[test]
    fn non_string_response_is_malformed() {
        assert_eq!(parse_frame("data: {\"response\":123}"), FrameEvent::Malformed);
    }

    // ── Reassembly and classification end to end ─────────────────

    #[test]
    fn classified_events_do_not_depend_on_chunking() {
        let stream =
            "data: {\"response\":\"Hel\"}\ndata: {\"response\":\"lo \u{1f980}\"}\n\ndata: [DONE]\n"
                .as_bytes();
        let mut expected = None;
        for split in 0..=stream.len() {
            let mut frames = FrameReassembler::new();
            let mut events = Vec::new();
            for chunk in [&stream[..split], &stream[split..]] {
                frames.push(chunk).unwrap();
                while let Some(frame) = frames.next_frame() {
                    events.push(parse_frame(&frame));
                }
            }
            if let Some(frame) = frames.finish() {
                events.push(parse_frame(&frame));
            }
            match &expected {
                None => expected = Some(events),
                Some(expected) => assert_eq!(&events, expected, "split at {split}"),
            }
        }
        let events = expected.unwrap();
        assert_eq!(
            events,
            vec![
                FrameEvent::Delta("Hel".to_string()),
                FrameEvent::Delta("lo \u{1f980}".to_string()),
                FrameEvent::Skip,
                FrameEvent::Done,
            ]
        );
    }
}
