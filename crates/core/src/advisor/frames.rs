//! Reader for the status endpoint's event-stream style body.
//!
//! The body is a sequence of newline-separated frames. `data:` frames carry a
//! JSON payload, `event:` frames name the kind of the frames that follow. The
//! upstream may emit stale `processing` payloads before the final one, so the
//! last decodable `data:` frame is authoritative.

use crate::advisor::error::AdvisorError;
use serde_json::Value;

pub const DATA_PREFIX: &str = "data:";
pub const EVENT_PREFIX: &str = "event:";

const ERROR_EVENT: &str = "error";
const DEFAULT_ERROR_REASON: &str = "upstream reported an error event";

#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// No payload frame yet.
    Pending,
    /// The stream ended with an `event: error` frame.
    Errored(String),
    /// The authoritative payload.
    Payload(Value),
}

pub fn read_stream(body: &str) -> Result<StreamOutcome, AdvisorError> {
    let lines: Vec<&str> = body.lines().map(str::trim).collect();

    let last_event = lines.iter().enumerate().rev().find_map(|(idx, line)| {
        line.strip_prefix(EVENT_PREFIX).map(|name| (idx, name.trim()))
    });

    if let Some((idx, ERROR_EVENT)) = last_event {
        let reason_frames: Vec<&str> = data_frames(&lines[idx + 1..]).collect();
        return Ok(StreamOutcome::Errored(error_reason(&reason_frames)));
    }

    let frames: Vec<&str> = data_frames(&lines).collect();

    let mut undecodable = 0usize;
    let mut last_err = None;
    for (idx, frame) in frames.iter().enumerate().rev() {
        if is_empty_payload(frame) {
            continue;
        }
        match serde_json::from_str::<Value>(frame) {
            Ok(value) => return Ok(StreamOutcome::Payload(value)),
            Err(err) => {
                tracing::warn!(
                    frame_index = idx,
                    frame = %truncate(frame, 200),
                    error = %err,
                    "skipping undecodable data frame"
                );
                undecodable += 1;
                last_err = Some(err);
            }
        }
    }

    match last_err {
        Some(err) => Err(AdvisorError::poll(
            "frame",
            format!("none of {undecodable} data frames decoded as JSON; last error: {err}"),
        )),
        None => Ok(StreamOutcome::Pending),
    }
}

fn data_frames<'a>(lines: &'a [&'a str]) -> impl Iterator<Item = &'a str> + 'a {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix(DATA_PREFIX))
        .map(str::trim)
}

fn is_empty_payload(frame: &str) -> bool {
    frame.is_empty() || frame == "null"
}

fn error_reason(frames: &[&str]) -> String {
    let Some(frame) = frames.iter().rev().find(|f| !is_empty_payload(f)) else {
        return DEFAULT_ERROR_REASON.to_string();
    };

    match serde_json::from_str::<Value>(frame) {
        Ok(Value::String(s)) => s,
        _ => frame.to_string(),
    }
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn last_data_frame_wins() {
        let body = "data: [{\"status\":\"processing\"}]\n\ndata: [{\"status\":\"success\",\"data\":{}}]";
        assert_eq!(
            read_stream(body).unwrap(),
            StreamOutcome::Payload(json!([{"status": "success", "data": {}}]))
        );
    }

    #[test]
    fn body_without_frames_is_pending() {
        assert_eq!(read_stream("").unwrap(), StreamOutcome::Pending);
        assert_eq!(
            read_stream("event: heartbeat\n: keep-alive\n").unwrap(),
            StreamOutcome::Pending
        );
    }

    #[test]
    fn null_frames_are_ignored() {
        let body = "event: generating\ndata: [{\"status\":\"processing\"}]\n\nevent: heartbeat\ndata: null\n";
        assert_eq!(
            read_stream(body).unwrap(),
            StreamOutcome::Payload(json!([{"status": "processing"}]))
        );
    }

    #[test]
    fn undecodable_last_frame_falls_back_to_previous() {
        let body = "data: [{\"status\":\"processing\"}]\ndata: [{\"status\":";
        assert_eq!(
            read_stream(body).unwrap(),
            StreamOutcome::Payload(json!([{"status": "processing"}]))
        );
    }

    #[test]
    fn only_undecodable_frames_is_a_poll_error() {
        let err = read_stream("data: not json\ndata: {broken").unwrap_err();
        assert!(matches!(err, AdvisorError::Poll { stage: "frame", .. }), "{err}");
    }

    #[test]
    fn error_event_yields_reason() {
        let body = "event: error\ndata: \"model crashed\"\n";
        assert_eq!(
            read_stream(body).unwrap(),
            StreamOutcome::Errored("model crashed".to_string())
        );

        let body = "event: generating\ndata: [{\"status\":\"processing\"}]\nevent: error\ndata: null\n";
        assert_eq!(
            read_stream(body).unwrap(),
            StreamOutcome::Errored(DEFAULT_ERROR_REASON.to_string())
        );
    }

    #[test]
    fn handles_crlf_line_endings() {
        let body = "data: [{\"status\":\"processing\"}]\r\n\r\ndata: [1]\r\n";
        assert_eq!(read_stream(body).unwrap(), StreamOutcome::Payload(json!([1])));
    }
}
