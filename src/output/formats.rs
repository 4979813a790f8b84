//! Output format implementations

use serde::Serialize;

use super::format_timestamp;
use crate::detect::events::{DetectionEvent, MatchedWord};

/// JSON output structure
#[derive(Debug, Serialize)]
struct JsonDetection<'a> {
    event: &'static str,
    time_ms: i64,
    index: usize,
    label: &'a str,
    score: f32,
    previous: Option<&'a MatchedWord>,
}

/// Format a word transition as plain text.
///
/// Returns `None` for events that are not printed.
pub fn format_text(event: &DetectionEvent, offset_ms: i64, timestamps: bool) -> Option<String> {
    let DetectionEvent::WordDetected { previous, current } = event else {
        return None;
    };

    let mut line = String::new();
    if timestamps {
        line.push_str(&format!("[{}] ", format_timestamp(offset_ms)));
    }
    line.push_str(&format!("{} (score {:.3})", current.label, current.score));
    if let Some(previous) = previous {
        line.push_str(&format!(" <- {}", previous.label));
    }
    Some(line)
}

/// Format a word transition as a single JSON line
pub fn format_json(event: &DetectionEvent, offset_ms: i64) -> Option<String> {
    let DetectionEvent::WordDetected { previous, current } = event else {
        return None;
    };

    let output = JsonDetection {
        event: "word_detected",
        time_ms: offset_ms,
        index: current.index,
        label: &current.label,
        score: current.score,
        previous: previous.as_ref(),
    };

    Some(
        serde_json::to_string(&output)
            .unwrap_or_else(|_| format!("{{\"label\": \"{}\"}}", current.label)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::spectrum::Spectrum;
    use std::sync::Arc;

    fn make_event() -> DetectionEvent {
        DetectionEvent::WordDetected {
            previous: Some(MatchedWord {
                index: 0,
                label: "Noise".to_string(),
                score: 4.0,
            }),
            current: MatchedWord {
                index: 2,
                label: "Jump".to_string(),
                score: 1.5,
            },
        }
    }

    #[test]
    fn test_format_text() {
        let formatted = format_text(&make_event(), 1500, true).unwrap();
        assert_eq!(formatted, "[00:01.500] Jump (score 1.500) <- Noise");

        let plain = format_text(&make_event(), 1500, false).unwrap();
        assert!(plain.starts_with("Jump"));
    }

    #[test]
    fn test_format_json() {
        let formatted = format_json(&make_event(), 1000).unwrap();
        assert!(formatted.contains("\"label\":\"Jump\""));
        assert!(formatted.contains("\"time_ms\":1000"));
        assert!(formatted.contains("\"previous\":{\"index\":0,\"label\":\"Noise\""));
    }

    #[test]
    fn test_spectrum_events_are_not_printed() {
        let event = DetectionEvent::SpectrumChanged {
            spectrum: Arc::new(Spectrum::zeroed(4)),
        };
        assert!(format_text(&event, 0, true).is_none());
        assert!(format_json(&event, 0).is_none());
    }
}
