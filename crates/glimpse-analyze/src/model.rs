//! Wire and result types for the analysis service.
//!
//! Parsing is deliberately forgiving: the service sits behind an external
//! model, so a missing or non-array `detections`, a bad bounding box or a
//! wrong-typed text field never fails the whole response.

use crate::AnalysisFailure;
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// rounding slack for boxes that touch the far edge
const EDGE_EPSILON: f32 = 1e-4;

/// Box in normalized unit-square coordinates, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// `0 ≤ x, y, x+width, y+height ≤ 1`, all finite, non-negative size.
    pub fn is_normalized(&self) -> bool {
        let vals = [self.x, self.y, self.width, self.height];
        vals.iter().all(|v| v.is_finite())
            && self.x >= 0.0
            && self.y >= 0.0
            && self.width >= 0.0
            && self.height >= 0.0
            && self.x + self.width <= 1.0 + EDGE_EPSILON
            && self.y + self.height <= 1.0 + EDGE_EPSILON
    }
}

/// One subject reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Detection {
    #[serde(deserialize_with = "lenient_box", skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(deserialize_with = "lenient_string")]
    pub age_range_estimate: String,
    #[serde(deserialize_with = "lenient_string")]
    pub gender_estimate: String,
    #[serde(deserialize_with = "lenient_string")]
    pub mood_estimate: String,
    #[serde(deserialize_with = "lenient_string")]
    pub behavior_estimate: String,
}

impl Detection {
    /// One-line textual form, used for boxless detections too.
    pub fn describe(&self) -> String {
        let fields = [
            ("age", &self.age_range_estimate),
            ("gender", &self.gender_estimate),
            ("mood", &self.mood_estimate),
            ("behavior", &self.behavior_estimate),
        ];
        let parts: Vec<String> = fields
            .iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| format!("{k}: {}", v.trim()))
            .collect();
        if parts.is_empty() {
            "no details".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Outcome of one analysis request.
///
/// Either a failure (`error_message` set, no detections) or a success;
/// the constructors are the only way to build one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    detections: Vec<Detection>,
    summary_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl AnalysisResult {
    pub fn success(detections: Vec<Detection>, summary_text: impl Into<String>) -> Self {
        Self {
            detections,
            summary_text: summary_text.into(),
            error_message: None,
        }
    }

    pub fn failure(summary_text: impl Into<String>, cause: impl Into<String>) -> Self {
        let cause = cause.into();
        Self {
            detections: Vec::new(),
            summary_text: summary_text.into(),
            error_message: Some(if cause.trim().is_empty() {
                "unknown analysis error".to_string()
            } else {
                cause
            }),
        }
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn summary_text(&self) -> &str {
        &self.summary_text
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn is_failure(&self) -> bool {
        self.error_message.is_some()
    }

    /// Multi-line text for the textual results panel.
    pub fn describe(&self) -> String {
        let mut out = self.summary_text.clone();
        if let Some(err) = &self.error_message {
            out.push_str(&format!("\nerror: {err}"));
        }
        for (i, d) in self.detections.iter().enumerate() {
            let placed = if d.bounding_box.is_some() { "" } else { " (not located)" };
            out.push_str(&format!("\n#{}{placed}: {}", i + 1, d.describe()));
        }
        out
    }
}

impl From<AnalysisFailure> for AnalysisResult {
    fn from(failure: AnalysisFailure) -> Self {
        AnalysisResult::failure(failure.summary(), failure.to_string())
    }
}

/// Normalize a response body into an [`AnalysisResult`].
pub fn parse_response(body: &[u8]) -> AnalysisResult {
    let value: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => return AnalysisFailure::MalformedBody(e.to_string()).into(),
    };
    let Value::Object(map) = value else {
        return AnalysisFailure::MalformedBody("expected a JSON object".into()).into();
    };

    let summary = map
        .get("summaryText")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if let Some(msg) = map
        .get("errorMessage")
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
    {
        let failure = AnalysisFailure::Service(msg.to_string());
        let summary = if summary.trim().is_empty() { failure.summary().to_string() } else { summary };
        return AnalysisResult::failure(summary, msg);
    }

    let detections = match map.get("detections") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match Detection::deserialize(item) {
                Ok(d) => {
                    if let Some(b) = d.bounding_box.as_ref().filter(|b| !b.is_normalized()) {
                        // kept: the overlay clamps or drops it at layout time
                        warn!("bounding box outside the unit square: {b:?}");
                    }
                    Some(d)
                }
                Err(e) => {
                    warn!("skipping malformed detection: {e}");
                    None
                }
            })
            .collect(),
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            warn!("detections is not an array ({}), treating as empty", type_name(other));
            Vec::new()
        }
    };

    AnalysisResult::success(detections, summary)
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_box<'de, D: Deserializer<'de>>(d: D) -> Result<Option<BoundingBox>, D::Error> {
    let value = Value::deserialize(d)?;
    if value.is_null() {
        return Ok(None);
    }
    match BoundingBox::deserialize(&value) {
        Ok(b) => Ok(Some(b)),
        Err(e) => {
            warn!("dropping unreadable bounding box: {e}");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope() {
        let body = br#"{
            "detections": [{
                "boundingBox": {"x": 0.1, "y": 0.2, "width": 0.3, "height": 0.4},
                "ageRangeEstimate": "25-35",
                "genderEstimate": "female",
                "moodEstimate": "calm",
                "behaviorEstimate": "looking at camera"
            }],
            "summaryText": "One person."
        }"#;
        let result = parse_response(body);
        assert!(!result.is_failure());
        assert_eq!(result.summary_text(), "One person.");
        assert_eq!(result.detections().len(), 1);
        let d = &result.detections()[0];
        assert_eq!(d.bounding_box, Some(BoundingBox::new(0.1, 0.2, 0.3, 0.4)));
        assert_eq!(d.mood_estimate, "calm");
    }

    #[test]
    fn missing_detections_is_empty_success() {
        let result = parse_response(br#"{"summaryText": "nothing"}"#);
        assert!(!result.is_failure());
        assert!(result.detections().is_empty());
    }

    #[test]
    fn non_array_detections_is_empty_success() {
        let result = parse_response(br#"{"detections": {"oops": 1}, "summaryText": "x"}"#);
        assert!(!result.is_failure());
        assert!(result.detections().is_empty());
    }

    #[test]
    fn service_error_becomes_failure() {
        let body = br#"{"detections": [{"genderEstimate": "x"}], "summaryText": "", "errorMessage": "model overloaded"}"#;
        let result = parse_response(body);
        assert_eq!(result.error_message(), Some("model overloaded"));
        assert!(result.detections().is_empty());
        assert!(!result.summary_text().is_empty());
    }

    #[test]
    fn blank_error_message_is_not_a_failure() {
        let result = parse_response(br#"{"detections": [], "summaryText": "ok", "errorMessage": ""}"#);
        assert!(!result.is_failure());
    }

    #[test]
    fn garbage_body_is_failure() {
        let result = parse_response(b"<html>502</html>");
        assert!(result.is_failure());
        assert!(result.detections().is_empty());
        assert!(parse_response(b"[1, 2]").is_failure());
    }

    #[test]
    fn bad_entries_do_not_spoil_good_ones() {
        let body = br#"{"detections": [
            42,
            {"boundingBox": "left-ish", "ageRangeEstimate": null, "moodEstimate": 7},
            {"boundingBox": {"x": 0.5, "y": 0.5, "width": 0.1, "height": 0.1}, "genderEstimate": "male"}
        ], "summaryText": "two"}"#;
        let result = parse_response(body);
        assert_eq!(result.detections().len(), 2);
        assert_eq!(result.detections()[0].bounding_box, None);
        assert_eq!(result.detections()[0].age_range_estimate, "");
        assert_eq!(result.detections()[0].mood_estimate, "7");
        assert!(result.detections()[1].bounding_box.is_some());
    }

    #[test]
    fn normalized_box_checks() {
        assert!(BoundingBox::new(0.0, 0.0, 1.0, 1.0).is_normalized());
        assert!(!BoundingBox::new(0.8, 0.0, 0.3, 0.1).is_normalized());
        assert!(!BoundingBox::new(f32::NAN, 0.0, 0.1, 0.1).is_normalized());
        assert!(!BoundingBox::new(0.1, -0.1, 0.1, 0.1).is_normalized());
    }

    #[test]
    fn overhanging_box_is_kept_for_layout() {
        let body = br#"{"detections": [
            {"boundingBox": {"x": 0.9, "y": 0.1, "width": 0.3, "height": 0.2}}
        ], "summaryText": "edge"}"#;
        let result = parse_response(body);
        let bbox = result.detections()[0].bounding_box.unwrap();
        assert!(!bbox.is_normalized());
        assert_eq!(bbox, BoundingBox::new(0.9, 0.1, 0.3, 0.2));
    }

    #[test]
    fn describe_lists_boxless_detections() {
        let result = AnalysisResult::success(
            vec![Detection { mood_estimate: "happy".into(), ..Default::default() }],
            "One face.",
        );
        assert_eq!(result.describe(), "One face.\n#1 (not located): mood: happy");
    }
}
