use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A quiz question group.
///
/// Groups pull `pick_count` questions out of their members and override each
/// member's point value with `question_points` and its ordering slot with the
/// group's own `position`. Unmodeled backend fields (such as
/// `assessment_question_bank_id`) round-trip through `extra`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct QuestionGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pick_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_points: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn group_round_trips_bank_reference() {
        let raw = json!({
            "id": 10,
            "name": "Pool A",
            "pick_count": 2,
            "question_points": 1.5,
            "position": 3,
            "assessment_question_bank_id": 555
        });
        let group: QuestionGroup = serde_json::from_value(raw).unwrap();
        assert_eq!(group.id, Some(10));
        assert_eq!(group.question_points, Some(1.5));
        let back = serde_json::to_value(&group).unwrap();
        assert_eq!(back["assessment_question_bank_id"], json!(555));
    }
}
