//! Attendance-mark payload: the concrete domain item this deployment queues.

use serde::{Deserialize, Serialize};

/// Who produced the event. This queue only carries student marks; staff
/// attendance goes through a separate channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    #[default]
    Student,
}

/// Which attendance register the mark belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttendanceKind {
    Staff,
    SecondaryStudent,
    PrimaryStudent,
}

/// Whether the subject was entering or leaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationMode {
    Entry,
    Exit,
}

/// One attendance-mark event, exactly as the remote endpoint expects it.
///
/// Field names serialize in camelCase because the JSON body of the
/// delivery POST is the endpoint's contract, not ours.
///
/// `offset_seconds` is the signed distance between the actual event time
/// and the official scheduled time: negative = early, positive = late.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceMark {
    pub student_id: String,
    pub actor_kind: ActorKind,
    pub attendance_kind: AttendanceKind,
    pub registration_mode: RegistrationMode,
    pub offset_seconds: i64,
    pub education_level: String,
    pub grade: String,
    pub section: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AttendanceMark {
        AttendanceMark {
            student_id: "S1".to_string(),
            actor_kind: ActorKind::Student,
            attendance_kind: AttendanceKind::SecondaryStudent,
            registration_mode: RegistrationMode::Entry,
            offset_seconds: -120,
            education_level: "secondary".to_string(),
            grade: "3".to_string(),
            section: "B".to_string(),
        }
    }

    #[test]
    fn wire_format_matches_the_endpoint_contract() {
        let value = serde_json::to_value(sample()).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "studentId": "S1",
                "actorKind": "student",
                "attendanceKind": "secondary-student",
                "registrationMode": "entry",
                "offsetSeconds": -120,
                "educationLevel": "secondary",
                "grade": "3",
                "section": "B",
            })
        );
    }

    #[test]
    fn round_trips_through_json() {
        let mark = sample();
        let text = serde_json::to_string(&mark).unwrap();
        let back: AttendanceMark = serde_json::from_str(&text).unwrap();
        assert_eq!(back, mark);
    }

    #[test]
    fn kind_variants_use_kebab_case() {
        assert_eq!(
            serde_json::to_value(AttendanceKind::PrimaryStudent).unwrap(),
            serde_json::json!("primary-student")
        );
        assert_eq!(
            serde_json::to_value(AttendanceKind::Staff).unwrap(),
            serde_json::json!("staff")
        );
        assert_eq!(
            serde_json::to_value(RegistrationMode::Exit).unwrap(),
            serde_json::json!("exit")
        );
    }
}
