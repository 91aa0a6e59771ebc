use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::controller::SessionView;

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Lecture {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub position: i32,
    pub is_preview_free: bool,
    // opaque playback capability (URL or token), never inspected
    pub media_ref: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Enrollment {
    pub learner_id: String,
    pub course_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct LectureProgress {
    pub learner_id: String,
    pub course_id: Uuid,
    pub lecture_id: Uuid,
    pub completed: bool,
    pub completed_at: DateTime<Utc>,
}

/// Derived view over a learner's rows for one course. `complete` is
/// recomputed from the full row set on every materialization; a stored
/// boolean is never read back.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CourseProgress {
    pub course_id: Uuid,
    pub lecture_progress: Vec<LectureProgress>,
    pub complete: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    pub lectures: Vec<Lecture>,
    pub has_purchased: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateCourseReq {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price_cents: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateLectureReq {
    pub title: String,
    #[serde(default)]
    pub is_preview_free: bool,
    pub media_ref: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EnrollReq {
    pub course_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OpenSessionReq {
    pub course_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SelectLectureReq {
    pub lecture_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MarkCompleteRes {
    pub progress: CourseProgress,
    pub course_complete: bool,
}

#[derive(Serialize, Debug, Clone)]
pub struct PlayRes {
    pub session: SessionView,
    pub progress: CourseProgress,
    /// True exactly when this play flipped the course to complete.
    pub completion_event: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Certificate {
    pub learner_id: String,
    pub course_id: Uuid,
    pub course_title: String,
    pub issued_at: DateTime<Utc>,
}
