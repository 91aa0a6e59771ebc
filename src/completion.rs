use uuid::Uuid;

use crate::models::LectureProgress;

/// True iff every lecture in the course has a completed record.
/// A course with zero lectures is never complete, so a certificate can
/// never be unlocked before any content exists. Order of `progress` does
/// not matter.
pub fn course_complete(lecture_ids: &[Uuid], progress: &[LectureProgress]) -> bool {
    if lecture_ids.is_empty() {
        return false;
    }
    lecture_ids
        .iter()
        .all(|id| progress.iter().any(|p| p.lecture_id == *id && p.completed))
}
