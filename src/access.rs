use serde::Serialize;

use crate::error::EngineError;
use crate::models::{Course, Lecture};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NotPublished,
    NotEnrolled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny(DenyReason),
}

/// Playback authorization for one lecture, checked before every
/// content-serving action. Enrollment state can change between calls
/// (a purchase may have just landed), so the result is never cached.
///
/// Policy order: publication gate first, then free preview, then
/// enrollment.
pub fn can_access(course: &Course, lecture: &Lecture, enrolled: bool) -> Access {
    if !course.is_published {
        return Access::Deny(DenyReason::NotPublished);
    }
    if lecture.is_preview_free {
        return Access::Allow;
    }
    if enrolled {
        return Access::Allow;
    }
    Access::Deny(DenyReason::NotEnrolled)
}

impl From<DenyReason> for EngineError {
    fn from(r: DenyReason) -> Self {
        match r {
            DenyReason::NotPublished => EngineError::NotPublished,
            DenyReason::NotEnrolled => EngineError::NotEnrolled,
        }
    }
}

#[cfg(test)]
mod can_access_tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;
    use uuid::Uuid;

    fn course(published: bool) -> Course {
        Course {
            id: Uuid::new_v4(),
            title: "Intro to Baking".into(),
            description: String::new(),
            price_cents: 4900,
            is_published: published,
            created_at: Utc::now(),
        }
    }

    fn lecture(course_id: Uuid, preview: bool) -> Lecture {
        Lecture {
            id: Uuid::new_v4(),
            course_id,
            title: "Proofing".into(),
            position: 1,
            is_preview_free: preview,
            media_ref: "media://proofing".into(),
            created_at: Utc::now(),
        }
    }

    #[rstest]
    // unpublished denies everything, preview flag included
    #[case(false, true, true, Access::Deny(DenyReason::NotPublished))]
    #[case(false, false, true, Access::Deny(DenyReason::NotPublished))]
    #[case(false, true, false, Access::Deny(DenyReason::NotPublished))]
    // published: preview is open to anyone
    #[case(true, true, false, Access::Allow)]
    // published: paid content needs enrollment
    #[case(true, false, true, Access::Allow)]
    #[case(true, false, false, Access::Deny(DenyReason::NotEnrolled))]
    fn policy_matrix(
        #[case] published: bool,
        #[case] preview: bool,
        #[case] enrolled: bool,
        #[case] expected: Access,
    ) {
        let c = course(published);
        let l = lecture(c.id, preview);
        assert_eq!(can_access(&c, &l, enrolled), expected);
    }
}
