// In-memory implementation of the ProgressStore port.
//
// Backs the test suites and local development without a database, while
// mirroring the Postgres adapter's constraints: insert-if-absent marks,
// one enrollment row per (learner, course), lectures ordered by position.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Course, Enrollment, Lecture, LectureProgress};
use crate::store::{ProgressStore, StoreResult};

#[derive(Default)]
struct Tables {
    courses: HashMap<Uuid, Course>,
    lectures: HashMap<Uuid, Lecture>,
    enrollments: HashMap<(String, Uuid), Enrollment>,
    progress: HashMap<(String, Uuid), LectureProgress>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline, mutations fail with `StoreUnavailable`. Used to
    /// exercise the retry path of the playback controller.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(EngineError::StoreUnavailable("progress store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn create_course(&self, course: Course) -> StoreResult<()> {
        self.check_online()?;
        self.inner.write().await.courses.insert(course.id, course);
        Ok(())
    }

    async fn add_lecture(&self, lecture: Lecture) -> StoreResult<()> {
        self.check_online()?;
        let mut tables = self.inner.write().await;
        if !tables.courses.contains_key(&lecture.course_id) {
            return Err(EngineError::NotFound("course"));
        }
        tables.lectures.insert(lecture.id, lecture);
        Ok(())
    }

    async fn publish_course(&self, course_id: Uuid) -> StoreResult<()> {
        self.check_online()?;
        let mut tables = self.inner.write().await;
        let course = tables
            .courses
            .get_mut(&course_id)
            .ok_or(EngineError::NotFound("course"))?;
        course.is_published = true;
        Ok(())
    }

    async fn get_course(&self, course_id: Uuid) -> StoreResult<Option<Course>> {
        Ok(self.inner.read().await.courses.get(&course_id).cloned())
    }

    async fn list_published(&self) -> StoreResult<Vec<Course>> {
        let tables = self.inner.read().await;
        let mut courses: Vec<Course> = tables
            .courses
            .values()
            .filter(|c| c.is_published)
            .cloned()
            .collect();
        courses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(courses)
    }

    async fn lectures_for(&self, course_id: Uuid) -> StoreResult<Vec<Lecture>> {
        let tables = self.inner.read().await;
        let mut lectures: Vec<Lecture> = tables
            .lectures
            .values()
            .filter(|l| l.course_id == course_id)
            .cloned()
            .collect();
        lectures.sort_by_key(|l| l.position);
        Ok(lectures)
    }

    async fn find_lecture(&self, lecture_id: Uuid) -> StoreResult<Option<Lecture>> {
        Ok(self.inner.read().await.lectures.get(&lecture_id).cloned())
    }

    async fn record_enrollment(&self, learner_id: &str, course_id: Uuid) -> StoreResult<()> {
        self.check_online()?;
        let mut tables = self.inner.write().await;
        if !tables.courses.contains_key(&course_id) {
            return Err(EngineError::NotFound("course"));
        }
        tables
            .enrollments
            .entry((learner_id.to_string(), course_id))
            .or_insert_with(|| Enrollment {
                learner_id: learner_id.to_string(),
                course_id,
                created_at: Utc::now(),
            });
        Ok(())
    }

    async fn is_enrolled(&self, learner_id: &str, course_id: Uuid) -> StoreResult<bool> {
        let tables = self.inner.read().await;
        Ok(tables
            .enrollments
            .contains_key(&(learner_id.to_string(), course_id)))
    }

    async fn enrolled_courses(&self, learner_id: &str) -> StoreResult<Vec<Course>> {
        let tables = self.inner.read().await;
        let mut enrollments: Vec<&Enrollment> = tables
            .enrollments
            .values()
            .filter(|e| e.learner_id == learner_id)
            .collect();
        enrollments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(enrollments
            .into_iter()
            .filter_map(|e| tables.courses.get(&e.course_id).cloned())
            .collect())
    }

    async fn mark_completed(
        &self,
        learner_id: &str,
        course_id: Uuid,
        lecture_id: Uuid,
    ) -> StoreResult<()> {
        self.check_online()?;
        let mut tables = self.inner.write().await;
        let lecture = tables
            .lectures
            .get(&lecture_id)
            .ok_or(EngineError::NotFound("lecture"))?;
        if lecture.course_id != course_id {
            return Err(EngineError::NotFound("lecture"));
        }
        // first writer wins; completed_at never moves afterwards
        tables
            .progress
            .entry((learner_id.to_string(), lecture_id))
            .or_insert_with(|| LectureProgress {
                learner_id: learner_id.to_string(),
                course_id,
                lecture_id,
                completed: true,
                completed_at: Utc::now(),
            });
        Ok(())
    }

    async fn progress_rows(
        &self,
        learner_id: &str,
        course_id: Uuid,
    ) -> StoreResult<Vec<LectureProgress>> {
        let tables = self.inner.read().await;
        Ok(tables
            .progress
            .values()
            .filter(|p| p.learner_id == learner_id && p.course_id == course_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod memory_store_tests {
    use super::*;
    use chrono::Utc;

    fn course() -> Course {
        Course {
            id: Uuid::new_v4(),
            title: "Test Course".into(),
            description: String::new(),
            price_cents: 0,
            is_published: true,
            created_at: Utc::now(),
        }
    }

    fn lecture(course_id: Uuid, position: i32) -> Lecture {
        Lecture {
            id: Uuid::new_v4(),
            course_id,
            title: format!("Lecture {position}"),
            position,
            is_preview_free: false,
            media_ref: "media://test".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn mark_completed_is_idempotent_and_keeps_completed_at() {
        let store = MemoryStore::new();
        let c = course();
        let l = lecture(c.id, 1);
        store.create_course(c.clone()).await.unwrap();
        store.add_lecture(l.clone()).await.unwrap();

        store.mark_completed("lrn", c.id, l.id).await.unwrap();
        let first = store.progress_rows("lrn", c.id).await.unwrap();
        store.mark_completed("lrn", c.id, l.id).await.unwrap();
        let second = store.progress_rows("lrn", c.id).await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].completed_at, second[0].completed_at);
    }

    #[tokio::test]
    async fn mark_completed_rejects_lecture_from_another_course() {
        let store = MemoryStore::new();
        let c1 = course();
        let c2 = course();
        let l = lecture(c1.id, 1);
        store.create_course(c1.clone()).await.unwrap();
        store.create_course(c2.clone()).await.unwrap();
        store.add_lecture(l.clone()).await.unwrap();

        let err = store.mark_completed("lrn", c2.id, l.id).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound("lecture")));
        assert!(store.progress_rows("lrn", c1.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_marks_converge_on_one_row() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let c = course();
        let l = lecture(c.id, 1);
        store.create_course(c.clone()).await.unwrap();
        store.add_lecture(l.clone()).await.unwrap();

        let (a, b) = tokio::join!(
            store.mark_completed("lrn", c.id, l.id),
            store.mark_completed("lrn", c.id, l.id),
        );
        a.unwrap();
        b.unwrap();

        let rows = store.progress_rows("lrn", c.id).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let store = MemoryStore::new();
        let c = course();
        let l = lecture(c.id, 1);
        store.create_course(c.clone()).await.unwrap();
        store.add_lecture(l.clone()).await.unwrap();

        store.set_offline(true);
        let err = store.mark_completed("lrn", c.id, l.id).await.unwrap_err();
        assert!(matches!(err, EngineError::StoreUnavailable(_)));

        store.set_offline(false);
        store.mark_completed("lrn", c.id, l.id).await.unwrap();
    }

    #[tokio::test]
    async fn lectures_come_back_in_position_order() {
        let store = MemoryStore::new();
        let c = course();
        store.create_course(c.clone()).await.unwrap();
        for position in [3, 1, 2] {
            store.add_lecture(lecture(c.id, position)).await.unwrap();
        }
        let positions: Vec<i32> = store
            .lectures_for(c.id)
            .await
            .unwrap()
            .iter()
            .map(|l| l.position)
            .collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }
}
