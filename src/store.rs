use async_trait::async_trait;
use uuid::Uuid;

use crate::completion;
use crate::db::Db;
use crate::error::EngineError;
use crate::models::{Course, CourseProgress, Enrollment, Lecture, LectureProgress};

pub type StoreResult<T> = Result<T, EngineError>;

/// Storage port for the engine. The Postgres adapter below backs the
/// service; the in-memory adapter backs the test suites.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    // catalog
    async fn create_course(&self, course: Course) -> StoreResult<()>;
    async fn add_lecture(&self, lecture: Lecture) -> StoreResult<()>;
    async fn publish_course(&self, course_id: Uuid) -> StoreResult<()>;
    async fn get_course(&self, course_id: Uuid) -> StoreResult<Option<Course>>;
    async fn list_published(&self) -> StoreResult<Vec<Course>>;
    async fn lectures_for(&self, course_id: Uuid) -> StoreResult<Vec<Lecture>>;
    async fn find_lecture(&self, lecture_id: Uuid) -> StoreResult<Option<Lecture>>;

    // enrollment; written only by the purchase callback, read by the guard
    async fn record_enrollment(&self, learner_id: &str, course_id: Uuid) -> StoreResult<()>;
    async fn is_enrolled(&self, learner_id: &str, course_id: Uuid) -> StoreResult<bool>;
    async fn enrolled_courses(&self, learner_id: &str) -> StoreResult<Vec<Course>>;

    /// Idempotent completion mark. The first call for a (learner, lecture)
    /// pair writes the row and stamps `completed_at`; later calls leave the
    /// row untouched. Fails with `NotFound` when the lecture does not
    /// belong to the given course.
    async fn mark_completed(
        &self,
        learner_id: &str,
        course_id: Uuid,
        lecture_id: Uuid,
    ) -> StoreResult<()>;

    async fn progress_rows(
        &self,
        learner_id: &str,
        course_id: Uuid,
    ) -> StoreResult<Vec<LectureProgress>>;
}

/// Materialize the progress view for one (learner, course). The
/// `complete` flag always comes from the evaluator over the current
/// lecture and progress sets, so reads are never stale relative to a
/// mark the same caller just made.
pub async fn progress_view(
    store: &dyn ProgressStore,
    learner_id: &str,
    course_id: Uuid,
) -> StoreResult<CourseProgress> {
    let lectures = store.lectures_for(course_id).await?;
    let rows = store.progress_rows(learner_id, course_id).await?;
    let ids: Vec<Uuid> = lectures.iter().map(|l| l.id).collect();
    let complete = completion::course_complete(&ids, &rows);
    Ok(CourseProgress {
        course_id,
        lecture_progress: rows,
        complete,
    })
}

/// Progress lookup as exposed over HTTP: a learner with no enrollment may
/// still read progress when the course offers a free-preview lecture,
/// otherwise the read is refused.
pub async fn get_progress(
    store: &dyn ProgressStore,
    learner_id: &str,
    course_id: Uuid,
) -> StoreResult<CourseProgress> {
    store
        .get_course(course_id)
        .await?
        .ok_or(EngineError::NotFound("course"))?;
    if !store.is_enrolled(learner_id, course_id).await? {
        let lectures = store.lectures_for(course_id).await?;
        if !lectures.iter().any(|l| l.is_preview_free) {
            return Err(EngineError::NotEnrolled);
        }
    }
    progress_view(store, learner_id, course_id).await
}

#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProgressStore for PgStore {
    async fn create_course(&self, course: Course) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO courses (id, title, description, price_cents, is_published, created_at)
            VALUES ($1,$2,$3,$4,$5,$6)
            "#,
        )
        .bind(course.id)
        .bind(&course.title)
        .bind(&course.description)
        .bind(course.price_cents)
        .bind(course.is_published)
        .bind(course.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn add_lecture(&self, lecture: Lecture) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO lectures (id, course_id, title, position, is_preview_free, media_ref, created_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7)
            "#,
        )
        .bind(lecture.id)
        .bind(lecture.course_id)
        .bind(&lecture.title)
        .bind(lecture.position)
        .bind(lecture.is_preview_free)
        .bind(&lecture.media_ref)
        .bind(lecture.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn publish_course(&self, course_id: Uuid) -> StoreResult<()> {
        let res = sqlx::query("UPDATE courses SET is_published = TRUE WHERE id = $1")
            .bind(course_id)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(EngineError::NotFound("course"));
        }
        Ok(())
    }

    async fn get_course(&self, course_id: Uuid) -> StoreResult<Option<Course>> {
        let course = sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
            .bind(course_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(course)
    }

    async fn list_published(&self) -> StoreResult<Vec<Course>> {
        let courses = sqlx::query_as::<_, Course>(
            "SELECT * FROM courses WHERE is_published ORDER BY created_at DESC",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(courses)
    }

    async fn lectures_for(&self, course_id: Uuid) -> StoreResult<Vec<Lecture>> {
        let lectures = sqlx::query_as::<_, Lecture>(
            "SELECT * FROM lectures WHERE course_id = $1 ORDER BY position",
        )
        .bind(course_id)
        .fetch_all(&self.db)
        .await?;
        Ok(lectures)
    }

    async fn find_lecture(&self, lecture_id: Uuid) -> StoreResult<Option<Lecture>> {
        let lecture = sqlx::query_as::<_, Lecture>("SELECT * FROM lectures WHERE id = $1")
            .bind(lecture_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(lecture)
    }

    async fn record_enrollment(&self, learner_id: &str, course_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO enrollments (learner_id, course_id)
            VALUES ($1,$2)
            ON CONFLICT (learner_id, course_id) DO NOTHING
            "#,
        )
        .bind(learner_id)
        .bind(course_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn is_enrolled(&self, learner_id: &str, course_id: Uuid) -> StoreResult<bool> {
        let enrollment = sqlx::query_as::<_, Enrollment>(
            "SELECT * FROM enrollments WHERE learner_id = $1 AND course_id = $2",
        )
        .bind(learner_id)
        .bind(course_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(enrollment.is_some())
    }

    async fn enrolled_courses(&self, learner_id: &str) -> StoreResult<Vec<Course>> {
        let courses = sqlx::query_as::<_, Course>(
            r#"
            SELECT c.* FROM courses c
            JOIN enrollments e ON e.course_id = c.id
            WHERE e.learner_id = $1
            ORDER BY e.created_at DESC
            "#,
        )
        .bind(learner_id)
        .fetch_all(&self.db)
        .await?;
        Ok(courses)
    }

    async fn mark_completed(
        &self,
        learner_id: &str,
        course_id: Uuid,
        lecture_id: Uuid,
    ) -> StoreResult<()> {
        let lecture = self
            .find_lecture(lecture_id)
            .await?
            .ok_or(EngineError::NotFound("lecture"))?;
        if lecture.course_id != course_id {
            return Err(EngineError::NotFound("lecture"));
        }
        // DO NOTHING keeps the original completed_at; concurrent marks
        // from two sessions converge on the first inserted row.
        sqlx::query(
            r#"
            INSERT INTO lecture_progress (learner_id, course_id, lecture_id, completed, completed_at)
            VALUES ($1,$2,$3,TRUE,now())
            ON CONFLICT (learner_id, lecture_id) DO NOTHING
            "#,
        )
        .bind(learner_id)
        .bind(course_id)
        .bind(lecture_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn progress_rows(
        &self,
        learner_id: &str,
        course_id: Uuid,
    ) -> StoreResult<Vec<LectureProgress>> {
        let rows = sqlx::query_as::<_, LectureProgress>(
            "SELECT * FROM lecture_progress WHERE learner_id = $1 AND course_id = $2",
        )
        .bind(learner_id)
        .bind(course_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
