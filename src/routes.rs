use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use crate::access::{self, Access};
use crate::auth::Learner;
use crate::controller::{self, PlaybackSession, SessionView, Sessions};
use crate::error::EngineError;
use crate::models::*;
use crate::store::{self, ProgressStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ProgressStore>,
    pub sessions: Sessions,
}

impl AppState {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self {
            store,
            sessions: controller::new_sessions(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // catalog
        .route("/api/course", get(list_courses).post(create_course))
        .route("/api/course/:id", get(get_course))
        .route("/api/course/:id/lectures", post(add_lecture))
        .route("/api/course/:id/publish", post(publish_course))
        .route("/api/course/:id/certificate", get(get_certificate))
        // enrollment (purchase callback) + learner's library
        .route("/api/enrollments", post(enroll))
        .route("/api/my-learning", get(my_learning))
        // progress
        .route("/api/progress/:id", get(get_progress))
        .route("/api/progress/:id/complete", put(mark_complete))
        // playback sessions
        .route("/api/sessions", post(open_session))
        .route("/api/sessions/:id", get(session_state))
        .route("/api/sessions/:id/select", post(select_lecture))
        .route("/api/sessions/:id/play", post(play))
        .route("/api/sessions/:id/ack", post(acknowledge))
        .with_state(state)
}

// --- catalog ---

async fn list_courses(State(st): State<AppState>) -> Result<Json<Vec<Course>>, EngineError> {
    Ok(Json(st.store.list_published().await?))
}

async fn create_course(
    State(st): State<AppState>,
    Json(req): Json<CreateCourseReq>,
) -> Result<(StatusCode, Json<Course>), EngineError> {
    let course = Course {
        id: Uuid::new_v4(),
        title: req.title,
        description: req.description,
        price_cents: req.price_cents,
        is_published: false,
        created_at: Utc::now(),
    };
    st.store.create_course(course.clone()).await?;
    tracing::info!(course_id = %course.id, title = %course.title, "course created");
    Ok((StatusCode::CREATED, Json(course)))
}

async fn get_course(
    State(st): State<AppState>,
    learner: Learner,
    Path(course_id): Path<Uuid>,
) -> Result<Json<CourseDetail>, EngineError> {
    let course = st
        .store
        .get_course(course_id)
        .await?
        .ok_or(EngineError::NotFound("course"))?;
    let lectures = st.store.lectures_for(course_id).await?;
    let has_purchased = st.store.is_enrolled(&learner.0, course_id).await?;
    Ok(Json(CourseDetail {
        course,
        lectures,
        has_purchased,
    }))
}

async fn add_lecture(
    State(st): State<AppState>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateLectureReq>,
) -> Result<(StatusCode, Json<Lecture>), EngineError> {
    st.store
        .get_course(course_id)
        .await?
        .ok_or(EngineError::NotFound("course"))?;
    let position = st.store.lectures_for(course_id).await?.len() as i32 + 1;
    let lecture = Lecture {
        id: Uuid::new_v4(),
        course_id,
        title: req.title,
        position,
        is_preview_free: req.is_preview_free,
        media_ref: req.media_ref,
        created_at: Utc::now(),
    };
    st.store.add_lecture(lecture.clone()).await?;
    Ok((StatusCode::CREATED, Json(lecture)))
}

async fn publish_course(
    State(st): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> Result<Json<Course>, EngineError> {
    st.store.publish_course(course_id).await?;
    let course = st
        .store
        .get_course(course_id)
        .await?
        .ok_or(EngineError::NotFound("course"))?;
    tracing::info!(course_id = %course_id, "course published");
    Ok(Json(course))
}

async fn get_certificate(
    State(st): State<AppState>,
    learner: Learner,
    Path(course_id): Path<Uuid>,
) -> Result<Json<Certificate>, EngineError> {
    let course = st
        .store
        .get_course(course_id)
        .await?
        .ok_or(EngineError::NotFound("course"))?;
    let progress = store::progress_view(st.store.as_ref(), &learner.0, course_id).await?;
    if !progress.complete {
        return Err(EngineError::CourseIncomplete);
    }
    // stable across repeated requests: the moment the last lecture landed
    let issued_at = progress
        .lecture_progress
        .iter()
        .map(|p| p.completed_at)
        .max()
        .ok_or(EngineError::CourseIncomplete)?;
    Ok(Json(Certificate {
        learner_id: learner.0,
        course_id,
        course_title: course.title,
        issued_at,
    }))
}

// --- enrollment ---

async fn enroll(
    State(st): State<AppState>,
    learner: Learner,
    Json(req): Json<EnrollReq>,
) -> Result<StatusCode, EngineError> {
    let course = st
        .store
        .get_course(req.course_id)
        .await?
        .ok_or(EngineError::NotFound("course"))?;
    if !course.is_published {
        return Err(EngineError::NotPublished);
    }
    st.store.record_enrollment(&learner.0, req.course_id).await?;
    tracing::info!(learner = %learner.0, course_id = %req.course_id, "enrollment recorded");
    Ok(StatusCode::CREATED)
}

async fn my_learning(
    State(st): State<AppState>,
    learner: Learner,
) -> Result<Json<Vec<Course>>, EngineError> {
    Ok(Json(st.store.enrolled_courses(&learner.0).await?))
}

// --- progress ---

async fn get_progress(
    State(st): State<AppState>,
    learner: Learner,
    Path(course_id): Path<Uuid>,
) -> Result<Json<CourseProgress>, EngineError> {
    let progress = store::get_progress(st.store.as_ref(), &learner.0, course_id).await?;
    Ok(Json(progress))
}

async fn mark_complete(
    State(st): State<AppState>,
    learner: Learner,
    Path(lecture_id): Path<Uuid>,
) -> Result<Json<MarkCompleteRes>, EngineError> {
    let lecture = st
        .store
        .find_lecture(lecture_id)
        .await?
        .ok_or(EngineError::NotFound("lecture"))?;
    st.store
        .mark_completed(&learner.0, lecture.course_id, lecture_id)
        .await?;
    let progress = store::progress_view(st.store.as_ref(), &learner.0, lecture.course_id).await?;
    let course_complete = progress.complete;
    Ok(Json(MarkCompleteRes {
        progress,
        course_complete,
    }))
}

// --- playback sessions ---

async fn open_session(
    State(st): State<AppState>,
    Learner(learner): Learner,
    Json(req): Json<OpenSessionReq>,
) -> Result<(StatusCode, Json<SessionView>), EngineError> {
    let course = st
        .store
        .get_course(req.course_id)
        .await?
        .ok_or(EngineError::NotFound("course"))?;
    if !course.is_published {
        return Err(EngineError::NotPublished);
    }
    let progress = store::progress_view(st.store.as_ref(), &learner, req.course_id).await?;
    let session = PlaybackSession::new(learner, req.course_id, progress.complete);
    let view = session.view();
    st.sessions.lock().await.insert(session.id, session);
    Ok((StatusCode::CREATED, Json(view)))
}

async fn session_state(
    State(st): State<AppState>,
    Learner(learner): Learner,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionView>, EngineError> {
    let sessions = st.sessions.lock().await;
    let session = sessions
        .get(&session_id)
        .filter(|s| s.learner_id == learner)
        .ok_or(EngineError::NotFound("session"))?;
    Ok(Json(session.view()))
}

async fn select_lecture(
    State(st): State<AppState>,
    Learner(learner): Learner,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SelectLectureReq>,
) -> Result<Json<SessionView>, EngineError> {
    let course_id = {
        let sessions = st.sessions.lock().await;
        sessions
            .get(&session_id)
            .filter(|s| s.learner_id == learner)
            .ok_or(EngineError::NotFound("session"))?
            .course_id
    };

    // guard inputs are re-read on every selection, never cached
    let course = st
        .store
        .get_course(course_id)
        .await?
        .ok_or(EngineError::NotFound("course"))?;
    let lecture = st
        .store
        .find_lecture(req.lecture_id)
        .await?
        .filter(|l| l.course_id == course_id)
        .ok_or(EngineError::NotFound("lecture"))?;
    let enrolled = st.store.is_enrolled(&learner, course_id).await?;

    match access::can_access(&course, &lecture, enrolled) {
        Access::Allow => {}
        Access::Deny(reason) => return Err(reason.into()),
    }

    let mut sessions = st.sessions.lock().await;
    let session = sessions
        .get_mut(&session_id)
        .ok_or(EngineError::NotFound("session"))?;
    session.select(req.lecture_id);
    Ok(Json(session.view()))
}

async fn play(
    State(st): State<AppState>,
    Learner(learner): Learner,
    Path(session_id): Path<Uuid>,
) -> Result<Json<PlayRes>, EngineError> {
    let (course_id, token) = {
        let sessions = st.sessions.lock().await;
        let session = sessions
            .get(&session_id)
            .filter(|s| s.learner_id == learner)
            .ok_or(EngineError::NotFound("session"))?;
        let token = session.begin_mark().ok_or(EngineError::NoLectureSelected)?;
        (session.course_id, token)
    };

    // store I/O runs outside the session lock so a newer selection is
    // never blocked behind this mark
    match st
        .store
        .mark_completed(&learner, course_id, token.lecture_id)
        .await
    {
        Ok(()) => {
            let progress = store::progress_view(st.store.as_ref(), &learner, course_id).await?;
            let mut sessions = st.sessions.lock().await;
            let session = sessions
                .get_mut(&session_id)
                .ok_or(EngineError::NotFound("session"))?;
            let completion_event = session.apply_mark_success(token, progress.complete);
            if completion_event {
                tracing::info!(learner = %learner, course_id = %course_id, "course completed");
            }
            Ok(Json(PlayRes {
                session: session.view(),
                progress,
                completion_event,
            }))
        }
        Err(err) => {
            let mut sessions = st.sessions.lock().await;
            if let Some(session) = sessions.get_mut(&session_id) {
                session.apply_mark_failure(token);
            }
            tracing::warn!(error = %err, lecture_id = %token.lecture_id, "mark failed, playback continues");
            Err(err)
        }
    }
}

async fn acknowledge(
    State(st): State<AppState>,
    Learner(learner): Learner,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionView>, EngineError> {
    let mut sessions = st.sessions.lock().await;
    let session = sessions
        .get_mut(&session_id)
        .filter(|s| s.learner_id == learner)
        .ok_or(EngineError::NotFound("session"))?;
    session.acknowledge();
    Ok(Json(session.view()))
}
