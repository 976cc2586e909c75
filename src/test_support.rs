use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::api;
use crate::core::{
    config::Settings,
    redis::RedisHandle,
    security,
    state::{AppState, Collaborators, ExecutionLimits},
};
use crate::db::models::{
    CodingQuestion, Exam, ExamSubmission, GradeThresholds, McqOption, Question, QuestionKind,
    TestCase,
};
use crate::db::types::{JudgeStatus, SubmissionStatus, UserRole};
use crate::repositories::store::{
    CourseProgress, ExamCatalog, ReexamRequests, StoreError, SubmissionStore,
};
use crate::services::attempts::fresh_submission;
use crate::services::judge::{CodeJudge, JudgeError, JudgeOutcome, JudgeRequest};

pub(crate) const TEST_EXAM_ID: &str = "exam-1";
pub(crate) const TEST_COURSE_ID: &str = "course-1";
pub(crate) const TEST_WEEK: i32 = 2;

const TEST_DATABASE_URL_VAR: &str = "TEST_DATABASE_URL";

/// Settings loaded once per test binary from a fixed environment.
pub(crate) fn test_settings() -> Settings {
    static SETTINGS: OnceLock<Settings> = OnceLock::new();
    SETTINGS
        .get_or_init(|| {
            std::env::set_var("SECRET_KEY", "test-secret");
            std::env::set_var("EXAMHALL_ENV", "test");
            std::env::set_var("EXAMHALL_STRICT_CONFIG", "0");
            std::env::set_var("PROMETHEUS_ENABLED", "0");
            std::env::set_var("ALGORITHM", "HS256");
            Settings::load().expect("test settings")
        })
        .clone()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Versioned attempt store with the same compare-and-swap contract as Postgres.
#[derive(Default)]
pub(crate) struct MemoryStore {
    rows: Mutex<HashMap<(String, String), ExamSubmission>>,
}

impl MemoryStore {
    pub(crate) fn count(&self) -> usize {
        lock(&self.rows).len()
    }

    pub(crate) fn get(&self, exam_id: &str, student_id: &str) -> Option<ExamSubmission> {
        lock(&self.rows).get(&(exam_id.to_string(), student_id.to_string())).cloned()
    }

    pub(crate) fn put(&self, submission: ExamSubmission) {
        lock(&self.rows)
            .insert((submission.exam_id.clone(), submission.student_id.clone()), submission);
    }

    /// Simulates a concurrent writer so the next version-guarded replace fails.
    pub(crate) fn bump_version(&self, exam_id: &str, student_id: &str) {
        if let Some(row) = lock(&self.rows).get_mut(&(exam_id.to_string(), student_id.to_string()))
        {
            row.version += 1;
        }
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn insert_if_absent(&self, submission: &ExamSubmission) -> Result<bool, StoreError> {
        let mut rows = lock(&self.rows);
        let key = (submission.exam_id.clone(), submission.student_id.clone());
        if rows.contains_key(&key) {
            return Ok(false);
        }
        rows.insert(key, submission.clone());
        Ok(true)
    }

    async fn find(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> Result<Option<ExamSubmission>, StoreError> {
        Ok(self.get(exam_id, student_id))
    }

    async fn replace(&self, submission: &ExamSubmission) -> Result<bool, StoreError> {
        let mut rows = lock(&self.rows);
        let key = (submission.exam_id.clone(), submission.student_id.clone());
        match rows.get_mut(&key) {
            Some(row) if row.version == submission.version => {
                *row = submission.clone();
                row.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_by_exam(
        &self,
        exam_id: &str,
        statuses: &[SubmissionStatus],
    ) -> Result<Vec<ExamSubmission>, StoreError> {
        Ok(lock(&self.rows)
            .values()
            .filter(|row| row.exam_id == exam_id && statuses.contains(&row.status))
            .cloned()
            .collect())
    }

    async fn list_unscored_submitted(
        &self,
        limit: i64,
    ) -> Result<Vec<ExamSubmission>, StoreError> {
        Ok(lock(&self.rows)
            .values()
            .filter(|row| row.status == SubmissionStatus::Submitted && !row.is_scored())
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn list_with_pending_judge_runs(
        &self,
        limit: i64,
    ) -> Result<Vec<ExamSubmission>, StoreError> {
        Ok(lock(&self.rows)
            .values()
            .filter(|row| row.status.is_modifiable())
            .filter(|row| {
                row.answers.0.iter().any(|entry| {
                    entry.judge.as_ref().is_some_and(|run| run.status == JudgeStatus::Pending)
                })
            })
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MemoryCatalog {
    exams: Mutex<HashMap<String, Exam>>,
}

impl MemoryCatalog {
    pub(crate) fn insert(&self, exam: Exam) {
        lock(&self.exams).insert(exam.id.clone(), exam);
    }
}

#[async_trait]
impl ExamCatalog for MemoryCatalog {
    async fn find_exam(&self, exam_id: &str) -> Result<Option<Exam>, StoreError> {
        Ok(lock(&self.exams).get(exam_id).cloned())
    }
}

#[derive(Default)]
pub(crate) struct RecordingProgress {
    completions: Mutex<Vec<(String, String, i32)>>,
}

impl RecordingProgress {
    pub(crate) fn completions(&self) -> Vec<(String, String, i32)> {
        lock(&self.completions).clone()
    }
}

#[async_trait]
impl CourseProgress for RecordingProgress {
    async fn mark_module_complete(
        &self,
        student_id: &str,
        course_id: &str,
        week_number: i32,
    ) -> Result<(), StoreError> {
        lock(&self.completions).push((
            student_id.to_string(),
            course_id.to_string(),
            week_number,
        ));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingReexams {
    approved: Mutex<HashSet<(String, String)>>,
    completed: Mutex<Vec<(String, String)>>,
}

impl RecordingReexams {
    pub(crate) fn approve(&self, student_id: &str, exam_id: &str) {
        lock(&self.approved).insert((student_id.to_string(), exam_id.to_string()));
    }

    pub(crate) fn completed(&self) -> Vec<(String, String)> {
        lock(&self.completed).clone()
    }
}

#[async_trait]
impl ReexamRequests for RecordingReexams {
    async fn complete_if_approved(
        &self,
        student_id: &str,
        exam_id: &str,
    ) -> Result<bool, StoreError> {
        let key = (student_id.to_string(), exam_id.to_string());
        if !lock(&self.approved).remove(&key) {
            return Ok(false);
        }
        lock(&self.completed).push(key);
        Ok(true)
    }
}

/// Judge stand-in that maps trimmed stdin to stdout. Unknown inputs produce a runtime error.
#[derive(Default)]
pub(crate) struct ScriptedJudge {
    outputs: HashMap<String, String>,
    failing: bool,
    delay: Option<Duration>,
    sources: Mutex<Vec<String>>,
}

impl ScriptedJudge {
    pub(crate) fn answering(pairs: &[(&str, &str)]) -> Self {
        Self {
            outputs: pairs
                .iter()
                .map(|(stdin, stdout)| (stdin.to_string(), stdout.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self { failing: true, ..Self::default() }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        lock(&self.sources).len()
    }

    pub(crate) fn sources(&self) -> Vec<String> {
        lock(&self.sources).clone()
    }
}

#[async_trait]
impl CodeJudge for ScriptedJudge {
    async fn execute(&self, request: &JudgeRequest) -> Result<JudgeOutcome, JudgeError> {
        lock(&self.sources).push(request.source.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(JudgeError::Transport("connection refused".to_string()));
        }

        Ok(match self.outputs.get(request.stdin.trim()) {
            Some(stdout) => JudgeOutcome {
                status_id: 3,
                status: "Accepted".to_string(),
                stdout: Some(format!("{stdout}\n")),
                stderr: None,
                compile_output: None,
            },
            None => JudgeOutcome {
                status_id: 11,
                status: "Runtime Error (NZEC)".to_string(),
                stdout: None,
                stderr: Some("Traceback (most recent call last)".to_string()),
                compile_output: None,
            },
        })
    }
}

pub(crate) fn mcq_question(id: &str, marks: f64, correct: usize) -> Question {
    Question {
        id: id.to_string(),
        prompt: format!("Pick the right option for {id}"),
        marks,
        kind: QuestionKind::Mcq {
            options: (0..4)
                .map(|index| McqOption {
                    text: format!("Option {index}"),
                    is_correct: index == correct,
                    label: None,
                })
                .collect(),
        },
    }
}

pub(crate) fn coding_question(id: &str, marks: f64, cases: &[(&str, &str)]) -> Question {
    Question {
        id: id.to_string(),
        prompt: "Double the input".to_string(),
        marks,
        kind: QuestionKind::Coding(CodingQuestion {
            language: "python".to_string(),
            boilerplate: "def solve():\n    pass".to_string(),
            main_block: "print(solve())".to_string(),
            test_cases: cases
                .iter()
                .map(|(input, expected)| TestCase {
                    input: input.to_string(),
                    expected_output: expected.to_string(),
                    hidden: false,
                })
                .collect(),
        }),
    }
}

pub(crate) fn theory_question(id: &str, marks: f64) -> Question {
    Question {
        id: id.to_string(),
        prompt: "Explain borrowing".to_string(),
        marks,
        kind: QuestionKind::Theory,
    }
}

pub(crate) fn exam_with(questions: Vec<Question>) -> Exam {
    Exam {
        id: TEST_EXAM_ID.to_string(),
        title: "Week 2 exam".to_string(),
        course_id: Some(TEST_COURSE_ID.to_string()),
        week_number: Some(TEST_WEEK),
        questions,
        thresholds: GradeThresholds::default(),
    }
}

pub(crate) fn two_question_exam() -> Exam {
    exam_with(vec![mcq_question("q1", 2.0, 1), theory_question("q2", 3.0)])
}

pub(crate) fn blank_submission(questions: &[Question]) -> ExamSubmission {
    fresh_submission(&exam_with(questions.to_vec()), "student-1")
}

/// Postgres pool for repository tests. Holding it serializes database tests inside the
/// test binary.
pub(crate) struct TestDatabase {
    pub(crate) pool: PgPool,
    _guard: OwnedMutexGuard<()>,
}

async fn db_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<AsyncMutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(AsyncMutex::new(()))).clone();
    lock.lock_owned().await
}

/// Migrated and emptied test database, or `None` when `TEST_DATABASE_URL` is unset.
pub(crate) async fn test_database() -> Option<TestDatabase> {
    dotenvy::dotenv().ok();
    let Some(url) = std::env::var(TEST_DATABASE_URL_VAR).ok().filter(|url| !url.trim().is_empty())
    else {
        eprintln!("{TEST_DATABASE_URL_VAR} is not set; skipping database test");
        return None;
    };

    let guard = db_lock().await;
    let pool = PgPoolOptions::new().max_connections(8).connect(&url).await.expect("db pool");
    crate::db::run_migrations(&pool).await.expect("migrations");
    sqlx::query("TRUNCATE exam_submissions, exams, module_completions, reexam_requests")
        .execute(&pool)
        .await
        .expect("reset tables");

    Some(TestDatabase { pool, _guard: guard })
}

pub(crate) async fn insert_exam(pool: &PgPool, exam: &Exam) {
    sqlx::query(
        "INSERT INTO exams (
            id, title, course_id, week_number, questions,
            qualification_percentage, excellent_min, good_min
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)",
    )
    .bind(&exam.id)
    .bind(&exam.title)
    .bind(&exam.course_id)
    .bind(exam.week_number)
    .bind(Json(exam.questions.clone()))
    .bind(exam.thresholds.qualification_percentage)
    .bind(exam.thresholds.excellent_min)
    .bind(exam.thresholds.good_min)
    .execute(pool)
    .await
    .expect("insert exam");
}

/// Router wired to in-memory collaborators. Redis is never connected, so rate limits
/// always allow the request.
pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    pub(crate) catalog: Arc<MemoryCatalog>,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) judge: Arc<ScriptedJudge>,
    pub(crate) progress: Arc<RecordingProgress>,
    pub(crate) reexams: Arc<RecordingReexams>,
}

impl TestContext {
    pub(crate) fn new() -> Self {
        Self::with_judge(ScriptedJudge::default())
    }

    pub(crate) fn with_judge(judge: ScriptedJudge) -> Self {
        Self::with_limits(
            judge,
            ExecutionLimits { cpu_time_limit_seconds: 2.0, call_timeout: Duration::from_secs(5) },
        )
    }

    pub(crate) fn with_limits(judge: ScriptedJudge, limits: ExecutionLimits) -> Self {
        let settings = test_settings();
        let catalog = Arc::new(MemoryCatalog::default());
        let store = Arc::new(MemoryStore::default());
        let judge = Arc::new(judge);
        let progress = Arc::new(RecordingProgress::default());
        let reexams = Arc::new(RecordingReexams::default());

        let collaborators = Collaborators {
            catalog: catalog.clone(),
            submissions: store.clone(),
            judge: judge.clone(),
            progress: progress.clone(),
            reexams: reexams.clone(),
        };
        let redis = RedisHandle::new("redis://127.0.0.1:1/0".to_string());
        let state = AppState::with_limits(settings, redis, collaborators, limits);
        let app = api::router::router(state.clone());

        Self { state, app, catalog, store, judge, progress, reexams }
    }

    pub(crate) fn student_token(&self, student_id: &str) -> String {
        bearer_token(student_id, UserRole::Student, self.state.settings())
    }

    pub(crate) fn trainer_token(&self, trainer_id: &str) -> String {
        bearer_token(trainer_id, UserRole::Trainer, self.state.settings())
    }
}

pub(crate) fn bearer_token(user_id: &str, role: UserRole, settings: &Settings) -> String {
    security::create_access_token(user_id, role, settings, None).expect("token")
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
