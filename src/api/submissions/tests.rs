use axum::http::{Method, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use crate::db::models::Exam;
use crate::test_support::{self, TestContext, TEST_EXAM_ID};

mod trainer_flows;

pub(super) fn exam_url(suffix: &str) -> String {
    format!("/api/v1/submissions/exams/{TEST_EXAM_ID}/{suffix}")
}

pub(super) fn context_with(exam: Exam) -> TestContext {
    let ctx = TestContext::new();
    ctx.catalog.insert(exam);
    ctx
}

pub(super) async fn send(
    ctx: &TestContext,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(method, uri, token, body))
        .await
        .expect("response");
    let status = response.status();
    (status, test_support::read_json(response).await)
}

pub(super) async fn answer(ctx: &TestContext, token: &str, body: Value) -> (StatusCode, Value) {
    send(ctx, Method::POST, &exam_url("answers"), Some(token), Some(body)).await
}

pub(super) async fn submit(ctx: &TestContext, token: &str, body: Value) -> (StatusCode, Value) {
    send(ctx, Method::POST, &exam_url("submit"), Some(token), Some(body)).await
}

pub(super) async fn status(ctx: &TestContext, token: &str) -> (StatusCode, Value) {
    send(ctx, Method::GET, &exam_url("status"), Some(token), None).await
}

pub(super) fn answer_for<'a>(submission: &'a Value, question_id: &str) -> &'a Value {
    submission["answers"]
        .as_array()
        .expect("answers")
        .iter()
        .find(|entry| entry["question_id"] == question_id)
        .expect("answer entry")
}
