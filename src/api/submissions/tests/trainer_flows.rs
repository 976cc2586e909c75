use axum::http::{Method, StatusCode};
use serde_json::json;

use super::{answer, answer_for, context_with, exam_url, send, submit};
use crate::test_support::{exam_with, mcq_question, two_question_exam, TEST_EXAM_ID};

fn student_url(student_id: &str, suffix: &str) -> String {
    let base = exam_url(&format!("students/{student_id}"));
    if suffix.is_empty() {
        base
    } else {
        format!("{base}/{suffix}")
    }
}

#[tokio::test]
async fn students_cannot_use_trainer_routes() {
    let ctx = context_with(two_question_exam());
    let token = ctx.student_token("student-1");

    let (code, body) =
        send(&ctx, Method::GET, &student_url("student-1", ""), Some(&token), None).await;
    assert_eq!(code, StatusCode::FORBIDDEN, "response: {body}");
    assert_eq!(body["detail"], "Trainer access required");

    let (code, _) = send(
        &ctx,
        Method::POST,
        &student_url("student-1", "evaluate"),
        Some(&token),
        Some(json!({"marks": {"q2": 3.0}})),
    )
    .await;
    assert_eq!(code, StatusCode::FORBIDDEN);

    let (code, _) =
        send(&ctx, Method::GET, &exam_url("pending-evaluation"), Some(&token), None).await;
    assert_eq!(code, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn theory_evaluation_completes_the_grade() {
    let ctx = context_with(two_question_exam());
    let student = ctx.student_token("student-1");
    let trainer = ctx.trainer_token("trainer-1");

    let (code, body) = answer(&ctx, &student, json!({"question_id": "q1", "selected_option": 1})).await;
    assert_eq!(code, StatusCode::OK, "response: {body}");
    let (code, body) = answer(
        &ctx,
        &student,
        json!({"question_id": "q2", "text_answer": "A borrow never outlives its owner"}),
    )
    .await;
    assert_eq!(code, StatusCode::OK, "response: {body}");

    let (code, body) = submit(&ctx, &student, json!({})).await;
    assert_eq!(code, StatusCode::OK, "response: {body}");
    assert_eq!(body["status"], "submitted");
    assert_eq!(body["percentage_score"], 40.0);

    let (code, body) =
        send(&ctx, Method::GET, &exam_url("pending-evaluation"), Some(&trainer), None).await;
    assert_eq!(code, StatusCode::OK, "response: {body}");
    assert_eq!(body["exam_id"], TEST_EXAM_ID);
    assert_eq!(body["submissions"].as_array().expect("submissions").len(), 1);

    let (code, body) = send(
        &ctx,
        Method::POST,
        &student_url("student-1", "evaluate"),
        Some(&trainer),
        Some(json!({"marks": {"q2": 1.0}})),
    )
    .await;
    assert_eq!(code, StatusCode::OK, "response: {body}");
    assert_eq!(body["status"], "evaluated");
    assert_eq!(body["evaluated_by"], "trainer-1");
    assert_eq!(body["total_marks_obtained"], 3.0);
    assert_eq!(body["percentage_score"], 60.0);
    assert_eq!(body["grade"], "amber");
    assert_eq!(body["qualified"], true);
    assert_eq!(answer_for(&body, "q2")["marks_obtained"], 1.0);

    let (code, body) =
        send(&ctx, Method::GET, &exam_url("pending-evaluation"), Some(&trainer), None).await;
    assert_eq!(code, StatusCode::OK, "response: {body}");
    assert!(body["submissions"].as_array().expect("submissions").is_empty());
}

#[tokio::test]
async fn evaluation_rejects_open_missing_and_out_of_range_attempts() {
    let ctx = context_with(two_question_exam());
    let student = ctx.student_token("student-1");
    let trainer = ctx.trainer_token("trainer-1");
    let evaluate = |student_id: &str| student_url(student_id, "evaluate");

    let (code, _) = send(
        &ctx,
        Method::POST,
        &evaluate("nobody"),
        Some(&trainer),
        Some(json!({"marks": {"q2": 1.0}})),
    )
    .await;
    assert_eq!(code, StatusCode::NOT_FOUND);

    let (code, _) = send(&ctx, Method::POST, &exam_url("start"), Some(&student), None).await;
    assert_eq!(code, StatusCode::OK);
    let (code, body) = send(
        &ctx,
        Method::POST,
        &evaluate("student-1"),
        Some(&trainer),
        Some(json!({"marks": {"q2": 1.0}})),
    )
    .await;
    assert_eq!(code, StatusCode::CONFLICT, "response: {body}");

    for marks in [json!({"q2": 4.0}), json!({"q2": -1.0}), json!({"q1": 1.0}), json!({})] {
        let (code, body) = send(
            &ctx,
            Method::POST,
            &evaluate("student-1"),
            Some(&trainer),
            Some(json!({ "marks": marks })),
        )
        .await;
        assert_eq!(code, StatusCode::BAD_REQUEST, "marks: {marks}, response: {body}");
    }
}

#[tokio::test]
async fn trainer_view_includes_integrity_logs() {
    let ctx = context_with(two_question_exam());
    let student = ctx.student_token("student-1");
    let trainer = ctx.trainer_token("trainer-1");

    let (code, body) = answer(
        &ctx,
        &student,
        json!({
            "question_id": "q1",
            "selected_option": 1,
            "violation_count_delta": 1,
            "cheating_logs": [{"kind": "tab_switch", "detail": "left for 4s"}]
        }),
    )
    .await;
    assert_eq!(code, StatusCode::OK, "response: {body}");

    let (code, body) = send(&ctx, Method::GET, &exam_url("status"), Some(&student), None).await;
    assert_eq!(code, StatusCode::OK, "response: {body}");
    assert_eq!(body["violation_count"], 1);
    assert!(body.get("cheating_logs").is_none());

    let (code, body) =
        send(&ctx, Method::GET, &student_url("student-1", ""), Some(&trainer), None).await;
    assert_eq!(code, StatusCode::OK, "response: {body}");
    let logs = body["cheating_logs"].as_array().expect("cheating logs");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["kind"], "tab_switch");
}

#[tokio::test]
async fn graded_only_exams_have_nothing_pending() {
    let ctx = context_with(exam_with(vec![mcq_question("q1", 2.0, 1)]));
    let student = ctx.student_token("student-1");
    let trainer = ctx.trainer_token("trainer-1");

    let (code, _) = submit(&ctx, &student, json!({})).await;
    assert_eq!(code, StatusCode::OK);

    let (code, body) =
        send(&ctx, Method::GET, &exam_url("pending-evaluation"), Some(&trainer), None).await;
    assert_eq!(code, StatusCode::OK, "response: {body}");
    assert!(body["submissions"].as_array().expect("submissions").is_empty());
}
