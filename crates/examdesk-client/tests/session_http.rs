//! Session controller driven against a mocked grading backend over HTTP.

use std::sync::Arc;
use std::time::Duration;

use examdesk_client::{ClientConfig, HttpBackend};
use examdesk_core::model::{AttemptId, ChoiceId, ExamId, QuestionId};
use examdesk_core::{
    AnswerInput, ExamBackend, Lifecycle, SessionConfig, SessionInitializer, SessionStart,
};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session_config() -> SessionConfig {
    SessionConfig {
        autosave_debounce_ms: 50,
        ..SessionConfig::default()
    }
}

fn backend(server: &MockServer) -> Arc<dyn ExamBackend> {
    let config = ClientConfig {
        base_url: server.uri(),
        token: Some("test-token".into()),
        retry_delay_ms: 1,
        ..ClientConfig::default()
    };
    Arc::new(HttpBackend::new(&config).unwrap())
}

async fn mount_open_attempt(server: &MockServer) {
    let started = chrono::Utc::now() - chrono::Duration::minutes(5);
    Mock::given(method("POST"))
        .and(path("/api/exams/1/start/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": 7,
            "exam": 1,
            "exam_title": "Rust Fundamentals",
            "exam_duration": 60,
            "start_time": started.to_rfc3339(),
            "end_time": null,
            "score": "0.00",
            "is_completed": false
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/exams/1/questions/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "id": 1,
                "question_text": "Which keyword declares a variable?",
                "question_type": "MC",
                "score_points": "1.00",
                "choices": [
                    {"id": 11, "choice_text": "let"},
                    {"id": 12, "choice_text": "mut"}
                ]
            },
            {
                "id": 4,
                "question_text": "Name the borrow checker's main rule.",
                "question_type": "FB",
                "score_points": "1.00",
                "choices": []
            }
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn rejected_save_ends_submitted_when_backend_closed_attempt() {
    let server = MockServer::start().await;
    mount_open_attempt(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/attempts/7/submit-answer/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "detail": "Time limit exceeded. Exam auto-submitted.",
            "score": "1.00"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/attempts/7/submit/"))
        .respond_with(ResponseTemplate::new(404).set_body_json(
            serde_json::json!({"detail": "No ExamAttempt matches the given query."}),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let start = SessionInitializer::new(backend(&server))
        .with_config(session_config())
        .start(ExamId(1))
        .await
        .unwrap();
    let SessionStart::Active(session) = start else {
        panic!("expected an open attempt");
    };

    session
        .set_answer(QuestionId(4), AnswerInput::Text("one owner".into()))
        .unwrap();
    let snapshot = tokio::time::timeout(Duration::from_secs(5), session.wait_until_terminal())
        .await
        .unwrap();

    assert_eq!(snapshot.lifecycle, Lifecycle::Submitted);
    assert_eq!(snapshot.completed_attempt, Some(AttemptId(7)));
    assert_eq!(snapshot.last_error, None);
}

#[tokio::test]
async fn choice_autosave_sends_empty_text() {
    let server = MockServer::start().await;
    mount_open_attempt(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/attempts/7/submit-answer/"))
        .and(body_json(serde_json::json!({
            "question_id": 1,
            "chosen_choice_id": 12,
            "answer_text": ""
        })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(serde_json::json!({"message": "Answer saved successfully."})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let start = SessionInitializer::new(backend(&server))
        .with_config(session_config())
        .start(ExamId(1))
        .await
        .unwrap();
    let SessionStart::Active(session) = start else {
        panic!("expected an open attempt");
    };

    session
        .set_answer(QuestionId(1), AnswerInput::Choice(ChoiceId(11)))
        .unwrap();
    session
        .set_answer(QuestionId(1), AnswerInput::Choice(ChoiceId(12)))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(session.state(), Lifecycle::Active);
    server.verify().await;
}
