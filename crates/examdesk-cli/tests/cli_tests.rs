//! CLI integration tests using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn examdesk() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("examdesk").unwrap()
}

/// A command isolated from any config on the machine running the tests.
fn against(server: &MockServer, dir: &TempDir) -> Command {
    let mut cmd = examdesk();
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env("EXAMDESK_API_BASE_URL", server.uri())
        .env("EXAMDESK_TOKEN", "test-token")
        .env("RUST_LOG", "examdesk=warn");
    cmd
}

fn result_json() -> serde_json::Value {
    serde_json::json!({
        "id": 7,
        "exam_title": "Rust Fundamentals",
        "score": "3.00",
        "correct_answers": 3,
        "total_questions": 4,
        "percentage_score": 75.0,
        "passed": true,
        "time_taken": 12.5,
        "start_time": "2024-03-01T10:00:00Z",
        "end_time": "2024-03-01T10:12:30Z"
    })
}

async fn mount_result(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/attempts/7/results/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(result_json()))
        .mount(server)
        .await;
}

#[test]
fn help_lists_commands() {
    examdesk()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("take"))
        .stdout(predicate::str::contains("result"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn take_requires_exam() {
    examdesk()
        .arg("take")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--exam"));
}

#[test]
fn init_creates_config() {
    let dir = TempDir::new().unwrap();

    examdesk()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created examdesk.toml"));

    let content = std::fs::read_to_string(dir.path().join("examdesk.toml")).unwrap();
    assert!(content.contains("[session]"));
    assert!(content.contains("autosave_debounce_ms"));
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("examdesk.toml"), "# mine\n").unwrap();

    examdesk()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists, skipping"));

    let content = std::fs::read_to_string(dir.path().join("examdesk.toml")).unwrap();
    assert_eq!(content, "# mine\n");
}

#[test]
fn missing_config_file_is_an_error() {
    examdesk()
        .arg("result")
        .arg("--attempt")
        .arg("7")
        .arg("--config")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"))
        .stderr(predicate::str::contains("config file not found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn result_prints_table() {
    let server = MockServer::start().await;
    mount_result(&server).await;
    let dir = TempDir::new().unwrap();

    against(&server, &dir)
        .args(["result", "--attempt", "7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rust Fundamentals"))
        .stdout(predicate::str::contains("3/4"))
        .stdout(predicate::str::contains("75.0%"))
        .stdout(predicate::str::contains("PASSED"));
}

#[tokio::test(flavor = "multi_thread")]
async fn result_as_json() {
    let server = MockServer::start().await;
    mount_result(&server).await;
    let dir = TempDir::new().unwrap();

    let output = against(&server, &dir)
        .args(["result", "--attempt", "7", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["correct_answers"], 3);
    assert_eq!(value["passed"], true);
}

#[tokio::test(flavor = "multi_thread")]
async fn result_for_unknown_attempt_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/attempts/99/results/"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(serde_json::json!({"detail": "Not found."})),
        )
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    against(&server, &dir)
        .args(["result", "--attempt", "99"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to fetch results for attempt 99"));
}

#[tokio::test(flavor = "multi_thread")]
async fn take_answers_and_submits() {
    let server = MockServer::start().await;
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
        .expect(1)
        .mount(&server)
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
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/attempts/7/submit-answer/"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(serde_json::json!({"message": "Answer saved successfully."})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/attempts/7/submit/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(result_json()))
        .expect(1)
        .mount(&server)
        .await;
    mount_result(&server).await;
    let dir = TempDir::new().unwrap();

    against(&server, &dir)
        .args(["take", "--exam", "1"])
        .write_stdin("pick 11\nsubmit\nconfirm\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Rust Fundamentals (2 questions, 60 minutes)"))
        .stdout(predicate::str::contains("Answer: let"))
        .stdout(predicate::str::contains("1 unanswered question(s)"))
        .stdout(predicate::str::contains("Exam submitted."))
        .stdout(predicate::str::contains("PASSED"));
}

#[tokio::test(flavor = "multi_thread")]
async fn take_leaves_open_attempt_on_quit() {
    let server = MockServer::start().await;
    let started = chrono::Utc::now() - chrono::Duration::minutes(1);
    Mock::given(method("POST"))
        .and(path("/api/exams/1/start/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": 7,
            "exam": 1,
            "exam_title": "Rust Fundamentals",
            "exam_duration": 30,
            "start_time": started.to_rfc3339(),
            "is_completed": false
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/exams/1/questions/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "id": 2,
                "question_text": "Rust has a garbage collector.",
                "question_type": "TF",
                "score_points": "1.00",
                "choices": [
                    {"id": 21, "choice_text": "True"},
                    {"id": 22, "choice_text": "False"}
                ]
            }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/attempts/7/submit/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    against(&server, &dir)
        .args(["take", "--exam", "1"])
        .write_stdin("quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Leaving exam."));
}

#[tokio::test(flavor = "multi_thread")]
async fn take_inactive_exam_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/exams/3/start/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(
            serde_json::json!({"detail": "This exam is not currently active."}),
        ))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    against(&server, &dir)
        .args(["take", "--exam", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not currently active"));
}

#[tokio::test(flavor = "multi_thread")]
async fn take_completed_exam_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/exams/1/start/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(
            serde_json::json!({"detail": "You have already completed this exam."}),
        ))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    against(&server, &dir)
        .args(["take", "--exam", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already completed this exam"));
}

#[tokio::test(flavor = "multi_thread")]
async fn take_overdue_attempt_shows_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/exams/1/start/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "detail": "Time limit exceeded. Your attempt has been automatically submitted.",
            "id": 7,
            "score": "3.00",
            "is_completed": true
        })))
        .mount(&server)
        .await;
    mount_result(&server).await;
    let dir = TempDir::new().unwrap();

    against(&server, &dir)
        .args(["take", "--exam", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already completed this exam"))
        .stdout(predicate::str::contains("PASSED"));
}
