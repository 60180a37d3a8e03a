//! The `examdesk take` command: an interactive attempt in the terminal.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use tokio::sync::mpsc;

use examdesk_client::{load_config_from, HttpBackend};
use examdesk_core::answers::{Answer, AnswerInput};
use examdesk_core::model::{ChoiceId, ExamId, Question};
use examdesk_core::session::{
    ExamSession, SessionInitializer, SessionSnapshot, SessionStart, SubmitStatus,
};
use examdesk_core::timer::format_remaining;
use examdesk_core::traits::ExamBackend;
use examdesk_core::Lifecycle;

use super::result::print_result;

const HELP: &str = "\
Commands:
  list               list all questions
  show [n]           show the current question, or question n
  next, prev         move between questions
  pick <choice>      select a choice
  toggle <choice>    add or remove a choice (multi-select)
  text <answer>      answer a free-text question
  clear              clear the current answer
  progress           answered and unanswered counts
  time               remaining time
  submit             submit the exam (asks for confirmation)
  confirm, cancel    answer the submit confirmation
  quit               leave; the attempt stays open on the server";

enum Flow {
    Continue,
    Quit,
}

pub async fn execute(exam: ExamId, config: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config.as_deref())?;
    let backend: Arc<dyn ExamBackend> = Arc::new(HttpBackend::new(&config)?);

    let start = SessionInitializer::new(Arc::clone(&backend))
        .with_config(config.session.clone())
        .start(exam)
        .await
        .with_context(|| format!("could not start exam {exam}"))?;

    let session = match start {
        SessionStart::Active(session) => session,
        SessionStart::AlreadySubmitted { attempt_id } => {
            println!("You have already completed this exam.");
            if let Some(attempt_id) = attempt_id {
                print_result(backend.as_ref(), attempt_id, "text").await?;
            }
            return Ok(());
        }
    };

    run(&session).await?;

    let snapshot = match session.state() {
        Lifecycle::Submitting => session.wait_until_terminal().await,
        _ => session.snapshot(),
    };
    match snapshot.lifecycle {
        Lifecycle::Submitted => {
            println!("Exam submitted.");
            let attempt_id = snapshot.completed_attempt.unwrap_or(session.attempt().id);
            print_result(backend.as_ref(), attempt_id, "text").await
        }
        Lifecycle::Fatal => anyhow::bail!(
            "{}",
            snapshot
                .last_error
                .unwrap_or_else(|| "the exam could not be submitted".into())
        ),
        _ => {
            println!(
                "Leaving exam. Saved answers are kept and the timer keeps running ({} left).",
                format_remaining(snapshot.remaining_seconds)
            );
            Ok(())
        }
    }
}

async fn run(session: &ExamSession) -> Result<()> {
    let attempt = session.attempt();
    println!(
        "{} ({} questions, {} minutes)",
        attempt.exam_title,
        session.questions().len(),
        attempt.duration_minutes
    );
    if session.resumed() {
        let progress = session.progress();
        println!(
            "Resuming attempt {}: {} of {} answered.",
            attempt.id, progress.answered, progress.total
        );
    }
    println!(
        "Time remaining: {}. Type 'help' for commands.",
        format_remaining(session.remaining_seconds())
    );

    let mut updates = session.subscribe();
    let mut seen = updates.borrow_and_update().clone();
    if seen.lifecycle == Lifecycle::Submitting {
        println!("Time is up. Submitting your exam...");
        return Ok(());
    }

    let mut current = 0;
    show(session, current);

    let mut lines = read_lines();
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = updates.borrow_and_update().clone();
                announce(&seen, &next);
                seen = next;
                if seen.lifecycle.is_terminal() || seen.lifecycle == Lifecycle::Submitting {
                    break;
                }
            }
            line = lines.recv() => {
                let Some(line) = line else {
                    break;
                };
                if let Flow::Quit = handle(session, &mut current, line.trim()).await {
                    break;
                }
                seen = session.snapshot();
                if seen.lifecycle.is_terminal() {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Read stdin on a plain thread so a pending read never holds up shutdown.
fn read_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Report lifecycle events the student did not ask for.
fn announce(prev: &SessionSnapshot, next: &SessionSnapshot) {
    if !prev.warning_issued && next.warning_issued {
        println!(
            "Warning: only {} left.",
            format_remaining(next.remaining_seconds)
        );
    }
    if prev.lifecycle == Lifecycle::Active
        && next.lifecycle == Lifecycle::Submitting
        && next.remaining_seconds == 0
    {
        println!("Time is up. Submitting your exam...");
    }
    if next.lifecycle == Lifecycle::Fatal && prev.lifecycle != Lifecycle::Fatal {
        if let Some(error) = &next.last_error {
            eprintln!("{error}");
        }
    }
}

async fn handle(session: &ExamSession, current: &mut usize, line: &str) -> Flow {
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim_start()),
        None => (line, ""),
    };
    let total = session.questions().len();

    match command {
        "" => {}
        "help" => println!("{HELP}"),
        "list" => list(session),
        "show" => {
            if !rest.is_empty() {
                match rest.parse::<usize>() {
                    Ok(n) if (1..=total).contains(&n) => *current = n - 1,
                    _ => {
                        println!("No question {rest}; there are {total}.");
                        return Flow::Continue;
                    }
                }
            }
            show(session, *current);
        }
        "next" => {
            if *current + 1 < total {
                *current += 1;
            }
            show(session, *current);
        }
        "prev" => {
            *current = current.saturating_sub(1);
            show(session, *current);
        }
        "pick" | "toggle" => match rest.parse::<ChoiceId>() {
            Ok(choice) => {
                let input = if command == "pick" {
                    AnswerInput::Choice(choice)
                } else {
                    AnswerInput::Toggle(choice)
                };
                edit(session, *current, input);
            }
            Err(_) => println!("Usage: {command} <choice id>"),
        },
        "text" => edit(session, *current, AnswerInput::Text(rest.to_string())),
        "clear" => edit(session, *current, AnswerInput::Clear),
        "progress" => {
            let progress = session.progress();
            println!(
                "Answered {} of {} ({} unanswered).",
                progress.answered,
                progress.total,
                progress.unanswered()
            );
        }
        "time" => println!("Time remaining: {}", format_remaining(session.remaining_seconds())),
        "submit" => match session.request_submit() {
            Ok(progress) => {
                if progress.unanswered() > 0 {
                    println!(
                        "You have {} unanswered question(s).",
                        progress.unanswered()
                    );
                }
                println!("Submit now? Type 'confirm' to submit or 'cancel' to keep working.");
            }
            Err(e) => println!("{e}"),
        },
        "cancel" => {
            session.cancel_submit();
            println!("Submission cancelled.");
        }
        "confirm" => {
            println!("Submitting...");
            match session.confirm_submit().await {
                Ok(SubmitStatus::Submitted(_)) | Ok(SubmitStatus::Superseded) => {}
                Err(e) => println!("{e}"),
            }
        }
        "quit" | "exit" => return Flow::Quit,
        other => println!("Unknown command '{other}'. Type 'help' for commands."),
    }
    Flow::Continue
}

fn edit(session: &ExamSession, index: usize, input: AnswerInput) {
    let Some(question) = session.questions().get(index) else {
        return;
    };
    match session.set_answer(question.id, input) {
        Ok(answer) => println!("Answer: {}", describe(question, &answer)),
        Err(e) => println!("{e}"),
    }
}

fn list(session: &ExamSession) {
    let mut table = Table::new();
    table.set_header(vec!["#", "Type", "Points", "Answered", "Question"]);
    for (i, question) in session.questions().iter().enumerate() {
        let answered = session
            .answer(question.id)
            .is_some_and(|a| a.is_answered());
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(question.question_type),
            Cell::new(format!("{:.1}", question.points)),
            Cell::new(if answered { "yes" } else { "" }),
            Cell::new(truncate(&question.text, 60)),
        ]);
    }
    println!("{table}");
}

fn show(session: &ExamSession, index: usize) {
    let questions = session.questions();
    let Some(question) = questions.get(index) else {
        return;
    };
    let answer = session.answer(question.id);
    println!(
        "\nQuestion {} of {} [{}]\n{}",
        index + 1,
        questions.len(),
        question.question_type,
        question.text
    );
    for choice in &question.choices {
        let marked = match &answer {
            Some(Answer::Choice(Some(selected))) => *selected == choice.id,
            Some(Answer::Choices(selected)) => selected.contains(&choice.id),
            _ => false,
        };
        println!(
            "  [{}] {:>4}  {}",
            if marked { "x" } else { " " },
            choice.id,
            choice.text
        );
    }
    if let Some(Answer::Text(text)) = &answer {
        println!("  Answer: {text}");
    }
}

fn describe(question: &Question, answer: &Answer) -> String {
    let choice_text = |id: &ChoiceId| {
        question
            .choices
            .iter()
            .find(|c| c.id == *id)
            .map(|c| c.text.clone())
            .unwrap_or_else(|| id.to_string())
    };
    match answer {
        Answer::Choice(Some(id)) => choice_text(id),
        Answer::Choices(set) if !set.is_empty() => {
            set.iter().map(choice_text).collect::<Vec<_>>().join(", ")
        }
        Answer::Text(text) if !text.is_empty() => text.clone(),
        _ => "(none)".to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
