use criterion::{black_box, criterion_group, criterion_main, Criterion};

use examdesk_core::answers::{AnswerInput, AnswerStore};
use examdesk_core::autosave::encode_payload;
use examdesk_core::model::{Choice, ChoiceId, Question, QuestionId, QuestionType, SavedAnswer};

fn make_exam(questions: u64) -> Vec<Question> {
    (0..questions)
        .map(|i| Question {
            id: QuestionId(i),
            question_type: if i % 2 == 0 {
                QuestionType::MultiSelect
            } else {
                QuestionType::SingleChoice
            },
            text: format!("question {i}"),
            points: 1.0,
            choices: (0..5)
                .map(|c| Choice {
                    id: ChoiceId(i * 10 + c),
                    text: format!("choice {c}"),
                    is_correct: None,
                })
                .collect(),
        })
        .collect()
}

fn bench_set_answer(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_answer");

    group.bench_function("toggle 100 questions", |b| {
        b.iter(|| {
            let mut store = AnswerStore::new(make_exam(100));
            for i in 0..100u64 {
                let _ = store.set_answer(QuestionId(i), AnswerInput::Toggle(ChoiceId(i * 10 + 3)));
            }
            black_box(store.progress())
        })
    });

    let mut store = AnswerStore::new(make_exam(100));
    group.bench_function("progress", |b| b.iter(|| black_box(store.progress())));

    for i in (0..100u64).step_by(2) {
        let _ = store.set_answer(
            QuestionId(i),
            AnswerInput::Choices(vec![ChoiceId(i * 10), ChoiceId(i * 10 + 4)]),
        );
    }
    group.bench_function("encode multi-select", |b| {
        b.iter(|| {
            let answer = store.get(black_box(QuestionId(42))).cloned();
            answer.map(|a| encode_payload(QuestionId(42), &a))
        })
    });

    group.finish();
}

fn bench_hydrate(c: &mut Criterion) {
    let saved: Vec<SavedAnswer> = (0..100u64)
        .map(|i| SavedAnswer {
            question_id: QuestionId(i),
            chosen_choice_id: (i % 2 == 1).then_some(ChoiceId(i * 10 + 1)),
            answer_text: (i % 2 == 0).then(|| format!("{},{}", i * 10, i * 10 + 2)),
        })
        .collect();

    c.bench_function("hydrate 100 answers", |b| {
        b.iter(|| {
            let mut store = AnswerStore::new(make_exam(100));
            black_box(store.hydrate(black_box(&saved)))
        })
    });
}

criterion_group!(benches, bench_set_answer, bench_hydrate);
criterion_main!(benches);
