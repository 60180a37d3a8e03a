//! In-memory answer store with type-aware normalization.
//!
//! Exactly one [`Answer`] exists per question. Edits overwrite it; nothing is
//! appended. Progress is a pure function of the current contents.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::model::{ChoiceId, Question, QuestionId, QuestionType, SavedAnswer};

/// The student's current answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Answer {
    /// Single-choice and true/false questions.
    Choice(Option<ChoiceId>),
    /// Multi-select questions.
    Choices(BTreeSet<ChoiceId>),
    /// Free-text questions, stored verbatim.
    Text(String),
}

impl Answer {
    /// The empty answer for a question type.
    pub fn empty_for(question_type: QuestionType) -> Self {
        match question_type {
            QuestionType::SingleChoice | QuestionType::TrueFalse => Answer::Choice(None),
            QuestionType::MultiSelect => Answer::Choices(BTreeSet::new()),
            QuestionType::FreeText => Answer::Text(String::new()),
        }
    }

    /// Whether this answer counts towards progress.
    pub fn is_answered(&self) -> bool {
        match self {
            Answer::Choice(choice) => choice.is_some(),
            Answer::Choices(set) => !set.is_empty(),
            Answer::Text(text) => !text.is_empty(),
        }
    }
}

/// A raw edit coming from the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerInput {
    /// Select one choice (single-choice / true-false).
    Choice(ChoiceId),
    /// Replace the whole selection (multi-select).
    Choices(Vec<ChoiceId>),
    /// Add or remove one choice (multi-select), or select/deselect it
    /// (single-choice / true-false).
    Toggle(ChoiceId),
    /// Free text, taken verbatim.
    Text(String),
    /// Reset to the empty answer for the question type.
    Clear,
}

impl AnswerInput {
    fn kind(&self) -> &'static str {
        match self {
            AnswerInput::Choice(_) => "single choice",
            AnswerInput::Choices(_) => "choice set",
            AnswerInput::Toggle(_) => "toggle",
            AnswerInput::Text(_) => "text",
            AnswerInput::Clear => "clear",
        }
    }
}

/// Answered versus total question count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
}

impl Progress {
    pub fn unanswered(&self) -> usize {
        self.total - self.answered
    }
}

/// Mapping from question id to the current answer, in exam order.
#[derive(Debug, Clone)]
pub struct AnswerStore {
    questions: Vec<Question>,
    index: HashMap<QuestionId, usize>,
    answers: Vec<Answer>,
}

impl AnswerStore {
    /// Create a store with one empty answer per question.
    pub fn new(questions: Vec<Question>) -> Self {
        let index = questions
            .iter()
            .enumerate()
            .map(|(i, q)| (q.id, i))
            .collect();
        let answers = questions
            .iter()
            .map(|q| Answer::empty_for(q.question_type))
            .collect();
        Self {
            questions,
            index,
            answers,
        }
    }

    /// Questions in exam order.
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.index.get(&id).map(|&i| &self.questions[i])
    }

    pub fn get(&self, id: QuestionId) -> Option<&Answer> {
        self.index.get(&id).map(|&i| &self.answers[i])
    }

    /// Apply an edit, normalizing it by question type, and return the stored answer.
    pub fn set_answer(
        &mut self,
        question_id: QuestionId,
        input: AnswerInput,
    ) -> Result<&Answer, SessionError> {
        let &i = self
            .index
            .get(&question_id)
            .ok_or(SessionError::UnknownQuestion(question_id))?;
        let question = &self.questions[i];
        let next = normalize(question, &self.answers[i], input)?;
        self.answers[i] = next;
        Ok(&self.answers[i])
    }

    /// Overwrite answers with what the backend already holds for this attempt.
    ///
    /// Multi-select selections may arrive as a comma-joined `answer_text`, as
    /// one entry per chosen choice, or both; entries for the same question
    /// are merged. Entries for unknown questions or foreign choices are
    /// skipped. Returns the number of entries applied.
    pub fn hydrate(&mut self, saved: &[SavedAnswer]) -> usize {
        let mut applied = 0;
        let mut merged = HashSet::new();
        for entry in saved {
            let Some(&i) = self.index.get(&entry.question_id) else {
                tracing::debug!(question_id = %entry.question_id, "skipping saved answer for unknown question");
                continue;
            };
            let question = &self.questions[i];
            let answer = match question.question_type {
                QuestionType::SingleChoice | QuestionType::TrueFalse => {
                    Answer::Choice(entry.chosen_choice_id.filter(|c| question.has_choice(*c)))
                }
                QuestionType::MultiSelect => {
                    let mut set = match &self.answers[i] {
                        Answer::Choices(set) if merged.contains(&i) => set.clone(),
                        _ => BTreeSet::new(),
                    };
                    set.extend(
                        entry
                            .answer_text
                            .as_deref()
                            .unwrap_or_default()
                            .split(',')
                            .filter_map(|part| part.parse::<ChoiceId>().ok())
                            .chain(entry.chosen_choice_id)
                            .filter(|c| question.has_choice(*c)),
                    );
                    merged.insert(i);
                    Answer::Choices(set)
                }
                QuestionType::FreeText => {
                    Answer::Text(entry.answer_text.clone().unwrap_or_default())
                }
            };
            self.answers[i] = answer;
            applied += 1;
        }
        applied
    }

    /// Answered and total counts.
    pub fn progress(&self) -> Progress {
        Progress {
            answered: self.answers.iter().filter(|a| a.is_answered()).count(),
            total: self.questions.len(),
        }
    }
}

fn normalize(question: &Question, current: &Answer, input: AnswerInput) -> Result<Answer, SessionError> {
    let check = |choice: ChoiceId| {
        if question.has_choice(choice) {
            Ok(choice)
        } else {
            Err(SessionError::UnknownChoice {
                question: question.id,
                choice,
            })
        }
    };
    let mismatch = |input: &AnswerInput| SessionError::AnswerMismatch {
        question: question.id,
        question_type: question.question_type,
        given: input.kind(),
    };

    if input == AnswerInput::Clear {
        return Ok(Answer::empty_for(question.question_type));
    }

    match question.question_type {
        QuestionType::SingleChoice | QuestionType::TrueFalse => match input {
            AnswerInput::Choice(choice) => Ok(Answer::Choice(Some(check(choice)?))),
            AnswerInput::Toggle(choice) => {
                let choice = check(choice)?;
                let selected = matches!(current, Answer::Choice(Some(c)) if *c == choice);
                Ok(Answer::Choice(if selected { None } else { Some(choice) }))
            }
            other => Err(mismatch(&other)),
        },
        QuestionType::MultiSelect => match input {
            AnswerInput::Toggle(choice) => {
                let choice = check(choice)?;
                let mut set = match current {
                    Answer::Choices(set) => set.clone(),
                    _ => BTreeSet::new(),
                };
                if !set.remove(&choice) {
                    set.insert(choice);
                }
                Ok(Answer::Choices(set))
            }
            AnswerInput::Choices(choices) => Ok(Answer::Choices(
                choices.into_iter().map(check).collect::<Result<_, _>>()?,
            )),
            other => Err(mismatch(&other)),
        },
        QuestionType::FreeText => match input {
            AnswerInput::Text(text) => Ok(Answer::Text(text)),
            other => Err(mismatch(&other)),
        },
    }
}
