use std::{
    collections::HashSet,
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::info;

use crate::{
    dao::models::{QuestionsFileEntity, UserEntity},
    state::game::{OptionKey, QuestionBank, User},
};

/// Error raised while loading the static fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// The file could not be read.
    #[error("failed to read fixture `{path}`")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The file is not valid JSON for its schema.
    #[error("failed to parse fixture `{path}`")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The content parsed but breaks a data rule.
    #[error("invalid fixture `{path}`: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// Questions and users loaded once at session start.
#[derive(Debug, Clone)]
pub struct Fixtures {
    /// Levels sorted by id plus the optional FFF question.
    pub bank: QuestionBank,
    /// Registered contestants in fixture order.
    pub users: Vec<User>,
}

/// Reads the question and user JSON files from disk.
#[derive(Debug, Clone)]
pub struct FixtureRepository {
    questions_path: PathBuf,
    users_path: PathBuf,
}

impl FixtureRepository {
    /// Repository reading from the two given files.
    pub fn new(questions_path: impl Into<PathBuf>, users_path: impl Into<PathBuf>) -> Self {
        Self {
            questions_path: questions_path.into(),
            users_path: users_path.into(),
        }
    }

    /// Load and validate both fixtures.
    pub async fn load(&self) -> Result<Fixtures, FixtureError> {
        let questions = read(&self.questions_path).await?;
        let bank = parse_questions(&self.questions_path, &questions)?;
        let users = read(&self.users_path).await?;
        let users = parse_users(&self.users_path, &users)?;

        info!(
            questions = bank.levels.len(),
            users = users.len(),
            fff = bank.fff_question.is_some(),
            "loaded fixtures"
        );
        Ok(Fixtures { bank, users })
    }
}

async fn read(path: &Path) -> Result<String, FixtureError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| FixtureError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Parse the questions document, rejecting duplicate ids and malformed FFF orders.
pub fn parse_questions(path: &Path, contents: &str) -> Result<QuestionBank, FixtureError> {
    let file: QuestionsFileEntity =
        serde_json::from_str(contents).map_err(|source| FixtureError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let invalid = |message: String| FixtureError::Invalid {
        path: path.to_path_buf(),
        message,
    };

    let mut seen = HashSet::new();
    for question in &file.questions {
        if !seen.insert(question.id) {
            return Err(invalid(format!("duplicate question id {}", question.id)));
        }
    }

    if let Some(fff) = &file.fff_question {
        let distinct: HashSet<OptionKey> = fff.correct_order.iter().copied().collect();
        if fff.correct_order.len() != OptionKey::ALL.len() || distinct.len() != OptionKey::ALL.len()
        {
            return Err(invalid(
                "fffQuestion.correctOrder must list A, B, C and D exactly once".into(),
            ));
        }
    }

    Ok(QuestionBank::new(
        file.questions.into_iter().map(Into::into).collect(),
        file.fff_question.map(Into::into),
    ))
}

/// Parse the users document, rejecting duplicate ids.
pub fn parse_users(path: &Path, contents: &str) -> Result<Vec<User>, FixtureError> {
    let entities: Vec<UserEntity> =
        serde_json::from_str(contents).map_err(|source| FixtureError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut seen = HashSet::new();
    for user in &entities {
        if !seen.insert(user.id) {
            return Err(FixtureError::Invalid {
                path: path.to_path_buf(),
                message: format!("duplicate user id {}", user.id),
            });
        }
    }

    Ok(entities.into_iter().map(Into::into).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::state_machine::GameStatus;

    const QUESTIONS: &str = r#"{
        "questions": [
            {"id": 2, "question": "Second?", "options": {"A": "a", "B": "b", "C": "c", "D": "d"}, "correctAnswer": "B", "amount": 2000, "milestone": true},
            {"id": 1, "question": "First?", "options": {"A": "a", "B": "b", "C": "c", "D": "d"}, "correctAnswer": "A", "amount": 1000}
        ],
        "fffQuestion": {"question": "Order?", "options": {"A": "a", "B": "b", "C": "c", "D": "d"}, "correctOrder": ["C", "A", "D", "B"]}
    }"#;

    #[test]
    fn questions_are_sorted_by_id() {
        let bank = parse_questions(Path::new("questions.json"), QUESTIONS).unwrap();
        let ids: Vec<u32> = bank.levels.iter().map(|level| level.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(!bank.levels[0].milestone);
        assert!(bank.levels[1].milestone);
        assert_eq!(
            bank.fff_question.unwrap().correct_order,
            vec![OptionKey::C, OptionKey::A, OptionKey::D, OptionKey::B]
        );
    }

    #[test]
    fn duplicate_question_ids_are_rejected() {
        let contents = r#"{"questions": [
            {"id": 1, "question": "x", "options": {"A": "a", "B": "b", "C": "c", "D": "d"}, "correctAnswer": "A", "amount": 1},
            {"id": 1, "question": "y", "options": {"A": "a", "B": "b", "C": "c", "D": "d"}, "correctAnswer": "A", "amount": 2}
        ]}"#;
        let err = parse_questions(Path::new("q.json"), contents).unwrap_err();
        assert!(matches!(err, FixtureError::Invalid { .. }));
    }

    #[test]
    fn fff_order_must_be_a_permutation() {
        let contents = r#"{"questions": [], "fffQuestion": {"question": "x", "options": {"A": "a", "B": "b", "C": "c", "D": "d"}, "correctOrder": ["A", "A", "B", "C"]}}"#;
        assert!(matches!(
            parse_questions(Path::new("q.json"), contents),
            Err(FixtureError::Invalid { .. })
        ));
    }

    #[test]
    fn users_without_progress_start_ready() {
        let users = parse_users(
            Path::new("users.json"),
            r#"[{"id": 7, "name": "Asha"}, {"id": 8, "name": "Ravi", "progress": {"currentQuestionLevelId": 2, "questionsAttempted": [1, 2], "amountWon": 1000, "gameStatus": "active", "lifelinesUsed": {}}}]"#,
        )
        .unwrap();

        assert_eq!(users[0].progress.game_status, GameStatus::Ready);
        assert_eq!(users[1].progress.questions_attempted, vec![1, 2]);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            parse_users(Path::new("users.json"), "{not json"),
            Err(FixtureError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let repo = FixtureRepository::new("/nonexistent/questions.json", "/nonexistent/users.json");
        assert!(matches!(repo.load().await, Err(FixtureError::Read { .. })));
    }
}
