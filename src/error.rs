use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denominator {
    TotalPossible,
    CategoryPossible,
}

impl std::fmt::Display for Denominator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TotalPossible => f.write_str("total possible points"),
            Self::CategoryPossible => f.write_str("category possible points"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{collaborator} could not answer: {message}")]
pub struct CollaboratorError {
    pub collaborator: &'static str,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self {
            collaborator,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum GradeError {
    #[error("score {raw:?} for assignment {assignment_id} is not a number")]
    Parse { assignment_id: i64, raw: String },

    #[error("assignment {assignment_id} {}", category_phrase(.category_id))]
    MissingCategory {
        assignment_id: i64,
        category_id: Option<i64>,
    },

    #[error("{denominator} is {value}, cannot compute a percentage")]
    DegenerateDenominator { denominator: Denominator, value: f64 },

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

/// A failed course computation, with the state it stopped in.
#[derive(Debug, Clone, Error)]
#[error("grade computation failed for {}: {error}", student_label(.student_id))]
pub struct AggregationFailure {
    pub error: GradeError,
    pub student_id: Option<String>,
    pub category_id: Option<i64>,
    pub total_points: f64,
    pub total_possible: f64,
    pub trace: String,
}

impl AggregationFailure {
    /// A failure raised before any student was attempted.
    pub fn course(error: impl Into<GradeError>) -> Self {
        Self {
            error: error.into(),
            student_id: None,
            category_id: None,
            total_points: 0.0,
            total_possible: 0.0,
            trace: String::new(),
        }
    }
}

fn category_phrase(category_id: &Option<i64>) -> String {
    match category_id {
        Some(id) => format!("references unknown category {id}"),
        None => "has no category".to_string(),
    }
}

fn student_label(student_id: &Option<String>) -> String {
    match student_id {
        Some(id) => format!("student {id}"),
        None => "course".to_string(),
    }
}
