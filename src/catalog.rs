use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;
use crate::models::{AggregationMode, Assignment, Category, Member, OverrideRecord, ScoreRecord};

type Answer<T> = std::result::Result<T, CollaboratorError>;

pub trait AssignmentCatalog {
    /// Counted, non-removed assignments in processing order.
    fn counted_assignments(&self, course_id: &str) -> Answer<Vec<Assignment>>;
}

pub trait CategoryCatalog {
    fn category(&self, category_id: i64) -> Answer<Option<Category>>;
}

pub trait ScoreProvider {
    fn score(&self, assignment_id: i64, student_id: &str) -> Answer<Option<String>>;
}

pub trait OverrideProvider {
    fn override_percentage(&self, student_id: &str, course_id: &str) -> Answer<Option<f64>>;
}

pub trait MemberDirectory {
    fn members(&self, course_id: &str) -> Answer<Vec<Member>>;
}

/// Everything a course report reads from the host gradebook.
pub trait Gradebook:
    AssignmentCatalog + CategoryCatalog + ScoreProvider + OverrideProvider + MemberDirectory
{
}

impl<T> Gradebook for T where
    T: AssignmentCatalog + CategoryCatalog + ScoreProvider + OverrideProvider + MemberDirectory
{
}

/// One course's gradebook, fetched up front and answered from memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GradebookSnapshot {
    pub course_id: String,
    #[serde(default)]
    pub title: String,
    pub category_type: i32,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub scores: Vec<ScoreRecord>,
    #[serde(default)]
    pub overrides: Vec<OverrideRecord>,
}

impl GradebookSnapshot {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open snapshot {}", path.display()))?;
        Self::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("failed to parse snapshot {}", path.display()))
    }

    pub fn from_reader(reader: impl std::io::Read) -> anyhow::Result<Self> {
        let snapshot: Self = serde_json::from_reader(reader)?;
        Ok(snapshot)
    }

    pub fn mode(&self) -> anyhow::Result<AggregationMode> {
        AggregationMode::from_category_type(self.category_type).with_context(|| {
            format!(
                "course {} has unsupported category type {}",
                self.course_id, self.category_type
            )
        })
    }

    fn check_course(&self, collaborator: &'static str, course_id: &str) -> Answer<()> {
        if course_id == self.course_id {
            Ok(())
        } else {
            Err(CollaboratorError::new(
                collaborator,
                format!("no gradebook loaded for course {course_id}"),
            ))
        }
    }
}

impl AssignmentCatalog for GradebookSnapshot {
    fn counted_assignments(&self, course_id: &str) -> Answer<Vec<Assignment>> {
        self.check_course("assignment catalog", course_id)?;
        Ok(self
            .assignments
            .iter()
            .filter(|assignment| assignment.participates())
            .cloned()
            .collect())
    }
}

impl CategoryCatalog for GradebookSnapshot {
    fn category(&self, category_id: i64) -> Answer<Option<Category>> {
        Ok(self
            .categories
            .iter()
            .find(|category| category.id == category_id)
            .cloned())
    }
}

impl ScoreProvider for GradebookSnapshot {
    fn score(&self, assignment_id: i64, student_id: &str) -> Answer<Option<String>> {
        Ok(self
            .scores
            .iter()
            .find(|record| record.assignment_id == assignment_id && record.student_id == student_id)
            .and_then(|record| record.raw_score.clone()))
    }
}

impl OverrideProvider for GradebookSnapshot {
    fn override_percentage(&self, student_id: &str, course_id: &str) -> Answer<Option<f64>> {
        self.check_course("override provider", course_id)?;
        Ok(self
            .overrides
            .iter()
            .find(|record| record.student_id == student_id)
            .map(|record| record.percentage))
    }
}

impl MemberDirectory for GradebookSnapshot {
    fn members(&self, course_id: &str) -> Answer<Vec<Member>> {
        self.check_course("member directory", course_id)?;
        Ok(self.members.clone())
    }
}
