use crate::catalog::GradebookSnapshot;
use crate::models::{Assignment, Category, Member, OverrideRecord, ScoreRecord, STUDENT_ROLE};

pub fn assignment(id: i64, points_possible: f64, category_id: Option<i64>) -> Assignment {
    Assignment {
        id,
        name: format!("Assignment {id}"),
        points_possible,
        category_id,
        counted: true,
        removed: false,
    }
}

pub fn category(id: i64, weight: Option<f64>) -> Category {
    Category {
        id,
        name: format!("Category {id}"),
        weight,
        drop_lowest: false,
        drop_highest: false,
        keep_highest: false,
    }
}

pub fn member(student_id: &str) -> Member {
    Member {
        student_id: student_id.to_string(),
        display_id: format!("{student_id}-eid"),
        role: STUDENT_ROLE.to_string(),
        active: true,
    }
}

pub fn score(assignment_id: i64, student_id: &str, raw: &str) -> ScoreRecord {
    ScoreRecord {
        assignment_id,
        student_id: student_id.to_string(),
        raw_score: Some(raw.to_string()),
    }
}

pub struct CourseBuilder {
    snapshot: GradebookSnapshot,
}

impl CourseBuilder {
    pub fn new(course_id: &str, category_type: i32) -> Self {
        Self {
            snapshot: GradebookSnapshot {
                course_id: course_id.to_string(),
                title: format!("{course_id} gradebook"),
                category_type,
                ..GradebookSnapshot::default()
            },
        }
    }

    pub fn assignment(mut self, assignment: Assignment) -> Self {
        self.snapshot.assignments.push(assignment);
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.snapshot.categories.push(category);
        self
    }

    pub fn member(mut self, member: Member) -> Self {
        self.snapshot.members.push(member);
        self
    }

    pub fn score(mut self, score: ScoreRecord) -> Self {
        self.snapshot.scores.push(score);
        self
    }

    pub fn override_grade(mut self, student_id: &str, percentage: f64) -> Self {
        self.snapshot.overrides.push(OverrideRecord {
            student_id: student_id.to_string(),
            percentage,
        });
        self
    }

    pub fn build(self) -> GradebookSnapshot {
        self.snapshot
    }
}
