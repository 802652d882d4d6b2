use serde::{Deserialize, Serialize};

pub const STUDENT_ROLE: &str = "Student";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    Uncategorized,
    CategorizedSimple,
    CategorizedWeighted,
}

impl AggregationMode {
    /// Maps the host gradebook's stored category type (1, 2 or 3).
    pub fn from_category_type(category_type: i32) -> Option<Self> {
        match category_type {
            1 => Some(Self::Uncategorized),
            2 => Some(Self::CategorizedSimple),
            3 => Some(Self::CategorizedWeighted),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Uncategorized => "no categories",
            Self::CategorizedSimple => "categories without weighting",
            Self::CategorizedWeighted => "weighted categories",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub points_possible: f64,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default = "default_true")]
    pub counted: bool,
    #[serde(default)]
    pub removed: bool,
}

impl Assignment {
    pub fn participates(&self) -> bool {
        self.counted && !self.removed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub drop_lowest: bool,
    #[serde(default)]
    pub drop_highest: bool,
    #[serde(default)]
    pub keep_highest: bool,
}

impl Category {
    pub fn effective_weight(&self) -> f64 {
        self.weight.unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub assignment_id: i64,
    pub student_id: String,
    #[serde(default)]
    pub raw_score: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub student_id: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub student_id: String,
    #[serde(default)]
    pub display_id: String,
    pub role: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Member {
    pub fn is_active_student(&self) -> bool {
        self.active && self.role == STUDENT_ROLE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentGradeResult {
    pub student_id: String,
    pub percentage: f64,
    pub rounded_grade: i64,
    pub overridden: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct GradeBand {
    pub label: String,
    pub count: usize,
}
