use std::fmt::Write;

use tracing::debug;

use crate::catalog::{CategoryCatalog, OverrideProvider, ScoreProvider};
use crate::error::{AggregationFailure, Denominator, GradeError};
use crate::models::{AggregationMode, Assignment, Category, StudentGradeResult};

/// Computes final grades for one course, one student at a time.
pub struct GradeAggregator<'a, G: ?Sized> {
    gradebook: &'a G,
    course_id: &'a str,
    mode: AggregationMode,
    assignments: &'a [Assignment],
}

impl<'a, G> GradeAggregator<'a, G>
where
    G: CategoryCatalog + ScoreProvider + OverrideProvider + ?Sized,
{
    pub fn new(
        gradebook: &'a G,
        course_id: &'a str,
        mode: AggregationMode,
        assignments: &'a [Assignment],
    ) -> Self {
        Self {
            gradebook,
            course_id,
            mode,
            assignments,
        }
    }

    pub fn compute(&self, student_id: &str) -> Result<StudentGradeResult, AggregationFailure> {
        let mut tally = Tally::default();
        match self.compute_with(student_id, &mut tally) {
            Ok(result) => Ok(result),
            Err(error) => Err(AggregationFailure {
                error,
                student_id: Some(student_id.to_string()),
                category_id: tally.category_id,
                total_points: tally.total_points,
                total_possible: tally.total_possible,
                trace: tally.trace,
            }),
        }
    }

    fn compute_with(
        &self,
        student_id: &str,
        tally: &mut Tally,
    ) -> Result<StudentGradeResult, GradeError> {
        let _ = writeln!(
            tally.trace,
            "student: {student_id}; course: {}; mode: {}",
            self.course_id,
            self.mode.label()
        );

        if let Some(forced) = self
            .gradebook
            .override_percentage(student_id, self.course_id)?
        {
            let _ = writeln!(tally.trace, "final grade: {forced} (forced)");
            debug!(student_id, percentage = forced, "using grade override");
            return Ok(StudentGradeResult {
                student_id: student_id.to_string(),
                percentage: forced,
                rounded_grade: round_half_up(forced),
                overridden: true,
            });
        }

        match self.mode {
            AggregationMode::Uncategorized | AggregationMode::CategorizedSimple => {
                self.accumulate_points(student_id, tally)?;
            }
            AggregationMode::CategorizedWeighted => {
                let groups = self.group_by_category(student_id, tally)?;
                for group in groups.iter() {
                    self.apply_category(group, tally)?;
                }
                tally.category_id = None;
            }
        }

        let percentage = percentage_of(
            tally.total_points,
            tally.total_possible,
            Denominator::TotalPossible,
        )?;
        let _ = writeln!(
            tally.trace,
            "total points: {}; total possible: {}; final grade: {percentage}",
            tally.total_points, tally.total_possible
        );
        debug!(
            student_id,
            total_points = tally.total_points,
            total_possible = tally.total_possible,
            percentage,
            "computed grade"
        );

        Ok(StudentGradeResult {
            student_id: student_id.to_string(),
            percentage,
            rounded_grade: round_half_up(percentage),
            overridden: false,
        })
    }

    fn graded_score(
        &self,
        assignment: &Assignment,
        student_id: &str,
        tally: &mut Tally,
    ) -> Result<Option<f64>, GradeError> {
        let raw = self.gradebook.score(assignment.id, student_id)?;
        let _ = write!(
            tally.trace,
            "assignment: {}; score: {}; ",
            assignment.id,
            raw.as_deref().unwrap_or("")
        );
        let score = parse_score(assignment.id, raw.as_deref())?;
        debug!(
            student_id,
            assignment_id = assignment.id,
            assignment = assignment.name.as_str(),
            score,
            "collected score"
        );
        Ok(score)
    }

    fn accumulate_points(&self, student_id: &str, tally: &mut Tally) -> Result<(), GradeError> {
        for assignment in self.assignments {
            if let Some(score) = self.graded_score(assignment, student_id, tally)? {
                tally.total_points += score;
                tally.total_possible += assignment.points_possible;
                let _ = write!(tally.trace, "points possible: {}", assignment.points_possible);
            }
            let _ = writeln!(tally.trace);
        }
        Ok(())
    }

    fn group_by_category(
        &self,
        student_id: &str,
        tally: &mut Tally,
    ) -> Result<Vec<CategoryScores>, GradeError> {
        let mut groups: Vec<CategoryScores> = Vec::new();

        for assignment in self.assignments {
            let score = self.graded_score(assignment, student_id, tally)?;
            let category_id = assignment
                .category_id
                .ok_or(GradeError::MissingCategory {
                    assignment_id: assignment.id,
                    category_id: None,
                })?;
            let _ = writeln!(
                tally.trace,
                "category: {category_id}; points possible: {}",
                assignment.points_possible
            );

            let index = match groups.iter().position(|g| g.category_id == category_id) {
                Some(index) => index,
                None => {
                    groups.push(CategoryScores::new(category_id, assignment.id));
                    groups.len() - 1
                }
            };
            groups[index].record(assignment.points_possible, score);
        }

        Ok(groups)
    }

    fn apply_category(&self, group: &CategoryScores, tally: &mut Tally) -> Result<(), GradeError> {
        tally.category_id = Some(group.category_id);
        let category =
            self.gradebook
                .category(group.category_id)?
                .ok_or(GradeError::MissingCategory {
                    assignment_id: group.first_assignment_id,
                    category_id: Some(group.category_id),
                })?;
        let _ = write!(
            tally.trace,
            "category: {}; weight: {:?}; drop lowest: {}; drop highest: {}; keep highest: {}; ",
            category.id,
            category.weight,
            category.drop_lowest,
            category.drop_highest,
            category.keep_highest
        );

        if group.scores.is_empty() {
            let _ = writeln!(
                tally.trace,
                "no graded assignments; total points: {}",
                tally.total_points
            );
            return Ok(());
        }

        let contribution = category_contribution(&category, group)?;
        tally.total_points += contribution.points;
        tally.total_possible += contribution.possible;
        let _ = writeln!(
            tally.trace,
            "category points: {}; category possible: {}; total points: {}; total possible: {}",
            contribution.points, contribution.possible, tally.total_points, tally.total_possible
        );
        debug!(
            category_id = category.id,
            category = category.name.as_str(),
            points = contribution.points,
            possible = contribution.possible,
            "applied category"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Tally {
    total_points: f64,
    total_possible: f64,
    category_id: Option<i64>,
    trace: String,
}

/// Graded scores of one category for one student, in catalog order.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryScores {
    pub category_id: i64,
    pub first_assignment_id: i64,
    pub possible: f64,
    /// Points possible of the most recently seen assignment in the category,
    /// graded or not. Drops and keep-highest adjust possible points by this
    /// figure rather than by the dropped assignment's own value, so mixed
    /// point values in one category produce order-dependent results.
    pub last_points_possible: f64,
    pub scores: Vec<f64>,
}

impl CategoryScores {
    pub fn new(category_id: i64, first_assignment_id: i64) -> Self {
        Self {
            category_id,
            first_assignment_id,
            possible: 0.0,
            last_points_possible: 0.0,
            scores: Vec::new(),
        }
    }

    pub fn record(&mut self, points_possible: f64, score: Option<f64>) {
        self.last_points_possible = points_possible;
        if let Some(score) = score {
            self.possible += points_possible;
            self.scores.push(score);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryContribution {
    pub points: f64,
    pub possible: f64,
}

/// What one weighted category adds to the course totals.
pub fn category_contribution(
    category: &Category,
    group: &CategoryScores,
) -> Result<CategoryContribution, GradeError> {
    let weight = category.effective_weight();
    let mut scores = group.scores.clone();
    scores.sort_by(|a, b| b.total_cmp(a));

    if category.keep_highest {
        let highest = scores.first().copied().unwrap_or(0.0);
        return Ok(CategoryContribution {
            points: highest * weight,
            possible: group.last_points_possible,
        });
    }

    let mut possible = group.possible;
    if category.drop_highest && !scores.is_empty() {
        scores.remove(0);
        possible -= group.last_points_possible;
    }
    if category.drop_lowest && scores.pop().is_some() {
        possible -= group.last_points_possible;
    }

    let category_score: f64 = scores.iter().sum();
    let category_percentage = percentage_of(category_score, possible, Denominator::CategoryPossible)?;

    Ok(CategoryContribution {
        points: category_percentage * weight,
        possible: weight * 100.0,
    })
}

/// Blank means ungraded.
pub fn parse_score(assignment_id: i64, raw: Option<&str>) -> Result<Option<f64>, GradeError> {
    let Some(trimmed) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    match trimmed.parse::<f64>() {
        Ok(score) if score.is_finite() => Ok(Some(score)),
        _ => Err(GradeError::Parse {
            assignment_id,
            raw: trimmed.to_string(),
        }),
    }
}

fn percentage_of(points: f64, possible: f64, denominator: Denominator) -> Result<f64, GradeError> {
    if possible <= 0.0 || possible.is_nan() {
        return Err(GradeError::DegenerateDenominator {
            denominator,
            value: possible,
        });
    }
    Ok(points * 100.0 / possible)
}

/// Rounds halves toward positive infinity.
pub fn round_half_up(percentage: f64) -> i64 {
    (percentage + 0.5).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::GradebookSnapshot;
    use crate::testing::{assignment, category, member, score, CourseBuilder};

    const COURSE: &str = "PSYC-1F90";

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn compute(
        snapshot: &GradebookSnapshot,
        mode: AggregationMode,
        student: &str,
    ) -> Result<StudentGradeResult, AggregationFailure> {
        GradeAggregator::new(snapshot, COURSE, mode, &snapshot.assignments).compute(student)
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round_half_up(84.5), 85);
        assert_eq!(round_half_up(84.49), 84);
        assert_eq!(round_half_up(0.0), 0);
        assert_eq!(round_half_up(99.999), 100);
    }

    #[test]
    fn parse_score_treats_blank_as_ungraded() {
        assert_eq!(parse_score(1, None).unwrap(), None);
        assert_eq!(parse_score(1, Some("   ")).unwrap(), None);
        assert_eq!(parse_score(1, Some(" 7.5 ")).unwrap(), Some(7.5));
        assert!(matches!(
            parse_score(4, Some("A-")),
            Err(GradeError::Parse { assignment_id: 4, .. })
        ));
        assert!(parse_score(4, Some("NaN")).is_err());
    }

    #[test]
    fn override_bypasses_assignment_arithmetic() {
        let snapshot = CourseBuilder::new(COURSE, 1)
            .assignment(assignment(1, 10.0, None))
            .member(member("u-1"))
            .score(score(1, "u-1", "not a number"))
            .override_grade("u-1", 62.5)
            .build();

        let result = compute(&snapshot, AggregationMode::Uncategorized, "u-1").unwrap();
        assert_eq!(result.percentage, 62.5);
        assert_eq!(result.rounded_grade, 63);
        assert!(result.overridden);
    }

    #[test]
    fn simple_mode_excludes_ungraded_from_denominator() {
        let snapshot = CourseBuilder::new(COURSE, 1)
            .assignment(assignment(1, 10.0, None))
            .assignment(assignment(2, 20.0, None))
            .assignment(assignment(3, 50.0, None))
            .score(score(1, "u-1", "8"))
            .score(score(2, "u-1", "15"))
            .score(score(3, "u-1", ""))
            .build();

        let result = compute(&snapshot, AggregationMode::Uncategorized, "u-1").unwrap();
        assert!(close(result.percentage, 23.0 * 100.0 / 30.0));
        assert_eq!(result.rounded_grade, 77);
        assert!(!result.overridden);
    }

    #[test]
    fn simple_categories_ignore_category_membership() {
        let snapshot = CourseBuilder::new(COURSE, 2)
            .assignment(assignment(1, 10.0, Some(7)))
            .assignment(assignment(2, 40.0, Some(8)))
            .score(score(1, "u-1", "5"))
            .score(score(2, "u-1", "40"))
            .build();

        let result = compute(&snapshot, AggregationMode::CategorizedSimple, "u-1").unwrap();
        assert!(close(result.percentage, 90.0));
    }

    #[test]
    fn no_graded_assignments_is_degenerate() {
        let snapshot = CourseBuilder::new(COURSE, 1)
            .assignment(assignment(1, 10.0, None))
            .build();

        let failure = compute(&snapshot, AggregationMode::Uncategorized, "u-1").unwrap_err();
        assert!(matches!(
            failure.error,
            GradeError::DegenerateDenominator {
                denominator: Denominator::TotalPossible,
                ..
            }
        ));
        assert_eq!(failure.student_id.as_deref(), Some("u-1"));
    }

    #[test]
    fn drop_lowest_subtracts_one_assignment_from_possible() {
        let mut quizzes = category(7, Some(0.5));
        quizzes.drop_lowest = true;
        let mut group = CategoryScores::new(7, 1);
        for value in [5.0, 7.0, 9.0] {
            group.record(10.0, Some(value));
        }

        let contribution = category_contribution(&quizzes, &group).unwrap();
        assert!(close(contribution.points, 40.0));
        assert!(close(contribution.possible, 50.0));
    }

    #[test]
    fn keep_highest_counts_last_seen_possible_points() {
        let mut best_of = category(7, Some(0.3));
        best_of.keep_highest = true;
        best_of.drop_lowest = true;
        let mut group = CategoryScores::new(7, 1);
        group.record(10.0, Some(8.0));
        group.record(10.0, Some(9.0));

        let contribution = category_contribution(&best_of, &group).unwrap();
        assert!(close(contribution.points, 9.0 * 0.3));
        assert!(close(contribution.possible, group.last_points_possible));
        assert!(close(contribution.possible, 10.0));
        assert!(group.possible > contribution.possible);
    }

    #[test]
    fn last_seen_possible_points_track_ungraded_assignments_too() {
        let mut group = CategoryScores::new(7, 1);
        group.record(10.0, Some(6.0));
        group.record(25.0, None);

        assert_eq!(group.possible, 10.0);
        assert_eq!(group.last_points_possible, 25.0);
    }

    #[test]
    fn drops_use_last_seen_points_even_with_mixed_values() {
        let mut labs = category(7, None);
        labs.drop_highest = true;
        let mut group = CategoryScores::new(7, 1);
        group.record(20.0, Some(18.0));
        group.record(10.0, Some(5.0));

        // 18 is dropped but only 10 comes off the possible points.
        let contribution = category_contribution(&labs, &group).unwrap();
        assert!(close(contribution.points, 5.0 * 100.0 / 20.0));
        assert!(close(contribution.possible, 100.0));
    }

    #[test]
    fn dropping_every_score_is_degenerate() {
        let mut quizzes = category(7, Some(0.2));
        quizzes.drop_highest = true;
        quizzes.drop_lowest = true;
        let mut group = CategoryScores::new(7, 1);
        group.record(10.0, Some(4.0));

        let err = category_contribution(&quizzes, &group).unwrap_err();
        assert!(matches!(
            err,
            GradeError::DegenerateDenominator {
                denominator: Denominator::CategoryPossible,
                ..
            }
        ));
    }

    #[test]
    fn weighted_mode_combines_categories() {
        let mut quizzes = category(7, Some(0.5));
        quizzes.drop_lowest = true;
        let exams = category(8, Some(0.5));
        let snapshot = CourseBuilder::new(COURSE, 3)
            .category(quizzes)
            .category(exams)
            .assignment(assignment(1, 10.0, Some(7)))
            .assignment(assignment(2, 10.0, Some(7)))
            .assignment(assignment(3, 10.0, Some(7)))
            .assignment(assignment(4, 100.0, Some(8)))
            .score(score(1, "u-1", "5"))
            .score(score(2, "u-1", "7"))
            .score(score(3, "u-1", "9"))
            .score(score(4, "u-1", "70"))
            .build();

        let result = compute(&snapshot, AggregationMode::CategorizedWeighted, "u-1").unwrap();
        // quizzes: 40 of 50, exams: 35 of 50
        assert!(close(result.percentage, 75.0));
        assert_eq!(result.rounded_grade, 75);
    }

    #[test]
    fn weighted_keep_highest_adds_single_score_to_possible() {
        let mut best_of = category(7, Some(0.5));
        best_of.keep_highest = true;
        let snapshot = CourseBuilder::new(COURSE, 3)
            .category(best_of)
            .assignment(assignment(1, 10.0, Some(7)))
            .assignment(assignment(2, 10.0, Some(7)))
            .score(score(1, "u-1", "8"))
            .score(score(2, "u-1", "9"))
            .build();

        let result = compute(&snapshot, AggregationMode::CategorizedWeighted, "u-1").unwrap();
        assert!(close(result.percentage, 4.5 * 100.0 / 10.0));
    }

    #[test]
    fn weighted_null_weight_counts_as_one() {
        let snapshot = CourseBuilder::new(COURSE, 3)
            .category(category(7, None))
            .assignment(assignment(1, 20.0, Some(7)))
            .score(score(1, "u-1", "15"))
            .build();

        let result = compute(&snapshot, AggregationMode::CategorizedWeighted, "u-1").unwrap();
        assert!(close(result.percentage, 75.0));
    }

    #[test]
    fn weighted_category_without_grades_contributes_nothing() {
        let snapshot = CourseBuilder::new(COURSE, 3)
            .category(category(7, Some(0.6)))
            .category(category(8, Some(0.4)))
            .assignment(assignment(1, 10.0, Some(7)))
            .assignment(assignment(2, 10.0, Some(8)))
            .score(score(1, "u-1", "6"))
            .build();

        let result = compute(&snapshot, AggregationMode::CategorizedWeighted, "u-1").unwrap();
        assert!(close(result.percentage, 60.0));
    }

    #[test]
    fn weighted_missing_category_is_reported() {
        let snapshot = CourseBuilder::new(COURSE, 3)
            .assignment(assignment(1, 10.0, Some(42)))
            .score(score(1, "u-1", "6"))
            .build();

        let failure = compute(&snapshot, AggregationMode::CategorizedWeighted, "u-1").unwrap_err();
        assert!(matches!(
            failure.error,
            GradeError::MissingCategory {
                assignment_id: 1,
                category_id: Some(42)
            }
        ));
        assert_eq!(failure.category_id, Some(42));
        assert!(failure.trace.contains("student: u-1"));
    }

    #[test]
    fn weighted_uncategorized_assignment_is_reported() {
        let snapshot = CourseBuilder::new(COURSE, 3)
            .assignment(assignment(1, 10.0, None))
            .score(score(1, "u-1", "6"))
            .build();

        let failure = compute(&snapshot, AggregationMode::CategorizedWeighted, "u-1").unwrap_err();
        assert!(matches!(
            failure.error,
            GradeError::MissingCategory {
                category_id: None,
                ..
            }
        ));
    }

    #[test]
    fn failure_keeps_running_totals() {
        let snapshot = CourseBuilder::new(COURSE, 1)
            .assignment(assignment(1, 10.0, None))
            .assignment(assignment(2, 10.0, None))
            .score(score(1, "u-1", "9"))
            .score(score(2, "u-1", "nine"))
            .build();

        let failure = compute(&snapshot, AggregationMode::Uncategorized, "u-1").unwrap_err();
        assert!(close(failure.total_points, 9.0));
        assert!(close(failure.total_possible, 10.0));
        assert!(failure.trace.contains("assignment: 2; score: nine"));
    }
}
