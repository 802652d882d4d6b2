use anyhow::Context;
use chrono::{Duration, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::GradebookSnapshot;
use crate::models::{Assignment, Category, Member, OverrideRecord, ScoreRecord};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let courses = vec![
        ("HIST-1F90", "The Medieval World", 1),
        ("ECON-2P30", "Intermediate Macroeconomics", 3),
    ];

    for (id, title, category_type) in courses {
        sqlx::query(
            r#"
            INSERT INTO course_grades.courses (id, title, category_type)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET title = EXCLUDED.title, category_type = EXCLUDED.category_type
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(category_type)
        .execute(pool)
        .await?;
    }

    // (id, course, name, weight, drop_lowest, drop_highest, keep_highest)
    let categories = vec![
        (101_i64, "ECON-2P30", "Quizzes", Some(0.3), true, false, false),
        (102, "ECON-2P30", "Midterm", Some(0.3), false, false, false),
        (103, "ECON-2P30", "Final Exam", Some(0.4), false, false, false),
    ];

    for (id, course_id, name, weight, drop_lowest, drop_highest, keep_highest) in categories {
        sqlx::query(
            r#"
            INSERT INTO course_grades.categories
            (id, course_id, name, weight, drop_lowest, drop_highest, keep_highest)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, weight = EXCLUDED.weight,
                drop_lowest = EXCLUDED.drop_lowest, drop_highest = EXCLUDED.drop_highest,
                keep_highest = EXCLUDED.keep_highest
            "#,
        )
        .bind(id)
        .bind(course_id)
        .bind(name)
        .bind(weight)
        .bind(drop_lowest)
        .bind(drop_highest)
        .bind(keep_highest)
        .execute(pool)
        .await?;
    }

    // (id, course, name, points possible, category)
    let assignments = vec![
        (1001_i64, "HIST-1F90", "Map exercise", 20.0, None),
        (1002, "HIST-1F90", "Primary source essay", 50.0, None),
        (1003, "HIST-1F90", "Final paper", 100.0, None),
        (2001, "ECON-2P30", "Quiz 1", 10.0, Some(101_i64)),
        (2002, "ECON-2P30", "Quiz 2", 10.0, Some(101)),
        (2003, "ECON-2P30", "Quiz 3", 10.0, Some(101)),
        (2004, "ECON-2P30", "Midterm", 60.0, Some(102)),
        (2005, "ECON-2P30", "Final exam", 100.0, Some(103)),
    ];

    for (position, (id, course_id, name, points_possible, category_id)) in
        assignments.into_iter().enumerate()
    {
        sqlx::query(
            r#"
            INSERT INTO course_grades.assignments
            (id, course_id, name, points_possible, category_id, position)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, points_possible = EXCLUDED.points_possible,
                category_id = EXCLUDED.category_id, position = EXCLUDED.position
            "#,
        )
        .bind(id)
        .bind(course_id)
        .bind(name)
        .bind(points_possible)
        .bind(category_id)
        .bind(position as i32)
        .execute(pool)
        .await?;
    }

    let joined = Utc::now() - Duration::days(45);
    let members = vec![
        ("3d7f5d6f", "avery.lee", "Student"),
        ("0c22f1f1", "jules.moreno", "Student"),
        ("d5a0a1a2", "kiara.patel", "Student"),
        ("9b1c77e0", "dr.okafor", "Instructor"),
    ];

    for course_id in ["HIST-1F90", "ECON-2P30"] {
        for (offset, (student_id, display_id, role)) in members.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO course_grades.members
                (course_id, student_id, display_id, role, joined_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (course_id, student_id) DO UPDATE
                SET display_id = EXCLUDED.display_id, role = EXCLUDED.role
                "#,
            )
            .bind(course_id)
            .bind(*student_id)
            .bind(*display_id)
            .bind(*role)
            .bind(joined + Duration::minutes(offset as i64))
            .execute(pool)
            .await?;
        }
    }

    let scores = vec![
        (1001_i64, "3d7f5d6f", "18"),
        (1002, "3d7f5d6f", "41"),
        (1003, "3d7f5d6f", ""),
        (1001, "0c22f1f1", "15"),
        (1002, "0c22f1f1", "37.5"),
        (1003, "0c22f1f1", "72"),
        (1001, "d5a0a1a2", "20"),
        (2001, "3d7f5d6f", "7"),
        (2002, "3d7f5d6f", "9"),
        (2003, "3d7f5d6f", "5"),
        (2004, "3d7f5d6f", "48"),
        (2005, "3d7f5d6f", "81"),
        (2001, "0c22f1f1", "10"),
        (2002, "0c22f1f1", "8"),
        (2004, "0c22f1f1", "39"),
        (2001, "d5a0a1a2", "6"),
        (2002, "d5a0a1a2", "6"),
        (2003, "d5a0a1a2", "8"),
        (2004, "d5a0a1a2", "51"),
        (2005, "d5a0a1a2", "64.5"),
    ];

    for (assignment_id, student_id, raw_score) in scores {
        upsert_score(pool, assignment_id, student_id, Some(raw_score)).await?;
    }

    sqlx::query(
        r#"
        INSERT INTO course_grades.grade_overrides (course_id, student_id, percentage)
        VALUES ($1, $2, $3)
        ON CONFLICT (course_id, student_id) DO UPDATE SET percentage = EXCLUDED.percentage
        "#,
    )
    .bind("HIST-1F90")
    .bind("d5a0a1a2")
    .bind(77.0_f64)
    .execute(pool)
    .await?;

    Ok(())
}

async fn upsert_score(
    pool: &PgPool,
    assignment_id: i64,
    student_id: &str,
    raw_score: Option<&str>,
) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO course_grades.scores (id, assignment_id, student_id, raw_score, recorded_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (assignment_id, student_id) DO UPDATE
        SET raw_score = EXCLUDED.raw_score, recorded_at = EXCLUDED.recorded_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(assignment_id)
    .bind(student_id)
    .bind(raw_score)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        assignment_id: i64,
        student_id: String,
        score: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut imported = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid score row {}", line + 1))?;
        let affected =
            upsert_score(pool, row.assignment_id, &row.student_id, row.score.as_deref()).await?;

        if affected > 0 {
            imported += 1;
        }
    }

    info!(path = %csv_path.display(), imported, "imported scores");
    Ok(imported)
}

pub async fn load_snapshot(pool: &PgPool, course_id: &str) -> anyhow::Result<GradebookSnapshot> {
    let course = sqlx::query(
        "SELECT id, title, category_type FROM course_grades.courses WHERE id = $1",
    )
    .bind(course_id)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("course {course_id} not found"))?;

    let assignments = sqlx::query(
        "SELECT id, name, points_possible, category_id, counted, removed \
         FROM course_grades.assignments \
         WHERE course_id = $1 AND counted AND NOT removed \
         ORDER BY position, id",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| Assignment {
        id: row.get("id"),
        name: row.get("name"),
        points_possible: row.get("points_possible"),
        category_id: row.get("category_id"),
        counted: row.get("counted"),
        removed: row.get("removed"),
    })
    .collect::<Vec<_>>();

    let categories = sqlx::query(
        "SELECT id, name, weight, drop_lowest, drop_highest, keep_highest \
         FROM course_grades.categories WHERE course_id = $1 ORDER BY id",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| Category {
        id: row.get("id"),
        name: row.get("name"),
        weight: row.get("weight"),
        drop_lowest: row.get("drop_lowest"),
        drop_highest: row.get("drop_highest"),
        keep_highest: row.get("keep_highest"),
    })
    .collect::<Vec<_>>();

    let members = sqlx::query(
        "SELECT student_id, display_id, role, active \
         FROM course_grades.members WHERE course_id = $1 ORDER BY joined_at, student_id",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| Member {
        student_id: row.get("student_id"),
        display_id: row.get("display_id"),
        role: row.get("role"),
        active: row.get("active"),
    })
    .collect::<Vec<_>>();

    let scores = sqlx::query(
        "SELECT s.assignment_id, s.student_id, s.raw_score \
         FROM course_grades.scores s \
         JOIN course_grades.assignments a ON a.id = s.assignment_id \
         WHERE a.course_id = $1",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| ScoreRecord {
        assignment_id: row.get("assignment_id"),
        student_id: row.get("student_id"),
        raw_score: row.get("raw_score"),
    })
    .collect::<Vec<_>>();

    let overrides = sqlx::query(
        "SELECT student_id, percentage FROM course_grades.grade_overrides WHERE course_id = $1",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| OverrideRecord {
        student_id: row.get("student_id"),
        percentage: row.get("percentage"),
    })
    .collect::<Vec<_>>();

    debug!(
        course_id,
        assignments = assignments.len(),
        members = members.len(),
        scores = scores.len(),
        "loaded gradebook snapshot"
    );

    Ok(GradebookSnapshot {
        course_id: course.get("id"),
        title: course.get("title"),
        category_type: course.get("category_type"),
        assignments,
        categories,
        members,
        scores,
        overrides,
    })
}
