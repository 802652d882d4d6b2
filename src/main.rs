use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::Level;

mod catalog;
mod db;
mod error;
mod grading;
mod models;
mod report;
mod telemetry;
#[cfg(test)]
mod testing;

use catalog::GradebookSnapshot;

#[derive(Parser)]
#[command(name = "course-grades")]
#[command(about = "Final course grade calculator for gradebook exports", long_about = None)]
struct Cli {
    /// Log computation steps at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo gradebook
    Seed,
    /// Import raw scores from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Compute final grades for every student in a course
    #[command(group(
        ArgGroup::new("source")
            .args(["course", "snapshot"])
            .required(true)
            .multiple(false)
    ))]
    Grades {
        #[arg(long)]
        course: Option<String>,
        /// Read the gradebook from a JSON snapshot instead of Postgres
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Also write the grades to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Generate a markdown grade report
    #[command(group(
        ArgGroup::new("source")
            .args(["course", "snapshot"])
            .required(true)
            .multiple(false)
    ))]
    Report {
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        snapshot: Option<PathBuf>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_gradebook(
    course: Option<String>,
    snapshot: Option<PathBuf>,
) -> anyhow::Result<GradebookSnapshot> {
    match (course, snapshot) {
        (_, Some(path)) => GradebookSnapshot::from_json_file(&path),
        (Some(course), None) => {
            let pool = connect().await?;
            db::load_snapshot(&pool, &course).await
        }
        (None, None) => anyhow::bail!("either --course or --snapshot is required"),
    }
}

fn compute(
    gradebook: &GradebookSnapshot,
) -> anyhow::Result<Vec<models::StudentGradeResult>> {
    let mode = gradebook.mode()?;
    report::compute_course_grades(&gradebook.course_id, mode, gradebook).map_err(|failure| {
        let detail = format!(
            "category {}; total points {}; total possible {}\nlast computation:\n{}",
            failure
                .category_id
                .map_or_else(|| "none".to_string(), |id| id.to_string()),
            failure.total_points,
            failure.total_possible,
            failure.trace
        );
        anyhow::Error::new(failure).context(detail)
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let imported = db::import_csv(&pool, &csv).await?;
            println!("Imported {imported} scores from {}.", csv.display());
        }
        Commands::Grades {
            course,
            snapshot,
            csv,
        } => {
            let gradebook = load_gradebook(course, snapshot).await?;
            let results = compute(&gradebook)?;

            if results.is_empty() {
                println!("No active students in {}.", gradebook.course_id);
                return Ok(());
            }

            println!("Final grades for {}:", gradebook.course_id);
            for result in results.iter() {
                println!(
                    "- {} {:.2}% (grade {}){}",
                    result.student_id,
                    result.percentage,
                    result.rounded_grade,
                    if result.overridden { " [override]" } else { "" }
                );
            }

            if let Some(path) = csv {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                report::write_csv(file, &gradebook.members, &results)?;
                println!("Grades written to {}.", path.display());
            }
        }
        Commands::Report {
            course,
            snapshot,
            out,
        } => {
            let gradebook = load_gradebook(course, snapshot).await?;
            let results = compute(&gradebook)?;
            let report = report::build_report(
                &gradebook.course_id,
                &gradebook.title,
                gradebook.mode()?,
                chrono::Utc::now(),
                &gradebook.members,
                &results,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
