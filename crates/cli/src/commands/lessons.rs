//! `taskwright lessons`: lesson administration.

use clap::Subcommand;
use taskwright_config::AppConfig;
use taskwright_core::{Lesson, LessonScope, NewLesson};
use taskwright_memory::{LessonStore, SaveOutcome};

use super::CliResult;

#[derive(Subcommand)]
pub enum LessonsCommand {
    /// List stored lessons
    List {
        /// Only show one scope (user, role, general)
        #[arg(short, long)]
        scope: Option<LessonScope>,

        /// Print one JSON record per line
        #[arg(long)]
        json: bool,
    },

    /// Add a lesson
    Add {
        /// Lesson text
        content: String,

        /// Scope (user, role, general)
        #[arg(short, long, default_value = "general")]
        scope: LessonScope,

        /// Role for ROLE lessons
        #[arg(short, long)]
        role: Option<String>,

        /// Comma-separated tags
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Show the lessons block that would be injected for a query
    Search {
        query: String,

        /// Active role (defaults to the configured role)
        #[arg(short, long)]
        role: Option<String>,
    },

    /// Compute embeddings for lessons that have none
    Backfill,
}

pub async fn run(config: &AppConfig, command: LessonsCommand) -> CliResult {
    let store = super::open_lessons(config).await?;

    match command {
        LessonsCommand::List { scope, json } => list(&store, scope, json).await?,
        LessonsCommand::Add {
            content,
            scope,
            role,
            tags,
        } => {
            let outcome = add(&store, content, scope, role, tags).await?;
            match outcome {
                SaveOutcome::Saved(lesson) => println!("Saved {} lesson {}", lesson.scope, lesson.id),
                SaveOutcome::Duplicate => println!("A lesson with this content already exists"),
            }
        }
        LessonsCommand::Search { query, role } => {
            let role = role.or_else(|| config.agent.role.clone());
            let block = store.retrieve(&query, role.as_deref()).await?;
            if block.is_empty() {
                println!("No lessons would be injected.");
            } else {
                println!("{block}");
            }
        }
        LessonsCommand::Backfill => {
            let n = store.backfill_embeddings().await?;
            println!("Embedded {n} lessons");
        }
    }

    Ok(())
}

async fn list(store: &LessonStore, scope: Option<LessonScope>, json: bool) -> CliResult {
    let lessons = store.list(scope).await?;
    if lessons.is_empty() {
        println!("No lessons stored ({} backend).", store.backend_name());
        return Ok(());
    }
    for lesson in &lessons {
        if json {
            println!("{}", serde_json::to_string(lesson)?);
        } else {
            println!("{}", format_lesson(lesson));
        }
    }
    Ok(())
}

async fn add(
    store: &LessonStore,
    content: String,
    scope: LessonScope,
    role: Option<String>,
    tags: Vec<String>,
) -> Result<SaveOutcome, Box<dyn std::error::Error>> {
    if scope == LessonScope::Role && role.is_none() {
        return Err("ROLE lessons need --role".into());
    }
    let mut lesson = NewLesson::new(content, scope).with_tags(tags);
    if let Some(role) = role {
        lesson = lesson.with_role(role);
    }
    Ok(store.save(lesson).await?)
}

fn format_lesson(lesson: &Lesson) -> String {
    let mut line = format!(
        "[{}] {:<8} {}",
        lesson.created_at.format("%Y-%m-%d"),
        lesson.scope.as_str(),
        lesson.content
    );
    if lesson.scope == LessonScope::Role {
        line.push_str(&format!("  (role: {})", lesson.role));
    }
    if !lesson.tags.is_empty() {
        line.push_str(&format!("  #{}", lesson.tags.join(" #")));
    }
    line
}
