//! `taskwright chat`: interactive mode.
//!
//! Each line is classified first. Small talk is answered directly; tasks run
//! through the agent loop with the conversation kept across tasks. After a
//! task the agent may suggest a lesson, saved only when the user confirms.

use std::io::Write;

use taskwright_agent::{Agent, Intent};
use taskwright_config::AppConfig;
use tokio::io::{self, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::warn;

use super::CliResult;

const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

pub async fn run(config: &AppConfig) -> CliResult {
    let mut agent = super::build_agent(config).await?;

    println!();
    println!("  Taskwright: Interactive Mode");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Tools:     {}", agent.tools().names().join(", "));
    if let Some(role) = &config.agent.role {
        println!("  Role:      {role}");
    }
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(io::stdin()).lines();

    tokio::select! {
        result = chat_loop(&mut agent, &mut lines) => result?,
        _ = tokio::signal::ctrl_c() => println!(),
    }

    agent.shutdown().await;
    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

async fn chat_loop(agent: &mut Agent, lines: &mut Lines<BufReader<Stdin>>) -> CliResult {
    loop {
        let Some(line) = prompt_line(lines, "  You > ").await? else {
            return Ok(());
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if EXIT_COMMANDS.contains(&line) {
            return Ok(());
        }

        match agent.classify(line).await {
            Intent::Chat { response } => print_reply(&response),
            Intent::Task { description } => {
                eprintln!("  Working on: {description}");
                let outcome = agent.execute(line, None).await;
                print_reply(&outcome.answer);
                if outcome.reason.is_degraded() {
                    eprintln!("  (stopped early: {})", outcome.reason);
                }
                suggest_lesson(agent, lines, line, &outcome.answer).await?;
            }
        }
    }
}

async fn suggest_lesson(
    agent: &Agent,
    lines: &mut Lines<BufReader<Stdin>>,
    task: &str,
    answer: &str,
) -> CliResult {
    let Some(lesson) = agent.reflect(task, answer).await else {
        println!("  No new lessons learned.");
        println!();
        return Ok(());
    };

    println!("  Suggested lesson ({}): \"{}\"", lesson.scope, lesson.content);
    let confirm = prompt_line(lines, "  Save this lesson? (y/n): ").await?;
    if !confirm.is_some_and(|c| matches!(c.trim().to_lowercase().as_str(), "y" | "yes")) {
        println!();
        return Ok(());
    }

    match agent.save_lesson(lesson).await {
        Ok(outcome) if outcome.is_saved() => println!("  Lesson saved."),
        Ok(_) => println!("  Already known."),
        Err(e) => {
            warn!(error = %e, "Lesson not saved");
            eprintln!("  [Error] Lesson not saved: {e}");
        }
    }
    println!();
    Ok(())
}

async fn prompt_line(lines: &mut Lines<BufReader<Stdin>>, prompt: &str) -> Result<Option<String>, std::io::Error> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    lines.next_line().await
}

fn print_reply(text: &str) {
    println!();
    for line in text.lines() {
        println!("  Taskwright > {line}");
    }
    println!();
}
