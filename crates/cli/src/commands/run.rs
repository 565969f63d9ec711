//! `taskwright run`: execute one task and print the answer.

use taskwright_config::AppConfig;
use tokio::sync::mpsc;

use super::CliResult;

pub async fn run(config: &AppConfig, prompt: &str) -> CliResult {
    let mut agent = super::build_agent(config).await?;

    let (tx, mut rx) = mpsc::unbounded_channel::<taskwright_core::AgentEvent>();
    let progress = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            eprintln!("  [{}] {}", event.kind().as_str(), event.describe());
        }
    });

    let outcome = tokio::select! {
        outcome = agent.execute(prompt, Some(&tx)) => Some(outcome),
        _ = tokio::signal::ctrl_c() => None,
    };
    drop(tx);
    let _ = progress.await;
    agent.shutdown().await;

    match outcome {
        Some(outcome) => {
            println!("{}", outcome.answer);
            if outcome.reason.is_degraded() {
                eprintln!("  (stopped early: {})", outcome.reason);
            }
            Ok(())
        }
        None => Err("Interrupted".into()),
    }
}
