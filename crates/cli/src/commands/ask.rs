//! `ragachat ask`: Ask one question in a session and stream the answer.

use std::io::Write;

use ragachat_chat::ChatRuntime;
use ragachat_core::SessionId;

use super::load_config;

pub async fn run(
    session: i64,
    sender: String,
    question: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let runtime = ChatRuntime::from_config(&config).await?;

    let mut events = runtime
        .orchestrator
        .add_message(SessionId(session), &sender, &question)
        .await?;

    let mut stdout = std::io::stdout();
    while let Some(event) = events.recv().await {
        match event {
            Ok(chunk) => {
                write!(stdout, "{}", chunk.content)?;
                stdout.flush()?;
            }
            Err(e) => {
                eprintln!();
                eprintln!("  [Error] {e}");
                return Err(e.into());
            }
        }
    }
    println!();

    Ok(())
}
