//! `ragachat sessions`: Create and list chat sessions.

use ragachat_chat::ChatRuntime;

use super::load_config;

pub async fn create(user_id: &str, title: &str) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = ChatRuntime::from_config(&load_config()?).await?;
    let session = runtime.orchestrator.create_session(user_id, title).await?;
    println!("✅ Created session {} for {}", session.id, session.user_id);
    Ok(())
}

pub async fn list(user_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = ChatRuntime::from_config(&load_config()?).await?;
    let sessions = runtime.orchestrator.sessions_for_user(user_id).await?;

    if sessions.is_empty() {
        println!("   No sessions for {user_id}.");
        return Ok(());
    }

    for session in sessions {
        println!(
            "  {:>6}  {} {}  (modified {})",
            session.id,
            if session.favorite { "★" } else { " " },
            session.title,
            session.modified_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
