//! `mathtutor ask`: One question, reply streamed to stdout.

use futures::StreamExt;
use mathtutor_config::AppConfig;
use mathtutor_tutor::orchestrator::TECHNICAL_DIFFICULTIES;
use mathtutor_tutor::{ChatReply, ChatRequest};
use std::io::Write;

pub async fn run(
    topic: String,
    session: String,
    message: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let tutor = mathtutor_gateway::build_tutor(&config).await?;

    match tutor.handle(ChatRequest::new(topic, message, session)).await {
        ChatReply::Streaming(mut stream) => {
            let mut stdout = std::io::stdout();
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(text) => {
                        write!(stdout, "{text}")?;
                        stdout.flush()?;
                    }
                    Err(e) => {
                        println!();
                        tracing::warn!(error = %e, "Reply stream failed");
                        eprintln!("{TECHNICAL_DIFFICULTIES}");
                        return Err(e.into());
                    }
                }
            }
            println!();
        }
        ChatReply::Rejected(message) => {
            eprintln!("{message}");
            return Err("request rejected".into());
        }
        reply => {
            if let Some(message) = reply.message() {
                println!("{message}");
            }
        }
    }

    Ok(())
}
