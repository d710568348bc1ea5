use anyhow::Result;
use log::info;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::bot::handlers::{BotService, MessageContext, Participant};

/// Turn one console line into a message.
///
/// Format: `[#chat] <user> [>reply_user] <text>`. Without `#chat` the
/// message is a private chat with the user; a user id doubles as username.
pub fn parse_line(line: &str) -> Option<(MessageContext, String)> {
    let mut rest = line.trim();
    let mut chat = None;
    if let Some(stripped) = rest.strip_prefix('#') {
        let (name, tail) = stripped.split_once(char::is_whitespace)?;
        chat = Some(name.to_string());
        rest = tail.trim_start();
    }

    let (user, mut text) = rest.split_once(char::is_whitespace)?;
    text = text.trim_start();
    let mut reply_to = None;
    if let Some(stripped) = text.strip_prefix('>') {
        let (target, tail) = stripped.split_once(char::is_whitespace)?;
        reply_to = Some(Participant::new(target, Some(target)));
        text = tail.trim_start();
    }
    if text.is_empty() {
        return None;
    }

    let ctx = MessageContext {
        is_private: chat.is_none(),
        chat_id: chat.unwrap_or_else(|| user.to_string()),
        sender: Participant::new(user, Some(user)),
        reply_to,
    };
    Some((ctx, text.to_string()))
}

/// Drive the bot from stdin until EOF
pub async fn run(service: Arc<BotService>) -> Result<()> {
    info!("Console driver ready, enter `[#chat] <user> [>reply_user] <text>`");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let Some((ctx, text)) = parse_line(&line) else {
            if !line.trim().is_empty() {
                stdout
                    .write_all(b"usage: [#chat] <user> [>reply_user] <text>\n")
                    .await?;
            }
            continue;
        };
        if let Some(reply) = service.handle_message(&ctx, &text).await {
            stdout
                .write_all(format!("[{} -> {}] {}\n", ctx.chat_id, ctx.sender.user_id, reply).as_bytes())
                .await?;
            stdout.flush().await?;
        }
    }
    info!("Console input closed");
    Ok(())
}
