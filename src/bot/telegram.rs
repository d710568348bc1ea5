use log::{error, info};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::User;

use crate::bot::handlers::{BotService, MessageContext, Participant};

fn participant(user: &User) -> Participant {
    Participant {
        user_id: user.id.to_string(),
        username: user.username.clone(),
        is_bot: user.is_bot,
    }
}

/// Long-poll Telegram and route every text message through the service
pub async fn run(token: String, service: Arc<BotService>) {
    let bot = Bot::new(token);
    info!("Starting Telegram long polling");

    teloxide::repl(bot, move |bot: Bot, msg: Message| {
        let service = service.clone();
        async move {
            let (Some(text), Some(user)) = (msg.text(), msg.from()) else {
                return respond(());
            };
            let ctx = MessageContext {
                chat_id: msg.chat.id.to_string(),
                sender: participant(user),
                is_private: msg.chat.is_private(),
                reply_to: msg
                    .reply_to_message()
                    .and_then(|replied| replied.from())
                    .map(participant),
            };

            if let Some(reply) = service.handle_message(&ctx, text).await {
                if let Err(e) = bot.send_message(msg.chat.id, reply).await {
                    error!("Failed to reply in chat {}: {}", msg.chat.id, e);
                }
            }
            respond(())
        }
    })
    .await;
}
