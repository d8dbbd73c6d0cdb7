use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::prelude::*;
use teloxide::types::User;
use tracing::{debug, error, info, warn};

use corpsewatch_core::{Announcer, ChatId, InboundEvent, TransportError, UserId};
use logging::redact_sensitive_data;

use crate::intake::{Admission, Intake};
use crate::ChannelAdapter;

/// Long-polling Telegram bot: feeds group messages into the [`Intake`] and
/// delivers weekly announcements.
pub struct TelegramAdapter {
    bot: Bot,
    bot_name: String,
}

impl TelegramAdapter {
    pub fn new(token: impl Into<String>, bot_name: impl Into<String>) -> Self {
        Self {
            bot: Bot::new(token),
            bot_name: bot_name.into(),
        }
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self, intake: Arc<Intake>) -> anyhow::Result<()> {
        info!(bot = %self.bot_name, "Starting Telegram adapter");

        let handler = Update::filter_message().endpoint(
            |bot: Bot, msg: Message, intake: Arc<Intake>| async move {
                handle_message(&bot, &msg, &intake).await;
                respond(())
            },
        );

        Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![intake])
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        info!(bot = %self.bot_name, "Telegram adapter stopped");
        Ok(())
    }
}

#[async_trait]
impl Announcer for TelegramAdapter {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn announce(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError> {
        self.bot
            .send_message(teloxide::types::ChatId(chat_id), text)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Send {
                chat_id,
                message: redact_sensitive_data(&e.to_string()),
            })
    }
}

async fn handle_message(bot: &Bot, msg: &Message, intake: &Intake) {
    let Some(user) = msg.from.as_ref() else {
        debug!(chat_id = msg.chat.id.0, "Ignoring message without a sender");
        return;
    };
    let Some(event) = to_inbound(user, msg.chat.id.0, msg.date) else {
        debug!(chat_id = msg.chat.id.0, "Ignoring message from a bot");
        return;
    };

    if let Admission::Rejected { notice } = intake.handle(&event).await {
        warn!(
            chat_id = event.chat_id,
            chat_title = msg.chat.title().unwrap_or(""),
            sender = %event.display_name,
            "Message from a chat outside the allow-list"
        );
        if let Err(e) = bot.send_message(msg.chat.id, notice).await {
            error!(
                chat_id = event.chat_id,
                error = %redact_sensitive_data(&e.to_string()),
                "Failed to send restricted-chat notice"
            );
        }
    }
}

/// Map a Telegram sender onto an inbound event. Bots are not tracked.
fn to_inbound(user: &User, chat_id: ChatId, date: DateTime<Utc>) -> Option<InboundEvent> {
    if user.is_bot {
        return None;
    }
    let user_id = i64::try_from(user.id.0).ok()?;
    let display_name = user
        .username
        .clone()
        .unwrap_or_else(|| user.first_name.clone());
    Some(InboundEvent {
        user_id: UserId(user_id),
        display_name,
        chat_id,
        timestamp: date,
    })
}
