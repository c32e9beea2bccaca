use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatId;

use common::{Error, Notifier, Result};

/// Delivers crossover alerts to the configured Telegram chat.
pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, chat_id: i64) -> Self {
        Self {
            bot,
            chat_id: ChatId(chat_id),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        self.bot
            .send_message(self.chat_id, text)
            .await
            .map_err(|e| Error::Notify(e.to_string()))?;
        Ok(())
    }
}
