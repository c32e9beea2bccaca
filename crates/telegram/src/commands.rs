use std::sync::Arc;

use teloxide::{dispatching::UpdateHandler, prelude::*};
use tracing::{debug, info};

use engine::CommandProcessor;

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Dependencies injected into every handler via `dptree`.
#[derive(Clone)]
pub struct BotDeps {
    pub processor: Arc<CommandProcessor>,
}

/// Start the Telegram bot in long-polling mode.
pub async fn start_bot(bot: Bot, deps: BotDeps) {
    let deps = Arc::new(deps);

    info!("Telegram bot starting (long-polling)");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![deps])
        .default_handler(|_| async {})
        // Updates carry no ordering key, so each one is handled concurrently
        .distribution_function(|_| None::<std::convert::Infallible>)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync>> {
    Update::filter_message()
        .filter_async(auth_filter)
        .endpoint(handle_message)
}

/// Silently drop messages from any chat but the configured one.
async fn auth_filter(msg: Message, deps: Arc<BotDeps>) -> bool {
    let allowed = deps.processor.is_authorized(&msg.chat.id.0.to_string());
    if !allowed {
        debug!(chat_id = msg.chat.id.0, "Dropping message from unauthorized chat");
    }
    allowed
}

async fn handle_message(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    if let Some(reply) = deps
        .processor
        .handle(&msg.chat.id.0.to_string(), text)
        .await
    {
        bot.send_message(msg.chat.id, reply).await?;
    }
    Ok(())
}
