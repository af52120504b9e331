//! Telegram update handlers.
//!
//! Each command handler composes the operator and argument guards
//! explicitly, calls into the core store/query/supervisor, and renders the
//! outcome as plain-text replies.

use std::sync::Arc;

use teloxide::prelude::*;

use cvb_core::domain::UserId;
use cvb_core::security::{is_operator, NOT_AUTHORIZED_REPLY};

use crate::router::AppState;

mod commands;
mod text;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(message_text) = msg.text().map(|s| s.to_string()) else {
        return Ok(());
    };

    let user_id = msg.from().map(|u| UserId(u.id.0 as i64));

    if message_text.starts_with('/') {
        let (cmd, rest) = commands::parse_command(&message_text);

        // /start and /help are open; everything else is operator-gated.
        if !matches!(cmd.as_str(), "start" | "help" | "h")
            && !is_operator(user_id, state.cfg.operator_id)
        {
            let _ = bot.send_message(msg.chat.id, NOT_AUTHORIZED_REPLY).await;
            return Ok(());
        }

        return commands::handle_command(msg, state, &cmd, &rest).await;
    }

    text::handle_plain_text(msg, state, &message_text).await
}
