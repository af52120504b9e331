use std::sync::Arc;

use teloxide::prelude::*;

use cvb_core::{
    domain::{ChatId, UserId},
    security::{is_operator, single_line_argument},
};

use crate::router::AppState;

/// Plain (non-command) text. With keyword capture enabled, the message is
/// saved to the keyword list; otherwise the bot admits it did not
/// understand. Non-operator chatter is ignored entirely.
pub async fn handle_plain_text(
    msg: Message,
    state: Arc<AppState>,
    text: &str,
) -> ResponseResult<()> {
    let user_id = msg.from().map(|u| UserId(u.id.0 as i64));
    if !is_operator(user_id, state.cfg.operator_id) {
        return Ok(());
    }
    let chat_id = ChatId(msg.chat.id.0);

    if state.monitor.enabled() {
        if let Some(keyword) = single_line_argument(text) {
            let reply = match state.keywords.add(&keyword) {
                Ok(true) => format!("Captured keyword: {keyword}"),
                Ok(false) => format!("Keyword already saved: {keyword}"),
                Err(e) => format!("Error: {e}"),
            };
            let _ = state.messenger.send(chat_id, &reply).await;
            return Ok(());
        }
    }

    let _ = state
        .messenger
        .send(
            chat_id,
            "Sorry, I don't understand, use /help to check all commands",
        )
        .await;
    Ok(())
}
