//! Chat-platform webhook.
//!
//! Each update is mapped onto a ledger event and answered with a single Bot API method in the
//! response body, so the bot never opens an outbound connection.

pub mod types;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use tracing::{debug, error};
use trojan_ledger::{FreeTextOutcome, FALLBACK_DISPLAY_NAME};

use crate::menu::{self, Action, Screen};
use crate::state::AppState;
use types::{BotReply, CallbackQuery, Message, Update, User};

const MARKDOWN: &str = "Markdown";

pub async fn webhook_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(update): Json<Update>,
) -> Response {
    if token != state.config.bot_token {
        return StatusCode::NOT_FOUND.into_response();
    }
    metrics::counter!("webhook_updates_total").increment(1);
    // Snapshot writes fsync under the store lock; keep them off the async workers.
    match tokio::task::spawn_blocking(move || dispatch(&state, update)).await {
        Ok(Some(reply)) => Json(reply).into_response(),
        Ok(None) => StatusCode::OK.into_response(),
        Err(err) => {
            error!(error = %err, "update dispatch failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Turns one update into the reply to send, if any.
pub fn dispatch(state: &AppState, update: Update) -> Option<BotReply> {
    debug!(update_id = update.update_id, "update received");
    if let Some(query) = update.callback_query {
        return on_callback(state, &query);
    }
    update.message.and_then(|message| on_message(state, &message))
}

fn on_message(state: &AppState, message: &Message) -> Option<BotReply> {
    let from = message.from.as_ref()?;
    let text = message.text.as_deref()?;
    let user_id = from.id.to_string();

    let screen = match parse_command(text) {
        Some(("start", token)) => {
            let registration = state.service.on_start(&user_id, &display_name(from), token);
            menu::main_menu(&registration.user)
        }
        // Commands are not free text; they leave any pending prompt open.
        Some(_) => menu::unrecognized_input(),
        None => match state.service.on_free_text(&user_id, text) {
            FreeTextOutcome::WalletAccepted(user) => menu::wallet_accepted(&user),
            FreeTextOutcome::WalletRejected(rejection) => menu::wallet_rejected(&rejection),
            FreeTextOutcome::Unrecognized => menu::unrecognized_input(),
        },
    };
    Some(send(message.chat.id, screen))
}

fn on_callback(state: &AppState, query: &CallbackQuery) -> Option<BotReply> {
    // Inaccessible (very old) messages cannot be edited.
    let message = query.message.as_ref()?;
    let user_id = query.from.id.to_string();
    debug!(query = %query.id, user = %user_id, data = ?query.data, "callback received");

    let screen = match state.service.user(&user_id) {
        None => menu::user_not_found(),
        Some(user) => match query.data.as_deref().and_then(Action::parse) {
            None => menu::unknown_action(),
            Some(action) => match action {
                Action::Sell => menu::no_tokens(),
                Action::LimitOrders => menu::no_limit_orders(),
                Action::DcaOrders => menu::no_dca_orders(),
                Action::CopyTrade
                | Action::Sniper
                | Action::Trenches
                | Action::Watchlist
                | Action::Withdraw
                | Action::Settings => menu::deposit_required(&user),
                Action::Rewards => {
                    menu::rewards(&user, &state.config.referral_link(&user.id), Utc::now())
                }
                Action::SetRewardsWallet => {
                    match state.service.on_set_rewards_wallet_requested(&user_id) {
                        Some(user) => menu::wallet_prompt(&user),
                        None => menu::user_not_found(),
                    }
                }
                Action::Refresh | Action::BackToMain => menu::main_menu(&user),
                Action::Buy | Action::Positions | Action::Help => menu::coming_soon(),
            },
        },
    };
    Some(edit(message.chat.id, message.message_id, screen))
}

/// `/start@Bot ref_1` -> `("start", Some("ref_1"))`. `None` for anything not starting with `/`.
fn parse_command(text: &str) -> Option<(&str, Option<&str>)> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?.strip_prefix('/')?;
    let command = head.split('@').next().unwrap_or(head);
    Some((command, parts.next()))
}

fn display_name(user: &User) -> String {
    user.username
        .as_deref()
        .or(user.first_name.as_deref())
        .filter(|name| !name.is_empty())
        .unwrap_or(FALLBACK_DISPLAY_NAME)
        .to_owned()
}

fn send(chat_id: i64, screen: Screen) -> BotReply {
    BotReply::SendMessage {
        chat_id,
        parse_mode: screen.markdown.then_some(MARKDOWN),
        text: screen.text,
        reply_markup: screen.keyboard,
    }
}

fn edit(chat_id: i64, message_id: i64, screen: Screen) -> BotReply {
    BotReply::EditMessageText {
        chat_id,
        message_id,
        parse_mode: screen.markdown.then_some(MARKDOWN),
        text: screen.text,
        reply_markup: screen.keyboard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;
    use serde_json::json;
    use trojan_ledger::SessionState;

    const TEAM_1: &str = "8rMj1dMR6tp428j7DaGUn6TpLi89fpdYNQEwqUzyFCe3";

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn app_state(dir: &tempfile::TempDir) -> AppState {
        test_state(&dir.path().join("users.json"))
    }

    fn message(user_id: i64, text: &str) -> Update {
        serde_json::from_value(json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "from": { "id": user_id, "is_bot": false, "first_name": "Al", "username": "alice" },
                "chat": { "id": user_id, "type": "private" },
                "date": 1_700_000_000,
                "text": text
            }
        }))
        .unwrap()
    }

    fn press(user_id: i64, data: &str) -> Update {
        serde_json::from_value(json!({
            "update_id": 2,
            "callback_query": {
                "id": "cb-1",
                "from": { "id": user_id, "is_bot": false, "first_name": "Al" },
                "message": {
                    "message_id": 11,
                    "chat": { "id": user_id, "type": "private" },
                    "date": 1_700_000_000,
                    "text": "menu"
                },
                "chat_instance": "x",
                "data": data
            }
        }))
        .unwrap()
    }

    // =========================================================================
    // TESTS
    // =========================================================================

    #[test]
    fn test_start_registers_and_renders_menu() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);

        let reply = dispatch(&state, message(1, "/start")).unwrap();
        assert!(matches!(reply, BotReply::SendMessage { chat_id: 1, .. }));
        assert!(reply.text().contains(TEAM_1));
        assert_eq!(reply.keyboard().unwrap().inline_keyboard.len(), 6);
        assert_eq!(state.service.user("1").unwrap().display_name, "alice");
    }

    #[test]
    fn test_start_with_referral_token() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);
        dispatch(&state, message(1, "/start"));
        dispatch(&state, message(2, "/start ref_1"));
        dispatch(&state, message(3, "/start@Thanatos_TrojanBot ref_2"));

        assert_eq!(state.service.user("2").unwrap().referred_by.as_deref(), Some("1"));
        assert_eq!(state.service.user("1").unwrap().direct_referrals, 1);
        assert_eq!(state.service.user("1").unwrap().indirect_referrals, 1);
    }

    #[test]
    fn test_wallet_flow_over_webhook() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);
        dispatch(&state, message(1, "/start"));

        let prompt = dispatch(&state, press(1, "set_rewards_wallet")).unwrap();
        assert!(matches!(prompt, BotReply::EditMessageText { message_id: 11, .. }));
        assert!(prompt.text().contains("Reply with the new rewards wallet"));
        assert_eq!(state.service.session_state("1"), SessionState::AwaitingWalletInput);

        let wallet = "F".repeat(40);
        let accepted = dispatch(&state, message(1, &wallet)).unwrap();
        assert!(accepted.text().contains(&wallet));
        assert_eq!(state.service.user("1").unwrap().rewards_wallet, wallet);

        let stray = dispatch(&state, message(1, "hello there")).unwrap();
        assert!(stray.text().contains("didn't understand"));
    }

    #[test]
    fn test_other_commands_keep_prompt_open() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);
        dispatch(&state, message(1, "/start"));
        dispatch(&state, press(1, "set_rewards_wallet"));

        dispatch(&state, message(1, "/help"));
        assert_eq!(state.service.session_state("1"), SessionState::AwaitingWalletInput);
    }

    #[test]
    fn test_callbacks_before_start_ask_for_restart() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);
        let reply = dispatch(&state, press(9, "rewards")).unwrap();
        assert_eq!(reply.text(), "User not found. Please restart the bot with /start");
    }

    #[test]
    fn test_callback_routing() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);
        dispatch(&state, message(1, "/start"));

        let text = |data: &str| dispatch(&state, press(1, data)).unwrap().text().to_owned();
        assert!(text("sell").contains("do not have any tokens"));
        assert!(text("withdraw").contains("deposit at least 1 SOL"));
        assert!(text("withdraw").contains(TEAM_1));
        assert!(text("rewards").contains("https://t.me/Thanatos_TrojanBot?start=ref_1"));
        assert_eq!(text("buy"), "This feature is coming soon!");
        assert_eq!(text("nonsense"), "Unknown action.");
        assert!(text("back_to_main").contains("Tap to Copy"));
    }

    #[test]
    fn test_reply_serializes_as_bot_api_method() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);
        let reply = dispatch(&state, message(1, "/start")).unwrap();
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["method"], "sendMessage");
        assert_eq!(json["parse_mode"], "Markdown");
        assert_eq!(json["reply_markup"]["inline_keyboard"][0][0]["callback_data"], "buy");
    }

    #[test]
    fn test_updates_without_sender_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);
        let update: Update = serde_json::from_value(json!({
            "update_id": 3,
            "message": { "message_id": 1, "chat": { "id": -100 }, "text": "/start" }
        }))
        .unwrap();
        assert!(dispatch(&state, update).is_none());
        assert_eq!(state.service.user_count(), 0);
    }

    #[tokio::test]
    async fn test_handler_rejects_wrong_token_without_touching_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);

        let response = webhook_handler(
            State(state.clone()),
            Path("123:wrong".into()),
            Json(message(1, "/start")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(state.service.user_count(), 0);
        assert!(!dir.path().join("users.json").exists());
    }

    #[tokio::test]
    async fn test_handler_answers_with_bot_method() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);

        let response = webhook_handler(
            State(state.clone()),
            Path("123:secret".into()),
            Json(message(1, "/start")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(state.service.user_count(), 1);

        let silent: Update = serde_json::from_value(json!({ "update_id": 4 })).unwrap();
        let response = webhook_handler(State(state), Path("123:secret".into()), Json(silent)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/start"), Some(("start", None)));
        assert_eq!(parse_command("/start ref_7"), Some(("start", Some("ref_7"))));
        assert_eq!(parse_command("/start@bot ref_7"), Some(("start", Some("ref_7"))));
        assert_eq!(parse_command("hello"), None);
    }
}
