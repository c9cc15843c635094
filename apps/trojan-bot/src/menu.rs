//! Menu texts and inline keyboards.

use chrono::{DateTime, Utc};
use trojan_ledger::{UserRecord, WalletRejection, MAX_WALLET_LEN, MIN_WALLET_LEN};

use crate::webhook::types::{InlineButton, InlineKeyboard};

/// Rendered text plus optional keyboard, independent of how it is delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct Screen {
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
    pub markdown: bool,
}

impl Screen {
    fn markdown(text: String, keyboard: Option<InlineKeyboard>) -> Self {
        Self {
            text,
            keyboard,
            markdown: true,
        }
    }

    fn plain(text: impl Into<String>, keyboard: Option<InlineKeyboard>) -> Self {
        Self {
            text: text.into(),
            keyboard,
            markdown: false,
        }
    }
}

/// Callback data carried by the inline buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Buy,
    Sell,
    Positions,
    LimitOrders,
    DcaOrders,
    CopyTrade,
    Sniper,
    Trenches,
    Rewards,
    Watchlist,
    Withdraw,
    Settings,
    Help,
    Refresh,
    BackToMain,
    SetRewardsWallet,
}

impl Action {
    const ALL: [Action; 16] = [
        Action::Buy,
        Action::Sell,
        Action::Positions,
        Action::LimitOrders,
        Action::DcaOrders,
        Action::CopyTrade,
        Action::Sniper,
        Action::Trenches,
        Action::Rewards,
        Action::Watchlist,
        Action::Withdraw,
        Action::Settings,
        Action::Help,
        Action::Refresh,
        Action::BackToMain,
        Action::SetRewardsWallet,
    ];

    pub fn parse(data: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.callback_data() == data)
    }

    pub fn callback_data(self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Positions => "positions",
            Action::LimitOrders => "limit_orders",
            Action::DcaOrders => "dca_orders",
            Action::CopyTrade => "copy_trade",
            Action::Sniper => "sniper",
            Action::Trenches => "trenches",
            Action::Rewards => "rewards",
            Action::Watchlist => "watchlist",
            Action::Withdraw => "withdraw",
            Action::Settings => "settings",
            Action::Help => "help",
            Action::Refresh => "refresh",
            Action::BackToMain => "back_to_main",
            Action::SetRewardsWallet => "set_rewards_wallet",
        }
    }

    fn button(self, text: &str) -> InlineButton {
        InlineButton::new(text, self.callback_data())
    }
}

fn back_keyboard() -> InlineKeyboard {
    InlineKeyboard {
        inline_keyboard: vec![vec![Action::BackToMain.button("← Back")]],
    }
}

fn main_keyboard() -> InlineKeyboard {
    InlineKeyboard {
        inline_keyboard: vec![
            vec![Action::Buy.button("Buy"), Action::Sell.button("Sell")],
            vec![
                Action::Positions.button("Positions"),
                Action::LimitOrders.button("Limit Orders"),
                Action::DcaOrders.button("DCA Orders"),
            ],
            vec![
                Action::CopyTrade.button("Copy Trade"),
                Action::Sniper.button("Sniper 🆕"),
            ],
            vec![
                Action::Trenches.button("Trenches"),
                Action::Rewards.button("💰 Rewards"),
                Action::Watchlist.button("⭐ Watchlist"),
            ],
            vec![
                Action::Withdraw.button("Withdraw"),
                Action::Settings.button("Settings"),
            ],
            vec![Action::Help.button("Help"), Action::Refresh.button("Refresh")],
        ],
    }
}

/// Inline code span for a stored value. Legacy Markdown has no escaping inside an entity, so a
/// value containing a backtick is rendered as escaped plain text instead.
fn code(value: &str) -> String {
    if !value.contains('`') {
        return format!("`{value}`");
    }
    let mut escaped = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

// =============================================================================
// SCREENS
// =============================================================================

pub fn main_menu(user: &UserRecord) -> Screen {
    let text = format!(
        "Solana • 🅴 {address} (Tap to Copy)\n\
         Balance: {balance} SOL ($0.00)\n\
         \n\
         Click on the Refresh button to update your current balance.\n\
         \n\
         ⚠️We have no control over ads shown by Telegram in this bot. \
         Do not be scammed by fake airdrops or login pages.",
        address = code(&user.deposit_address),
        balance = user.sol_balance,
    );
    Screen::markdown(text, Some(main_keyboard()))
}

pub fn rewards(user: &UserRecord, referral_link: &str, now: DateTime<Utc>) -> Screen {
    let text = format!(
        "Cashback and Referral Rewards are paid out *every 12 hours* and airdropped directly \
         to your Rewards Wallet. To be eligible, you must have at least 0.005 SOL in unpaid rewards.\n\
         \n\
         Referral Rewards\n\
         • Users referred: {total_referred}\n\
         • Direct: {direct}, Indirect: {indirect}\n\
         • Earned rewards: {referral:.3} SOL ($0.00)\n\
         \n\
         Cashback Rewards\n\
         • Earned rewards: {cashback:.3} SOL ($0.00)\n\
         \n\
         Total Rewards\n\
         • Total paid: {paid:.3} SOL ($0.00)\n\
         • Total unpaid: {unpaid:.3} SOL ($0.00)\n\
         \n\
         *Rewards Wallet*\n\
         {wallet}\n\
         \n\
         *Your Referral Link*\n\
         {link}\n\
         Your friends save 10% with your link.\n\
         \n\
         Last updated at {stamp} UTC",
        total_referred = user.total_referred(),
        direct = user.direct_referrals,
        indirect = user.indirect_referrals,
        referral = user.referral_rewards,
        cashback = user.cashback_rewards,
        paid = user.total_paid_rewards,
        unpaid = user.total_unpaid(),
        wallet = code(&user.rewards_wallet),
        link = code(referral_link),
        stamp = now.format("%Y-%m-%d %H:%M"),
    );
    let keyboard = InlineKeyboard {
        inline_keyboard: vec![
            vec![Action::SetRewardsWallet.button("Change Rewards Wallet")],
            vec![Action::BackToMain.button("← Back")],
        ],
    };
    Screen::markdown(text, Some(keyboard))
}

pub fn wallet_prompt(user: &UserRecord) -> Screen {
    let text = format!(
        "Current rewards wallet:\n{}\n\nReply with the new rewards wallet address \
         ({MIN_WALLET_LEN}-{MAX_WALLET_LEN} characters).",
        code(&user.rewards_wallet)
    );
    Screen::markdown(text, Some(back_keyboard()))
}

pub fn wallet_accepted(user: &UserRecord) -> Screen {
    let text = format!("✅ Rewards wallet updated:\n{}", code(&user.rewards_wallet));
    Screen::markdown(text, Some(main_keyboard()))
}

pub fn wallet_rejected(rejection: &WalletRejection) -> Screen {
    Screen::plain(
        format!("❌ {rejection}. Open Rewards and tap \"Change Rewards Wallet\" to try again."),
        Some(back_keyboard()),
    )
}

pub fn deposit_required(user: &UserRecord) -> Screen {
    let text = format!(
        "You need to deposit at least 1 SOL on your wallet for this function to work\n\
         {} (tap to copy)",
        code(&user.deposit_address)
    );
    Screen::markdown(text, Some(back_keyboard()))
}

pub fn no_tokens() -> Screen {
    Screen::markdown(
        "*You do not have any tokens yet! Start trading in the Buy menu.*".into(),
        Some(back_keyboard()),
    )
}

pub fn no_limit_orders() -> Screen {
    Screen::markdown(
        "*You have no active limit orders. Create a limit order from the Buy/Sell menu.*".into(),
        Some(back_keyboard()),
    )
}

pub fn no_dca_orders() -> Screen {
    Screen::markdown(
        "*You have no active DCA orders. Create a DCA order from the Buy/Sell menu.*".into(),
        Some(back_keyboard()),
    )
}

pub fn coming_soon() -> Screen {
    Screen::plain("This feature is coming soon!", Some(back_keyboard()))
}

pub fn unknown_action() -> Screen {
    Screen::plain("Unknown action.", Some(back_keyboard()))
}

pub fn unrecognized_input() -> Screen {
    Screen::plain(
        "Sorry, I didn't understand that. Use /start to open the menu.",
        None,
    )
}

pub fn user_not_found() -> Screen {
    Screen::plain("User not found. Please restart the bot with /start", None)
}
