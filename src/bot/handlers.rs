use alloy::primitives::{Address, TxHash, U256};
use chrono::Utc;
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::bot::commands::{Command, ParseError, COMMANDS_TEXT};
use crate::bot::session::{RevealAnswer, Sessions};
use crate::chain::ChainGateway;
use crate::config::Config;
use crate::db::{ActivityLog, Database, WalletStore};
use crate::error::{Error, Result};
use crate::leaderboard::{ActionKind, Leaderboard};
use crate::models::{
    Asset, SubmissionResult, SubmissionStatus, SubmitOptions, TokenRegistry, TransactionIntent,
};
use crate::pipeline::{BatchDistributor, PipelineSettings, TransactionBuilder};
use crate::pricing::{Denomination, FeeRateResolver, PriceFeed, PriceOracle};
use crate::utils::{explorer_tx_url, format_amount, from_base_units};

const WELCOME_TEXT: &str = "Welcome aboard! I keep an AVAX wallet for you and let you buy, sell, \
tip and rain tokens right from the chat.\n\
Send /getwallet to me in a private chat to get started, or /commands to see everything I can do.";

/// Someone taking part in a chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub user_id: String,
    pub username: Option<String>,
    pub is_bot: bool,
}

impl Participant {
    pub fn new(user_id: impl Into<String>, username: Option<&str>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.map(str::to_string),
            is_bot: false,
        }
    }

    fn display_name(&self) -> String {
        match &self.username {
            Some(name) => format!("@{}", name),
            None => format!("User {}", self.user_id),
        }
    }

    fn leaderboard_name(&self) -> String {
        self.username
            .clone()
            .unwrap_or_else(|| format!("User {}", self.user_id))
    }
}

/// Transport-independent view of an incoming message
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub chat_id: String,
    pub sender: Participant,
    pub is_private: bool,
    /// Author of the message being replied to
    pub reply_to: Option<Participant>,
}

/// Settings the handlers read on every command
#[derive(Debug, Clone)]
struct BotSettings {
    router: Address,
    explorer_url: String,
    slippage: Decimal,
    deadline_offset_secs: u64,
    receipt_timeout: Duration,
    activity_retention: chrono::Duration,
    max_rain_hours: u32,
}

/// Command handling glue between chat transports and the wallet pipeline
pub struct BotService {
    wallets: WalletStore,
    activity: ActivityLog,
    leaderboard: Leaderboard,
    gateway: Arc<dyn ChainGateway>,
    oracle: PriceOracle,
    builder: TransactionBuilder,
    distributor: BatchDistributor,
    registry: TokenRegistry,
    sessions: Sessions,
    settings: BotSettings,
}

impl BotService {
    pub fn new(
        config: &Config,
        db: &Database,
        gateway: Arc<dyn ChainGateway>,
        feed: Arc<dyn PriceFeed>,
        fees: Arc<dyn FeeRateResolver>,
        registry: TokenRegistry,
    ) -> Self {
        let native = registry.native().clone();
        let pipeline = PipelineSettings::from_config(config);

        Self {
            wallets: db.wallets(),
            activity: db.activity(),
            leaderboard: Leaderboard::new(&config.leaderboard_path),
            oracle: PriceOracle::new(
                gateway.clone(),
                feed,
                config.router_address,
                native.clone(),
                Duration::from_secs(config.price_cache_ttl_seconds),
            ),
            builder: TransactionBuilder::new(gateway.clone(), fees, native.clone(), pipeline.clone()),
            distributor: BatchDistributor::new(gateway.clone(), native, pipeline),
            gateway,
            registry,
            sessions: Sessions::new(),
            settings: BotSettings {
                router: config.router_address,
                explorer_url: config.explorer_url.clone(),
                slippage: config.slippage_tolerance,
                deadline_offset_secs: config.deadline_offset_seconds,
                receipt_timeout: Duration::from_secs(config.receipt_timeout_seconds),
                activity_retention: chrono::Duration::hours(config.activity_retention_hours),
                max_rain_hours: config.max_rain_hours,
            },
        }
    }

    pub fn wallets(&self) -> &WalletStore {
        &self.wallets
    }

    /// Rows younger than this are never pruned, so a rain can always see its full window
    fn prune_horizon(&self, hours: u32) -> chrono::Duration {
        self.settings
            .activity_retention
            .max(chrono::Duration::hours(i64::from(hours)))
    }

    /// Drop activity rows past the retention window
    pub async fn prune_activity(&self) -> Result<u64> {
        self.activity
            .prune_older_than(self.prune_horizon(self.settings.max_rain_hours), Utc::now())
            .await
    }

    /// Handle one incoming message. Returns the reply to send, if any.
    pub async fn handle_message(&self, ctx: &MessageContext, text: &str) -> Option<String> {
        let sender = &ctx.sender;
        if let Err(e) = self
            .activity
            .record_activity(
                &ctx.chat_id,
                &sender.user_id,
                sender.username.as_deref(),
                sender.is_bot,
                Utc::now(),
            )
            .await
        {
            warn!("Could not record activity for {}: {}", sender.user_id, e);
        }

        let command = match Command::parse(text) {
            Ok(command) => command,
            Err(ParseError::NotACommand) => return self.answer_session(ctx, text).await,
            Err(e) => {
                info!("Rejected command from {}: {}", sender.user_id, e);
                return Some(e.to_string());
            }
        };

        // Any command ends a pending key reveal
        let was_awaiting = self.sessions.cancel(&sender.user_id);
        if command == Command::Cancel {
            return Some(if was_awaiting {
                "Operation canceled. Stay safe!".to_string()
            } else {
                "Operation canceled.".to_string()
            });
        }

        let name = text.split_whitespace().next().unwrap_or_default().to_string();
        match self.dispatch(ctx, command).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                log_failure(&name, &sender.user_id, &e);
                Some(e.user_message())
            }
        }
    }

    async fn answer_session(&self, ctx: &MessageContext, text: &str) -> Option<String> {
        if !ctx.is_private {
            return None;
        }
        let user_id = &ctx.sender.user_id;
        match self.sessions.answer(user_id, text)? {
            RevealAnswer::Reveal => match self.wallets.get(user_id).await {
                Ok(Some(wallet)) => {
                    info!("Revealing private key to user {}", user_id);
                    Some(format!(
                        "Your private key is: {}\nKeep it safe and do not share it with anyone!",
                        wallet.private_key()
                    ))
                }
                Ok(None) => Some(Error::WalletNotFound(user_id.clone()).user_message()),
                Err(e) => {
                    error!("Wallet lookup failed for {}: {}", user_id, e);
                    Some(e.user_message())
                }
            },
            RevealAnswer::Decline => Some("Operation canceled. Stay safe!".to_string()),
            RevealAnswer::Invalid => Some("Invalid response. Please type 'yes' or 'no'.".to_string()),
        }
    }

    async fn dispatch(&self, ctx: &MessageContext, command: Command) -> Result<String> {
        match command {
            Command::Start => Ok(WELCOME_TEXT.to_string()),
            Command::Commands => Ok(COMMANDS_TEXT.to_string()),
            Command::GetWallet => self.get_wallet(ctx).await,
            Command::Cancel => Ok("Operation canceled.".to_string()),
            Command::Balance => self.balance(ctx).await,
            Command::Buy { amount, token } => self.buy(ctx, amount, &token).await,
            Command::Sell { amount, token } => self.sell(ctx, amount, &token).await,
            Command::Tip { amount, token } => self.tip(ctx, amount, &token).await,
            Command::Convert { amount, from, to } => self.convert(amount, &from, &to).await,
            Command::Rain { amount, token, hours } => self.rain(ctx, amount, &token, hours).await,
            Command::Top10 { token } => self.leaderboard.render(&token).await,
        }
    }

    async fn get_wallet(&self, ctx: &MessageContext) -> Result<String> {
        if !ctx.is_private {
            return Ok("Ahoj matey, don't use this command aboard for all eyes to see!\n\
                       Please send this command in a private chat with me to see your wallet details."
                .to_string());
        }

        let user_id = &ctx.sender.user_id;
        let (wallet, created) = self.wallets.get_or_create(user_id).await?;
        if created {
            info!("New wallet {} created for user {}", wallet.address, user_id);
            return Ok(format!(
                "New wallet created!\nYour wallet address: {}\nKeep your private key safe!",
                wallet.checksum_address()
            ));
        }

        debug!("User {} already has a wallet, offering key reveal", user_id);
        self.sessions.begin(user_id);
        Ok(format!(
            "You already have a wallet, my friend.\n\
             Your wallet address: {}\n\
             Would you like to view your private key? Type 'yes' or 'no'.",
            wallet.checksum_address()
        ))
    }

    async fn balance(&self, ctx: &MessageContext) -> Result<String> {
        if !ctx.is_private {
            return Ok("C'mon, man, don't give away your secrets. Talk to me in dm!".to_string());
        }
        let wallet = self.wallets.require(&ctx.sender.user_id).await?;

        let native = self.registry.native_asset();
        let native_units = self.gateway.native_balance(wallet.address).await?;
        let mut lines = vec![self.balance_line(&native, from_base_units(native_units, native.decimals())).await];

        for token in self.registry.tokens() {
            let units = self.gateway.token_balance(token.contract, wallet.address).await?;
            let asset = Asset::Erc20(token.clone());
            lines.push(self.balance_line(&asset, from_base_units(units, token.decimals)).await);
        }
        Ok(lines.join("\n"))
    }

    async fn balance_line(&self, asset: &Asset, amount: Decimal) -> String {
        let usd = match self.oracle.usd_value(asset, amount).await {
            Some(value) => format!("${}", format_amount(value, 2)),
            None => "USD unavailable".to_string(),
        };
        format!("${}: {} | {}", asset.display_symbol(), format_amount(amount, 4), usd)
    }

    async fn buy(&self, ctx: &MessageContext, amount: Decimal, token: &str) -> Result<String> {
        let token = self.registry.resolve_token(token)?;
        let wallet = self.wallets.require(&ctx.sender.user_id).await?;

        let price = self.oracle.price_in_native(&token).await?;
        let native_amount = amount
            .checked_mul(price)
            .ok_or_else(|| Error::UserInput("That amount is too large.".to_string()))?;
        debug!("Buying {} {} costs {} native", amount, token.symbol, native_amount);

        let native = self.registry.native_asset();
        let intent = TransactionIntent::swap_native_for_token(
            wallet,
            &native,
            Asset::Erc20(token.clone()),
            self.settings.router,
            native_amount,
        )?
        .with_slippage(self.settings.slippage)?
        .with_deadline_offset(self.settings.deadline_offset_secs);

        let result = self
            .builder
            .build_and_submit(&intent, SubmitOptions::fire_and_forget())
            .await?;

        self.leaderboard
            .record_action_logged(
                &ctx.sender.user_id,
                &ctx.sender.leaderboard_name(),
                amount,
                ActionKind::Buy,
                &token.symbol,
            )
            .await;

        Ok(format!(
            "Transaction sent! You purchased {} {} for {} {}.\nFee: {} {}\n{}",
            amount,
            token.display_symbol(),
            format_amount(native_amount, 6),
            native.display_symbol(),
            format_amount(from_base_units(result.fee(), native.decimals()), 6),
            native.display_symbol(),
            self.tx_link(&result),
        ))
    }

    async fn sell(&self, ctx: &MessageContext, amount: Decimal, token: &str) -> Result<String> {
        if !ctx.is_private {
            return Ok("Let's do this in a private chat.".to_string());
        }
        let token = self.registry.resolve_token(token)?;
        let wallet = self.wallets.require(&ctx.sender.user_id).await?;

        let native = self.registry.native_asset();
        let intent = TransactionIntent::swap_token_for_native(
            wallet,
            Asset::Erc20(token),
            &native,
            self.settings.router,
            amount,
        )?
        .with_slippage(self.settings.slippage)?
        .with_deadline_offset(self.settings.deadline_offset_secs);

        let result = self
            .builder
            .build_and_submit(&intent, SubmitOptions::wait(self.settings.receipt_timeout))
            .await?;

        let link = self.tx_link(&result);
        Ok(match result.status() {
            SubmissionStatus::Confirmed => format!("Your sale was successful! View transaction: {}", link),
            SubmissionStatus::Reverted => {
                format!("The sale transaction failed. Please try again.\n{}", link)
            }
            SubmissionStatus::Pending | SubmissionStatus::TimedOut | SubmissionStatus::Unknown => format!(
                "Your sale was sent but is not confirmed yet. \
                 Check the explorer before trying again: {}",
                link
            ),
            SubmissionStatus::Failed(reason) => {
                warn!("Sale for {} failed: {}", ctx.sender.user_id, reason);
                "The sale transaction failed. Please try again.".to_string()
            }
        })
    }

    async fn tip(&self, ctx: &MessageContext, amount: Decimal, token: &str) -> Result<String> {
        let wallet = self.wallets.require(&ctx.sender.user_id).await?;
        let Some(recipient) = &ctx.reply_to else {
            return Ok("You need to reply to the user you want to tip.".to_string());
        };
        if recipient.user_id == ctx.sender.user_id {
            return Ok("You can't tip yourself, matey.".to_string());
        }
        let Some(recipient_wallet) = self.wallets.get(&recipient.user_id).await? else {
            return Ok("The recipient doesn't have a wallet yet. Ask them to use /getwallet.".to_string());
        };

        let asset = self.registry.resolve(token)?;
        let symbol = asset.symbol().to_string();
        let display = asset.display_symbol();
        let intent = TransactionIntent::transfer(wallet, asset, recipient_wallet.address, amount)?;
        let result = self
            .builder
            .build_and_submit(&intent, SubmitOptions::fire_and_forget())
            .await?;

        self.leaderboard
            .record_action_logged(
                &ctx.sender.user_id,
                &ctx.sender.leaderboard_name(),
                amount,
                ActionKind::Tip,
                &symbol,
            )
            .await;

        Ok(format!(
            "Tip sent successfully! {} {} to {}.\n{}",
            amount,
            display,
            recipient.display_name(),
            self.tx_link(&result)
        ))
    }

    fn denomination(&self, symbol: &str) -> Result<Denomination> {
        if symbol.eq_ignore_ascii_case("usd") {
            return Ok(Denomination::Usd);
        }
        Ok(Denomination::Asset(self.registry.resolve(symbol)?))
    }

    async fn convert(&self, amount: Decimal, from: &str, to: &str) -> Result<String> {
        let from = self.denomination(from)?;
        let to = self.denomination(to)?;

        match self.oracle.convert(amount, &from, &to).await? {
            Some(converted) => Ok(format!(
                "Conversion result: {} is approximately {}.",
                denominated(&amount.to_string(), &from),
                denominated(&format_amount(converted, 4), &to),
            )),
            None => Ok("Failed to fetch the USD price. Please try again later.".to_string()),
        }
    }

    async fn rain(&self, ctx: &MessageContext, amount: Decimal, token: &str, hours: u32) -> Result<String> {
        if hours == 0 || hours > self.settings.max_rain_hours {
            return Ok(format!(
                "Please specify a valid number of hours between 1 and {}.",
                self.settings.max_rain_hours
            ));
        }
        let asset = self.registry.resolve(token)?;
        let sender = self.wallets.require(&ctx.sender.user_id).await?;

        let now = Utc::now();
        if let Err(e) = self
            .activity
            .prune_older_than(self.prune_horizon(hours), now)
            .await
        {
            warn!("Could not prune activity before rain: {}", e);
        }
        let active = self
            .activity
            .query_active(&ctx.chat_id, chrono::Duration::hours(i64::from(hours)), now)
            .await?;

        let mut usernames = HashMap::new();
        let mut recipients = Vec::new();
        for user in active {
            if user.user_id == ctx.sender.user_id {
                continue;
            }
            let Some(username) = user.username.filter(|name| !name.is_empty()) else {
                continue;
            };
            if let Some(wallet) = self.wallets.get(&user.user_id).await? {
                usernames.insert(user.user_id.clone(), username);
                recipients.push(wallet);
            }
        }
        if recipients.is_empty() {
            return Ok("No users with wallets were active to receive tokens. :(".to_string());
        }

        info!(
            "User {} raining {} {} on {} users in chat {}",
            ctx.sender.user_id,
            amount,
            asset.display_symbol(),
            recipients.len(),
            ctx.chat_id
        );
        let report = self
            .distributor
            .distribute(&sender, &asset, amount, &recipients)
            .await?;
        let unconfirmed: Vec<TxHash> = report
            .unconfirmed()
            .filter_map(|o| o.result.tx_hash())
            .collect();
        if report.success_count() == 0 && unconfirmed.is_empty() {
            return Ok("No tokens were sent, every transfer failed. Please try again later.".to_string());
        }

        let distributed = from_base_units(
            report.amount_per_recipient * U256::from(report.success_count()),
            asset.decimals(),
        );
        self.leaderboard
            .record_action_logged(
                &ctx.sender.user_id,
                &ctx.sender.leaderboard_name(),
                distributed,
                ActionKind::Tip,
                asset.symbol(),
            )
            .await;

        let names: Vec<String> = report
            .successful()
            .enumerate()
            .map(|(i, outcome)| {
                let name = usernames
                    .get(&outcome.recipient.user_id)
                    .map(String::as_str)
                    .unwrap_or("unknown");
                format!("{}. @{}", i + 1, name)
            })
            .collect();

        let mut message = format!(
            "The following users split the {} {} who were active in the last {} hours in this chat:\n{}",
            distributed,
            asset.display_symbol(),
            hours,
            names.join("\n")
        );
        let failed = report.failure_count();
        if failed > 0 {
            message.push_str(&format!("\n\nCould not send to {} users.", failed));
        }
        if !unconfirmed.is_empty() {
            message.push_str(&format!(
                "\n\n{} transfers may have been broadcast but the network did not answer. \
                 Check the explorer before trying again:",
                unconfirmed.len()
            ));
            for hash in &unconfirmed {
                message.push_str(&format!("\n{}", explorer_tx_url(&self.settings.explorer_url, hash)));
            }
        }
        if let Some(hash) = report.first_tx_hash() {
            message.push_str(&format!("\n\n{}", explorer_tx_url(&self.settings.explorer_url, &hash)));
        }
        Ok(message)
    }

    fn tx_link(&self, result: &SubmissionResult) -> String {
        match result.tx_hash() {
            Some(hash) => explorer_tx_url(&self.settings.explorer_url, &hash),
            None => "(not broadcast)".to_string(),
        }
    }
}

fn denominated(amount: &str, denomination: &Denomination) -> String {
    match denomination {
        Denomination::Usd => format!("${} USD", amount),
        Denomination::Asset(asset) => format!("{} {}", amount, asset.display_symbol()),
    }
}

fn log_failure(command: &str, user_id: &str, err: &Error) {
    match err {
        Error::UserInput(_)
        | Error::UnknownToken(_)
        | Error::WalletNotFound(_)
        | Error::WalletExists(_)
        | Error::InsufficientFunds { .. } => info!("{} from {} rejected: {}", command, user_id, err),
        _ => error!("{} from {} failed: {}", command, user_id, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockGateway;
    use crate::db::init_test_db;
    use crate::models::TokenInfo;
    use crate::pricing::{FlatFeeRate, StaticFeed};
    use std::str::FromStr;

    const ROUTER: Address = Address::repeat_byte(0x99);
    const ONE_AVAX: u128 = 1_000_000_000_000_000_000;

    fn native() -> TokenInfo {
        TokenInfo::new("avax", Address::repeat_byte(0xaa), 18).with_price_feed_id("avalanche-2")
    }

    fn token() -> TokenInfo {
        TokenInfo::new("rpepe", Address::repeat_byte(0xbb), 6)
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn private(user_id: &str, username: &str) -> MessageContext {
        MessageContext {
            chat_id: user_id.to_string(),
            sender: Participant::new(user_id, Some(username)),
            is_private: true,
            reply_to: None,
        }
    }

    fn group(user_id: &str, username: Option<&str>) -> MessageContext {
        MessageContext {
            chat_id: "group-1".to_string(),
            sender: Participant::new(user_id, username),
            is_private: false,
            reply_to: None,
        }
    }

    async fn service(mock: &Arc<MockGateway>, feed: StaticFeed, name: &str) -> BotService {
        service_with(mock, feed, name, |_| {}).await
    }

    async fn service_with(
        mock: &Arc<MockGateway>,
        feed: StaticFeed,
        name: &str,
        tweak: impl FnOnce(&mut Config),
    ) -> BotService {
        let path = std::env::temp_dir().join(format!(
            "tipbot-handlers-{}-{}.json",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let db = init_test_db().await.unwrap();
        let mut config = Config {
            router_address: ROUTER,
            leaderboard_path: path.to_string_lossy().to_string(),
            receipt_timeout_seconds: 1,
            ..Config::default()
        };
        tweak(&mut config);
        let registry = TokenRegistry::new(native()).with_token(token());
        BotService::new(
            &config,
            &db,
            mock.clone(),
            Arc::new(feed),
            Arc::new(FlatFeeRate(Decimal::ZERO)),
            registry,
        )
    }

    /// 1 RPEPE = 0.002 AVAX both ways
    fn with_pair(mock: &Arc<MockGateway>) {
        mock.configure(|s| {
            s.rates.insert(
                (token().contract, native().contract),
                (U256::from(2_000_000_000u64), U256::from(1u8)),
            );
            s.rates.insert(
                (native().contract, token().contract),
                (U256::from(1u8), U256::from(2_000_000_000u64)),
            );
        });
    }

    async fn reply(service: &BotService, ctx: &MessageContext, text: &str) -> String {
        service.handle_message(ctx, text).await.unwrap_or_default()
    }

    #[tokio::test]
    async fn test_getwallet_refuses_group_chats() {
        let mock = Arc::new(MockGateway::new());
        let service = service(&mock, StaticFeed::down(), "getwallet-group").await;

        let text = reply(&service, &group("1", Some("alice")), "/getwallet").await;
        assert!(text.starts_with("Ahoj matey"));
        assert_eq!(service.wallets().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_getwallet_then_reveal_conversation() {
        let mock = Arc::new(MockGateway::new());
        let service = service(&mock, StaticFeed::down(), "getwallet-reveal").await;
        let ctx = private("1", "alice");

        let created = reply(&service, &ctx, "/getwallet").await;
        assert!(created.starts_with("New wallet created!"));

        let prompt = reply(&service, &ctx, "/getwallet").await;
        assert!(prompt.contains("Type 'yes' or 'no'"));

        let invalid = reply(&service, &ctx, "maybe").await;
        assert_eq!(invalid, "Invalid response. Please type 'yes' or 'no'.");

        let revealed = reply(&service, &ctx, "Yes").await;
        let wallet = service.wallets().require("1").await.unwrap();
        assert!(revealed.contains(wallet.private_key()));

        // Conversation is over, plain text gets no reply
        assert_eq!(service.handle_message(&ctx, "yes").await, None);
    }

    #[tokio::test]
    async fn test_cancel_ends_reveal_session() {
        let mock = Arc::new(MockGateway::new());
        let service = service(&mock, StaticFeed::down(), "cancel").await;
        let ctx = private("1", "alice");

        reply(&service, &ctx, "/getwallet").await;
        reply(&service, &ctx, "/getwallet").await;
        assert_eq!(reply(&service, &ctx, "/cancel").await, "Operation canceled. Stay safe!");
        assert_eq!(service.handle_message(&ctx, "yes").await, None);
        assert_eq!(reply(&service, &ctx, "/cancel").await, "Operation canceled.");
    }

    #[tokio::test]
    async fn test_commands_without_wallet() {
        let mock = Arc::new(MockGateway::new());
        let service = service(&mock, StaticFeed::down(), "no-wallet").await;

        let text = reply(&service, &private("7", "bob"), "/buy 10 rpepe").await;
        assert_eq!(text, "You don't have a wallet yet. Use /getwallet to create one.");
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn test_balance_shows_unavailable_usd_when_feed_is_down() {
        let mock = Arc::new(MockGateway::new());
        with_pair(&mock);
        let service = service(&mock, StaticFeed::down(), "balance").await;
        let ctx = private("1", "alice");
        reply(&service, &ctx, "/getwallet").await;
        let wallet = service.wallets().require("1").await.unwrap();
        mock.configure(|s| {
            s.native_balances.insert(wallet.address, U256::from(3 * ONE_AVAX / 2));
        });

        let text = reply(&service, &ctx, "/balance").await;
        assert!(text.contains("$AVAX: 1.5000 | USD unavailable"));
        assert!(text.contains("$RPEPE: 0.0000"));
    }

    #[tokio::test]
    async fn test_balance_with_usd_price() {
        let mock = Arc::new(MockGateway::new());
        with_pair(&mock);
        let feed = StaticFeed::new(&[("avalanche-2", dec("20"))]);
        let service = service(&mock, feed, "balance-usd").await;
        let ctx = private("1", "alice");
        reply(&service, &ctx, "/getwallet").await;
        let wallet = service.wallets().require("1").await.unwrap();
        mock.configure(|s| {
            s.native_balances.insert(wallet.address, U256::from(2 * ONE_AVAX));
        });

        let text = reply(&service, &ctx, "/balance").await;
        assert!(text.contains("$AVAX: 2.0000 | $40.00"));
    }

    #[tokio::test]
    async fn test_buy_converts_token_amount_to_native_and_records_leaderboard() {
        let mock = Arc::new(MockGateway::new());
        with_pair(&mock);
        let service = service(&mock, StaticFeed::down(), "buy").await;
        let ctx = private("1", "alice");
        reply(&service, &ctx, "/getwallet").await;
        let wallet = service.wallets().require("1").await.unwrap();
        mock.configure(|s| {
            s.native_balances.insert(wallet.address, U256::from(10 * ONE_AVAX));
        });

        let text = reply(&service, &ctx, "/buy 1000 rpepe").await;
        assert!(text.starts_with("Transaction sent!"), "{}", text);

        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, ROUTER);
        assert_eq!(sent[0].value, U256::from(2 * ONE_AVAX));

        let board = reply(&service, &ctx, "/top10 rpepe").await;
        assert!(board.contains("alice: 1 buys"), "{}", board);
    }

    #[tokio::test]
    async fn test_sell_is_private_only() {
        let mock = Arc::new(MockGateway::new());
        let service = service(&mock, StaticFeed::down(), "sell-group").await;
        let text = reply(&service, &group("1", Some("alice")), "/sell 5 rpepe").await;
        assert_eq!(text, "Let's do this in a private chat.");
    }

    #[tokio::test]
    async fn test_tip_requires_reply_and_recipient_wallet() {
        let mock = Arc::new(MockGateway::new());
        let service = service(&mock, StaticFeed::down(), "tip-checks").await;
        reply(&service, &private("1", "alice"), "/getwallet").await;

        let mut ctx = group("1", Some("alice"));
        let text = reply(&service, &ctx, "/tip 1 avax").await;
        assert_eq!(text, "You need to reply to the user you want to tip.");

        ctx.reply_to = Some(Participant::new("2", Some("bob")));
        let text = reply(&service, &ctx, "/tip 1 avax").await;
        assert_eq!(text, "The recipient doesn't have a wallet yet. Ask them to use /getwallet.");
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn test_tip_sends_native_to_recipient() {
        let mock = Arc::new(MockGateway::new());
        let service = service(&mock, StaticFeed::down(), "tip-native").await;
        reply(&service, &private("1", "alice"), "/getwallet").await;
        reply(&service, &private("2", "bob"), "/getwallet").await;
        let alice = service.wallets().require("1").await.unwrap();
        let bob = service.wallets().require("2").await.unwrap();
        mock.configure(|s| {
            s.native_balances.insert(alice.address, U256::from(5 * ONE_AVAX));
        });

        let mut ctx = group("1", Some("alice"));
        ctx.reply_to = Some(Participant::new("2", Some("bob")));
        let text = reply(&service, &ctx, "/tip 1 avax").await;
        assert!(text.starts_with("Tip sent successfully!"), "{}", text);
        assert!(text.contains("@bob"));

        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, bob.address);
        assert_eq!(sent[0].value, U256::from(ONE_AVAX));
    }

    #[tokio::test]
    async fn test_convert_with_and_without_fiat_feed() {
        let mock = Arc::new(MockGateway::new());
        with_pair(&mock);
        let down = service(&mock, StaticFeed::down(), "convert-down").await;
        let text = reply(&down, &private("1", "alice"), "/convert 2 avax usd").await;
        assert_eq!(text, "Failed to fetch the USD price. Please try again later.");

        let feed = StaticFeed::new(&[("avalanche-2", dec("25"))]);
        let up = service(&mock, feed, "convert-up").await;
        let text = reply(&up, &private("1", "alice"), "/convert 1000 rpepe usd").await;
        assert_eq!(text, "Conversion result: 1000 RPEPE is approximately $50.0000 USD.");

        let text = reply(&up, &private("1", "alice"), "/convert 1 doge usd").await;
        assert_eq!(text, "Unsupported or unknown token: doge");
    }

    #[tokio::test]
    async fn test_rain_picks_active_users_with_wallets() {
        let mock = Arc::new(MockGateway::new());
        let service = service(&mock, StaticFeed::down(), "rain").await;
        for (id, name) in [("1", "alice"), ("2", "bob"), ("3", "carol"), ("5", "nameless")] {
            reply(&service, &private(id, name), "/getwallet").await;
        }
        let alice = service.wallets().require("1").await.unwrap();
        mock.configure(|s| {
            s.native_balances.insert(alice.address, U256::from(10 * ONE_AVAX));
        });

        // bob and carol chat, dave has no wallet, a bot and a user without a username
        service.handle_message(&group("2", Some("bob")), "gm").await;
        service.handle_message(&group("3", Some("carol")), "gm").await;
        service.handle_message(&group("4", Some("dave")), "gm").await;
        service.handle_message(&group("5", None), "gm").await;
        let mut bot = group("6", Some("helper_bot"));
        bot.sender.is_bot = true;
        service.handle_message(&bot, "beep").await;

        let text = reply(&service, &group("1", Some("alice")), "/rain 2 avax 1").await;
        assert!(text.contains("split the 2 AVAX"), "{}", text);
        assert!(text.contains("@bob"));
        assert!(text.contains("@carol"));
        assert!(!text.contains("dave"));

        let sent = mock.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|tx| tx.value == U256::from(ONE_AVAX)));
    }

    #[tokio::test]
    async fn test_rain_window_longer_than_retention_keeps_older_chatters() {
        let mock = Arc::new(MockGateway::new());
        let service = service_with(&mock, StaticFeed::down(), "rain-retention", |c| {
            c.activity_retention_hours = 1;
        })
        .await;
        reply(&service, &private("1", "alice"), "/getwallet").await;
        reply(&service, &private("2", "bob"), "/getwallet").await;
        let alice = service.wallets().require("1").await.unwrap();
        mock.configure(|s| {
            s.native_balances.insert(alice.address, U256::from(10 * ONE_AVAX));
        });
        service
            .activity
            .record_activity("group-1", "2", Some("bob"), false, Utc::now() - chrono::Duration::hours(2))
            .await
            .unwrap();

        let text = reply(&service, &group("1", Some("alice")), "/rain 2 avax 3").await;
        assert!(text.contains("@bob"), "{}", text);
        assert_eq!(mock.sent().len(), 1);

        // Hourly pruning also keeps the longest rain window
        service.prune_activity().await.unwrap();
        let active = service
            .activity
            .query_active("group-1", chrono::Duration::hours(3), Utc::now())
            .await
            .unwrap();
        assert!(active.iter().any(|u| u.user_id == "2"));
    }

    #[tokio::test]
    async fn test_rain_reports_unanswered_transfers_separately() {
        let mock = Arc::new(MockGateway::new());
        let service = service(&mock, StaticFeed::down(), "rain-unknown").await;
        for (id, name) in [("1", "alice"), ("2", "bob"), ("3", "carol")] {
            reply(&service, &private(id, name), "/getwallet").await;
        }
        let alice = service.wallets().require("1").await.unwrap();
        let bob = service.wallets().require("2").await.unwrap();
        mock.configure(|s| {
            s.native_balances.insert(alice.address, U256::from(10 * ONE_AVAX));
            s.lost_ack_for.insert(bob.address);
        });
        service.handle_message(&group("2", Some("bob")), "gm").await;
        service.handle_message(&group("3", Some("carol")), "gm").await;

        let text = reply(&service, &group("1", Some("alice")), "/rain 2 avax 1").await;
        assert!(text.contains("@carol"), "{}", text);
        assert!(!text.contains("@bob"));
        assert!(!text.contains("Could not send"));
        assert!(text.contains("1 transfers may have been broadcast"));
        let bob_tx = mock.sent().into_iter().find(|tx| tx.to == bob.address).unwrap();
        assert!(text.contains(&bob_tx.hash.to_string()));
        assert_eq!(mock.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_rain_with_nobody_around() {
        let mock = Arc::new(MockGateway::new());
        let service = service(&mock, StaticFeed::down(), "rain-empty").await;
        reply(&service, &private("1", "alice"), "/getwallet").await;

        let text = reply(&service, &group("1", Some("alice")), "/rain 2 avax 3").await;
        assert_eq!(text, "No users with wallets were active to receive tokens. :(");

        let text = reply(&service, &group("1", Some("alice")), "/rain 2 avax 48").await;
        assert_eq!(text, "Please specify a valid number of hours between 1 and 24.");
    }

    #[tokio::test]
    async fn test_plain_messages_get_no_reply() {
        let mock = Arc::new(MockGateway::new());
        let service = service(&mock, StaticFeed::down(), "plain").await;
        assert_eq!(service.handle_message(&group("1", Some("alice")), "hello").await, None);
        assert!(reply(&service, &group("1", None), "/start").await.starts_with("Welcome"));
    }
}
