use crate::commands::Command;
use crate::dialog::{ConversationState, DialogRegistry};
use crate::format;
use anyhow::{Context, Result};
use hypertrader_directory::{ConnectionStatus, UserDirectory};
use hypertrader_exchange_hyperliquid::{
    normalize_private_key, parse_private_key, wallet_address, HyperliquidClient,
};
use hypertrader_supervisor::{ExecError, WorkerSupervisor};
use hypertrader_user_config::{Credential, UserConfigStore};
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::requests::Request;
use teloxide::types::{Message, ParseMode, Update, UpdateKind};
use teloxide::utils::command::BotCommands;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Long-poll timeout handed to getUpdates.
const POLL_TIMEOUT_SECS: u32 = 10;
/// Back-off after a failed getUpdates call.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(2);
/// Worker subcommand backing /performance.
const PERFORMANCE_SUBCOMMAND: &str = "profit";
/// How many fresh registrations /admin_stats lists.
const ADMIN_LATEST_USERS: i64 = 5;

/// Routes one shared bot across many users. Each private chat id doubles as
/// the user id for configs, directory records, and worker processes.
#[derive(Clone)]
pub struct CommandRouter {
    bot: Bot,
    bot_name: String,
    directory: UserDirectory,
    configs: UserConfigStore,
    supervisor: WorkerSupervisor,
    exchange: HyperliquidClient,
    admin_ids: Vec<i64>,
    dialogs: DialogRegistry,
}

impl CommandRouter {
    /// Validates the token against the API and builds the router.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is rejected.
    pub async fn connect(
        token: &str,
        directory: UserDirectory,
        configs: UserConfigStore,
        supervisor: WorkerSupervisor,
        exchange: HyperliquidClient,
        admin_ids: Vec<i64>,
    ) -> Result<Self> {
        let bot = Bot::new(token);
        let me = bot.get_me().await.context("telegram token rejected")?;
        let bot_name = me.username().to_string();
        info!(bot = %bot_name, "telegram bot connected");

        Ok(Self {
            bot,
            bot_name,
            directory,
            configs,
            supervisor,
            exchange,
            admin_ids,
            dialogs: DialogRegistry::new(),
        })
    }

    /// Polls for updates until `shutdown` fires. Poll failures back off and
    /// retry; they never end the loop.
    pub async fn run(&self, shutdown: Arc<Notify>) {
        info!("command router polling for updates");
        let mut offset: i32 = 0;
        loop {
            let request = self
                .bot
                .get_updates()
                .offset(offset)
                .timeout(POLL_TIMEOUT_SECS);
            let result = tokio::select! {
                () = shutdown.notified() => break,
                result = request.send() => result,
            };
            match result {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.id + 1);
                        self.handle_update(update).await;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "getUpdates failed, retrying");
                    tokio::select! {
                        () = shutdown.notified() => break,
                        () = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                    }
                }
            }
        }
        info!("command router stopped");
    }

    async fn handle_update(&self, update: Update) {
        let UpdateKind::Message(message) = update.kind else {
            return;
        };
        let Some(text) = message.text().map(ToString::to_string) else {
            return;
        };
        let chat_id = message.chat.id;

        if let Ok(command) = Command::parse(&text, &self.bot_name) {
            // A command interrupts whatever dialog was pending.
            let had_dialog = self.dialogs.clear(chat_id.0).await;
            debug!(chat_id = chat_id.0, ?command, "dispatching command");
            if let Err(err) = self.handle_command(chat_id, command, had_dialog).await {
                warn!(chat_id = chat_id.0, error = %err, "command handler failed");
                let _ = self
                    .reply(chat_id, "Something went wrong, please try again.")
                    .await;
            }
        } else if self.dialogs.get(chat_id.0).await == Some(ConversationState::AwaitingPrivateKey) {
            self.capture_private_key(&message).await;
        } else if text.starts_with('/') {
            let _ = self.reply(chat_id, "Unknown command, see /help.").await;
        }
    }

    async fn handle_command(&self, chat_id: ChatId, command: Command, had_dialog: bool) -> Result<()> {
        let user_id = chat_id.0.to_string();
        match command {
            Command::Start => {
                self.reply(chat_id, &format::welcome_text()).await?;
            }
            Command::Help => {
                self.reply(chat_id, &format::help_text()).await?;
            }
            Command::Connect => {
                self.dialogs
                    .set(chat_id.0, ConversationState::AwaitingPrivateKey)
                    .await;
                self.reply(chat_id, &format::connect_prompt()).await?;
            }
            Command::Cancel => {
                let text = if had_dialog {
                    "Cancelled."
                } else {
                    "Nothing to cancel."
                };
                self.reply(chat_id, text).await?;
            }
            Command::Balance => {
                self.handle_balance(chat_id).await?;
            }
            Command::Status => {
                let record = self.directory.get_by_chat_id(chat_id.0).await;
                let worker = self.supervisor.status(&user_id).await;
                self.reply(chat_id, &format::status_text(record.as_ref(), worker.as_ref()))
                    .await?;
            }
            Command::Performance => {
                self.handle_performance(chat_id, &user_id).await?;
            }
            Command::StartTrading => {
                self.handle_start_trading(chat_id, &user_id).await?;
            }
            Command::StopTrading => {
                if self.supervisor.stop(&user_id).await {
                    self.directory
                        .update_status(chat_id.0, ConnectionStatus::Connected)
                        .await;
                    self.reply(chat_id, "🛑 Trading stopped.").await?;
                } else {
                    self.reply(chat_id, "No active worker to stop.").await?;
                }
            }
            Command::Restart => {
                if self.supervisor.restart(&user_id).await {
                    self.reply(chat_id, "🔄 Worker restarted.").await?;
                } else {
                    self.reply(chat_id, "No running worker to restart, use /start_trading.")
                        .await?;
                }
            }
            Command::AdminStats => {
                self.handle_admin_stats(chat_id).await?;
            }
        }
        Ok(())
    }

    async fn handle_balance(&self, chat_id: ChatId) -> Result<()> {
        let Some(record) = self.directory.get_by_chat_id(chat_id.0).await else {
            self.reply(chat_id, "No wallet linked yet, use /connect.")
                .await?;
            return Ok(());
        };
        if record.status == ConnectionStatus::Unconnected {
            self.reply(chat_id, "No wallet linked yet, use /connect.")
                .await?;
            return Ok(());
        }

        match self.exchange.verify_connection(&record.wallet_address).await {
            Ok(snapshot) => {
                self.directory
                    .update_balance(chat_id.0, snapshot.account_value, snapshot.free_collateral)
                    .await;
                self.reply(chat_id, &format::balance_text(&snapshot)).await?;
            }
            Err(err) => {
                warn!(chat_id = chat_id.0, error = %err, "balance lookup failed");
                self.reply(chat_id, "Could not reach the exchange, try again shortly.")
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_performance(&self, chat_id: ChatId, user_id: &str) -> Result<()> {
        match self
            .supervisor
            .execute(user_id, PERFORMANCE_SUBCOMMAND, &[])
            .await
        {
            None => {
                self.reply(chat_id, "No active worker, use /start_trading first.")
                    .await?;
            }
            Some(Ok(output)) => {
                self.reply(chat_id, &format::performance_text(&output)).await?;
            }
            Some(Err(ExecError::CommandTimeout { timeout_secs, .. })) => {
                self.reply(
                    chat_id,
                    &format!("The worker did not answer within {timeout_secs}s, try again."),
                )
                .await?;
            }
            Some(Err(err)) => {
                warn!(chat_id = chat_id.0, error = %err, "performance query failed");
                self.reply(chat_id, "Could not read performance data.").await?;
            }
        }
        Ok(())
    }

    async fn handle_start_trading(&self, chat_id: ChatId, user_id: &str) -> Result<()> {
        let record = self.directory.get_by_chat_id(chat_id.0).await;
        let connected = record
            .map(|r| r.status != ConnectionStatus::Unconnected)
            .unwrap_or(false);
        let config_path = self.configs.config_path(user_id);
        if !connected || !config_path.exists() {
            self.reply(chat_id, "Link a wallet with /connect first.").await?;
            return Ok(());
        }

        self.reply(chat_id, "Starting your trading worker...").await?;
        if self.supervisor.start(user_id, Some(&config_path), None).await {
            self.directory
                .update_status(chat_id.0, ConnectionStatus::Trading)
                .await;
            self.reply(chat_id, "🚀 Trading started. Use /status to check on it.")
                .await?;
        } else {
            self.reply(
                chat_id,
                "Could not start the worker. It may already be running, see /status.",
            )
            .await?;
        }
        Ok(())
    }

    async fn handle_admin_stats(&self, chat_id: ChatId) -> Result<()> {
        if !self.admin_ids.contains(&chat_id.0) {
            self.reply(chat_id, "Unknown command, see /help.").await?;
            return Ok(());
        }

        let total = self.directory.count_all().await;
        let by_status = self.directory.count_by_status().await;
        let running = self.supervisor.running_count().await;
        let latest = self.directory.latest(ADMIN_LATEST_USERS).await;
        self.reply(
            chat_id,
            &format::admin_stats_text(total, &by_status, running, &latest),
        )
        .await?;
        Ok(())
    }

    /// One dialog step: the message is the private key. The message is
    /// removed from the chat before the key is even parsed.
    async fn capture_private_key(&self, message: &Message) {
        let chat_id = message.chat.id;
        let text = message.text().unwrap_or_default().to_string();

        if let Err(err) = self.bot.delete_message(chat_id, message.id).send().await {
            warn!(chat_id = chat_id.0, error = %err, "could not delete credential message");
        }
        self.dialogs.clear(chat_id.0).await;

        let wallet = match parse_private_key(&text) {
            Ok(wallet) => wallet,
            Err(err) => {
                let _ = self
                    .reply(chat_id, &format!("{err}. Use /connect to try again."))
                    .await;
                return;
            }
        };
        let address = wallet_address(&wallet);
        let private_key = normalize_private_key(&text);

        let snapshot = match self.exchange.verify_connection(&address).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(chat_id = chat_id.0, error = %err, "wallet verification failed");
                let _ = self
                    .reply(
                        chat_id,
                        "Could not verify the wallet with the exchange. Use /connect to try again.",
                    )
                    .await;
                return;
            }
        };

        let stored = self
            .directory
            .upsert_user(
                chat_id.0,
                &address,
                &private_key,
                ConnectionStatus::Connected,
                snapshot.account_value,
                snapshot.free_collateral,
            )
            .await;
        if !stored {
            let _ = self
                .reply(chat_id, "The user store is unavailable, try again later.")
                .await;
            return;
        }

        let user_id = chat_id.0.to_string();
        let credential = Credential {
            wallet_address: address.clone(),
            private_key,
        };
        if let Err(err) = self.configs.materialize(&user_id, &credential, None) {
            warn!(chat_id = chat_id.0, error = %err, "config materialization failed");
            let _ = self
                .reply(chat_id, "Failed to prepare your trading configuration.")
                .await;
            return;
        }

        info!(chat_id = chat_id.0, wallet = %address, "wallet connected");
        let _ = self
            .reply(
                chat_id,
                &format!(
                    "✅ Wallet connected: <code>{address}</code>\n\
                     Account value: ${:.2}\n\n\
                     Use /start_trading when you are ready.",
                    snapshot.account_value
                ),
            )
            .await;
    }

    async fn reply(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.bot
            .send_message(chat_id, text)
            .parse_mode(ParseMode::Html)
            .send()
            .await
            .context("failed to send telegram message")?;
        Ok(())
    }
}
