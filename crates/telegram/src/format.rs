//! Message builders. Everything here is pure so it can be tested without a
//! live bot; all output is Telegram HTML.

use crate::commands::Command;
use hypertrader_directory::{ConnectionStatus, UserRecord};
use hypertrader_exchange_hyperliquid::BalanceSnapshot;
use hypertrader_supervisor::{ExecOutput, WorkerStatus};
use teloxide::utils::command::BotCommands;
use teloxide::utils::html::escape;

#[must_use]
pub fn welcome_text() -> String {
    format!(
        "🤖 <b>Hyperliquid Trader</b>\n\n\
         Run your own trading worker from this chat. \
         Link a wallet with /connect, then /start_trading.\n\n{}",
        escape(&Command::descriptions().to_string())
    )
}

#[must_use]
pub fn help_text() -> String {
    escape(&Command::descriptions().to_string())
}

#[must_use]
pub fn connect_prompt() -> String {
    "🔐 Send your wallet's private key as the next message.\n\n\
     The message is deleted from this chat immediately after it arrives. \
     Use /cancel to abort."
        .to_string()
}

#[must_use]
pub fn balance_text(snapshot: &BalanceSnapshot) -> String {
    let mut text = format!(
        "💰 <b>Balance</b>\n\
         Account value: ${:.2}\n\
         Free collateral: ${:.2}\n",
        snapshot.account_value, snapshot.free_collateral
    );
    if snapshot.positions.is_empty() {
        text.push_str("\nNo open positions.");
    } else {
        text.push_str("\nOpen positions:\n");
        for position in &snapshot.positions {
            text.push_str(&format!(
                "• {} {} {:.4}",
                escape(&position.asset),
                position.side,
                position.size.abs()
            ));
            if let Some(entry) = position.entry_price {
                text.push_str(&format!(" @ {entry:.2}"));
            }
            text.push('\n');
        }
    }
    text
}

#[must_use]
pub fn status_text(record: Option<&UserRecord>, worker: Option<&WorkerStatus>) -> String {
    let Some(record) = record else {
        return "You are not registered yet. Use /connect to link a wallet.".to_string();
    };

    let connection = match record.status {
        ConnectionStatus::Unconnected => "⚪ not connected",
        ConnectionStatus::Connected => "🟡 connected, not trading",
        ConnectionStatus::Trading => "🟢 trading",
    };
    let mut text = format!(
        "📊 <b>Status</b>\n\
         Connection: {connection}\n\
         Wallet: <code>{}</code>\n",
        escape(&record.wallet_address)
    );

    match worker {
        Some(status) if status.is_running => {
            text.push_str(&format!(
                "Worker: running (pid {}, strategy {}, up {})\n",
                status.pid,
                escape(&status.strategy),
                format_uptime(status.uptime_secs)
            ));
        }
        Some(status) => {
            text.push_str(&format!(
                "Worker: exited (code {})\n",
                status.exit_code.unwrap_or(-1)
            ));
        }
        None => text.push_str("Worker: not running\n"),
    }
    text
}

#[must_use]
pub fn performance_text(output: &ExecOutput) -> String {
    match output {
        ExecOutput::Data(value) => {
            let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            format!("📈 <b>Performance</b>\n<pre>{}</pre>", escape(&pretty))
        }
        ExecOutput::Text(text) if text.is_empty() => {
            "📈 No performance data yet.".to_string()
        }
        ExecOutput::Text(text) => {
            format!("📈 <b>Performance</b>\n<pre>{}</pre>", escape(text))
        }
    }
}

#[must_use]
pub fn admin_stats_text(
    total_users: i64,
    by_status: &[(String, i64)],
    running_workers: usize,
    latest: &[UserRecord],
) -> String {
    let mut text = format!(
        "🛠 <b>Operator stats</b>\n\
         Users: {total_users}\n\
         Running workers: {running_workers}\n"
    );
    for (status, count) in by_status {
        text.push_str(&format!("  {}: {count}\n", escape(status)));
    }
    if !latest.is_empty() {
        text.push_str("\nNewest users:\n");
        for record in latest {
            text.push_str(&format!(
                "• {} <code>{}</code> ({})\n",
                record.chat_id,
                escape(&record.wallet_address),
                record.status
            ));
        }
    }
    text
}

/// Compact human uptime, largest two units only.
#[must_use]
pub fn format_uptime(total_secs: i64) -> String {
    let total_secs = total_secs.max(0);
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hypertrader_exchange_hyperliquid::PositionSummary;

    #[test]
    fn uptime_uses_largest_two_units() {
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m 5s");
        assert_eq!(format_uptime(3 * 3600 + 12 * 60), "3h 12m");
        assert_eq!(format_uptime(2 * 86_400 + 5 * 3600), "2d 5h");
        assert_eq!(format_uptime(-5), "0s");
    }

    #[test]
    fn balance_text_lists_positions() {
        let snapshot = BalanceSnapshot {
            account_value: 1250.5,
            free_collateral: 940.25,
            positions: vec![PositionSummary {
                asset: "BTC".to_string(),
                size: -0.01,
                side: "short",
                entry_price: Some(65_000.0),
            }],
        };
        let text = balance_text(&snapshot);
        assert!(text.contains("$1250.50"));
        assert!(text.contains("BTC short 0.0100 @ 65000.00"));

        let flat = BalanceSnapshot {
            account_value: 0.0,
            free_collateral: 0.0,
            positions: vec![],
        };
        assert!(balance_text(&flat).contains("No open positions."));
    }

    #[test]
    fn status_text_without_record_suggests_connect() {
        assert!(status_text(None, None).contains("/connect"));
    }

    #[test]
    fn performance_text_escapes_worker_output() {
        let output = ExecOutput::Text("<script>".to_string());
        assert!(performance_text(&output).contains("&lt;script&gt;"));
        assert!(!performance_text(&output).contains("<script>"));
    }
}
