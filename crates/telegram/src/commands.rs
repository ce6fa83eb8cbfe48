use teloxide::utils::command::BotCommands;

/// Commands understood by the bot, one enum variant per slash command.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "snake_case", description = "Available commands:")]
pub enum Command {
    #[command(description = "welcome message and command overview")]
    Start,
    #[command(description = "show this help")]
    Help,
    #[command(description = "link your exchange wallet")]
    Connect,
    #[command(description = "cancel the current operation")]
    Cancel,
    #[command(description = "account balance and open positions")]
    Balance,
    #[command(description = "connection and worker status")]
    Status,
    #[command(description = "recent trading performance")]
    Performance,
    #[command(description = "start automated trading")]
    StartTrading,
    #[command(description = "stop automated trading")]
    StopTrading,
    #[command(description = "restart your trading worker")]
    Restart,
    #[command(description = "operator statistics")]
    AdminStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_snake_case_commands() {
        assert_eq!(Command::parse("/start", "testbot").unwrap(), Command::Start);
        assert_eq!(
            Command::parse("/start_trading", "testbot").unwrap(),
            Command::StartTrading
        );
        assert_eq!(
            Command::parse("/stop_trading@testbot", "testbot").unwrap(),
            Command::StopTrading
        );
        assert_eq!(
            Command::parse("/admin_stats", "testbot").unwrap(),
            Command::AdminStats
        );
    }

    #[test]
    fn rejects_unknown_input() {
        assert!(Command::parse("/unknown", "testbot").is_err());
        assert!(Command::parse("not a command", "testbot").is_err());
    }
}
