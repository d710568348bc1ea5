use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// A parsed chat command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Commands,
    GetWallet,
    Cancel,
    Balance,
    Buy { amount: Decimal, token: String },
    Sell { amount: Decimal, token: String },
    Tip { amount: Decimal, token: String },
    Convert { amount: Decimal, from: String, to: String },
    Rain { amount: Decimal, token: String, hours: u32 },
    Top10 { token: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("not a command")]
    NotACommand,

    #[error("Unknown command /{0}. Use /commands to see what I can do.")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid amount {0:?}. Please enter a positive number.")]
    InvalidAmount(String),

    #[error("Please specify a valid number of hours between 1 and {0}.")]
    InvalidHours(u32),
}

/// Upper bound for the rain lookback window, in hours
pub const MAX_RAIN_HOURS: u32 = 24;

pub const COMMANDS_TEXT: &str = "/start - Start the bot and see a welcome message.\n\
/getwallet - Create a new wallet or show your existing one.\n\
/balance - Check your token balances.\n\
/buy <amount> <token> - Buy tokens with AVAX.\n\
/sell <amount> <token> - Sell tokens for AVAX.\n\
/tip <amount> <token> - Tip the user you reply to.\n\
/convert <amount> <from> <to> - Convert between AVAX, tokens and USD.\n\
/rain <amount> <token> <hours> - Split tokens between users active in the last hours.\n\
/top10 <token> - Top 10 buyers and tippers for a token.\n\
/cancel - Cancel the current operation.\n\
/commands - List all available commands.";

fn command_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    // `/name`, an optional `@botname` suffix, then arguments
    RE.get_or_init(|| Regex::new(r"^/([A-Za-z0-9_]+)(?:@[A-Za-z0-9_]+)?(?:\s+(.*))?$").ok())
        .as_ref()
}

fn parse_amount(raw: &str) -> Result<Decimal, ParseError> {
    match Decimal::from_str(raw) {
        Ok(amount) if amount > Decimal::ZERO => Ok(amount),
        _ => Err(ParseError::InvalidAmount(raw.to_string())),
    }
}

fn amount_and_token(args: &[&str], usage: &'static str) -> Result<(Decimal, String), ParseError> {
    match args {
        [amount, token] => Ok((parse_amount(amount)?, token.to_lowercase())),
        _ => Err(ParseError::Usage(usage)),
    }
}

impl Command {
    pub fn parse(text: &str) -> Result<Command, ParseError> {
        let caps = command_regex()
            .and_then(|re| re.captures(text.trim()))
            .ok_or(ParseError::NotACommand)?;
        let name = caps
            .get(1)
            .map(|m| m.as_str().to_lowercase())
            .ok_or(ParseError::NotACommand)?;
        let args: Vec<&str> = caps
            .get(2)
            .map(|m| m.as_str().split_whitespace().collect())
            .unwrap_or_default();

        match name.as_str() {
            "start" => Ok(Command::Start),
            "commands" | "help" => Ok(Command::Commands),
            "getwallet" => Ok(Command::GetWallet),
            "cancel" => Ok(Command::Cancel),
            "balance" => Ok(Command::Balance),
            "buy" => {
                let (amount, token) = amount_and_token(&args, "/buy <amount> <token>")?;
                Ok(Command::Buy { amount, token })
            }
            "sell" => {
                let (amount, token) = amount_and_token(&args, "/sell <amount> <token>")?;
                Ok(Command::Sell { amount, token })
            }
            "tip" => {
                let (amount, token) = amount_and_token(&args, "/tip <amount> <token>")?;
                Ok(Command::Tip { amount, token })
            }
            "convert" => match args.as_slice() {
                [amount, from, to] => Ok(Command::Convert {
                    amount: parse_amount(amount)?,
                    from: from.to_lowercase(),
                    to: to.to_lowercase(),
                }),
                _ => Err(ParseError::Usage("/convert <amount> <from_token> <to_token>")),
            },
            "rain" => match args.as_slice() {
                [amount, token, hours] => {
                    let amount = parse_amount(amount)?;
                    let hours = hours
                        .parse::<u32>()
                        .ok()
                        .filter(|h| (1..=MAX_RAIN_HOURS).contains(h))
                        .ok_or(ParseError::InvalidHours(MAX_RAIN_HOURS))?;
                    Ok(Command::Rain {
                        amount,
                        token: token.to_lowercase(),
                        hours,
                    })
                }
                _ => Err(ParseError::Usage("/rain <amount> <token> <hours>")),
            },
            "top10" => match args.as_slice() {
                [token] => Ok(Command::Top10 {
                    token: token.to_lowercase(),
                }),
                _ => Err(ParseError::Usage("/top10 <token>")),
            },
            // Legacy per-token form, e.g. /top10rpepe
            other if other.starts_with("top10") && other.len() > 5 => Ok(Command::Top10 {
                token: other[5..].to_string(),
            }),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}
