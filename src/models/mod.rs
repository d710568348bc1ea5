mod intent;
mod submission;
mod token;
mod wallet;

pub use intent::IntentKind;
pub use intent::TransactionIntent;
pub use intent::DEFAULT_DEADLINE_OFFSET_SECS;
pub use intent::DEFAULT_SLIPPAGE;
pub use submission::GasPlan;
pub use submission::ReceiptOutcome;
pub use submission::SubmissionResult;
pub use submission::SubmissionStatus;
pub use submission::SubmitOptions;
pub use token::Asset;
pub use token::TokenInfo;
pub use token::TokenRegistry;
pub use wallet::Wallet;
