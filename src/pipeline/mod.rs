mod builder;
mod rain;

pub use builder::PipelineSettings;
pub use builder::TransactionBuilder;
pub use builder::FALLBACK_TRANSFER_GAS;
pub use rain::split_evenly;
pub use rain::BatchDistributor;
pub use rain::RainReport;
pub use rain::RecipientOutcome;
