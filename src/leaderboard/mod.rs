mod ledger;

pub use ledger::ActionKind;
pub use ledger::Leaderboard;
pub use ledger::LeaderboardEntry;
pub use ledger::Standings;
pub use ledger::TokenStats;
