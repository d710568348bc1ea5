use log::{info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::utils::format_amount;

/// Kind of action counted on the leaderboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Buy,
    Tip,
}

/// Per-token counters for one user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenStats {
    pub buys: u64,
    pub tips: u64,
    pub total_spent_buys: Decimal,
    pub total_spent_tips: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub username: String,
    #[serde(default)]
    pub tokens: BTreeMap<String, TokenStats>,
}

/// Ranked buyers and tippers for one token
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Standings {
    pub buyers: Vec<(String, TokenStats)>,
    pub tippers: Vec<(String, TokenStats)>,
}

type Board = BTreeMap<String, LeaderboardEntry>;

/// JSON-file leaderboard keyed by user id. Writes go through one async lock.
pub struct Leaderboard {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Leaderboard {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Board> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Board::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Board::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a sibling temp file, then rename over the real one
    async fn store(&self, board: &Board) -> Result<()> {
        let json = serde_json::to_vec_pretty(board)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Add one action to a user's totals for `token`
    pub async fn record_action(
        &self,
        user_id: &str,
        username: &str,
        amount: Decimal,
        kind: ActionKind,
        token: &str,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut board = self.load().await?;

        let entry = board.entry(user_id.to_string()).or_default();
        if !username.is_empty() {
            entry.username = username.to_string();
        }
        let stats = entry.tokens.entry(token.to_lowercase()).or_default();
        let (count, total) = match kind {
            ActionKind::Buy => (&mut stats.buys, &mut stats.total_spent_buys),
            ActionKind::Tip => (&mut stats.tips, &mut stats.total_spent_tips),
        };
        // Nothing is stored when the total can't grow
        *total = total.checked_add(amount).ok_or_else(|| {
            Error::UserInput(format!("Leaderboard total for {} is out of range", token))
        })?;
        *count = count.saturating_add(1);

        self.store(&board).await?;
        info!("Leaderboard updated: {} {:?} {} {}", user_id, kind, amount, token);
        Ok(())
    }

    /// Like `record_action`, but failures are only logged
    pub async fn record_action_logged(
        &self,
        user_id: &str,
        username: &str,
        amount: Decimal,
        kind: ActionKind,
        token: &str,
    ) {
        if let Err(e) = self.record_action(user_id, username, amount, kind, token).await {
            warn!("Could not update leaderboard for {}: {}", user_id, e);
        }
    }

    /// Top `limit` buyers and tippers of `token`, by total amount
    pub async fn top(&self, token: &str, limit: usize) -> Result<Standings> {
        let board = self.load().await?;
        let token = token.to_lowercase();

        let ranked = |count: fn(&TokenStats) -> u64, total: fn(&TokenStats) -> Decimal| {
            let mut rows: Vec<(String, TokenStats)> = board
                .iter()
                .filter_map(|(user_id, entry)| {
                    let stats = entry.tokens.get(&token)?;
                    if count(stats) == 0 {
                        return None;
                    }
                    let name = if entry.username.is_empty() {
                        format!("User {}", user_id)
                    } else {
                        entry.username.clone()
                    };
                    Some((name, stats.clone()))
                })
                .collect();
            rows.sort_by(|a, b| total(&b.1).cmp(&total(&a.1)));
            rows.truncate(limit);
            rows
        };

        Ok(Standings {
            buyers: ranked(|s| s.buys, |s| s.total_spent_buys),
            tippers: ranked(|s| s.tips, |s| s.total_spent_tips),
        })
    }

    /// Chat text for `/top10 <token>`
    pub async fn render(&self, token: &str) -> Result<String> {
        let standings = self.top(token, 10).await?;
        let symbol = token.to_uppercase();
        if standings.buyers.is_empty() && standings.tippers.is_empty() {
            return Ok(format!("No leaderboard data for {} yet.", symbol));
        }

        let mut text = format!("🏆 Top 10 {} Leaderboard 🏆\n\n🔺 Top 10 Buyers:\n", symbol);
        for (rank, (name, stats)) in standings.buyers.iter().enumerate() {
            text.push_str(&format!(
                "{}. {}: {} buys, {} {} bought\n",
                rank + 1,
                name,
                stats.buys,
                format_amount(stats.total_spent_buys, 2),
                symbol
            ));
        }
        text.push_str("\n🔺 Top 10 Tippers:\n");
        for (rank, (name, stats)) in standings.tippers.iter().enumerate() {
            text.push_str(&format!(
                "{}. {}: {} tips, {} {} tipped\n",
                rank + 1,
                name,
                stats.tips,
                format_amount(stats.total_spent_tips, 2),
                symbol
            ));
        }
        Ok(text)
    }
}
