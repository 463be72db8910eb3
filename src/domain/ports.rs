use async_trait::async_trait;

// Port for the external currency/inventory store. The engine only ever
// requests mutations after validated combat events; every call is
// best-effort and a `None` means the caller should fall back to the last
// balance it can still read.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Credits `amount` to `username`, returning the new balance when the
    /// write went through.
    async fn add_balance(&self, username: &str, amount: i64, reason: &str) -> Option<i64>;

    /// Debits `amount` from `username`, returning the new balance when the
    /// write went through.
    async fn deduct_balance(&self, username: &str, amount: i64, reason: &str) -> Option<i64>;

    /// Reads the current balance, if the store is reachable.
    async fn get_balance(&self, username: &str) -> Option<i64>;

    /// Clears the player's carried inventory (death penalty side effect).
    async fn clear_inventory(&self, username: &str);
}
