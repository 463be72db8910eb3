use crate::domain::ports::Ledger;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Serialize)]
struct BalanceMutation<'a> {
    username: &'a str,
    amount: i64,
    reason: &'a str,
}

#[derive(Debug, Serialize)]
struct InventoryClear<'a> {
    username: &'a str,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: i64,
}

// Thin reqwest client for the ledger service. Failures collapse to `None`
// so callers fall back to the last known balance instead of surfacing
// collaborator errors to players.
#[derive(Clone)]
pub struct LedgerClient {
    http: reqwest::Client,
    base_url: String,
}

impl LedgerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    async fn mutate(&self, route: &str, username: &str, amount: i64, reason: &str) -> Option<i64> {
        let url = format!("{}{route}", self.base_url);
        let response = match self
            .http
            .post(url)
            .json(&BalanceMutation {
                username,
                amount,
                reason,
            })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(username, route, error = %e, "ledger request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(username, route, status = %response.status(), "ledger rejected mutation");
            return None;
        }

        match response.json::<BalanceResponse>().await {
            Ok(body) => Some(body.balance),
            Err(e) => {
                warn!(username, route, error = %e, "ledger response malformed");
                None
            }
        }
    }
}

#[async_trait]
impl Ledger for LedgerClient {
    async fn add_balance(&self, username: &str, amount: i64, reason: &str) -> Option<i64> {
        self.mutate("/balance/add", username, amount, reason).await
    }

    async fn deduct_balance(&self, username: &str, amount: i64, reason: &str) -> Option<i64> {
        self.mutate("/balance/deduct", username, amount, reason)
            .await
    }

    async fn get_balance(&self, username: &str) -> Option<i64> {
        let url = format!("{}/balance/{username}", self.base_url);
        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(username, error = %e, "ledger balance read failed");
                return None;
            }
        };
        if !response.status().is_success() {
            return None;
        }
        response
            .json::<BalanceResponse>()
            .await
            .map(|body| body.balance)
            .ok()
    }

    async fn clear_inventory(&self, username: &str) {
        let url = format!("{}/inventory/clear", self.base_url);
        let result = self
            .http
            .post(url)
            .json(&InventoryClear { username })
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(username, status = %response.status(), "inventory clear rejected");
            }
            Err(e) => {
                warn!(username, error = %e, "inventory clear request failed");
            }
        }
    }
}
