//! Chain RPC abstraction (spec §1 "ChainWatcher and ChainSender"). Scanning
//! new custody-account transfers and sending outbound transfers are kept as
//! two narrow traits so `DepositMatcher` and `BatchLifecycle` can be tested
//! without a live RPC endpoint, mirroring how this corpus keeps its
//! Starknet bridge client behind a thin retrying wrapper.

use tracing::warn;

/// One confirmed transfer into the custody account, oldest-first.
#[derive(Debug, Clone)]
pub struct ChainDeposit {
    pub txid: String,
    pub sender_address: String,
    pub amount_micros: u128,
    pub memo: Option<String>,
}

pub trait ChainWatcher: Send + Sync + 'static {
    /// Returns deposits confirmed since `since_signature` (exclusive),
    /// oldest-first. `None` on the first call scans from the current tip.
    fn poll_deposits(
        &self,
        since_signature: Option<&str>,
    ) -> impl std::future::Future<Output = Result<Vec<ChainDeposit>, String>> + Send;

    fn deposit_address(&self) -> &str;
}

pub trait ChainSender: Send + Sync + 'static {
    fn transfer_usdc(
        &self,
        to_address: &str,
        amount_micros: u128,
    ) -> impl std::future::Future<Output = Result<String, String>> + Send;

    fn transfer_token(
        &self,
        mint: &str,
        to_address: &str,
        amount: u128,
    ) -> impl std::future::Future<Output = Result<String, String>> + Send;
}

/// Retries a chain send once on a transient error, per spec §7 retry policy
/// ("chain sends MAY be retried once on transient RPC errors").
pub async fn send_with_retry<F, Fut>(mut attempt: F) -> Result<String, String>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<String, String>>,
{
    match attempt().await {
        Ok(txid) => Ok(txid),
        Err(first_err) => {
            warn!(error = %first_err, "chain send failed, retrying once");
            attempt().await
        }
    }
}

/// In-memory chain stub: deposits are injected via `push_deposit` (e.g. by
/// an admin activation endpoint or a test harness), and sends are recorded
/// rather than broadcast.
pub struct MockChain {
    deposit_address: String,
    deposits: std::sync::Mutex<Vec<ChainDeposit>>,
    sent: std::sync::Mutex<Vec<(String, String, u128)>>,
    tx_counter: std::sync::atomic::AtomicU64,
}

impl MockChain {
    pub fn new(deposit_address: impl Into<String>) -> Self {
        Self {
            deposit_address: deposit_address.into(),
            deposits: std::sync::Mutex::new(Vec::new()),
            sent: std::sync::Mutex::new(Vec::new()),
            tx_counter: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn push_deposit(&self, deposit: ChainDeposit) {
        self.deposits.lock().unwrap().push(deposit);
    }

    fn next_txid(&self, prefix: &str) -> String {
        let n = self.tx_counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        format!("mock-{prefix}-{n}")
    }
}

impl ChainWatcher for MockChain {
    async fn poll_deposits(&self, since_signature: Option<&str>) -> Result<Vec<ChainDeposit>, String> {
        let deposits = self.deposits.lock().unwrap();
        match since_signature {
            None => Ok(deposits.clone()),
            Some(sig) => {
                let pos = deposits.iter().position(|d| d.txid == sig);
                match pos {
                    Some(idx) => Ok(deposits[idx + 1..].to_vec()),
                    None => Ok(deposits.clone()),
                }
            }
        }
    }

    fn deposit_address(&self) -> &str {
        &self.deposit_address
    }
}

impl ChainSender for MockChain {
    async fn transfer_usdc(&self, to_address: &str, amount_micros: u128) -> Result<String, String> {
        let txid = self.next_txid("usdc");
        self.sent
            .lock()
            .unwrap()
            .push((to_address.to_string(), txid.clone(), amount_micros));
        Ok(txid)
    }

    async fn transfer_token(&self, mint: &str, to_address: &str, amount: u128) -> Result<String, String> {
        let txid = self.next_txid("token");
        self.sent.lock().unwrap().push((
            format!("{mint}:{to_address}"),
            txid.clone(),
            amount,
        ));
        Ok(txid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn poll_deposits_returns_all_on_first_call() {
        let chain = MockChain::new("custody-addr");
        chain.push_deposit(ChainDeposit {
            txid: "tx1".into(),
            sender_address: "sender1".into(),
            amount_micros: 1_000_000,
            memo: None,
        });
        let deposits = chain.poll_deposits(None).await.unwrap();
        assert_eq!(deposits.len(), 1);
    }

    #[tokio::test]
    async fn poll_deposits_resumes_after_cursor() {
        let chain = MockChain::new("custody-addr");
        chain.push_deposit(ChainDeposit {
            txid: "tx1".into(),
            sender_address: "s1".into(),
            amount_micros: 1,
            memo: None,
        });
        chain.push_deposit(ChainDeposit {
            txid: "tx2".into(),
            sender_address: "s2".into(),
            amount_micros: 2,
            memo: None,
        });
        let deposits = chain.poll_deposits(Some("tx1")).await.unwrap();
        assert_eq!(deposits.len(), 1);
        assert_eq!(deposits[0].txid, "tx2");
    }

    #[tokio::test]
    async fn send_with_retry_recovers_on_second_attempt() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = send_with_retry(|| {
            let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err("transient".to_string())
                } else {
                    Ok("txid-ok".to_string())
                }
            }
        })
        .await;
        assert_eq!(result, Ok("txid-ok".to_string()));
    }
}
