//! Batched withdrawal sending.
//!
//! Drains the per-currency withdrawal queue into one `sendmany`, coalescing
//! rows by destination and filtering dust, then settles the queue rows and
//! the network fee in a single ledger transaction. A per-currency advisory
//! lock spans the RPC calls so two concurrent drains can never double-submit
//! the same rows.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use custodia_db::errors::DbError;
use custodia_db::traits::{LedgerDatabase, LedgerTxn};
use custodia_db::types::{NewOperation, WalletId, WithdrawalId, WithdrawalStatus};
use custodia_ledger::{post_operation, Ledger, LedgerError};
use custodia_primitives::{Amount, AmountError, Ticker};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::*;

use crate::rpc::error::ClientError;
use crate::rpc::traits::NodeRpc;

#[derive(Debug, Error)]
pub enum SenderError {
    #[error("db: {0}")]
    Db(#[from] DbError),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("rpc: {0}")]
    Rpc(#[from] ClientError),

    #[error("amount: {0}")]
    Amount(#[from] AmountError),
}

pub struct WithdrawalSender<D> {
    ledger: Ledger<D>,
    account: String,
    locks: parking_lot::Mutex<HashMap<Ticker, Arc<AsyncMutex<()>>>>,
}

impl<D: LedgerDatabase> WithdrawalSender<D> {
    pub fn new(ledger: Ledger<D>, account: &str) -> Self {
        Self {
            ledger,
            account: account.to_owned(),
            locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn currency_lock(&self, ticker: &Ticker) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(ticker.clone())
            .or_default()
            .clone()
    }

    /// Drains the pending queue for `ticker`. Returns the batch txid, or
    /// `None` when nothing was deliverable.
    ///
    /// An RPC failure on `sendmany` leaves every row and balance untouched;
    /// the next tick retries. A failure on the follow-up `gettransaction`
    /// records a zero fee but still settles the rows, because the funds are
    /// spent on chain either way.
    pub async fn process_withdrawals(
        &self,
        ticker: &Ticker,
        rpc: &impl NodeRpc,
    ) -> Result<Option<String>, SenderError> {
        let lock = self.currency_lock(ticker);
        let _guard = lock.lock().await;

        let (dust, rows) = self
            .ledger
            .db()
            .with_txn(|txn| -> Result<_, SenderError> {
                let currency = txn
                    .get_currency(ticker)?
                    .ok_or_else(|| LedgerError::UnknownCurrency(ticker.clone()))?;
                let rows = txn.pending_withdrawals(ticker)?;
                Ok((currency.dust, rows))
            })?;

        // Coalesce by destination. Destinations at or below dust stay in the
        // queue with their holds intact; they do not fail the batch.
        let mut outputs: BTreeMap<String, Amount> = BTreeMap::new();
        for row in &rows {
            *outputs.entry(row.address.clone()).or_default() += row.amount;
        }
        outputs.retain(|_, amount| *amount > dust);
        if outputs.is_empty() {
            return Ok(None);
        }

        let batch_ids: Vec<WithdrawalId> = rows
            .iter()
            .filter(|row| outputs.contains_key(&row.address))
            .map(|row| row.id)
            .collect();

        let txid = rpc.send_many(&self.account, &outputs).await?;
        info!(%ticker, %txid, outputs = outputs.len(), "withdrawal batch broadcast");

        let fee = match rpc.get_transaction(&txid).await {
            Ok(envelope) => envelope.fee.map(|f| f.abs()).unwrap_or(Amount::ZERO),
            Err(err) => {
                warn!(%txid, %err, "fee lookup failed, recording zero pending reconciliation");
                Amount::ZERO
            }
        };

        self.ledger
            .db()
            .with_txn(|txn| settle_batch(txn, &batch_ids, &txid, fee))?;

        Ok(Some(txid))
    }
}

/// Marks the batch rows sent under `txid` and posts one "Network fee"
/// operation per contributing wallet, releasing that wallet's sent hold and
/// charging its fee share in the same entry.
fn settle_batch(
    txn: &mut impl LedgerTxn,
    ids: &[WithdrawalId],
    txid: &str,
    fee: Amount,
) -> Result<(), SenderError> {
    let mut rows = Vec::with_capacity(ids.len());
    for id in ids {
        let row = txn
            .get_withdrawal(*id)?
            .ok_or_else(|| DbError::MissingRow("withdrawal", id.to_string()))?;
        if row.status != WithdrawalStatus::New || row.txid.is_some() {
            continue;
        }
        rows.push(row);
    }

    let weights: BTreeMap<WithdrawalId, Amount> =
        rows.iter().map(|row| (row.id, row.amount)).collect();
    let shares = split_proportionally(fee, &weights)?;

    let mut per_wallet: BTreeMap<WalletId, (Amount, Amount)> = BTreeMap::new();
    for row in &mut rows {
        row.txid = Some(txid.to_owned());
        row.status = WithdrawalStatus::Sent;
        row.fee = shares.get(&row.id).copied().unwrap_or(Amount::ZERO);
        txn.update_withdrawal(row)?;

        let (sent, fee_share) = per_wallet.entry(row.wallet).or_default();
        *sent += row.amount;
        *fee_share += row.fee;
    }

    for (wallet, (sent, fee_share)) in per_wallet {
        post_operation(
            txn,
            NewOperation::on(wallet)
                .balance(-fee_share)
                .holded(-sent)
                .description("Network fee"),
        )?;
    }
    Ok(())
}

/// Splits `total` across `weights` proportionally, each share quantized to
/// 8 decimals with banker's rounding. The rounding residue lands on the
/// largest weight; the smallest key wins ties.
fn split_proportionally<K: Ord + Copy>(
    total: Amount,
    weights: &BTreeMap<K, Amount>,
) -> Result<BTreeMap<K, Amount>, AmountError> {
    let mut shares: BTreeMap<K, Amount> =
        weights.keys().map(|k| (*k, Amount::ZERO)).collect();
    if weights.is_empty() || total.is_zero() {
        return Ok(shares);
    }

    let sum: Decimal = weights.values().map(|w| w.to_decimal()).sum();
    let largest = weights
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(k, _)| *k)
        .expect("weights checked non-empty");
    if sum.is_zero() {
        shares.insert(largest, total);
        return Ok(shares);
    }

    for (key, weight) in weights {
        let share = Amount::rounded(total.to_decimal() * weight.to_decimal() / sum)?;
        shares.insert(*key, share);
    }

    let assigned: Amount = shares.values().copied().sum();
    let residue = total - assigned;
    if !residue.is_zero() {
        if let Some(share) = shares.get_mut(&largest) {
            *share += residue;
        }
    }
    Ok(shares)
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use custodia_db::types::CurrencyEntry;
    use custodia_db::MemDb;
    use custodia_ledger::LedgerResult;
    use custodia_primitives::TxCategory;

    use super::*;
    use crate::rpc::types::TransactionEnvelope;
    use crate::test_utils::TestNodeClient;

    const TXID: &str = "ea12fb225a0665e6ca35ab3fd7a514c36d1d5028d99340931d745dab62c13f8a";
    const ADDR_X: &str = "mvEnyQ9b9iTA11QMHAwSVtHUrtD4CTfiDB";
    const ADDR_Y: &str = "mkYAsS9QLYo5mXVjuvxKkZUhQJxiMLX5Xk";
    const ADDR_Z: &str = "mvfNqn5AoVWrsJGuKrdPuoQhYs71CR9uFA";

    fn amt(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    fn tst() -> Ticker {
        Ticker::new("tst")
    }

    fn send_envelope(fee: &str) -> TransactionEnvelope {
        TransactionEnvelope {
            txid: TXID.to_owned(),
            amount: amt("-0.4"),
            fee: Some(amt(fee)),
            confirmations: 0,
            blockhash: None,
            address: None,
            category: Some(TxCategory::Send),
            details: vec![],
        }
    }

    fn setup(balance: &str, dust: &str) -> (Ledger<MemDb>, WalletId, WithdrawalSender<MemDb>) {
        let ledger = Ledger::new(std::sync::Arc::new(MemDb::new()));
        let mut currency = CurrencyEntry::new(tst(), "Testnet");
        currency.magic_bytes = vec![111, 196];
        currency.dust = amt(dust);
        ledger.upsert_currency(currency).unwrap();
        let wallet = ledger.create_wallet(&tst(), "test").unwrap();
        ledger
            .db()
            .with_txn(|txn| {
                post_operation(txn, NewOperation::on(wallet.id).balance(amt(balance)))
            })
            .unwrap();
        let sender = WithdrawalSender::new(ledger.clone(), "");
        (ledger, wallet.id, sender)
    }

    #[tokio::test]
    async fn test_batch_coalesces_and_charges_fee() {
        let (ledger, wallet, sender) = setup("1.0", "0");
        ledger
            .withdraw_to_address(wallet, ADDR_X, amt("0.1"), None)
            .unwrap();
        ledger
            .withdraw_to_address(wallet, ADDR_Y, amt("0.1"), None)
            .unwrap();
        ledger
            .withdraw_to_address(wallet, ADDR_X, amt("0.1"), None)
            .unwrap();
        ledger
            .withdraw_to_address(wallet, ADDR_Z, amt("0.1"), None)
            .unwrap();

        let client = TestNodeClient::default()
            .with_send_many(TXID)
            .with_transaction(send_envelope("-0.0001"));

        let txid = sender.process_withdrawals(&tst(), &client).await.unwrap();
        assert_eq!(txid.as_deref(), Some(TXID));

        let calls = client.send_many_calls.lock();
        assert_eq!(calls.len(), 1);
        let (account, outputs) = &calls[0];
        assert_eq!(account, "");
        let expected: BTreeMap<String, Amount> = [
            (ADDR_X.to_owned(), amt("0.2")),
            (ADDR_Y.to_owned(), amt("0.1")),
            (ADDR_Z.to_owned(), amt("0.1")),
        ]
        .into();
        assert_eq!(outputs, &expected);
        assert_eq!(client.get_transaction_calls.lock().as_slice(), &[TXID.to_owned()]);

        let w = ledger.wallet(wallet).unwrap();
        assert_eq!(w.holded, Amount::ZERO);
        assert_eq!(w.balance, amt("0.5999"));

        let fee_op = ledger
            .db()
            .with_txn(|txn| -> LedgerResult<_> { Ok(txn.wallet_operations(wallet)?) })
            .unwrap()
            .into_iter()
            .find(|op| op.description == "Network fee")
            .unwrap();
        assert_eq!(fee_op.balance, -amt("0.0001"));
        assert_eq!(fee_op.holded, -amt("0.4"));
    }

    #[tokio::test]
    async fn test_dust_rows_stay_queued() {
        let (ledger, wallet, sender) = setup("2.0", "0.00005430");
        let wt1 = ledger
            .withdraw_to_address(wallet, ADDR_X, amt("1"), None)
            .unwrap();
        let wt2 = ledger
            .withdraw_to_address(wallet, ADDR_Z, amt("0.00000001"), None)
            .unwrap();

        let client = TestNodeClient::default()
            .with_send_many(TXID)
            .with_transaction(send_envelope("-0.0001"));

        sender.process_withdrawals(&tst(), &client).await.unwrap();

        let calls = client.send_many_calls.lock();
        let (_, outputs) = &calls[0];
        let expected: BTreeMap<String, Amount> = [(ADDR_X.to_owned(), amt("1"))].into();
        assert_eq!(outputs, &expected);

        let w = ledger.wallet(wallet).unwrap();
        assert_eq!(w.balance, amt("0.99989999"));
        // The dust row keeps its hold until it is retried or cleared.
        assert_eq!(w.holded, amt("0.00000001"));

        let (sent, dusty) = ledger
            .db()
            .with_txn(|txn| -> LedgerResult<_> {
                Ok((
                    txn.get_withdrawal(wt1.id)?.unwrap(),
                    txn.get_withdrawal(wt2.id)?.unwrap(),
                ))
            })
            .unwrap();
        assert_eq!(sent.txid.as_deref(), Some(TXID));
        assert_eq!(sent.status, WithdrawalStatus::Sent);
        assert_eq!(sent.fee, amt("0.0001"));
        assert_eq!(dusty.txid, None);
        assert_eq!(dusty.status, WithdrawalStatus::New);
    }

    #[tokio::test]
    async fn test_empty_queue_skips_rpc() {
        let (_, _, sender) = setup("1.0", "0");
        let client = TestNodeClient::default();
        let res = sender.process_withdrawals(&tst(), &client).await.unwrap();
        assert_eq!(res, None);
        assert!(client.send_many_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_all_dust_skips_rpc() {
        let (ledger, wallet, sender) = setup("1.0", "0.00005430");
        ledger
            .withdraw_to_address(wallet, ADDR_X, amt("0.00000001"), None)
            .unwrap();
        let client = TestNodeClient::default();
        let res = sender.process_withdrawals(&tst(), &client).await.unwrap();
        assert_eq!(res, None);
        assert!(client.send_many_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_sendmany_failure_leaves_queue_untouched() {
        let (ledger, wallet, sender) = setup("1.0", "0");
        let wt = ledger
            .withdraw_to_address(wallet, ADDR_X, amt("1"), None)
            .unwrap();

        // No canned sendmany response: the call errors.
        let client = TestNodeClient::default();
        let res = sender.process_withdrawals(&tst(), &client).await;
        assert!(matches!(res, Err(SenderError::Rpc(_))));

        let row = ledger
            .db()
            .with_txn(|txn| -> LedgerResult<_> { Ok(txn.get_withdrawal(wt.id)?.unwrap()) })
            .unwrap();
        assert_eq!(row.status, WithdrawalStatus::New);
        assert_eq!(row.txid, None);
        let w = ledger.wallet(wallet).unwrap();
        assert_eq!(w.holded, amt("1"));
    }

    #[tokio::test]
    async fn test_fee_lookup_failure_still_settles_rows() {
        let (ledger, wallet, sender) = setup("1.0", "0");
        let wt = ledger
            .withdraw_to_address(wallet, ADDR_X, amt("1"), None)
            .unwrap();

        // sendmany succeeds but gettransaction errors.
        let client = TestNodeClient::default().with_send_many(TXID);
        let txid = sender.process_withdrawals(&tst(), &client).await.unwrap();
        assert_eq!(txid.as_deref(), Some(TXID));

        let row = ledger
            .db()
            .with_txn(|txn| -> LedgerResult<_> { Ok(txn.get_withdrawal(wt.id)?.unwrap()) })
            .unwrap();
        assert_eq!(row.status, WithdrawalStatus::Sent);
        assert_eq!(row.txid.as_deref(), Some(TXID));
        assert_eq!(row.fee, Amount::ZERO);

        let w = ledger.wallet(wallet).unwrap();
        assert_eq!(w.holded, Amount::ZERO);
        assert_eq!(w.balance, Amount::ZERO);
    }

    #[tokio::test]
    async fn test_multi_wallet_fee_split() {
        let (ledger, w1, sender) = setup("1.0", "0");
        let w2 = ledger.create_wallet(&tst(), "second").unwrap().id;
        ledger
            .db()
            .with_txn(|txn| post_operation(txn, NewOperation::on(w2).balance(amt("1.0"))))
            .unwrap();

        ledger
            .withdraw_to_address(w1, ADDR_X, amt("0.2"), None)
            .unwrap();
        ledger
            .withdraw_to_address(w2, ADDR_Y, amt("0.1"), None)
            .unwrap();

        let client = TestNodeClient::default()
            .with_send_many(TXID)
            .with_transaction(send_envelope("-0.0001"));
        sender.process_withdrawals(&tst(), &client).await.unwrap();

        // Fee splits 2:1 across the contributing wallets.
        let a = ledger.wallet(w1).unwrap();
        let b = ledger.wallet(w2).unwrap();
        assert_eq!(a.balance, amt("0.8") - amt("0.00006667"));
        assert_eq!(b.balance, amt("0.9") - amt("0.00003333"));
        assert_eq!(a.holded, Amount::ZERO);
        assert_eq!(b.holded, Amount::ZERO);
    }

    #[tokio::test]
    async fn test_concurrent_drains_send_once() {
        let (ledger, wallet, sender) = setup("1.0", "0");
        ledger
            .withdraw_to_address(wallet, ADDR_X, amt("1"), None)
            .unwrap();

        let client = TestNodeClient::default()
            .with_send_many(TXID)
            .with_transaction(send_envelope("-0.0001"));

        let ctx = tst();
        let (a, b) = tokio::join!(
            sender.process_withdrawals(&ctx, &client),
            sender.process_withdrawals(&ctx, &client),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(client.send_many_calls.lock().len(), 1);
    }

    #[test]
    fn test_split_proportionally_exact() {
        let weights: BTreeMap<u64, Amount> =
            [(1, amt("0.2")), (2, amt("0.1"))].into();
        let shares = split_proportionally(amt("0.0001"), &weights).unwrap();
        assert_eq!(shares[&1], amt("0.00006667"));
        assert_eq!(shares[&2], amt("0.00003333"));
        assert_eq!(shares.values().copied().sum::<Amount>(), amt("0.0001"));
    }

    #[test]
    fn test_split_residue_to_largest_smallest_key_on_tie() {
        // One satoshi across two equal weights: each share rounds to zero
        // (half-even), the residue lands on the smaller key.
        let weights: BTreeMap<u64, Amount> =
            [(7, amt("0.1")), (3, amt("0.1"))].into();
        let shares = split_proportionally(amt("0.00000001"), &weights).unwrap();
        assert_eq!(shares[&3], amt("0.00000001"));
        assert_eq!(shares[&7], Amount::ZERO);
    }

    #[test]
    fn test_split_zero_fee() {
        let weights: BTreeMap<u64, Amount> = [(1, amt("0.5"))].into();
        let shares = split_proportionally(Amount::ZERO, &weights).unwrap();
        assert_eq!(shares[&1], Amount::ZERO);
    }
}
