//! Receive-address resolution.
//!
//! Wallets do not own addresses up front; the address pool crate keeps a
//! queue of unassigned addresses per currency and a wallet claims one the
//! first time it asks.

use custodia_db::traits::{LedgerDatabase, LedgerTxn};
use custodia_db::types::{AddressEntry, WalletId};
use tracing::*;

use crate::engine::Ledger;
use crate::errors::{LedgerError, LedgerResult};

impl<D: LedgerDatabase> Ledger<D> {
    /// Returns the wallet's receive address.
    ///
    /// Resolution order: the wallet's active address, then any address it
    /// owns, then an unassigned pool address which is claimed and marked
    /// active. `None` when the pool for the currency is empty.
    pub fn get_address(&self, wallet_id: WalletId) -> LedgerResult<Option<AddressEntry>> {
        self.db().with_txn(|txn| {
            let wallet = txn
                .wallet_for_update(wallet_id)?
                .ok_or(LedgerError::UnknownWallet(wallet_id))?;

            let owned = txn.wallet_addresses(wallet_id)?;
            if let Some(active) = owned.iter().find(|a| a.active) {
                return Ok(Some(active.clone()));
            }
            if let Some(any) = owned.into_iter().next() {
                return Ok(Some(any));
            }

            match txn.next_unassigned_address(&wallet.ticker)? {
                Some(mut entry) => {
                    entry.wallet = Some(wallet_id);
                    entry.active = true;
                    txn.update_address(&entry)?;
                    info!(address = %entry.address, wallet = %wallet_id, "address claimed");
                    Ok(Some(entry))
                }
                None => Ok(None),
            }
        })
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use custodia_db::types::CurrencyEntry;
    use custodia_db::MemDb;
    use custodia_primitives::Ticker;

    use super::*;

    fn btc() -> Ticker {
        Ticker::new("btc")
    }

    fn setup() -> (Ledger<MemDb>, WalletId) {
        let ledger = Ledger::new(Arc::new(MemDb::new()));
        ledger
            .upsert_currency(CurrencyEntry::new(btc(), "Bitcoin"))
            .unwrap();
        let wallet = ledger.create_wallet(&btc(), "test").unwrap();
        (ledger, wallet.id)
    }

    fn add_address(ledger: &Ledger<MemDb>, address: &str, wallet: Option<WalletId>, active: bool) {
        add_address_for(ledger, address, btc(), wallet, active)
    }

    fn add_address_for(
        ledger: &Ledger<MemDb>,
        address: &str,
        ticker: Ticker,
        wallet: Option<WalletId>,
        active: bool,
    ) {
        ledger
            .db()
            .with_txn(|txn| -> LedgerResult<_> {
                Ok(txn.insert_address(AddressEntry {
                    address: address.to_owned(),
                    ticker,
                    wallet,
                    active,
                })?)
            })
            .unwrap();
    }

    #[test]
    fn test_no_addresses() {
        let (ledger, wallet) = setup();
        assert_eq!(ledger.get_address(wallet).unwrap(), None);
    }

    #[test]
    fn test_active_address_preferred() {
        let (ledger, wallet) = setup();
        add_address(&ledger, "1111111111111111111114oLvT2", Some(wallet), true);
        add_address(
            &ledger,
            "1AGNa15ZQXAZUgFiqJ2i7Z2DPU2J6hW62i",
            Some(wallet),
            false,
        );

        let got = ledger.get_address(wallet).unwrap().unwrap();
        assert_eq!(got.address, "1111111111111111111114oLvT2");
    }

    #[test]
    fn test_owned_address_over_pool() {
        let (ledger, wallet) = setup();
        add_address(
            &ledger,
            "1Eym7pyJcaambv8FG4ZoU8A4xsiL9us2zz",
            Some(wallet),
            false,
        );
        // A pool address of another currency must never be handed out.
        let ltc = Ticker::new("ltc");
        ledger
            .upsert_currency(CurrencyEntry::new(ltc.clone(), "Litecoin"))
            .unwrap();
        add_address_for(&ledger, "LRNYxwQsHpm2A1VhawrJQti3nUkPN7vtq3", ltc, None, true);

        let got = ledger.get_address(wallet).unwrap().unwrap();
        assert_eq!(got.address, "1Eym7pyJcaambv8FG4ZoU8A4xsiL9us2zz");
    }

    #[test]
    fn test_pool_address_claimed_once() {
        let (ledger, wallet) = setup();
        add_address(&ledger, "1111111111111111111114oLvT2", None, false);

        let got = ledger.get_address(wallet).unwrap().unwrap();
        assert_eq!(got.wallet, Some(wallet));
        assert!(got.active);

        // The claim sticks; a second wallet gets nothing.
        let other = ledger.create_wallet(&btc(), "other").unwrap();
        assert_eq!(ledger.get_address(other.id).unwrap(), None);
        let again = ledger.get_address(wallet).unwrap().unwrap();
        assert_eq!(again.address, "1111111111111111111114oLvT2");
    }
}
