//! Ledger client
//!
//! The harness funds locking scripts and publishes accepted spends through a
//! [`LedgerClient`]. [`InMemoryLedger`] keeps everything in process: a spendable
//! balance, the funding outputs it created and a log of broadcast transactions.
//! Funding is only debited once the funding transaction is broadcast, so a
//! spend that is never published leaves the balance untouched.

use std::collections::{HashMap, HashSet};

use crate::constants::{SEQUENCE_FINAL, TX_VERSION};
use crate::error::{ContractError, Result};
use crate::script::Script;
use crate::transaction::{check_transaction, txid};
use crate::types::*;

/// Session with the ledger that funds and publishes transactions
pub trait LedgerClient {
    /// Build (but do not publish) a transaction paying `amount` to `locking`.
    /// The amount leaves the balance when this transaction is broadcast.
    fn fund_output(&mut self, locking: &Script, amount: i64) -> Result<Transaction>;

    /// Publish a transaction; returns its txid
    fn broadcast(&mut self, tx: &Transaction) -> Result<Hash>;

    /// Compressed public key that receives spent funds
    fn current_receive_key(&self) -> Vec<u8>;

    /// End the session. Further calls fail.
    fn close(&mut self) -> Result<()>;
}

impl<L: LedgerClient + ?Sized> LedgerClient for &mut L {
    fn fund_output(&mut self, locking: &Script, amount: i64) -> Result<Transaction> {
        (**self).fund_output(locking, amount)
    }

    fn broadcast(&mut self, tx: &Transaction) -> Result<Hash> {
        (**self).broadcast(tx)
    }

    fn current_receive_key(&self) -> Vec<u8> {
        (**self).current_receive_key()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

#[derive(Debug)]
pub struct InMemoryLedger {
    balance: i64,
    receive_key: Vec<u8>,
    funding_count: u32,
    /// Unpublished funding transactions by txid, with the amount they debit
    pending: HashMap<Hash, i64>,
    unspent: HashMap<OutPoint, TransactionOutput>,
    spent: HashSet<OutPoint>,
    broadcasts: Vec<Transaction>,
    closed: bool,
}

impl InMemoryLedger {
    pub fn new(balance: i64, receive_key: Vec<u8>) -> Self {
        InMemoryLedger {
            balance,
            receive_key,
            funding_count: 0,
            pending: HashMap::new(),
            unspent: HashMap::new(),
            spent: HashSet::new(),
            broadcasts: Vec::new(),
            closed: false,
        }
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn broadcasts(&self) -> &[Transaction] {
        &self.broadcasts
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Output still spendable at `outpoint`, if it was published by this ledger
    pub fn unspent_output(&self, outpoint: &OutPoint) -> Option<&TransactionOutput> {
        self.unspent.get(outpoint)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ContractError::Ledger("session is closed".to_string()));
        }
        Ok(())
    }
}

impl LedgerClient for InMemoryLedger {
    fn fund_output(&mut self, locking: &Script, amount: i64) -> Result<Transaction> {
        self.ensure_open()?;
        if amount <= 0 {
            return Err(ContractError::Ledger(format!("cannot fund {} sats", amount)));
        }
        if amount > self.balance {
            return Err(ContractError::InsufficientFunds {
                needed: amount,
                available: self.balance,
            });
        }

        // Each funding transaction spends a distinct synthetic outpoint so txids never collide
        self.funding_count += 1;
        let mut source = [0u8; 32];
        source[..4].copy_from_slice(&self.funding_count.to_le_bytes());

        let funding = Transaction {
            version: TX_VERSION,
            inputs: vec![TransactionInput {
                prevout: OutPoint { hash: source, index: 0 },
                script_sig: vec![],
                sequence: SEQUENCE_FINAL,
            }],
            outputs: vec![TransactionOutput {
                value: amount,
                script_pubkey: locking.to_bytes(),
            }],
            lock_time: 0,
        };
        check_transaction(&funding)?;

        self.pending.insert(txid(&funding), amount);
        log::debug!(
            "built funding of {} sats to {}, balance {}",
            amount,
            locking,
            self.balance
        );
        Ok(funding)
    }

    fn broadcast(&mut self, tx: &Transaction) -> Result<Hash> {
        self.ensure_open()?;
        check_transaction(tx)?;

        let id = txid(tx);
        let debit = self.pending.get(&id).copied().unwrap_or(0);
        if debit > self.balance {
            return Err(ContractError::InsufficientFunds {
                needed: debit,
                available: self.balance,
            });
        }
        for input in &tx.inputs {
            if self.spent.contains(&input.prevout) {
                return Err(ContractError::Ledger(format!(
                    "output {}:{} already spent",
                    hex::encode(input.prevout.hash),
                    input.prevout.index
                )));
            }
        }
        for input in &tx.inputs {
            self.unspent.remove(&input.prevout);
            self.spent.insert(input.prevout);
        }

        if self.pending.remove(&id).is_some() {
            self.balance -= debit;
            log::debug!("debited {} sats, balance {}", debit, self.balance);
        }
        for (index, output) in tx.outputs.iter().enumerate() {
            self.unspent.insert(
                OutPoint {
                    hash: id,
                    index: index as u32,
                },
                output.clone(),
            );
        }
        self.broadcasts.push(tx.clone());
        log::info!("broadcast transaction {}", hex::encode(id));
        Ok(id)
    }

    fn current_receive_key(&self) -> Vec<u8> {
        self.receive_key.clone()
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            log::debug!("closing ledger session after {} broadcasts", self.broadcasts.len());
            self.closed = true;
        }
        Ok(())
    }
}
