//! Transaction assembly and verification harness
//!
//! Drives one contract end to end: fund its locking script, build the
//! spending skeleton, attach the unlocking script, verify, and publish both
//! transactions only when the interpreter accepts the spend.

use crate::config::HarnessConfig;
use crate::constants::TX_VERSION;
use crate::contract::{sign_input, SpendTiming, SpendingContract};
use crate::error::{ContractError, Result};
use crate::interpreter::{verify_script, TransactionSignatureChecker};
use crate::keys::{KeyPair, KeyProvider, Secp256k1Provider};
use crate::ledger::LedgerClient;
use crate::opcodes::*;
use crate::script::{Builder, Script};
use crate::transaction::{check_transaction, txid};
use crate::types::*;

/// A funding transaction and the output in it that carries the locking script
#[derive(Debug, Clone)]
pub struct FundedOutput {
    pub funding: Transaction,
    pub outpoint: OutPoint,
    pub amount: i64,
    pub locking_script: Script,
}

#[derive(Debug, Clone)]
pub struct SpendReport {
    pub funding_txid: Hash,
    pub spending: Transaction,
    pub outcome: VerifyOutcome,
}

/// Harness bound to one ledger session; the session closes when the harness drops
pub struct ScriptHarness<L: LedgerClient> {
    ledger: L,
    provider: Secp256k1Provider,
    config: HarnessConfig,
}

impl<L: LedgerClient> ScriptHarness<L> {
    pub fn new(ledger: L, config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        Ok(ScriptHarness {
            ledger,
            provider: Secp256k1Provider::new(),
            config,
        })
    }

    pub fn provider(&self) -> &Secp256k1Provider {
        &self.provider
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn create_funding_output(&mut self, locking: &Script, amount: i64) -> Result<FundedOutput> {
        let funding = self.ledger.fund_output(locking, amount)?;
        let index = funding
            .outputs
            .iter()
            .position(|o| o.script_pubkey == locking.as_bytes() && o.value == amount)
            .ok_or_else(|| {
                ContractError::Ledger("funding transaction does not pay the locking script".to_string())
            })?;
        Ok(FundedOutput {
            outpoint: OutPoint {
                hash: txid(&funding),
                index: index as u32,
            },
            funding,
            amount,
            locking_script: locking.clone(),
        })
    }

    /// P2PKH script paying the ledger's current receive key
    pub fn receive_script(&self) -> Result<Script> {
        let key_hash = self.provider.public_key_hash(&self.ledger.current_receive_key())?;
        Ok(Builder::new()
            .push_opcode(OP_DUP)?
            .push_opcode(OP_HASH160)?
            .push_slice(&key_hash)?
            .push_opcode(OP_EQUALVERIFY)?
            .push_opcode(OP_CHECKSIG)?
            .into_script())
    }

    /// Unsigned one-input, one-output transaction spending `funded` to `destination`
    pub fn create_spending_skeleton(
        &self,
        funded: &FundedOutput,
        destination: &Script,
        timing: SpendTiming,
    ) -> Result<Transaction> {
        let value = funded.amount - self.config.fee;
        if value <= 0 {
            return Err(ContractError::InsufficientFunds {
                needed: self.config.fee + 1,
                available: funded.amount,
            });
        }

        let tx = Transaction {
            version: TX_VERSION,
            inputs: vec![TransactionInput {
                prevout: funded.outpoint,
                script_sig: Vec::new(),
                sequence: timing.sequence,
            }],
            outputs: vec![TransactionOutput {
                value,
                script_pubkey: destination.to_bytes(),
            }],
            lock_time: timing.lock_time,
        };
        check_transaction(&tx)?;
        Ok(tx)
    }

    /// Signature over input `input_index` of `tx`, DER encoded with the sighash byte
    pub fn sign(
        &self,
        tx: &Transaction,
        input_index: usize,
        key: &KeyPair,
        script_code: &Script,
    ) -> Result<Vec<u8>> {
        sign_input(&self.provider, key, tx, input_index, script_code)
    }

    /// Evaluate `unlocking` then `locking` against input `input_index` of `tx`.
    ///
    /// Script failures come back as [`VerifyOutcome::Rejected`]; `Err` is
    /// reserved for inputs that cannot be evaluated at all.
    pub fn verify(
        &self,
        unlocking: &Script,
        locking: &Script,
        tx: &Transaction,
        input_index: usize,
    ) -> Result<VerifyOutcome> {
        if input_index >= tx.inputs.len() {
            return Err(ContractError::Encoding(format!(
                "input index {} out of range for {} inputs",
                input_index,
                tx.inputs.len()
            )));
        }
        unlocking.instructions()?;
        locking.instructions()?;

        let checker = TransactionSignatureChecker::new(tx, input_index);
        let outcome = VerifyOutcome::from(verify_script(
            unlocking.as_bytes(),
            locking.as_bytes(),
            self.config.flags,
            &checker,
        ));
        match &outcome {
            VerifyOutcome::Accepted => log::debug!("input {} accepted", input_index),
            VerifyOutcome::Rejected(reason) => {
                log::debug!("input {} rejected: {}", input_index, reason)
            }
        }
        Ok(outcome)
    }

    /// Full flow for `contract` funded with `amount` sats
    pub fn execute(&mut self, contract: &dyn SpendingContract, amount: i64) -> Result<SpendReport> {
        let locking = contract.locking_script()?;
        log::info!("{}: locking {} sats to {}", contract.name(), amount, locking);

        let funded = self.create_funding_output(&locking, amount)?;
        let destination = self.receive_script()?;
        let mut spending = self.create_spending_skeleton(&funded, &destination, contract.timing())?;

        let unlocking = contract.unlocking_script(&self.provider, &spending, 0)?;
        spending.inputs[0].script_sig = unlocking.to_bytes();

        let outcome = self.verify(&unlocking, &locking, &spending, 0)?;
        let funding_txid = txid(&funded.funding);
        match &outcome {
            VerifyOutcome::Accepted => {
                self.ledger.broadcast(&funded.funding)?;
                self.ledger.broadcast(&spending)?;
                log::info!("{}: spend accepted and broadcast", contract.name());
            }
            VerifyOutcome::Rejected(reason) => {
                log::warn!("{}: spend rejected: {}", contract.name(), reason);
            }
        }

        Ok(SpendReport {
            funding_txid,
            spending,
            outcome,
        })
    }

    /// [`ScriptHarness::execute`] with the configured funding amount
    pub fn run(&mut self, contract: &dyn SpendingContract) -> Result<SpendReport> {
        let amount = self.config.funding_amount;
        self.execute(contract, amount)
    }
}

impl<L: LedgerClient> Drop for ScriptHarness<L> {
    fn drop(&mut self) {
        if let Err(e) = self.ledger.close() {
            log::warn!("failed to close ledger session: {}", e);
        }
    }
}
