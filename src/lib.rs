//! # Script Contracts
//!
//! Bitcoin script spending contracts together with the interpreter and
//! transaction harness that prove they can (or cannot) be spent.
//!
//! ## Architecture
//!
//! The system follows a layered architecture:
//! - Script encoding (opcodes, script numbers, the [`script::Builder`])
//! - Transaction serialization and the legacy signature hash
//! - Interpreter (stack machine evaluating unlocking + locking scripts)
//! - Contracts (pay-to-key, pay-to-key-hash, coin toss, time-locked arbitration)
//! - Harness (funding, spending skeleton, verification, broadcast)
//!
//! ## Design Principles
//!
//! 1. **Bit-exact scripts**: Wire format and opcode numbering match Bitcoin
//! 2. **Explicit randomness**: Every key and nonce comes from an injected CSPRNG
//! 3. **Expected failure is data**: Rejected spends are a [`VerifyOutcome`], not an error
//! 4. **Scoped secrets**: Key scalars and nonces are erased when their owner drops
//!
//! ## Usage
//!
//! ```rust
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use script_contracts::contract::{CoinToss, CoinTossChoice, WinningPlayer};
//! use script_contracts::config::HarnessConfig;
//! use script_contracts::harness::ScriptHarness;
//! use script_contracts::keys::{KeyProvider, Secp256k1Provider};
//! use script_contracts::ledger::InMemoryLedger;
//!
//! let mut rng = StdRng::seed_from_u64(1);
//! let receive_key = Secp256k1Provider::new().generate_key_pair(&mut rng).public_key();
//! let ledger = InMemoryLedger::new(10_000_000, receive_key);
//! let mut harness = ScriptHarness::new(ledger, HarnessConfig::default()).unwrap();
//!
//! let toss = CoinToss::new(
//!     harness.provider(),
//!     &mut rng,
//!     CoinTossChoice::Zero,
//!     CoinTossChoice::Zero,
//!     WinningPlayer::Tail,
//! );
//! let report = harness.run(&toss).unwrap();
//! assert!(report.outcome.is_accepted());
//! ```

pub mod types;
pub mod constants;
pub mod opcodes;
pub mod scriptnum;
pub mod script;
pub mod hash;
pub mod transaction;
pub mod sighash;
pub mod keys;
pub mod interpreter;
pub mod contract;
pub mod ledger;
pub mod config;
pub mod harness;
pub mod error;

// Re-export commonly used types
pub use types::*;
pub use error::{ContractError, Result, ScriptFailure};
pub use script::{Builder, Script};
pub use contract::{Contract, SpendingContract};
pub use interpreter::ScriptFlags;
