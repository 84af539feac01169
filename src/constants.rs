//! Script and transaction constants

/// Maximum money supply: 21,000,000 BTC in satoshis
pub const MAX_MONEY: i64 = 21_000_000 * 100_000_000;

/// Satoshis per BTC
pub const SATOSHIS_PER_BTC: i64 = 100_000_000;

/// Maximum number of inputs per transaction
pub const MAX_INPUTS: usize = 1000;

/// Maximum number of outputs per transaction
pub const MAX_OUTPUTS: usize = 1000;

/// Maximum transaction size: 1MB
pub const MAX_TX_SIZE: usize = 1_000_000;

/// Maximum script length
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum size of a single pushed stack element
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum stack size during script execution (main + alt stack)
pub const MAX_STACK_SIZE: usize = 1000;

/// Maximum number of non-push operations in script
pub const MAX_SCRIPT_OPS: usize = 201;

/// Maximum number of public keys in a CHECKMULTISIG
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// Maximum byte length of a numeric operand
pub const MAX_NUM_SIZE: usize = 4;

/// Maximum byte length of a CHECKLOCKTIMEVERIFY operand
pub const LOCKTIME_NUM_SIZE: usize = 5;

/// Lock time threshold: transactions with lock time < this are block height
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Sequence number for final transaction
pub const SEQUENCE_FINAL: u32 = 0xffffffff;

/// Highest sequence number that still enables lock time enforcement
pub const SEQUENCE_LOCKTIME_ENABLED: u32 = 0xfffffffe;

/// Sign over all inputs and outputs
pub const SIGHASH_ALL: u8 = 0x01;

/// Transaction version used for spending skeletons
pub const TX_VERSION: i32 = 1;

/// Nonce length encoding coin toss choice "0"; choice "1" adds one byte
pub const COIN_TOSS_NONCE_LEN: usize = 16;

/// Arbitration branch maturity: 2014-10-01T00:00:00Z
pub const ARBITRATION_MATURITY: u32 = 1_412_121_600;

/// Fee subtracted from the funded amount by spending skeletons: 2 mBTC
pub const DEFAULT_FEE: i64 = 2 * SATOSHIS_PER_BTC / 1000;

/// Amount locked by default when executing a contract: 1 cBTC
pub const DEFAULT_FUNDING_AMOUNT: i64 = SATOSHIS_PER_BTC / 100;
