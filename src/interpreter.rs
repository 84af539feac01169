//! Script execution engine
//!
//! EvalScript: 𝒮𝒞 × 𝒮𝒯 × ℱ → {ok, failure}
//!
//! Script execution follows a stack-based virtual machine:
//! 1. Reject scripts larger than L_script
//! 2. For each instruction in script:
//!    - Data pushes larger than L_element fail
//!    - Opcodes above OP_16 count toward L_ops
//!    - Disabled opcodes fail even inside an unexecuted branch
//!    - Execute the instruction if every enclosing conditional is true
//!    - If |S| + |S_alt| > L_stack: fail
//! 3. Conditionals must be balanced at the end of the script
//!
//! VerifyScript runs the unlocking script and then the locking script on the
//! same stack, and accepts iff the top element is true afterwards.

use std::ops::{BitOr, BitOrAssign};

use ripemd::Ripemd160;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, Verification, VerifyOnly};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::*;
use crate::error::ScriptFailure;
use crate::hash::{hash160, sha256d};
use crate::opcodes::*;
use crate::script::{is_push_only, read_instruction, Builder, Instruction};
use crate::scriptnum::{self, cast_to_bool};
use crate::sighash::signature_hash;
use crate::types::*;

pub type EvalResult<T = ()> = std::result::Result<T, ScriptFailure>;

/// Verification flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptFlags(pub u32);

impl ScriptFlags {
    pub const NONE: ScriptFlags = ScriptFlags(0);
    /// Unlocking scripts may only push data
    pub const VERIFY_SIG_PUSH_ONLY: ScriptFlags = ScriptFlags(1 << 0);
    /// Enforce OP_CHECKLOCKTIMEVERIFY; otherwise it behaves as OP_NOP2
    pub const VERIFY_CHECKLOCKTIMEVERIFY: ScriptFlags = ScriptFlags(1 << 1);
    /// The extra element consumed by OP_CHECKMULTISIG must be empty
    pub const VERIFY_NULL_DUMMY: ScriptFlags = ScriptFlags(1 << 2);
    /// Numeric operands must be minimally encoded
    pub const VERIFY_MINIMAL_DATA: ScriptFlags = ScriptFlags(1 << 3);
    /// Exactly one element may remain after evaluation
    pub const VERIFY_CLEAN_STACK: ScriptFlags = ScriptFlags(1 << 4);

    pub const STANDARD: ScriptFlags = ScriptFlags(
        Self::VERIFY_SIG_PUSH_ONLY.0
            | Self::VERIFY_CHECKLOCKTIMEVERIFY.0
            | Self::VERIFY_NULL_DUMMY.0
            | Self::VERIFY_MINIMAL_DATA.0
            | Self::VERIFY_CLEAN_STACK.0,
    );

    pub fn has_flag(self, flag: ScriptFlags) -> bool {
        self.0 & flag.0 == flag.0
    }
}

impl BitOr for ScriptFlags {
    type Output = ScriptFlags;

    fn bitor(self, rhs: ScriptFlags) -> ScriptFlags {
        ScriptFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ScriptFlags {
    fn bitor_assign(&mut self, rhs: ScriptFlags) {
        self.0 |= rhs.0;
    }
}

/// Transaction-dependent checks needed by the signature and lock time opcodes
pub trait SignatureChecker {
    /// `signature` carries the trailing sighash byte; `script_code` is the
    /// executed script from the last OP_CODESEPARATOR with signatures removed
    fn check_sig(&self, signature: &[u8], public_key: &[u8], script_code: &[u8]) -> bool;

    /// CheckLockTime for a non-negative OP_CHECKLOCKTIMEVERIFY operand
    fn check_lock_time(&self, lock_time: i64) -> EvalResult;
}

/// Checker for evaluating scripts outside of any transaction
pub struct NoTransactionChecker;

impl SignatureChecker for NoTransactionChecker {
    fn check_sig(&self, _signature: &[u8], _public_key: &[u8], _script_code: &[u8]) -> bool {
        false
    }

    fn check_lock_time(&self, _lock_time: i64) -> EvalResult {
        Err(ScriptFailure::MissingContext("OP_CHECKLOCKTIMEVERIFY"))
    }
}

/// Checks signatures and lock times against one input of a transaction
pub struct TransactionSignatureChecker<'a> {
    tx: &'a Transaction,
    input_index: usize,
    secp: Secp256k1<VerifyOnly>,
}

impl<'a> TransactionSignatureChecker<'a> {
    pub fn new(tx: &'a Transaction, input_index: usize) -> Self {
        TransactionSignatureChecker {
            tx,
            input_index,
            secp: Secp256k1::verification_only(),
        }
    }
}

impl SignatureChecker for TransactionSignatureChecker<'_> {
    fn check_sig(&self, signature: &[u8], public_key: &[u8], script_code: &[u8]) -> bool {
        let (sighash_type, der) = match signature.split_last() {
            Some((sighash_type, der)) => (*sighash_type, der),
            None => return false,
        };
        let digest = match signature_hash(self.tx, self.input_index, script_code, sighash_type) {
            Ok(digest) => digest,
            Err(_) => return false,
        };
        verify_signature(&self.secp, public_key, der, &digest)
    }

    /// CheckLockTime: the operand and nLockTime must be the same kind (height
    /// or timestamp), the operand must not exceed nLockTime, and the input
    /// must not be final
    fn check_lock_time(&self, lock_time: i64) -> EvalResult {
        let tx_lock_time = self.tx.lock_time as i64;
        let threshold = LOCKTIME_THRESHOLD as i64;

        if (tx_lock_time < threshold) != (lock_time < threshold) {
            return Err(ScriptFailure::UnsatisfiedLockTime(format!(
                "lock time {} and transaction lock time {} are of different kinds",
                lock_time, tx_lock_time
            )));
        }
        if lock_time > tx_lock_time {
            return Err(ScriptFailure::UnsatisfiedLockTime(format!(
                "lock time {} not yet reached by transaction lock time {}",
                lock_time, tx_lock_time
            )));
        }

        let input = self
            .tx
            .inputs
            .get(self.input_index)
            .ok_or(ScriptFailure::MissingContext("spending input"))?;
        if input.sequence == SEQUENCE_FINAL {
            return Err(ScriptFailure::UnsatisfiedLockTime(
                "input sequence is final".to_string(),
            ));
        }
        Ok(())
    }
}

/// Verify a DER signature over `digest`, accepting high-S encodings
fn verify_signature<C: Verification>(
    secp: &Secp256k1<C>,
    pubkey_bytes: &[u8],
    signature_bytes: &[u8],
    digest: &Hash,
) -> bool {
    let pubkey = match PublicKey::from_slice(pubkey_bytes) {
        Ok(pk) => pk,
        Err(_) => return false,
    };

    let mut signature = match Signature::from_der(signature_bytes) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    signature.normalize_s();

    let message = match Message::from_digest_slice(digest) {
        Ok(msg) => msg,
        Err(_) => return false,
    };

    secp.verify_ecdsa(&message, &signature, &pubkey).is_ok()
}

struct ExecContext<'a> {
    script: &'a [u8],
    /// Offset just past the last executed OP_CODESEPARATOR
    code_start: usize,
    /// Offset just past the instruction being executed
    pc: usize,
    alt_stack: Vec<ByteString>,
    exec_stack: Vec<bool>,
    op_count: usize,
    flags: ScriptFlags,
    checker: &'a dyn SignatureChecker,
}

impl ExecContext<'_> {
    fn executing(&self) -> bool {
        self.exec_stack.iter().all(|branch| *branch)
    }

    fn require_minimal(&self) -> bool {
        self.flags.has_flag(ScriptFlags::VERIFY_MINIMAL_DATA)
    }

    fn count_ops(&mut self, n: usize) -> EvalResult {
        self.op_count += n;
        if self.op_count > MAX_SCRIPT_OPS {
            return Err(ScriptFailure::OpCount);
        }
        Ok(())
    }
}

/// EvalScript: run `script` against `stack`
pub fn eval_script(
    script: &[u8],
    stack: &mut Vec<ByteString>,
    flags: ScriptFlags,
    checker: &dyn SignatureChecker,
) -> EvalResult {
    if script.len() > MAX_SCRIPT_SIZE {
        return Err(ScriptFailure::ScriptSize(script.len()));
    }

    let mut ctx = ExecContext {
        script,
        code_start: 0,
        pc: 0,
        alt_stack: Vec::new(),
        exec_stack: Vec::new(),
        op_count: 0,
        flags,
        checker,
    };

    while ctx.pc < script.len() {
        let executing = ctx.executing();
        let (instruction, next) =
            read_instruction(script, ctx.pc).map_err(|_| ScriptFailure::Truncated)?;
        ctx.pc = next;

        match instruction {
            Instruction::Push(data) => {
                if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
                    return Err(ScriptFailure::PushSize(data.len()));
                }
                if executing {
                    stack.push(data);
                }
            }
            Instruction::Op(op) => {
                if op > OP_16 {
                    ctx.count_ops(1)?;
                }
                if is_disabled(op) {
                    return Err(ScriptFailure::DisabledOpcode(op));
                }
                if executing || (OP_IF..=OP_ENDIF).contains(&op) {
                    execute_opcode(op, stack, &mut ctx)?;
                }
            }
        }

        if stack.len() + ctx.alt_stack.len() > MAX_STACK_SIZE {
            return Err(ScriptFailure::StackSize);
        }
    }

    if !ctx.exec_stack.is_empty() {
        return Err(ScriptFailure::UnbalancedConditional);
    }
    Ok(())
}

/// VerifyScript: 𝒮𝒞 × 𝒮𝒞 × ℱ → {ok, failure}
///
/// For scriptSig ss, scriptPubKey spk, and flags f:
/// 1. If f requires it, ss must be push-only
/// 2. Execute ss on an empty stack
/// 3. Execute spk on the resulting stack
/// 4. The top element must be true; with CLEANSTACK it must also be the only one
pub fn verify_script(
    script_sig: &[u8],
    script_pubkey: &[u8],
    flags: ScriptFlags,
    checker: &dyn SignatureChecker,
) -> EvalResult {
    if flags.has_flag(ScriptFlags::VERIFY_SIG_PUSH_ONLY) && !is_push_only(script_sig) {
        return Err(ScriptFailure::PushOnly);
    }

    let mut stack = Vec::new();
    eval_script(script_sig, &mut stack, flags, checker)?;
    eval_script(script_pubkey, &mut stack, flags, checker)?;

    match stack.last() {
        Some(top) if cast_to_bool(top) => {}
        _ => return Err(ScriptFailure::EvalFalse),
    }
    if flags.has_flag(ScriptFlags::VERIFY_CLEAN_STACK) && stack.len() != 1 {
        return Err(ScriptFailure::CleanStack(stack.len()));
    }
    Ok(())
}

/// Verify input `input_index` of `tx` against the locking script it spends
pub fn verify_input(
    tx: &Transaction,
    input_index: usize,
    script_pubkey: &[u8],
    flags: ScriptFlags,
) -> EvalResult {
    let input = tx
        .inputs
        .get(input_index)
        .ok_or(ScriptFailure::MissingContext("spending input"))?;
    let checker = TransactionSignatureChecker::new(tx, input_index);
    verify_script(&input.script_sig, script_pubkey, flags, &checker)
}

fn pop(stack: &mut Vec<ByteString>, op: u8) -> EvalResult<ByteString> {
    stack.pop().ok_or(ScriptFailure::StackUnderflow(op))
}

fn require(stack: &[ByteString], n: usize, op: u8) -> EvalResult {
    if stack.len() < n {
        return Err(ScriptFailure::StackUnderflow(op));
    }
    Ok(())
}

/// Element `depth` positions from the top (1 = top)
fn peek(stack: &[ByteString], depth: usize) -> &ByteString {
    &stack[stack.len() - depth]
}

fn pop_num(stack: &mut Vec<ByteString>, op: u8, ctx: &ExecContext) -> EvalResult<i64> {
    let item = pop(stack, op)?;
    scriptnum::decode(&item, MAX_NUM_SIZE, ctx.require_minimal())
}

fn push_bool(stack: &mut Vec<ByteString>, value: bool) {
    stack.push(if value { vec![1] } else { vec![] });
}

/// Execute a single opcode
fn execute_opcode(op: u8, stack: &mut Vec<ByteString>, ctx: &mut ExecContext) -> EvalResult {
    match op {
        // OP_1NEGATE, OP_1 to OP_16 - push small numbers
        OP_1NEGATE | OP_1..=OP_16 => {
            stack.push(scriptnum::encode(op as i64 - OP_RESERVED as i64));
        }

        OP_NOP | OP_NOP1 | OP_CHECKSEQUENCEVERIFY..=OP_NOP10 => {}

        OP_CHECKLOCKTIMEVERIFY => {
            if !ctx.flags.has_flag(ScriptFlags::VERIFY_CHECKLOCKTIMEVERIFY) {
                return Ok(());
            }
            // The operand stays on the stack; five bytes reach past 2^31
            let top = stack.last().ok_or(ScriptFailure::StackUnderflow(op))?;
            let lock_time = scriptnum::decode(top, LOCKTIME_NUM_SIZE, ctx.require_minimal())?;
            if lock_time < 0 {
                return Err(ScriptFailure::NegativeLockTime(lock_time));
            }
            ctx.checker.check_lock_time(lock_time)?;
        }

        OP_IF | OP_NOTIF => {
            let mut value = false;
            if ctx.executing() {
                let top = pop(stack, op).map_err(|_| ScriptFailure::UnbalancedConditional)?;
                value = cast_to_bool(&top) != (op == OP_NOTIF);
            }
            ctx.exec_stack.push(value);
        }
        OP_ELSE => {
            let branch = ctx
                .exec_stack
                .last_mut()
                .ok_or(ScriptFailure::UnbalancedConditional)?;
            *branch = !*branch;
        }
        OP_ENDIF => {
            ctx.exec_stack
                .pop()
                .ok_or(ScriptFailure::UnbalancedConditional)?;
        }

        OP_VERIFY => {
            let top = pop(stack, op)?;
            if !cast_to_bool(&top) {
                return Err(ScriptFailure::Verify);
            }
        }
        OP_RETURN => return Err(ScriptFailure::OpReturn),

        // Stack operations
        OP_TOALTSTACK => {
            let item = pop(stack, op)?;
            ctx.alt_stack.push(item);
        }
        OP_FROMALTSTACK => {
            let item = ctx
                .alt_stack
                .pop()
                .ok_or(ScriptFailure::StackUnderflow(op))?;
            stack.push(item);
        }
        OP_2DROP => {
            require(stack, 2, op)?;
            stack.truncate(stack.len() - 2);
        }
        OP_2DUP => {
            require(stack, 2, op)?;
            let (a, b) = (peek(stack, 2).clone(), peek(stack, 1).clone());
            stack.push(a);
            stack.push(b);
        }
        OP_3DUP => {
            require(stack, 3, op)?;
            let n = stack.len();
            let items: Vec<ByteString> = stack[n - 3..].to_vec();
            stack.extend(items);
        }
        OP_2OVER => {
            require(stack, 4, op)?;
            let (a, b) = (peek(stack, 4).clone(), peek(stack, 3).clone());
            stack.push(a);
            stack.push(b);
        }
        OP_2ROT => {
            require(stack, 6, op)?;
            let n = stack.len();
            let pair: Vec<ByteString> = stack.drain(n - 6..n - 4).collect();
            stack.extend(pair);
        }
        OP_2SWAP => {
            require(stack, 4, op)?;
            let n = stack.len();
            stack.swap(n - 4, n - 2);
            stack.swap(n - 3, n - 1);
        }
        OP_IFDUP => {
            let top = stack.last().cloned().ok_or(ScriptFailure::StackUnderflow(op))?;
            if cast_to_bool(&top) {
                stack.push(top);
            }
        }
        OP_DEPTH => {
            let depth = stack.len() as i64;
            stack.push(scriptnum::encode(depth));
        }
        OP_DROP => {
            pop(stack, op)?;
        }
        OP_DUP => {
            let top = stack.last().cloned().ok_or(ScriptFailure::StackUnderflow(op))?;
            stack.push(top);
        }
        OP_NIP => {
            require(stack, 2, op)?;
            let n = stack.len();
            stack.remove(n - 2);
        }
        OP_OVER => {
            require(stack, 2, op)?;
            let item = peek(stack, 2).clone();
            stack.push(item);
        }
        OP_PICK | OP_ROLL => {
            let depth = pop_num(stack, op, ctx)?;
            if depth < 0 || depth as usize >= stack.len() {
                return Err(ScriptFailure::StackUnderflow(op));
            }
            let index = stack.len() - 1 - depth as usize;
            let item = if op == OP_ROLL {
                stack.remove(index)
            } else {
                stack[index].clone()
            };
            stack.push(item);
        }
        OP_ROT => {
            require(stack, 3, op)?;
            let n = stack.len();
            let item = stack.remove(n - 3);
            stack.push(item);
        }
        OP_SWAP => {
            require(stack, 2, op)?;
            let n = stack.len();
            stack.swap(n - 2, n - 1);
        }
        OP_TUCK => {
            require(stack, 2, op)?;
            let n = stack.len();
            let top = stack[n - 1].clone();
            stack.insert(n - 2, top);
        }

        OP_SIZE => {
            let len = stack.last().ok_or(ScriptFailure::StackUnderflow(op))?.len();
            stack.push(scriptnum::encode(len as i64));
        }

        OP_EQUAL | OP_EQUALVERIFY => {
            require(stack, 2, op)?;
            let a = pop(stack, op)?;
            let b = pop(stack, op)?;
            if op == OP_EQUALVERIFY {
                if a != b {
                    return Err(ScriptFailure::EqualVerify);
                }
            } else {
                push_bool(stack, a == b);
            }
        }

        // Unary arithmetic
        OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => {
            let a = pop_num(stack, op, ctx)?;
            let result = match op {
                OP_1ADD => a + 1,
                OP_1SUB => a - 1,
                OP_NEGATE => -a,
                OP_ABS => a.abs(),
                OP_NOT => (a == 0) as i64,
                _ => (a != 0) as i64,
            };
            stack.push(scriptnum::encode(result));
        }

        // Binary arithmetic
        OP_ADD
        | OP_SUB
        | OP_BOOLAND
        | OP_BOOLOR
        | OP_NUMEQUAL
        | OP_NUMEQUALVERIFY
        | OP_NUMNOTEQUAL
        | OP_LESSTHAN
        | OP_GREATERTHAN
        | OP_LESSTHANOREQUAL
        | OP_GREATERTHANOREQUAL
        | OP_MIN
        | OP_MAX => {
            require(stack, 2, op)?;
            let b = pop_num(stack, op, ctx)?;
            let a = pop_num(stack, op, ctx)?;
            let result = match op {
                OP_ADD => a + b,
                OP_SUB => a - b,
                OP_BOOLAND => (a != 0 && b != 0) as i64,
                OP_BOOLOR => (a != 0 || b != 0) as i64,
                OP_NUMEQUAL | OP_NUMEQUALVERIFY => (a == b) as i64,
                OP_NUMNOTEQUAL => (a != b) as i64,
                OP_LESSTHAN => (a < b) as i64,
                OP_GREATERTHAN => (a > b) as i64,
                OP_LESSTHANOREQUAL => (a <= b) as i64,
                OP_GREATERTHANOREQUAL => (a >= b) as i64,
                OP_MIN => a.min(b),
                _ => a.max(b),
            };
            if op == OP_NUMEQUALVERIFY {
                if result == 0 {
                    return Err(ScriptFailure::NumEqualVerify);
                }
            } else {
                stack.push(scriptnum::encode(result));
            }
        }
        OP_WITHIN => {
            require(stack, 3, op)?;
            let max = pop_num(stack, op, ctx)?;
            let min = pop_num(stack, op, ctx)?;
            let x = pop_num(stack, op, ctx)?;
            push_bool(stack, min <= x && x < max);
        }

        // Crypto
        OP_RIPEMD160 | OP_SHA256 | OP_HASH160 | OP_HASH256 => {
            let item = pop(stack, op)?;
            let digest = match op {
                OP_RIPEMD160 => Ripemd160::digest(&item).to_vec(),
                OP_SHA256 => Sha256::digest(&item).to_vec(),
                OP_HASH160 => hash160(&item).to_vec(),
                _ => sha256d(&item).to_vec(),
            };
            stack.push(digest);
        }
        OP_CODESEPARATOR => {
            ctx.code_start = ctx.pc;
        }
        OP_CHECKSIG | OP_CHECKSIGVERIFY => {
            require(stack, 2, op)?;
            let pubkey = pop(stack, op)?;
            let signature = pop(stack, op)?;
            let script_code = remove_signature(&ctx.script[ctx.code_start..], &signature);
            let valid =
                !signature.is_empty() && ctx.checker.check_sig(&signature, &pubkey, &script_code);
            if op == OP_CHECKSIGVERIFY {
                if !valid {
                    return Err(ScriptFailure::CheckSigVerify);
                }
            } else {
                push_bool(stack, valid);
            }
        }
        OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
            let valid = check_multisig(stack, ctx, op)?;
            if op == OP_CHECKMULTISIGVERIFY {
                if !valid {
                    return Err(ScriptFailure::CheckMultiSigVerify);
                }
            } else {
                push_bool(stack, valid);
            }
        }

        // OP_RESERVED*, OP_VER, OP_VERIF, OP_VERNOTIF, OP_SHA1 and undefined bytes
        _ => return Err(ScriptFailure::BadOpcode(op)),
    }
    Ok(())
}

/// OP_CHECKMULTISIG: `<dummy> <sig_1..sig_m> m <key_1..key_n> n`
///
/// Signatures are matched against keys in order; a key that does not match
/// the current signature is skipped and never reconsidered.
fn check_multisig(stack: &mut Vec<ByteString>, ctx: &mut ExecContext, op: u8) -> EvalResult<bool> {
    let mut i = 1;
    require(stack, i, op)?;
    let key_count = scriptnum::decode(peek(stack, i), MAX_NUM_SIZE, ctx.require_minimal())?;
    if key_count < 0 || key_count > MAX_PUBKEYS_PER_MULTISIG as i64 {
        return Err(ScriptFailure::PubKeyCount(key_count));
    }
    let mut keys_left = key_count as usize;
    ctx.count_ops(keys_left)?;

    i += 1;
    let mut key_depth = i;
    i += keys_left;
    require(stack, i, op)?;
    let sig_count = scriptnum::decode(peek(stack, i), MAX_NUM_SIZE, ctx.require_minimal())?;
    if sig_count < 0 || sig_count > key_count {
        return Err(ScriptFailure::SigCount(sig_count));
    }
    let mut sigs_left = sig_count as usize;

    i += 1;
    let mut sig_depth = i;
    i += sigs_left;
    // i now points at the dummy element
    require(stack, i, op)?;

    let mut script_code = ctx.script[ctx.code_start..].to_vec();
    for k in 0..sigs_left {
        script_code = remove_signature(&script_code, peek(stack, sig_depth + k));
    }

    let mut success = true;
    while success && sigs_left > 0 {
        let signature = peek(stack, sig_depth);
        let pubkey = peek(stack, key_depth);
        if !signature.is_empty() && ctx.checker.check_sig(signature, pubkey, &script_code) {
            sig_depth += 1;
            sigs_left -= 1;
        }
        key_depth += 1;
        keys_left -= 1;
        if sigs_left > keys_left {
            success = false;
        }
    }

    stack.truncate(stack.len() - (i - 1));
    let dummy = pop(stack, op)?;
    if ctx.flags.has_flag(ScriptFlags::VERIFY_NULL_DUMMY) && !dummy.is_empty() {
        return Err(ScriptFailure::NullDummy);
    }
    Ok(success)
}

/// FindAndDelete: drop every push of `signature` from `script_code`
fn remove_signature(script_code: &[u8], signature: &[u8]) -> Vec<u8> {
    if signature.is_empty() {
        return script_code.to_vec();
    }
    let pattern = match Builder::new().push_slice(signature) {
        Ok(builder) => builder.into_script().into_bytes(),
        Err(_) => return script_code.to_vec(),
    };

    let mut out = Vec::with_capacity(script_code.len());
    let mut pos = 0;
    while pos < script_code.len() {
        let next = match read_instruction(script_code, pos) {
            Ok((_, next)) => next,
            Err(_) => {
                out.extend_from_slice(&script_code[pos..]);
                break;
            }
        };
        if script_code[pos..next] != pattern[..] {
            out.extend_from_slice(&script_code[pos..next]);
        }
        pos = next;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyPair, KeyProvider, Secp256k1Provider};
    use crate::script::Script;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn eval(script: &[u8]) -> (EvalResult, Vec<ByteString>) {
        let mut stack = Vec::new();
        let result = eval_script(script, &mut stack, ScriptFlags::STANDARD, &NoTransactionChecker);
        (result, stack)
    }

    fn verify(script_sig: &[u8], script_pubkey: &[u8]) -> EvalResult {
        verify_script(script_sig, script_pubkey, ScriptFlags::STANDARD, &NoTransactionChecker)
    }

    fn create_test_transaction(lock_time: u32, sequence: u32) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TransactionInput {
                prevout: OutPoint { hash: [7; 32], index: 0 },
                script_sig: vec![],
                sequence,
            }],
            outputs: vec![TransactionOutput {
                value: 800_000,
                script_pubkey: vec![OP_1],
            }],
            lock_time,
        }
    }

    fn sign(provider: &Secp256k1Provider, key: &KeyPair, tx: &Transaction, code: &[u8]) -> Vec<u8> {
        let digest = signature_hash(tx, 0, code, SIGHASH_ALL).unwrap();
        let mut sig = provider.sign(&digest, key).unwrap();
        sig.push(SIGHASH_ALL);
        sig
    }

    #[test]
    fn test_eval_script_simple() {
        let (result, stack) = eval(&[OP_1]);
        assert!(result.is_ok());
        assert_eq!(stack, vec![vec![1]]);
    }

    #[test]
    fn test_eval_script_overflow() {
        let script = vec![OP_1; MAX_STACK_SIZE + 1];
        let (result, _) = eval(&script);
        assert_eq!(result, Err(ScriptFailure::StackSize));
    }

    #[test]
    fn test_verify_script_simple() {
        // OP_EQUALVERIFY consumes both values and leaves nothing behind
        assert_eq!(verify(&[OP_1], &[OP_DUP, OP_EQUALVERIFY]), Err(ScriptFailure::EvalFalse));
        assert!(verify(&[OP_1], &[OP_DUP, OP_EQUAL]).is_ok());
    }

    #[test]
    fn test_op_0() {
        let (result, stack) = eval(&[OP_0]);
        assert!(result.is_ok());
        assert_eq!(stack.len(), 1);
        assert!(stack[0].is_empty());
        assert_eq!(verify(&[], &[OP_0]), Err(ScriptFailure::EvalFalse));
    }

    #[test]
    fn test_op_1_to_op_16() {
        for i in 1..=16u8 {
            let (result, stack) = eval(&[OP_RESERVED + i]);
            assert!(result.is_ok());
            assert_eq!(stack, vec![vec![i]]);
        }
        let (_, stack) = eval(&[OP_1NEGATE]);
        assert_eq!(stack, vec![vec![0x81]]);
    }

    #[test]
    fn test_op_dup_empty_stack() {
        let (result, _) = eval(&[OP_DUP]);
        assert_eq!(result, Err(ScriptFailure::StackUnderflow(OP_DUP)));
    }

    #[test]
    fn test_op_hash160() {
        let (result, stack) = eval(&[OP_0, OP_HASH160]);
        assert!(result.is_ok());
        assert_eq!(hex::encode(&stack[0]), "b472a266d0bd89c13706a4132ccfb16f7c3b9fcb");
    }

    #[test]
    fn test_op_hash256_and_sha256() {
        let (_, stack) = eval(&[OP_0, OP_DUP, OP_SHA256, OP_SWAP, OP_HASH256]);
        assert_eq!(
            hex::encode(&stack[0]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            hex::encode(&stack[1]),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn test_op_equal() {
        let (_, stack) = eval(&[OP_1, OP_1, OP_EQUAL]);
        assert_eq!(stack, vec![vec![1]]);
        let (_, stack) = eval(&[OP_1, OP_2, OP_EQUAL]);
        assert_eq!(stack, vec![Vec::<u8>::new()]);
        let (result, _) = eval(&[OP_1, OP_EQUAL]);
        assert_eq!(result, Err(ScriptFailure::StackUnderflow(OP_EQUAL)));
    }

    #[test]
    fn test_op_equalverify_false() {
        let (result, _) = eval(&[OP_1, OP_2, OP_EQUALVERIFY]);
        assert_eq!(result, Err(ScriptFailure::EqualVerify));
    }

    #[test]
    fn test_op_verify() {
        assert!(eval(&[OP_1, OP_VERIFY]).0.is_ok());
        assert_eq!(eval(&[OP_0, OP_VERIFY]).0, Err(ScriptFailure::Verify));
        assert_eq!(eval(&[OP_VERIFY]).0, Err(ScriptFailure::StackUnderflow(OP_VERIFY)));
    }

    #[test]
    fn test_unknown_opcode() {
        assert_eq!(eval(&[0xba]).0, Err(ScriptFailure::BadOpcode(0xba)));
        assert_eq!(eval(&[OP_SHA1]).0, Err(ScriptFailure::BadOpcode(OP_SHA1)));
        assert_eq!(eval(&[OP_RETURN]).0, Err(ScriptFailure::OpReturn));
    }

    #[test]
    fn test_disabled_opcode_in_unexecuted_branch() {
        let (result, _) = eval(&[OP_0, OP_IF, OP_CAT, OP_ENDIF]);
        assert_eq!(result, Err(ScriptFailure::DisabledOpcode(OP_CAT)));
        // Reserved opcodes only fail when executed
        assert!(eval(&[OP_0, OP_IF, OP_RESERVED, OP_ENDIF]).0.is_ok());
    }

    #[test]
    fn test_script_size_limit() {
        let script = vec![OP_NOP; MAX_SCRIPT_SIZE + 1];
        assert_eq!(eval(&script).0, Err(ScriptFailure::ScriptSize(MAX_SCRIPT_SIZE + 1)));
    }

    #[test]
    fn test_operation_count_limit() {
        assert!(eval(&vec![OP_NOP; MAX_SCRIPT_OPS]).0.is_ok());
        assert_eq!(eval(&vec![OP_NOP; MAX_SCRIPT_OPS + 1]).0, Err(ScriptFailure::OpCount));
        // Pushes are free
        assert!(eval(&vec![OP_1; MAX_SCRIPT_OPS + 1]).0.is_ok());
    }

    #[test]
    fn test_push_size_limit() {
        let mut script = vec![OP_PUSHDATA2, 0x09, 0x02];
        script.extend(vec![0u8; 521]);
        assert_eq!(eval(&script).0, Err(ScriptFailure::PushSize(521)));
    }

    #[test]
    fn test_truncated_push() {
        assert_eq!(eval(&[0x05, 0x01]).0, Err(ScriptFailure::Truncated));
    }

    #[test]
    fn test_conditionals() {
        let (_, stack) = eval(&[OP_1, OP_IF, OP_2, OP_ELSE, OP_3, OP_ENDIF]);
        assert_eq!(stack, vec![vec![2]]);
        let (_, stack) = eval(&[OP_0, OP_IF, OP_2, OP_ELSE, OP_3, OP_ENDIF]);
        assert_eq!(stack, vec![vec![3]]);
        let (_, stack) = eval(&[OP_0, OP_NOTIF, OP_2, OP_ELSE, OP_3, OP_ENDIF]);
        assert_eq!(stack, vec![vec![2]]);
        // Nested inside an unexecuted branch nothing runs
        let (_, stack) = eval(&[OP_0, OP_IF, OP_1, OP_IF, OP_2, OP_ENDIF, OP_ENDIF]);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_unbalanced_conditionals() {
        assert_eq!(eval(&[OP_1, OP_IF]).0, Err(ScriptFailure::UnbalancedConditional));
        assert_eq!(eval(&[OP_ELSE]).0, Err(ScriptFailure::UnbalancedConditional));
        assert_eq!(eval(&[OP_ENDIF]).0, Err(ScriptFailure::UnbalancedConditional));
        assert_eq!(eval(&[OP_IF, OP_ENDIF]).0, Err(ScriptFailure::UnbalancedConditional));
    }

    #[test]
    fn test_stack_manipulation() {
        let (_, stack) = eval(&[OP_1, OP_2, OP_SWAP]);
        assert_eq!(stack, vec![vec![2], vec![1]]);
        let (_, stack) = eval(&[OP_1, OP_2, OP_NIP]);
        assert_eq!(stack, vec![vec![2]]);
        let (_, stack) = eval(&[OP_1, OP_2, OP_3, OP_ROT]);
        assert_eq!(stack, vec![vec![2], vec![3], vec![1]]);
        let (_, stack) = eval(&[OP_1, OP_2, OP_TUCK]);
        assert_eq!(stack, vec![vec![2], vec![1], vec![2]]);
        let (_, stack) = eval(&[OP_1, OP_2, OP_OVER]);
        assert_eq!(stack, vec![vec![1], vec![2], vec![1]]);
        let (_, stack) = eval(&[OP_1, OP_2, OP_3, OP_2, OP_PICK]);
        assert_eq!(stack, vec![vec![1], vec![2], vec![3], vec![1]]);
        let (_, stack) = eval(&[OP_1, OP_2, OP_3, OP_2, OP_ROLL]);
        assert_eq!(stack, vec![vec![2], vec![3], vec![1]]);
        let (_, stack) = eval(&[OP_1, OP_2, OP_2DUP, OP_DEPTH]);
        assert_eq!(stack, vec![vec![1], vec![2], vec![1], vec![2], vec![4]]);
        let (_, stack) = eval(&[OP_1, OP_TOALTSTACK, OP_2, OP_FROMALTSTACK]);
        assert_eq!(stack, vec![vec![2], vec![1]]);
        let (_, stack) = eval(&[OP_1, OP_2, OP_3, OP_16, OP_2SWAP]);
        assert_eq!(stack, vec![vec![3], vec![16], vec![1], vec![2]]);
    }

    #[test]
    fn test_op_size() {
        let script = Builder::new()
            .push_slice(&[0xaa; 17])
            .unwrap()
            .push_opcode(OP_SIZE)
            .unwrap()
            .into_script();
        let (_, stack) = eval(script.as_bytes());
        assert_eq!(stack[1], vec![17]);
    }

    #[test]
    fn test_arithmetic() {
        let (_, stack) = eval(&[OP_2, OP_3, OP_ADD]);
        assert_eq!(stack, vec![vec![5]]);
        let (_, stack) = eval(&[OP_2, OP_3, OP_SUB]);
        assert_eq!(stack, vec![vec![0x81]]);
        let (_, stack) = eval(&[OP_2, OP_3, OP_NUMNOTEQUAL]);
        assert_eq!(stack, vec![vec![1]]);
        let (_, stack) = eval(&[OP_0, OP_0, OP_BOOLOR]);
        assert_eq!(stack, vec![Vec::<u8>::new()]);
        let (_, stack) = eval(&[OP_0, OP_1, OP_BOOLOR]);
        assert_eq!(stack, vec![vec![1]]);
        let (_, stack) = eval(&[OP_2, OP_1, OP_3, OP_WITHIN]);
        assert_eq!(stack, vec![vec![1]]);
        assert_eq!(eval(&[OP_1, OP_2, OP_NUMEQUALVERIFY]).0, Err(ScriptFailure::NumEqualVerify));
    }

    #[test]
    fn test_arithmetic_operand_limits() {
        // Five-byte operands overflow the arithmetic range
        let script = [0x05, 1, 2, 3, 4, 5, OP_1ADD];
        assert_eq!(eval(&script).0, Err(ScriptFailure::NumberOverflow(5)));
        // Non-minimal zero
        let script = [0x01, 0x00, OP_1ADD];
        assert_eq!(eval(&script).0, Err(ScriptFailure::NonMinimalNumber));
        let mut stack = Vec::new();
        assert!(eval_script(&script, &mut stack, ScriptFlags::NONE, &NoTransactionChecker).is_ok());
        assert_eq!(stack, vec![vec![1]]);
    }

    #[test]
    fn test_clean_stack_and_push_only() {
        assert_eq!(verify(&[OP_1, OP_1], &[OP_NOP]), Err(ScriptFailure::CleanStack(2)));
        assert_eq!(verify(&[OP_1, OP_DUP], &[OP_NOP]), Err(ScriptFailure::PushOnly));
        let relaxed = verify_script(&[OP_1, OP_DUP], &[OP_NOP], ScriptFlags::NONE, &NoTransactionChecker);
        assert!(relaxed.is_ok());
    }

    #[test]
    fn test_cltv_without_context() {
        let script = [OP_1, OP_CHECKLOCKTIMEVERIFY];
        assert_eq!(
            eval(&script).0,
            Err(ScriptFailure::MissingContext("OP_CHECKLOCKTIMEVERIFY"))
        );
        // Without the flag it is OP_NOP2
        let mut stack = Vec::new();
        assert!(eval_script(&script, &mut stack, ScriptFlags::NONE, &NoTransactionChecker).is_ok());
        assert_eq!(eval(&[OP_1NEGATE, OP_CHECKLOCKTIMEVERIFY]).0, Err(ScriptFailure::NegativeLockTime(-1)));
        assert_eq!(
            eval(&[OP_CHECKLOCKTIMEVERIFY]).0,
            Err(ScriptFailure::StackUnderflow(OP_CHECKLOCKTIMEVERIFY))
        );
    }

    #[test]
    fn test_check_lock_time_rules() {
        let maturity = ARBITRATION_MATURITY as i64;

        let tx = create_test_transaction(ARBITRATION_MATURITY, SEQUENCE_LOCKTIME_ENABLED);
        let checker = TransactionSignatureChecker::new(&tx, 0);
        assert!(checker.check_lock_time(maturity).is_ok());
        assert!(checker.check_lock_time(maturity - 1).is_ok());
        assert!(checker.check_lock_time(maturity + 1).is_err());
        // Height operand against a timestamp lock time
        assert!(checker.check_lock_time(100).is_err());

        let tx = create_test_transaction(ARBITRATION_MATURITY, SEQUENCE_FINAL);
        let checker = TransactionSignatureChecker::new(&tx, 0);
        assert!(matches!(
            checker.check_lock_time(maturity),
            Err(ScriptFailure::UnsatisfiedLockTime(_))
        ));
    }

    #[test]
    fn test_checksig() {
        let provider = Secp256k1Provider::new();
        let key = provider.generate_key_pair(&mut StdRng::seed_from_u64(11));
        let other = provider.generate_key_pair(&mut StdRng::seed_from_u64(12));
        let script_pubkey = Builder::new()
            .push_slice(&key.public_key())
            .unwrap()
            .push_opcode(OP_CHECKSIG)
            .unwrap()
            .into_script();

        let mut tx = create_test_transaction(0, SEQUENCE_FINAL);
        let sig = sign(&provider, &key, &tx, script_pubkey.as_bytes());
        tx.inputs[0].script_sig = Builder::new().push_slice(&sig).unwrap().into_script().into_bytes();
        assert!(verify_input(&tx, 0, script_pubkey.as_bytes(), ScriptFlags::STANDARD).is_ok());

        let forged = sign(&provider, &other, &tx, script_pubkey.as_bytes());
        tx.inputs[0].script_sig = Builder::new().push_slice(&forged).unwrap().into_script().into_bytes();
        assert_eq!(
            verify_input(&tx, 0, script_pubkey.as_bytes(), ScriptFlags::STANDARD),
            Err(ScriptFailure::EvalFalse)
        );
    }

    #[test]
    fn test_checksig_binds_outputs() {
        let provider = Secp256k1Provider::new();
        let key = provider.generate_key_pair(&mut StdRng::seed_from_u64(13));
        let script_pubkey = Builder::new()
            .push_slice(&key.public_key())
            .unwrap()
            .push_opcode(OP_CHECKSIG)
            .unwrap()
            .into_script();

        let mut tx = create_test_transaction(0, SEQUENCE_FINAL);
        let sig = sign(&provider, &key, &tx, script_pubkey.as_bytes());
        tx.inputs[0].script_sig = Builder::new().push_slice(&sig).unwrap().into_script().into_bytes();
        tx.outputs[0].value -= 1;
        assert!(verify_input(&tx, 0, script_pubkey.as_bytes(), ScriptFlags::STANDARD).is_err());
    }

    #[test]
    fn test_checkmultisig_order() {
        let provider = Secp256k1Provider::new();
        let a = provider.generate_key_pair(&mut StdRng::seed_from_u64(21));
        let b = provider.generate_key_pair(&mut StdRng::seed_from_u64(22));
        let script_pubkey: Script = Builder::new()
            .push_opcode(OP_2)
            .unwrap()
            .push_slice(&a.public_key())
            .unwrap()
            .push_slice(&b.public_key())
            .unwrap()
            .push_opcode(OP_2)
            .unwrap()
            .push_opcode(OP_CHECKMULTISIG)
            .unwrap()
            .into_script();

        let mut tx = create_test_transaction(0, SEQUENCE_FINAL);
        let sig_a = sign(&provider, &a, &tx, script_pubkey.as_bytes());
        let sig_b = sign(&provider, &b, &tx, script_pubkey.as_bytes());

        let unlock = |first: &[u8], second: &[u8]| {
            Builder::new()
                .push_opcode(OP_0)
                .unwrap()
                .push_slice(first)
                .unwrap()
                .push_slice(second)
                .unwrap()
                .into_script()
                .into_bytes()
        };

        tx.inputs[0].script_sig = unlock(&sig_a, &sig_b);
        assert!(verify_input(&tx, 0, script_pubkey.as_bytes(), ScriptFlags::STANDARD).is_ok());

        tx.inputs[0].script_sig = unlock(&sig_b, &sig_a);
        assert_eq!(
            verify_input(&tx, 0, script_pubkey.as_bytes(), ScriptFlags::STANDARD),
            Err(ScriptFailure::EvalFalse)
        );
    }

    #[test]
    fn test_checkmultisig_null_dummy() {
        let script = [OP_1, OP_0, OP_0, OP_CHECKMULTISIG];
        assert_eq!(eval(&script).0, Err(ScriptFailure::NullDummy));
        let (result, stack) = eval(&[OP_0, OP_0, OP_0, OP_CHECKMULTISIG]);
        assert!(result.is_ok());
        // Zero-of-zero succeeds
        assert_eq!(stack, vec![vec![1]]);
    }

    #[test]
    fn test_checkmultisig_counts() {
        assert_eq!(
            eval(&[OP_0, OP_0, OP_1NEGATE, OP_CHECKMULTISIG]).0,
            Err(ScriptFailure::PubKeyCount(-1))
        );
        assert_eq!(
            eval(&[OP_0, OP_2, OP_1, OP_1, OP_CHECKMULTISIG]).0,
            Err(ScriptFailure::SigCount(2))
        );
        assert_eq!(
            eval(&[OP_2, OP_CHECKMULTISIG]).0,
            Err(ScriptFailure::StackUnderflow(OP_CHECKMULTISIG))
        );
    }

    #[test]
    fn test_remove_signature() {
        let sig = vec![0x30, 0x01, 0x02];
        let code = Builder::new()
            .push_slice(&sig)
            .unwrap()
            .push_opcode(OP_CHECKSIG)
            .unwrap()
            .push_slice(&sig)
            .unwrap()
            .into_script();
        assert_eq!(remove_signature(code.as_bytes(), &sig), vec![OP_CHECKSIG]);
        assert_eq!(remove_signature(code.as_bytes(), &[]), code.to_bytes());
    }

    #[test]
    fn test_flags() {
        let flags = ScriptFlags::VERIFY_NULL_DUMMY | ScriptFlags::VERIFY_CLEAN_STACK;
        assert!(flags.has_flag(ScriptFlags::VERIFY_NULL_DUMMY));
        assert!(!flags.has_flag(ScriptFlags::VERIFY_MINIMAL_DATA));
        assert!(ScriptFlags::STANDARD.has_flag(flags));
        assert_eq!(serde_json::to_string(&flags).unwrap(), "20");
    }
}
