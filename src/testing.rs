//! Used for testing/benchmarking.
//!
//! [`MockFheEngine`] is a plaintext-backed [`FheEngine`]: it keeps the clear
//! value behind every handle, enforces single-use input proofs and models the
//! decryption access-list, so tests can both drive the ledgers and decrypt
//! cells to assert on the values and on who was granted access.

use std::collections::{BTreeMap, BTreeSet};

use codec::Encode;
use rand_core::RngCore;

use crate::{
    engine::{BindingContext, FheEngine},
    errors::{Error, Result},
    token::TokenLedger,
    Address, AmountSource, Balance, CiphertextHandle, EncryptedAddress, EncryptedAmount,
    ExternalInput,
};

/// Plaintext-backed engine for tests and benchmarks.
#[derive(Clone, Debug, Default)]
pub struct MockFheEngine {
    next_handle: u64,
    amounts: BTreeMap<CiphertextHandle, Balance>,
    addresses: BTreeMap<CiphertextHandle, Address>,
    access: BTreeMap<CiphertextHandle, BTreeSet<Address>>,
    /// Inputs that were minted but not yet consumed, with the context their
    /// proof is bound to.
    pending: BTreeMap<CiphertextHandle, BindingContext>,
}

impl MockFheEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_handle(&mut self) -> CiphertextHandle {
        self.next_handle += 1;
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&self.next_handle.to_be_bytes());
        CiphertextHandle(bytes)
    }

    /// Mint an amount input bound to `(contract, caller)`, as the off-chain
    /// encryption tooling would.
    pub fn encrypt_amount(
        &mut self,
        value: Balance,
        contract: Address,
        caller: Address,
    ) -> ExternalInput {
        let ctx = BindingContext::new(contract, caller);
        let handle = self.fresh_handle();
        self.amounts.insert(handle, value);
        self.pending.insert(handle, ctx);
        ExternalInput {
            handle,
            proof: (contract, caller).encode(),
        }
    }

    /// Mint an encrypted-address input bound to `(contract, caller)`.
    pub fn encrypt_address(
        &mut self,
        value: Address,
        contract: Address,
        caller: Address,
    ) -> ExternalInput {
        let ctx = BindingContext::new(contract, caller);
        let handle = self.fresh_handle();
        self.addresses.insert(handle, value);
        self.pending.insert(handle, ctx);
        ExternalInput {
            handle,
            proof: (contract, caller).encode(),
        }
    }

    fn consume(&mut self, input: &ExternalInput, ctx: &BindingContext) -> Result<()> {
        match self.pending.get(&input.handle) {
            Some(bound) if bound == ctx && input.proof == (ctx.contract, ctx.caller).encode() => {
                self.pending.remove(&input.handle);
                Ok(())
            }
            _ => Err(Error::ProofInvalid),
        }
    }

    fn amount_value(&self, amount: EncryptedAmount) -> Result<Balance> {
        self.amounts
            .get(&amount.handle())
            .copied()
            .ok_or(Error::UnknownHandle)
    }

    /// Decrypt an amount cell on behalf of `requester`, enforcing the access
    /// list the ledgers maintain.
    pub fn decrypt_amount(&self, amount: EncryptedAmount, requester: Address) -> Result<Balance> {
        ensure!(self.is_allowed(amount.handle(), requester), Error::AccessDenied);
        self.amount_value(amount)
    }

    /// Decrypt an encrypted principal on behalf of `requester`.
    pub fn decrypt_address(
        &self,
        address: EncryptedAddress,
        requester: Address,
    ) -> Result<Address> {
        ensure!(self.is_allowed(address.handle(), requester), Error::AccessDenied);
        self.addresses
            .get(&address.handle())
            .copied()
            .ok_or(Error::UnknownHandle)
    }

    pub fn is_allowed(&self, handle: CiphertextHandle, who: Address) -> bool {
        self.access
            .get(&handle)
            .map(|granted| granted.contains(&who))
            .unwrap_or(false)
    }
}

impl FheEngine for MockFheEngine {
    fn validate_amount(
        &mut self,
        input: &ExternalInput,
        ctx: &BindingContext,
    ) -> Result<EncryptedAmount> {
        self.consume(input, ctx)?;
        ensure!(self.amounts.contains_key(&input.handle), Error::UnknownHandle);
        Ok(EncryptedAmount(input.handle))
    }

    fn validate_address(
        &mut self,
        input: &ExternalInput,
        ctx: &BindingContext,
    ) -> Result<EncryptedAddress> {
        self.consume(input, ctx)?;
        ensure!(self.addresses.contains_key(&input.handle), Error::UnknownHandle);
        Ok(EncryptedAddress(input.handle))
    }

    fn add(&mut self, lhs: EncryptedAmount, rhs: EncryptedAmount) -> Result<EncryptedAmount> {
        let sum = self.amount_value(lhs)?.wrapping_add(self.amount_value(rhs)?);
        let handle = self.fresh_handle();
        self.amounts.insert(handle, sum);
        Ok(EncryptedAmount(handle))
    }

    fn sub(&mut self, lhs: EncryptedAmount, rhs: EncryptedAmount) -> Result<EncryptedAmount> {
        let diff = self.amount_value(lhs)?.wrapping_sub(self.amount_value(rhs)?);
        let handle = self.fresh_handle();
        self.amounts.insert(handle, diff);
        Ok(EncryptedAmount(handle))
    }

    fn address_eq(&mut self, lhs: EncryptedAddress, rhs: EncryptedAddress) -> Result<bool> {
        let lhs = self
            .addresses
            .get(&lhs.handle())
            .copied()
            .ok_or(Error::UnknownHandle)?;
        let rhs = self
            .addresses
            .get(&rhs.handle())
            .copied()
            .ok_or(Error::UnknownHandle)?;
        Ok(lhs == rhs)
    }

    fn address_ne(&mut self, lhs: EncryptedAddress, rhs: EncryptedAddress) -> Result<bool> {
        Ok(!self.address_eq(lhs, rhs)?)
    }

    fn zero_amount(&mut self) -> Result<EncryptedAmount> {
        let handle = self.fresh_handle();
        self.amounts.insert(handle, 0);
        Ok(EncryptedAmount(handle))
    }

    fn allow(&mut self, handle: CiphertextHandle, who: Address) -> Result<()> {
        self.access.entry(handle).or_default().insert(who);
        Ok(())
    }
}

// -------------------------------------------------------------------------------------
// -                                 Setup helpers                                     -
// -------------------------------------------------------------------------------------

pub fn gen_address<R: RngCore>(rng: &mut R) -> Address {
    let mut bytes = [0u8; 20];
    rng.fill_bytes(&mut bytes);
    Address(bytes)
}

/// Create a token ledger and initialize it with `supply` held by `issuer`.
pub fn setup_token<R: RngCore>(
    rng: &mut R,
    engine: &mut MockFheEngine,
    issuer: Address,
    supply: Balance,
) -> Result<TokenLedger> {
    let mut token = TokenLedger::new(engine, gen_address(rng))?;
    let input = engine.encrypt_amount(supply, token.address(), issuer);
    token.initialize(engine, issuer, AmountSource::External(&input))?;
    Ok(token)
}

/// Mint `amount` for `account` on an already set up ledger.
pub fn fund_account(
    engine: &mut MockFheEngine,
    token: &mut TokenLedger,
    account: Address,
    amount: Balance,
) -> Result<()> {
    let input = engine.encrypt_amount(amount, token.address(), account);
    token.mint(engine, account, account, AmountSource::External(&input))
}
