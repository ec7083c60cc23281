//! The boundary to the external FHE coprocessor.
//!
//! Everything the ledgers cannot do themselves lives behind [`FheEngine`]:
//! proof-checked import of caller-submitted ciphertexts, homomorphic
//! arithmetic, encrypted-address comparison and the decryption access-list.
//! The ledgers call these as synchronous nested operations; an engine error
//! aborts the whole ledger operation before any state is written.

use crate::{
    errors::Result, Address, CiphertextHandle, EncryptedAddress, EncryptedAmount, ExternalInput,
};

/// The context an input proof must be bound to: the contract receiving the
/// input and the caller submitting it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BindingContext {
    pub contract: Address,
    pub caller: Address,
}

impl BindingContext {
    pub fn new(contract: Address, caller: Address) -> Self {
        Self { contract, caller }
    }
}

/// The external FHE engine.
///
/// Arithmetic is fixed-width ([`crate::BALANCE_BITS`]) with wraparound
/// semantics; `sub` below zero and `add` above the width both wrap. Every
/// arithmetic call returns a fresh handle, the operands are left untouched.
/// Access grants are idempotent and attach to a single handle: replacing a
/// ledger cell with a new handle drops no grant on the old one, which stays
/// decryptable by previously granted parties.
pub trait FheEngine {
    /// Check the input proof against the binding context and import the
    /// ciphertext as an amount. Consumes the input; a second validation of
    /// the same input fails.
    fn validate_amount(
        &mut self,
        input: &ExternalInput,
        ctx: &BindingContext,
    ) -> Result<EncryptedAmount>;

    /// Check the input proof against the binding context and import the
    /// ciphertext as an encrypted principal. Single-use, like
    /// [`Self::validate_amount`].
    fn validate_address(
        &mut self,
        input: &ExternalInput,
        ctx: &BindingContext,
    ) -> Result<EncryptedAddress>;

    /// Homomorphic `lhs + rhs`, wrapping at the balance width.
    fn add(&mut self, lhs: EncryptedAmount, rhs: EncryptedAmount) -> Result<EncryptedAmount>;

    /// Homomorphic `lhs - rhs`, wrapping at the balance width.
    fn sub(&mut self, lhs: EncryptedAmount, rhs: EncryptedAmount) -> Result<EncryptedAmount>;

    /// Compare two encrypted principals for equality. This engine model
    /// returns the comparison result in the clear.
    fn address_eq(&mut self, lhs: EncryptedAddress, rhs: EncryptedAddress) -> Result<bool>;

    /// Compare two encrypted principals for inequality.
    fn address_ne(&mut self, lhs: EncryptedAddress, rhs: EncryptedAddress) -> Result<bool>;

    /// Materialize a fresh encrypted zero amount.
    fn zero_amount(&mut self) -> Result<EncryptedAmount>;

    /// Grant `who` the right to request decryption of `handle`. Contracts
    /// grant their own address to keep cells usable across their calls.
    fn allow(&mut self, handle: CiphertextHandle, who: Address) -> Result<()>;
}
