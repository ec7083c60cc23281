//! Confidential token and multisig vault ledgers on top of an external
//! FHE coprocessor.
//!
//! All arithmetic over encrypted values is delegated to an [`engine::FheEngine`]
//! implementation; this crate only holds ciphertext handles in ledger cells,
//! asks the engine for each homomorphic step and keeps the decryption
//! access-list of every cell up to date. The two ledgers are
//! [`token::TokenLedger`] (encrypted balances, allowances and an
//! encrypted-address keyspace) and [`vault::MultisigVault`] (owner-threshold
//! propose/confirm/execute over encrypted amounts).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use codec::{Decode, Encode};
use scale_info::TypeInfo;

#[macro_use]
pub(crate) mod macros;

pub mod errors;

pub mod engine;
pub mod testing;
pub mod token;
pub mod vault;

pub use engine::{BindingContext, FheEngine};
pub use errors::{Error, Result};
pub use token::{TokenEvent, TokenLedger};
pub use vault::{MultisigVault, RecoveryPolicy, RecoveryStatus, VaultEvent};

/// The cleartext type a confidential amount decrypts to.
///
/// The engine operates on fixed-width ciphertexts; `BALANCE_BITS` is that
/// width and all homomorphic `add`/`sub` results wrap around at it. The
/// ledgers never gate a subtraction on balance sufficiency, so the wraparound
/// behaviour of the engine is the only guard against underflow.
pub type Balance = u64;
pub const BALANCE_BITS: u32 = 64;

/// The cleartext amount carried by every public event in place of the real,
/// confidential one.
pub const SENTINEL_AMOUNT: Balance = 0;

// -------------------------------------------------------------------------------------
// -                                 New Type Def                                      -
// -------------------------------------------------------------------------------------

/// A clear account identifier, used as the map key of every plain keyspace.
#[derive(
    Copy, Clone, Default, Debug, Encode, Decode, TypeInfo, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero principal, used as the counterparty of mint/burn events.
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

/// Opaque reference to a ciphertext held by the external engine.
///
/// Handles are never decoded locally; the only local operations are storing
/// them in ledger cells and passing them back to the engine.
#[derive(
    Copy, Clone, Default, Debug, Encode, Decode, TypeInfo, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CiphertextHandle(pub [u8; 32]);

/// Handle of a ciphertext that decrypts to a [`Balance`].
#[derive(
    Copy, Clone, Default, Debug, Encode, Decode, TypeInfo, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EncryptedAmount(pub(crate) CiphertextHandle);

impl EncryptedAmount {
    /// Wrap an engine-produced handle. Only engine implementations should
    /// need this.
    pub fn from_handle(handle: CiphertextHandle) -> Self {
        Self(handle)
    }

    pub fn handle(&self) -> CiphertextHandle {
        self.0
    }
}

/// Handle of a ciphertext that decrypts to an [`Address`].
#[derive(
    Copy, Clone, Default, Debug, Encode, Decode, TypeInfo, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EncryptedAddress(pub(crate) CiphertextHandle);

impl EncryptedAddress {
    /// Wrap an engine-produced handle. Only engine implementations should
    /// need this.
    pub fn from_handle(handle: CiphertextHandle) -> Self {
        Self(handle)
    }

    pub fn handle(&self) -> CiphertextHandle {
        self.0
    }
}

/// A caller-submitted `(handle, proof)` pair.
///
/// The proof asserts that the ciphertext is well formed and bound to the
/// receiving contract plus the submitting caller. An input is consumed
/// exactly once; re-submitting it fails validation.
#[derive(Clone, Debug, Encode, Decode, TypeInfo, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExternalInput {
    pub handle: CiphertextHandle,
    pub proof: Vec<u8>,
}

/// Where a token operation gets its confidential amount from.
///
/// External callers submit an [`ExternalInput`] which still has to pass the
/// engine's proof check; the vault re-uses cells it already had validated
/// when it executes a confirmed transaction.
#[derive(Clone, Debug)]
pub enum AmountSource<'a> {
    External(&'a ExternalInput),
    Validated(EncryptedAmount),
}

impl<'a> From<&'a ExternalInput> for AmountSource<'a> {
    fn from(input: &'a ExternalInput) -> Self {
        Self::External(input)
    }
}

impl From<EncryptedAmount> for AmountSource<'_> {
    fn from(amount: EncryptedAmount) -> Self {
        Self::Validated(amount)
    }
}
