use thiserror::Error;

/// Confidential ledger error.
///
/// Every variant is fatal to the operation that raised it; the ledgers never
/// commit a partial mutation. Inputs are validated before any state is
/// touched, so a returned error means the ledger is unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Caller is not a member of the vault's owner set.
    #[error("Caller is not a vault owner")]
    NotOwner,

    /// The external engine rejected the ciphertext input proof, or the input
    /// was already consumed by an earlier call.
    #[error("The ciphertext input proof was rejected")]
    ProofInvalid,

    /// The requesting principal has no decryption grant on the ciphertext.
    #[error("The principal is not permitted to decrypt this ciphertext")]
    AccessDenied,

    /// The ciphertext handle is not known to the engine.
    #[error("Unknown ciphertext handle")]
    UnknownHandle,

    /// The zero address was passed where a real principal is required.
    #[error("The zero address is not a valid principal here")]
    ZeroAddress,

    /// The zero address was passed as a token ledger reference.
    #[error("The zero address is not a valid token reference")]
    ZeroToken,

    /// `initialize` was called on a ledger that already holds a supply.
    #[error("The token ledger is already initialized")]
    AlreadyInitialized,

    /// The principal has no encrypted identity in the address registry.
    #[error("The principal has not registered an encrypted address")]
    AddressNotRegistered,

    /// No vault transaction exists under this id.
    #[error("Vault transaction {id} does not exist")]
    TransactionNotFound { id: u64 },

    /// The vault transaction was already executed.
    #[error("Vault transaction {id} was already executed")]
    AlreadyExecuted { id: u64 },

    /// The owner already confirmed this vault transaction.
    #[error("Vault transaction {id} is already confirmed by this owner")]
    AlreadyConfirmed { id: u64 },

    /// The transaction has not reached the confirmation threshold.
    #[error("Not enough confirmations: {have} of {required}")]
    NotEnoughConfirmations { have: u32, required: u32 },

    /// The confirmation threshold is outside `1..=owner_count`.
    #[error("Required confirmations {required} is out of range for {owners} owners")]
    InvalidThreshold { required: u32, owners: u32 },

    /// A vault needs at least one owner.
    #[error("The owner set cannot be empty")]
    NoOwners,

    /// The owner set contains a duplicate or zero entry.
    #[error("The owner set contains a duplicate or zero address")]
    InvalidOwner,

    /// The token ledger passed to the call is not the one the stored
    /// transaction references.
    #[error("The token ledger does not match the stored token reference")]
    TokenMismatch,

    /// No pending recovery exists under this id.
    #[error("Pending recovery {id} does not exist")]
    RecoveryNotFound { id: u64 },

    /// The owner already approved this pending recovery.
    #[error("Pending recovery {id} is already approved by this owner")]
    AlreadyApproved { id: u64 },
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
