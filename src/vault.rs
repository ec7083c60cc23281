//! The owner-threshold vault.
//!
//! A fixed owner set proposes, confirms and executes transfers of encrypted
//! amounts out of the vault's own token balance. Two independent, densely
//! numbered transaction sequences exist: plain recipients and encrypted
//! recipients. The token ledger a transaction targets is held as a typed
//! reference: callers pass `&mut TokenLedger` and the vault checks it against
//! the address stored at proposal time instead of dispatching by encoded
//! signature.

use std::collections::{BTreeMap, BTreeSet};

use codec::{Decode, Encode};
use scale_info::TypeInfo;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    engine::{BindingContext, FheEngine},
    errors::{Error, Result},
    token::TokenLedger,
    Address, AmountSource, Balance, EncryptedAddress, EncryptedAmount, ExternalInput,
    SENTINEL_AMOUNT,
};

/// How `emergency_recover` is gated.
///
/// The operation bypasses the propose/confirm/execute pipeline either way;
/// the policy decides whether a single owner suffices or every owner has to
/// approve the pending recovery first.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RecoveryPolicy {
    SingleOwner,
    AllOwners,
}

/// Outcome of an `emergency_recover` call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RecoveryStatus {
    /// The funds moved.
    Completed,
    /// Waiting for the remaining owners to approve the pending recovery.
    Pending(u64),
}

/// A proposed transfer to a plain recipient.
#[derive(Clone, Debug, Encode, Decode, TypeInfo, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VaultTransaction {
    pub to: Address,
    pub token: Address,
    pub amount: EncryptedAmount,
    pub executed: bool,
    pub confirmations: BTreeSet<Address>,
}

/// A proposed transfer to an encrypted recipient.
#[derive(Clone, Debug, Encode, Decode, TypeInfo, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EncryptedVaultTransaction {
    pub to: EncryptedAddress,
    pub token: Address,
    pub amount: EncryptedAmount,
    pub executed: bool,
    pub confirmations: BTreeSet<Address>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum RecoveryRecipient {
    Plain(Address),
    Encrypted(EncryptedAddress),
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct PendingRecovery {
    token: Address,
    recipient: RecoveryRecipient,
    amount: EncryptedAmount,
    approvals: BTreeSet<Address>,
    executed: bool,
}

/// Cleartext vault event record; amounts are always [`SENTINEL_AMOUNT`].
#[derive(Clone, Debug, Encode, Decode, TypeInfo, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VaultEvent {
    TransactionProposed {
        id: u64,
        owner: Address,
        token: Address,
        to: Address,
    },
    TransactionConfirmed {
        id: u64,
        owner: Address,
    },
    TransactionExecuted {
        id: u64,
        owner: Address,
    },
    EncryptedTransactionProposed {
        id: u64,
        owner: Address,
        token: Address,
    },
    EncryptedTransactionConfirmed {
        id: u64,
        owner: Address,
    },
    EncryptedTransactionExecuted {
        id: u64,
        owner: Address,
    },
    Deposit {
        token: Address,
        depositor: Address,
        amount: Balance,
    },
    Withdrawal {
        token: Address,
        to: Address,
        amount: Balance,
    },
    EncryptedDeposit {
        token: Address,
        depositor: Address,
        amount: Balance,
    },
    EncryptedWithdrawal {
        token: Address,
        to: EncryptedAddress,
        amount: Balance,
    },
}

/// One multisig vault instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultisigVault {
    address: Address,
    owners: Vec<Address>,
    required_confirmations: u32,
    recovery_policy: RecoveryPolicy,
    transactions: Vec<VaultTransaction>,
    encrypted_transactions: Vec<EncryptedVaultTransaction>,
    /// What the vault believes it holds, per token ledger. Only the
    /// deposit/execute/recover paths mutate these cells.
    vault_balances: BTreeMap<Address, EncryptedAmount>,
    recoveries: Vec<PendingRecovery>,
    events: Vec<VaultEvent>,
}

impl MultisigVault {
    /// Create a vault. The owner set is fixed for the vault's lifetime;
    /// owners must be unique and non-zero, and the threshold must satisfy
    /// `1 <= required <= owners.len()`.
    pub fn new(
        address: Address,
        owners: Vec<Address>,
        required_confirmations: u32,
        recovery_policy: RecoveryPolicy,
    ) -> Result<Self> {
        ensure!(!address.is_zero(), Error::ZeroAddress);
        ensure!(!owners.is_empty(), Error::NoOwners);
        let unique: BTreeSet<&Address> = owners.iter().collect();
        ensure!(
            unique.len() == owners.len() && !owners.iter().any(Address::is_zero),
            Error::InvalidOwner
        );
        ensure!(
            required_confirmations >= 1 && required_confirmations as usize <= owners.len(),
            Error::InvalidThreshold {
                required: required_confirmations,
                owners: owners.len() as u32,
            }
        );
        Ok(Self {
            address,
            owners,
            required_confirmations,
            recovery_policy,
            transactions: Vec::new(),
            encrypted_transactions: Vec::new(),
            vault_balances: BTreeMap::new(),
            recoveries: Vec::new(),
            events: Vec::new(),
        })
    }

    // ---------------------------------------------------------------------
    // Plain-recipient pipeline.
    // ---------------------------------------------------------------------

    /// Propose a transfer of a confidential amount to `to`. The proposer
    /// confirms implicitly; the transaction id is the next dense index.
    pub fn propose_transaction<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        token: Address,
        to: Address,
        amount: &ExternalInput,
    ) -> Result<u64> {
        ensure!(self.is_owner(caller), Error::NotOwner);
        ensure!(!to.is_zero(), Error::ZeroAddress);
        ensure!(!token.is_zero(), Error::ZeroToken);
        let amount = engine.validate_amount(amount, &BindingContext::new(self.address, caller))?;
        engine.allow(amount.handle(), self.address)?;
        engine.allow(amount.handle(), caller)?;

        let id = self.transactions.len() as u64;
        self.transactions.push(VaultTransaction {
            to,
            token,
            amount,
            executed: false,
            confirmations: BTreeSet::new(),
        });
        self.emit(VaultEvent::TransactionProposed {
            id,
            owner: caller,
            token,
            to,
        });
        self.confirm_transaction(caller, id)?;
        Ok(id)
    }

    /// Add the caller's confirmation. Confirming twice fails, it does not
    /// no-op.
    pub fn confirm_transaction(&mut self, caller: Address, id: u64) -> Result<()> {
        ensure!(self.is_owner(caller), Error::NotOwner);
        let tx = self
            .transactions
            .get_mut(id as usize)
            .ok_or(Error::TransactionNotFound { id })?;
        ensure!(!tx.executed, Error::AlreadyExecuted { id });
        let newly_confirmed = tx.confirmations.insert(caller);
        ensure!(newly_confirmed, Error::AlreadyConfirmed { id });
        self.emit(VaultEvent::TransactionConfirmed { id, owner: caller });
        Ok(())
    }

    /// Execute a transaction that reached the confirmation threshold: move
    /// the amount out of the vault's token balance to the stored recipient
    /// and debit the vault's own balance cell.
    pub fn execute_transaction<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        token: &mut TokenLedger,
        id: u64,
    ) -> Result<()> {
        ensure!(self.is_owner(caller), Error::NotOwner);
        let required = self.required_confirmations;
        let (to, token_ref, amount) = {
            let tx = self
                .transactions
                .get_mut(id as usize)
                .ok_or(Error::TransactionNotFound { id })?;
            ensure!(!tx.executed, Error::AlreadyExecuted { id });
            let have = tx.confirmations.len() as u32;
            ensure!(have >= required, Error::NotEnoughConfirmations { have, required });
            ensure!(token.address() == tx.token, Error::TokenMismatch);
            // Committed before the downstream call; the host transaction
            // model discards the whole operation if that call fails.
            tx.executed = true;
            (tx.to, tx.token, tx.amount)
        };

        engine.allow(amount.handle(), token_ref)?;
        token.transfer(engine, self.address, to, AmountSource::Validated(amount))?;
        self.debit_vault_balance(engine, token_ref, amount)?;
        self.emit(VaultEvent::TransactionExecuted { id, owner: caller });
        Ok(())
    }

    /// Deposit confidential tokens into the vault. Open to any caller; the
    /// depositor must have approved the vault on the token ledger.
    pub fn deposit_tokens<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        token: &mut TokenLedger,
        amount: &ExternalInput,
    ) -> Result<()> {
        let amount = engine.validate_amount(amount, &BindingContext::new(self.address, caller))?;
        engine.allow(amount.handle(), self.address)?;
        engine.allow(amount.handle(), token.address())?;

        token.transfer_from(
            engine,
            self.address,
            caller,
            self.address,
            AmountSource::Validated(amount),
        )?;
        self.credit_vault_balance(engine, token.address(), amount)?;
        self.emit(VaultEvent::Deposit {
            token: token.address(),
            depositor: caller,
            amount: SENTINEL_AMOUNT,
        });
        Ok(())
    }

    /// Move funds out of the vault without the propose/confirm/execute
    /// pipeline, gated by the vault's [`RecoveryPolicy`].
    pub fn emergency_recover<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        token: &mut TokenLedger,
        to: Address,
        amount: &ExternalInput,
    ) -> Result<RecoveryStatus> {
        ensure!(self.is_owner(caller), Error::NotOwner);
        ensure!(!to.is_zero(), Error::ZeroAddress);
        let amount = engine.validate_amount(amount, &BindingContext::new(self.address, caller))?;
        engine.allow(amount.handle(), self.address)?;
        engine.allow(amount.handle(), caller)?;
        self.start_recovery(engine, caller, token, RecoveryRecipient::Plain(to), amount)
    }

    // ---------------------------------------------------------------------
    // Encrypted-recipient pipeline. Structurally the same state machine,
    // keyed by an independent id sequence; the downstream calls target the
    // token ledger's encrypted-address operations, so the vault's own
    // encrypted identity must be registered there.
    // ---------------------------------------------------------------------

    pub fn propose_encrypted_transaction<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        token: Address,
        to: &ExternalInput,
        amount: &ExternalInput,
    ) -> Result<u64> {
        ensure!(self.is_owner(caller), Error::NotOwner);
        ensure!(!token.is_zero(), Error::ZeroToken);
        let ctx = BindingContext::new(self.address, caller);
        let to = engine.validate_address(to, &ctx)?;
        let amount = engine.validate_amount(amount, &ctx)?;
        for handle in [to.handle(), amount.handle()] {
            engine.allow(handle, self.address)?;
            engine.allow(handle, caller)?;
        }

        let id = self.encrypted_transactions.len() as u64;
        self.encrypted_transactions.push(EncryptedVaultTransaction {
            to,
            token,
            amount,
            executed: false,
            confirmations: BTreeSet::new(),
        });
        self.emit(VaultEvent::EncryptedTransactionProposed {
            id,
            owner: caller,
            token,
        });
        self.confirm_encrypted_transaction(caller, id)?;
        Ok(id)
    }

    pub fn confirm_encrypted_transaction(&mut self, caller: Address, id: u64) -> Result<()> {
        ensure!(self.is_owner(caller), Error::NotOwner);
        let tx = self
            .encrypted_transactions
            .get_mut(id as usize)
            .ok_or(Error::TransactionNotFound { id })?;
        ensure!(!tx.executed, Error::AlreadyExecuted { id });
        let newly_confirmed = tx.confirmations.insert(caller);
        ensure!(newly_confirmed, Error::AlreadyConfirmed { id });
        self.emit(VaultEvent::EncryptedTransactionConfirmed { id, owner: caller });
        Ok(())
    }

    pub fn execute_encrypted_transaction<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        token: &mut TokenLedger,
        id: u64,
    ) -> Result<()> {
        ensure!(self.is_owner(caller), Error::NotOwner);
        let required = self.required_confirmations;
        let (to, token_ref, amount) = {
            let tx = self
                .encrypted_transactions
                .get_mut(id as usize)
                .ok_or(Error::TransactionNotFound { id })?;
            ensure!(!tx.executed, Error::AlreadyExecuted { id });
            let have = tx.confirmations.len() as u32;
            ensure!(have >= required, Error::NotEnoughConfirmations { have, required });
            ensure!(token.address() == tx.token, Error::TokenMismatch);
            tx.executed = true;
            (tx.to, tx.token, tx.amount)
        };

        engine.allow(amount.handle(), token_ref)?;
        token.encrypted_transfer(engine, self.address, to, AmountSource::Validated(amount))?;
        self.debit_vault_balance(engine, token_ref, amount)?;
        self.emit(VaultEvent::EncryptedTransactionExecuted { id, owner: caller });
        Ok(())
    }

    /// Deposit against the encrypted-address keyspace. The depositor and the
    /// vault must both be registered on the token ledger, and the depositor
    /// must have approved the vault's encrypted identity.
    pub fn deposit_encrypted_tokens<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        token: &mut TokenLedger,
        amount: &ExternalInput,
    ) -> Result<()> {
        let from = token
            .registered_address(caller)
            .ok_or(Error::AddressNotRegistered)?;
        let vault_identity = token
            .registered_address(self.address)
            .ok_or(Error::AddressNotRegistered)?;
        let amount = engine.validate_amount(amount, &BindingContext::new(self.address, caller))?;
        engine.allow(amount.handle(), self.address)?;
        engine.allow(amount.handle(), token.address())?;

        token.encrypted_transfer_from(
            engine,
            self.address,
            from,
            vault_identity,
            AmountSource::Validated(amount),
        )?;
        self.credit_vault_balance(engine, token.address(), amount)?;
        self.emit(VaultEvent::EncryptedDeposit {
            token: token.address(),
            depositor: caller,
            amount: SENTINEL_AMOUNT,
        });
        Ok(())
    }

    pub fn emergency_encrypted_recover<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        token: &mut TokenLedger,
        to: &ExternalInput,
        amount: &ExternalInput,
    ) -> Result<RecoveryStatus> {
        ensure!(self.is_owner(caller), Error::NotOwner);
        let ctx = BindingContext::new(self.address, caller);
        let to = engine.validate_address(to, &ctx)?;
        let amount = engine.validate_amount(amount, &ctx)?;
        for handle in [to.handle(), amount.handle()] {
            engine.allow(handle, self.address)?;
            engine.allow(handle, caller)?;
        }
        self.start_recovery(engine, caller, token, RecoveryRecipient::Encrypted(to), amount)
    }

    /// Approve (and, once every owner has approved, finish) a pending
    /// recovery created under [`RecoveryPolicy::AllOwners`].
    pub fn approve_recovery<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        token: &mut TokenLedger,
        id: u64,
    ) -> Result<RecoveryStatus> {
        ensure!(self.is_owner(caller), Error::NotOwner);
        {
            let recovery = self
                .recoveries
                .get_mut(id as usize)
                .ok_or(Error::RecoveryNotFound { id })?;
            ensure!(!recovery.executed, Error::AlreadyExecuted { id });
            // Token match is checked before the approval is recorded; a
            // failed call must leave the pending recovery untouched.
            ensure!(token.address() == recovery.token, Error::TokenMismatch);
            let newly_approved = recovery.approvals.insert(caller);
            ensure!(newly_approved, Error::AlreadyApproved { id });
        }
        self.try_finish_recovery(engine, token, id)
    }

    // ---------------------------------------------------------------------
    // Read surface.
    // ---------------------------------------------------------------------

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owners(&self) -> &[Address] {
        &self.owners
    }

    pub fn owner_count(&self) -> u32 {
        self.owners.len() as u32
    }

    pub fn is_owner(&self, who: Address) -> bool {
        self.owners.contains(&who)
    }

    pub fn required_confirmations(&self) -> u32 {
        self.required_confirmations
    }

    pub fn recovery_policy(&self) -> RecoveryPolicy {
        self.recovery_policy
    }

    pub fn transaction_count(&self) -> u64 {
        self.transactions.len() as u64
    }

    pub fn get_transaction(&self, id: u64) -> Result<&VaultTransaction> {
        self.transactions
            .get(id as usize)
            .ok_or(Error::TransactionNotFound { id })
    }

    pub fn is_confirmed(&self, id: u64, owner: Address) -> Result<bool> {
        Ok(self.get_transaction(id)?.confirmations.contains(&owner))
    }

    pub fn encrypted_transaction_count(&self) -> u64 {
        self.encrypted_transactions.len() as u64
    }

    pub fn get_encrypted_transaction(&self, id: u64) -> Result<&EncryptedVaultTransaction> {
        self.encrypted_transactions
            .get(id as usize)
            .ok_or(Error::TransactionNotFound { id })
    }

    pub fn is_encrypted_confirmed(&self, id: u64, owner: Address) -> Result<bool> {
        Ok(self
            .get_encrypted_transaction(id)?
            .confirmations
            .contains(&owner))
    }

    pub fn vault_balance(&self, token: Address) -> Option<EncryptedAmount> {
        self.vault_balances.get(&token).copied()
    }

    pub fn events(&self) -> &[VaultEvent] {
        &self.events
    }

    // ---------------------------------------------------------------------
    // Internal helpers.
    // ---------------------------------------------------------------------

    fn start_recovery<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        token: &mut TokenLedger,
        recipient: RecoveryRecipient,
        amount: EncryptedAmount,
    ) -> Result<RecoveryStatus> {
        match self.recovery_policy {
            RecoveryPolicy::SingleOwner => {
                self.run_recovery(engine, token, recipient, amount)?;
                Ok(RecoveryStatus::Completed)
            }
            RecoveryPolicy::AllOwners => {
                let id = self.recoveries.len() as u64;
                let mut approvals = BTreeSet::new();
                approvals.insert(caller);
                self.recoveries.push(PendingRecovery {
                    token: token.address(),
                    recipient,
                    amount,
                    approvals,
                    executed: false,
                });
                self.try_finish_recovery(engine, token, id)
            }
        }
    }

    fn try_finish_recovery<E: FheEngine>(
        &mut self,
        engine: &mut E,
        token: &mut TokenLedger,
        id: u64,
    ) -> Result<RecoveryStatus> {
        let (recipient, amount) = {
            let recovery = self
                .recoveries
                .get_mut(id as usize)
                .ok_or(Error::RecoveryNotFound { id })?;
            ensure!(token.address() == recovery.token, Error::TokenMismatch);
            if recovery.approvals.len() < self.owners.len() {
                return Ok(RecoveryStatus::Pending(id));
            }
            recovery.executed = true;
            (recovery.recipient.clone(), recovery.amount)
        };
        self.run_recovery(engine, token, recipient, amount)?;
        Ok(RecoveryStatus::Completed)
    }

    fn run_recovery<E: FheEngine>(
        &mut self,
        engine: &mut E,
        token: &mut TokenLedger,
        recipient: RecoveryRecipient,
        amount: EncryptedAmount,
    ) -> Result<()> {
        engine.allow(amount.handle(), token.address())?;
        match recipient {
            RecoveryRecipient::Plain(to) => {
                token.transfer(engine, self.address, to, AmountSource::Validated(amount))?;
                self.debit_vault_balance(engine, token.address(), amount)?;
                self.emit(VaultEvent::Withdrawal {
                    token: token.address(),
                    to,
                    amount: SENTINEL_AMOUNT,
                });
            }
            RecoveryRecipient::Encrypted(to) => {
                token.encrypted_transfer(engine, self.address, to, AmountSource::Validated(amount))?;
                self.debit_vault_balance(engine, token.address(), amount)?;
                self.emit(VaultEvent::EncryptedWithdrawal {
                    token: token.address(),
                    to,
                    amount: SENTINEL_AMOUNT,
                });
            }
        }
        Ok(())
    }

    fn credit_vault_balance<E: FheEngine>(
        &mut self,
        engine: &mut E,
        token: Address,
        amount: EncryptedAmount,
    ) -> Result<()> {
        let current = self.vault_balance_or_zero(engine, token)?;
        let updated = engine.add(current, amount)?;
        self.store_vault_balance(engine, token, updated)
    }

    fn debit_vault_balance<E: FheEngine>(
        &mut self,
        engine: &mut E,
        token: Address,
        amount: EncryptedAmount,
    ) -> Result<()> {
        let current = self.vault_balance_or_zero(engine, token)?;
        let updated = engine.sub(current, amount)?;
        self.store_vault_balance(engine, token, updated)
    }

    fn vault_balance_or_zero<E: FheEngine>(
        &self,
        engine: &mut E,
        token: Address,
    ) -> Result<EncryptedAmount> {
        match self.vault_balances.get(&token) {
            Some(balance) => Ok(*balance),
            None => engine.zero_amount(),
        }
    }

    /// Every owner is entitled to see the vault's balance, so each cell
    /// replacement re-grants the whole owner set.
    fn store_vault_balance<E: FheEngine>(
        &mut self,
        engine: &mut E,
        token: Address,
        balance: EncryptedAmount,
    ) -> Result<()> {
        self.vault_balances.insert(token, balance);
        engine.allow(balance.handle(), self.address)?;
        for owner in &self.owners {
            engine.allow(balance.handle(), *owner)?;
        }
        Ok(())
    }

    fn emit(&mut self, event: VaultEvent) {
        log::debug!("vault {:?}: {:?}", self.address, event);
        self.events.push(event);
    }
}

// ------------------------------------------------------------------------
// Tests
// ------------------------------------------------------------------------
