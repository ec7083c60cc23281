//! The encrypted-address keyspace of the token ledger.
//!
//! A principal first registers its encrypted identity through
//! [`TokenLedger::encrypt_address`]; the operations here then key balances
//! and allowances by [`EncryptedAddress`] handles and resolve "the caller's
//! own encrypted identity" through that registry instead of an explicit
//! parameter. Principal equality is never decided locally, it is a
//! pass-through to the engine's `eq`/`ne` primitive.

use crate::{
    engine::{BindingContext, FheEngine},
    errors::{Error, Result},
    Address, AmountSource, EncryptedAddress, EncryptedAmount, ExternalInput, SENTINEL_AMOUNT,
};

use super::{TokenEvent, TokenLedger};

impl TokenLedger {
    /// Register (or silently overwrite) the caller's encrypted identity.
    pub fn encrypt_address<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        input: &ExternalInput,
    ) -> Result<EncryptedAddress> {
        let encrypted =
            engine.validate_address(input, &BindingContext::new(self.address(), caller))?;
        self.registry.insert(caller, encrypted);
        engine.allow(encrypted.handle(), self.address())?;
        engine.allow(encrypted.handle(), caller)?;
        self.emit(TokenEvent::AddressEncrypted {
            principal: caller,
            encrypted,
        });
        Ok(encrypted)
    }

    /// Move `amount` from the caller's encrypted identity to `to`.
    ///
    /// The recipient's clear identity is unknown here, so only the ledger and
    /// the caller are re-granted on the updated cells; the recipient gains
    /// access the next time one of its own calls touches the cell.
    pub fn encrypted_transfer<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        to: EncryptedAddress,
        amount: AmountSource<'_>,
    ) -> Result<bool> {
        let from = self.registered_address(caller).ok_or(Error::AddressNotRegistered)?;
        let amount = self.resolve_amount(engine, caller, amount)?;
        let from_balance = self.encrypted_balance_or_zero(engine, from)?;
        let to_balance = self.encrypted_balance_or_zero(engine, to)?;
        let new_from = engine.sub(from_balance, amount)?;
        let new_to = engine.add(to_balance, amount)?;
        self.encrypted_balances.insert(from, new_from);
        self.encrypted_balances.insert(to, new_to);
        for cell in [new_from, new_to] {
            engine.allow(cell.handle(), self.address())?;
            engine.allow(cell.handle(), caller)?;
        }
        self.emit(TokenEvent::EncryptedTransfer {
            from,
            to,
            amount: SENTINEL_AMOUNT,
        });
        Ok(true)
    }

    /// Overwrite the caller's encrypted-keyed allowance for `spender`.
    pub fn encrypted_approve<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        spender: EncryptedAddress,
        amount: AmountSource<'_>,
    ) -> Result<bool> {
        let owner = self.registered_address(caller).ok_or(Error::AddressNotRegistered)?;
        let amount = self.resolve_amount(engine, caller, amount)?;
        self.encrypted_allowances
            .entry(owner)
            .or_default()
            .insert(spender, amount);
        engine.allow(amount.handle(), self.address())?;
        engine.allow(amount.handle(), caller)?;
        self.emit(TokenEvent::EncryptedApproval {
            owner,
            spender,
            amount: SENTINEL_AMOUNT,
        });
        Ok(true)
    }

    /// Spend the caller's encrypted-keyed allowance from `from` and move
    /// `amount` to `to`.
    pub fn encrypted_transfer_from<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        from: EncryptedAddress,
        to: EncryptedAddress,
        amount: AmountSource<'_>,
    ) -> Result<bool> {
        let spender = self.registered_address(caller).ok_or(Error::AddressNotRegistered)?;
        let amount = self.resolve_amount(engine, caller, amount)?;
        let allowance = self.encrypted_allowance_or_zero(engine, from, spender)?;
        let from_balance = self.encrypted_balance_or_zero(engine, from)?;
        let to_balance = self.encrypted_balance_or_zero(engine, to)?;

        let new_allowance = engine.sub(allowance, amount)?;
        let new_from = engine.sub(from_balance, amount)?;
        let new_to = engine.add(to_balance, amount)?;

        self.encrypted_allowances
            .entry(from)
            .or_default()
            .insert(spender, new_allowance);
        self.encrypted_balances.insert(from, new_from);
        self.encrypted_balances.insert(to, new_to);

        for cell in [new_allowance, new_from, new_to] {
            engine.allow(cell.handle(), self.address())?;
            engine.allow(cell.handle(), caller)?;
        }
        self.emit(TokenEvent::EncryptedTransfer {
            from,
            to,
            amount: SENTINEL_AMOUNT,
        });
        Ok(true)
    }

    /// Create `amount` new tokens for the encrypted identity `to`.
    pub fn encrypted_mint<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        to: EncryptedAddress,
        amount: AmountSource<'_>,
    ) -> Result<()> {
        let amount = self.resolve_amount(engine, caller, amount)?;
        let to_balance = self.encrypted_balance_or_zero(engine, to)?;
        let new_supply = engine.add(self.total_supply(), amount)?;
        let new_to = engine.add(to_balance, amount)?;
        self.total_supply = new_supply;
        self.encrypted_balances.insert(to, new_to);
        engine.allow(new_supply.handle(), self.address())?;
        engine.allow(new_to.handle(), self.address())?;
        engine.allow(new_to.handle(), caller)?;
        self.emit(TokenEvent::EncryptedTransfer {
            from: EncryptedAddress::default(),
            to,
            amount: SENTINEL_AMOUNT,
        });
        Ok(())
    }

    /// Destroy `amount` tokens held by the encrypted identity `from`.
    pub fn encrypted_burn<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        from: EncryptedAddress,
        amount: AmountSource<'_>,
    ) -> Result<()> {
        let amount = self.resolve_amount(engine, caller, amount)?;
        let from_balance = self.encrypted_balance_or_zero(engine, from)?;
        let new_supply = engine.sub(self.total_supply(), amount)?;
        let new_from = engine.sub(from_balance, amount)?;
        self.total_supply = new_supply;
        self.encrypted_balances.insert(from, new_from);
        engine.allow(new_supply.handle(), self.address())?;
        engine.allow(new_from.handle(), self.address())?;
        engine.allow(new_from.handle(), caller)?;
        self.emit(TokenEvent::EncryptedTransfer {
            from,
            to: EncryptedAddress::default(),
            amount: SENTINEL_AMOUNT,
        });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Read surface.
    // ---------------------------------------------------------------------

    pub fn registered_address(&self, principal: Address) -> Option<EncryptedAddress> {
        self.registry.get(&principal).copied()
    }

    pub fn encrypted_balance_of(&self, account: EncryptedAddress) -> Option<EncryptedAmount> {
        self.encrypted_balances.get(&account).copied()
    }

    pub fn encrypted_allowance(
        &self,
        owner: EncryptedAddress,
        spender: EncryptedAddress,
    ) -> Option<EncryptedAmount> {
        self.encrypted_allowances
            .get(&owner)
            .and_then(|per_spender| per_spender.get(&spender))
            .copied()
    }

    // ---------------------------------------------------------------------
    // Internal helpers.
    // ---------------------------------------------------------------------

    fn encrypted_balance_or_zero<E: FheEngine>(
        &self,
        engine: &mut E,
        account: EncryptedAddress,
    ) -> Result<EncryptedAmount> {
        match self.encrypted_balances.get(&account) {
            Some(balance) => Ok(*balance),
            None => engine.zero_amount(),
        }
    }

    fn encrypted_allowance_or_zero<E: FheEngine>(
        &self,
        engine: &mut E,
        owner: EncryptedAddress,
        spender: EncryptedAddress,
    ) -> Result<EncryptedAmount> {
        match self.encrypted_allowance(owner, spender) {
            Some(allowance) => Ok(allowance),
            None => engine.zero_amount(),
        }
    }
}

/// Engine pass-through: do two encrypted principals hold the same identity?
pub fn encrypted_addresses_equal<E: FheEngine>(
    engine: &mut E,
    lhs: EncryptedAddress,
    rhs: EncryptedAddress,
) -> Result<bool> {
    engine.address_eq(lhs, rhs)
}

/// Engine pass-through: do two encrypted principals hold different identities?
pub fn encrypted_addresses_not_equal<E: FheEngine>(
    engine: &mut E,
    lhs: EncryptedAddress,
    rhs: EncryptedAddress,
) -> Result<bool> {
    engine.address_ne(lhs, rhs)
}

// ------------------------------------------------------------------------
// Tests
// ------------------------------------------------------------------------
