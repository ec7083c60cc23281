//! The confidential token ledger.
//!
//! Balances, allowances and the total supply are ciphertext handles; every
//! mutation asks the engine for the homomorphic step and re-grants decryption
//! access on the replaced cells, because grants attach to handles and do not
//! survive a cell overwrite. Arithmetic is deliberately unconditional: no
//! encrypted comparison gates a subtraction against the current balance, the
//! engine's fixed-width wraparound is the only underflow behaviour.
//!
//! The encrypted-address keyspace of the same ledger lives in
//! [`encrypted`](self::encrypted).

use std::collections::BTreeMap;

use codec::{Decode, Encode};
use scale_info::TypeInfo;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    engine::{BindingContext, FheEngine},
    errors::{Error, Result},
    Address, AmountSource, Balance, EncryptedAddress, EncryptedAmount, SENTINEL_AMOUNT,
};

pub mod encrypted;

pub use encrypted::{encrypted_addresses_equal, encrypted_addresses_not_equal};

/// Cleartext event record. The amount field is always
/// [`SENTINEL_AMOUNT`]; public logs never carry the confidential value.
#[derive(Clone, Debug, Encode, Decode, TypeInfo, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TokenEvent {
    Transfer {
        from: Address,
        to: Address,
        amount: Balance,
    },
    Approval {
        owner: Address,
        spender: Address,
        amount: Balance,
    },
    EncryptedTransfer {
        from: EncryptedAddress,
        to: EncryptedAddress,
        amount: Balance,
    },
    EncryptedApproval {
        owner: EncryptedAddress,
        spender: EncryptedAddress,
        amount: Balance,
    },
    AddressEncrypted {
        principal: Address,
        encrypted: EncryptedAddress,
    },
}

/// One confidential token ledger instance.
#[derive(Clone, Debug)]
pub struct TokenLedger {
    /// The ledger's own principal; used for self-grants and as the token
    /// reference the vault stores.
    address: Address,
    initialized: bool,
    total_supply: EncryptedAmount,
    balances: BTreeMap<Address, EncryptedAmount>,
    allowances: BTreeMap<Address, BTreeMap<Address, EncryptedAmount>>,
    // Encrypted-address keyspace, see the `encrypted` module.
    pub(crate) registry: BTreeMap<Address, EncryptedAddress>,
    pub(crate) encrypted_balances: BTreeMap<EncryptedAddress, EncryptedAmount>,
    pub(crate) encrypted_allowances:
        BTreeMap<EncryptedAddress, BTreeMap<EncryptedAddress, EncryptedAmount>>,
    events: Vec<TokenEvent>,
}

impl TokenLedger {
    /// Create an empty ledger. The supply starts as an encrypted zero until
    /// [`Self::initialize`] binds the real one.
    pub fn new<E: FheEngine>(engine: &mut E, address: Address) -> Result<Self> {
        ensure!(!address.is_zero(), Error::ZeroAddress);
        let total_supply = engine.zero_amount()?;
        engine.allow(total_supply.handle(), address)?;
        Ok(Self {
            address,
            initialized: false,
            total_supply,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
            registry: BTreeMap::new(),
            encrypted_balances: BTreeMap::new(),
            encrypted_allowances: BTreeMap::new(),
            events: Vec::new(),
        })
    }

    /// One-time supply initialization. Binds the validated cell to both the
    /// total supply and the caller's balance and grants decryption to the
    /// ledger and the caller.
    pub fn initialize<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        supply: AmountSource<'_>,
    ) -> Result<()> {
        ensure!(!self.initialized, Error::AlreadyInitialized);
        let supply = self.resolve_amount(engine, caller, supply)?;
        self.initialized = true;
        self.total_supply = supply;
        self.balances.insert(caller, supply);
        engine.allow(supply.handle(), self.address)?;
        engine.allow(supply.handle(), caller)?;
        self.emit(TokenEvent::Transfer {
            from: Address::ZERO,
            to: caller,
            amount: SENTINEL_AMOUNT,
        });
        Ok(())
    }

    /// Move `amount` from the caller to `to`. Both balance updates are
    /// unconditional homomorphic steps; the call has no failure path once the
    /// input proof validates.
    pub fn transfer<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        to: Address,
        amount: AmountSource<'_>,
    ) -> Result<bool> {
        let amount = self.resolve_amount(engine, caller, amount)?;
        let from_balance = self.balance_or_zero(engine, caller)?;
        let to_balance = self.balance_or_zero(engine, to)?;
        let new_from = engine.sub(from_balance, amount)?;
        let new_to = engine.add(to_balance, amount)?;
        self.balances.insert(caller, new_from);
        self.balances.insert(to, new_to);
        for cell in [new_from, new_to] {
            for who in [self.address, caller, to] {
                engine.allow(cell.handle(), who)?;
            }
        }
        self.emit(TokenEvent::Transfer {
            from: caller,
            to,
            amount: SENTINEL_AMOUNT,
        });
        Ok(true)
    }

    /// Overwrite the caller's allowance for `spender`. Replaces, never
    /// accumulates.
    pub fn approve<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        spender: Address,
        amount: AmountSource<'_>,
    ) -> Result<bool> {
        let amount = self.resolve_amount(engine, caller, amount)?;
        self.allowances
            .entry(caller)
            .or_default()
            .insert(spender, amount);
        for who in [self.address, caller, spender] {
            engine.allow(amount.handle(), who)?;
        }
        self.emit(TokenEvent::Approval {
            owner: caller,
            spender,
            amount: SENTINEL_AMOUNT,
        });
        Ok(true)
    }

    /// Spend the caller's allowance from `from` and move `amount` to `to`.
    /// Allowance and both balances are updated unconditionally.
    pub fn transfer_from<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        from: Address,
        to: Address,
        amount: AmountSource<'_>,
    ) -> Result<bool> {
        let amount = self.resolve_amount(engine, caller, amount)?;
        let allowance = self.allowance_or_zero(engine, from, caller)?;
        let from_balance = self.balance_or_zero(engine, from)?;
        let to_balance = self.balance_or_zero(engine, to)?;

        let new_allowance = engine.sub(allowance, amount)?;
        let new_from = engine.sub(from_balance, amount)?;
        let new_to = engine.add(to_balance, amount)?;

        self.allowances
            .entry(from)
            .or_default()
            .insert(caller, new_allowance);
        self.balances.insert(from, new_from);
        self.balances.insert(to, new_to);

        for who in [self.address, from, caller] {
            engine.allow(new_allowance.handle(), who)?;
        }
        for who in [self.address, from] {
            engine.allow(new_from.handle(), who)?;
        }
        for who in [self.address, to] {
            engine.allow(new_to.handle(), who)?;
        }
        self.emit(TokenEvent::Transfer {
            from,
            to,
            amount: SENTINEL_AMOUNT,
        });
        Ok(true)
    }

    /// Create `amount` new tokens for `to`. The base ledger does not restrict
    /// who may mint.
    pub fn mint<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        to: Address,
        amount: AmountSource<'_>,
    ) -> Result<()> {
        let amount = self.resolve_amount(engine, caller, amount)?;
        let to_balance = self.balance_or_zero(engine, to)?;
        let new_supply = engine.add(self.total_supply, amount)?;
        let new_to = engine.add(to_balance, amount)?;
        self.total_supply = new_supply;
        self.balances.insert(to, new_to);
        engine.allow(new_supply.handle(), self.address)?;
        engine.allow(new_to.handle(), self.address)?;
        engine.allow(new_to.handle(), to)?;
        self.emit(TokenEvent::Transfer {
            from: Address::ZERO,
            to,
            amount: SENTINEL_AMOUNT,
        });
        Ok(())
    }

    /// Destroy `amount` tokens held by `from`. Unrestricted, like
    /// [`Self::mint`].
    pub fn burn<E: FheEngine>(
        &mut self,
        engine: &mut E,
        caller: Address,
        from: Address,
        amount: AmountSource<'_>,
    ) -> Result<()> {
        let amount = self.resolve_amount(engine, caller, amount)?;
        let from_balance = self.balance_or_zero(engine, from)?;
        let new_supply = engine.sub(self.total_supply, amount)?;
        let new_from = engine.sub(from_balance, amount)?;
        self.total_supply = new_supply;
        self.balances.insert(from, new_from);
        engine.allow(new_supply.handle(), self.address)?;
        engine.allow(new_from.handle(), self.address)?;
        engine.allow(new_from.handle(), from)?;
        self.emit(TokenEvent::Transfer {
            from,
            to: Address::ZERO,
            amount: SENTINEL_AMOUNT,
        });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Read surface. All of these return opaque handles; decryption goes
    // through the engine's off-system relayer protocol.
    // ---------------------------------------------------------------------

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn total_supply(&self) -> EncryptedAmount {
        self.total_supply
    }

    pub fn balance_of(&self, account: Address) -> Option<EncryptedAmount> {
        self.balances.get(&account).copied()
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> Option<EncryptedAmount> {
        self.allowances
            .get(&owner)
            .and_then(|per_spender| per_spender.get(&spender))
            .copied()
    }

    pub fn events(&self) -> &[TokenEvent] {
        &self.events
    }

    // ---------------------------------------------------------------------
    // Internal helpers.
    // ---------------------------------------------------------------------

    pub(crate) fn resolve_amount<E: FheEngine>(
        &self,
        engine: &mut E,
        caller: Address,
        amount: AmountSource<'_>,
    ) -> Result<EncryptedAmount> {
        match amount {
            AmountSource::External(input) => {
                engine.validate_amount(input, &BindingContext::new(self.address, caller))
            }
            AmountSource::Validated(amount) => Ok(amount),
        }
    }

    fn balance_or_zero<E: FheEngine>(
        &self,
        engine: &mut E,
        account: Address,
    ) -> Result<EncryptedAmount> {
        match self.balances.get(&account) {
            Some(balance) => Ok(*balance),
            None => engine.zero_amount(),
        }
    }

    fn allowance_or_zero<E: FheEngine>(
        &self,
        engine: &mut E,
        owner: Address,
        spender: Address,
    ) -> Result<EncryptedAmount> {
        match self.allowance(owner, spender) {
            Some(allowance) => Ok(allowance),
            None => engine.zero_amount(),
        }
    }

    pub(crate) fn emit(&mut self, event: TokenEvent) {
        log::debug!("token {:?}: {:?}", self.address, event);
        self.events.push(event);
    }
}

// ------------------------------------------------------------------------
// Tests
// ------------------------------------------------------------------------
