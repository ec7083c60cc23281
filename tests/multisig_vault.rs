use confidential_tokens::{
    testing::{self, MockFheEngine},
    Address, AmountSource, Error, MultisigVault, RecoveryPolicy, RecoveryStatus, TokenLedger,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

struct Fixture {
    engine: MockFheEngine,
    vault: MultisigVault,
    token: TokenLedger,
    owners: Vec<Address>,
}

/// Vault with 3 owners, threshold 2, funded with 200 confidential tokens
/// deposited by owner 0.
fn funded_vault(rng: &mut StdRng, policy: RecoveryPolicy) -> Fixture {
    let mut engine = MockFheEngine::new();
    let owners: Vec<Address> = (0..3).map(|_| testing::gen_address(rng)).collect();
    let mut vault =
        MultisigVault::new(testing::gen_address(rng), owners.clone(), 2, policy).unwrap();
    let mut token = testing::setup_token(rng, &mut engine, owners[0], 1_000).unwrap();

    let approval = engine.encrypt_amount(200, token.address(), owners[0]);
    token
        .approve(
            &mut engine,
            owners[0],
            vault.address(),
            AmountSource::External(&approval),
        )
        .unwrap();
    let deposit = engine.encrypt_amount(200, vault.address(), owners[0]);
    vault
        .deposit_tokens(&mut engine, owners[0], &mut token, &deposit)
        .unwrap();

    Fixture {
        engine,
        vault,
        token,
        owners,
    }
}

#[test]
fn deposit_credits_the_vault() {
    let mut rng = StdRng::from_seed([31u8; 32]);
    let Fixture {
        engine,
        vault,
        token,
        owners,
    } = funded_vault(&mut rng, RecoveryPolicy::SingleOwner);

    assert_eq!(
        engine
            .decrypt_amount(vault.vault_balance(token.address()).unwrap(), owners[2])
            .unwrap(),
        200
    );
    assert_eq!(
        engine
            .decrypt_amount(token.balance_of(vault.address()).unwrap(), vault.address())
            .unwrap(),
        200
    );
    assert_eq!(
        engine
            .decrypt_amount(token.balance_of(owners[0]).unwrap(), owners[0])
            .unwrap(),
        800
    );
}

#[test]
fn propose_confirm_execute_end_to_end() {
    let mut rng = StdRng::from_seed([32u8; 32]);
    let Fixture {
        mut engine,
        mut vault,
        mut token,
        owners,
    } = funded_vault(&mut rng, RecoveryPolicy::SingleOwner);
    let recipient = testing::gen_address(&mut rng);

    // owner 0 proposes 50 to a non-owner; proposal auto-confirms.
    let amount = engine.encrypt_amount(50, vault.address(), owners[0]);
    let id = vault
        .propose_transaction(&mut engine, owners[0], token.address(), recipient, &amount)
        .unwrap();
    assert_eq!(vault.get_transaction(id).unwrap().confirmations.len(), 1);

    // Below threshold: execution must fail.
    assert_eq!(
        vault.execute_transaction(&mut engine, owners[0], &mut token, id),
        Err(Error::NotEnoughConfirmations {
            have: 1,
            required: 2
        })
    );

    // owner 1 confirms, owner 0 executes.
    vault.confirm_transaction(owners[1], id).unwrap();
    vault
        .execute_transaction(&mut engine, owners[0], &mut token, id)
        .unwrap();

    assert!(vault.get_transaction(id).unwrap().executed);
    assert_eq!(
        engine
            .decrypt_amount(vault.vault_balance(token.address()).unwrap(), owners[0])
            .unwrap(),
        150
    );
    assert_eq!(
        engine
            .decrypt_amount(token.balance_of(recipient).unwrap(), recipient)
            .unwrap(),
        50
    );

    // Executing twice fails.
    assert_eq!(
        vault.execute_transaction(&mut engine, owners[0], &mut token, id),
        Err(Error::AlreadyExecuted { id })
    );
}

#[test]
fn under_confirmed_transaction_cannot_execute() {
    let mut rng = StdRng::from_seed([33u8; 32]);
    let Fixture {
        mut engine,
        mut vault,
        mut token,
        owners,
    } = funded_vault(&mut rng, RecoveryPolicy::SingleOwner);
    let recipient = testing::gen_address(&mut rng);

    let amount = engine.encrypt_amount(10, vault.address(), owners[1]);
    let id = vault
        .propose_transaction(&mut engine, owners[1], token.address(), recipient, &amount)
        .unwrap();

    let result = vault.execute_transaction(&mut engine, owners[1], &mut token, id);
    assert_eq!(
        result,
        Err(Error::NotEnoughConfirmations {
            have: 1,
            required: 2
        })
    );
    assert_eq!(
        result.unwrap_err().to_string(),
        "Not enough confirmations: 1 of 2"
    );
    assert!(!vault.get_transaction(id).unwrap().executed);
}

#[test]
fn confirmation_state_machine_rejects_bad_moves() {
    let mut rng = StdRng::from_seed([34u8; 32]);
    let Fixture {
        mut engine,
        mut vault,
        token,
        owners,
    } = funded_vault(&mut rng, RecoveryPolicy::SingleOwner);
    let outsider = testing::gen_address(&mut rng);
    let recipient = testing::gen_address(&mut rng);

    let amount = engine.encrypt_amount(10, vault.address(), owners[0]);
    let id = vault
        .propose_transaction(&mut engine, owners[0], token.address(), recipient, &amount)
        .unwrap();

    assert_eq!(vault.confirm_transaction(outsider, id), Err(Error::NotOwner));
    assert_eq!(
        vault.confirm_transaction(owners[0], id),
        Err(Error::AlreadyConfirmed { id })
    );
    assert_eq!(
        vault.confirm_transaction(owners[0], 99),
        Err(Error::TransactionNotFound { id: 99 })
    );
}

#[test]
fn single_owner_recovery_bypasses_threshold() {
    let mut rng = StdRng::from_seed([35u8; 32]);
    let Fixture {
        mut engine,
        mut vault,
        mut token,
        owners,
    } = funded_vault(&mut rng, RecoveryPolicy::SingleOwner);
    let recipient = testing::gen_address(&mut rng);

    // One owner, no confirmations from anyone else.
    let amount = engine.encrypt_amount(80, vault.address(), owners[2]);
    let status = vault
        .emergency_recover(&mut engine, owners[2], &mut token, recipient, &amount)
        .unwrap();
    assert_eq!(status, RecoveryStatus::Completed);

    assert_eq!(
        engine
            .decrypt_amount(token.balance_of(recipient).unwrap(), recipient)
            .unwrap(),
        80
    );
    assert_eq!(
        engine
            .decrypt_amount(vault.vault_balance(token.address()).unwrap(), owners[0])
            .unwrap(),
        120
    );
}

#[test]
fn all_owners_recovery_requires_full_consensus() {
    let mut rng = StdRng::from_seed([36u8; 32]);
    let Fixture {
        mut engine,
        mut vault,
        mut token,
        owners,
    } = funded_vault(&mut rng, RecoveryPolicy::AllOwners);
    let recipient = testing::gen_address(&mut rng);

    let amount = engine.encrypt_amount(80, vault.address(), owners[0]);
    let status = vault
        .emergency_recover(&mut engine, owners[0], &mut token, recipient, &amount)
        .unwrap();
    assert_eq!(status, RecoveryStatus::Pending(0));
    // Funds have not moved yet.
    assert!(token.balance_of(recipient).is_none());

    assert_eq!(
        vault.approve_recovery(&mut engine, owners[1], &mut token, 0),
        Ok(RecoveryStatus::Pending(0))
    );
    assert_eq!(
        vault.approve_recovery(&mut engine, owners[2], &mut token, 0),
        Ok(RecoveryStatus::Completed)
    );
    assert_eq!(
        engine
            .decrypt_amount(token.balance_of(recipient).unwrap(), recipient)
            .unwrap(),
        80
    );
}

#[test]
fn deposits_are_open_to_non_owners() {
    let mut rng = StdRng::from_seed([37u8; 32]);
    let Fixture {
        mut engine,
        mut vault,
        mut token,
        owners: _,
    } = funded_vault(&mut rng, RecoveryPolicy::SingleOwner);
    let depositor = testing::gen_address(&mut rng);

    testing::fund_account(&mut engine, &mut token, depositor, 300).unwrap();
    let approval = engine.encrypt_amount(300, token.address(), depositor);
    token
        .approve(
            &mut engine,
            depositor,
            vault.address(),
            AmountSource::External(&approval),
        )
        .unwrap();

    let deposit = engine.encrypt_amount(300, vault.address(), depositor);
    vault
        .deposit_tokens(&mut engine, depositor, &mut token, &deposit)
        .unwrap();

    assert_eq!(
        engine
            .decrypt_amount(vault.vault_balance(token.address()).unwrap(), vault.owners()[0])
            .unwrap(),
        500
    );
}
