use confidential_tokens::{
    testing::{self, MockFheEngine},
    AmountSource, Error, SENTINEL_AMOUNT,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn transfer_conserves_total_supply() {
    let mut rng = StdRng::from_seed([17u8; 32]);
    let mut engine = MockFheEngine::new();
    let sender = testing::gen_address(&mut rng);
    let receiver = testing::gen_address(&mut rng);
    let mut token = testing::setup_token(&mut rng, &mut engine, sender, 1_000).unwrap();

    let amount = engine.encrypt_amount(400, token.address(), sender);
    token
        .transfer(&mut engine, sender, receiver, AmountSource::External(&amount))
        .unwrap();

    assert_eq!(
        engine
            .decrypt_amount(token.balance_of(sender).unwrap(), sender)
            .unwrap(),
        600
    );
    assert_eq!(
        engine
            .decrypt_amount(token.balance_of(receiver).unwrap(), receiver)
            .unwrap(),
        400
    );
    assert_eq!(
        engine.decrypt_amount(token.total_supply(), sender).unwrap(),
        1_000
    );
}

#[test]
fn approve_then_partial_transfer_from() {
    let mut rng = StdRng::from_seed([18u8; 32]);
    let mut engine = MockFheEngine::new();
    let owner = testing::gen_address(&mut rng);
    let spender = testing::gen_address(&mut rng);
    let recipient = testing::gen_address(&mut rng);
    let mut token = testing::setup_token(&mut rng, &mut engine, owner, 1_000).unwrap();

    let approval = engine.encrypt_amount(100, token.address(), owner);
    token
        .approve(&mut engine, owner, spender, AmountSource::External(&approval))
        .unwrap();

    let amount = engine.encrypt_amount(60, token.address(), spender);
    token
        .transfer_from(
            &mut engine,
            spender,
            owner,
            recipient,
            AmountSource::External(&amount),
        )
        .unwrap();

    assert_eq!(
        engine
            .decrypt_amount(token.allowance(owner, spender).unwrap(), spender)
            .unwrap(),
        40
    );
    assert_eq!(
        engine
            .decrypt_amount(token.balance_of(recipient).unwrap(), recipient)
            .unwrap(),
        60
    );
}

#[test]
fn mint_burn_round_trip_restores_state() {
    let mut rng = StdRng::from_seed([19u8; 32]);
    let mut engine = MockFheEngine::new();
    let issuer = testing::gen_address(&mut rng);
    let account = testing::gen_address(&mut rng);
    let mut token = testing::setup_token(&mut rng, &mut engine, issuer, 500).unwrap();

    testing::fund_account(&mut engine, &mut token, account, 200).unwrap();
    let supply_after_mint = engine.decrypt_amount(token.total_supply(), issuer).unwrap();
    assert_eq!(supply_after_mint, 700);

    let burn = engine.encrypt_amount(200, token.address(), issuer);
    token
        .burn(&mut engine, issuer, account, AmountSource::External(&burn))
        .unwrap();

    assert_eq!(
        engine.decrypt_amount(token.total_supply(), issuer).unwrap(),
        500
    );
    assert_eq!(
        engine
            .decrypt_amount(token.balance_of(account).unwrap(), account)
            .unwrap(),
        0
    );
}

#[test]
fn decryption_requires_a_grant() {
    let mut rng = StdRng::from_seed([20u8; 32]);
    let mut engine = MockFheEngine::new();
    let sender = testing::gen_address(&mut rng);
    let receiver = testing::gen_address(&mut rng);
    let outsider = testing::gen_address(&mut rng);
    let mut token = testing::setup_token(&mut rng, &mut engine, sender, 1_000).unwrap();

    let amount = engine.encrypt_amount(10, token.address(), sender);
    token
        .transfer(&mut engine, sender, receiver, AmountSource::External(&amount))
        .unwrap();

    let receiver_balance = token.balance_of(receiver).unwrap();
    assert_eq!(engine.decrypt_amount(receiver_balance, receiver), Ok(10));
    assert_eq!(
        engine.decrypt_amount(receiver_balance, outsider),
        Err(Error::AccessDenied)
    );
}

#[test]
fn replaced_cells_stay_decryptable_under_old_grants() {
    let mut rng = StdRng::from_seed([21u8; 32]);
    let mut engine = MockFheEngine::new();
    let sender = testing::gen_address(&mut rng);
    let receiver = testing::gen_address(&mut rng);
    let mut token = testing::setup_token(&mut rng, &mut engine, sender, 1_000).unwrap();

    let old_balance = token.balance_of(sender).unwrap();
    let amount = engine.encrypt_amount(100, token.address(), sender);
    token
        .transfer(&mut engine, sender, receiver, AmountSource::External(&amount))
        .unwrap();

    // Overwriting the cell drops no grant on the superseded ciphertext.
    assert_eq!(engine.decrypt_amount(old_balance, sender), Ok(1_000));
}

#[test]
fn public_events_never_leak_amounts() {
    let mut rng = StdRng::from_seed([22u8; 32]);
    let mut engine = MockFheEngine::new();
    let sender = testing::gen_address(&mut rng);
    let receiver = testing::gen_address(&mut rng);
    let mut token = testing::setup_token(&mut rng, &mut engine, sender, 1_000).unwrap();

    let amount = engine.encrypt_amount(123, token.address(), sender);
    token
        .transfer(&mut engine, sender, receiver, AmountSource::External(&amount))
        .unwrap();
    let approval = engine.encrypt_amount(77, token.address(), sender);
    token
        .approve(&mut engine, sender, receiver, AmountSource::External(&approval))
        .unwrap();

    use confidential_tokens::TokenEvent;
    for event in token.events() {
        match event {
            TokenEvent::Transfer { amount, .. }
            | TokenEvent::Approval { amount, .. }
            | TokenEvent::EncryptedTransfer { amount, .. }
            | TokenEvent::EncryptedApproval { amount, .. } => assert_eq!(*amount, SENTINEL_AMOUNT),
            TokenEvent::AddressEncrypted { .. } => {}
        }
    }
}
