use std::sync::Arc;
use std::time::Duration;

use squarrin::ledger::LedgerError;
use squarrin::token::{BootstrapTarget, TokenError};
use squarrin::{Address, Deployer, Deployment, LedgerConfig, ManualClock, TOTAL_SUPPLY};

struct Fixture {
    deployer: Deployer,
    owner: Address,
    admin: Address,
    deployment: Deployment,
}

fn deployed(percentage: u32) -> Fixture {
    let mut deployer = Deployer::new(Address::random());
    let owner = Address::random();
    let admin = Address::random();
    let deployment = deployer
        .deploy(
            &LedgerConfig::new(admin, percentage),
            owner,
            Arc::new(ManualClock::new(1_700_000_000)),
        )
        .map_err(|e| e.to_string())
        .expect("deploy");
    Fixture {
        deployer,
        owner,
        admin,
        deployment,
    }
}

#[test]
fn ledger_initial_state() {
    let f = deployed(5);
    let ledger = &f.deployment.ledger;
    assert!(ledger.is_admin(&f.admin));
    assert!(!ledger.is_admin(&f.owner));
    assert_eq!(ledger.reward_percentage(), 5);
    assert_eq!(
        ledger.following_time_for_reward(),
        Duration::from_secs(4 * 7 * 24 * 3600)
    );
    assert_eq!(ledger.last_product_id(), 0);
}

#[test]
fn mutual_linkage_holds_after_deployment() {
    let f = deployed(5);
    let Deployment { ledger, token } = &f.deployment;
    assert_eq!(ledger.token_address(), Some(token.address()));
    assert_eq!(token.default_operators().len(), 1);
    assert_eq!(token.default_operators()[0], ledger.address());
}

#[test]
fn token_read_surface() {
    let f = deployed(5);
    let token = &f.deployment.token;
    assert_eq!(token.name(), "Quadreum");
    assert_eq!(token.symbol(), "QUAD");
    assert_eq!(token.total_supply(), 80 * 10u128.pow(27));
    assert_eq!(token.total_supply(), TOTAL_SUPPLY);
    assert_eq!(token.owner(), f.owner);
    assert_eq!(token.balance_of(&f.owner), TOTAL_SUPPLY);
    assert_eq!(token.balance_of(&f.admin), 0);
    assert_eq!(token.balance_of(&f.deployment.ledger.address()), 0);
}

#[test]
fn direct_second_bootstrap_is_rejected_for_any_caller() {
    let f = deployed(5);
    let ledger = &f.deployment.ledger;
    let token = f.deployment.token.address();
    for caller in [token, f.admin, f.owner, Address::random()] {
        assert_eq!(
            ledger.set_token_address(&caller, Address::random()),
            Err(LedgerError::AlreadyBound { token })
        );
    }
    assert_eq!(ledger.token_address(), Some(token));
}

#[test]
fn second_token_against_same_ledger_fails() {
    let mut f = deployed(5);
    let ledger = f.deployment.ledger.clone();
    let err = f
        .deployer
        .deploy_token(f.owner, vec![ledger.address()], &ledger)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Squarrin: Quadreum address is already set"
    );
    assert_eq!(ledger.token_address(), Some(f.deployment.token.address()));
}

#[test]
fn token_requires_exactly_one_operator() {
    let mut deployer = Deployer::new(Address::random());
    let ledger = deployer
        .deploy_ledger(
            &LedgerConfig::new(Address::random(), 5),
            Arc::new(ManualClock::new(0)),
        )
        .unwrap();
    let owner = Address::random();

    let none = deployer.deploy_token(owner, vec![], &ledger).unwrap_err();
    assert_eq!(none, TokenError::InvalidOperatorCount { count: 0 });
    let two = deployer
        .deploy_token(owner, vec![ledger.address(), Address::random()], &ledger)
        .unwrap_err();
    assert_eq!(two.to_string(), "Quadreum: Only one default operator is allowed");
    assert_eq!(ledger.token_address(), None);

    let token = deployer
        .deploy_token(owner, vec![ledger.address()], &ledger)
        .unwrap();
    assert_eq!(ledger.token_address(), Some(token.address()));
}

#[test]
fn percentage_bounds_at_construction() {
    for p in [0, 1, 50, 99, 100] {
        let f = deployed(p);
        assert_eq!(f.deployment.ledger.reward_percentage() as u32, p);
    }
    let mut deployer = Deployer::new(Address::random());
    let err = deployer
        .deploy_ledger(
            &LedgerConfig::new(Address::random(), 101),
            Arc::new(ManualClock::new(0)),
        )
        .err()
        .expect("percentage above 100 must fail");
    assert_eq!(err.to_string(), "Squarrin: Invalid percentage number");
}
