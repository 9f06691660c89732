#![cfg(test)]
use soroban_sdk::{
    symbol_short, testutils::Address as _, testutils::Events as _, Address, Env, Symbol,
    TryFromVal,
};

use crate::test_fixtures::{
    create_token, mint, MockGate, ReentrantVault, ReentrantVaultClient, Setup, DEFAULT_PRICE,
};
use crate::{CitadelFunding, CitadelFundingClient, FundingError};

const WAD: i128 = 1_000_000_000_000_000_000;

fn deposit_payload(env: &Env) -> (i128, i128, i128) {
    let (_contract, topics, data) = env.events().all().last().unwrap();
    let topic = Symbol::try_from_val(env, &topics.get(0).unwrap()).unwrap();
    assert_eq!(topic, symbol_short!("deposit"));
    <(i128, i128, i128)>::try_from_val(env, &data).unwrap()
}

// ── vault share accounting ────────────────────────────────────

#[test]
fn short_minting_vault_reports_observed_shares() {
    let s = Setup::new().priced(DEFAULT_PRICE, 1_000_000);
    s.vault.set_mint_bps(&9_000);

    let reward = s.client.deposit(&s.buyer, &250_000, &0);
    assert_eq!(reward, 100 * WAD);

    let (asset_in, shares, nominal) = deposit_payload(&s.env);
    assert_eq!(asset_in, 250_000);
    assert_eq!(nominal, 100 * WAD);
    assert_eq!(shares, 90 * WAD);
    assert_eq!(s.vault.balance(&s.buyer), shares);
}

#[test]
fn over_minting_vault_reports_observed_shares() {
    let s = Setup::new().priced(DEFAULT_PRICE, 1_000_000);
    s.vault.set_mint_bps(&12_500);

    s.client.deposit(&s.buyer, &2_500, &0);
    let (_, shares, nominal) = deposit_payload(&s.env);
    assert_eq!(nominal, WAD);
    assert_eq!(shares, WAD + WAD / 4);
}

#[test]
fn share_delta_ignores_existing_balance() {
    let s = Setup::new().priced(DEFAULT_PRICE, 1_000_000);
    s.client.deposit(&s.buyer, &5_000, &0);
    assert_eq!(s.vault.balance(&s.buyer), 2 * WAD);

    s.vault.set_mint_bps(&5_000);
    s.client.deposit(&s.buyer, &5_000, &0);
    let (_, shares, _) = deposit_payload(&s.env);
    assert_eq!(shares, WAD);
    assert_eq!(s.vault.balance(&s.buyer), 3 * WAD);
}

#[test]
fn cumulative_tracks_asset_not_shares() {
    let s = Setup::new().priced(DEFAULT_PRICE, 1_000_000);
    s.vault.set_mint_bps(&1);
    s.client.deposit(&s.buyer, &10_000, &0);
    s.client.deposit(&s.buyer, &20_000, &0);
    assert_eq!(s.client.get_funding_params().asset_cumulative_funded, 30_000);
    assert_eq!(s.asset_balance(&s.sale_recipient), 30_000);
}

// ── failing and re-entering collaborators ─────────────────────

#[test]
fn failed_asset_transfer_rolls_back_ledger() {
    let s = Setup::new().priced(DEFAULT_PRICE, 1_000);

    assert!(s.client.try_deposit(&s.buyer, &5_000, &0).is_err());
    assert_eq!(s.client.get_funding_params().asset_cumulative_funded, 0);
    assert_eq!(s.asset_balance(&s.buyer), 1_000);
    assert_eq!(s.vault.balance(&s.buyer), 0);
    assert!(!s.client.is_locked());
}

// The host refuses the nested call into this contract before the lock is
// consulted. What matters here is that the outer deposit unwinds completely.
#[test]
fn reentrant_vault_call_fails_and_rolls_back() {
    let env = Env::default();
    env.mock_all_auths();

    let funding_id = env.register_contract(None, CitadelFunding);
    let client = CitadelFundingClient::new(&env, &funding_id);
    let gate_id = env.register_contract(None, MockGate);
    let vault_id = env.register_contract(None, ReentrantVault);
    ReentrantVaultClient::new(&env, &vault_id).set_funding(&funding_id);
    let (asset, _) = create_token(&env);

    let recipient = Address::generate(&env);
    let oracle = Address::generate(&env);
    let buyer = Address::generate(&env);
    client.initialize(&gate_id, &asset, &vault_id, &recipient, &oracle, &18, &1_000_000);
    client.update_citadel_price_in_asset(&oracle, &DEFAULT_PRICE);
    mint(&env, &asset, &buyer, 100_000);

    let result = client.try_deposit(&buyer, &2_500, &0);
    assert!(result.is_err());

    assert_eq!(client.get_funding_params().asset_cumulative_funded, 0);
    assert_eq!(
        soroban_sdk::token::Client::new(&env, &asset).balance(&buyer),
        100_000
    );
    assert_eq!(
        soroban_sdk::token::Client::new(&env, &asset).balance(&recipient),
        0
    );
    assert!(!client.is_locked());
}

#[test]
fn sweep_leaves_settlement_asset_and_ledger_alone() {
    let s = Setup::new().priced(DEFAULT_PRICE, 10_000);
    s.client.deposit(&s.buyer, &2_500, &0);

    let (stray, _) = create_token(&s.env);
    mint(&s.env, &stray, &s.contract_id, 42);
    mint(&s.env, &s.asset, &s.contract_id, 17);

    s.client.sweep(&s.treasury, &stray);
    assert_eq!(s.asset_balance(&s.contract_id), 17);
    assert_eq!(s.client.get_funding_params().asset_cumulative_funded, 2_500);

    assert_eq!(
        s.client.try_sweep(&s.treasury, &s.asset),
        Err(Ok(FundingError::CannotSweepFundingAsset))
    );
    s.client.claim_asset_to_treasury(&s.treasury);
    assert_eq!(s.asset_balance(&s.sale_recipient), 2_500 + 17);
    assert_eq!(s.client.get_funding_params().asset_cumulative_funded, 2_500);
}
