//! Cross-contract clients for the collaborators the funding contract calls.
//!
//! Only the calls the contract actually makes are declared. Token transfers
//! go through `soroban_sdk::token::Client`.

use soroban_sdk::contracttype;

/// Roles understood by the access gate.
#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    /// Discount band, discount manager, sale recipient, price bounds, oracle.
    ContractGovernance = 0,
    /// Day-to-day discount and the asset cap.
    PolicyOperations = 1,
    /// Sweeps and treasury claims.
    TreasuryOperations = 2,
}

pub mod gate {
    use super::Role;
    use soroban_sdk::{contractclient, Address, Env};

    #[contractclient(name = "AccessGateClient")]
    pub trait AccessGate {
        fn has_role(env: Env, role: Role, account: Address) -> bool;
        fn paused(env: Env) -> bool;
    }
}

pub mod vault {
    use soroban_sdk::{contractclient, Address, Env};

    /// Yield-bearing wrapper around the reward token. The share count it
    /// reports minting is not trusted; callers diff `balance` instead.
    #[contractclient(name = "RewardVaultClient")]
    pub trait RewardVault {
        fn deposit_for(env: Env, recipient: Address, amount: i128);
        fn balance(env: Env, id: Address) -> i128;
        fn get_price_per_full_share(env: Env) -> i128;
    }
}
