#![no_std]
#![deny(unsafe_code)]
#![deny(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, symbol_short, token, Address, Env,
    Symbol,
};

pub mod interfaces;

pub use interfaces::gate::AccessGateClient;
pub use interfaces::vault::RewardVaultClient;
pub use interfaces::Role;

/// Contract error codes. Auth failures are signaled by host panic (require_auth).
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[repr(u32)]
pub enum FundingError {
    /// `initialize` has not run yet.
    NotInitialized = 1,
    /// `initialize` already ran.
    AlreadyInitialized = 2,
    /// Caller lacks the role or delegation the operation requires.
    Unauthorized = 3,
    /// The access gate reports a global pause.
    Paused = 4,
    ZeroAmount = 5,
    NegativeAmount = 6,
    ZeroPrice = 7,
    /// Sale recipient would be the contract itself.
    InvalidRecipient = 8,
    /// Settlement would push cumulative funding past the cap.
    CapExceeded = 9,
    /// Computed reward is below the caller's minimum.
    SlippageExceeded = 10,
    BelowMinDiscount = 11,
    AboveMaxDiscount = 12,
    /// New cap is not above the asset already taken.
    CapBelowCumulative = 13,
    NothingToSweep = 14,
    NothingToClaim = 15,
    /// The settlement asset only leaves through `claim_asset_to_treasury`.
    CannotSweepFundingAsset = 16,
    /// A guarded call is already in progress.
    ReentrancyDetected = 17,
    /// The oracle has not published a price yet.
    PriceNotSet = 18,
    /// The input floors to zero reward.
    ZeroRewardOut = 19,
    ArithmeticOverflow = 20,
    /// min > max, or max above 100%.
    InvalidDiscountLimits = 21,
    InvalidPriceBounds = 22,
    /// Reward decimals above MAX_REWARD_DECIMALS.
    InvalidDecimals = 23,
}

// ── Event symbols ────────────────────────────────────────────
const EVENT_INIT: Symbol = symbol_short!("init");
const EVENT_DEPOSIT: Symbol = symbol_short!("deposit");
const EVENT_PRICE_UPDATED: Symbol = symbol_short!("price_upd");
const EVENT_SHARE_PRICE_UPDATED: Symbol = symbol_short!("xc_price");
const EVENT_PRICE_BOUNDS_SET: Symbol = symbol_short!("price_bnd");
const EVENT_ORACLE_SET: Symbol = symbol_short!("oracle");
const EVENT_DISCOUNT_SET: Symbol = symbol_short!("disc_set");
const EVENT_DISCOUNT_LIMITS_SET: Symbol = symbol_short!("disc_lim");
const EVENT_DISCOUNT_MANAGER_SET: Symbol = symbol_short!("disc_mgr");
const EVENT_SALE_RECIPIENT_SET: Symbol = symbol_short!("recip_set");
const EVENT_ASSET_CAP_SET: Symbol = symbol_short!("cap_set");
const EVENT_SWEEP: Symbol = symbol_short!("sweep");
const EVENT_CLAIM: Symbol = symbol_short!("claim");

/// Basis-point denominator; discounts never exceed it.
pub const MAX_BPS: u32 = 10_000;

/// Largest reward decimal scale accepted at initialization.
pub const MAX_REWARD_DECIMALS: u32 = 18;

// ── Data structures ──────────────────────────────────────────

/// Addresses and scale fixed at initialization; recipient and oracle are
/// governance-mutable.
#[contracttype]
#[derive(Clone, Debug, PartialEq)]
pub struct FundingConfig {
    pub access_gate: Address,
    /// Token buyers pay in.
    pub asset: Address,
    /// Reward vault that wraps the reward token into shares.
    pub xcitadel: Address,
    pub sale_recipient: Address,
    pub price_oracle: Address,
    pub reward_decimals: u32,
    /// 10^reward_decimals.
    pub reward_scale: i128,
}

/// Oracle-fed pricing. Bounds are advisory and stored for the oracle process.
#[contracttype]
#[derive(Clone, Debug, PartialEq)]
pub struct PriceState {
    /// Asset units per whole reward token. 0 = not yet priced.
    pub citadel_price_in_asset: i128,
    pub min_citadel_price_in_asset: i128,
    pub max_citadel_price_in_asset: i128,
    /// Last cached vault share price, scaled by the reward decimals.
    pub x_citadel_price_in_citadel: i128,
}

/// Discount band in basis points. `discount` always lies within
/// `[min_discount, max_discount]`.
#[contracttype]
#[derive(Clone, Debug, PartialEq)]
pub struct DiscountPolicy {
    pub discount: u32,
    pub min_discount: u32,
    pub max_discount: u32,
    /// Delegate allowed to call `set_discount` alongside the policy role.
    pub discount_manager: Option<Address>,
}

#[contracttype]
#[derive(Clone, Debug, PartialEq)]
pub struct FundingLedger {
    pub asset_cumulative_funded: i128,
    pub asset_cap: i128,
}

/// Storage keys. Everything lives in instance storage.
#[contracttype]
pub enum DataKey {
    Config,
    Price,
    Discount,
    Funding,
    /// Present while a guarded call is executing.
    Locked,
}

/// Operations that go through `authorize`.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Action {
    Deposit,
    SetDiscount,
    SetDiscountLimits,
    SetDiscountManager,
    SetSaleRecipient,
    SetPriceBounds,
    SetPriceOracle,
    UpdatePrice,
    RefreshSharePrice,
    SetAssetCap,
    Sweep,
    ClaimAsset,
}

/// Holds `DataKey::Locked` for the lifetime of the value.
struct ReentrancyGuard<'a> {
    env: &'a Env,
}

impl<'a> ReentrancyGuard<'a> {
    fn acquire(env: &'a Env) -> Result<Self, FundingError> {
        let storage = env.storage().instance();
        if storage.has(&DataKey::Locked) {
            return Err(FundingError::ReentrancyDetected);
        }
        storage.set(&DataKey::Locked, &true);
        Ok(Self { env })
    }
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        self.env.storage().instance().remove(&DataKey::Locked);
    }
}

// ── Contract ─────────────────────────────────────────────────
#[contract]
pub struct CitadelFunding;

impl CitadelFunding {
    fn load_config(env: &Env) -> Result<FundingConfig, FundingError> {
        env.storage()
            .instance()
            .get(&DataKey::Config)
            .ok_or(FundingError::NotInitialized)
    }

    fn load_price(env: &Env) -> Result<PriceState, FundingError> {
        env.storage()
            .instance()
            .get(&DataKey::Price)
            .ok_or(FundingError::NotInitialized)
    }

    fn load_discount(env: &Env) -> Result<DiscountPolicy, FundingError> {
        env.storage()
            .instance()
            .get(&DataKey::Discount)
            .ok_or(FundingError::NotInitialized)
    }

    fn load_ledger(env: &Env) -> Result<FundingLedger, FundingError> {
        env.storage()
            .instance()
            .get(&DataKey::Funding)
            .ok_or(FundingError::NotInitialized)
    }

    /// Pause first, then caller signature, then the action's role rule.
    /// Evaluated once per call; nothing is written before it passes.
    fn authorize(
        env: &Env,
        config: &FundingConfig,
        caller: &Address,
        action: Action,
    ) -> Result<(), FundingError> {
        let gate = AccessGateClient::new(env, &config.access_gate);
        if gate.paused() {
            return Err(FundingError::Paused);
        }
        caller.require_auth();

        let allowed = match action {
            Action::Deposit => true,
            Action::UpdatePrice | Action::RefreshSharePrice => *caller == config.price_oracle,
            Action::SetDiscount => {
                let policy = Self::load_discount(env)?;
                policy.discount_manager.as_ref() == Some(caller)
                    || gate.has_role(&Role::PolicyOperations, caller)
            }
            Action::SetAssetCap => gate.has_role(&Role::PolicyOperations, caller),
            Action::SetDiscountLimits
            | Action::SetDiscountManager
            | Action::SetSaleRecipient
            | Action::SetPriceBounds
            | Action::SetPriceOracle => gate.has_role(&Role::ContractGovernance, caller),
            Action::Sweep | Action::ClaimAsset => {
                gate.has_role(&Role::TreasuryOperations, caller)
            }
        };
        if !allowed {
            return Err(FundingError::Unauthorized);
        }
        Ok(())
    }

    fn require_non_negative(amount: i128) -> Result<(), FundingError> {
        if amount < 0 {
            return Err(FundingError::NegativeAmount);
        }
        Ok(())
    }

    fn require_positive_amount(amount: i128) -> Result<(), FundingError> {
        Self::require_non_negative(amount)?;
        if amount == 0 {
            return Err(FundingError::ZeroAmount);
        }
        Ok(())
    }

    /// floor(asset_amount_in * 10^reward_decimals / citadel_price_in_asset).
    /// Remainders stay with the seller.
    fn amount_out(
        config: &FundingConfig,
        price: &PriceState,
        asset_amount_in: i128,
    ) -> Result<i128, FundingError> {
        if price.citadel_price_in_asset == 0 {
            return Err(FundingError::PriceNotSet);
        }
        asset_amount_in
            .checked_mul(config.reward_scale)
            .and_then(|scaled| scaled.checked_div(price.citadel_price_in_asset))
            .ok_or(FundingError::ArithmeticOverflow)
    }
}

#[contractimpl]
impl CitadelFunding {
    // ── Bootstrapping ─────────────────────────────────────────

    /// One-time setup of collaborator addresses and the initial cap.
    /// Price, discount band and cumulative funding all start at zero.
    pub fn initialize(
        env: Env,
        access_gate: Address,
        asset: Address,
        xcitadel: Address,
        sale_recipient: Address,
        price_oracle: Address,
        reward_decimals: u32,
        asset_cap: i128,
    ) -> Result<(), FundingError> {
        if env.storage().instance().has(&DataKey::Config) {
            return Err(FundingError::AlreadyInitialized);
        }
        if reward_decimals > MAX_REWARD_DECIMALS {
            return Err(FundingError::InvalidDecimals);
        }
        if sale_recipient == env.current_contract_address() {
            return Err(FundingError::InvalidRecipient);
        }
        Self::require_non_negative(asset_cap)?;
        let reward_scale = 10_i128
            .checked_pow(reward_decimals)
            .ok_or(FundingError::ArithmeticOverflow)?;

        let config = FundingConfig {
            access_gate,
            asset: asset.clone(),
            xcitadel: xcitadel.clone(),
            sale_recipient,
            price_oracle,
            reward_decimals,
            reward_scale,
        };
        let storage = env.storage().instance();
        storage.set(&DataKey::Config, &config);
        storage.set(
            &DataKey::Price,
            &PriceState {
                citadel_price_in_asset: 0,
                min_citadel_price_in_asset: 0,
                max_citadel_price_in_asset: 0,
                x_citadel_price_in_citadel: 0,
            },
        );
        storage.set(
            &DataKey::Discount,
            &DiscountPolicy {
                discount: 0,
                min_discount: 0,
                max_discount: 0,
                discount_manager: None,
            },
        );
        storage.set(
            &DataKey::Funding,
            &FundingLedger {
                asset_cumulative_funded: 0,
                asset_cap,
            },
        );

        env.events()
            .publish((EVENT_INIT, asset, xcitadel), (reward_decimals, asset_cap));
        Ok(())
    }

    // ── Settlement ────────────────────────────────────────────

    /// Exchange `asset_amount_in` of the asset for vault shares worth the
    /// floored reward amount at the current price.
    ///
    /// The asset moves straight from `buyer` to the sale recipient, then the
    /// vault deposits `reward_out` on the buyer's behalf. The emitted share
    /// amount is the observed change in the buyer's vault balance, not what
    /// the vault claims to have minted.
    ///
    /// Returns the nominal reward amount.
    pub fn deposit(
        env: Env,
        buyer: Address,
        asset_amount_in: i128,
        min_reward_out: i128,
    ) -> Result<i128, FundingError> {
        let config = Self::load_config(&env)?;
        Self::authorize(&env, &config, &buyer, Action::Deposit)?;
        let _guard = ReentrancyGuard::acquire(&env)?;

        Self::require_positive_amount(asset_amount_in)?;
        Self::require_non_negative(min_reward_out)?;

        let mut ledger = Self::load_ledger(&env)?;
        let funded = ledger
            .asset_cumulative_funded
            .checked_add(asset_amount_in)
            .ok_or(FundingError::ArithmeticOverflow)?;
        if funded > ledger.asset_cap {
            return Err(FundingError::CapExceeded);
        }

        let price = Self::load_price(&env)?;
        let reward_out = Self::amount_out(&config, &price, asset_amount_in)?;
        if reward_out == 0 {
            return Err(FundingError::ZeroRewardOut);
        }
        if reward_out < min_reward_out {
            return Err(FundingError::SlippageExceeded);
        }

        // Ledger is committed before any external call.
        ledger.asset_cumulative_funded = funded;
        env.storage().instance().set(&DataKey::Funding, &ledger);

        token::Client::new(&env, &config.asset).transfer(
            &buyer,
            &config.sale_recipient,
            &asset_amount_in,
        );

        let vault = RewardVaultClient::new(&env, &config.xcitadel);
        let shares_before = vault.balance(&buyer);
        vault.deposit_for(&buyer, &reward_out);
        let shares_after = vault.balance(&buyer);
        let shares_gained = shares_after
            .checked_sub(shares_before)
            .ok_or(FundingError::ArithmeticOverflow)?;

        env.events().publish(
            (EVENT_DEPOSIT, buyer),
            (asset_amount_in, shares_gained, reward_out),
        );
        Ok(reward_out)
    }

    /// Reward amount `deposit` would compute for `asset_amount_in` right now.
    pub fn get_amount_out(env: Env, asset_amount_in: i128) -> Result<i128, FundingError> {
        Self::require_non_negative(asset_amount_in)?;
        let config = Self::load_config(&env)?;
        let price = Self::load_price(&env)?;
        Self::amount_out(&config, &price, asset_amount_in)
    }

    /// Nominal reward converted to vault shares at the cached share price.
    /// 0 until the oracle has refreshed the share price.
    pub fn get_vault_share_amount_out(
        env: Env,
        asset_amount_in: i128,
    ) -> Result<i128, FundingError> {
        Self::require_non_negative(asset_amount_in)?;
        let config = Self::load_config(&env)?;
        let price = Self::load_price(&env)?;
        if price.x_citadel_price_in_citadel == 0 {
            return Ok(0);
        }
        let reward_out = Self::amount_out(&config, &price, asset_amount_in)?;
        reward_out
            .checked_mul(config.reward_scale)
            .and_then(|scaled| scaled.checked_div(price.x_citadel_price_in_citadel))
            .ok_or(FundingError::ArithmeticOverflow)
    }

    // ── Discount policy ───────────────────────────────────────

    /// Replace the discount band (governance only). Rejects an inverted band
    /// or one above 100%. A current discount outside the new band is clamped
    /// into it and re-announced.
    pub fn set_discount_limits(
        env: Env,
        caller: Address,
        min_discount: u32,
        max_discount: u32,
    ) -> Result<(), FundingError> {
        let config = Self::load_config(&env)?;
        Self::authorize(&env, &config, &caller, Action::SetDiscountLimits)?;

        if min_discount > max_discount || max_discount > MAX_BPS {
            return Err(FundingError::InvalidDiscountLimits);
        }

        let mut policy = Self::load_discount(&env)?;
        let clamped = policy.discount.clamp(min_discount, max_discount);
        let reclamped = clamped != policy.discount;
        policy.min_discount = min_discount;
        policy.max_discount = max_discount;
        policy.discount = clamped;
        env.storage().instance().set(&DataKey::Discount, &policy);

        env.events().publish(
            (EVENT_DISCOUNT_LIMITS_SET, caller.clone()),
            (min_discount, max_discount),
        );
        if reclamped {
            env.events()
                .publish((EVENT_DISCOUNT_SET, caller), clamped);
        }
        Ok(())
    }

    /// Set the active discount. Policy operations role or the discount manager.
    pub fn set_discount(env: Env, caller: Address, discount: u32) -> Result<(), FundingError> {
        let config = Self::load_config(&env)?;
        Self::authorize(&env, &config, &caller, Action::SetDiscount)?;

        let mut policy = Self::load_discount(&env)?;
        if discount < policy.min_discount {
            return Err(FundingError::BelowMinDiscount);
        }
        if discount > policy.max_discount {
            return Err(FundingError::AboveMaxDiscount);
        }
        policy.discount = discount;
        env.storage().instance().set(&DataKey::Discount, &policy);

        env.events().publish((EVENT_DISCOUNT_SET, caller), discount);
        Ok(())
    }

    /// Replace the discount delegate (governance only). `None` disables delegation.
    pub fn set_discount_manager(
        env: Env,
        caller: Address,
        manager: Option<Address>,
    ) -> Result<(), FundingError> {
        let config = Self::load_config(&env)?;
        Self::authorize(&env, &config, &caller, Action::SetDiscountManager)?;

        let mut policy = Self::load_discount(&env)?;
        policy.discount_manager = manager.clone();
        env.storage().instance().set(&DataKey::Discount, &policy);

        env.events()
            .publish((EVENT_DISCOUNT_MANAGER_SET, caller), manager);
        Ok(())
    }

    pub fn get_discount_policy(env: Env) -> Result<DiscountPolicy, FundingError> {
        Self::load_discount(&env)
    }

    // ── Price state ───────────────────────────────────────────

    /// Publish a new asset-per-reward price (oracle only). Bounds are not
    /// enforced here; the oracle consults them before calling.
    pub fn update_citadel_price_in_asset(
        env: Env,
        caller: Address,
        price: i128,
    ) -> Result<(), FundingError> {
        let config = Self::load_config(&env)?;
        Self::authorize(&env, &config, &caller, Action::UpdatePrice)?;

        Self::require_non_negative(price)?;
        if price == 0 {
            return Err(FundingError::ZeroPrice);
        }

        let mut state = Self::load_price(&env)?;
        state.citadel_price_in_asset = price;
        env.storage().instance().set(&DataKey::Price, &state);

        env.events().publish((EVENT_PRICE_UPDATED, caller), price);
        Ok(())
    }

    /// Cache the vault's current share price (oracle only). Informational;
    /// settlement never reads it.
    pub fn refresh_x_citadel_price(env: Env, caller: Address) -> Result<i128, FundingError> {
        let config = Self::load_config(&env)?;
        Self::authorize(&env, &config, &caller, Action::RefreshSharePrice)?;

        let share_price =
            RewardVaultClient::new(&env, &config.xcitadel).get_price_per_full_share();

        let mut state = Self::load_price(&env)?;
        state.x_citadel_price_in_citadel = share_price;
        env.storage().instance().set(&DataKey::Price, &state);

        env.events()
            .publish((EVENT_SHARE_PRICE_UPDATED, caller), share_price);
        Ok(share_price)
    }

    /// Store the advisory price band for the oracle (governance only).
    pub fn set_citadel_price_bounds(
        env: Env,
        caller: Address,
        min_price: i128,
        max_price: i128,
    ) -> Result<(), FundingError> {
        let config = Self::load_config(&env)?;
        Self::authorize(&env, &config, &caller, Action::SetPriceBounds)?;

        if min_price < 0 || max_price < 0 || min_price > max_price {
            return Err(FundingError::InvalidPriceBounds);
        }

        let mut state = Self::load_price(&env)?;
        state.min_citadel_price_in_asset = min_price;
        state.max_citadel_price_in_asset = max_price;
        env.storage().instance().set(&DataKey::Price, &state);

        env.events()
            .publish((EVENT_PRICE_BOUNDS_SET, caller), (min_price, max_price));
        Ok(())
    }

    /// Rotate the price oracle (governance only).
    pub fn set_price_oracle(env: Env, caller: Address, oracle: Address) -> Result<(), FundingError> {
        let mut config = Self::load_config(&env)?;
        Self::authorize(&env, &config, &caller, Action::SetPriceOracle)?;

        config.price_oracle = oracle.clone();
        env.storage().instance().set(&DataKey::Config, &config);

        env.events().publish((EVENT_ORACLE_SET, caller), oracle);
        Ok(())
    }

    pub fn get_price_state(env: Env) -> Result<PriceState, FundingError> {
        Self::load_price(&env)
    }

    // ── Funding ledger ────────────────────────────────────────

    /// Raise (or re-set) the lifetime asset cap. The new cap must stay above
    /// what has already been funded.
    pub fn set_asset_cap(env: Env, caller: Address, asset_cap: i128) -> Result<(), FundingError> {
        let config = Self::load_config(&env)?;
        Self::authorize(&env, &config, &caller, Action::SetAssetCap)?;

        let mut ledger = Self::load_ledger(&env)?;
        if asset_cap <= ledger.asset_cumulative_funded {
            return Err(FundingError::CapBelowCumulative);
        }
        let previous = ledger.asset_cap;
        ledger.asset_cap = asset_cap;
        env.storage().instance().set(&DataKey::Funding, &ledger);

        env.events()
            .publish((EVENT_ASSET_CAP_SET, caller), (previous, asset_cap));
        Ok(())
    }

    /// Asset still accepted before the cap is hit.
    pub fn get_remaining_fundable(env: Env) -> Result<i128, FundingError> {
        let ledger = Self::load_ledger(&env)?;
        Ok(ledger
            .asset_cap
            .saturating_sub(ledger.asset_cumulative_funded)
            .max(0))
    }

    pub fn get_funding_params(env: Env) -> Result<FundingLedger, FundingError> {
        Self::load_ledger(&env)
    }

    // ── Treasury operations ───────────────────────────────────

    /// Move this contract's whole balance of a stray `token` to the sale
    /// recipient. The settlement asset must go through `claim_asset_to_treasury`.
    pub fn sweep(env: Env, caller: Address, token: Address) -> Result<i128, FundingError> {
        let config = Self::load_config(&env)?;
        Self::authorize(&env, &config, &caller, Action::Sweep)?;
        let _guard = ReentrancyGuard::acquire(&env)?;

        if token == config.asset {
            return Err(FundingError::CannotSweepFundingAsset);
        }

        let client = token::Client::new(&env, &token);
        let contract_addr = env.current_contract_address();
        let amount = client.balance(&contract_addr);
        if amount <= 0 {
            return Err(FundingError::NothingToSweep);
        }
        client.transfer(&contract_addr, &config.sale_recipient, &amount);

        env.events()
            .publish((EVENT_SWEEP, token), (config.sale_recipient, amount));
        Ok(amount)
    }

    /// Flush the asset balance held by this contract to the sale recipient.
    pub fn claim_asset_to_treasury(env: Env, caller: Address) -> Result<i128, FundingError> {
        let config = Self::load_config(&env)?;
        Self::authorize(&env, &config, &caller, Action::ClaimAsset)?;
        let _guard = ReentrancyGuard::acquire(&env)?;

        let client = token::Client::new(&env, &config.asset);
        let contract_addr = env.current_contract_address();
        let amount = client.balance(&contract_addr);
        if amount <= 0 {
            return Err(FundingError::NothingToClaim);
        }
        client.transfer(&contract_addr, &config.sale_recipient, &amount);

        env.events()
            .publish((EVENT_CLAIM, config.asset), (config.sale_recipient, amount));
        Ok(amount)
    }

    // ── Configuration ─────────────────────────────────────────

    /// Replace the address receiving proceeds and sweeps (governance only).
    pub fn set_sale_recipient(
        env: Env,
        caller: Address,
        recipient: Address,
    ) -> Result<(), FundingError> {
        let mut config = Self::load_config(&env)?;
        Self::authorize(&env, &config, &caller, Action::SetSaleRecipient)?;

        if recipient == env.current_contract_address() {
            return Err(FundingError::InvalidRecipient);
        }
        config.sale_recipient = recipient.clone();
        env.storage().instance().set(&DataKey::Config, &config);

        env.events()
            .publish((EVENT_SALE_RECIPIENT_SET, caller), recipient);
        Ok(())
    }

    pub fn get_config(env: Env) -> Result<FundingConfig, FundingError> {
        Self::load_config(&env)
    }

    /// Whether a guarded call is currently executing.
    pub fn is_locked(env: Env) -> bool {
        env.storage().instance().has(&DataKey::Locked)
    }
}

#[cfg(test)]
mod test_cross_contract;
