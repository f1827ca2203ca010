#![allow(deprecated)]

//! # Meridian Stability Pool Blueprint
//!
//! This blueprint defines the `StabilityPool` component, the first line of defense
//! against undercollateralized troves. Users deposit mUSD; when a trove is
//! liquidated, pooled mUSD is burned against its debt and the seized collateral is
//! credited to the depositors in exchange.
//!
//! ## Functionality
//! - **Depositing:** mUSD deposits are tracked with receipt NFTs carrying the
//!   product-sum snapshots taken at deposit time.
//! - **Liquidations:** The public `liquidate` entry point funds the core component's
//!   liquidation with the pool's full mUSD balance and books the offset lazily: a
//!   global product `p` tracks pool depletion from debt burns, a per-kind sum `s`
//!   tracks cumulative collateral gains per deposited mUSD. No depositor is touched
//!   individually.
//! - **Withdrawing:** A withdrawal pays out the compounded deposit
//!   (`amount × p / p_snapshot`) plus the per-kind collateral gains accrued since
//!   the deposit's snapshot. A fully depleted pool starts a new epoch, zeroing all
//!   remaining deposits of the old one.
//!
//! ## Interaction with other components
//! - **`Meridian` (core):** `liquidate_trove` is called with the pooled mUSD,
//!   authorized by controller badges.

use crate::events::*;
use crate::meridian_component::meridian_component::*;
use scrypto::prelude::*;

/// Key for `s_sums`: (epoch, collateral kind). Aliased because the
/// `#[types(...)]` attribute only accepts type paths, not tuple literals.
type EpochCollateralKey = (u64, ResourceAddress);

/// Data struct of a stability pool deposit receipt.
#[derive(ScryptoSbor, NonFungibleData, Clone, Debug)]
pub struct StabilityDeposit {
    /// The deposited mUSD amount.
    pub amount: Decimal,
    /// The pool product at deposit time.
    pub p_snapshot: Decimal,
    /// The per-kind gain sums at deposit time, within `epoch`.
    pub s_snapshots: IndexMap<ResourceAddress, Decimal>,
    /// The pool epoch the deposit was made in.
    pub epoch: u64,
}

#[blueprint]
#[types(
    ResourceAddress,
    Vault,
    Decimal,
    NonFungibleLocalId,
    StabilityDeposit,
    u64,
    EpochCollateralKey
)]
#[events(
    StabilityPoolDepositEvent,
    StabilityPoolWithdrawalEvent,
    StabilityPoolOffsetEvent,
)]
mod stability_pool {
    enable_method_auth! {
        methods {
            receive_badges => PUBLIC;
            deposit => PUBLIC;
            withdraw => PUBLIC;
            liquidate => PUBLIC;
            get_pool_info => PUBLIC;
            get_deposit_info => PUBLIC;
            get_deposit_address => PUBLIC;
        }
    }

    /// Manages the mUSD stability pool absorbing liquidated debt in exchange for
    /// liquidated collateral.
    struct StabilityPool {
        /// Vault holding controller badges needed to authorize calls to the core.
        badge_vault: FungibleVault,
        /// Global reference to the core `Meridian` component.
        meridian: Global<Meridian>,
        /// Vault holding the pooled mUSD.
        musd_vault: Vault,
        /// Vaults holding the collateral gains, per kind.
        collateral_vaults: KeyValueStore<ResourceAddress, Vault>,
        /// Collateral kinds that have received gains, for iteration.
        collateral_addresses: Vec<ResourceAddress>,
        /// The `ResourceManager` for the deposit receipt NFTs.
        deposit_manager: ResourceManager,
        /// A counter to generate unique ids for deposit receipts.
        deposit_counter: u64,
        /// The pool product: the fraction of one deposited mUSD still present after
        /// all debt burns of the current epoch.
        p: Decimal,
        /// The current epoch. Bumped whenever the pool is fully depleted.
        epoch: u64,
        /// Cumulative collateral gain per deposited mUSD, keyed by (epoch, kind).
        s_sums: KeyValueStore<EpochCollateralKey, Decimal>,
    }

    impl StabilityPool {
        /// Instantiates the `StabilityPool` component.
        ///
        /// # Arguments
        /// * `controller_badge`: Controller badges authorizing calls into the core.
        /// * `musd_address`: The `ResourceAddress` of the mUSD token.
        /// * `meridian_address`: The `ComponentAddress` of the core component.
        /// * `dapp_def_address`: The `GlobalAddress` of the DApp Definition account.
        pub fn instantiate(
            controller_badge: Bucket,
            musd_address: ResourceAddress,
            meridian_address: ComponentAddress,
            dapp_def_address: GlobalAddress,
        ) -> Global<StabilityPool> {
            let (address_reservation, component_address) =
                Runtime::allocate_component_address(StabilityPool::blueprint_id());

            let badge_address = controller_badge.resource_address();
            let owner_role = OwnerRole::Fixed(rule!(require_amount(dec!("0.75"), badge_address)));

            let deposit_manager: ResourceManager =
                <scrypto::prelude::ResourceBuilder as StabilityPoolResourceBuilder>::new_integer_non_fungible_with_registered_type::<StabilityDeposit>(
                    OwnerRole::Fixed(rule!(require_amount(dec!("0.75"), badge_address))),
                )
                .metadata(metadata!(
                    init {
                        "name" => "Meridian Stability Deposit", locked;
                        "symbol" => "musdSTAB", locked;
                        "description" => "A receipt for your Meridian stability pool deposit.", locked;
                        "info_url" => "https://meridianusd.io", updatable;
                        "dapp_definitions" => vec![dapp_def_address], updatable;
                    }
                ))
                .mint_roles(mint_roles!(
                    minter => rule!(require(global_caller(component_address)));
                    minter_updater => rule!(deny_all);
                ))
                .burn_roles(burn_roles!(
                    burner => rule!(require(global_caller(component_address)));
                    burner_updater => rule!(deny_all);
                ))
                .create_with_no_initial_supply()
                .into();

            Self {
                badge_vault: FungibleVault::with_bucket(controller_badge.as_fungible()),
                meridian: Global::from(meridian_address),
                musd_vault: Vault::new(musd_address),
                collateral_vaults: <scrypto::component::KeyValueStore<_, _> as StabilityPoolKeyValueStore>::new_with_registered_type(),
                collateral_addresses: vec![],
                deposit_manager,
                deposit_counter: 0,
                p: Decimal::ONE,
                epoch: 0,
                s_sums: <scrypto::component::KeyValueStore<_, _> as StabilityPoolKeyValueStore>::new_with_registered_type(),
            }
            .instantiate()
            .prepare_to_globalize(owner_role)
            .with_address(address_reservation)
            .metadata(metadata! {
                init {
                    "name" => "Meridian Protocol Stability Pool".to_string(), updatable;
                    "description" => "The stability pool component for the Meridian Protocol".to_string(), updatable;
                    "info_url" => Url::of("https://meridianusd.io"), updatable;
                    "dapp_definition" => dapp_def_address, updatable;
                }
            })
            .globalize()
        }

        /// Allows the component to receive controller badges sent from other
        /// authorized components.
        pub fn receive_badges(&mut self, badge_bucket: Bucket) {
            self.badge_vault.put(badge_bucket.as_fungible());
        }

        /// Deposits mUSD into the pool.
        ///
        /// # Returns
        /// * `Bucket`: The deposit receipt NFT carrying the snapshots used to settle
        ///   the deposit later.
        pub fn deposit(&mut self, musd: Bucket) -> Bucket {
            assert!(
                musd.resource_address() == self.musd_vault.resource_address(),
                "Invalid mUSD deposit."
            );
            assert!(musd.amount() > Decimal::ZERO, "Empty deposit.");

            self.deposit_counter += 1;
            let deposit_id = NonFungibleLocalId::integer(self.deposit_counter);

            let mut s_snapshots: IndexMap<ResourceAddress, Decimal> = index_map_new();
            for address in &self.collateral_addresses {
                let s = self
                    .s_sums
                    .get(&(self.epoch, *address))
                    .map(|s| *s)
                    .unwrap_or(Decimal::ZERO);
                s_snapshots.insert(*address, s);
            }

            let amount = musd.amount();
            let deposit = StabilityDeposit {
                amount,
                p_snapshot: self.p,
                s_snapshots,
                epoch: self.epoch,
            };

            self.musd_vault.put(musd);

            let receipt = self.deposit_manager.mint_non_fungible(&deposit_id, deposit);

            Runtime::emit_event(StabilityPoolDepositEvent { amount, deposit_id });

            receipt
        }

        /// Withdraws a deposit: pays out the compounded mUSD plus the collateral
        /// gains accrued since the deposit's snapshots, and burns the receipt.
        ///
        /// # Returns
        /// * `(Bucket, Vec<Bucket>)`: The remaining mUSD and the gains per kind.
        pub fn withdraw(&mut self, receipt: Bucket) -> (Bucket, Vec<Bucket>) {
            assert!(
                receipt.resource_address() == self.deposit_manager.address(),
                "Invalid deposit receipt."
            );
            let deposit_id = receipt.as_non_fungible().non_fungible_local_id();
            let deposit: StabilityDeposit =
                self.deposit_manager.get_non_fungible_data(&deposit_id);

            let (compounded, gains) = self.settle(&deposit);

            let musd = self.musd_vault.take_advanced(
                compounded.min(self.musd_vault.amount()),
                WithdrawStrategy::Rounded(RoundingMode::ToZero),
            );

            let mut collateral: Vec<Bucket> = Vec::new();
            let mut gain_amounts: IndexMap<ResourceAddress, Decimal> = index_map_new();
            for (address, gain) in gains {
                let mut vault = self.collateral_vaults.get_mut(&address).unwrap();
                let take_amount = gain.min(vault.amount());
                let bucket = vault.take_advanced(
                    take_amount,
                    WithdrawStrategy::Rounded(RoundingMode::ToZero),
                );
                gain_amounts.insert(address, bucket.amount());
                collateral.push(bucket);
            }

            receipt.burn();

            Runtime::emit_event(StabilityPoolWithdrawalEvent {
                musd_withdrawn: musd.amount(),
                collateral_gains: gain_amounts,
            });

            (musd, collateral)
        }

        /// Liquidates a trove, funding the core liquidation with the pool's full mUSD
        /// balance. The caller receives the gas compensation: the trove's fixed mUSD
        /// liquidation reserve plus a fixed fraction of the seized collateral.
        ///
        /// # Returns
        /// * `(Vec<Bucket>, Bucket)`: The collateral gas compensation and the mUSD
        ///   liquidation reserve.
        pub fn liquidate(&mut self, trove_id: NonFungibleLocalId) -> (Vec<Bucket>, Bucket) {
            let available = self.musd_vault.amount();
            let payment = self.musd_vault.take_all();

            let (pool_collateral, gas_collateral, reserve, leftover) =
                self.badge_vault.authorize_with_amount(dec!("0.75"), || {
                    self.meridian.liquidate_trove(trove_id.clone(), payment)
                });

            let debt_offset = available - leftover.amount();
            self.musd_vault.put(leftover);

            if debt_offset > Decimal::ZERO {
                // Book the gains before depleting the product, both against the
                // deposit total as it stood when the debt was burned.
                for bucket in &pool_collateral {
                    let address = bucket.resource_address();
                    let key = (self.epoch, address);
                    let s = self
                        .s_sums
                        .get(&key)
                        .map(|s| *s)
                        .unwrap_or(Decimal::ZERO);
                    self.s_sums
                        .insert(key, s + bucket.amount() * self.p / available);
                }

                let remaining = available - debt_offset;
                if remaining == Decimal::ZERO {
                    self.epoch += 1;
                    self.p = Decimal::ONE;
                } else {
                    self.p = self.p * remaining / available;
                }
            }

            for bucket in pool_collateral {
                let address = bucket.resource_address();
                if self.collateral_vaults.get(&address).is_none() {
                    self.collateral_vaults.insert(address, Vault::new(address));
                    self.collateral_addresses.push(address);
                }
                self.collateral_vaults.get_mut(&address).unwrap().put(bucket);
            }

            Runtime::emit_event(StabilityPoolOffsetEvent {
                trove_id,
                debt_offset,
            });

            (gas_collateral, reserve)
        }

        /// The pooled mUSD total, the pool product and the current epoch.
        pub fn get_pool_info(&self) -> (Decimal, Decimal, u64) {
            (self.musd_vault.amount(), self.p, self.epoch)
        }

        /// The compounded mUSD and pending collateral gains of a deposit.
        pub fn get_deposit_info(
            &self,
            deposit_id: NonFungibleLocalId,
        ) -> (Decimal, IndexMap<ResourceAddress, Decimal>) {
            let deposit: StabilityDeposit =
                self.deposit_manager.get_non_fungible_data(&deposit_id);
            self.settle(&deposit)
        }

        pub fn get_deposit_address(&self) -> ResourceAddress {
            self.deposit_manager.address()
        }

        /// Computes what a deposit is worth right now: the compounded remainder of
        /// the mUSD and the per-kind collateral gains since its snapshots. Deposits
        /// from an earlier epoch were fully consumed; they only retain the gains of
        /// their own epoch.
        fn settle(
            &self,
            deposit: &StabilityDeposit,
        ) -> (Decimal, IndexMap<ResourceAddress, Decimal>) {
            let compounded = if deposit.epoch < self.epoch {
                Decimal::ZERO
            } else {
                deposit.amount * self.p / deposit.p_snapshot
            };

            let mut gains: IndexMap<ResourceAddress, Decimal> = index_map_new();
            for address in &self.collateral_addresses {
                let s_end = self
                    .s_sums
                    .get(&(deposit.epoch, *address))
                    .map(|s| *s)
                    .unwrap_or(Decimal::ZERO);
                let s_start = deposit
                    .s_snapshots
                    .get(address)
                    .cloned()
                    .unwrap_or(Decimal::ZERO);
                let gain = deposit.amount * (s_end - s_start) / deposit.p_snapshot;
                if gain > Decimal::ZERO {
                    gains.insert(*address, gain);
                }
            }

            (compounded, gains)
        }
    }
}
