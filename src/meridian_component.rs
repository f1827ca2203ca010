#![allow(deprecated)]

//! # The Meridian Core Logic Blueprint
//!
//! This blueprint defines the core component of the Meridian protocol, responsible for
//! managing troves (collateralized debt positions over one or more collateral kinds),
//! minting/burning the mUSD stablecoin, liquidations with stability-pool offset and
//! pro-rata redistribution, redemptions, and the decaying borrowing-fee base rate.
//!
//! ## Overview
//! Users interact with this component directly, authorizing trove operations with the
//! trove receipt NFT:
//! - **Open a trove:** Deposit one or more accepted collateral kinds and mint mUSD.
//!   The composite collateral value (amount × price × risk ratio, summed over kinds)
//!   divided by the debt must stay above the Minimum Collateral Ratio (MCR).
//! - **Manage a trove:** Add collateral (`top_up_trove`), remove collateral
//!   (`remove_collateral`), mint more mUSD (`borrow_more`), repay (`repay`), or do any
//!   combination in one call (`adjust_trove`).
//! - **Close a trove:** Repay the outstanding debt to retrieve all collateral
//!   (`close_trove`).
//! - **Liquidation:** A trove whose ratio falls under the MCR (or, while the system is
//!   in recovery mode, under the CCR and the system average) can be liquidated. Debt is
//!   absorbed by the stability pool payment first; whatever the pool cannot cover is
//!   redistributed pro-rata over all remaining troves through per-kind accumulators,
//!   without touching any of them individually.
//! - **Redemption:** mUSD can be redeemed for collateral at face value minus a decaying
//!   fee, targeting the riskiest troves (lowest ratio) first.
//!
//! ## Key concepts
//! - **mUSD:** The dollar-pegged stablecoin minted by the protocol.
//! - **Trove:** A user's position, holding per-kind collateral and tracking composite
//!   debt. Managed as an NFT receipt (`Trove` struct).
//! - **Risk ratio:** A per-kind discount (≤ 1) applied to raw market value before any
//!   ratio check.
//! - **MCR / CCR:** Minimum and critical collateral ratios. The system is in recovery
//!   mode while the total collateral ratio (TCR) is under the CCR, which tightens every
//!   validation rule.
//! - **Stakes and reward snapshots:** The lazy-redistribution bookkeeping. A trove's
//!   pending share of past liquidations is the gap between the global per-unit-staked
//!   accumulators and its own snapshot, times its stake; it is applied at the start of
//!   every mutation.
//! - **Base rate:** The borrowing fee rate, bumped by every issuance in proportion to
//!   the minted amount and decaying per minute.
//!
//! ## Interaction with other components
//! - **`StabilityPool`:** Funds liquidations with pooled mUSD and receives the
//!   liquidated collateral in return; the public liquidation entry point lives there.
//! - **`PayoutComponent`:** Collects the borrowing fees accumulated here.
//! - **Oracle:** Provides verified prices for collateral kinds.

use crate::events::*;
use crate::shared_structs::*;
use crate::sorted_troves::*;
use scrypto::prelude::*;

#[blueprint]
#[types(
    ResourceAddress,
    CollateralInfo,
    Decimal,
    NonFungibleLocalId,
    TroveNode,
    Trove,
    TroveStatus,
    RewardSnapshot,
    IndexMap<ResourceAddress, Decimal>,
    IndexMap<ResourceAddress, RewardSnapshot>,
    Instant,
    Vault
)]
#[events(
    EventAddCollateral,
    EventChangeCollateral,
    EventNewTrove,
    EventUpdateTrove,
    EventCloseTrove,
    EventLiquidateTrove,
    EventRedeemTrove,
    EventBaseRateUpdate,
)]
mod meridian_component {
    enable_method_auth! {
        methods {
            open_trove => PUBLIC;
            top_up_trove => PUBLIC;
            remove_collateral => PUBLIC;
            borrow_more => PUBLIC;
            repay => PUBLIC;
            adjust_trove => PUBLIC;
            close_trove => PUBLIC;
            claim_surplus_collateral => PUBLIC;
            redeem => PUBLIC;
            update_price => PUBLIC;
            liquidate_trove => restrict_to: [OWNER];
            claim_payout_rewards => restrict_to: [OWNER];
            new_collateral => restrict_to: [OWNER];
            edit_collateral => restrict_to: [OWNER];
            change_collateral_price => restrict_to: [OWNER];
            set_oracle => restrict_to: [OWNER];
            set_parameters => restrict_to: [OWNER];
            set_stops => restrict_to: [OWNER];
            mint_controller_badge => restrict_to: [OWNER];
            free_musd => restrict_to: [OWNER];
            burn_musd => restrict_to: [OWNER];
            get_troves_info => PUBLIC;
            get_pending_rewards => PUBLIC;
            get_current_icr => PUBLIC;
            get_composite_debt => PUBLIC;
            get_collateral_infos => PUBLIC;
            get_sorted_troves => PUBLIC;
            get_next_liquidations => PUBLIC;
            check_liquidate => PUBLIC;
            get_system_tcr => PUBLIC;
            is_recovery_mode => PUBLIC;
            get_borrowing_rate => PUBLIC;
            get_total_debt => PUBLIC;
            get_circulating_musd => PUBLIC;
            get_musd_address => PUBLIC;
            get_trove_address => PUBLIC;
        }
    }

    struct Meridian {
        /// Stores information about each accepted collateral kind, keyed by the
        /// collateral's `ResourceAddress`. Includes price, risk ratio, vaults and the
        /// redistribution accumulators.
        collaterals: KeyValueStore<ResourceAddress, CollateralInfo>,
        /// All collateral kinds ever registered, for iteration.
        collateral_addresses: Vec<ResourceAddress>,
        /// A counter to generate unique ids for each new trove.
        trove_counter: u64,
        /// The `ResourceManager` for the trove receipt NFTs (`Trove` struct).
        trove_manager: ResourceManager,
        /// The `ResourceManager` for the mUSD fungible token.
        musd_manager: ResourceManager,
        /// The `ResourceManager` for the controller badge, used for authorization.
        controller_badge_manager: ResourceManager,
        /// The total amount of mUSD minted by this component and not yet burned.
        circulating_musd: Decimal,
        /// The sum of all active troves' composite debt, including debt that has been
        /// redistributed but not yet applied to individual troves.
        total_debt: Decimal,
        /// The descending-by-ratio index over all active troves.
        sorted_troves: SortedTroves,
        /// The borrowing-fee base rate. Bumped by every issuance, decaying per minute.
        base_rate: Decimal,
        /// Timestamp of the last base-rate clock update. Only moved when at least a
        /// minute has passed, so rapid issuance cannot keep resetting the decay clock.
        last_fee_operation: Instant,
        /// The base rate used for redemption fees. Decays per second and spikes with
        /// redemption volume.
        redemption_base_rate: Decimal,
        /// Timestamp of the last redemption.
        last_redemption: Instant,
        /// Vault holding the mUSD liquidation reserves of all active troves.
        gas_compensation_vault: Vault,
        /// Vault accumulating borrowing fees until the payout component fetches them.
        fee_vault: Vault,
        /// Global reference to the price oracle component.
        oracle: Global<AnyComponent>,
        /// The method name expected by the oracle for single price lookups.
        oracle_method_name: String,
        /// Stores various configurable parameters of the protocol.
        parameters: ProtocolParameters,
    }

    impl Meridian {
        /// Instantiates the core `Meridian` component and associated resources: the
        /// mUSD token, the trove receipt NFT, and the controller badge.
        ///
        /// # Arguments
        /// * `oracle_address`: The `ComponentAddress` of the price oracle.
        /// * `dapp_def_address`: The `GlobalAddress` of the DApp Definition account.
        ///
        /// # Returns
        /// A tuple containing:
        /// * `Global<Meridian>`: A global reference to the new component.
        /// * `Bucket`: The initially minted controller badges.
        /// * `ResourceAddress`: The trove receipt NFT resource address.
        /// * `ResourceAddress`: The mUSD resource address.
        pub fn instantiate(
            oracle_address: ComponentAddress,
            dapp_def_address: GlobalAddress,
        ) -> (Global<Meridian>, Bucket, ResourceAddress, ResourceAddress) {
            let parameters = ProtocolParameters {
                mcr: dec!("1.1"),
                ccr: dec!("1.5"),
                minimum_net_debt: dec!(200),
                liquidation_reserve: dec!(10),
                collateral_gas_comp_divisor: dec!(200),
                borrowing_fee_floor: dec!("0.005"),
                max_borrowing_fee: dec!("0.05"),
                minute_decay_factor: dec!("0.999037758833783"),
                redemption_halflife_k: dec!("0.999967910367636"),
                redemption_spike_k: Decimal::ONE,
                minimum_redemption_fee: dec!("0.005"),
                maximum_redemption_fee: dec!("0.05"),
                max_troves: 10_000,
                stop_liquidations: false,
                stop_openings: false,
                stop_closings: false,
                stop_redemption: false,
            };

            let (address_reservation, component_address) =
                Runtime::allocate_component_address(Meridian::blueprint_id());

            let controller_role: Bucket = ResourceBuilder::new_fungible(OwnerRole::Fixed(rule!(
                require(global_caller(component_address))
            )))
            .divisibility(DIVISIBILITY_MAXIMUM)
            .metadata(metadata! (
                init {
                    "name" => "controller badge meridian", locked;
                    "symbol" => "musdCTRL", locked;
                }
            ))
            .mint_roles(mint_roles!(
                minter => rule!(require(global_caller(component_address)));
                minter_updater => rule!(deny_all);
            ))
            .mint_initial_supply(30)
            .into();

            let controller_badge_manager: ResourceManager = controller_role.resource_manager();

            let musd_manager: ResourceManager = ResourceBuilder::new_fungible(OwnerRole::Fixed(
                rule!(require(controller_role.resource_address())),
            ))
            .divisibility(DIVISIBILITY_MAXIMUM)
            .metadata(metadata! (
                init {
                    "name" => "mUSD", updatable;
                    "symbol" => "mUSD", updatable;
                    "info_url" => "https://meridianusd.io", updatable;
                    "icon_url" => Url::of("https://meridianusd.io/musd-logo.png"), updatable;
                    "tags" => vec!["stablecoin", "defi", "usd"], updatable;
                    "dapp_definitions" => vec![dapp_def_address], updatable;
                }
            ))
            .mint_roles(mint_roles!(
                minter => rule!(require(global_caller(component_address))
                || require_amount(
                    dec!("0.75"),
                    controller_role.resource_address()
                ));
                minter_updater => rule!(require_amount(
                    dec!("0.75"),
                    controller_role.resource_address()
                ));
            ))
            .burn_roles(burn_roles!(
                burner => rule!(require(global_caller(component_address))
                || require_amount(
                    dec!("0.75"),
                    controller_role.resource_address()
                ));
                burner_updater => rule!(require_amount(
                    dec!("0.75"),
                    controller_role.resource_address()
                ));
            ))
            .create_with_no_initial_supply()
            .into();

            let trove_manager: ResourceManager =
                <scrypto::prelude::ResourceBuilder as MeridianResourceBuilder>::new_integer_non_fungible_with_registered_type::<Trove>(
                    OwnerRole::Fixed(rule!(require_amount(
                        dec!("0.75"),
                        controller_role.resource_address()
                    ))),
                )
                .metadata(metadata!(
                    init {
                        "name" => "Meridian Trove", locked;
                        "symbol" => "musdTROVE", locked;
                        "description" => "A receipt for your mUSD trove.", locked;
                        "info_url" => "https://meridianusd.io", updatable;
                        "icon_url" => Url::of("https://meridianusd.io/trove-logo.png"), updatable;
                        "dapp_definitions" => vec![dapp_def_address], updatable;
                    }
                ))
                .non_fungible_data_update_roles(non_fungible_data_update_roles!(
                    non_fungible_data_updater => rule!(require(global_caller(component_address))
                        || require_amount(
                            dec!("0.75"),
                            controller_role.resource_address()
                        ));
                    non_fungible_data_updater_updater => rule!(require_amount(
                        dec!("0.75"),
                        controller_role.resource_address()
                    ));
                ))
                .mint_roles(mint_roles!(
                    minter => rule!(require(global_caller(component_address))
                    || require_amount(
                        dec!("0.75"),
                        controller_role.resource_address()
                    ));
                    minter_updater => rule!(require_amount(
                        dec!("0.75"),
                        controller_role.resource_address()
                    ));
                ))
                .burn_roles(burn_roles!(
                    burner => rule!(require(global_caller(component_address))
                    || require_amount(
                        dec!("0.75"),
                        controller_role.resource_address()
                    ));
                    burner_updater => rule!(require_amount(
                        dec!("0.75"),
                        controller_role.resource_address()
                    ));
                ))
                .create_with_no_initial_supply()
                .into();

            let gas_compensation_vault = Vault::new(musd_manager.address());
            let fee_vault = Vault::new(musd_manager.address());

            let meridian = Self {
                collaterals: <scrypto::component::KeyValueStore<_, _> as MeridianKeyValueStore>::new_with_registered_type(),
                collateral_addresses: vec![],
                trove_counter: 0,
                trove_manager,
                musd_manager,
                controller_badge_manager,
                circulating_musd: Decimal::ZERO,
                total_debt: Decimal::ZERO,
                sorted_troves: SortedTroves::new(parameters.max_troves),
                base_rate: Decimal::ZERO,
                last_fee_operation: Clock::current_time_rounded_to_seconds(),
                redemption_base_rate: Decimal::ZERO,
                last_redemption: Clock::current_time_rounded_to_seconds(),
                gas_compensation_vault,
                fee_vault,
                oracle: Global::from(oracle_address),
                oracle_method_name: "check_price_input".to_string(),
                parameters,
            }
            .instantiate()
            .prepare_to_globalize(OwnerRole::Fixed(rule!(require_amount(
                dec!("0.75"),
                controller_role.resource_address()
            ))))
            .with_address(address_reservation)
            .metadata(metadata! {
                init {
                    "name" => "Meridian Protocol Core Logic".to_string(), updatable;
                    "description" => "The core logic component for the Meridian Protocol".to_string(), updatable;
                    "info_url" => Url::of("https://meridianusd.io"), updatable;
                    "dapp_definition" => dapp_def_address, updatable;
                }
            })
            .globalize();

            (
                meridian,
                controller_role,
                trove_manager.address(),
                musd_manager.address(),
            )
        }

        /// Opens a new trove, minting mUSD against the deposited collateral.
        ///
        /// # Arguments
        /// * `collaterals`: One `Bucket` per collateral kind deposited. At most one
        ///   bucket per kind, every kind accepted.
        /// * `musd_to_mint`: The `Decimal` amount of mUSD the caller wishes to mint.
        /// * `max_fee_percent`: The highest borrowing fee rate the caller accepts.
        /// * `prev_hint` / `next_hint`: Optional neighbor hints for the sorted-list
        ///   insert. Stale or wrong hints cost a scan, never correctness.
        ///
        /// # Returns
        /// * `(Bucket, Bucket)`: The minted mUSD and the trove receipt NFT.
        ///
        /// # Panics
        /// * If `stop_openings` is set.
        /// * If any deposited kind is not accepted, duplicated, or empty.
        /// * If the resulting net debt is below the protocol minimum.
        /// * If the borrowing fee rate exceeds `max_fee_percent`.
        /// * If the resulting ratio is below the MCR (below the CCR in recovery mode).
        /// * If the open would push the system TCR below the CCR.
        ///
        /// # Logic
        /// 1. Validates the deposit buckets and computes the composite collateral value.
        /// 2. Charges the borrowing fee (waived in recovery mode) and bumps the base
        ///    rate; composite debt = requested + fee + liquidation reserve.
        /// 3. Checks the ratio and TCR rules for the current mode.
        /// 4. Mints the requested amount to the caller, the fee to the fee vault and
        ///    the liquidation reserve to the gas compensation vault.
        /// 5. Records the trove with fresh stakes and reward snapshots, stores the
        ///    collateral, mints the receipt and inserts the id into the sorted list.
        pub fn open_trove(
            &mut self,
            collaterals: Vec<Bucket>,
            musd_to_mint: Decimal,
            max_fee_percent: Decimal,
            prev_hint: Option<NonFungibleLocalId>,
            next_hint: Option<NonFungibleLocalId>,
        ) -> (Bucket, Bucket) {
            assert!(
                !self.parameters.stop_openings,
                "Not allowed to open troves right now."
            );
            assert!(
                musd_to_mint > Decimal::ZERO,
                "Must mint a positive mUSD amount."
            );
            assert!(!collaterals.is_empty(), "No collateral provided.");

            self.trove_counter += 1;
            let trove_id = NonFungibleLocalId::integer(self.trove_counter);

            let mut deposit_amounts: IndexMap<ResourceAddress, Decimal> = index_map_new();
            for bucket in &collaterals {
                let address = bucket.resource_address();
                assert!(
                    self.collaterals
                        .get(&address)
                        .map(|c| c.accepted)
                        .unwrap_or(false),
                    "This collateral is not accepted"
                );
                assert!(
                    !deposit_amounts.contains_key(&address),
                    "Duplicate collateral kind in deposit."
                );
                assert!(bucket.amount() > Decimal::ZERO, "Empty collateral bucket.");
                deposit_amounts.insert(address, bucket.amount());
            }

            let value = self.composite_value(&deposit_amounts);
            let recovery = self.recovery_mode();

            let fee = self.trigger_borrowing_fee(musd_to_mint, max_fee_percent, recovery);
            let net_debt = musd_to_mint + fee;
            assert!(
                net_debt >= self.parameters.minimum_net_debt,
                "Borrowed mUSD needs to be above the minimum net debt."
            );
            let debt = net_debt + self.parameters.liquidation_reserve;

            let icr = value / debt;
            if recovery {
                assert!(icr >= self.parameters.ccr, "Collateral value too low.");
            } else {
                assert!(icr >= self.parameters.mcr, "Collateral value too low.");
                let tcr_after =
                    (self.total_collateral_value() + value) / (self.total_debt + debt);
                assert!(
                    tcr_after >= self.parameters.ccr,
                    "Operation would push the total collateral ratio below the critical threshold."
                );
            }

            let musd_tokens = self.mint_musd(debt);
            let musd_tokens = self.split_composite_mint(musd_tokens, fee);

            let mut trove = Trove {
                key_image_url: Url::of("https://meridianusd.io/trove.png"),
                collaterals: deposit_amounts.clone(),
                debt,
                stakes: index_map_new(),
                reward_snapshots: index_map_new(),
                status: TroveStatus::Active,
            };

            for bucket in collaterals {
                let address = bucket.resource_address();
                self.put_collateral(address, bucket);
                self.update_stake(&mut trove, address);
                trove
                    .reward_snapshots
                    .insert(address, self.accumulator_snapshot(address));
            }

            self.total_debt += debt;

            let trove_receipt: NonFungibleBucket = self
                .trove_manager
                .mint_non_fungible(&trove_id, trove.clone())
                .as_non_fungible();

            self.insert_sorted(trove_id.clone(), icr, prev_hint, next_hint);

            Runtime::emit_event(EventNewTrove {
                trove: trove.clone(),
                trove_id,
            });

            (musd_tokens, trove_receipt.into())
        }

        /// Adds collateral to an existing trove, raising its collateralization ratio.
        ///
        /// # Arguments
        /// * `trove_proof`: A `NonFungibleProof` of the trove receipt.
        /// * `collaterals`: The additional collateral, one bucket per kind.
        /// * `prev_hint` / `next_hint`: Optional sorted-list hints.
        ///
        /// # Panics
        /// * If the trove is not active, a kind is not accepted, or the resulting
        ///   ratio still fails the mode-dependent checks.
        pub fn top_up_trove(
            &mut self,
            trove_proof: NonFungibleProof,
            collaterals: Vec<Bucket>,
            prev_hint: Option<NonFungibleLocalId>,
            next_hint: Option<NonFungibleLocalId>,
        ) {
            assert!(!collaterals.is_empty(), "No collateral provided.");
            let trove_id = self.checked_trove_id(trove_proof);
            let mut trove = self.apply_pending_rewards(&trove_id);
            let old_icr = self.trove_icr(&trove);
            let recovery = self.recovery_mode();

            let mut added_value = Decimal::ZERO;
            for bucket in &collaterals {
                let address = bucket.resource_address();
                assert!(
                    self.collaterals
                        .get(&address)
                        .map(|c| c.accepted)
                        .unwrap_or(false),
                    "This collateral is not accepted"
                );
                assert!(bucket.amount() > Decimal::ZERO, "Empty collateral bucket.");
                added_value += self.collateral_value(address, bucket.amount());
                let recorded = trove
                    .collaterals
                    .get(&address)
                    .cloned()
                    .unwrap_or(Decimal::ZERO);
                trove.collaterals.insert(address, recorded + bucket.amount());
            }

            let new_icr = self.trove_icr(&trove);
            let tcr_after = self.tcr_with(
                self.total_collateral_value() + added_value,
                self.total_debt,
            );
            self.validate_adjustment(recovery, old_icr, new_icr, false, false, tcr_after);

            for bucket in collaterals {
                let address = bucket.resource_address();
                self.put_collateral(address, bucket);
                self.update_stake(&mut trove, address);
                trove
                    .reward_snapshots
                    .insert(address, self.accumulator_snapshot(address));
            }

            self.write_trove(&trove_id, &trove);
            self.reinsert_sorted(trove_id.clone(), new_icr, prev_hint, next_hint);

            Runtime::emit_event(EventUpdateTrove {
                trove,
                trove_id,
            });
        }

        /// Removes collateral from a trove. Only possible while the trove stays above
        /// the MCR, the system TCR stays above the CCR, and the system is not in
        /// recovery mode (withdrawals are forbidden outright there).
        ///
        /// # Arguments
        /// * `trove_proof`: A `NonFungibleProof` of the trove receipt.
        /// * `withdrawals`: `(kind, amount)` pairs to withdraw.
        /// * `prev_hint` / `next_hint`: Optional sorted-list hints.
        ///
        /// # Returns
        /// * `Vec<Bucket>`: The withdrawn collateral, one bucket per kind.
        pub fn remove_collateral(
            &mut self,
            trove_proof: NonFungibleProof,
            withdrawals: Vec<(ResourceAddress, Decimal)>,
            prev_hint: Option<NonFungibleLocalId>,
            next_hint: Option<NonFungibleLocalId>,
        ) -> Vec<Bucket> {
            assert!(
                !self.parameters.stop_closings,
                "Not allowed to close troves / remove collateral right now."
            );
            assert!(!withdrawals.is_empty(), "Adjustment has no effect.");

            let trove_id = self.checked_trove_id(trove_proof);
            let mut trove = self.apply_pending_rewards(&trove_id);
            let old_icr = self.trove_icr(&trove);
            let recovery = self.recovery_mode();

            let mut withdrawn_value = Decimal::ZERO;
            for (address, amount) in &withdrawals {
                assert!(
                    *amount > Decimal::ZERO,
                    "Withdrawal amount must be positive."
                );
                withdrawn_value += self.collateral_value(*address, *amount);
                self.decrease_trove_collateral(&mut trove, *address, *amount);
            }

            let new_icr = self.trove_icr(&trove);
            let tcr_after = self.tcr_with(
                self.total_collateral_value() - withdrawn_value,
                self.total_debt,
            );
            self.validate_adjustment(recovery, old_icr, new_icr, false, true, tcr_after);

            let mut withdrawn: Vec<Bucket> = Vec::with_capacity(withdrawals.len());
            for (address, amount) in withdrawals {
                withdrawn.push(self.take_collateral(address, amount));
                self.update_stake(&mut trove, address);
            }

            self.write_trove(&trove_id, &trove);
            self.reinsert_sorted(trove_id.clone(), new_icr, prev_hint, next_hint);

            Runtime::emit_event(EventUpdateTrove {
                trove,
                trove_id,
            });

            withdrawn
        }

        /// Mints additional mUSD against an existing trove.
        ///
        /// # Arguments
        /// * `trove_proof`: A `NonFungibleProof` of the trove receipt.
        /// * `amount`: The additional mUSD to mint.
        /// * `max_fee_percent`: The highest borrowing fee rate the caller accepts.
        /// * `prev_hint` / `next_hint`: Optional sorted-list hints.
        ///
        /// # Returns
        /// * `Bucket`: The newly minted mUSD.
        ///
        /// # Panics
        /// * If `stop_openings` is set, the trove is not active, the fee exceeds the
        ///   caller's maximum, or a ratio rule fails. In recovery mode a debt increase
        ///   must additionally not reduce the trove's own ratio, even when the result
        ///   stays above the CCR.
        pub fn borrow_more(
            &mut self,
            trove_proof: NonFungibleProof,
            amount: Decimal,
            max_fee_percent: Decimal,
            prev_hint: Option<NonFungibleLocalId>,
            next_hint: Option<NonFungibleLocalId>,
        ) -> Bucket {
            assert!(
                !self.parameters.stop_openings,
                "Not allowed to open troves right now."
            );
            assert!(amount > Decimal::ZERO, "Must mint a positive mUSD amount.");

            let trove_id = self.checked_trove_id(trove_proof);
            let mut trove = self.apply_pending_rewards(&trove_id);
            let old_icr = self.trove_icr(&trove);
            let recovery = self.recovery_mode();

            let fee = self.trigger_borrowing_fee(amount, max_fee_percent, recovery);
            trove.debt += amount + fee;

            let new_icr = self.trove_icr(&trove);
            let tcr_after = self.tcr_with(
                self.total_collateral_value(),
                self.total_debt + amount + fee,
            );
            self.validate_adjustment(recovery, old_icr, new_icr, true, false, tcr_after);

            self.total_debt += amount + fee;
            let musd_tokens = self.mint_musd(amount + fee);
            let musd_tokens = self.split_fee_mint(musd_tokens, fee);

            self.write_trove(&trove_id, &trove);
            self.reinsert_sorted(trove_id.clone(), new_icr, prev_hint, next_hint);

            Runtime::emit_event(EventUpdateTrove {
                trove,
                trove_id,
            });

            musd_tokens
        }

        /// Repays part of a trove's debt. The whole payment bucket is burned; the
        /// remaining net debt must stay above the protocol minimum. Full repayment
        /// goes through `close_trove`.
        ///
        /// # Arguments
        /// * `trove_proof`: A `NonFungibleProof` of the trove receipt.
        /// * `payment`: The mUSD to repay.
        /// * `prev_hint` / `next_hint`: Optional sorted-list hints.
        pub fn repay(
            &mut self,
            trove_proof: NonFungibleProof,
            payment: Bucket,
            prev_hint: Option<NonFungibleLocalId>,
            next_hint: Option<NonFungibleLocalId>,
        ) {
            assert!(
                !self.parameters.stop_closings,
                "Not allowed to close troves / repay right now."
            );
            assert!(
                payment.resource_address() == self.musd_manager.address(),
                "Invalid mUSD payment."
            );
            let amount = payment.amount();
            assert!(amount > Decimal::ZERO, "Adjustment has no effect.");

            let trove_id = self.checked_trove_id(trove_proof);
            let mut trove = self.apply_pending_rewards(&trove_id);
            let old_icr = self.trove_icr(&trove);
            let recovery = self.recovery_mode();

            assert!(
                trove.debt - self.parameters.liquidation_reserve - amount
                    >= self.parameters.minimum_net_debt,
                "Resulting borrowed mUSD needs to stay above the minimum net debt."
            );

            trove.debt -= amount;

            let new_icr = self.trove_icr(&trove);
            let tcr_after = self.tcr_with(self.total_collateral_value(), self.total_debt - amount);
            self.validate_adjustment(recovery, old_icr, new_icr, false, false, tcr_after);

            self.burn_musd_internal(payment);
            self.total_debt -= amount;

            self.write_trove(&trove_id, &trove);
            self.reinsert_sorted(trove_id.clone(), new_icr, prev_hint, next_hint);

            Runtime::emit_event(EventUpdateTrove {
                trove,
                trove_id,
            });
        }

        /// Adjusts a trove with any combination of collateral top-up, collateral
        /// withdrawal, and a debt change, validated as a single operation.
        ///
        /// # Arguments
        /// * `trove_proof`: A `NonFungibleProof` of the trove receipt.
        /// * `top_ups`: Additional collateral buckets.
        /// * `withdrawals`: `(kind, amount)` pairs to withdraw. A kind may not appear
        ///   both here and in `top_ups` (ambiguous intent).
        /// * `borrow_amount`: Additional mUSD to mint (0 for none).
        /// * `repayment`: Optional mUSD to repay. Mutually exclusive with borrowing.
        /// * `max_fee_percent`: The highest borrowing fee rate the caller accepts.
        /// * `prev_hint` / `next_hint`: Optional sorted-list hints.
        ///
        /// # Returns
        /// * `(Vec<Bucket>, Option<Bucket>)`: The withdrawn collateral and, when
        ///   borrowing, the minted mUSD.
        ///
        /// # Panics
        /// * If the adjustment has no effect at all (zero-net-change submissions are
        ///   rejected), on ambiguous same-kind top-up + withdrawal, or on any of the
        ///   ratio/TCR/recovery-mode rules described on the single-purpose methods.
        pub fn adjust_trove(
            &mut self,
            trove_proof: NonFungibleProof,
            top_ups: Vec<Bucket>,
            withdrawals: Vec<(ResourceAddress, Decimal)>,
            borrow_amount: Decimal,
            repayment: Option<Bucket>,
            max_fee_percent: Decimal,
            prev_hint: Option<NonFungibleLocalId>,
            next_hint: Option<NonFungibleLocalId>,
        ) -> (Vec<Bucket>, Option<Bucket>) {
            assert!(
                !(top_ups.is_empty()
                    && withdrawals.is_empty()
                    && borrow_amount == Decimal::ZERO
                    && repayment.is_none()),
                "Adjustment has no effect."
            );
            assert!(
                !(borrow_amount > Decimal::ZERO && repayment.is_some()),
                "Cannot borrow and repay in the same adjustment."
            );
            for bucket in &top_ups {
                let address = bucket.resource_address();
                assert!(
                    !withdrawals.iter().any(|(kind, _)| *kind == address),
                    "Cannot top up and withdraw the same collateral in one adjustment."
                );
            }
            if borrow_amount > Decimal::ZERO {
                assert!(
                    !self.parameters.stop_openings,
                    "Not allowed to open troves right now."
                );
            }
            if !withdrawals.is_empty() || repayment.is_some() {
                assert!(
                    !self.parameters.stop_closings,
                    "Not allowed to close troves / remove collateral right now."
                );
            }

            let trove_id = self.checked_trove_id(trove_proof);
            let mut trove = self.apply_pending_rewards(&trove_id);
            let old_icr = self.trove_icr(&trove);
            let recovery = self.recovery_mode();

            // Stage every delta against the in-memory trove first; nothing is
            // committed until the combined result has passed validation.
            let mut value_delta = Decimal::ZERO;
            for bucket in &top_ups {
                let address = bucket.resource_address();
                assert!(
                    self.collaterals
                        .get(&address)
                        .map(|c| c.accepted)
                        .unwrap_or(false),
                    "This collateral is not accepted"
                );
                assert!(bucket.amount() > Decimal::ZERO, "Empty collateral bucket.");
                value_delta += self.collateral_value(address, bucket.amount());
                let recorded = trove
                    .collaterals
                    .get(&address)
                    .cloned()
                    .unwrap_or(Decimal::ZERO);
                trove.collaterals.insert(address, recorded + bucket.amount());
            }

            let has_withdrawals = !withdrawals.is_empty();
            for (address, amount) in &withdrawals {
                assert!(
                    *amount > Decimal::ZERO,
                    "Withdrawal amount must be positive."
                );
                value_delta -= self.collateral_value(*address, *amount);
                self.decrease_trove_collateral(&mut trove, *address, *amount);
            }

            let mut debt_delta = Decimal::ZERO;
            let mut fee = Decimal::ZERO;
            if borrow_amount > Decimal::ZERO {
                fee = self.trigger_borrowing_fee(borrow_amount, max_fee_percent, recovery);
                trove.debt += borrow_amount + fee;
                debt_delta += borrow_amount + fee;
            }
            if let Some(ref payment) = repayment {
                assert!(
                    payment.resource_address() == self.musd_manager.address(),
                    "Invalid mUSD payment."
                );
                let amount = payment.amount();
                assert!(amount > Decimal::ZERO, "Adjustment has no effect.");
                assert!(
                    trove.debt - self.parameters.liquidation_reserve - amount
                        >= self.parameters.minimum_net_debt,
                    "Resulting borrowed mUSD needs to stay above the minimum net debt."
                );
                trove.debt -= amount;
                debt_delta -= amount;
            }

            let new_icr = self.trove_icr(&trove);
            let tcr_after = self.tcr_with(
                self.total_collateral_value() + value_delta,
                self.total_debt + debt_delta,
            );
            self.validate_adjustment(
                recovery,
                old_icr,
                new_icr,
                debt_delta > Decimal::ZERO,
                has_withdrawals,
                tcr_after,
            );

            for bucket in top_ups {
                let address = bucket.resource_address();
                self.put_collateral(address, bucket);
                self.update_stake(&mut trove, address);
                trove
                    .reward_snapshots
                    .insert(address, self.accumulator_snapshot(address));
            }

            let mut withdrawn: Vec<Bucket> = Vec::with_capacity(withdrawals.len());
            for (address, amount) in withdrawals {
                withdrawn.push(self.take_collateral(address, amount));
                self.update_stake(&mut trove, address);
            }

            let mut borrowed: Option<Bucket> = None;
            if borrow_amount > Decimal::ZERO {
                let musd_tokens = self.mint_musd(borrow_amount + fee);
                borrowed = Some(self.split_fee_mint(musd_tokens, fee));
            }
            if let Some(payment) = repayment {
                self.burn_musd_internal(payment);
            }
            self.total_debt += debt_delta;

            self.write_trove(&trove_id, &trove);
            self.reinsert_sorted(trove_id.clone(), new_icr, prev_hint, next_hint);

            Runtime::emit_event(EventUpdateTrove {
                trove,
                trove_id,
            });

            (withdrawn, borrowed)
        }

        /// Closes a trove by repaying the full outstanding net debt.
        ///
        /// # Arguments
        /// * `trove_proof`: A `NonFungibleProof` of the trove receipt.
        /// * `payment`: mUSD covering at least `debt - liquidation reserve`.
        ///
        /// # Returns
        /// * `(Vec<Bucket>, Bucket)`: All collateral of the trove and the excess mUSD.
        ///
        /// # Panics
        /// * If `stop_closings` is set, the trove is not active, the payment is short,
        ///   the trove is the last one open system-wide, or the system TCR after the
        ///   removal would sit below the CCR.
        pub fn close_trove(
            &mut self,
            trove_proof: NonFungibleProof,
            mut payment: Bucket,
        ) -> (Vec<Bucket>, Bucket) {
            assert!(
                !self.parameters.stop_closings,
                "Not allowed to close troves right now."
            );
            assert!(
                payment.resource_address() == self.musd_manager.address(),
                "Invalid mUSD payment."
            );

            let trove_id = self.checked_trove_id(trove_proof);
            let mut trove = self.apply_pending_rewards(&trove_id);

            assert!(
                self.sorted_troves.len() > 1,
                "Cannot close the last trove in the system."
            );

            let net_debt = trove.debt - self.parameters.liquidation_reserve;
            assert!(
                payment.amount() >= net_debt,
                "not enough mUSD supplied to close completely"
            );

            let trove_value = self.composite_value(&trove.collaterals);
            let tcr_after = self.tcr_with(
                self.total_collateral_value() - trove_value,
                self.total_debt - trove.debt,
            );
            assert!(
                tcr_after >= self.parameters.ccr,
                "Operation would push the total collateral ratio below the critical threshold."
            );

            self.burn_musd_internal(payment.take(net_debt));
            let reserve = self.gas_compensation_vault.take(self.parameters.liquidation_reserve);
            self.burn_musd_internal(reserve);
            self.total_debt -= trove.debt;

            let mut collateral: Vec<Bucket> = Vec::with_capacity(trove.collaterals.len());
            for (address, amount) in trove.collaterals.clone() {
                collateral.push(self.take_collateral(address, amount));
            }

            self.remove_stakes(&mut trove);
            self.sorted_troves.remove(&trove_id);

            trove.collaterals = index_map_new();
            trove.debt = Decimal::ZERO;
            trove.reward_snapshots = index_map_new();
            trove.status = TroveStatus::ClosedByOwner;
            self.write_trove(&trove_id, &trove);

            Runtime::emit_event(EventCloseTrove { trove_id });

            (collateral, payment)
        }

        /// Allows the holder of a liquidated or redeemed trove receipt to retrieve any
        /// surplus collateral that was left behind.
        ///
        /// # Returns
        /// * `Vec<Bucket>`: The surplus collateral, one bucket per kind.
        pub fn claim_surplus_collateral(&mut self, trove_proof: NonFungibleProof) -> Vec<Bucket> {
            let trove_id = self.checked_trove_id(trove_proof);
            let mut trove: Trove = self.trove_manager.get_non_fungible_data(&trove_id);

            assert!(
                trove.status == TroveStatus::ClosedByLiquidation
                    || trove.status == TroveStatus::ClosedByRedemption,
                "Trove not liquidated or redeemed"
            );
            assert!(!trove.collaterals.is_empty(), "No collateral surplus left");

            let mut surplus: Vec<Bucket> = Vec::with_capacity(trove.collaterals.len());
            for (address, amount) in trove.collaterals.clone() {
                surplus.push(
                    self.collaterals
                        .get_mut(&address)
                        .unwrap()
                        .leftovers
                        .take_advanced(amount, WithdrawStrategy::Rounded(RoundingMode::ToZero)),
                );
            }

            trove.collaterals = index_map_new();
            self.write_trove(&trove_id, &trove);

            surplus
        }

        /// Liquidates an undercollateralized trove. Restricted to holders of the
        /// controller badge; the public entry point is `StabilityPool::liquidate`,
        /// which funds the call with the pooled mUSD.
        ///
        /// The debt is covered in two phases: as much as the payment allows is burned
        /// (the offset, collateral moving to the pool proportionally), and the
        /// remainder is redistributed over all remaining troves through the per-kind
        /// accumulators. The caller earns the fixed liquidation reserve plus a fixed
        /// fraction of the seized collateral.
        ///
        /// # Arguments
        /// * `trove_id`: The trove to liquidate.
        /// * `payment`: mUSD made available by the caller (usually the pool's full
        ///   balance). An empty bucket forces pure redistribution.
        ///
        /// # Returns
        /// * `(Vec<Bucket>, Vec<Bucket>, Bucket, Bucket)`:
        ///   collateral for the pool (per kind), gas-compensation collateral for the
        ///   liquidator (per kind), the mUSD liquidation reserve, and the leftover
        ///   payment.
        ///
        /// # Panics
        /// * If `stop_liquidations` is set, the trove is not active, or its ratio does
        ///   not qualify for liquidation in the current mode.
        /// * If debt or collateral must be redistributed to a kind with no remaining
        ///   stakes.
        pub fn liquidate_trove(
            &mut self,
            trove_id: NonFungibleLocalId,
            mut payment: Bucket,
        ) -> (Vec<Bucket>, Vec<Bucket>, Bucket, Bucket) {
            assert!(
                !self.parameters.stop_liquidations,
                "Not allowed to liquidate troves right now."
            );
            assert!(
                payment.resource_address() == self.musd_manager.address(),
                "Invalid mUSD payment."
            );

            let mut trove = self.apply_pending_rewards(&trove_id);
            let icr = self.trove_icr(&trove);
            let recovery = self.recovery_mode();
            let tcr = self.system_tcr();

            assert!(
                icr < self.parameters.mcr
                    || (recovery && icr < self.parameters.ccr && icr < tcr),
                "Cannot liquidate, trove is sufficiently collateralized."
            );

            self.remove_stakes(&mut trove);
            self.sorted_troves.remove(&trove_id);

            let debt = trove.debt;
            let offset = debt.min(payment.amount());
            if offset > Decimal::ZERO {
                self.burn_musd_internal(payment.take(offset));
            }
            let redistributed_debt = debt - offset;
            let offset_fraction = offset / debt;

            // Seizure is capped at MCR-worth of value; anything above it (the
            // recovery-mode liquidation band) stays claimable by the owner.
            let seize_fraction = if icr > self.parameters.mcr {
                self.parameters.mcr / icr
            } else {
                Decimal::ONE
            };

            let mut pool_collateral: Vec<Bucket> = Vec::new();
            let mut gas_collateral: Vec<Bucket> = Vec::new();
            let mut surplus: IndexMap<ResourceAddress, Decimal> = index_map_new();
            let mut seized_values: IndexMap<ResourceAddress, Decimal> = index_map_new();
            let mut seized_value_total = Decimal::ZERO;

            for (address, amount) in trove.collaterals.clone() {
                let seized = amount * seize_fraction;
                let seized_value = self.collateral_value(address, seized);
                seized_values.insert(address, seized_value);
                seized_value_total += seized_value;

                let surplus_amount = amount - seized;
                if surplus_amount > Decimal::ZERO {
                    let surplus_bucket = self.take_collateral(address, surplus_amount);
                    surplus.insert(address, surplus_bucket.amount());
                    self.collaterals
                        .get_mut(&address)
                        .unwrap()
                        .leftovers
                        .put(surplus_bucket);
                }

                let gas_comp = seized / self.parameters.collateral_gas_comp_divisor;
                gas_collateral.push(self.take_collateral(address, gas_comp));

                let to_pool = (seized - gas_comp) * offset_fraction;
                if to_pool > Decimal::ZERO {
                    pool_collateral.push(self.take_collateral(address, to_pool));
                }
                // The rest of the seized collateral stays in the vault and is
                // redistributed through the accumulators below.
            }

            for (address, seized_value) in &seized_values {
                let to_redistribute = {
                    let seized = *trove.collaterals.get(address).unwrap() * seize_fraction;
                    let gas_comp = seized / self.parameters.collateral_gas_comp_divisor;
                    (seized - gas_comp) * (Decimal::ONE - offset_fraction)
                };
                let debt_share = if seized_value_total > Decimal::ZERO {
                    redistributed_debt * *seized_value / seized_value_total
                } else {
                    Decimal::ZERO
                };
                if to_redistribute > Decimal::ZERO || debt_share > Decimal::ZERO {
                    self.redistribute(*address, to_redistribute, debt_share);
                }
            }

            self.total_debt -= offset;

            for address in trove.collaterals.keys().cloned().collect::<Vec<_>>() {
                let mut info = self.collaterals.get_mut(&address).unwrap();
                info.total_stakes_snapshot = info.total_stakes;
                info.total_collateral_snapshot = info.total_collateral;
            }

            trove.collaterals = surplus;
            trove.debt = Decimal::ZERO;
            trove.reward_snapshots = index_map_new();
            trove.status = TroveStatus::ClosedByLiquidation;
            self.write_trove(&trove_id, &trove);

            let reserve = self
                .gas_compensation_vault
                .take(self.parameters.liquidation_reserve);

            Runtime::emit_event(EventLiquidateTrove {
                trove_id,
                debt_offset: offset,
                debt_redistributed: redistributed_debt,
            });

            (pool_collateral, gas_collateral, reserve, payment)
        }

        /// Whether a trove currently qualifies for liquidation.
        pub fn check_liquidate(&self, trove_id: NonFungibleLocalId) -> bool {
            let trove = self.synced_trove(&trove_id);
            if trove.status != TroveStatus::Active {
                return false;
            }
            let icr = self.trove_icr(&trove);
            let tcr = self.system_tcr();
            icr < self.parameters.mcr
                || (tcr < self.parameters.ccr && icr < self.parameters.ccr && icr < tcr)
        }

        /// Redeems mUSD for collateral at face value minus the decaying redemption
        /// fee, walking the sorted list from its tail (the riskiest troves first) and
        /// skipping troves under the MCR, which are left for liquidation.
        ///
        /// # Arguments
        /// * `payment`: The mUSD to redeem.
        /// * `max_troves`: The highest number of troves to redeem against.
        ///
        /// # Returns
        /// * `(Vec<Bucket>, Bucket)`: The redeemed collateral per kind and any mUSD
        ///   that could not be used.
        ///
        /// # Logic
        /// 1. The redemption fee is derived from the decayed redemption base rate plus
        ///    a spike proportional to the redeemed share of the supply; the rate is
        ///    clamped between the minimum and maximum redemption fee.
        /// 2. Each target trove has its pending rewards applied, debt cancelled up to
        ///    its net debt (partials keep the minimum), and collateral worth the
        ///    cancelled debt times (1 - fee) taken pro-rata over its kinds by market
        ///    value. The fee share of the collateral stays with the borrower.
        /// 3. Fully redeemed troves are closed with status `ClosedByRedemption`, their
        ///    leftover collateral claimable through the receipt; partially redeemed
        ///    troves are re-inserted at their new ratio.
        pub fn redeem(
            &mut self,
            mut payment: Bucket,
            max_troves: u64,
        ) -> (Vec<Bucket>, Bucket) {
            assert!(
                !self.parameters.stop_redemption,
                "Not allowed to redeem right now."
            );
            assert!(
                payment.resource_address() == self.musd_manager.address(),
                "Invalid mUSD payment."
            );
            assert!(
                self.system_tcr() >= self.parameters.mcr,
                "Cannot redeem while the total collateral ratio is below the minimum."
            );
            if self.sorted_troves.is_empty() || payment.is_empty() {
                return (vec![], payment);
            }

            let percentage_to_take = self.redemption_take_percentage(payment.amount());

            let mut payouts: IndexMap<ResourceAddress, Bucket> = index_map_new();

            for _ in 0..max_troves {
                if payment.is_empty() {
                    break;
                }

                // Find the riskiest trove that is not itself liquidatable.
                let mut cursor = self.sorted_troves.tail();
                let mut target: Option<NonFungibleLocalId> = None;
                while let Some(id) = cursor {
                    if self.current_icr(&id) >= self.parameters.mcr {
                        target = Some(id);
                        break;
                    }
                    cursor = self.sorted_troves.prev_of(&id);
                }
                let Some(trove_id) = target else { break };

                let mut trove = self.apply_pending_rewards(&trove_id);
                let net_debt = trove.debt - self.parameters.liquidation_reserve;

                let mut redeem_amount = payment.amount().min(net_debt);
                if redeem_amount < net_debt
                    && net_debt - redeem_amount < self.parameters.minimum_net_debt
                {
                    // A partial redemption may not strand the trove under the
                    // minimum net debt.
                    redeem_amount = net_debt - self.parameters.minimum_net_debt;
                }
                if redeem_amount <= Decimal::ZERO {
                    break;
                }

                self.burn_musd_internal(payment.take(redeem_amount));
                self.total_debt -= redeem_amount;
                trove.debt -= redeem_amount;

                let take_value = redeem_amount * percentage_to_take;
                let market_value: Decimal = trove
                    .collaterals
                    .iter()
                    .fold(Decimal::ZERO, |total, (address, amount)| {
                        total + *amount * self.collaterals.get(address).unwrap().usd_price
                    });

                for (address, amount) in trove.collaterals.clone() {
                    let take_amount = take_value * amount / market_value;
                    self.decrease_trove_collateral(&mut trove, address, take_amount);
                    let taken = self.take_collateral(address, take_amount);
                    match payouts.get_mut(&address) {
                        Some(bucket) => bucket.put(taken),
                        None => {
                            payouts.insert(address, taken);
                        }
                    }
                }

                let fully_redeemed = trove.debt == self.parameters.liquidation_reserve;
                if fully_redeemed {
                    let reserve = self
                        .gas_compensation_vault
                        .take(self.parameters.liquidation_reserve);
                    self.burn_musd_internal(reserve);
                    self.total_debt -= self.parameters.liquidation_reserve;
                    trove.debt = Decimal::ZERO;

                    // Whatever the redeemer did not take stays claimable by the owner.
                    let mut surplus: IndexMap<ResourceAddress, Decimal> = index_map_new();
                    for (address, amount) in trove.collaterals.clone() {
                        let surplus_bucket = self.take_collateral(address, amount);
                        surplus.insert(address, surplus_bucket.amount());
                        self.collaterals
                            .get_mut(&address)
                            .unwrap()
                            .leftovers
                            .put(surplus_bucket);
                    }

                    self.remove_stakes(&mut trove);
                    self.sorted_troves.remove(&trove_id);
                    trove.collaterals = surplus;
                    trove.reward_snapshots = index_map_new();
                    trove.status = TroveStatus::ClosedByRedemption;
                    self.write_trove(&trove_id, &trove);

                    Runtime::emit_event(EventRedeemTrove {
                        trove: trove.clone(),
                        trove_id,
                        musd_redeemed: redeem_amount,
                        fully_redeemed: true,
                    });
                } else {
                    for address in trove.stakes.keys().cloned().collect::<Vec<_>>() {
                        self.update_stake(&mut trove, address);
                    }
                    let new_icr = self.trove_icr(&trove);
                    self.write_trove(&trove_id, &trove);
                    self.reinsert_sorted(trove_id.clone(), new_icr, None, None);

                    Runtime::emit_event(EventRedeemTrove {
                        trove: trove.clone(),
                        trove_id,
                        musd_redeemed: redeem_amount,
                        fully_redeemed: false,
                    });
                }
            }

            self.last_redemption = Clock::current_time_rounded_to_seconds();

            (payouts.into_values().collect(), payment)
        }

        /// Fetches a fresh price for a collateral kind from the oracle. The oracle
        /// fails on stale or unverifiable data, which aborts the operation.
        pub fn update_price(&mut self, collateral: ResourceAddress, message: String, signature: String) {
            let price: Decimal = self.oracle.call_raw(
                &self.oracle_method_name,
                scrypto_args!(collateral, message, signature),
            );
            self.change_collateral_price(collateral, price);
        }

        /// Directly sets the stored price of a collateral kind.
        pub fn change_collateral_price(&mut self, collateral: ResourceAddress, new_price: Decimal) {
            assert!(new_price > Decimal::ZERO, "Price must be positive.");
            self.collaterals
                .get_mut(&collateral)
                .expect("Unknown collateral.")
                .usd_price = new_price;

            Runtime::emit_event(EventChangeCollateral {
                address: collateral,
                new_risk_ratio: None,
                new_usd_price: Some(new_price),
            });
        }

        /// Updates the oracle component address and method name.
        pub fn set_oracle(&mut self, oracle_address: ComponentAddress, method_name: String) {
            self.oracle = Global::from(oracle_address);
            self.oracle_method_name = method_name;
        }

        /// Registers a new accepted collateral kind.
        ///
        /// # Arguments
        /// * `address`: The collateral's `ResourceAddress`.
        /// * `risk_ratio`: The discount factor (≤ 1) applied to raw market value.
        /// * `usd_price`: The initial USD price.
        pub fn new_collateral(
            &mut self,
            address: ResourceAddress,
            risk_ratio: Decimal,
            usd_price: Decimal,
        ) {
            assert!(
                self.collaterals.get(&address).is_none(),
                "Collateral already exists."
            );
            assert!(
                risk_ratio > Decimal::ZERO && risk_ratio <= Decimal::ONE,
                "Risk ratio must be in (0, 1]."
            );
            assert!(usd_price > Decimal::ZERO, "Price must be positive.");

            self.collaterals.insert(
                address,
                CollateralInfo {
                    resource_address: address,
                    usd_price,
                    risk_ratio,
                    accepted: true,
                    total_collateral: Decimal::ZERO,
                    vault: Vault::new(address),
                    leftovers: Vault::new(address),
                    collateral_per_stake: Decimal::ZERO,
                    debt_per_stake: Decimal::ZERO,
                    total_stakes: Decimal::ZERO,
                    total_stakes_snapshot: Decimal::ZERO,
                    total_collateral_snapshot: Decimal::ZERO,
                    last_collateral_error: Decimal::ZERO,
                    last_debt_error: Decimal::ZERO,
                },
            );
            self.collateral_addresses.push(address);

            Runtime::emit_event(EventAddCollateral {
                address,
                risk_ratio,
                usd_price,
            });
        }

        /// Edits the risk ratio and acceptance flag of an existing collateral kind.
        pub fn edit_collateral(
            &mut self,
            address: ResourceAddress,
            new_risk_ratio: Option<Decimal>,
            accepted: bool,
        ) {
            let mut info = self.collaterals.get_mut(&address).expect("Unknown collateral.");
            if let Some(risk_ratio) = new_risk_ratio {
                assert!(
                    risk_ratio > Decimal::ZERO && risk_ratio <= Decimal::ONE,
                    "Risk ratio must be in (0, 1]."
                );
                info.risk_ratio = risk_ratio;
            }
            info.accepted = accepted;
            drop(info);

            Runtime::emit_event(EventChangeCollateral {
                address,
                new_risk_ratio,
                new_usd_price: None,
            });
        }

        /// Replaces the protocol parameters.
        pub fn set_parameters(&mut self, new_parameters: ProtocolParameters) {
            assert!(
                new_parameters.mcr > Decimal::ONE && new_parameters.ccr > new_parameters.mcr,
                "Invalid ratio thresholds."
            );
            self.parameters = new_parameters;
        }

        /// Sets the operation stop flags.
        pub fn set_stops(
            &mut self,
            liquidations: bool,
            openings: bool,
            closings: bool,
            redemption: bool,
        ) {
            self.parameters.stop_liquidations = liquidations;
            self.parameters.stop_openings = openings;
            self.parameters.stop_closings = closings;
            self.parameters.stop_redemption = redemption;
        }

        /// Mints controller badges for wiring up collaborating components.
        pub fn mint_controller_badge(&self, amount: Decimal) -> Bucket {
            self.controller_badge_manager.mint(amount)
        }

        /// Hands the accumulated borrowing fees to the caller. Used by the payout
        /// component.
        pub fn claim_payout_rewards(&mut self) -> Bucket {
            self.fee_vault.take_all()
        }

        /// Mints free mUSD. For testing purposes only; unbacked tokens break the
        /// conservation between debt and supply.
        pub fn free_musd(&mut self, amount: Decimal) -> Bucket {
            self.circulating_musd += amount;
            self.musd_manager.mint(amount)
        }

        /// Burns a bucket of mUSD.
        pub fn burn_musd(&mut self, bucket: Bucket) {
            assert!(
                bucket.resource_address() == self.musd_manager.address(),
                "Invalid mUSD payment."
            );
            self.burn_musd_internal(bucket);
        }

        //==================================================================
        //                          GETTERS
        //==================================================================

        /// Returns the requested troves with pending rewards applied virtually, plus
        /// their current ratios.
        pub fn get_troves_info(
            &self,
            trove_ids: Vec<NonFungibleLocalId>,
        ) -> Vec<(NonFungibleLocalId, Trove, Decimal)> {
            trove_ids
                .into_iter()
                .map(|id| {
                    let trove = self.synced_trove(&id);
                    let icr = self.trove_icr(&trove);
                    (id, trove, icr)
                })
                .collect()
        }

        /// Returns a trove's unapplied redistribution rewards.
        pub fn get_pending_rewards(&self, trove_id: NonFungibleLocalId) -> PendingRewards {
            let trove: Trove = self.trove_manager.get_non_fungible_data(&trove_id);
            let (collaterals, debt) = self.pending_rewards_of(&trove);
            PendingRewards { collaterals, debt }
        }

        /// Returns a trove's current collateralization ratio, pending rewards
        /// included, at the stored prices.
        pub fn get_current_icr(&self, trove_id: NonFungibleLocalId) -> Decimal {
            self.current_icr(&trove_id)
        }

        /// Returns the composite debt for a requested net amount: the amount plus the
        /// liquidation reserve.
        pub fn get_composite_debt(&self, net_debt: Decimal) -> Decimal {
            net_debt + self.parameters.liquidation_reserve
        }

        /// Summarized state of the requested collateral kinds (all kinds if `None`).
        pub fn get_collateral_infos(
            &self,
            resource_addresses: Option<Vec<ResourceAddress>>,
        ) -> Vec<CollateralInfoReturn> {
            let addresses =
                resource_addresses.unwrap_or_else(|| self.collateral_addresses.clone());
            addresses
                .into_iter()
                .map(|address| {
                    let info = self.collaterals.get(&address).expect("Unknown collateral.");
                    CollateralInfoReturn {
                        resource_address: info.resource_address,
                        usd_price: info.usd_price,
                        risk_ratio: info.risk_ratio,
                        accepted: info.accepted,
                        total_collateral: info.total_collateral,
                        vault: info.vault.amount(),
                        leftovers: info.leftovers.amount(),
                        collateral_per_stake: info.collateral_per_stake,
                        debt_per_stake: info.debt_per_stake,
                        total_stakes: info.total_stakes,
                        total_stakes_snapshot: info.total_stakes_snapshot,
                        total_collateral_snapshot: info.total_collateral_snapshot,
                    }
                })
                .collect()
        }

        /// Walks the sorted list from the head, returning up to `max_troves`
        /// `(id, current ratio)` pairs in list order.
        pub fn get_sorted_troves(&self, max_troves: u64) -> Vec<(NonFungibleLocalId, Decimal)> {
            let mut result = Vec::new();
            let mut cursor = self.sorted_troves.head();
            while let Some(id) = cursor {
                if result.len() as u64 >= max_troves {
                    break;
                }
                let icr = self.current_icr(&id);
                cursor = self.sorted_troves.next_of(&id);
                result.push((id, icr));
            }
            result
        }

        /// Walks the sorted list from the tail, returning up to `max_troves` trove ids
        /// that currently qualify for liquidation.
        pub fn get_next_liquidations(&self, max_troves: u64) -> Vec<NonFungibleLocalId> {
            let mut result = Vec::new();
            let mut cursor = self.sorted_troves.tail();
            while let Some(id) = cursor {
                if result.len() as u64 >= max_troves {
                    break;
                }
                cursor = self.sorted_troves.prev_of(&id);
                if self.check_liquidate(id.clone()) {
                    result.push(id);
                }
            }
            result
        }

        /// The system-wide total collateral ratio at the stored prices.
        pub fn get_system_tcr(&self) -> Decimal {
            self.system_tcr()
        }

        /// Whether the system is in recovery mode (TCR below the CCR).
        pub fn is_recovery_mode(&self) -> bool {
            self.recovery_mode()
        }

        /// The borrowing fee rate that a debt issuance would pay right now.
        pub fn get_borrowing_rate(&self) -> Decimal {
            self.decayed_base_rate()
                .max(self.parameters.borrowing_fee_floor)
                .min(self.parameters.max_borrowing_fee)
        }

        /// The sum of all active troves' composite debt.
        pub fn get_total_debt(&self) -> Decimal {
            self.total_debt
        }

        /// The amount of mUSD minted by this component and not yet burned.
        pub fn get_circulating_musd(&self) -> Decimal {
            self.circulating_musd
        }

        pub fn get_musd_address(&self) -> ResourceAddress {
            self.musd_manager.address()
        }

        pub fn get_trove_address(&self) -> ResourceAddress {
            self.trove_manager.address()
        }

        //==================================================================
        //                      INTERNAL: LEDGER
        //==================================================================

        /// Checks the supplied receipt proof and extracts the trove id.
        fn checked_trove_id(&self, trove_proof: NonFungibleProof) -> NonFungibleLocalId {
            let trove_proof = trove_proof.check_with_message(
                self.trove_manager.address(),
                "Incorrect proof! Are you sure this trove is yours?",
            );
            trove_proof.non_fungible::<Trove>().local_id().clone()
        }

        /// Writes every mutable field of a trove back to its receipt NFT.
        fn write_trove(&self, trove_id: &NonFungibleLocalId, trove: &Trove) {
            self.trove_manager
                .update_non_fungible_data(trove_id, "collaterals", trove.collaterals.clone());
            self.trove_manager
                .update_non_fungible_data(trove_id, "debt", trove.debt);
            self.trove_manager
                .update_non_fungible_data(trove_id, "stakes", trove.stakes.clone());
            self.trove_manager.update_non_fungible_data(
                trove_id,
                "reward_snapshots",
                trove.reward_snapshots.clone(),
            );
            self.trove_manager
                .update_non_fungible_data(trove_id, "status", trove.status.clone());
        }

        /// Computes a trove's unapplied redistribution rewards per kind and in debt.
        fn pending_rewards_of(
            &self,
            trove: &Trove,
        ) -> (IndexMap<ResourceAddress, Decimal>, Decimal) {
            let mut pending_collaterals: IndexMap<ResourceAddress, Decimal> = index_map_new();
            let mut pending_debt = Decimal::ZERO;

            for (address, stake) in &trove.stakes {
                let info = self.collaterals.get(address).unwrap();
                let snapshot = trove
                    .reward_snapshots
                    .get(address)
                    .cloned()
                    .unwrap_or_else(RewardSnapshot::zero);
                let collateral_gain =
                    (info.collateral_per_stake - snapshot.collateral_per_stake) * *stake;
                let debt_gain = (info.debt_per_stake - snapshot.debt_per_stake) * *stake;
                if collateral_gain > Decimal::ZERO {
                    pending_collaterals.insert(*address, collateral_gain);
                }
                pending_debt += debt_gain;
            }

            (pending_collaterals, pending_debt)
        }

        /// Returns a trove with its pending rewards applied and snapshots refreshed,
        /// without writing anything back.
        fn synced_trove(&self, trove_id: &NonFungibleLocalId) -> Trove {
            let mut trove: Trove = self.trove_manager.get_non_fungible_data(trove_id);
            if trove.status != TroveStatus::Active {
                return trove;
            }

            let (pending_collaterals, pending_debt) = self.pending_rewards_of(&trove);
            for (address, gain) in pending_collaterals {
                let recorded = trove
                    .collaterals
                    .get(&address)
                    .cloned()
                    .unwrap_or(Decimal::ZERO);
                trove.collaterals.insert(address, recorded + gain);
            }
            trove.debt += pending_debt;
            for address in trove.stakes.keys().cloned().collect::<Vec<_>>() {
                trove
                    .reward_snapshots
                    .insert(address, self.accumulator_snapshot(address));
            }
            trove
        }

        /// Applies a trove's pending redistribution rewards and persists the result.
        /// The first step of every mutating operation on an active trove. Calling it
        /// twice in a row is a no-op the second time, since the snapshots then match
        /// the accumulators.
        fn apply_pending_rewards(&mut self, trove_id: &NonFungibleLocalId) -> Trove {
            let trove = self.synced_trove(trove_id);
            assert!(trove.status == TroveStatus::Active, "Trove not active.");
            self.write_trove(trove_id, &trove);
            trove
        }

        /// The current accumulator values for one collateral kind.
        fn accumulator_snapshot(&self, address: ResourceAddress) -> RewardSnapshot {
            let info = self.collaterals.get(&address).unwrap();
            RewardSnapshot {
                collateral_per_stake: info.collateral_per_stake,
                debt_per_stake: info.debt_per_stake,
            }
        }

        /// Recomputes a trove's stake for one kind from its recorded collateral and
        /// the global snapshot ratio, adjusting the kind's stake total by the delta.
        /// Invoked after every collateral-amount change.
        fn update_stake(&mut self, trove: &mut Trove, address: ResourceAddress) {
            let amount = trove
                .collaterals
                .get(&address)
                .cloned()
                .unwrap_or(Decimal::ZERO);
            let old_stake = trove.stakes.get(&address).cloned().unwrap_or(Decimal::ZERO);

            let mut info = self.collaterals.get_mut(&address).unwrap();
            let new_stake = if info.total_collateral_snapshot == Decimal::ZERO {
                amount
            } else {
                amount * info.total_stakes_snapshot / info.total_collateral_snapshot
            };
            info.total_stakes += new_stake - old_stake;
            drop(info);

            if new_stake == Decimal::ZERO {
                trove.stakes.shift_remove(&address);
            } else {
                trove.stakes.insert(address, new_stake);
            }
        }

        /// Removes all of a trove's stakes from the global totals.
        fn remove_stakes(&mut self, trove: &mut Trove) {
            for (address, stake) in trove.stakes.clone() {
                self.collaterals.get_mut(&address).unwrap().total_stakes -= stake;
            }
            trove.stakes = index_map_new();
        }

        /// Adds redistributed collateral and debt for one kind to the global
        /// accumulators, carrying the division remainders into the next liquidation so
        /// the accumulators never drift from the distributed totals.
        fn redistribute(
            &mut self,
            address: ResourceAddress,
            collateral_amount: Decimal,
            debt_amount: Decimal,
        ) {
            let mut info = self.collaterals.get_mut(&address).unwrap();
            assert!(
                info.total_stakes > Decimal::ZERO,
                "No remaining stakes to redistribute to."
            );

            let collateral_numerator = collateral_amount + info.last_collateral_error;
            let collateral_per_unit = collateral_numerator / info.total_stakes;
            info.last_collateral_error =
                collateral_numerator - collateral_per_unit * info.total_stakes;
            info.collateral_per_stake += collateral_per_unit;

            let debt_numerator = debt_amount + info.last_debt_error;
            let debt_per_unit = debt_numerator / info.total_stakes;
            info.last_debt_error = debt_numerator - debt_per_unit * info.total_stakes;
            info.debt_per_stake += debt_per_unit;
        }

        /// Removes collateral from a trove's records, pruning zero entries.
        fn decrease_trove_collateral(
            &self,
            trove: &mut Trove,
            address: ResourceAddress,
            amount: Decimal,
        ) {
            let recorded = trove
                .collaterals
                .get(&address)
                .cloned()
                .unwrap_or(Decimal::ZERO);
            assert!(
                recorded >= amount,
                "Trove does not hold that much collateral."
            );
            let remaining = recorded - amount;
            if remaining == Decimal::ZERO {
                trove.collaterals.shift_remove(&address);
            } else {
                trove.collaterals.insert(address, remaining);
            }
        }

        /// Puts collateral into its vault, tracking the active total.
        fn put_collateral(&mut self, address: ResourceAddress, bucket: Bucket) {
            let mut info = self.collaterals.get_mut(&address).unwrap();
            info.total_collateral += bucket.amount();
            info.vault.put(bucket);
        }

        /// Takes collateral out of its vault, tracking the active total.
        fn take_collateral(&mut self, address: ResourceAddress, amount: Decimal) -> Bucket {
            let mut info = self.collaterals.get_mut(&address).unwrap();
            info.total_collateral -= amount;
            info.vault
                .take_advanced(amount, WithdrawStrategy::Rounded(RoundingMode::ToZero))
        }

        /// Mints mUSD, tracking the circulating amount.
        fn mint_musd(&mut self, amount: Decimal) -> Bucket {
            self.circulating_musd += amount;
            self.musd_manager.mint(amount)
        }

        /// Burns mUSD, tracking the circulating amount.
        fn burn_musd_internal(&mut self, bucket: Bucket) {
            self.circulating_musd -= bucket.amount();
            self.musd_manager.burn(bucket);
        }

        /// Splits a composite-debt mint into its destinations: the fee into the fee
        /// vault, the liquidation reserve into the gas compensation vault, the rest
        /// stays for the caller.
        fn split_composite_mint(&mut self, mut musd_tokens: Bucket, fee: Decimal) -> Bucket {
            self.fee_vault.put(musd_tokens.take(fee));
            self.gas_compensation_vault
                .put(musd_tokens.take(self.parameters.liquidation_reserve));
            musd_tokens
        }

        /// Routes the fee part of a debt-increase mint into the fee vault.
        fn split_fee_mint(&mut self, mut musd_tokens: Bucket, fee: Decimal) -> Bucket {
            self.fee_vault.put(musd_tokens.take(fee));
            musd_tokens
        }

        //==================================================================
        //                      INTERNAL: VALUATION
        //==================================================================

        /// Risk-adjusted USD value of an amount of one collateral kind.
        fn collateral_value(&self, address: ResourceAddress, amount: Decimal) -> Decimal {
            let info = self.collaterals.get(&address).unwrap();
            amount * info.usd_price * info.risk_ratio
        }

        /// Risk-adjusted USD value of a per-kind amount map.
        fn composite_value(&self, amounts: &IndexMap<ResourceAddress, Decimal>) -> Decimal {
            amounts
                .iter()
                .fold(Decimal::ZERO, |total, (address, amount)| {
                    total + self.collateral_value(*address, *amount)
                })
        }

        /// A trove's current collateralization ratio.
        fn trove_icr(&self, trove: &Trove) -> Decimal {
            if trove.debt == Decimal::ZERO {
                return Decimal::MAX;
            }
            self.composite_value(&trove.collaterals) / trove.debt
        }

        /// A trove's current ratio, pending rewards included.
        fn current_icr(&self, trove_id: &NonFungibleLocalId) -> Decimal {
            let trove = self.synced_trove(trove_id);
            self.trove_icr(&trove)
        }

        /// Risk-adjusted USD value of all collateral backing active troves.
        fn total_collateral_value(&self) -> Decimal {
            self.collateral_addresses
                .iter()
                .fold(Decimal::ZERO, |total, address| {
                    let info = self.collaterals.get(address).unwrap();
                    total + info.total_collateral * info.usd_price * info.risk_ratio
                })
        }

        /// The system's total collateral ratio.
        fn system_tcr(&self) -> Decimal {
            self.tcr_with(self.total_collateral_value(), self.total_debt)
        }

        fn tcr_with(&self, collateral_value: Decimal, debt: Decimal) -> Decimal {
            if debt == Decimal::ZERO {
                return Decimal::MAX;
            }
            collateral_value / debt
        }

        fn recovery_mode(&self) -> bool {
            self.system_tcr() < self.parameters.ccr
        }

        /// The shared post-state validation of every trove adjustment. Recovery mode
        /// forbids collateral withdrawal, holds debt increases to the CCR, and never
        /// lets an adjustment reduce a trove's ratio; the rule that a debt increase
        /// may not reduce the ratio even above the CCR is deliberately a separate
        /// branch from the threshold check. Normal mode requires the MCR and a
        /// post-operation TCR above the CCR.
        fn validate_adjustment(
            &self,
            recovery: bool,
            old_icr: Decimal,
            new_icr: Decimal,
            debt_increase: bool,
            collateral_withdrawal: bool,
            tcr_after: Decimal,
        ) {
            if recovery {
                assert!(
                    !collateral_withdrawal,
                    "Collateral withdrawal is not allowed while the system is in recovery mode."
                );
                if debt_increase {
                    assert!(new_icr >= self.parameters.ccr, "Collateral value too low.");
                    assert!(
                        new_icr >= old_icr,
                        "Debt increases may not reduce the collateral ratio while the system is in recovery mode."
                    );
                } else {
                    assert!(
                        new_icr >= old_icr,
                        "Adjustment may not reduce the collateral ratio while the system is in recovery mode."
                    );
                }
            } else {
                assert!(new_icr >= self.parameters.mcr, "Collateral value too low.");
                assert!(
                    tcr_after >= self.parameters.ccr,
                    "Operation would push the total collateral ratio below the critical threshold."
                );
            }
        }

        //==================================================================
        //                      INTERNAL: FEES
        //==================================================================

        /// The borrowing base rate decayed by the minutes elapsed since the last
        /// fee-clock update. Sub-minute elapses decay nothing, which is what lets the
        /// 60-second clock gate work without ever double-decaying.
        fn decayed_base_rate(&self) -> Decimal {
            let elapsed_minutes = (Clock::current_time_rounded_to_seconds()
                .seconds_since_unix_epoch
                - self.last_fee_operation.seconds_since_unix_epoch)
                / 60;
            self.base_rate
                * self
                    .parameters
                    .minute_decay_factor
                    .checked_powi(elapsed_minutes)
                    .unwrap()
        }

        /// Charges the borrowing fee for a debt issuance: decays the base rate in
        /// place, derives the fee from the decayed rate (floored and capped), then
        /// bumps the rate by the issued share of the supply. Waived entirely in
        /// recovery mode. The fee clock only moves when at least a minute has passed
        /// since its last update.
        fn trigger_borrowing_fee(
            &mut self,
            amount: Decimal,
            max_fee_percent: Decimal,
            recovery: bool,
        ) -> Decimal {
            if recovery {
                return Decimal::ZERO;
            }

            let decayed = self.decayed_base_rate();
            let rate = decayed
                .max(self.parameters.borrowing_fee_floor)
                .min(self.parameters.max_borrowing_fee);
            assert!(
                rate <= max_fee_percent,
                "Borrowing fee exceeds the provided maximum."
            );
            let fee = rate * amount;

            let supply_after = self.circulating_musd + amount;
            self.base_rate = (decayed + amount / supply_after).min(Decimal::ONE);

            let now = Clock::current_time_rounded_to_seconds();
            if now.seconds_since_unix_epoch - self.last_fee_operation.seconds_since_unix_epoch >= 60
            {
                self.last_fee_operation = now;
            }

            Runtime::emit_event(EventBaseRateUpdate {
                base_rate: self.base_rate,
                fee,
            });

            fee
        }

        /// The collateral share a redeemer receives: one minus the redemption fee,
        /// where the fee is the decayed redemption base rate plus half the spike the
        /// redemption itself causes, clamped between the minimum and maximum fee.
        /// Spikes the stored base rate by the full redeemed fraction.
        fn redemption_take_percentage(&mut self, payment_amount: Decimal) -> Decimal {
            let redeemed_fraction = payment_amount / self.circulating_musd;
            let elapsed_seconds = Clock::current_time_rounded_to_seconds()
                .seconds_since_unix_epoch
                - self.last_redemption.seconds_since_unix_epoch;
            let current_base_rate = self.redemption_base_rate
                * self
                    .parameters
                    .redemption_halflife_k
                    .checked_powi(elapsed_seconds)
                    .unwrap();
            let spike = self.parameters.redemption_spike_k * redeemed_fraction;
            self.redemption_base_rate = current_base_rate + spike;
            let rate_to_use = current_base_rate + dec!("0.5") * spike;

            Decimal::ONE
                - self
                    .parameters
                    .maximum_redemption_fee
                    .min(rate_to_use + self.parameters.minimum_redemption_fee)
        }

        //==================================================================
        //                      INTERNAL: SORTED LIST
        //==================================================================

        /// The ratio used for list ordering. Computed on demand so list maintenance
        /// always compares against the same price snapshot as the operation itself.
        fn ordering_ratio(&self, trove_id: &NonFungibleLocalId) -> Decimal {
            self.current_icr(trove_id)
        }

        /// Finds the insert position for a ratio, trying the caller's hints first and
        /// falling back to a scan. Equal-ratio entries keep their insertion order: a
        /// new entry always lands behind existing equals.
        fn find_insert_position(
            &self,
            icr: Decimal,
            prev_hint: Option<NonFungibleLocalId>,
            next_hint: Option<NonFungibleLocalId>,
        ) -> (Option<NonFungibleLocalId>, Option<NonFungibleLocalId>) {
            let prev = prev_hint
                .filter(|id| self.sorted_troves.contains(id) && self.ordering_ratio(id) >= icr);
            let next = next_hint
                .filter(|id| self.sorted_troves.contains(id) && self.ordering_ratio(id) < icr);

            match (prev, next) {
                (Some(prev_id), _) => self.descend_from(prev_id, icr),
                (None, Some(next_id)) => self.ascend_from(next_id, icr),
                (None, None) => match self.sorted_troves.head() {
                    None => (None, None),
                    Some(head) => {
                        if icr > self.ordering_ratio(&head) {
                            (None, Some(head))
                        } else {
                            self.descend_from(head, icr)
                        }
                    }
                },
            }
        }

        /// Walks towards the tail from a node whose ratio is at least `icr` until the
        /// slot before the first strictly smaller ratio.
        fn descend_from(
            &self,
            start: NonFungibleLocalId,
            icr: Decimal,
        ) -> (Option<NonFungibleLocalId>, Option<NonFungibleLocalId>) {
            let mut current = start;
            loop {
                match self.sorted_troves.next_of(&current) {
                    None => return (Some(current), None),
                    Some(next) => {
                        if icr > self.ordering_ratio(&next) {
                            return (Some(current), Some(next));
                        }
                        current = next;
                    }
                }
            }
        }

        /// Walks towards the head from a node whose ratio is below `icr` until the
        /// slot behind the first ratio of at least `icr`.
        fn ascend_from(
            &self,
            start: NonFungibleLocalId,
            icr: Decimal,
        ) -> (Option<NonFungibleLocalId>, Option<NonFungibleLocalId>) {
            let mut current = start;
            loop {
                match self.sorted_troves.prev_of(&current) {
                    None => return (None, Some(current)),
                    Some(prev) => {
                        if self.ordering_ratio(&prev) >= icr {
                            return (Some(prev), Some(current));
                        }
                        current = prev;
                    }
                }
            }
        }

        /// Inserts a trove id into the sorted list at its ratio.
        fn insert_sorted(
            &mut self,
            trove_id: NonFungibleLocalId,
            icr: Decimal,
            prev_hint: Option<NonFungibleLocalId>,
            next_hint: Option<NonFungibleLocalId>,
        ) {
            assert!(icr > Decimal::ZERO, "Ratio must be positive.");
            let (prev, next) = self.find_insert_position(icr, prev_hint, next_hint);
            self.sorted_troves.insert_between(trove_id, prev, next);
        }

        /// Repositions a trove id for a new ratio. When the node is still validly
        /// ordered between its current neighbors it stays exactly where it is, which
        /// both avoids pointer churn and keeps equal-ratio entries in insertion order.
        fn reinsert_sorted(
            &mut self,
            trove_id: NonFungibleLocalId,
            new_icr: Decimal,
            prev_hint: Option<NonFungibleLocalId>,
            next_hint: Option<NonFungibleLocalId>,
        ) {
            assert!(new_icr > Decimal::ZERO, "Ratio must be positive.");
            let prev = self.sorted_troves.prev_of(&trove_id);
            let next = self.sorted_troves.next_of(&trove_id);

            let ordered_after_prev = prev
                .as_ref()
                .map(|id| self.ordering_ratio(id) >= new_icr)
                .unwrap_or(true);
            let ordered_before_next = next
                .as_ref()
                .map(|id| new_icr >= self.ordering_ratio(id))
                .unwrap_or(true);
            if ordered_after_prev && ordered_before_next {
                return;
            }

            self.sorted_troves.remove(&trove_id);
            let (prev, next) = self.find_insert_position(
                new_icr,
                prev_hint.or(prev),
                next_hint.or(next),
            );
            self.sorted_troves.insert_between(trove_id, prev, next);
        }
    }
}

#[derive(ScryptoSbor)]
/// All info about a collateral kind used by the protocol, including the
/// redistribution accumulators that encode every liquidation since genesis.
pub struct CollateralInfo {
    pub resource_address: ResourceAddress,
    pub usd_price: Decimal,
    pub risk_ratio: Decimal,
    pub accepted: bool,
    /// Collateral backing active troves: recorded amounts plus redistributed
    /// amounts that troves have not applied yet.
    pub total_collateral: Decimal,
    pub vault: Vault,
    pub leftovers: Vault,
    /// Redistributed collateral per unit staked, accumulated since genesis.
    pub collateral_per_stake: Decimal,
    /// Redistributed debt per unit staked, accumulated since genesis.
    pub debt_per_stake: Decimal,
    pub total_stakes: Decimal,
    /// Stake total captured after the last liquidation; numerator of the stake
    /// correction applied to troves opened or adjusted afterwards.
    pub total_stakes_snapshot: Decimal,
    /// Collateral total captured after the last liquidation; denominator of the
    /// stake correction.
    pub total_collateral_snapshot: Decimal,
    pub last_collateral_error: Decimal,
    pub last_debt_error: Decimal,
}

#[derive(ScryptoSbor, Clone)]
pub struct ProtocolParameters {
    /// Minimum collateral ratio of an individual trove.
    pub mcr: Decimal,
    /// Critical ratio: the system is in recovery mode while the TCR is below it.
    pub ccr: Decimal,
    /// Smallest allowed net debt (composite debt minus the liquidation reserve).
    pub minimum_net_debt: Decimal,
    /// Fixed mUSD amount reserved per trove and paid to its liquidator.
    pub liquidation_reserve: Decimal,
    /// Divisor for the collateral share paid to a liquidator (200 → 0.5%).
    pub collateral_gas_comp_divisor: Decimal,
    pub borrowing_fee_floor: Decimal,
    pub max_borrowing_fee: Decimal,
    pub minute_decay_factor: Decimal,
    pub redemption_halflife_k: Decimal,
    pub redemption_spike_k: Decimal,
    pub minimum_redemption_fee: Decimal,
    pub maximum_redemption_fee: Decimal,
    pub max_troves: u64,
    pub stop_liquidations: bool,
    pub stop_openings: bool,
    pub stop_closings: bool,
    pub stop_redemption: bool,
}
