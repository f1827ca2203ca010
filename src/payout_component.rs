use crate::events::*;
use crate::meridian_component::meridian_component::*;
use scrypto::prelude::*;

#[blueprint]
#[events(
    PayoutClaimEvent,
    PayoutFetchRewardsEvent,
    PayoutRequirementUpdateEvent,
)]
mod payout_component {
    enable_method_auth! {
        methods {
            // Public methods
            claim_rewards => PUBLIC;
            fetch_rewards_from_core => PUBLIC;
            receive_badges => PUBLIC;
            receive_rewards => PUBLIC;
            // Restricted methods
            take_payout_component_rewards => restrict_to: [OWNER];
            set_parameters => restrict_to: [OWNER];
            send_badges => restrict_to: [OWNER];
            take_payments => restrict_to: [OWNER];
        }
    }

    /// Collects the borrowing fees the core component accumulates and distributes
    /// them. Rewards are claimable against a payment token, or withdrawable directly
    /// with badge authorization.
    struct PayoutComponent {
        /// Vault holding the controller badge, granting admin privileges.
        controller_badge_vault: FungibleVault,
        /// Vault holding the accumulated mUSD fees.
        musd_vault: FungibleVault,
        /// Vault collecting the payment tokens when claims are not burned.
        payment_token_vault: FungibleVault,
        /// The amount of the payment token required to claim rewards.
        required_payment_amount: Decimal,
        /// The address of the core component fees are fetched from.
        meridian_address: ComponentAddress,
        /// Whether to burn the payment token after claiming rewards.
        burn: bool,
    }

    impl PayoutComponent {
        /// Instantiates the PayoutComponent.
        ///
        /// # Arguments
        /// * `controller_badge`: A bucket containing controller badges for authorization.
        /// * `payment_token_address`: The resource address of the token required for payment.
        /// * `initial_required_payment_amount`: The initial amount of the payment token required.
        /// * `musd_address`: The resource address of the mUSD token.
        /// * `meridian_address`: The address of the core component.
        /// * `owner_role`: The OwnerRole for the component.
        /// * `dapp_def_address`: The DApp definition address for metadata.
        pub fn instantiate(
            controller_badge: Bucket,
            payment_token_address: ResourceAddress,
            initial_required_payment_amount: Decimal,
            musd_address: ResourceAddress,
            meridian_address: ComponentAddress,
            owner_role: OwnerRole,
            dapp_def_address: GlobalAddress,
        ) -> Global<PayoutComponent> {
            let (address_reservation, _component_address) =
                Runtime::allocate_component_address(PayoutComponent::blueprint_id());

            assert!(
                initial_required_payment_amount > Decimal::ZERO,
                "Required payment amount must be positive"
            );

            Self {
                controller_badge_vault: FungibleVault::with_bucket(controller_badge.as_fungible()),
                musd_vault: FungibleVault::new(musd_address),
                payment_token_vault: FungibleVault::new(payment_token_address),
                required_payment_amount: initial_required_payment_amount,
                meridian_address,
                burn: true,
            }
            .instantiate()
            .prepare_to_globalize(owner_role)
            .with_address(address_reservation)
            .metadata(metadata! {
                init {
                    "name" => "Meridian Payout Component".to_string(), updatable;
                    "description" => "Handles distribution of Meridian protocol fees.".to_string(), updatable;
                    "dapp_definition" => dapp_def_address, updatable;
                    "info_url" => Url::of("https://meridianusd.io"), updatable;
                }
            })
            .globalize()
        }

        /// Allows a user to claim all available mUSD fees by providing the required
        /// payment token amount.
        ///
        /// # Returns
        /// * `(Bucket, Bucket)`: The claimed mUSD fees and any remaining payment tokens.
        pub fn claim_rewards(&mut self, mut payment_bucket: Bucket) -> (Bucket, Bucket) {
            assert!(
                payment_bucket.amount() >= self.required_payment_amount,
                "Insufficient payment amount provided. Required: {}",
                self.required_payment_amount
            );

            if self.burn {
                payment_bucket.take(self.required_payment_amount).burn();
            } else {
                self.payment_token_vault
                    .put(payment_bucket.take(self.required_payment_amount).as_fungible());
            }

            self.fetch_rewards_from_core();

            let rewards = self.musd_vault.take_all();

            Runtime::emit_event(PayoutClaimEvent {
                amount: rewards.amount(),
            });

            (rewards.into(), payment_bucket)
        }

        /// Allows the component owner (holding the badge) to withdraw all accumulated
        /// mUSD fees directly.
        pub fn take_payout_component_rewards(&mut self) -> Bucket {
            self.musd_vault.take_all().into()
        }

        /// Allows the component owner (holding the badge) to withdraw all accumulated
        /// payment tokens directly.
        pub fn take_payments(&mut self) -> Bucket {
            self.payment_token_vault.take_all().into()
        }

        /// Sets the payment amount required to claim rewards and whether the payment
        /// is burned.
        pub fn set_parameters(&mut self, new_required_payment_amount: Decimal, burn: bool) {
            assert!(
                new_required_payment_amount > Decimal::ZERO,
                "Required payment amount must be positive"
            );
            self.required_payment_amount = new_required_payment_amount;
            self.burn = burn;

            Runtime::emit_event(PayoutRequirementUpdateEvent {
                new_requirement: new_required_payment_amount,
                burn,
            });
        }

        /// Sends controller badges to another component.
        pub fn send_badges(&mut self, amount: Decimal, receiver_address: ComponentAddress) {
            let receiver: Global<AnyComponent> = Global::from(receiver_address);
            let badge_bucket: Bucket = self.controller_badge_vault.take(amount).into();
            receiver.call_raw("receive_badges", scrypto_args!(badge_bucket))
        }

        /// Allows the component to receive controller badges.
        pub fn receive_badges(&mut self, badge_bucket: Bucket) {
            self.controller_badge_vault.put(badge_bucket.as_fungible());
        }

        /// Fetches the fees accumulated in the core component's fee vault.
        pub fn fetch_rewards_from_core(&mut self) {
            let meridian: Global<Meridian> = Global::from(self.meridian_address);

            let rewards_bucket: Bucket = self
                .controller_badge_vault
                .authorize_with_amount(Decimal::ONE, || meridian.claim_payout_rewards());

            Runtime::emit_event(PayoutFetchRewardsEvent {
                amount: rewards_bucket.amount(),
            });

            self.musd_vault.put(rewards_bucket.as_fungible());
        }

        /// Receives mUSD fees directly. Used primarily for testing.
        pub fn receive_rewards(&mut self, rewards: Bucket) {
            assert!(
                rewards.resource_address() == self.musd_vault.resource_address(),
                "Invalid rewards token"
            );
            self.musd_vault.put(rewards.as_fungible());
        }
    }
}
