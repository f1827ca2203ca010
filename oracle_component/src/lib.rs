//! # Oracle Blueprint
//! Component verifying collateral prices for the Meridian protocol.
//!
//! Wraps the Morpher oracle: callers hand in a signed price message per collateral
//! kind, the wrapped oracle verifies the signature, and this component checks that
//! the message belongs to the right market and is fresh enough. A stale or
//! mismatched message aborts the transaction, so collateral can never be valued on
//! bad data.

use scrypto::prelude::*;

#[derive(ScryptoSbor, Clone)]
pub struct PriceMessage {
    pub market_id: String,
    pub price: Decimal,
    pub nonce: u64,
    pub created_at: u64,
}

#[blueprint]
mod oracle {
    enable_method_auth! {
        methods {
            check_price_input => PUBLIC;
            check_price_inputs => PUBLIC;
            add_market_identifier => restrict_to: [OWNER];
            set_max_price_age => restrict_to: [OWNER];
        }
    }

    extern_blueprint! {
        //"package_sim1pkgxxxxxxxxxpackgexxxxxxxxx000726633226xxxxxxxxxlk8hc9", //simulator package, uncomment to run tests
        "package_tdx_2_1phrthm8neequrhdg8jxvvwd8xazccuaa8u3ufyemysade0ckv88an2", //stokenet morpher package
        //"package_rdx1p5xvvessslnpnfam9weyzldlxr7q06gen2t3d3waa0x760g7jwxhkd", //mainnet morpher package
        MorpherOracle {
            fn check_price_input(&self, message: String, signature: String) -> PriceMessage;
        }

        // oracle address for stokenet: component_tdx_2_1cpt6kp3mqkds5uy858mqedwfglhsw25lhey59ev45ayce4yfsghf90
        // oracle address for mainnet: component_rdx1cp07hrz378zfugcf6h8f9usct4zqx7rdgjhxjwphkzxyv9h7l2q04s
    }

    struct Oracle {
        market_identifiers: HashMap<ResourceAddress, String>,
        oracle_address: ComponentAddress,
        max_price_age: i64,
    }

    impl Oracle {
        pub fn instantiate_oracle(
            owner_role: OwnerRole,
            oracle_address: ComponentAddress,
            dapp_def_address: GlobalAddress,
        ) -> Global<Oracle> {
            Self {
                market_identifiers: HashMap::new(),
                oracle_address,
                max_price_age: 120,
            }
            .instantiate()
            .prepare_to_globalize(owner_role)
            .metadata(metadata! {
                init {
                    "name" => "Meridian Oracle".to_string(), updatable;
                    "description" => "An oracle used to keep track of collateral prices for Meridian".to_string(), updatable;
                    "info_url" => Url::of("https://meridianusd.io"), updatable;
                    "dapp_definition" => dapp_def_address, updatable;
                }
            })
            .globalize()
        }

        pub fn check_price_input(
            &mut self,
            collateral: ResourceAddress,
            message: String,
            signature: String,
        ) -> Decimal {
            let morpher_oracle = Global::<MorpherOracle>::from(self.oracle_address);
            let price_message = morpher_oracle.check_price_input(message, signature);
            self.check_message_validity(collateral, price_message.clone());

            price_message.price
        }

        pub fn check_price_inputs(
            &mut self,
            collaterals: Vec<(ResourceAddress, String, String)>,
        ) -> Vec<(ResourceAddress, Decimal)> {
            let morpher_oracle = Global::<MorpherOracle>::from(self.oracle_address);
            let mut price_return: Vec<(ResourceAddress, Decimal)> = vec![];

            for (collateral, message, signature) in collaterals {
                let price_message = morpher_oracle.check_price_input(message, signature);
                self.check_message_validity(collateral, price_message.clone());
                price_return.push((collateral, price_message.price));
            }

            price_return
        }

        pub fn add_market_identifier(
            &mut self,
            resource_address: ResourceAddress,
            market_id: String,
        ) {
            self.market_identifiers.insert(resource_address, market_id);
        }

        pub fn set_max_price_age(&mut self, new_max_age: i64) {
            self.max_price_age = new_max_age;
        }

        fn check_message_validity(&self, collateral: ResourceAddress, message: PriceMessage) {
            assert_eq!(
                *self
                    .market_identifiers
                    .get(&collateral)
                    .expect("Collateral not supported."),
                message.market_id
            );
            assert!(
                (message.created_at as i64 + self.max_price_age)
                    > Clock::current_time_rounded_to_seconds().seconds_since_unix_epoch,
                "Stale oracle data."
            )
        }
    }
}
