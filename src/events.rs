//! Defines events emitted by the Meridian protocol components.

use crate::shared_structs::*;
use scrypto::prelude::*;

/// Event emitted when a new collateral kind is added to the protocol.
#[derive(ScryptoSbor, ScryptoEvent, Clone)]
pub struct EventAddCollateral {
    /// The `ResourceAddress` of the newly accepted collateral token.
    pub address: ResourceAddress,
    /// The risk ratio (value discount factor) set for this collateral kind.
    pub risk_ratio: Decimal,
    /// The initial USD price set for this collateral kind.
    pub usd_price: Decimal,
}

/// Event emitted when parameters of an existing collateral kind are changed.
#[derive(ScryptoSbor, ScryptoEvent, Clone)]
pub struct EventChangeCollateral {
    /// The `ResourceAddress` of the collateral kind being modified.
    pub address: ResourceAddress,
    /// The new risk ratio, if changed.
    pub new_risk_ratio: Option<Decimal>,
    /// The new USD price, if changed.
    pub new_usd_price: Option<Decimal>,
}

/// Event emitted when a new trove is opened.
#[derive(ScryptoSbor, ScryptoEvent, Clone)]
pub struct EventNewTrove {
    /// The data associated with the newly created trove.
    pub trove: Trove,
    /// The unique `NonFungibleLocalId` identifying the new trove receipt.
    pub trove_id: NonFungibleLocalId,
}

/// Event emitted when an existing trove is updated: collateral added or
/// removed, debt minted or repaid, or pending rewards applied.
#[derive(ScryptoSbor, ScryptoEvent, Clone)]
pub struct EventUpdateTrove {
    /// The updated data of the trove.
    pub trove: Trove,
    /// The `NonFungibleLocalId` identifying the updated trove receipt.
    pub trove_id: NonFungibleLocalId,
}

/// Event emitted when a trove is closed by its owner (fully repaid).
#[derive(ScryptoSbor, ScryptoEvent, Clone)]
pub struct EventCloseTrove {
    /// The `NonFungibleLocalId` identifying the closed trove receipt.
    pub trove_id: NonFungibleLocalId,
}

/// Event emitted when a trove is liquidated.
#[derive(ScryptoSbor, ScryptoEvent, Clone)]
pub struct EventLiquidateTrove {
    /// The `NonFungibleLocalId` identifying the liquidated trove receipt.
    pub trove_id: NonFungibleLocalId,
    /// The part of the debt absorbed by the stability pool payment.
    pub debt_offset: Decimal,
    /// The part of the debt redistributed over the remaining troves.
    pub debt_redistributed: Decimal,
}

/// Event emitted when a trove is redeemed against.
#[derive(ScryptoSbor, ScryptoEvent, Clone)]
pub struct EventRedeemTrove {
    /// The updated data of the trove.
    pub trove: Trove,
    /// The `NonFungibleLocalId` identifying the redeemed trove receipt.
    pub trove_id: NonFungibleLocalId,
    /// The amount of mUSD debt cancelled against this trove.
    pub musd_redeemed: Decimal,
    /// Fully redeemed or not.
    pub fully_redeemed: bool,
}

/// Event emitted when a debt-issuing operation moves the borrowing base rate.
#[derive(ScryptoSbor, ScryptoEvent, Clone)]
pub struct EventBaseRateUpdate {
    /// The base rate after decay and the issuance bump.
    pub base_rate: Decimal,
    /// The fee charged on the issuance that triggered the update.
    pub fee: Decimal,
}

/// Event emitted when a user deposits into the stability pool.
#[derive(ScryptoSbor, ScryptoEvent, Clone)]
pub struct StabilityPoolDepositEvent {
    /// The amount of mUSD deposited.
    pub amount: Decimal,
    /// The `NonFungibleLocalId` of the deposit receipt.
    pub deposit_id: NonFungibleLocalId,
}

/// Event emitted when a user withdraws from the stability pool.
#[derive(ScryptoSbor, ScryptoEvent, Clone)]
pub struct StabilityPoolWithdrawalEvent {
    /// The compounded mUSD paid out.
    pub musd_withdrawn: Decimal,
    /// The collateral gains paid out, per kind.
    pub collateral_gains: IndexMap<ResourceAddress, Decimal>,
}

/// Event emitted when the stability pool absorbs liquidated debt.
#[derive(ScryptoSbor, ScryptoEvent, Clone)]
pub struct StabilityPoolOffsetEvent {
    /// The liquidated trove.
    pub trove_id: NonFungibleLocalId,
    /// The amount of mUSD debt burned from the pool.
    pub debt_offset: Decimal,
}

/// Event emitted when rewards are claimed from the payout component.
#[derive(ScryptoSbor, ScryptoEvent)]
pub struct PayoutClaimEvent {
    pub amount: Decimal,
}

/// Event emitted when the payout component fetches accumulated fees from the core.
#[derive(ScryptoSbor, ScryptoEvent)]
pub struct PayoutFetchRewardsEvent {
    pub amount: Decimal,
}

/// Event emitted when the required payment amount for claiming rewards is updated.
#[derive(ScryptoSbor, ScryptoEvent)]
pub struct PayoutRequirementUpdateEvent {
    pub new_requirement: Decimal,
    pub burn: bool,
}
