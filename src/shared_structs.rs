//! # Meridian shared structs
//! Structs used by more than one blueprint of the Meridian protocol.

use scrypto::prelude::*;

/// Data struct of a trove receipt, gained when opening a trove. The receipt NFT
/// is the owner key of the position: whoever can present it controls the trove.
#[derive(ScryptoSbor, NonFungibleData, Clone, Debug)]
pub struct Trove {
    /// Image of the NFT
    #[mutable]
    pub key_image_url: Url,
    /// Recorded collateral per accepted collateral kind. Raw token amounts,
    /// pre-valuation. Zero entries are pruned.
    #[mutable]
    pub collaterals: IndexMap<ResourceAddress, Decimal>,
    /// Composite mUSD debt: requested amount + borrowing fee + liquidation reserve.
    #[mutable]
    pub debt: Decimal,
    /// Redistribution weight per collateral kind. Diverges from the raw amount
    /// once any liquidation has been redistributed, via the global snapshot ratio.
    #[mutable]
    pub stakes: IndexMap<ResourceAddress, Decimal>,
    /// Per-kind accumulator values captured at the last reward sync. The gap
    /// between these and the live accumulators is the trove's unapplied reward.
    #[mutable]
    pub reward_snapshots: IndexMap<ResourceAddress, RewardSnapshot>,
    /// The current status of the trove.
    #[mutable]
    pub status: TroveStatus,
}

/// A trove's view of the global redistribution accumulators for one collateral
/// kind, captured at its last sync.
#[derive(ScryptoSbor, Clone, Debug, PartialEq)]
pub struct RewardSnapshot {
    pub collateral_per_stake: Decimal,
    pub debt_per_stake: Decimal,
}

impl RewardSnapshot {
    pub fn zero() -> Self {
        Self {
            collateral_per_stake: Decimal::ZERO,
            debt_per_stake: Decimal::ZERO,
        }
    }
}

/// Represents the possible states of a trove.
#[derive(ScryptoSbor, PartialEq, Clone, Debug)]
pub enum TroveStatus {
    /// The trove is open and meets its collateralization requirements.
    Active,
    /// The trove has been fully repaid and closed by the borrower.
    ClosedByOwner,
    /// The trove has been closed by a liquidation. Surplus collateral, if any,
    /// stays claimable through the receipt.
    ClosedByLiquidation,
    /// The trove has been fully redeemed against. Leftover collateral stays
    /// claimable through the receipt.
    ClosedByRedemption,
}

/// A summarized view of a collateral kind's state within the protocol,
/// returned by getter methods.
#[derive(ScryptoSbor, Clone)]
pub struct CollateralInfoReturn {
    /// The resource address of the collateral token.
    pub resource_address: ResourceAddress,
    /// The current USD price according to the oracle.
    pub usd_price: Decimal,
    /// The discount factor applied to raw market value when valuing this kind.
    pub risk_ratio: Decimal,
    /// Whether this kind is currently accepted for new collateral.
    pub accepted: bool,
    /// Collateral backing active troves (recorded plus redistributed-but-unapplied).
    pub total_collateral: Decimal,
    /// The amount held in the main vault.
    pub vault: Decimal,
    /// The amount held in the surplus vault (from liquidations/redemptions).
    pub leftovers: Decimal,
    /// Accumulated redistributed collateral per unit staked.
    pub collateral_per_stake: Decimal,
    /// Accumulated redistributed debt per unit staked.
    pub debt_per_stake: Decimal,
    /// Sum of all active stakes for this kind.
    pub total_stakes: Decimal,
    /// Stake total captured at the last liquidation.
    pub total_stakes_snapshot: Decimal,
    /// Collateral total captured at the last liquidation.
    pub total_collateral_snapshot: Decimal,
}

/// A trove's unapplied redistribution rewards, as returned by getters.
#[derive(ScryptoSbor, Clone)]
pub struct PendingRewards {
    /// Pending collateral per kind.
    pub collaterals: IndexMap<ResourceAddress, Decimal>,
    /// Pending debt.
    pub debt: Decimal,
}
