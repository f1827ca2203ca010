//! # Meridian Protocol Crate
//!
//! This crate contains the core Scrypto blueprints for the Meridian protocol, a
//! decentralized borrowing protocol that allows users to mint the mUSD stablecoin by
//! locking one or more collateral kinds in a trove (a collateralized debt position).
//!
//! The primary goal is to provide a stablecoin pegged to the US Dollar, generated in
//! a decentralized manner and kept solvent by per-trove collateral ratios, a
//! redistribution-based liquidation mechanism, and a stability pool.
//!
//! ## Modules
//!
//! The crate is organized into the following modules:
//!
//! - `meridian_component`: Defines the main `Meridian` component, which manages
//!   collateral kinds, troves, mUSD minting/burning, liquidations, redemptions, the
//!   sorted-by-ratio trove index, and the borrowing-fee base rate. This is the heart
//!   of the protocol's logic.
//! - `sorted_troves`: The doubly linked, descending-by-ratio index over all active
//!   troves used for liquidation and redemption targeting.
//! - `stability_pool`: Implements the `StabilityPool` component, which manages pooled
//!   mUSD contributed by users. The pool is the first line of defense in absorbing
//!   debt during liquidations; whatever it cannot absorb is redistributed over the
//!   remaining troves.
//! - `payout_component`: Collects and distributes the protocol's fee income.
//! - `events`: Defines the various events emitted by the protocol components,
//!   allowing off-ledger services to track state changes.
//! - `shared_structs`: Contains data structures shared across multiple components,
//!   such as `Trove` and `TroveStatus`.

pub mod events;
pub mod meridian_component;
pub mod payout_component;
pub mod shared_structs;
pub mod sorted_troves;
pub mod stability_pool;
