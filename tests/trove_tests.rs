use helper::{assert_close, Helper};
use meridian_protocol::shared_structs::*;

use scrypto_test::prelude::*;

#[test]
fn test_open_trove() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let collateral = helper.alpha.take(dec!(10), &mut helper.env)?;
    let (musd, receipt) = helper.open_trove(collateral, dec!(400))?;

    // The caller receives exactly the requested amount.
    helper.assert_bucket_eq(&musd, helper.musd_address, dec!(400))?;

    // Composite debt is requested + 0.5% fee + the 10 mUSD liquidation reserve.
    let trove_id = helper.trove_id(&receipt)?;
    let (_, trove, icr) = helper.get_trove_info(trove_id)?;
    assert_eq!(trove.debt, dec!(412));
    assert_eq!(trove.status, TroveStatus::Active);
    assert_eq!(
        *trove.collaterals.get(&helper.alpha_address).unwrap(),
        dec!(10)
    );
    // 10 alpha at $100, risk ratio 1.
    assert_eq!(icr, dec!(1000) / dec!(412));

    // A fresh trove's stake equals its raw collateral amount.
    assert_eq!(*trove.stakes.get(&helper.alpha_address).unwrap(), dec!(10));

    // Debt conservation: every minted mUSD is owed by a trove.
    assert_eq!(
        helper.meridian.get_total_debt(&mut helper.env)?,
        helper.meridian.get_circulating_musd(&mut helper.env)?
    );

    let sorted = helper.meridian.get_sorted_troves(10, &mut helper.env)?;
    assert_eq!(sorted.len(), 1);

    Ok(())
}

#[test]
fn test_open_below_minimum_debt_fails() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let collateral = helper.alpha.take(dec!(10), &mut helper.env)?;
    let result = helper.open_trove(collateral, dec!(100));
    assert!(result.is_err());

    Ok(())
}

#[test]
fn test_open_undercollateralized_fails() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    // 10 alpha is worth $1000; 900 mUSD plus fee and reserve breaks the MCR.
    let collateral = helper.alpha.take(dec!(10), &mut helper.env)?;
    let result = helper.open_trove(collateral, dec!(900));
    assert!(result.is_err());

    Ok(())
}

#[test]
fn test_open_excessive_fee_rejected() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    // The fee floor is 0.5%, so a 0.1% maximum must be rejected.
    let collateral = helper.alpha.take(dec!(10), &mut helper.env)?;
    let result = helper.meridian.open_trove(
        vec![collateral],
        dec!(400),
        dec!("0.001"),
        None,
        None,
        &mut helper.env,
    );
    assert!(result.is_err());

    Ok(())
}

#[test]
fn test_open_multi_collateral() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    // 10 alpha at $100 (risk 1) + 100 beta at $10 (risk 0.5) = $1500 of value.
    let alpha = helper.alpha.take(dec!(10), &mut helper.env)?;
    let beta = helper.beta.take(dec!(100), &mut helper.env)?;
    let (_, receipt) = helper.open_trove_multi(vec![alpha, beta], dec!(400))?;

    let trove_id = helper.trove_id(&receipt)?;
    let (_, trove, icr) = helper.get_trove_info(trove_id)?;
    assert_eq!(trove.collaterals.len(), 2);
    assert_eq!(icr, dec!(1500) / dec!(412));

    Ok(())
}

#[test]
fn test_top_up_increases_icr_proportionally() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();
    helper.set_price(helper.alpha_address, dec!(200))?;

    // 2 alpha at $200 against 261.25 mUSD of composite debt.
    let collateral = helper.alpha.take(dec!(2), &mut helper.env)?;
    let (_, receipt) = helper.open_trove(collateral, dec!(250))?;
    let trove_id = helper.trove_id(&receipt)?;
    let (_, _, old_icr) = helper.get_trove_info(trove_id.clone())?;

    let top_up = helper.alpha.take(dec!(1), &mut helper.env)?;
    let proof = helper.proof(&receipt)?;
    helper
        .meridian
        .top_up_trove(proof, vec![top_up], None, None, &mut helper.env)?;

    // Collateral value grew 1.5x with unchanged debt.
    let (_, _, new_icr) = helper.get_trove_info(trove_id.clone())?;
    assert_close(new_icr, old_icr * dec!("1.5"));

    // Still the only trove, so it leads the sorted list.
    let sorted = helper.meridian.get_sorted_troves(10, &mut helper.env)?;
    assert_eq!(sorted[0].0, trove_id);

    Ok(())
}

#[test]
fn test_remove_collateral_rejected_below_mcr() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    // A whale keeps the system TCR far above the critical threshold, so the
    // rejection below comes from the trove's own ratio check.
    let whale = helper.alpha.take(dec!(100), &mut helper.env)?;
    helper.open_trove(whale, dec!(400))?;
    helper.settle_fees();

    let collateral = helper.alpha.take(dec!(10), &mut helper.env)?;
    let (_, receipt) = helper.open_trove(collateral, dec!(780))?;
    let trove_id = helper.trove_id(&receipt)?;

    // Composite debt is 780 * 1.005 + 10 = 793.9. Withdrawing 1.35 alpha would
    // leave $865.1 of value: a ratio of ~109% against a 110% MCR.
    let proof = helper.proof(&receipt)?;
    let result = helper.meridian.remove_collateral(
        proof,
        vec![(helper.alpha_address, dec!("1.35"))],
        None,
        None,
        &mut helper.env,
    );
    assert!(result.is_err());

    // No state change: the trove still holds its full collateral.
    let (_, trove, _) = helper.get_trove_info(trove_id)?;
    assert_eq!(
        *trove.collaterals.get(&helper.alpha_address).unwrap(),
        dec!(10)
    );

    Ok(())
}

#[test]
fn test_remove_collateral() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let whale = helper.alpha.take(dec!(100), &mut helper.env)?;
    helper.open_trove(whale, dec!(400))?;
    helper.settle_fees();

    let collateral = helper.alpha.take(dec!(10), &mut helper.env)?;
    let (_, receipt) = helper.open_trove(collateral, dec!(500))?;
    let trove_id = helper.trove_id(&receipt)?;

    let proof = helper.proof(&receipt)?;
    let withdrawn = helper.meridian.remove_collateral(
        proof,
        vec![(helper.alpha_address, dec!(2))],
        None,
        None,
        &mut helper.env,
    )?;

    helper.assert_bucket_eq(&withdrawn[0], helper.alpha_address, dec!(2))?;
    let (_, trove, icr) = helper.get_trove_info(trove_id)?;
    assert_eq!(
        *trove.collaterals.get(&helper.alpha_address).unwrap(),
        dec!(8)
    );
    assert!(icr >= dec!("1.1"));

    Ok(())
}

#[test]
fn test_borrow_and_repay() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let whale = helper.alpha.take(dec!(100), &mut helper.env)?;
    helper.open_trove(whale, dec!(400))?;
    helper.settle_fees();

    let collateral = helper.alpha.take(dec!(10), &mut helper.env)?;
    let (musd, receipt) = helper.open_trove(collateral, dec!(400))?;
    let trove_id = helper.trove_id(&receipt)?;
    helper.settle_fees();

    let proof = helper.proof(&receipt)?;
    let borrowed = helper
        .meridian
        .borrow_more(proof, dec!(100), Decimal::ONE, None, None, &mut helper.env)?;
    helper.assert_bucket_eq(&borrowed, helper.musd_address, dec!(100))?;

    // 412 + 100 + the 0.5% fee on the increase.
    let (_, trove, _) = helper.get_trove_info(trove_id.clone())?;
    assert_eq!(trove.debt, dec!("512.5"));

    let repayment = musd.take(dec!(100), &mut helper.env)?;
    let proof = helper.proof(&receipt)?;
    helper
        .meridian
        .repay(proof, repayment, None, None, &mut helper.env)?;

    let (_, trove, _) = helper.get_trove_info(trove_id)?;
    assert_eq!(trove.debt, dec!("412.5"));

    assert_eq!(
        helper.meridian.get_total_debt(&mut helper.env)?,
        helper.meridian.get_circulating_musd(&mut helper.env)?
    );

    Ok(())
}

#[test]
fn test_repay_below_minimum_fails() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let whale = helper.alpha.take(dec!(100), &mut helper.env)?;
    helper.open_trove(whale, dec!(400))?;
    helper.settle_fees();

    let collateral = helper.alpha.take(dec!(10), &mut helper.env)?;
    let (musd, receipt) = helper.open_trove(collateral, dec!(400))?;

    // Net debt is 402; repaying 300 would leave 102, under the 200 floor.
    let repayment = musd.take(dec!(300), &mut helper.env)?;
    let proof = helper.proof(&receipt)?;
    let result = helper
        .meridian
        .repay(proof, repayment, None, None, &mut helper.env);
    assert!(result.is_err());

    Ok(())
}

#[test]
fn test_close_trove() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let whale = helper.alpha.take(dec!(100), &mut helper.env)?;
    helper.open_trove(whale, dec!(400))?;
    helper.settle_fees();

    let collateral = helper.alpha.take(dec!(10), &mut helper.env)?;
    let (musd, receipt) = helper.open_trove(collateral, dec!(400))?;
    let trove_id = helper.trove_id(&receipt)?;

    // The borrower holds 400 mUSD but owes 402 net (the fee), so top up the
    // payment with protocol-minted test funds.
    let payment = musd;
    payment.put(helper.free_musd(dec!(10))?, &mut helper.env)?;

    let proof = helper.proof(&receipt)?;
    let (collateral_buckets, leftover) =
        helper
            .meridian
            .close_trove(proof, payment, &mut helper.env)?;

    helper.assert_bucket_eq(&collateral_buckets[0], helper.alpha_address, dec!(10))?;
    // 410 supplied, 402 burned.
    helper.assert_bucket_eq(&leftover, helper.musd_address, dec!(8))?;

    let (_, trove, _) = helper.get_trove_info(trove_id)?;
    assert_eq!(trove.status, TroveStatus::ClosedByOwner);
    assert_eq!(trove.debt, Decimal::ZERO);
    assert!(trove.collaterals.is_empty());
    assert!(trove.stakes.is_empty());

    let sorted = helper.meridian.get_sorted_troves(10, &mut helper.env)?;
    assert_eq!(sorted.len(), 1);

    Ok(())
}

#[test]
fn test_cannot_close_last_trove() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let collateral = helper.alpha.take(dec!(10), &mut helper.env)?;
    let (musd, receipt) = helper.open_trove(collateral, dec!(400))?;

    let payment = musd;
    payment.put(helper.free_musd(dec!(10))?, &mut helper.env)?;

    let proof = helper.proof(&receipt)?;
    let result = helper.meridian.close_trove(proof, payment, &mut helper.env);
    assert!(result.is_err());

    Ok(())
}

#[test]
fn test_no_op_adjustment_rejected() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let collateral = helper.alpha.take(dec!(10), &mut helper.env)?;
    let (_, receipt) = helper.open_trove(collateral, dec!(400))?;

    let proof = helper.proof(&receipt)?;
    let result = helper.meridian.adjust_trove(
        proof,
        vec![],
        vec![],
        Decimal::ZERO,
        None,
        Decimal::ONE,
        None,
        None,
        &mut helper.env,
    );
    assert!(result.is_err());

    Ok(())
}

#[test]
fn test_ambiguous_adjustment_rejected() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let collateral = helper.alpha.take(dec!(10), &mut helper.env)?;
    let (_, receipt) = helper.open_trove(collateral, dec!(400))?;

    // Topping up and withdrawing the same kind in one adjustment is ambiguous.
    let top_up = helper.alpha.take(dec!(1), &mut helper.env)?;
    let proof = helper.proof(&receipt)?;
    let result = helper.meridian.adjust_trove(
        proof,
        vec![top_up],
        vec![(helper.alpha_address, dec!(1))],
        Decimal::ZERO,
        None,
        Decimal::ONE,
        None,
        None,
        &mut helper.env,
    );
    assert!(result.is_err());

    Ok(())
}

#[test]
fn test_adjust_combined() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let whale = helper.alpha.take(dec!(100), &mut helper.env)?;
    helper.open_trove(whale, dec!(400))?;
    helper.settle_fees();

    let collateral = helper.alpha.take(dec!(10), &mut helper.env)?;
    let (_, receipt) = helper.open_trove(collateral, dec!(400))?;
    let trove_id = helper.trove_id(&receipt)?;
    helper.settle_fees();

    let top_up = helper.alpha.take(dec!(5), &mut helper.env)?;
    let proof = helper.proof(&receipt)?;
    let (withdrawn, borrowed) = helper.meridian.adjust_trove(
        proof,
        vec![top_up],
        vec![],
        dec!(50),
        None,
        Decimal::ONE,
        None,
        None,
        &mut helper.env,
    )?;

    assert!(withdrawn.is_empty());
    helper.assert_bucket_eq(&borrowed.unwrap(), helper.musd_address, dec!(50))?;

    let (_, trove, _) = helper.get_trove_info(trove_id)?;
    assert_eq!(
        *trove.collaterals.get(&helper.alpha_address).unwrap(),
        dec!(15)
    );
    assert_eq!(trove.debt, dec!("462.25"));

    Ok(())
}

#[test]
fn test_sorted_list_order() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let coll_a = helper.alpha.take(dec!(20), &mut helper.env)?;
    let (_, receipt_a) = helper.open_trove(coll_a, dec!(400))?;
    let id_a = helper.trove_id(&receipt_a)?;

    let coll_b = helper.alpha.take(dec!(10), &mut helper.env)?;
    let (_, receipt_b) = helper.open_trove(coll_b, dec!(400))?;
    let id_b = helper.trove_id(&receipt_b)?;

    let coll_c = helper.alpha.take(dec!(30), &mut helper.env)?;
    let (_, receipt_c) = helper.open_trove(coll_c, dec!(400))?;
    let id_c = helper.trove_id(&receipt_c)?;

    let sorted = helper.meridian.get_sorted_troves(10, &mut helper.env)?;
    let ids: Vec<NonFungibleLocalId> = sorted.iter().map(|(id, _)| id.clone()).collect();
    assert_eq!(ids, vec![id_c, id_a, id_b]);

    // Head to tail must never increase.
    for pair in sorted.windows(2) {
        assert!(pair[0].1 >= pair[1].1);
    }

    Ok(())
}

#[test]
fn test_sorted_list_tolerates_stale_hints() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let coll_a = helper.alpha.take(dec!(20), &mut helper.env)?;
    let (_, receipt_a) = helper.open_trove(coll_a, dec!(400))?;
    let id_a = helper.trove_id(&receipt_a)?;

    let coll_b = helper.alpha.take(dec!(10), &mut helper.env)?;
    let (_, receipt_b) = helper.open_trove(coll_b, dec!(400))?;
    let id_b = helper.trove_id(&receipt_b)?;

    let coll_c = helper.alpha.take(dec!(30), &mut helper.env)?;
    let (_, receipt_c) = helper.open_trove(coll_c, dec!(400))?;
    let id_c = helper.trove_id(&receipt_c)?;

    // 15 alpha belongs between A (20) and B (10); the hints deliberately point
    // at the wrong slot and must only cost a scan, never correctness.
    let coll_d = helper.alpha.take(dec!(15), &mut helper.env)?;
    let (_, receipt_d) = helper.meridian.open_trove(
        vec![coll_d],
        dec!(400),
        Decimal::ONE,
        Some(id_b.clone()),
        Some(id_c.clone()),
        &mut helper.env,
    )?;
    let id_d = helper.trove_id(&receipt_d)?;

    let sorted = helper.meridian.get_sorted_troves(10, &mut helper.env)?;
    let ids: Vec<NonFungibleLocalId> = sorted.iter().map(|(id, _)| id.clone()).collect();
    assert_eq!(ids, vec![id_c, id_a, id_d, id_b]);

    Ok(())
}

#[test]
fn test_recovery_mode_rules() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let collateral = helper.alpha.take(dec!(100), &mut helper.env)?;
    let (_, receipt) = helper.open_trove(collateral, dec!(4000))?;
    let trove_id = helper.trove_id(&receipt)?;

    // $5500 of collateral against 4030 of debt: TCR ~1.365, under the 1.5 CCR.
    helper.set_price(helper.alpha_address, dec!(55))?;
    assert!(helper.meridian.is_recovery_mode(&mut helper.env)?);

    // Collateral withdrawal is forbidden outright.
    let proof = helper.proof(&receipt)?;
    let result = helper.meridian.remove_collateral(
        proof,
        vec![(helper.alpha_address, dec!(1))],
        None,
        None,
        &mut helper.env,
    );
    assert!(result.is_err());

    // A plain debt increase reduces the trove's ratio and must fail, no matter
    // how well-collateralized the trove still is.
    let proof = helper.proof(&receipt)?;
    let result = helper
        .meridian
        .borrow_more(proof, dec!(100), Decimal::ONE, None, None, &mut helper.env);
    assert!(result.is_err());

    // A debt increase combined with enough collateral to raise the ratio above
    // the CCR passes, and pays no fee while the system is in recovery mode.
    let top_up = helper.alpha.take(dec!(40), &mut helper.env)?;
    let proof = helper.proof(&receipt)?;
    let (_, borrowed) = helper.meridian.adjust_trove(
        proof,
        vec![top_up],
        vec![],
        dec!(100),
        None,
        Decimal::ONE,
        None,
        None,
        &mut helper.env,
    )?;
    helper.assert_bucket_eq(&borrowed.unwrap(), helper.musd_address, dec!(100))?;

    let (_, trove, _) = helper.get_trove_info(trove_id)?;
    // 4030 + 100, with no fee added.
    assert_eq!(trove.debt, dec!(4130));

    // Opening in recovery mode requires the new trove to clear the CCR, and is
    // also fee-free.
    let collateral = helper.alpha.take(dec!(10), &mut helper.env)?;
    let (_, new_receipt) = helper.open_trove(collateral, dec!(250))?;
    let new_id = helper.trove_id(&new_receipt)?;
    let (_, new_trove, _) = helper.get_trove_info(new_id)?;
    assert_eq!(new_trove.debt, dec!(260));

    Ok(())
}

#[test]
fn test_fee_decay() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let collateral = helper.alpha.take(dec!(100), &mut helper.env)?;
    helper.open_trove(collateral, dec!(400))?;

    // The issuance pushed the base rate to its ceiling; the chargeable rate is
    // capped at the 5% maximum.
    assert_eq!(
        helper.meridian.get_borrowing_rate(&mut helper.env)?,
        dec!("0.05")
    );

    // Lift the cap so the decay itself becomes observable.
    let mut parameters = default_parameters();
    parameters.max_borrowing_fee = Decimal::ONE;
    helper.env.disable_auth_module();
    helper
        .meridian
        .set_parameters(parameters, &mut helper.env)?;
    helper.env.enable_auth_module();

    let rate_start = helper.meridian.get_borrowing_rate(&mut helper.env)?;
    assert_eq!(rate_start, Decimal::ONE);

    // Sub-minute elapses decay nothing.
    helper.advance_time(30);
    assert_eq!(
        helper.meridian.get_borrowing_rate(&mut helper.env)?,
        rate_start
    );

    // Two full minutes apply the per-minute factor twice.
    helper.advance_time(90);
    let factor = dec!("0.999037758833783");
    assert_eq!(
        helper.meridian.get_borrowing_rate(&mut helper.env)?,
        factor * factor
    );

    // After two weeks the rate has decayed to the floor.
    helper.settle_fees();
    assert_eq!(
        helper.meridian.get_borrowing_rate(&mut helper.env)?,
        dec!("0.005")
    );

    Ok(())
}

#[test]
fn test_consecutive_issuances_pay_at_least_the_floor() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let whale = helper.alpha.take(dec!(100), &mut helper.env)?;
    helper.open_trove(whale, dec!(400))?;
    helper.settle_fees();

    // First issuance at the decayed floor: fee is 0.5% of 400.
    let collateral = helper.alpha.take(dec!(10), &mut helper.env)?;
    let (_, receipt) = helper.open_trove(collateral, dec!(400))?;
    let trove_id = helper.trove_id(&receipt)?;
    let (_, trove, _) = helper.get_trove_info(trove_id.clone())?;
    let first_fee = trove.debt - dec!(400) - dec!(10);
    assert_eq!(first_fee, dec!(2));

    // Immediate second issuance: the bump from the first one raised the rate,
    // but the fee never drops below the floor either way.
    let proof = helper.proof(&receipt)?;
    helper
        .meridian
        .borrow_more(proof, dec!(100), Decimal::ONE, None, None, &mut helper.env)?;
    let (_, trove_after, _) = helper.get_trove_info(trove_id)?;
    let second_fee = trove_after.debt - trove.debt - dec!(100);
    assert!(second_fee >= dec!(100) * dec!("0.005"));

    Ok(())
}

#[test]
fn test_fees_flow_to_payout_component() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let collateral = helper.alpha.take(dec!(10), &mut helper.env)?;
    helper.open_trove(collateral, dec!(400))?;

    helper
        .payout_component
        .fetch_rewards_from_core(&mut helper.env)?;

    helper.env.disable_auth_module();
    let rewards = helper
        .payout_component
        .take_payout_component_rewards(&mut helper.env)?;
    helper.env.enable_auth_module();

    // The 0.5% fee on 400 mUSD.
    helper.assert_bucket_eq(&rewards, helper.musd_address, dec!(2))?;

    Ok(())
}

#[test]
fn test_update_price_from_oracle() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    helper.env.disable_auth_module();
    helper
        .dummy_oracle
        .set_price("COLL_A".to_string(), dec!(120), &mut helper.env)?;
    helper.env.enable_auth_module();

    helper.meridian.update_price(
        helper.alpha_address,
        "".to_string(),
        "".to_string(),
        &mut helper.env,
    )?;

    let infos = helper
        .meridian
        .get_collateral_infos(Some(vec![helper.alpha_address]), &mut helper.env)?;
    assert_eq!(infos[0].usd_price, dec!(120));

    Ok(())
}

fn default_parameters() -> meridian_protocol::meridian_component::ProtocolParameters {
    meridian_protocol::meridian_component::ProtocolParameters {
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
    }
}
