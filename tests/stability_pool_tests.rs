use helper::{assert_close, Helper};

use scrypto_test::prelude::*;

#[test]
fn test_deposit_and_withdraw_without_liquidation() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let musd = helper.free_musd(dec!(500))?;
    let receipt = helper.stability_pool.deposit(musd, &mut helper.env)?;

    let (pool_musd, pool_p, pool_epoch) =
        helper.stability_pool.get_pool_info(&mut helper.env)?;
    assert_eq!(pool_musd, dec!(500));
    assert_eq!(pool_p, Decimal::ONE);
    assert_eq!(pool_epoch, 0);

    let (musd_back, collateral_back) =
        helper.stability_pool.withdraw(receipt, &mut helper.env)?;
    helper.assert_bucket_eq(&musd_back, helper.musd_address, dec!(500))?;
    assert!(collateral_back.is_empty());

    Ok(())
}

#[test]
fn test_empty_deposit_rejected() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let musd = helper.free_musd(dec!(1))?;
    let empty = musd.take(Decimal::ZERO, &mut helper.env)?;
    let result = helper.stability_pool.deposit(empty, &mut helper.env);
    assert!(result.is_err());

    Ok(())
}

#[test]
fn test_two_depositors_split_gains_pro_rata() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let whale_collateral = helper.alpha.take(dec!(100), &mut helper.env)?;
    let (whale_musd, _) = helper.open_trove(whale_collateral, dec!(1970))?;
    helper.settle_fees();

    let risky_collateral = helper.alpha.take(dec!(10), &mut helper.env)?;
    let (_, risky_receipt) = helper.open_trove(risky_collateral, dec!(600))?;
    let risky_id = helper.trove_id(&risky_receipt)?;

    // Two deposits at a 2:1 ratio.
    let first = whale_musd.take(dec!(600), &mut helper.env)?;
    let first_receipt = helper.stability_pool.deposit(first, &mut helper.env)?;
    let second = whale_musd.take(dec!(300), &mut helper.env)?;
    let second_receipt = helper.stability_pool.deposit(second, &mut helper.env)?;

    helper.set_price(helper.alpha_address, dec!(65))?;
    helper.stability_pool.liquidate(risky_id, &mut helper.env)?;

    // 613 of debt was burned from 900 of deposits, 9.95 alpha flowed in.
    let remaining = dec!(900) - dec!(613);
    let (pool_musd, _, _) = helper.stability_pool.get_pool_info(&mut helper.env)?;
    assert_eq!(pool_musd, remaining);

    let (first_musd, first_gains) = helper
        .stability_pool
        .withdraw(first_receipt, &mut helper.env)?;
    assert_close(
        first_musd.amount(&mut helper.env)?,
        dec!(600) * remaining / dec!(900),
    );
    assert_close(
        first_gains[0].amount(&mut helper.env)?,
        dec!("9.95") * dec!(600) / dec!(900),
    );

    let (second_musd, second_gains) = helper
        .stability_pool
        .withdraw(second_receipt, &mut helper.env)?;
    assert_close(
        second_musd.amount(&mut helper.env)?,
        dec!(300) * remaining / dec!(900),
    );
    assert_close(
        second_gains[0].amount(&mut helper.env)?,
        dec!("9.95") * dec!(300) / dec!(900),
    );

    Ok(())
}

#[test]
fn test_new_epoch_after_full_depletion() -> Result<(), RuntimeError> {
    let mut helper = Helper::new().unwrap();

    let whale_collateral = helper.alpha.take(dec!(100), &mut helper.env)?;
    let (whale_musd, _) = helper.open_trove(whale_collateral, dec!(1970))?;
    helper.settle_fees();

    let risky_collateral = helper.alpha.take(dec!(10), &mut helper.env)?;
    let (_, risky_receipt) = helper.open_trove(risky_collateral, dec!(600))?;
    let risky_id = helper.trove_id(&risky_receipt)?;

    // The deposit covers less than the 613 debt, so the offset consumes the
    // whole pool and the epoch rolls over.
    let deposit = whale_musd.take(dec!(300), &mut helper.env)?;
    let old_receipt = helper.stability_pool.deposit(deposit, &mut helper.env)?;

    helper.set_price(helper.alpha_address, dec!(65))?;
    helper.stability_pool.liquidate(risky_id, &mut helper.env)?;

    let (pool_musd, pool_p, pool_epoch) =
        helper.stability_pool.get_pool_info(&mut helper.env)?;
    assert_eq!(pool_musd, Decimal::ZERO);
    assert_eq!(pool_p, Decimal::ONE);
    assert_eq!(pool_epoch, 1);

    // A deposit in the new epoch is untouched by the old epoch's history.
    let fresh = whale_musd.take(dec!(100), &mut helper.env)?;
    let fresh_receipt = helper.stability_pool.deposit(fresh, &mut helper.env)?;
    let (fresh_musd, fresh_gains) = helper
        .stability_pool
        .withdraw(fresh_receipt, &mut helper.env)?;
    helper.assert_bucket_eq(&fresh_musd, helper.musd_address, dec!(100))?;
    assert!(fresh_gains.is_empty());

    // The depleted deposit keeps only its collateral gain.
    let (old_musd, old_gains) = helper
        .stability_pool
        .withdraw(old_receipt, &mut helper.env)?;
    assert_eq!(old_musd.amount(&mut helper.env)?, Decimal::ZERO);
    assert_close(
        old_gains[0].amount(&mut helper.env)?,
        dec!("9.95") * dec!(300) / dec!(613),
    );

    Ok(())
}
