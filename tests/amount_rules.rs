use course_payments::amount::{
    amounts_agree, bankers_round, compute_discount, compute_gst, quote, validate_amount_bounds,
    validate_amount_precision, Discount,
};
use course_payments::error::PaymentError;

#[test]
fn rounds_ties_to_even() {
    assert_eq!(bankers_round(10.125, 2), 10.12);
    assert_eq!(bankers_round(10.135, 2), 10.14);
    assert_eq!(bankers_round(2.5, 0), 2.0);
    assert_eq!(bankers_round(3.5, 0), 4.0);
}

#[test]
fn rounds_non_ties_normally() {
    assert_eq!(bankers_round(10.126, 2), 10.13);
    assert_eq!(bankers_round(10.124, 2), 10.12);
    assert_eq!(bankers_round(99.999, 2), 100.0);
}

#[test]
fn rounding_is_idempotent() {
    for value in [10.125, 10.135, 0.005, 123.456, 999.995, 17.17] {
        let once = bankers_round(value, 2);
        assert_eq!(bankers_round(once, 2), once, "value {value}");
    }
}

#[test]
fn percentage_discount_quote() {
    let breakdown = quote(1000.0, Some(Discount::Percentage(20.0))).unwrap();
    assert_eq!(breakdown.discount_amount, 200.0);
    assert_eq!(breakdown.final_amount, 800.0);
    assert_eq!(breakdown.gst_amount, 144.0);
    assert_eq!(breakdown.total_payable, 944.0);
}

#[test]
fn fixed_discount_is_rounded() {
    assert_eq!(compute_discount(1000.0, Discount::Fixed(99.999)), 100.0);
    assert_eq!(compute_discount(1000.0, Discount::Percentage(33.0)), 330.0);
}

#[test]
fn gst_is_eighteen_percent() {
    assert_eq!(compute_gst(800.0), 144.0);
    assert_eq!(compute_gst(100.0), 18.0);
}

#[test]
fn bounds_reject_out_of_range_amounts() {
    assert!(validate_amount_bounds(9.99, 10.0, 500_000.0).is_err());
    assert!(validate_amount_bounds(500_000.01, 10.0, 500_000.0).is_err());
    assert!(validate_amount_bounds(10.0, 10.0, 500_000.0).is_ok());
    assert!(validate_amount_bounds(500_000.0, 10.0, 500_000.0).is_ok());
}

#[test]
fn quote_rejects_discount_below_minimum_charge() {
    let err = quote(12.0, Some(Discount::Percentage(50.0))).unwrap_err();
    assert!(matches!(err, PaymentError::Validation(_)));
}

#[test]
fn quote_rejects_discount_exceeding_price() {
    let err = quote(100.0, Some(Discount::Fixed(150.0))).unwrap_err();
    assert!(matches!(err, PaymentError::Validation(_)));
}

#[test]
fn precision_rules() {
    assert!(validate_amount_precision(100.12).is_ok());
    assert!(validate_amount_precision(100.123).is_err());
    assert!(validate_amount_precision(f64::NAN).is_err());
    assert!(validate_amount_precision(f64::INFINITY).is_err());
    assert!(validate_amount_precision(0.005).is_err());
    assert!(validate_amount_precision(0.0).is_ok());
}

#[test]
fn drift_detection_tolerates_rounding_noise() {
    assert!(amounts_agree(944.0, 944.0));
    assert!(amounts_agree(944.0, 944.0001));
    assert!(!amounts_agree(944.0, 943.0));
}
