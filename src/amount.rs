use crate::error::{validation, PaymentError};

pub const MIN_CHARGE: f64 = 10.0;
pub const MAX_CHARGE: f64 = 500_000.0;
pub const GST_RATE: f64 = 0.18;

/// Tolerance for float noise when deciding whether a scaled fraction is an
/// exact half, and when checking declared decimal precision.
const TIE_EPSILON: f64 = 1e-6;
const PRECISION_TOLERANCE: f64 = 0.001;

/// Round-half-to-even. Exact halves (within epsilon) go to the nearest even
/// integer at the target scale; everything else rounds normally. Idempotent.
pub fn bankers_round(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let scaled = value * factor;
    let floor = scaled.floor();
    let fraction = scaled - floor;

    let rounded = if (fraction - 0.5).abs() < TIE_EPSILON {
        if (floor as i64).rem_euclid(2) == 0 {
            floor
        } else {
            floor + 1.0
        }
    } else {
        scaled.round()
    };

    rounded / factor
}

#[derive(Debug, Clone, Copy)]
pub enum Discount {
    Percentage(f64),
    Fixed(f64),
}

pub fn compute_discount(original: f64, discount: Discount) -> f64 {
    match discount {
        Discount::Percentage(pct) => bankers_round(original * pct / 100.0, 2),
        Discount::Fixed(value) => bankers_round(value, 2),
    }
}

pub fn compute_gst(final_amount: f64) -> f64 {
    bankers_round(final_amount * GST_RATE, 2)
}

pub fn validate_amount_precision(amount: f64) -> Result<(), PaymentError> {
    if !amount.is_finite() {
        return Err(validation("amount must be a finite number"));
    }
    if (amount - bankers_round(amount, 2)).abs() > PRECISION_TOLERANCE {
        return Err(validation("amount must have at most 2 decimal places"));
    }
    if amount > 0.0 && amount < 0.01 {
        return Err(validation("amount below minimum representable value"));
    }
    Ok(())
}

pub fn validate_amount_bounds(amount: f64, min: f64, max: f64) -> Result<(), PaymentError> {
    if !(min..=max).contains(&amount) {
        return Err(validation(format!(
            "amount {amount:.2} outside allowed range [{min:.2}, {max:.2}]"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AmountBreakdown {
    pub original_amount: f64,
    pub discount_amount: f64,
    pub final_amount: f64,
    pub gst_amount: f64,
    pub total_payable: f64,
}

/// Full quote for a course price with an optional discount. Validates input
/// precision and the post-discount charge bounds.
pub fn quote(original: f64, discount: Option<Discount>) -> Result<AmountBreakdown, PaymentError> {
    validate_amount_precision(original)?;

    let discount_amount = discount.map(|d| compute_discount(original, d)).unwrap_or(0.0);
    if discount_amount < 0.0 || discount_amount > original {
        return Err(validation("discount exceeds course price"));
    }

    let final_amount = bankers_round(original - discount_amount, 2);
    validate_amount_bounds(final_amount, MIN_CHARGE, MAX_CHARGE)?;
    let gst_amount = compute_gst(final_amount);

    Ok(AmountBreakdown {
        original_amount: bankers_round(original, 2),
        discount_amount,
        final_amount,
        gst_amount,
        total_payable: bankers_round(final_amount + gst_amount, 2),
    })
}

/// True when a gateway-reported amount agrees with the stored charge within
/// rounding noise.
pub fn amounts_agree(expected: f64, reported: f64) -> bool {
    (bankers_round(expected, 2) - bankers_round(reported, 2)).abs() < PRECISION_TOLERANCE
}
