// libs/billing-cell/src/services/calculator.rs
//
// Integer minor-unit arithmetic for invoices. Every operation is checked; an
// overflow is reported as a validation error rather than wrapping.

use serde_json::Number;
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::{BillingInput, BillingParams, InvoiceLineItem, LineItemInput};

const MINUTES_PER_HOUR: i64 = 60;

fn overflow() -> BillingError {
    BillingError::validation("Invoice total exceeds the supported range")
}

/// `dailyRate*daysBilled + ceil(hourlyRate*minutesBilled/60) + flatRate + line items`,
/// plus the processing fee when the caller asks for it.
pub fn compute_total(
    params: &BillingParams,
    line_items: &[InvoiceLineItem],
    include_processing_fee: bool,
) -> Result<i64, BillingError> {
    let daily = params.daily_rate.checked_mul(params.days_billed).ok_or_else(overflow)?;
    let hourly = hourly_component(params.hourly_rate, params.minutes_billed)?;
    let items = line_items_total(line_items)?;

    let mut total = daily
        .checked_add(hourly)
        .and_then(|sum| sum.checked_add(params.flat_rate))
        .and_then(|sum| sum.checked_add(items))
        .ok_or_else(overflow)?;

    if include_processing_fee {
        total = total.checked_add(params.processing_fee).ok_or_else(overflow)?;
    }

    Ok(total)
}

/// Ceiling division so a partial minute is never under-charged.
pub fn hourly_component(hourly_rate: i64, minutes_billed: i64) -> Result<i64, BillingError> {
    let product = hourly_rate.checked_mul(minutes_billed).ok_or_else(overflow)?;
    let quotient = product / MINUTES_PER_HOUR;
    if product % MINUTES_PER_HOUR > 0 {
        Ok(quotient + 1)
    } else {
        Ok(quotient)
    }
}

pub fn line_items_total(line_items: &[InvoiceLineItem]) -> Result<i64, BillingError> {
    line_items.iter().try_fold(0i64, |total, item| {
        item.amount_in_minor_units
            .checked_mul(item.quantity)
            .and_then(|line| total.checked_add(line))
            .ok_or_else(overflow)
    })
}

// ==============================================================================
// INPUT VALIDATION
// ==============================================================================

/// Reads a JSON number as whole minor units. `12.0` is accepted; `12.5` is not.
pub fn minor_units(field: &str, value: &Number) -> Result<i64, BillingError> {
    if let Some(whole) = value.as_i64() {
        return Ok(whole);
    }

    let out_of_range = || BillingError::validation(format!("{} is out of range", field));
    if value.is_u64() {
        return Err(out_of_range());
    }

    match value.as_f64() {
        Some(amount) if amount.fract() != 0.0 => Err(BillingError::validation(format!(
            "{} must be a whole number of minor currency units", field
        ))),
        // i64::MAX is not exactly representable; the bound below is the first f64 past it.
        Some(amount) if amount >= i64::MIN as f64 && amount < i64::MAX as f64 => Ok(amount as i64),
        _ => Err(out_of_range()),
    }
}

fn non_negative(field: &str, value: Option<&Number>) -> Result<i64, BillingError> {
    let amount = match value {
        Some(number) => minor_units(field, number)?,
        None => 0,
    };
    if amount < 0 {
        return Err(BillingError::validation(format!("{} must not be negative", field)));
    }
    Ok(amount)
}

/// Validates wire billing input. Hours and days are alternative billing modes.
pub fn parse_billing_params(input: &BillingInput) -> Result<BillingParams, BillingError> {
    let params = BillingParams {
        flat_rate: non_negative("flat_rate", input.flat_rate.as_ref())?,
        hourly_rate: non_negative("hourly_rate", input.hourly_rate.as_ref())?,
        minutes_billed: non_negative("minutes_billed", input.minutes_billed.as_ref())?,
        daily_rate: non_negative("daily_rate", input.daily_rate.as_ref())?,
        days_billed: non_negative("days_billed", input.days_billed.as_ref())?,
        processing_fee: non_negative("processing_fee", input.processing_fee.as_ref())?,
    };

    if params.minutes_billed > 0 && params.days_billed > 0 {
        return Err(BillingError::validation(
            "minutes_billed and days_billed cannot both be set; bill by the hour or by the day",
        ));
    }

    Ok(params)
}

pub fn parse_line_item(input: &LineItemInput) -> Result<InvoiceLineItem, BillingError> {
    Ok(InvoiceLineItem {
        id: Uuid::new_v4(),
        amount_in_minor_units: minor_units("amount_in_minor_units", &input.amount_in_minor_units)?,
        quantity: non_negative("quantity", Some(&input.quantity))?,
        item_type: input.item_type,
        description: input.description.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    use crate::models::LineItemType;

    fn number(value: serde_json::Value) -> Number {
        serde_json::from_value(value).unwrap()
    }

    fn item(amount: i64, quantity: i64) -> InvoiceLineItem {
        InvoiceLineItem {
            id: Uuid::new_v4(),
            amount_in_minor_units: amount,
            quantity,
            item_type: LineItemType::Materials,
            description: String::new(),
        }
    }

    #[test]
    fn test_flat_plus_hourly() {
        let params = BillingParams {
            flat_rate: 10000,
            hourly_rate: 5000,
            minutes_billed: 90,
            ..BillingParams::default()
        };
        assert_eq!(compute_total(&params, &[], false), Ok(17500));
    }

    #[test]
    fn test_hourly_rounds_up() {
        assert_eq!(hourly_component(100, 1), Ok(2));
        assert_eq!(hourly_component(6000, 1), Ok(100));
        assert_eq!(hourly_component(5000, 0), Ok(0));
        assert_eq!(hourly_component(3333, 7), Ok(389));
    }

    #[test]
    fn test_all_components_and_fee() {
        let params = BillingParams {
            flat_rate: 1000,
            daily_rate: 20000,
            days_billed: 2,
            processing_fee: 250,
            ..BillingParams::default()
        };
        let items = vec![item(1250, 2), item(-500, 1)];

        assert_eq!(line_items_total(&items), Ok(2000));
        assert_eq!(compute_total(&params, &items, false), Ok(43000));
        assert_eq!(compute_total(&params, &items, true), Ok(43250));
    }

    #[test]
    fn test_overflow_is_a_validation_error() {
        let params = BillingParams {
            daily_rate: i64::MAX,
            days_billed: 2,
            ..BillingParams::default()
        };
        assert_matches!(compute_total(&params, &[], false), Err(BillingError::Validation(_)));
        assert_matches!(line_items_total(&[item(i64::MAX, 1), item(1, 1)]), Err(BillingError::Validation(_)));
    }

    #[test]
    fn test_minor_units_reject_fractions() {
        assert_eq!(minor_units("flat_rate", &number(json!(1999))), Ok(1999));
        assert_eq!(minor_units("flat_rate", &number(json!(20.0))), Ok(20));
        assert_eq!(minor_units("amount", &number(json!(-15))), Ok(-15));

        assert_matches!(
            minor_units("hourly_rate", &number(json!(49.99))),
            Err(BillingError::Validation(msg)) if msg.contains("hourly_rate") && msg.contains("whole number")
        );
        assert_matches!(
            minor_units("flat_rate", &number(json!(u64::MAX))),
            Err(BillingError::Validation(msg)) if msg == "flat_rate is out of range"
        );
        assert_matches!(minor_units("flat_rate", &number(json!(1e300))), Err(BillingError::Validation(_)));
    }

    #[test]
    fn test_billing_params_validation() {
        let input = BillingInput {
            flat_rate: Some(number(json!(5000))),
            minutes_billed: Some(number(json!(30))),
            days_billed: Some(number(json!(1))),
            ..BillingInput::default()
        };
        assert_matches!(parse_billing_params(&input), Err(BillingError::Validation(msg)) if msg.contains("cannot both be set"));

        let negative = BillingInput { processing_fee: Some(number(json!(-1))), ..BillingInput::default() };
        assert_matches!(parse_billing_params(&negative), Err(BillingError::Validation(msg)) if msg.contains("processing_fee"));

        assert_eq!(parse_billing_params(&BillingInput::default()), Ok(BillingParams::default()));
    }

    #[test]
    fn test_line_item_parsing() {
        let credit = LineItemInput {
            amount_in_minor_units: number(json!(-2500)),
            quantity: number(json!(1)),
            item_type: LineItemType::Materials,
            description: " Returned part ".to_string(),
        };
        let parsed = parse_line_item(&credit).unwrap();
        assert_eq!(parsed.amount_in_minor_units, -2500);
        assert_eq!(parsed.description, "Returned part");

        let fractional_quantity = LineItemInput { quantity: number(json!(1.5)), ..credit };
        assert_matches!(parse_line_item(&fractional_quantity), Err(BillingError::Validation(msg)) if msg.contains("quantity"));
    }
}
