//! Devis pricing
//!
//! Tier adjustment of catalogue prices, line totals and the tax breakdown
//! (CSS, TVA, total, deposit/balance split). All amounts are whole currency
//! units except line totals, which keep two decimals for fractional
//! quantities.
//!
//! Every operation is checked: amounts that would not fit the `NUMERIC`
//! columns they are stored in fail with [`PricingError`] instead.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::TaxRates;
use crate::error::ApiError;

/// Decimals kept on a unit price (`NUMERIC(14, 2)`)
pub const PRICE_SCALE: u32 = 2;
/// Decimals kept on a quantity (`NUMERIC(14, 3)`)
pub const QUANTITY_SCALE: u32 = 3;

/// Largest unit price, catalogue or tier adjusted
pub fn max_unit_price() -> Decimal {
    Decimal::new(99_999_999_999_999, PRICE_SCALE)
}

/// Largest line quantity
pub fn max_quantity() -> Decimal {
    Decimal::new(99_999_999_999_999, QUANTITY_SCALE)
}

/// Largest line total or devis amount (`NUMERIC(16, 2)`)
pub fn max_amount() -> Decimal {
    Decimal::new(9_999_999_999_999_999, 2)
}

/// Decimals actually used, ignoring trailing zeros
pub fn significant_scale(value: Decimal) -> u32 {
    value.normalize().scale()
}

/// Why `quantity` cannot be stored on a line, if it cannot.
pub fn quantity_problem(quantity: Decimal) -> Option<&'static str> {
    if quantity <= Decimal::ZERO {
        Some("must be greater than zero")
    } else if quantity > max_quantity() {
        Some("is too large")
    } else if significant_scale(quantity) > QUANTITY_SCALE {
        Some("must have at most 3 decimals")
    } else {
        None
    }
}

/// Why `price` cannot be stored as a unit price, if it cannot.
pub fn unit_price_problem(price: Decimal) -> Option<&'static str> {
    if price < Decimal::ZERO {
        Some("must not be negative")
    } else if price > max_unit_price() {
        Some("is too large")
    } else if significant_scale(price) > PRICE_SCALE {
        Some("must have at most 2 decimals")
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("items[{0}] is too large to price")]
    LineTooLarge(usize),
    #[error("devis total is too large")]
    TotalTooLarge,
}

impl From<PricingError> for ApiError {
    fn from(e: PricingError) -> Self {
        ApiError::validation(e.to_string())
    }
}

/// Pricing tier offered to the customer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PricingTier {
    Economique,
    #[default]
    Standard,
    Premium,
}

impl PricingTier {
    pub const ALL: [PricingTier; 3] = [Self::Economique, Self::Standard, Self::Premium];

    /// Factor applied to catalogue unit prices
    pub fn multiplier(self) -> Decimal {
        match self {
            Self::Economique => Decimal::new(95, 2),
            Self::Standard => Decimal::ONE,
            Self::Premium => Decimal::new(115, 2),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Economique => "economique",
            Self::Standard => "standard",
            Self::Premium => "premium",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "economique" => Some(Self::Economique),
            "standard" => Some(Self::Standard),
            "premium" => Some(Self::Premium),
            _ => None,
        }
    }
}

/// Round half away from zero to whole currency units.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Catalogue unit price adjusted for a tier; `None` past [`max_unit_price`].
pub fn tier_unit_price(unit_price: Decimal, tier: PricingTier) -> Option<Decimal> {
    unit_price
        .checked_mul(tier.multiplier())
        .map(round_currency)
        .filter(|p| *p <= max_unit_price())
}

/// One line as entered: catalogue price and quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInput {
    pub unit_price: Decimal,
    pub quantity: Decimal,
}

/// One line after pricing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PricedLine {
    pub unit_price: Decimal,
    pub tier_unit_price: Decimal,
    pub quantity: Decimal,
    pub line_total: Decimal,
}

pub fn price_line(line: LineInput, tier: PricingTier) -> Option<PricedLine> {
    let tier_unit_price = tier_unit_price(line.unit_price, tier)?;
    let line_total = tier_unit_price
        .checked_mul(line.quantity)
        .map(round_cents)
        .filter(|t| *t <= max_amount())?;

    Some(PricedLine {
        unit_price: line.unit_price,
        tier_unit_price,
        quantity: line.quantity,
        line_total,
    })
}

/// Tax breakdown of a devis
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DevisTotals {
    pub subtotal: Decimal,
    pub css: Decimal,
    pub tva: Decimal,
    pub total: Decimal,
    /// Deposit due on acceptance
    pub payment: Decimal,
    /// Remainder due on delivery
    pub balance: Decimal,
}

impl DevisTotals {
    /// CSS is informational and is not added to the total.
    pub fn from_subtotal(subtotal: Decimal, rates: &TaxRates) -> Result<Self, PricingError> {
        let fits = |v: Option<Decimal>| {
            v.map(round_currency)
                .filter(|a| a.abs() <= max_amount())
                .ok_or(PricingError::TotalTooLarge)
        };

        if subtotal > max_amount() {
            return Err(PricingError::TotalTooLarge);
        }
        let css = fits(subtotal.checked_mul(rates.css))?;
        let tva = fits(subtotal.checked_mul(rates.tva))?;
        let total = fits(subtotal.checked_add(tva))?;
        let payment = fits(total.checked_div(Decimal::from(2)))?;
        let balance = total - payment;

        Ok(Self {
            subtotal,
            css,
            tva,
            total,
            payment,
            balance,
        })
    }
}

/// Price every line under `tier` and compute the totals.
pub fn price_devis(
    lines: &[LineInput],
    tier: PricingTier,
    rates: &TaxRates,
) -> Result<(Vec<PricedLine>, DevisTotals), PricingError> {
    let priced = lines
        .iter()
        .enumerate()
        .map(|(i, l)| price_line(*l, tier).ok_or(PricingError::LineTooLarge(i)))
        .collect::<Result<Vec<_>, _>>()?;
    let subtotal = priced
        .iter()
        .try_fold(Decimal::ZERO, |acc, l| acc.checked_add(l.line_total))
        .ok_or(PricingError::TotalTooLarge)?;
    let totals = DevisTotals::from_subtotal(subtotal, rates)?;
    Ok((priced, totals))
}

/// Totals of the same lines under one tier
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TierQuote {
    pub tier: PricingTier,
    pub totals: DevisTotals,
}

/// Totals of the same lines under every tier, cheapest first.
pub fn compare_tiers(
    lines: &[LineInput],
    rates: &TaxRates,
) -> Result<Vec<TierQuote>, PricingError> {
    PricingTier::ALL
        .iter()
        .map(|&tier| {
            Ok(TierQuote {
                tier,
                totals: price_devis(lines, tier, rates)?.1,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn line(price: &str, qty: &str) -> LineInput {
        LineInput {
            unit_price: d(price),
            quantity: d(qty),
        }
    }

    #[test]
    fn tier_multipliers() {
        let price = |p: &str, tier| tier_unit_price(d(p), tier).unwrap();
        assert_eq!(price("1000", PricingTier::Economique), d("950"));
        assert_eq!(price("1000", PricingTier::Standard), d("1000"));
        assert_eq!(price("1000", PricingTier::Premium), d("1150"));
        // 0.95 * 1010 = 959.5 rounds up
        assert_eq!(price("1010", PricingTier::Economique), d("960"));
    }

    #[test]
    fn totals_for_a_known_subtotal() {
        let totals = DevisTotals::from_subtotal(d("125000"), &TaxRates::default()).unwrap();
        assert_eq!(totals.css, d("1250"));
        assert_eq!(totals.tva, d("22500"));
        assert_eq!(totals.total, d("147500"));
        assert_eq!(totals.payment, d("73750"));
        assert_eq!(totals.balance, d("73750"));
    }

    #[test]
    fn odd_total_splits_without_losing_a_unit() {
        // 1 + round(0.18) = 1
        let totals = DevisTotals::from_subtotal(d("1"), &TaxRates::default()).unwrap();
        assert_eq!(totals.total, d("1"));
        assert_eq!(totals.payment, d("1"));
        assert_eq!(totals.balance, d("0"));
    }

    #[test]
    fn total_formula_and_split_hold_for_many_subtotals() {
        let rates = TaxRates::default();
        for i in 0..5_000u32 {
            let subtotal = Decimal::from(i * 37) + Decimal::new((i % 100) as i64, 2);
            let totals = DevisTotals::from_subtotal(subtotal, &rates).unwrap();

            let tva = round_currency(subtotal * d("0.18"));
            assert_eq!(totals.tva, tva);
            assert_eq!(totals.total, round_currency(subtotal + tva));
            assert_eq!(totals.payment + totals.balance, totals.total);
            assert!((totals.payment - totals.balance).abs() <= Decimal::ONE);
        }
    }

    #[test]
    fn subtotal_is_the_sum_of_line_totals() {
        let lines = [line("15000", "2"), line("2500", "3"), line("999", "0.5")];
        let (priced, totals) = price_devis(&lines, PricingTier::Standard, &TaxRates::default()).unwrap();

        assert_eq!(priced[0].line_total, d("30000"));
        assert_eq!(priced[1].line_total, d("7500"));
        assert_eq!(priced[2].line_total, d("499.50"));
        assert_eq!(
            totals.subtotal,
            priced.iter().map(|l| l.line_total).sum::<Decimal>()
        );
        assert_eq!(totals.subtotal, d("37999.50"));
    }

    #[test]
    fn tier_comparison_orders_cheapest_first() {
        let lines = [line("20000", "1"), line("5000", "4")];
        let quotes = compare_tiers(&lines, &TaxRates::default()).unwrap();
        let tiers: Vec<_> = quotes.iter().map(|q| q.tier).collect();
        assert_eq!(tiers, PricingTier::ALL.to_vec());
        assert_eq!(quotes[0].totals.subtotal, d("38000"));
        assert_eq!(quotes[1].totals.subtotal, d("40000"));
        assert_eq!(quotes[2].totals.subtotal, d("46000"));
        assert!(quotes[0].totals.total < quotes[2].totals.total);
    }

    #[test]
    fn empty_devis_is_zero() {
        let (priced, totals) = price_devis(&[], PricingTier::Premium, &TaxRates::default()).unwrap();
        assert!(priced.is_empty());
        assert_eq!(totals.total, Decimal::ZERO);
        assert_eq!(totals.balance, Decimal::ZERO);
    }

    #[test]
    fn oversized_amounts_fail_instead_of_overflowing() {
        let huge = line("100000000000000000000", "100000000000000000000");
        let rates = TaxRates::default();
        assert_eq!(
            price_devis(&[huge], PricingTier::Standard, &rates),
            Err(PricingError::LineTooLarge(0))
        );
        assert_eq!(
            compare_tiers(&[line("100", "1"), huge], &rates),
            Err(PricingError::LineTooLarge(1))
        );

        // The largest storable price no longer fits once the premium markup applies
        let top = line("999999999999", "1");
        assert!(price_line(top, PricingTier::Standard).is_some());
        assert!(price_line(top, PricingTier::Premium).is_none());

        // Many lines that fit alone but not together
        let big = line("900000000000", "100");
        assert!(price_line(big, PricingTier::Standard).is_some());
        assert_eq!(
            price_devis(&[big, big], PricingTier::Standard, &rates),
            Err(PricingError::TotalTooLarge)
        );

        let err: ApiError = PricingError::TotalTooLarge.into();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn scale_ignores_trailing_zeros() {
        assert_eq!(significant_scale(d("1.500")), 1);
        assert_eq!(significant_scale(d("1.2345")), 4);
        assert_eq!(significant_scale(d("12")), 0);
    }

    #[test]
    fn storable_quantities_and_prices() {
        assert_eq!(quantity_problem(d("1.250")), None);
        assert_eq!(quantity_problem(d("99999999999.999")), None);
        assert!(quantity_problem(d("0")).is_some());
        assert!(quantity_problem(d("0.0001")).is_some());
        assert!(quantity_problem(d("1.2345")).is_some());
        assert!(quantity_problem(d("100000000000")).is_some());

        assert_eq!(unit_price_problem(d("0")), None);
        assert_eq!(unit_price_problem(d("1250.50")), None);
        assert!(unit_price_problem(d("-1")).is_some());
        assert!(unit_price_problem(d("0.001")).is_some());
        assert!(unit_price_problem(d("1000000000000")).is_some());
    }

    #[test]
    fn tier_round_trips_through_strings() {
        for tier in PricingTier::ALL {
            assert_eq!(PricingTier::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(PricingTier::parse("gold"), None);
    }
}
