//! Recipe pricing.
//!
//! A line costs `unit cost * quantity`; a recipe costs the sum of its lines.
//! Everything is decimal, rounded half-up to cents on the way out. A price
//! too large for a `Decimal` is an error, never a panic.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::AppError;
use crate::models::{Component, Recipe};

#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub ingredient_id: i32,
    pub name: String,
    pub unit_cost: Decimal,
    pub amount: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricedRecipe {
    pub recipe: Recipe,
    pub lines: Vec<PricedLine>,
    pub total: Decimal,
}

pub fn to_cents(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

fn out_of_range() -> AppError {
    AppError::validation("price: Recipe price is out of range.")
}

pub fn line_price(unit_cost: Decimal, amount: i32) -> Result<Decimal, AppError> {
    unit_cost
        .checked_mul(Decimal::from(amount))
        .map(to_cents)
        .ok_or_else(out_of_range)
}

pub fn total_price<I>(line_prices: I) -> Result<Decimal, AppError>
where
    I: IntoIterator<Item = Decimal>,
{
    line_prices
        .into_iter()
        .try_fold(Decimal::ZERO, |total, price| total.checked_add(price))
        .map(to_cents)
        .ok_or_else(out_of_range)
}

/// Prices `components` in the order given, which callers load in storage order.
pub fn price_recipe(recipe: Recipe, components: Vec<Component>) -> Result<PricedRecipe, AppError> {
    let lines = components
        .into_iter()
        .map(|(link, ingredient)| {
            let unit_cost = ingredient.cost();
            Ok(PricedLine {
                ingredient_id: ingredient.id,
                price: line_price(unit_cost, link.amount)?,
                name: ingredient.name,
                unit_cost,
                amount: link.amount,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let total = total_price(lines.iter().map(|line| line.price))?;

    Ok(PricedRecipe { recipe, lines, total })
}
