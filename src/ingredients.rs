use diesel::SqliteConnection;
use rust_decimal::Decimal;

use crate::composition::validate_name;
use crate::dto::IngredientPatch;
use crate::error::AppError;
use crate::models::{Ingredient, IngredientChanges, NewIngredient};
use crate::query;

pub const MAX_INGREDIENT_NAME: usize = 100;
const MAX_COST_DIGITS: u32 = 20;

/// Converts a unit cost to whole cents, rejecting anything that would need
/// rounding to fit.
pub fn cost_to_cents(cost: Decimal) -> Result<i64, AppError> {
    if cost.is_sign_negative() && !cost.is_zero() {
        return Err(AppError::validation("cost: Ensure this value is greater than or equal to 0."));
    }

    let mut scaled = cost;
    scaled.rescale(2);
    if scaled != cost {
        return Err(AppError::validation(
            "cost: Ensure that there are no more than 2 decimal places.",
        ));
    }

    let mantissa = scaled.mantissa();
    if mantissa.unsigned_abs().to_string().len() > MAX_COST_DIGITS as usize {
        return Err(AppError::validation(format!(
            "cost: Ensure that there are no more than {MAX_COST_DIGITS} digits in total."
        )));
    }
    i64::try_from(mantissa).map_err(|_| AppError::validation("cost: Value is out of range."))
}

pub fn create_ingredient(
    conn: &mut SqliteConnection,
    owner: i32,
    name: &str,
    cost: Decimal,
) -> Result<Ingredient, AppError> {
    validate_name(name, MAX_INGREDIENT_NAME)?;
    let cost_cents = cost_to_cents(cost)?;

    let ingredient = query::insert_ingredient(
        conn,
        &NewIngredient {
            name,
            cost_cents,
            user_id: owner,
        },
    )?;
    log::info!("user {} created ingredient {}", owner, ingredient.id);
    Ok(ingredient)
}

pub fn update_ingredient(
    conn: &mut SqliteConnection,
    owner: i32,
    ingredient_id: i32,
    patch: &IngredientPatch,
) -> Result<Ingredient, AppError> {
    if let Some(name) = &patch.name {
        validate_name(name, MAX_INGREDIENT_NAME)?;
    }
    let cost_cents = patch.cost.map(cost_to_cents).transpose()?;

    query::update_ingredient(
        conn,
        owner,
        ingredient_id,
        &IngredientChanges {
            name: patch.name.as_deref(),
            cost_cents,
        },
    )
}

pub fn delete_ingredient(conn: &mut SqliteConnection, owner: i32, ingredient_id: i32) -> Result<(), AppError> {
    if !query::delete_ingredient(conn, owner, ingredient_id)? {
        return Err(AppError::NotFound);
    }
    log::info!("user {} deleted ingredient {}", owner, ingredient_id);
    Ok(())
}

pub fn list_ingredients(conn: &mut SqliteConnection, owner: i32) -> Result<Vec<Ingredient>, AppError> {
    query::list_ingredients(conn, owner)
}

pub fn get_ingredient(conn: &mut SqliteConnection, owner: i32, ingredient_id: i32) -> Result<Ingredient, AppError> {
    query::find_ingredient(conn, owner, ingredient_id)?.ok_or(AppError::NotFound)
}
