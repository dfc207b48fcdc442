//! Row-level access to users, ingredients, recipes and their composition.
//!
//! Every lookup of an ingredient or recipe takes the acting user's id and
//! filters on it, so rows owned by someone else read exactly like rows that
//! do not exist.

use std::collections::HashMap;

use diesel::prelude::*;

use crate::db::unique_violation;
use crate::error::AppError;
use crate::models::{
    Component, Ingredient, IngredientChanges, NewIngredient, NewRecipe, NewRecipeIngredient,
    NewUser, Recipe, RecipeChangeset, RecipeIngredient, User,
};
use crate::schema::{ingredients, recipe_ingredients, recipes, users};

type DbResult<T> = Result<T, AppError>;

pub fn insert_user(conn: &mut SqliteConnection, new_user: &NewUser) -> DbResult<User> {
    diesel::insert_into(users::table)
        .values(new_user)
        .returning(User::as_returning())
        .get_result(conn)
        .map_err(|e| unique_violation(e, "A user with that username or email already exists."))
}

pub fn find_user_by_token(conn: &mut SqliteConnection, token: &str) -> DbResult<Option<User>> {
    Ok(users::table
        .filter(users::token.eq(token))
        .select(User::as_select())
        .first(conn)
        .optional()?)
}

pub fn list_ingredients(conn: &mut SqliteConnection, owner: i32) -> DbResult<Vec<Ingredient>> {
    Ok(ingredients::table
        .filter(ingredients::user_id.eq(owner))
        .order(ingredients::id.asc())
        .select(Ingredient::as_select())
        .load(conn)?)
}

pub fn find_ingredient(
    conn: &mut SqliteConnection,
    owner: i32,
    ingredient_id: i32,
) -> DbResult<Option<Ingredient>> {
    Ok(ingredients::table
        .filter(ingredients::id.eq(ingredient_id))
        .filter(ingredients::user_id.eq(owner))
        .select(Ingredient::as_select())
        .first(conn)
        .optional()?)
}

const DUPLICATE_INGREDIENT: &str = "An ingredient with this name already exists.";

pub fn insert_ingredient(
    conn: &mut SqliteConnection,
    new_ingredient: &NewIngredient,
) -> DbResult<Ingredient> {
    diesel::insert_into(ingredients::table)
        .values(new_ingredient)
        .returning(Ingredient::as_returning())
        .get_result(conn)
        .map_err(|e| unique_violation(e, DUPLICATE_INGREDIENT))
}

pub fn update_ingredient(
    conn: &mut SqliteConnection,
    owner: i32,
    ingredient_id: i32,
    changes: &IngredientChanges,
) -> DbResult<Ingredient> {
    if changes.is_empty() {
        return find_ingredient(conn, owner, ingredient_id)?.ok_or(AppError::NotFound);
    }

    diesel::update(
        ingredients::table
            .filter(ingredients::id.eq(ingredient_id))
            .filter(ingredients::user_id.eq(owner)),
    )
    .set(changes)
    .returning(Ingredient::as_returning())
    .get_result(conn)
    .map_err(|e| unique_violation(e, DUPLICATE_INGREDIENT))
}

/// Returns whether a row was removed. Join rows go with it (`ON DELETE CASCADE`).
pub fn delete_ingredient(conn: &mut SqliteConnection, owner: i32, ingredient_id: i32) -> DbResult<bool> {
    let deleted = diesel::delete(
        ingredients::table
            .filter(ingredients::id.eq(ingredient_id))
            .filter(ingredients::user_id.eq(owner)),
    )
    .execute(conn)?;
    Ok(deleted > 0)
}

pub fn list_recipes(conn: &mut SqliteConnection, owner: i32) -> DbResult<Vec<Recipe>> {
    Ok(recipes::table
        .filter(recipes::user_id.eq(owner))
        .order(recipes::id.asc())
        .select(Recipe::as_select())
        .load(conn)?)
}

pub fn find_recipe(conn: &mut SqliteConnection, owner: i32, recipe_id: i32) -> DbResult<Option<Recipe>> {
    Ok(recipes::table
        .filter(recipes::id.eq(recipe_id))
        .filter(recipes::user_id.eq(owner))
        .select(Recipe::as_select())
        .first(conn)
        .optional()?)
}

const DUPLICATE_RECIPE: &str = "A recipe with this name already exists.";

pub fn insert_recipe(conn: &mut SqliteConnection, new_recipe: &NewRecipe) -> DbResult<Recipe> {
    diesel::insert_into(recipes::table)
        .values(new_recipe)
        .returning(Recipe::as_returning())
        .get_result(conn)
        .map_err(|e| unique_violation(e, DUPLICATE_RECIPE))
}

pub fn update_recipe_fields(
    conn: &mut SqliteConnection,
    recipe: &Recipe,
    changes: &RecipeChangeset,
) -> DbResult<Recipe> {
    if changes.is_empty() {
        return Ok(recipe.clone());
    }

    diesel::update(recipe)
        .set(changes)
        .returning(Recipe::as_returning())
        .get_result(conn)
        .map_err(|e| unique_violation(e, DUPLICATE_RECIPE))
}

pub fn set_recipe_image(conn: &mut SqliteConnection, recipe: &Recipe, image: &str) -> DbResult<Recipe> {
    Ok(diesel::update(recipe)
        .set(recipes::image.eq(Some(image)))
        .returning(Recipe::as_returning())
        .get_result(conn)?)
}

pub fn delete_recipe(conn: &mut SqliteConnection, owner: i32, recipe_id: i32) -> DbResult<bool> {
    let deleted = diesel::delete(
        recipes::table
            .filter(recipes::id.eq(recipe_id))
            .filter(recipes::user_id.eq(owner)),
    )
    .execute(conn)?;
    Ok(deleted > 0)
}

/// The recipe's join rows with their ingredients, in the order they were stored.
pub fn load_components(conn: &mut SqliteConnection, recipe_id: i32) -> DbResult<Vec<Component>> {
    Ok(recipe_ingredients::table
        .inner_join(ingredients::table)
        .filter(recipe_ingredients::recipe_id.eq(recipe_id))
        .order(recipe_ingredients::id.asc())
        .select((RecipeIngredient::as_select(), Ingredient::as_select()))
        .load(conn)?)
}

/// Like [`load_components`] for many recipes at once, keyed by recipe id.
pub fn load_components_for(
    conn: &mut SqliteConnection,
    recipe_ids: &[i32],
) -> DbResult<HashMap<i32, Vec<Component>>> {
    let rows: Vec<Component> = recipe_ingredients::table
        .inner_join(ingredients::table)
        .filter(recipe_ingredients::recipe_id.eq_any(recipe_ids))
        .order(recipe_ingredients::id.asc())
        .select((RecipeIngredient::as_select(), Ingredient::as_select()))
        .load(conn)?;

    let mut grouped: HashMap<i32, Vec<Component>> = HashMap::new();
    for (link, ingredient) in rows {
        grouped.entry(link.recipe_id).or_default().push((link, ingredient));
    }
    Ok(grouped)
}

pub fn clear_components(conn: &mut SqliteConnection, recipe_id: i32) -> DbResult<usize> {
    Ok(diesel::delete(recipe_ingredients::table.filter(recipe_ingredients::recipe_id.eq(recipe_id)))
        .execute(conn)?)
}

pub fn insert_component(
    conn: &mut SqliteConnection,
    new_link: &NewRecipeIngredient,
) -> DbResult<RecipeIngredient> {
    diesel::insert_into(recipe_ingredients::table)
        .values(new_link)
        .returning(RecipeIngredient::as_returning())
        .get_result(conn)
        .map_err(|e| unique_violation(e, "A recipe cannot list the same ingredient twice."))
}
