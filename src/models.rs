use diesel::prelude::*;
use rust_decimal::Decimal;

use crate::schema::{ingredients, recipe_ingredients, recipes, users};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub token: String,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub token: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = ingredients)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Ingredient {
    pub id: i32,
    pub name: String,
    pub cost_cents: i64, //unit cost, stored in hundredths
    pub user_id: i32,
}

impl Ingredient {
    pub fn cost(&self) -> Decimal {
        Decimal::new(self.cost_cents, 2)
    }
}

#[derive(Insertable)]
#[diesel(table_name = ingredients)]
pub struct NewIngredient<'a> {
    pub name: &'a str,
    pub cost_cents: i64,
    pub user_id: i32,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = ingredients)]
pub struct IngredientChanges<'a> {
    pub name: Option<&'a str>,
    pub cost_cents: Option<i64>,
}

impl IngredientChanges<'_> {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.cost_cents.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = recipes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Recipe {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub image: Option<String>, //media key, relative to the media root
    pub user_id: i32,
}

#[derive(Insertable)]
#[diesel(table_name = recipes)]
pub struct NewRecipe<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub user_id: i32,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = recipes)]
pub struct RecipeChangeset<'a> {
    pub name: Option<&'a str>,
    pub description: Option<&'a str>,
}

impl RecipeChangeset<'_> {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// One (recipe, ingredient) pair of a recipe's composition.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = recipe_ingredients)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RecipeIngredient {
    pub id: i32,
    pub recipe_id: i32,     //foreign key
    pub ingredient_id: i32, //foreign key
    pub amount: i32,        //interpreted in the ingredient's own unit
}

#[derive(Insertable)]
#[diesel(table_name = recipe_ingredients)]
pub struct NewRecipeIngredient {
    pub recipe_id: i32,
    pub ingredient_id: i32,
    pub amount: i32,
}

/// A join row loaded together with the ingredient it points at.
pub type Component = (RecipeIngredient, Ingredient);
