use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::media::MediaStore;
use crate::models::{Ingredient, User};
use crate::pricing::{PricedLine, PricedRecipe};

/// Envelope around every response body.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub result: &'static str,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            result: "ok",
            data: Some(data),
            message: None,
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            result: "ok",
            data: Some(data),
            message: Some(message.into()),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            result: "ok",
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            result: "error",
            data: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct UserOutput {
    pub id: i32,
    pub username: String,
    pub email: String,
}

impl From<&User> for UserOutput {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    #[serde(flatten)]
    pub user: UserOutput,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct IngredientInput {
    pub name: String,
    pub cost: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct IngredientPatch {
    pub name: Option<String>,
    pub cost: Option<Decimal>,
}

impl From<IngredientInput> for IngredientPatch {
    fn from(input: IngredientInput) -> Self {
        Self {
            name: Some(input.name),
            cost: Some(input.cost),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IngredientOutput {
    pub id: i32,
    pub name: String,
    pub cost: Decimal,
}

impl From<Ingredient> for IngredientOutput {
    fn from(ingredient: Ingredient) -> Self {
        Self {
            id: ingredient.id,
            cost: ingredient.cost(),
            name: ingredient.name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecipeLineOutput {
    pub id: i32,
    pub name: String,
    pub cost: Decimal,
    pub ingredient_amount: i32,
    pub ingredient_price: Decimal,
}

impl From<PricedLine> for RecipeLineOutput {
    fn from(line: PricedLine) -> Self {
        Self {
            id: line.ingredient_id,
            name: line.name,
            cost: line.unit_cost,
            ingredient_amount: line.amount,
            ingredient_price: line.price,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecipeOutput {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub ingredients: Vec<RecipeLineOutput>,
    pub total_price: Decimal,
}

impl RecipeOutput {
    pub fn new(priced: PricedRecipe, media: &MediaStore) -> Self {
        let PricedRecipe { recipe, lines, total } = priced;
        Self {
            id: recipe.id,
            image: recipe.image.as_deref().map(|key| media.url(key)),
            name: recipe.name,
            description: recipe.description,
            ingredients: lines.into_iter().map(RecipeLineOutput::from).collect(),
            total_price: total,
        }
    }
}
