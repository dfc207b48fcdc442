//! Every write that touches a recipe's ingredient set goes through here.
//!
//! Each operation is one transaction: a failure part-way through (an
//! ingredient that does not exist or belongs to another user, a duplicate
//! name) rolls back everything the operation already wrote.
//!
//! Replacing ingredients is delete-all-then-recreate, never a diff. Entries
//! left out of the new list are dropped even when nothing about them
//! changed, and of two concurrent replaces the last to commit wins.

use std::collections::HashSet;

use diesel::prelude::*;
use serde::Deserialize;

use crate::error::AppError;
use crate::media::{ImageUpload, MediaStore};
use crate::models::{NewRecipe, NewRecipeIngredient, Recipe, RecipeChangeset};
use crate::pricing::{price_recipe, PricedRecipe};
use crate::query;

pub const MAX_RECIPE_NAME: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct IngredientEntry {
    pub ingredient_id: i32,
    #[serde(rename = "ingredient_amount")]
    pub amount: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecipeDraft {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub ingredients: Vec<IngredientEntry>,
}

/// Fields left as `None` are not touched. `ingredients: Some(vec![])`
/// clears the composition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub ingredients: Option<Vec<IngredientEntry>>,
}

impl From<RecipeDraft> for RecipeUpdate {
    fn from(draft: RecipeDraft) -> Self {
        Self {
            name: Some(draft.name),
            description: Some(draft.description),
            ingredients: Some(draft.ingredients),
        }
    }
}

pub fn validate_name(name: &str, max_len: usize) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::validation("name: This field may not be blank."));
    }
    if name.chars().count() > max_len {
        return Err(AppError::validation(format!(
            "name: Ensure this field has no more than {max_len} characters."
        )));
    }
    Ok(())
}

fn validate_entries(entries: &[IngredientEntry]) -> Result<(), AppError> {
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        if entry.amount <= 0 {
            return Err(AppError::validation(
                "ingredient_amount: Ensure this value is greater than 0.",
            ));
        }
        if !seen.insert(entry.ingredient_id) {
            return Err(AppError::validation(format!(
                "ingredients: ingredient {} is listed more than once.",
                entry.ingredient_id
            )));
        }
    }
    Ok(())
}

pub fn load_priced(conn: &mut SqliteConnection, owner: i32, recipe_id: i32) -> Result<PricedRecipe, AppError> {
    let recipe = query::find_recipe(conn, owner, recipe_id)?.ok_or(AppError::NotFound)?;
    let components = query::load_components(conn, recipe.id)?;
    price_recipe(recipe, components)
}

pub fn list_priced(conn: &mut SqliteConnection, owner: i32) -> Result<Vec<PricedRecipe>, AppError> {
    let recipes = query::list_recipes(conn, owner)?;
    let ids: Vec<i32> = recipes.iter().map(|r| r.id).collect();
    let mut components = query::load_components_for(conn, &ids)?;

    recipes
        .into_iter()
        .map(|recipe| {
            let lines = components.remove(&recipe.id).unwrap_or_default();
            price_recipe(recipe, lines)
        })
        .collect()
}

pub fn create_recipe(conn: &mut SqliteConnection, owner: i32, draft: &RecipeDraft) -> Result<PricedRecipe, AppError> {
    validate_name(&draft.name, MAX_RECIPE_NAME)?;
    validate_entries(&draft.ingredients)?;

    let priced = conn.transaction::<_, AppError, _>(|conn| {
        let recipe = query::insert_recipe(
            conn,
            &NewRecipe {
                name: &draft.name,
                description: &draft.description,
                user_id: owner,
            },
        )?;
        attach_ingredients(conn, &recipe, owner, &draft.ingredients)?;
        load_priced(conn, owner, recipe.id)
    })?;

    log::info!(
        "user {} created recipe {} with {} ingredients",
        owner,
        priced.recipe.id,
        draft.ingredients.len()
    );
    Ok(priced)
}

/// Swaps the recipe's whole ingredient set for `entries`. An empty list
/// leaves the recipe with no ingredients.
pub fn replace_ingredients(
    conn: &mut SqliteConnection,
    recipe: &Recipe,
    owner: i32,
    entries: &[IngredientEntry],
) -> Result<(), AppError> {
    if recipe.user_id != owner {
        return Err(AppError::NotFound);
    }
    validate_entries(entries)?;

    conn.transaction::<_, AppError, _>(|conn| {
        let removed = query::clear_components(conn, recipe.id)?;
        log::debug!("recipe {}: cleared {} ingredient rows", recipe.id, removed);
        attach_ingredients(conn, recipe, owner, entries)
    })
}

/// Shared by full (every field `Some`) and partial updates.
pub fn update_recipe(
    conn: &mut SqliteConnection,
    owner: i32,
    recipe_id: i32,
    update: &RecipeUpdate,
) -> Result<PricedRecipe, AppError> {
    if let Some(name) = &update.name {
        validate_name(name, MAX_RECIPE_NAME)?;
    }
    if let Some(entries) = &update.ingredients {
        validate_entries(entries)?;
    }

    let priced = conn.transaction::<_, AppError, _>(|conn| {
        let recipe = query::find_recipe(conn, owner, recipe_id)?.ok_or(AppError::NotFound)?;
        let recipe = query::update_recipe_fields(
            conn,
            &recipe,
            &RecipeChangeset {
                name: update.name.as_deref(),
                description: update.description.as_deref(),
            },
        )?;
        if let Some(entries) = &update.ingredients {
            replace_ingredients(conn, &recipe, owner, entries)?;
        }
        load_priced(conn, owner, recipe_id)
    })?;

    log::info!("user {} updated recipe {}", owner, recipe_id);
    Ok(priced)
}

pub fn delete_recipe(conn: &mut SqliteConnection, owner: i32, recipe_id: i32) -> Result<(), AppError> {
    if !query::delete_recipe(conn, owner, recipe_id)? {
        return Err(AppError::NotFound);
    }
    log::info!("user {} deleted recipe {}", owner, recipe_id);
    Ok(())
}

/// Stores `upload` as the recipe's image. Nothing is written unless the
/// recipe is visible to `owner` and the upload passes every check; the
/// image it replaces is left in storage.
pub fn upload_image(
    conn: &mut SqliteConnection,
    media: &MediaStore,
    owner: i32,
    recipe_id: i32,
    upload: Option<ImageUpload>,
) -> Result<PricedRecipe, AppError> {
    let recipe = query::find_recipe(conn, owner, recipe_id)?.ok_or(AppError::NotFound)?;
    let upload = upload.ok_or_else(|| AppError::validation("image: No image was uploaded."))?;
    let format = upload.validate()?;

    let key = media.save(format, &upload.bytes)?;
    let stored = conn.transaction::<_, AppError, _>(|conn| query::set_recipe_image(conn, &recipe, &key));
    if let Err(err) = stored {
        media.discard(&key);
        return Err(err);
    }

    log::info!("user {} uploaded image {} for recipe {}", owner, key, recipe_id);
    load_priced(conn, owner, recipe_id)
}

fn attach_ingredients(
    conn: &mut SqliteConnection,
    recipe: &Recipe,
    owner: i32,
    entries: &[IngredientEntry],
) -> Result<(), AppError> {
    for entry in entries {
        let ingredient = query::find_ingredient(conn, owner, entry.ingredient_id)?
            .ok_or(AppError::InvalidIngredient(entry.ingredient_id))?;
        query::insert_component(
            conn,
            &NewRecipeIngredient {
                recipe_id: recipe.id,
                ingredient_id: ingredient.id,
                amount: entry.amount,
            },
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;
    use crate::dto::IngredientPatch;
    use crate::ingredients;
    use crate::media::MAX_IMAGE_BYTES;
    use crate::models::User;
    use crate::schema::{recipe_ingredients, recipes};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn entry(ingredient_id: i32, amount: i32) -> IngredientEntry {
        IngredientEntry { ingredient_id, amount }
    }

    fn draft(name: &str, ingredients: Vec<IngredientEntry>) -> RecipeDraft {
        RecipeDraft {
            name: name.to_string(),
            description: "Fresh homemade".to_string(),
            ingredients,
        }
    }

    fn recipe_rows(conn: &mut SqliteConnection, user: &User) -> i64 {
        recipes::table
            .filter(recipes::user_id.eq(user.id))
            .count()
            .get_result(conn)
            .unwrap()
    }

    fn join_rows(conn: &mut SqliteConnection) -> i64 {
        recipe_ingredients::table.count().get_result(conn).unwrap()
    }

    fn png_upload() -> ImageUpload {
        ImageUpload {
            content_type: Some("image/png".to_string()),
            bytes: PNG.to_vec(),
            size: PNG.len(),
        }
    }

    #[test]
    fn create_prices_the_recipe() {
        let (_dir, database) = test_support::database();
        let mut conn = test_support::connection(&database);
        let alice = test_support::user(&mut conn, "alice");
        let flour = test_support::ingredient(&mut conn, &alice, "Flour", 100);

        let priced = create_recipe(&mut conn, alice.id, &draft("Bread", vec![entry(flour.id, 500)])).unwrap();

        assert_eq!(priced.recipe.name, "Bread");
        assert_eq!(priced.lines.len(), 1);
        assert_eq!(priced.lines[0].ingredient_id, flour.id);
        assert_eq!(priced.lines[0].price.to_string(), "500.00");
        assert_eq!(priced.total.to_string(), "500.00");
    }

    #[test]
    fn foreign_ingredient_rolls_back_the_whole_create() {
        let (_dir, database) = test_support::database();
        let mut conn = test_support::connection(&database);
        let alice = test_support::user(&mut conn, "alice");
        let bob = test_support::user(&mut conn, "bob");
        let flour = test_support::ingredient(&mut conn, &alice, "Flour", 100);
        let bobs_salt = test_support::ingredient(&mut conn, &bob, "Salt", 20);

        let result = create_recipe(
            &mut conn,
            alice.id,
            &draft("Bread", vec![entry(flour.id, 500), entry(bobs_salt.id, 5)]),
        );

        match result {
            Err(err @ AppError::InvalidIngredient(id)) => {
                assert_eq!(id, bobs_salt.id);
                assert_eq!(err.to_string(), format!("Invalid pk \"{}\" - object does not exist.", bobs_salt.id));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(recipe_rows(&mut conn, &alice), 0);
        assert_eq!(join_rows(&mut conn), 0);
    }

    #[test]
    fn invalid_entries_are_rejected_before_writing() {
        let (_dir, database) = test_support::database();
        let mut conn = test_support::connection(&database);
        let alice = test_support::user(&mut conn, "alice");
        let flour = test_support::ingredient(&mut conn, &alice, "Flour", 100);

        let zero = create_recipe(&mut conn, alice.id, &draft("Bread", vec![entry(flour.id, 0)]));
        assert!(matches!(zero, Err(AppError::Validation(_))));

        let twice = create_recipe(
            &mut conn,
            alice.id,
            &draft("Bread", vec![entry(flour.id, 1), entry(flour.id, 2)]),
        );
        assert!(matches!(twice, Err(AppError::Validation(_))));

        let long_name = "x".repeat(MAX_RECIPE_NAME + 1);
        assert!(matches!(
            create_recipe(&mut conn, alice.id, &draft(&long_name, Vec::new())),
            Err(AppError::Validation(_))
        ));
        assert_eq!(recipe_rows(&mut conn, &alice), 0);
    }

    #[test]
    fn recipe_names_are_unique_per_user() {
        let (_dir, database) = test_support::database();
        let mut conn = test_support::connection(&database);
        let alice = test_support::user(&mut conn, "alice");
        let bob = test_support::user(&mut conn, "bob");

        create_recipe(&mut conn, alice.id, &draft("Soup", Vec::new())).unwrap();
        create_recipe(&mut conn, bob.id, &draft("Soup", Vec::new())).unwrap();

        let again = create_recipe(&mut conn, alice.id, &draft("Soup", Vec::new()));
        assert!(matches!(again, Err(AppError::Validation(_))));
    }

    #[test]
    fn replacing_with_an_empty_list_clears_everything() {
        let (_dir, database) = test_support::database();
        let mut conn = test_support::connection(&database);
        let alice = test_support::user(&mut conn, "alice");
        let milk = test_support::ingredient(&mut conn, &alice, "Milk", 150);
        let created = create_recipe(&mut conn, alice.id, &draft("Pancakes", vec![entry(milk.id, 2)])).unwrap();

        replace_ingredients(&mut conn, &created.recipe, alice.id, &[]).unwrap();

        let priced = load_priced(&mut conn, alice.id, created.recipe.id).unwrap();
        assert!(priced.lines.is_empty());
        assert_eq!(priced.total.to_string(), "0.00");
    }

    #[test]
    fn replace_drops_entries_left_out() {
        let (_dir, database) = test_support::database();
        let mut conn = test_support::connection(&database);
        let alice = test_support::user(&mut conn, "alice");
        let milk = test_support::ingredient(&mut conn, &alice, "Milk", 150);
        let eggs = test_support::ingredient(&mut conn, &alice, "Eggs", 30);
        let created = create_recipe(
            &mut conn,
            alice.id,
            &draft("Pancakes", vec![entry(milk.id, 2), entry(eggs.id, 3)]),
        )
        .unwrap();

        replace_ingredients(&mut conn, &created.recipe, alice.id, &[entry(eggs.id, 3)]).unwrap();

        let priced = load_priced(&mut conn, alice.id, created.recipe.id).unwrap();
        assert_eq!(priced.lines.len(), 1);
        assert_eq!(priced.lines[0].name, "Eggs");
        assert_eq!(priced.total.to_string(), "0.90");
    }

    #[test]
    fn replace_refuses_someone_elses_recipe() {
        let (_dir, database) = test_support::database();
        let mut conn = test_support::connection(&database);
        let alice = test_support::user(&mut conn, "alice");
        let bob = test_support::user(&mut conn, "bob");
        let created = create_recipe(&mut conn, alice.id, &draft("Soup", Vec::new())).unwrap();

        let result = replace_ingredients(&mut conn, &created.recipe, bob.id, &[]);
        assert!(matches!(result, Err(AppError::NotFound)));
    }

    #[test]
    fn failed_update_keeps_previous_state() {
        let (_dir, database) = test_support::database();
        let mut conn = test_support::connection(&database);
        let alice = test_support::user(&mut conn, "alice");
        let bob = test_support::user(&mut conn, "bob");
        let milk = test_support::ingredient(&mut conn, &alice, "Milk", 150);
        let bobs_milk = test_support::ingredient(&mut conn, &bob, "Milk", 90);
        let created = create_recipe(&mut conn, alice.id, &draft("Pancakes", vec![entry(milk.id, 2)])).unwrap();

        let update = RecipeUpdate {
            name: Some("Renamed".to_string()),
            description: None,
            ingredients: Some(vec![entry(bobs_milk.id, 1)]),
        };
        let result = update_recipe(&mut conn, alice.id, created.recipe.id, &update);
        assert!(matches!(result, Err(AppError::InvalidIngredient(_))));

        let priced = load_priced(&mut conn, alice.id, created.recipe.id).unwrap();
        assert_eq!(priced.recipe.name, "Pancakes");
        assert_eq!(priced.lines.len(), 1);
        assert_eq!(priced.total.to_string(), "3.00");
    }

    #[test]
    fn partial_update_without_ingredients_keeps_them() {
        let (_dir, database) = test_support::database();
        let mut conn = test_support::connection(&database);
        let alice = test_support::user(&mut conn, "alice");
        let milk = test_support::ingredient(&mut conn, &alice, "Milk", 150);
        let created = create_recipe(&mut conn, alice.id, &draft("Pancakes", vec![entry(milk.id, 200)])).unwrap();

        let update = RecipeUpdate {
            description: Some("Fluffy".to_string()),
            ..RecipeUpdate::default()
        };
        let priced = update_recipe(&mut conn, alice.id, created.recipe.id, &update).unwrap();

        assert_eq!(priced.recipe.description, "Fluffy");
        assert_eq!(priced.lines.len(), 1);
        assert_eq!(priced.total.to_string(), "300.00");
    }

    #[test]
    fn full_update_replaces_everything() {
        let (_dir, database) = test_support::database();
        let mut conn = test_support::connection(&database);
        let alice = test_support::user(&mut conn, "alice");
        let milk = test_support::ingredient(&mut conn, &alice, "Milk", 150);
        let created = create_recipe(&mut conn, alice.id, &draft("Pancakes", Vec::new())).unwrap();

        let update = RecipeUpdate::from(draft("Updated Pancakes", vec![entry(milk.id, 200)]));
        let priced = update_recipe(&mut conn, alice.id, created.recipe.id, &update).unwrap();

        assert_eq!(priced.recipe.name, "Updated Pancakes");
        assert_eq!(priced.lines[0].price, priced.total);
        assert_eq!(priced.total.to_string(), "300.00");
    }

    #[test]
    fn delete_is_scoped_and_cascades() {
        let (_dir, database) = test_support::database();
        let mut conn = test_support::connection(&database);
        let alice = test_support::user(&mut conn, "alice");
        let bob = test_support::user(&mut conn, "bob");
        let milk = test_support::ingredient(&mut conn, &alice, "Milk", 150);
        let created = create_recipe(&mut conn, alice.id, &draft("Pancakes", vec![entry(milk.id, 2)])).unwrap();

        assert!(matches!(
            delete_recipe(&mut conn, bob.id, created.recipe.id),
            Err(AppError::NotFound)
        ));
        delete_recipe(&mut conn, alice.id, created.recipe.id).unwrap();
        assert_eq!(join_rows(&mut conn), 0);
    }

    #[test]
    fn list_prices_every_recipe() {
        let (_dir, database) = test_support::database();
        let mut conn = test_support::connection(&database);
        let alice = test_support::user(&mut conn, "alice");
        let milk = test_support::ingredient(&mut conn, &alice, "Milk", 150);
        create_recipe(&mut conn, alice.id, &draft("Pancakes", vec![entry(milk.id, 2)])).unwrap();
        create_recipe(&mut conn, alice.id, &draft("Water", Vec::new())).unwrap();

        let totals: Vec<String> = list_priced(&mut conn, alice.id)
            .unwrap()
            .iter()
            .map(|p| p.total.to_string())
            .collect();
        assert_eq!(totals, ["3.00", "0.00"]);
    }

    #[test]
    fn upload_sets_the_image() {
        let (dir, database) = test_support::database();
        let mut conn = test_support::connection(&database);
        let media = MediaStore::new(dir.path().join("media"), "http://localhost/media");
        let alice = test_support::user(&mut conn, "alice");
        let created = create_recipe(&mut conn, alice.id, &draft("Pancakes", Vec::new())).unwrap();

        let priced = upload_image(&mut conn, &media, alice.id, created.recipe.id, Some(png_upload())).unwrap();

        let key = priced.recipe.image.expect("image stored");
        assert!(key.ends_with(".png"));
        assert!(dir.path().join("media").join(&key).exists());
        assert_eq!(priced.total.to_string(), "0.00");
    }

    #[test]
    fn rejected_upload_keeps_the_previous_image() {
        let (dir, database) = test_support::database();
        let mut conn = test_support::connection(&database);
        let media = MediaStore::new(dir.path().join("media"), "http://localhost/media");
        let alice = test_support::user(&mut conn, "alice");
        let created = create_recipe(&mut conn, alice.id, &draft("Pancakes", Vec::new())).unwrap();
        let first = upload_image(&mut conn, &media, alice.id, created.recipe.id, Some(png_upload())).unwrap();

        let oversized = ImageUpload {
            size: MAX_IMAGE_BYTES + 1,
            ..png_upload()
        };
        let wrong_type = ImageUpload {
            content_type: Some("application/pdf".to_string()),
            ..png_upload()
        };
        for upload in [Some(oversized), Some(wrong_type), None] {
            let result = upload_image(&mut conn, &media, alice.id, created.recipe.id, upload);
            assert!(matches!(result, Err(AppError::Validation(_))));
        }

        let current = load_priced(&mut conn, alice.id, created.recipe.id).unwrap();
        assert_eq!(current.recipe.image, first.recipe.image);
    }

    #[test]
    fn upload_to_someone_elses_recipe_is_not_found() {
        let (dir, database) = test_support::database();
        let mut conn = test_support::connection(&database);
        let media = MediaStore::new(dir.path().join("media"), "http://localhost/media");
        let alice = test_support::user(&mut conn, "alice");
        let bob = test_support::user(&mut conn, "bob");
        let created = create_recipe(&mut conn, alice.id, &draft("Pancakes", Vec::new())).unwrap();

        let result = upload_image(&mut conn, &media, bob.id, created.recipe.id, Some(png_upload()));
        assert!(matches!(result, Err(AppError::NotFound)));
        assert!(!dir.path().join("media").exists());
    }

    #[test]
    fn ingredient_changes_reprice_recipes_that_use_it() {
        let (_dir, database) = test_support::database();
        let mut conn = test_support::connection(&database);
        let alice = test_support::user(&mut conn, "alice");
        let flour = test_support::ingredient(&mut conn, &alice, "Flour", 100);
        let salt = test_support::ingredient(&mut conn, &alice, "Salt", 50);
        let created = create_recipe(
            &mut conn,
            alice.id,
            &draft("Bread", vec![entry(flour.id, 500), entry(salt.id, 2)]),
        )
        .unwrap();
        assert_eq!(created.total.to_string(), "501.00");

        ingredients::update_ingredient(
            &mut conn,
            alice.id,
            flour.id,
            &IngredientPatch {
                cost: Some(rust_decimal::Decimal::new(150, 2)),
                ..IngredientPatch::default()
            },
        )
        .unwrap();
        let priced = load_priced(&mut conn, alice.id, created.recipe.id).unwrap();
        assert_eq!(priced.lines[0].price.to_string(), "750.00");
        assert_eq!(priced.total.to_string(), "751.00");

        ingredients::delete_ingredient(&mut conn, alice.id, flour.id).unwrap();
        let priced = load_priced(&mut conn, alice.id, created.recipe.id).unwrap();
        assert_eq!(priced.lines.len(), 1);
        assert_eq!(priced.lines[0].ingredient_id, salt.id);
        assert_eq!(priced.total.to_string(), "1.00");
    }

    #[test]
    fn unpriceable_recipe_is_rolled_back() {
        let (_dir, database) = test_support::database();
        let mut conn = test_support::connection(&database);
        let alice = test_support::user(&mut conn, "alice");
        let entries = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                Ok((0..450)
                    .map(|i| {
                        let gold = test_support::ingredient(conn, &alice, &format!("Gold {i}"), i64::MAX);
                        entry(gold.id, i32::MAX)
                    })
                    .collect::<Vec<_>>())
            })
            .unwrap();

        let result = create_recipe(&mut conn, alice.id, &draft("Treasure", entries));

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(recipe_rows(&mut conn, &alice), 0);
        assert_eq!(join_rows(&mut conn), 0);
    }
}
