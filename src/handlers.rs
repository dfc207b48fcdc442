use actix_multipart::Multipart;
use actix_web::{delete, get, patch, post, put, web, HttpResponse};
use futures_util::StreamExt;

use crate::auth::{self, AuthenticatedUser};
use crate::composition::{self, RecipeDraft, RecipeUpdate};
use crate::db::Database;
use crate::dto::{
    ApiResponse, IngredientInput, IngredientOutput, IngredientPatch, RecipeOutput, RegisterInput,
    RegisteredUser, UserOutput,
};
use crate::error::AppError;
use crate::ingredients;
use crate::media::{ImageUpload, MediaStore, MAX_IMAGE_BYTES};

type HandlerResult = Result<HttpResponse, AppError>;

/// Registers every route plus extractor configs that report malformed
/// input through the usual error envelope. Unknown paths and methods get
/// the envelope too.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        AppError::validation(format!("Malformed JSON payload: {err}")).into()
    }))
    .app_data(web::PathConfig::default().error_handler(|_err, _req| AppError::NotFound.into()))
    .service(register_user)
    .service(current_user)
    .service(list_ingredients)
    .service(create_ingredient)
    .service(get_ingredient)
    .service(update_ingredient)
    .service(patch_ingredient)
    .service(delete_ingredient)
    .service(list_recipes)
    .service(create_recipe)
    .service(get_recipe)
    .service(update_recipe)
    .service(patch_recipe)
    .service(delete_recipe)
    .service(upload_recipe_image)
    .default_service(web::to(not_found));
}

async fn not_found() -> HandlerResult {
    Err(AppError::NotFound)
}

#[post("/api/register/")]
async fn register_user(db: web::Data<Database>, payload: web::Json<RegisterInput>) -> HandlerResult {
    let input = payload.into_inner();
    let user = db.run(move |conn| auth::register(conn, &input)).await?;

    let body = RegisteredUser {
        user: UserOutput::from(&user),
        token: user.token,
    };
    Ok(HttpResponse::Created().json(ApiResponse::ok_with_message(body, "User registered successfully")))
}

#[get("/api/currentUser/")]
async fn current_user(user: AuthenticatedUser) -> HandlerResult {
    Ok(HttpResponse::Ok().json(ApiResponse::ok(UserOutput::from(&user.0))))
}

#[get("/api/ingredients/")]
async fn list_ingredients(user: AuthenticatedUser, db: web::Data<Database>) -> HandlerResult {
    let owner = user.id();
    let ingredients = db
        .run(move |conn| ingredients::list_ingredients(conn, owner))
        .await?;

    let body: Vec<IngredientOutput> = ingredients.into_iter().map(IngredientOutput::from).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::ok(body)))
}

#[post("/api/ingredients/")]
async fn create_ingredient(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    payload: web::Json<IngredientInput>,
) -> HandlerResult {
    let owner = user.id();
    let input = payload.into_inner();
    let ingredient = db
        .run(move |conn| ingredients::create_ingredient(conn, owner, &input.name, input.cost))
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::ok(IngredientOutput::from(ingredient))))
}

#[get("/api/ingredients/{id}/")]
async fn get_ingredient(user: AuthenticatedUser, db: web::Data<Database>, id: web::Path<i32>) -> HandlerResult {
    let owner = user.id();
    let id = id.into_inner();
    let ingredient = db
        .run(move |conn| ingredients::get_ingredient(conn, owner, id))
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(IngredientOutput::from(ingredient))))
}

async fn apply_ingredient_patch(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    id: i32,
    patch: IngredientPatch,
) -> HandlerResult {
    let owner = user.id();
    let ingredient = db
        .run(move |conn| ingredients::update_ingredient(conn, owner, id, &patch))
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(IngredientOutput::from(ingredient))))
}

#[put("/api/ingredients/{id}/")]
async fn update_ingredient(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    id: web::Path<i32>,
    payload: web::Json<IngredientInput>,
) -> HandlerResult {
    apply_ingredient_patch(user, db, id.into_inner(), payload.into_inner().into()).await
}

#[patch("/api/ingredients/{id}/")]
async fn patch_ingredient(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    id: web::Path<i32>,
    payload: web::Json<IngredientPatch>,
) -> HandlerResult {
    apply_ingredient_patch(user, db, id.into_inner(), payload.into_inner()).await
}

#[delete("/api/ingredients/{id}/")]
async fn delete_ingredient(user: AuthenticatedUser, db: web::Data<Database>, id: web::Path<i32>) -> HandlerResult {
    let owner = user.id();
    let id = id.into_inner();
    db.run(move |conn| ingredients::delete_ingredient(conn, owner, id))
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::<()>::message("Ingredient deleted")))
}

#[get("/api/recipes/")]
async fn list_recipes(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    media: web::Data<MediaStore>,
) -> HandlerResult {
    let owner = user.id();
    let recipes = db.run(move |conn| composition::list_priced(conn, owner)).await?;

    let body: Vec<RecipeOutput> = recipes
        .into_iter()
        .map(|priced| RecipeOutput::new(priced, &media))
        .collect();
    Ok(HttpResponse::Ok().json(ApiResponse::ok(body)))
}

#[post("/api/recipes/")]
async fn create_recipe(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    media: web::Data<MediaStore>,
    payload: web::Json<RecipeDraft>,
) -> HandlerResult {
    let owner = user.id();
    let draft = payload.into_inner();
    let priced = db
        .run(move |conn| composition::create_recipe(conn, owner, &draft))
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::ok(RecipeOutput::new(priced, &media))))
}

#[get("/api/recipes/{id}/")]
async fn get_recipe(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    media: web::Data<MediaStore>,
    id: web::Path<i32>,
) -> HandlerResult {
    let owner = user.id();
    let id = id.into_inner();
    let priced = db.run(move |conn| composition::load_priced(conn, owner, id)).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(RecipeOutput::new(priced, &media))))
}

async fn apply_recipe_update(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    media: web::Data<MediaStore>,
    id: i32,
    update: RecipeUpdate,
) -> HandlerResult {
    let owner = user.id();
    let priced = db
        .run(move |conn| composition::update_recipe(conn, owner, id, &update))
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(RecipeOutput::new(priced, &media))))
}

/// A body without `ingredients` clears them, like an explicit empty list.
#[put("/api/recipes/{id}/")]
async fn update_recipe(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    media: web::Data<MediaStore>,
    id: web::Path<i32>,
    payload: web::Json<RecipeDraft>,
) -> HandlerResult {
    apply_recipe_update(user, db, media, id.into_inner(), payload.into_inner().into()).await
}

#[patch("/api/recipes/{id}/")]
async fn patch_recipe(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    media: web::Data<MediaStore>,
    id: web::Path<i32>,
    payload: web::Json<RecipeUpdate>,
) -> HandlerResult {
    apply_recipe_update(user, db, media, id.into_inner(), payload.into_inner()).await
}

#[delete("/api/recipes/{id}/")]
async fn delete_recipe(user: AuthenticatedUser, db: web::Data<Database>, id: web::Path<i32>) -> HandlerResult {
    let owner = user.id();
    let id = id.into_inner();
    db.run(move |conn| composition::delete_recipe(conn, owner, id)).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::<()>::message("Recipe deleted")))
}

#[post("/api/recipes/{id}/upload-image/")]
async fn upload_recipe_image(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    media: web::Data<MediaStore>,
    id: web::Path<i32>,
    payload: Multipart,
) -> HandlerResult {
    let owner = user.id();
    let id = id.into_inner();
    let upload = read_image_field(payload).await?;

    let store = media.clone();
    let priced = db
        .run(move |conn| composition::upload_image(conn, &store, owner, id, upload))
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok_with_message(
        RecipeOutput::new(priced, &media),
        "Image successfully uploaded",
    )))
}

/// Pulls the `image` field out of the form. Other fields are drained and
/// ignored. Buffering stops one byte past the size limit; the rest is only
/// counted.
async fn read_image_field(mut payload: Multipart) -> Result<Option<ImageUpload>, AppError> {
    let mut upload = None;

    while let Some(field) = payload.next().await {
        let mut field = field.map_err(|e| AppError::validation(format!("Malformed multipart payload: {e}")))?;
        let is_image = upload.is_none() && field.name() == Some("image");
        let mut image = ImageUpload {
            content_type: field.content_type().map(|mime| mime.essence_str().to_string()),
            bytes: Vec::new(),
            size: 0,
        };

        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::validation(format!("Malformed multipart payload: {e}")))?;
            if !is_image {
                continue;
            }
            image.size += chunk.len();
            if image.bytes.len() <= MAX_IMAGE_BYTES {
                let room = MAX_IMAGE_BYTES + 1 - image.bytes.len();
                image.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
            }
        }

        if is_image {
            upload = Some(image);
        }
    }

    Ok(upload)
}
