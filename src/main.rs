use std::io;

use actix_web::{middleware, web, App, HttpServer};

use recipe_costing::config::Config;
use recipe_costing::db::Database;
use recipe_costing::handlers;
use recipe_costing::media::MediaStore;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::load().map_err(io::Error::other)?;

    // set up database connection pool, creating tables on first run
    let database = Database::connect(&config.database_url, config.pool_size).map_err(io::Error::other)?;
    let media = MediaStore::new(config.media_root.clone(), config.media_url.clone());

    log::info!(
        "starting HTTP server at http://{}:{}",
        config.bind_address,
        config.port
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(database.clone()))
            .app_data(web::Data::new(media.clone()))
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind((config.bind_address.as_str(), config.port))?
    .run()
    .await
}
