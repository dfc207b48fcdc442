use std::time::Duration;

use actix_web::web;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection};
use failsafe::backoff::EqualJittered;
use failsafe::failure_policy::{ConsecutiveFailures, OrElse, SuccessRateOverTimeWindow};
use failsafe::{CircuitBreaker, Config, StateMachine};

use crate::error::AppError;

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;
pub type PooledConn = r2d2::PooledConnection<ConnectionManager<SqliteConnection>>;

type CircuitBreakerType = StateMachine<
    OrElse<SuccessRateOverTimeWindow<EqualJittered>, ConsecutiveFailures<EqualJittered>>,
    (),
>;

const SCHEMA: &str = include_str!("../migrations/0001_create_tables.sql");
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Applied to every connection the pool hands out. SQLite only honours
/// `ON DELETE CASCADE` when foreign keys are switched on per connection.
#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
            BUSY_TIMEOUT.as_millis()
        ))
        .map_err(r2d2::Error::QueryError)
    }
}

/// Connection pool guarded by a circuit breaker.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    circuit_breaker: CircuitBreakerType,
}

impl Database {
    pub fn connect(database_url: &str, pool_size: u32) -> Result<Self, AppError> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = r2d2::Pool::builder()
            .max_size(pool_size)
            .connection_customizer(Box::new(SqlitePragmas))
            .build(manager)?;

        let mut conn = pool.get()?;
        run_migrations(&mut conn)?;

        Ok(Self {
            pool,
            circuit_breaker: Config::new().build(),
        })
    }

    /// Runs `work` on a pooled connection off the async executor.
    ///
    /// Request-level failures pass straight through; pool, driver and I/O
    /// failures are recorded by the breaker, and once it opens every call is
    /// rejected with [`AppError::Unavailable`] until it lets a probe through.
    pub async fn run<F, R>(&self, work: F) -> Result<R, AppError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<R, AppError> + Send + 'static,
        R: Send + 'static,
    {
        let pool = self.pool.clone();
        let circuit_breaker = self.circuit_breaker.clone();

        web::block(move || {
            let result = circuit_breaker.call_with(AppError::is_infrastructure, || {
                let mut conn = pool.get()?;
                work(&mut conn)
            });

            match result {
                Ok(value) => Ok(value),
                Err(failsafe::Error::Inner(err)) => Err(err),
                Err(failsafe::Error::Rejected) => {
                    log::warn!("circuit breaker open, rejecting database call");
                    Err(AppError::Unavailable)
                }
            }
        })
        .await?
    }
}

pub fn run_migrations(conn: &mut SqliteConnection) -> QueryResult<()> {
    conn.batch_execute(SCHEMA)
}

/// Maps a unique-constraint violation to a validation error carrying
/// `message`; every other error converts as usual.
pub(crate) fn unique_violation(err: diesel::result::Error, message: &str) -> AppError {
    use diesel::result::{DatabaseErrorKind, Error};

    match err {
        Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => AppError::validation(message),
        other => other.into(),
    }
}
