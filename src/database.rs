use sqlx::{postgres::PgPoolOptions, PgPool, Pool, Postgres};

use crate::{
    config::Config,
    models::Capability,
    utils::hash_password,
};

pub type Database = Pool<Postgres>;

pub async fn create_database_pool(config: &Config) -> Result<Database, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    // Test the connection
    sqlx::query("SELECT 1")
        .fetch_one(&pool)
        .await?;

    log::info!("connected to database");
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Creates the default permissions and the admin account when missing.
pub async fn seed_defaults(pool: &PgPool, config: &Config) -> anyhow::Result<()> {
    for capability in Capability::ALL {
        let created = sqlx::query(
            "INSERT INTO permissions (name, description) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING",
        )
        .bind(capability.name())
        .bind(capability.description())
        .execute(pool)
        .await?
        .rows_affected();

        if created > 0 {
            log::info!("created permission {}", capability.name());
        }
    }

    let admin_exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)",
    )
    .bind(&config.default_admin_username)
    .fetch_one(pool)
    .await?;

    if !admin_exists {
        let password_hash = hash_password(&config.default_admin_password)?;
        sqlx::query("INSERT INTO users (username, password_hash, is_admin) VALUES ($1, $2, TRUE)")
            .bind(&config.default_admin_username)
            .bind(password_hash)
            .execute(pool)
            .await?;
        log::info!("created admin account {}", config.default_admin_username);
    }

    Ok(())
}
