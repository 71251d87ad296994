use sqlx::SqlitePool;

/// Apply pending migrations, tracked in a `_migrations` table so each file
/// runs exactly once per database.
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    // WAL lets slot queries proceed while a booking transaction writes.
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    apply(pool, "001_init", include_str!("../migrations/001_init.sql")).await?;
    apply(pool, "002_seed", include_str!("../migrations/002_seed.sql")).await?;

    tracing::info!("Database migrations up to date");
    Ok(())
}

async fn apply(pool: &SqlitePool, name: &str, sql: &str) -> anyhow::Result<()> {
    let applied: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?")
            .bind(name)
            .fetch_one(pool)
            .await?;
    if applied {
        return Ok(());
    }

    for statement in sql.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }

    sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await?;
    tracing::info!("Applied migration: {}", name);
    Ok(())
}

/// Create the admin account from env configuration when it does not exist
/// yet. Keeps password hashes out of migration files.
pub async fn ensure_admin_account(
    pool: &SqlitePool,
    email: &str,
    password: &str,
) -> anyhow::Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;
    if exists {
        return Ok(());
    }

    sqlx::query(
        "INSERT INTO users (email, password_hash, full_name, role)
         VALUES (?, ?, 'Administrator', 'admin')",
    )
    .bind(email)
    .bind(crate::auth::hash_password(password))
    .execute(pool)
    .await?;

    tracing::info!("Created admin account {}", email);
    Ok(())
}

// ── Tests ──
