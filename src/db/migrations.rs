use sqlx::SqlitePool;
use tracing::info;

/// Centralized database migrations for all SQLite-backed tables.
///
/// Each migration is safe to call multiple times (idempotent) via
/// `IF NOT EXISTS`.
pub(crate) async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    migrate_users(pool).await?;
    migrate_contacts(pool).await?;
    migrate_tags(pool).await?;
    migrate_activities(pool).await?;
    migrate_conversations(pool).await?;
    Ok(())
}

async fn migrate_users(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            uid TEXT PRIMARY KEY,
            name TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT '',
            company TEXT NOT NULL DEFAULT '',
            avatar_url TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    info!("Users table migration complete");
    Ok(())
}

async fn migrate_contacts(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contacts (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT NOT NULL DEFAULT '',
            company TEXT NOT NULL DEFAULT '',
            note TEXT NOT NULL DEFAULT '',
            last_interaction TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_contacts_user_interaction
         ON contacts(user_id, last_interaction DESC)",
    )
    .execute(pool)
    .await?;

    // Import-path duplicate detection looks contacts up by (user, email).
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_contacts_user_email
         ON contacts(user_id, email)",
    )
    .execute(pool)
    .await?;

    info!("Contacts table migration complete");
    Ok(())
}

async fn migrate_tags(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            color TEXT NOT NULL DEFAULT '#3b82f6',
            created_at TEXT NOT NULL,
            UNIQUE(user_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Tag membership is an explicit join table rather than name strings on
    // the contact row. Cascading deletes keep it referentially consistent.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contact_tags (
            user_id TEXT NOT NULL,
            contact_id TEXT NOT NULL,
            tag_id TEXT NOT NULL,
            position INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (contact_id, tag_id),
            FOREIGN KEY (contact_id) REFERENCES contacts(id) ON DELETE CASCADE,
            FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_contact_tags_tag
         ON contact_tags(tag_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_contact_tags_user
         ON contact_tags(user_id)",
    )
    .execute(pool)
    .await?;

    info!("Tags tables migration complete");
    Ok(())
}

async fn migrate_activities(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS activities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            contact_id TEXT,
            activity_type TEXT NOT NULL,
            details TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_activities_user_time
         ON activities(user_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_activities_contact
         ON activities(contact_id) WHERE contact_id IS NOT NULL",
    )
    .execute(pool)
    .await?;

    info!("Activities table migration complete");
    Ok(())
}

async fn migrate_conversations(pool: &SqlitePool) -> anyhow::Result<()> {
    // The full message array is stored as JSON and rewritten on persist.
    // Concurrent turns on one conversation are last-write-wins.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            conversation_id TEXT NOT NULL,
            title TEXT NOT NULL,
            messages TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(user_id, conversation_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_conversations_user_updated
         ON conversations(user_id, updated_at DESC)",
    )
    .execute(pool)
    .await?;

    info!("Conversations table migration complete");
    Ok(())
}
