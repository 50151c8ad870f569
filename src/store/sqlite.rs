//! SQLite-backed implementation of [`CrmStore`].
//!
//! All timestamps are stored as fixed-width RFC 3339 TEXT (UTC, microsecond
//! precision) so that bound-parameter comparisons and `date()` both behave.
//! Tag membership lives in the `contact_tags` join table; contact deletion
//! and orphan-tag cleanup share one transaction.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::traits::{
    Activity, CompanyCount, Contact, ContactPage, ContactQuery, ContactUpdate, Conversation,
    CrmStore, DayCount, DuplicateContact, ImportOutcome, NewContact, ProfileUpdate, SearchResults,
    Tag, TagCount, UserRecord, VerifiedIdentity,
};

pub const DEFAULT_TAG_COLOR: &str = "#3b82f6";

pub struct SqliteStore {
    pool: SqlitePool,
}

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

#[derive(sqlx::FromRow)]
struct ContactRow {
    id: String,
    user_id: String,
    name: String,
    email: String,
    phone: String,
    company: String,
    note: String,
    last_interaction: String,
    created_at: String,
    updated_at: String,
}

impl ContactRow {
    fn into_contact(self, tags: Vec<String>) -> anyhow::Result<Contact> {
        Ok(Contact {
            id: self.id,
            user: self.user_id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            company: self.company,
            tags,
            note: self.note,
            last_interaction: parse_ts(&self.last_interaction)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TagRow {
    id: String,
    user_id: String,
    name: String,
    color: String,
}

impl From<TagRow> for Tag {
    fn from(r: TagRow) -> Self {
        Tag {
            id: r.id,
            user: r.user_id,
            name: r.name,
            color: r.color,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: i64,
    user_id: String,
    contact_id: Option<String>,
    activity_type: String,
    details: String,
    created_at: String,
}

impl ActivityRow {
    fn into_activity(self) -> anyhow::Result<Activity> {
        Ok(Activity {
            id: self.id,
            user: self.user_id,
            contact_id: self.contact_id,
            activity_type: self.activity_type,
            details: self.details,
            timestamp: parse_ts(&self.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    uid: String,
    name: String,
    email: String,
    phone: String,
    company: String,
    avatar_url: String,
    created_at: String,
    updated_at: String,
}

impl UserRow {
    fn into_user(self) -> anyhow::Result<UserRecord> {
        Ok(UserRecord {
            uid: self.uid,
            name: self.name,
            email: self.email,
            phone: self.phone,
            company: self.company,
            avatar_url: self.avatar_url,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: String,
    user_id: String,
    conversation_id: String,
    title: String,
    messages: String,
    created_at: String,
    updated_at: String,
}

impl ConversationRow {
    fn into_conversation(self) -> anyhow::Result<Conversation> {
        Ok(Conversation {
            id: self.id,
            user: self.user_id,
            conversation_id: self.conversation_id,
            title: self.title,
            messages: serde_json::from_str(&self.messages)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Tag names per contact for a user, ordered by attach position.
    async fn tag_names_by_contact(
        &self,
        uid: &str,
    ) -> anyhow::Result<HashMap<String, Vec<String>>> {
        let rows = sqlx::query(
            "SELECT ct.contact_id, t.name FROM contact_tags ct
             JOIN tags t ON t.id = ct.tag_id
             WHERE ct.user_id = ?
             ORDER BY ct.contact_id, ct.position",
        )
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;

        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let contact_id: String = row.try_get("contact_id")?;
            let name: String = row.try_get("name")?;
            map.entry(contact_id).or_default().push(name);
        }
        Ok(map)
    }

    async fn rows_to_contacts(&self, uid: &str, rows: Vec<ContactRow>) -> anyhow::Result<Vec<Contact>> {
        let mut tag_map = self.tag_names_by_contact(uid).await?;
        rows.into_iter()
            .map(|r| {
                let tags = tag_map.remove(&r.id).unwrap_or_default();
                r.into_contact(tags)
            })
            .collect()
    }
}

/// Upsert a tag by (user, name) inside a transaction and return its id.
async fn ensure_tag(
    tx: &mut Transaction<'_, Sqlite>,
    uid: &str,
    name: &str,
) -> anyhow::Result<String> {
    sqlx::query(
        "INSERT OR IGNORE INTO tags (id, user_id, name, color, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(uid)
    .bind(name)
    .bind(DEFAULT_TAG_COLOR)
    .bind(ts(Utc::now()))
    .execute(&mut **tx)
    .await?;

    let id: String = sqlx::query_scalar("SELECT id FROM tags WHERE user_id = ? AND name = ?")
        .bind(uid)
        .bind(name)
        .fetch_one(&mut **tx)
        .await?;
    Ok(id)
}

/// Replace a contact's tag set, creating missing tags with the default color.
async fn set_contact_tags(
    tx: &mut Transaction<'_, Sqlite>,
    uid: &str,
    contact_id: &str,
    names: &[String],
) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM contact_tags WHERE contact_id = ?")
        .bind(contact_id)
        .execute(&mut **tx)
        .await?;

    for (position, name) in names.iter().enumerate() {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let tag_id = ensure_tag(tx, uid, name).await?;
        sqlx::query(
            "INSERT OR IGNORE INTO contact_tags (user_id, contact_id, tag_id, position)
             VALUES (?, ?, ?, ?)",
        )
        .bind(uid)
        .bind(contact_id)
        .bind(&tag_id)
        .bind(position as i64)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Delete the given tags if no contact of the user still references them.
/// Runs inside the same transaction as the contact mutation that freed them.
async fn delete_orphaned_tags(
    tx: &mut Transaction<'_, Sqlite>,
    uid: &str,
    tag_ids: &[String],
) -> anyhow::Result<()> {
    if tag_ids.is_empty() {
        return Ok(());
    }
    let sql = format!(
        "DELETE FROM tags WHERE user_id = ? AND id IN ({})
         AND NOT EXISTS (SELECT 1 FROM contact_tags WHERE contact_tags.tag_id = tags.id)",
        placeholders(tag_ids.len())
    );
    let mut q = sqlx::query(&sql).bind(uid);
    for id in tag_ids {
        q = q.bind(id);
    }
    q.execute(&mut **tx).await?;
    Ok(())
}

async fn tag_ids_for_contacts(
    tx: &mut Transaction<'_, Sqlite>,
    uid: &str,
    contact_ids: &[String],
) -> anyhow::Result<Vec<String>> {
    if contact_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT DISTINCT tag_id FROM contact_tags WHERE user_id = ? AND contact_id IN ({})",
        placeholders(contact_ids.len())
    );
    let mut q = sqlx::query_scalar::<_, String>(&sql).bind(uid);
    for id in contact_ids {
        q = q.bind(id);
    }
    Ok(q.fetch_all(&mut **tx).await?)
}

#[async_trait]
impl CrmStore for SqliteStore {
    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    async fn upsert_user(&self, identity: &VerifiedIdentity) -> anyhow::Result<UserRecord> {
        let now = ts(Utc::now());
        // First verification creates the row; later ones leave it untouched
        // so profile edits survive re-login.
        sqlx::query(
            "INSERT INTO users (uid, name, email, phone, company, avatar_url, created_at, updated_at)
             VALUES (?, ?, ?, '', '', ?, ?, ?)
             ON CONFLICT(uid) DO NOTHING",
        )
        .bind(&identity.uid)
        .bind(identity.name.as_deref().unwrap_or(""))
        .bind(identity.email.as_deref().unwrap_or(""))
        .bind(identity.picture.as_deref().unwrap_or(""))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE uid = ?")
            .bind(&identity.uid)
            .fetch_one(&self.pool)
            .await?;
        row.into_user()
    }

    async fn get_user(&self, uid: &str) -> anyhow::Result<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE uid = ?")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;
        row.map(UserRow::into_user).transpose()
    }

    async fn update_profile(
        &self,
        uid: &str,
        update: &ProfileUpdate,
    ) -> anyhow::Result<Option<UserRecord>> {
        let result = sqlx::query(
            "UPDATE users SET name = ?, email = ?, phone = ?, company = ?,
             avatar_url = COALESCE(?, avatar_url), updated_at = ?
             WHERE uid = ?",
        )
        .bind(update.name.trim())
        .bind(update.email.trim())
        .bind(&update.phone)
        .bind(&update.company)
        .bind(update.avatar_url.as_deref())
        .bind(ts(Utc::now()))
        .bind(uid)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_user(uid).await
    }

    // -----------------------------------------------------------------------
    // Contacts
    // -----------------------------------------------------------------------

    async fn create_contact(&self, uid: &str, input: &NewContact) -> anyhow::Result<Contact> {
        let id = Uuid::new_v4().to_string();
        let now = ts(Utc::now());

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO contacts
             (id, user_id, name, email, phone, company, note, last_interaction, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(uid)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.company)
        .bind(&input.note)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        set_contact_tags(&mut tx, uid, &id, &input.tags).await?;
        tx.commit().await?;

        self.get_contact(uid, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("contact vanished after insert"))
    }

    async fn list_contacts(&self, uid: &str, query: &ContactQuery) -> anyhow::Result<ContactPage> {
        let limit = if query.limit == 0 { 10 } else { query.limit } as i64;
        let page = query.page.max(1) as i64;
        let offset = (page - 1) * limit;

        let mut conditions = String::new();
        let mut binds: Vec<String> = vec![uid.to_string()];

        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            conditions.push_str(
                " AND (name LIKE '%'||?||'%' COLLATE NOCASE
                   OR email LIKE '%'||?||'%' COLLATE NOCASE
                   OR phone LIKE '%'||?||'%' COLLATE NOCASE
                   OR company LIKE '%'||?||'%' COLLATE NOCASE)",
            );
            for _ in 0..4 {
                binds.push(search.to_string());
            }
        }

        if !query.tags.is_empty() {
            conditions.push_str(&format!(
                " AND id IN (SELECT ct.contact_id FROM contact_tags ct
                     JOIN tags t ON t.id = ct.tag_id
                     WHERE ct.user_id = ? AND t.name IN ({}))",
                placeholders(query.tags.len())
            ));
            binds.push(uid.to_string());
            binds.extend(query.tags.iter().cloned());
        }

        let count_sql = format!(
            "SELECT COUNT(*) FROM contacts WHERE user_id = ?{}",
            conditions
        );
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for b in &binds {
            count_q = count_q.bind(b);
        }
        let total_contacts = count_q.fetch_one(&self.pool).await?;

        let sql = format!(
            "SELECT * FROM contacts WHERE user_id = ?{}
             ORDER BY created_at DESC LIMIT ? OFFSET ?",
            conditions
        );
        let mut q = sqlx::query_as::<_, ContactRow>(&sql);
        for b in &binds {
            q = q.bind(b);
        }
        let rows = q.bind(limit).bind(offset).fetch_all(&self.pool).await?;

        let contacts = self.rows_to_contacts(uid, rows).await?;
        Ok(ContactPage {
            contacts,
            total_contacts,
        })
    }

    async fn get_contact(&self, uid: &str, id: &str) -> anyhow::Result<Option<Contact>> {
        let row = sqlx::query_as::<_, ContactRow>(
            "SELECT * FROM contacts WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let tags: Vec<String> = sqlx::query_scalar(
            "SELECT t.name FROM contact_tags ct
             JOIN tags t ON t.id = ct.tag_id
             WHERE ct.contact_id = ?
             ORDER BY ct.position",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(row.into_contact(tags)?))
    }

    async fn update_contact(
        &self,
        uid: &str,
        id: &str,
        update: &ContactUpdate,
    ) -> anyhow::Result<Option<Contact>> {
        let result = sqlx::query(
            "UPDATE contacts SET name = ?, email = ?, phone = ?, company = ?, note = ?,
             last_interaction = ?, updated_at = ?
             WHERE id = ? AND user_id = ?",
        )
        .bind(&update.name)
        .bind(&update.email)
        .bind(&update.phone)
        .bind(&update.company)
        .bind(&update.note)
        .bind(ts(Utc::now()))
        .bind(ts(Utc::now()))
        .bind(id)
        .bind(uid)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_contact(uid, id).await
    }

    async fn delete_contact(&self, uid: &str, id: &str) -> anyhow::Result<Option<Contact>> {
        let Some(contact) = self.get_contact(uid, id).await? else {
            return Ok(None);
        };

        let mut tx = self.pool.begin().await?;
        let freed_tags = tag_ids_for_contacts(&mut tx, uid, &[id.to_string()]).await?;

        sqlx::query("DELETE FROM contacts WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(uid)
            .execute(&mut *tx)
            .await?;

        // Join rows are gone via cascade; now drop tags nobody references.
        delete_orphaned_tags(&mut tx, uid, &freed_tags).await?;
        tx.commit().await?;

        Ok(Some(contact))
    }

    async fn delete_contacts(&self, uid: &str, ids: &[String]) -> anyhow::Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let freed_tags = tag_ids_for_contacts(&mut tx, uid, ids).await?;

        let sql = format!(
            "DELETE FROM contacts WHERE user_id = ? AND id IN ({})",
            placeholders(ids.len())
        );
        let mut q = sqlx::query(&sql).bind(uid);
        for id in ids {
            q = q.bind(id);
        }
        let deleted = q.execute(&mut *tx).await?.rows_affected();

        delete_orphaned_tags(&mut tx, uid, &freed_tags).await?;
        tx.commit().await?;

        Ok(deleted)
    }

    async fn import_contacts(
        &self,
        uid: &str,
        contacts: &[NewContact],
    ) -> anyhow::Result<ImportOutcome> {
        // Duplicate detection is by (user, email) against what is already
        // stored; the schema itself does not enforce uniqueness.
        let emails: Vec<String> = contacts.iter().map(|c| c.email.clone()).collect();
        let existing: HashSet<String> = if emails.is_empty() {
            HashSet::new()
        } else {
            let sql = format!(
                "SELECT email FROM contacts WHERE user_id = ? AND email IN ({})",
                placeholders(emails.len())
            );
            let mut q = sqlx::query_scalar::<_, String>(&sql).bind(uid);
            for email in &emails {
                q = q.bind(email);
            }
            q.fetch_all(&self.pool).await?.into_iter().collect()
        };

        let mut duplicates = Vec::new();
        let mut inserted_ids = Vec::new();

        let mut tx = self.pool.begin().await?;
        for contact in contacts {
            if existing.contains(&contact.email) {
                duplicates.push(DuplicateContact {
                    name: contact.name.clone(),
                    email: contact.email.clone(),
                });
                continue;
            }
            let id = Uuid::new_v4().to_string();
            let now = ts(Utc::now());
            sqlx::query(
                "INSERT INTO contacts
                 (id, user_id, name, email, phone, company, note, last_interaction, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(uid)
            .bind(&contact.name)
            .bind(&contact.email)
            .bind(&contact.phone)
            .bind(&contact.company)
            .bind(&contact.note)
            .bind(&now)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            set_contact_tags(&mut tx, uid, &id, &contact.tags).await?;
            inserted_ids.push(id);
        }
        tx.commit().await?;

        let mut imported = Vec::with_capacity(inserted_ids.len());
        for id in &inserted_ids {
            if let Some(contact) = self.get_contact(uid, id).await? {
                imported.push(contact);
            }
        }

        Ok(ImportOutcome {
            imported,
            duplicates,
        })
    }

    async fn recent_contacts(&self, uid: &str, limit: u32) -> anyhow::Result<Vec<Contact>> {
        let rows = sqlx::query_as::<_, ContactRow>(
            "SELECT * FROM contacts WHERE user_id = ?
             ORDER BY last_interaction DESC LIMIT ?",
        )
        .bind(uid)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        self.rows_to_contacts(uid, rows).await
    }

    async fn contact_count(&self, uid: &str) -> anyhow::Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM contacts WHERE user_id = ?")
                .bind(uid)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn distinct_company_count(&self, uid: &str) -> anyhow::Result<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(DISTINCT company) FROM contacts WHERE user_id = ? AND company <> ''",
        )
        .bind(uid)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn top_companies(&self, uid: &str, limit: u32) -> anyhow::Result<Vec<CompanyCount>> {
        let rows = sqlx::query(
            "SELECT company, COUNT(*) AS cnt FROM contacts
             WHERE user_id = ? AND company <> ''
             GROUP BY company ORDER BY cnt DESC LIMIT ?",
        )
        .bind(uid)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(CompanyCount {
                    name: row.try_get("company")?,
                    count: row.try_get("cnt")?,
                })
            })
            .collect()
    }

    async fn contacts_created_between(
        &self,
        uid: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM contacts
             WHERE user_id = ? AND created_at >= ? AND created_at <= ?",
        )
        .bind(uid)
        .bind(ts(from))
        .bind(ts(to))
        .fetch_one(&self.pool)
        .await?)
    }

    async fn contacts_per_day(
        &self,
        uid: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<DayCount>> {
        let rows = sqlx::query(
            "SELECT date(created_at) AS day, COUNT(*) AS cnt FROM contacts
             WHERE user_id = ? AND created_at >= ? AND created_at <= ?
             GROUP BY day ORDER BY day",
        )
        .bind(uid)
        .bind(ts(from))
        .bind(ts(to))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(DayCount {
                    date: row.try_get("day")?,
                    count: row.try_get("cnt")?,
                })
            })
            .collect()
    }

    async fn tag_distribution(&self, uid: &str) -> anyhow::Result<Vec<TagCount>> {
        let rows = sqlx::query(
            "SELECT t.name AS name, COUNT(*) AS cnt FROM contact_tags ct
             JOIN tags t ON t.id = ct.tag_id
             WHERE ct.user_id = ?
             GROUP BY t.name ORDER BY cnt DESC",
        )
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(TagCount {
                    name: row.try_get("name")?,
                    count: row.try_get("cnt")?,
                })
            })
            .collect()
    }

    async fn all_contact_tags(&self, uid: &str) -> anyhow::Result<Vec<Vec<String>>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM contacts WHERE user_id = ?")
            .bind(uid)
            .fetch_all(&self.pool)
            .await?;
        let mut tag_map = self.tag_names_by_contact(uid).await?;
        Ok(ids
            .into_iter()
            .map(|id| tag_map.remove(&id).unwrap_or_default())
            .collect())
    }

    // -----------------------------------------------------------------------
    // Tags
    // -----------------------------------------------------------------------

    async fn ensure_tags_exist(&self, uid: &str, names: &[String]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for name in names {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            ensure_tag(&mut tx, uid, name).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn create_tag(
        &self,
        uid: &str,
        name: &str,
        color: &str,
    ) -> anyhow::Result<Option<Tag>> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO tags (id, user_id, name, color, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(uid)
        .bind(name)
        .bind(color)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let row = sqlx::query_as::<_, TagRow>(
            "SELECT id, user_id, name, color FROM tags WHERE user_id = ? AND name = ?",
        )
        .bind(uid)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(Some(row.into()))
    }

    async fn list_tags(&self, uid: &str) -> anyhow::Result<Vec<Tag>> {
        let rows = sqlx::query_as::<_, TagRow>(
            "SELECT id, user_id, name, color FROM tags WHERE user_id = ? ORDER BY name",
        )
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Tag::from).collect())
    }

    async fn get_tag(&self, uid: &str, id: &str) -> anyhow::Result<Option<Tag>> {
        let row = sqlx::query_as::<_, TagRow>(
            "SELECT id, user_id, name, color FROM tags WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Tag::from))
    }

    async fn update_tag(
        &self,
        uid: &str,
        id: &str,
        name: &str,
        color: &str,
    ) -> anyhow::Result<Option<Tag>> {
        let result = sqlx::query(
            "UPDATE tags SET name = ?, color = ? WHERE id = ? AND user_id = ?",
        )
        .bind(name)
        .bind(color)
        .bind(id)
        .bind(uid)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_tag(uid, id).await
    }

    async fn tag_contact_count(&self, uid: &str, tag_id: &str) -> anyhow::Result<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM contact_tags WHERE user_id = ? AND tag_id = ?",
        )
        .bind(uid)
        .bind(tag_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn delete_tag(&self, uid: &str, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM tags WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(uid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn force_delete_tag(&self, uid: &str, id: &str) -> anyhow::Result<i64> {
        let mut tx = self.pool.begin().await?;
        let contact_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM contact_tags WHERE user_id = ? AND tag_id = ?",
        )
        .bind(uid)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM contact_tags WHERE user_id = ? AND tag_id = ?")
            .bind(uid)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM tags WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(uid)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(contact_count)
    }

    // -----------------------------------------------------------------------
    // Activities
    // -----------------------------------------------------------------------

    async fn append_activity(
        &self,
        uid: &str,
        activity_type: &str,
        details: &str,
        contact_id: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO activities (user_id, contact_id, activity_type, details, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uid)
        .bind(contact_id)
        .bind(activity_type)
        .bind(details)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_activities(
        &self,
        uid: &str,
        page: u32,
        limit: u32,
    ) -> anyhow::Result<Vec<Activity>> {
        let limit = if limit == 0 { 5 } else { limit } as i64;
        let offset = (page.max(1) as i64 - 1) * limit;
        let rows = sqlx::query_as::<_, ActivityRow>(
            "SELECT * FROM activities WHERE user_id = ?
             ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(uid)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ActivityRow::into_activity).collect()
    }

    async fn recent_activities(&self, uid: &str, limit: u32) -> anyhow::Result<Vec<Activity>> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            "SELECT * FROM activities WHERE user_id = ?
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(uid)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ActivityRow::into_activity).collect()
    }

    async fn latest_activity_for_contact(
        &self,
        uid: &str,
        contact_id: &str,
    ) -> anyhow::Result<Option<Activity>> {
        let row = sqlx::query_as::<_, ActivityRow>(
            "SELECT * FROM activities WHERE user_id = ? AND contact_id = ?
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(uid)
        .bind(contact_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ActivityRow::into_activity).transpose()
    }

    async fn activity_count(&self, uid: &str) -> anyhow::Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM activities WHERE user_id = ?")
                .bind(uid)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn activities_between(
        &self,
        uid: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM activities
             WHERE user_id = ? AND created_at >= ? AND created_at <= ?",
        )
        .bind(uid)
        .bind(ts(from))
        .bind(ts(to))
        .fetch_one(&self.pool)
        .await?)
    }

    // -----------------------------------------------------------------------
    // Conversations
    // -----------------------------------------------------------------------

    async fn get_or_create_conversation(
        &self,
        uid: &str,
        conversation_id: &str,
    ) -> anyhow::Result<Conversation> {
        let now = Utc::now();
        // INSERT OR IGNORE makes concurrent first turns converge on one row.
        sqlx::query(
            "INSERT OR IGNORE INTO conversations
             (id, user_id, conversation_id, title, messages, created_at, updated_at)
             VALUES (?, ?, ?, ?, '[]', ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(uid)
        .bind(conversation_id)
        .bind(Conversation::default_title(now))
        .bind(ts(now))
        .bind(ts(now))
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, ConversationRow>(
            "SELECT * FROM conversations WHERE user_id = ? AND conversation_id = ?",
        )
        .bind(uid)
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await?;
        row.into_conversation()
    }

    async fn persist_conversation(&self, conversation: &Conversation) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE conversations SET messages = ?, title = ?, updated_at = ?
             WHERE user_id = ? AND conversation_id = ?",
        )
        .bind(serde_json::to_string(&conversation.messages)?)
        .bind(&conversation.title)
        .bind(ts(Utc::now()))
        .bind(&conversation.user)
        .bind(&conversation.conversation_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_conversations(&self, uid: &str) -> anyhow::Result<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            "SELECT * FROM conversations WHERE user_id = ? ORDER BY updated_at DESC",
        )
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(ConversationRow::into_conversation)
            .collect()
    }

    async fn get_conversation(
        &self,
        uid: &str,
        conversation_id: &str,
    ) -> anyhow::Result<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(
            "SELECT * FROM conversations WHERE user_id = ? AND conversation_id = ?",
        )
        .bind(uid)
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ConversationRow::into_conversation).transpose()
    }

    async fn delete_conversation(&self, uid: &str, conversation_id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "DELETE FROM conversations WHERE user_id = ? AND conversation_id = ?",
        )
        .bind(uid)
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_conversation_title(
        &self,
        uid: &str,
        conversation_id: &str,
        title: &str,
    ) -> anyhow::Result<Option<Conversation>> {
        let result = sqlx::query(
            "UPDATE conversations SET title = ?, updated_at = ?
             WHERE user_id = ? AND conversation_id = ?",
        )
        .bind(title)
        .bind(ts(Utc::now()))
        .bind(uid)
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_conversation(uid, conversation_id).await
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    async fn search(&self, uid: &str, q: &str) -> anyhow::Result<SearchResults> {
        let q = q.trim();
        if q.is_empty() {
            return Ok(SearchResults {
                contacts: Vec::new(),
                tags: Vec::new(),
                activities: Vec::new(),
            });
        }

        let contact_rows = sqlx::query_as::<_, ContactRow>(
            "SELECT * FROM contacts WHERE user_id = ?
             AND (name LIKE '%'||?||'%' COLLATE NOCASE
               OR email LIKE '%'||?||'%' COLLATE NOCASE)
             LIMIT 5",
        )
        .bind(uid)
        .bind(q)
        .bind(q)
        .fetch_all(&self.pool)
        .await?;
        let contacts = self.rows_to_contacts(uid, contact_rows).await?;

        let tag_rows = sqlx::query_as::<_, TagRow>(
            "SELECT id, user_id, name, color FROM tags WHERE user_id = ?
             AND name LIKE '%'||?||'%' COLLATE NOCASE LIMIT 5",
        )
        .bind(uid)
        .bind(q)
        .fetch_all(&self.pool)
        .await?;

        let activity_rows = sqlx::query_as::<_, ActivityRow>(
            "SELECT * FROM activities WHERE user_id = ?
             AND (details LIKE '%'||?||'%' COLLATE NOCASE
               OR activity_type LIKE '%'||?||'%' COLLATE NOCASE)
             ORDER BY created_at DESC LIMIT 5",
        )
        .bind(uid)
        .bind(q)
        .bind(q)
        .fetch_all(&self.pool)
        .await?;

        Ok(SearchResults {
            contacts,
            tags: tag_rows.into_iter().map(Tag::from).collect(),
            activities: activity_rows
                .into_iter()
                .map(ActivityRow::into_activity)
                .collect::<anyhow::Result<Vec<_>>>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_round_trip_and_sort_lexicographically() {
        use chrono::SubsecRound;
        let a = Utc::now().trunc_subsecs(6);
        let b = a + chrono::Duration::milliseconds(3);
        assert!(ts(a) < ts(b));
        assert_eq!(parse_ts(&ts(a)).unwrap(), a);
    }

    #[test]
    fn placeholder_list() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?,?,?");
    }
}
