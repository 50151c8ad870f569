use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A contact owned by one user. `tags` carries the tag names in the order
/// they were attached (the join table keeps a position column).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub user: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub tags: Vec<String>,
    pub note: String,
    pub last_interaction: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub user: String,
    pub name: String,
    pub color: String,
}

/// Append-only activity log row. Never mutated or deleted by normal flows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: i64,
    pub user: String,
    pub contact_id: Option<String>,
    pub activity_type: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub sender: Sender,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A chat conversation. Found-or-created per (user, conversation_id); grows
/// by append only. The full message array is rewritten on persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub user: String,
    pub conversation_id: String,
    pub title: String,
    pub messages: Vec<ChatTurn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Default title derived from the creation date.
    pub fn default_title(created_at: DateTime<Utc>) -> String {
        format!("Chat - {}", created_at.format("%Y-%m-%d"))
    }

    /// Append a timestamped turn in memory. Strict append order; no
    /// reordering, no deduplication.
    pub fn append(&mut self, sender: Sender, text: impl Into<String>) {
        self.messages.push(ChatTurn {
            sender,
            message: text.into(),
            timestamp: Utc::now(),
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub avatar_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Claims returned by the external identity provider for a valid credential.
/// The core only requires a stable subject id; the rest seeds the profile.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifiedIdentity {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Authenticated request subject, injected by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
}

// ---------------------------------------------------------------------------
// Store inputs/outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NewContact {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactUpdate {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Default)]
pub struct ContactQuery {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ContactPage {
    pub contacts: Vec<Contact>,
    pub total_contacts: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompanyCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateContact {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub imported: Vec<Contact>,
    pub duplicates: Vec<DuplicateContact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileUpdate {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub company: String,
    /// Durable avatar URL. Data-URL payloads are resolved through
    /// `MediaStorage` before this reaches the store.
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub contacts: Vec<Contact>,
    pub tags: Vec<Tag>,
    pub activities: Vec<Activity>,
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Persistence operations, all scoped by the owning user's uid. Entities are
/// created on first relevant user action, mutated only by the owning user's
/// requests, and deleted only by explicit delete operations.
#[async_trait]
pub trait CrmStore: Send + Sync {
    // Users
    async fn upsert_user(&self, identity: &VerifiedIdentity) -> anyhow::Result<UserRecord>;
    async fn get_user(&self, uid: &str) -> anyhow::Result<Option<UserRecord>>;
    async fn update_profile(
        &self,
        uid: &str,
        update: &ProfileUpdate,
    ) -> anyhow::Result<Option<UserRecord>>;

    // Contacts
    async fn create_contact(&self, uid: &str, input: &NewContact) -> anyhow::Result<Contact>;
    async fn list_contacts(&self, uid: &str, query: &ContactQuery) -> anyhow::Result<ContactPage>;
    async fn get_contact(&self, uid: &str, id: &str) -> anyhow::Result<Option<Contact>>;
    async fn update_contact(
        &self,
        uid: &str,
        id: &str,
        update: &ContactUpdate,
    ) -> anyhow::Result<Option<Contact>>;
    /// Deletes the contact and, in the same transaction, any of its tags
    /// left with zero referencing contacts. Returns the deleted contact.
    async fn delete_contact(&self, uid: &str, id: &str) -> anyhow::Result<Option<Contact>>;
    async fn delete_contacts(&self, uid: &str, ids: &[String]) -> anyhow::Result<u64>;
    async fn import_contacts(
        &self,
        uid: &str,
        contacts: &[NewContact],
    ) -> anyhow::Result<ImportOutcome>;
    async fn recent_contacts(&self, uid: &str, limit: u32) -> anyhow::Result<Vec<Contact>>;
    async fn contact_count(&self, uid: &str) -> anyhow::Result<i64>;
    async fn distinct_company_count(&self, uid: &str) -> anyhow::Result<i64>;
    async fn top_companies(&self, uid: &str, limit: u32) -> anyhow::Result<Vec<CompanyCount>>;
    async fn contacts_created_between(
        &self,
        uid: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<i64>;
    async fn contacts_per_day(
        &self,
        uid: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<DayCount>>;
    async fn tag_distribution(&self, uid: &str) -> anyhow::Result<Vec<TagCount>>;
    /// Tag-name lists for every contact of the user (dashboard pie chart).
    async fn all_contact_tags(&self, uid: &str) -> anyhow::Result<Vec<Vec<String>>>;

    // Tags
    async fn ensure_tags_exist(&self, uid: &str, names: &[String]) -> anyhow::Result<()>;
    /// Creates the tag unless one with that name already exists for the
    /// user. Returns `None` when it was a duplicate.
    async fn create_tag(&self, uid: &str, name: &str, color: &str)
        -> anyhow::Result<Option<Tag>>;
    async fn list_tags(&self, uid: &str) -> anyhow::Result<Vec<Tag>>;
    async fn get_tag(&self, uid: &str, id: &str) -> anyhow::Result<Option<Tag>>;
    async fn update_tag(
        &self,
        uid: &str,
        id: &str,
        name: &str,
        color: &str,
    ) -> anyhow::Result<Option<Tag>>;
    async fn tag_contact_count(&self, uid: &str, tag_id: &str) -> anyhow::Result<i64>;
    async fn delete_tag(&self, uid: &str, id: &str) -> anyhow::Result<bool>;
    /// Strips the tag from every referencing contact and deletes it, in one
    /// transaction. Returns the number of contacts it was removed from.
    async fn force_delete_tag(&self, uid: &str, id: &str) -> anyhow::Result<i64>;

    // Activities
    async fn append_activity(
        &self,
        uid: &str,
        activity_type: &str,
        details: &str,
        contact_id: Option<&str>,
    ) -> anyhow::Result<()>;
    async fn list_activities(
        &self,
        uid: &str,
        page: u32,
        limit: u32,
    ) -> anyhow::Result<Vec<Activity>>;
    async fn recent_activities(&self, uid: &str, limit: u32) -> anyhow::Result<Vec<Activity>>;
    async fn latest_activity_for_contact(
        &self,
        uid: &str,
        contact_id: &str,
    ) -> anyhow::Result<Option<Activity>>;
    async fn activity_count(&self, uid: &str) -> anyhow::Result<i64>;
    async fn activities_between(
        &self,
        uid: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<i64>;

    // Conversations
    async fn get_or_create_conversation(
        &self,
        uid: &str,
        conversation_id: &str,
    ) -> anyhow::Result<Conversation>;
    async fn persist_conversation(&self, conversation: &Conversation) -> anyhow::Result<()>;
    async fn list_conversations(&self, uid: &str) -> anyhow::Result<Vec<Conversation>>;
    async fn get_conversation(
        &self,
        uid: &str,
        conversation_id: &str,
    ) -> anyhow::Result<Option<Conversation>>;
    async fn delete_conversation(&self, uid: &str, conversation_id: &str) -> anyhow::Result<bool>;
    async fn set_conversation_title(
        &self,
        uid: &str,
        conversation_id: &str,
        title: &str,
    ) -> anyhow::Result<Option<Conversation>>;

    // Search
    async fn search(&self, uid: &str, q: &str) -> anyhow::Result<SearchResults>;
}

/// Verifies an opaque credential with the external identity provider and
/// returns a stable subject id. The core never manages passwords or sessions.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> anyhow::Result<VerifiedIdentity>;
}

/// External completion API: ordered role/content messages in, one reply out.
/// Treated as an opaque, fallible, rate-limited dependency.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, model: &str, messages: &[Value]) -> anyhow::Result<String>;
}

/// Object-storage collaborator: takes an image payload, returns a durable URL.
#[async_trait]
pub trait MediaStorage: Send + Sync {
    async fn store_avatar(&self, uid: &str, data_url: &str) -> anyhow::Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_title_uses_creation_date() {
        let created = "2026-03-05T10:30:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(Conversation::default_title(created), "Chat - 2026-03-05");
    }

    #[test]
    fn append_preserves_order() {
        let now = Utc::now();
        let mut conv = Conversation {
            id: "x".into(),
            user: "u1".into(),
            conversation_id: "abc".into(),
            title: Conversation::default_title(now),
            messages: vec![],
            created_at: now,
            updated_at: now,
        };
        conv.append(Sender::User, "hello");
        conv.append(Sender::Assistant, "hi there");
        conv.append(Sender::User, "bye");
        let senders: Vec<_> = conv.messages.iter().map(|m| m.sender).collect();
        assert_eq!(senders, vec![Sender::User, Sender::Assistant, Sender::User]);
        assert_eq!(conv.messages[2].message, "bye");
    }

    #[test]
    fn sender_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Sender::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Sender::Assistant).unwrap(),
            "\"assistant\""
        );
    }
}
