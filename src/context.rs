//! CRM context assembly for the chat assistant.
//!
//! Builds a bounded snapshot of the caller's CRM data and renders it into a
//! fixed-template system prompt. Failure here never fails the chat request:
//! the caller falls back to an ungrounded generic prompt.

use tracing::warn;

use crate::traits::{Activity, CompanyCount, Contact, CrmStore, Tag};

/// Most-recently-interacted contacts included in the snapshot.
pub const CONTACT_WINDOW: u32 = 50;
/// Most-recent activities included in the snapshot.
pub const ACTIVITY_WINDOW: u32 = 20;
/// Companies on the leaderboard.
pub const TOP_COMPANY_LIMIT: u32 = 10;

/// Contacts actually rendered into the prompt (the snapshot keeps more for
/// the context-size indicators).
const RENDERED_CONTACTS: usize = 10;
const RENDERED_ACTIVITIES: usize = 5;

#[derive(Debug, Clone)]
pub struct CrmSnapshot {
    pub contacts: Vec<Contact>,
    pub activities: Vec<Activity>,
    pub total_contacts: i64,
    pub companies_count: i64,
    pub tags_count: i64,
    pub top_companies: Vec<CompanyCount>,
    pub tags: Vec<Tag>,
}

/// Assemble the snapshot with concurrent sub-queries. Any failure degrades
/// to `None` rather than failing the chat turn.
pub async fn assemble(store: &dyn CrmStore, uid: &str) -> Option<CrmSnapshot> {
    let (contacts, activities, total_contacts, companies_count, top_companies, tags) = tokio::join!(
        store.recent_contacts(uid, CONTACT_WINDOW),
        store.recent_activities(uid, ACTIVITY_WINDOW),
        store.contact_count(uid),
        store.distinct_company_count(uid),
        store.top_companies(uid, TOP_COMPANY_LIMIT),
        store.list_tags(uid),
    );

    let snapshot = (|| -> anyhow::Result<CrmSnapshot> {
        let tags = tags?;
        Ok(CrmSnapshot {
            contacts: contacts?,
            activities: activities?,
            total_contacts: total_contacts?,
            companies_count: companies_count?,
            tags_count: tags.len() as i64,
            top_companies: top_companies?,
            tags,
        })
    })();

    match snapshot {
        Ok(s) => Some(s),
        Err(e) => {
            warn!("Failed to assemble CRM context for {}: {}", uid, e);
            None
        }
    }
}

/// Deterministic fixed-template rendering of the snapshot. With no snapshot,
/// a generic assistant prompt with no CRM grounding.
pub fn render_system_prompt(snapshot: Option<&CrmSnapshot>) -> String {
    let Some(ctx) = snapshot else {
        return "You are a helpful CRM assistant. Help users manage their contacts and business relationships.".to_string();
    };

    let companies = ctx
        .top_companies
        .iter()
        .map(|c| format!("- {}: {} contacts", c.name, c.count))
        .collect::<Vec<_>>()
        .join("\n");

    let contacts = ctx
        .contacts
        .iter()
        .take(RENDERED_CONTACTS)
        .map(|c| {
            let tags = if c.tags.is_empty() {
                String::new()
            } else {
                format!(" - Tags: {}", c.tags.join(", "))
            };
            format!("- {} ({}) at {}{}", c.name, c.email, c.company, tags)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let activities = ctx
        .activities
        .iter()
        .take(RENDERED_ACTIVITIES)
        .map(|a| {
            format!(
                "- {}: {} ({})",
                a.activity_type,
                a.details,
                a.timestamp.format("%Y-%m-%d")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let tags = ctx
        .tags
        .iter()
        .map(|t| format!("- {}", t.name))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an AI assistant for a CRM system. You have access to the user's CRM data and \
should provide helpful, contextual responses about their contacts, activities, and business \
relationships.

CURRENT CRM DATA SUMMARY:
- Total Contacts: {total}
- Companies: {companies_count}
- Tags: {tags_count}

TOP COMPANIES (by contact count):
{companies}

RECENT CONTACTS (last {contact_cap}):
{contacts}

RECENT ACTIVITIES (last {activity_cap}):
{activities}

AVAILABLE TAGS:
{tags}

You can help users with:
- Finding specific contacts or companies
- Analyzing contact data and relationships
- Suggesting follow-up actions
- Providing insights about their business network
- Managing tags and organization
- Tracking activities and interactions

When users ask about specific contacts, companies, or data, reference the actual information \
from their CRM. Be proactive in offering insights and suggestions based on their data.

If users ask about contacts or companies not in the current data, let them know you don't see \
that information in their current CRM data and suggest they check if it needs to be added.

Keep responses helpful, professional, and focused on CRM-related tasks.",
        total = ctx.total_contacts,
        companies_count = ctx.companies_count,
        tags_count = ctx.tags_count,
        companies = companies,
        contact_cap = RENDERED_CONTACTS,
        contacts = contacts,
        activity_cap = RENDERED_ACTIVITIES,
        activities = activities,
        tags = tags,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn contact(name: &str, email: &str, company: &str, tags: &[&str]) -> Contact {
        let now = Utc::now();
        Contact {
            id: uuid::Uuid::new_v4().to_string(),
            user: "u1".into(),
            name: name.into(),
            email: email.into(),
            phone: String::new(),
            company: company.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            note: String::new(),
            last_interaction: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn ungrounded_prompt_when_no_snapshot() {
        let prompt = render_system_prompt(None);
        assert!(prompt.starts_with("You are a helpful CRM assistant"));
        assert!(!prompt.contains("CURRENT CRM DATA SUMMARY"));
    }

    #[test]
    fn grounded_prompt_contains_counts_and_entries() {
        let snapshot = CrmSnapshot {
            contacts: vec![
                contact("Ada Lovelace", "ada@acme.dev", "Acme", &["vip"]),
                contact("Grace Hopper", "grace@navy.mil", "Navy", &[]),
            ],
            activities: vec![Activity {
                id: 1,
                user: "u1".into(),
                contact_id: None,
                activity_type: "CREATE_CONTACT".into(),
                details: "Created contact: \"Ada Lovelace\"".into(),
                timestamp: "2026-02-01T09:00:00Z".parse().unwrap(),
            }],
            total_contacts: 2,
            companies_count: 2,
            tags_count: 1,
            top_companies: vec![CompanyCount {
                name: "Acme".into(),
                count: 1,
            }],
            tags: vec![Tag {
                id: "t1".into(),
                user: "u1".into(),
                name: "vip".into(),
                color: "#3b82f6".into(),
            }],
        };

        let prompt = render_system_prompt(Some(&snapshot));
        assert!(prompt.contains("- Total Contacts: 2"));
        assert!(prompt.contains("- Acme: 1 contacts"));
        assert!(prompt.contains("- Ada Lovelace (ada@acme.dev) at Acme - Tags: vip"));
        assert!(prompt.contains("- Grace Hopper (grace@navy.mil) at Navy\n"));
        assert!(prompt.contains("- CREATE_CONTACT: Created contact: \"Ada Lovelace\" (2026-02-01)"));
        assert!(prompt.contains("AVAILABLE TAGS:\n- vip"));
    }

    #[test]
    fn rendered_contact_list_is_capped() {
        let contacts: Vec<Contact> = (0..50)
            .map(|i| contact(&format!("c{i}"), &format!("c{i}@x.io"), "X", &[]))
            .collect();
        let snapshot = CrmSnapshot {
            contacts,
            activities: Vec::new(),
            total_contacts: 1000,
            companies_count: 1,
            tags_count: 0,
            top_companies: Vec::new(),
            tags: Vec::new(),
        };
        let prompt = render_system_prompt(Some(&snapshot));
        let rendered = prompt
            .lines()
            .filter(|l| l.starts_with("- c") && l.contains("@x.io"))
            .count();
        assert_eq!(rendered, RENDERED_CONTACTS);
    }

    #[test]
    fn rendering_is_deterministic() {
        let snapshot = CrmSnapshot {
            contacts: vec![contact("Ada", "ada@acme.dev", "Acme", &["vip"])],
            activities: Vec::new(),
            total_contacts: 1,
            companies_count: 1,
            tags_count: 1,
            top_companies: Vec::new(),
            tags: Vec::new(),
        };
        assert_eq!(
            render_system_prompt(Some(&snapshot)),
            render_system_prompt(Some(&snapshot))
        );
    }
}
