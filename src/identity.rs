//! Caller identity and the read-only user directory types
//!
//! Authentication happens outside the core. The caller hands in an [`Actor`]
//! and the engines run their own authorization checks against it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Farmer,
    Buyer,
    Student,
    Lecturer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Farmer => "FARMER",
            Role::Buyer => "BUYER",
            Role::Student => "STUDENT",
            Role::Lecturer => "LECTURER",
            Role::Admin => "ADMIN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "FARMER" => Some(Role::Farmer),
            "BUYER" => Some(Role::Buyer),
            "STUDENT" => Some(Role::Student),
            "LECTURER" => Some(Role::Lecturer),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Authenticated caller as supplied by the session collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn is(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

/// Directory entry for any platform user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub role: Role,
    pub display_name: String,

    /// Phone number or email used for notifications
    pub contact: Option<String>,

    /// Lecturers only
    pub institution: Option<String>,

    /// Declared skills, lowercase. Students only.
    pub tech_stack: Vec<String>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>, role: Role, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            display_name: display_name.into(),
            contact: None,
            institution: None,
            tech_stack: Vec::new(),
        }
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn with_institution(mut self, institution: impl Into<String>) -> Self {
        self.institution = Some(institution.into());
        self
    }

    pub fn with_tech_stack<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tech_stack = normalize_tags(tags);
        self
    }
}

/// Lowercase, trim and dedupe tech-stack tags, keeping first-seen order
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim().to_lowercase();
        if !tag.is_empty() && !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    normalized
}
