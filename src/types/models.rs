use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::PermissionMap;
use crate::error::{Error, Result};

/// The authenticated caller, as resolved by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub admin: bool,
    #[serde(default)]
    pub archived: bool,
}

impl Principal {
    pub fn new(id: impl Into<String>, admin: bool) -> Self {
        Self {
            id: id.into(),
            admin,
            archived: false,
        }
    }
}

/// Bookkeeping fields shared by every stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub archived: bool,
    pub archived_by: Option<String>,
    pub archived_on: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_on: DateTime<Utc>,
    pub last_modified_by: Option<String>,
    pub updated_on: DateTime<Utc>,
}

impl Lifecycle {
    pub fn new(created_by: Option<&str>, now: DateTime<Utc>) -> Self {
        Self {
            archived: false,
            archived_by: None,
            archived_on: None,
            created_by: created_by.map(str::to_string),
            created_on: now,
            last_modified_by: created_by.map(str::to_string),
            updated_on: now,
        }
    }

    /// Flips the archived flag, stamping or clearing archived_by/archived_on.
    /// No-op when the flag already has the requested value.
    pub fn set_archived(&mut self, archived: bool, actor: &str, now: DateTime<Utc>) {
        if self.archived == archived {
            return;
        }
        self.archived = archived;
        if archived {
            self.archived_by = Some(actor.to_string());
            self.archived_on = Some(now);
        } else {
            self.archived_by = None;
            self.archived_on = None;
        }
    }

    pub fn touch(&mut self, actor: &str, now: DateTime<Utc>) {
        self.last_modified_by = Some(actor.to_string());
        self.updated_on = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Organization,
    Project,
    User,
}

impl ResourceKind {
    /// Keys a caller may set through an update.
    #[must_use]
    pub fn editable_fields(self) -> &'static [&'static str] {
        match self {
            ResourceKind::Organization => &["name", "custom", "permissions", "archived"],
            ResourceKind::Project => &["name", "custom", "permissions", "archived", "visibility"],
            ResourceKind::User => &[
                "fname",
                "lname",
                "preferred_name",
                "email",
                "custom",
                "archived",
                "admin",
            ],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Organization => "organization",
            ResourceKind::Project => "project",
            ResourceKind::User => "user",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub fname: String,
    #[serde(default)]
    pub lname: String,
    #[serde(default)]
    pub preferred_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub custom: Map<String, Value>,
    pub admin: bool,
    pub provider: String,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

impl User {
    pub fn new(username: impl Into<String>, admin: bool, created_by: Option<&str>) -> Self {
        Self {
            username: username.into(),
            fname: String::new(),
            lname: String::new(),
            preferred_name: String::new(),
            email: String::new(),
            custom: Map::new(),
            admin,
            provider: "local".to_string(),
            lifecycle: Lifecycle::new(created_by, Utc::now()),
        }
    }

    #[must_use]
    pub fn principal(&self) -> Principal {
        Principal {
            id: self.username.clone(),
            admin: self.admin,
            archived: self.lifecycle.archived,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub permissions: PermissionMap,
    #[serde(default)]
    pub custom: Map<String, Value>,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

impl Organization {
    pub fn new(id: impl Into<String>, name: impl Into<String>, created_by: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            permissions: PermissionMap::new(),
            custom: Map::new(),
            lifecycle: Lifecycle::new(created_by, Utc::now()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Internal,
}

impl Visibility {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Internal => "internal",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "private" => Ok(Visibility::Private),
            "internal" => Ok(Visibility::Internal),
            _ => Err(Error::Validation(format!(
                "visibility must be \"private\" or \"internal\", got \"{s}\""
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub org: String,
    pub name: String,
    pub permissions: PermissionMap,
    #[serde(default)]
    pub custom: Map<String, Value>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

impl Project {
    pub fn new(
        org: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
        created_by: Option<&str>,
    ) -> Self {
        Self {
            id: id.into(),
            org: org.into(),
            name: name.into(),
            permissions: PermissionMap::new(),
            custom: Map::new(),
            visibility: Visibility::Private,
            lifecycle: Lifecycle::new(created_by, Utc::now()),
        }
    }

    /// Composite id, scoped to the owning organization: `org:project`.
    #[must_use]
    pub fn full_id(&self) -> String {
        format!("{}:{}", self.org, self.id)
    }
}

/// Structural element owned by a project. Only the root elements seeded at
/// project creation are managed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub id: String,
    pub org: String,
    pub project: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub created_by: Option<String>,
    pub created_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}
