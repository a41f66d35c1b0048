use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Per-principal role sets embedded on an organization or project.
pub type PermissionMap = BTreeMap<String, RoleSet>;

/// A single role token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Read,
    Write,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Read, Role::Write, Role::Admin];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Read => "read",
            Role::Write => "write",
            Role::Admin => "admin",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Role::Read => 1 << 0,
            Role::Write => 1 << 1,
            Role::Admin => 1 << 2,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(Role::Read),
            "write" => Ok(Role::Write),
            "admin" => Ok(Role::Admin),
            _ => Err(Error::InvalidPermissionValue(s.to_string())),
        }
    }
}

/// RoleSet is a bitmask of granted roles. Stored sets are always cumulative:
/// admin implies write implies read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const EMPTY: RoleSet = RoleSet(0);
    pub const READ: RoleSet = RoleSet(Role::Read.bit());
    pub const WRITE: RoleSet = RoleSet(Role::Read.bit() | Role::Write.bit());
    pub const ADMIN: RoleSet = RoleSet(Role::Read.bit() | Role::Write.bit() | Role::Admin.bit());

    /// Cumulative role set for the given highest role.
    #[must_use]
    pub const fn for_role(role: Role) -> RoleSet {
        match role {
            Role::Read => Self::READ,
            Role::Write => Self::WRITE,
            Role::Admin => Self::ADMIN,
        }
    }

    #[must_use]
    pub const fn has(self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn union(self, other: RoleSet) -> RoleSet {
        RoleSet(self.0 | other.0)
    }

    /// Fills in the roles implied by the highest role present.
    #[must_use]
    pub fn expand_implied(self) -> RoleSet {
        match self.highest() {
            Some(role) => Self::for_role(role),
            None => Self::EMPTY,
        }
    }

    #[must_use]
    pub fn highest(self) -> Option<Role> {
        Role::ALL.into_iter().rev().find(|r| self.has(*r))
    }

    #[must_use]
    pub fn roles(self) -> Vec<Role> {
        Role::ALL.into_iter().filter(|r| self.has(*r)).collect()
    }

    #[must_use]
    pub fn to_strings(self) -> Vec<&'static str> {
        self.roles().into_iter().map(Role::as_str).collect()
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.to_strings().join(", "))
    }
}

impl Serialize for RoleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_strings().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RoleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let tokens = Vec::<String>::deserialize(deserializer)?;
        let mut set = RoleSet::EMPTY;
        for token in &tokens {
            let role = Role::from_str(token).map_err(serde::de::Error::custom)?;
            set = set.union(RoleSet(role.bit()));
        }
        Ok(set.expand_implied())
    }
}

/// The outcome of normalizing a permission token from user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleChange {
    Grant(RoleSet),
    RemoveAll,
}

pub const REMOVE_ALL: &str = "remove_all";

/// Maps an input token to the stored role set, or to a removal.
/// Accepts `read`, `write`, `admin` and `remove_all`, case-insensitively.
pub fn normalize_role(token: &str) -> Result<RoleChange> {
    if token.eq_ignore_ascii_case(REMOVE_ALL) {
        return Ok(RoleChange::RemoveAll);
    }
    let role = Role::from_str(token)?;
    Ok(RoleChange::Grant(RoleSet::for_role(role)))
}

/// Applies a normalized change to a permission map.
pub fn apply_role_change(map: &mut PermissionMap, username: &str, change: RoleChange) {
    match change {
        RoleChange::Grant(set) => {
            map.insert(username.to_string(), set);
        }
        RoleChange::RemoveAll => {
            map.remove(username);
        }
    }
}
