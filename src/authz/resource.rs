use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::types::{Lifecycle, Organization, PermissionMap, Project, ResourceKind, User, Visibility};

/// A stored document the mutation guard can update.
pub trait Resource {
    const KIND: ResourceKind;

    fn resource_id(&self) -> String;
    fn lifecycle(&self) -> &Lifecycle;
    fn lifecycle_mut(&mut self) -> &mut Lifecycle;

    fn permissions_mut(&mut self) -> Option<&mut PermissionMap> {
        None
    }

    /// Sets a plain editable field. `permissions` and `archived` are handled
    /// by the guard and never reach this.
    fn set_field(&mut self, key: &str, value: &Value) -> Result<()>;
}

/// A resource carrying an embedded permission map.
pub trait Secured: Resource {
    fn permissions(&self) -> &PermissionMap;
}

fn expect_str<'a>(key: &str, value: &'a Value) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| Error::Validation(format!("{key} must be a string")))
}

fn expect_object(key: &str, value: &Value) -> Result<Map<String, Value>> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| Error::Validation(format!("{key} must be an object")))
}

fn expect_name(value: &Value) -> Result<String> {
    let name = expect_str("name", value)?;
    if name.trim().is_empty() {
        return Err(Error::Validation("name cannot be empty".to_string()));
    }
    Ok(name.to_string())
}

impl Resource for Organization {
    const KIND: ResourceKind = ResourceKind::Organization;

    fn resource_id(&self) -> String {
        self.id.clone()
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    fn permissions_mut(&mut self) -> Option<&mut PermissionMap> {
        Some(&mut self.permissions)
    }

    fn set_field(&mut self, key: &str, value: &Value) -> Result<()> {
        match key {
            "name" => self.name = expect_name(value)?,
            "custom" => self.custom = expect_object(key, value)?,
            _ => return Err(Error::ImmutableField(format!("{key} cannot be changed"))),
        }
        Ok(())
    }
}

impl Secured for Organization {
    fn permissions(&self) -> &PermissionMap {
        &self.permissions
    }
}

impl Resource for Project {
    const KIND: ResourceKind = ResourceKind::Project;

    fn resource_id(&self) -> String {
        self.full_id()
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    fn permissions_mut(&mut self) -> Option<&mut PermissionMap> {
        Some(&mut self.permissions)
    }

    fn set_field(&mut self, key: &str, value: &Value) -> Result<()> {
        match key {
            "name" => self.name = expect_name(value)?,
            "custom" => self.custom = expect_object(key, value)?,
            "visibility" => self.visibility = Visibility::parse(expect_str(key, value)?)?,
            _ => return Err(Error::ImmutableField(format!("{key} cannot be changed"))),
        }
        Ok(())
    }
}

impl Secured for Project {
    fn permissions(&self) -> &PermissionMap {
        &self.permissions
    }
}

impl Resource for User {
    const KIND: ResourceKind = ResourceKind::User;

    fn resource_id(&self) -> String {
        self.username.clone()
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    fn set_field(&mut self, key: &str, value: &Value) -> Result<()> {
        match key {
            "fname" => self.fname = expect_str(key, value)?.to_string(),
            "lname" => self.lname = expect_str(key, value)?.to_string(),
            "preferred_name" => self.preferred_name = expect_str(key, value)?.to_string(),
            "email" => self.email = expect_str(key, value)?.to_string(),
            "custom" => self.custom = expect_object(key, value)?,
            "admin" => {
                self.admin = value
                    .as_bool()
                    .ok_or_else(|| Error::Validation("admin must be a boolean".to_string()))?
            }
            _ => return Err(Error::ImmutableField(format!("{key} cannot be changed"))),
        }
        Ok(())
    }
}

/// One element of an update request: the target id plus the fields to change.
#[derive(Debug, Clone)]
pub struct UpdateInput {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl UpdateInput {
    /// Parses a partial resource object. The `id` key selects the target and is
    /// removed from the field set.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(Error::Validation("update must be an object".to_string()));
        };
        let id = match fields.remove("id") {
            Some(Value::String(id)) => id,
            Some(_) => return Err(Error::Validation("id must be a string".to_string())),
            None => return Err(Error::Validation("update is missing an id".to_string())),
        };
        Ok(Self { id, fields })
    }

    /// Parses a single object or an array of objects.
    pub fn many_from_value(value: Value) -> Result<Vec<Self>> {
        match value {
            Value::Array(items) => items.into_iter().map(Self::from_value).collect(),
            other => Ok(vec![Self::from_value(other)?]),
        }
    }
}
