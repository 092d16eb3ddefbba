//! Parsing destinations into routes.

use std::fmt;

/// What a routed message asks the store to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        })
    }
}

/// A destination parsed as `<prefix>.<resource>[.<id>].<action>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub resource: String,
    pub id: Option<String>,
    pub action: Action,
}

impl Route {
    /// Parse `destination` under `prefix`.
    ///
    /// `read` and `create` take no id; `update` and `delete` require one,
    /// which may itself contain dots. Anything else, including the
    /// client-scoped `<resource>.create.<clientId>` reply channels, yields
    /// `None`.
    pub fn parse(prefix: &str, destination: &str) -> Option<Route> {
        let rest = destination.strip_prefix(prefix)?.strip_prefix('.')?;
        let (resource, tail) = rest.split_once('.')?;
        if resource.is_empty() {
            return None;
        }

        let (id, action) = match tail.rsplit_once('.') {
            None => (None, tail),
            Some((id, action)) => (Some(id), action),
        };

        let action = match (action, id) {
            ("read", None) => Action::Read,
            ("create", None) => Action::Create,
            ("update", Some(id)) if !id.is_empty() => Action::Update,
            ("delete", Some(id)) if !id.is_empty() => Action::Delete,
            _ => return None,
        };

        Some(Route {
            resource: resource.to_string(),
            id: id.map(str::to_string),
            action,
        })
    }

    /// Destination this route was parsed from.
    pub fn destination(&self, prefix: &str) -> String {
        match &self.id {
            Some(id) => format!("{prefix}.{}.{id}.{}", self.resource, self.action),
            None => format!("{prefix}.{}.{}", self.resource, self.action),
        }
    }
}
