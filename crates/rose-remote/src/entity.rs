//! Server-side entity collections

use crate::error::ApiError;
use std::fmt;
use std::str::FromStr;

/// Record collection on the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    /// Scenario classes and instances
    Connections,
    Robots,
    BackendSystems,
}

impl Entity {
    /// All collections, in lookup order
    pub const ALL: [Entity; 3] = [Self::Connections, Self::Robots, Self::BackendSystems];

    /// Collection name used in REST paths
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connections => "connections",
            Self::Robots => "robots",
            Self::BackendSystems => "backend_systems",
        }
    }

    /// Resolve a user-facing alias
    ///
    /// `robot*` names robots, anything containing `system` names backend
    /// systems, and `connection*`, `scenario*` and `instances` name scenarios.
    #[must_use]
    pub fn resolve(alias: &str) -> Option<Self> {
        let name = alias.to_lowercase();
        if name.starts_with("robot") {
            Some(Self::Robots)
        } else if name.contains("system") {
            Some(Self::BackendSystems)
        } else if name.starts_with("connection") || name.starts_with("scenario") || name == "instances" {
            Some(Self::Connections)
        } else {
            None
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Entity {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s).ok_or_else(|| {
            ApiError::invalid(format!(
                "Unknown entity name \"{s}\"; has to be one of 'robots', 'backend_systems', or 'connections'."
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases() {
        assert_eq!(Entity::resolve("Robots"), Some(Entity::Robots));
        assert_eq!(Entity::resolve("robot"), Some(Entity::Robots));
        assert_eq!(Entity::resolve("systems"), Some(Entity::BackendSystems));
        assert_eq!(Entity::resolve("backend_systems"), Some(Entity::BackendSystems));
        assert_eq!(Entity::resolve("scenarios"), Some(Entity::Connections));
        assert_eq!(Entity::resolve("instances"), Some(Entity::Connections));
        assert_eq!(Entity::resolve("gadgets"), None);
    }

    #[test]
    fn unknown_alias_is_an_error() {
        assert!("gadgets".parse::<Entity>().is_err());
        assert_eq!("connections".parse::<Entity>().unwrap(), Entity::Connections);
    }
}
