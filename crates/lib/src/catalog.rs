//! Command catalog: the immutable table of permitted commands and their permitted arguments.
//!
//! Built once at startup from config and shared read-only (`Arc<CommandCatalog>`) by the
//! validator and the daemon. The gateway only ever sees the [`CommandListing`] projection.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One permitted command as written in config (`name`, `description`, `allowedArgs`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CommandSpec {
    /// Program name or path passed verbatim to the OS (e.g. "ls", "/usr/bin/uptime").
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Flat set of permitted arguments. Empty means the command takes no arguments.
    #[serde(default)]
    pub allowed_args: Vec<String>,
}

impl CommandSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        allowed_args: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            allowed_args: allowed_args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// True if `arg` is byte-for-byte one of the allowed arguments.
    pub fn allows(&self, arg: &str) -> bool {
        self.allowed_args.iter().any(|a| a == arg)
    }
}

/// Read-only projection of a catalog entry, served by `GET /commands`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandListing {
    pub name: String,
    pub description: String,
    pub allowed_args: Vec<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("command at position {0} has an empty name")]
    EmptyName(usize),
    #[error("command '{0}' is defined more than once")]
    DuplicateName(String),
}

/// Ordered, immutable set of [`CommandSpec`]s indexed by exact name.
#[derive(Debug, Clone, Default)]
pub struct CommandCatalog {
    specs: Vec<CommandSpec>,
    index: HashMap<String, usize>,
}

impl CommandCatalog {
    /// Build a catalog. Names must be non-empty and unique; repeated entries inside one
    /// `allowed_args` list are collapsed to their first occurrence.
    pub fn new(specs: Vec<CommandSpec>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(specs.len());
        let mut deduped = Vec::with_capacity(specs.len());
        for (pos, mut spec) in specs.into_iter().enumerate() {
            if spec.name.is_empty() {
                return Err(CatalogError::EmptyName(pos));
            }
            if index.insert(spec.name.clone(), pos).is_some() {
                return Err(CatalogError::DuplicateName(spec.name));
            }
            let before = spec.allowed_args.len();
            let mut seen = HashSet::with_capacity(before);
            spec.allowed_args.retain(|a| seen.insert(a.clone()));
            if spec.allowed_args.len() != before {
                log::warn!(
                    "command '{}': dropped {} repeated allowed argument(s)",
                    spec.name,
                    before - spec.allowed_args.len()
                );
            }
            deduped.push(spec);
        }
        Ok(Self {
            specs: deduped,
            index,
        })
    }

    /// Exact, case-sensitive lookup by command name.
    pub fn find(&self, name: &str) -> Option<&CommandSpec> {
        self.index.get(name).map(|&i| &self.specs[i])
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Projection for listing, in catalog order.
    pub fn listing(&self) -> Vec<CommandListing> {
        self.specs
            .iter()
            .map(|s| CommandListing {
                name: s.name.clone(),
                description: s.description.clone(),
                allowed_args: s.allowed_args.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_is_exact_and_case_sensitive() {
        let catalog =
            CommandCatalog::new(vec![CommandSpec::new("ls", "list", &["-l", "-a"])]).unwrap();
        assert!(catalog.find("ls").is_some());
        assert!(catalog.find("LS").is_none());
        assert!(catalog.find("ls ").is_none());
        assert!(catalog.find("").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = CommandCatalog::new(vec![
            CommandSpec::new("ls", "", &[]),
            CommandSpec::new("ls", "again", &["-l"]),
        ])
        .unwrap_err();
        assert_eq!(err, CatalogError::DuplicateName("ls".to_string()));
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = CommandCatalog::new(vec![
            CommandSpec::new("uptime", "", &[]),
            CommandSpec::new("", "", &[]),
        ])
        .unwrap_err();
        assert_eq!(err, CatalogError::EmptyName(1));
    }

    #[test]
    fn repeated_allowed_args_collapse() {
        let catalog =
            CommandCatalog::new(vec![CommandSpec::new("df", "", &["-h", "-h", "-i"])]).unwrap();
        assert_eq!(catalog.find("df").unwrap().allowed_args, vec!["-h", "-i"]);
    }

    #[test]
    fn listing_preserves_order_and_args() {
        let catalog = CommandCatalog::new(vec![
            CommandSpec::new("uptime", "load average", &[]),
            CommandSpec::new("ls", "list files", &["-l", "-a", "/tmp"]),
        ])
        .unwrap();
        let listing = catalog.listing();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].name, "uptime");
        assert!(listing[0].allowed_args.is_empty());
        assert_eq!(listing[1].description, "list files");
        assert_eq!(listing[1].allowed_args.len(), 3);
    }

    #[test]
    fn config_shape_deserializes() {
        let spec: CommandSpec = serde_json::from_str(
            r#"{"name":"ls","description":"list","allowedArgs":["-l"]}"#,
        )
        .unwrap();
        assert_eq!(spec, CommandSpec::new("ls", "list", &["-l"]));
        let bare: CommandSpec = serde_json::from_str(r#"{"name":"uptime"}"#).unwrap();
        assert!(bare.allowed_args.is_empty());
    }
}
