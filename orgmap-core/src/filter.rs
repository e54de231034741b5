use std::collections::BTreeSet;

const EXCLUDED_EXACT: &[&str] = &[
    "User",
    "Group",
    "CollaborationGroup",
    "AsyncApexJob",
    "CronTrigger",
    "EntitySubscription",
];

const EXCLUDED_PREFIXES: &[&str] = &[
    "Apex",
    "Auth",
    "ConnectedApplication",
    "ContentAsset",
    "Dashboard",
    "DataDetect",
    "Document",
    "Duplicate",
    "Email",
    "Entity",
    "External",
    "Flow",
    "Folder",
    "Installed",
    "Knowledge",
    "Login",
    "Matching",
    "Metadata",
    "Network",
    "Oauth",
    "Permission",
    "Platform",
    "Process",
    "Profile",
    "Queue",
    "RecordType",
    "Setup",
    "Site",
    "StaticResource",
    "UserPreference",
    "UserRole",
    "Vote",
];

const EXCLUDED_SUFFIXES: &[&str] = &[
    "History",
    "Share",
    "Feed",
    "Tag",
    "OwnerSharingRule",
    "ChangeEvent",
    "DataType",
];

/// Configuration and system objects never become graph nodes
pub fn is_config_object_name(name: &str) -> bool {
    let name = name.trim();
    name.is_empty()
        || EXCLUDED_EXACT.contains(&name)
        || EXCLUDED_PREFIXES.iter().any(|p| name.starts_with(p))
        || EXCLUDED_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Allow-list of object types a crawl may visit. Always holds the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedObjects {
    names: BTreeSet<String>,
}

impl TrackedObjects {
    pub fn new<I, S>(requested: I, root_object: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: BTreeSet<String> = requested
            .into_iter()
            .map(|n| n.as_ref().trim().to_string())
            .filter(|n| !is_config_object_name(n))
            .collect();
        names.insert(root_object.to_string());
        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Sorted names
    pub fn to_vec(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }
}
