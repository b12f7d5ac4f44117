use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// MARK: - Server operations

/// A feature a server may advertise support for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServerOperation {
    /// Client-side filtering (the v1 filters API)
    FiltersClient,
    /// Server-side filtering (the v2 filters API)
    FiltersServer,
    Other(String),
}

impl ServerOperation {
    pub fn as_str(&self) -> &str {
        match self {
            ServerOperation::FiltersClient => "org.joinmastodon.filters.client",
            ServerOperation::FiltersServer => "org.joinmastodon.filters.server",
            ServerOperation::Other(name) => name,
        }
    }
}

impl From<&str> for ServerOperation {
    fn from(value: &str) -> Self {
        match value {
            "org.joinmastodon.filters.client" => ServerOperation::FiltersClient,
            "org.joinmastodon.filters.server" => ServerOperation::FiltersServer,
            other => ServerOperation::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ServerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityParseError {
    #[error("invalid version '{0}'")]
    InvalidVersion(String),
    #[error("invalid version constraint '{0}'")]
    InvalidConstraint(String),
}

// MARK: - Versions

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for Version {
    type Err = CapabilityParseError;

    /// Accepts `1`, `1.2` and `1.2.3`; missing components are zero
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CapabilityParseError::InvalidVersion(s.to_string());
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }
        let mut parts = [0u64; 3];
        let mut count = 0;
        for component in trimmed.split('.') {
            if count == parts.len() {
                return Err(invalid());
            }
            parts[count] = component.parse::<u64>().map_err(|_| invalid())?;
            count += 1;
        }
        Ok(Version::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Greater,
    GreaterOrEqual,
    Equal,
    LessOrEqual,
    Less,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Comparator {
    comparison: Comparison,
    version: Version,
}

impl Comparator {
    fn matches(&self, version: &Version) -> bool {
        let ordering = version.cmp(&self.version);
        match self.comparison {
            Comparison::Greater => ordering == Ordering::Greater,
            Comparison::GreaterOrEqual => ordering != Ordering::Less,
            Comparison::Equal => ordering == Ordering::Equal,
            Comparison::LessOrEqual => ordering != Ordering::Greater,
            Comparison::Less => ordering == Ordering::Less,
        }
    }
}

/// A conjunction of comparators, e.g. `>=1.0.0` or `>=1.0.0 <2.0.0`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    comparators: Vec<Comparator>,
}

impl VersionConstraint {
    pub fn at_least(version: Version) -> Self {
        VersionConstraint {
            comparators: vec![Comparator {
                comparison: Comparison::GreaterOrEqual,
                version,
            }],
        }
    }

    pub fn is_satisfied_by(&self, version: &Version) -> bool {
        self.comparators.iter().all(|c| c.matches(version))
    }
}

impl FromStr for VersionConstraint {
    type Err = CapabilityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut comparators = Vec::new();
        for term in s.split(|c: char| c == ',' || c.is_whitespace()) {
            if term.is_empty() {
                continue;
            }
            // Two-character operators must be checked before their one-character prefixes
            let (comparison, rest) = if let Some(rest) = term.strip_prefix(">=") {
                (Comparison::GreaterOrEqual, rest)
            } else if let Some(rest) = term.strip_prefix("<=") {
                (Comparison::LessOrEqual, rest)
            } else if let Some(rest) = term.strip_prefix('>') {
                (Comparison::Greater, rest)
            } else if let Some(rest) = term.strip_prefix('<') {
                (Comparison::Less, rest)
            } else if let Some(rest) = term.strip_prefix('=') {
                (Comparison::Equal, rest)
            } else {
                (Comparison::Equal, term)
            };
            let version = rest
                .parse::<Version>()
                .map_err(|_| CapabilityParseError::InvalidConstraint(s.to_string()))?;
            comparators.push(Comparator {
                comparison,
                version,
            });
        }
        if comparators.is_empty() {
            return Err(CapabilityParseError::InvalidConstraint(s.to_string()));
        }
        Ok(VersionConstraint { comparators })
    }
}

// MARK: - Capability snapshot

/// What a server said it supports, fetched elsewhere and read-only here
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerCapabilities {
    operations: HashMap<ServerOperation, Version>,
}

impl ServerCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(mut self, operation: ServerOperation, version: Version) -> Self {
        self.operations.insert(operation, version);
        self
    }

    /// Builds a snapshot from `(operation id, version)` strings, as found in configuration
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, CapabilityParseError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut capabilities = ServerCapabilities::new();
        for (operation, version) in pairs {
            capabilities
                .operations
                .insert(ServerOperation::from(operation), version.parse()?);
        }
        Ok(capabilities)
    }

    pub fn can(&self, operation: &ServerOperation, constraint: &VersionConstraint) -> bool {
        self.operations
            .get(operation)
            .map_or(false, |version| constraint.is_satisfied_by(version))
    }
}

/// Whether hashtags can be muted with filters at all. A missing snapshot means no.
pub fn supports_filtering(
    capabilities: Option<&ServerCapabilities>,
    constraint: &VersionConstraint,
) -> bool {
    match capabilities {
        Some(server) => {
            server.can(&ServerOperation::FiltersClient, constraint)
                || server.can(&ServerOperation::FiltersServer, constraint)
        }
        None => false,
    }
}
