//! Agent build identification.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Version and build number of the running agent.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AgentVersion {
    version: String,
    build: String,
}

impl AgentVersion {
    /// Creates a version tag.
    #[must_use]
    pub fn new(version: impl Into<String>, build: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            build: build.into(),
        }
    }

    /// Returns the version tag of the crate that was compiled into this binary.
    #[must_use]
    pub fn current() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"), option_env!("FLEET_AGENT_BUILD").unwrap_or("dev"))
    }

    /// Returns the semantic version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the build identifier.
    #[must_use]
    pub fn build(&self) -> &str {
        &self.build
    }
}

impl Display for AgentVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.version, self.build)
    }
}
