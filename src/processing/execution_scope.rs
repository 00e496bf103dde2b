use std::fmt;
use uuid::Uuid;

use crate::resource::{ResourceId, ResourceSnapshot, ResourceVersion};
use crate::retry::RetryInfo;

/// Immutable input of one dispatcher execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionScope {
    /// Correlates the log lines of one execution
    pub execution_id: Uuid,
    pub resource: ResourceSnapshot,
    pub retry_info: Option<RetryInfo>,
}

impl ExecutionScope {
    pub fn new(resource: ResourceSnapshot, retry_info: Option<RetryInfo>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            resource,
            retry_info,
        }
    }

    pub fn resource_id(&self) -> &ResourceId {
        &self.resource.id
    }

    /// Version the execution started from
    pub fn version(&self) -> &ResourceVersion {
        &self.resource.version
    }
}

impl fmt::Display for ExecutionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.resource.id, self.resource.version)?;
        if let Some(info) = self.retry_info {
            write!(f, " (retry {}", info.attempt)?;
            if info.last_attempt {
                f.write_str(", last")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}
