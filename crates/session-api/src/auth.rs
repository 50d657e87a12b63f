//! Authorization of extension services

use std::collections::HashSet;
use tracing::debug;

use crate::errors::{Result, ServiceError};
use crate::types::ServiceId;

/// Decides whether a caller may act on sessions owned by a service id
pub trait AuthorizationCheck: Send + Sync {
    fn check(&self, service_id: &ServiceId) -> Result<()>;
}

/// Permits every service id
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AuthorizationCheck for AllowAll {
    fn check(&self, _service_id: &ServiceId) -> Result<()> {
        Ok(())
    }
}

/// Permits only the configured service ids
#[derive(Debug, Default, Clone)]
pub struct ServiceAllowList {
    allowed: HashSet<String>,
}

impl ServiceAllowList {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allow(&mut self, service_id: impl Into<String>) {
        self.allowed.insert(service_id.into());
    }
}

impl AuthorizationCheck for ServiceAllowList {
    fn check(&self, service_id: &ServiceId) -> Result<()> {
        if self.allowed.contains(service_id.as_str()) {
            return Ok(());
        }
        debug!(service_id = %service_id, "Extension not authorized");
        Err(ServiceError::permission_denied(format!(
            "extension {} is not authorized",
            service_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list() {
        let mut list = ServiceAllowList::new(["ext.game"]);
        assert!(list.check(&ServiceId("ext.game".into())).is_ok());
        assert!(matches!(
            list.check(&ServiceId("ext.chess".into())),
            Err(ServiceError::PermissionDenied { .. })
        ));
        list.allow("ext.chess");
        assert!(list.check(&ServiceId("ext.chess".into())).is_ok());
        assert!(AllowAll.check(&ServiceId("anything".into())).is_ok());
    }
}
