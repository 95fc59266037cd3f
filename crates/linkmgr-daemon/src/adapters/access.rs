//! Uid allow-list access control

use std::collections::HashSet;

use linkmgr_core::{
    domain::CallerId,
    ports::{IAccessControl, Permission},
};
use tracing::trace;

/// Grants every permission to the configured uids and nothing to anyone else
#[derive(Debug, Clone)]
pub struct UidAllowList {
    uids: HashSet<u32>,
}

impl UidAllowList {
    pub fn new(uids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            uids: uids.into_iter().collect(),
        }
    }
}

impl IAccessControl for UidAllowList {
    fn check(&self, caller: &CallerId, permission: Permission) -> bool {
        let granted = self.uids.contains(&caller.uid.as_raw());
        trace!(%caller, %permission, granted, "Access check");
        granted
    }
}
