//! Pre-authenticated caller identity supplied by the boundary layer.

use uuid::Uuid;

/// Who is invoking an operation.
///
/// Token validation happens outside the core; services still re-check
/// ownership against the stored account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub account_id: Uuid,
    pub is_admin: bool,
}

impl Caller {
    pub fn account(account_id: Uuid) -> Self {
        Self {
            account_id,
            is_admin: false,
        }
    }

    pub fn admin(account_id: Uuid) -> Self {
        Self {
            account_id,
            is_admin: true,
        }
    }

    pub fn is(&self, account_id: Uuid) -> bool {
        self.account_id == account_id
    }

    /// Owners and admins may read an account's data.
    pub fn can_view(&self, owner_id: Uuid) -> bool {
        self.is_admin || self.is(owner_id)
    }
}
