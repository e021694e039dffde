//! Authorization checks shared by the services.
//!
//! The boundary authenticates callers; these checks re-validate identity
//! against the stored account before anything is mutated.

use serde_json::json;
use uuid::Uuid;

use crate::domain::Caller;
use crate::domain::entities::Account;
use crate::domain::store::{Query, ResourceStore};
use crate::error::AppError;

/// Loads an account that is live and active.
///
/// # Errors
///
/// - [`AppError::NotFound`] when no live account has this id
/// - [`AppError::Unauthorized`] when the account is deactivated
pub(crate) async fn active_account<S: ResourceStore>(
    store: &S,
    scope: &mut S::Scope,
    account_id: Uuid,
) -> Result<Account, AppError> {
    let account = store
        .get_one::<Account>(scope, &Query::by_id(account_id))
        .await?
        .ok_or_else(|| AppError::not_found("account not found", json!({ "account_id": account_id })))?;

    if !account.is_active {
        return Err(AppError::unauthorized(
            "account is not active",
            json!({ "account_id": account_id }),
        ));
    }

    Ok(account)
}

/// Mutations are only allowed on the caller's own account.
pub(crate) fn require_owner(caller: &Caller, account_id: Uuid) -> Result<(), AppError> {
    if !caller.is(account_id) {
        return Err(AppError::unauthorized(
            "caller does not own this account",
            json!({ "account_id": account_id }),
        ));
    }
    Ok(())
}

/// Reads are allowed for the owner and for admins.
pub(crate) fn require_viewer(caller: &Caller, owner_id: Uuid) -> Result<(), AppError> {
    if !caller.can_view(owner_id) {
        return Err(AppError::unauthorized(
            "caller cannot view this account",
            json!({ "account_id": owner_id }),
        ));
    }
    Ok(())
}

/// Confirms the caller is an active admin according to the store, not just
/// according to the caller token.
pub(crate) async fn require_admin<S: ResourceStore>(
    store: &S,
    scope: &mut S::Scope,
    caller: &Caller,
) -> Result<Account, AppError> {
    if !caller.is_admin {
        return Err(AppError::unauthorized("admin privileges required", json!({})));
    }

    let account = active_account(store, scope, caller.account_id).await?;
    if !account.is_admin {
        return Err(AppError::unauthorized(
            "admin privileges required",
            json!({ "account_id": caller.account_id }),
        ));
    }

    Ok(account)
}
