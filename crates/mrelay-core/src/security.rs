use crate::domain::UserId;

/// Operator allow-list check. An empty list authorizes nobody.
pub fn is_authorized(user_id: Option<UserId>, allowed_users: &[i64]) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    if allowed_users.is_empty() {
        return false;
    }
    allowed_users.contains(&user_id.0)
}

/// Callback buttons carry their owner; only that operator may press them.
pub fn owns_callback(presser: UserId, owner: UserId, allowed_users: &[i64]) -> bool {
    presser == owner && is_authorized(Some(presser), allowed_users)
}
