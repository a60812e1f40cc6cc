use serde_json::Value;
use tracing::{error, info, warn};

use super::{DirectoryClient, DirectoryError, DirectoryUser};
use crate::users::model::User;
use crate::users::repo::UserStore;

/// Pushes a freshly created user to the directory. Never fails: errors are
/// logged and the user is returned as-is. On success the directory's `id` is
/// stored as `external_id` and the updated record returned.
pub async fn sync_created_user(
    store: &dyn UserStore,
    directory: &dyn DirectoryClient,
    user: User,
) -> User {
    let payload = DirectoryUser::from(&user);
    info!(target: "user_directory", user_id = %user.id, payload = ?payload, "attempting user sync");

    let body = match directory.register_user(&payload).await {
        Ok(body) => body,
        Err(DirectoryError::Rejected { status, body }) => {
            warn!(target: "user_directory", user_id = %user.id, status, response = %body, "user sync failed");
            return user;
        }
        Err(e) => {
            warn!(target: "user_directory", user_id = %user.id, error = %e, "user sync failed");
            return user;
        }
    };

    info!(target: "user_directory", user_id = %user.id, response = %body, "user sync succeeded");

    let Some(external_id) = external_id(&body) else {
        warn!(target: "user_directory", user_id = %user.id, "directory response has no id");
        return user;
    };

    match store.set_external_id(user.id, &external_id).await {
        Ok(updated) => updated,
        Err(e) => {
            error!(target: "user_directory", user_id = %user.id, error = %e, "storing external id failed");
            user
        }
    }
}

fn external_id(body: &Value) -> Option<String> {
    match body.get("id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
