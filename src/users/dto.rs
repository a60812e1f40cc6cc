use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::model::{Role, User};
use crate::users::policy;

/// Response envelope: every user payload is wrapped in `data`.
#[derive(Debug, Serialize)]
pub struct Data<T> {
    pub data: T,
}

impl<T> Data<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Public shape of a user. `api_key` and `role` are left out entirely
/// (not null) unless the viewer is an admin.
#[derive(Debug, Serialize)]
pub struct UserResource {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub external_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UserResource {
    pub fn for_viewer(user: User, viewer: &User) -> Self {
        let privileged = policy::can_see_privileged_fields(viewer);
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            phone_number: user.phone_number,
            api_key: privileged.then_some(user.api_key),
            role: privileged.then_some(user.role),
            external_id: user.external_id,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }

    pub fn collection(users: Vec<User>, viewer: &User) -> Vec<Self> {
        users
            .into_iter()
            .map(|u| Self::for_viewer(u, viewer))
            .collect()
    }
}
