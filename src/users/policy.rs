//! Who may do what to which user.
//!
//! Every decision goes through [`allows`], which lets admins through before
//! looking at the ability. Denials from [`authorize`] become 403s; the role
//! restriction is reported by validation instead (see `validation`).
use crate::error::ApiError;
use crate::users::model::User;

#[derive(Debug, Clone, Copy)]
pub enum Ability<'a> {
    ListAll,
    Create,
    View(&'a User),
    Update(&'a User),
    SetRole,
}

impl Ability<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Ability::ListAll => "list_all",
            Ability::Create => "create",
            Ability::View(_) => "view",
            Ability::Update(_) => "update",
            Ability::SetRole => "set_role",
        }
    }
}

pub fn allows(principal: &User, ability: Ability<'_>) -> bool {
    if principal.role.is_admin() {
        return true;
    }
    match ability {
        Ability::ListAll | Ability::Create | Ability::SetRole => false,
        Ability::View(target) | Ability::Update(target) => target.id == principal.id,
    }
}

pub fn can_list_all(principal: &User) -> bool {
    allows(principal, Ability::ListAll)
}

pub fn can_create(principal: &User) -> bool {
    allows(principal, Ability::Create)
}

pub fn can_view(principal: &User, target: &User) -> bool {
    allows(principal, Ability::View(target))
}

pub fn can_update(principal: &User, target: &User) -> bool {
    allows(principal, Ability::Update(target))
}

pub fn can_set_role(principal: &User) -> bool {
    allows(principal, Ability::SetRole)
}

/// Privileged fields (`api_key`, `role`) are shown to admins only.
pub fn can_see_privileged_fields(viewer: &User) -> bool {
    viewer.role.is_admin()
}

/// Handler entry point: checks `ability` through its decision function.
pub fn authorize(principal: &User, ability: Ability<'_>) -> Result<(), ApiError> {
    let allowed = match ability {
        Ability::ListAll => can_list_all(principal),
        Ability::Create => can_create(principal),
        Ability::View(target) => can_view(principal, target),
        Ability::Update(target) => can_update(principal, target),
        Ability::SetRole => can_set_role(principal),
    };
    if allowed {
        Ok(())
    } else {
        tracing::warn!(principal_id = %principal.id, ability = ability.name(), "authorization denied");
        Err(ApiError::Forbidden)
    }
}
