use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{generate_api_key, password::hash_password, Principal},
    directory,
    error::ApiError,
    state::AppState,
    users::{
        dto::{Data, UserResource},
        model::{NewUserRecord, User},
        policy::{self, Ability},
        repo::StoreError,
        validation,
    },
};

/// Attempts at drawing an unused api key before giving up.
const API_KEY_ATTEMPTS: usize = 3;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(index).post(store))
        .route("/users/:id", get(show).put(update))
}

#[instrument(skip(state, principal), fields(principal_id = %principal.user().id))]
pub async fn index(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Data<Vec<UserResource>>>, ApiError> {
    let viewer = principal.user();
    policy::authorize(viewer, Ability::ListAll)?;

    let users = state.store.list().await?;
    info!(count = users.len(), "users listed");
    Ok(Json(Data::new(UserResource::collection(users, viewer))))
}

#[instrument(skip(state, principal, body), fields(principal_id = %principal.user().id))]
pub async fn store(
    State(state): State<AppState>,
    principal: Principal,
    body: Bytes,
) -> Result<(StatusCode, Json<Data<UserResource>>), ApiError> {
    let viewer = principal.user();
    policy::authorize(viewer, Ability::Create)?;

    let payload = object_body(&body)?;
    let new_user = validation::validate_create(&payload).map_err(|errors| {
        warn!(fields = ?errors.fields().collect::<Vec<_>>(), "create payload rejected");
        errors
    })?;

    let password_hash = hash_password(&new_user.password)?;
    let mut attempt = 0;
    let user = loop {
        attempt += 1;
        let record = NewUserRecord {
            name: new_user.name.clone(),
            email: new_user.email.clone(),
            password_hash: password_hash.clone(),
            phone_number: new_user.phone_number.clone(),
            api_key: generate_api_key(),
            role: new_user.role,
        };
        match state.store.create(record).await {
            Ok(user) => break user,
            Err(StoreError::Conflict("api_key")) if attempt < API_KEY_ATTEMPTS => {
                warn!(attempt, "api key collision; regenerating");
            }
            Err(e) => return Err(e.into()),
        }
    };
    info!(user_id = %user.id, role = user.role.as_str(), "user created");

    let user =
        directory::sync_created_user(state.store.as_ref(), state.directory.as_ref(), user).await;

    Ok((
        StatusCode::CREATED,
        Json(Data::new(UserResource::for_viewer(user, viewer))),
    ))
}

#[instrument(skip(state, principal), fields(principal_id = %principal.user().id))]
pub async fn show(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Data<UserResource>>, ApiError> {
    let viewer = principal.user();
    let target = load_target(&state, &id).await?;
    policy::authorize(viewer, Ability::View(&target))?;

    Ok(Json(Data::new(UserResource::for_viewer(target, viewer))))
}

#[instrument(skip(state, principal, body), fields(principal_id = %principal.user().id))]
pub async fn update(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Data<UserResource>>, ApiError> {
    let viewer = principal.user();
    let target = load_target(&state, &id).await?;
    policy::authorize(viewer, Ability::Update(&target))?;

    let payload = object_body(&body)?;
    let changes = validation::validate_update(&payload, viewer).map_err(|errors| {
        warn!(user_id = %target.id, fields = ?errors.fields().collect::<Vec<_>>(), "update payload rejected");
        errors
    })?;

    let user = if changes.is_empty() {
        target
    } else {
        let updated = state.store.update(target.id, changes).await?;
        info!(user_id = %updated.id, "user updated");
        updated
    };

    Ok(Json(Data::new(UserResource::for_viewer(user, viewer))))
}

/// Unparseable ids cannot name an existing user, so they are a 404 too.
async fn load_target(state: &AppState, id: &str) -> Result<User, ApiError> {
    let Ok(id) = Uuid::parse_str(id) else {
        return Err(ApiError::NotFound);
    };
    state.store.find(id).await?.ok_or(ApiError::NotFound)
}

/// Empty bodies read as `{}`, whatever the content type; anything else must
/// be a JSON object.
fn object_body(body: &[u8]) -> Result<Map<String, Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::BadRequest(
            "Request body must be a JSON object.".into(),
        )),
        Err(e) => {
            warn!(error = %e, "request body rejected");
            Err(ApiError::BadRequest(format!("Malformed JSON body: {e}")))
        }
    }
}
