//! Field rules for create and update payloads.
//!
//! Payloads arrive as raw JSON objects so that type mismatches can be
//! reported per field. Strings other than `password` are trimmed and an
//! empty string counts as null. The first failing rule of a field is reported; every failing field
//! is reported together.
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::users::model::{NewUser, Role, User, UserChanges};
use crate::users::policy;

pub const NAME_MAX: usize = 50;
pub const EMAIL_MAX: usize = 100;
pub const PASSWORD_MAX: usize = 20;
pub const PHONE_NUMBER_MAX: usize = 30;

pub const NOT_ALLOWED: &str = "Not allowed";

/// Field errors in the order the fields were checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: Vec<(&'static str, Vec<String>)>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        match self.fields.iter_mut().find(|(f, _)| *f == field) {
            Some((_, messages)) => messages.push(message.into()),
            None => self.fields.push((field, vec![message.into()])),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, m)| m.as_slice())
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(f, _)| *f)
    }

    /// First message, with a count of the rest.
    pub fn summary(&self) -> String {
        let mut all = self.fields.iter().flat_map(|(_, m)| m.iter());
        let Some(first) = all.next() else {
            return "The given data was invalid.".to_string();
        };
        match all.count() {
            0 => first.clone(),
            1 => format!("{first} (and 1 more error)"),
            n => format!("{first} (and {n} more errors)"),
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

impl Serialize for ValidationErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (field, messages) in &self.fields {
            map.serialize_entry(field, messages)?;
        }
        map.end()
    }
}

fn label(field: &str) -> String {
    field.replace('_', " ")
}

pub fn required_message(field: &str) -> String {
    format!("The {} field is required.", label(field))
}

pub fn string_message(field: &str) -> String {
    format!("The {} field must be a string.", label(field))
}

pub fn max_message(field: &str, max: usize) -> String {
    format!(
        "The {} field must not be greater than {max} characters.",
        label(field)
    )
}

pub fn email_message(field: &str) -> String {
    format!("The {} field must be a valid email address.", label(field))
}

pub fn alpha_num_message(field: &str) -> String {
    format!(
        "The {} field must only contain letters and numbers.",
        label(field)
    )
}

pub fn invalid_choice_message(field: &str) -> String {
    format!("The selected {} is invalid.", label(field))
}

pub fn taken_message(field: &str) -> String {
    format!("The {} has already been taken.", label(field))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn is_ascii_alphanumeric(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric())
}

#[derive(Debug, Clone, Copy)]
enum Format {
    Text,
    Email,
    AlphaNum,
}

/// What a payload holds for one key after trimming.
enum Input<'a> {
    Missing,
    Null,
    Text(&'a str),
    Other,
}

/// Fields whose value is taken verbatim; surrounding whitespace is part of it.
const UNTRIMMED: &[&str] = &["password"];

fn read<'a>(payload: &'a Map<String, Value>, field: &str) -> Input<'a> {
    match payload.get(field) {
        None => Input::Missing,
        Some(Value::Null) => Input::Null,
        Some(Value::String(s)) => {
            let value = if UNTRIMMED.contains(&field) {
                s.as_str()
            } else {
                s.trim()
            };
            match value {
                "" => Input::Null,
                value => Input::Text(value),
            }
        }
        Some(_) => Input::Other,
    }
}

/// Type/format rule followed by the length rule.
fn check(field: &str, input: &Input<'_>, format: Format, max: usize) -> Result<String, String> {
    let type_error = || match format {
        Format::Text => string_message(field),
        Format::Email => email_message(field),
        Format::AlphaNum => alpha_num_message(field),
    };
    let Input::Text(value) = input else {
        return Err(type_error());
    };
    let format_ok = match format {
        Format::Text => true,
        Format::Email => is_valid_email(value),
        Format::AlphaNum => is_ascii_alphanumeric(value),
    };
    if !format_ok {
        return Err(type_error());
    }
    if value.chars().count() > max {
        return Err(max_message(field, max));
    }
    Ok(value.to_string())
}

fn check_role(input: &Input<'_>) -> Result<Role, String> {
    let value = check("role", input, Format::Text, usize::MAX)?;
    Role::parse(&value).ok_or_else(|| invalid_choice_message("role"))
}

fn required(
    payload: &Map<String, Value>,
    field: &'static str,
    format: Format,
    max: usize,
    errors: &mut ValidationErrors,
) -> Option<String> {
    let input = read(payload, field);
    if matches!(input, Input::Missing | Input::Null) {
        errors.add(field, required_message(field));
        return None;
    }
    check(field, &input, format, max)
        .map_err(|msg| errors.add(field, msg))
        .ok()
}

fn sometimes(
    payload: &Map<String, Value>,
    field: &'static str,
    format: Format,
    max: usize,
    errors: &mut ValidationErrors,
) -> Option<String> {
    let input = read(payload, field);
    if matches!(input, Input::Missing) {
        return None;
    }
    check(field, &input, format, max)
        .map_err(|msg| errors.add(field, msg))
        .ok()
}

pub fn validate_create(payload: &Map<String, Value>) -> Result<NewUser, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let name = required(payload, "name", Format::Text, NAME_MAX, &mut errors);
    let email = required(payload, "email", Format::Email, EMAIL_MAX, &mut errors);
    let password = required(payload, "password", Format::AlphaNum, PASSWORD_MAX, &mut errors);
    let phone_number = required(
        payload,
        "phone_number",
        Format::Text,
        PHONE_NUMBER_MAX,
        &mut errors,
    );
    let role = match read(payload, "role") {
        Input::Missing | Input::Null => {
            errors.add("role", required_message("role"));
            None
        }
        input => check_role(&input).map_err(|msg| errors.add("role", msg)).ok(),
    };

    match (name, email, password, phone_number, role) {
        (Some(name), Some(email), Some(password), Some(phone_number), Some(role))
            if errors.is_empty() =>
        {
            Ok(NewUser {
                name,
                email,
                password,
                phone_number,
                role,
            })
        }
        _ => Err(errors),
    }
}

/// Validates a partial update on behalf of `actor`. A regular user sending
/// `role` at all is refused, whatever the value.
pub fn validate_update(
    payload: &Map<String, Value>,
    actor: &User,
) -> Result<UserChanges, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let name = sometimes(payload, "name", Format::Text, NAME_MAX, &mut errors);
    let email = sometimes(payload, "email", Format::Email, EMAIL_MAX, &mut errors);
    let phone_number = sometimes(
        payload,
        "phone_number",
        Format::Text,
        PHONE_NUMBER_MAX,
        &mut errors,
    );
    let role = match read(payload, "role") {
        Input::Missing => None,
        _ if !policy::can_set_role(actor) => {
            errors.add("role", NOT_ALLOWED);
            None
        }
        input => check_role(&input).map_err(|msg| errors.add("role", msg)).ok(),
    };

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(UserChanges {
        name,
        email,
        phone_number,
        role,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn valid_create() -> Value {
        json!({
            "name": "Ada Lovelace",
            "email": "ada@example.com",
            "password": "abc123XYZ",
            "phone_number": "+44 20 7946 0958",
            "role": "user",
        })
    }

    fn actor(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            name: "actor".into(),
            email: "actor@example.com".into(),
            password_hash: String::new(),
            phone_number: "1".into(),
            api_key: "k".into(),
            role,
            external_id: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn create_errors(overrides: Value) -> ValidationErrors {
        let mut payload = object(valid_create());
        for (k, v) in object(overrides) {
            if v == json!("__remove__") {
                payload.remove(&k);
            } else {
                payload.insert(k, v);
            }
        }
        validate_create(&payload).expect_err("should be invalid")
    }

    #[test]
    fn valid_create_payload_passes() {
        let user = validate_create(&object(valid_create())).expect("valid");
        assert_eq!(user.name, "Ada Lovelace");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.password, "abc123XYZ");
    }

    #[test]
    fn create_trims_strings() {
        let mut payload = object(valid_create());
        payload.insert("name".into(), json!("  Ada  "));
        let user = validate_create(&payload).expect("valid");
        assert_eq!(user.name, "Ada");
    }

    #[test]
    fn every_create_field_is_required() {
        let errors = validate_create(&Map::new()).unwrap_err();
        assert_eq!(
            errors.fields().collect::<Vec<_>>(),
            vec!["name", "email", "password", "phone_number", "role"]
        );
        assert_eq!(errors.get("name").unwrap(), ["The name field is required."]);
        assert_eq!(
            errors.get("phone_number").unwrap(),
            ["The phone number field is required."]
        );
    }

    #[test]
    fn empty_string_counts_as_missing() {
        let errors = create_errors(json!({ "name": "   " }));
        assert_eq!(errors.get("name").unwrap(), ["The name field is required."]);
    }

    #[test]
    fn name_must_be_a_string() {
        let errors = create_errors(json!({ "name": 7 }));
        assert_eq!(errors.get("name").unwrap(), ["The name field must be a string."]);
    }

    #[test]
    fn name_longer_than_50_is_rejected() {
        let errors = create_errors(json!({ "name": "A".repeat(51) }));
        assert_eq!(
            errors.get("name").unwrap(),
            ["The name field must not be greater than 50 characters."]
        );
    }

    #[test]
    fn name_length_counts_characters_not_bytes() {
        let mut payload = object(valid_create());
        payload.insert("name".into(), json!("é".repeat(50)));
        assert!(validate_create(&payload).is_ok());
    }

    #[test]
    fn email_must_be_well_formed() {
        let errors = create_errors(json!({ "email": "Ada Lovelace" }));
        assert_eq!(
            errors.get("email").unwrap(),
            ["The email field must be a valid email address."]
        );
    }

    #[test]
    fn email_longer_than_100_is_rejected() {
        let email = format!("{}@example.com", "a".repeat(99));
        let errors = create_errors(json!({ "email": email }));
        assert_eq!(
            errors.get("email").unwrap(),
            ["The email field must not be greater than 100 characters."]
        );
    }

    #[test]
    fn password_must_be_ascii_alphanumeric() {
        let errors = create_errors(json!({ "password": "汉字" }));
        assert_eq!(
            errors.get("password").unwrap(),
            ["The password field must only contain letters and numbers."]
        );

        let errors = create_errors(json!({ "password": "abc-123" }));
        assert!(errors.get("password").is_some());
    }

    #[test]
    fn password_is_not_trimmed() {
        let errors = create_errors(json!({ "password": "  abc123  " }));
        assert_eq!(
            errors.get("password").unwrap(),
            ["The password field must only contain letters and numbers."]
        );

        let errors = create_errors(json!({ "password": "   " }));
        assert_eq!(
            errors.get("password").unwrap(),
            ["The password field must only contain letters and numbers."]
        );

        let errors = create_errors(json!({ "password": "" }));
        assert_eq!(errors.get("password").unwrap(), ["The password field is required."]);
    }

    #[test]
    fn password_longer_than_20_is_rejected() {
        let errors = create_errors(json!({ "password": "a".repeat(21) }));
        assert_eq!(
            errors.get("password").unwrap(),
            ["The password field must not be greater than 20 characters."]
        );
    }

    #[test]
    fn phone_number_longer_than_30_is_rejected() {
        let errors = create_errors(json!({ "phone_number": "1".repeat(31) }));
        assert_eq!(
            errors.get("phone_number").unwrap(),
            ["The phone number field must not be greater than 30 characters."]
        );
    }

    #[test]
    fn role_must_be_known() {
        let errors = create_errors(json!({ "role": "manager" }));
        assert_eq!(errors.get("role").unwrap(), ["The selected role is invalid."]);

        let errors = create_errors(json!({ "role": 3 }));
        assert_eq!(errors.get("role").unwrap(), ["The role field must be a string."]);

        let errors = create_errors(json!({ "role": "__remove__" }));
        assert_eq!(errors.get("role").unwrap(), ["The role field is required."]);
    }

    #[test]
    fn summary_counts_remaining_errors() {
        assert_eq!(
            ValidationErrors::single("role", NOT_ALLOWED).summary(),
            "Not allowed"
        );
        let errors = create_errors(json!({ "name": 1, "role": "x" }));
        assert_eq!(
            errors.summary(),
            "The name field must be a string. (and 1 more error)"
        );
        let errors = validate_create(&Map::new()).unwrap_err();
        assert_eq!(
            errors.summary(),
            "The name field is required. (and 4 more errors)"
        );
    }

    #[test]
    fn errors_serialize_as_field_map() {
        let errors = create_errors(json!({ "role": "x" }));
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json, json!({ "role": ["The selected role is invalid."] }));
    }

    #[test]
    fn update_accepts_empty_payload() {
        let changes = validate_update(&Map::new(), &actor(Role::User)).expect("valid");
        assert!(changes.is_empty());
    }

    #[test]
    fn update_ignores_password_and_unknown_keys() {
        let payload = object(json!({ "password": "汉字", "nickname": 5, "name": "Grace" }));
        let changes = validate_update(&payload, &actor(Role::User)).expect("valid");
        assert_eq!(changes.name.as_deref(), Some("Grace"));
    }

    #[test]
    fn update_rejects_null_for_present_field() {
        let payload = object(json!({ "name": null }));
        let errors = validate_update(&payload, &actor(Role::Admin)).unwrap_err();
        assert_eq!(errors.get("name").unwrap(), ["The name field must be a string."]);
    }

    #[test]
    fn regular_user_may_not_send_role() {
        for role in ["admin", "user", "manager"] {
            let payload = object(json!({ "name": "Grace", "role": role }));
            let errors = validate_update(&payload, &actor(Role::User)).unwrap_err();
            assert_eq!(errors.get("role").unwrap(), [NOT_ALLOWED]);
            assert_eq!(errors.summary(), NOT_ALLOWED);
        }
    }

    #[test]
    fn admin_may_change_role() {
        let payload = object(json!({ "role": "admin" }));
        let changes = validate_update(&payload, &actor(Role::Admin)).expect("valid");
        assert_eq!(changes.role, Some(Role::Admin));

        let payload = object(json!({ "role": "manager" }));
        let errors = validate_update(&payload, &actor(Role::Admin)).unwrap_err();
        assert_eq!(errors.get("role").unwrap(), ["The selected role is invalid."]);
    }

    #[test]
    fn update_checks_lengths() {
        let payload = object(json!({
            "name": "A".repeat(51),
            "phone_number": "1".repeat(31),
        }));
        let errors = validate_update(&payload, &actor(Role::Admin)).unwrap_err();
        assert!(errors.get("name").is_some());
        assert!(errors.get("phone_number").is_some());
        assert!(errors.get("email").is_none());
    }

    #[test]
    fn email_regex_accepts_common_addresses() {
        assert!(is_valid_email("a.b+c@sub.example.org"));
        assert!(!is_valid_email("no-at-sign.example.com"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("space in@example.com"));
    }
}
