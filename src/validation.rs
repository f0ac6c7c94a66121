use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use serde::Serialize;
use serde::de::DeserializeOwned;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::AppError;

/// A field-level validation error, listed under `error.details` in responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub code: String,
}

/// Validated
///
/// Deserializes a JSON body and runs its `validator::Validate` rules. Used in place of
/// `Json<T>` on every write endpoint; a malformed body or a failing rule rejects the
/// request with a 400 before the handler runs.
pub struct Validated<T>(pub T);

impl<T, S> FromRequest<S> for Validated<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let json = axum::Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| AppError::BadRequest(rejection.body_text()))?;

        check(&json.0)?;

        Ok(Validated(json.0))
    }
}

/// Runs the validation rules of a value that did not arrive through `Validated`
/// (query strings, multipart form fields).
pub fn check<T: Validate>(value: &T) -> Result<(), AppError> {
    value
        .validate()
        .map_err(|errors| AppError::Validation(convert_validation_errors(&errors)))
}

/// Request payloads are `rename_all = "camelCase"`; report fields under their wire names.
fn wire_name(field: &str) -> String {
    let mut name = String::with_capacity(field.len());
    let mut upper = false;
    for ch in field.chars() {
        if ch == '_' {
            upper = !name.is_empty();
        } else if upper {
            name.push(ch.to_ascii_uppercase());
            upper = false;
        } else {
            name.push(ch);
        }
    }
    name
}

fn convert_validation_errors(errors: &validator::ValidationErrors) -> Vec<FieldError> {
    let mut field_errors: Vec<_> = errors.field_errors().into_iter().collect();
    // HashMap iteration order is unstable; sort so responses are deterministic.
    field_errors.sort_by(|a, b| a.0.cmp(&b.0));

    let mut result = Vec::new();
    for (field, field_errors) in field_errors {
        for error in field_errors {
            result.push(FieldError {
                field: wire_name(&field),
                message: error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for '{field}'")),
                code: error.code.to_string(),
            });
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct Signup {
        #[validate(email(message = "Invalid email"))]
        email: String,
        #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
        password: String,
    }

    #[test]
    fn collects_every_failing_field() {
        let err = check(&Signup {
            email: "nope".into(),
            password: "123".into(),
        })
        .unwrap_err();

        let AppError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].field, "email");
        assert_eq!(fields[0].message, "Invalid email");
        assert_eq!(fields[1].code, "length");
    }

    #[derive(Debug, Deserialize, Validate)]
    #[serde(rename_all = "camelCase")]
    struct ProfileForm {
        #[validate(url(message = "Invalid website URL"))]
        website_url: Option<String>,
    }

    #[test]
    fn reports_camel_case_field_names() {
        let err = check(&ProfileForm {
            website_url: Some("not a url".into()),
        })
        .unwrap_err();

        let AppError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert_eq!(fields[0].field, "websiteUrl");
        assert_eq!(wire_name("new_password"), "newPassword");
        assert_eq!(wire_name("email"), "email");
    }

    #[test]
    fn passes_valid_values() {
        assert!(
            check(&Signup {
                email: "a@b.io".into(),
                password: "secret1".into(),
            })
            .is_ok()
        );
    }
}
