use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::error::{invalid_field, DatabaseError, DatabaseResult};
use crate::database::native::NativeAuthData;
use crate::database::value::ValueConverter;

/// Sign-in modes the native SDKs expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoginType {
    Anonymous,
    Password,
    Custom,
    OAuth,
}

impl LoginType {
    pub fn as_str(self) -> &'static str {
        match self {
            LoginType::Anonymous => "anonymous",
            LoginType::Password => "password",
            LoginType::Custom => "custom",
            LoginType::OAuth => "oauth",
        }
    }
}

impl fmt::Display for LoginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoginType {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match crate::database::query::option_token(s).as_str() {
            "anonymous" => Ok(LoginType::Anonymous),
            "password" | "emailandpassword" => Ok(LoginType::Password),
            "custom" | "customtoken" => Ok(LoginType::Custom),
            "oauth" | "oauthtoken" => Ok(LoginType::OAuth),
            _ => Err(invalid_field(
                "type",
                format!("Unsupported login type '{s}', use anonymous, password, custom or oauth"),
            )),
        }
    }
}

/// Login argument as the host passes it: `{type, email?, password?, token?, provider?}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct LoginOptions {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

/// A login request after validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Anonymous,
    Password { email: String, password: String },
    CustomToken { token: String },
    OAuthToken { provider: String, token: String },
}

impl Credentials {
    pub fn login_type(&self) -> LoginType {
        match self {
            Credentials::Anonymous => LoginType::Anonymous,
            Credentials::Password { .. } => LoginType::Password,
            Credentials::CustomToken { .. } => LoginType::Custom,
            Credentials::OAuthToken { .. } => LoginType::OAuth,
        }
    }
}

fn required(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|value| !value.is_empty()).map(str::to_string)
}

impl LoginOptions {
    pub fn anonymous() -> Self {
        Self {
            kind: Some(LoginType::Anonymous.as_str().to_string()),
            ..Default::default()
        }
    }

    pub fn password(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            kind: Some(LoginType::Password.as_str().to_string()),
            email: Some(email.into()),
            password: Some(password.into()),
            ..Default::default()
        }
    }

    pub fn custom_token(token: impl Into<String>) -> Self {
        Self {
            kind: Some(LoginType::Custom.as_str().to_string()),
            token: Some(token.into()),
            ..Default::default()
        }
    }

    pub fn oauth(provider: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            kind: Some(LoginType::OAuth.as_str().to_string()),
            provider: Some(provider.into()),
            token: Some(token.into()),
            ..Default::default()
        }
    }

    pub fn credentials(&self) -> DatabaseResult<Credentials> {
        let Some(kind) = self.kind.as_deref() else {
            return Err(invalid_field("type", "Login requires a type argument"));
        };
        match kind.parse::<LoginType>()? {
            LoginType::Anonymous => Ok(Credentials::Anonymous),
            LoginType::Password => match (required(&self.email), required(&self.password)) {
                (Some(email), Some(password)) => Ok(Credentials::Password { email, password }),
                (None, _) => Err(invalid_field(
                    "email",
                    "Auth type password requires an email and password argument",
                )),
                (_, None) => Err(invalid_field(
                    "password",
                    "Auth type password requires an email and password argument",
                )),
            },
            LoginType::Custom => required(&self.token)
                .map(|token| Credentials::CustomToken { token })
                .ok_or_else(|| invalid_field("token", "Auth type custom requires a token argument")),
            LoginType::OAuth => match (required(&self.provider), required(&self.token)) {
                (Some(provider), Some(token)) => Ok(Credentials::OAuthToken { provider, token }),
                (None, _) => Err(invalid_field(
                    "provider",
                    "Auth type oauth requires a provider and token argument",
                )),
                (_, None) => Err(invalid_field(
                    "token",
                    "Auth type oauth requires a provider and token argument",
                )),
            },
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct CreateUserOptions {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl CreateUserOptions {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }

    /// Returns `(email, password)` once both are present.
    pub fn validate(&self) -> DatabaseResult<(String, String)> {
        match (required(&self.email), required(&self.password)) {
            (Some(email), Some(password)) => Ok((email, password)),
            (None, _) => Err(invalid_field(
                "email",
                "Creating a user requires an email and password argument",
            )),
            (_, None) => Err(invalid_field(
                "password",
                "Creating a user requires an email and password argument",
            )),
        }
    }
}

/// Authentication state reported after a successful login.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AuthData {
    pub uid: String,
    pub provider: String,
    /// Token expiry in seconds since the Unix epoch.
    pub expires: i64,
    /// Token payload converted to a value tree.
    pub auth: Value,
}

impl AuthData {
    pub fn from_native<C: ValueConverter>(
        native: NativeAuthData<C::Native>,
        converter: &C,
    ) -> DatabaseResult<Self> {
        Ok(Self {
            auth: converter.to_tree(&native.auth)?,
            uid: native.uid,
            provider: native.provider,
            expires: native.expires,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::error::DatabaseErrorCode;
    use serde_json::json;

    #[test]
    fn login_types_accept_host_spellings() {
        assert_eq!("ANONYMOUS".parse::<LoginType>().unwrap(), LoginType::Anonymous);
        assert_eq!("password".parse::<LoginType>().unwrap(), LoginType::Password);
        assert_eq!("CUSTOM_TOKEN".parse::<LoginType>().unwrap(), LoginType::Custom);
        assert!("facebook".parse::<LoginType>().is_err());
    }

    #[test]
    fn password_login_requires_both_fields() {
        let options: LoginOptions =
            serde_json::from_value(json!({ "type": "password", "email": "a@b.c" })).unwrap();
        let err = options.credentials().unwrap_err();
        assert_eq!(err.code, DatabaseErrorCode::InvalidArgument);
        assert_eq!(err.field(), Some("password"));

        let options = LoginOptions::password("a@b.c", "pw");
        assert_eq!(
            options.credentials().unwrap(),
            Credentials::Password {
                email: "a@b.c".into(),
                password: "pw".into()
            }
        );
    }

    #[test]
    fn missing_type_is_rejected() {
        let err = LoginOptions::default().credentials().unwrap_err();
        assert_eq!(err.field(), Some("type"));
    }

    #[test]
    fn oauth_login_requires_provider() {
        let options: LoginOptions =
            serde_json::from_value(json!({ "type": "oauth", "token": "t" })).unwrap();
        assert_eq!(options.credentials().unwrap_err().field(), Some("provider"));
        assert_eq!(
            LoginOptions::oauth("github", "t").credentials().unwrap().login_type(),
            LoginType::OAuth
        );
    }

    #[test]
    fn create_user_requires_email_and_password() {
        assert_eq!(
            CreateUserOptions::default().validate().unwrap_err().field(),
            Some("email")
        );
        let options = CreateUserOptions {
            email: Some("a@b.c".into()),
            password: Some(String::new()),
        };
        assert_eq!(options.validate().unwrap_err().field(), Some("password"));
        assert!(CreateUserOptions::new("a@b.c", "pw").validate().is_ok());
    }
}
