use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::database::native::{NativeError, NativeResult};

const SESSION_SECONDS: i64 = 24 * 60 * 60;

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Session {
    pub(crate) uid: String,
    pub(crate) provider: String,
    pub(crate) expires: i64,
    pub(crate) auth: Value,
}

struct Account {
    uid: String,
    password: String,
}

#[derive(Default)]
pub(crate) struct AuthState {
    accounts: HashMap<String, Account>,
    current: Option<Session>,
}

impl AuthState {
    pub(crate) fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub(crate) fn sign_out(&mut self) {
        self.current = None;
    }

    pub(crate) fn sign_in_anonymously(&mut self) -> Session {
        self.start_session(random_uid(), "anonymous", None, json!({}))
    }

    pub(crate) fn sign_in_with_password(
        &mut self,
        email: &str,
        password: &str,
    ) -> NativeResult<Session> {
        let Some(account) = self.accounts.get(&email.to_lowercase()) else {
            return Err(NativeError::permission_denied(
                "The specified user does not exist.",
            ));
        };
        if account.password != password {
            return Err(NativeError::permission_denied(
                "The specified password is incorrect.",
            ));
        }
        let uid = account.uid.clone();
        Ok(self.start_session(uid, "password", None, json!({ "email": email })))
    }

    pub(crate) fn sign_in_with_custom_token(&mut self, token: &str) -> NativeResult<Session> {
        let claims = decode_token_claims(token)?;
        let uid = claims
            .get("uid")
            .or_else(|| claims.get("d").and_then(|data| data.get("uid")))
            .and_then(Value::as_str)
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| NativeError::new("Custom token does not contain a uid claim."))?
            .to_string();
        let expires = claims.get("exp").and_then(Value::as_i64);
        if let Some(expires) = expires {
            if expires <= Utc::now().timestamp() {
                return Err(NativeError::permission_denied("Custom token has expired."));
            }
        }
        Ok(self.start_session(uid, "custom", expires, claims))
    }

    pub(crate) fn sign_in_with_oauth_token(
        &mut self,
        provider: &str,
        token: &str,
    ) -> NativeResult<Session> {
        if provider.is_empty() || token.is_empty() {
            return Err(NativeError::new(
                "OAuth sign-in requires a provider and an access token.",
            ));
        }
        let digest = Sha256::digest(format!("{provider}:{token}").as_bytes());
        let fingerprint: String = digest.iter().take(10).map(|byte| format!("{byte:02x}")).collect();
        let uid = format!("{provider}:{fingerprint}");
        Ok(self.start_session(uid, provider, None, json!({ "provider": provider })))
    }

    pub(crate) fn create_user(&mut self, email: &str, password: &str) -> NativeResult<String> {
        if !email.contains('@') {
            return Err(NativeError::new("The specified email address is invalid."));
        }
        if password.is_empty() {
            return Err(NativeError::new("The specified password is invalid."));
        }
        let key = email.to_lowercase();
        if self.accounts.contains_key(&key) {
            return Err(NativeError::new(
                "The specified email address is already in use.",
            ));
        }
        let uid = random_uid();
        self.accounts.insert(
            key,
            Account {
                uid: uid.clone(),
                password: password.to_string(),
            },
        );
        Ok(uid)
    }

    fn start_session(
        &mut self,
        uid: String,
        provider: &str,
        expires: Option<i64>,
        mut auth: Value,
    ) -> Session {
        if let Value::Object(map) = &mut auth {
            map.insert("uid".to_string(), Value::String(uid.clone()));
            map.insert("provider".to_string(), Value::String(provider.to_string()));
        }
        let session = Session {
            uid,
            provider: provider.to_string(),
            expires: expires.unwrap_or_else(|| Utc::now().timestamp() + SESSION_SECONDS),
            auth,
        };
        self.current = Some(session.clone());
        session
    }
}

fn random_uid() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(28)
        .map(char::from)
        .collect()
}

fn decode_token_claims(token: &str) -> NativeResult<Value> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| NativeError::new("Custom token is not a JWT."))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|err| NativeError::new(format!("Custom token payload is not base64: {err}")))?;
    let claims: Value = serde_json::from_slice(&bytes)
        .map_err(|err| NativeError::new(format!("Custom token payload is not JSON: {err}")))?;
    if claims.is_object() {
        Ok(claims)
    } else {
        Err(NativeError::new("Custom token payload must be a JSON object."))
    }
}
