//! # Authentication arguments and results
//!
//! Login and account-creation requests are validated here before the facade
//! hands them to the native SDK. See [`crate::database::FirebaseApi::login`].

mod types;

#[doc(inline)]
pub use types::{AuthData, CreateUserOptions, Credentials, LoginOptions, LoginType};
