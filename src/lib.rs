//! # firebase-bridge
//!
//! Platform-neutral bindings over the native Firebase Realtime Database and
//! Authentication SDKs of Android and iOS.
//!
//! - [`database`]: the [`database::Firebase`] facade, snapshots, queries,
//!   event subscriptions and the native SDK contract.
//! - [`auth`]: login and account-creation arguments and results.
//! - [`platform`]: native object shapes and value converters per platform.
//! - [`logger`]: named loggers shared by every module.
//!
//! DISCLAIMER: This is not an official Firebase product.

pub mod auth;
pub mod database;
pub mod logger;
pub mod platform;
