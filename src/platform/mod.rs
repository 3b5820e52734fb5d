//! Native object shapes per target platform.
//!
//! Both bindings are always compiled so either can be exercised from host
//! tests; [`PlatformConverter`] and [`PlatformObject`] pick the one matching
//! the build target.

pub mod android;
pub mod ios;

#[cfg(target_os = "ios")]
pub type PlatformConverter = ios::IosConverter;
#[cfg(target_os = "ios")]
pub type PlatformObject = ios::NsObject;

#[cfg(not(target_os = "ios"))]
pub type PlatformConverter = android::AndroidConverter;
#[cfg(not(target_os = "ios"))]
pub type PlatformObject = android::JavaObject;
