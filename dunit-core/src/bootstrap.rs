//! Process-wide environment slot.
//!
//! Exactly one [`DUnitEnv`] may be installed per process, at bootstrap,
//! before any worker-directed call. There is no probing for a default:
//! until something calls [`install`], [`current`] fails with
//! [`EnvError::NotInitialized`].

use std::sync::OnceLock;

use crate::{DUnitEnv, EnvError};

static ENVIRONMENT: OnceLock<DUnitEnv> = OnceLock::new();

/// Install the environment for this process.
///
/// Fails with [`EnvError::AlreadyInitialized`] if one is already installed.
pub fn install(env: DUnitEnv) -> Result<(), EnvError> {
    ENVIRONMENT.set(env).map_err(|_| EnvError::AlreadyInitialized)?;
    tracing::debug!("environment installed");
    Ok(())
}

/// The installed environment.
pub fn current() -> Result<DUnitEnv, EnvError> {
    ENVIRONMENT.get().cloned().ok_or(EnvError::NotInitialized)
}

/// Returns true once an environment has been installed.
pub fn is_installed() -> bool {
    ENVIRONMENT.get().is_some()
}
