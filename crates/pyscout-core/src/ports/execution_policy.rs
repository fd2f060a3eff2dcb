//! Safety gate for running discovered interpreters.
//!
//! The concrete trust rules belong to the embedding application; the core
//! only consults the predicate.

use crate::domain::PythonEnvInfo;

pub trait ExecutionPolicy: Send + Sync {
    /// Whether `env`'s interpreter may be spawned to collect information.
    fn is_safe_to_execute(&self, env: &PythonEnvInfo) -> bool;
}

impl<F> ExecutionPolicy for F
where
    F: Fn(&PythonEnvInfo) -> bool + Send + Sync,
{
    fn is_safe_to_execute(&self, env: &PythonEnvInfo) -> bool {
        self(env)
    }
}

/// Trust every interpreter.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl ExecutionPolicy for AllowAll {
    fn is_safe_to_execute(&self, _env: &PythonEnvInfo) -> bool {
        true
    }
}

/// Never execute; only sidecar metadata is used.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl ExecutionPolicy for DenyAll {
    fn is_safe_to_execute(&self, _env: &PythonEnvInfo) -> bool {
        false
    }
}
