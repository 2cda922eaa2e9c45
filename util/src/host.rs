//! Host platform utility functions

use std::env;
use std::path::PathBuf;

/// Environment variable pointing at the root of the rover software checkout.
pub const SW_ROOT_ENV_VAR: &str = "ROVER_SW_ROOT";

/// Get the root directory of the rover software.
///
/// This is read from the `ROVER_SW_ROOT` environment variable. Params and
/// sessions directories are resolved relative to it.
pub fn get_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
