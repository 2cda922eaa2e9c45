//! Generic parameters functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Cannot load the parameter file {0:?}: {1}")]
    FileLoadError(PathBuf, std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(toml::de::Error),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file from the `params` directory of the software root.
pub fn load<P>(sw_root: &Path, param_file: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    load_path(sw_root.join("params").join(param_file))
}

/// Load a parameter file from an explicit path.
pub fn load_path<P, T>(path: T) -> Result<P, LoadError>
where
    P: DeserializeOwned,
    T: AsRef<Path>,
{
    let path = path.as_ref();

    let params_str =
        read_to_string(path).map_err(|e| LoadError::FileLoadError(path.to_path_buf(), e))?;

    from_str(&params_str)
}

/// Parse parameters from a TOML string.
pub fn from_str<P>(params_str: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    toml::from_str(params_str).map_err(LoadError::DeserialiseError)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    struct TestParams {
        rate_hz: f64,
        port: String,
    }

    #[test]
    fn test_from_str() {
        let p: TestParams = from_str("rate_hz = 10.0\nport = \"/dev/ttyACM0\"").unwrap();
        assert_eq!(p.rate_hz, 10.0);
        assert_eq!(p.port, "/dev/ttyACM0");

        let e = from_str::<TestParams>("rate_hz = \"fast\"");
        assert!(matches!(e, Err(LoadError::DeserialiseError(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let e = load::<TestParams>(Path::new("/this/path/does/not"), "exist.toml");

        match e {
            Err(LoadError::FileLoadError(path, _)) => {
                assert_eq!(path, Path::new("/this/path/does/not/params/exist.toml"))
            }
            _ => panic!("expected a file load error"),
        }
    }
}
