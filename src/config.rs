//! Plugin parameters
//!
//! protoc passes `--ormable_opt=...` values through as one comma separated
//! string, e.g. `runtime=crate::orm,quiet`.

use crate::GeneratorError;

/// Runtime module path used when none is configured
pub const DEFAULT_RUNTIME_PATH: &str = "protoc_gen_ormable::runtime";

/// Options controlling code generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Rust path of the runtime module referenced by generated code
    pub runtime_path: String,
    /// Leave diagnostics out of generated files
    pub quiet: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runtime_path: DEFAULT_RUNTIME_PATH.to_string(),
            quiet: false,
        }
    }
}

impl Config {
    /// Parse the request parameter string
    pub fn parse(parameter: Option<&str>) -> Result<Self, GeneratorError> {
        let mut config = Self::default();
        let Some(parameter) = parameter else {
            return Ok(config);
        };

        for item in parameter.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = match item.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (item, None),
            };
            match (key, value) {
                ("runtime", Some(path)) if syn::parse_str::<syn::Path>(path).is_ok() => {
                    config.runtime_path = path.to_string();
                }
                ("runtime", value) => {
                    return Err(GeneratorError::InvalidConfig(format!(
                        "runtime expects a Rust path, got {:?}",
                        value.unwrap_or_default()
                    )));
                }
                ("quiet", None) => config.quiet = true,
                ("quiet", Some(value)) => {
                    config.quiet = value.parse().map_err(|_| {
                        GeneratorError::InvalidConfig(format!(
                            "quiet expects true or false, got {value:?}"
                        ))
                    })?;
                }
                (key, _) => {
                    return Err(GeneratorError::InvalidConfig(format!(
                        "unknown parameter {key:?}"
                    )));
                }
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(Config::parse(None).unwrap(), Config::default());
        assert_eq!(Config::parse(Some("")).unwrap(), Config::default());
    }

    #[test]
    fn test_runtime_and_quiet() {
        let config = Config::parse(Some("runtime=crate::orm::rt, quiet")).unwrap();
        assert_eq!(config.runtime_path, "crate::orm::rt");
        assert!(config.quiet);

        let config = Config::parse(Some("quiet=false")).unwrap();
        assert!(!config.quiet);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            Config::parse(Some("verbose")),
            Err(GeneratorError::InvalidConfig(_))
        ));
        assert!(matches!(
            Config::parse(Some("runtime=not a path")),
            Err(GeneratorError::InvalidConfig(_))
        ));
        assert!(matches!(
            Config::parse(Some("quiet=maybe")),
            Err(GeneratorError::InvalidConfig(_))
        ));
    }
}
