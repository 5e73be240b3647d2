use serde::{Deserialize, Serialize};

/// Which optional passes [crate::analyze] runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Report unused let bindings and object keys.
    pub dead_code: bool,

    /// Replace calls to declared functions with their bodies.
    pub inline_functions: bool,

    /// Resolve and classify the program again after inlining.
    pub reresolve_after_inlining: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            dead_code: true,
            inline_functions: true,
            reresolve_after_inlining: true,
        }
    }
}

impl Options {
    pub fn no_inlining(self) -> Self {
        Options {
            inline_functions: false,
            ..self
        }
    }

    pub fn no_dead_code(self) -> Self {
        Options {
            dead_code: false,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_options() {
        let options: Options = serde_yaml::from_str("inline_functions: false").unwrap();
        assert_eq!(options, Options::default().no_inlining());

        let options: Options = serde_json::from_str("{}").unwrap();
        assert_eq!(options, Options::default());
    }
}
