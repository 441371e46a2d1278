use std::collections::BTreeSet;
use std::time::Duration;

/// Names bound in the namespace generated analysis code runs in.
pub const EXPOSED_NAMES: &[&str] = &["df", "pd", "np", "plt", "sns", "io", "base64"];

/// Variable the generated code must assign its findings to.
pub const RESULT_VARIABLE: &str = "results";

/// Capability policy for executing model-generated analysis code.
/// Only allow-listed modules may be imported and only [`EXPOSED_NAMES`] are
/// pre-bound; everything else in the interpreter's ambient surface is withheld.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    allowed_modules: BTreeSet<String>,
    pub timeout: Duration,
}

impl SandboxPolicy {
    /// Creates a policy with the default allow-list of tabular, numeric and plotting modules.
    pub fn new() -> Self {
        let modules = [
            "pandas",      // dataframes
            "numpy",       // arrays
            "matplotlib",  // plotting
            "seaborn",     // statistical plots
            "io",          // in-memory buffers for figure encoding
            "base64",      // inline figure encoding
            "math",
            "statistics",
            "datetime",
            "json",
            "collections",
            "itertools",
            "functools",
            "re",
            "warnings",
        ];

        Self {
            allowed_modules: modules.iter().map(|m| m.to_string()).collect(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Appends a top-level module to the allow-list.
    pub fn allow_module(&mut self, module: &str) {
        self.allowed_modules.insert(module.to_string());
    }

    /// A module is permitted if it, or one of its parent packages, is allow-listed.
    pub fn is_module_allowed(&self, module: &str) -> bool {
        self.allowed_modules.iter().any(|allowed| {
            module == allowed || module.starts_with(&format!("{}.", allowed))
        })
    }

    pub fn allowed_modules(&self) -> impl Iterator<Item = &str> {
        self.allowed_modules.iter().map(String::as_str)
    }
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submodules_of_allowed_packages_pass() {
        let policy = SandboxPolicy::new();
        assert!(policy.is_module_allowed("matplotlib.pyplot"));
        assert!(policy.is_module_allowed("pandas"));
    }

    #[test]
    fn test_ambient_modules_are_denied() {
        let policy = SandboxPolicy::new();
        for m in ["os", "subprocess", "socket", "sys", "shutil", "pandasx"] {
            assert!(!policy.is_module_allowed(m), "{m} should be denied");
        }
    }

    #[test]
    fn test_allow_module_extends_list() {
        let mut policy = SandboxPolicy::new();
        policy.allow_module("scipy");
        assert!(policy.is_module_allowed("scipy.stats"));
    }
}
