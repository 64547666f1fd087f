use crate::errors::CompilationError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum OptimizationLevel {
    /// Lowering only
    O0,
    /// Cast elision and dead member pruning
    O1,
    /// Adds finalization
    #[default]
    O2,
    /// Adds devirtualization
    O3,
    /// O1 in debug builds, O2 in release builds
    #[serde(rename = "auto")]
    Auto,
}

impl OptimizationLevel {
    /// Resolve `Auto` to a concrete level
    pub fn effective(self) -> OptimizationLevel {
        match self {
            OptimizationLevel::Auto if cfg!(debug_assertions) => OptimizationLevel::O1,
            OptimizationLevel::Auto => OptimizationLevel::O2,
            level => level,
        }
    }

    pub fn parse(text: &str) -> Option<OptimizationLevel> {
        match text.to_ascii_uppercase().as_str() {
            "O0" | "0" => Some(OptimizationLevel::O0),
            "O1" | "1" => Some(OptimizationLevel::O1),
            "O2" | "2" => Some(OptimizationLevel::O2),
            "O3" | "3" => Some(OptimizationLevel::O3),
            "AUTO" => Some(OptimizationLevel::Auto),
            _ => None,
        }
    }
}

/// Options that control the optimizer driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerOptions {
    /// Optimization level (default: O2)
    #[serde(default)]
    pub level: OptimizationLevel,

    /// Upper bound on fixed-point iterations (default: 100)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Maintain the call graph and modification ledger so passes can
    /// revisit only what changed (default: true)
    #[serde(default = "default_true")]
    pub incremental: bool,

    /// Run the consistency checker after every pass (default: on in debug
    /// builds)
    #[serde(default = "default_verify")]
    pub verify_after_each_pass: bool,

    /// Keep `assert` statements (default: false)
    #[serde(default)]
    pub enable_assertions: bool,

    /// Lower `long` arithmetic to runtime calls (default: true)
    #[serde(default = "default_true")]
    pub emulate_longs: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_iterations() -> usize {
    100
}

fn default_verify() -> bool {
    cfg!(debug_assertions)
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            level: OptimizationLevel::default(),
            max_iterations: default_max_iterations(),
            incremental: true,
            verify_after_each_pass: default_verify(),
            enable_assertions: false,
            emulate_longs: true,
        }
    }
}

/// Main compiler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerConfig {
    #[serde(default)]
    pub optimizer: OptimizerOptions,

    /// Pretty-print diagnostics (default: true)
    #[serde(default = "default_true")]
    pub pretty: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            optimizer: OptimizerOptions::default(),
            pretty: true,
        }
    }
}

/// Values given on the command line; `None` keeps the file's value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub level: Option<OptimizationLevel>,
    pub max_iterations: Option<usize>,
    pub incremental: Option<bool>,
    pub verify_after_each_pass: Option<bool>,
    pub enable_assertions: Option<bool>,
    pub emulate_longs: Option<bool>,
}

impl CompilerConfig {
    /// Load configuration from a YAML or JSON file, chosen by extension
    pub fn from_file(path: &Path) -> Result<Self, CompilationError> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, CompilationError> {
        serde_yaml::from_str(content).map_err(|e| CompilationError::ConfigError(e.to_string()))
    }

    pub fn from_json_str(content: &str) -> Result<Self, CompilationError> {
        serde_json::from_str(content).map_err(|e| CompilationError::ConfigError(e.to_string()))
    }

    /// Create a default configuration and write it to a file
    pub fn init_file(path: &Path) -> Result<(), CompilationError> {
        let config = CompilerConfig::default();
        let text = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::to_string(&config)
                .map_err(|e| CompilationError::ConfigError(e.to_string()))?,
            _ => serde_json::to_string_pretty(&config)
                .map_err(|e| CompilationError::ConfigError(e.to_string()))?,
        };
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Apply CLI overrides on top of the loaded configuration
    pub fn merge_with_cli(&mut self, cli: &CliOverrides) {
        let options = &mut self.optimizer;
        if let Some(level) = cli.level {
            options.level = level;
        }
        if let Some(max_iterations) = cli.max_iterations {
            options.max_iterations = max_iterations;
        }
        if let Some(incremental) = cli.incremental {
            options.incremental = incremental;
        }
        if let Some(verify) = cli.verify_after_each_pass {
            options.verify_after_each_pass = verify;
        }
        if let Some(enable_assertions) = cli.enable_assertions {
            options.enable_assertions = enable_assertions;
        }
        if let Some(emulate_longs) = cli.emulate_longs {
            options.emulate_longs = emulate_longs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = CompilerConfig::default();
        assert_eq!(config.optimizer.level, OptimizationLevel::O2);
        assert_eq!(config.optimizer.max_iterations, 100);
        assert!(config.optimizer.incremental);
        assert!(!config.optimizer.enable_assertions);
    }

    #[test]
    fn test_serialize_config() {
        let config = CompilerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("maxIterations"));
        assert!(json.contains("verifyAfterEachPass"));
    }

    #[test]
    fn test_deserialize_yaml_with_defaults() {
        let yaml = "optimizer:\n  level: O3\n  incremental: false\n";
        let config = CompilerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.optimizer.level, OptimizationLevel::O3);
        assert!(!config.optimizer.incremental);
        assert!(config.optimizer.emulate_longs);
        assert!(config.pretty);
    }

    #[test]
    fn test_bad_config_is_config_error() {
        let err = CompilerConfig::from_json_str("{\"optimizer\": {\"level\": \"O9\"}}").unwrap_err();
        assert!(matches!(err, CompilationError::ConfigError(_)));
    }

    #[test]
    fn test_from_file_picks_format_by_extension() {
        let dir = TempDir::new().unwrap();
        let yaml_path = dir.path().join("opal.yaml");
        std::fs::write(&yaml_path, "optimizer:\n  maxIterations: 3\n").unwrap();
        assert_eq!(
            CompilerConfig::from_file(&yaml_path).unwrap().optimizer.max_iterations,
            3
        );

        let json_path = dir.path().join("opal.json");
        CompilerConfig::init_file(&json_path).unwrap();
        assert_eq!(
            CompilerConfig::from_file(&json_path).unwrap(),
            CompilerConfig::default()
        );
    }

    #[test]
    fn test_cli_overrides_only_touch_given_values() {
        let mut config = CompilerConfig::default();
        config.merge_with_cli(&CliOverrides {
            level: Some(OptimizationLevel::O0),
            enable_assertions: Some(true),
            ..Default::default()
        });
        assert_eq!(config.optimizer.level, OptimizationLevel::O0);
        assert!(config.optimizer.enable_assertions);
        assert_eq!(config.optimizer.max_iterations, 100);
    }

    #[test]
    fn test_effective_level() {
        assert_eq!(OptimizationLevel::O3.effective(), OptimizationLevel::O3);
        assert_ne!(OptimizationLevel::Auto.effective(), OptimizationLevel::Auto);
        assert_eq!(OptimizationLevel::parse("o1"), Some(OptimizationLevel::O1));
        assert_eq!(OptimizationLevel::parse("fast"), None);
    }
}
