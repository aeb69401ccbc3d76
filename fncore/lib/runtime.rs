//! Runtime registry: the enumerated mapping from runtime identifiers to
//! container images, plus the per-family dependency-installation mechanics.
//!
//! The registry is plain data injected at startup; configuration can add or
//! override entries without touching the orchestrator. Lookups happen before
//! any cluster call, so an unsupported runtime fails fast.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{FncoreError, FncoreResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Version-specifier prefixes that are passed through untouched.
const EXPLICIT_SPEC_PREFIXES: [&str; 8] = ["==", ">=", "<=", ">", "<", "~", "^", "@"];

/// Shared volume path dependencies are installed into.
const PACKAGES_DIR: &str = "/packages";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Language family of a runtime, which determines package-manager mechanics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeFamily {
    /// pip-style installation.
    Python,

    /// npm-style installation.
    NodeJs,

    /// gem-style installation.
    Ruby,

    /// maven-style installation.
    Java,

    /// NuGet-style installation.
    DotNet,

    /// No package manager; dependencies are skipped.
    Bash,

    /// go-module-style installation.
    Go,
}

/// A registered runtime: the image that hosts it and its family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSpec {
    /// Container image reference for the runtime.
    pub image: String,

    /// Language family of the runtime.
    pub family: RuntimeFamily,
}

/// The runtime → image registry consulted on every deploy.
#[derive(Debug, Clone)]
pub struct RuntimeRegistry {
    entries: HashMap<String, RuntimeSpec>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RuntimeFamily {
    /// The family name as used in depset records.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeFamily::Python => "python",
            RuntimeFamily::NodeJs => "nodejs",
            RuntimeFamily::Ruby => "ruby",
            RuntimeFamily::Java => "java",
            RuntimeFamily::DotNet => "dotnet",
            RuntimeFamily::Bash => "bash",
            RuntimeFamily::Go => "go",
        }
    }

    /// Parses a stored family string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "python" => Some(RuntimeFamily::Python),
            "nodejs" => Some(RuntimeFamily::NodeJs),
            "ruby" => Some(RuntimeFamily::Ruby),
            "java" => Some(RuntimeFamily::Java),
            "dotnet" => Some(RuntimeFamily::DotNet),
            "bash" => Some(RuntimeFamily::Bash),
            "go" => Some(RuntimeFamily::Go),
            _ => None,
        }
    }

    /// Formats a (package, version) pair the way this family's package
    /// manager expects it.
    ///
    /// Specifiers that already carry an operator (`==1.0`, `>=2`, `@next`,
    /// `~1.2`) pass through unchanged.
    pub fn format_package(&self, name: &str, version_spec: Option<&str>) -> String {
        let Some(version) = version_spec.map(str::trim).filter(|v| !v.is_empty()) else {
            return name.to_string();
        };

        if EXPLICIT_SPEC_PREFIXES.iter().any(|p| version.starts_with(p)) {
            return format!("{}{}", name, version);
        }

        match self {
            RuntimeFamily::Python => format!("{}=={}", name, version),
            RuntimeFamily::NodeJs => format!("{}@{}", name, version),
            RuntimeFamily::Ruby => format!("{} -v {}", name, version),
            _ => format!("{}=={}", name, version),
        }
    }

    /// Builds the init-step shell command that installs `packages` into the
    /// shared volume, or `None` for families without an install step.
    pub fn install_command(&self, packages: &[String]) -> Option<Vec<String>> {
        if packages.is_empty() {
            return None;
        }

        let script = match self {
            RuntimeFamily::Python => {
                format!("pip install --target {} {}", PACKAGES_DIR, packages.join(" "))
            }
            RuntimeFamily::NodeJs => {
                format!("cd {} && npm install {}", PACKAGES_DIR, packages.join(" "))
            }
            RuntimeFamily::Ruby => packages
                .iter()
                .map(|p| format!("gem install --install-dir {} {}", PACKAGES_DIR, p))
                .collect::<Vec<_>>()
                .join(" && "),
            RuntimeFamily::Java => format!(
                "mvn dependency:copy-dependencies -DoutputDirectory={} {}",
                PACKAGES_DIR,
                packages
                    .iter()
                    .map(|p| format!("-Dartifact={}", p))
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
            RuntimeFamily::DotNet => format!(
                "cd {} && dotnet new classlib -o temp && cd temp && {}",
                PACKAGES_DIR,
                packages
                    .iter()
                    .map(|p| format!("dotnet add package {}", p))
                    .collect::<Vec<_>>()
                    .join(" && ")
            ),
            RuntimeFamily::Go => format!(
                "export GOMODCACHE={dir}/pkg/mod && mkdir -p {dir}/pkg/mod && cd {dir} && \
                 go mod init function && go get {pkgs} && go mod download",
                dir = PACKAGES_DIR,
                pkgs = packages.join(" ")
            ),
            RuntimeFamily::Bash => return None,
        };

        Some(vec!["sh".to_string(), "-c".to_string(), script])
    }

    /// Environment variables the main container needs so the runtime finds
    /// packages installed into the shared volume.
    pub fn package_env(&self) -> Vec<(String, String)> {
        match self {
            RuntimeFamily::Python => vec![(
                "PYTHONPATH".to_string(),
                format!("{}:$PYTHONPATH", PACKAGES_DIR),
            )],
            RuntimeFamily::NodeJs => vec![(
                "NODE_PATH".to_string(),
                format!("{}/node_modules", PACKAGES_DIR),
            )],
            RuntimeFamily::Ruby => vec![(
                "GEM_PATH".to_string(),
                format!("{}:$GEM_PATH", PACKAGES_DIR),
            )],
            RuntimeFamily::Java => vec![(
                "CLASSPATH".to_string(),
                format!("{}/*:$CLASSPATH", PACKAGES_DIR),
            )],
            RuntimeFamily::Go => vec![
                ("GOPATH".to_string(), PACKAGES_DIR.to_string()),
                ("GOMODCACHE".to_string(), format!("{}/pkg/mod", PACKAGES_DIR)),
                ("GOCACHE".to_string(), "/tmp/go-build".to_string()),
            ],
            RuntimeFamily::DotNet | RuntimeFamily::Bash => vec![],
        }
    }
}

impl RuntimeRegistry {
    /// Creates a registry with the built-in runtime table, images prefixed
    /// with `image_prefix` (e.g. prefix `fncore` → `fncore-python:3.11`).
    pub fn with_defaults(image_prefix: &str) -> Self {
        use RuntimeFamily::*;

        let defaults: [(&str, RuntimeFamily, &str, &str); 16] = [
            ("python3.9", Python, "python", "3.9"),
            ("python3.10", Python, "python", "3.10"),
            ("python3.11", Python, "python", "3.11"),
            ("python3.12", Python, "python", "3.12"),
            ("python3.13", Python, "python", "3.13"),
            ("python3.14", Python, "python", "3.14"),
            ("nodejs20", NodeJs, "nodejs", "20"),
            ("nodejs24", NodeJs, "nodejs", "24"),
            ("nodejs25", NodeJs, "nodejs", "25"),
            ("ruby3.4", Ruby, "ruby", "3.4"),
            ("java27", Java, "java", "27"),
            ("dotnet8", DotNet, "dotnet", "8"),
            ("dotnet9", DotNet, "dotnet", "9"),
            ("dotnet10", DotNet, "dotnet", "10"),
            ("bash5", Bash, "bash", "5"),
            ("go1.25", Go, "go", "1.25"),
        ];

        let entries = defaults
            .into_iter()
            .map(|(name, family, image_family, version)| {
                (
                    name.to_string(),
                    RuntimeSpec {
                        image: format!("{}-{}:{}", image_prefix, image_family, version),
                        family,
                    },
                )
            })
            .collect();

        Self { entries }
    }

    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Adds or overrides an entry.
    pub fn insert(&mut self, runtime: impl Into<String>, spec: RuntimeSpec) {
        self.entries.insert(runtime.into(), spec);
    }

    /// Looks up a runtime, failing with `UnsupportedRuntime` when absent.
    pub fn get(&self, runtime: &str) -> FncoreResult<&RuntimeSpec> {
        self.entries
            .get(runtime)
            .ok_or_else(|| FncoreError::UnsupportedRuntime(runtime.to_string()))
    }

    /// Whether the runtime is registered.
    pub fn contains(&self, runtime: &str) -> bool {
        self.entries.contains_key(runtime)
    }

    /// Registered runtime identifiers.
    pub fn runtimes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_resolves_known_runtimes() {
        let registry = RuntimeRegistry::with_defaults("fncore");

        let spec = registry.get("python3.11").unwrap();
        assert_eq!(spec.image, "fncore-python:3.11");
        assert_eq!(spec.family, RuntimeFamily::Python);

        let spec = registry.get("nodejs20").unwrap();
        assert_eq!(spec.image, "fncore-nodejs:20");

        let spec = registry.get("go1.25").unwrap();
        assert_eq!(spec.family, RuntimeFamily::Go);
    }

    #[test]
    fn test_unsupported_runtime_fails() {
        let registry = RuntimeRegistry::with_defaults("fncore");
        let err = registry.get("cobol85").unwrap_err();
        assert!(matches!(err, FncoreError::UnsupportedRuntime(r) if r == "cobol85"));
    }

    #[test]
    fn test_registry_overrides() {
        let mut registry = RuntimeRegistry::with_defaults("fncore");
        registry.insert(
            "python3.11",
            RuntimeSpec {
                image: "registry.internal/custom-python:3.11".to_string(),
                family: RuntimeFamily::Python,
            },
        );
        assert_eq!(
            registry.get("python3.11").unwrap().image,
            "registry.internal/custom-python:3.11"
        );
    }

    #[test]
    fn test_format_package_by_family() {
        let py = RuntimeFamily::Python;
        assert_eq!(py.format_package("requests", Some("2.31.0")), "requests==2.31.0");
        assert_eq!(py.format_package("requests", None), "requests");
        assert_eq!(py.format_package("requests", Some("")), "requests");

        let node = RuntimeFamily::NodeJs;
        assert_eq!(node.format_package("express", Some("4.18.2")), "express@4.18.2");

        let ruby = RuntimeFamily::Ruby;
        assert_eq!(ruby.format_package("sinatra", Some("3.1.0")), "sinatra -v 3.1.0");

        // Explicit operators pass through for any family.
        assert_eq!(py.format_package("requests", Some(">=2.0")), "requests>=2.0");
        assert_eq!(node.format_package("express", Some("@next")), "express@next");
        assert_eq!(
            RuntimeFamily::Java.format_package("junit:junit", Some("4.13")),
            "junit:junit==4.13"
        );
    }

    #[test]
    fn test_install_commands() {
        let packages = vec!["requests==2.31.0".to_string(), "flask==3.0.0".to_string()];

        let cmd = RuntimeFamily::Python.install_command(&packages).unwrap();
        assert_eq!(cmd[0], "sh");
        assert_eq!(cmd[1], "-c");
        assert_eq!(cmd[2], "pip install --target /packages requests==2.31.0 flask==3.0.0");

        let cmd = RuntimeFamily::Ruby
            .install_command(&["sinatra -v 3.1.0".to_string()])
            .unwrap();
        assert!(cmd[2].contains("gem install --install-dir /packages sinatra -v 3.1.0"));

        let cmd = RuntimeFamily::Go
            .install_command(&["github.com/gin-gonic/gin@v1.9.0".to_string()])
            .unwrap();
        assert!(cmd[2].contains("go mod init function"));
        assert!(cmd[2].contains("go get github.com/gin-gonic/gin@v1.9.0"));

        // Bash has no install step, and empty lists never produce one.
        assert!(RuntimeFamily::Bash.install_command(&packages).is_none());
        assert!(RuntimeFamily::Python.install_command(&[]).is_none());
    }

    #[test]
    fn test_package_env() {
        let env = RuntimeFamily::Python.package_env();
        assert_eq!(env[0].0, "PYTHONPATH");

        let env = RuntimeFamily::Go.package_env();
        assert!(env.iter().any(|(k, _)| k == "GOPATH"));

        assert!(RuntimeFamily::Bash.package_env().is_empty());
    }
}
