//! Configuration loading for `pinfetch.toml`.
//!
//! The configuration file declares the files to pin and fetch. It is parsed
//! with `serde` and `toml`, then validated into [`FileDefinition`] values so
//! that the lock and download phases never see an inconsistent definition.
//! All validation happens before any network work.
//!
//! ```toml
//! version = "v1"
//! hash_algorithm = "sha256"
//!
//! [files.ripgrep]
//! url = "https://example.com/rg-{version}-{arch}-{platform}.tar.gz"
//! version = "14.1.0"
//! is_archive = true
//! strip_components = 1
//!
//! [files.ripgrep.platforms]
//! linux = "unknown-linux-musl"
//!
//! [files.ripgrep.architectures]
//! amd64 = "x86_64"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Deserialize;

use crate::definition::{DefinitionError, FileDefinition, Override};
use crate::hash::{HashAlgorithm, HashError};
use crate::platform::{Architecture, Platform, PlatformError};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "pinfetch.toml";

/// The configuration schema version this build understands.
pub const CONFIG_VERSION: &str = "v1";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// The configuration path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for the schema.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// The configuration path.
        path: PathBuf,
        /// Parser diagnostic.
        source: Box<toml::de::Error>,
    },

    /// The `version` key is absent.
    #[error("config version is missing (expected version = \"{CONFIG_VERSION}\")")]
    MissingVersion,

    /// The `version` key names an unknown schema.
    #[error("unsupported config version '{found}' (supported: {CONFIG_VERSION})")]
    UnsupportedVersion {
        /// The declared version.
        found: String,
    },

    /// A hash algorithm name is not supported.
    #[error("{scope}: {source}")]
    HashAlgorithm {
        /// Where the algorithm was declared.
        scope: String,
        /// The parse failure.
        source: HashError,
    },

    /// A file definition has no URL.
    #[error("file '{file_id}': url is required")]
    MissingUrl {
        /// The file identifier.
        file_id: String,
    },

    /// A platform or architecture identifier is not recognised.
    #[error("file '{file_id}': {source}")]
    Platform {
        /// The file identifier.
        file_id: String,
        /// The parse failure.
        source: PlatformError,
    },

    /// `strip_components` is negative.
    #[error("file '{file_id}': strip_components cannot be negative (got {value})")]
    NegativeStrip {
        /// The file identifier.
        file_id: String,
        /// The configured value.
        value: i64,
    },

    /// An override key is not of the form `platform/arch`.
    #[error("file '{file_id}': invalid override key '{key}', expected 'platform/arch'")]
    OverrideKey {
        /// The file identifier.
        file_id: String,
        /// The rejected key.
        key: String,
    },

    /// The definition breaks a platform/override invariant.
    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    version: Option<String>,
    hash_algorithm: Option<String>,
    #[serde(default)]
    files: BTreeMap<String, RawFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawFile {
    url: Option<String>,
    version: Option<String>,
    platforms: BTreeMap<String, String>,
    architectures: BTreeMap<String, String>,
    destination: Option<PathBuf>,
    is_archive: bool,
    strip_components: i64,
    extract_paths: Vec<String>,
    hash_algorithm: Option<String>,
    overrides: BTreeMap<String, RawOverride>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawOverride {
    url: Option<String>,
    destination: Option<PathBuf>,
    hash_algorithm: Option<String>,
    extract_paths: Option<Vec<String>>,
}

/// A loaded and validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    path: PathBuf,
    /// The global default digest algorithm.
    pub hash_algorithm: HashAlgorithm,
    /// Validated definitions, ordered by identifier.
    pub files: Vec<FileDefinition>,
}

impl Config {
    /// Reads and validates the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file cannot be read or parsed, or
    /// when any definition is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let absolute = std::path::absolute(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("loading config file {}", absolute.display());
        let text = std::fs::read_to_string(&absolute).map_err(|source| ConfigError::Read {
            path: absolute.clone(),
            source,
        })?;
        Self::from_toml(&text, absolute)
    }

    /// Parses and validates configuration text that notionally lives at
    /// `path`. Relative destinations resolve against `path`'s directory.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the text is not valid configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use pinfetch::config::Config;
    ///
    /// let text = concat!(
    ///     "version = \"v1\"\n",
    ///     "[files.readme]\n",
    ///     "url = \"https://example.com/README\"\n",
    /// );
    /// let config = Config::from_toml(text, "/project/pinfetch.toml".into())?;
    /// assert_eq!(config.files.len(), 1);
    /// assert_eq!(config.base_dir(), std::path::Path::new("/project"));
    /// # Ok::<(), pinfetch::config::ConfigError>(())
    /// ```
    pub fn from_toml(text: &str, path: PathBuf) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source: Box::new(source),
        })?;

        match raw.version.as_deref() {
            None => return Err(ConfigError::MissingVersion),
            Some(CONFIG_VERSION) => {}
            Some(other) => {
                return Err(ConfigError::UnsupportedVersion {
                    found: other.to_owned(),
                });
            }
        }
        let hash_algorithm = match raw.hash_algorithm.as_deref() {
            Some(name) => parse_algorithm(name, || "global hash_algorithm".to_owned())?,
            None => HashAlgorithm::default(),
        };
        if raw.files.is_empty() {
            warn!("no files defined in {}", path.display());
        }

        let files = raw
            .files
            .into_iter()
            .map(|(file_id, file)| build_definition(file_id, file, hash_algorithm))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            path,
            hash_algorithm,
            files,
        })
    }

    /// Path of the configuration file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the configuration file; relative destinations
    /// and the lock file live here.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

fn parse_algorithm(
    name: &str,
    scope: impl FnOnce() -> String,
) -> Result<HashAlgorithm, ConfigError> {
    name.parse().map_err(|source| ConfigError::HashAlgorithm {
        scope: scope(),
        source,
    })
}

fn build_definition(
    file_id: String,
    raw: RawFile,
    default_algorithm: HashAlgorithm,
) -> Result<FileDefinition, ConfigError> {
    let url = raw
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingUrl {
            file_id: file_id.clone(),
        })?;
    let hash_algorithm = match raw.hash_algorithm.as_deref() {
        Some(name) => parse_algorithm(name, || format!("file '{file_id}'"))?,
        None => default_algorithm,
    };
    let strip_components =
        usize::try_from(raw.strip_components).map_err(|_| ConfigError::NegativeStrip {
            file_id: file_id.clone(),
            value: raw.strip_components,
        })?;
    if !raw.is_archive && (strip_components > 0 || !raw.extract_paths.is_empty()) {
        warn!("file '{file_id}': strip_components and extract_paths are ignored when is_archive is false");
    }

    let platform_err = |source: PlatformError| ConfigError::Platform {
        file_id: file_id.clone(),
        source,
    };
    let platforms = raw
        .platforms
        .into_iter()
        .map(|(id, value)| Ok((id.parse::<Platform>().map_err(platform_err)?, value)))
        .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;
    let architectures = raw
        .architectures
        .into_iter()
        .map(|(id, value)| Ok((id.parse::<Architecture>().map_err(platform_err)?, value)))
        .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

    let mut overrides = BTreeMap::new();
    for (key, raw_override) in raw.overrides {
        let target = parse_override_key(&file_id, &key)?;
        let hash_override = match raw_override.hash_algorithm.as_deref() {
            Some(name) => Some(parse_algorithm(name, || {
                format!("file '{file_id}', override '{key}'")
            })?),
            None => None,
        };
        overrides.insert(
            target,
            Override {
                url: raw_override.url,
                destination: raw_override.destination,
                hash_algorithm: hash_override,
                extract_paths: raw_override.extract_paths,
            },
        );
    }

    let definition = FileDefinition {
        id: file_id,
        url,
        version: raw.version,
        platforms,
        architectures,
        overrides,
        destination: raw.destination,
        is_archive: raw.is_archive,
        strip_components,
        extract_paths: raw.extract_paths,
        hash_algorithm,
    };
    definition.validate()?;
    Ok(definition)
}

fn parse_override_key(
    file_id: &str,
    key: &str,
) -> Result<(Platform, Architecture), ConfigError> {
    let key_err = || ConfigError::OverrideKey {
        file_id: file_id.to_owned(),
        key: key.to_owned(),
    };
    let (platform, arch) = key.split_once('/').ok_or_else(key_err)?;
    let platform_err = |source: PlatformError| ConfigError::Platform {
        file_id: file_id.to_owned(),
        source,
    };
    Ok((
        platform.parse().map_err(platform_err)?,
        arch.parse().map_err(platform_err)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(source: &str) -> Result<Config, ConfigError> {
        Config::from_toml(source, PathBuf::from("/work/pinfetch.toml"))
    }

    #[rstest]
    fn parses_a_full_definition() {
        let source = concat!(
            "version = \"v1\"\n",
            "hash_algorithm = \"sha512\"\n",
            "[files.tool]\n",
            "url = \"https://dl.test/{version}/tool-{platform}-{arch}.tgz\"\n",
            "version = \"2.0\"\n",
            "destination = \"vendor/tool\"\n",
            "is_archive = true\n",
            "strip_components = 1\n",
            "extract_paths = [\"bin\"]\n",
            "[files.tool.platforms]\n",
            "linux = \"linux\"\n",
            "macos = \"darwin\"\n",
            "[files.tool.architectures]\n",
            "amd64 = \"x86_64\"\n",
            "[files.tool.overrides.\"macos/amd64\"]\n",
            "url = \"https://dl.test/mac.zip\"\n",
            "hash_algorithm = \"sha256\"\n",
        );

        let config = parse(source).expect("valid config");

        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha512);
        assert_eq!(config.base_dir(), Path::new("/work"));
        let tool = config.files.first().expect("one file");
        assert_eq!(tool.id, "tool");
        assert_eq!(tool.hash_algorithm, HashAlgorithm::Sha512);
        assert_eq!(tool.strip_components, 1);
        assert_eq!(tool.platforms.len(), 2);
        let mac = tool
            .overrides
            .get(&(Platform::Macos, Architecture::Amd64))
            .expect("override");
        assert_eq!(mac.hash_algorithm, Some(HashAlgorithm::Sha256));
        assert_eq!(tool.targets().len(), 2);
    }

    #[rstest]
    fn defaults_to_sha256() {
        let config = parse("version = \"v1\"\n[files.a]\nurl = \"https://dl.test/a\"\n")
            .expect("valid config");
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(
            config.files.first().expect("file").hash_algorithm,
            HashAlgorithm::Sha256
        );
    }

    #[rstest]
    fn accepts_an_empty_file_table() {
        let config = parse("version = \"v1\"\n").expect("valid config");
        assert!(config.files.is_empty());
    }

    #[rstest]
    #[case::missing_version("[files.a]\nurl = \"u\"\n", "version is missing")]
    #[case::wrong_version("version = \"v2\"\n", "unsupported config version 'v2'")]
    #[case::bad_global_algorithm(
        "version = \"v1\"\nhash_algorithm = \"md5\"\n",
        "global hash_algorithm"
    )]
    #[case::missing_url("version = \"v1\"\n[files.a]\nversion = \"1\"\n", "url is required")]
    #[case::bad_file_algorithm(
        "version = \"v1\"\n[files.a]\nurl = \"u\"\nhash_algorithm = \"crc32\"\n",
        "unsupported hash algorithm 'crc32'"
    )]
    #[case::negative_strip(
        "version = \"v1\"\n[files.a]\nurl = \"u\"\nis_archive = true\nstrip_components = -1\n",
        "cannot be negative"
    )]
    #[case::unknown_platform(
        "version = \"v1\"\n[files.a]\nurl = \"u\"\n[files.a.platforms]\nfreebsd = \"fb\"\n[files.a.architectures]\namd64 = \"x\"\n",
        "unknown platform identifier 'freebsd'"
    )]
    #[case::platforms_only(
        "version = \"v1\"\n[files.a]\nurl = \"u\"\n[files.a.platforms]\nlinux = \"l\"\n",
        "architectures is missing"
    )]
    #[case::overrides_without_maps(
        "version = \"v1\"\n[files.a]\nurl = \"u\"\n[files.a.overrides.\"linux/amd64\"]\nurl = \"v\"\n",
        "overrides require both"
    )]
    #[case::malformed_override_key(
        "version = \"v1\"\n[files.a]\nurl = \"u\"\n[files.a.platforms]\nlinux = \"l\"\n[files.a.architectures]\namd64 = \"x\"\n[files.a.overrides.linux]\nurl = \"v\"\n",
        "invalid override key 'linux'"
    )]
    #[case::undeclared_override(
        "version = \"v1\"\n[files.a]\nurl = \"u\"\n[files.a.platforms]\nlinux = \"l\"\n[files.a.architectures]\namd64 = \"x\"\n[files.a.overrides.\"linux/arm64\"]\nurl = \"v\"\n",
        "override 'linux/arm64'"
    )]
    fn rejects_invalid_configuration(#[case] source: &str, #[case] expected: &str) {
        let err = parse(source).expect_err("invalid config");
        let message = err.to_string();
        assert!(
            message.contains(expected),
            "expected '{expected}' in '{message}'"
        );
    }

    #[rstest]
    fn rejects_unknown_fields() {
        let outcome = parse("version = \"v1\"\n[files.a]\nurl = \"u\"\nchecksum = \"x\"\n");
        assert!(matches!(outcome, Err(ConfigError::Parse { .. })));
    }

    #[rstest]
    fn load_reports_missing_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = Config::load(&dir.path().join(CONFIG_FILE_NAME)).expect_err("missing");
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[rstest]
    fn load_resolves_the_base_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "version = \"v1\"\n").expect("write config");

        let config = Config::load(&path).expect("load");

        assert_eq!(config.base_dir(), dir.path());
    }
}
