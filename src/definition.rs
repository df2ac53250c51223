//! Validated file definitions and their per-target plans.
//!
//! A [`FileDefinition`] describes one logical file: a URL template plus the
//! platform and architecture values substituted into it. Expanding a
//! definition yields one [`TargetPlan`] per (platform, architecture) pair, or
//! a single plan when the definition is platform independent. Resolving a plan
//! produces the concrete [`ResolvedTarget`] whose URL keys the lock store.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::hash::HashAlgorithm;
use crate::platform::{Architecture, HostTarget, Platform};
use crate::template::{self, TemplateError, TemplateVars};

/// Invariant violations in a definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    /// Architectures were given without platforms.
    #[error("file '{file_id}': architectures defined but platforms is missing")]
    MissingPlatforms {
        /// The file identifier.
        file_id: String,
    },

    /// Platforms were given without architectures.
    #[error("file '{file_id}': platforms defined but architectures is missing")]
    MissingArchitectures {
        /// The file identifier.
        file_id: String,
    },

    /// Overrides exist on a platform-independent definition.
    #[error("file '{file_id}': overrides require both platforms and architectures")]
    OverridesWithoutTargets {
        /// The file identifier.
        file_id: String,
    },

    /// An override names a target the definition does not declare.
    #[error("file '{file_id}': override '{target}' is not among the declared platforms/architectures")]
    UndeclaredOverride {
        /// The file identifier.
        file_id: String,
        /// The override key, as `platform/arch`.
        target: String,
    },
}

/// Per-target replacements for definition fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Override {
    /// Replacement URL template.
    pub url: Option<String>,
    /// Replacement destination.
    pub destination: Option<PathBuf>,
    /// Replacement hash algorithm.
    pub hash_algorithm: Option<HashAlgorithm>,
    /// Replacement include filters.
    pub extract_paths: Option<Vec<String>>,
}

/// One logical file to pin and fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDefinition {
    /// Unique identifier, the first key of the lock store.
    pub id: String,
    /// URL template.
    pub url: String,
    /// Value for `{version}`.
    pub version: Option<String>,
    /// Platform id → value for `{platform}`.
    pub platforms: BTreeMap<Platform, String>,
    /// Architecture id → value for `{arch}`.
    pub architectures: BTreeMap<Architecture, String>,
    /// Per-target overrides.
    pub overrides: BTreeMap<(Platform, Architecture), Override>,
    /// Where the file (or extracted archive) goes; relative to the
    /// configuration directory.
    pub destination: Option<PathBuf>,
    /// Whether the payload is an archive to extract.
    pub is_archive: bool,
    /// Leading path segments removed from archive entries.
    pub strip_components: usize,
    /// Archive entries to extract; empty means all.
    pub extract_paths: Vec<String>,
    /// Digest algorithm used when the target has no override.
    pub hash_algorithm: HashAlgorithm,
}

impl FileDefinition {
    /// Creates a platform-independent, non-archive definition.
    #[must_use]
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            version: None,
            platforms: BTreeMap::new(),
            architectures: BTreeMap::new(),
            overrides: BTreeMap::new(),
            destination: None,
            is_archive: false,
            strip_components: 0,
            extract_paths: Vec::new(),
            hash_algorithm: HashAlgorithm::default(),
        }
    }

    /// Reports whether the definition varies by platform and architecture.
    #[must_use]
    pub fn is_platform_specific(&self) -> bool {
        !self.platforms.is_empty()
    }

    /// Checks the platform/architecture/override invariants.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] describing the first violation.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let file_id = || self.id.clone();
        match (self.platforms.is_empty(), self.architectures.is_empty()) {
            (true, false) => return Err(DefinitionError::MissingPlatforms { file_id: file_id() }),
            (false, true) => {
                return Err(DefinitionError::MissingArchitectures { file_id: file_id() });
            }
            (true, true) if !self.overrides.is_empty() => {
                return Err(DefinitionError::OverridesWithoutTargets { file_id: file_id() });
            }
            _ => {}
        }
        for (platform, arch) in self.overrides.keys() {
            if !self.platforms.contains_key(platform) || !self.architectures.contains_key(arch) {
                return Err(DefinitionError::UndeclaredOverride {
                    file_id: file_id(),
                    target: format!("{platform}/{arch}"),
                });
            }
        }
        Ok(())
    }

    /// Every target this definition covers, in platform then architecture
    /// order.
    #[must_use]
    pub fn targets(&self) -> Vec<TargetPlan<'_>> {
        if !self.is_platform_specific() {
            return vec![TargetPlan::new(self, None)];
        }
        self.platforms
            .keys()
            .flat_map(|platform| {
                self.architectures
                    .keys()
                    .map(move |arch| TargetPlan::new(self, Some((*platform, *arch))))
            })
            .collect()
    }

    /// The target matching `host`, or `None` when the definition does not
    /// cover it.
    #[must_use]
    pub fn target_for(&self, host: HostTarget) -> Option<TargetPlan<'_>> {
        if !self.is_platform_specific() {
            return Some(TargetPlan::new(self, None));
        }
        let covered = self.platforms.contains_key(&host.platform)
            && self.architectures.contains_key(&host.arch);
        covered.then(|| TargetPlan::new(self, Some((host.platform, host.arch))))
    }
}

/// A definition narrowed to one target, with overrides applied.
#[derive(Debug, Clone, Copy)]
pub struct TargetPlan<'a> {
    definition: &'a FileDefinition,
    target: Option<(Platform, Architecture)>,
    overrides: Option<&'a Override>,
}

impl<'a> TargetPlan<'a> {
    fn new(definition: &'a FileDefinition, target: Option<(Platform, Architecture)>) -> Self {
        let overrides = target.and_then(|key| definition.overrides.get(&key));
        Self {
            definition,
            target,
            overrides,
        }
    }

    /// The definition this plan belongs to.
    #[must_use]
    pub const fn definition(&self) -> &'a FileDefinition {
        self.definition
    }

    /// The file identifier.
    #[must_use]
    pub fn file_id(&self) -> &'a str {
        &self.definition.id
    }

    /// The platform, when the definition is platform specific.
    #[must_use]
    pub fn platform(&self) -> Option<Platform> {
        self.target.map(|(platform, _)| platform)
    }

    /// The architecture, when the definition is platform specific.
    #[must_use]
    pub fn arch(&self) -> Option<Architecture> {
        self.target.map(|(_, arch)| arch)
    }

    /// The URL template after overrides.
    #[must_use]
    pub fn url_template(&self) -> &'a str {
        self.overrides
            .and_then(|o| o.url.as_deref())
            .unwrap_or(self.definition.url.as_str())
    }

    /// The digest algorithm after overrides.
    #[must_use]
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.overrides
            .and_then(|o| o.hash_algorithm)
            .unwrap_or(self.definition.hash_algorithm)
    }

    /// The destination after overrides.
    #[must_use]
    pub fn destination(&self) -> Option<&'a Path> {
        self.overrides
            .and_then(|o| o.destination.as_deref())
            .or(self.definition.destination.as_deref())
    }

    /// The archive include filters after overrides.
    #[must_use]
    pub fn extract_paths(&self) -> &'a [String] {
        self.overrides
            .and_then(|o| o.extract_paths.as_deref())
            .unwrap_or(self.definition.extract_paths.as_slice())
    }

    /// Expands the URL template for this target.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] when the template is malformed or uses a
    /// variable this target does not bind.
    pub fn resolve(&self) -> Result<ResolvedTarget, TemplateError> {
        let definition = self.definition;
        let vars = TemplateVars {
            version: definition.version.as_deref(),
            platform: self
                .platform()
                .and_then(|platform| definition.platforms.get(&platform))
                .map(String::as_str),
            arch: self
                .arch()
                .and_then(|arch| definition.architectures.get(&arch))
                .map(String::as_str),
        };
        let url = template::resolve(self.url_template(), vars)?;
        Ok(ResolvedTarget {
            file_id: definition.id.clone(),
            platform: self.platform(),
            arch: self.arch(),
            url,
        })
    }
}

/// A target with its concrete URL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResolvedTarget {
    /// The file identifier.
    pub file_id: String,
    /// The platform, when platform specific.
    pub platform: Option<Platform>,
    /// The architecture, when platform specific.
    pub arch: Option<Architecture>,
    /// The resolved URL.
    pub url: String,
}

impl fmt::Display for ResolvedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.platform, self.arch) {
            (Some(platform), Some(arch)) => {
                write!(f, "{} [{platform}/{arch}] {}", self.file_id, self.url)
            }
            _ => write!(f, "{} {}", self.file_id, self.url),
        }
    }
}
