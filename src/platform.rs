//! Platform and architecture identifiers.
//!
//! Definitions key their per-target template values by these identifiers, and
//! the download phase matches them against the host it runs on.

use std::fmt;
use std::str::FromStr;

/// Errors raised when an identifier is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    /// The platform identifier is not one of the supported values.
    #[error("unknown platform identifier '{value}' (expected one of: linux, macos, windows)")]
    UnknownPlatform {
        /// The rejected identifier.
        value: String,
    },

    /// The architecture identifier is not one of the supported values.
    #[error("unknown architecture identifier '{value}' (expected one of: amd64, arm64)")]
    UnknownArchitecture {
        /// The rejected identifier.
        value: String,
    },

    /// The running host has no matching identifier.
    #[error("unsupported host: os={os}, arch={arch}")]
    UnsupportedHost {
        /// Value of `std::env::consts::OS`.
        os: String,
        /// Value of `std::env::consts::ARCH`.
        arch: String,
    },
}

/// Operating system families a definition can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Platform {
    /// Linux.
    Linux,
    /// Apple macOS.
    Macos,
    /// Microsoft Windows.
    Windows,
}

impl Platform {
    /// Every supported platform, in identifier order.
    pub const ALL: [Self; 3] = [Self::Linux, Self::Macos, Self::Windows];

    /// Returns the configuration identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Macos => "macos",
            Self::Windows => "windows",
        }
    }

    /// Maps a `std::env::consts::OS` value onto a platform.
    #[must_use]
    pub fn from_host_os(os: &str) -> Option<Self> {
        match os {
            "linux" => Some(Self::Linux),
            "macos" => Some(Self::Macos),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = PlatformError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|platform| platform.as_str() == value)
            .ok_or_else(|| PlatformError::UnknownPlatform {
                value: value.to_owned(),
            })
    }
}

/// CPU architectures a definition can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Architecture {
    /// 64-bit x86.
    Amd64,
    /// 64-bit ARM.
    Arm64,
}

impl Architecture {
    /// Every supported architecture, in identifier order.
    pub const ALL: [Self; 2] = [Self::Amd64, Self::Arm64];

    /// Returns the configuration identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
        }
    }

    /// Maps a `std::env::consts::ARCH` value onto an architecture.
    #[must_use]
    pub fn from_host_arch(arch: &str) -> Option<Self> {
        match arch {
            "x86_64" => Some(Self::Amd64),
            "aarch64" => Some(Self::Arm64),
            _ => None,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = PlatformError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|arch| arch.as_str() == value)
            .ok_or_else(|| PlatformError::UnknownArchitecture {
                value: value.to_owned(),
            })
    }
}

/// The (platform, architecture) pair of a concrete host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostTarget {
    /// Host operating system.
    pub platform: Platform,
    /// Host CPU architecture.
    pub arch: Architecture,
}

impl HostTarget {
    /// Detects the host this process runs on.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::UnsupportedHost`] when either the OS or the
    /// architecture has no identifier.
    pub fn current() -> Result<Self, PlatformError> {
        Self::from_consts(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Builds a host target from raw `std::env::consts` values.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::UnsupportedHost`] when either value is not
    /// recognised.
    pub fn from_consts(os: &str, arch: &str) -> Result<Self, PlatformError> {
        match (Platform::from_host_os(os), Architecture::from_host_arch(arch)) {
            (Some(platform), Some(architecture)) => Ok(Self {
                platform,
                arch: architecture,
            }),
            _ => Err(PlatformError::UnsupportedHost {
                os: os.to_owned(),
                arch: arch.to_owned(),
            }),
        }
    }
}

impl fmt::Display for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.platform, self.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("linux", Platform::Linux)]
    #[case("macos", Platform::Macos)]
    #[case("windows", Platform::Windows)]
    fn parses_platform_identifiers(#[case] input: &str, #[case] expected: Platform) {
        assert_eq!(input.parse::<Platform>(), Ok(expected));
        assert_eq!(expected.to_string(), input);
    }

    #[rstest]
    #[case("darwin")]
    #[case("Linux")]
    #[case("")]
    fn rejects_unknown_platforms(#[case] input: &str) {
        assert!(matches!(
            input.parse::<Platform>(),
            Err(PlatformError::UnknownPlatform { .. })
        ));
    }

    #[rstest]
    #[case("amd64", Architecture::Amd64)]
    #[case("arm64", Architecture::Arm64)]
    fn parses_architecture_identifiers(#[case] input: &str, #[case] expected: Architecture) {
        assert_eq!(input.parse::<Architecture>(), Ok(expected));
    }

    #[test]
    fn rejects_raw_rust_arch_names() {
        assert!("x86_64".parse::<Architecture>().is_err());
    }

    #[rstest]
    #[case("linux", "x86_64", "linux/amd64")]
    #[case("macos", "aarch64", "macos/arm64")]
    #[case("windows", "x86_64", "windows/amd64")]
    fn maps_host_consts(#[case] os: &str, #[case] arch: &str, #[case] expected: &str) {
        let host = HostTarget::from_consts(os, arch).expect("supported host");
        assert_eq!(host.to_string(), expected);
    }

    #[rstest]
    #[case("freebsd", "x86_64")]
    #[case("linux", "riscv64")]
    fn rejects_unsupported_hosts(#[case] os: &str, #[case] arch: &str) {
        assert!(matches!(
            HostTarget::from_consts(os, arch),
            Err(PlatformError::UnsupportedHost { .. })
        ));
    }
}
