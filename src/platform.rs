//! Maps the host OS/arch pair to the earthlyls release binary shipped for it.

use std::fmt;
use std::str::FromStr;

use crate::error::ClientError;

/// The platforms earthlyls binaries are published for.
///
/// Keys follow the release artifact naming convention (`darwin-arm64` etc.),
/// which differs from Rust's own OS/arch names. The set is closed: anything
/// else fails resolution, there is no fallback binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    DarwinArm64,
    DarwinX64,
    LinuxX64,
    Win32X64,
}

impl Platform {
    pub const ALL: [Platform; 4] =
        [Platform::DarwinArm64, Platform::DarwinX64, Platform::LinuxX64, Platform::Win32X64];

    /// Resolve the platform of the current process.
    pub fn detect() -> Result<Self, ClientError> {
        Self::from_os_arch(std::env::consts::OS, std::env::consts::ARCH)
    }

    fn from_os_arch(os: &str, arch: &str) -> Result<Self, ClientError> {
        let os = match os {
            "macos" => "darwin",
            "windows" => "win32",
            other => other,
        };
        let arch = match arch {
            "aarch64" => "arm64",
            "x86_64" => "x64",
            other => other,
        };
        format!("{os}-{arch}").parse()
    }

    /// The canonical platform key.
    pub fn key(&self) -> &'static str {
        match self {
            Platform::DarwinArm64 => "darwin-arm64",
            Platform::DarwinX64 => "darwin-x64",
            Platform::LinuxX64 => "linux-x64",
            Platform::Win32X64 => "win32-x64",
        }
    }

    /// File name of the server binary shipped for this platform.
    pub fn server_executable(&self) -> &'static str {
        match self {
            Platform::DarwinArm64 => "earthlyls-macos-arm64",
            Platform::DarwinX64 => "earthlyls-macos-amd64",
            Platform::LinuxX64 => "earthlyls-linux-amd64",
            Platform::Win32X64 => "earthlyls-windows-amd64.exe",
        }
    }
}

impl FromStr for Platform {
    type Err = ClientError;

    /// Exact, case-sensitive match on the release key.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "darwin-arm64" => Ok(Platform::DarwinArm64),
            "darwin-x64" => Ok(Platform::DarwinX64),
            "linux-x64" => Ok(Platform::LinuxX64),
            "win32-x64" => Ok(Platform::Win32X64),
            other => Err(ClientError::UnsupportedPlatform(other.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
