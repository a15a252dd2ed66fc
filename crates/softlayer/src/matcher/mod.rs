//! Spec matching against the catalog cache.
//!
//! Matching is pure: it reads the cached catalog and the desired spec and
//! produces either a merged order template ([`object`]) or a package with
//! its matched price ids ([`package`]). Free-text catalog descriptions are
//! the only handle for several attributes, so substring and pattern
//! semantics are load-bearing.

pub mod object;
pub mod package;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::catalog::Catalog;
use crate::spec::DesiredSpec;

pub use package::{PackageSelection, SpecQuery, StorageGroup};

/// Option kinds of a create-object option set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKind {
    Datacenter,
    NetworkSpeed,
    OperatingSystem,
    Memory,
    Processors,
    BlockDevice,
    HardDrive,
}

impl std::fmt::Display for OptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Datacenter => "datacenter",
            Self::NetworkSpeed => "network speed",
            Self::OperatingSystem => "operating system",
            Self::Memory => "memory",
            Self::Processors => "processors",
            Self::BlockDevice => "block device",
            Self::HardDrive => "hard drive",
        })
    }
}

/// Why a spec could not be matched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    /// No option of a kind satisfies the requested value.
    #[error("no {kind} option matches '{requested}'")]
    Unmatched { kind: OptionKind, requested: String },

    /// No package satisfies every query.
    #[error("no bare metal package offers: {}", .unmatched.join("; "))]
    NoPackage { unmatched: Vec<String> },

    /// The chosen package lacks an item needed for a follow-up pass.
    #[error("package {package_id} has no '{requested}' item")]
    MissingItem { package_id: u64, requested: String },

    /// A storage group names an array type without a provider id.
    #[error("unknown array type '{0}'")]
    UnknownArrayType(String),

    /// A drive slot beyond the provider's last slot.
    #[error("drive slot {0} does not exist")]
    NoDriveSlot(u32),

    /// The spec lacks an attribute the matcher needs.
    #[error("{0} is not set")]
    Unset(&'static str),

    /// A query pattern failed to compile.
    #[error("invalid pattern for {query}: {message}")]
    Pattern { query: String, message: String },

    /// The named SSH key is not registered on the account.
    #[error("SSH key '{0}' is not registered on the account")]
    UnknownSshKey(String),
}

/// Result of matching a spec against a family's catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Merged create-object template (virtual server, bare metal instance).
    Template(Map<String, Value>),
    /// Package and price ids (bare metal server).
    Package(PackageSelection),
}

/// Match `spec` against the cached catalog of the driver's family.
///
/// # Errors
/// Returns a [`MatchError`] naming what could not be matched.
pub fn resolve(spec: &DesiredSpec, catalog: &Catalog) -> Result<Resolution, MatchError> {
    match catalog {
        Catalog::VirtualServer(options) => {
            object::resolve_virtual_server(spec, options).map(Resolution::Template)
        }
        Catalog::BareMetalInstance(options) => {
            object::resolve_bare_metal_instance(spec, options).map(Resolution::Template)
        }
        Catalog::BareMetalServer(packages) => {
            package::resolve(spec, packages).map(Resolution::Package)
        }
    }
}
