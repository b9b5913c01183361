//! Domain kinds resolved from ECT domain names.

/// Name of the GPU DVFS domain.
pub const GPU_DOMAIN_NAME: &str = "dvfs_g3d";

/// What a DVFS/ASV domain drives.
///
/// Resolved once while parsing so later stages never compare names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainKind {
    /// The GPU (`dvfs_g3d`).
    Gpu,
    /// The memory interface (`dvfs_mif`).
    Mif,
    /// The internal bus (`dvfs_int`).
    Int,
    /// A CPU cluster (`dvfs_cpucl*`).
    Cpu,
    /// Anything else.
    Other,
}

impl DomainKind {
    /// Resolves the kind of a domain from its name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            GPU_DOMAIN_NAME => Self::Gpu,
            "dvfs_mif" => Self::Mif,
            "dvfs_int" => Self::Int,
            n if n.starts_with("dvfs_cpucl") => Self::Cpu,
            _ => Self::Other,
        }
    }
}
