//! Serializable summary of a parsed ECT, for `ectool json`.

use exynos_ect::{Block, Ect, Member};
use serde::Serialize;

/// Top-level summary.
#[derive(Debug, Serialize)]
pub struct EctSummary {
    /// Version tag.
    pub version: String,
    /// Declared blob size.
    pub total_size: u32,
    /// Blocks in table order.
    pub blocks: Vec<BlockSummary>,
}

/// One block and what it decoded to.
#[derive(Debug, Serialize)]
pub struct BlockSummary {
    /// Name as stored.
    pub name: String,
    /// Decode error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// DVFS domains.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<DomainSummary>,
    /// PLLs and their entry counts.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plls: Vec<(String, usize)>,
}

/// One DVFS domain.
#[derive(Debug, Serialize)]
pub struct DomainSummary {
    /// Domain name.
    pub name: String,
    /// Members by name or address.
    pub members: Vec<String>,
    /// Level frequencies in kHz.
    pub levels: Vec<u32>,
    /// Boot level index.
    pub boot_level_idx: i32,
}

impl EctSummary {
    /// Summarizes `ect`.
    pub fn new(ect: &Ect) -> Self {
        let header = ect.header();
        let blocks = ect
            .slots()
            .into_iter()
            .map(|(_, slot)| {
                let mut b = BlockSummary {
                    name: slot.name.clone(),
                    error: None,
                    domains: Vec::new(),
                    plls: Vec::new(),
                };
                match &slot.result {
                    Err(e) => b.error = Some(e.to_string()),
                    Ok(Block::Dvfs(h)) => {
                        b.domains = h
                            .domains
                            .iter()
                            .map(|d| DomainSummary {
                                name: d.name.clone(),
                                members: d
                                    .members
                                    .iter()
                                    .map(|m| match m {
                                        Member::Name(n) => n.clone(),
                                        Member::Sfr(a) => format!("{a:#010x}"),
                                    })
                                    .collect(),
                                levels: d.levels.iter().map(|l| l.level).collect(),
                                boot_level_idx: d.boot_level_idx,
                            })
                            .collect();
                    }
                    Ok(Block::Pll(h)) => {
                        b.plls = h
                            .plls
                            .iter()
                            .map(|p| (p.name.clone(), p.frequencies.len()))
                            .collect();
                    }
                    Ok(_) => {}
                }
                b
            })
            .collect();
        Self {
            version: header.version_str(),
            total_size: header.total_size,
            blocks,
        }
    }
}
