//! TOML calibration settings.
//!
//! Every key is optional; anything left out keeps the built-in default.
//!
//! ```toml
//! asv_table_version = 1
//! value_policy = "nearest-rate"
//! volt_offset_percent = -5
//! extra_gpu_rates = [910000, 100000]
//!
//! [init_margins]
//! g3d = 12500
//!
//! [[operating_points]]
//! rate_khz = 910000
//! volt_uv = 875000
//!
//! [[pll_table]]
//! frequency = 910000000
//! p = 4
//! m = 140
//! s = 0
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use exynos_cal::{CalConfig, MarginCategory, OperatingPoint, OverrideValuePolicy};
use exynos_ect::PllFrequency;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    asv_table_version: Option<u32>,
    value_policy: Option<Policy>,
    volt_offset_percent: Option<i32>,
    extra_gpu_rates: Option<Vec<u32>>,
    #[serde(default)]
    init_margins: BTreeMap<String, i32>,
    operating_points: Option<Vec<PointEntry>>,
    pll_table: Option<Vec<PllEntry>>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum Policy {
    IdentityIndex,
    NearestRate,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PointEntry {
    rate_khz: u32,
    volt_uv: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PllEntry {
    frequency: u32,
    p: u32,
    m: u32,
    s: u32,
    #[serde(default)]
    k: u32,
}

/// Reads settings from `path`, or returns the defaults.
pub fn load(path: Option<&Path>) -> Result<CalConfig> {
    let Some(path) = path else {
        return Ok(CalConfig::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Parses settings from TOML text.
pub fn parse(text: &str) -> Result<CalConfig> {
    let file: FileConfig = toml::from_str(text)?;
    let mut config = CalConfig::default();

    config.asv_table_version = file.asv_table_version;
    if let Some(p) = file.value_policy {
        config.value_policy = match p {
            Policy::IdentityIndex => OverrideValuePolicy::IdentityIndex,
            Policy::NearestRate => OverrideValuePolicy::NearestRate,
        };
    }
    if let Some(pct) = file.volt_offset_percent {
        if !(-100..=100).contains(&pct) {
            bail!("volt_offset_percent {pct} outside -100..=100");
        }
        config.volt_offset_percent = pct;
    }
    if let Some(rates) = file.extra_gpu_rates {
        config.extra_gpu_rates = rates;
    }
    for (name, uv) in &file.init_margins {
        let Some(cat) = MarginCategory::from_name(name) else {
            bail!("unknown margin category {name:?}");
        };
        config.init_margins[cat.index()] = *uv;
    }
    if let Some(points) = file.operating_points {
        if points.windows(2).any(|w| w[0].rate_khz <= w[1].rate_khz) {
            bail!("operating_points must be sorted by descending rate_khz");
        }
        config.operating_points = points
            .iter()
            .map(|p| OperatingPoint::new(p.rate_khz, p.volt_uv))
            .collect();
    }
    if let Some(plls) = file.pll_table {
        config.pll_table = plls
            .iter()
            .map(|e| PllFrequency::new(e.frequency, e.p, e.m, e.s, e.k))
            .collect();
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        assert_eq!(parse("").unwrap(), CalConfig::default());
    }

    #[test]
    fn every_key() {
        let c = parse(
            r#"
            asv_table_version = 2
            value_policy = "identity-index"
            volt_offset_percent = -5
            extra_gpu_rates = [100000]

            [init_margins]
            g3d = 12500

            [[operating_points]]
            rate_khz = 500000
            volt_uv = 700000

            [[operating_points]]
            rate_khz = 400000
            volt_uv = 650000

            [[pll_table]]
            frequency = 500000000
            p = 13
            m = 250
            s = 0
            "#,
        )
        .unwrap();
        assert_eq!(c.asv_table_version, Some(2));
        assert_eq!(c.value_policy, OverrideValuePolicy::IdentityIndex);
        assert_eq!(c.volt_offset_percent, -5);
        assert_eq!(c.extra_gpu_rates, vec![100_000]);
        assert_eq!(c.init_margin(MarginCategory::G3d), 12_500);
        assert_eq!(c.operating_points.len(), 2);
        assert_eq!(c.pll_table, vec![PllFrequency::new(500_000_000, 13, 250, 0, 0)]);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse("volt_offset_percent = 150").is_err());
        assert!(parse("[init_margins]\ngpu = 1").is_err());
        assert!(parse("unknown = 1").is_err());
        assert!(
            parse("[[operating_points]]\nrate_khz = 1\nvolt_uv = 1\n[[operating_points]]\nrate_khz = 2\nvolt_uv = 1")
                .is_err()
        );
    }
}
