//! Typed paths into an F4PGA install tree.
//!
//! The tree is rooted at `F4PGA_INSTALL_DIR`; the FPGA family selected by
//! `FPGA_FAM` picks the subtree holding the share and bin directories.
use crate::module::Roots;
use anyhow::{anyhow, Result};
use std::env;
use std::path::{Path, PathBuf};

pub const INSTALL_DIR_ENV: &str = "F4PGA_INSTALL_DIR";
pub const FAMILY_ENV: &str = "FPGA_FAM";
pub const SHARE_DIR_ENV: &str = "F4PGA_SHARE_DIR";

/// Families with a flow tree in the install directory.
pub const FAMILIES: [&str; 4] = ["xc7", "eos-s3", "qlf_k4n8", "ice40"];
pub const DEFAULT_FAMILY: &str = "xc7";

/// Locations of the assets the engine reads from the install tree.
#[derive(Debug, Clone)]
pub struct InstallPaths {
    family: String,
    share: PathBuf,
    bin: PathBuf,
}

impl InstallPaths {
    /// Build the layout for `family` under `install_dir`.
    pub fn new(install_dir: &Path, family: &str, share_override: Option<PathBuf>) -> Result<Self> {
        if !FAMILIES.contains(&family) {
            return Err(anyhow!(
                "unsupported FPGA family `{family}` (expected one of: {})",
                FAMILIES.join(", ")
            ));
        }
        let family_root = install_dir.join(family);
        let share = share_override.unwrap_or_else(|| family_root.join("share").join("f4pga"));
        Ok(Self {
            family: family.to_string(),
            share,
            bin: family_root.join("bin"),
        })
    }

    /// Read the layout from `F4PGA_INSTALL_DIR`, `FPGA_FAM` and `F4PGA_SHARE_DIR`.
    pub fn from_env() -> Result<Self> {
        let install_dir = env::var_os(INSTALL_DIR_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("{INSTALL_DIR_ENV} is not set; point it at the F4PGA install tree"))?;
        let family = env::var(FAMILY_ENV).unwrap_or_else(|_| DEFAULT_FAMILY.to_string());
        let share = env::var_os(SHARE_DIR_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Self::new(&install_dir, &family, share)
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn share_dir(&self) -> &Path {
        &self.share
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin
    }

    pub fn aux_dir(&self) -> PathBuf {
        self.share.join("aux")
    }

    /// Return the `flows/` directory under the share dir.
    pub fn flows_dir(&self) -> PathBuf {
        self.share.join("flows")
    }

    /// Return the `flows/part_db.yml` path.
    pub fn part_db_path(&self) -> PathBuf {
        self.flows_dir().join("part_db.yml")
    }

    /// Return the `flows/platforms/<platform>.yml` path.
    pub fn platform_path(&self, platform: &str) -> PathBuf {
        self.flows_dir()
            .join("platforms")
            .join(format!("{platform}.yml"))
    }

    pub fn roots(&self) -> Roots {
        Roots {
            share: self.share.clone(),
            bin: self.bin.clone(),
            aux: self.aux_dir(),
        }
    }
}
