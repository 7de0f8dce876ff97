use std::fmt::Write;

use crate::error::{GemmError, Result};

/// Square threadgroup sides tried by [`DeviceConfig::fitted`], largest first.
pub const BLOCK_CANDIDATES: [usize; 5] = [16, 8, 4, 2, 1];

/// Work-group geometry for the device kernels.
///
/// `block` is the side of the square threadgroup used by the general kernels.
/// The fast NN kernel computes a `tile x tile` block of C per threadgroup,
/// walks K in chunks of `tile_k`, and gives each thread a `wpt x wpt`
/// micro-tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub block: usize,
    pub tile: usize,
    pub tile_k: usize,
    pub wpt: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            block: 16,
            tile: 64,
            tile_k: 16,
            wpt: 8,
        }
    }
}

impl DeviceConfig {
    /// Default geometry with the largest block whose square fits in
    /// `max_threads_per_group`.
    pub fn fitted(max_threads_per_group: usize) -> Result<Self> {
        let block = BLOCK_CANDIDATES
            .iter()
            .copied()
            .find(|b| b * b <= max_threads_per_group)
            .ok_or_else(|| {
                GemmError::InvalidConfig(format!(
                    "device allows {max_threads_per_group} threads per group"
                ))
            })?;
        let config = DeviceConfig {
            block,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Threads per threadgroup of the fast kernel.
    pub fn threads(&self) -> usize {
        (self.tile * self.tile) / (self.wpt * self.wpt)
    }

    /// Structural checks that do not depend on the device.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("block", self.block),
            ("tile", self.tile),
            ("tile_k", self.tile_k),
            ("wpt", self.wpt),
        ] {
            if value == 0 {
                return Err(GemmError::InvalidConfig(format!("{name} must be non-zero")));
            }
        }
        if self.tile % self.wpt != 0 {
            return Err(GemmError::InvalidConfig(format!(
                "tile {} is not a multiple of wpt {}",
                self.tile, self.wpt
            )));
        }
        Ok(())
    }

    /// Checks a general-kernel threadgroup against the device limit.
    pub fn check_block(&self, max_threads_per_group: usize) -> Result<()> {
        if self.block * self.block > max_threads_per_group {
            return Err(GemmError::InvalidConfig(format!(
                "block {0}x{0} exceeds {1} threads per group",
                self.block, max_threads_per_group
            )));
        }
        Ok(())
    }

    /// Checks the fast-kernel threadgroup against the device limit.
    pub fn check_fast(&self, max_threads_per_group: usize) -> Result<()> {
        if self.threads() > max_threads_per_group {
            return Err(GemmError::InvalidConfig(format!(
                "fast kernel needs {} threads per group, device allows {}",
                self.threads(),
                max_threads_per_group
            )));
        }
        Ok(())
    }

    /// Preprocessor preamble prepended to the shader sources.
    pub fn defines(&self) -> String {
        let mut out = String::new();
        for (name, value) in [
            ("BLOCK", self.block),
            ("TILE", self.tile),
            ("TILE_K", self.tile_k),
            ("WPT", self.wpt),
            ("THREADS", self.threads()),
        ] {
            let _ = writeln!(out, "#define {name} {value}");
        }
        out
    }
}
