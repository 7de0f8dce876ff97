use crate::config::DeviceConfig;

/// Threadgroup grid for one device launch, `[x, y]` with x along N and y along M.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    pub groups: [usize; 2],
    pub threads_per_group: [usize; 2],
}

impl LaunchGeometry {
    /// One thread per element of C, padded up to whole `block x block` groups.
    pub fn general(m: usize, n: usize, config: &DeviceConfig) -> Self {
        LaunchGeometry {
            groups: [n.div_ceil(config.block), m.div_ceil(config.block)],
            threads_per_group: [config.block, config.block],
        }
    }

    /// One threadgroup of `threads()` lanes per `tile x tile` block of C.
    pub fn fast(m: usize, n: usize, config: &DeviceConfig) -> Self {
        LaunchGeometry {
            groups: [n.div_ceil(config.tile), m.div_ceil(config.tile)],
            threads_per_group: [config.threads(), 1],
        }
    }

    /// Total threads along each axis.
    pub fn global_size(&self) -> [usize; 2] {
        [
            self.groups[0] * self.threads_per_group[0],
            self.groups[1] * self.threads_per_group[1],
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.groups[0] == 0 || self.groups[1] == 0
    }
}
