/*!
 * Kernel Configuration
 *
 * Runtime configuration for table sizes, CPU count and scheduling cadence
 */

use super::errors::KernelError;
use super::limits;
use super::types::{Pid, Ticks};
use serde::{Deserialize, Serialize};

/// Kernel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct KernelConfig {
    /// Process table capacity
    pub nproc: usize,
    /// Thread table capacity per thread group
    pub nthread: usize,
    /// Open files per descriptor
    pub nofile: usize,
    /// CPUs driven by `SchedulerTask`
    pub ncpu: usize,
    /// Global ticks between priority boosts
    pub boost_interval: Ticks,
    /// Shared secret for `lock` / `unlock`
    pub escape_password: i32,
    /// Pids at or below this bound are never demoted
    pub demotion_exempt_pids: Pid,
    /// Kernel stacks available to descriptors
    pub kstack_pool: usize,
    /// User pages available to all address spaces together
    pub user_pages: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            nproc: limits::NPROC,
            nthread: limits::NTHREAD,
            nofile: limits::NOFILE,
            ncpu: limits::NCPU,
            boost_interval: limits::BOOST_INTERVAL,
            escape_password: limits::ESCAPE_PASSWORD,
            demotion_exempt_pids: limits::DEMOTION_EXEMPT_PIDS,
            kstack_pool: limits::DEFAULT_KSTACK_POOL,
            user_pages: limits::DEFAULT_USER_PAGES,
        }
    }
}

impl KernelConfig {
    /// Configuration sized for unit tests: small table, single CPU
    pub fn small() -> Self {
        Self {
            nproc: 8,
            kstack_pool: 8,
            user_pages: 256,
            ..Self::default()
        }
    }

    pub fn with_nproc(mut self, nproc: usize) -> Self {
        self.nproc = nproc;
        self
    }

    pub fn with_nthread(mut self, nthread: usize) -> Self {
        self.nthread = nthread;
        self
    }

    pub fn with_ncpu(mut self, ncpu: usize) -> Self {
        self.ncpu = ncpu;
        self
    }

    pub fn with_boost_interval(mut self, ticks: Ticks) -> Self {
        self.boost_interval = ticks;
        self
    }

    pub fn with_kstack_pool(mut self, stacks: usize) -> Self {
        self.kstack_pool = stacks;
        self
    }

    pub fn with_user_pages(mut self, pages: usize) -> Self {
        self.user_pages = pages;
        self
    }

    /// Build configuration from defaults overridden by `KERNEL_*` environment variables
    ///
    /// Environment variables:
    /// - KERNEL_NPROC: process table capacity
    /// - KERNEL_NCPU: number of scheduler CPUs
    /// - KERNEL_BOOST_INTERVAL: ticks between boosts
    /// - KERNEL_ESCAPE_PASSWORD: scheduler lock secret
    pub fn from_env() -> Result<Self, KernelError> {
        let mut config = Self::default();

        if let Some(v) = read_env("KERNEL_NPROC")? {
            config.nproc = v;
            config.kstack_pool = v;
        }
        if let Some(v) = read_env("KERNEL_NCPU")? {
            config.ncpu = v;
        }
        if let Some(v) = read_env("KERNEL_BOOST_INTERVAL")? {
            config.boost_interval = v;
        }
        if let Some(v) = read_env("KERNEL_ESCAPE_PASSWORD")? {
            config.escape_password = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the scheduler cannot run with
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.nproc < 2 {
            return Err(KernelError::Configuration(format!(
                "nproc must be at least 2, got {}",
                self.nproc
            )));
        }
        if self.nthread < 2 {
            return Err(KernelError::Configuration(format!(
                "nthread must be at least 2 (slot 0 is reserved), got {}",
                self.nthread
            )));
        }
        if self.ncpu == 0 {
            return Err(KernelError::Configuration("ncpu must be non-zero".into()));
        }
        if self.boost_interval == 0 {
            return Err(KernelError::Configuration(
                "boost_interval must be non-zero".into(),
            ));
        }
        if self.kstack_pool == 0 {
            return Err(KernelError::Configuration(
                "kstack_pool must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

fn read_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, KernelError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| KernelError::Configuration(format!("{key}: cannot parse {raw:?}"))),
        Err(_) => Ok(None),
    }
}
