//! Device
//!
//! Device selection and the execution context every training and prediction
//! call runs in. CUDA devices are emulated on the host: their work runs on
//! the context's thread pool.
use crate::errors::BoostError;
use log::debug;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
}

impl Device {
    pub fn is_cuda(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }

    /// Check the device exists in the inventory.
    pub fn validate(&self, inventory: &DeviceInventory) -> Result<(), BoostError> {
        match self {
            Device::Cpu => Ok(()),
            Device::Cuda(ordinal) => {
                if *ordinal >= inventory.cuda_devices {
                    Err(BoostError::InvalidDeviceOrdinal {
                        ordinal: *ordinal,
                        available: inventory.cuda_devices,
                    })
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl FromStr for Device {
    type Err = BoostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || {
            BoostError::ParseString(
                s.to_string(),
                "Device".to_string(),
                "cpu, cuda, cuda:<ordinal>".to_string(),
            )
        };
        match s {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(0)),
            _ => {
                let ordinal = s.strip_prefix("cuda:").ok_or_else(err)?;
                ordinal.parse::<usize>().map(Device::Cuda).map_err(|_| err())
            }
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
        }
    }
}

/// Devices visible to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceInventory {
    pub cuda_devices: usize,
}

impl DeviceInventory {
    pub fn new(cuda_devices: usize) -> Self {
        DeviceInventory { cuda_devices }
    }

    /// Count the devices listed in `CUDA_VISIBLE_DEVICES`.
    pub fn detect() -> Self {
        let cuda_devices = std::env::var("CUDA_VISIBLE_DEVICES")
            .map(|v| Self::count_visible(&v))
            .unwrap_or(0);
        DeviceInventory { cuda_devices }
    }

    fn count_visible(value: &str) -> usize {
        // A negative id hides itself and every device listed after it.
        value
            .split(',')
            .map(str::trim)
            .take_while(|d| !d.is_empty() && !d.starts_with('-'))
            .count()
    }
}

/// A device bound to the thread pool its work runs on.
pub struct ExecutionContext {
    pub device: Device,
    pub pool: ThreadPool,
}

impl ExecutionContext {
    /// Build the context, `num_threads` of `None` uses every available core.
    pub fn new(device: Device, num_threads: Option<usize>) -> Result<Self, BoostError> {
        let num_threads = match num_threads {
            Some(n) if n > 0 => n,
            _ => std::thread::available_parallelism().map_or(1, |n| n.get()),
        };
        let prefix = device.to_string();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(move |i| format!("histgbm-{}-{}", prefix, i))
            .build()
            .map_err(|e| {
                BoostError::InvalidParameter("num_threads".to_string(), "a usable thread count".to_string(), e.to_string())
            })?;
        debug!("Created execution context on {} with {} threads.", device, num_threads);
        Ok(ExecutionContext { device, pool })
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("device", &self.device)
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}
