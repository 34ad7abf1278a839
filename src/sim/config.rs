use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::Value;

pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> Self {
        match section {
            Some(value) => value.clone().try_into().expect("cannot deserialize config"),
            None => {
                warn!("config section not found");
                Self::default()
            }
        }
    }
}

pub const GHZ: u64 = 1_000_000_000;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimConfig {
    pub timeout: u64,
    pub log_level: String,
    pub num_ses: usize,
    /// Service latency of the low module below the GMMU.
    pub remote_latency: u64,
}

impl Config for SimConfig {}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            timeout: 10000,
            log_level: "warn".to_string(),
            num_ses: 1,
            remote_latency: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct TlbConfig {
    pub freq: u64,
    pub num_mshr_entry: usize,
    pub num_sets: usize,
    pub num_ways: usize,
    pub num_req_per_cycle: usize,
    pub log2_page_size: u64,
}

impl Config for TlbConfig {}

impl Default for TlbConfig {
    fn default() -> Self {
        Self {
            freq: GHZ,
            num_mshr_entry: 4,
            num_sets: 1,
            num_ways: 32,
            num_req_per_cycle: 4,
            log2_page_size: 12,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct GmmuConfig {
    pub freq: u64,
    pub log2_page_size: u64,
    pub max_reqs_in_flight: usize,
    pub page_walk_latency: u64,
    pub device_id: u64,
    pub cuckoo_filter_capacity: usize,
}

impl Config for GmmuConfig {}

impl Default for GmmuConfig {
    fn default() -> Self {
        Self {
            freq: GHZ,
            log2_page_size: 12,
            max_reqs_in_flight: 16,
            page_walk_latency: 10,
            device_id: 1,
            cuckoo_filter_capacity: 1_000_000,
        }
    }
}
