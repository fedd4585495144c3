//! Observation records moved through the ring buffer.

use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::mac::MacAddr;

/// One observed MAC pair with optional IP context.
///
/// Records are `Copy` and are moved by value into the ring; nothing inside
/// points back at the response they were decoded from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ObservationRecord {
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_ip: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst_ip: Option<IpAddr>,
    /// Nanoseconds since the Unix epoch.
    pub timestamp_ns: u64,
}

impl ObservationRecord {
    #[inline]
    pub fn new(src_mac: MacAddr, dst_mac: MacAddr, timestamp_ns: u64) -> Self {
        Self {
            src_mac,
            dst_mac,
            src_ip: None,
            dst_ip: None,
            timestamp_ns,
        }
    }

    pub fn with_ips(mut self, src_ip: Option<IpAddr>, dst_ip: Option<IpAddr>) -> Self {
        self.src_ip = src_ip;
        self.dst_ip = dst_ip;
        self
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch.
///
/// A clock set before 1970 reads as zero.
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos().min(u64::MAX as u128) as u64)
        .unwrap_or(0)
}
