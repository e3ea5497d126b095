//! Port allocation for the hub and the per-node noVNC range.
//!
//! The allocator only reads the host port table through a [`PortProbe`]. It
//! never binds anything itself, so its answer is best-effort: another process
//! can grab a port between allocation and the moment the container runtime
//! binds it. The runtime's bind is the authority.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::utils::net::PortProbe;

/// Which class of port a search was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortClass {
    Base,
    Range,
}

impl fmt::Display for PortClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortClass::Base => write!(f, "base port"),
            PortClass::Range => write!(f, "port range"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error(
        "No {class} available: searched {first}-{last} in {attempts} attempts; \
         free some ports or choose a different starting port"
    )]
    NoPortsAvailable {
        class: PortClass,
        first: u16,
        last: u16,
        attempts: u32,
    },

    #[error("Invalid port request: {0}")]
    InvalidRequest(String),
}

/// Search bounds. Every search the allocator runs is finite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorLimits {
    pub max_base_attempts: u16,
    pub stride: u16,
    pub max_range_shifts: u16,
}

impl Default for AllocatorLimits {
    fn default() -> Self {
        Self {
            max_base_attempts: 100,
            stride: 10,
            max_range_shifts: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRequest {
    pub desired_base: u16,
    pub range_base: u16,
    pub range_size: u16,
}

impl PortRequest {
    pub fn new(desired_base: u16, range_base: u16, range_size: u16) -> Self {
        Self {
            desired_base,
            range_base,
            range_size,
        }
    }

    fn validate(&self) -> Result<(), AllocationError> {
        if self.desired_base == 0 {
            return Err(AllocationError::InvalidRequest(
                "base port must be in 1-65535".to_string(),
            ));
        }
        if self.range_base == 0 {
            return Err(AllocationError::InvalidRequest(
                "range start must be in 1-65535".to_string(),
            ));
        }
        if window_end(self.range_base, self.range_size).is_none() {
            return Err(AllocationError::InvalidRequest(format!(
                "range of {} ports starting at {} runs past 65535",
                self.range_size, self.range_base
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub base_port: u16,
    pub range_start: u16,
    pub range_size: u16,
}

impl AllocationResult {
    /// Ports of the secondary range, as `u32` so the end never overflows.
    pub fn range(&self) -> Range<u32> {
        let start = u32::from(self.range_start);
        start..start + u32::from(self.range_size)
    }

    pub fn range_ports(&self) -> impl Iterator<Item = u16> {
        let start = self.range_start;
        (0..self.range_size).map(move |offset| start + offset)
    }
}

/// Exclusive end of a window, or `None` if its last port would exceed 65535.
fn window_end(start: u16, size: u16) -> Option<u32> {
    let end = u32::from(start) + u32::from(size);
    (end <= u32::from(u16::MAX) + 1).then_some(end)
}

pub struct PortAllocator {
    limits: AllocatorLimits,
}

impl PortAllocator {
    pub fn new(limits: AllocatorLimits) -> Result<Self, AllocationError> {
        if limits.max_base_attempts == 0 {
            return Err(AllocationError::InvalidRequest(
                "max_base_attempts must be at least 1".to_string(),
            ));
        }
        if limits.stride == 0 {
            return Err(AllocationError::InvalidRequest(
                "range stride must be at least 1".to_string(),
            ));
        }
        Ok(Self { limits })
    }

    /// Allocate a free base port and a free contiguous range that does not
    /// contain it.
    pub fn allocate(
        &self,
        request: &PortRequest,
        probe: &dyn PortProbe,
    ) -> Result<AllocationResult, AllocationError> {
        request.validate()?;

        let base_port = self.allocate_base(request.desired_base, probe)?;
        let range_start = self.allocate_range(request, base_port, probe)?;

        Ok(AllocationResult {
            base_port,
            range_start,
            range_size: request.range_size,
        })
    }

    fn allocate_base(&self, desired: u16, probe: &dyn PortProbe) -> Result<u16, AllocationError> {
        let mut last = desired;
        let mut attempts = 0u32;

        for offset in 0..self.limits.max_base_attempts {
            let Some(port) = desired.checked_add(offset) else {
                break;
            };
            attempts += 1;
            last = port;

            if !probe.is_bound(port) {
                if offset > 0 {
                    debug!("Base port {} is bound, moved to {}", desired, port);
                }
                return Ok(port);
            }
        }

        Err(AllocationError::NoPortsAvailable {
            class: PortClass::Base,
            first: desired,
            last,
            attempts,
        })
    }

    fn allocate_range(
        &self,
        request: &PortRequest,
        base_port: u16,
        probe: &dyn PortProbe,
    ) -> Result<u16, AllocationError> {
        if request.range_size == 0 {
            return Ok(request.range_base);
        }

        let stride = u32::from(self.limits.stride);
        let size = u32::from(request.range_size);
        let first = u32::from(request.range_base);
        let mut last = first + size - 1;
        let mut attempts = 0u32;

        for shift in 0..=u32::from(self.limits.max_range_shifts) {
            let start = first + shift * stride;
            let end = start + size;
            if end > u32::from(u16::MAX) + 1 {
                break;
            }
            attempts += 1;
            last = end - 1;

            if (start..end).contains(&u32::from(base_port)) {
                debug!(
                    "Range {}-{} overlaps base port {}, shifting by {}",
                    start,
                    end - 1,
                    base_port,
                    stride
                );
                continue;
            }

            // Every port of a shifted window is re-checked, not just the one
            // that collided last time.
            match (start..end).find(|&port| probe.is_bound(port as u16)) {
                Some(bound) => {
                    debug!(
                        "Range {}-{} has bound port {}, shifting by {}",
                        start,
                        end - 1,
                        bound,
                        stride
                    );
                }
                None => return Ok(start as u16),
            }
        }

        Err(AllocationError::NoPortsAvailable {
            class: PortClass::Range,
            first: request.range_base,
            last: last as u16,
            attempts,
        })
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self {
            limits: AllocatorLimits::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::net::StaticProbe;
    use rstest::rstest;

    fn allocator() -> PortAllocator {
        PortAllocator::default()
    }

    #[test]
    fn test_free_base_is_returned_with_one_probe() {
        let probe = StaticProbe::new([]);
        let result = allocator()
            .allocate(&PortRequest::new(4444, 7900, 0), &probe)
            .unwrap();

        assert_eq!(result.base_port, 4444);
        assert_eq!(probe.probe_count(), 1);
    }

    #[test]
    fn test_bound_base_moves_up_by_one() {
        let probe = StaticProbe::new([4444]);
        let result = allocator()
            .allocate(&PortRequest::new(4444, 7900, 2), &probe)
            .unwrap();

        assert_eq!(result.base_port, 4445);
        assert_eq!(result.range_start, 7900);
    }

    #[rstest]
    #[case(1)]
    #[case(5)]
    #[case(40)]
    fn test_skips_run_of_bound_ports(#[case] k: u16) {
        let probe = StaticProbe::new(4444..4444 + k);
        let result = allocator()
            .allocate(&PortRequest::new(4444, 7900, 0), &probe)
            .unwrap();

        assert_eq!(result.base_port, 4444 + k);
    }

    #[test]
    fn test_range_shifts_by_stride() {
        let probe = StaticProbe::new([5900, 5901, 5902]);
        let result = allocator()
            .allocate(&PortRequest::new(4444, 5900, 3), &probe)
            .unwrap();

        assert_eq!(result.range_start, 5910);
        assert_eq!(result.range_size, 3);
        assert_eq!(result.range(), 5910..5913);
    }

    #[test]
    fn test_shifted_range_is_verified_again() {
        let probe = StaticProbe::new([5900, 5911, 5922]);
        let result = allocator()
            .allocate(&PortRequest::new(4444, 5900, 3), &probe)
            .unwrap();

        assert_eq!(result.range_start, 5930);
    }

    #[test]
    fn test_range_never_contains_base() {
        let probe = StaticProbe::new([]);
        let result = allocator()
            .allocate(&PortRequest::new(5902, 5900, 4), &probe)
            .unwrap();

        assert_eq!(result.base_port, 5902);
        assert!(!result.range().contains(&u32::from(result.base_port)));
        assert_eq!(result.range_start, 5910);
    }

    #[test]
    fn test_zero_size_range_does_not_probe() {
        let probe = StaticProbe::new([7900]);
        let result = allocator()
            .allocate(&PortRequest::new(4444, 7900, 0), &probe)
            .unwrap();

        assert_eq!(result.range_start, 7900);
        assert_eq!(result.range_size, 0);
        assert_eq!(result.range_ports().count(), 0);
        assert_eq!(probe.probe_count(), 1);
    }

    #[test]
    fn test_allocation_is_idempotent() {
        let probe = StaticProbe::new([4444, 4445, 7900, 7905]);
        let request = PortRequest::new(4444, 7900, 6);

        let first = allocator().allocate(&request, &probe).unwrap();
        let second = allocator().allocate(&request, &probe).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_range_is_contiguous_and_free() {
        let bound = [7901, 7913];
        let probe = StaticProbe::new(bound);
        let result = allocator()
            .allocate(&PortRequest::new(4444, 7900, 5), &probe)
            .unwrap();

        let ports: Vec<u16> = result.range_ports().collect();
        assert_eq!(ports.len(), 5);
        assert!(ports.windows(2).all(|w| w[1] == w[0] + 1));
        assert!(ports.iter().all(|p| !bound.contains(p)));
        assert_eq!(result.range_start, 7920);
    }

    #[test]
    fn test_exhausted_base_search_fails() {
        let probe = StaticProbe::new(1..=u16::MAX);
        let err = allocator()
            .allocate(&PortRequest::new(4444, 7900, 1), &probe)
            .unwrap_err();

        assert_eq!(
            err,
            AllocationError::NoPortsAvailable {
                class: PortClass::Base,
                first: 4444,
                last: 4543,
                attempts: 100,
            }
        );
    }

    #[test]
    fn test_exhausted_range_search_fails() {
        let probe = StaticProbe::new(7900..9000);
        let err = allocator()
            .allocate(&PortRequest::new(4444, 7900, 2), &probe)
            .unwrap_err();

        assert!(matches!(
            err,
            AllocationError::NoPortsAvailable {
                class: PortClass::Range,
                first: 7900,
                last: 8401,
                attempts: 51,
            }
        ));
    }

    #[test]
    fn test_base_search_stops_at_top_of_port_space() {
        let probe = StaticProbe::new([65534, 65535]);
        let err = allocator()
            .allocate(&PortRequest::new(65534, 7900, 0), &probe)
            .unwrap_err();

        assert!(matches!(
            err,
            AllocationError::NoPortsAvailable {
                class: PortClass::Base,
                last: 65535,
                attempts: 2,
                ..
            }
        ));
    }

    #[rstest]
    #[case(PortRequest::new(0, 7900, 1))]
    #[case(PortRequest::new(4444, 0, 1))]
    #[case(PortRequest::new(4444, 65530, 10))]
    fn test_invalid_requests_fail_fast(#[case] request: PortRequest) {
        let probe = StaticProbe::new([]);
        let err = allocator().allocate(&request, &probe).unwrap_err();

        assert!(matches!(err, AllocationError::InvalidRequest(_)));
        assert_eq!(probe.probe_count(), 0);
    }

    #[test]
    fn test_range_ending_at_last_port_is_valid() {
        let probe = StaticProbe::new([]);
        let result = allocator()
            .allocate(&PortRequest::new(4444, 65530, 6), &probe)
            .unwrap();

        assert_eq!(result.range(), 65530..65536);
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        let limits = AllocatorLimits {
            stride: 0,
            ..AllocatorLimits::default()
        };
        assert!(PortAllocator::new(limits).is_err());

        let limits = AllocatorLimits {
            max_base_attempts: 0,
            ..AllocatorLimits::default()
        };
        assert!(PortAllocator::new(limits).is_err());
    }
}
