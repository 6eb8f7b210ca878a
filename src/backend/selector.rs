// Physical device selection
//
// The decision is made over a plain snapshot of each GPU's capabilities so it
// can be exercised without a Vulkan driver. `device.rs` builds the snapshots.

use ash::vk;
use std::collections::BTreeSet;
use std::ffi::{CStr, CString};
use crate::error::InitError;

/// Capabilities of a single queue family
#[derive(Debug, Clone, Copy)]
pub struct QueueFamilyInfo {
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
    /// Whether this family can present to the target surface
    pub present_support: bool,
}

/// Everything the selector needs to know about one physical device
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub name: String,
    pub queue_families: Vec<QueueFamilyInfo>,
    pub extensions: Vec<CString>,
    pub surface_format_count: usize,
    pub present_mode_count: usize,
}

/// Queue families chosen for presentation and compute work. They may be the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub present: u32,
    pub compute: u32,
}

impl QueueFamilyIndices {
    /// Distinct family indices, one queue is created per entry
    pub fn unique(&self) -> Vec<u32> {
        let families: BTreeSet<u32> = [self.present, self.compute].into_iter().collect();
        families.into_iter().collect()
    }
}

/// First family able to present and first family with compute support.
pub fn find_queue_families(families: &[QueueFamilyInfo]) -> Option<QueueFamilyIndices> {
    let usable = |family: &&QueueFamilyInfo| family.queue_count > 0;

    let present = families
        .iter()
        .enumerate()
        .filter(|(_, family)| usable(family))
        .find(|(_, family)| family.present_support)
        .map(|(i, _)| i as u32)?;

    let compute = families
        .iter()
        .enumerate()
        .filter(|(_, family)| usable(family))
        .find(|(_, family)| family.flags.contains(vk::QueueFlags::COMPUTE))
        .map(|(i, _)| i as u32)?;

    Some(QueueFamilyIndices { present, compute })
}

fn supports_extensions(candidate: &DeviceCandidate, required: &[&CStr]) -> bool {
    required
        .iter()
        .all(|req| candidate.extensions.iter().any(|ext| ext.as_c_str() == *req))
}

/// Pick the first candidate that can run the compute pass and present its output.
///
/// Returns the candidate's index together with the queue families to use.
pub fn select_device(
    candidates: &[DeviceCandidate],
    required_extensions: &[&CStr],
) -> Result<(usize, QueueFamilyIndices), InitError> {
    if candidates.is_empty() {
        return Err(InitError::NoDeviceFound);
    }

    for (index, candidate) in candidates.iter().enumerate() {
        let Some(families) = find_queue_families(&candidate.queue_families) else {
            log::debug!("{}: missing compute or present queue family", candidate.name);
            continue;
        };

        if !supports_extensions(candidate, required_extensions) {
            log::debug!("{}: missing required device extensions", candidate.name);
            continue;
        }

        if candidate.surface_format_count == 0 || candidate.present_mode_count == 0 {
            log::debug!("{}: surface has no formats or present modes", candidate.name);
            continue;
        }

        return Ok((index, families));
    }

    Err(InitError::NoSuitableDevice)
}
