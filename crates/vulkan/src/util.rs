// Copyright 2026 The Cascade Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Vulkan Utils
//!
//! Junk drawer.  Move things out when there is a place for them to belong.

use std::path::Path;

use ash::vk;

use crate::VulkanError;

pub fn find_memory_type_index(
    mem_req: &vk::MemoryRequirements,
    mem_props: &vk::PhysicalDeviceMemoryProperties,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    for i in 0..mem_props.memory_type_count {
        let type_supported = (mem_req.memory_type_bits & (1 << i)) != 0;
        let props = mem_props.memory_types[i as usize].property_flags;

        if type_supported && props.contains(required) {
            return Some(i);
        }
    }

    None
}

/// Load a SPIR-V module from disk.  Missing files surface as `ShaderMissing` so the caller can
/// degrade to a non-functional renderer instead of tearing down the host.
pub fn read_spirv(path: &Path) -> Result<Vec<u32>, VulkanError> {
    if !path.is_file() {
        return Err(VulkanError::ShaderMissing(path.to_path_buf()));
    }
    let mut file = std::fs::File::open(path)?;
    Ok(ash::util::read_spv(&mut file)
        .map_err(|e| VulkanError::Io(e))?)
}
