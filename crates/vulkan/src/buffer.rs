// Copyright 2026 The Cascade Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Buffer
//!
//! `MappedAllocation` wraps a persistently mapped host-visible storage buffer.  The waterfall
//! keeps three of these alive: the circular row grid, the palette, and the RGBA output the
//! compute shader draws into.  Host writes go through `as_mut_slice` and become visible to the
//! device after an explicit flush; the ring flushes only the row range it touched.
//!
//! This treatment does not use any kind of RAII.  You have validation layers and other Vulkan
//! debugging tools to spot lifecycle issues.

use std::ptr::NonNull;

use ash::vk;

use crate::context::VkContext;
use crate::util;
use crate::VulkanError;

pub struct MappedAllocation<T> {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub ptr: NonNull<T>,
    pub len: usize,

    pub size_bytes: vk::DeviceSize,
    /// Flush granularity of the backing memory.
    atom_size: vk::DeviceSize,
}

impl<T> MappedAllocation<T> {
    pub fn new(size: usize, context: &VkContext) -> Result<Self, VulkanError> {
        let device = context.device();
        let buffer_info = vk::BufferCreateInfo {
            size: (std::mem::size_of::<T>() * size) as u64,
            usage: vk::BufferUsageFlags::STORAGE_BUFFER
                | vk::BufferUsageFlags::TRANSFER_DST
                | vk::BufferUsageFlags::TRANSFER_SRC,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let buffer = unsafe { device.create_buffer(&buffer_info, None)? };
        let mem_req = unsafe { device.get_buffer_memory_requirements(buffer) };
        let mem_props = unsafe {
            context
                .instance
                .get_physical_device_memory_properties(context.physical_device)
        };

        let memory_type_index = util::find_memory_type_index(
            &mem_req,
            &mem_props,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        )
        .ok_or(VulkanError::NoSuitableMemory)?;

        let alloc_info = vk::MemoryAllocateInfo {
            allocation_size: mem_req.size,
            memory_type_index,
            ..Default::default()
        };
        let memory = unsafe { device.allocate_memory(&alloc_info, None)? };
        unsafe {
            device.bind_buffer_memory(buffer, memory, 0)?;
        }

        let raw_ptr =
            unsafe { device.map_memory(memory, 0, mem_req.size, vk::MemoryMapFlags::empty())? };

        let ptr = NonNull::new(raw_ptr as *mut T).ok_or(VulkanError::NoSuitableMemory)?;

        Ok(Self {
            buffer,
            ptr,
            len: size,
            memory,
            size_bytes: mem_req.size,
            atom_size: context.limits().non_coherent_atom_size,
        })
    }

    pub fn destroy(&self, context: &VkContext) {
        let device = context.device();
        unsafe {
            device.unmap_memory(self.memory);
            device.free_memory(self.memory, None);
            device.destroy_buffer(self.buffer, None);
        }
    }

    /// Don't forget to flush 🚽
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Move all host writes to device memory.
    pub fn flush(&mut self, context: &VkContext) -> Result<(), VulkanError> {
        self.flush_bytes(context, 0, self.size_bytes)
    }

    /// Move a sub-range of host writes to device memory.  `first` and `count` are in elements;
    /// the byte range is widened to the non-coherent atom granularity.
    pub fn flush_range(
        &mut self,
        context: &VkContext,
        first: usize,
        count: usize,
    ) -> Result<(), VulkanError> {
        let elem = std::mem::size_of::<T>() as vk::DeviceSize;
        let offset = first as vk::DeviceSize * elem;
        let size = count as vk::DeviceSize * elem;
        self.flush_bytes(context, offset, size)
    }

    fn flush_bytes(
        &mut self,
        context: &VkContext,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> Result<(), VulkanError> {
        let flush_range = self.mapped_range(offset, size);
        unsafe {
            context
                .device()
                .flush_mapped_memory_ranges(&[flush_range])?;
        }
        Ok(())
    }

    /// Make device writes visible to the host.  The memory is selected on `HOST_VISIBLE` alone,
    /// so reading back compute output requires this on non-coherent implementations.
    pub fn invalidate(&self, context: &VkContext) -> Result<(), VulkanError> {
        let range = self.mapped_range(0, self.size_bytes);
        unsafe {
            context
                .device()
                .invalidate_mapped_memory_ranges(&[range])?;
        }
        Ok(())
    }

    fn mapped_range(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> vk::MappedMemoryRange {
        let (offset, size) = atom_aligned(offset, size, self.size_bytes, self.atom_size);
        vk::MappedMemoryRange {
            memory: self.memory,
            offset,
            size,
            ..Default::default()
        }
    }

    /// After-compute barrier.  Use after a compute shader writes this buffer and before the
    /// transfer that consumes it.
    pub fn barrier_compute_post(&self, cb: &vk::CommandBuffer, context: &VkContext) {
        self.barrier(
            cb,
            context,
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::SHADER_WRITE,
            vk::AccessFlags::TRANSFER_READ,
        );
    }

    /// Pre-compute barrier.  Use after host writes + flush, before a compute shader reads or
    /// writes the buffer.
    pub fn barrier_compute_pre(&self, cb: &vk::CommandBuffer, context: &VkContext) {
        self.barrier(
            cb,
            context,
            vk::PipelineStageFlags::HOST,
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::AccessFlags::HOST_WRITE,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
        );
    }

    fn barrier(
        &self,
        cb: &vk::CommandBuffer,
        context: &VkContext,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        src_access_mask: vk::AccessFlags,
        dst_access_mask: vk::AccessFlags,
    ) {
        let buffer_barrier = vk::BufferMemoryBarrier {
            src_access_mask,
            dst_access_mask,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            buffer: self.buffer,
            offset: 0,
            size: vk::WHOLE_SIZE,
            ..Default::default()
        };

        unsafe {
            context.device().cmd_pipeline_barrier(
                *cb,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[buffer_barrier],
                &[],
            );
        }
    }
}

/// Widen a byte range to the non-coherent atom granularity.  Ranges reaching the end of the
/// allocation collapse to `WHOLE_SIZE`, which is always validly aligned.
fn atom_aligned(
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    total: vk::DeviceSize,
    atom: vk::DeviceSize,
) -> (vk::DeviceSize, vk::DeviceSize) {
    let atom = atom.max(1);
    let aligned_offset = (offset / atom) * atom;
    let end = (offset + size).min(total);
    if end == total {
        (aligned_offset, vk::WHOLE_SIZE)
    } else {
        (aligned_offset, (end - aligned_offset).div_ceil(atom) * atom)
    }
}

/// Full-extent copy description for moving an RGBA buffer into a presentation image.
pub fn buffer_image_copy_full(extent: vk::Extent2D) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0, // tightly packed
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
        image_extent: vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_atom_aligned_widens_interior_ranges() {
        // offset 100, size 8 with a 64-byte atom covers bytes [64, 128).
        assert_eq!(atom_aligned(100, 8, 4096, 64), (64, 64));
        // A range straddling an atom boundary widens to two atoms.
        assert_eq!(atom_aligned(60, 8, 4096, 64), (0, 128));
        // Already aligned ranges pass through.
        assert_eq!(atom_aligned(128, 64, 4096, 64), (128, 64));
    }

    #[test]
    fn test_atom_aligned_whole_size_at_tail() {
        // Widening past the allocation end is invalid; the tail collapses to WHOLE_SIZE.
        assert_eq!(atom_aligned(4000, 96, 4096, 64), (3968, vk::WHOLE_SIZE));
        assert_eq!(atom_aligned(0, 4096, 4096, 64), (0, vk::WHOLE_SIZE));
        // An over-long request clamps to the allocation first.
        assert_eq!(atom_aligned(0, 10_000, 4096, 64), (0, vk::WHOLE_SIZE));
    }

    #[test]
    fn test_atom_aligned_tolerates_degenerate_atom() {
        assert_eq!(atom_aligned(3, 5, 4096, 0), (3, 5));
        assert_eq!(atom_aligned(3, 5, 4096, 1), (3, 5));
    }
}
