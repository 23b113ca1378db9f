// Copyright 2026 The Cascade Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Waterfall node
//!
//! The device half of the waterfall.  Ingested rows accumulate in the CPU backlog; each paint
//! flushes pending rows into the circular row grid (a persistently mapped storage buffer), then
//! a compute shader maps every output pixel to a (row slot, pyramid bin) pair, applies the
//! dynamic-range transform and the palette LUT, and the resulting RGBA buffer is copied into the
//! presentation image.  Zoom and pan only change push constants.
//!
//! Teardown invalidates all device handles synchronously; a draw on a torn-down node is a
//! detectable no-op, never a use of freed resources.

use std::path::Path;

use ash::vk;

use cascade_lib::prelude::*;
use cascade_lib::line::{allocation_for, LevelMap};
use cascade_lib::palette::PALETTE_SIZE;
use cascade_vulkan::{buffer, VulkanError};
use cascade_vulkan::buffer::MappedAllocation;
use cascade_vulkan::context::VkContext;
use cascade_vulkan::image as vkimage;
use rgb::RGBA8;

use crate::present::DrawTarget;

#[derive(thiserror::Error, Debug)]
pub enum VisualizerError {
    #[error("cascade: {0}")]
    Cascade(#[from] CascadeError),

    #[error("vulkan: {0}")]
    Vulkan(#[from] VulkanError),

    #[error("image encoding: {0}")]
    Image(#[from] image::ImageError),

    #[error("window creation: {0}")]
    Window(#[from] winit::error::OsError),

    #[error("window handle: {0}")]
    Handle(#[from] raw_window_handle::HandleError),

    #[error("nothing rendered yet")]
    NothingRendered,

    #[error("waterfall node already destroyed")]
    NodeDestroyed,
}

const ENTRY_POINT: &[u8] = b"main\0";
const WORKGROUP_X: u32 = 8;
const WORKGROUP_Y: u32 = 16;

/// Hard cap on columns per ring row, independent of what the device would allow.
const ROW_SIZE_CAP: usize = 16384;

/// Fill value for rows that were never written.  Far below any valid dynamic range, so cleared
/// rows map to intensity 0 (background) no matter how the range is configured.
const EMPTY_ROW_DB: f32 = f32::MIN;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct WaterfallPush {
    width: u32,
    height: u32,
    row_count: u32,
    row_size: u32,
    cursor: u32,
    level_offset: u32,
    level_width: u32,
    pad0: u32,
    span_x0: f32,
    span_x1: f32,
    scale: f32,
    offset: f32,
}

pub struct WaterfallNode {
    pipeline_layout: vk::PipelineLayout,
    compute_pipeline: vk::Pipeline,
    descriptor_set: vk::DescriptorSet,
    descriptor_pool: vk::DescriptorPool,
    set_layout: vk::DescriptorSetLayout,

    ring: MappedAllocation<f32>,
    palette_buffer: MappedAllocation<u32>,
    output_buffer: Option<MappedAllocation<u32>>,
    extent: vk::Extent2D,

    backlog: Backlog,
    cursor: RingCursor,
    range: DynamicRange,
    palette: Palette,
    geometry: Geometry,
    map: LevelMap,

    row_count: usize,
    row_size: usize,
    /// Coarsest pyramid level that still fits a (possibly truncated) row slot.
    max_level: usize,

    alive: bool,
}

impl WaterfallNode {
    pub fn new(
        context: &VkContext,
        shader_dir: &Path,
        resolution: usize,
        row_count: usize,
    ) -> Result<Self, VisualizerError> {
        let map = LevelMap::new(resolution)?;
        let allocation = allocation_for(resolution);
        let (row_size, max_level) = row_layout(
            &map,
            row_count,
            context.limits().max_storage_buffer_range as usize,
        )?;
        if row_size < allocation {
            eprintln!(
                "waterfall: row allocation {} truncated to {} columns",
                allocation, row_size
            );
        }

        let backlog = Backlog::new(resolution, row_count, row_count / 4 + 1)?;

        let device = context.device();
        let spirv = cascade_vulkan::util::read_spirv(&shader_dir.join("waterfall.comp.spv"))?;
        let parts = build_compute(device, &spirv)?;

        let mut ring = match MappedAllocation::new(row_count * row_size, context) {
            Ok(ring) => ring,
            Err(e) => {
                destroy_compute(device, &parts);
                return Err(e.into());
            }
        };
        ring.as_mut_slice().fill(EMPTY_ROW_DB);
        if let Err(e) = ring.flush(context) {
            destroy_compute(device, &parts);
            ring.destroy(context);
            return Err(e.into());
        }

        let palette_buffer = match MappedAllocation::new(PALETTE_SIZE, context) {
            Ok(palette_buffer) => palette_buffer,
            Err(e) => {
                destroy_compute(device, &parts);
                ring.destroy(context);
                return Err(e.into());
            }
        };

        Ok(Self {
            pipeline_layout: parts.pipeline_layout,
            compute_pipeline: parts.pipeline,
            descriptor_set: parts.descriptor_set,
            descriptor_pool: parts.pool,
            set_layout: parts.set_layout,

            ring,
            palette_buffer,
            output_buffer: None,
            extent: vk::Extent2D::default(),

            backlog,
            cursor: RingCursor::new(row_count),
            range: DynamicRange::default(),
            palette: Palette::default(),
            geometry: Geometry::new(),
            map,

            row_count,
            row_size,
            max_level,

            alive: true,
        })
    }

    /// Drawable and provisioned.  The paint cycle checks this before attempting a frame.
    pub fn active(&self) -> bool {
        self.alive && self.output_buffer.is_some()
    }

    /// (Re)create the extent-dependent output buffer and point the descriptors at the current
    /// buffers.  Called on resume and on every resize.
    pub fn provision(
        &mut self,
        context: &VkContext,
        extent: vk::Extent2D,
    ) -> Result<(), VisualizerError> {
        if !self.alive {
            return Ok(());
        }
        if let Some(old) = self.output_buffer.take() {
            old.destroy(context);
        }

        let output_buffer =
            MappedAllocation::new((extent.width * extent.height) as usize, context)?;

        let ring_info = vk::DescriptorBufferInfo {
            buffer: self.ring.buffer,
            offset: 0,
            range: self.ring.size_bytes,
        };
        let palette_info = vk::DescriptorBufferInfo {
            buffer: self.palette_buffer.buffer,
            offset: 0,
            range: self.palette_buffer.size_bytes,
        };
        let output_info = vk::DescriptorBufferInfo {
            buffer: output_buffer.buffer,
            offset: 0,
            range: output_buffer.size_bytes,
        };

        let writes = [
            write_storage(self.descriptor_set, 0, &ring_info),
            write_storage(self.descriptor_set, 1, &palette_info),
            write_storage(self.descriptor_set, 2, &output_info),
        ];

        unsafe {
            context.device().update_descriptor_sets(&writes, &[]);
        }

        self.output_buffer = Some(output_buffer);
        self.extent = extent;
        self.geometry
            .recalc_geometric(extent.width, extent.height, self.geometry.zoom());
        Ok(())
    }

    // --- host-facing ingest and configuration ---

    /// Accept one spectrum row.  Length must be at least the configured resolution; longer rows
    /// are reduced, shorter ones rejected without mutation.
    pub fn push_fft_data(&mut self, samples: &[f32]) -> Result<(), CascadeError> {
        self.backlog.push_fft_row(samples)
    }

    /// Accept one row accumulated `repeats` times through the mean path.
    pub fn push_fft_data_accumulated(
        &mut self,
        samples: &[f32],
        repeats: u32,
    ) -> Result<(), CascadeError> {
        self.backlog.push_fft_row_accumulated(samples, repeats)
    }

    /// Roll back the most recently pushed, not-yet-flushed row.
    pub fn dispose_last_line(&mut self) -> Result<(), CascadeError> {
        self.backlog.dispose_last_line()
    }

    pub fn set_max_blending(&mut self, max: bool) {
        self.backlog
            .set_blending(if max { Blending::Max } else { Blending::Mean });
    }

    pub fn max_blending(&self) -> bool {
        self.backlog.blending() == Blending::Max
    }

    pub fn set_dynamic_range(&mut self, min_db: f32, max_db: f32) -> Result<(), CascadeError> {
        self.range.set(min_db, max_db)
    }

    pub fn set_palette(&mut self, colors: &[RGBA8]) {
        self.palette.set(colors);
    }

    pub fn recalc_geometric(&mut self, width: u32, height: u32, zoom: f32) {
        self.geometry.recalc_geometric(width, height, zoom);
    }

    pub fn set_center(&mut self, center: f32) {
        self.geometry.set_center(center);
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    // --- flushing into the device ring ---

    /// Move the oldest pending row into the next ring slot and flush just that range.
    pub fn flush_one_line(&mut self, context: &VkContext) -> Result<(), VisualizerError> {
        let slot = self.cursor.position();
        let mut rows = MappedRows {
            rows: self.ring.as_mut_slice(),
            row_size: self.row_size,
        };
        self.backlog.flush_one_line(&mut rows, &mut self.cursor)?;
        self.ring
            .flush_range(context, slot * self.row_size, self.row_size)?;
        Ok(())
    }

    /// Flush every pending row, one ranged flush per row.
    pub fn flush_lines(&mut self, context: &VkContext) -> Result<(), VisualizerError> {
        while self.backlog.pending() > 0 {
            self.flush_one_line(context)?;
        }
        Ok(())
    }

    /// Flush every pending row, then push the whole grid to the device in one go.  Cheaper when
    /// many rows arrived since the last paint.
    pub fn flush_lines_bulk(&mut self, context: &VkContext) -> Result<(), VisualizerError> {
        if self.backlog.pending() == 0 {
            return Ok(());
        }
        let mut rows = MappedRows {
            rows: self.ring.as_mut_slice(),
            row_size: self.row_size,
        };
        self.backlog.flush_lines_bulk(&mut rows, &mut self.cursor);
        self.ring.flush(context)?;
        Ok(())
    }

    /// Shrink the recycling pool (`flushLinePool`); used after resolution changes.
    pub fn flush_line_pool(&mut self, target: usize) {
        self.backlog.flush_line_pool(target);
    }

    /// Upload the palette only if it changed.
    pub fn flush_palette(&mut self, context: &VkContext) -> Result<(), VisualizerError> {
        if !self.palette.take_dirty() {
            return Ok(());
        }
        let texels = self.palette_buffer.as_mut_slice();
        for (texel, color) in texels.iter_mut().zip(self.palette.colors()) {
            *texel = u32::from_le_bytes([color.r, color.g, color.b, color.a]);
        }
        self.palette_buffer.flush(context)?;
        Ok(())
    }

    /// Blank every ring row and rewind the write cursor.
    pub fn reset_waterfall(&mut self, context: &VkContext) -> Result<(), VisualizerError> {
        self.ring.as_mut_slice().fill(EMPTY_ROW_DB);
        self.ring.flush(context)?;
        self.cursor.reset();
        Ok(())
    }

    /// Reset the ring and drop any rows still waiting in the backlog.
    pub fn clear_waterfall(&mut self, context: &VkContext) -> Result<(), VisualizerError> {
        self.backlog.clear();
        self.reset_waterfall(context)
    }

    // --- drawing ---

    /// Record the waterfall draw into the target's command buffer.  A torn-down or
    /// unprovisioned node records nothing.
    pub fn draw(
        &mut self,
        target: &DrawTarget,
        context: &VkContext,
    ) -> Result<(), VisualizerError> {
        if !self.alive {
            return Ok(());
        }
        let Some(output_buffer) = self.output_buffer.as_ref() else {
            return Ok(());
        };

        let cb = target.command_buffer;
        let device = context.device();
        let extent = target.extent;

        unsafe {
            device.cmd_bind_pipeline(cb, vk::PipelineBindPoint::COMPUTE, self.compute_pipeline);
        }

        let range = vkimage::range();
        vkimage::transition_layout(
            target.image,
            &cb,
            range,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            context,
        )?;

        self.ring.barrier_compute_pre(&cb, context);
        output_buffer.barrier_compute_pre(&cb, context);

        let mut select = self.geometry.select_level(&self.map);
        if select.level > self.max_level {
            // The coarser tail was truncated by the row size cap; fall back to the coarsest
            // level actually stored.
            let (offset, width) = self.map.span(self.max_level);
            select = cascade_lib::geometry::LevelSelect {
                level: self.max_level,
                offset,
                width,
            };
        }

        let (scale, offset) = self.range.coefficients();
        let (span_x0, span_x1) = self.geometry.span();
        let push = WaterfallPush {
            width: extent.width,
            height: extent.height,
            row_count: self.row_count as u32,
            row_size: self.row_size as u32,
            cursor: self.cursor.position() as u32,
            level_offset: select.offset as u32,
            level_width: select.width as u32,
            pad0: 0,
            span_x0,
            span_x1,
            scale,
            offset,
        };

        unsafe {
            device.cmd_push_constants(
                cb,
                self.pipeline_layout,
                vk::ShaderStageFlags::COMPUTE,
                0,
                bytemuck::bytes_of(&push),
            );
            device.cmd_bind_descriptor_sets(
                cb,
                vk::PipelineBindPoint::COMPUTE,
                self.pipeline_layout,
                0,
                &[self.descriptor_set],
                &[],
            );
            device.cmd_dispatch(
                cb,
                extent.width.div_ceil(WORKGROUP_X),
                extent.height.div_ceil(WORKGROUP_Y),
                1,
            );
        }

        output_buffer.barrier_compute_post(&cb, context);

        let region = buffer::buffer_image_copy_full(extent);
        unsafe {
            device.cmd_copy_buffer_to_image(
                cb,
                output_buffer.buffer,
                target.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }

        vkimage::transition_layout(
            target.image,
            &cb,
            range,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            context,
        )?;

        Ok(())
    }

    /// Export the currently rendered view as a still image.  The output buffer is host
    /// visible, so this is a plain read-back once the device is idle.
    pub fn save_waterfall(
        &self,
        context: &VkContext,
        path: &Path,
    ) -> Result<(), VisualizerError> {
        if !self.alive {
            return Err(VisualizerError::NodeDestroyed);
        }
        let output_buffer = self
            .output_buffer
            .as_ref()
            .ok_or(VisualizerError::NothingRendered)?;

        // The copy into the presentation image and this read share the frame fence; the caller
        // waits for idle before exporting.  The invalidate makes the shader's writes visible to
        // the host on non-coherent memory.
        unsafe {
            context.device().device_wait_idle().map_err(VulkanError::from)?;
        }
        output_buffer.invalidate(context)?;

        let texels = output_buffer.as_slice();
        let mut bytes = Vec::with_capacity(texels.len() * 4);
        for texel in texels {
            bytes.extend_from_slice(&texel.to_le_bytes());
        }

        image::save_buffer(
            path,
            &bytes,
            self.extent.width,
            self.extent.height,
            image::ExtendedColorType::Rgba8,
        )?;
        Ok(())
    }

    /// Synchronously release every device handle.  Subsequent draws and exports are no-ops /
    /// errors, never a use of freed resources.
    pub fn destroy(&mut self, context: &VkContext) {
        if !self.alive {
            return;
        }
        self.alive = false;

        let device = context.device();
        unsafe {
            device.destroy_pipeline(self.compute_pipeline, None);
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_descriptor_set_layout(self.set_layout, None);
            device.destroy_descriptor_pool(self.descriptor_pool, None);
        }

        self.ring.destroy(context);
        self.palette_buffer.destroy(context);
        if let Some(output_buffer) = self.output_buffer.take() {
            output_buffer.destroy(context);
        }

        self.compute_pipeline = vk::Pipeline::null();
        self.pipeline_layout = vk::PipelineLayout::null();
        self.set_layout = vk::DescriptorSetLayout::null();
        self.descriptor_pool = vk::DescriptorPool::null();
        self.descriptor_set = vk::DescriptorSet::null();
    }
}

/// Ring rows viewed through the mapped allocation.
struct MappedRows<'a> {
    rows: &'a mut [f32],
    row_size: usize,
}

impl RowStore for MappedRows<'_> {
    fn row_size(&self) -> usize {
        self.row_size
    }

    fn write_row(&mut self, slot: usize, row: &[f32]) {
        let dst = &mut self.rows[slot * self.row_size..(slot + 1) * self.row_size];
        let n = row.len().min(dst.len());
        dst[..n].copy_from_slice(&row[..n]);
        dst[n..].fill(EMPTY_ROW_DB);
    }

    fn clear(&mut self) {
        self.rows.fill(EMPTY_ROW_DB);
    }
}

fn write_storage(
    set: vk::DescriptorSet,
    binding: u32,
    info: &vk::DescriptorBufferInfo,
) -> vk::WriteDescriptorSet<'_> {
    vk::WriteDescriptorSet {
        dst_set: set,
        dst_binding: binding,
        descriptor_count: 1,
        descriptor_type: vk::DescriptorType::STORAGE_BUFFER,
        p_buffer_info: info,
        ..Default::default()
    }
}

fn descriptor_set_layout(device: &ash::Device) -> Result<vk::DescriptorSetLayout, VulkanError> {
    let bindings: Vec<vk::DescriptorSetLayoutBinding> = (0..3)
        .map(|binding| vk::DescriptorSetLayoutBinding {
            binding, // 0 ring rows, 1 palette, 2 output
            descriptor_type: vk::DescriptorType::STORAGE_BUFFER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::COMPUTE,
            p_immutable_samplers: std::ptr::null(),
            ..Default::default()
        })
        .collect();

    let layout_info = vk::DescriptorSetLayoutCreateInfo {
        binding_count: bindings.len() as u32,
        p_bindings: bindings.as_ptr(),
        ..Default::default()
    };

    Ok(unsafe { device.create_descriptor_set_layout(&layout_info, None)? })
}

/// Columns per ring slot and the coarsest pyramid level that fits, given the device's storage
/// buffer limit.  The cap stands in for the texture width limit of a texture-based ring.
/// Rejects configurations where even the full-detail level would not fit a slot, since the
/// renderer could otherwise read across row boundaries.
fn row_layout(
    map: &LevelMap,
    row_count: usize,
    max_range_bytes: usize,
) -> Result<(usize, usize), CascadeError> {
    if row_count == 0 {
        return Err(CascadeError::InvalidRowCount);
    }

    let allocation = allocation_for(map.resolution());
    let device_cap = (max_range_bytes / (row_count * std::mem::size_of::<f32>())).max(1);
    let row_size = allocation.min(device_cap).min(ROW_SIZE_CAP);

    if map.resolution() > row_size {
        return Err(CascadeError::SizeMismatch {
            expected: row_size,
            got: map.resolution(),
        });
    }

    let max_level = map
        .spans()
        .iter()
        .take_while(|&&(offset, width)| offset + width <= row_size)
        .count()
        - 1;

    Ok((row_size, max_level))
}

struct ComputeParts {
    set_layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    descriptor_set: vk::DescriptorSet,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

/// Build the compute pipeline and its descriptor machinery.  Failures release everything
/// created up to that point; partial construction never escapes.
fn build_compute(device: &ash::Device, spirv: &[u32]) -> Result<ComputeParts, VulkanError> {
    let module_ci = vk::ShaderModuleCreateInfo::default().code(spirv);
    let module = unsafe { device.create_shader_module(&module_ci, None)? };

    let set_layout = match descriptor_set_layout(device) {
        Ok(layout) => layout,
        Err(e) => {
            unsafe { device.destroy_shader_module(module, None) };
            return Err(e);
        }
    };

    let pool_sizes = [vk::DescriptorPoolSize {
        ty: vk::DescriptorType::STORAGE_BUFFER,
        descriptor_count: 3,
    }];
    let pool_info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(1)
        .pool_sizes(&pool_sizes);
    let pool = match unsafe { device.create_descriptor_pool(&pool_info, None) } {
        Ok(pool) => pool,
        Err(e) => {
            unsafe {
                device.destroy_descriptor_set_layout(set_layout, None);
                device.destroy_shader_module(module, None);
            }
            return Err(e.into());
        }
    };

    // One path releases everything above for the remaining fallible steps.
    let fail = |e: vk::Result| {
        unsafe {
            device.destroy_descriptor_pool(pool, None);
            device.destroy_descriptor_set_layout(set_layout, None);
            device.destroy_shader_module(module, None);
        }
        VulkanError::from(e)
    };

    let layouts = [set_layout];
    let alloc_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(&layouts);
    let descriptor_set = match unsafe { device.allocate_descriptor_sets(&alloc_info) } {
        Ok(sets) => sets[0],
        Err(e) => return Err(fail(e)),
    };

    let push_constant_range = vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::COMPUTE,
        offset: 0,
        size: std::mem::size_of::<WaterfallPush>() as u32,
    };
    let pipeline_layout_ci = vk::PipelineLayoutCreateInfo {
        push_constant_range_count: 1,
        p_push_constant_ranges: &push_constant_range,
        set_layout_count: 1,
        p_set_layouts: layouts.as_ptr(),
        ..Default::default()
    };
    let pipeline_layout = match unsafe { device.create_pipeline_layout(&pipeline_layout_ci, None) }
    {
        Ok(layout) => layout,
        Err(e) => return Err(fail(e)),
    };

    let shader_stage = vk::PipelineShaderStageCreateInfo {
        stage: vk::ShaderStageFlags::COMPUTE,
        module,
        p_name: ENTRY_POINT.as_ptr() as *const std::os::raw::c_char,
        ..Default::default()
    };
    let compute_pipeline_ci = vk::ComputePipelineCreateInfo {
        stage: shader_stage,
        layout: pipeline_layout,
        ..Default::default()
    };
    let pipeline = match unsafe {
        device.create_compute_pipelines(vk::PipelineCache::null(), &[compute_pipeline_ci], None)
    } {
        Ok(pipelines) => pipelines[0],
        Err((_, e)) => {
            unsafe { device.destroy_pipeline_layout(pipeline_layout, None) };
            return Err(fail(e));
        }
    };

    unsafe { device.destroy_shader_module(module, None) };

    Ok(ComputeParts {
        set_layout,
        pool,
        descriptor_set,
        pipeline_layout,
        pipeline,
    })
}

fn destroy_compute(device: &ash::Device, parts: &ComputeParts) {
    unsafe {
        device.destroy_pipeline(parts.pipeline, None);
        device.destroy_pipeline_layout(parts.pipeline_layout, None);
        device.destroy_descriptor_set_layout(parts.set_layout, None);
        device.destroy_descriptor_pool(parts.pool, None);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_push_constants_are_std430_compatible() {
        // Push constant blocks must be 4-byte aligned and match the shader's layout.
        assert_eq!(std::mem::size_of::<WaterfallPush>(), 48);
        assert_eq!(std::mem::align_of::<WaterfallPush>(), 4);
    }

    #[test]
    fn test_mapped_rows_truncate_and_pad() {
        let mut backing = vec![0.0f32; 8];
        let mut rows = MappedRows {
            rows: &mut backing,
            row_size: 4,
        };
        rows.write_row(1, &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(&backing[4..], &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_row_layout_rejects_zero_rows() {
        let map = LevelMap::new(8).unwrap();
        assert_eq!(
            row_layout(&map, 0, 1 << 20),
            Err(CascadeError::InvalidRowCount)
        );
    }

    #[test]
    fn test_row_layout_rejects_unfittable_level_zero() {
        // 20000 bins exceed the hard column cap, so even the full-detail level cannot be
        // stored without the renderer reading across slot boundaries.
        let map = LevelMap::new(20_000).unwrap();
        assert_eq!(
            row_layout(&map, 4, usize::MAX),
            Err(CascadeError::SizeMismatch {
                expected: ROW_SIZE_CAP,
                got: 20_000,
            })
        );

        // A tight device limit triggers the same rejection well below the cap.
        let map = LevelMap::new(64).unwrap();
        assert!(row_layout(&map, 1024, 1024).is_err());
    }

    #[test]
    fn test_row_layout_truncates_coarse_tail() {
        // Allocation 16 squeezed into 12 columns: levels (0,8), (8,4) fit, (12,2) does not.
        let map = LevelMap::new(8).unwrap();
        let (row_size, max_level) = row_layout(&map, 4, 12 * 4 * 4).unwrap();
        assert_eq!(row_size, 12);
        assert_eq!(max_level, 1);

        // Untruncated rows keep the whole pyramid.
        let (row_size, max_level) = row_layout(&map, 4, 1 << 20).unwrap();
        assert_eq!(row_size, 16);
        assert_eq!(max_level, map.levels() - 1);
    }

    #[test]
    fn test_blank_rows_render_as_background() {
        // Cleared slots must land on palette entry 0 under any valid range.
        assert_eq!(DynamicRange::default().map(EMPTY_ROW_DB), 0.0);
        let narrow = DynamicRange::new(-30.0, -10.0).unwrap();
        assert_eq!(narrow.map(EMPTY_ROW_DB), 0.0);
    }
}
