// Copyright 2026 The Cascade Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Window presentation
//!
//! Swapchain ownership and frame pacing.  The waterfall draws by copying a finished RGBA buffer
//! into the acquired swapchain image, so the images are created for transfer, not as color
//! attachments, and no render pass ever begins here.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::{event_loop::ActiveEventLoop, window::Window};

use cascade_vulkan::context::VkContext;
use cascade_vulkan::VulkanError;

use crate::waterfall::VisualizerError;
use crate::Args;

const FRAMES: usize = 3;

pub struct DrawSync {
    pub in_flight: vk::Fence,
    pub render_finished: vk::Semaphore,
    pub image_available: vk::Semaphore,
    pub image_index: usize,
}

pub struct DrawTarget {
    pub image: vk::Image,
    pub extent: vk::Extent2D,
    pub command_buffer: vk::CommandBuffer,
}

pub struct WindowPresent {
    pub frames: usize,
    pub frame_index: usize,
    pub image_available_semaphores: Vec<vk::Semaphore>,
    pub in_flight_fences: Vec<vk::Fence>,
    pub render_finished_semaphores: Vec<vk::Semaphore>,

    pub swapchain: vk::SwapchainKHR,
    pub swapchain_extent: vk::Extent2D,
    pub swapchain_images: Vec<vk::Image>,
    pub swapchain_loader: ash::khr::swapchain::Device,

    command_buffers: Vec<vk::CommandBuffer>,

    surface: vk::SurfaceKHR,
    pub surface_format: vk::SurfaceFormatKHR,
    pub window: Window,
}

impl WindowPresent {
    pub fn new(
        context: &VkContext,
        event_loop: &ActiveEventLoop,
        args: &Args,
    ) -> Result<Self, VisualizerError> {
        let mut attrs = Window::default_attributes().with_title("Cascade");
        if args.fullscreen {
            attrs = attrs.with_fullscreen(Some(winit::window::Fullscreen::Borderless(None)));
        }
        let window = event_loop.create_window(attrs)?;
        if args.fullscreen {
            window.set_cursor_visible(false);
        }

        let surface = window_surface(&window, context)?;

        let formats = unsafe {
            context
                .surface_loader
                .get_physical_device_surface_formats(context.physical_device, surface)
                .map_err(VulkanError::from)?
        };
        let surface_format = pick_format(&formats);

        let supported = unsafe {
            context
                .surface_loader
                .get_physical_device_surface_support(
                    context.physical_device,
                    context.queue_family_index,
                    surface,
                )
                .map_err(VulkanError::from)?
        };
        if !supported {
            return Err(VulkanError::NoGraphicsQueue.into());
        }

        let surface_caps = unsafe {
            context
                .surface_loader
                .get_physical_device_surface_capabilities(context.physical_device, surface)
                .map_err(VulkanError::from)?
        };
        let extent = surface_caps.current_extent;

        let swapchain_loader =
            ash::khr::swapchain::Device::new(&context.instance, &context.device);
        let swapchain_info = vk::SwapchainCreateInfoKHR {
            surface,
            min_image_count: FRAMES as u32,
            image_format: surface_format.format,
            image_color_space: surface_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::TRANSFER_DST,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: surface_caps.current_transform,
            composite_alpha: pick_alpha(&surface_caps),
            present_mode: vk::PresentModeKHR::FIFO_RELAXED,
            clipped: vk::TRUE,
            ..Default::default()
        };

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&swapchain_info, None)
                .map_err(VulkanError::from)?
        };
        let images = unsafe {
            swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::from)?
        };

        let device = context.device();
        let fence_info = vk::FenceCreateInfo {
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        let semaphore_info = vk::SemaphoreCreateInfo::default();

        let mut in_flight_fences = Vec::with_capacity(FRAMES);
        let mut image_available_semaphores = Vec::with_capacity(FRAMES);
        let mut render_finished_semaphores = Vec::with_capacity(FRAMES);
        for _ in 0..FRAMES {
            unsafe {
                in_flight_fences
                    .push(device.create_fence(&fence_info, None).map_err(VulkanError::from)?);
                image_available_semaphores.push(
                    device
                        .create_semaphore(&semaphore_info, None)
                        .map_err(VulkanError::from)?,
                );
                render_finished_semaphores.push(
                    device
                        .create_semaphore(&semaphore_info, None)
                        .map_err(VulkanError::from)?,
                );
            }
        }

        let alloc_info = vk::CommandBufferAllocateInfo {
            command_pool: *context.graphics_pool(),
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: FRAMES as u32,
            ..Default::default()
        };
        let command_buffers = unsafe {
            device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::from)?
        };

        Ok(Self {
            command_buffers,
            frames: FRAMES,
            frame_index: 0,
            image_available_semaphores,
            in_flight_fences,
            render_finished_semaphores,
            swapchain_extent: extent,
            swapchain,
            swapchain_images: images,
            swapchain_loader,

            surface,
            surface_format,
            window,
        })
    }

    pub fn destroy(&self, context: &VkContext) {
        let device = context.device();
        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            self.image_available_semaphores.iter().for_each(|s| {
                device.destroy_semaphore(*s, None);
            });
            self.render_finished_semaphores.iter().for_each(|s| {
                device.destroy_semaphore(*s, None);
            });
            self.in_flight_fences.iter().for_each(|f| {
                device.destroy_fence(*f, None);
            });
            context.surface_loader.destroy_surface(self.surface, None);
        }
    }

    /// Rebuild the swapchain at the surface's current extent.  Must be followed by
    /// re-provisioning any extent-dependent resources downstream.
    pub fn recreate_images(&mut self, context: &VkContext) -> Result<(), VisualizerError> {
        let device = context.device();
        unsafe {
            device.device_wait_idle().map_err(VulkanError::from)?;
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }

        let surface_caps = unsafe {
            context
                .surface_loader
                .get_physical_device_surface_capabilities(context.physical_device, self.surface)
                .map_err(VulkanError::from)?
        };
        let extent = if surface_caps.current_extent.width != u32::MAX {
            surface_caps.current_extent
        } else {
            window_size(&self.window)
        };
        self.swapchain_extent = extent;

        let swapchain_info = vk::SwapchainCreateInfoKHR {
            surface: self.surface,
            min_image_count: self.frames as u32,
            image_format: self.surface_format.format,
            image_color_space: self.surface_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::TRANSFER_DST,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: surface_caps.current_transform,
            composite_alpha: pick_alpha(&surface_caps),
            present_mode: vk::PresentModeKHR::FIFO_RELAXED,
            clipped: vk::TRUE,
            ..Default::default()
        };

        unsafe {
            self.swapchain = self
                .swapchain_loader
                .create_swapchain(&swapchain_info, None)
                .map_err(VulkanError::from)?;
            self.swapchain_images = self
                .swapchain_loader
                .get_swapchain_images(self.swapchain)
                .map_err(VulkanError::from)?;
        }

        Ok(())
    }

    /// Wait for this frame's previous submission to clear.
    pub fn present_wait(&mut self, context: &VkContext) -> Result<(), VisualizerError> {
        let device = context.device();
        let in_flight = self.in_flight_fences[self.frame_index];
        unsafe {
            device
                .wait_for_fences(&[in_flight], true, u64::MAX)
                .map_err(VulkanError::from)?;
            device.reset_fences(&[in_flight]).map_err(VulkanError::from)?;
        }
        Ok(())
    }

    /// Acquire the next swapchain image and begin its command buffer.  The caller records the
    /// actual work; the image arrives in an undefined layout.
    pub fn render_target(
        &mut self,
        context: &VkContext,
    ) -> Result<(DrawSync, DrawTarget), VisualizerError> {
        let device = context.device();
        let idx = self.frame_index;
        let image_available = self.image_available_semaphores[idx];
        let render_finished = self.render_finished_semaphores[idx];
        let in_flight = self.in_flight_fences[idx];
        self.frame_index = (idx + 1) % self.frames;

        let (image_index, _) = unsafe {
            self.swapchain_loader
                .acquire_next_image(
                    self.swapchain,
                    u64::MAX,
                    image_available,
                    vk::Fence::null(),
                )
                .map_err(VulkanError::from)?
        };

        let image_index = image_index as usize;
        let sync = DrawSync {
            image_available,
            in_flight,
            render_finished,
            image_index,
        };

        let command_buffer = self.command_buffers[idx];
        unsafe {
            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::from)?;
            let begin = vk::CommandBufferBeginInfo::default();
            device
                .begin_command_buffer(command_buffer, &begin)
                .map_err(VulkanError::from)?;
        }

        let target = DrawTarget {
            image: self.swapchain_images[image_index],
            command_buffer,
            extent: self.swapchain_extent,
        };

        Ok((sync, target))
    }

    /// End recording, submit, and present.  The recorded work must leave the image in
    /// `PRESENT_SRC_KHR`.
    pub fn post_draw(
        &mut self,
        context: &VkContext,
        sync: DrawSync,
        target: DrawTarget,
    ) -> Result<(), VisualizerError> {
        let device = context.device();
        unsafe {
            device
                .end_command_buffer(target.command_buffer)
                .map_err(VulkanError::from)?;
        }

        let wait_info = vk::SemaphoreSubmitInfo {
            semaphore: sync.image_available,
            value: 0,
            stage_mask: vk::PipelineStageFlags2::TRANSFER,
            device_index: 0,
            ..Default::default()
        };

        let signal_info = vk::SemaphoreSubmitInfo {
            semaphore: sync.render_finished,
            value: 0,
            stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
            device_index: 0,
            ..Default::default()
        };

        let cb_info = vk::CommandBufferSubmitInfo {
            command_buffer: target.command_buffer,
            device_mask: 0,
            ..Default::default()
        };

        let submit = vk::SubmitInfo2 {
            wait_semaphore_info_count: 1,
            p_wait_semaphore_infos: &wait_info,
            signal_semaphore_info_count: 1,
            p_signal_semaphore_infos: &signal_info,
            command_buffer_info_count: 1,
            p_command_buffer_infos: &cb_info,
            ..Default::default()
        };

        let queue = context.graphics_queue();
        unsafe {
            device
                .queue_submit2(*queue, &[submit], sync.in_flight)
                .map_err(VulkanError::from)?;
        }

        let present_wait = [sync.render_finished];
        let swapchains = [self.swapchain];
        let indices = [sync.image_index as u32];

        let present_info = vk::PresentInfoKHR {
            wait_semaphore_count: 1,
            p_wait_semaphores: present_wait.as_ptr(),
            swapchain_count: 1,
            p_swapchains: swapchains.as_ptr(),
            p_image_indices: indices.as_ptr(),
            ..Default::default()
        };

        // Helps the window system latch onto REDRAW_REQUESTED pacing where supported.
        self.window.pre_present_notify();

        unsafe {
            match self.swapchain_loader.queue_present(*queue, &present_info) {
                Ok(_) => {}
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) | Err(vk::Result::SUBOPTIMAL_KHR) => {
                    // The resize path recreates the swapchain on the next event.
                }
                Err(result) => eprintln!("presentation error: {:?}", result),
            };
        }

        Ok(())
    }

    pub fn toggle_fullscreen(&self) {
        let win = &self.window;
        match win.fullscreen() {
            Some(winit::window::Fullscreen::Borderless(None)) => {
                win.set_fullscreen(None);
                win.set_cursor_visible(true);
            }
            _ => {
                win.set_fullscreen(Some(winit::window::Fullscreen::Borderless(None)));
                win.set_cursor_visible(false);
            }
        }
    }
}

/// The compute shader packs RGBA bytes, so the swapchain image must be an RGBA-ordered format
/// or the copy lands with red and blue swapped.  Falls back to the first advertised format only
/// when no RGBA variant exists.
fn pick_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .find(|f| {
            matches!(
                f.format,
                vk::Format::R8G8B8A8_UNORM | vk::Format::R8G8B8A8_SRGB
            )
        })
        .copied()
        .unwrap_or(formats[0])
}

fn pick_alpha(surface_caps: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    if surface_caps
        .supported_composite_alpha
        .contains(vk::CompositeAlphaFlagsKHR::OPAQUE)
    {
        vk::CompositeAlphaFlagsKHR::OPAQUE
    } else if surface_caps
        .supported_composite_alpha
        .contains(vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED)
    {
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED
    } else if surface_caps
        .supported_composite_alpha
        .contains(vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED)
    {
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED
    } else {
        vk::CompositeAlphaFlagsKHR::INHERIT
    }
}

fn window_size(window: &Window) -> vk::Extent2D {
    let size = window.inner_size();
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}

fn window_surface(
    window: &Window,
    context: &VkContext,
) -> Result<vk::SurfaceKHR, VisualizerError> {
    let display_handle = window.display_handle()?.as_raw();
    let window_handle = window.window_handle()?.as_raw();

    let surface = unsafe {
        ash_window::create_surface(
            &context.entry,
            &context.instance,
            display_handle,
            window_handle,
            None,
        )
        .map_err(VulkanError::from)?
    };
    Ok(surface)
}

#[cfg(test)]
mod test {
    use super::*;

    fn format(f: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: f,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_pick_format_prefers_rgba_over_list_order() {
        // BGRA listed first must not win; the packed output bytes are RGBA.
        let formats = [
            format(vk::Format::B8G8R8A8_UNORM),
            format(vk::Format::B8G8R8A8_SRGB),
            format(vk::Format::R8G8B8A8_UNORM),
        ];
        assert_eq!(pick_format(&formats).format, vk::Format::R8G8B8A8_UNORM);

        let formats = [
            format(vk::Format::B8G8R8A8_UNORM),
            format(vk::Format::R8G8B8A8_SRGB),
        ];
        assert_eq!(pick_format(&formats).format, vk::Format::R8G8B8A8_SRGB);
    }

    #[test]
    fn test_pick_format_falls_back_to_first() {
        let formats = [
            format(vk::Format::B8G8R8A8_SRGB),
            format(vk::Format::B8G8R8A8_UNORM),
        ];
        assert_eq!(pick_format(&formats).format, vk::Format::B8G8R8A8_SRGB);
    }
}
