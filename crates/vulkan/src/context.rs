// Copyright 2026 The Cascade Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! VkContext encapsulates the global resources, independent of presentation mode: hardware,
//! drivers, and the create-once abstractions of hardware.  A failed creation surfaces as an
//! error the host can log and live with; it never aborts the process.

use std::ffi::{c_void, CStr};

use ash::vk;

use crate::VulkanError;

pub struct VkContext {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub surface_loader: ash::khr::surface::Instance,

    graphics_queue: vk::Queue,
    limits: vk::PhysicalDeviceLimits,

    pub queue_family_index: u32,
    pub command_pool: vk::CommandPool,
}

static VALIDATION_LAYER: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

impl VkContext {
    pub fn new(validation: bool) -> Result<Self, VulkanError> {
        let entry = unsafe { ash::Entry::load()? };

        let required_exts = [
            ash::vk::KHR_SURFACE_NAME.as_ptr(),
            ash::vk::KHR_XLIB_SURFACE_NAME.as_ptr(),
            ash::vk::KHR_WAYLAND_SURFACE_NAME.as_ptr(),
        ];

        let validation_layers = [VALIDATION_LAYER.as_ptr()];

        let app_info = vk::ApplicationInfo {
            api_version: vk::make_api_version(0, 1, 3, 0),
            ..Default::default()
        };

        let create_info = vk::InstanceCreateInfo {
            p_application_info: &app_info,
            enabled_extension_count: required_exts.len() as u32,
            pp_enabled_extension_names: required_exts.as_ptr(),
            enabled_layer_count: if validation {
                validation_layers.len() as u32
            } else {
                0
            },
            pp_enabled_layer_names: validation_layers.as_ptr(),
            ..Default::default()
        };

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let physical_devices = unsafe { instance.enumerate_physical_devices()? };
        let physical_device = *physical_devices
            .first()
            .ok_or(VulkanError::NoPhysicalDevice)?;

        let limits = unsafe {
            instance
                .get_physical_device_properties(physical_device)
                .limits
        };

        let queue_family_index = unsafe {
            instance
                .get_physical_device_queue_family_properties(physical_device)
                .iter()
                .enumerate()
                .find_map(|(index, q)| {
                    q.queue_flags
                        .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
                        .then_some(index as u32)
                })
                .ok_or(VulkanError::NoGraphicsQueue)?
        };

        let queue_priorities = [1.0];
        let queue_info = [vk::DeviceQueueCreateInfo {
            queue_family_index,
            queue_count: 1,
            p_queue_priorities: queue_priorities.as_ptr(),
            ..Default::default()
        }];

        let device_extensions = [
            ash::vk::KHR_SWAPCHAIN_NAME.as_ptr(),
            ash::vk::KHR_SYNCHRONIZATION2_NAME.as_ptr(),
        ];

        let mut sync2_features = vk::PhysicalDeviceSynchronization2Features {
            synchronization2: vk::TRUE,
            ..Default::default()
        };

        let mut features2 = vk::PhysicalDeviceFeatures2 {
            p_next: &mut sync2_features as *mut _ as *mut c_void,
            ..Default::default()
        };

        let device_info = vk::DeviceCreateInfo {
            queue_create_info_count: 1,
            p_queue_create_infos: queue_info.as_ptr(),
            pp_enabled_extension_names: device_extensions.as_ptr(),
            enabled_extension_count: device_extensions.len() as u32,
            p_next: &mut features2 as *mut _ as *mut c_void,
            ..Default::default()
        };

        let device = unsafe { instance.create_device(physical_device, &device_info, None)? };
        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        let command_pool_info = vk::CommandPoolCreateInfo {
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index,
            ..Default::default()
        };

        let command_pool = unsafe { device.create_command_pool(&command_pool_info, None)? };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        Ok(Self {
            entry,
            instance,
            physical_device,
            device,
            surface_loader,

            graphics_queue: queue,
            limits,

            command_pool,
            queue_family_index,
        })
    }

    pub fn graphics_queue(&self) -> &vk::Queue {
        &self.graphics_queue
    }

    pub fn graphics_pool(&self) -> &vk::CommandPool {
        &self.command_pool
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    pub fn destroy(&self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.instance.destroy_instance(None)
        };
    }
}
