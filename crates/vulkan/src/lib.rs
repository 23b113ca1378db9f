// Copyright 2026 The Cascade Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Vulkan
//!
//! The small engine underneath the Cascade visualizer: a device context, persistently mapped
//! storage buffers, and image layout plumbing.  This treatment does not use any kind of RAII;
//! resources are destroyed explicitly and validation layers are the tool for spotting lifecycle
//! mistakes.

pub mod buffer;
pub mod context;
pub mod image;
pub mod util;

use std::path::PathBuf;

use ash::vk;

pub mod prelude {
    pub use super::VulkanError;
    pub use crate::context::VkContext;
}

#[derive(thiserror::Error, Debug)]
pub enum VulkanError {
    #[error("Ash: {0}")]
    Ash(#[from] vk::Result),

    #[error("Vulkan loading failed: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("no memory type satisfies the request")]
    NoSuitableMemory,

    #[error("no graphics-capable queue family")]
    NoGraphicsQueue,

    #[error("no Vulkan physical device")]
    NoPhysicalDevice,

    #[error("shader not found: {0}")]
    ShaderMissing(PathBuf),

    #[error("unsupported layout transition {0:?} -> {1:?}")]
    UnsupportedTransition(vk::ImageLayout, vk::ImageLayout),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
