// Copyright 2026 The Cascade Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod present;
mod source;
mod waterfall;

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    event_loop::{ControlFlow, EventLoop},
    keyboard as kb,
};

use cascade_vulkan::context::VkContext;

use crate::source::SweepSource;
use crate::waterfall::{VisualizerError, WaterfallNode};

const ZOOM_STEP: f32 = 1.25;

#[derive(Parser, Debug)]
struct Args {
    /// Run in fullscreen mode
    #[arg(short = 'f', long = "fullscreen")]
    fullscreen: bool,

    /// Spectrum bins per waterfall row
    #[arg(long = "resolution", default_value_t = 2048)]
    resolution: usize,

    /// Rows of history kept on the device
    #[arg(long = "rows", default_value_t = 1024)]
    rows: usize,

    /// Directory holding compiled shaders (falls back to CASCADE_SHADER_DIR, then ./shaders)
    #[arg(long = "shader-dir")]
    shader_dir: Option<PathBuf>,

    /// Enable Vulkan validation layers
    #[arg(long = "validation")]
    validation: bool,
}

impl Args {
    fn shader_dir(&self) -> PathBuf {
        self.shader_dir
            .clone()
            .or_else(|| std::env::var_os("CASCADE_SHADER_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("shaders"))
    }
}

struct App {
    args: Args,
    running: bool,

    vk_context: VkContext,
    window_present: Option<present::WindowPresent>,
    node: Option<WaterfallNode>,
    source: SweepSource,
}

impl App {
    fn draw_frame(&mut self) -> Result<(), VisualizerError> {
        let vk_context = &self.vk_context;
        let Some(wp) = self.window_present.as_mut() else {
            return Ok(());
        };
        let Some(node) = self.node.as_mut() else {
            return Ok(());
        };
        if !node.active() {
            return Ok(());
        }

        node.push_fft_data(self.source.next_row())?;
        node.flush_lines(vk_context)?;
        node.flush_palette(vk_context)?;

        wp.present_wait(vk_context)?;
        let (sync, target) = wp.render_target(vk_context)?;
        node.draw(&target, vk_context)?;
        wp.post_draw(vk_context, sync, target)?;
        Ok(())
    }

    fn adjust_zoom(&mut self, factor: f32) {
        if let Some(node) = self.node.as_mut() {
            let (width, height) = node.geometry().viewport();
            let zoom = node.geometry().zoom() * factor;
            node.recalc_geometric(width, height, zoom);
        }
    }

    fn pan(&mut self, direction: f32) {
        if let Some(node) = self.node.as_mut() {
            let step = 0.05 / node.geometry().zoom();
            let center = node.geometry().center() + direction * step;
            node.set_center(center);
        }
    }

    fn save_snapshot(&self) {
        let Some(node) = self.node.as_ref() else {
            return;
        };
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let path = PathBuf::from(format!("waterfall-{}.png", stamp));
        match node.save_waterfall(&self.vk_context, &path) {
            Ok(()) => println!("saved {}", path.display()),
            Err(e) => eprintln!("snapshot failed: {}", e),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let vk_context = &self.vk_context;
        let wp = match present::WindowPresent::new(vk_context, event_loop, &self.args) {
            Ok(wp) => wp,
            Err(e) => {
                eprintln!("presentation setup failed: {}", e);
                event_loop.exit();
                return;
            }
        };

        match WaterfallNode::new(
            vk_context,
            &self.args.shader_dir(),
            self.args.resolution,
            self.args.rows,
        ) {
            Ok(mut node) => {
                if let Err(e) = node.provision(vk_context, wp.swapchain_extent) {
                    eprintln!("waterfall provisioning failed: {}", e);
                    node.destroy(vk_context);
                } else {
                    self.node = Some(node);
                }
            }
            // The window stays up so the failure is readable; there is just nothing to draw.
            Err(e) => eprintln!("waterfall setup failed: {}", e),
        }

        self.window_present = Some(wp);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::KeyboardInput {
                device_id: _,
                event,
                is_synthetic: _,
            } => {
                if !event.repeat && event.state == winit::event::ElementState::Pressed {
                    match event.physical_key {
                        kb::PhysicalKey::Code(kb::KeyCode::KeyF) => {
                            if let Some(wp) = self.window_present.as_ref() {
                                wp.toggle_fullscreen();
                            }
                        }
                        kb::PhysicalKey::Code(kb::KeyCode::KeyQ)
                        | kb::PhysicalKey::Code(kb::KeyCode::Escape) => {
                            event_loop.exit();
                        }
                        kb::PhysicalKey::Code(kb::KeyCode::KeyM) => {
                            if let Some(node) = self.node.as_mut() {
                                let max = !node.max_blending();
                                node.set_max_blending(max);
                                println!(
                                    "blending: {}",
                                    if max { "max hold" } else { "mean" }
                                );
                            }
                        }
                        kb::PhysicalKey::Code(kb::KeyCode::KeyC) => {
                            if let Some(node) = self.node.as_mut() {
                                if let Err(e) = node.clear_waterfall(&self.vk_context) {
                                    eprintln!("clear failed: {}", e);
                                }
                            }
                        }
                        kb::PhysicalKey::Code(kb::KeyCode::KeyS) => {
                            self.save_snapshot();
                        }
                        kb::PhysicalKey::Code(kb::KeyCode::KeyR) => {
                            if let Some(node) = self.node.as_mut() {
                                if let Err(e) = node.set_dynamic_range(-100.0, 0.0) {
                                    eprintln!("range reset failed: {}", e);
                                }
                            }
                        }
                        kb::PhysicalKey::Code(kb::KeyCode::Equal)
                        | kb::PhysicalKey::Code(kb::KeyCode::NumpadAdd) => {
                            self.adjust_zoom(ZOOM_STEP);
                        }
                        kb::PhysicalKey::Code(kb::KeyCode::Minus)
                        | kb::PhysicalKey::Code(kb::KeyCode::NumpadSubtract) => {
                            self.adjust_zoom(1.0 / ZOOM_STEP);
                        }
                        kb::PhysicalKey::Code(kb::KeyCode::ArrowLeft) => {
                            self.pan(-1.0);
                        }
                        kb::PhysicalKey::Code(kb::KeyCode::ArrowRight) => {
                            self.pan(1.0);
                        }
                        _ => {}
                    }
                }
            }
            WindowEvent::Resized(size) => {
                if size.width == 0 || size.height == 0 {
                    println!("window resize reported degenerate size");
                } else {
                    let vk_context = &self.vk_context;
                    if let Some(wp) = self.window_present.as_mut() {
                        if let Err(e) = wp.recreate_images(vk_context) {
                            eprintln!("swapchain recreation failed: {}", e);
                            return;
                        }
                        if let Some(node) = self.node.as_mut() {
                            if let Err(e) = node.provision(vk_context, wp.swapchain_extent) {
                                eprintln!("waterfall re-provisioning failed: {}", e);
                            }
                        }
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                if self.running {
                    if let Err(e) = self.draw_frame() {
                        eprintln!("frame skipped: {}", e);
                    }
                    if let Some(wp) = self.window_present.as_ref() {
                        wp.window.request_redraw();
                    }
                }
            }
            WindowEvent::CloseRequested => {
                self.running = false;
                let vk_context = &self.vk_context;
                unsafe {
                    if let Err(e) = vk_context.device().device_wait_idle() {
                        eprintln!("wait idle on shutdown: {:?}", e);
                    }
                }
                if let Some(mut node) = self.node.take() {
                    node.destroy(vk_context);
                }
                if let Some(wp) = self.window_present.take() {
                    wp.destroy(vk_context);
                }
                vk_context.destroy();

                event_loop.exit();
            }
            _ => (),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {}
}

fn main() -> Result<(), VisualizerError> {
    let args = Args::parse();
    let event_loop = EventLoop::new().expect("event loop creation cannot fail on a desktop");
    event_loop.set_control_flow(ControlFlow::Poll);

    let vk_context = VkContext::new(args.validation)?;
    let source = SweepSource::new(args.resolution);

    let mut app = App {
        args,
        running: true,

        vk_context,
        window_present: None,
        node: None,
        source,
    };
    event_loop.run_app(&mut app).expect("event loop run failed");
    Ok(())
}
