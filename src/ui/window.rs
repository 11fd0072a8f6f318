use std::sync::Arc;

use winit::dpi::PhysicalSize;
use winit::window::Window;

use super::common::UiState;
use super::text_renderer::{TextItem, TextPanelRenderer};

const MARGIN: f32 = 16.0;

/// Background, roughly a dark slate
const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.075,
    g: 0.085,
    b: 0.105,
    a: 1.0,
};

const HEADER_COLOR: [f32; 4] = [0.55, 0.60, 0.70, 1.0];
const TEXT_COLOR: [f32; 4] = [0.92, 0.93, 0.95, 1.0];
const ANSWER_COLOR: [f32; 4] = [0.75, 0.88, 1.0, 1.0];
const STATUS_IDLE_COLOR: [f32; 4] = [0.55, 0.85, 0.60, 1.0];
const STATUS_LIVE_COLOR: [f32; 4] = [1.0, 0.75, 0.35, 1.0];
const HINT_COLOR: [f32; 4] = [0.45, 0.48, 0.55, 1.0];

const KEY_HINTS: &str =
    "Ctrl+H help   Ctrl+L clear   Ctrl+T mic test   Ctrl+G language   Space pause   Esc quit";

pub struct WindowState {
    pub window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: wgpu::SurfaceConfiguration,
    text_renderer: TextPanelRenderer,
}

impl WindowState {
    pub fn new(window: Arc<Window>) -> Self {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .expect("Failed to create rendering surface");

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .expect("No suitable GPU adapter found");

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::Off,
        }))
        .expect("Failed to acquire GPU device");

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&device, &config);

        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let text_renderer = TextPanelRenderer::new(
            device.clone(),
            queue.clone(),
            PhysicalSize::new(config.width, config.height),
            surface_format,
        );

        Self {
            window,
            surface,
            device,
            queue,
            config,
            text_renderer,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.text_renderer.resize(PhysicalSize::new(width, height));
    }

    /// Lay the view out into text items: status on top, live conversation in
    /// the middle, assistant answer below, key hints at the bottom
    fn layout(&self, state: &UiState) -> Vec<TextItem> {
        let width = self.config.width as f32;
        let height = self.config.height as f32;
        let text_width = (width - 2.0 * MARGIN).max(50.0);

        let conversation_top = 64.0;
        let conversation_bottom = (height * 0.55).max(conversation_top + 40.0);
        let answer_top = conversation_bottom + 34.0;
        let answer_bottom = (height - 40.0).max(answer_top + 20.0);

        let status_color = if state.speaking {
            STATUS_LIVE_COLOR
        } else {
            STATUS_IDLE_COLOR
        };

        // Show enough tail to fill the panel; glyphon clips the overflow
        let visible_utterances = ((conversation_bottom - conversation_top) / 18.0) as usize;

        let mut items = vec![
            TextItem {
                text: state.status_line(),
                x: MARGIN,
                y: 14.0,
                font_size: 14.0,
                color: status_color,
                max_width: text_width,
                bounds_top: 0,
                bounds_bottom: 40,
            },
            TextItem {
                text: "Live Conversation".to_string(),
                x: MARGIN,
                y: conversation_top - 22.0,
                font_size: 12.0,
                color: HEADER_COLOR,
                max_width: text_width,
                bounds_top: (conversation_top - 26.0) as i32,
                bounds_bottom: conversation_top as i32,
            },
            TextItem {
                text: state.recent_conversation(visible_utterances.max(4)),
                x: MARGIN,
                y: conversation_top,
                font_size: 13.0,
                color: TEXT_COLOR,
                max_width: text_width,
                bounds_top: conversation_top as i32,
                bounds_bottom: conversation_bottom as i32,
            },
            TextItem {
                text: "Assistant".to_string(),
                x: MARGIN,
                y: answer_top - 22.0,
                font_size: 12.0,
                color: HEADER_COLOR,
                max_width: text_width,
                bounds_top: (answer_top - 26.0) as i32,
                bounds_bottom: answer_top as i32,
            },
            TextItem {
                text: KEY_HINTS.to_string(),
                x: MARGIN,
                y: height - 26.0,
                font_size: 11.0,
                color: HINT_COLOR,
                max_width: text_width,
                bounds_top: (height - 30.0) as i32,
                bounds_bottom: height as i32,
            },
        ];

        if !state.answer.is_empty() {
            items.push(TextItem {
                text: state.answer.clone(),
                x: MARGIN,
                y: answer_top,
                font_size: 13.0,
                color: ANSWER_COLOR,
                max_width: text_width,
                bounds_top: answer_top as i32,
                bounds_bottom: answer_bottom as i32,
            });
        }

        items
    }

    pub fn draw(&mut self, state: &UiState) {
        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost) | Err(wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return;
            }
            Err(e) => {
                eprintln!("Failed to acquire surface texture: {:?}", e);
                return;
            }
        };

        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        {
            let _clear_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }

        let items = self.layout(state);
        self.text_renderer.render_batch(&mut encoder, &view, &items);

        self.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();
    }
}
