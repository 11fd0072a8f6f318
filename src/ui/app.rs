use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, KeyEvent, Modifiers, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{WindowAttributes, WindowId},
};

use crate::assistant::{AssistCommand, AssistEvent};

use super::common::UiState;
use super::window::WindowState;

/// How often the window drains pipeline events when idle
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run the meeting assistant window until quit.
///
/// Blocks the calling thread for the lifetime of the event loop. Pipeline
/// events are drained on a fixed tick and on redraws; commands go back over
/// the command channel.
pub fn run(
    running: Arc<AtomicBool>,
    command_tx: mpsc::UnboundedSender<AssistCommand>,
    event_rx: mpsc::UnboundedReceiver<AssistEvent>,
) {
    let event_loop = EventLoop::new()
        .expect("Failed to create event loop. Ensure a display server is available.");

    let mut app = WindowApp {
        window: None,
        state: UiState::new(),
        running,
        command_tx,
        event_rx,
        current_modifiers: Modifiers::default(),
    };

    event_loop
        .run_app(&mut app)
        .expect("Event loop exited with error");
}

struct WindowApp {
    window: Option<WindowState>,
    state: UiState,
    running: Arc<AtomicBool>,
    command_tx: mpsc::UnboundedSender<AssistCommand>,
    event_rx: mpsc::UnboundedReceiver<AssistEvent>,
    current_modifiers: Modifiers,
}

impl WindowApp {
    /// Drain pending pipeline events into the view; true when anything changed
    fn drain_events(&mut self) -> bool {
        let mut dirty = false;
        while let Ok(event) = self.event_rx.try_recv() {
            self.state.apply(event);
            dirty = true;
        }
        dirty
    }

    fn send_command(&self, command: AssistCommand) {
        if self.command_tx.send(command).is_err() {
            eprintln!("Assistant pipeline is gone, ignoring command");
        }
    }

    fn quit(&self, event_loop: &ActiveEventLoop) {
        self.running.store(false, Ordering::Relaxed);
        event_loop.exit();
    }

    fn handle_key(&mut self, key_code: KeyCode, event_loop: &ActiveEventLoop) {
        let ctrl = self.current_modifiers.state().control_key();

        match (key_code, ctrl) {
            (KeyCode::Escape, _) => self.quit(event_loop),
            (KeyCode::Space, false) => self.send_command(AssistCommand::ToggleListening),
            (KeyCode::KeyH, true) => self.send_command(AssistCommand::RequestHelp),
            (KeyCode::KeyL, true) => self.send_command(AssistCommand::Clear),
            (KeyCode::KeyT, true) => self.send_command(AssistCommand::MicTest),
            (KeyCode::KeyG, true) => self.send_command(AssistCommand::ToggleLanguage),
            _ => {}
        }
    }
}

impl ApplicationHandler for WindowApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !self.running.load(Ordering::Relaxed) {
            event_loop.exit();
            return;
        }

        if self.window.is_none() {
            let attributes = WindowAttributes::default()
                .with_title("Confab Meeting Assistant")
                .with_inner_size(LogicalSize::new(900.0, 680.0));

            match event_loop.create_window(attributes) {
                Ok(window) => {
                    self.window = Some(WindowState::new(Arc::new(window)));
                }
                Err(e) => {
                    eprintln!("Failed to create window: {}", e);
                    self.quit(event_loop);
                }
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if !self.running.load(Ordering::Relaxed) {
            event_loop.exit();
            return;
        }

        if self.drain_events() {
            if let Some(window) = &self.window {
                window.window.request_redraw();
            }
        }

        event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + POLL_INTERVAL));
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                self.quit(event_loop);
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.current_modifiers = modifiers;
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key_code),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                self.handle_key(key_code, event_loop);
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = &mut self.window {
                    window.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                self.drain_events();
                let state = self.state.clone();
                if let Some(window) = &mut self.window {
                    window.draw(&state);
                }
            }
            _ => {}
        }
    }
}
