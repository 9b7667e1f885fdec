//! Window, event loop and tick scheduling.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::config::EngineConfig;
use crate::engine::Engine;

/// Shell commands bound to function keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Command {
    Launch,
    ToggleCompute,
    TogglePause,
    Quit,
}

impl Command {
    fn from_key(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::F5 => Some(Self::Launch),
            KeyCode::F6 => Some(Self::ToggleCompute),
            KeyCode::F7 => Some(Self::TogglePause),
            KeyCode::Escape => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Initialise logging and run the engine until the window closes.
pub fn run(config: EngineConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut runner = Runner {
        config,
        state: None,
        failed: false,
    };
    event_loop.run_app(&mut runner)?;

    if runner.failed {
        anyhow::bail!("engine stopped after a fatal error");
    }
    Ok(())
}

struct Runner {
    config: EngineConfig,
    state: Option<RunState>,
    failed: bool,
}

struct RunState {
    engine: Engine,
    compute_paused: bool,
    paused: bool,
}

impl Runner {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<RunState> {
        let attributes = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(attributes)?);

        let engine = Engine::initialize(window, self.config.clone())?;
        Ok(RunState {
            engine,
            compute_paused: false,
            paused: false,
        })
    }

    /// Log `error`, tear the engine down and leave the event loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: &anyhow::Error) {
        error!("{error:#}");
        self.failed = true;
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            info!("Starting cleanup...");
            if let Err(e) = state.engine.destroy() {
                error!("Cleanup failed: {e:#}");
            }
        }
        event_loop.exit();
    }
}

impl RunState {
    /// Returns `false` when the shell should exit.
    fn command(&mut self, command: Command) -> anyhow::Result<bool> {
        match command {
            Command::Launch => self.engine.launch()?,
            Command::ToggleCompute => {
                self.compute_paused = !self.compute_paused;
                self.engine.pause_compute(self.compute_paused);
            }
            Command::TogglePause => {
                self.paused = !self.paused;
                self.engine.pause_all(self.paused)?;
            }
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }
}

impl ApplicationHandler for Runner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Simulation running");
            }
            Err(e) => self.fail(event_loop, &e.context("failed to initialize the engine")),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = &mut self.state else {
            return;
        };

        let result = match &event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                Ok(false)
            }
            WindowEvent::Resized(size) => state
                .engine
                .resize(ash::vk::Extent2D {
                    width: size.width,
                    height: size.height,
                })
                .map(|()| true),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } if Command::from_key(*code).is_some() => {
                Command::from_key(*code).map_or(Ok(true), |command| state.command(command))
            }
            _ => {
                state.engine.handle_input(&event);
                Ok(true)
            }
        };

        match result {
            Ok(true) => {}
            Ok(false) => self.shutdown(event_loop),
            Err(e) => self.fail(event_loop, &e),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(state) = &mut self.state else {
            return;
        };

        match state.engine.update(Instant::now()) {
            Ok(Some(status)) => state.engine.window().set_title(&status.to_string()),
            Ok(None) => {}
            Err(e) => {
                self.fail(event_loop, &e);
                return;
            }
        }

        let flow = state
            .engine
            .next_deadline()
            .map_or(ControlFlow::Wait, ControlFlow::WaitUntil);
        event_loop.set_control_flow(flow);
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            if let Err(e) = state.engine.destroy() {
                error!("Cleanup failed: {e:#}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_keys_map_to_commands() {
        assert_eq!(Command::from_key(KeyCode::F5), Some(Command::Launch));
        assert_eq!(Command::from_key(KeyCode::F6), Some(Command::ToggleCompute));
        assert_eq!(Command::from_key(KeyCode::F7), Some(Command::TogglePause));
        assert_eq!(Command::from_key(KeyCode::Escape), Some(Command::Quit));
        // camera keys stay with the controller
        assert_eq!(Command::from_key(KeyCode::KeyW), None);
        assert_eq!(Command::from_key(KeyCode::Space), None);
    }
}
