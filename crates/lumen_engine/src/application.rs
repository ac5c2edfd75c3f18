//! Application trait and lifecycle management

use crate::engine::{Engine, EngineError, Platform};
use crate::render::device::GraphicsDevice;
use thiserror::Error;

/// Application lifecycle trait
///
/// Implement this trait to drive a game or tool with [`Engine::run`]. Most
/// per-object logic belongs in behaviours; the application is the place for
/// scene setup and global state.
pub trait Application {
    /// Initialize the application
    ///
    /// Called once before the first frame. Build the initial scene, register
    /// resources and attach behaviours here.
    fn initialize<D: GraphicsDevice, P: Platform>(&mut self, engine: &mut Engine<D, P>) -> Result<(), AppError>;

    /// Update the application
    ///
    /// Called every frame after the behaviours' `on_update` and before their
    /// `on_late_update`.
    ///
    /// # Arguments
    /// * `engine` - Mutable reference to the engine
    /// * `delta_time` - Time since last frame in seconds
    fn update<D: GraphicsDevice, P: Platform>(
        &mut self,
        engine: &mut Engine<D, P>,
        delta_time: f32,
    ) -> Result<(), AppError>;

    /// Cleanup the application
    ///
    /// Called once after the main loop ends, while the scene is still alive.
    fn cleanup<D: GraphicsDevice, P: Platform>(&mut self, engine: &mut Engine<D, P>);
}

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Engine error propagated to application level
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Custom application error
    #[error("Application error: {0}")]
    Custom(String),

    /// Asset loading error
    #[error("Asset error: {0}")]
    Asset(String),
}
