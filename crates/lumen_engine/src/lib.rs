//! # Lumen Engine
//!
//! A scene-graph game engine runtime with a forward OpenGL renderer.
//!
//! ## Features
//!
//! - **Scene graph**: transforms, game objects and script behaviours with
//!   lifecycle hooks
//! - **Forward rendering**: frustum culling, render-queue ordering and shared
//!   uniform blocks for lights, camera, fog and shadows
//! - **Cascaded shadows**: one depth layer per cascade for the main light
//! - **2D batching**: an immediate-mode draw list merged into few draw calls
//! - **Physics seam**: rigidbodies tied to objects, collisions delivered to
//!   behaviours
//!
//! The render core talks to the GPU through [`render::device::GraphicsDevice`].
//! [`render::device::HeadlessDevice`] runs everything in memory.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lumen_engine::prelude::*;
//!
//! struct MyApp;
//!
//! impl Application for MyApp {
//!     fn initialize<D: GraphicsDevice, P: Platform>(&mut self, engine: &mut Engine<D, P>) -> Result<(), AppError> {
//!         engine.create_camera("Camera", 60.0, 0.1, 1000.0);
//!         Ok(())
//!     }
//!
//!     fn update<D: GraphicsDevice, P: Platform>(&mut self, _engine: &mut Engine<D, P>, _delta_time: f32) -> Result<(), AppError> {
//!         Ok(())
//!     }
//!
//!     fn cleanup<D: GraphicsDevice, P: Platform>(&mut self, _engine: &mut Engine<D, P>) {}
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let platform = HeadlessPlatform::new(1280, 720, 1.0 / 60.0).with_frame_limit(120);
//!     let device = HeadlessDevice::new(1280, 720);
//!     let mut engine = Engine::new(EngineConfig::default(), device, platform)?;
//!     engine.run(&mut MyApp)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod assets;
pub mod config;
pub mod foundation;
pub mod physics;
pub mod render;
pub mod scene;

mod application;
mod engine;

#[cfg(test)]
mod engine_tests;

pub use application::{AppError, Application};
pub use config::EngineConfig;
pub use engine::{Engine, EngineError, HeadlessPlatform, Platform};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{MaterialHandle, MeshHandle, Resources, ShaderHandle, TextureHandle},
        config::{Config, EngineConfig},
        foundation::math::{Mat4, Quat, Vec2, Vec3, Vec4},
        physics::{BodyDesc, PhysicsWorld, SphereWorld},
        render::{
            device::{GraphicsDevice, HeadlessDevice},
            Camera, DiffuseMaterial, Graphics2D, Light, LightType, Material, Mesh, MeshGenerator,
            MeshRenderer,
        },
        scene::{Behaviour, BehaviourContext, GameObjectId, Layers, Scene},
        AppError, Application, Engine, EngineError, HeadlessPlatform, Platform,
    };
}
