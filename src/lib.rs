//! Simulation core for dense assemblies of hard particles.
//!
//! - [`core::cell`]: cell grid that turns the all-pairs neighbor search
//!   into a local one, plus the up/down half-stencil.
//! - [`core::kinematics`] and [`core::square_well`]: exact event times and
//!   responses for step potentials.
//! - [`parallel`]: a fixed worker pool running pair passes over a shared
//!   [`core::World`] without double counting.
//! - [`Engine`]: the facade an event-driven integrator calls.
//!
//! ```no_run
//! use gascell::{Engine, EngineConfig, HardSphere, ParticleArena, RectangularBox};
//!
//! # fn main() -> gascell::Result<()> {
//! let boundary = RectangularBox::periodic([20.0, 20.0, 20.0])?;
//! let particles = ParticleArena::random_gas(500, &boundary, 1.0, 1.0, Some(7))?;
//! let mut engine = Engine::new(
//!     EngineConfig::default(),
//!     HardSphere::new(),
//!     particles,
//!     Box::new(boundary),
//! )?;
//! let pass = engine.collision_search(0.0)?;
//! if let Some(next) = pass.earliest_collision() {
//!     engine.update_particles(|p| p.drift(next.time_f64()));
//!     engine.apply_collision(next.i, next.j, 0.0)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod parallel;

pub use crate::config::EngineConfig;
pub use crate::core::{
    Boundary, CellTarget, Collision, CollisionCandidate, Direction, HardSphere, OverlapPolicy,
    PairInteraction, Particle, ParticleArena, RectangularBox, SquareWell, World,
};
pub use crate::engine::Engine;
pub use crate::error::{Error, NumericAnomaly, Result};
pub use crate::parallel::{AggregateResult, PartitionStrategy, PassAccumulator, PassContext, PassTask};
