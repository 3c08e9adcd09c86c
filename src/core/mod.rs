//! Single-threaded building blocks: geometry, particles, pair models and the
//! spatial index.

pub mod cell;
pub mod event;
pub mod geometry;
pub mod kinematics;
pub mod lattice;
pub mod neighbor;
pub mod particle;
pub mod square_well;
pub mod world;

pub use cell::{CellId, CellIndex, CellTarget};
pub use event::CollisionCandidate;
pub use geometry::{Boundary, RectangularBox, Vector};
pub use kinematics::{Collision, HardSphere, OverlapPolicy, PairInteraction};
pub use lattice::{LatticeStencil, SiteLattice};
pub use neighbor::{Direction, Enumerator, NeighborIndex, NeighborIterator, NeighborList};
pub use particle::{Particle, ParticleArena};
pub use square_well::SquareWell;
pub use world::World;
