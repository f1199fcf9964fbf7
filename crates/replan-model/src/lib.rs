//! replan-model: in-memory snapshot of a virtualized cluster.
//!
//! A [`Model`] holds a [`Mapping`] (which nodes are online, where every VM
//! lives and in which state) plus any number of named
//! [`ShareableResource`] views (CPU shares, memory, ...).
//!
//! # Architecture
//!
//! ```text
//! Model
//!   ├── Mapping
//!   │   ├── online / offline nodes
//!   │   └── VM → Ready | Running(node) | Sleeping(node)
//!   └── views: identifier → ShareableResource
//!       ├── per-VM consumption
//!       └── per-node capacity
//! ```
//!
//! Models are plain values: `Clone` gives an independent snapshot and
//! equality is structural, so two runs over the same plan can be compared
//! with `==`.

pub mod error;
pub mod mapping;
pub mod model;
pub mod resource;

pub use error::{ModelError, ModelResult};
pub use mapping::{Mapping, VmState};
pub use model::Model;
pub use resource::ShareableResource;
