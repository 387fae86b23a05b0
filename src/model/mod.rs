//! # Property Graph Model
//!
//! Clean DTOs that define the embedded property graph.
//! These types cross every boundary: storage ↔ planner ↔ execution ↔ user.
//!
//! Design rule: pure data — no I/O, no state, no async.

pub mod node;
pub mod relationship;
pub mod path;
pub mod value;
pub mod property_map;

pub use node::{Node, NodeId};
pub use relationship::{Direction, Edge, RelId};
pub use path::Path;
pub use value::Value;
pub use property_map::PropertyMap;
