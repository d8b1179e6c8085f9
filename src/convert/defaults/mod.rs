//! The built-in converter set: leaf converters with fixed value semantics
//! and the factories that produce them.
//!
//! These factories sit at the end of the ordered factory list, after any
//! user registrations, so explicit registrations always pre-empt them.
//!
//! Every converter here declares the class-metadata concern: none of them
//! produces an object a staged class name could safely land on, so the
//! metadata wrapper is reserved for bean-shaped output.

mod containers;
mod maps;
mod misc;
mod primitives;

pub use containers::{ListFactory, SingleValueAsListFactory};
pub use maps::MapFactory;
pub use misc::{EnumFactory, MiscFactory, OptionalFactory};
pub use primitives::PrimitiveFactory;
