pub mod body;
pub mod entity;
pub mod ground;

pub use body::{
    AgentBody, InterestFilter, PerceptionDimension, PhysicalPerceptionAlterator, RangeLimit,
    SimpleBody, TagInterest,
};
pub use entity::{EntityId, FrustumId, Tags, WorldEntity};
pub use ground::{FlatGround, Ground, GroundPerception, HeightmapError, HeightmapGround};
