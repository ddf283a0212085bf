//! Territory lifecycle: `Free <-> Assigned` transitions, the bounded
//! assignment history and the due-soon read model.

pub mod clock;
pub mod engine;

pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{
    AssignRequest, LifecycleEngine, NotesPolicy, TakenTerritory, TerritoryDetails,
    TerritoryOverview,
};
