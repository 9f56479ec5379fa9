/// Typed records for every entity in a world document.
pub mod entity;
pub mod event;
pub mod faction;
pub mod hook;
pub mod location;
pub mod npc;
pub mod relationship;
pub mod world;
