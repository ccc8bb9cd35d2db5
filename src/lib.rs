pub mod actor;
pub mod behaviors;
pub mod component;
pub mod config;
pub mod events;
pub mod particles;
pub mod physics;
pub mod record;
pub mod registry;
pub mod runtime;
pub mod save;
pub mod scene;
pub mod scripts;
pub mod templates;
pub mod time;

pub use actor::{ActorRef, SaveScope};
pub use component::Component;
pub use registry::World;
pub use runtime::Runtime;
pub use scripts::ScriptHost;
