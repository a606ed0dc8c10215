pub mod events;
pub mod state;
pub mod turn;

pub use events::TurnEvent;
pub use turn::ChatPipeline;
