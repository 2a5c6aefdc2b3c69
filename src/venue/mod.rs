//! Execution venue abstraction, session handling and the paper venue.

pub mod mock;
pub mod session;
pub mod traits;
pub mod types;

pub use mock::{PaperVenue, ScriptedResponse};
pub use session::{SessionSettings, VenueSession};
pub use traits::{ExecutionVenue, VenueError};
pub use types::{FillPolicy, OrderRequest, OrderSide, Quote, SendResult, TimeInForce, VolumeConstraint};
