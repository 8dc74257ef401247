pub mod document;
pub mod error;
pub mod ids;
pub mod time;

pub use document::{Document, canonical_json};
pub use error::{ArborError, ArborResult};
pub use ids::Id;
pub use time::{Instant, InstantInput};
