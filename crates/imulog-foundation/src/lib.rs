pub mod cancel;
pub mod clock;
pub mod error;
pub mod state;

pub use cancel::*;
pub use clock::*;
pub use error::*;
pub use state::*;
