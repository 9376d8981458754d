pub mod errors;
pub mod fitness;
pub mod space;

pub use errors::*;
pub use fitness::*;
pub use space::*;
