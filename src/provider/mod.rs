pub mod http;
pub mod mock;
pub mod traits;

pub use http::HttpProvider;
pub use mock::MockProvider;
pub use traits::*;
