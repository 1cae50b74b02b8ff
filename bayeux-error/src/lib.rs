pub mod ext;
pub mod status_code;

// Publicly re-export the status codes and the extension trait so that
// dependants only need `bayeux_error::{ErrorExt, StatusCode}`.
pub use ext::*;
pub use status_code::*;
