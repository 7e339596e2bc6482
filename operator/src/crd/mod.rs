//! Custom resources owned or consumed by the operator.

mod external;
mod inference_service;
mod serving_runtime;
mod status;

pub use external::*;
pub use inference_service::*;
pub use serving_runtime::*;
pub use status::*;
