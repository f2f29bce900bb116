pub mod cache;
pub mod config;
pub mod exception;
pub mod exec;
pub mod handler;
pub mod mime;
pub mod mount;
pub mod param;
pub mod protocol;
pub mod request;
pub mod resolver;
pub mod response;
pub mod util;

pub use cache::{Lookup, PathCache};
pub use config::{Config, MountConfig, WebConfig};
pub use exception::Exception;
pub use exec::{ExecutionEngine, ExecutionOutput};
pub use handler::AppContext;
pub use mount::{Mount, MountTable};
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion};
pub use request::{Params, Request};
pub use resolver::{Resource, ResourceResolver};
pub use response::Response;
