mod client;
mod request;

pub mod prelude {
    pub use crate::client::{HttpClientInstrumented as HttpClient, DEFAULT_REQUEST_TIMEOUT};
    pub use crate::request::{HttpMethod, HttpRequest};
}
