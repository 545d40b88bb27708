use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        }
    }
}

impl Display for HttpMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// A request ready to be dispatched, along with the status that counts as success for it.
///
/// Two equal values produce byte for byte identical requests on the wire. Query parameters keep
/// their order and may repeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// The operation label outcomes are recorded under.
    pub label: String,
    pub method: HttpMethod,
    /// Base URL and path, without a query string.
    pub url: String,
    pub query: Vec<(String, String)>,
    /// A JSON body, already serialised.
    pub body: Option<Vec<u8>>,
    pub expected_status: u16,
}

impl HttpRequest {
    /// The URL with the query string applied.
    pub fn full_url(&self) -> anyhow::Result<url::Url> {
        let url = if self.query.is_empty() {
            url::Url::parse(&self.url)?
        } else {
            url::Url::parse_with_params(&self.url, &self.query)?
        };
        Ok(url)
    }
}
