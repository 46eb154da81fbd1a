//! Request types and the authorized-request helper

use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::auth::Auth;
use crate::body::UploadStream;
use crate::options::UploadOptions;
use crate::{Error, Result};

/// HTTP request to the storage service
#[derive(Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<UploadStream>,
}

impl Request {
    /// Create a request without headers or body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `url` does not parse.
    pub fn new(method: Method, url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|_| Error::InvalidUrl {
            url: url.to_string(),
        })?;
        Ok(Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        })
    }

    /// HTTP method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Headers set so far
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Append a header, keeping any earlier values with the same name.
    ///
    /// `Authorization` is single-valued: appending it when one is already set
    /// is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] if the name or value is not valid HTTP,
    /// or if it would add a second `Authorization` header.
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<()> {
        let invalid = || Error::InvalidHeader {
            name: name.to_string(),
        };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        if header_name == AUTHORIZATION && self.headers.contains_key(AUTHORIZATION) {
            return Err(invalid());
        }
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        self.headers.append(header_name, header_value);
        Ok(())
    }

    /// Set the `Content-Type` header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] if `content_type` is not a valid
    /// header value.
    pub fn set_content_type(&mut self, content_type: &str) -> Result<()> {
        let value = HeaderValue::from_str(content_type).map_err(|_| Error::InvalidHeader {
            name: CONTENT_TYPE.to_string(),
        })?;
        self.headers.insert(CONTENT_TYPE, value);
        Ok(())
    }

    /// Set the single `Authorization` header
    pub fn set_auth(&mut self, auth: &Auth) -> Result<()> {
        self.headers.insert(AUTHORIZATION, auth.header_value()?);
        Ok(())
    }

    /// Attach a stream as the request body.
    ///
    /// `Content-Length` is set to the bytes remaining in the stream.
    pub fn set_body(&mut self, body: UploadStream) {
        self.headers
            .insert(CONTENT_LENGTH, HeaderValue::from(body.remaining()));
        self.body = Some(body);
    }
}

impl UploadOptions {
    /// Build a request, attaching the custom `Authorization` header when an
    /// auth-token provider is configured.
    ///
    /// This is the standalone form of the upload's authorization step, for
    /// requests such as deletes or metadata lookups.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use stowage::{Method, UploadOptions};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> stowage::Result<()> {
    /// let options = UploadOptions::new().static_token("id-token");
    /// let request = options
    ///     .create_request(Method::DELETE, "https://storage.example.com/o/photo.png")
    ///     .await?;
    /// assert_eq!(request.headers()["authorization"], "Firebase id-token");
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] for an unparsable URL, or whatever the
    /// token provider fails with.
    pub async fn create_request(&self, method: Method, url: &str) -> Result<Request> {
        let mut request = Request::new(method, url)?;
        if let Some(auth) = self.resolve_auth().await? {
            request.set_auth(&auth)?;
        }
        Ok(request)
    }
}
