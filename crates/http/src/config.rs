use std::fmt::Debug;

/// Builder for [`HttpConfig`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HttpConfigBuilder {
    endpoint: String,
    token: Option<String>,
}

impl HttpConfigBuilder {
    /// Creates a builder with the given turn endpoint URL.
    #[inline]
    pub fn with_endpoint<S: Into<String>>(endpoint: S) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
        }
    }

    /// Sets a bearer token to send with every request.
    #[inline]
    pub fn with_token<S: Into<String>>(mut self, token: S) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> HttpConfig {
        HttpConfig {
            endpoint: self.endpoint,
            token: self.token,
        }
    }
}

impl Debug for HttpConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConfigBuilder")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Configuration for the HTTP transport.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HttpConfig {
    pub(crate) endpoint: String,
    pub(crate) token: Option<String>,
}

impl Debug for HttpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let config = HttpConfigBuilder::with_endpoint("http://localhost/turn")
            .with_token("secret-token")
            .build();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("<redacted>"));
    }
}
