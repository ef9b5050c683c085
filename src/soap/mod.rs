pub mod envelope;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::transport::{HttpSession, Method, TransportContext, TransportError, Url};
pub use envelope::ResponseBody;

#[derive(Debug, Clone, Error)]
pub enum SoapError {
    /// The server could not be reached; forwarded from the transport as-is.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with a SOAP fault.
    #[error("SOAP fault {code}: {message}")]
    Fault { code: String, message: String },

    /// The server answered with something that is not a usable envelope.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl SoapError {
    pub fn domain(&self) -> &'static str {
        match self {
            SoapError::Transport(e) => e.domain(),
            SoapError::Fault { .. } | SoapError::Malformed(_) => "xmds",
        }
    }

    /// True when the server was reached but refused or failed the call.
    pub fn is_protocol(&self) -> bool {
        !matches!(self, SoapError::Transport(_))
    }
}

/// A request type knows its operation name, its parameters and what comes back.
pub trait SoapRequest {
    const OPERATION: &'static str;
    type Response: SoapResponse;

    fn parameters(&self) -> Vec<(&'static str, String)>;
}

pub trait SoapResponse: Sized {
    fn from_body(body: &ResponseBody) -> Result<Self, SoapError>;
}

pub struct SoapClient {
    context: Arc<TransportContext>,
    endpoint: Url,
    namespace: String,
}

impl SoapClient {
    pub fn new(context: Arc<TransportContext>, endpoint: Url, namespace: impl Into<String>) -> Self {
        Self {
            context,
            endpoint,
            namespace: namespace.into(),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn send_request<R: SoapRequest>(&self, request: &R) -> Result<R::Response, SoapError> {
        let envelope = envelope::encode_request(&self.namespace, R::OPERATION, &request.parameters());
        let action = format!("\"{}#{}\"", self.namespace, R::OPERATION);
        debug!("SOAP {} -> {}", R::OPERATION, self.endpoint);

        let response = HttpSession::new(self.context.clone())
            .with_header("Content-Type", "text/xml; charset=utf-8")
            .with_header("SOAPAction", &action)
            .send(Method::Post, &self.endpoint, envelope)
            .into_result()
            .await?;

        // Faults usually arrive with HTTP 500, so the envelope is checked first
        let body = match envelope::decode_response(&response.body_text()) {
            Err(SoapError::Malformed(reason)) if !response.is_success() => {
                return Err(SoapError::Malformed(format!(
                    "HTTP {} {} ({reason})",
                    response.status, response.reason
                )));
            }
            other => other.inspect_err(|e| warn!("{} failed: {}", R::OPERATION, e))?,
        };

        R::Response::from_body(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::transport::SessionStage;
    use crate::transport::testing::{http_reply, request_body, serve};

    struct Echo(String);

    impl SoapRequest for Echo {
        const OPERATION: &'static str = "Echo";
        type Response = String;

        fn parameters(&self) -> Vec<(&'static str, String)> {
            vec![("text", self.0.clone())]
        }
    }

    impl SoapResponse for String {
        fn from_body(body: &ResponseBody) -> Result<Self, SoapError> {
            Ok(body.require("text")?.to_string())
        }
    }

    fn echo_envelope(request: &str) -> String {
        let text = envelope::decode_response(request_body(request))
            .ok()
            .and_then(|b| b.field("text").map(str::to_string))
            .unwrap_or_default();
        format!(
            "<s:Envelope xmlns:s=\"x\"><s:Body><EchoResponse><text>{text}</text></EchoResponse></s:Body></s:Envelope>"
        )
    }

    async fn client(addr: std::net::SocketAddr) -> SoapClient {
        let context = TransportContext::new(TransportConfig::uniform(5)).unwrap();
        let endpoint = Url::parse(&format!("http://{addr}/xmds.php?v=5")).unwrap();
        SoapClient::new(context, endpoint, "urn:xmds")
    }

    #[tokio::test]
    async fn test_round_trip_with_soap_action() {
        let addr = serve(|request| {
            assert!(request.contains("SOAPAction: \"urn:xmds#Echo\"\r\n"));
            http_reply("200 OK", &echo_envelope(&request))
        })
        .await;

        let reply = client(addr).await.send_request(&Echo("hello".into())).await.unwrap();
        assert_eq!(reply, "hello");
    }

    #[tokio::test]
    async fn test_fault_with_http_500() {
        let addr = serve(|_| {
            http_reply(
                "500 Internal Server Error",
                "<s:Envelope xmlns:s=\"x\"><s:Body><s:Fault><faultcode>s:Sender</faultcode>\
                 <faultstring>This display is not licensed</faultstring></s:Fault></s:Body></s:Envelope>",
            )
        })
        .await;

        let err = client(addr).await.send_request(&Echo("x".into())).await.unwrap_err();
        assert!(err.is_protocol());
        assert!(matches!(err, SoapError::Fault { ref message, .. } if message == "This display is not licensed"));
    }

    #[tokio::test]
    async fn test_non_envelope_error_page() {
        let addr = serve(|_| http_reply("502 Bad Gateway", "<html>upstream down</html>")).await;

        let err = client(addr).await.send_request(&Echo("x".into())).await.unwrap_err();
        assert!(matches!(err, SoapError::Malformed(ref m) if m.starts_with("HTTP 502")));
        assert_eq!(err.domain(), "xmds");
    }

    #[tokio::test]
    async fn test_transport_error_forwarded_unchanged() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(addr).await.send_request(&Echo("x".into())).await.unwrap_err();
        match err {
            SoapError::Transport(e) => assert_eq!(e.stage(), SessionStage::Connecting),
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
