/// SOAP 1.1 envelope encoding and decoding.
///
/// Requests are flat: one operation element holding one element per
/// parameter. Responses are read the same way; anything nested deeper than
/// a parameter is ignored.
use quick_xml::escape::escape;

use super::SoapError;
use crate::xml;

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

pub fn encode_request(namespace: &str, operation: &str, params: &[(&str, String)]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <soap:Envelope xmlns:soap=\"{SOAP_ENV_NS}\" xmlns:tns=\"{}\">\
         <soap:Body><tns:{operation}>",
        escape(namespace)
    );
    for (name, value) in params {
        xml.push_str(&format!("<{name}>{}</{name}>", escape(value.as_str())));
    }
    xml.push_str(&format!("</tns:{operation}></soap:Body></soap:Envelope>"));
    xml
}

/// Operation element found in the SOAP body and its direct children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBody {
    pub operation: String,
    fields: Vec<(String, String)>,
}

impl ResponseBody {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn require(&self, name: &str) -> Result<&str, SoapError> {
        self.field(name).ok_or_else(|| {
            SoapError::Malformed(format!("{} response has no <{}>", self.operation, name))
        })
    }
}

/// Parse a response envelope. A SOAP fault becomes [`SoapError::Fault`].
pub fn decode_response(xml: &str) -> Result<ResponseBody, SoapError> {
    let roots = xml::parse_elements(xml).map_err(SoapError::Malformed)?;
    let envelope = roots
        .first()
        .ok_or_else(|| SoapError::Malformed("empty document".to_string()))?;
    if envelope.name != "Envelope" {
        return Err(SoapError::Malformed(format!(
            "unexpected root <{}>",
            envelope.name
        )));
    }

    let operation = envelope
        .child("Body")
        .ok_or_else(|| SoapError::Malformed("envelope has no Body".to_string()))?
        .children
        .first()
        .ok_or_else(|| SoapError::Malformed("empty SOAP body".to_string()))?;

    let body = ResponseBody {
        operation: operation.name.clone(),
        fields: operation
            .fields()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
    };
    if body.operation == "Fault" {
        return Err(SoapError::Fault {
            code: body.field("faultcode").unwrap_or("unknown").to_string(),
            message: body.field("faultstring").unwrap_or_default().to_string(),
        });
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_escapes_values() {
        let xml = encode_request(
            "urn:xmds",
            "RegisterDisplay",
            &[
                ("serverKey", "a<b&c".to_string()),
                ("displayName", "Lobby \"east\"".to_string()),
            ],
        );
        assert!(xml.contains("<tns:RegisterDisplay><serverKey>a&lt;b&amp;c</serverKey>"));
        assert!(xml.contains("<displayName>Lobby &quot;east&quot;</displayName>"));
        assert!(xml.ends_with("</tns:RegisterDisplay></soap:Body></soap:Envelope>"));
    }

    #[test]
    fn test_encoded_request_decodes_back() {
        let xml = encode_request("urn:xmds", "GetResource", &[("layoutId", "7".to_string())]);
        let body = decode_response(&xml).unwrap();
        assert_eq!(body.operation, "GetResource");
        assert_eq!(body.field("layoutId"), Some("7"));
    }

    #[test]
    fn test_decode_response_with_prefixes_and_escaped_xml() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:ns1="urn:xmds">
              <SOAP-ENV:Body>
                <ns1:RequiredFilesResponse>
                  <RequiredFilesXml>&lt;files&gt;&lt;file type="media" id="1"/&gt;&lt;/files&gt;</RequiredFilesXml>
                  <Empty/>
                </ns1:RequiredFilesResponse>
              </SOAP-ENV:Body>
            </SOAP-ENV:Envelope>"#;

        let body = decode_response(xml).unwrap();
        assert_eq!(body.operation, "RequiredFilesResponse");
        assert_eq!(
            body.field("RequiredFilesXml"),
            Some(r#"<files><file type="media" id="1"/></files>"#)
        );
        assert_eq!(body.field("Empty"), Some(""));
        assert!(body.require("Missing").is_err());
    }

    #[test]
    fn test_decode_cdata_field() {
        let xml = "<s:Envelope xmlns:s=\"x\"><s:Body><GetResourceResponse>\
                   <resource><![CDATA[<html>hi</html>]]></resource>\
                   </GetResourceResponse></s:Body></s:Envelope>";
        let body = decode_response(xml).unwrap();
        assert_eq!(body.field("resource"), Some("<html>hi</html>"));
    }

    #[test]
    fn test_fault_is_reported() {
        let xml = r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
              <SOAP-ENV:Body><SOAP-ENV:Fault>
                <faultcode>SOAP-ENV:Sender</faultcode>
                <faultstring>Server Key is invalid</faultstring>
              </SOAP-ENV:Fault></SOAP-ENV:Body></SOAP-ENV:Envelope>"#;

        match decode_response(xml) {
            Err(SoapError::Fault { code, message }) => {
                assert_eq!(code, "SOAP-ENV:Sender");
                assert_eq!(message, "Server Key is invalid");
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_envelopes() {
        for xml in [
            "",
            "<Envelope/>",
            "<html><body>502 Bad Gateway</body></html>",
            "<Envelope><Body></Body></Envelope>",
            "<Envelope><Header/></Envelope>",
            "<Envelope><Body><Op><a>1</a>",
            "<Envelope><Body><Op></Wrong></Body></Envelope>",
        ] {
            assert!(
                matches!(decode_response(xml), Err(SoapError::Malformed(_))),
                "accepted: {xml:?}"
            );
        }
    }
}
