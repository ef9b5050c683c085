/// XMDS operations as typed SOAP requests and responses.
use crate::soap::{ResponseBody, SoapError, SoapRequest, SoapResponse};

use super::required_files::{RequiredItems, parse_required_files};
use super::settings::{PlayerSettings, RegistrationStatus, parse_activation_message};

pub const CLIENT_TYPE: &str = "linux";

/// Credentials sent with every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub server_key: String,
    pub hardware_key: String,
}

impl Credentials {
    fn parameters(&self) -> Vec<(&'static str, String)> {
        vec![
            ("serverKey", self.server_key.clone()),
            ("hardwareKey", self.hardware_key.clone()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct RegisterDisplay {
    pub credentials: Credentials,
    pub client_code: i32,
    pub client_version: String,
    pub display_name: String,
    pub mac_address: String,
    /// Armored RSA public key for push messaging
    pub xmr_public_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub status: RegistrationStatus,
    pub settings: PlayerSettings,
}

impl SoapRequest for RegisterDisplay {
    const OPERATION: &'static str = "RegisterDisplay";
    type Response = Registration;

    fn parameters(&self) -> Vec<(&'static str, String)> {
        let mut params = self.credentials.parameters();
        params.extend([
            ("displayName", self.display_name.clone()),
            ("clientType", CLIENT_TYPE.to_string()),
            ("clientVersion", self.client_version.clone()),
            ("clientCode", self.client_code.to_string()),
            ("macAddress", self.mac_address.clone()),
        ]);
        if let Some(key) = &self.xmr_public_key {
            params.push(("xmrPubKey", key.clone()));
        }
        params
    }
}

impl SoapResponse for Registration {
    fn from_body(body: &ResponseBody) -> Result<Self, SoapError> {
        let (status, settings) = parse_activation_message(body.require("ActivationMessage")?)?;
        Ok(Registration { status, settings })
    }
}

#[derive(Debug, Clone)]
pub struct RequiredFiles {
    pub credentials: Credentials,
}

impl SoapRequest for RequiredFiles {
    const OPERATION: &'static str = "RequiredFiles";
    type Response = RequiredItems;

    fn parameters(&self) -> Vec<(&'static str, String)> {
        self.credentials.parameters()
    }
}

impl SoapResponse for RequiredItems {
    fn from_body(body: &ResponseBody) -> Result<Self, SoapError> {
        parse_required_files(body.require("RequiredFilesXml")?)
    }
}

#[derive(Debug, Clone)]
pub struct GetResource {
    pub credentials: Credentials,
    pub layout_id: i32,
    pub region_id: i32,
    pub media_id: i32,
}

/// Raw resource body, usually an HTML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource(pub String);

impl SoapRequest for GetResource {
    const OPERATION: &'static str = "GetResource";
    type Response = Resource;

    fn parameters(&self) -> Vec<(&'static str, String)> {
        let mut params = self.credentials.parameters();
        params.extend([
            ("layoutId", self.layout_id.to_string()),
            ("regionId", self.region_id.to_string()),
            ("mediaId", self.media_id.to_string()),
        ]);
        params
    }
}

impl SoapResponse for Resource {
    fn from_body(body: &ResponseBody) -> Result<Self, SoapError> {
        Ok(Resource(body.require("resource")?.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct SubmitStats {
    pub credentials: Credentials,
    /// `<stats>` document
    pub stat_xml: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted(pub bool);

impl SoapRequest for SubmitStats {
    const OPERATION: &'static str = "SubmitStats";
    type Response = Accepted;

    fn parameters(&self) -> Vec<(&'static str, String)> {
        let mut params = self.credentials.parameters();
        params.push(("statXml", self.stat_xml.clone()));
        params
    }
}

impl SoapResponse for Accepted {
    fn from_body(body: &ResponseBody) -> Result<Self, SoapError> {
        match body.require("success")?.trim() {
            "true" | "1" => Ok(Accepted(true)),
            "false" | "0" => Ok(Accepted(false)),
            other => Err(SoapError::Malformed(format!("invalid success flag '{other}'"))),
        }
    }
}
