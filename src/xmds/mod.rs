pub mod messages;
pub mod required_files;
pub mod settings;

use std::sync::Arc;

use tracing::{info, warn};

use crate::soap::{SoapClient, SoapError};
use crate::system::HardwareKey;
use crate::transport::{TransportContext, Url};

pub use messages::{Credentials, Registration};
pub use required_files::{DownloadType, RegularFile, RequiredItems, ResourceFile};
pub use settings::{PlayerSettings, RegistrationCode, RegistrationStatus};

use messages::{Accepted, GetResource, RegisterDisplay, RequiredFiles, Resource, SubmitStats};

const XMDS_NAMESPACE: &str = "urn:xmds";
const XMDS_ENDPOINT: &str = "xmds.php?v=5";

pub struct XmdsClient {
    soap: SoapClient,
    credentials: Credentials,
    mac_address: String,
    xmr_public_key: Option<String>,
}

impl XmdsClient {
    /// Client for the CMS at `cms`. Credentials are fixed for its lifetime.
    pub fn new(
        context: Arc<TransportContext>,
        cms: &Url,
        server_key: impl Into<String>,
        hardware_key: &HardwareKey,
    ) -> Self {
        let base = cms.target.split('?').next().unwrap_or_default();
        let target = format!("{}/{}", base.trim_end_matches('/'), XMDS_ENDPOINT);

        Self {
            soap: SoapClient::new(context, cms.with_target(target), XMDS_NAMESPACE),
            credentials: Credentials {
                server_key: server_key.into(),
                hardware_key: hardware_key.as_str().to_string(),
            },
            mac_address: String::new(),
            xmr_public_key: None,
        }
    }

    pub fn with_mac_address(mut self, mac_address: impl Into<String>) -> Self {
        self.mac_address = mac_address.into();
        self
    }

    /// Armored public key announced on registration.
    pub fn with_public_key(mut self, public_key: impl Into<String>) -> Self {
        self.xmr_public_key = Some(public_key.into());
        self
    }

    pub fn endpoint(&self) -> &Url {
        self.soap.endpoint()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub async fn register_display(
        &self,
        client_code: i32,
        client_version: &str,
        display_name: &str,
    ) -> Result<Registration, SoapError> {
        let request = RegisterDisplay {
            credentials: self.credentials.clone(),
            client_code,
            client_version: client_version.to_string(),
            display_name: display_name.to_string(),
            mac_address: self.mac_address.clone(),
            xmr_public_key: self.xmr_public_key.clone(),
        };

        let registration = self.soap.send_request(&request).await?;
        if registration.status.is_ready() {
            info!("Display registered: {}", registration.status.message);
        } else {
            warn!(
                "Display not ready ({:?}): {}",
                registration.status.code, registration.status.message
            );
        }
        Ok(registration)
    }

    pub async fn required_files(&self) -> Result<RequiredItems, SoapError> {
        let request = RequiredFiles {
            credentials: self.credentials.clone(),
        };
        self.soap.send_request(&request).await
    }

    pub async fn get_resource(
        &self,
        layout_id: i32,
        region_id: i32,
        media_id: i32,
    ) -> Result<String, SoapError> {
        let request = GetResource {
            credentials: self.credentials.clone(),
            layout_id,
            region_id,
            media_id,
        };
        let Resource(body) = self.soap.send_request(&request).await?;
        Ok(body)
    }

    /// Returns whether the CMS accepted the batch.
    pub async fn submit_stats(&self, stat_xml: &str) -> Result<bool, SoapError> {
        let request = SubmitStats {
            credentials: self.credentials.clone(),
            stat_xml: stat_xml.to_string(),
        };
        let Accepted(success) = self.soap.send_request(&request).await?;
        Ok(success)
    }
}
