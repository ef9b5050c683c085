/// Registration result and the settings the CMS pushes with it.
///
/// Settings are described by one ordered schema table; loading, saving and
/// typed access all go through it.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use quick_xml::escape::escape;
use thiserror::Error;
use tracing::{info, warn};

use crate::soap::SoapError;
use crate::xml::{self, Element};

const SETTINGS_ROOT: &str = "settings";
/// Version written by [`PlayerSettings::save_to`].
const SETTINGS_FILE_VERSION: &str = "2";
/// Version 1 files list the settings at top level, without a `<settings>` root.
const LEGACY_SETTINGS_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Int,
    Bool,
    Text,
}

#[derive(Debug, Clone, Copy)]
pub struct SettingSpec {
    pub name: &'static str,
    pub kind: SettingKind,
    pub default: &'static str,
}

const fn setting(name: &'static str, kind: SettingKind, default: &'static str) -> SettingSpec {
    SettingSpec { name, kind, default }
}

pub const SETTINGS_SCHEMA: &[SettingSpec] = &[
    setting("collectInterval", SettingKind::Int, "900"),
    setting("statsEnabled", SettingKind::Bool, "0"),
    setting("downloadStartWindow", SettingKind::Text, "00:00"),
    setting("downloadEndWindow", SettingKind::Text, "00:00"),
    setting("maxConcurrentDownloads", SettingKind::Int, "2"),
    setting("xmrNetworkAddress", SettingKind::Text, ""),
    setting("logLevel", SettingKind::Text, "error"),
    setting("displayName", SettingKind::Text, ""),
    setting("sizeX", SettingKind::Int, "0"),
    setting("sizeY", SettingKind::Int, "0"),
    setting("offsetX", SettingKind::Int, "0"),
    setting("offsetY", SettingKind::Int, "0"),
    setting("screenShotRequested", SettingKind::Bool, "0"),
    setting("screenShotInterval", SettingKind::Int, "0"),
];

const MIN_COLLECT_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot access settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings file: {0}")]
    Parse(String),

    #[error("unsupported settings file version {0}")]
    UnsupportedVersion(String),
}

impl SettingsError {
    pub fn domain(&self) -> &'static str {
        "config"
    }
}

/// Server-pushed player settings. Schema entries always have a value;
/// names the schema does not know are kept as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSettings {
    values: BTreeMap<String, String>,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        let values = SETTINGS_SCHEMA
            .iter()
            .map(|s| (s.name.to_string(), s.default.to_string()))
            .collect();
        Self { values }
    }
}

impl PlayerSettings {
    /// Overlay `pairs` on the defaults. Values that do not fit their schema
    /// kind are dropped in favour of the default.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut settings = Self::default();
        for (name, value) in pairs {
            settings.set(name.into(), value.into());
        }
        settings
    }

    pub fn set(&mut self, name: String, value: String) {
        let value = value.trim().to_string();
        if let Some(spec) = SETTINGS_SCHEMA.iter().find(|s| s.name == name) {
            let valid = match spec.kind {
                SettingKind::Int => value.parse::<i64>().is_ok(),
                SettingKind::Bool => parse_bool(&value).is_some(),
                SettingKind::Text => true,
            };
            if !valid {
                warn!("Ignoring invalid value '{}' for setting {}", value, name);
                return;
            }
        }
        self.values.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name)?.parse().ok()
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        parse_bool(self.get(name)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn collect_interval(&self) -> Duration {
        let secs = self
            .int("collectInterval")
            .and_then(|s| u64::try_from(s).ok())
            .unwrap_or(900);
        Duration::from_secs(secs.max(MIN_COLLECT_INTERVAL_SECS))
    }

    pub fn stats_enabled(&self) -> bool {
        self.bool("statsEnabled").unwrap_or(false)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let mut xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<{SETTINGS_ROOT} version=\"{SETTINGS_FILE_VERSION}\">\n"
        );
        for (name, value) in &self.values {
            xml.push_str(&format!("  <{name}>{}</{name}>\n", escape(value.as_str())));
        }
        xml.push_str(&format!("</{SETTINGS_ROOT}>\n"));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, xml)?;
        info!("Saved {} settings to {}", self.values.len(), path.display());
        Ok(())
    }

    /// Read a file written by [`save_to`](Self::save_to), or the older
    /// root-less layout.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path)?;
        let roots = xml::parse_elements(&text).map_err(SettingsError::Parse)?;

        match roots.as_slice() {
            [] => Err(SettingsError::Parse("document has no elements".to_string())),
            [root] if root.name == SETTINGS_ROOT => {
                let version = root.attr("version").unwrap_or(SETTINGS_FILE_VERSION);
                if version != SETTINGS_FILE_VERSION {
                    return Err(SettingsError::UnsupportedVersion(version.to_string()));
                }
                Ok(Self::from_pairs(root.fields()))
            }
            legacy if is_legacy_layout(legacy) => {
                info!(
                    "Reading version {} settings from {}",
                    LEGACY_SETTINGS_VERSION,
                    path.display()
                );
                Ok(Self::from_pairs(
                    legacy.iter().map(|e| (e.name.as_str(), e.text.as_str())),
                ))
            }
            [first, ..] => Err(SettingsError::Parse(format!(
                "unexpected root <{}>",
                first.name
            ))),
        }
    }
}

/// Top-level leaf elements, at least one of them a known setting.
fn is_legacy_layout(elements: &[Element]) -> bool {
    elements.iter().all(Element::is_leaf)
        && elements
            .iter()
            .any(|e| SETTINGS_SCHEMA.iter().any(|s| s.name == e.name))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" | "" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationCode {
    /// Licensed and ready to play
    Ready,
    /// Newly added, waiting for authorisation
    Added,
    /// Known but not yet authorised
    Waiting,
    Other(String),
}

impl RegistrationCode {
    pub fn parse(code: &str) -> Self {
        match code.to_ascii_uppercase().as_str() {
            "READY" => RegistrationCode::Ready,
            "ADDED" => RegistrationCode::Added,
            "WAITING" => RegistrationCode::Waiting,
            _ => RegistrationCode::Other(code.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationStatus {
    pub code: RegistrationCode,
    pub message: String,
}

impl RegistrationStatus {
    pub fn is_ready(&self) -> bool {
        self.code == RegistrationCode::Ready
    }
}

/// Parse the `<display code=".." message="..">` activation message.
pub fn parse_activation_message(
    xml: &str,
) -> Result<(RegistrationStatus, PlayerSettings), SoapError> {
    let roots = xml::parse_elements(xml)
        .map_err(|e| SoapError::Malformed(format!("activation message: {e}")))?;
    let display = match roots.as_slice() {
        [root] if root.name == "display" => root,
        [root, ..] => {
            return Err(SoapError::Malformed(format!(
                "activation message root is <{}>, expected <display>",
                root.name
            )));
        }
        [] => return Err(SoapError::Malformed("empty activation message".to_string())),
    };

    let status = RegistrationStatus {
        code: RegistrationCode::parse(display.attr("code").unwrap_or_default()),
        message: display.attr("message").unwrap_or_default().to_string(),
    };

    Ok((status, PlayerSettings::from_pairs(display.fields())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTIVATION: &str = r#"<?xml version="1.0"?>
        <display status="0" code="READY" message="Display is active and ready to start.">
          <collectInterval>300</collectInterval>
          <statsEnabled>1</statsEnabled>
          <sizeX>banana</sizeX>
          <xmrNetworkAddress>tcp://cms.example.com:9505</xmrNetworkAddress>
          <customerTheme><![CDATA[dark & bold]]></customerTheme>
          <downloadStartWindow/>
        </display>"#;

    #[test]
    fn test_parse_ready_activation() {
        let (status, settings) = parse_activation_message(ACTIVATION).unwrap();
        assert!(status.is_ready());
        assert_eq!(status.message, "Display is active and ready to start.");

        assert_eq!(settings.collect_interval(), Duration::from_secs(300));
        assert!(settings.stats_enabled());
        assert_eq!(settings.get("sizeX"), Some("0"));
        assert_eq!(settings.get("xmrNetworkAddress"), Some("tcp://cms.example.com:9505"));
        assert_eq!(settings.get("customerTheme"), Some("dark & bold"));
        assert_eq!(settings.get("downloadStartWindow"), Some(""));
    }

    #[test]
    fn test_registration_codes() {
        assert_eq!(RegistrationCode::parse("added"), RegistrationCode::Added);
        assert_eq!(RegistrationCode::parse("WAITING"), RegistrationCode::Waiting);
        assert_eq!(
            RegistrationCode::parse("REVOKED"),
            RegistrationCode::Other("REVOKED".to_string())
        );

        let (status, settings) =
            parse_activation_message(r#"<display code="ADDED" message="Awaiting approval"/>"#).unwrap();
        assert!(!status.is_ready());
        assert_eq!(settings, PlayerSettings::default());
    }

    #[test]
    fn test_activation_rejects_other_documents() {
        assert!(matches!(
            parse_activation_message("<files/>"),
            Err(SoapError::Malformed(_))
        ));
        assert!(parse_activation_message("<display code=\"READY\"><a>1</a>").is_err());
    }

    #[test]
    fn test_collect_interval_has_a_floor() {
        let settings = PlayerSettings::from_pairs([("collectInterval", "5")]);
        assert_eq!(settings.collect_interval(), Duration::from_secs(60));
        assert_eq!(
            PlayerSettings::default().collect_interval(),
            Duration::from_secs(900)
        );
    }

    #[test]
    fn test_settings_file_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg").join("settings.xml");

        let settings = PlayerSettings::from_pairs([
            ("displayName", "Lobby <east>"),
            ("statsEnabled", "true"),
            ("unknownKey", "kept"),
        ]);
        settings.save_to(&path).unwrap();

        let loaded = PlayerSettings::load_from(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.get("displayName"), Some("Lobby <east>"));
        assert_eq!(loaded.get("unknownKey"), Some("kept"));
    }

    #[test]
    fn test_load_missing_or_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PlayerSettings::load_from(&dir.path().join("absent.xml")),
            Err(SettingsError::Io(_))
        ));

        let foreign = dir.path().join("foreign.xml");
        fs::write(&foreign, "<display/>").unwrap();
        assert!(matches!(
            PlayerSettings::load_from(&foreign),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn test_saved_file_carries_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.xml");
        PlayerSettings::default().save_to(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("<settings version=\"2\">"));
    }

    #[test]
    fn test_load_rootless_version_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.xml");
        fs::write(
            &path,
            "<?xml version=\"1.0\"?>\n\
             <collectInterval>120</collectInterval>\n\
             <statsEnabled>1</statsEnabled>\n\
             <customKey>x</customKey>\n",
        )
        .unwrap();

        let loaded = PlayerSettings::load_from(&path).unwrap();
        assert_eq!(loaded.collect_interval(), Duration::from_secs(120));
        assert!(loaded.stats_enabled());
        assert_eq!(loaded.get("customKey"), Some("x"));
    }

    #[test]
    fn test_settings_root_without_version_is_current() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.xml");
        fs::write(&path, "<settings><statsEnabled>1</statsEnabled></settings>").unwrap();

        assert!(PlayerSettings::load_from(&path).unwrap().stats_enabled());
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.xml");
        for version in ["1", "3"] {
            fs::write(
                &path,
                format!("<settings version=\"{version}\"><statsEnabled>1</statsEnabled></settings>"),
            )
            .unwrap();
            match PlayerSettings::load_from(&path) {
                Err(SettingsError::UnsupportedVersion(v)) => assert_eq!(v, version),
                other => panic!("expected version error, got {other:?}"),
            }
        }
    }
}
