use std::{fs, path::Path, time::Duration};

use lantern_protocol::{
    content::{HelpLink, KernelInfoReply, LanguageInfo, ReplyStatus},
    DecodeMode, SignatureError, Signer, PROTOCOL_VERSION,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::KernelError;

/// A Jupyter connection file, as written by the front-end that launches us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub transport: String,
    pub ip: String,
    pub shell_port: u16,
    pub control_port: u16,
    pub iopub_port: u16,
    pub stdin_port: u16,
    pub hb_port: u16,
    /// Empty disables signing
    #[serde(default)]
    pub key: String,
    #[serde(default = "default_signature_scheme")]
    pub signature_scheme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_name: Option<String>,
}

fn default_signature_scheme() -> String {
    "hmac-sha256".to_string()
}

impl ConnectionInfo {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, KernelError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn endpoint(&self, port: u16) -> String {
        format!("{}://{}:{}", self.transport, self.ip, port)
    }

    pub fn signer(&self) -> Result<Option<Signer>, SignatureError> {
        if self.key.is_empty() {
            return Ok(None);
        }

        let scheme = self.signature_scheme.parse()?;
        Ok(Some(Signer::new(scheme, self.key.as_bytes())))
    }
}

/// Language metadata announced in `kernel_info_reply`.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelInfo {
    pub implementation: String,
    pub implementation_version: String,
    pub language: LanguageInfo,
    pub banner: String,
    pub help_links: Vec<HelpLink>,
}

impl Default for KernelInfo {
    fn default() -> Self {
        Self {
            implementation: "lantern".to_string(),
            implementation_version: env!("CARGO_PKG_VERSION").to_string(),
            language: LanguageInfo {
                name: "text".to_string(),
                version: String::new(),
                mimetype: "text/plain".to_string(),
                file_extension: ".txt".to_string(),
            },
            banner: "Lantern kernel".to_string(),
            help_links: Vec::new(),
        }
    }
}

impl KernelInfo {
    pub fn reply(&self) -> KernelInfoReply {
        KernelInfoReply {
            status: ReplyStatus::Ok,
            protocol_version: PROTOCOL_VERSION.to_string(),
            implementation: self.implementation.clone(),
            implementation_version: self.implementation_version.clone(),
            language_info: self.language.clone(),
            banner: self.banner.clone(),
            help_links: self.help_links.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Scopes broadcast topics, `kernel.<identity>.<msg_type>`
    pub identity: String,
    /// Session id stamped on every header the kernel emits
    pub session: String,
    pub username: String,
    pub decode_mode: DecodeMode,
    pub verify_signatures: bool,
    /// How long an interrupt or is-complete request may wait for the engine
    pub inflight_ttl: Duration,
    pub kernel_info: KernelInfo,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            identity: Uuid::new_v4().to_string(),
            session: Uuid::new_v4().to_string(),
            username: "kernel".to_string(),
            decode_mode: DecodeMode::Permissive,
            verify_signatures: true,
            inflight_ttl: Duration::from_secs(300),
            kernel_info: KernelInfo::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use lantern_protocol::SignatureScheme;

    const CONNECTION_FILE: &str = r#"{
        "shell_port": 53794,
        "iopub_port": 53795,
        "stdin_port": 53796,
        "control_port": 53797,
        "hb_port": 53798,
        "ip": "127.0.0.1",
        "key": "a0436f6c-1916-498b-8eb9-e81ab9368e84",
        "transport": "tcp",
        "signature_scheme": "hmac-sha512",
        "kernel_name": "lantern"
    }"#;

    #[googletest::test]
    fn connection_file_is_parsed() {
        let info: ConnectionInfo = serde_json::from_str(CONNECTION_FILE).unwrap();

        expect_that!(info.endpoint(info.shell_port), eq("tcp://127.0.0.1:53794"));
        expect_that!(info.endpoint(info.hb_port), eq("tcp://127.0.0.1:53798"));
        expect_that!(
            info.signer().unwrap().map(|signer| signer.scheme()),
            some(eq(SignatureScheme::HmacSha512))
        );
    }

    #[googletest::test]
    fn empty_key_disables_signing() {
        let mut info: ConnectionInfo = serde_json::from_str(CONNECTION_FILE).unwrap();
        info.key.clear();

        expect_that!(info.signer().unwrap().is_none(), eq(true));
    }

    #[googletest::test]
    fn unknown_scheme_is_an_error() {
        let mut info: ConnectionInfo = serde_json::from_str(CONNECTION_FILE).unwrap();
        info.signature_scheme = "hmac-md5".into();

        expect_that!(
            info.signer().err(),
            some(eq(SignatureError::UnknownScheme("hmac-md5".into())))
        );
    }

    #[googletest::test]
    fn kernel_info_reply_announces_protocol_version() {
        let reply = KernelInfo::default().reply();

        expect_that!(reply.protocol_version, eq(PROTOCOL_VERSION));
        expect_that!(reply.implementation, eq("lantern"));
    }
}
