//! Asset identity for tagged amounts

use super::AmountError;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Display code of the ledger's native unit
pub const NATIVE_CODE: &str = "XLM";

/// Longest asset code the ledger accepts
pub const MAX_CODE_LEN: usize = 12;

/// Identity of a fungible asset held on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssetId {
    /// The ledger's native unit
    Native,
    /// An issued asset, identified by its code and the issuing account
    Credit { code: String, issuer: String },
}

impl AssetId {
    /// Create an issued asset; the code must be 1-12 ASCII alphanumerics
    pub fn credit(code: impl Into<String>, issuer: impl Into<String>) -> Result<Self, AmountError> {
        let code = code.into();
        let issuer = issuer.into();

        if code.is_empty()
            || code.len() > MAX_CODE_LEN
            || !code.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(AmountError::InvalidAsset(format!(
                "asset code {:?} must be 1-{} ASCII alphanumerics",
                code, MAX_CODE_LEN
            )));
        }
        if issuer.trim().is_empty() {
            return Err(AmountError::InvalidAsset(format!(
                "asset {} has no issuer",
                code
            )));
        }

        Ok(AssetId::Credit { code, issuer })
    }

    pub fn is_native(&self) -> bool {
        matches!(self, AssetId::Native)
    }

    /// Asset code, or the native display code
    pub fn code(&self) -> &str {
        match self {
            AssetId::Native => NATIVE_CODE,
            AssetId::Credit { code, .. } => code,
        }
    }

    pub fn issuer(&self) -> Option<&str> {
        match self {
            AssetId::Native => None,
            AssetId::Credit { issuer, .. } => Some(issuer),
        }
    }

    /// Human readable form including the issuer
    pub fn describe(&self) -> String {
        match self {
            AssetId::Native => NATIVE_CODE.to_string(),
            AssetId::Credit { code, issuer } => format!("{} ({})", code, issuer),
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
