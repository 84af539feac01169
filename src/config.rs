//! Harness configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{ContractError, Result};
use crate::interpreter::ScriptFlags;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Fee deducted from the funded amount when building the spend
    pub fee: i64,

    /// Amount used by [`crate::harness::ScriptHarness::run`]
    pub funding_amount: i64,

    /// Interpreter flags applied during verification
    pub flags: ScriptFlags,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            fee: DEFAULT_FEE,
            funding_amount: DEFAULT_FUNDING_AMOUNT,
            flags: ScriptFlags::STANDARD,
        }
    }
}

impl HarnessConfig {
    /// Parse and validate a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: HarnessConfig = serde_json::from_str(json)
            .map_err(|e| ContractError::Config(format!("invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ContractError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fee < 0 || self.fee > MAX_MONEY {
            return Err(ContractError::Config(format!("fee {} out of range", self.fee)));
        }
        if self.funding_amount <= 0 || self.funding_amount > MAX_MONEY {
            return Err(ContractError::Config(format!(
                "funding amount {} out of range",
                self.funding_amount
            )));
        }
        if self.funding_amount <= self.fee {
            return Err(ContractError::Config(format!(
                "funding amount {} does not cover fee {}",
                self.funding_amount, self.fee
            )));
        }
        Ok(())
    }
}
