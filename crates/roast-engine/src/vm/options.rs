//! Interpreter configuration
//!
//! `VmOptions` is plain data with serde support so hosts can load it from
//! whatever format they already use for their own configuration.

use serde::{Deserialize, Serialize};

use crate::vm::defaults;

/// How a `boolean` return value is normalized before it reaches the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BooleanPolicy {
    /// Keep only the low bit (`v & 1`)
    #[default]
    LowBit,
    /// Any non-zero value becomes 1
    NonZero,
}

impl BooleanPolicy {
    /// Normalize an int-slot boolean
    #[inline]
    pub fn normalize(self, v: i32) -> i32 {
        match self {
            BooleanPolicy::LowBit => v & 1,
            BooleanPolicy::NonZero => i32::from(v != 0),
        }
    }
}

/// Interpreter options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmOptions {
    /// Rewrite quickenable sites after their first execution
    pub quickening: bool,
    /// Consult the tiering policy on loop back-edges
    pub osr: bool,
    /// Boolean return normalization
    pub boolean_policy: BooleanPolicy,
    /// Interpreter activations on one thread before `StackOverflow`
    pub max_call_depth: usize,
    /// Saturation bound of per-activation loop counts
    pub loop_count_limit: u32,
    /// Consult OSR every N back-edges
    pub osr_poll_interval: u32,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            quickening: true,
            osr: true,
            boolean_policy: BooleanPolicy::default(),
            max_call_depth: defaults::DEFAULT_MAX_CALL_DEPTH,
            loop_count_limit: defaults::DEFAULT_LOOP_COUNT_LIMIT,
            osr_poll_interval: defaults::DEFAULT_OSR_POLL_INTERVAL,
        }
    }
}

/// Invalid option combination
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    /// `max_call_depth` must allow at least one activation
    #[error("max_call_depth must be at least 1")]
    ZeroCallDepth,

    /// `osr_poll_interval` must be positive
    #[error("osr_poll_interval must be at least 1")]
    ZeroPollInterval,

    /// `loop_count_limit` must be positive
    #[error("loop_count_limit must be at least 1")]
    ZeroLoopLimit,
}

impl VmOptions {
    /// Check the options for values the interpreter cannot run with
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.max_call_depth == 0 {
            return Err(OptionsError::ZeroCallDepth);
        }
        if self.osr_poll_interval == 0 {
            return Err(OptionsError::ZeroPollInterval);
        }
        if self.loop_count_limit == 0 {
            return Err(OptionsError::ZeroLoopLimit);
        }
        Ok(())
    }

    /// Options with quickening turned off (every execution takes the resolve path)
    pub fn without_quickening(mut self) -> Self {
        self.quickening = false;
        self
    }

    /// Options with OSR turned off
    pub fn without_osr(mut self) -> Self {
        self.osr = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let opts = VmOptions::default();
        assert!(opts.validate().is_ok());
        assert!(opts.quickening);
        assert!(opts.osr);
        assert_eq!(opts.max_call_depth, 1024);
    }

    #[test]
    fn test_rejects_zero_depth() {
        let opts = VmOptions {
            max_call_depth: 0,
            ..VmOptions::default()
        };
        assert_eq!(opts.validate(), Err(OptionsError::ZeroCallDepth));
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let opts = VmOptions {
            osr_poll_interval: 0,
            ..VmOptions::default()
        };
        assert_eq!(opts.validate(), Err(OptionsError::ZeroPollInterval));
    }

    #[test]
    fn test_boolean_policy() {
        assert_eq!(BooleanPolicy::LowBit.normalize(2), 0);
        assert_eq!(BooleanPolicy::LowBit.normalize(3), 1);
        assert_eq!(BooleanPolicy::NonZero.normalize(2), 1);
        assert_eq!(BooleanPolicy::NonZero.normalize(0), 0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let opts: VmOptions =
            serde_json::from_str(r#"{"osr": false, "boolean_policy": "non_zero"}"#).unwrap();
        assert!(!opts.osr);
        assert!(opts.quickening);
        assert_eq!(opts.boolean_policy, BooleanPolicy::NonZero);
        assert_eq!(opts.max_call_depth, 1024);
    }
}
