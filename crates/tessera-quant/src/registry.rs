//! Operator Registry
//!
//! The allow-list of operator types whose weights may be quantized, and the
//! rewrite rule for each operator type the quantizer understands.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use serde::{Deserialize, Serialize};

use crate::error::{QuantError, QuantResult};

/// How an operator type's weight is located and rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteRule {
    /// Float operator type.
    pub op_type: &'static str,
    /// Input position of the weight.
    pub weight_input: usize,
    /// Required weight rank.
    pub weight_rank: usize,
    /// Weight-dequantizing variant in the quantization domain.
    pub variant: &'static str,
    /// Input arity of the float operator, including optional inputs.
    pub arity: usize,
}

/// Rewrite rules for every supported operator type.
pub const REWRITE_RULES: &[RewriteRule] = &[
    RewriteRule {
        op_type: "MatMul",
        weight_input: 1,
        weight_rank: 2,
        variant: "DequantMatMul",
        arity: 2,
    },
    RewriteRule {
        op_type: "Gemm",
        weight_input: 1,
        weight_rank: 2,
        variant: "DequantGemm",
        arity: 3,
    },
    RewriteRule {
        op_type: "Conv",
        weight_input: 1,
        weight_rank: 4,
        variant: "DequantConv",
        arity: 3,
    },
    RewriteRule {
        op_type: "Gather",
        weight_input: 0,
        weight_rank: 2,
        variant: "DequantGather",
        arity: 2,
    },
];

/// Looks up the rewrite rule for an operator type.
pub fn rewrite_rule(op_type: &str) -> Option<&'static RewriteRule> {
    REWRITE_RULES.iter().find(|r| r.op_type == op_type)
}

/// Explicit allow-list of operator types to quantize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpRegistry {
    ops: Vec<String>,
}

impl Default for OpRegistry {
    fn default() -> Self {
        Self::integer_ops()
    }
}

impl OpRegistry {
    /// Operators with integer kernels: `MatMul`, `Gemm`, `Conv`, `Gather`.
    pub fn integer_ops() -> Self {
        Self::new(REWRITE_RULES.iter().map(|r| r.op_type))
    }

    /// Creates a registry from operator type names, keeping first occurrences.
    pub fn new<I, S>(ops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list: Vec<String> = Vec::new();
        for op in ops {
            let op = op.into();
            if !list.contains(&op) {
                list.push(op);
            }
        }
        Self { ops: list }
    }

    /// Parses a comma-separated list such as `"MatMul,Gemm"`.
    pub fn parse(list: &str) -> QuantResult<Self> {
        let ops: Vec<&str> = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if ops.is_empty() {
            return Err(QuantError::InvalidConfig(
                "operator list is empty".to_string(),
            ));
        }
        Ok(Self::new(ops))
    }

    /// Returns true if `op_type` is allowed.
    pub fn contains(&self, op_type: &str) -> bool {
        self.ops.iter().any(|o| o == op_type)
    }

    /// Allowed operator types in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().map(String::as_str)
    }

    /// Number of allowed operator types.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing is allowed.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Fails for any allowed operator without a rewrite rule.
    pub fn validate(&self) -> QuantResult<()> {
        match self.iter().find(|op| rewrite_rule(op).is_none()) {
            Some(op) => Err(QuantError::UnsupportedOperator(format!(
                "no weight rewrite rule for operator type '{op}'"
            ))),
            None => Ok(()),
        }
    }
}
