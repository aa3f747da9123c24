//! Permission descriptors: which contract, function and argument values a
//! session key may use.
//!
//! Every rule constrains one static argument of the target function. Arguments
//! are compared as 32-byte ABI words interpreted as unsigned integers, which is
//! exactly what the validator module does on-chain, so a local pass here means
//! the same word comparison will pass there (given unchanged contract state).

use alloy_json_abi::{Function, JsonAbi};
use alloy_primitives::{Address, B256, Bytes, FixedBytes, U256, keccak256};
use alloy_sol_types::{SolValue, sol};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionKeyError};
use crate::user_op::CallRequest;

sol! {
    /// On-chain layout of one argument rule.
    struct ParamRule {
        uint256 offset;
        uint8 condition;
        bytes32 param;
    }
}

/// Comparison applied between the call argument and the rule value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ParamOperator {
    Equal = 0,
    GreaterThan = 1,
    LessThan = 2,
    GreaterThanOrEqual = 3,
    LessThanOrEqual = 4,
    NotEqual = 5,
}

impl ParamOperator {
    /// On-chain condition code.
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn holds(self, actual: U256, expected: U256) -> bool {
        match self {
            Self::Equal => actual == expected,
            Self::GreaterThan => actual > expected,
            Self::LessThan => actual < expected,
            Self::GreaterThanOrEqual => actual >= expected,
            Self::LessThanOrEqual => actual <= expected,
            Self::NotEqual => actual != expected,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThanOrEqual => "<=",
            Self::NotEqual => "!=",
        }
    }
}

/// A typed value to compare an argument against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Address(Address),
    Uint(U256),
    Bool(bool),
    /// `bytesN` value, `N` = length.
    FixedBytes(Bytes),
}

impl From<Address> for ParamValue {
    fn from(value: Address) -> Self {
        Self::Address(value)
    }
}

impl From<U256> for ParamValue {
    fn from(value: U256) -> Self {
        Self::Uint(value)
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        Self::Uint(U256::from(value))
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl ParamValue {
    /// ABI word for this value when passed as a `ty` argument.
    fn to_word(&self, ty: &str) -> std::result::Result<B256, String> {
        match (self, ty) {
            (Self::Address(a), "address") => Ok(a.into_word()),
            (Self::Bool(b), "bool") => Ok(B256::from(U256::from(*b as u8).to_be_bytes::<32>())),
            (Self::Uint(v), ty) if ty.starts_with("uint") => {
                let bits = int_bits(&ty[4..]).ok_or_else(|| format!("unsupported type {ty}"))?;
                if v.bit_len() > bits {
                    return Err(format!("value {v} does not fit in {ty}"));
                }
                Ok(B256::from(v.to_be_bytes::<32>()))
            }
            (Self::FixedBytes(b), ty) if is_fixed_bytes(ty) => {
                let size: usize = ty[5..].parse().map_err(|_| format!("bad type {ty}"))?;
                if b.len() != size {
                    return Err(format!("{ty} needs {size} bytes, got {}", b.len()));
                }
                Ok(B256::right_padding_from(b))
            }
            (value, ty) => Err(format!("{value:?} is not a {ty} value")),
        }
    }
}

fn int_bits(suffix: &str) -> Option<usize> {
    if suffix.is_empty() {
        return Some(256);
    }
    let bits: usize = suffix.parse().ok()?;
    (bits % 8 == 0 && (8..=256).contains(&bits)).then_some(bits)
}

fn is_fixed_bytes(ty: &str) -> bool {
    ty.strip_prefix("bytes")
        .and_then(|n| n.parse::<usize>().ok())
        .is_some_and(|n| (1..=32).contains(&n))
}

fn is_static_word(ty: &str) -> bool {
    matches!(ty, "address" | "bool")
        || ty.strip_prefix("uint").and_then(int_bits).is_some()
        || is_fixed_bytes(ty)
}

/// Caller-facing argument condition: `(argumentIndex, operator, value)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgCondition {
    pub index: usize,
    pub operator: ParamOperator,
    pub value: ParamValue,
}

impl ArgCondition {
    pub fn new(index: usize, operator: ParamOperator, value: impl Into<ParamValue>) -> Self {
        Self {
            index,
            operator,
            value: value.into(),
        }
    }
}

/// One constraint on one positional argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRule {
    pub argument_index: u32,
    pub operator: ParamOperator,
    pub value: B256,
}

impl PermissionRule {
    /// Byte offset of the argument word after the selector.
    pub fn offset(&self) -> usize {
        self.argument_index as usize * 32
    }

    fn check(&self, args: &[u8]) -> std::result::Result<(), String> {
        let start = self.offset();
        let word = args
            .get(start..start + 32)
            .ok_or_else(|| format!("argument {} missing from calldata", self.argument_index))?;
        let actual = U256::from_be_slice(word);
        let expected = U256::from_be_bytes(self.value.0);
        if self.operator.holds(actual, expected) {
            Ok(())
        } else {
            Err(format!(
                "argument {} violates rule: {actual:#x} {} {expected:#x} does not hold",
                self.argument_index,
                self.operator.symbol()
            ))
        }
    }
}

/// Capability to call one function on one contract, under argument rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub target: Address,
    pub selector: FixedBytes<4>,
    /// Maximum native value per call; zero forbids value transfer.
    pub value_limit: U256,
    /// Evaluated conjunctively, in order.
    pub rules: Vec<PermissionRule>,
}

impl Permission {
    /// Build a permission from an interface description.
    ///
    /// `function` is either a bare name (must be unambiguous in `abi`) or a full
    /// signature such as `transfer(address,uint256)`.
    pub fn from_abi(
        target: Address,
        abi: &JsonAbi,
        function: &str,
        value_limit: U256,
        conditions: &[ArgCondition],
    ) -> Result<Self> {
        let func = resolve_function(abi, function)?;
        let mut rules = Vec::with_capacity(conditions.len());
        for cond in conditions {
            let param = func.inputs.get(cond.index).ok_or_else(|| {
                SessionKeyError::InvalidPermissionSpec(format!(
                    "{} has {} arguments, no argument {}",
                    func.signature(),
                    func.inputs.len(),
                    cond.index
                ))
            })?;
            if !is_static_word(&param.ty) {
                return Err(SessionKeyError::InvalidPermissionSpec(format!(
                    "argument {} of {} is {}, only single-word static types can be constrained",
                    cond.index,
                    func.signature(),
                    param.ty
                )));
            }
            // A rule on argument i reads word i, which is only true while every
            // earlier argument is also a single static word.
            if let Some(prev) = func.inputs[..cond.index]
                .iter()
                .find(|p| !is_static_word(&p.ty))
            {
                return Err(SessionKeyError::InvalidPermissionSpec(format!(
                    "argument {} follows non-static argument of type {}",
                    cond.index, prev.ty
                )));
            }
            let value = cond
                .value
                .to_word(&param.ty)
                .map_err(SessionKeyError::InvalidPermissionSpec)?;
            rules.push(PermissionRule {
                argument_index: cond.index as u32,
                operator: cond.operator,
                value,
            });
        }

        Ok(Self {
            target,
            selector: func.selector(),
            value_limit,
            rules,
        })
    }

    /// Canonical ABI encoding; identical inputs give identical bytes.
    pub fn encode(&self) -> Bytes {
        let rules: Vec<ParamRule> = self
            .rules
            .iter()
            .map(|r| ParamRule {
                offset: U256::from(r.offset()),
                condition: r.operator.code(),
                param: r.value,
            })
            .collect();
        (self.target, self.selector, self.value_limit, rules)
            .abi_encode_params()
            .into()
    }

    pub fn hash(&self) -> B256 {
        keccak256(self.encode())
    }

    pub fn applies_to(&self, call: &CallRequest) -> bool {
        call.target == self.target && call.selector() == Some(self.selector.0)
    }

    /// Evaluate value limit and every rule against `call`.
    pub fn check(&self, call: &CallRequest) -> std::result::Result<(), String> {
        if !self.applies_to(call) {
            return Err("target or selector differs".into());
        }
        if call.value > self.value_limit {
            return Err(format!(
                "value {} exceeds limit {}",
                call.value, self.value_limit
            ));
        }
        let args = &call.data[4..];
        self.rules.iter().try_for_each(|rule| rule.check(args))
    }
}

fn resolve_function<'a>(abi: &'a JsonAbi, function: &str) -> Result<&'a Function> {
    if function.contains('(') {
        return abi
            .functions()
            .find(|f| f.signature() == function)
            .ok_or_else(|| {
                SessionKeyError::InvalidPermissionSpec(format!("function {function} not in ABI"))
            });
    }
    match abi.function(function).map(Vec::as_slice) {
        Some([func]) => Ok(func),
        Some(overloads) if !overloads.is_empty() => {
            Err(SessionKeyError::InvalidPermissionSpec(format!(
                "function {function} is overloaded ({} variants), pass the full signature",
                overloads.len()
            )))
        }
        _ => Err(SessionKeyError::InvalidPermissionSpec(format!(
            "function {function} not in ABI"
        ))),
    }
}

/// Index of the first permission that allows `call`.
///
/// Fails with `PermissionDenied` carrying the reason from the last permission
/// that targeted the same function, or a generic reason if none did.
pub fn find_allowing(permissions: &[Permission], call: &CallRequest) -> Result<usize> {
    let mut last_reason = None;
    for (i, permission) in permissions.iter().enumerate() {
        if !permission.applies_to(call) {
            continue;
        }
        match permission.check(call) {
            Ok(()) => return Ok(i),
            Err(reason) => last_reason = Some(reason),
        }
    }
    Err(SessionKeyError::PermissionDenied(last_reason.unwrap_or_else(
        || match call.selector() {
            Some(sel) => format!(
                "no permission for {} selector 0x{}",
                call.target,
                hex::encode(sel)
            ),
            None => format!("calldata to {} has no selector", call.target),
        },
    )))
}
