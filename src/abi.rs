//! Contract interface descriptions and call encoders.

use alloy_json_abi::JsonAbi;
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{SolCall, sol};

use crate::error::{Result, SessionKeyError};

sol! {
    #[sol(abi)]
    interface IERC20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
        function transferFrom(address from, address to, uint256 amount) external returns (bool);
    }

    /// Kernel smart account entry for single calls.
    interface IKernel {
        function execute(
            address to,
            uint256 value,
            bytes calldata data,
            uint8 operation
        ) external payable;
    }

    interface IEntryPoint {
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }
}

/// Operation code for a plain call in `IKernel::execute`.
pub const OPERATION_CALL: u8 = 0;

/// ERC-20 interface description for the permission builder.
pub fn erc20_abi() -> JsonAbi {
    IERC20::abi::contract()
}

/// Parse a JSON ABI supplied by the caller.
pub fn parse_abi(json: &str) -> Result<JsonAbi> {
    serde_json::from_str(json)
        .map_err(|e| SessionKeyError::InvalidPermissionSpec(format!("unreadable ABI: {e}")))
}

/// `transfer(to, amount)` calldata.
pub fn erc20_transfer(to: Address, amount: U256) -> Bytes {
    IERC20::transferCall { to, amount }.abi_encode().into()
}

/// Wrap a call into the account's `execute` calldata.
pub fn kernel_execute(to: Address, value: U256, data: Bytes) -> Bytes {
    IKernel::executeCall {
        to,
        value,
        data,
        operation: OPERATION_CALL,
    }
    .abi_encode()
    .into()
}

/// `getNonce(sender, key)` calldata for the EntryPoint.
pub fn entry_point_get_nonce(sender: Address) -> Bytes {
    IEntryPoint::getNonceCall {
        sender,
        key: Default::default(),
    }
    .abi_encode()
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, hex};

    #[test]
    fn erc20_abi_resolves_transfer() {
        let abi = erc20_abi();
        let transfer = &abi.function("transfer").unwrap()[0];
        assert_eq!(transfer.selector().as_slice(), &hex!("a9059cbb"));
        assert_eq!(transfer.inputs.len(), 2);
        assert_eq!(transfer.inputs[0].ty, "address");
        assert_eq!(transfer.inputs[1].ty, "uint256");
    }

    #[test]
    fn transfer_calldata_layout() {
        let to = address!("C13B7CDa9B08A4Fb1026E479A2079029cd30BfaD");
        let data = erc20_transfer(to, U256::from(1_000_000u64));
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(&data[..4], &hex!("a9059cbb"));
        assert_eq!(&data[16..36], to.as_slice());
        assert_eq!(U256::from_be_slice(&data[36..68]), U256::from(1_000_000u64));
    }

    #[test]
    fn erc20_abi_lists_the_standard_functions() {
        let abi = erc20_abi();
        for name in [
            "name",
            "symbol",
            "decimals",
            "totalSupply",
            "balanceOf",
            "allowance",
            "transfer",
            "approve",
            "transferFrom",
        ] {
            assert!(abi.function(name).is_some(), "missing {name}");
        }
        let approve = &abi.function("approve").unwrap()[0];
        assert_eq!(approve.selector().as_slice(), &hex!("095ea7b3"));
    }

    #[test]
    fn parse_abi_rejects_garbage() {
        assert!(matches!(
            parse_abi("not json"),
            Err(SessionKeyError::InvalidPermissionSpec(_))
        ));
    }
}
