//! Network modes and the Monad deployments behind them.
//!
//! The client picks a [`NetworkMode`]: `dev` pays on Monad Testnet, `main` pays on
//! Monad Mainnet. Both deployments expose the same logical contracts, so a mode is
//! all a request needs to carry; everything chain-specific is resolved here.
//!
//! ```
//! use agentpay_types::network::NetworkMode;
//!
//! let mode = NetworkMode::from_param(Some("main"));
//! assert_eq!(mode.chain_id().to_string(), "eip155:143");
//! assert_eq!(NetworkMode::from_param(Some("whatever")), NetworkMode::Dev);
//! ```

use alloy_primitives::{Address, address};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace of EVM chains in CAIP-2 identifiers.
pub const EIP155_NAMESPACE: &str = "eip155";

/// A CAIP-2 blockchain identifier, `namespace:reference`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainId {
    /// The blockchain namespace, `eip155` for EVM chains.
    pub namespace: String,
    /// The chain-specific reference, the numeric chain id for EVM chains.
    pub reference: String,
}

impl ChainId {
    pub fn new<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    /// Creates an EVM chain id from its numeric EIP-155 chain id.
    pub fn eip155(chain_id: u64) -> Self {
        Self::new(EIP155_NAMESPACE, chain_id.to_string())
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

/// Client-selectable flag choosing between the test and production chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// Monad Testnet.
    #[default]
    Dev,
    /// Monad Mainnet.
    Main,
}

impl NetworkMode {
    /// Resolves an optional `network` request parameter.
    ///
    /// Only `"main"` selects mainnet; anything else, including absence, is `dev`.
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some("main") => NetworkMode::Main,
            _ => NetworkMode::Dev,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkMode::Dev => "dev",
            NetworkMode::Main => "main",
        }
    }

    /// The chain this mode pays on.
    pub fn chain(&self) -> &'static MonadChain {
        match self {
            NetworkMode::Dev => &MONAD_TESTNET,
            NetworkMode::Main => &MONAD_MAINNET,
        }
    }

    pub fn chain_id(&self) -> ChainId {
        ChainId::eip155(self.chain().id)
    }

    /// x402 v1 network name, as advertised in payment requirements.
    pub fn network_name(&self) -> &'static str {
        self.chain().network_name
    }

    pub fn usdc(&self) -> &'static UsdcDeployment {
        &self.chain().usdc
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Monad deployment: chain id, x402 network name and the USDC token used for payments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonadChain {
    pub id: u64,
    pub network_name: &'static str,
    pub usdc: UsdcDeployment,
}

/// USDC token contract on a particular chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsdcDeployment {
    pub address: Address,
    pub decimals: u32,
    /// EIP-712 domain name of the token.
    pub eip712_name: &'static str,
    /// EIP-712 domain version of the token.
    pub eip712_version: &'static str,
}

pub static MONAD_TESTNET: MonadChain = MonadChain {
    id: 10143,
    network_name: "monad-testnet",
    usdc: UsdcDeployment {
        address: address!("0x534b2f3A21130d7a60830c2Df862319e593943A3"),
        decimals: 6,
        eip712_name: "USDC",
        eip712_version: "2",
    },
};

pub static MONAD_MAINNET: MonadChain = MonadChain {
    id: 143,
    network_name: "monad",
    usdc: UsdcDeployment {
        address: address!("0xf817257fed379853cDe0fa4F97AB987181B1E5Ea"),
        decimals: 6,
        eip712_name: "USDC",
        eip712_version: "2",
    },
};
