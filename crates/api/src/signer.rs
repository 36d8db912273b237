//! Remote transaction signing service client.
//!
//! The signing service holds the liquidator key. It builds the contract call,
//! simulates it against the network, and returns a signed envelope ready for
//! `sendTransaction`.

use alloy::primitives::U256;
use async_trait::async_trait;
use loan_monitor_chain::{EnvelopeSigner, ExecutorError, LoanAction, SignedEnvelope};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Simulation can take a while on a busy node.
const DEFAULT_SIGN_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for [`RemoteSigner`].
pub struct RemoteSignerBuilder {
    base_url: String,
    contract_id: String,
    network_passphrase: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl RemoteSignerBuilder {
    /// Create a new builder.
    pub fn new(base_url: impl Into<String>, contract_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            contract_id: contract_id.into(),
            network_passphrase: String::new(),
            api_key: None,
            timeout: DEFAULT_SIGN_TIMEOUT,
        }
    }

    /// Set the network passphrase the envelope is signed for.
    pub fn network_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.network_passphrase = passphrase.into();
        self
    }

    /// Authenticate with a bearer token.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the signer.
    pub fn build(self) -> Result<RemoteSigner, ExecutorError> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        info!(
            signer_url = %self.base_url,
            contract = %self.contract_id,
            authenticated = self.api_key.is_some(),
            "Remote signer initialized"
        );

        Ok(RemoteSigner {
            client,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            contract_id: self.contract_id,
            network_passphrase: self.network_passphrase,
            api_key: self.api_key,
        })
    }
}

/// [`EnvelopeSigner`] that delegates to a signing service over HTTP.
pub struct RemoteSigner {
    client: reqwest::Client,
    base_url: String,
    contract_id: String,
    network_passphrase: String,
    api_key: Option<String>,
}

impl RemoteSigner {
    pub fn builder(base_url: impl Into<String>, contract_id: impl Into<String>) -> RemoteSignerBuilder {
        RemoteSignerBuilder::new(base_url, contract_id)
    }

    pub fn contract_id(&self) -> &str {
        &self.contract_id
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest<'a> {
    contract_id: &'a str,
    network_passphrase: &'a str,
    #[serde(flatten)]
    action: &'a LoanAction,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignResponse {
    envelope_xdr: Option<String>,
    expected_reward: Option<String>,
    simulation_error: Option<String>,
}

impl TryFrom<SignResponse> for SignedEnvelope {
    type Error = ExecutorError;

    fn try_from(body: SignResponse) -> Result<Self, Self::Error> {
        if let Some(reason) = body.simulation_error {
            return Err(ExecutorError::SimulationRejected(reason));
        }

        let envelope_xdr = body
            .envelope_xdr
            .filter(|xdr| !xdr.is_empty())
            .ok_or_else(|| ExecutorError::Transport("signer returned no envelope".to_string()))?;

        let expected_reward = body
            .expected_reward
            .map(|r| {
                U256::from_str_radix(r.trim(), 10).map_err(|e| {
                    ExecutorError::Transport(format!("invalid expectedReward {r:?}: {e}"))
                })
            })
            .transpose()?;

        Ok(SignedEnvelope {
            envelope_xdr,
            expected_reward,
        })
    }
}

#[async_trait]
impl EnvelopeSigner for RemoteSigner {
    #[instrument(skip(self), fields(method = action.contract_method(), borrower = %action.borrower()))]
    async fn sign(&self, action: &LoanAction) -> Result<SignedEnvelope, ExecutorError> {
        let request = SignRequest {
            contract_id: &self.contract_id,
            network_passphrase: &self.network_passphrase,
            action,
        };

        let mut builder = self
            .client
            .post(format!("{}/v1/sign", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        debug!(status = %status, "Signer response");

        if status == StatusCode::UNPROCESSABLE_ENTITY {
            let detail = response.text().await.unwrap_or_default();
            return Err(ExecutorError::SimulationRejected(detail));
        }
        if !status.is_success() {
            return Err(ExecutorError::Transport(format!("signer returned {status}")));
        }

        let body: SignResponse = response.json().await?;
        body.try_into()
    }
}

impl std::fmt::Debug for RemoteSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSigner")
            .field("base_url", &self.base_url)
            .field("contract_id", &self.contract_id)
            .field("network_passphrase", &self.network_passphrase)
            .field("authenticated", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}
