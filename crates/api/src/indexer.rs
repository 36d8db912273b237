//! Loan indexer API client.
//!
//! The indexer mirrors lending pool storage and the collateral price feed
//! behind a small REST API. Amounts travel as decimal strings so that 18
//! decimal collateral balances survive JSON.

use alloy::primitives::U256;
use async_trait::async_trait;
use loan_monitor_chain::{
    BorrowerId, BorrowerRegistry, LedgerError, Loan, LoanRepository, PriceOracle, PriceSnapshot,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Indexer REST client.
#[derive(Debug, Clone)]
pub struct IndexerClient {
    client: reqwest::Client,
    base_url: String,
}

impl IndexerClient {
    /// Create a client for the indexer at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a client reusing an existing HTTP client.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, LedgerError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await?;
        debug!(url = %url, status = %response.status(), "Indexer response");
        Ok(response)
    }
}

#[async_trait]
impl PriceOracle for IndexerClient {
    #[instrument(skip(self))]
    async fn get_price(&self, asset: &str) -> Result<PriceSnapshot, LedgerError> {
        let response = self.get(&format!("/v1/prices/{asset}")).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(LedgerError::NotFound(format!("price for {asset}")));
        }
        let body: PriceResponse = read_json(response).await?;
        body.try_into()
    }
}

#[async_trait]
impl LoanRepository for IndexerClient {
    #[instrument(skip(self), fields(borrower = %borrower))]
    async fn get_loan(&self, borrower: &BorrowerId) -> Result<Option<Loan>, LedgerError> {
        let response = self.get(&format!("/v1/loans/{borrower}")).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: LoanResponse = read_json(response).await?;
        body.try_into().map(Some)
    }
}

#[async_trait]
impl BorrowerRegistry for IndexerClient {
    #[instrument(skip(self))]
    async fn active_borrowers(&self) -> Result<Vec<BorrowerId>, LedgerError> {
        let response = self.get("/v1/borrowers/active").await?;
        let body: BorrowersResponse = read_json(response).await?;
        Ok(body.borrowers.into_iter().map(BorrowerId::from).collect())
    }
}

/// Map non-success statuses onto the ledger error taxonomy.
fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LedgerError> {
    classify_status(response.status())?;
    Ok(response)
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, LedgerError> {
    let body = check_status(response)?.bytes().await?;
    decode(&body)
}

/// Decode a response body. Missing or mistyped fields are `Malformed`.
fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, LedgerError> {
    serde_json::from_slice(body).map_err(|e| LedgerError::Malformed(e.to_string()))
}

fn classify_status(status: StatusCode) -> Result<(), LedgerError> {
    if status.is_success() {
        Ok(())
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(LedgerError::Transient(format!("indexer returned {status}")))
    } else if status == StatusCode::NOT_FOUND {
        Err(LedgerError::NotFound(format!("indexer returned {status}")))
    } else {
        Err(LedgerError::Malformed(format!("indexer rejected request: {status}")))
    }
}

fn parse_amount(field: &str, value: &str) -> Result<U256, LedgerError> {
    U256::from_str_radix(value.trim(), 10)
        .map_err(|e| LedgerError::Malformed(format!("{field} = {value:?}: {e}")))
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: String,
    timestamp: u64,
}

impl TryFrom<PriceResponse> for PriceSnapshot {
    type Error = LedgerError;

    fn try_from(body: PriceResponse) -> Result<Self, Self::Error> {
        Ok(PriceSnapshot::new(
            parse_amount("price", &body.price)?,
            body.timestamp,
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoanResponse {
    collateral_amount: String,
    outstanding_debt: String,
    #[serde(default)]
    penalties: Option<String>,
    /// Warning timing keys off these, so they are never defaulted
    last_payment_time: u64,
    warnings_issued: u32,
    last_warning_time: u64,
}

impl TryFrom<LoanResponse> for Loan {
    type Error = LedgerError;

    fn try_from(body: LoanResponse) -> Result<Self, Self::Error> {
        let penalties = match body.penalties.as_deref() {
            Some(p) => parse_amount("penalties", p)?,
            None => U256::ZERO,
        };
        Ok(Loan {
            collateral_amount: parse_amount("collateralAmount", &body.collateral_amount)?,
            outstanding_debt: parse_amount("outstandingDebt", &body.outstanding_debt)?,
            penalties,
            last_payment_time: body.last_payment_time,
            warnings_issued: body.warnings_issued,
            last_warning_time: body.last_warning_time,
        })
    }
}

#[derive(Debug, Deserialize)]
struct BorrowersResponse {
    borrowers: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loan_response_parsing() {
        let json = r#"{
            "collateralAmount": "200000000000000000000",
            "outstandingDebt": "150000000",
            "penalties": "2500000",
            "lastPaymentTime": 1700000000,
            "warningsIssued": 1,
            "lastWarningTime": 1700500000
        }"#;
        let body: LoanResponse = serde_json::from_str(json).unwrap();
        let loan = Loan::try_from(body).unwrap();

        assert_eq!(
            loan.collateral_amount,
            U256::from(200u64) * U256::from(10u64).pow(U256::from(18u64))
        );
        assert_eq!(loan.total_debt(), U256::from(152_500_000u64));
        assert_eq!(loan.warnings_issued, 1);
        assert_eq!(loan.last_warning_time, 1_700_500_000);
    }

    #[test]
    fn test_loan_without_penalties() {
        let json = br#"{"collateralAmount":"1","outstandingDebt":"0","lastPaymentTime":0,"warningsIssued":0,"lastWarningTime":0}"#;
        let loan = Loan::try_from(decode::<LoanResponse>(json).unwrap()).unwrap();
        assert_eq!(loan.penalties, U256::ZERO);
        assert!(!loan.has_outstanding_debt());
    }

    #[test]
    fn test_loan_without_history_is_malformed() {
        let err = decode::<LoanResponse>(br#"{"collateralAmount":"1","outstandingDebt":"1"}"#)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Malformed(ref msg) if msg.contains("lastPaymentTime")));

        let err = decode::<LoanResponse>(
            br#"{"collateralAmount":"1","outstandingDebt":"1","lastPaymentTime":1700000000,"warningsIssued":0}"#,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Malformed(ref msg) if msg.contains("lastWarningTime")));
    }

    #[test]
    fn test_bad_amount_is_malformed() {
        let json = r#"{"collateralAmount":"1.5e18","outstandingDebt":"10","lastPaymentTime":0,"warningsIssued":0,"lastWarningTime":0}"#;
        let body: LoanResponse = serde_json::from_str(json).unwrap();
        let err = Loan::try_from(body).unwrap_err();
        assert!(matches!(err, LedgerError::Malformed(ref msg) if msg.contains("collateralAmount")));
    }

    #[test]
    fn test_price_response_parsing() {
        let body: PriceResponse =
            serde_json::from_str(r#"{"price":"1000000","timestamp":1700000000}"#).unwrap();
        let snapshot = PriceSnapshot::try_from(body).unwrap();
        assert_eq!(snapshot.price, U256::from(1_000_000u64));
        assert_eq!(snapshot.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::OK).is_ok());
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY),
            Err(LedgerError::Transient(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            Err(LedgerError::Transient(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND),
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST),
            Err(LedgerError::Malformed(_))
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = IndexerClient::with_client(reqwest::Client::new(), "http://indexer:8080/");
        assert_eq!(client.base_url(), "http://indexer:8080");
    }

    #[tokio::test]
    #[ignore] // Requires a running indexer
    async fn test_fetch_active_borrowers() {
        let client = IndexerClient::new("http://localhost:8080").unwrap();
        let borrowers = client.active_borrowers().await.unwrap();
        println!("Active borrowers: {}", borrowers.len());
    }
}
