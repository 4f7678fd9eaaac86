//! Attaching [`X402Payments`] to a plain reqwest client.

use reqwest::{Client, ClientBuilder};
use reqwest_middleware as rqm;

use crate::middleware::X402Payments;

/// Turns a reqwest client (or builder) into one that pays `402` responses.
///
/// ```rust,ignore
/// let http = reqwest::Client::new().with_payments(X402Payments::with_signer(wallet));
/// let response = http.get("http://localhost:3000/api/premium").send().await?;
/// ```
pub trait ReqwestWithPayments {
    type Output;

    fn with_payments(self, payments: X402Payments) -> Self::Output;
}

impl ReqwestWithPayments for Client {
    type Output = rqm::ClientWithMiddleware;

    fn with_payments(self, payments: X402Payments) -> Self::Output {
        rqm::ClientBuilder::new(self).with(payments).build()
    }
}

impl ReqwestWithPayments for ClientBuilder {
    type Output = Result<rqm::ClientWithMiddleware, reqwest::Error>;

    fn with_payments(self, payments: X402Payments) -> Self::Output {
        Ok(self.build()?.with_payments(payments))
    }
}
