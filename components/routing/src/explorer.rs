use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum ExplorerError {
    Http(String),
}

/// The POST body of an OSP report: the serialized report and its signature,
/// both hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerReportBody {
    #[serde(rename = "ospInfo")]
    pub osp_info: String,
    pub sig: String,
}

/// Best effort delivery of OSP reports to the explorer service.
pub trait ExplorerClient: Send + Sync {
    fn post_osp_report(&self, body: &ExplorerReportBody) -> Result<(), ExplorerError>;
}

pub struct HttpExplorerClient {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpExplorerClient {
    pub fn new(url: String) -> HttpExplorerClient {
        HttpExplorerClient {
            url,
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl ExplorerClient for HttpExplorerClient {
    fn post_osp_report(&self, body: &ExplorerReportBody) -> Result<(), ExplorerError> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .map_err(|e| ExplorerError::Http(format!("{}", e)))?;
        if !response.status().is_success() {
            return Err(ExplorerError::Http(format!(
                "explorer returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}
