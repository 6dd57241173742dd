use anyhow::{anyhow, Context, Result};
use std::time::Duration;

use super::ViolationReport;

/// Destination for violation reports. Called from notifier worker threads.
pub trait ViolationSink: Send + Sync {
    fn name(&self) -> &'static str;
    fn deliver(&self, report: &ViolationReport) -> Result<()>;
}

/// Check that `endpoint` is an absolute http(s) URL.
pub fn validate_endpoint(endpoint: &str) -> Result<url::Url> {
    let url = url::Url::parse(endpoint.trim())
        .with_context(|| format!("invalid notifier endpoint {}", endpoint))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(anyhow!("unsupported notifier scheme: {}", other)),
    }
    if url.host_str().is_none() {
        return Err(anyhow!("notifier endpoint {} has no host", endpoint));
    }
    Ok(url)
}

/// POSTs each report as JSON. Any non-2xx status is a failed delivery.
pub struct HttpSink {
    agent: ureq::Agent,
    endpoint: url::Url,
}

impl HttpSink {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = validate_endpoint(endpoint)?;
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self { agent, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }
}

impl ViolationSink for HttpSink {
    fn name(&self) -> &'static str {
        "http"
    }

    fn deliver(&self, report: &ViolationReport) -> Result<()> {
        let body = serde_json::to_string(report)?;
        match self
            .agent
            .post(self.endpoint.as_str())
            .set("Content-Type", "application/json")
            .send_string(&body)
        {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, response)) => {
                let text = response.into_string().unwrap_or_default();
                Err(anyhow!(
                    "processor rejected {} with status {}: {}",
                    report.id,
                    code,
                    text.trim()
                ))
            }
            Err(err) => Err(anyhow!("failed to deliver {}: {}", report.id, err)),
        }
    }
}

/// Logs reports instead of sending them; used when no endpoint is configured.
#[derive(Default)]
pub struct LogSink;

impl ViolationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn deliver(&self, report: &ViolationReport) -> Result<()> {
        log::info!("violation: {}", serde_json::to_string(report)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_must_be_http() {
        assert!(validate_endpoint("http://127.0.0.1:5002/process_frame").is_ok());
        assert!(validate_endpoint("https://processor.local/hook").is_ok());
        assert!(validate_endpoint("mqtt://broker:1883").is_err());
        assert!(validate_endpoint("not a url").is_err());
    }
}
