use fantoccini::wd::TimeoutConfiguration;
use fantoccini::{Client, ClientBuilder};
use grapple_engine::config::SessionConfig;
use std::time::Duration;
use tracing::debug;

pub struct WebDriverClient {
    pub client: Client,
}

impl WebDriverClient {
    pub async fn connect(
        url: &str,
        capabilities: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let client = ClientBuilder::native()
            .capabilities(capabilities)
            .connect(url)
            .await
            .map_err(|e| format!("Failed to connect to WebDriver at {}: {}", url, e))?;

        Ok(Self { client })
    }

    /// Apply timeouts and window size from the session settings.
    pub async fn configure(
        &self,
        session: &SessionConfig,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let timeouts = TimeoutConfiguration::new(
            Some(Duration::from_millis(session.script_timeout_ms)),
            Some(Duration::from_millis(session.page_load_timeout_ms)),
            Some(Duration::from_millis(session.implicit_wait_ms)),
        );
        self.client
            .update_timeouts(timeouts)
            .await
            .map_err(|e| format!("Failed to set timeouts: {}", e))?;

        let size = session.window_size;
        if let Err(e) = self.client.set_window_size(size.width, size.height).await {
            // Headless browsers already got the size through their launch arguments.
            debug!("Could not set window size: {}", e);
        }
        Ok(())
    }

    pub async fn close(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.client
            .close()
            .await
            .map_err(|e| format!("Failed to close session: {}", e))?;
        Ok(())
    }
}
