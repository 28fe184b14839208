use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::{
    Page,
    browser::{Browser, BrowserConfig},
    cdp::browser_protocol::page::{PrintToPdfParams, PrintToPdfParamsBuilder},
};
use futures::StreamExt;
use tokio::{sync::RwLock, task::JoinHandle};

use crate::{cnfg::AppConfig, pdf_options::PdfOptions};

const BROWSER_ARGS: [&str; 7] = [
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--no-first-run",
    "--disable-gpu",
    "--disable-software-rasterizer",
];

// Chromium prints its default date/title header when only a footer is given.
const EMPTY_TEMPLATE: &str = "<div></div>";

/// Turns an HTML document into PDF bytes.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, html: &str, options: &PdfOptions) -> Result<Vec<u8>>;
}

struct BrowserInstance {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserInstance {
    /// The CDP handler task ends once the connection to Chromium is gone.
    fn is_connected(&self) -> bool {
        !self.handler.is_finished()
    }
}

/// One shared headless Chromium, relaunched on demand if it goes away.
pub struct BrowserPool {
    instance: RwLock<Option<BrowserInstance>>,
    chrome_executable: Option<PathBuf>,
    browser_timeout: Duration,
    conversion_timeout: Duration,
}

impl BrowserPool {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let pool = BrowserPool {
            instance: RwLock::new(None),
            chrome_executable: config.chrome_executable.clone(),
            browser_timeout: config.browser_timeout,
            conversion_timeout: config.conversion_timeout,
        };

        let instance = pool.launch().await?;
        *pool.instance.write().await = Some(instance);
        tracing::info!("Browser initialized");

        Ok(pool)
    }

    async fn launch(&self) -> Result<BrowserInstance> {
        let mut builder = BrowserConfig::builder()
            .viewport(None)
            .request_timeout(self.browser_timeout)
            .args(BROWSER_ARGS);
        if let Some(path) = &self.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Browser config error: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        // The handler drives the CDP connection and must be polled for the
        // browser to answer anything. Individual message errors are not fatal.
        let handler = tokio::task::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    tracing::trace!("browser handler event error: {}", err);
                }
            }
            tracing::warn!("Browser connection closed");
        });

        Ok(BrowserInstance { browser, handler })
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self
            .instance
            .read()
            .await
            .as_ref()
            .is_some_and(BrowserInstance::is_connected)
        {
            return Ok(());
        }

        let mut guard = self.instance.write().await;
        if guard.as_ref().is_some_and(BrowserInstance::is_connected) {
            return Ok(());
        }

        tracing::info!("Creating new browser instance");
        if let Some(stale) = guard.take() {
            stale.handler.abort();
        }
        *guard = Some(self.launch().await?);
        tracing::info!("Browser instance created successfully");

        Ok(())
    }

    async fn print_page(&self, page: &Page, html: &str, options: &PdfOptions) -> Result<Vec<u8>> {
        tracing::info!("Page created, loading HTML content");
        within(self.conversion_timeout, page.set_content(html))
            .await?
            .context("Failed to load HTML content")?;

        tracing::info!("HTML content loaded, generating PDF");
        let pdf = within(self.conversion_timeout, page.pdf(print_params(options)))
            .await?
            .context("Failed to print page to PDF")?;

        tracing::info!("PDF generated successfully, size: {} bytes", pdf.len());
        Ok(pdf)
    }

    /// Closes the browser process. Later renders relaunch it.
    pub async fn close(&self) {
        let Some(mut instance) = self.instance.write().await.take() else {
            return;
        };

        if let Err(err) = instance.browser.close().await {
            tracing::warn!("Error closing browser: {}", err);
        }
        if let Err(err) = instance.browser.wait().await {
            tracing::warn!("Error waiting for browser exit: {}", err);
        }
        instance.handler.abort();
        tracing::info!("Browser closed");
    }
}

#[async_trait]
impl PdfRenderer for BrowserPool {
    async fn render(&self, html: &str, options: &PdfOptions) -> Result<Vec<u8>> {
        tracing::info!("Starting HTML to PDF conversion");
        self.ensure_connected().await?;

        let guard = self.instance.read().await;
        let instance = guard.as_ref().context("Browser is not running")?;

        let page = instance
            .browser
            .new_page("about:blank")
            .await
            .context("Failed to open a new page")?;

        let result = self.print_page(&page, html, options).await;

        if let Err(err) = page.close().await {
            tracing::warn!("Error closing page: {}", err);
        }

        result
    }
}

/// Bounds one conversion step by the configured timeout.
async fn within<F: Future>(limit: Duration, step: F) -> Result<F::Output> {
    tokio::time::timeout(limit, step)
        .await
        .map_err(|_| anyhow::anyhow!("Conversion timeout after {}s", limit.as_secs()))
}

pub fn print_params(options: &PdfOptions) -> PrintToPdfParams {
    let (width, height) = options.format.size_inches();

    let mut builder = PrintToPdfParamsBuilder::default()
        .paper_width(width)
        .paper_height(height)
        .margin_top(options.margin.top)
        .margin_right(options.margin.right)
        .margin_bottom(options.margin.bottom)
        .margin_left(options.margin.left)
        .print_background(options.print_background)
        .landscape(options.landscape)
        .scale(options.scale);

    if options.displays_header_footer() {
        builder = builder
            .display_header_footer(true)
            .header_template(
                options
                    .header_template
                    .clone()
                    .unwrap_or_else(|| EMPTY_TEMPLATE.to_string()),
            )
            .footer_template(
                options
                    .footer_template
                    .clone()
                    .unwrap_or_else(|| EMPTY_TEMPLATE.to_string()),
            );
    }

    builder.build()
}
