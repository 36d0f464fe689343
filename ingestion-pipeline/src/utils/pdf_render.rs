use std::time::{Duration, Instant};

use bytes::Bytes;
use common::{
    error::AppError,
    utils::config::{AppConfig, PageFormat},
};
use headless_chrome::{types::PrintToPdfOptions, Browser, LaunchOptionsBuilder};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Pause after navigation so late scripts and fonts settle before printing.
const SETTLE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub timeout_seconds: u64,
    pub page_format: PageFormat,
    pub full_page: bool,
    pub print_background: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            page_format: PageFormat::A4,
            full_page: true,
            print_background: true,
        }
    }
}

impl RenderOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            timeout_seconds: config.render_timeout_secs,
            page_format: config.render_page_format,
            full_page: config.render_full_page,
            print_background: config.render_print_background,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }

    /// Chrome print parameters. Without `full_page` only the first sheet is printed.
    pub fn print_options(&self) -> PrintToPdfOptions {
        let (paper_width, paper_height) = self.page_format.dimensions_inches();
        PrintToPdfOptions {
            landscape: Some(false),
            display_header_footer: Some(false),
            print_background: Some(self.print_background),
            paper_width: Some(paper_width),
            paper_height: Some(paper_height),
            page_ranges: (!self.full_page).then(|| "1".to_string()),
            ..PrintToPdfOptions::default()
        }
    }
}

fn render_error(context: &str, err: impl std::fmt::Display) -> AppError {
    AppError::Render(format!("{context}: {err}"))
}

struct RenderJob {
    url: String,
    print: PrintToPdfOptions,
    navigation_timeout: Duration,
    no_sandbox: bool,
}

impl RenderJob {
    fn run(self) -> Result<Vec<u8>, AppError> {
        let launch = LaunchOptionsBuilder::default()
            .sandbox(!self.no_sandbox)
            .build()
            .map_err(|err| render_error("invalid Chrome launch options", err))?;
        let browser = Browser::new(launch).map_err(|err| render_error("failed to start Chrome", err))?;
        let tab = browser
            .new_tab()
            .map_err(|err| render_error("failed to open tab", err))?;
        tab.set_default_timeout(self.navigation_timeout);

        tab.navigate_to(&self.url)
            .map_err(|err| render_error("navigation failed", err))?
            .wait_until_navigated()
            .map_err(|err| render_error("page did not finish loading", err))?;

        std::thread::sleep(SETTLE_DELAY);

        tab.print_to_pdf(Some(self.print))
            .map_err(|err| render_error("printing failed", err))
    }
}

/// Renders pages to PDF with a short-lived headless Chrome per request.
#[derive(Debug, Clone, Default)]
pub struct ChromeRenderer {
    no_sandbox: bool,
}

impl ChromeRenderer {
    pub fn new(no_sandbox: bool) -> Self {
        Self { no_sandbox }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.chrome_no_sandbox)
    }

    #[instrument(skip(self, options), fields(format = ?options.page_format))]
    pub async fn render(&self, url: &str, options: &RenderOptions) -> Result<Bytes, AppError> {
        let timeout = options.timeout();
        let job = RenderJob {
            url: url.to_string(),
            print: options.print_options(),
            navigation_timeout: timeout,
            no_sandbox: self.no_sandbox,
        };

        let started = Instant::now();
        let pdf = tokio::time::timeout(
            timeout + SETTLE_DELAY,
            tokio::task::spawn_blocking(move || job.run()),
        )
        .await
        .map_err(|_| {
            AppError::Render(format!(
                "rendering did not finish within {}s",
                options.timeout_seconds
            ))
        })???;

        if pdf.is_empty() {
            return Err(AppError::Render("renderer produced an empty PDF".into()));
        }

        info!(
            bytes = pdf.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "Page rendered"
        );
        Ok(Bytes::from(pdf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_options_follow_page_format() {
        let options = RenderOptions {
            page_format: PageFormat::Letter,
            print_background: false,
            ..RenderOptions::default()
        };
        let print = options.print_options();
        assert_eq!(print.paper_width, Some(8.5));
        assert_eq!(print.paper_height, Some(11.0));
        assert_eq!(print.print_background, Some(false));
        assert_eq!(print.display_header_footer, Some(false));
        assert!(print.page_ranges.is_none());
    }

    #[test]
    fn partial_capture_prints_first_sheet_only() {
        let options = RenderOptions {
            full_page: false,
            ..RenderOptions::default()
        };
        assert_eq!(options.print_options().page_ranges.as_deref(), Some("1"));
    }

    #[test]
    fn zero_timeout_is_clamped() {
        let options = RenderOptions {
            timeout_seconds: 0,
            ..RenderOptions::default()
        };
        assert_eq!(options.timeout(), Duration::from_secs(1));
    }
}
