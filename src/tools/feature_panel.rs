use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct FeatureMessageParams {
    pub command: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeaturePanelView {
    pub title: String,
    /// True when an already open panel was brought forward.
    pub revealed: bool,
    pub html: String,
}

#[derive(Debug, Serialize)]
pub struct FeatureMessageResult {
    pub handled: bool,
}

#[derive(Debug, Clone)]
struct PanelInstance {
    html: String,
}

const PANEL_TITLE: &str = "Feature Creator";

/// Panel hosting the feature scaffolding UI bundle. At most one instance
/// is open at a time.
#[derive(Debug)]
pub struct FeaturePanel {
    config: Arc<Config>,
    current: TokioMutex<Option<PanelInstance>>,
}

fn asset_uri(bundle_dir: &Path, file: &str) -> String {
    bundle_dir.join("assets").join(file).display().to_string()
}

fn panel_html(bundle_dir: &Path, nonce: &str) -> String {
    let styles = asset_uri(bundle_dir, "index.css");
    let script = asset_uri(bundle_dir, "index.js");
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <meta http-equiv="Content-Security-Policy" content="default-src 'none'; style-src 'self'; script-src 'nonce-{nonce}';">
    <link rel="stylesheet" type="text/css" href="{styles}">
    <title>{PANEL_TITLE}</title>
  </head>
  <body>
    <div id="root"></div>
    <script type="module" nonce="{nonce}" src="{script}"></script>
  </body>
</html>"#
    )
}

impl FeaturePanel {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            current: TokioMutex::new(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn open(&self) -> FeaturePanelView {
        let mut current = self.current.lock().await;
        if let Some(instance) = current.as_ref() {
            info!("Revealing open feature panel");
            return FeaturePanelView {
                title: PANEL_TITLE.to_string(),
                revealed: true,
                html: instance.html.clone(),
            };
        }

        let nonce = Uuid::new_v4().simple().to_string();
        let html = panel_html(&self.config.ui_bundle_dir, &nonce);
        if !self.config.ui_bundle_dir.exists() {
            warn!(dir = %self.config.ui_bundle_dir.display(), "Feature panel UI bundle not found");
        }
        *current = Some(PanelInstance { html: html.clone() });
        info!("Feature panel opened");
        FeaturePanelView {
            title: PANEL_TITLE.to_string(),
            revealed: false,
            html,
        }
    }

    #[instrument(skip(self, params), fields(command = %params.command))]
    pub async fn handle_message(&self, params: &FeatureMessageParams) -> FeatureMessageResult {
        match params.command.as_str() {
            "ready" => {
                info!("Feature panel UI ready");
                FeatureMessageResult { handled: true }
            }
            other => {
                warn!(command = %other, text = ?params.text, "Unhandled feature panel message");
                FeatureMessageResult { handled: false }
            }
        }
    }

    pub async fn dispose(&self) -> bool {
        self.current.lock().await.take().is_some()
    }
}
